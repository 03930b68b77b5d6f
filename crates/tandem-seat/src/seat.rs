//! Seat types: the fixed slots participants occupy, and the connection a
//! seat holds.
//!
//! A merged session has a small fixed number of seats. Seat 0 is the host
//! slot and holds the local instance's own connection once the transport
//! reports it; seats 1..N are guest slots.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tandem_protocol::{SeatIndex, UserId};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// SeatConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeatConfig {
    /// Number of seats, host seat included. Default: 4.
    pub capacity: usize,
}

impl Default for SeatConfig {
    fn default() -> Self {
        Self { capacity: 4 }
    }
}

impl SeatConfig {
    /// Seat indices are `u8` and the host seat must exist.
    pub const MAX_CAPACITY: usize = u8::MAX as usize + 1;

    pub fn validated(mut self) -> Self {
        let clamped = self.capacity.clamp(1, Self::MAX_CAPACITY);
        if clamped != self.capacity {
            tracing::warn!(
                capacity = self.capacity,
                clamped,
                "seat capacity out of range, clamping"
            );
            self.capacity = clamped;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Lifecycle of a seat's occupancy.
///
/// ```text
///   None ──(expect)──→ Connecting ──(join)──→ Connected ──(kick/end)──→ Disconnecting
///     ↑                                          │                           │
///     └──────────────────(exit / displace)───────┴───────────────────────────┘
/// ```
///
/// - **None**: nobody is here and nobody is expected.
/// - **Connecting**: the current match assigned someone to this seat but
///   the transport has not reported them yet.
/// - **Connected**: a participant is bound.
/// - **Disconnecting**: the host has started switching this participant
///   back to its own instance and is waiting for the transport to report
///   the departure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    None,
    Connecting,
    Connected,
    Disconnecting,
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// One participant's transport-level presence at a seat.
///
/// Created when the transport reports a join, destroyed on exit or when a
/// new occupant displaces it. Owned exclusively by its [`Seat`].
#[derive(Debug, Clone)]
pub struct Connection {
    pub seat: SeatIndex,
    pub user_id: UserId,
    /// Opaque payload the transport delivered with the join.
    pub extra: Vec<u8>,
    pub state: ConnectionState,
    pub bound_at: Instant,
    /// Cancelled when this connection is unbound for any reason. Operations
    /// that depend on the connection fold it into their cancel scope.
    pub disconnect: CancellationToken,
}

impl Connection {
    pub(crate) fn bind(seat: SeatIndex, user_id: UserId, extra: Vec<u8>) -> Self {
        Self {
            seat,
            user_id,
            extra,
            state: ConnectionState::Connected,
            bound_at: Instant::now(),
            disconnect: CancellationToken::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

// ---------------------------------------------------------------------------
// Seat
// ---------------------------------------------------------------------------

/// A numbered slot holding at most one [`Connection`].
#[derive(Debug, Clone)]
pub struct Seat {
    pub index: SeatIndex,
    pub connection: Option<Connection>,
    /// An occupant is expected here (see [`ConnectionState::Connecting`]).
    pub expected: bool,
}

impl Seat {
    pub(crate) fn new(index: SeatIndex) -> Self {
        Self {
            index,
            connection: None,
            expected: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        match &self.connection {
            Some(conn) => conn.state,
            None if self.expected => ConnectionState::Connecting,
            None => ConnectionState::None,
        }
    }

    pub fn occupant(&self) -> Option<&UserId> {
        self.connection.as_ref().map(|c| &c.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seat_state_empty_is_none() {
        let seat = Seat::new(SeatIndex(1));
        assert_eq!(seat.state(), ConnectionState::None);
        assert!(seat.occupant().is_none());
    }

    #[test]
    fn test_seat_state_expected_is_connecting() {
        let mut seat = Seat::new(SeatIndex(1));
        seat.expected = true;
        assert_eq!(seat.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_seat_state_follows_connection() {
        let mut seat = Seat::new(SeatIndex(2));
        seat.connection = Some(Connection::bind(SeatIndex(2), UserId::new("u"), Vec::new()));
        assert_eq!(seat.state(), ConnectionState::Connected);
        assert_eq!(seat.occupant(), Some(&UserId::new("u")));
    }

    #[test]
    fn test_seat_config_validated_clamps_zero() {
        let cfg = SeatConfig { capacity: 0 }.validated();
        assert_eq!(cfg.capacity, 1);
    }
}
