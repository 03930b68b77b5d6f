//! The seat registry: the single source of truth for who sits where.
//!
//! The transport reports joins and exits asynchronously and does not promise
//! a sensible order per seat. A fast re-join can overtake the exit of the
//! previous occupant, and that exit then shows up late. The registry turns
//! this raw stream into an ordered stream of [`SeatEvent`]s in which a seat
//! never has two live occupants:
//!
//! - a join for a seat held by someone else first unbinds the old occupant
//!   (displacement), then binds the new one
//! - an exit naming someone who no longer holds the seat is stale and is
//!   dropped without an event
//! - a repeated join by the current occupant is a duplicate and is dropped
//!   without an event
//!
//! The registry is plain synchronous state. [`SharedSeats`](crate::SharedSeats)
//! wraps it for use from async code.

use std::fmt;

use tandem_protocol::{SeatIndex, UserId};
use tandem_transport::ExitReason;
use tokio_util::sync::CancellationToken;

use crate::seat::{Connection, ConnectionState, Seat, SeatConfig};
use crate::SeatError;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Why a connection was unbound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnbindReason {
    /// The transport reported the participant leaving.
    Exited(ExitReason),
    /// A different participant joined the same seat.
    Displaced { by: UserId },
    /// The registry was reset at the end of a merge.
    Reset,
}

impl fmt::Display for UnbindReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(reason) => write!(f, "exited ({reason})"),
            Self::Displaced { by } => write!(f, "displaced by {by}"),
            Self::Reset => f.write_str("reset"),
        }
    }
}

/// An ordered, de-duplicated change in seat occupancy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatEvent {
    Bound {
        seat: SeatIndex,
        user_id: UserId,
    },
    Unbound {
        seat: SeatIndex,
        user_id: UserId,
        reason: UnbindReason,
    },
}

impl SeatEvent {
    pub fn seat(&self) -> SeatIndex {
        match self {
            Self::Bound { seat, .. } | Self::Unbound { seat, .. } => *seat,
        }
    }

    pub fn user_id(&self) -> &UserId {
        match self {
            Self::Bound { user_id, .. } | Self::Unbound { user_id, .. } => user_id,
        }
    }
}

// ---------------------------------------------------------------------------
// SeatRegistry
// ---------------------------------------------------------------------------

/// See the [module docs](self).
#[derive(Debug)]
pub struct SeatRegistry {
    seats: Vec<Seat>,
}

impl SeatRegistry {
    pub fn new(config: SeatConfig) -> Self {
        let config = config.validated();
        let seats = (0..config.capacity)
            .map(|i| Seat::new(SeatIndex(i as u8)))
            .collect();
        Self { seats }
    }

    // -- Transport notifications -------------------------------------------

    /// Applies a join notification.
    ///
    /// Returns the events it produced, in order: nothing for a duplicate,
    /// `Bound` for an empty seat, `Unbound(old)` then `Bound(new)` for a
    /// displacement.
    ///
    /// # Errors
    /// [`SeatError::IndexOutOfRange`] or [`SeatError::EmptyUserId`] when the
    /// notification is malformed. The registry is left untouched.
    pub fn on_join(
        &mut self,
        seat: SeatIndex,
        user_id: UserId,
        extra: Vec<u8>,
    ) -> Result<Vec<SeatEvent>, SeatError> {
        self.validate(seat, &user_id)?;
        let slot = &mut self.seats[seat.as_usize()];
        let mut events = Vec::with_capacity(2);

        match slot.connection.take() {
            Some(current) if current.user_id == user_id => {
                tracing::debug!(%seat, %user_id, "duplicate join ignored");
                slot.connection = Some(current);
                return Ok(events);
            }
            Some(old) => {
                tracing::warn!(
                    %seat,
                    old = %old.user_id,
                    new = %user_id,
                    "join for occupied seat, displacing previous occupant"
                );
                old.disconnect.cancel();
                events.push(SeatEvent::Unbound {
                    seat,
                    user_id: old.user_id,
                    reason: UnbindReason::Displaced {
                        by: user_id.clone(),
                    },
                });
            }
            None => {}
        }

        tracing::info!(%seat, %user_id, "seat bound");
        slot.connection = Some(Connection::bind(seat, user_id.clone(), extra));
        slot.expected = false;
        events.push(SeatEvent::Bound { seat, user_id });
        Ok(events)
    }

    /// Applies an exit notification.
    ///
    /// An exit for someone who does not hold the seat is stale and yields
    /// no events.
    ///
    /// # Errors
    /// Same validation as [`on_join`](Self::on_join).
    pub fn on_exit(
        &mut self,
        seat: SeatIndex,
        user_id: UserId,
        reason: ExitReason,
    ) -> Result<Vec<SeatEvent>, SeatError> {
        self.validate(seat, &user_id)?;
        let slot = &mut self.seats[seat.as_usize()];

        let is_current = slot
            .connection
            .as_ref()
            .is_some_and(|c| c.user_id == user_id);
        if !is_current {
            tracing::debug!(%seat, %user_id, %reason, "stale exit ignored");
            return Ok(Vec::new());
        }

        let Some(conn) = slot.connection.take() else {
            return Ok(Vec::new());
        };
        conn.disconnect.cancel();
        tracing::info!(%seat, %user_id, %reason, "seat unbound");
        Ok(vec![SeatEvent::Unbound {
            seat,
            user_id: conn.user_id,
            reason: UnbindReason::Exited(reason),
        }])
    }

    fn validate(&self, seat: SeatIndex, user_id: &UserId) -> Result<(), SeatError> {
        if seat.as_usize() >= self.seats.len() {
            tracing::error!(%seat, capacity = self.seats.len(), "transport reported an out-of-range seat");
            return Err(SeatError::IndexOutOfRange {
                seat,
                capacity: self.seats.len(),
            });
        }
        if user_id.is_empty() {
            tracing::error!(%seat, "transport reported an empty user id");
            return Err(SeatError::EmptyUserId(seat));
        }
        Ok(())
    }

    // -- Commands ------------------------------------------------------------

    /// Marks the given empty seats as awaiting an occupant.
    pub fn expect(&mut self, seats: &[SeatIndex]) {
        for seat in seats {
            if let Some(slot) = self.seats.get_mut(seat.as_usize()) {
                slot.expected = slot.connection.is_none();
            }
        }
    }

    /// Drops every pending expectation; seats nobody took go back to `None`.
    pub fn forget_expected(&mut self) {
        for slot in &mut self.seats {
            slot.expected = false;
        }
    }

    /// Starts switching the occupant of `seat` back to its own instance.
    ///
    /// # Errors
    /// [`SeatError::NotOccupied`] if nobody is there.
    pub fn mark_disconnecting(&mut self, seat: SeatIndex) -> Result<(), SeatError> {
        let conn = self.connection_mut(seat)?;
        conn.state = ConnectionState::Disconnecting;
        tracing::debug!(%seat, user_id = %conn.user_id, "connection disconnecting");
        Ok(())
    }

    /// Undoes [`mark_disconnecting`](Self::mark_disconnecting) after a
    /// handshake aborted before the switch-back was issued.
    pub fn restore_connected(&mut self, seat: SeatIndex) -> Result<(), SeatError> {
        let conn = self.connection_mut(seat)?;
        conn.state = ConnectionState::Connected;
        tracing::debug!(%seat, user_id = %conn.user_id, "connection restored");
        Ok(())
    }

    /// Unbinds every seat and clears expectations. Returns one `Unbound`
    /// per connection that was bound, in seat order.
    pub fn reset(&mut self) -> Vec<SeatEvent> {
        let mut events = Vec::new();
        for slot in &mut self.seats {
            slot.expected = false;
            if let Some(conn) = slot.connection.take() {
                conn.disconnect.cancel();
                events.push(SeatEvent::Unbound {
                    seat: slot.index,
                    user_id: conn.user_id,
                    reason: UnbindReason::Reset,
                });
            }
        }
        if !events.is_empty() {
            tracing::info!(unbound = events.len(), "seat registry reset");
        }
        events
    }

    fn connection_mut(&mut self, seat: SeatIndex) -> Result<&mut Connection, SeatError> {
        self.seats
            .get_mut(seat.as_usize())
            .and_then(|s| s.connection.as_mut())
            .ok_or(SeatError::NotOccupied(seat))
    }

    // -- Queries ---------------------------------------------------------------

    pub fn seat(&self, seat: SeatIndex) -> Option<&Seat> {
        self.seats.get(seat.as_usize())
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn connection(&self, seat: SeatIndex) -> Option<&Connection> {
        self.seat(seat).and_then(|s| s.connection.as_ref())
    }

    pub fn occupant(&self, seat: SeatIndex) -> Option<&UserId> {
        self.connection(seat).map(|c| &c.user_id)
    }

    pub fn is_occupied(&self, seat: SeatIndex) -> bool {
        self.connection(seat).is_some()
    }

    pub fn state(&self, seat: SeatIndex) -> ConnectionState {
        self.seat(seat).map_or(ConnectionState::None, Seat::state)
    }

    /// Guest seats whose occupant is `Connected`, in seat order.
    pub fn connected_guests(&self) -> Vec<SeatIndex> {
        self.seats
            .iter()
            .skip(1)
            .filter(|s| s.state() == ConnectionState::Connected)
            .map(|s| s.index)
            .collect()
    }

    /// Guest seats with any occupant, in seat order.
    pub fn occupied_guests(&self) -> Vec<SeatIndex> {
        self.seats
            .iter()
            .skip(1)
            .filter(|s| s.connection.is_some())
            .map(|s| s.index)
            .collect()
    }

    pub fn host_connection(&self) -> Option<&Connection> {
        self.connection(SeatIndex::HOST)
    }

    pub fn disconnect_token(&self, seat: SeatIndex) -> Option<CancellationToken> {
        self.connection(seat).map(|c| c.disconnect.clone())
    }

    pub fn capacity(&self) -> usize {
        self.seats.len()
    }

    pub fn occupied_count(&self) -> usize {
        self.seats.iter().filter(|s| s.connection.is_some()).count()
    }

    pub fn contains(&self, seat: SeatIndex) -> bool {
        seat.as_usize() < self.seats.len()
    }
}

impl Default for SeatRegistry {
    fn default() -> Self {
        Self::new(SeatConfig::default())
    }
}
