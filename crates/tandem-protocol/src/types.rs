//! Identity types and the uniform result taxonomy.
//!
//! Everything here is a small value type shared by every layer of Tandem:
//! seat numbers, opaque transport user ids, match ids, participant
//! identities, and the [`ResultCode`] that every operation reports.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A numbered slot a participant's connection can occupy.
///
/// Seat 0 is the host slot: once established it always holds the local
/// instance's own connection. Seats `1..capacity` are guest slots.
///
/// Newtype over `u8` so a seat can never be confused with a count or a
/// message id. Serializes as a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatIndex(pub u8);

impl SeatIndex {
    /// The host slot.
    pub const HOST: SeatIndex = SeatIndex(0);

    /// Returns `true` for seat 0.
    pub fn is_host(self) -> bool {
        self == Self::HOST
    }

    /// The seat number as a `usize`, for indexing seat arrays.
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SeatIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// Opaque user id assigned by the transport to one participant's
/// presence at a seat.
///
/// Tandem never interprets it; it is only compared for equality to tell
/// a re-join apart from a stale exit notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one matchmaking outcome, issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub String);

impl MatchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M-{}", self.0)
    }
}

/// The resolved public identity of a participant.
///
/// Fetched once from the matchmaking backend and cached for the lifetime
/// of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Stable public id, unique per participant.
    pub open_id: String,
    /// Display name. Informational only.
    #[serde(default)]
    pub nickname: String,
}

impl Identity {
    pub fn new(open_id: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            open_id: open_id.into(),
            nickname: nickname.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.open_id)
    }
}

// ---------------------------------------------------------------------------
// Result taxonomy
// ---------------------------------------------------------------------------

/// The uniform outcome code every Tandem operation reports.
///
/// Raw collaborator failures never cross an operation boundary; they are
/// always folded into one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultCode {
    /// The operation did what it was asked to.
    Success,
    /// The caller, a shutdown, or a dropped connection cancelled it.
    Cancelled,
    /// A bounded wait was exceeded.
    Timeout,
    /// The operation is illegal in the current state-machine position.
    InvalidState,
    /// A malformed token, seat index, or config was supplied.
    InvalidArgument,
    /// Everything else: transport, platform, and backend failures.
    Error,
}

impl ResultCode {
    /// Numeric form, stable across releases.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Cancelled => 1,
            Self::Timeout => 2,
            Self::InvalidState => 3,
            Self::InvalidArgument => 4,
            Self::Error => 5,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "Success",
            Self::Cancelled => "Cancelled",
            Self::Timeout => "Timeout",
            Self::InvalidState => "InvalidState",
            Self::InvalidArgument => "InvalidArgument",
            Self::Error => "Error",
        };
        f.write_str(s)
    }
}

/// A terminal result: a [`ResultCode`] plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpResult {
    pub code: ResultCode,
    pub message: String,
}

impl OpResult {
    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn success() -> Self {
        Self::new(ResultCode::Success, "")
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ResultCode::Cancelled, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ResultCode::Timeout, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ResultCode::InvalidState, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ResultCode::InvalidArgument, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ResultCode::Error, message)
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

impl fmt::Display for OpResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}
