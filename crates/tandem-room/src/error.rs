//! Error types for the switch layer.

use tandem_protocol::{ProtocolError, ResultCode, SeatIndex};
use tandem_seat::SeatError;

use crate::SwitchState;

/// A failure reported by the platform session API.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The platform could not be reached or is not initialised.
    #[error("platform unavailable: {0}")]
    Unavailable(String),

    /// The platform raised an error while carrying out the request.
    #[error("platform error: {0}")]
    Internal(String),
}

/// Why [`SwitchCoordinator::switch_to`](crate::SwitchCoordinator::switch_to)
/// failed.
#[derive(Debug, thiserror::Error)]
pub enum SwitchToError {
    /// The token is malformed, or is the caller's own.
    #[error("invalid switch token")]
    InvalidToken,

    /// The seat is the host seat or out of range.
    #[error("invalid seat index {0}")]
    InvalidIndex(SeatIndex),

    #[error("cannot switch while in state {0}")]
    InvalidState(SwitchState),

    /// The platform raised an error.
    #[error("switch failed: {0}")]
    Error(String),

    /// The platform answered with a non-zero code.
    #[error("switch rejected ({code}): {message}")]
    Rejected { code: i32, message: String },
}

impl SwitchToError {
    pub fn code(&self) -> ResultCode {
        match self {
            Self::InvalidToken | Self::InvalidIndex(_) => ResultCode::InvalidArgument,
            Self::InvalidState(_) => ResultCode::InvalidState,
            Self::Error(_) | Self::Rejected { .. } => ResultCode::Error,
        }
    }
}

/// Errors from the host side of the coordinator.
#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    #[error("operation not allowed in switch state {0}")]
    InvalidState(SwitchState),

    /// Becoming host needs the local identity resolved first.
    #[error("local identity has not been resolved")]
    MissingIdentity,

    /// The platform declined to make this instance a host.
    #[error("platform refused to create a host session")]
    HostRefused,

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Seat(#[from] SeatError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SwitchError {
    pub fn code(&self) -> ResultCode {
        match self {
            Self::InvalidState(_) => ResultCode::InvalidState,
            Self::MissingIdentity => ResultCode::InvalidState,
            Self::HostRefused | Self::Platform(_) => ResultCode::Error,
            Self::Seat(err) => err.code(),
            Self::Protocol(err) => err.code(),
        }
    }
}
