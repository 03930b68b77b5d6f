//! Unified error type for Tandem.

use tandem_call::CallError;
use tandem_protocol::{ProtocolError, ResultCode};
use tandem_room::{PlatformError, SwitchError, SwitchToError};
use tandem_seat::SeatError;
use tandem_transport::TransportError;

use crate::BackendError;

/// Top-level error that wraps all crate-specific errors.
///
/// Operations report their outcome as a result code plus message; this
/// type is what construction and configuration return, and what callers
/// get when they want a single error type across the layers. The `#[from]`
/// attribute on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum TandemError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Seat(#[from] SeatError),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Switch(#[from] SwitchError),

    #[error(transparent)]
    SwitchTo(#[from] SwitchToError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// The orchestrator must be built from inside a Tokio runtime.
    #[error("no Tokio runtime available to run the driver")]
    NoRuntime,
}

impl TandemError {
    pub fn code(&self) -> ResultCode {
        match self {
            Self::Transport(_) | Self::Platform(_) | Self::NoRuntime => ResultCode::Error,
            Self::Protocol(err) => err.code(),
            Self::Seat(err) => err.code(),
            Self::Call(err) => err.code(),
            Self::Switch(err) => err.code(),
            Self::SwitchTo(err) => err.code(),
            Self::Backend(err) => err.code(),
            Self::Config(_) => ResultCode::InvalidArgument,
        }
    }
}
