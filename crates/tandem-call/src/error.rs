use tandem_protocol::ResultCode;
use tandem_transport::TransportError;

use crate::CancelReason;

/// Why a reliable call did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The transport refused the last attempt synchronously.
    #[error("transport refused message after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// Every attempt was reported as undelivered.
    #[error("delivery failed after {attempts} attempt(s)")]
    Exhausted { attempts: u32 },

    /// No delivery report arrived before the call's deadline.
    #[error("no delivery report within the call timeout ({attempts} attempt(s))")]
    TimedOut { attempts: u32 },

    #[error("call {0}")]
    Cancelled(CancelReason),

    /// The engine was dropped with the call still outstanding.
    #[error("call engine dropped")]
    EngineGone,
}

impl CallError {
    pub fn code(&self) -> ResultCode {
        match self {
            Self::TimedOut { .. } => ResultCode::Timeout,
            Self::Cancelled(reason) => reason.code(),
            Self::Transport { .. } | Self::Exhausted { .. } | Self::EngineGone => ResultCode::Error,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Transport { attempts, .. }
            | Self::Exhausted { attempts }
            | Self::TimedOut { attempts } => *attempts,
            Self::Cancelled(_) | Self::EngineGone => 0,
        }
    }
}
