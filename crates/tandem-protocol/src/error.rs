//! Error types for the protocol layer.

use crate::ResultCode;

/// Errors raised while encoding, decoding, or validating protocol values.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed bytes, missing fields, or the
    /// wrong shape.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The value decoded fine but violates a protocol rule, e.g. a switch
    /// token seed with an empty session handle.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A caller-supplied value (pool config, seat index) is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ProtocolError {
    /// The uniform result code this error maps onto.
    pub fn code(&self) -> ResultCode {
        match self {
            Self::InvalidArgument(_) => ResultCode::InvalidArgument,
            _ => ResultCode::Error,
        }
    }
}
