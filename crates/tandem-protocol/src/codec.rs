//! Codec trait and the JSON implementation used for merge payloads.
//!
//! Tandem has no wire format of its own: the platform session API and the
//! transport carry opaque bytes. The only bytes Tandem itself produces or
//! interprets are the [`MergeMessage`](crate::MergeMessage) payloads sent
//! host → guest and the switch-token seed carried in a participant's
//! matchmaking extra payload. Both go through a [`Codec`], so the encoding
//! can be swapped without touching the coordinator.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts values to bytes and back.
///
/// `Send + Sync + 'static` because the codec is owned by long-lived
/// coordinator state that is shared between operation tasks.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed or
    /// don't match the expected shape.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// Behind the `json` feature (enabled by default).
///
/// ```rust
/// use tandem_protocol::{Codec, JsonCodec, MatchId, MergeMessage, SwitchToken};
///
/// let codec = JsonCodec;
/// let msg = MergeMessage::EndOfMatch {
///     match_id: MatchId::new("m-1"),
///     info: "thanks for playing".into(),
///     token: SwitchToken::new("sess-1", "host-open-id", "rtc-7"),
/// };
///
/// let bytes = codec.encode(&msg).unwrap();
/// let decoded: MergeMessage = codec.decode(&bytes).unwrap();
/// assert_eq!(msg, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
