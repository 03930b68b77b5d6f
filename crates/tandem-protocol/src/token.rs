//! Switch tokens: the credential a guest presents to switch onto a host.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Codec, MatchParticipant, ProtocolError};

/// An opaque, self-contained credential that lets a guest perform the
/// low-level "switch to host" primitive.
///
/// Immutable once created. Two tokens are only ever compared for
/// equality, to stop a participant from switching onto itself.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwitchToken {
    /// The host's platform session handle.
    pub session_handle: String,
    /// The host's public identity.
    pub host_open_id: String,
    /// The RTC transport user id the guest should bind as.
    pub rtc_user_id: String,
}

impl SwitchToken {
    pub fn new(
        session_handle: impl Into<String>,
        host_open_id: impl Into<String>,
        rtc_user_id: impl Into<String>,
    ) -> Self {
        Self {
            session_handle: session_handle.into(),
            host_open_id: host_open_id.into(),
            rtc_user_id: rtc_user_id.into(),
        }
    }

    /// Every field must be present for the platform to accept the token.
    pub fn is_well_formed(&self) -> bool {
        !self.session_handle.is_empty()
            && !self.host_open_id.is_empty()
            && !self.rtc_user_id.is_empty()
    }

    /// Builds the token for `participant` from the seed carried in its
    /// matchmaking extra payload.
    ///
    /// # Errors
    /// Decode errors from the codec, or [`ProtocolError::InvalidMessage`]
    /// if the resulting token is not well formed.
    pub fn from_participant<C: Codec>(
        participant: &MatchParticipant,
        codec: &C,
    ) -> Result<Self, ProtocolError> {
        if participant.extra.is_empty() {
            return Err(ProtocolError::InvalidMessage(format!(
                "participant {} carries no switch token seed",
                participant.identity
            )));
        }
        let seed: SwitchTokenSeed = codec.decode(&participant.extra)?;
        let token = Self {
            session_handle: seed.session_handle,
            host_open_id: participant.identity.open_id.clone(),
            rtc_user_id: seed.rtc_user_id,
        };
        if !token.is_well_formed() {
            return Err(ProtocolError::InvalidMessage(format!(
                "switch token for {} is incomplete",
                participant.identity
            )));
        }
        Ok(token)
    }
}

// Session handles are credentials; keep them out of logs.
impl fmt::Debug for SwitchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchToken")
            .field("session_handle", &"<redacted>")
            .field("host_open_id", &self.host_open_id)
            .field("rtc_user_id", &self.rtc_user_id)
            .finish()
    }
}

/// The half of a [`SwitchToken`] a participant publishes about itself
/// through the matchmaking request's extra payload. The identity half is
/// filled in from the match result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchTokenSeed {
    pub session_handle: String,
    pub rtc_user_id: String,
}

impl SwitchTokenSeed {
    pub fn new(session_handle: impl Into<String>, rtc_user_id: impl Into<String>) -> Self {
        Self {
            session_handle: session_handle.into(),
            rtc_user_id: rtc_user_id.into(),
        }
    }

    /// Encodes the seed for [`MatchRequest::extra`](crate::MatchRequest::extra).
    pub fn encode<C: Codec>(&self, codec: &C) -> Result<Vec<u8>, ProtocolError> {
        codec.encode(self)
    }
}
