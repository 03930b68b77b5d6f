//! Messages Tandem itself sends over the transport's custom-message channel.

use serde::{Deserialize, Serialize};

use crate::{MatchId, SwitchToken};

/// A host → guest message carried as a transport custom message.
///
/// Internally tagged: `{ "type": "EndOfMatch", "match_id": ..., ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MergeMessage {
    /// First phase of the end/kick handshake. The host tells the guest the
    /// merge is over for it, with the text to show, and the switch token
    /// the guest used to join so the guest can tell the message comes from
    /// the host it is actually switched onto.
    EndOfMatch {
        match_id: MatchId,
        info: String,
        token: SwitchToken,
    },
}
