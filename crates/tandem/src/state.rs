//! The match state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where the local instance stands in the matchmaking lifecycle.
///
/// ```text
/// None ─→ MatchingUser ─→ MatchingStream ─┬─→ InGameAsHost ──→ EndingGame ─→ None
///   ↑          │               │          └─→ InConnectOtherRoom ──────────→ None
///   └──────────┴───────────────┘ (failure, cancellation)
/// ```
///
/// - **MatchingUser**: resolving identity and waiting for the backend to
///   form a group.
/// - **MatchingStream**: becoming host and waiting for guests, or switching
///   onto the host.
/// - **InGameAsHost** / **InConnectOtherRoom**: merged, as host or guest.
/// - **EndingGame**: the host is sending everyone home.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MatchState {
    #[default]
    None,
    MatchingUser,
    MatchingStream,
    InGameAsHost,
    InConnectOtherRoom,
    EndingGame,
}

impl MatchState {
    /// Only an idle instance may start a new match request.
    pub fn accepts_request(self) -> bool {
        self == Self::None
    }

    /// A match request is in progress.
    pub fn is_matching(self) -> bool {
        matches!(self, Self::MatchingUser | Self::MatchingStream)
    }

    /// Part of a merged session, on either side.
    pub fn is_in_game(self) -> bool {
        matches!(
            self,
            Self::InGameAsHost | Self::InConnectOtherRoom | Self::EndingGame
        )
    }
}

impl fmt::Display for MatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::MatchingUser => "matching-user",
            Self::MatchingStream => "matching-stream",
            Self::InGameAsHost => "in-game-as-host",
            Self::InConnectOtherRoom => "in-connect-other-room",
            Self::EndingGame => "ending-game",
        };
        f.write_str(name)
    }
}
