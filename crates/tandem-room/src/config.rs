//! Switch configuration and state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SwitchConfig
// ---------------------------------------------------------------------------

/// Timing for the host/guest switch handshakes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    /// How long a kick or end waits for the transport to report the guest
    /// leaving after the switch-back instruction was issued.
    pub departure_grace: Duration,

    /// How long a new host waits for every matched guest to connect.
    pub join_timeout: Duration,

    /// Bound on reporting the end of a match to the matchmaking backend.
    pub end_match_timeout: Duration,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            departure_grace: Duration::from_secs(3),
            join_timeout: Duration::from_secs(30),
            end_match_timeout: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// SwitchState
// ---------------------------------------------------------------------------

/// Where the local instance stands in the switch state machine.
///
/// ```text
///          ┌──(begin_host)──→ Host ─────────────(end / last kick / host lost)──┐
///   None ──┤                                                                    ├──→ None
///          └──(switch_to)──→ Switching ──(ok)──→ Switched ──(end-of-match)─────┘
///                               │
///                               └──(rejected / error)──→ None
/// ```
///
/// - **None**: an independent instance.
/// - **Host**: other instances are (or will be) switched onto this one.
/// - **Switching**: the switch primitive is in progress.
/// - **Switched**: this instance's streams go to another instance's host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwitchState {
    None,
    Host,
    Switching,
    Switched,
}

impl SwitchState {
    /// Returns `true` if moving to `target` is a legal transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::None, Self::Host)
                | (Self::None, Self::Switching)
                | (Self::Switching, Self::Switched)
                | (Self::Switching, Self::None)
                | (Self::Host, Self::None)
                | (Self::Switched, Self::None)
        )
    }

    pub fn is_idle(self) -> bool {
        self == Self::None
    }
}

impl std::fmt::Display for SwitchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Host => write!(f, "Host"),
            Self::Switching => write!(f, "Switching"),
            Self::Switched => write!(f, "Switched"),
        }
    }
}
