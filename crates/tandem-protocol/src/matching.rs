//! Matchmaking values: what is asked for, and what comes back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Identity, MatchId, ProtocolError, SeatIndex};

// ---------------------------------------------------------------------------
// Request side
// ---------------------------------------------------------------------------

/// Which pool to match in and what shape of group to form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Backend pool identifier.
    pub pool_id: String,
    /// Number of teams in one match.
    #[serde(default = "default_team_count")]
    pub team_count: usize,
    /// Participants per team.
    #[serde(default = "default_team_size")]
    pub team_size: usize,
}

fn default_team_count() -> usize {
    1
}

fn default_team_size() -> usize {
    4
}

impl PoolConfig {
    pub fn new(pool_id: impl Into<String>) -> Self {
        Self {
            pool_id: pool_id.into(),
            team_count: default_team_count(),
            team_size: default_team_size(),
        }
    }

    /// Total participants a full match holds, or `None` if that does not
    /// fit in a `usize`.
    pub fn group_size(&self) -> Option<usize> {
        self.team_count.checked_mul(self.team_size)
    }

    /// Rejects configs that can never be satisfied by `capacity` seats.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidArgument`] for an empty pool id, a zero
    /// team count or size, or a group larger than the seat capacity.
    pub fn validate(&self, capacity: usize) -> Result<(), ProtocolError> {
        if self.pool_id.trim().is_empty() {
            return Err(ProtocolError::InvalidArgument("empty pool id".into()));
        }
        if self.team_count == 0 || self.team_size == 0 {
            return Err(ProtocolError::InvalidArgument(format!(
                "team shape {}x{} is empty",
                self.team_count, self.team_size
            )));
        }
        match self.group_size() {
            Some(size) if size <= capacity => {}
            Some(size) => {
                return Err(ProtocolError::InvalidArgument(format!(
                    "group of {size} exceeds seat capacity {capacity}"
                )));
            }
            None => {
                return Err(ProtocolError::InvalidArgument(format!(
                    "team shape {}x{} overflows",
                    self.team_count, self.team_size
                )));
            }
        }
        Ok(())
    }
}

/// A complete matchmaking request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub pool: PoolConfig,
    /// Opaque payload the backend hands back to every participant of the
    /// formed group. Tandem puts the encoded switch-token seed here.
    #[serde(default)]
    pub extra: Vec<u8>,
}

impl MatchRequest {
    pub fn new(pool: PoolConfig) -> Self {
        Self {
            pool,
            extra: Vec::new(),
        }
    }

    pub fn with_extra(mut self, extra: Vec<u8>) -> Self {
        self.extra = extra;
        self
    }
}

// ---------------------------------------------------------------------------
// Result side
// ---------------------------------------------------------------------------

/// One participant of a formed group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchParticipant {
    /// Seat this participant occupies in the merged session.
    pub seat: SeatIndex,
    pub identity: Identity,
    /// The participant's own request `extra`, relayed by the backend.
    #[serde(default)]
    pub extra: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchTeam {
    pub participants: Vec<MatchParticipant>,
}

/// The outcome of one successful matchmaking attempt.
///
/// Created when the backend reports success and discarded once the merge
/// ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSession {
    pub match_id: MatchId,
    /// Whether the local participant was designated host.
    pub is_host: bool,
    /// The seat the local participant takes in the merged session.
    pub local_seat: SeatIndex,
    /// The host's identity.
    pub host: Identity,
    pub teams: Vec<MatchTeam>,
}

impl MatchSession {
    /// All participants across every team.
    pub fn participants(&self) -> impl Iterator<Item = &MatchParticipant> {
        self.teams.iter().flat_map(|t| t.participants.iter())
    }

    /// The participant whose identity matches [`host`](Self::host).
    pub fn host_participant(&self) -> Option<&MatchParticipant> {
        self.participants()
            .find(|p| p.identity.open_id == self.host.open_id)
    }

    /// The participant seated at [`local_seat`](Self::local_seat).
    pub fn local_participant(&self) -> Option<&MatchParticipant> {
        self.participants().find(|p| p.seat == self.local_seat)
    }

    /// Seats the host expects guests to join, sorted and de-duplicated.
    pub fn guest_seats(&self) -> Vec<SeatIndex> {
        let host_seat = self.host_participant().map(|p| p.seat);
        let mut seats: Vec<SeatIndex> = self
            .participants()
            .map(|p| p.seat)
            .filter(|s| Some(*s) != host_seat && !s.is_host())
            .collect();
        seats.sort();
        seats.dedup();
        seats
    }
}

// ---------------------------------------------------------------------------
// EndInfo
// ---------------------------------------------------------------------------

/// The message shown to guests when the host ends the merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndInfo {
    /// The same text for every guest.
    All(String),
    /// Per-seat text. Seats without an entry get an empty message.
    PerSeat(BTreeMap<SeatIndex, String>),
}

impl EndInfo {
    pub fn all(info: impl Into<String>) -> Self {
        Self::All(info.into())
    }

    pub fn for_seat(&self, seat: SeatIndex) -> &str {
        match self {
            Self::All(info) => info,
            Self::PerSeat(map) => map.get(&seat).map(String::as_str).unwrap_or(""),
        }
    }
}

impl Default for EndInfo {
    fn default() -> Self {
        Self::All(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(seat: u8, open_id: &str) -> MatchParticipant {
        MatchParticipant {
            seat: SeatIndex(seat),
            identity: Identity::new(open_id, ""),
            extra: Vec::new(),
        }
    }

    fn session() -> MatchSession {
        MatchSession {
            match_id: MatchId::new("m-1"),
            is_host: false,
            local_seat: SeatIndex(2),
            host: Identity::new("host", ""),
            teams: vec![
                MatchTeam {
                    participants: vec![participant(0, "host"), participant(1, "a")],
                },
                MatchTeam {
                    participants: vec![participant(2, "me"), participant(3, "b")],
                },
            ],
        }
    }

    #[test]
    fn test_pool_config_validate_accepts_four_seats() {
        let pool = PoolConfig::new("duo");
        assert!(pool.validate(4).is_ok());
    }

    #[test]
    fn test_pool_config_validate_rejects_empty_pool() {
        let pool = PoolConfig::new("  ");
        assert!(matches!(
            pool.validate(4),
            Err(ProtocolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_pool_config_validate_rejects_oversized_group() {
        let pool = PoolConfig {
            pool_id: "big".into(),
            team_count: 2,
            team_size: 3,
        };
        let err = pool.validate(4).unwrap_err();
        assert_eq!(err.code(), crate::ResultCode::InvalidArgument);
    }

    #[test]
    fn test_pool_config_validate_rejects_overflowing_shape() {
        let pool: PoolConfig = serde_json::from_value(serde_json::json!({
            "pool_id": "huge",
            "team_count": usize::MAX / 2 + 1,
            "team_size": 2,
        }))
        .unwrap();
        assert_eq!(pool.group_size(), None);
        assert!(matches!(
            pool.validate(4),
            Err(ProtocolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_match_session_finds_host_and_local() {
        let s = session();
        assert_eq!(s.host_participant().unwrap().seat, SeatIndex(0));
        assert_eq!(s.local_participant().unwrap().identity.open_id, "me");
        assert_eq!(s.participants().count(), 4);
    }

    #[test]
    fn test_match_session_guest_seats_excludes_host() {
        assert_eq!(
            session().guest_seats(),
            vec![SeatIndex(1), SeatIndex(2), SeatIndex(3)]
        );
    }

    #[test]
    fn test_end_info_for_seat_falls_back_to_empty() {
        let mut map = BTreeMap::new();
        map.insert(SeatIndex(1), "gg".to_string());
        let info = EndInfo::PerSeat(map);
        assert_eq!(info.for_seat(SeatIndex(1)), "gg");
        assert_eq!(info.for_seat(SeatIndex(2)), "");
        assert_eq!(EndInfo::all("bye").for_seat(SeatIndex(3)), "bye");
    }
}
