//! The host room: the record of an active "I am hosting" state.

use std::collections::HashMap;
use std::time::Instant;

use tandem_protocol::{MatchId, SeatIndex, SwitchToken};

use crate::HostHandle;

/// Created once per successful `begin_host`, dropped when the merge ends.
///
/// Holds the per-seat switch tokens. Tokens are fetched from the platform
/// the first time a seat needs one and reused after that; only the switch
/// coordinator writes to the cache.
#[derive(Debug, Clone)]
pub struct HostRoom {
    handle: HostHandle,
    match_id: MatchId,
    tokens: HashMap<SeatIndex, SwitchToken>,
    created_at: Instant,
}

impl HostRoom {
    pub fn new(handle: HostHandle, match_id: MatchId) -> Self {
        Self {
            handle,
            match_id,
            tokens: HashMap::new(),
            created_at: Instant::now(),
        }
    }

    pub fn handle(&self) -> &HostHandle {
        &self.handle
    }

    pub fn match_id(&self) -> &MatchId {
        &self.match_id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn cached_token(&self, seat: SeatIndex) -> Option<&SwitchToken> {
        self.tokens.get(&seat)
    }

    /// Caches `token` for `seat` unless one is already cached, and returns
    /// whichever ends up cached. A concurrent fetch for the same seat thus
    /// never replaces the first token handed out.
    pub fn cache_token(&mut self, seat: SeatIndex, token: SwitchToken) -> SwitchToken {
        self.tokens.entry(seat).or_insert(token).clone()
    }

    /// Seats with a cached token, sorted.
    pub fn token_seats(&self) -> Vec<SeatIndex> {
        let mut seats: Vec<SeatIndex> = self.tokens.keys().copied().collect();
        seats.sort();
        seats
    }
}
