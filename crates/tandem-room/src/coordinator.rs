//! The switch coordinator: host rooms, switching onto a host, and the
//! two-phase handshake that sends guests home.
//!
//! Ending the merge for a guest takes two steps, always in this order:
//!
//! 1. **Transfer**: an [`MergeMessage::EndOfMatch`] goes to the guest
//!    through the reliable call engine.
//! 2. **Switch back**: the platform is told to return the guest's streams
//!    to its own instance.
//!
//! If step 1 fails, step 2 is never attempted: a guest is never switched
//! back without having been told. After step 2 the coordinator waits a
//! bounded grace period for the transport to report the guest leaving.
//! That wait is best-effort: a lost departure notification is logged, and
//! the handshake still counts as successful.

use std::sync::Arc;

use futures_util::future::join_all;
use tandem_call::CallEngine;
use tandem_protocol::{
    Codec, EndInfo, Identity, JsonCodec, MatchId, MergeMessage, OpResult, ResultCode, SeatIndex,
    SwitchToken,
};
use tandem_seat::{ConnectionState, SharedSeats};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    EndTarget, HostRoom, PlatformSession, SwitchConfig, SwitchError, SwitchState, SwitchToError,
};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// The host a guest instance is currently switched onto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSwitch {
    pub token: SwitchToken,
    pub seat: SeatIndex,
    pub match_id: MatchId,
}

/// How the end handshake went for one guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatEndOutcome {
    pub seat: SeatIndex,
    pub code: ResultCode,
    pub message: String,
}

impl SeatEndOutcome {
    fn ok(seat: SeatIndex) -> Self {
        Self {
            seat,
            code: ResultCode::Success,
            message: String::new(),
        }
    }

    fn failed(seat: SeatIndex, code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            seat,
            code,
            message: message.into(),
        }
    }
}

/// Result of a kick or an end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndResult {
    pub code: ResultCode,
    pub message: String,
    /// One entry per guest a handshake was attempted for.
    pub seats: Vec<SeatEndOutcome>,
    /// The host room was closed and the coordinator is back to `None`.
    pub room_closed: bool,
}

impl EndResult {
    /// Combines per-guest outcomes: `Success` if every guest succeeded
    /// (vacuously so for none), `Timeout` if every guest timed out, and
    /// `Error` for anything else.
    pub fn aggregate(seats: Vec<SeatEndOutcome>) -> Self {
        let (code, message) = if seats.iter().all(|s| s.code.is_success()) {
            (ResultCode::Success, String::new())
        } else if seats.iter().all(|s| s.code == ResultCode::Timeout) {
            (
                ResultCode::Timeout,
                format!("all {} guest(s) timed out", seats.len()),
            )
        } else {
            let failed: Vec<String> = seats
                .iter()
                .filter(|s| !s.code.is_success())
                .map(|s| format!("{} {}: {}", s.seat, s.code, s.message))
                .collect();
            (
                ResultCode::Error,
                format!(
                    "{} of {} guest(s) failed: {}",
                    failed.len(),
                    seats.len(),
                    failed.join("; ")
                ),
            )
        };
        Self {
            code,
            message,
            seats,
            room_closed: false,
        }
    }

    /// Rejected before any handshake started.
    pub fn rejected(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            seats: Vec::new(),
            room_closed: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }

    pub fn to_op_result(&self) -> OpResult {
        OpResult::new(self.code, self.message.clone())
    }
}

// ---------------------------------------------------------------------------
// SwitchCoordinator
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Inner {
    state: SwitchState,
    room: Option<HostRoom>,
    active: Option<ActiveSwitch>,
}

impl Inner {
    /// Every state change goes through here. Staying put is always allowed.
    fn set_state(&mut self, target: SwitchState) {
        debug_assert!(
            self.state == target || self.state.can_transition_to(target),
            "illegal switch transition {} -> {target}",
            self.state
        );
        self.state = target;
    }
}

/// Owns the switch state, the host room, and the active switch.
///
/// State is kept behind a short-lived lock that is never held while the
/// platform, the transport, or a guest is being waited on.
pub struct SwitchCoordinator<P> {
    platform: Arc<P>,
    seats: SharedSeats,
    calls: Arc<Mutex<CallEngine>>,
    codec: JsonCodec,
    config: SwitchConfig,
    inner: Mutex<Inner>,
}

impl<P: PlatformSession> SwitchCoordinator<P> {
    pub fn new(
        platform: Arc<P>,
        seats: SharedSeats,
        calls: Arc<Mutex<CallEngine>>,
        config: SwitchConfig,
    ) -> Self {
        Self {
            platform,
            seats,
            calls,
            codec: JsonCodec,
            config,
            inner: Mutex::new(Inner {
                state: SwitchState::None,
                room: None,
                active: None,
            }),
        }
    }

    // -- Host side -----------------------------------------------------------

    /// Makes this instance the host of `match_id`.
    ///
    /// # Errors
    /// - [`SwitchError::MissingIdentity`] if `identity` is unresolved
    /// - [`SwitchError::InvalidState`] unless the state is `None` with no room
    /// - [`SwitchError::HostRefused`] if the platform declines
    pub async fn begin_host(&self, identity: &Identity, match_id: MatchId) -> Result<(), SwitchError> {
        if identity.open_id.is_empty() {
            return Err(SwitchError::MissingIdentity);
        }
        self.require_idle().await.map_err(SwitchError::InvalidState)?;

        let Some(handle) = self.platform.become_host(identity).await else {
            warn!(%match_id, "platform refused to create a host session");
            return Err(SwitchError::HostRefused);
        };

        let mut inner = self.inner.lock().await;
        if inner.state != SwitchState::None || inner.room.is_some() {
            warn!(state = %inner.state, "state changed while becoming host");
            return Err(SwitchError::InvalidState(inner.state));
        }
        info!(%match_id, open_id = %identity.open_id, "hosting");
        inner.room = Some(HostRoom::new(handle, match_id));
        inner.set_state(SwitchState::Host);
        Ok(())
    }

    /// Ends the merge for the guest at `seat`.
    ///
    /// Rejected with `InvalidState` unless hosting, and with
    /// `InvalidArgument` (nothing sent) unless `seat` holds a connected
    /// guest. Closes the room if no guest is left afterwards.
    pub async fn kick(&self, seat: SeatIndex, info: &str) -> EndResult {
        let match_id = match self.hosted_match_id().await {
            Ok(id) => id,
            Err(state) => {
                return EndResult::rejected(
                    ResultCode::InvalidState,
                    format!("cannot kick while in switch state {state}"),
                );
            }
        };

        let state = self.seats.with(|r| r.state(seat)).await;
        if seat.is_host() || state != ConnectionState::Connected {
            warn!(%seat, ?state, "kick rejected, no connected guest at seat");
            return EndResult::rejected(
                ResultCode::InvalidArgument,
                format!("{seat} has no connected guest"),
            );
        }

        info!(%seat, %match_id, "kicking guest");
        let outcome = self.end_seat(seat, info, &match_id).await;
        let mut result = EndResult::aggregate(vec![outcome]);

        // The kicked seat counts as gone even if its departure was never
        // reported within the grace period.
        let last_guest = self
            .seats
            .with(|r| r.occupied_guests().iter().all(|s| *s == seat))
            .await;
        if result.is_success() && last_guest {
            self.close_room("last guest kicked").await;
            result.room_closed = true;
        }
        result
    }

    /// Ends the merge for every connected guest, in parallel.
    ///
    /// On success the room is closed. With no guests connected this
    /// succeeds immediately.
    pub async fn end(&self, info: &EndInfo) -> EndResult {
        let match_id = match self.hosted_match_id().await {
            Ok(id) => id,
            Err(state) => {
                return EndResult::rejected(
                    ResultCode::InvalidState,
                    format!("cannot end while in switch state {state}"),
                );
            }
        };

        let guests = self.seats.with(|r| r.connected_guests()).await;
        info!(%match_id, guests = guests.len(), "ending merge");

        let outcomes = join_all(
            guests
                .iter()
                .map(|seat| self.end_seat(*seat, info.for_seat(*seat), &match_id)),
        )
        .await;
        let mut result = EndResult::aggregate(outcomes);

        if result.is_success() {
            self.close_room("merge ended").await;
            result.room_closed = true;
        } else {
            warn!(%match_id, code = %result.code, message = %result.message, "end did not complete for every guest");
        }
        result
    }

    /// Runs the two-phase handshake for one guest.
    async fn end_seat(&self, seat: SeatIndex, info: &str, match_id: &MatchId) -> SeatEndOutcome {
        let token = match self.switch_token_for(seat).await {
            Ok(token) => token,
            Err(err) => {
                warn!(%seat, error = %err, "no switch token for guest");
                return SeatEndOutcome::failed(seat, ResultCode::Error, format!("switch token unavailable: {err}"));
            }
        };

        let Some(user_id) = self.seats.with(|r| r.occupant(seat).cloned()).await else {
            return SeatEndOutcome::failed(seat, ResultCode::InvalidArgument, "guest already gone");
        };
        if let Err(err) = self.seats.mark_disconnecting(seat).await {
            return SeatEndOutcome::failed(seat, err.code(), err.to_string());
        }

        // Phase 1: tell the guest.
        let message = MergeMessage::EndOfMatch {
            match_id: match_id.clone(),
            info: info.to_string(),
            token,
        };
        let payload = match self.codec.encode(&message) {
            Ok(payload) => payload,
            Err(err) => {
                self.restore(seat).await;
                return SeatEndOutcome::failed(seat, err.code(), err.to_string());
            }
        };
        let handle = self.calls.lock().await.call_default(seat, payload);
        let response = handle.await;
        if !response.is_success() {
            warn!(%seat, code = %response.code, message = %response.message, "end-of-match not delivered, guest not switched back");
            self.restore(seat).await;
            return SeatEndOutcome::failed(seat, response.code, response.message);
        }

        // Phase 2: switch the guest back.
        match self.platform.send_end_of_match(EndTarget::Seat(seat)).await {
            Ok(responses) => {
                if let Some(bad) = responses.iter().find(|r| !r.is_ok()) {
                    warn!(%seat, code = bad.code, message = %bad.message, "switch-back refused");
                    self.restore(seat).await;
                    return SeatEndOutcome::failed(
                        seat,
                        ResultCode::Error,
                        format!("switch-back refused ({}): {}", bad.code, bad.message),
                    );
                }
            }
            Err(err) => {
                warn!(%seat, error = %err, "switch-back failed");
                self.restore(seat).await;
                return SeatEndOutcome::failed(seat, ResultCode::Error, err.to_string());
            }
        }

        let grace = self.config.departure_grace;
        if tokio::time::timeout(grace, self.seats.wait_until_vacated(seat, &user_id))
            .await
            .is_err()
        {
            warn!(%seat, %user_id, grace_ms = grace.as_millis() as u64, "guest departure not observed within grace period");
        } else {
            debug!(%seat, %user_id, "guest departed");
        }
        SeatEndOutcome::ok(seat)
    }

    /// Read-through switch token cache.
    async fn switch_token_for(&self, seat: SeatIndex) -> Result<SwitchToken, SwitchError> {
        let handle = {
            let inner = self.inner.lock().await;
            let room = inner
                .room
                .as_ref()
                .ok_or(SwitchError::InvalidState(inner.state))?;
            if let Some(token) = room.cached_token(seat) {
                return Ok(token.clone());
            }
            room.handle().clone()
        };

        let token = self.platform.fetch_switch_token(&handle, seat).await?;

        let mut inner = self.inner.lock().await;
        let state = inner.state;
        match inner.room.as_mut() {
            Some(room) => Ok(room.cache_token(seat, token)),
            None => Err(SwitchError::InvalidState(state)),
        }
    }

    async fn restore(&self, seat: SeatIndex) {
        if let Err(err) = self.seats.restore_connected(seat).await {
            debug!(%seat, error = %err, "guest left before its connection could be restored");
        }
    }

    async fn close_room(&self, why: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(room) = inner.room.take() {
            info!(match_id = %room.match_id(), reason = why, "host room closed");
        }
        inner.set_state(SwitchState::None);
    }

    async fn hosted_match_id(&self) -> Result<MatchId, SwitchState> {
        let inner = self.inner.lock().await;
        match (&inner.state, &inner.room) {
            (SwitchState::Host, Some(room)) => Ok(room.match_id().clone()),
            _ => Err(inner.state),
        }
    }

    async fn require_idle(&self) -> Result<(), SwitchState> {
        let inner = self.inner.lock().await;
        if inner.state == SwitchState::None && inner.room.is_none() && inner.active.is_none() {
            Ok(())
        } else {
            Err(inner.state)
        }
    }

    // -- Guest side ----------------------------------------------------------

    /// Switches this instance onto the host named by `token`.
    ///
    /// `own_token` is the token other instances would use to switch onto
    /// this one; presenting it is a self-switch and is rejected.
    pub async fn switch_to(
        &self,
        token: &SwitchToken,
        seat: SeatIndex,
        match_id: &MatchId,
        own_token: Option<&SwitchToken>,
    ) -> Result<(), SwitchToError> {
        if !token.is_well_formed() {
            return Err(SwitchToError::InvalidToken);
        }
        if own_token == Some(token) {
            warn!(%match_id, "refusing to switch onto own session");
            return Err(SwitchToError::InvalidToken);
        }
        if seat.is_host() || !self.seats.with(|r| r.contains(seat)).await {
            return Err(SwitchToError::InvalidIndex(seat));
        }

        {
            let mut inner = self.inner.lock().await;
            if !inner.state.is_idle() || inner.room.is_some() {
                return Err(SwitchToError::InvalidState(inner.state));
            }
            inner.set_state(SwitchState::Switching);
        }
        info!(%seat, %match_id, host = %token.host_open_id, "switching onto host");

        let result = self.platform.switch_to(token, seat, match_id).await;

        let mut inner = self.inner.lock().await;
        if inner.state != SwitchState::Switching {
            // Reset or host connection lost while the platform was busy.
            warn!(state = %inner.state, %match_id, "switch abandoned while in progress");
            return Err(SwitchToError::InvalidState(inner.state));
        }
        match result {
            Ok(resp) if resp.is_ok() => {
                inner.set_state(SwitchState::Switched);
                inner.active = Some(ActiveSwitch {
                    token: token.clone(),
                    seat,
                    match_id: match_id.clone(),
                });
                info!(%seat, %match_id, "switched");
                Ok(())
            }
            Ok(resp) => {
                inner.set_state(SwitchState::None);
                warn!(code = resp.code, message = %resp.message, "switch rejected by platform");
                Err(SwitchToError::Rejected {
                    code: resp.code,
                    message: resp.message,
                })
            }
            Err(err) => {
                inner.set_state(SwitchState::None);
                warn!(error = %err, "switch failed");
                Err(SwitchToError::Error(err.to_string()))
            }
        }
    }

    /// Handles a merge message received as a guest.
    ///
    /// An end-of-match is accepted only while switched and only if it
    /// carries the token this instance switched with. Returns the match id
    /// when it was accepted.
    pub async fn on_guest_message(&self, message: MergeMessage) -> Option<MatchId> {
        let MergeMessage::EndOfMatch {
            match_id,
            info,
            token,
        } = message;

        let mut inner = self.inner.lock().await;
        let accepted = inner.state == SwitchState::Switched
            && inner.active.as_ref().is_some_and(|a| a.token == token);
        if !accepted {
            warn!(%match_id, state = %inner.state, "ignoring end-of-match from a host this instance is not switched onto");
            return None;
        }
        inner.active = None;
        inner.set_state(SwitchState::None);
        info!(%match_id, %info, "host ended the merge");
        Some(match_id)
    }

    // -- Either side ---------------------------------------------------------

    /// The local host connection dropped: the host room or the active
    /// switch is gone. Returns the state that was left, if any.
    pub async fn on_host_connection_lost(&self) -> Option<SwitchState> {
        let mut inner = self.inner.lock().await;
        let previous = inner.state;
        if previous.is_idle() && inner.room.is_none() && inner.active.is_none() {
            return None;
        }
        inner.room = None;
        inner.active = None;
        inner.set_state(SwitchState::None);
        warn!(%previous, "local connection lost, switch state cleared");
        Some(previous)
    }

    /// Forgets any room or switch without talking to anyone. Used to roll
    /// back and at shutdown.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        if inner.room.is_some() || inner.active.is_some() || !inner.state.is_idle() {
            debug!(state = %inner.state, "switch state reset");
        }
        inner.room = None;
        inner.active = None;
        inner.set_state(SwitchState::None);
    }

    // -- Queries -------------------------------------------------------------

    pub async fn state(&self) -> SwitchState {
        self.inner.lock().await.state
    }

    /// Seats the host room has cached a switch token for.
    pub async fn host_room_seats(&self) -> Vec<SeatIndex> {
        self.inner
            .lock()
            .await
            .room
            .as_ref()
            .map(HostRoom::token_seats)
            .unwrap_or_default()
    }

    pub async fn has_host_room(&self) -> bool {
        self.inner.lock().await.room.is_some()
    }

    pub async fn active_switch(&self) -> Option<ActiveSwitch> {
        self.inner.lock().await.active.clone()
    }

    pub fn seats(&self) -> &SharedSeats {
        &self.seats
    }

    pub fn config(&self) -> &SwitchConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(seat: u8, code: ResultCode) -> SeatEndOutcome {
        SeatEndOutcome::failed(SeatIndex(seat), code, "")
    }

    #[test]
    fn test_aggregate_no_guests_is_success() {
        assert_eq!(EndResult::aggregate(Vec::new()).code, ResultCode::Success);
    }

    #[test]
    fn test_aggregate_all_success_is_success() {
        let r = EndResult::aggregate(vec![
            outcome(1, ResultCode::Success),
            outcome(2, ResultCode::Success),
        ]);
        assert!(r.is_success());
    }

    #[test]
    fn test_aggregate_all_timeout_is_timeout() {
        let r = EndResult::aggregate(vec![
            outcome(1, ResultCode::Timeout),
            outcome(2, ResultCode::Timeout),
        ]);
        assert_eq!(r.code, ResultCode::Timeout);
    }

    #[test]
    fn test_aggregate_two_acks_one_timeout_is_error() {
        let r = EndResult::aggregate(vec![
            outcome(1, ResultCode::Success),
            outcome(2, ResultCode::Success),
            outcome(3, ResultCode::Timeout),
        ]);
        assert_eq!(r.code, ResultCode::Error);
        assert!(r.message.starts_with("1 of 3 guest(s) failed"));
        assert!(r.message.contains("S-3"));
    }

    fn inner(state: SwitchState) -> Inner {
        Inner {
            state,
            room: None,
            active: None,
        }
    }

    #[test]
    fn test_set_state_follows_legal_transitions() {
        let mut i = inner(SwitchState::None);
        i.set_state(SwitchState::Switching);
        i.set_state(SwitchState::Switched);
        i.set_state(SwitchState::None);
        i.set_state(SwitchState::None);
        assert_eq!(i.state, SwitchState::None);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "illegal switch transition")]
    fn test_set_state_rejects_host_to_switching() {
        inner(SwitchState::Host).set_state(SwitchState::Switching);
    }

    #[test]
    fn test_aggregate_timeout_and_error_is_error() {
        let r = EndResult::aggregate(vec![
            outcome(1, ResultCode::Timeout),
            outcome(2, ResultCode::Error),
        ]);
        assert_eq!(r.code, ResultCode::Error);
    }
}
