//! `Tandem` builder and the match orchestrator.
//!
//! This is the entry point for merging sessions. It ties the layers
//! together: matchmaking backend → switch coordinator → seat registry and
//! reliable call engine, with a driver task feeding transport notifications
//! in once per tick.

use std::sync::Arc;

use tandem_call::{CallEngine, CancelReason, CancelScope, Outcome, run_with_timeout};
use tandem_protocol::{
    EndInfo, Identity, JsonCodec, MatchRequest, MatchSession, OpResult, ResultCode, SeatIndex,
    SwitchToken,
};
use tandem_room::{EndResult, PlatformSession, SwitchCoordinator, SwitchState};
use tandem_seat::SharedSeats;
use tandem_tick::TickScheduler;
use tandem_transport::{Transport, TransportInbox};
use tokio::runtime::Handle;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::to_outcome;
use crate::{
    EndReason, EventBus, MatchState, MatchmakingBackend, MergeEvent, Subscription, TandemConfig,
    TandemError, driver,
};

// ---------------------------------------------------------------------------
// MatchResult
// ---------------------------------------------------------------------------

/// Terminal result of a match request.
///
/// Every caller attached to the same request receives an equal value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub code: ResultCode,
    pub message: String,
    /// The formed group, on success.
    pub session: Option<MatchSession>,
}

impl MatchResult {
    pub fn matched(session: MatchSession) -> Self {
        Self {
            code: ResultCode::Success,
            message: String::new(),
            session: Some(session),
        }
    }

    pub fn failed(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            session: None,
        }
    }

    fn from_outcome<T>(outcome: &Outcome<T>) -> Self {
        let result = outcome.to_op_result();
        Self::failed(result.code, result.message)
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }

    pub fn to_op_result(&self) -> OpResult {
        OpResult::new(self.code, self.message.clone())
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub(crate) struct Core {
    pub(crate) state: MatchState,
    pub(crate) session: Option<MatchSession>,
    pub(crate) identity: Option<Identity>,
}

type PendingMatch = watch::Receiver<Option<MatchResult>>;

/// State shared by the orchestrator handle, the driver task, and running
/// match requests.
///
/// `core` is only locked for short critical sections, never across a call
/// to the backend, the platform, or the transport.
pub(crate) struct Shared<B, P> {
    pub(crate) config: TandemConfig,
    pub(crate) backend: Arc<B>,
    pub(crate) seats: SharedSeats,
    pub(crate) calls: Arc<Mutex<CallEngine>>,
    pub(crate) switch: SwitchCoordinator<P>,
    pub(crate) events: EventBus,
    pub(crate) shutdown: CancellationToken,
    pub(crate) core: Mutex<Core>,
    pub(crate) codec: JsonCodec,
    pending: Mutex<Option<PendingMatch>>,
    /// Cancelled when the local host connection drops while a match
    /// request is running.
    pub(crate) host_lost: Mutex<Option<CancellationToken>>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a [`Tandem`] orchestrator.
///
/// # Example
///
/// ```rust,ignore
/// let (sink, inbox) = tandem_transport::handoff_channel();
/// let transport = Arc::new(LoopbackTransport::new(sink));
///
/// let tandem = TandemBuilder::new()
///     .config(TandemConfig::from_json(&json)?)
///     .build(backend, platform, transport, inbox)?;
/// let result = tandem.request_match(request, CancellationToken::new()).await;
/// ```
#[derive(Debug, Default)]
pub struct TandemBuilder {
    config: TandemConfig,
    shutdown: Option<CancellationToken>,
}

impl TandemBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: TandemConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `token` as the process-wide shutdown token instead of a fresh
    /// one, so several instances can be torn down together.
    pub fn shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Builds the orchestrator and starts its driver task.
    ///
    /// `inbox` must be the receiving half of the hand-off channel whose
    /// sink the transport reports to.
    ///
    /// # Errors
    /// [`TandemError::NoRuntime`] when called outside a Tokio runtime.
    pub fn build<B: MatchmakingBackend, P: PlatformSession>(
        self,
        backend: Arc<B>,
        platform: Arc<P>,
        transport: Arc<dyn Transport>,
        inbox: TransportInbox,
    ) -> Result<Tandem<B, P>, TandemError> {
        let runtime = Handle::try_current().map_err(|_| TandemError::NoRuntime)?;
        let config = self.config.validated();

        let seats = SharedSeats::new(config.seat.clone(), config.event_capacity);
        let calls = Arc::new(Mutex::new(CallEngine::new(transport, config.call.clone())));
        let switch = SwitchCoordinator::new(
            platform,
            seats.clone(),
            Arc::clone(&calls),
            config.switch.clone(),
        );
        let scheduler = TickScheduler::new(config.tick.clone());

        let shared = Arc::new(Shared {
            backend,
            seats,
            calls,
            switch,
            events: EventBus::new(config.event_capacity),
            shutdown: self.shutdown.unwrap_or_default(),
            core: Mutex::new(Core::default()),
            codec: JsonCodec,
            pending: Mutex::new(None),
            host_lost: Mutex::new(None),
            config,
        });

        let driver = runtime.spawn(driver::run(Arc::clone(&shared), inbox, scheduler));
        info!(
            capacity = shared.config.seat.capacity,
            tick_rate_hz = shared.config.tick.tick_rate_hz,
            "tandem started"
        );

        Ok(Tandem {
            shared,
            driver: Mutex::new(Some(driver)),
        })
    }
}

// ---------------------------------------------------------------------------
// Tandem
// ---------------------------------------------------------------------------

/// One instance's session orchestrator.
///
/// Generic over the matchmaking backend and the platform session API, so
/// the mocks replace exactly those two seams. Dropping the orchestrator
/// fires its shutdown token; [`shutdown`](Self::shutdown) does the same and
/// also waits for the driver to stop.
pub struct Tandem<B: MatchmakingBackend, P: PlatformSession> {
    shared: Arc<Shared<B, P>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl<B: MatchmakingBackend, P: PlatformSession> Tandem<B, P> {
    /// Finds a group and merges with it.
    ///
    /// Only legal while the match state is `None`. A call made while a
    /// request is already in flight attaches to that request and receives
    /// the same result; its own `cancel` token is not linked to the shared
    /// request. The first caller's token, the shutdown token, and the local
    /// host connection's disconnect token all cancel the request.
    pub async fn request_match(&self, request: MatchRequest, cancel: CancellationToken) -> MatchResult {
        let mut rx = {
            let mut pending = self.shared.pending.lock().await;
            match pending.as_ref() {
                Some(rx) => {
                    debug!("match request already in flight, attaching");
                    rx.clone()
                }
                None => {
                    if self.shared.shutdown.is_cancelled() {
                        return MatchResult::failed(ResultCode::Cancelled, "instance shutting down");
                    }
                    if let Err(result) = self.shared.accept_request(&request).await {
                        return result;
                    }

                    let (tx, rx) = watch::channel(None);
                    *pending = Some(rx.clone());
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move {
                        let result = Arc::clone(&shared).run_match(request, cancel).await;
                        shared.host_lost.lock().await.take();
                        shared.pending.lock().await.take();
                        info!(code = %result.code, message = %result.message, "match request finished");
                        let _ = tx.send(Some(result));
                    });
                    rx
                }
            }
        };

        let result = rx.wait_for(Option::is_some).await.map(|r| r.clone());
        match result {
            Ok(Some(result)) => result,
            _ => MatchResult::failed(ResultCode::Error, "match request abandoned"),
        }
    }

    /// Ends the merge for every guest. Host only.
    ///
    /// On success the end is reported to the backend, the match state
    /// returns to `None`, and `EndOfMatch { Ended }` is raised. On failure
    /// the state returns to `InGameAsHost` with the room kept for whoever
    /// is still connected.
    pub async fn end_match(&self, info: EndInfo) -> EndResult {
        {
            let mut core = self.shared.core.lock().await;
            if core.state != MatchState::InGameAsHost {
                return EndResult::rejected(
                    ResultCode::InvalidState,
                    format!("cannot end a match in state {}", core.state),
                );
            }
            core.state = MatchState::EndingGame;
        }

        let result = self.shared.switch.end(&info).await;
        if result.room_closed {
            self.shared.finish_hosted(EndReason::Ended).await;
        } else {
            let mut core = self.shared.core.lock().await;
            if core.state == MatchState::EndingGame {
                core.state = MatchState::InGameAsHost;
            }
        }
        result
    }

    /// Sends the guest at `seat` home. Host only. Kicking the last guest
    /// ends the match.
    pub async fn kick(&self, seat: SeatIndex, info: &str) -> EndResult {
        let state = self.shared.core.lock().await.state;
        if state != MatchState::InGameAsHost {
            return EndResult::rejected(
                ResultCode::InvalidState,
                format!("cannot kick in state {state}"),
            );
        }

        let result = self.shared.switch.kick(seat, info).await;
        if result.room_closed {
            self.shared.finish_hosted(EndReason::Ended).await;
        }
        result
    }

    pub fn subscribe(&self) -> Subscription {
        self.shared.events.subscribe()
    }

    pub async fn match_state(&self) -> MatchState {
        self.shared.core.lock().await.state
    }

    pub async fn switch_state(&self) -> SwitchState {
        self.shared.switch.state().await
    }

    pub async fn current_match(&self) -> Option<MatchSession> {
        self.shared.core.lock().await.session.clone()
    }

    /// The local identity, once resolved.
    pub async fn identity(&self) -> Option<Identity> {
        self.shared.core.lock().await.identity.clone()
    }

    /// Seats the host room holds a switch token for.
    pub async fn host_room_seats(&self) -> Vec<SeatIndex> {
        self.shared.switch.host_room_seats().await
    }

    pub fn seats(&self) -> &SharedSeats {
        &self.shared.seats
    }

    pub fn config(&self) -> &TandemConfig {
        &self.shared.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Fires the shutdown token, cancels outstanding calls, stops the
    /// driver, and forgets any merge. Idempotent.
    pub async fn shutdown(&self) {
        let Some(driver) = self.driver.lock().await.take() else {
            return;
        };
        info!("tandem shutting down");
        self.shared.shutdown.cancel();

        let cancelled = self
            .shared
            .calls
            .lock()
            .await
            .cancel_all(CancelReason::Shutdown);
        if cancelled > 0 {
            debug!(cancelled, "outstanding calls cancelled");
        }
        if let Err(err) = driver.await {
            warn!(error = %err, "driver task ended abnormally");
        }

        self.shared.switch.reset().await;
        let mut core = self.shared.core.lock().await;
        core.state = MatchState::None;
        core.session = None;
    }
}

impl<B: MatchmakingBackend, P: PlatformSession> Drop for Tandem<B, P> {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

// ---------------------------------------------------------------------------
// Match flow
// ---------------------------------------------------------------------------

impl<B: MatchmakingBackend, P: PlatformSession> Shared<B, P> {
    /// Moves `None → MatchingUser`, or says why not.
    async fn accept_request(&self, request: &MatchRequest) -> Result<(), MatchResult> {
        let mut core = self.core.lock().await;
        if !core.state.accepts_request() {
            warn!(state = %core.state, "match request rejected");
            return Err(MatchResult::failed(
                ResultCode::InvalidState,
                format!("cannot request a match in state {}", core.state),
            ));
        }
        if let Err(err) = request.pool.validate(self.config.seat.capacity) {
            return Err(MatchResult::failed(err.code(), err.to_string()));
        }
        core.state = MatchState::MatchingUser;
        info!(pool = %request.pool.pool_id, "match requested");
        Ok(())
    }

    async fn run_match(self: Arc<Self>, request: MatchRequest, cancel: CancellationToken) -> MatchResult {
        let scope = self.match_scope(cancel).await;

        let identity = match self.ensure_identity(&scope).await {
            Outcome::Success(identity) => identity,
            failed => return self.abort_match(MatchResult::from_outcome(&failed)).await,
        };

        let backend = Arc::clone(&self.backend);
        let outcome = run_with_timeout(&scope, self.config.match_timeout, |linked| async move {
            to_outcome(backend.request_match(&request, linked).await)
        })
        .await;
        let session = match outcome {
            Outcome::Success(session) => session,
            failed => return self.abort_match(MatchResult::from_outcome(&failed)).await,
        };

        {
            let mut core = self.core.lock().await;
            core.session = Some(session.clone());
            core.state = MatchState::MatchingStream;
        }
        info!(match_id = %session.match_id, is_host = session.is_host, seat = %session.local_seat, "users matched");
        self.events.publish(MergeEvent::UsersMatched(session.clone()));

        if let Some(reason) = scope.reason() {
            return self
                .abort_match(MatchResult::failed(reason.code(), format!("match request {reason}")))
                .await;
        }

        if session.is_host {
            self.start_hosting(&identity, session, &scope).await
        } else {
            self.join_host(session).await
        }
    }

    /// Caller token, shutdown, and the local host connection.
    ///
    /// The host connection may not be bound yet, so besides its own
    /// disconnect token the scope listens to a per-request token that the
    /// driver cancels whenever seat 0 unbinds.
    async fn match_scope(&self, cancel: CancellationToken) -> CancelScope {
        let host_lost = CancellationToken::new();
        *self.host_lost.lock().await = Some(host_lost.clone());
        let scope = CancelScope::new()
            .caller(cancel)
            .shutdown(self.shutdown.clone())
            .disconnect(host_lost);
        match self
            .seats
            .with(|r| r.disconnect_token(SeatIndex::HOST))
            .await
        {
            Some(token) => scope.disconnect(token),
            None => scope,
        }
    }

    async fn ensure_identity(&self, scope: &CancelScope) -> Outcome<Identity> {
        if let Some(identity) = self.core.lock().await.identity.clone() {
            return Outcome::Success(identity);
        }

        let backend = Arc::clone(&self.backend);
        let outcome = run_with_timeout(scope, self.config.match_timeout, |linked| async move {
            to_outcome(backend.resolve_identity(linked).await)
        })
        .await;

        match outcome {
            Outcome::Success(identity) if identity.open_id.is_empty() => {
                Outcome::error("backend resolved an empty identity")
            }
            Outcome::Success(identity) => {
                debug!(open_id = %identity.open_id, "identity resolved");
                self.core.lock().await.identity = Some(identity.clone());
                Outcome::Success(identity)
            }
            failed => failed,
        }
    }

    async fn start_hosting(
        &self,
        identity: &Identity,
        session: MatchSession,
        scope: &CancelScope,
    ) -> MatchResult {
        let seats = self.seats.clone();
        let host_bound = run_with_timeout(scope, self.config.switch.join_timeout, |_| async move {
            seats.wait_until_occupied(&[SeatIndex::HOST]).await;
            Outcome::Success(())
        })
        .await;
        match host_bound {
            Outcome::Success(()) => {}
            Outcome::Cancelled(CancelReason::TimedOut) => {
                warn!(match_id = %session.match_id, "no local host connection to host on");
                return self
                    .abort_match(MatchResult::failed(
                        ResultCode::Error,
                        "host connection is not bound",
                    ))
                    .await;
            }
            failed => return self.abort_match(MatchResult::from_outcome(&failed)).await,
        }

        if let Err(err) = self
            .switch
            .begin_host(identity, session.match_id.clone())
            .await
        {
            return self
                .abort_match(MatchResult::failed(
                    ResultCode::Error,
                    format!("could not become host: {err}"),
                ))
                .await;
        }

        let guests = session.guest_seats();
        self.seats.expect(&guests).await;
        info!(match_id = %session.match_id, guests = guests.len(), "hosting, waiting for guests");

        let seats = self.seats.clone();
        let waiting = guests.clone();
        let joined = run_with_timeout(scope, self.config.switch.join_timeout, |_| async move {
            seats.wait_until_occupied(&waiting).await;
            Outcome::Success(())
        })
        .await;

        if joined.is_success() {
            if self.switch.state().await != SwitchState::Host {
                return self
                    .abort_match(MatchResult::failed(
                        ResultCode::Error,
                        "host room lost while waiting for guests",
                    ))
                    .await;
            }
            self.core.lock().await.state = MatchState::InGameAsHost;
            info!(match_id = %session.match_id, "every guest joined");
            return MatchResult::matched(session);
        }

        match joined {
            Outcome::Cancelled(CancelReason::TimedOut) => {
                warn!(match_id = %session.match_id, "not every guest joined in time");
                self.unwind_hosting("not every guest joined in time").await;
                self.events.publish(MergeEvent::EndOfMatch {
                    match_id: session.match_id,
                    reason: EndReason::JoinTimeout,
                });
                self.abort_match(MatchResult::failed(
                    ResultCode::Timeout,
                    "guests did not join in time",
                ))
                .await
            }
            failed => {
                self.unwind_hosting("match cancelled").await;
                self.abort_match(MatchResult::from_outcome(&failed)).await
            }
        }
    }

    /// Sends home whoever already joined and drops the host room.
    async fn unwind_hosting(&self, info: &str) {
        let result = self.switch.end(&EndInfo::all(info)).await;
        if !result.is_success() {
            warn!(code = %result.code, message = %result.message, "could not end the merge for every guest");
        }
        self.switch.reset().await;
        self.seats.forget_expected().await;
    }

    async fn join_host(&self, session: MatchSession) -> MatchResult {
        let Some(host) = session.host_participant() else {
            return self
                .abort_match(MatchResult::failed(
                    ResultCode::Error,
                    "match has no host participant",
                ))
                .await;
        };
        let token = match SwitchToken::from_participant(host, &self.codec) {
            Ok(token) => token,
            Err(err) => {
                return self
                    .abort_match(MatchResult::failed(
                        ResultCode::Error,
                        format!("cannot build host switch token: {err}"),
                    ))
                    .await;
            }
        };
        let own_token = session
            .local_participant()
            .and_then(|p| SwitchToken::from_participant(p, &self.codec).ok());

        match self
            .switch
            .switch_to(&token, session.local_seat, &session.match_id, own_token.as_ref())
            .await
        {
            Ok(()) => {
                self.core.lock().await.state = MatchState::InConnectOtherRoom;
                MatchResult::matched(session)
            }
            Err(err) => {
                self.abort_match(MatchResult::failed(
                    ResultCode::Error,
                    format!("switch to host failed: {err}"),
                ))
                .await
            }
        }
    }

    /// Rolls local state back to `None`. Whatever the backend did is left
    /// alone.
    async fn abort_match(&self, result: MatchResult) -> MatchResult {
        let mut core = self.core.lock().await;
        warn!(state = %core.state, code = %result.code, message = %result.message, "match request failed");
        core.state = MatchState::None;
        core.session = None;
        result
    }

    /// The host room closed after an end or the last kick.
    pub(crate) async fn finish_hosted(&self, reason: EndReason) {
        let session = {
            let mut core = self.core.lock().await;
            core.state = MatchState::None;
            core.session.take()
        };
        let Some(session) = session else {
            return;
        };

        let backend = Arc::clone(&self.backend);
        let match_id = session.match_id.clone();
        let scope = CancelScope::new().shutdown(self.shutdown.clone());
        let reported = run_with_timeout(&scope, self.config.switch.end_match_timeout, |linked| async move {
            to_outcome(backend.end_match(&match_id, linked).await)
        })
        .await;
        if reported.is_success() {
            debug!(match_id = %session.match_id, "end reported to backend");
        } else {
            warn!(match_id = %session.match_id, code = %reported.result_code(), "could not report end to backend");
        }

        info!(match_id = %session.match_id, %reason, "match over");
        self.events.publish(MergeEvent::EndOfMatch {
            match_id: session.match_id,
            reason,
        });
    }
}
