//! The matchmaking backend seam.
//!
//! Tandem does not pair participants itself: it asks a remote backend to
//! resolve the local identity and to form a group from a pool. The backend
//! is chosen at construction time, a real client in production and
//! [`MockBackend`] in tests and demos.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tandem_call::{CancelReason, OpError, Outcome};
use tandem_protocol::{Identity, MatchId, MatchRequest, MatchSession, ResultCode};
use tokio_util::sync::CancellationToken;

/// A failure reported by the matchmaking backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The request observed its cancellation token.
    #[error("backend request cancelled")]
    Cancelled,

    /// The backend gave up waiting for a group.
    #[error("backend request timed out")]
    Timeout,

    /// The backend answered with a failure code.
    #[error("backend rejected request ({code}): {message}")]
    Rejected { code: i32, message: String },

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    pub fn code(&self) -> ResultCode {
        match self {
            Self::Cancelled => ResultCode::Cancelled,
            Self::Timeout => ResultCode::Timeout,
            Self::Rejected { .. } | Self::Unavailable(_) => ResultCode::Error,
        }
    }
}

/// Maps a backend reply onto the three-outcome contract.
///
/// A backend-side cancellation is attributed to the caller; the scope that
/// ran the call reports its own reason first if it fired.
pub(crate) fn to_outcome<T>(result: Result<T, BackendError>) -> Outcome<T> {
    match result {
        Ok(value) => Outcome::Success(value),
        Err(BackendError::Cancelled) => Outcome::Cancelled(CancelReason::Caller),
        Err(BackendError::Timeout) => Outcome::Cancelled(CancelReason::TimedOut),
        Err(err) => Outcome::Error(OpError::with_code(err.to_string(), err.code())),
    }
}

/// The remote matchmaking service.
///
/// Every call receives a cancellation token and should return
/// [`BackendError::Cancelled`] promptly once it fires.
pub trait MatchmakingBackend: Send + Sync + 'static {
    /// Resolves the local participant's public identity.
    fn resolve_identity(
        &self,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Identity, BackendError>> + Send;

    /// Waits for the backend to form a group from `request.pool`.
    fn request_match(
        &self,
        request: &MatchRequest,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<MatchSession, BackendError>> + Send;

    /// Reports that the merge for `match_id` is over.
    fn end_match(
        &self,
        match_id: &MatchId,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

// ---------------------------------------------------------------------------
// MockBackend
// ---------------------------------------------------------------------------

struct Script {
    identity: Result<Identity, BackendError>,
    matches: VecDeque<Result<MatchSession, BackendError>>,
    end_result: Result<(), BackendError>,
    latency: Duration,
    requests: Vec<MatchRequest>,
    ended: Vec<MatchId>,
}

/// A scripted backend.
///
/// Match replies are queued with [`push_match`](Self::push_match) and
/// handed out one per request; a request with nothing queued fails as
/// unavailable. Every reply is delayed by the configured latency, during
/// which the call honours its cancellation token.
pub struct MockBackend {
    script: Mutex<Script>,
    identity_calls: AtomicUsize,
    request_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new(identity: Identity) -> Self {
        Self {
            script: Mutex::new(Script {
                identity: Ok(identity),
                matches: VecDeque::new(),
                end_result: Ok(()),
                latency: Duration::ZERO,
                requests: Vec::new(),
                ended: Vec::new(),
            }),
            identity_calls: AtomicUsize::new(0),
            request_calls: AtomicUsize::new(0),
        }
    }

    /// Queues the reply to the next unanswered match request.
    pub fn push_match(&self, reply: Result<MatchSession, BackendError>) {
        self.script().matches.push_back(reply);
    }

    pub fn fail_identity(&self, err: BackendError) {
        self.script().identity = Err(err);
    }

    pub fn set_end_result(&self, result: Result<(), BackendError>) {
        self.script().end_result = result;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.script().latency = latency;
    }

    pub fn identity_calls(&self) -> usize {
        self.identity_calls.load(Ordering::SeqCst)
    }

    /// Number of match requests received, answered or not.
    pub fn request_calls(&self) -> usize {
        self.request_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<MatchRequest> {
        self.script().requests.clone()
    }

    /// Match ids reported as ended, in order.
    pub fn ended(&self) -> Vec<MatchId> {
        self.script().ended.clone()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delay(&self, cancel: &CancellationToken) -> Result<(), BackendError> {
        let latency = self.script().latency;
        if latency.is_zero() {
            return if cancel.is_cancelled() {
                Err(BackendError::Cancelled)
            } else {
                Ok(())
            };
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(BackendError::Cancelled),
            _ = tokio::time::sleep(latency) => Ok(()),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new(Identity::new("mock-open-id", "Mock"))
    }
}

impl MatchmakingBackend for MockBackend {
    async fn resolve_identity(&self, cancel: CancellationToken) -> Result<Identity, BackendError> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        self.delay(&cancel).await?;
        self.script().identity.clone()
    }

    async fn request_match(
        &self,
        request: &MatchRequest,
        cancel: CancellationToken,
    ) -> Result<MatchSession, BackendError> {
        self.request_calls.fetch_add(1, Ordering::SeqCst);
        self.script().requests.push(request.clone());
        self.delay(&cancel).await?;
        self.script()
            .matches
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Unavailable("no match scripted".into())))
    }

    async fn end_match(
        &self,
        match_id: &MatchId,
        cancel: CancellationToken,
    ) -> Result<(), BackendError> {
        self.delay(&cancel).await?;
        let mut script = self.script();
        script.ended.push(match_id.clone());
        script.end_result.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_protocol::{PoolConfig, SeatIndex};

    fn session() -> MatchSession {
        MatchSession {
            match_id: MatchId::new("m-1"),
            is_host: true,
            local_seat: SeatIndex(0),
            host: Identity::new("h", "Host"),
            teams: Vec::new(),
        }
    }

    #[test]
    fn test_backend_error_codes() {
        assert_eq!(BackendError::Cancelled.code(), ResultCode::Cancelled);
        assert_eq!(BackendError::Timeout.code(), ResultCode::Timeout);
        assert_eq!(
            BackendError::Rejected {
                code: 3,
                message: "pool closed".into()
            }
            .code(),
            ResultCode::Error
        );
        assert_eq!(BackendError::Unavailable("down".into()).code(), ResultCode::Error);
    }

    #[test]
    fn test_to_outcome_maps_timeout_to_timed_out() {
        let outcome: Outcome<()> = to_outcome(Err(BackendError::Timeout));
        assert_eq!(outcome.result_code(), ResultCode::Timeout);
        let outcome: Outcome<()> = to_outcome(Err(BackendError::Unavailable("x".into())));
        assert_eq!(outcome.result_code(), ResultCode::Error);
    }

    #[tokio::test]
    async fn test_mock_hands_out_queued_replies_in_order() {
        let backend = MockBackend::default();
        backend.push_match(Ok(session()));
        backend.push_match(Err(BackendError::Timeout));
        let request = MatchRequest::new(PoolConfig::new("pool"));

        let first = backend
            .request_match(&request, CancellationToken::new())
            .await;
        let second = backend
            .request_match(&request, CancellationToken::new())
            .await;
        let third = backend
            .request_match(&request, CancellationToken::new())
            .await;

        assert_eq!(first.unwrap().match_id, MatchId::new("m-1"));
        assert_eq!(second.unwrap_err(), BackendError::Timeout);
        assert!(matches!(third, Err(BackendError::Unavailable(_))));
        assert_eq!(backend.request_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_latency_honours_cancellation() {
        let backend = MockBackend::default();
        backend.set_latency(Duration::from_secs(10));
        backend.push_match(Ok(session()));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });
        let reply = backend
            .request_match(&MatchRequest::new(PoolConfig::new("pool")), cancel)
            .await;

        assert_eq!(reply.unwrap_err(), BackendError::Cancelled);
    }

    #[tokio::test]
    async fn test_mock_records_ended_matches() {
        let backend = MockBackend::default();
        backend
            .end_match(&MatchId::new("m-7"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(backend.ended(), vec![MatchId::new("m-7")]);
    }
}
