//! Cancellable, timeout-bounded operations.
//!
//! Every external call Tandem makes (identity lookup, match request, end
//! match, waiting for guests) runs inside a [`CancelScope`] and finishes
//! with an [`Outcome`]: exactly one of success, cancellation, or error.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures_util::future::select_all;
use tandem_protocol::{OpResult, ResultCode};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// CancelReason / OpError / Outcome
// ---------------------------------------------------------------------------

/// Which cancellation source stopped an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// The caller's own token.
    Caller,
    /// The process-wide shutdown token.
    Shutdown,
    /// The connection the operation depends on went away.
    Disconnected,
    /// A bounded wait ran out.
    TimedOut,
}

impl CancelReason {
    pub fn code(self) -> ResultCode {
        match self {
            Self::TimedOut => ResultCode::Timeout,
            _ => ResultCode::Cancelled,
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caller => f.write_str("cancelled by caller"),
            Self::Shutdown => f.write_str("instance shutting down"),
            Self::Disconnected => f.write_str("connection lost"),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}

/// A failed operation: a message plus, when the failure maps onto a more
/// specific code than `Error`, that code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpError {
    pub message: String,
    pub code: Option<ResultCode>,
}

impl OpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: ResultCode) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }

    pub fn code(&self) -> ResultCode {
        self.code.unwrap_or(ResultCode::Error)
    }
}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Terminal result of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Success(T),
    Cancelled(CancelReason),
    Error(OpError),
}

impl<T> Outcome<T> {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(OpError::new(message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// `Cancelled(TimedOut)` reports as `Timeout`; every other
    /// cancellation as `Cancelled`.
    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::Success(_) => ResultCode::Success,
            Self::Cancelled(reason) => reason.code(),
            Self::Error(err) => err.code(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(v) => Outcome::Success(f(v)),
            Self::Cancelled(r) => Outcome::Cancelled(r),
            Self::Error(e) => Outcome::Error(e),
        }
    }

    /// Drops the value and keeps the code and a message.
    pub fn to_op_result(&self) -> OpResult {
        match self {
            Self::Success(_) => OpResult::success(),
            Self::Cancelled(reason) => OpResult::new(reason.code(), reason.to_string()),
            Self::Error(err) => OpResult::new(err.code(), err.message.clone()),
        }
    }

    pub fn into_success(self) -> Option<T> {
        match self {
            Self::Success(v) => Some(v),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// CancelScope
// ---------------------------------------------------------------------------

/// The union of several cancellation sources.
///
/// Cancelling any source cancels the scope, once. The first source observed
/// is recorded as the scope's [`reason`](Self::reason) and never changes
/// afterwards, even if other sources fire later.
///
/// ```ignore
/// let scope = CancelScope::new()
///     .caller(caller_token)
///     .shutdown(shutdown.clone())
///     .disconnect(host_connection.disconnect_token());
/// let outcome = run_op(&scope, backend_call(scope.token())).await;
/// ```
pub struct CancelScope {
    sources: Vec<(CancellationToken, CancelReason)>,
    reason: Arc<OnceLock<CancelReason>>,
    merged: OnceLock<CancellationToken>,
    /// Cancelled on drop; stops the merge watcher.
    retired: CancellationToken,
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelScope")
            .field("sources", &self.sources.len())
            .field("reason", &self.reason.get())
            .finish()
    }
}

impl CancelScope {
    /// A scope with no sources. It is never cancelled until one is added.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            reason: Arc::new(OnceLock::new()),
            merged: OnceLock::new(),
            retired: CancellationToken::new(),
        }
    }

    /// Adds a source. Sources added after [`token`](Self::token) was first
    /// called are not folded into the merged token.
    pub fn with(mut self, token: CancellationToken, reason: CancelReason) -> Self {
        self.sources.push((token, reason));
        self
    }

    pub fn caller(self, token: CancellationToken) -> Self {
        self.with(token, CancelReason::Caller)
    }

    pub fn shutdown(self, token: CancellationToken) -> Self {
        self.with(token, CancelReason::Shutdown)
    }

    pub fn disconnect(self, token: CancellationToken) -> Self {
        self.with(token, CancelReason::Disconnected)
    }

    /// Why the scope was cancelled, or `None` while it is live.
    pub fn reason(&self) -> Option<CancelReason> {
        if let Some(reason) = self.reason.get() {
            return Some(*reason);
        }
        self.sources
            .iter()
            .find(|(token, _)| token.is_cancelled())
            .map(|(_, reason)| self.record(*reason))
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Resolves once any source is cancelled. Pends forever on a scope with
    /// no sources.
    pub async fn cancelled(&self) -> CancelReason {
        if let Some(reason) = self.reason() {
            return reason;
        }
        if self.sources.is_empty() {
            return std::future::pending().await;
        }
        let reason = wait_any(&self.sources).await;
        self.record(reason)
    }

    /// A single token cancelled when any source is. This is what external
    /// collaborators receive.
    ///
    /// The first call spawns a small watcher task, so it must be made from
    /// within a Tokio runtime.
    pub fn token(&self) -> CancellationToken {
        self.merged
            .get_or_init(|| {
                let merged = CancellationToken::new();
                if self.is_cancelled() {
                    merged.cancel();
                    return merged;
                }
                if self.sources.is_empty() {
                    return merged;
                }

                let sources = self.sources.clone();
                let reason = Arc::clone(&self.reason);
                let retired = self.retired.clone();
                let out = merged.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = retired.cancelled() => {}
                        r = wait_any(&sources) => {
                            let _ = reason.set(r);
                            out.cancel();
                        }
                    }
                });
                merged
            })
            .clone()
    }

    fn record(&self, reason: CancelReason) -> CancelReason {
        *self.reason.get_or_init(|| reason)
    }
}

impl Drop for CancelScope {
    fn drop(&mut self) {
        self.retired.cancel();
    }
}

async fn wait_any(sources: &[(CancellationToken, CancelReason)]) -> CancelReason {
    let waits = sources.iter().map(|(token, reason)| {
        let reason = *reason;
        Box::pin(async move {
            token.cancelled().await;
            reason
        })
    });
    let (reason, _, _) = select_all(waits).await;
    reason
}

// ---------------------------------------------------------------------------
// Runners
// ---------------------------------------------------------------------------

/// Runs `op` inside `scope`.
///
/// Returns `Cancelled` without polling `op` at all when the scope is
/// already cancelled; otherwise whichever of `op` and the scope finishes
/// first wins and the other is dropped.
pub async fn run_op<T, F>(scope: &CancelScope, op: F) -> Outcome<T>
where
    F: Future<Output = Outcome<T>>,
{
    if let Some(reason) = scope.reason() {
        return Outcome::Cancelled(reason);
    }
    tokio::select! {
        biased;
        reason = scope.cancelled() => Outcome::Cancelled(reason),
        outcome = op => outcome,
    }
}

/// Races a wait condition against `timeout`.
///
/// `wait` receives a token linked to the scope. As soon as either branch
/// resolves the other one is dropped and the linked token is cancelled, so
/// anything the wait handed the token to stops as well. Expiry reports as
/// `Cancelled(TimedOut)`.
pub async fn run_with_timeout<T, F, Fut>(
    scope: &CancelScope,
    timeout: Duration,
    wait: F,
) -> Outcome<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Outcome<T>>,
{
    if let Some(reason) = scope.reason() {
        return Outcome::Cancelled(reason);
    }

    let linked = scope.token().child_token();
    let _linked_guard = linked.clone().drop_guard();
    let wait = wait(linked);

    tokio::select! {
        biased;
        reason = scope.cancelled() => Outcome::Cancelled(reason),
        outcome = wait => outcome,
        _ = tokio::time::sleep(timeout) => {
            tracing::debug!(timeout_ms = timeout.as_millis() as u64, "bounded wait expired");
            Outcome::Cancelled(CancelReason::TimedOut)
        }
    }
}
