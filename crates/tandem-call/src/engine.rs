//! The reliable call engine.
//!
//! A call is one outbound custom message to one seat. Calls are queued,
//! sent on the next tick, and resolved when the transport reports delivery.
//! A failed delivery is re-queued until the retry budget runs out, and every
//! call also has a deadline that ends it regardless of retries left.
//!
//! The engine is the only place in Tandem that calls
//! [`Transport::send_custom_message`].

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tandem_protocol::{OpResult, ResultCode, SeatIndex};
use tandem_transport::{MessageId, Transport};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{CallError, CancelReason};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Re-sends after the first attempt. Total attempts are `1 + max_retries`.
    pub max_retries: u32,
    /// Wall-clock budget for a call, measured from when it was queued.
    pub timeout: Duration,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// Responses and handles
// ---------------------------------------------------------------------------

/// Terminal result of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResponse {
    pub code: ResultCode,
    pub message: String,
    /// Sends performed, including the one that succeeded.
    pub attempts: u32,
}

impl CallResponse {
    fn delivered(attempts: u32) -> Self {
        Self {
            code: ResultCode::Success,
            message: String::new(),
            attempts,
        }
    }

    fn failed(err: &CallError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            attempts: err.attempts(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

impl From<CallResponse> for OpResult {
    fn from(resp: CallResponse) -> Self {
        OpResult::new(resp.code, resp.message)
    }
}

/// Identifies a call for its whole life, across retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId(u64);

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

/// Resolves to the call's [`CallResponse`].
///
/// If the engine is dropped first the handle resolves to an `Error`
/// response rather than hanging.
#[derive(Debug)]
pub struct CallHandle {
    id: CallId,
    rx: oneshot::Receiver<CallResponse>,
}

impl CallHandle {
    pub fn id(&self) -> CallId {
        self.id
    }
}

impl Future for CallHandle {
    type Output = CallResponse;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(resp)) => Poll::Ready(resp),
            Poll::Ready(Err(_)) => Poll::Ready(CallResponse::failed(&CallError::EngineGone)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// What one [`CallEngine::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Sends the transport accepted.
    pub sent: usize,
    /// Calls resolved as timed out.
    pub expired: usize,
    /// Sends the transport refused synchronously.
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct PendingCall {
    id: CallId,
    seat: SeatIndex,
    payload: Vec<u8>,
    attempts: u32,
    max_attempts: u32,
    deadline: Instant,
    reply: oneshot::Sender<CallResponse>,
}

impl PendingCall {
    fn resolve(self, resp: CallResponse) {
        // The caller may have stopped waiting; that is fine.
        let _ = self.reply.send(resp);
    }

    fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// See the [module docs](self).
pub struct CallEngine {
    transport: Arc<dyn Transport>,
    config: CallConfig,
    next_id: u64,
    queue: VecDeque<PendingCall>,
    in_flight: HashMap<MessageId, PendingCall>,
}

impl CallEngine {
    pub fn new(transport: Arc<dyn Transport>, config: CallConfig) -> Self {
        Self {
            transport,
            config,
            next_id: 1,
            queue: VecDeque::new(),
            in_flight: HashMap::new(),
        }
    }

    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    /// Queues `payload` for `seat`. It is sent on the next tick.
    pub fn call(&mut self, seat: SeatIndex, payload: Vec<u8>, max_retries: u32) -> CallHandle {
        let id = CallId(self.next_id);
        self.next_id += 1;
        let (reply, rx) = oneshot::channel();

        self.queue.push_back(PendingCall {
            id,
            seat,
            payload,
            attempts: 0,
            max_attempts: max_retries.saturating_add(1),
            deadline: Instant::now() + self.config.timeout,
            reply,
        });
        debug!(%id, %seat, max_retries, "call queued");

        CallHandle { id, rx }
    }

    /// [`call`](Self::call) with the configured retry budget.
    pub fn call_default(&mut self, seat: SeatIndex, payload: Vec<u8>) -> CallHandle {
        let retries = self.config.max_retries;
        self.call(seat, payload, retries)
    }

    /// Applies a delivery report from the transport.
    ///
    /// Returns `false` for ids the engine no longer tracks, e.g. a report
    /// arriving after its call already timed out.
    pub fn on_send_result(&mut self, message_id: MessageId, success: bool) -> bool {
        let Some(call) = self.in_flight.remove(&message_id) else {
            debug!(%message_id, success, "send result for unknown message ignored");
            return false;
        };

        if success {
            debug!(id = %call.id, %message_id, attempts = call.attempts, "call delivered");
            let attempts = call.attempts;
            call.resolve(CallResponse::delivered(attempts));
        } else if call.has_attempts_left() {
            debug!(
                id = %call.id,
                attempts = call.attempts,
                max = call.max_attempts,
                "delivery failed, re-queueing"
            );
            self.queue.push_back(call);
        } else {
            warn!(id = %call.id, seat = %call.seat, attempts = call.attempts, "delivery failed, retries exhausted");
            let err = CallError::Exhausted {
                attempts: call.attempts,
            };
            call.resolve(CallResponse::failed(&err));
        }
        true
    }

    /// Runs one engine step.
    ///
    /// Calls past their deadline are resolved as timed out first, whether
    /// queued or in flight. Then every queued call is sent once; calls the
    /// transport refuses are re-queued for the next tick while attempts
    /// remain.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        let expired_ids: Vec<MessageId> = self
            .in_flight
            .iter()
            .filter(|(_, call)| call.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for message_id in expired_ids {
            if let Some(call) = self.in_flight.remove(&message_id) {
                report.expired += 1;
                Self::expire(call);
            }
        }

        let queued = std::mem::take(&mut self.queue);
        let mut retry_next_tick = VecDeque::new();
        for mut call in queued {
            if call.deadline <= now {
                report.expired += 1;
                Self::expire(call);
                continue;
            }

            call.attempts += 1;
            match self.transport.send_custom_message(call.seat, &call.payload) {
                Ok(message_id) => {
                    report.sent += 1;
                    debug!(id = %call.id, %message_id, attempt = call.attempts, "call sent");
                    self.in_flight.insert(message_id, call);
                }
                Err(source) => {
                    report.failed += 1;
                    if call.has_attempts_left() {
                        debug!(id = %call.id, error = %source, "send refused, retrying next tick");
                        retry_next_tick.push_back(call);
                    } else {
                        warn!(id = %call.id, seat = %call.seat, error = %source, "send refused, retries exhausted");
                        let err = CallError::Transport {
                            attempts: call.attempts,
                            source,
                        };
                        call.resolve(CallResponse::failed(&err));
                    }
                }
            }
        }
        self.queue = retry_next_tick;

        report
    }

    /// Resolves every outstanding call as cancelled. Returns how many.
    pub fn cancel_all(&mut self, reason: CancelReason) -> usize {
        let calls: Vec<PendingCall> = self
            .queue
            .drain(..)
            .chain(self.in_flight.drain().map(|(_, call)| call))
            .collect();
        let count = calls.len();
        let err = CallError::Cancelled(reason);
        for call in calls {
            let attempts = call.attempts;
            call.resolve(CallResponse {
                attempts,
                ..CallResponse::failed(&err)
            });
        }
        if count > 0 {
            info!(count, %reason, "outstanding calls cancelled");
        }
        count
    }

    /// Queued plus in-flight calls.
    pub fn pending(&self) -> usize {
        self.queue.len() + self.in_flight.len()
    }

    fn expire(call: PendingCall) {
        warn!(id = %call.id, seat = %call.seat, attempts = call.attempts, "call timed out");
        let err = CallError::TimedOut {
            attempts: call.attempts,
        };
        call.resolve(CallResponse::failed(&err));
    }
}

impl std::fmt::Debug for CallEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallEngine")
            .field("queued", &self.queue.len())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}
