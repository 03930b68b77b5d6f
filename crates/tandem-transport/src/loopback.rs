//! An in-process transport that acknowledges messages through a sink.
//!
//! Stands in for the real RTC transport in tests and the demo binary.
//! Each seat has an [`AckMode`] deciding what happens to messages sent to
//! it; the acknowledgement is handed off exactly like a real transport
//! would, so it is only observed on the next tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tandem_protocol::SeatIndex;

use crate::{MessageId, Transport, TransportError, TransportSink};

/// How the loopback transport treats messages for a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// Report successful delivery.
    #[default]
    Ack,
    /// Report failed delivery.
    Fail,
    /// Accept the message and never report anything.
    Silent,
    /// Refuse synchronously with [`TransportError::NotConnected`].
    Unreachable,
}

/// A message the loopback transport accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id: MessageId,
    pub seat: SeatIndex,
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct LoopbackState {
    default_mode: AckMode,
    modes: HashMap<SeatIndex, AckMode>,
    /// Remaining forced failures per seat, consumed before `modes` applies.
    fail_next: HashMap<SeatIndex, u32>,
    sent: Vec<SentMessage>,
}

/// See the [module docs](self).
#[derive(Debug)]
pub struct LoopbackTransport {
    sink: TransportSink,
    next_id: AtomicU64,
    state: Mutex<LoopbackState>,
}

impl LoopbackTransport {
    /// Acknowledgements are handed off through `sink`.
    pub fn new(sink: TransportSink) -> Self {
        Self {
            sink,
            next_id: AtomicU64::new(1),
            state: Mutex::new(LoopbackState::default()),
        }
    }

    /// Mode for seats without an explicit override.
    pub fn set_default_mode(&self, mode: AckMode) {
        self.lock().default_mode = mode;
    }

    pub fn set_mode(&self, seat: SeatIndex, mode: AckMode) {
        self.lock().modes.insert(seat, mode);
    }

    /// The next `count` messages to `seat` are reported as failed, after
    /// which the seat's mode applies again.
    pub fn fail_next(&self, seat: SeatIndex, count: u32) {
        self.lock().fail_next.insert(seat, count);
    }

    /// Every message accepted so far, in send order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    pub fn sent_to(&self, seat: SeatIndex) -> Vec<SentMessage> {
        self.lock()
            .sent
            .iter()
            .filter(|m| m.seat == seat)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for LoopbackTransport {
    fn send_custom_message(
        &self,
        seat: SeatIndex,
        payload: &[u8],
    ) -> Result<MessageId, TransportError> {
        if payload.is_empty() {
            return Err(TransportError::InvalidPayload("empty payload".into()));
        }

        let mut state = self.lock();
        let forced_failure = match state.fail_next.get_mut(&seat) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        let mode = if forced_failure {
            AckMode::Fail
        } else {
            state
                .modes
                .get(&seat)
                .copied()
                .unwrap_or(state.default_mode)
        };

        if mode == AckMode::Unreachable {
            return Err(TransportError::NotConnected(seat));
        }

        let id = MessageId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        state.sent.push(SentMessage {
            id,
            seat,
            payload: payload.to_vec(),
        });
        drop(state);

        tracing::debug!(%seat, message_id = %id, ?mode, "loopback accepted message");

        let ack = match mode {
            AckMode::Ack => Some(true),
            AckMode::Fail => Some(false),
            AckMode::Silent | AckMode::Unreachable => None,
        };
        if let Some(success) = ack {
            self.sink
                .on_send_result(id, success)
                .map_err(|_| TransportError::SendFailed("hand-off queue closed".into()))?;
        }
        Ok(id)
    }
}
