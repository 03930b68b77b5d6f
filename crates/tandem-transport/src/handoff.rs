//! The hand-off queue between the transport thread and the tick loop.
//!
//! The transport calls into a [`TransportSink`] from whatever thread it
//! likes. Events land in an unbounded FIFO and are drained by the tick loop
//! through the [`TransportInbox`], in exactly the order they were handed
//! off.

use tandem_protocol::{SeatIndex, UserId};
use tokio::sync::mpsc;

use crate::{ExitReason, MessageId, TransportError, TransportEvent};

/// Creates a connected sink/inbox pair.
pub fn handoff_channel() -> (TransportSink, TransportInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TransportSink { tx }, TransportInbox { rx })
}

/// The transport-facing end. Cheap to clone, `Send + Sync`, and never
/// blocks.
#[derive(Debug, Clone)]
pub struct TransportSink {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportSink {
    /// Hands off a raw event.
    ///
    /// # Errors
    /// [`TransportError::Closed`] once the inbox has been dropped.
    pub fn push(&self, event: TransportEvent) -> Result<(), TransportError> {
        self.tx.send(event).map_err(|_| TransportError::Closed)
    }

    pub fn on_join(
        &self,
        seat: SeatIndex,
        user_id: UserId,
        extra: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.push(TransportEvent::Join {
            seat,
            user_id,
            extra,
        })
    }

    pub fn on_exit(
        &self,
        seat: SeatIndex,
        user_id: UserId,
        reason: ExitReason,
    ) -> Result<(), TransportError> {
        self.push(TransportEvent::Exit {
            seat,
            user_id,
            reason,
        })
    }

    pub fn on_send_result(
        &self,
        message_id: MessageId,
        success: bool,
    ) -> Result<(), TransportError> {
        self.push(TransportEvent::SendResult {
            message_id,
            success,
        })
    }

    pub fn on_message(&self, seat: SeatIndex, payload: Vec<u8>) -> Result<(), TransportError> {
        self.push(TransportEvent::Message { seat, payload })
    }

    /// Returns `true` once the inbox has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The tick-loop end.
#[derive(Debug)]
pub struct TransportInbox {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportInbox {
    /// Takes everything currently queued without waiting.
    ///
    /// Called once per tick; events keep their hand-off order.
    pub fn drain(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        if !events.is_empty() {
            tracing::trace!(count = events.len(), "drained transport events");
        }
        events
    }

    /// Waits for the next event. Returns `None` once every sink is gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }

    /// Number of events waiting to be drained.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
