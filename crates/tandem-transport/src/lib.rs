//! Transport boundary for Tandem.
//!
//! The audio/video/input transport is an external collaborator. This crate
//! defines the narrow surface Tandem consumes from it:
//!
//! - [`TransportEvent`]: join/exit/send-result notifications delivered
//!   asynchronously, on the transport's own thread
//! - [`handoff_channel`]: the thread-safe queue those notifications are
//!   marshalled through onto the tick loop. It is the only synchronized
//!   structure at the boundary.
//! - [`Transport`]: the outbound custom-message primitive
//! - [`LoopbackTransport`]: an in-process transport for tests and demos

mod error;
mod handoff;
mod loopback;

pub use error::TransportError;
pub use handoff::{TransportInbox, TransportSink, handoff_channel};
pub use loopback::{AckMode, LoopbackTransport, SentMessage};

use std::fmt;

use tandem_protocol::{SeatIndex, UserId};

/// Identifier the transport assigns to each outbound custom message.
/// Echoed back in [`TransportEvent::SendResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(u64);

impl MessageId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Why the transport reported a participant leaving a seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The participant left on its own.
    Left,
    /// The participant was switched back by the host.
    Kicked,
    /// The transport lost the participant.
    TimedOut,
    Other(String),
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Kicked => f.write_str("kicked"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Other(reason) => f.write_str(reason),
        }
    }
}

/// A notification from the transport.
///
/// Join and exit notifications for one seat are not guaranteed to arrive in
/// a sensible order; the seat registry is what turns them into a coherent
/// event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A participant's presence appeared at a seat.
    Join {
        seat: SeatIndex,
        user_id: UserId,
        extra: Vec<u8>,
    },
    /// A participant's presence left a seat.
    Exit {
        seat: SeatIndex,
        user_id: UserId,
        reason: ExitReason,
    },
    /// Delivery outcome of a message sent with
    /// [`Transport::send_custom_message`].
    SendResult { message_id: MessageId, success: bool },
    /// A custom message arrived from the participant at `seat`.
    Message { seat: SeatIndex, payload: Vec<u8> },
}

/// The outbound half of the transport.
///
/// Object-safe and synchronous: the call only queues the message and
/// returns its id; delivery is reported later as a
/// [`TransportEvent::SendResult`].
pub trait Transport: Send + Sync + 'static {
    /// Queues `payload` for the participant at `seat`.
    ///
    /// # Errors
    /// [`TransportError::NotConnected`] if nobody is reachable there,
    /// [`TransportError::SendFailed`] if the transport refused the message.
    fn send_custom_message(
        &self,
        seat: SeatIndex,
        payload: &[u8],
    ) -> Result<MessageId, TransportError>;
}
