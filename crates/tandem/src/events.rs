//! Events the orchestrator raises to the surrounding application.

use std::fmt;

use tandem_protocol::{MatchId, MatchSession, SeatIndex, UserId};
use tandem_seat::UnbindReason;
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Why a merge ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The host ended it, or kicked the last guest.
    Ended,
    /// This instance was a guest and the host sent it home.
    Kicked,
    /// The local host connection dropped.
    HostLost,
    /// Not every matched guest connected in time.
    JoinTimeout,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ended => "ended",
            Self::Kicked => "kicked",
            Self::HostLost => "host-lost",
            Self::JoinTimeout => "join-timeout",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeEvent {
    /// The backend formed a group that includes this instance.
    UsersMatched(MatchSession),
    EndOfMatch {
        match_id: MatchId,
        reason: EndReason,
    },
    SeatBound {
        seat: SeatIndex,
        user_id: UserId,
    },
    SeatUnbound {
        seat: SeatIndex,
        user_id: UserId,
        reason: UnbindReason,
    },
    /// A collaborator broke its contract, e.g. the transport reported an
    /// out-of-range seat. Not recoverable by the core.
    Fatal { message: String },
}

/// Multicast of [`MergeEvent`]s.
///
/// Publishing never fails the publisher: with no subscribers the event is
/// dropped, and a subscriber that falls behind skips what it missed.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MergeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: MergeEvent) {
        if self.tx.send(event).is_err() {
            trace!("event dropped, no subscribers");
        }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// One subscriber's view of the bus.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<MergeEvent>,
}

impl Subscription {
    /// Next event, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<MergeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event subscriber lagging, events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<MergeEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!(missed, "event subscriber lagging, events skipped");
                }
                Err(_) => return None,
            }
        }
    }
}
