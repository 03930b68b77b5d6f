//! Async facade over the seat registry.

use std::sync::Arc;

use tandem_protocol::{SeatIndex, UserId};
use tandem_transport::TransportEvent;
use tokio::sync::{Mutex, broadcast};

use crate::{ConnectionState, SeatConfig, SeatError, SeatEvent, SeatRegistry};

/// A [`SeatRegistry`] shared between the driver and running operations,
/// plus a broadcast of every [`SeatEvent`] it produces.
///
/// Events are published while the registry lock is held, so subscribers see
/// them in exactly the order the registry emitted them.
#[derive(Clone)]
pub struct SharedSeats {
    registry: Arc<Mutex<SeatRegistry>>,
    events: broadcast::Sender<SeatEvent>,
}

impl SharedSeats {
    pub fn new(config: SeatConfig, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            registry: Arc::new(Mutex::new(SeatRegistry::new(config))),
            events,
        }
    }

    /// Applies a join or exit notification and publishes the resulting
    /// events. Other transport events are ignored.
    pub async fn apply(&self, event: &TransportEvent) -> Result<Vec<SeatEvent>, SeatError> {
        let mut registry = self.registry.lock().await;
        let events = match event {
            TransportEvent::Join {
                seat,
                user_id,
                extra,
            } => registry.on_join(*seat, user_id.clone(), extra.clone())?,
            TransportEvent::Exit {
                seat,
                user_id,
                reason,
            } => registry.on_exit(*seat, user_id.clone(), reason.clone())?,
            TransportEvent::SendResult { .. } | TransportEvent::Message { .. } => {
                return Ok(Vec::new());
            }
        };
        self.publish(&events);
        Ok(events)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SeatEvent> {
        self.events.subscribe()
    }

    /// Read access to the registry.
    pub async fn with<R>(&self, f: impl FnOnce(&SeatRegistry) -> R) -> R {
        f(&*self.registry.lock().await)
    }

    pub async fn expect(&self, seats: &[SeatIndex]) {
        self.registry.lock().await.expect(seats);
    }

    pub async fn forget_expected(&self) {
        self.registry.lock().await.forget_expected();
    }

    pub async fn mark_disconnecting(&self, seat: SeatIndex) -> Result<(), SeatError> {
        self.registry.lock().await.mark_disconnecting(seat)
    }

    pub async fn restore_connected(&self, seat: SeatIndex) -> Result<(), SeatError> {
        self.registry.lock().await.restore_connected(seat)
    }

    /// Resets the registry and publishes the `Unbound` events.
    pub async fn reset(&self) -> Vec<SeatEvent> {
        let mut registry = self.registry.lock().await;
        let events = registry.reset();
        self.publish(&events);
        events
    }

    /// Resolves once `user_id` no longer holds `seat`.
    ///
    /// Returns immediately if it already doesn't.
    pub async fn wait_until_vacated(&self, seat: SeatIndex, user_id: &UserId) {
        // Subscribe before checking, or an unbind between the check and the
        // subscription would be missed.
        let mut rx = self.subscribe();
        loop {
            let still_there = self
                .with(|r| r.occupant(seat) == Some(user_id))
                .await;
            if !still_there {
                return;
            }
            match rx.recv().await {
                Ok(SeatEvent::Unbound {
                    seat: s,
                    user_id: u,
                    ..
                }) if s == seat && &u == user_id => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// Resolves once every seat in `seats` has a `Connected` occupant.
    pub async fn wait_until_occupied(&self, seats: &[SeatIndex]) {
        let mut rx = self.subscribe();
        loop {
            let all_bound = self
                .with(|r| {
                    seats
                        .iter()
                        .all(|s| r.state(*s) == ConnectionState::Connected)
                })
                .await;
            if all_bound {
                return;
            }
            match rx.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    fn publish(&self, events: &[SeatEvent]) {
        for event in events {
            // No subscribers is fine.
            let _ = self.events.send(event.clone());
        }
    }
}

impl std::fmt::Debug for SharedSeats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSeats")
            .field("subscribers", &self.events.receiver_count())
            .finish()
    }
}
