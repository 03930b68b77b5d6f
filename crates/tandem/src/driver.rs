//! The driver task: the single writer that feeds transport notifications
//! into the core.
//!
//! Once per tick it:
//!   1. Drains the transport hand-off queue, in delivery order
//!   2. Applies joins/exits to the seat registry and raises seat events
//!   3. Routes delivery reports to the call engine
//!   4. Hands inbound merge messages to the switch coordinator
//!   5. Advances the call engine (sends, retries, timeouts)

use std::sync::Arc;

use tandem_call::TickReport;
use tandem_protocol::{Codec, MatchId, MergeMessage, SeatIndex};
use tandem_room::PlatformSession;
use tandem_seat::SeatEvent;
use tandem_tick::TickScheduler;
use tandem_transport::{TransportEvent, TransportInbox};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::orchestrator::Shared;
use crate::{EndReason, MatchState, MatchmakingBackend, MergeEvent};

/// Runs until the shutdown token fires.
pub(crate) async fn run<B: MatchmakingBackend, P: PlatformSession>(
    shared: Arc<Shared<B, P>>,
    mut inbox: TransportInbox,
    mut scheduler: TickScheduler,
) {
    info!(tick_rate_hz = scheduler.tick_rate_hz(), "driver started");
    loop {
        tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            tick = scheduler.wait_for_tick() => {
                let report = shared.on_tick(&mut inbox).await;
                scheduler.record_tick_end();
                if report.expired > 0 || report.failed > 0 {
                    debug!(tick = tick.tick, sent = report.sent, expired = report.expired, failed = report.failed, "call engine tick");
                }
            }
        }
    }
    info!(ticks = scheduler.tick_count(), "driver stopped");
}

impl<B: MatchmakingBackend, P: PlatformSession> Shared<B, P> {
    pub(crate) async fn on_tick(&self, inbox: &mut TransportInbox) -> TickReport {
        for event in inbox.drain() {
            match event {
                TransportEvent::Join { .. } | TransportEvent::Exit { .. } => {
                    self.on_presence(&event).await;
                }
                TransportEvent::SendResult {
                    message_id,
                    success,
                } => {
                    if !self.calls.lock().await.on_send_result(message_id, success) {
                        trace!(%message_id, "delivery report for no outstanding call");
                    }
                }
                TransportEvent::Message { seat, payload } => {
                    self.on_message(seat, &payload).await;
                }
            }
        }
        self.calls.lock().await.tick(Instant::now())
    }

    async fn on_presence(&self, event: &TransportEvent) {
        let events = match self.seats.apply(event).await {
            Ok(events) => events,
            Err(err) if err.is_fatal() => {
                error!(error = %err, "transport reported an impossible seat change");
                self.events.publish(MergeEvent::Fatal {
                    message: err.to_string(),
                });
                return;
            }
            Err(err) => {
                debug!(error = %err, "seat change ignored");
                return;
            }
        };

        for event in events {
            match event {
                SeatEvent::Bound { seat, user_id } => {
                    self.events.publish(MergeEvent::SeatBound { seat, user_id });
                }
                SeatEvent::Unbound {
                    seat,
                    user_id,
                    reason,
                } => {
                    self.events.publish(MergeEvent::SeatUnbound {
                        seat,
                        user_id,
                        reason,
                    });
                    if seat == SeatIndex::HOST {
                        self.on_host_lost().await;
                    }
                }
            }
        }
    }

    /// The local connection at seat 0 went away: whatever merge it carried
    /// is over.
    async fn on_host_lost(&self) {
        if let Some(request) = self.host_lost.lock().await.as_ref() {
            debug!("host connection lost during a match request");
            request.cancel();
        }
        let Some(previous) = self.switch.on_host_connection_lost().await else {
            return;
        };
        let session = {
            let mut core = self.core.lock().await;
            core.state = MatchState::None;
            core.session.take()
        };
        warn!(switch_state = %previous, "host connection lost, merge over");
        if let Some(session) = session {
            self.events.publish(MergeEvent::EndOfMatch {
                match_id: session.match_id,
                reason: EndReason::HostLost,
            });
        }
    }

    async fn on_message(&self, seat: SeatIndex, payload: &[u8]) {
        let message: MergeMessage = match self.codec.decode(payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(%seat, error = %err, "undecodable merge message dropped");
                return;
            }
        };
        if let Some(match_id) = self.switch.on_guest_message(message).await {
            self.on_sent_home(match_id).await;
        }
    }

    /// The host ended the merge for this guest instance.
    async fn on_sent_home(&self, match_id: MatchId) {
        {
            let mut core = self.core.lock().await;
            if core.state == MatchState::InConnectOtherRoom {
                core.state = MatchState::None;
                core.session = None;
            }
        }
        self.events.publish(MergeEvent::EndOfMatch {
            match_id,
            reason: EndReason::Kicked,
        });
    }
}
