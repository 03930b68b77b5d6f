//! One host and three guests merged in-process, then taken apart again.
//!
//! Every instance runs its own orchestrator. The host's transport relays
//! custom messages straight into each guest's hand-off queue, and the
//! demo plays the platform's part of moving presences between sessions.
//!
//! ```text
//! RUST_LOG=tandem=debug cargo run -p loopback-merge
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tandem::prelude::*;
use tandem_protocol::JsonCodec;
use tandem_room::EndTarget;
use tandem_transport::{MessageId, Transport, TransportError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const GUEST_SEATS: [u8; 3] = [1, 2, 3];

// ---------------------------------------------------------------------------
// Relay transport
// ---------------------------------------------------------------------------

/// The host's transport: delivers to the guest's inbox and acknowledges
/// on the host's.
struct Relay {
    host: TransportSink,
    guests: HashMap<SeatIndex, TransportSink>,
    next_id: AtomicU64,
}

impl Transport for Relay {
    fn send_custom_message(
        &self,
        seat: SeatIndex,
        payload: &[u8],
    ) -> Result<MessageId, TransportError> {
        let guest = self
            .guests
            .get(&seat)
            .ok_or(TransportError::NotConnected(seat))?;
        let id = MessageId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let delivered = guest.on_message(SeatIndex::HOST, payload.to_vec()).is_ok();
        self.host.on_send_result(id, delivered)?;
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

fn open_id(seat: SeatIndex) -> String {
    format!("player-{}", seat.0)
}

fn session(
    local: SeatIndex,
    seeds: &[(SeatIndex, SwitchTokenSeed)],
) -> Result<MatchSession, TandemError> {
    let mut participants = Vec::with_capacity(seeds.len());
    for (seat, seed) in seeds {
        participants.push(MatchParticipant {
            seat: *seat,
            identity: Identity::new(open_id(*seat), format!("Player {}", seat.0)),
            extra: seed.encode(&JsonCodec)?,
        });
    }
    Ok(MatchSession {
        match_id: MatchId::new("demo-match"),
        is_host: local.is_host(),
        local_seat: local,
        host: Identity::new(open_id(SeatIndex::HOST), "Player 0"),
        teams: vec![MatchTeam { participants }],
    })
}

fn config() -> TandemConfig {
    let mut config = TandemConfig::default();
    config.switch.departure_grace = Duration::from_millis(500);
    config
}

fn request() -> MatchRequest {
    MatchRequest::new(PoolConfig::new("quad"))
}

async fn watch_events(name: String, mut events: tandem::Subscription) {
    while let Some(event) = events.recv().await {
        match event {
            MergeEvent::UsersMatched(session) => {
                info!(%name, match_id = %session.match_id, is_host = session.is_host, "matched")
            }
            MergeEvent::EndOfMatch { match_id, reason } => {
                info!(%name, %match_id, %reason, "merge over")
            }
            MergeEvent::Fatal { message } => warn!(%name, %message, "fatal"),
            other => info!(%name, event = ?other, "event"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), TandemError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tandem=debug".into()),
        )
        .init();

    let host_platform = Arc::new(MockPlatform::new("sess-host", "rtc-host"));
    let mut seeds = vec![(SeatIndex::HOST, host_platform.seed())];
    let mut parts = Vec::new();
    for n in GUEST_SEATS {
        let seat = SeatIndex(n);
        let platform = Arc::new(MockPlatform::new(format!("sess-{n}"), format!("rtc-{n}")));
        seeds.push((seat, platform.seed()));
        let (sink, inbox) = handoff_channel();
        parts.push((seat, platform, sink, inbox));
    }

    // Host
    let (host_sink, host_inbox) = handoff_channel();
    let relay = Arc::new(Relay {
        host: host_sink.clone(),
        guests: parts
            .iter()
            .map(|(seat, _, sink, _)| (*seat, sink.clone()))
            .collect(),
        next_id: AtomicU64::new(1),
    });
    let exit_sink = host_sink.clone();
    host_platform.on_end_of_match(move |target| {
        if let EndTarget::Seat(seat) = target {
            let _ = exit_sink.on_exit(seat, UserId::new(open_id(seat)), ExitReason::Kicked);
        }
    });
    let host_backend = Arc::new(MockBackend::new(Identity::new(
        open_id(SeatIndex::HOST),
        "Player 0",
    )));
    host_backend.push_match(Ok(session(SeatIndex::HOST, &seeds)?));
    let host = TandemBuilder::new()
        .config(config())
        .build(host_backend, host_platform, relay, host_inbox)?;
    host_sink.on_join(SeatIndex::HOST, UserId::new(open_id(SeatIndex::HOST)), Vec::new())?;
    tokio::spawn(watch_events("host".into(), host.subscribe()));

    // Guests
    let mut guests = Vec::with_capacity(parts.len());
    for (seat, platform, sink, inbox) in parts {
        let backend = Arc::new(MockBackend::new(Identity::new(
            open_id(seat),
            format!("Player {}", seat.0),
        )));
        backend.push_match(Ok(session(seat, &seeds)?));
        let transport = Arc::new(LoopbackTransport::new(sink));
        let tandem = TandemBuilder::new()
            .config(config())
            .build(backend, platform, transport, inbox)?;
        tokio::spawn(watch_events(format!("guest-{}", seat.0), tandem.subscribe()));
        guests.push((seat, Arc::new(tandem)));
    }

    // Each guest switches onto the host; the platform then moves its
    // presence into the host's session.
    let mut switching = Vec::with_capacity(guests.len());
    for (seat, tandem) in &guests {
        let seat = *seat;
        let tandem = Arc::clone(tandem);
        let host_sink = host_sink.clone();
        switching.push(tokio::spawn(async move {
            let result = tandem
                .request_match(request(), CancellationToken::new())
                .await;
            if result.is_success() {
                host_sink.on_join(seat, UserId::new(open_id(seat)), Vec::new())?;
            }
            Ok::<_, TransportError>(result)
        }));
    }

    let hosted = host.request_match(request(), CancellationToken::new()).await;
    info!(code = %hosted.code, message = %hosted.message, "host request finished");
    for handle in switching {
        match handle.await {
            Ok(Ok(result)) => info!(code = %result.code, "guest request finished"),
            Ok(Err(err)) => warn!(error = %err, "guest presence not relayed"),
            Err(err) => warn!(error = %err, "guest task failed"),
        }
    }

    if hosted.is_success() {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let ended = host.end_match(EndInfo::all("thanks for playing")).await;
        info!(code = %ended.code, message = %ended.message, "end finished");
        for seat in ended.seats {
            info!(seat = %seat.seat, code = %seat.code, "guest sent home");
        }
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    for (seat, tandem) in &guests {
        info!(%seat, state = %tandem.match_state().await, "guest final state");
        tandem.shutdown().await;
    }
    host.shutdown().await;
    Ok(())
}
