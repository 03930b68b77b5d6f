//! Integration tests for the orchestrator: match requests, hosting,
//! joining a host, ending, and losing the host connection.

use std::sync::Arc;
use std::time::Duration;

use tandem::prelude::*;
use tandem::Subscription;
use tandem_protocol::{Codec, JsonCodec, MergeMessage};
use tandem_room::{EndTarget, PlatformCall};
use tandem_seat::UnbindReason;
use tandem_transport::AckMode;

// =========================================================================
// Fixtures
// =========================================================================

const HOST_OPEN_ID: &str = "host-open-id";

fn guest_user(seat: u8) -> UserId {
    UserId::new(format!("guest-{seat}"))
}

fn config() -> TandemConfig {
    let mut config = TandemConfig::default();
    config.call.max_retries = 1;
    config.call.timeout = Duration::from_millis(500);
    config.switch.departure_grace = Duration::from_millis(200);
    config.switch.join_timeout = Duration::from_secs(2);
    config
}

fn request() -> MatchRequest {
    MatchRequest::new(PoolConfig::new("quad"))
}

fn participant(seat: u8, open_id: &str, seed: Option<SwitchTokenSeed>) -> MatchParticipant {
    MatchParticipant {
        seat: SeatIndex(seat),
        identity: Identity::new(open_id, ""),
        extra: seed
            .map(|s| s.encode(&JsonCodec).unwrap())
            .unwrap_or_default(),
    }
}

fn host_platform() -> MockPlatform {
    MockPlatform::new("sess-host", "rtc-host")
}

fn host_session(guests: &[u8]) -> MatchSession {
    let mut participants = vec![participant(0, HOST_OPEN_ID, Some(host_platform().seed()))];
    for seat in guests {
        participants.push(participant(*seat, &format!("guest-{seat}-open"), None));
    }
    MatchSession {
        match_id: MatchId::new("m-1"),
        is_host: true,
        local_seat: SeatIndex::HOST,
        host: Identity::new(HOST_OPEN_ID, "Host"),
        teams: vec![MatchTeam { participants }],
    }
}

async fn next_event(sub: &mut Subscription, wanted: impl Fn(&MergeEvent) -> bool) -> MergeEvent {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let event = sub.recv().await.expect("event bus closed");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event not raised")
}

// =========================================================================
// Host harness
// =========================================================================

struct Host {
    tandem: Tandem<MockBackend, MockPlatform>,
    backend: Arc<MockBackend>,
    platform: Arc<MockPlatform>,
    transport: Arc<LoopbackTransport>,
    sink: TransportSink,
}

fn host() -> Host {
    let (sink, inbox) = handoff_channel();
    let transport = Arc::new(LoopbackTransport::new(sink.clone()));
    let platform = Arc::new(host_platform());
    let backend = Arc::new(MockBackend::new(Identity::new(HOST_OPEN_ID, "Host")));

    // Switched-back guests leave the transport.
    let exit_sink = sink.clone();
    platform.on_end_of_match(move |target| {
        if let EndTarget::Seat(seat) = target {
            let _ = exit_sink.on_exit(seat, guest_user(seat.0), ExitReason::Kicked);
        }
    });

    let tandem = TandemBuilder::new()
        .config(config())
        .build(backend.clone(), platform.clone(), transport.clone(), inbox)
        .unwrap();
    sink.on_join(SeatIndex::HOST, UserId::new("host"), Vec::new())
        .unwrap();

    Host {
        tandem,
        backend,
        platform,
        transport,
        sink,
    }
}

impl Host {
    fn join_guests(&self, guests: &[u8]) {
        for seat in guests {
            self.sink
                .on_join(SeatIndex(*seat), guest_user(*seat), Vec::new())
                .unwrap();
        }
    }
}

async fn in_game_host(guests: &[u8]) -> Host {
    let h = host();
    h.backend.push_match(Ok(host_session(guests)));
    h.join_guests(guests);

    let result = h
        .tandem
        .request_match(request(), CancellationToken::new())
        .await;

    assert!(result.is_success(), "{result:?}");
    assert_eq!(h.tandem.match_state().await, MatchState::InGameAsHost);
    h
}

// =========================================================================
// request_match: host side
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_request_match_as_host_waits_for_guests() {
    let h = host();
    let mut events = h.tandem.subscribe();
    h.backend.push_match(Ok(host_session(&[1, 2, 3])));

    let (result, _) = tokio::join!(
        h.tandem.request_match(request(), CancellationToken::new()),
        async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            h.join_guests(&[1, 2, 3]);
        }
    );

    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.session.unwrap().match_id, MatchId::new("m-1"));
    assert_eq!(h.tandem.match_state().await, MatchState::InGameAsHost);
    assert_eq!(h.tandem.switch_state().await, SwitchState::Host);
    assert_eq!(
        h.tandem.identity().await,
        Some(Identity::new(HOST_OPEN_ID, "Host"))
    );
    let matched = next_event(&mut events, |e| matches!(e, MergeEvent::UsersMatched(_))).await;
    assert!(matches!(matched, MergeEvent::UsersMatched(s) if s.is_host));
}

#[tokio::test(start_paused = true)]
async fn test_request_match_twice_concurrently_coalesces() {
    let h = host();
    h.backend.set_latency(Duration::from_millis(100));
    h.backend.push_match(Ok(host_session(&[1])));
    h.join_guests(&[1]);

    let (first, second) = tokio::join!(
        h.tandem.request_match(request(), CancellationToken::new()),
        h.tandem.request_match(request(), CancellationToken::new()),
    );

    assert!(first.is_success(), "{first:?}");
    assert_eq!(first, second);
    assert_eq!(h.backend.request_calls(), 1);
    assert_eq!(h.backend.identity_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_request_match_identity_resolved_once() {
    let h = in_game_host(&[1]).await;
    h.tandem.end_match(EndInfo::all("bye")).await;
    h.backend.push_match(Ok(host_session(&[1])));
    h.join_guests(&[1]);

    let result = h
        .tandem
        .request_match(request(), CancellationToken::new())
        .await;

    assert!(result.is_success(), "{result:?}");
    assert_eq!(h.backend.identity_calls(), 1);
    assert_eq!(h.backend.request_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_request_match_while_in_game_as_host_is_invalid_state() {
    let h = in_game_host(&[1]).await;

    let result = h
        .tandem
        .request_match(request(), CancellationToken::new())
        .await;

    assert_eq!(result.code, ResultCode::InvalidState);
    assert_eq!(h.backend.request_calls(), 1);
    assert_eq!(h.tandem.match_state().await, MatchState::InGameAsHost);
}

#[tokio::test(start_paused = true)]
async fn test_request_match_while_ending_game_is_invalid_state() {
    let h = in_game_host(&[1]).await;
    h.transport.set_mode(SeatIndex(1), AckMode::Silent);

    let (ended, (state_during, rejected)) = tokio::join!(
        h.tandem.end_match(EndInfo::all("bye")),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let state = h.tandem.match_state().await;
            let result = h
                .tandem
                .request_match(request(), CancellationToken::new())
                .await;
            (state, result)
        }
    );

    assert_eq!(state_during, MatchState::EndingGame);
    assert_eq!(rejected.code, ResultCode::InvalidState);
    assert_eq!(ended.code, ResultCode::Timeout);
    assert_eq!(h.tandem.match_state().await, MatchState::InGameAsHost);
}

#[tokio::test(start_paused = true)]
async fn test_request_match_invalid_pool_is_invalid_argument() {
    let h = host();

    let result = h
        .tandem
        .request_match(
            MatchRequest::new(PoolConfig::new("")),
            CancellationToken::new(),
        )
        .await;

    assert_eq!(result.code, ResultCode::InvalidArgument);
    assert_eq!(h.backend.request_calls(), 0);
    assert_eq!(h.tandem.match_state().await, MatchState::None);
}

#[tokio::test(start_paused = true)]
async fn test_request_match_cancelled_before_backend_responds() {
    let h = host();
    h.backend.set_latency(Duration::from_secs(1));
    h.backend.push_match(Ok(host_session(&[1])));
    let cancel = CancellationToken::new();

    let (result, _) = tokio::join!(
        h.tandem.request_match(request(), cancel.clone()),
        async {
            // Identity resolves at 1s, the match would come back at 2s.
            tokio::time::sleep(Duration::from_millis(1500)).await;
            cancel.cancel();
        }
    );

    assert_eq!(result.code, ResultCode::Cancelled);
    assert_eq!(h.backend.request_calls(), 1);
    assert_eq!(h.tandem.match_state().await, MatchState::None);
    assert!(h.tandem.current_match().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_request_match_backend_failures_map_to_codes() {
    let h = host();
    h.backend.push_match(Err(BackendError::Rejected {
        code: 9,
        message: "pool closed".into(),
    }));
    h.backend.push_match(Err(BackendError::Timeout));

    let rejected = h
        .tandem
        .request_match(request(), CancellationToken::new())
        .await;
    let timed_out = h
        .tandem
        .request_match(request(), CancellationToken::new())
        .await;

    assert_eq!(rejected.code, ResultCode::Error);
    assert!(rejected.message.contains("pool closed"));
    assert_eq!(timed_out.code, ResultCode::Timeout);
    assert_eq!(h.tandem.match_state().await, MatchState::None);
}

#[tokio::test(start_paused = true)]
async fn test_request_match_host_refused_rolls_back() {
    let h = host();
    h.platform.refuse_host(true);
    h.backend.push_match(Ok(host_session(&[1])));

    let result = h
        .tandem
        .request_match(request(), CancellationToken::new())
        .await;

    assert_eq!(result.code, ResultCode::Error);
    assert_eq!(h.tandem.match_state().await, MatchState::None);
    assert_eq!(h.tandem.switch_state().await, SwitchState::None);
}

#[tokio::test(start_paused = true)]
async fn test_request_match_join_timeout_sends_joined_guests_home() {
    let h = host();
    let mut events = h.tandem.subscribe();
    h.backend.push_match(Ok(host_session(&[1, 2])));
    h.join_guests(&[1]);

    let result = h
        .tandem
        .request_match(request(), CancellationToken::new())
        .await;

    assert_eq!(result.code, ResultCode::Timeout);
    assert_eq!(h.tandem.match_state().await, MatchState::None);
    assert_eq!(h.tandem.switch_state().await, SwitchState::None);
    assert_eq!(h.platform.end_targets(), vec![EndTarget::Seat(SeatIndex(1))]);
    let ended = next_event(&mut events, |e| matches!(e, MergeEvent::EndOfMatch { .. })).await;
    assert_eq!(
        ended,
        MergeEvent::EndOfMatch {
            match_id: MatchId::new("m-1"),
            reason: EndReason::JoinTimeout,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_request_in_flight() {
    let h = host();
    h.backend.set_latency(Duration::from_secs(10));

    let (result, _) = tokio::join!(
        h.tandem.request_match(request(), CancellationToken::new()),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            h.tandem.shutdown().await;
        }
    );

    assert_eq!(result.code, ResultCode::Cancelled);
    assert!(h.tandem.is_shut_down());
    let after = h
        .tandem
        .request_match(request(), CancellationToken::new())
        .await;
    assert_eq!(after.code, ResultCode::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_request_match_host_exit_during_backend_wait_cancels() {
    // The request starts before the driver has bound seat 0.
    let h = host();
    h.backend.set_latency(Duration::from_secs(1));
    h.backend.push_match(Ok(host_session(&[1])));
    h.join_guests(&[1]);

    let (result, _) = tokio::join!(
        h.tandem.request_match(request(), CancellationToken::new()),
        async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            h.sink
                .on_exit(SeatIndex::HOST, UserId::new("host"), ExitReason::Left)
                .unwrap();
        }
    );

    assert_eq!(result.code, ResultCode::Cancelled);
    assert_eq!(result.message, "connection lost");
    assert_eq!(h.tandem.match_state().await, MatchState::None);
    assert_eq!(h.tandem.switch_state().await, SwitchState::None);
    assert!(h.tandem.host_room_seats().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_request_match_without_host_connection_never_hosts() {
    let h = host();
    h.sink
        .on_exit(SeatIndex::HOST, UserId::new("host"), ExitReason::Left)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.backend.push_match(Ok(host_session(&[1])));
    h.join_guests(&[1]);

    let result = h
        .tandem
        .request_match(request(), CancellationToken::new())
        .await;

    assert_eq!(result.code, ResultCode::Error);
    assert!(result.message.contains("host connection"), "{}", result.message);
    assert_eq!(h.tandem.match_state().await, MatchState::None);
    assert_eq!(h.tandem.switch_state().await, SwitchState::None);
    assert!(
        !h.platform
            .calls()
            .iter()
            .any(|c| matches!(c, PlatformCall::BecomeHost { .. }))
    );
}

// =========================================================================
// end_match / kick
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_end_match_sends_everyone_home() {
    let h = in_game_host(&[1, 2, 3]).await;
    let mut events = h.tandem.subscribe();

    let result = h.tandem.end_match(EndInfo::all("thanks")).await;

    assert!(result.is_success(), "{}", result.message);
    assert_eq!(h.tandem.match_state().await, MatchState::None);
    assert_eq!(h.tandem.switch_state().await, SwitchState::None);
    assert!(h.tandem.current_match().await.is_none());
    assert_eq!(h.backend.ended(), vec![MatchId::new("m-1")]);
    let ended = next_event(&mut events, |e| matches!(e, MergeEvent::EndOfMatch { .. })).await;
    assert!(matches!(
        ended,
        MergeEvent::EndOfMatch {
            reason: EndReason::Ended,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_end_match_partial_failure_keeps_game() {
    let h = in_game_host(&[1, 2, 3]).await;
    h.transport.set_mode(SeatIndex(3), AckMode::Silent);

    let result = h.tandem.end_match(EndInfo::all("thanks")).await;

    assert_eq!(result.code, ResultCode::Error);
    assert_eq!(h.tandem.match_state().await, MatchState::InGameAsHost);
    assert!(h.backend.ended().is_empty());

    // The straggler can still be sent home.
    h.transport.set_mode(SeatIndex(3), AckMode::Ack);
    let retry = h.tandem.end_match(EndInfo::all("thanks")).await;
    assert!(retry.is_success(), "{}", retry.message);
    assert_eq!(h.tandem.match_state().await, MatchState::None);
}

#[tokio::test(start_paused = true)]
async fn test_end_match_backend_report_failure_still_ends() {
    let h = in_game_host(&[1]).await;
    h.backend
        .set_end_result(Err(BackendError::Unavailable("down".into())));

    let result = h.tandem.end_match(EndInfo::all("bye")).await;

    assert!(result.is_success());
    assert_eq!(h.tandem.match_state().await, MatchState::None);
}

#[tokio::test(start_paused = true)]
async fn test_end_match_when_idle_is_invalid_state() {
    let h = host();
    let result = h.tandem.end_match(EndInfo::all("bye")).await;
    assert_eq!(result.code, ResultCode::InvalidState);
}

#[tokio::test(start_paused = true)]
async fn test_kick_one_guest_keeps_game() {
    let h = in_game_host(&[1, 2]).await;

    let result = h.tandem.kick(SeatIndex(1), "bye").await;

    assert!(result.is_success(), "{}", result.message);
    assert!(!result.room_closed);
    assert_eq!(h.tandem.match_state().await, MatchState::InGameAsHost);
}

#[tokio::test(start_paused = true)]
async fn test_kick_last_guest_ends_match() {
    let h = in_game_host(&[2]).await;
    let mut events = h.tandem.subscribe();

    let result = h.tandem.kick(SeatIndex(2), "bye").await;

    assert!(result.room_closed);
    assert_eq!(h.tandem.match_state().await, MatchState::None);
    assert_eq!(h.backend.ended(), vec![MatchId::new("m-1")]);
    next_event(&mut events, |e| {
        matches!(
            e,
            MergeEvent::EndOfMatch {
                reason: EndReason::Ended,
                ..
            }
        )
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_kick_last_guest_without_departure_report_ends_match() {
    let h = in_game_host(&[1]).await;
    h.platform.on_end_of_match(|_| {});
    let mut events = h.tandem.subscribe();

    let result = h.tandem.kick(SeatIndex(1), "bye").await;

    assert!(result.is_success(), "{}", result.message);
    assert!(result.room_closed);
    assert_eq!(h.tandem.match_state().await, MatchState::None);
    assert_eq!(h.tandem.switch_state().await, SwitchState::None);
    next_event(&mut events, |e| {
        matches!(
            e,
            MergeEvent::EndOfMatch {
                reason: EndReason::Ended,
                ..
            }
        )
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_kick_unconnected_seat_sends_nothing() {
    let h = in_game_host(&[1]).await;
    let before = h.transport.sent().len();

    let result = h.tandem.kick(SeatIndex(3), "bye").await;

    assert_eq!(result.code, ResultCode::InvalidArgument);
    assert_eq!(h.transport.sent().len(), before);
}

// =========================================================================
// Seat events and the host connection
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_displacement_raises_unbound_before_bound() {
    let h = host();
    let mut events = h.tandem.subscribe();

    h.sink
        .on_join(SeatIndex(2), UserId::new("a"), Vec::new())
        .unwrap();
    h.sink
        .on_join(SeatIndex(2), UserId::new("b"), Vec::new())
        .unwrap();

    let seat_two = |e: &MergeEvent| {
        matches!(e, MergeEvent::SeatBound { seat, .. } | MergeEvent::SeatUnbound { seat, .. } if *seat == SeatIndex(2))
    };
    let first = next_event(&mut events, seat_two).await;
    let second = next_event(&mut events, seat_two).await;
    let third = next_event(&mut events, seat_two).await;

    assert_eq!(
        first,
        MergeEvent::SeatBound {
            seat: SeatIndex(2),
            user_id: UserId::new("a")
        }
    );
    assert_eq!(
        second,
        MergeEvent::SeatUnbound {
            seat: SeatIndex(2),
            user_id: UserId::new("a"),
            reason: UnbindReason::Displaced {
                by: UserId::new("b")
            },
        }
    );
    assert_eq!(
        third,
        MergeEvent::SeatBound {
            seat: SeatIndex(2),
            user_id: UserId::new("b")
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_join_is_fatal() {
    let h = host();
    let mut events = h.tandem.subscribe();

    h.sink
        .on_join(SeatIndex(9), UserId::new("x"), Vec::new())
        .unwrap();

    let fatal = next_event(&mut events, |e| matches!(e, MergeEvent::Fatal { .. })).await;
    assert!(matches!(fatal, MergeEvent::Fatal { message } if message.contains("S-9")));
}

#[tokio::test(start_paused = true)]
async fn test_host_connection_lost_ends_match() {
    let h = in_game_host(&[1]).await;
    let mut events = h.tandem.subscribe();

    h.sink
        .on_exit(SeatIndex::HOST, UserId::new("host"), ExitReason::Left)
        .unwrap();

    let ended = next_event(&mut events, |e| matches!(e, MergeEvent::EndOfMatch { .. })).await;
    assert_eq!(
        ended,
        MergeEvent::EndOfMatch {
            match_id: MatchId::new("m-1"),
            reason: EndReason::HostLost,
        }
    );
    assert_eq!(h.tandem.match_state().await, MatchState::None);
    assert_eq!(h.tandem.switch_state().await, SwitchState::None);
    assert!(h.tandem.host_room_seats().await.is_empty());
}

// =========================================================================
// request_match: guest side
// =========================================================================

struct Guest {
    tandem: Tandem<MockBackend, MockPlatform>,
    backend: Arc<MockBackend>,
    platform: Arc<MockPlatform>,
    sink: TransportSink,
}

const GUEST_OPEN_ID: &str = "guest-2-open";

fn guest() -> Guest {
    let (sink, inbox) = handoff_channel();
    let transport = Arc::new(LoopbackTransport::new(sink.clone()));
    let platform = Arc::new(MockPlatform::new("sess-guest", "rtc-guest"));
    let backend = Arc::new(MockBackend::new(Identity::new(GUEST_OPEN_ID, "Guest")));
    let tandem = TandemBuilder::new()
        .config(config())
        .build(backend.clone(), platform.clone(), transport, inbox)
        .unwrap();
    Guest {
        tandem,
        backend,
        platform,
        sink,
    }
}

fn guest_session(guest: &Guest) -> MatchSession {
    MatchSession {
        match_id: MatchId::new("m-1"),
        is_host: false,
        local_seat: SeatIndex(2),
        host: Identity::new(HOST_OPEN_ID, "Host"),
        teams: vec![MatchTeam {
            participants: vec![
                participant(0, HOST_OPEN_ID, Some(host_platform().seed())),
                participant(2, GUEST_OPEN_ID, Some(guest.platform.seed())),
            ],
        }],
    }
}

fn host_token() -> SwitchToken {
    SwitchToken::new("sess-host", HOST_OPEN_ID, "rtc-host")
}

#[tokio::test(start_paused = true)]
async fn test_request_match_as_guest_switches_onto_host() {
    let g = guest();
    g.backend.push_match(Ok(guest_session(&g)));

    let result = g
        .tandem
        .request_match(request(), CancellationToken::new())
        .await;

    assert!(result.is_success(), "{result:?}");
    assert_eq!(g.tandem.match_state().await, MatchState::InConnectOtherRoom);
    assert_eq!(g.tandem.switch_state().await, SwitchState::Switched);
}

#[tokio::test(start_paused = true)]
async fn test_request_match_while_connected_to_other_room_is_invalid_state() {
    let g = guest();
    g.backend.push_match(Ok(guest_session(&g)));
    g.tandem
        .request_match(request(), CancellationToken::new())
        .await;

    let again = g
        .tandem
        .request_match(request(), CancellationToken::new())
        .await;

    assert_eq!(again.code, ResultCode::InvalidState);
    assert_eq!(g.backend.request_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_guest_sent_home_by_host_message() {
    let g = guest();
    let mut events = g.tandem.subscribe();
    g.backend.push_match(Ok(guest_session(&g)));
    g.tandem
        .request_match(request(), CancellationToken::new())
        .await;

    let payload = JsonCodec
        .encode(&MergeMessage::EndOfMatch {
            match_id: MatchId::new("m-1"),
            info: "thanks".into(),
            token: host_token(),
        })
        .unwrap();
    g.sink.on_message(SeatIndex::HOST, payload).unwrap();

    let ended = next_event(&mut events, |e| matches!(e, MergeEvent::EndOfMatch { .. })).await;
    assert_eq!(
        ended,
        MergeEvent::EndOfMatch {
            match_id: MatchId::new("m-1"),
            reason: EndReason::Kicked,
        }
    );
    assert_eq!(g.tandem.match_state().await, MatchState::None);
    assert_eq!(g.tandem.switch_state().await, SwitchState::None);
}

#[tokio::test(start_paused = true)]
async fn test_guest_ignores_end_from_another_host() {
    let g = guest();
    g.backend.push_match(Ok(guest_session(&g)));
    g.tandem
        .request_match(request(), CancellationToken::new())
        .await;

    let payload = JsonCodec
        .encode(&MergeMessage::EndOfMatch {
            match_id: MatchId::new("m-1"),
            info: "not yours".into(),
            token: SwitchToken::new("sess-other", "other", "rtc-other"),
        })
        .unwrap();
    g.sink.on_message(SeatIndex::HOST, payload).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(g.tandem.match_state().await, MatchState::InConnectOtherRoom);
}

#[tokio::test(start_paused = true)]
async fn test_request_match_self_switch_is_rejected() {
    let g = guest();
    let own = Some(g.platform.seed());
    g.backend.push_match(Ok(MatchSession {
        match_id: MatchId::new("m-self"),
        is_host: false,
        local_seat: SeatIndex(2),
        host: Identity::new(GUEST_OPEN_ID, "Guest"),
        teams: vec![MatchTeam {
            participants: vec![
                participant(0, GUEST_OPEN_ID, own.clone()),
                participant(2, GUEST_OPEN_ID, own),
            ],
        }],
    }));

    let result = g
        .tandem
        .request_match(request(), CancellationToken::new())
        .await;

    assert_eq!(result.code, ResultCode::Error);
    assert!(result.message.contains("invalid switch token"), "{}", result.message);
    assert_eq!(g.tandem.match_state().await, MatchState::None);
    assert!(g.platform.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_request_match_switch_rejected_rolls_back() {
    let g = guest();
    g.platform.set_switch_response(5, "host full");
    g.backend.push_match(Ok(guest_session(&g)));

    let result = g
        .tandem
        .request_match(request(), CancellationToken::new())
        .await;

    assert_eq!(result.code, ResultCode::Error);
    assert_eq!(g.tandem.match_state().await, MatchState::None);
    assert_eq!(g.tandem.switch_state().await, SwitchState::None);
}
