mod common;

use common::{client_for, eventually, init_logging, test_config, wait_for_event, FakeDiscord};
use presence_link::ipc::Opcode;
use presence_link::{
    EndpointHint, Event, EventHandler, IpcConfig, PresenceBuilder, PresenceError, ReadyInfo,
    ReconnectPolicy, SessionState, SubscriptionKind,
};
use serde_json::json;
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn is_ready(event: &Event) -> bool {
    matches!(event, Event::Ready(_))
}

#[test]
fn ready_is_first_event_and_state_becomes_connected() {
    init_logging();
    let discord = FakeDiscord::new(&[0]);
    let mut client = client_for(&discord, test_config());
    assert_eq!(client.state(), SessionState::Disconnected);

    client.start().unwrap();
    let events = wait_for_event(&mut client, WAIT, is_ready);
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::Ready(info) => {
            assert_eq!(info.endpoint, 0);
            assert_eq!(info.version, Some(1));
            assert_eq!(info.user.as_ref().map(|u| u.username.as_str()), Some("fake"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(client.state(), SessionState::Connected);
    assert!(client.is_connected());

    let handshakes = discord.handshakes();
    assert_eq!(handshakes, vec![json!({ "v": 1, "client_id": common::CLIENT_ID })]);
}

#[test]
fn presence_updates_before_connect_are_coalesced() {
    init_logging();
    let discord = FakeDiscord::new(&[0]);
    let mut client = client_for(&discord, test_config());

    for state in ["one", "two", "three"] {
        client
            .set_presence(PresenceBuilder::new().state(state).build())
            .unwrap();
    }
    assert_eq!(client.queued_commands(), 1);

    client.start().unwrap();
    let events = wait_for_event(&mut client, WAIT, |event| {
        matches!(event, Event::PresenceUpdated { .. })
    });
    assert!(is_ready(&events[0]));

    let sent = discord.commands_named("SET_ACTIVITY");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["args"]["activity"]["state"], "three");
    assert_eq!(sent[0]["args"]["pid"], std::process::id());
}

#[test]
fn clear_presence_sends_null_activity() {
    let discord = FakeDiscord::new(&[0]);
    let mut client = client_for(&discord, test_config());
    client.start().unwrap();
    wait_for_event(&mut client, WAIT, is_ready);

    let handle = client.clear_presence();
    let events = wait_for_event(&mut client, WAIT, |event| {
        matches!(event, Event::PresenceUpdated { .. })
    });
    match events.last() {
        Some(Event::PresenceUpdated { nonce, presence }) => {
            assert_eq!(nonce, handle.nonce());
            assert!(presence.is_none());
        }
        other => panic!("unexpected event: {other:?}"),
    }
    let sent = discord.commands_named("SET_ACTIVITY");
    assert!(sent[0]["args"]["activity"].is_null());
}

#[test]
fn transport_failure_disconnects_and_backs_off() {
    init_logging();
    let discord = FakeDiscord::new(&[0]);
    let config = test_config().with_reconnect(ReconnectPolicy::fixed(Duration::from_millis(400)));
    let mut client = client_for(&discord, config);
    client.start().unwrap();
    wait_for_event(&mut client, WAIT, is_ready);
    assert_eq!(discord.open_attempts(), 1);

    discord.drop_connection();
    wait_for_event(&mut client, WAIT, |event| {
        matches!(event, Event::Disconnected { .. })
    });
    assert_ne!(client.state(), SessionState::Connected);

    // No attempt before the backoff elapses
    thread::sleep(Duration::from_millis(100));
    assert_eq!(discord.open_attempts(), 1);

    wait_for_event(&mut client, WAIT, is_ready);
    assert_eq!(discord.open_attempts(), 2);
}

#[test]
fn unknown_event_is_surfaced_as_unhandled() {
    let discord = FakeDiscord::new(&[0]);
    let mut client = client_for(&discord, test_config());
    client.start().unwrap();
    wait_for_event(&mut client, WAIT, is_ready);

    discord.inject(json!({ "cmd": "DISPATCH", "evt": "SOMETHING_NEW", "data": { "x": 1 } }));
    let events = wait_for_event(&mut client, WAIT, |event| {
        matches!(event, Event::Unhandled { .. })
    });
    match events.last() {
        Some(Event::Unhandled { cmd, evt, data }) => {
            assert_eq!(cmd.as_deref(), Some("DISPATCH"));
            assert_eq!(evt.as_deref(), Some("SOMETHING_NEW"));
            assert_eq!(data, &Some(json!({ "x": 1 })));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(client.state(), SessionState::Connected);
}

#[test]
fn subscription_set_changes_only_on_confirmation() {
    let discord = FakeDiscord::new(&[0]);
    discord.set_auto_reply(false);
    let mut client = client_for(&discord, test_config());
    client.start().unwrap();
    wait_for_event(&mut client, WAIT, is_ready);

    client.subscribe(SubscriptionKind::Join);
    eventually(WAIT, || !discord.commands_named("SUBSCRIBE").is_empty());
    let sent = discord.commands_named("SUBSCRIBE");
    assert_eq!(sent[0]["evt"], "ACTIVITY_JOIN");

    client.drain_events();
    assert!(client.subscriptions().is_empty());

    discord.inject(json!({
        "cmd": "SUBSCRIBE",
        "data": { "evt": "ACTIVITY_JOIN" },
        "evt": null,
        "nonce": sent[0]["nonce"]
    }));
    wait_for_event(&mut client, WAIT, |event| {
        *event == Event::Subscribed(SubscriptionKind::Join)
    });
    assert!(client.subscriptions().contains(SubscriptionKind::Join));

    discord.set_auto_reply(true);
    client.unsubscribe(SubscriptionKind::Join);
    wait_for_event(&mut client, WAIT, |event| {
        *event == Event::Unsubscribed(SubscriptionKind::Join)
    });
    assert!(client.subscriptions().is_empty());
}

#[test]
fn presence_and_subscriptions_are_resent_after_reconnect() {
    let discord = FakeDiscord::new(&[0]);
    let mut client = client_for(&discord, test_config());
    client
        .set_presence(PresenceBuilder::new().state("questing").build())
        .unwrap();
    client.subscribe(SubscriptionKind::Spectate);
    client.start().unwrap();
    wait_for_event(&mut client, WAIT, |event| {
        matches!(event, Event::Subscribed(_))
    });

    discord.drop_connection();
    wait_for_event(&mut client, WAIT, |event| {
        matches!(event, Event::Disconnected { .. })
    });
    wait_for_event(&mut client, WAIT, is_ready);

    eventually(WAIT, || {
        discord.commands_named("SET_ACTIVITY").len() == 2
            && discord.commands_named("SUBSCRIBE").len() == 2
    });
    let presences = discord.commands_named("SET_ACTIVITY");
    assert_eq!(presences[1]["args"]["activity"]["state"], "questing");
    let subscribes = discord.commands_named("SUBSCRIBE");
    assert_eq!(subscribes[1]["evt"], "ACTIVITY_SPECTATE");
}

#[test]
fn unsubscribe_while_disconnected_is_not_undone_by_reconnect() {
    let discord = FakeDiscord::new(&[0]);
    let mut client = client_for(&discord, test_config());
    client.subscribe(SubscriptionKind::Join);
    client.start().unwrap();
    wait_for_event(&mut client, WAIT, |event| {
        *event == Event::Subscribed(SubscriptionKind::Join)
    });

    discord.set_available(&[]);
    discord.drop_connection();
    wait_for_event(&mut client, WAIT, |event| {
        matches!(event, Event::Disconnected { .. })
    });
    client.unsubscribe(SubscriptionKind::Join);
    discord.set_available(&[0]);

    wait_for_event(&mut client, WAIT, |event| {
        *event == Event::Unsubscribed(SubscriptionKind::Join)
    });
    thread::sleep(Duration::from_millis(100));
    assert!(client
        .drain_events()
        .iter()
        .all(|event| !matches!(event, Event::Subscribed(_))));
    assert!(!client.subscriptions().contains(SubscriptionKind::Join));

    let wire: Vec<String> = discord
        .commands()
        .iter()
        .map(|command| {
            format!(
                "{} {}",
                command["cmd"].as_str().unwrap_or_default(),
                command["evt"].as_str().unwrap_or_default()
            )
        })
        .collect();
    assert_eq!(
        wire,
        vec!["SUBSCRIBE ACTIVITY_JOIN", "UNSUBSCRIBE ACTIVITY_JOIN"]
    );
}

#[test]
fn stop_suppresses_further_attempts() {
    let discord = FakeDiscord::new(&[]);
    let mut client = client_for(&discord, test_config());
    client.start().unwrap();
    eventually(WAIT, || discord.open_attempts() > 0);

    client.stop().unwrap();
    assert!(!client.is_running());
    let attempts = discord.open_attempts();
    thread::sleep(Duration::from_millis(300));
    assert_eq!(discord.open_attempts(), attempts);
    assert_eq!(client.state(), SessionState::Disconnected);

    // Stopping twice is fine
    client.stop().unwrap();
}

#[test]
fn stop_sends_close_frame() {
    let discord = FakeDiscord::new(&[0]);
    let mut client = client_for(&discord, test_config());
    client.start().unwrap();
    wait_for_event(&mut client, WAIT, is_ready);

    client.stop().unwrap();
    assert_eq!(discord.close_frames(), 1);
}

#[test]
fn first_available_endpoint_is_selected() {
    let discord = FakeDiscord::new(&[3, 7]);
    let mut client = client_for(&discord, test_config());
    client.start().unwrap();

    let events = wait_for_event(&mut client, WAIT, is_ready);
    assert!(matches!(events[0], Event::Ready(ReadyInfo { endpoint: 3, .. })));
    assert_eq!(discord.opened(), vec![3]);
    assert_eq!(discord.open_attempts(), 4);
}

#[test]
fn explicit_endpoint_is_the_only_one_tried() {
    let discord = FakeDiscord::new(&[0, 5]);
    let config = test_config().with_endpoint(EndpointHint::Index(5));
    let mut client = client_for(&discord, config);
    client.start().unwrap();

    wait_for_event(&mut client, WAIT, is_ready);
    assert_eq!(discord.opened(), vec![5]);
    assert_eq!(discord.open_attempts(), 1);
}

#[test]
fn remote_error_keeps_the_session() {
    let discord = FakeDiscord::new(&[0]);
    let mut client = client_for(&discord, test_config());
    client.start().unwrap();
    wait_for_event(&mut client, WAIT, is_ready);

    discord.inject(json!({
        "cmd": "SET_ACTIVITY",
        "evt": "ERROR",
        "data": { "code": 4000, "message": "child \"activity\" fails" },
        "nonce": "set-activity-1"
    }));
    let events = wait_for_event(&mut client, WAIT, |event| matches!(event, Event::Error(_)));
    match events.last() {
        Some(Event::Error(error)) => {
            assert_eq!(error.code, 4000);
            assert_eq!(error.nonce.as_deref(), Some("set-activity-1"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(client.state(), SessionState::Connected);
}

#[test]
fn close_frame_reports_remote_code() {
    let discord = FakeDiscord::new(&[0]);
    let config = test_config().with_reconnect(ReconnectPolicy::fixed(Duration::from_secs(10)));
    let mut client = client_for(&discord, config);
    client.start().unwrap();
    wait_for_event(&mut client, WAIT, is_ready);

    let close = serde_json::to_vec(&json!({ "code": 4000, "message": "Invalid Client ID" })).unwrap();
    discord.inject_frame(Opcode::Close, &close);
    let events = wait_for_event(&mut client, WAIT, |event| {
        matches!(event, Event::Disconnected { .. })
    });
    assert_eq!(
        events.last(),
        Some(&Event::Disconnected {
            code: Some(4000),
            reason: "Invalid Client ID".into()
        })
    );
}

#[test]
fn ping_is_answered_with_pong() {
    let discord = FakeDiscord::new(&[0]);
    let mut client = client_for(&discord, test_config());
    client.start().unwrap();
    wait_for_event(&mut client, WAIT, is_ready);

    discord.inject_frame(Opcode::Ping, b"{\"t\":1}");
    eventually(WAIT, || !discord.pongs().is_empty());
    assert_eq!(&discord.pongs()[0][..], b"{\"t\":1}");
}

#[test]
fn join_request_can_be_answered() {
    let discord = FakeDiscord::new(&[0]);
    let mut client = client_for(&discord, test_config());
    client.start().unwrap();
    wait_for_event(&mut client, WAIT, is_ready);

    discord.inject(json!({
        "cmd": "DISPATCH",
        "evt": "ACTIVITY_JOIN_REQUEST",
        "data": { "user": { "id": "777", "username": "friend" } }
    }));
    let events = wait_for_event(&mut client, WAIT, |event| {
        matches!(event, Event::JoinRequest(_))
    });
    let user = match events.last() {
        Some(Event::JoinRequest(user)) => user.clone(),
        other => panic!("unexpected event: {other:?}"),
    };
    assert_eq!(user.username, "friend");

    client.respond(user.id, true);
    let events = wait_for_event(&mut client, WAIT, |event| {
        matches!(event, Event::JoinRequestAnswered { .. })
    });
    assert_eq!(
        events.last(),
        Some(&Event::JoinRequestAnswered {
            user_id: Some("777".into()),
            accepted: true
        })
    );
    let sent = discord.commands_named("SEND_ACTIVITY_JOIN_INVITE");
    assert_eq!(sent[0]["args"]["user_id"], "777");
}

#[test]
fn silent_discord_times_out_handshake_without_disconnect_event() {
    let discord = FakeDiscord::new(&[0]);
    discord.set_auto_ready(false);
    let config = test_config().with_handshake_timeout(Duration::from_millis(50));
    let mut client = client_for(&discord, config);
    client.start().unwrap();

    eventually(WAIT, || discord.handshakes().len() >= 2);
    assert!(client
        .drain_events()
        .iter()
        .all(|event| !matches!(event, Event::Disconnected { .. })));
}

#[test]
fn exhausted_retry_budget_emits_final_disconnect() {
    let discord = FakeDiscord::new(&[]);
    let config = test_config()
        .with_reconnect(ReconnectPolicy::fixed(Duration::from_millis(10)).with_max_attempts(2));
    let mut client = client_for(&discord, config);
    client.start().unwrap();

    let events = wait_for_event(&mut client, WAIT, |event| {
        matches!(event, Event::Disconnected { .. })
    });
    assert_eq!(events.len(), 1);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(discord.open_attempts(), 2 * 10);
    assert!(client.poll_event().is_none());
}

#[derive(Default)]
struct Counter {
    ready: usize,
    updates: usize,
}

impl EventHandler for Counter {
    fn on_ready(&mut self, _info: &ReadyInfo) {
        self.ready += 1;
    }

    fn on_presence_update(&mut self, _nonce: &str, _presence: Option<&serde_json::Value>) {
        self.updates += 1;
    }
}

#[test]
fn pump_delivers_events_to_handler() {
    let discord = FakeDiscord::new(&[0]);
    let mut client = client_for(&discord, test_config());
    client
        .set_presence(PresenceBuilder::new().details("pumped").build())
        .unwrap();
    client.start().unwrap();
    eventually(WAIT, || !discord.commands_named("SET_ACTIVITY").is_empty());

    let mut counter = Counter::default();
    let mut delivered = 0;
    eventually(WAIT, || {
        delivered += client.pump(&mut counter);
        counter.updates == 1
    });
    assert_eq!(counter.ready, 1);
    assert_eq!(delivered, 2);
}

#[test]
fn start_twice_is_rejected() {
    let discord = FakeDiscord::new(&[0]);
    let mut client = client_for(&discord, test_config());
    client.start().unwrap();
    assert!(matches!(client.start(), Err(PresenceError::AlreadyStarted)));
}

#[test]
fn invalid_presence_is_rejected_before_queueing() {
    let discord = FakeDiscord::new(&[0]);
    let client = client_for(&discord, test_config());
    let err = client
        .set_presence(PresenceBuilder::new().state("x".repeat(129)).build())
        .unwrap_err();
    assert!(matches!(err, PresenceError::InvalidPresence(_)));
    assert_eq!(client.queued_commands(), 0);
}

#[test]
fn client_can_restart_after_stop() {
    let discord = FakeDiscord::new(&[0]);
    let mut client = client_for(&discord, test_config());
    client.start().unwrap();
    wait_for_event(&mut client, WAIT, is_ready);
    client.stop().unwrap();

    client.start().unwrap();
    wait_for_event(&mut client, WAIT, is_ready);
    assert_eq!(discord.opened(), vec![0, 0]);
}

#[test]
fn oversized_command_is_reported_and_session_continues() {
    init_logging();
    let discord = FakeDiscord::new(&[0]);
    let config = test_config().with_ipc(IpcConfig::new().with_max_payload_size(1024));
    let mut client = client_for(&discord, config);

    let url = format!("https://example.com/{}", "x".repeat(2000));
    let handle = client
        .set_presence(PresenceBuilder::new().state("big").button("Open", url).build())
        .unwrap();
    client.start().unwrap();

    let events = wait_for_event(&mut client, WAIT, |event| {
        matches!(event, Event::CommandDropped { .. })
    });
    match events.last() {
        Some(Event::CommandDropped { nonce, reason }) => {
            assert_eq!(nonce, handle.nonce());
            assert!(!reason.is_empty());
        }
        other => panic!("unexpected event: {other:?}"),
    }

    client.subscribe(SubscriptionKind::Join);
    wait_for_event(&mut client, WAIT, |event| {
        matches!(event, Event::Subscribed(SubscriptionKind::Join))
    });
    assert!(discord.commands_named("SET_ACTIVITY").is_empty());
    assert!(client.is_connected());
}
