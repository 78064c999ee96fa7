//! Connection lifecycle against the in-memory broker: handshake, state
//! transitions, terminal failures, publish and graceful disconnect.
//!
//! ```bash
//! cd link && cargo test --test test_connection_lifecycle
//! ```

use inno_link::{
    Command, ConnectionOptions, ConnectionState, DisconnectReason, EventHandlers, LinkError,
    LinkTimeouts, LiveClient, NotificationKind,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};

mod common;
use common::{client, client_with, eventually, settle, MockBroker, TOKEN};

fn recording_states() -> (EventHandlers, Arc<Mutex<Vec<ConnectionState>>>) {
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = states.clone();
    let handlers = EventHandlers::new().on_state_change(move |s| sink.lock().unwrap().push(s));
    (handlers, states)
}

#[tokio::test(start_paused = true)]
async fn test_connect_handshake_and_states() {
    let broker = MockBroker::new();
    let (handlers, states) = recording_states();
    let client = client_with(&broker, ConnectionOptions::default(), handlers);

    assert_eq!(client.state(), ConnectionState::NotInitialized);
    client.connect(TOKEN).await.unwrap();

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(
        *states.lock().unwrap(),
        vec![ConnectionState::Connecting, ConnectionState::Connected]
    );

    let connect = broker.frames().into_iter().find(|f| f.command == Command::Connect).unwrap();
    assert_eq!(connect.get("accept-version"), Some("1.2"));
    assert_eq!(connect.get("host"), Some("/"));
    assert_eq!(connect.get("heart-beat"), Some("0,0"));
    assert_eq!(connect.get("Authorization"), Some("Bearer test-token"));
    assert_eq!(broker.tokens(), vec![TOKEN.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_connect_accepts_bearer_prefixed_token() {
    let broker = MockBroker::new();
    let client = client(&broker);

    client.connect("Bearer abc").await.unwrap();
    assert_eq!(broker.tokens(), vec!["abc".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_second_connect_is_noop() {
    let broker = MockBroker::new();
    let client = client(&broker);

    client.connect(TOKEN).await.unwrap();
    client.connect(TOKEN).await.unwrap();

    assert_eq!(broker.opens(), 1);
    assert_eq!(broker.count(Command::Connect), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_connects_open_once() {
    let broker = MockBroker::new();
    let client = client(&broker);

    let (a, b) = tokio::join!(client.connect(TOKEN), client.connect(TOKEN));
    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(broker.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_blank_token_is_auth_missing() {
    let broker = MockBroker::new();
    let client = client(&broker);

    assert_eq!(client.connect("").await, Err(LinkError::AuthMissing));
    assert_eq!(client.state(), ConnectionState::Error);
    assert_eq!(broker.opens(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_blank_token_keeps_live_session() {
    let broker = MockBroker::new();
    let client = client(&broker);

    client.connect(TOKEN).await.unwrap();
    assert_eq!(client.connect("   ").await, Err(LinkError::AuthMissing));
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_credential_is_terminal() {
    let broker = MockBroker::new();
    broker.reject_auth(true);

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let handlers = EventHandlers::new().on_error(move |e| sink.lock().unwrap().push(e));
    let client = client_with(&broker, ConnectionOptions::default(), handlers);

    let err = client.connect(TOKEN).await.unwrap_err();
    assert_eq!(err, LinkError::HandshakeFailure("Invalid token".to_string()));
    assert!(err.is_terminal());
    assert_eq!(client.state(), ConnectionState::Error);

    // no automatic retry, however long we wait
    sleep(Duration::from_secs(120)).await;
    assert_eq!(broker.opens(), 1);

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(!errors[0].recoverable);
}

#[tokio::test(start_paused = true)]
async fn test_initial_transport_failure_is_not_retried() {
    let broker = MockBroker::new();
    broker.fail_next_opens(1);
    let client = client(&broker);

    let err = client.connect(TOKEN).await.unwrap_err();
    assert!(matches!(err, LinkError::TransportFailure(_)));
    assert_eq!(client.state(), ConnectionState::Disconnected);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(broker.opens(), 1);

    // a manual connect works once the server is back
    client.connect(TOKEN).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(broker.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_handshake_timeout() {
    let broker = MockBroker::new();
    broker.silent_handshake(true);
    let client = client(&broker);

    let started = Instant::now();
    let err = client.connect(TOKEN).await.unwrap_err();

    assert!(matches!(err, LinkError::TimeoutError(_)));
    assert!(!err.is_terminal());
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(2), "waited {:?}", waited);
    assert!(waited < Duration::from_secs(3), "waited {:?}", waited);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_unsubscribes_and_waits_for_receipt() {
    let broker = MockBroker::new();
    let reasons: Arc<Mutex<Vec<DisconnectReason>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = reasons.clone();
    let handlers = EventHandlers::new().on_disconnect(move |r| sink.lock().unwrap().push(r));
    let client = client_with(&broker, ConnectionOptions::default(), handlers);

    client.connect(TOKEN).await.unwrap();
    let notifications = client.subscribe("/topic/notifications", |_| {});
    let team = client.subscribe("/topic/teams/42", |_| {});
    eventually("two SUBSCRIBE frames", || broker.count(Command::Subscribe) == 2).await;

    client.disconnect().await;

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.subscriptions().is_empty());
    assert!(!notifications.is_active());
    assert!(!team.is_active());

    let mut unsubscribed = broker.unsubscribes();
    unsubscribed.sort();
    let mut subscribed: Vec<String> = broker.subscribes().into_iter().map(|(id, _)| id).collect();
    subscribed.sort();
    assert_eq!(unsubscribed, subscribed);

    let disconnect = broker.frames().into_iter().find(|f| f.command == Command::Disconnect).unwrap();
    assert!(disconnect.get("receipt").unwrap().starts_with("disconnect-"));
    eventually("socket closed", || !broker.has_session()).await;

    let reasons = reasons.lock().unwrap();
    assert_eq!(reasons.len(), 1);
    assert_eq!(reasons[0].code, Some(1000));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_idempotent() {
    let broker = MockBroker::new();
    let client = client(&broker);

    // before any connect
    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    client.connect(TOKEN).await.unwrap();
    let _sub = client.subscribe("/topic/notifications", |_| {});
    client.disconnect().await;
    let frames_after_first = broker.frames().len();

    client.disconnect().await;
    settle().await;

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(broker.frames().len(), frames_after_first);
    assert_eq!(broker.count(Command::Disconnect), 1);
    assert_eq!(broker.count(Command::Unsubscribe), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_without_receipt_is_bounded() {
    let broker = MockBroker::new();
    broker.skip_receipts(true);
    let client = client(&broker);

    client.connect(TOKEN).await.unwrap();
    let started = Instant::now();
    client.disconnect().await;

    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(1), "waited {:?}", waited);
    assert!(waited < Duration::from_secs(2), "waited {:?}", waited);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_disconnect() {
    let broker = MockBroker::new();
    let client = client(&broker);

    client.connect(TOKEN).await.unwrap();
    client.disconnect().await;
    client.connect(TOKEN).await.unwrap();

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(broker.opens(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_publish_serializes_json() {
    let broker = MockBroker::new();
    let client = client(&broker);
    client.connect(TOKEN).await.unwrap();

    client.publish("/app/custom", &serde_json::json!({"hello": "world"}));
    eventually("SEND frame", || broker.count(Command::Send) == 1).await;

    let send = broker.frames().into_iter().find(|f| f.command == Command::Send).unwrap();
    assert_eq!(send.destination(), Some("/app/custom"));
    assert_eq!(send.get("content-type"), Some("application/json"));
    assert_eq!(send.get("content-length"), Some(send.body.len().to_string().as_str()));
    assert_eq!(send.body, r#"{"hello":"world"}"#);
}

#[tokio::test(start_paused = true)]
async fn test_team_action_helpers() {
    let broker = MockBroker::new();
    let client = client(&broker);
    client.connect(TOKEN).await.unwrap();

    client.notify_team("42", "Standup", "in 5 minutes", NotificationKind::TeamUpdate);
    client.join_team("42");
    client.schedule_team_meeting("42", "Retro", "2024-05-01T10:00:00Z");
    client.request_team_help("42", "stuck on CI", inno_link::HelpPriority::High);
    client.start_team_sprint("42", 3, "2024-05-06");
    eventually("five SEND frames", || broker.count(Command::Send) == 5).await;

    let sends = broker.sends();
    let destinations: Vec<&str> = sends.iter().map(|(d, _)| d.as_str()).collect();
    assert_eq!(
        destinations,
        vec![
            "/app/team.notify",
            "/app/team.join",
            "/app/team.meeting.schedule",
            "/app/team.help.request",
            "/app/team.sprint.start",
        ]
    );

    let notify: serde_json::Value = serde_json::from_str(&sends[0].1).unwrap();
    assert_eq!(notify["teamId"], "42");
    assert_eq!(notify["title"], "Standup");
    assert_eq!(notify["message"], "in 5 minutes");
    assert_eq!(notify["type"], "TEAM_UPDATE");
    assert!(notify["timestamp"].is_string());

    let join: serde_json::Value = serde_json::from_str(&sends[1].1).unwrap();
    assert_eq!(join["teamId"], "42");
    assert!(join["timestamp"].is_string());

    let sprint: serde_json::Value = serde_json::from_str(&sends[4].1).unwrap();
    assert_eq!(sprint["sprintNumber"], 3);
}

#[tokio::test(start_paused = true)]
async fn test_publish_while_disconnected_is_dropped() {
    let broker = MockBroker::new();
    let client = client(&broker);

    client.publish("/app/team.join", &serde_json::json!({"teamId": "42"}));
    client.join_team("42");
    settle().await;

    assert_eq!(broker.count(Command::Send), 0);
    assert_eq!(client.state(), ConnectionState::NotInitialized);
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_hooks() {
    let broker = MockBroker::new();
    let connects = Arc::new(AtomicUsize::new(0));
    let sent = Arc::new(Mutex::new(Vec::<String>::new()));
    let received = Arc::new(Mutex::new(Vec::<String>::new()));

    let handlers = {
        let connects = connects.clone();
        let sent = sent.clone();
        let received = received.clone();
        EventHandlers::new()
            .on_connect(move || {
                connects.fetch_add(1, Ordering::SeqCst);
            })
            .on_send(move |raw| sent.lock().unwrap().push(raw.to_string()))
            .on_receive(move |raw| received.lock().unwrap().push(raw.to_string()))
    };
    let client = client_with(&broker, ConnectionOptions::default(), handlers);

    client.connect(TOKEN).await.unwrap();

    assert_eq!(connects.load(Ordering::SeqCst), 1);
    assert!(sent.lock().unwrap()[0].starts_with("CONNECT\n"));
    assert!(received.lock().unwrap()[0].starts_with("CONNECTED\n"));
}

#[tokio::test(start_paused = true)]
async fn test_client_sends_heartbeats() {
    let broker = MockBroker::new();
    broker.server_heartbeat("1000,1000");
    let client = LiveClient::builder()
        .transport(broker.clone())
        .timeouts(
            LinkTimeouts::builder()
                .heartbeat(Duration::from_millis(1000))
                .heartbeat_grace(Duration::from_millis(500))
                .build(),
        )
        .build()
        .unwrap();

    client.connect(TOKEN).await.unwrap();
    for _ in 0..6 {
        sleep(Duration::from_millis(500)).await;
        assert!(broker.push_heartbeat());
    }
    settle().await;

    assert!(broker.client_heartbeats() >= 2, "got {}", broker.client_heartbeats());
    assert_eq!(broker.opens(), 1);
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_missed_heartbeats_drop_session() {
    let broker = MockBroker::new();
    broker.server_heartbeat("1000,0");
    let client = LiveClient::builder()
        .transport(broker.clone())
        .connection_options(ConnectionOptions::new().with_reconnect_delay_ms(100))
        .timeouts(
            LinkTimeouts::builder()
                .heartbeat_outgoing(Duration::ZERO)
                .heartbeat_incoming(Duration::from_millis(1000))
                .heartbeat_grace(Duration::from_millis(500))
                .build(),
        )
        .build()
        .unwrap();

    client.connect(TOKEN).await.unwrap();

    // silent server: dropped at 1.5s, reconnected 100ms later
    sleep(Duration::from_millis(1400)).await;
    assert_eq!(broker.opens(), 1);
    sleep(Duration::from_millis(300)).await;
    eventually("reconnected", || broker.opens() == 2).await;
    eventually("connected again", || client.state() == ConnectionState::Connected).await;
}

#[tokio::test(start_paused = true)]
async fn test_server_error_frame_ends_session() {
    let broker = MockBroker::new();
    let client = client_with(
        &broker,
        ConnectionOptions::new().with_reconnect_delay_ms(1000),
        EventHandlers::default(),
    );
    client.connect(TOKEN).await.unwrap();

    assert!(broker.push_error("Session expired"));
    eventually("dropped", || client.state() == ConnectionState::Disconnected).await;

    sleep(Duration::from_millis(1100)).await;
    eventually("reconnected", || client.state() == ConnectionState::Connected).await;
    assert_eq!(broker.opens(), 2);
}
