//! In-memory STOMP broker used by the integration tests.
//!
//! `MockBroker` implements [`Transport`], answers the handshake, acknowledges
//! `DISCONNECT` receipts and records every frame the client sends. Tests push
//! `MESSAGE` frames and simulate network drops through it. Every timer in the
//! client runs on Tokio time, so timing tests use
//! `#[tokio::test(start_paused = true)]`.

#![allow(dead_code)]

use futures_util::future::BoxFuture;
use inno_link::{
    Command, ConnectionOptions, Credential, DisconnectReason, EventHandlers, Frame, LinkError,
    LinkTimeouts, LiveClient, Transport, WireIn, WireLink, WireOut,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const TOKEN: &str = "test-token";

#[derive(Default)]
struct BrokerState {
    opens: u32,
    open_times: Vec<Instant>,
    tokens: Vec<String>,
    fail_next_opens: u32,
    refuse_all: bool,
    reject_auth: bool,
    silent_handshake: bool,
    skip_receipts: bool,
    server_heartbeat: Option<String>,
    sent: Vec<Frame>,
    client_heartbeats: u32,
    session_seq: u64,
    session: Option<(u64, mpsc::UnboundedSender<WireIn>)>,
    message_seq: u64,
}

/// Cheap to clone; clones share the same broker.
#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap()
    }

    // ── Behaviour switches ──────────────────────────────────────────────

    /// Fail the next `n` socket opens with a transport error.
    pub fn fail_next_opens(&self, n: u32) {
        self.lock().fail_next_opens = n;
    }

    /// Fail every socket open until switched off.
    pub fn refuse_all(&self, refuse: bool) {
        self.lock().refuse_all = refuse;
    }

    /// Answer `CONNECT` with `ERROR`.
    pub fn reject_auth(&self, reject: bool) {
        self.lock().reject_auth = reject;
    }

    /// Never answer `CONNECT`.
    pub fn silent_handshake(&self, silent: bool) {
        self.lock().silent_handshake = silent;
    }

    pub fn skip_receipts(&self, skip: bool) {
        self.lock().skip_receipts = skip;
    }

    /// `heart-beat` header value sent in `CONNECTED` (default: none).
    pub fn server_heartbeat(&self, value: &str) {
        self.lock().server_heartbeat = Some(value.to_string());
    }

    // ── Server-side actions ─────────────────────────────────────────────

    /// Deliver a `MESSAGE` on the live session. Returns false without one.
    pub fn push_message(&self, destination: &str, body: &str) -> bool {
        let mut state = self.lock();
        state.message_seq += 1;
        let frame = Frame::new(Command::Message)
            .header("destination", destination)
            .header("message-id", format!("m-{}", state.message_seq))
            .header("subscription", subscription_id_for(&state.sent, destination).unwrap_or_default())
            .with_body(body);
        match &state.session {
            Some((_, tx)) => tx.send(WireIn::Frame(frame)).is_ok(),
            None => false,
        }
    }

    pub fn push_heartbeat(&self) -> bool {
        match &self.lock().session {
            Some((_, tx)) => tx.send(WireIn::Heartbeat).is_ok(),
            None => false,
        }
    }

    /// Send an `ERROR` frame on the live session.
    pub fn push_error(&self, message: &str) -> bool {
        let frame = Frame::new(Command::Error).header("message", message);
        match &self.lock().session {
            Some((_, tx)) => tx.send(WireIn::Frame(frame)).is_ok(),
            None => false,
        }
    }

    /// Simulate a network drop of the live session.
    pub fn drop_connection(&self) -> bool {
        match self.lock().session.take() {
            Some((_, tx)) => tx
                .send(WireIn::Closed(DisconnectReason::with_code("Connection reset", 1006)))
                .is_ok(),
            None => false,
        }
    }

    // ── Inspection ──────────────────────────────────────────────────────

    pub fn opens(&self) -> u32 {
        self.lock().opens
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.lock().open_times.clone()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.lock().tokens.clone()
    }

    pub fn has_session(&self) -> bool {
        self.lock().session.is_some()
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.lock().sent.clone()
    }

    pub fn clear_frames(&self) {
        self.lock().sent.clear();
    }

    pub fn count(&self, command: Command) -> usize {
        self.lock().sent.iter().filter(|f| f.command == command).count()
    }

    /// `(id, destination)` of every `SUBSCRIBE` the client sent.
    pub fn subscribes(&self) -> Vec<(String, String)> {
        self.lock()
            .sent
            .iter()
            .filter(|f| f.command == Command::Subscribe)
            .map(|f| {
                (
                    f.get("id").unwrap_or_default().to_string(),
                    f.destination().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    pub fn subscribes_to(&self, destination: &str) -> usize {
        self.subscribes().iter().filter(|(_, d)| d == destination).count()
    }

    /// Ids of every `UNSUBSCRIBE` the client sent.
    pub fn unsubscribes(&self) -> Vec<String> {
        self.lock()
            .sent
            .iter()
            .filter(|f| f.command == Command::Unsubscribe)
            .map(|f| f.get("id").unwrap_or_default().to_string())
            .collect()
    }

    /// `SEND` frames as `(destination, body)`.
    pub fn sends(&self) -> Vec<(String, String)> {
        self.lock()
            .sent
            .iter()
            .filter(|f| f.command == Command::Send)
            .map(|f| (f.destination().unwrap_or_default().to_string(), f.body.clone()))
            .collect()
    }

    pub fn client_heartbeats(&self) -> u32 {
        self.lock().client_heartbeats
    }

    // ── Session plumbing ────────────────────────────────────────────────

    fn on_client_frame(&self, session_id: u64, frame: Frame) {
        let mut state = self.lock();
        state.sent.push(frame.clone());

        let reply = match frame.command {
            Command::Connect if state.reject_auth => Some(
                Frame::new(Command::Error)
                    .header("message", "Invalid token")
                    .with_body("Authentication failed"),
            ),
            Command::Connect if state.silent_handshake => None,
            Command::Connect => {
                let mut connected = Frame::new(Command::Connected).header("version", "1.2");
                if let Some(hb) = &state.server_heartbeat {
                    connected = connected.header("heart-beat", hb.clone());
                }
                Some(connected)
            },
            Command::Disconnect if !state.skip_receipts => frame
                .get("receipt")
                .map(|id| Frame::new(Command::Receipt).header("receipt-id", id)),
            _ => None,
        };

        if let (Some(reply), Some((id, tx))) = (reply, &state.session) {
            if *id == session_id {
                let _ = tx.send(WireIn::Frame(reply));
            }
        }
    }

    fn on_client_close(&self, session_id: u64) {
        let mut state = self.lock();
        if matches!(&state.session, Some((id, _)) if *id == session_id) {
            state.session = None;
        }
    }

    fn on_client_heartbeat(&self) {
        self.lock().client_heartbeats += 1;
    }
}

fn subscription_id_for(sent: &[Frame], destination: &str) -> Option<String> {
    sent.iter()
        .rev()
        .find(|f| f.command == Command::Subscribe && f.destination() == Some(destination))
        .and_then(|f| f.get("id"))
        .map(str::to_string)
}

impl Transport for MockBroker {
    fn open<'a>(&'a self, credential: &'a Credential) -> BoxFuture<'a, inno_link::Result<WireLink>> {
        Box::pin(async move {
            let session_id = {
                let mut state = self.lock();
                state.opens += 1;
                state.open_times.push(Instant::now());
                state.tokens.push(credential.token().to_string());

                if state.refuse_all {
                    return Err(LinkError::TransportFailure("Connection refused".into()));
                }
                if state.fail_next_opens > 0 {
                    state.fail_next_opens -= 1;
                    return Err(LinkError::TransportFailure("Connection refused".into()));
                }
                state.session_seq += 1;
                state.session_seq
            };

            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WireOut>();
            let (in_tx, in_rx) = mpsc::unbounded_channel::<WireIn>();
            self.lock().session = Some((session_id, in_tx));

            let broker = self.clone();
            tokio::spawn(async move {
                while let Some(out) = out_rx.recv().await {
                    match out {
                        WireOut::Frame(frame) => broker.on_client_frame(session_id, frame),
                        WireOut::Heartbeat => broker.on_client_heartbeat(),
                        WireOut::Close => break,
                    }
                }
                broker.on_client_close(session_id);
            });

            Ok(WireLink { tx: out_tx, rx: in_rx })
        })
    }
}

// ── Client helpers ──────────────────────────────────────────────────────────

/// Timeouts with heart-beats switched off so idle sessions stay up.
pub fn quiet_timeouts() -> LinkTimeouts {
    LinkTimeouts::builder()
        .connection_timeout(Duration::from_secs(2))
        .handshake_timeout(Duration::from_secs(2))
        .disconnect_timeout(Duration::from_secs(1))
        .heartbeat(Duration::ZERO)
        .build()
}

pub fn client_with(broker: &MockBroker, options: ConnectionOptions, handlers: EventHandlers) -> LiveClient {
    LiveClient::builder()
        .transport(broker.clone())
        .connection_options(options)
        .timeouts(quiet_timeouts())
        .event_handlers(handlers)
        .build()
        .unwrap()
}

pub fn client(broker: &MockBroker) -> LiveClient {
    client_with(broker, ConnectionOptions::default(), EventHandlers::default())
}

/// Let spawned tasks run until `cond` holds. Does not advance time.
pub async fn eventually(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..1_000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true: {}", what);
}

/// Poll `cond` on wall-clock time (real sockets), for up to five seconds.
pub async fn eventually_real(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true: {}", what);
}

/// Let spawned tasks drain their queues.
pub async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}

pub fn team_update_json(team_id: &str, member_name: &str) -> String {
    serde_json::json!({
        "teamId": team_id,
        "action": "MEMBER_ADDED",
        "memberName": member_name,
        "updatedBy": "admin",
        "timestamp": "T",
    })
    .to_string()
}

pub fn notification_json(id: &str, title: &str) -> String {
    serde_json::json!({
        "id": id,
        "title": title,
        "message": "body",
        "type": "INFO",
        "timestamp": "2024-01-01T00:00:00Z",
    })
    .to_string()
}
