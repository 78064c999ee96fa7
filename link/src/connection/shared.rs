//! Shared STOMP connection task.
//!
//! A single background task owns the physical connection and every piece of
//! wire-level state. The public API talks to it through [`ConnCmd`]s. The task
//! handles:
//!
//! - The STOMP handshake (`CONNECT` → `CONNECTED` / `ERROR`)
//! - Heart-beats in both directions and the incoming heart-beat deadline
//! - `SUBSCRIBE` / `UNSUBSCRIBE` / `SEND` in command order
//! - Routing `MESSAGE` frames to the registry's handlers, inline, so frames on
//!   one destination are delivered in arrival order
//! - Linear-backoff reconnection and re-subscription of every registered
//!   destination before any frame of the new session is read
//! - Graceful `DISCONNECT` with a receipt

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;

use super::reconnect::{Phase, ReconnectState};
use super::{StateTracker, FAR_FUTURE};
use crate::auth::Credential;
use crate::error::{LinkError, Result};
use crate::event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
use crate::models::{ConnectionOptions, Destinations};
use crate::registry::SubscriptionRegistry;
use crate::router;
use crate::stomp::{Command, Frame, HeartBeat, Negotiated};
use crate::timeouts::LinkTimeouts;
use crate::transport::{Transport, WireIn, WireLink, WireOut};

static RECEIPT_SEQ: AtomicU64 = AtomicU64::new(0);

// ── Commands ────────────────────────────────────────────────────────────────

/// Commands sent from the public API to the background connection task.
#[derive(Debug)]
pub(crate) enum ConnCmd {
    Subscribe {
        destination: String,
        sub_id: String,
    },
    Unsubscribe {
        destination: String,
        sub_id: String,
    },
    Send {
        destination: String,
        body: String,
    },
    Shutdown {
        done_tx: oneshot::Sender<()>,
    },
}

/// Everything the task needs, owned by the task for its whole life.
pub(crate) struct ConnectionParams {
    pub transport: Arc<dyn Transport>,
    pub credential: Credential,
    pub options: ConnectionOptions,
    pub timeouts: LinkTimeouts,
    pub destinations: Arc<Destinations>,
    pub event_handlers: EventHandlers,
    pub state: Arc<StateTracker>,
    pub registry: Arc<SubscriptionRegistry>,
}

/// Handle on a running connection task.
pub(crate) struct ConnectionTask {
    pub cmd_tx: mpsc::UnboundedSender<ConnCmd>,
    pub handle: JoinHandle<()>,
}

impl ConnectionTask {
    /// Queue a command. Returns `false` if the task has exited.
    pub fn send(&self, cmd: ConnCmd) -> bool {
        self.cmd_tx.send(cmd).is_ok()
    }
}

/// Start a connection task. The receiver resolves with the outcome of the
/// initial connect.
pub(crate) fn spawn_connection(
    params: ConnectionParams,
) -> (ConnectionTask, oneshot::Receiver<Result<()>>) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = oneshot::channel();
    let handle = tokio::spawn(connection_task(params, cmd_rx, ready_tx));
    (ConnectionTask { cmd_tx, handle }, ready_rx)
}

// ── Helpers ─────────────────────────────────────────────────────────────────

struct Session {
    link: WireLink,
    heartbeat: Negotiated,
}

enum SessionEnd {
    /// Client asked to stop. `None` when the command channel closed.
    Shutdown(Option<oneshot::Sender<()>>),
    /// Unclean end; a reconnect may follow.
    Dropped(DisconnectReason),
}

enum Wake {
    Elapsed,
    Shutdown(Option<oneshot::Sender<()>>),
}

fn enter(params: &ConnectionParams, phase: &mut Phase, next: Phase) {
    *phase = next;
    params.state.set(next.state());
}

async fn with_timeout<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    if LinkTimeouts::is_no_timeout(limit) {
        return fut.await;
    }
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(LinkError::TimeoutError(format!("{} timed out after {:?}", what, limit))),
    }
}

fn transmit(params: &ConnectionParams, link: &WireLink, frame: Frame) -> Result<()> {
    if params.event_handlers.on_send.is_some() {
        params.event_handlers.emit_send(&frame.encode());
    }
    link.tx
        .send(WireOut::Frame(frame))
        .map_err(|_| LinkError::TransportFailure("Socket closed".to_string()))
}

fn report_receive(params: &ConnectionParams, frame: &Frame) {
    if params.event_handlers.on_receive.is_some() {
        params.event_handlers.emit_receive(&frame.encode());
    }
}

fn error_text(frame: &Frame) -> String {
    match frame.get("message") {
        Some(message) if !message.trim().is_empty() => message.to_string(),
        _ => frame.body.trim().to_string(),
    }
}

/// Apply a command while no session is open. Returns the shutdown
/// acknowledgement sender if the command was `Shutdown`.
fn handle_offline(cmd: ConnCmd) -> Option<oneshot::Sender<()>> {
    match cmd {
        ConnCmd::Shutdown { done_tx } => return Some(done_tx),
        ConnCmd::Send { destination, .. } => {
            log::warn!("[inno-link] Not connected; dropping publish to {}", destination);
        },
        ConnCmd::Subscribe { destination, .. } => {
            log::debug!("[inno-link] No session; {} will subscribe on next connect", destination);
        },
        ConnCmd::Unsubscribe { destination, .. } => {
            log::debug!("[inno-link] No session; nothing to unsubscribe for {}", destination);
        },
    }
    None
}

async fn idle_until_shutdown(cmd_rx: &mut mpsc::UnboundedReceiver<ConnCmd>) {
    while let Some(cmd) = cmd_rx.recv().await {
        if let Some(done_tx) = handle_offline(cmd) {
            let _ = done_tx.send(());
            return;
        }
    }
}

async fn wait_backoff(delay: Duration, cmd_rx: &mut mpsc::UnboundedReceiver<ConnCmd>) -> Wake {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            biased;
            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => {
                    if let Some(done_tx) = handle_offline(cmd) {
                        return Wake::Shutdown(Some(done_tx));
                    }
                },
                None => return Wake::Shutdown(None),
            },
            _ = &mut sleep => return Wake::Elapsed,
        }
    }
}

// ── Handshake ───────────────────────────────────────────────────────────────

async fn establish(params: &ConnectionParams) -> Result<Session> {
    log::debug!("[inno-link] Opening transport");
    let mut link = with_timeout(
        params.timeouts.connection_timeout,
        "Socket connect",
        params.transport.open(&params.credential),
    )
    .await?;

    let offer = HeartBeat::new(params.timeouts.heartbeat_outgoing, params.timeouts.heartbeat_incoming);
    transmit(
        params,
        &link,
        Frame::connect(
            &params.options.virtual_host,
            &params.credential.authorization_header(),
            offer,
        ),
    )?;

    let server = with_timeout(
        params.timeouts.handshake_timeout,
        "STOMP handshake",
        await_connected(params, &mut link),
    )
    .await?;

    let heartbeat = HeartBeat::negotiate(offer, server);
    log::info!(
        "[inno-link] Session established (heart-beat send={:?}, expect={:?})",
        heartbeat.send_every,
        heartbeat.expect_every
    );
    Ok(Session { link, heartbeat })
}

async fn await_connected(params: &ConnectionParams, link: &mut WireLink) -> Result<HeartBeat> {
    loop {
        match link.rx.recv().await {
            Some(WireIn::Frame(frame)) => {
                report_receive(params, &frame);
                match frame.command {
                    Command::Connected => {
                        let heart_beat = match frame.get("heart-beat") {
                            Some(value) => HeartBeat::parse(value).unwrap_or_else(|e| {
                                log::warn!("[inno-link] {}; heart-beats disabled", e);
                                HeartBeat::default()
                            }),
                            None => HeartBeat::default(),
                        };
                        return Ok(heart_beat);
                    },
                    Command::Error => return Err(LinkError::HandshakeFailure(error_text(&frame))),
                    other => log::debug!("[inno-link] Ignoring {} before CONNECTED", other),
                }
            },
            Some(WireIn::Heartbeat) => {},
            Some(WireIn::Closed(reason)) => {
                return Err(LinkError::TransportFailure(format!(
                    "Connection closed during handshake: {}",
                    reason
                )))
            },
            None => {
                return Err(LinkError::TransportFailure(
                    "Connection closed during handshake".to_string(),
                ))
            },
        }
    }
}

// ── Session ─────────────────────────────────────────────────────────────────

fn resubscribe_all(params: &ConnectionParams, link: &WireLink, wired: &mut HashSet<String>) {
    let entries = params.registry.snapshot_wire();
    if entries.is_empty() {
        return;
    }
    log::info!("[inno-link] Re-subscribing {} destination(s)", entries.len());
    for (destination, sub_id) in entries {
        if !wired.insert(sub_id.clone()) {
            continue;
        }
        if let Err(e) = transmit(params, link, Frame::subscribe(&sub_id, &destination)) {
            log::warn!("[inno-link] Failed to re-subscribe {}: {}", destination, e);
            return;
        }
    }
}

async fn close_session(params: &ConnectionParams, link: &mut WireLink, wired: &mut HashSet<String>) {
    for sub_id in wired.drain() {
        if transmit(params, link, Frame::unsubscribe(&sub_id)).is_err() {
            return;
        }
    }

    let receipt = format!("disconnect-{}", RECEIPT_SEQ.fetch_add(1, Ordering::Relaxed));
    if transmit(params, link, Frame::disconnect(&receipt)).is_err() {
        return;
    }

    let limit = params.timeouts.disconnect_timeout;
    if !limit.is_zero() {
        let wait_receipt = async {
            loop {
                match link.rx.recv().await {
                    Some(WireIn::Frame(frame))
                        if frame.command == Command::Receipt
                            && frame.get("receipt-id") == Some(receipt.as_str()) =>
                    {
                        return true;
                    },
                    Some(WireIn::Closed(_)) | None => return false,
                    Some(_) => {},
                }
            }
        };
        match tokio::time::timeout(limit, wait_receipt).await {
            Ok(true) => log::debug!("[inno-link] DISCONNECT acknowledged"),
            Ok(false) => log::debug!("[inno-link] Socket closed before DISCONNECT receipt"),
            Err(_) => log::debug!("[inno-link] No DISCONNECT receipt within {:?}", limit),
        }
    }

    let _ = link.tx.send(WireOut::Close);
}

async fn run_session(
    params: &ConnectionParams,
    cmd_rx: &mut mpsc::UnboundedReceiver<ConnCmd>,
    session: Session,
    phase: &mut Phase,
    ready_tx: Option<oneshot::Sender<Result<()>>>,
) -> SessionEnd {
    let Session { mut link, heartbeat } = session;
    let mut wired: HashSet<String> = HashSet::new();

    resubscribe_all(params, &link, &mut wired);

    enter(params, phase, Phase::Connected);
    params.event_handlers.emit_connect();
    if let Some(tx) = ready_tx {
        let _ = tx.send(Ok(()));
    }

    let send_every = heartbeat.send_every;
    let expect_within = heartbeat.expect_every.map(|d| d + params.timeouts.heartbeat_grace);
    let mut write_deadline = TokioInstant::now() + send_every.unwrap_or(FAR_FUTURE);
    let mut read_deadline = TokioInstant::now() + expect_within.unwrap_or(FAR_FUTURE);

    loop {
        let read_sleep = tokio::time::sleep_until(read_deadline);
        tokio::pin!(read_sleep);

        let write_sleep = tokio::time::sleep_until(write_deadline);
        tokio::pin!(write_sleep);

        tokio::select! {
            biased;

            _ = &mut read_sleep, if expect_within.is_some() => {
                let limit = expect_within.unwrap_or_default();
                log::warn!(
                    "[inno-link] No traffic from server within {:?}; connection considered lost",
                    limit
                );
                let _ = link.tx.send(WireOut::Close);
                return SessionEnd::Dropped(DisconnectReason::new(format!(
                    "Heart-beat timeout ({:?})",
                    limit
                )));
            }

            cmd = cmd_rx.recv() => {
                let sent = match cmd {
                    Some(ConnCmd::Subscribe { destination, sub_id }) => {
                        if wired.insert(sub_id.clone()) {
                            log::debug!("[inno-link] SUBSCRIBE {} as {}", destination, sub_id);
                            transmit(params, &link, Frame::subscribe(&sub_id, &destination))
                        } else {
                            Ok(())
                        }
                    },
                    Some(ConnCmd::Unsubscribe { destination, sub_id }) => {
                        if wired.remove(&sub_id) {
                            log::debug!("[inno-link] UNSUBSCRIBE {} ({})", destination, sub_id);
                            transmit(params, &link, Frame::unsubscribe(&sub_id))
                        } else {
                            Ok(())
                        }
                    },
                    Some(ConnCmd::Send { destination, body }) => {
                        transmit(params, &link, Frame::send_json(&destination, body))
                    },
                    Some(ConnCmd::Shutdown { done_tx }) => {
                        close_session(params, &mut link, &mut wired).await;
                        return SessionEnd::Shutdown(Some(done_tx));
                    },
                    None => {
                        close_session(params, &mut link, &mut wired).await;
                        return SessionEnd::Shutdown(None);
                    },
                };
                match sent {
                    Ok(()) => write_deadline = TokioInstant::now() + send_every.unwrap_or(FAR_FUTURE),
                    Err(e) => return SessionEnd::Dropped(DisconnectReason::new(e.to_string())),
                }
            }

            _ = &mut write_sleep, if send_every.is_some() => {
                if link.tx.send(WireOut::Heartbeat).is_err() {
                    return SessionEnd::Dropped(DisconnectReason::new("Socket closed"));
                }
                params.event_handlers.emit_send("[heartbeat]");
                write_deadline = TokioInstant::now() + send_every.unwrap_or(FAR_FUTURE);
            }

            wire = link.rx.recv() => {
                read_deadline = TokioInstant::now() + expect_within.unwrap_or(FAR_FUTURE);
                match wire {
                    Some(WireIn::Frame(frame)) => {
                        report_receive(params, &frame);
                        match frame.command {
                            Command::Message => {
                                router::dispatch(&params.registry, &params.destinations, &frame);
                            },
                            Command::Error => {
                                let message = error_text(&frame);
                                log::warn!("[inno-link] Server sent ERROR: {}", message);
                                params.event_handlers.emit_error(ConnectionError::new(
                                    format!("Server error: {}", message),
                                    true,
                                ));
                                let _ = link.tx.send(WireOut::Close);
                                return SessionEnd::Dropped(DisconnectReason::new(format!(
                                    "Server error: {}",
                                    message
                                )));
                            },
                            other => log::debug!("[inno-link] Ignoring {} frame", other),
                        }
                    },
                    Some(WireIn::Heartbeat) => params.event_handlers.emit_receive("[heartbeat]"),
                    Some(WireIn::Closed(reason)) => return SessionEnd::Dropped(reason),
                    None => return SessionEnd::Dropped(DisconnectReason::new("Transport closed")),
                }
            }
        }
    }
}

// ── Background connection task ──────────────────────────────────────────────

async fn connection_task(
    params: ConnectionParams,
    mut cmd_rx: mpsc::UnboundedReceiver<ConnCmd>,
    ready_tx: oneshot::Sender<Result<()>>,
) {
    let mut reconnect = ReconnectState::from_options(&params.options);
    let mut phase = Phase::Idle;
    enter(&params, &mut phase, Phase::Connecting);

    // The first attempt is never retried; its outcome belongs to connect().
    let mut session = match establish(&params).await {
        Ok(session) => session,
        Err(e) => {
            log::warn!("[inno-link] Connect failed: {}", e);
            params
                .event_handlers
                .emit_error(ConnectionError::new(e.to_string(), !e.is_terminal()));
            let next = if e.is_terminal() { Phase::Failed } else { Phase::Idle };
            enter(&params, &mut phase, next);
            let _ = ready_tx.send(Err(e));
            return;
        },
    };
    let mut ready_tx = Some(ready_tx);

    loop {
        reconnect.reset();
        let end = run_session(&params, &mut cmd_rx, session, &mut phase, ready_tx.take()).await;

        let reason = match end {
            SessionEnd::Shutdown(done_tx) => {
                enter(&params, &mut phase, Phase::Idle);
                params
                    .event_handlers
                    .emit_disconnect(DisconnectReason::with_code("Client disconnected", 1000));
                if let Some(tx) = done_tx {
                    let _ = tx.send(());
                }
                return;
            },
            SessionEnd::Dropped(reason) => reason,
        };

        log::warn!("[inno-link] Connection lost: {}", reason);
        enter(&params, &mut phase, Phase::Idle);
        params.event_handlers.emit_disconnect(reason);

        if !params.options.auto_reconnect {
            log::info!("[inno-link] Auto-reconnect disabled; staying disconnected");
            idle_until_shutdown(&mut cmd_rx).await;
            return;
        }

        session = loop {
            let Some(delay) = reconnect.next_delay() else {
                log::warn!(
                    "[inno-link] Max reconnection attempts ({}) reached",
                    reconnect.max_attempts
                );
                params.event_handlers.emit_error(ConnectionError::new(
                    format!("Max reconnection attempts ({}) reached", reconnect.max_attempts),
                    false,
                ));
                enter(&params, &mut phase, Phase::Idle);
                idle_until_shutdown(&mut cmd_rx).await;
                return;
            };

            enter(&params, &mut phase, Phase::Backoff(reconnect.attempts));
            log::info!(
                "[inno-link] Reconnecting in {}ms (attempt {}/{})",
                delay.as_millis(),
                reconnect.attempts,
                reconnect.max_attempts
            );

            if let Wake::Shutdown(done_tx) = wait_backoff(delay, &mut cmd_rx).await {
                enter(&params, &mut phase, Phase::Idle);
                if let Some(tx) = done_tx {
                    let _ = tx.send(());
                }
                return;
            }

            enter(&params, &mut phase, Phase::Connecting);
            match establish(&params).await {
                Ok(session) => {
                    log::info!(
                        "[inno-link] Reconnected after {} attempt(s)",
                        reconnect.attempts
                    );
                    break session;
                },
                Err(e) if e.is_terminal() => {
                    log::warn!("[inno-link] Reconnect rejected: {}", e);
                    params
                        .event_handlers
                        .emit_error(ConnectionError::new(e.to_string(), false));
                    enter(&params, &mut phase, Phase::Failed);
                    idle_until_shutdown(&mut cmd_rx).await;
                    return;
                },
                Err(e) => {
                    log::warn!(
                        "[inno-link] Reconnect attempt {} failed: {}",
                        reconnect.attempts,
                        e
                    );
                    params
                        .event_handlers
                        .emit_error(ConnectionError::new(e.to_string(), true));
                },
            }
        };
    }
}
