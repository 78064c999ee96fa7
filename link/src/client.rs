//! Live client with builder pattern.
//!
//! [`LiveClient`] is the owned context object for one logical session: it
//! holds the connection state, the subscription registry and the handle on
//! the background connection task. Construct it on application start, call
//! [`LiveClient::disconnect`] on logout or shutdown.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{oneshot, watch};

use crate::{
    auth::Credential,
    config::LinkConfig,
    connection::{spawn_connection, ConnCmd, ConnectionParams, ConnectionTask, StateTracker},
    error::{LinkError, Result},
    event_handlers::EventHandlers,
    models::{
        iso_timestamp, ConnectionOptions, ConnectionState, Destinations, HelpPriority,
        HelpRequest, InboundMessage, MeetingScheduleRequest, NotificationKind, SprintStartRequest,
        SubscriptionInfo, TeamJoinRequest, TeamNotifyRequest, TEAM_ID_PLACEHOLDER,
    },
    registry::{Attach, Detach, HandlerId, MessageHandler, SubscriptionHandle, SubscriptionRegistry},
    timeouts::LinkTimeouts,
    transport::{Transport, WsTransport},
};

/// Extra time granted to the connection task beyond the receipt wait.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

pub(crate) struct ClientInner {
    transport: Arc<dyn Transport>,
    options: ConnectionOptions,
    timeouts: LinkTimeouts,
    destinations: Arc<Destinations>,
    event_handlers: EventHandlers,
    state: Arc<StateTracker>,
    registry: Arc<SubscriptionRegistry>,
    // Registry changes that need wire traffic happen under this lock so the
    // connection task sees SUBSCRIBE/UNSUBSCRIBE in registry order.
    lifecycle: Mutex<Option<ConnectionTask>>,
}

impl ClientInner {
    fn lock_lifecycle(&self) -> MutexGuard<'_, Option<ConnectionTask>> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub(crate) fn release_handler(&self, destination: &str, handler_id: HandlerId) {
        let lifecycle = self.lock_lifecycle();
        match self.registry.remove_handler(destination, handler_id) {
            Detach::Closed { sub_id } => {
                log::debug!("[inno-link] Last handler left {}; unsubscribing", destination);
                if let Some(task) = lifecycle.as_ref() {
                    task.send(ConnCmd::Unsubscribe {
                        destination: destination.to_string(),
                        sub_id,
                    });
                }
            },
            Detach::Remaining(left) => {
                log::debug!("[inno-link] Handler removed from {} ({} left)", destination, left);
            },
            Detach::NotFound => {},
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = lifecycle.take() {
            let (done_tx, _done_rx) = oneshot::channel();
            task.send(ConnCmd::Shutdown { done_tx });
        }
    }
}

/// Real-time client: one shared connection, many destinations.
///
/// Cloning is cheap; clones share the same session.
///
/// # Examples
///
/// ```rust,no_run
/// use inno_link::LiveClient;
///
/// # async fn example() -> inno_link::Result<()> {
/// let client = LiveClient::builder()
///     .url("http://localhost:8080/api/v1/ws")
///     .build()?;
///
/// client.connect("eyJhbGc...").await?;
///
/// let team = client.subscribe("/topic/teams/42", |msg| {
///     println!("team update: {:?}", msg.message);
/// });
///
/// client.join_team("42");
///
/// team.unsubscribe();
/// client.disconnect().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LiveClient {
    inner: Arc<ClientInner>,
}

impl LiveClient {
    /// Create a new builder for configuring the client
    pub fn builder() -> LiveClientBuilder {
        LiveClientBuilder::new()
    }

    /// Open the session.
    ///
    /// Resolves once the server acknowledged the session. Calling this while a
    /// connect is in flight or a session is up is a no-op. Calling it while
    /// the client waits to reconnect cancels the wait and starts over.
    ///
    /// # Errors
    ///
    /// - [`LinkError::AuthMissing`] if `token` is blank
    /// - [`LinkError::HandshakeFailure`] if the server rejected the credential
    /// - [`LinkError::TransportFailure`] / [`LinkError::TimeoutError`] otherwise;
    ///   the initial attempt is not retried automatically
    pub async fn connect(&self, token: &str) -> Result<()> {
        let credential = match Credential::bearer(token) {
            Ok(credential) => credential,
            Err(e) => {
                log::warn!("[inno-link] connect() called without a credential");
                let pending = {
                    let mut lifecycle = self.inner.lock_lifecycle();
                    if matches!(
                        self.inner.state.get(),
                        ConnectionState::Connecting | ConnectionState::Connected
                    ) {
                        return Err(e);
                    }
                    lifecycle.take()
                };
                // ERROR is terminal: a reconnect timer must not revive the session.
                if let Some(task) = pending {
                    log::debug!("[inno-link] Cancelling pending reconnect; no credential");
                    task.handle.abort();
                    let _ = task.handle.await;
                }
                self.inner.state.set(ConnectionState::Error);
                return Err(e);
            },
        };

        let stale = {
            let mut lifecycle = self.inner.lock_lifecycle();
            let state = self.inner.state.get();
            if matches!(state, ConnectionState::Connecting | ConnectionState::Connected) {
                log::debug!("[inno-link] connect() ignored; session is {}", state);
                return Ok(());
            }
            lifecycle.take()
        };

        if let Some(task) = stale {
            log::debug!("[inno-link] Cancelling pending reconnect for a fresh connect");
            task.handle.abort();
            let _ = task.handle.await;
        }

        // Claim the connect under the lock; the state hook runs after the
        // guard drops so it may call back into the client.
        let announce = {
            let lifecycle = self.inner.lock_lifecycle();
            if lifecycle.is_some()
                || matches!(
                    self.inner.state.get(),
                    ConnectionState::Connecting | ConnectionState::Connected
                )
            {
                return Ok(());
            }
            log::info!("[inno-link] Connecting");
            self.inner.state.set_silently(ConnectionState::Connecting)
        };
        if announce {
            self.inner.state.announce(ConnectionState::Connecting);
        }

        let ready_rx = {
            let mut lifecycle = self.inner.lock_lifecycle();
            if lifecycle.is_some() {
                return Ok(());
            }
            if self.inner.state.get() != ConnectionState::Connecting {
                return Err(LinkError::TransportFailure(
                    "Connect cancelled by disconnect()".to_string(),
                ));
            }

            let (task, ready_rx) = spawn_connection(ConnectionParams {
                transport: Arc::clone(&self.inner.transport),
                credential,
                options: self.inner.options.clone(),
                timeouts: self.inner.timeouts.clone(),
                destinations: Arc::clone(&self.inner.destinations),
                event_handlers: self.inner.event_handlers.clone(),
                state: Arc::clone(&self.inner.state),
                registry: Arc::clone(&self.inner.registry),
            });
            *lifecycle = Some(task);
            ready_rx
        };

        match ready_rx.await {
            Ok(result) => result,
            Err(_) => Err(LinkError::TransportFailure(
                "Connection task exited before signalling readiness".to_string(),
            )),
        }
    }

    /// Close the session and drop every subscription.
    ///
    /// Sends `UNSUBSCRIBE` for each wired destination, then `DISCONNECT`, and
    /// waits (bounded) for the receipt. Cancels any pending reconnect.
    /// Idempotent.
    pub async fn disconnect(&self) {
        let task = self.inner.lock_lifecycle().take();

        let dropped = self.inner.registry.drain();
        if !dropped.is_empty() {
            log::info!("[inno-link] Dropping {} subscription(s) on disconnect", dropped.len());
        }

        if let Some(task) = task {
            let (done_tx, done_rx) = oneshot::channel();
            if task.send(ConnCmd::Shutdown { done_tx }) {
                let limit = self.inner.timeouts.disconnect_timeout + SHUTDOWN_GRACE;
                if tokio::time::timeout(limit, done_rx).await.is_err() {
                    log::debug!("[inno-link] Connection task did not stop within {:?}", limit);
                }
            }
            task.handle.abort();
            let _ = task.handle.await;
        }

        self.inner.state.set(ConnectionState::Disconnected);
    }

    /// Listen on `destination`.
    ///
    /// The first handler for a destination issues the wire subscription; this
    /// requires a connected client. When not connected the call logs
    /// [`LinkError::NotConnected`] and returns an inert handle. Joining a
    /// destination that is already registered always works.
    pub fn subscribe<F>(&self, destination: &str, handler: F) -> SubscriptionHandle
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.subscribe_handler(destination, Arc::new(handler))
    }

    pub fn subscribe_handler(&self, destination: &str, handler: MessageHandler) -> SubscriptionHandle {
        let lifecycle = self.inner.lock_lifecycle();
        let connected = self.inner.state.get().is_connected();

        match self.inner.registry.attach(destination, handler, connected) {
            Attach::Joined { handler_id } => {
                log::debug!("[inno-link] Joined existing subscription on {}", destination);
                SubscriptionHandle::active(Arc::downgrade(&self.inner), destination.to_string(), handler_id)
            },
            Attach::Opened { handler_id, sub_id } => {
                log::debug!("[inno-link] Subscribing to {} as {}", destination, sub_id);
                if let Some(task) = lifecycle.as_ref() {
                    task.send(ConnCmd::Subscribe {
                        destination: destination.to_string(),
                        sub_id,
                    });
                }
                SubscriptionHandle::active(Arc::downgrade(&self.inner), destination.to_string(), handler_id)
            },
            Attach::Refused => {
                log::warn!(
                    "[inno-link] Cannot subscribe to {}: {}",
                    destination,
                    LinkError::NotConnected
                );
                SubscriptionHandle::inert(destination.to_string())
            },
        }
    }

    /// Serialize `body` as JSON and send it to `destination`.
    ///
    /// Dropped with a warning when not connected.
    pub fn publish<T>(&self, destination: &str, body: &T)
    where
        T: Serialize + ?Sized,
    {
        if !self.inner.state.get().is_connected() {
            log::warn!(
                "[inno-link] Dropping publish to {}: {}",
                destination,
                LinkError::NotConnected
            );
            return;
        }

        let body = match serde_json::to_string(body) {
            Ok(body) => body,
            Err(e) => {
                log::warn!("[inno-link] Dropping publish to {}: {}", destination, LinkError::from(e));
                return;
            },
        };

        let queued = self
            .inner
            .lock_lifecycle()
            .as_ref()
            .map_or(false, |task| {
                task.send(ConnCmd::Send {
                    destination: destination.to_string(),
                    body,
                })
            });
        if !queued {
            log::warn!("[inno-link] Dropping publish to {}: connection task stopped", destination);
        }
    }

    // ── Team actions ─────────────────────────────────────────────────────

    pub fn notify_team(&self, team_id: &str, title: &str, message: &str, kind: NotificationKind) {
        let request = TeamNotifyRequest {
            team_id: team_id.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            kind,
            timestamp: iso_timestamp(),
        };
        self.publish(&self.inner.destinations.team_notify, &request);
    }

    pub fn join_team(&self, team_id: &str) {
        let request = TeamJoinRequest {
            team_id: team_id.to_string(),
            timestamp: iso_timestamp(),
        };
        self.publish(&self.inner.destinations.team_join, &request);
    }

    pub fn schedule_team_meeting(&self, team_id: &str, title: &str, scheduled_for: &str) {
        let request = MeetingScheduleRequest {
            team_id: team_id.to_string(),
            title: title.to_string(),
            scheduled_for: scheduled_for.to_string(),
        };
        self.publish(&self.inner.destinations.team_meeting_schedule, &request);
    }

    pub fn request_team_help(&self, team_id: &str, message: &str, priority: HelpPriority) {
        let request = HelpRequest {
            team_id: team_id.to_string(),
            message: message.to_string(),
            priority,
        };
        self.publish(&self.inner.destinations.team_help_request, &request);
    }

    pub fn start_team_sprint(&self, team_id: &str, sprint_number: u32, start_date: &str) {
        let request = SprintStartRequest {
            team_id: team_id.to_string(),
            sprint_number,
            start_date: start_date.to_string(),
        };
        self.publish(&self.inner.destinations.team_sprint_start, &request);
    }

    // ── Introspection ────────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Watch every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Snapshot of registered destinations, sorted by destination.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.inner.registry.infos()
    }

    pub fn destinations(&self) -> &Destinations {
        &self.inner.destinations
    }

    pub fn timeouts(&self) -> &LinkTimeouts {
        &self.inner.timeouts
    }
}

impl fmt::Debug for LiveClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveClient")
            .field("state", &self.inner.state.get())
            .field("subscriptions", &self.inner.registry.len())
            .field("options", &self.inner.options)
            .finish()
    }
}

/// Builder for configuring [`LiveClient`] instances.
pub struct LiveClientBuilder {
    url: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    options: ConnectionOptions,
    timeouts: LinkTimeouts,
    destinations: Destinations,
    event_handlers: EventHandlers,
}

impl LiveClientBuilder {
    fn new() -> Self {
        Self {
            url: None,
            transport: None,
            options: ConnectionOptions::default(),
            timeouts: LinkTimeouts::default(),
            destinations: Destinations::default(),
            event_handlers: EventHandlers::default(),
        }
    }

    /// Endpoint URL; `http(s)` is mapped to `ws(s)`.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Use a custom transport instead of the WebSocket one. Takes precedence
    /// over [`url`](Self::url).
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn timeouts(mut self, timeouts: LinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn destinations(mut self, destinations: Destinations) -> Self {
        self.destinations = destinations;
        self
    }

    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Apply a loaded [`LinkConfig`] (URL, options, timeouts, destinations).
    pub fn config(mut self, config: &LinkConfig) -> Self {
        self.url = Some(config.server.url.clone());
        self.options = config.connection.clone();
        self.timeouts = config.timeouts.to_timeouts();
        self.destinations = config.destinations.clone();
        self
    }

    /// Build the client
    pub fn build(self) -> Result<LiveClient> {
        if !self.destinations.team_template.contains(TEAM_ID_PLACEHOLDER) {
            return Err(LinkError::ConfigurationError(format!(
                "team destination template must contain {}",
                TEAM_ID_PLACEHOLDER
            )));
        }

        let transport: Arc<dyn Transport> = match (self.transport, self.url) {
            (Some(transport), _) => transport,
            (None, Some(url)) => Arc::new(WsTransport::new(&url)?),
            (None, None) => {
                return Err(LinkError::ConfigurationError("url is required".into()));
            },
        };

        let state = Arc::new(StateTracker::new(self.event_handlers.clone()));

        Ok(LiveClient {
            inner: Arc::new(ClientInner {
                transport,
                options: self.options,
                timeouts: self.timeouts,
                destinations: Arc::new(self.destinations),
                event_handlers: self.event_handlers,
                state,
                registry: Arc::new(SubscriptionRegistry::new()),
                lifecycle: Mutex::new(None),
            }),
        })
    }
}
