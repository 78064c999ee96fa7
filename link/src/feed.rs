//! Role-aware subscription facade.
//!
//! [`LiveFeed`] turns a declarative [`FeedConfig`] plus the caller's
//! [`SessionContext`] into concrete subscriptions on a [`LiveClient`]. The
//! admin channel is only opened for admins, the team channel only when a
//! team id is known. Changing the session re-evaluates the set: channels no
//! longer entitled are closed, newly entitled ones are opened.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{
    auth::SessionClaims,
    client::LiveClient,
    models::{ConnectionState, Destinations, InboundMessage, Role},
    registry::{MessageHandler, SubscriptionHandle},
};

/// Subscription categories a feed can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeedCategory {
    /// Broadcast notifications.
    General,
    /// The caller's private queue.
    User,
    /// Updates for the caller's team.
    Team,
    /// Admin broadcast; admins only.
    Admin,
}

/// Which categories are wanted, and who handles them.
#[derive(Clone, Default)]
pub struct FeedConfig {
    handlers: BTreeMap<FeedCategory, Vec<MessageHandler>>,
}

impl FeedConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request `category` and route its messages to `handler`.
    ///
    /// May be called more than once per category; each handler is registered
    /// on its own.
    pub fn on(mut self, category: FeedCategory, handler: MessageHandler) -> Self {
        self.handlers.entry(category).or_default().push(handler);
        self
    }

    pub fn on_general(self, f: impl Fn(&InboundMessage) + Send + Sync + 'static) -> Self {
        self.on(FeedCategory::General, Arc::new(f))
    }

    pub fn on_user(self, f: impl Fn(&InboundMessage) + Send + Sync + 'static) -> Self {
        self.on(FeedCategory::User, Arc::new(f))
    }

    pub fn on_team(self, f: impl Fn(&InboundMessage) + Send + Sync + 'static) -> Self {
        self.on(FeedCategory::Team, Arc::new(f))
    }

    pub fn on_admin(self, f: impl Fn(&InboundMessage) + Send + Sync + 'static) -> Self {
        self.on(FeedCategory::Admin, Arc::new(f))
    }

    pub fn wants(&self, category: FeedCategory) -> bool {
        self.handlers.get(&category).map_or(false, |h| !h.is_empty())
    }

    pub fn categories(&self) -> Vec<FeedCategory> {
        self.handlers
            .iter()
            .filter(|(_, handlers)| !handlers.is_empty())
            .map(|(category, _)| *category)
            .collect()
    }

    fn handlers(&self, category: FeedCategory) -> &[MessageHandler] {
        self.handlers.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl fmt::Debug for FeedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<_, _> = self.handlers.iter().map(|(c, h)| (*c, h.len())).collect();
        f.debug_struct("FeedConfig").field("handlers", &counts).finish()
    }
}

/// Who the caller is, as far as gating is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub role: Role,
    pub team_id: Option<String>,
    pub user_id: Option<String>,
}

impl SessionContext {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            team_id: None,
            user_id: None,
        }
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Build from token claims; blank team ids count as absent.
    pub fn from_claims(claims: &SessionClaims) -> Self {
        Self {
            role: claims.role(),
            team_id: claims.team_id.clone().filter(|t| !t.trim().is_empty()),
            user_id: claims.sub.clone(),
        }
    }

    fn team(&self) -> Option<&str> {
        self.team_id.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(Role::Unknown)
    }
}

/// Destinations the session may listen on, restricted to what `config` asks for.
pub fn entitled_destinations(
    config: &FeedConfig,
    session: &SessionContext,
    destinations: &Destinations,
) -> Vec<(FeedCategory, String)> {
    let mut entitled = Vec::new();
    for category in config.categories() {
        let destination = match category {
            FeedCategory::General => Some(destinations.general_notifications.clone()),
            FeedCategory::User => Some(destinations.user_notifications.clone()),
            FeedCategory::Team => session.team().map(|team| destinations.team(team)),
            FeedCategory::Admin if session.role.is_admin() => Some(destinations.admin_broadcast.clone()),
            FeedCategory::Admin => None,
        };
        if let Some(destination) = destination {
            entitled.push((category, destination));
        }
    }
    entitled
}

struct ActiveFeed {
    category: FeedCategory,
    destination: String,
    handles: Vec<SubscriptionHandle>,
}

struct FeedShared {
    client: LiveClient,
    config: FeedConfig,
    state: Mutex<FeedState>,
}

struct FeedState {
    session: SessionContext,
    active: Vec<ActiveFeed>,
}

impl FeedShared {
    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reconcile(&self) {
        let mut state = self.lock();
        let wanted = entitled_destinations(&self.config, &state.session, self.client.destinations());

        // Handles go inactive when the client drops its registry on disconnect.
        state.active.retain(|entry| {
            let entitled = wanted
                .iter()
                .any(|(c, d)| *c == entry.category && *d == entry.destination);
            let live = entry.handles.iter().all(SubscriptionHandle::is_active);
            if entitled && live {
                return true;
            }
            if !entitled {
                log::info!("[inno-link] Leaving {} ({:?})", entry.destination, entry.category);
            }
            for handle in &entry.handles {
                handle.unsubscribe();
            }
            false
        });

        for (category, destination) in wanted {
            let present = state
                .active
                .iter()
                .any(|e| e.category == category && e.destination == destination);
            if present {
                continue;
            }

            let handles: Vec<SubscriptionHandle> = self
                .config
                .handlers(category)
                .iter()
                .map(|handler| self.client.subscribe_handler(&destination, Arc::clone(handler)))
                .collect();

            if handles.iter().all(SubscriptionHandle::is_active) {
                log::info!("[inno-link] Listening on {} ({:?})", destination, category);
                state.active.push(ActiveFeed {
                    category,
                    destination,
                    handles,
                });
            } else {
                // Partial sets unsubscribe on drop; retried on the next CONNECTED.
                log::debug!("[inno-link] {} not open yet; retrying once connected", destination);
            }
        }
    }
}

/// Role-aware set of subscriptions on top of a [`LiveClient`].
///
/// Must be created inside a Tokio runtime: it spawns a small task that
/// re-reconciles on every `CONNECTED` transition. Dropping the feed closes
/// its subscriptions.
pub struct LiveFeed {
    shared: Arc<FeedShared>,
    watcher: JoinHandle<()>,
}

impl LiveFeed {
    pub fn new(client: LiveClient, config: FeedConfig, session: SessionContext) -> Self {
        let mut changes = client.state_changes();
        let shared = Arc::new(FeedShared {
            client,
            config,
            state: Mutex::new(FeedState {
                session,
                active: Vec::new(),
            }),
        });
        shared.reconcile();

        let weak: Weak<FeedShared> = Arc::downgrade(&shared);
        let watcher = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let state = *changes.borrow_and_update();
                if state != ConnectionState::Connected {
                    continue;
                }
                match weak.upgrade() {
                    Some(shared) => shared.reconcile(),
                    None => break,
                }
            }
        });

        Self { shared, watcher }
    }

    /// Replace the session (role or team changed) and re-evaluate.
    pub fn update_session(&self, session: SessionContext) {
        {
            let mut state = self.shared.lock();
            if state.session == session {
                return;
            }
            log::debug!(
                "[inno-link] Session changed: role {} team {:?}",
                session.role,
                session.team_id
            );
            state.session = session;
        }
        self.shared.reconcile();
    }

    pub fn session(&self) -> SessionContext {
        self.shared.lock().session.clone()
    }

    /// Destinations currently open for this feed, sorted.
    pub fn active_destinations(&self) -> Vec<String> {
        let mut destinations: Vec<String> = self
            .shared
            .lock()
            .active
            .iter()
            .map(|e| e.destination.clone())
            .collect();
        destinations.sort();
        destinations
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.client.state()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.client.state_changes()
    }

    pub fn client(&self) -> &LiveClient {
        &self.shared.client
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.watcher.abort();
        self.shared.lock().active.clear();
    }
}

impl fmt::Debug for LiveFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveFeed")
            .field("session", &self.session())
            .field("active", &self.active_destinations())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn everything() -> FeedConfig {
        FeedConfig::new()
            .on_general(|_| {})
            .on_user(|_| {})
            .on_team(|_| {})
            .on_admin(|_| {})
    }

    fn names(entitled: &[(FeedCategory, String)]) -> Vec<&str> {
        entitled.iter().map(|(_, d)| d.as_str()).collect()
    }

    #[test]
    fn test_student_never_gets_admin_channel() {
        let session = SessionContext::new(Role::Student).with_team("42");
        let entitled = entitled_destinations(&everything(), &session, &Destinations::default());

        assert_eq!(
            names(&entitled),
            vec!["/topic/notifications", "/user/queue/notifications", "/topic/teams/42"]
        );
    }

    #[test]
    fn test_admin_gets_admin_channel() {
        let session = SessionContext::new(Role::Admin);
        let entitled = entitled_destinations(&everything(), &session, &Destinations::default());

        assert!(entitled.contains(&(FeedCategory::Admin, "/topic/admin".to_string())));
        // no team id, no team channel
        assert!(!entitled.iter().any(|(c, _)| *c == FeedCategory::Team));
    }

    #[test]
    fn test_blank_team_is_absent() {
        let session = SessionContext::new(Role::Ta).with_team("   ");
        let config = FeedConfig::new().on_team(|_| {});
        assert!(entitled_destinations(&config, &session, &Destinations::default()).is_empty());
    }

    #[test]
    fn test_only_requested_categories() {
        let config = FeedConfig::new().on_user(|_| {});
        let session = SessionContext::new(Role::Admin).with_team("7");
        let entitled = entitled_destinations(&config, &session, &Destinations::default());
        assert_eq!(entitled, vec![(FeedCategory::User, "/user/queue/notifications".to_string())]);
    }

    #[test]
    fn test_config_categories() {
        let config = FeedConfig::new().on_admin(|_| {}).on_general(|_| {}).on_general(|_| {});
        assert_eq!(config.categories(), vec![FeedCategory::General, FeedCategory::Admin]);
        assert!(config.wants(FeedCategory::General));
        assert!(!config.wants(FeedCategory::Team));
        assert_eq!(config.handlers(FeedCategory::General).len(), 2);
    }

    #[test]
    fn test_session_from_claims() {
        let claims = SessionClaims {
            sub: Some("u-1".into()),
            role: Some("ROLE_PROFESSOR".into()),
            team_id: Some("".into()),
            exp: None,
        };
        let session = SessionContext::from_claims(&claims);
        assert_eq!(session.role, Role::Professor);
        assert_eq!(session.team_id, None);
        assert_eq!(session.user_id.as_deref(), Some("u-1"));
    }
}
