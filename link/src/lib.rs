//! # inno-link
//!
//! Real-time subscription client for the InnoSistemas collaboration
//! dashboard. One STOMP session over a WebSocket carries every destination
//! the user listens on; the library keeps it alive, reconnects with bounded
//! linear backoff and re-subscribes after every reconnect.
//!
//! ## Layers
//!
//! - [`LiveClient`]: connection manager plus subscription registry, owned by
//!   the application for the lifetime of a login session.
//! - [`SubscriptionHandle`]: unsubscribe capability; dropping it
//!   unsubscribes.
//! - [`LiveFeed`]: role-aware facade that opens the general, private, team
//!   and admin channels the user is entitled to.
//!
//! ## Example
//!
//! ```rust,no_run
//! use inno_link::{FeedConfig, LiveClient, LiveFeed, Role, SessionContext};
//!
//! # async fn example() -> inno_link::Result<()> {
//! let client = LiveClient::builder()
//!     .url("http://localhost:8080/api/v1/ws")
//!     .build()?;
//! client.connect("eyJhbGc...").await?;
//!
//! let feed = LiveFeed::new(
//!     client.clone(),
//!     FeedConfig::new()
//!         .on_user(|msg| println!("for me: {:?}", msg.message))
//!         .on_team(|msg| println!("team: {:?}", msg.message)),
//!     SessionContext::new(Role::Student).with_team("42"),
//! );
//!
//! println!("listening on {:?}", feed.active_destinations());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod event_handlers;
pub mod feed;
pub mod models;
pub mod registry;
pub(crate) mod router;
pub mod stomp;
pub mod timeouts;
pub mod transport;

pub use auth::{Credential, SessionClaims};
pub use client::{LiveClient, LiveClientBuilder};
pub use config::LinkConfig;
pub use connection::{Phase, ReconnectState};
pub use error::{LinkError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use feed::{entitled_destinations, FeedCategory, FeedConfig, LiveFeed, SessionContext};
pub use models::{
    AdminNotification, ConnectionOptions, ConnectionState, Destinations, HelpPriority,
    InboundMessage, LiveMessage, MessageKind, NotificationKind, Role, SubscriptionInfo,
    TeamAction, TeamUpdate, UserNotification,
};
pub use registry::{MessageHandler, SubscriptionHandle};
pub use stomp::{Command, Frame, HeartBeat};
pub use timeouts::{LinkTimeouts, LinkTimeoutsBuilder};
pub use transport::{Transport, WireIn, WireLink, WireOut, WsTransport};
