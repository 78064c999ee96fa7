//! Data models for the inno-link client library.
//!
//! Defines connection configuration, destination names, the inbound message
//! variants decoded from STOMP frames, and the outbound action payloads.

pub mod admin_notification;
pub mod connection_options;
pub mod connection_state;
pub mod destinations;
pub mod inbound_message;
pub mod outbound;
pub mod role;
pub mod subscription_info;
pub mod team_update;
pub mod user_notification;


pub use admin_notification::AdminNotification;
pub use connection_options::ConnectionOptions;
pub use connection_state::ConnectionState;
pub use destinations::{Destinations, MessageKind, TEAM_ID_PLACEHOLDER};
pub use inbound_message::{InboundMessage, LiveMessage};
pub use outbound::{
    iso_timestamp, HelpPriority, HelpRequest, MeetingScheduleRequest, SprintStartRequest,
    TeamJoinRequest, TeamNotifyRequest,
};
pub use role::Role;
pub use subscription_info::SubscriptionInfo;
pub use team_update::{TeamAction, TeamUpdate};
pub use user_notification::{NotificationKind, UserNotification};
