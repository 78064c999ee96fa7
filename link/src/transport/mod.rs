//! Physical socket abstraction.
//!
//! A [`Transport`] opens one socket per session and hands the connection task
//! a pair of channels carrying already-framed STOMP traffic. The WebSocket
//! implementation lives in [`websocket`]; tests plug in an in-memory broker.

pub mod websocket;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use crate::auth::Credential;
use crate::error::Result;
use crate::event_handlers::DisconnectReason;
use crate::stomp::Frame;

pub use websocket::{resolve_ws_url, WsTransport};

/// Traffic from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum WireIn {
    Frame(Frame),
    Heartbeat,
    /// The socket is gone. Nothing follows on the channel.
    Closed(DisconnectReason),
}

/// Traffic to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum WireOut {
    Frame(Frame),
    Heartbeat,
    /// Close the socket gracefully.
    Close,
}

/// An open socket, as seen by the connection task.
///
/// Dropping `tx` closes the socket.
#[derive(Debug)]
pub struct WireLink {
    pub tx: mpsc::UnboundedSender<WireOut>,
    pub rx: mpsc::UnboundedReceiver<WireIn>,
}

/// Opens physical connections to the server.
///
/// `open` resolves once the socket is usable (for WebSocket: after the HTTP
/// upgrade). The STOMP handshake runs on top of the returned link. A refused
/// upgrade (HTTP 401/403) must surface as
/// [`LinkError::HandshakeFailure`](crate::LinkError::HandshakeFailure); any
/// other failure as a transient error.
pub trait Transport: Send + Sync + 'static {
    fn open<'a>(&'a self, credential: &'a Credential) -> BoxFuture<'a, Result<WireLink>>;
}
