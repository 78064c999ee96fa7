//! WebSocket transport built on `tokio-tungstenite`.

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{
    self,
    client::IntoClientRequest,
    http::{header::AUTHORIZATION, HeaderValue},
    protocol::Message,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::{Transport, WireIn, WireLink, WireOut};
use crate::auth::Credential;
use crate::error::{LinkError, Result};
use crate::event_handlers::DisconnectReason;
use crate::stomp::Frame;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Maximum text message size accepted from the server (16 MiB).
const MAX_TEXT_MESSAGE_BYTES: usize = 16 << 20;

/// Map an `http(s)`/`ws(s)` endpoint to the `ws(s)` URL used for the upgrade.
pub fn resolve_ws_url(endpoint: &str) -> Result<String> {
    let mut url = Url::parse(endpoint.trim()).map_err(|e| {
        LinkError::ConfigurationError(format!("Invalid endpoint URL '{}': {}", endpoint, e))
    })?;

    if url.host_str().is_none() {
        return Err(LinkError::ConfigurationError(format!(
            "Endpoint URL '{}' must include a host",
            endpoint
        )));
    }

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(LinkError::ConfigurationError(format!(
                "Unsupported endpoint scheme '{}'; expected http(s) or ws(s)",
                other
            )));
        },
    };

    url.set_scheme(scheme).map_err(|_| {
        LinkError::ConfigurationError("Failed to set WebSocket URL scheme".to_string())
    })?;
    url.set_fragment(None);

    Ok(url.to_string())
}

/// [`Transport`] speaking STOMP text frames over a WebSocket.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            url: resolve_ws_url(endpoint)?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn open_socket(&self, credential: &Credential) -> Result<WireLink> {
        let mut request = self.url.as_str().into_client_request().map_err(|e| {
            LinkError::ConfigurationError(format!("Failed to build WebSocket request: {}", e))
        })?;

        let header_value = HeaderValue::from_str(&credential.authorization_header()).map_err(|e| {
            LinkError::ConfigurationError(format!(
                "Invalid token for Authorization header: {}",
                e
            ))
        })?;
        request.headers_mut().insert(AUTHORIZATION, header_value);

        log::debug!("[inno-link] Opening WebSocket to {}", self.url);
        let (ws, _response) = match tokio_tungstenite::connect_async(request).await {
            Ok(pair) => pair,
            Err(tungstenite::Error::Http(response)) => {
                let status = response.status().as_u16();
                return Err(match status {
                    401 => LinkError::HandshakeFailure(
                        "Unauthorized: WebSocket requires valid credentials".to_string(),
                    ),
                    403 => LinkError::HandshakeFailure(
                        "Forbidden: access to WebSocket denied".to_string(),
                    ),
                    code => LinkError::TransportFailure(format!("WebSocket HTTP error: {}", code)),
                });
            },
            Err(e) => return Err(LinkError::TransportFailure(format!("Connection failed: {}", e))),
        };

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(ws, out_rx, in_tx));

        Ok(WireLink {
            tx: out_tx,
            rx: in_rx,
        })
    }
}

impl Transport for WsTransport {
    fn open<'a>(&'a self, credential: &'a Credential) -> BoxFuture<'a, Result<WireLink>> {
        Box::pin(self.open_socket(credential))
    }
}

/// Decode one text payload into inbound wire traffic.
fn decode_text(text: &str) -> Option<WireIn> {
    if text.len() > MAX_TEXT_MESSAGE_BYTES {
        log::warn!("[inno-link] Dropping oversized message ({} bytes)", text.len());
        return None;
    }
    match Frame::parse(text) {
        Ok(Some(frame)) => Some(WireIn::Frame(frame)),
        Ok(None) => Some(WireIn::Heartbeat),
        Err(e) => {
            log::warn!("[inno-link] Dropping malformed frame: {}", e);
            None
        },
    }
}

/// Moves traffic between the socket and the link channels until either side
/// goes away.
async fn pump(
    ws: WsStream,
    mut out_rx: mpsc::UnboundedReceiver<WireOut>,
    in_tx: mpsc::UnboundedSender<WireIn>,
) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            out = out_rx.recv() => {
                let message = match out {
                    Some(WireOut::Frame(frame)) => Message::Text(frame.encode().into()),
                    Some(WireOut::Heartbeat) => Message::Text("\n".into()),
                    Some(WireOut::Close) | None => {
                        let _ = sink.close().await;
                        return;
                    },
                };
                if let Err(e) = sink.send(message).await {
                    let _ = in_tx.send(WireIn::Closed(DisconnectReason::new(format!(
                        "WebSocket send failed: {}",
                        e
                    ))));
                    return;
                }
            }

            incoming = stream.next() => {
                let wire = match incoming {
                    Some(Ok(Message::Text(text))) => decode_text(text.as_str()),
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => decode_text(text),
                        Err(_) => {
                            log::warn!("[inno-link] Dropping non UTF-8 binary message");
                            None
                        },
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                        None
                    },
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => None,
                    Some(Ok(Message::Close(frame))) => {
                        let reason = match frame {
                            Some(f) => DisconnectReason::with_code(f.reason.as_str(), f.code.into()),
                            None => DisconnectReason::new("Server closed connection"),
                        };
                        let _ = in_tx.send(WireIn::Closed(reason));
                        return;
                    },
                    Some(Err(e)) => {
                        let _ = in_tx.send(WireIn::Closed(DisconnectReason::new(format!(
                            "WebSocket error: {}",
                            e
                        ))));
                        return;
                    },
                    None => {
                        let _ = in_tx.send(WireIn::Closed(DisconnectReason::new(
                            "WebSocket stream ended",
                        )));
                        return;
                    },
                };

                if let Some(wire) = wire {
                    if in_tx.send(wire).is_err() {
                        let _ = sink.close().await;
                        return;
                    }
                }
            }
        }
    }
}
