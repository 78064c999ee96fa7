//! STOMP 1.2 frame codec.
//!
//! One frame travels per WebSocket text message. A message consisting only of
//! end-of-line characters is a heart-beat.

use std::fmt;
use std::time::Duration;

use crate::error::{LinkError, Result};

pub const ACCEPT_VERSION: &str = "1.2";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// STOMP frame command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    fn parse(line: &str) -> Result<Self> {
        Ok(match line {
            // STOMP is the 1.2 spelling of CONNECT
            "CONNECT" | "STOMP" => Command::Connect,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => {
                return Err(LinkError::DecodeFailure(format!("Unknown STOMP command '{}'", other)))
            },
        })
    }

    /// CONNECT and CONNECTED headers are never escaped.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
///
/// Headers keep their wire order; when a header repeats, the first occurrence
/// wins on lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn destination(&self) -> Option<&str> {
        self.get("destination")
    }

    // ── Client frame constructors ────────────────────────────────────────

    pub fn connect(host: &str, authorization: &str, heart_beat: HeartBeat) -> Self {
        Frame::new(Command::Connect)
            .header("accept-version", ACCEPT_VERSION)
            .header("host", host)
            .header("heart-beat", heart_beat.to_string())
            .header("Authorization", authorization)
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header("id", id)
    }

    pub fn send_json(destination: &str, body: String) -> Self {
        Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", CONTENT_TYPE_JSON)
            .header("content-length", body.len().to_string())
            .with_body(body)
    }

    pub fn disconnect(receipt: &str) -> Self {
        Frame::new(Command::Disconnect).header("receipt", receipt)
    }

    // ── Codec ────────────────────────────────────────────────────────────

    /// Serialize to wire text, NUL-terminated.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(32 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame from wire text.
    ///
    /// Returns `Ok(None)` for a heart-beat (text made only of EOLs).
    pub fn parse(text: &str) -> Result<Option<Frame>> {
        let text = text.trim_start_matches(['\r', '\n']);
        if text.is_empty() {
            return Ok(None);
        }

        let lf = text.find("\n\n").map(|pos| (pos, 2));
        let crlf = text.find("\r\n\r\n").map(|pos| (pos, 4));
        let (head, rest) = match lf.into_iter().chain(crlf).min_by_key(|(pos, _)| *pos) {
            Some((pos, sep)) => (&text[..pos], &text[pos + sep..]),
            None => {
                return Err(LinkError::DecodeFailure(
                    "STOMP frame has no header terminator".to_string(),
                ))
            },
        };

        let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
        let command = Command::parse(lines.next().unwrap_or_default())?;
        let unescape = command.escapes_headers();

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line.split_once(':').ok_or_else(|| {
                LinkError::DecodeFailure(format!("Malformed STOMP header line '{}'", line))
            })?;
            if unescape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let mut frame = Frame {
            command,
            headers,
            body: String::new(),
        };

        let content_length = match frame.get("content-length") {
            Some(raw) => Some(raw.trim().parse::<usize>().map_err(|_| {
                LinkError::DecodeFailure(format!("Invalid content-length '{}'", raw))
            })?),
            None => None,
        };

        frame.body = match content_length {
            Some(len) => rest
                .get(..len)
                .ok_or_else(|| {
                    LinkError::DecodeFailure(format!(
                        "Body shorter than content-length ({} < {})",
                        rest.len(),
                        len
                    ))
                })?
                .to_string(),
            None => match rest.find('\0') {
                Some(end) => rest[..end].to_string(),
                None => {
                    return Err(LinkError::DecodeFailure(
                        "STOMP frame is not NUL-terminated".to_string(),
                    ))
                },
            },
        };

        Ok(Some(frame))
    }
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(LinkError::DecodeFailure(format!(
                    "Invalid header escape '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )))
            },
        }
    }
    Ok(out)
}

/// Heart-beat header value `<outgoing>,<incoming>` in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartBeat {
    /// Smallest interval at which the sender can emit heart-beats (0 = never).
    pub outgoing_ms: u64,
    /// Desired interval for receiving heart-beats (0 = not wanted).
    pub incoming_ms: u64,
}

impl HeartBeat {
    pub fn new(outgoing: Duration, incoming: Duration) -> Self {
        Self {
            outgoing_ms: outgoing.as_millis() as u64,
            incoming_ms: incoming.as_millis() as u64,
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        let (out, inc) = value.split_once(',').ok_or_else(|| {
            LinkError::DecodeFailure(format!("Invalid heart-beat header '{}'", value))
        })?;
        let parse = |v: &str| {
            v.trim().parse::<u64>().map_err(|_| {
                LinkError::DecodeFailure(format!("Invalid heart-beat header '{}'", value))
            })
        };
        Ok(Self {
            outgoing_ms: parse(out)?,
            incoming_ms: parse(inc)?,
        })
    }

    /// Combine the client's offer with the server's `CONNECTED` header.
    pub fn negotiate(client: HeartBeat, server: HeartBeat) -> Negotiated {
        let pick = |ours: u64, theirs: u64| {
            if ours == 0 || theirs == 0 {
                None
            } else {
                Some(Duration::from_millis(ours.max(theirs)))
            }
        };
        Negotiated {
            send_every: pick(client.outgoing_ms, server.incoming_ms),
            expect_every: pick(client.incoming_ms, server.outgoing_ms),
        }
    }
}

impl fmt::Display for HeartBeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.outgoing_ms, self.incoming_ms)
    }
}

/// Heart-beat intervals in effect for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Negotiated {
    /// Send a heart-beat after this much outbound silence.
    pub send_every: Option<Duration>,
    /// Expect some inbound traffic at least this often.
    pub expect_every: Option<Duration>,
}
