//! File-based client configuration.
//!
//! # Configuration Format
//!
//! ```toml
//! [server]
//! url = "http://localhost:8080/api/v1/ws"   # http(s) is mapped to ws(s)
//!
//! [connection]
//! auto_reconnect = true
//! reconnect_delay_ms = 3000                 # attempt n waits n * delay
//! max_reconnect_attempts = 5
//! virtual_host = "/"
//!
//! [timeouts]
//! connection_ms = 10000
//! handshake_ms = 5000
//! disconnect_ms = 2000
//! heartbeat_outgoing_ms = 10000             # 0 disables
//! heartbeat_incoming_ms = 10000             # 0 disables
//! heartbeat_grace_ms = 5000
//!
//! [destinations]
//! team_template = "/topic/teams/{teamId}"
//! ```
//!
//! Environment overrides (applied by [`LinkConfig::apply_env_overrides`]):
//! `INNO_LINK_WS_URL`, `INNO_LINK_MAX_RECONNECT_ATTEMPTS`,
//! `INNO_LINK_RECONNECT_DELAY_MS`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{LinkError, Result};
use crate::models::{ConnectionOptions, Destinations};
use crate::timeouts::LinkTimeouts;

pub const ENV_WS_URL: &str = "INNO_LINK_WS_URL";
pub const ENV_MAX_RECONNECT_ATTEMPTS: &str = "INNO_LINK_MAX_RECONNECT_ATTEMPTS";
pub const ENV_RECONNECT_DELAY_MS: &str = "INNO_LINK_RECONNECT_DELAY_MS";

/// Endpoint used when neither the config file nor the environment names one.
pub const DEFAULT_WS_URL: &str = "http://localhost:8080/api/v1/ws";

/// Client configuration loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub server: ServerConfig,
    pub connection: ConnectionOptions,
    pub timeouts: TimeoutsConfig,
    pub destinations: Destinations,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Endpoint URL (http, https, ws or wss).
    pub url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
        }
    }
}

/// Timeouts in milliseconds, as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub connection_ms: u64,
    pub handshake_ms: u64,
    pub disconnect_ms: u64,
    pub heartbeat_outgoing_ms: u64,
    pub heartbeat_incoming_ms: u64,
    pub heartbeat_grace_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        let defaults = LinkTimeouts::default();
        Self {
            connection_ms: defaults.connection_timeout.as_millis() as u64,
            handshake_ms: defaults.handshake_timeout.as_millis() as u64,
            disconnect_ms: defaults.disconnect_timeout.as_millis() as u64,
            heartbeat_outgoing_ms: defaults.heartbeat_outgoing.as_millis() as u64,
            heartbeat_incoming_ms: defaults.heartbeat_incoming.as_millis() as u64,
            heartbeat_grace_ms: defaults.heartbeat_grace.as_millis() as u64,
        }
    }
}

impl TimeoutsConfig {
    pub fn to_timeouts(&self) -> LinkTimeouts {
        LinkTimeouts::builder()
            .connection_timeout(Duration::from_millis(self.connection_ms))
            .handshake_timeout(Duration::from_millis(self.handshake_ms))
            .disconnect_timeout(Duration::from_millis(self.disconnect_ms))
            .heartbeat_outgoing(Duration::from_millis(self.heartbeat_outgoing_ms))
            .heartbeat_incoming(Duration::from_millis(self.heartbeat_incoming_ms))
            .heartbeat_grace(Duration::from_millis(self.heartbeat_grace_ms))
            .build()
    }
}

impl LinkConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: LinkConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            LinkError::ConfigurationError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml_str(&contents)
    }

    /// Apply `INNO_LINK_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    pub(crate) fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_WS_URL).filter(|v| !v.trim().is_empty()) {
            self.server.url = url.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_MAX_RECONNECT_ATTEMPTS) {
            self.connection.max_reconnect_attempts = raw.trim().parse().map_err(|_| {
                LinkError::ConfigurationError(format!(
                    "{} must be a non-negative integer, got '{}'",
                    ENV_MAX_RECONNECT_ATTEMPTS, raw
                ))
            })?;
        }

        if let Some(raw) = lookup(ENV_RECONNECT_DELAY_MS) {
            self.connection.reconnect_delay_ms = raw.trim().parse().map_err(|_| {
                LinkError::ConfigurationError(format!(
                    "{} must be a non-negative integer, got '{}'",
                    ENV_RECONNECT_DELAY_MS, raw
                ))
            })?;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.server.url.trim().is_empty() {
            return Err(LinkError::ConfigurationError("[server] url must not be empty".into()));
        }
        if !self.destinations.team_template.contains(crate::models::TEAM_ID_PLACEHOLDER) {
            return Err(LinkError::ConfigurationError(format!(
                "[destinations] team_template must contain {}",
                crate::models::TEAM_ID_PLACEHOLDER
            )));
        }
        Ok(())
    }
}
