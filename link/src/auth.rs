//! Bearer credential handling for the live client.
//!
//! The credential is supplied by the hosting application at connect time and
//! travels both on the WebSocket upgrade request and in the STOMP `CONNECT`
//! frame as `Authorization: Bearer <token>`.

use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use std::fmt;

use crate::error::{LinkError, Result};
use crate::models::Role;

/// Bearer token used to authenticate the session.
///
/// `Debug` output never contains the token itself.
///
/// # Examples
///
/// ```rust
/// use inno_link::Credential;
///
/// let credential = Credential::bearer("eyJhbGc...").unwrap();
/// assert_eq!(credential.authorization_header(), "Bearer eyJhbGc...");
///
/// assert!(Credential::bearer("   ").is_err());
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
}

impl Credential {
    /// Wrap a bearer token. Blank tokens are rejected with [`LinkError::AuthMissing`].
    pub fn bearer(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(LinkError::AuthMissing);
        }
        let token = trimmed.strip_prefix("Bearer ").unwrap_or(trimmed).trim().to_string();
        if token.is_empty() {
            return Err(LinkError::AuthMissing);
        }
        Ok(Self { token })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential").field("token", &"<redacted>").finish()
    }
}

/// Claims read from the payload segment of a JWT.
///
/// The signature is **not** verified; the server does that during the
/// handshake. These claims only drive client-side subscription gating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    /// Subject (user id).
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    /// Expiry as seconds since Unix epoch.
    #[serde(default)]
    pub exp: Option<i64>,
}

impl SessionClaims {
    /// Decode the claims of a JWT without verifying its signature.
    pub fn decode_unverified(credential: &Credential) -> Result<Self> {
        let mut parts = credential.token().split('.');
        let payload = match (parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(payload), Some(_)) => payload,
            _ => {
                return Err(LinkError::DecodeFailure(
                    "Token is not a JWT (expected three segments)".to_string(),
                ))
            },
        };

        let bytes = general_purpose::URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| LinkError::DecodeFailure(format!("Invalid JWT payload encoding: {}", e)))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| LinkError::DecodeFailure(format!("Invalid JWT claims: {}", e)))
    }

    /// Role claim parsed into a [`Role`]; missing claims are [`Role::Unknown`].
    pub fn role(&self) -> Role {
        self.role.as_deref().map(Role::from_claim).unwrap_or(Role::Unknown)
    }
}
