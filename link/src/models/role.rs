use serde::{Deserialize, Serialize};
use std::fmt;

/// Role claim of the authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Professor,
    Ta,
    Admin,
    /// Any claim this client does not recognise.
    #[serde(other)]
    Unknown,
}

impl Role {
    /// Parse a role claim string (case-insensitive, optional `ROLE_` prefix).
    pub fn from_claim(claim: &str) -> Self {
        let claim = claim.trim();
        let claim = claim
            .strip_prefix("ROLE_")
            .or_else(|| claim.strip_prefix("role_"))
            .unwrap_or(claim);
        match claim.to_ascii_uppercase().as_str() {
            "STUDENT" => Role::Student,
            "PROFESSOR" => Role::Professor,
            "TA" => Role::Ta,
            "ADMIN" => Role::Admin,
            _ => Role::Unknown,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Student => "STUDENT",
            Role::Professor => "PROFESSOR",
            Role::Ta => "TA",
            Role::Admin => "ADMIN",
            Role::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}
