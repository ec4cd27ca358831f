//! AuthGate — bearer credential verification.
//!
//! ARCHITECTURE
//! ============
//! Credentials are HS256 JWTs carrying `userId` and `role` claims. This
//! service never issues them; it maps a presented credential to an
//! `Identity` before a websocket or HTTP caller may touch the session.
//!
//! TRADE-OFFS
//! ==========
//! `exp` is optional. Tokens that carry it are rejected once expired;
//! tokens without it are accepted, matching what the login service issues.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::event::ErrorCode;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Teacher => "teacher",
            Self::Student => "student",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "teacher" => Some(Self::Teacher),
            "student" => Some(Self::Student),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated caller. Fixed for the lifetime of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Unauthorized or invalid token")]
    Missing,
    #[error("Unauthorized or invalid token")]
    Invalid,
}

impl ErrorCode for AuthError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Missing => "E_AUTH_MISSING",
            Self::Invalid => "E_AUTH_INVALID",
        }
    }
}

/// Claims we read. Both are optional at the serde level so a token that
/// omits one is reported as `Invalid` rather than a decode failure.
#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(rename = "userId")]
    user_id: Option<String>,
    role: Option<String>,
}

// =============================================================================
// GATE
// =============================================================================

#[derive(Clone)]
pub struct AuthGate {
    key: DecodingKey,
    validation: Validation,
}

impl AuthGate {
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        Self { key: DecodingKey::from_secret(secret.as_bytes()), validation }
    }

    /// Verify a credential and extract the caller's identity.
    ///
    /// # Errors
    ///
    /// `Missing` for an empty credential; `Invalid` for bad signatures,
    /// expired tokens, or missing/ill-typed `userId`/`role` claims.
    pub fn authenticate(&self, credential: &str) -> Result<Identity, AuthError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(AuthError::Missing);
        }

        let token = decode::<Claims>(credential, &self.key, &self.validation).map_err(|e| {
            debug!(error = %e, "auth: token rejected");
            AuthError::Invalid
        })?;

        let user_id = token
            .claims
            .user_id
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or(AuthError::Invalid)?;
        let role = token
            .claims
            .role
            .as_deref()
            .and_then(Role::parse)
            .ok_or(AuthError::Invalid)?;

        Ok(Identity { user_id, role })
    }
}

/// Pull the token out of an `Authorization` header value.
/// Accepts the bare token or `Bearer <token>`.
#[must_use]
pub fn extract_bearer(header: &str) -> Option<&str> {
    let value = header.trim();
    let mut parts = value.split_whitespace();
    let first = parts.next()?;
    match (parts.next(), parts.next()) {
        (None, None) => Some(first),
        (Some(token), None) if first.eq_ignore_ascii_case("bearer") => Some(token),
        _ => None,
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
