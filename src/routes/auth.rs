//! HTTP authentication — bearer token extractor and role guard.

use axum::extract::FromRef;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::routes::ApiError;
use crate::services::auth::{AuthError, Identity, Role, extract_bearer};
use crate::state::AppState;

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Verified caller taken from the `Authorization` header.
/// Use as a handler parameter to require authentication.
pub struct AuthUser(pub Identity);

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(extract_bearer)
            .ok_or(AuthError::Missing)?;

        let app_state = AppState::from_ref(state);
        Ok(Self(app_state.auth.authenticate(token)?))
    }
}

impl AuthUser {
    /// # Errors
    ///
    /// 403 when the caller's role is not `role`.
    pub fn require(self, role: Role) -> Result<Identity, ApiError> {
        if self.0.role == role {
            Ok(self.0)
        } else {
            Err(ApiError::new(StatusCode::FORBIDDEN, "Forbidden: Insufficient permissions"))
        }
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
