//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router carries the websocket endpoint and the small JSON API
//! teachers use to open and close sessions. JSON responses share one shape:
//! `{success: true, data}` or `{success: false, error}`.

pub mod attendance;
pub mod auth;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::db::StoreError;
use crate::services::auth::AuthError;
use crate::services::finalize::FinalizeError;
use crate::services::session::SessionError;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws::handle_ws))
        .route("/attendance/start", post(attendance::start_attendance))
        .route("/attendance/done", post(attendance::close_attendance))
        .route("/attendance/session", get(attendance::session_status))
        .route("/class/{id}/my-attendance", get(attendance::my_attendance))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

// =============================================================================
// RESPONSES
// =============================================================================

/// `{success: true, data}` with status 200.
pub(crate) fn ok<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "data": data }))
}

/// Error half of the response shape: a status plus a human-readable message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "success": false, "error": self.message }))).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, err.to_string())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match err {
            SessionError::Conflict(_) | SessionError::Closing => StatusCode::CONFLICT,
            SessionError::NoActiveSession => StatusCode::NOT_FOUND,
            SessionError::NotOwner => StatusCode::FORBIDDEN,
        };
        Self::new(status, err.to_string())
    }
}

impl From<FinalizeError> for ApiError {
    fn from(err: FinalizeError) -> Self {
        let status = match err {
            FinalizeError::Session(session) => return session.into(),
            FinalizeError::ClassNotFound(_) => StatusCode::NOT_FOUND,
            FinalizeError::Lookup(_) | FinalizeError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
            FinalizeError::PersistTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            FinalizeError::Interrupted(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        error!(error = %err, "store error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
