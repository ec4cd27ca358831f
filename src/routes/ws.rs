//! WebSocket handler — authenticated attendance event relay.
//!
//! DESIGN
//! ======
//! On upgrade the `token` query parameter is verified. A connection that
//! fails verification receives one `ERROR` envelope and is closed. A
//! verified connection is registered with its identity and enters a
//! `select!` loop:
//! - Incoming client envelopes → parse + route by event kind
//! - Envelopes queued by broadcast/unicast → forward to client
//!
//! Handler functions are pure business logic: they check role and session,
//! mutate or read state, and return an `Outcome`. The dispatch layer owns
//! all outbound concerns: unicast to the sender and broadcast to everyone.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → authenticate → register
//! 2. Client sends envelopes → route → handler returns Outcome
//! 3. Dispatch applies Outcome (reply / broadcast)
//! 4. Close → unregister

use std::collections::HashMap;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Query, State};
use axum::response::Response;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::event::{ClientEvent, Envelope, ErrorCode, EventKind, FIELD_CODE, FIELD_MESSAGE, MarkPayload};
use crate::services::auth::{AuthError, Identity, Role};
use crate::services::finalize::{self, FinalizeError};
use crate::services::session::{STATUS_NOT_YET_UPDATED, SessionError};
use crate::state::AppState;

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. The dispatch layer uses this to
/// decide who receives what; handlers never send envelopes directly.
#[derive(Debug)]
enum Outcome {
    /// Deliver to every registered connection, sender included.
    Broadcast(Envelope),
    /// Deliver to the sender only.
    Reply(Envelope),
    /// Outbound delivery already happened (close broadcasts its own `DONE`).
    Handled,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid JSON")]
    InvalidJson,
    #[error("Unknown event")]
    UnknownEvent(String),
    #[error("Forbidden, {0} event only")]
    ForbiddenRole(Role),
    #[error("Invalid payload for {event}: {reason}")]
    InvalidPayload { event: &'static str, reason: String },
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Finalize(#[from] FinalizeError),
}

impl ErrorCode for DispatchError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidJson | Self::InvalidPayload { .. } => "E_MALFORMED_PAYLOAD",
            Self::UnknownEvent(_) => "E_UNKNOWN_EVENT",
            Self::ForbiddenRole(_) => "E_FORBIDDEN_ROLE",
            Self::Session(e) => e.error_code(),
            Self::Finalize(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Session(e) => e.retryable(),
            Self::Finalize(e) => e.retryable(),
            _ => false,
        }
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let verdict = match params.get("token") {
        Some(token) => state.auth.authenticate(token),
        None => Err(AuthError::Missing),
    };

    ws.on_upgrade(move |socket| async move {
        match verdict {
            Ok(identity) => run_ws(socket, state, identity).await,
            Err(e) => reject(socket, &e).await,
        }
    })
}

async fn reject(mut socket: WebSocket, err: &AuthError) {
    warn!(code = err.error_code(), "ws: rejected unauthenticated connection");
    let _ = send_envelope(&mut socket, &Envelope::error_from(err)).await;
    let close = CloseFrame { code: close_code::POLICY, reason: Utf8Bytes::from_static("unauthorized") };
    let _ = socket.send(Message::Close(Some(close))).await;
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, identity: Identity) {
    let connection_id = Uuid::new_v4();

    // Per-connection queue for broadcast and unicast envelopes.
    let (client_tx, mut client_rx) = mpsc::channel::<Envelope>(state.client_queue_capacity);
    state.registry.register(connection_id, identity, client_tx).await;

    let connections = state.registry.connection_count().await;
    info!(
        %connection_id,
        user_id = %identity.user_id,
        role = %identity.role,
        connections,
        "ws: client connected"
    );

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        process_inbound_text(&state, connection_id, identity, &text).await;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(envelope) = client_rx.recv() => {
                if send_envelope(&mut socket, &envelope).await.is_err() {
                    break;
                }
            }
        }
    }

    state.registry.unregister(connection_id).await;
    info!(%connection_id, user_id = %identity.user_id, "ws: client disconnected");
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Route one inbound text message and apply its outcome.
///
/// Errors go back to the sender only, as `ERROR` envelopes.
async fn process_inbound_text(state: &AppState, connection_id: Uuid, identity: Identity, text: &str) {
    match route_event(state, identity, text).await {
        Ok(Outcome::Broadcast(envelope)) => {
            state.registry.broadcast(&envelope).await;
        }
        Ok(Outcome::Reply(envelope)) => {
            state.registry.unicast(connection_id, envelope).await;
        }
        Ok(Outcome::Handled) => {}
        Err(err) => {
            warn!(%connection_id, code = err.error_code(), error = %err, "ws: event rejected");
            state.registry.unicast(connection_id, Envelope::error_from(&err)).await;
        }
    }
}

/// Parse, authorize, and handle one inbound envelope.
async fn route_event(state: &AppState, identity: Identity, text: &str) -> Result<Outcome, DispatchError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(|_| DispatchError::InvalidJson)?;

    let Some(kind) = EventKind::parse(&envelope.event) else {
        return Err(DispatchError::UnknownEvent(envelope.event));
    };

    let required = kind.required_role();
    if identity.role != required {
        return Err(DispatchError::ForbiddenRole(required));
    }

    let event = ClientEvent::decode(kind, envelope.data)
        .map_err(|e| DispatchError::InvalidPayload { event: kind.as_str(), reason: e.to_string() })?;

    info!(user_id = %identity.user_id, event = kind.as_str(), "ws: recv event");

    match event {
        ClientEvent::AttendanceMarked(mark) => handle_mark(state, identity, mark).await,
        ClientEvent::TodaySummary => handle_summary(state).await,
        ClientEvent::MyAttendance => Ok(handle_my_attendance(state, identity).await),
        ClientEvent::Done => handle_done(state, identity).await,
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn handle_mark(state: &AppState, identity: Identity, mark: MarkPayload) -> Result<Outcome, DispatchError> {
    {
        let mut session = state.session.lock().await;
        session.ensure_owner(identity.user_id)?;
        session.mark_status(mark.student_id, mark.status)?;
    }
    info!(student_id = %mark.student_id, status = mark.status.as_str(), "ws: attendance marked");
    Ok(Outcome::Broadcast(Envelope::for_kind(EventKind::AttendanceMarked, &mark)))
}

async fn handle_summary(state: &AppState) -> Result<Outcome, DispatchError> {
    let summary = state.session.lock().await.summary()?;
    Ok(Outcome::Broadcast(Envelope::for_kind(EventKind::TodaySummary, &summary)))
}

/// Never an error: with no session or no mark the sentinel is reported.
async fn handle_my_attendance(state: &AppState, identity: Identity) -> Outcome {
    let status = state
        .session
        .lock()
        .await
        .status_of(identity.user_id)
        .map_or(STATUS_NOT_YET_UPDATED, |status| status.as_str());
    Outcome::Reply(Envelope::new(EventKind::MyAttendance.as_str(), json!({ "status": status })))
}

// =============================================================================
// CLOSE HANDLER (exception: the finalizer broadcasts `DONE` itself)
// =============================================================================

async fn handle_done(state: &AppState, identity: Identity) -> Result<Outcome, DispatchError> {
    finalize::close_session(state.clone(), identity.user_id).await?;
    Ok(Outcome::Handled)
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_envelope(socket: &mut WebSocket, envelope: &Envelope) -> Result<(), ()> {
    let json = match serde_json::to_string(envelope) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize envelope");
            return Err(());
        }
    };
    if envelope.is_error() {
        let code = envelope.data_str(FIELD_CODE).unwrap_or("-");
        let message = envelope.data_str(FIELD_MESSAGE).unwrap_or("-");
        warn!(code, message, "ws: send ERROR");
    } else {
        info!(event = %envelope.event, "ws: send envelope");
    }
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
