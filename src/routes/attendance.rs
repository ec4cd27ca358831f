//! Attendance session routes — open, close, and inspect the live session.
//!
//! DESIGN
//! ======
//! Opening a session is HTTP-only: the class is looked up so the caller can
//! be checked against its teacher before anything is held in memory. Closing
//! is available here and as the websocket `DONE` event; both go through
//! `finalize::close_session`, so websocket clients get the same `DONE`
//! broadcast either way.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::routes::auth::AuthUser;
use crate::routes::{ApiError, ok};
use crate::services::auth::Role;
use crate::services::finalize::{self, DonePayload, PERSISTED_MESSAGE};
use crate::services::session::{AttendanceStatus, SessionError, SessionInfo, Summary};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBody {
    pub class_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CloseResponse {
    class_id: Uuid,
    #[serde(flatten)]
    done: DonePayload,
}

#[derive(Debug, Serialize)]
struct SessionView {
    #[serde(flatten)]
    info: SessionInfo,
    closing: bool,
    summary: Summary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MyAttendanceView {
    class_id: Uuid,
    status: Option<AttendanceStatus>,
}

/// `POST /attendance/start` — open the session for one of the caller's classes.
pub async fn start_attendance(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<StartBody>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let teacher = auth.require(Role::Teacher)?;
    let Json(body) = body.map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "Invalid request schema"))?;

    let class = state
        .classes
        .find_by_id(body.class_id)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Class not found"))?;
    if class.teacher_id != teacher.user_id {
        return Err(SessionError::NotOwner.into());
    }

    let session_info = state.session.lock().await.start(class.id, teacher.user_id)?;
    info!(class_id = %class.id, teacher_id = %teacher.user_id, "session: started");

    Ok(ok(serde_json::json!({ "classId": session_info.class_id, "startedAt": session_info.started_at })))
}

/// `POST /attendance/done` — persist and close the caller's session.
pub async fn close_attendance(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let teacher = auth.require(Role::Teacher)?;
    let finalized = finalize::close_session(state, teacher.user_id).await?;
    info!(class_id = %finalized.class_id, records = finalized.records.len(), "session: closed over http");

    Ok(ok(CloseResponse {
        class_id: finalized.class_id,
        done: DonePayload { message: PERSISTED_MESSAGE, summary: finalized.summary },
    }))
}

/// `GET /attendance/session` — the open session and its live counts.
pub async fn session_status(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state.session.lock().await;
    let info = session.info().cloned().ok_or(SessionError::NoActiveSession)?;
    let view = SessionView { info, closing: session.is_closing(), summary: session.summary()? };
    Ok(ok(view))
}

/// `GET /class/:id/my-attendance` — the caller's last persisted status.
pub async fn my_attendance(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(class_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let student = auth.require(Role::Student)?;

    let class = state
        .classes
        .find_by_id(class_id)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Class not found"))?;
    if !class.is_enrolled(student.user_id) {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "Forbidden, not enrolled in class"));
    }

    let status = state.store.latest_status(class_id, student.user_id).await?;
    Ok(ok(MyAttendanceView { class_id, status }))
}

#[cfg(test)]
#[path = "attendance_test.rs"]
mod tests;
