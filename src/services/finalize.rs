//! Session finalizer — reconcile, persist, reset, announce.
//!
//! DESIGN
//! ======
//! Closing is the one place where in-memory and durable state must agree.
//! The session lock is held only to snapshot and to reset; the class lookup
//! and the batch insert run with the lock released:
//!
//! 1. lock → `begin_close` (owner check, `closing` flag, snapshot) → unlock
//! 2. fetch the class's current enrollment
//! 3. every enrolled student missing from the snapshot becomes absent
//! 4. insert the reconciled batch, bounded by the persist timeout
//! 5. lock → reset → unlock, then broadcast `DONE` with the summary
//!
//! ERROR HANDLING
//! ==============
//! Any failure in 2–4 clears the `closing` flag and leaves the attendance
//! map untouched, so the teacher can retry `DONE`. A timed-out insert is
//! reported as failed even though the write may still land; records are
//! append-only, so a retry can at worst duplicate rows.

use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::StoreError;
use crate::event::{Envelope, ErrorCode, EventKind};
use crate::services::attendance::AttendanceRecord;
use crate::services::session::{AttendanceStatus, SessionError, Snapshot, Summary};
use crate::state::AppState;

/// Message carried by the `DONE` broadcast.
pub const PERSISTED_MESSAGE: &str = "Attendance persisted";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Class not found")]
    ClassNotFound(Uuid),
    #[error("class lookup failed: {0}")]
    Lookup(StoreError),
    #[error("failed to persist attendance: {0}")]
    Persistence(StoreError),
    #[error("persisting attendance timed out after {}ms", .0.as_millis())]
    PersistTimeout(Duration),
    #[error("close interrupted: {0}")]
    Interrupted(String),
}

impl ErrorCode for FinalizeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Session(e) => e.error_code(),
            Self::ClassNotFound(_) => "E_CLASS_NOT_FOUND",
            Self::Lookup(_) => "E_CLASS_LOOKUP",
            Self::Persistence(_) => "E_PERSISTENCE",
            Self::PersistTimeout(_) => "E_PERSIST_TIMEOUT",
            Self::Interrupted(_) => "E_CLOSE_INTERRUPTED",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Session(e) => e.retryable(),
            Self::ClassNotFound(_) => false,
            Self::Lookup(_) | Self::Persistence(_) | Self::PersistTimeout(_) | Self::Interrupted(_) => true,
        }
    }
}

/// Outcome of a successful close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finalized {
    pub class_id: Uuid,
    pub records: Vec<AttendanceRecord>,
    pub summary: Summary,
}

/// Payload of the `DONE` broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DonePayload {
    pub message: &'static str,
    #[serde(flatten)]
    pub summary: Summary,
}

// =============================================================================
// CLOSE
// =============================================================================

/// Run [`finalize`] on its own task so a caller that goes away (socket
/// drop, HTTP client disconnect) cannot cancel it between snapshot and
/// reset.
///
/// # Errors
///
/// Whatever `finalize` reports, or `Interrupted` if the task panicked.
pub async fn close_session(state: AppState, teacher_id: Uuid) -> Result<Finalized, FinalizeError> {
    tokio::spawn(async move { finalize(&state, teacher_id).await })
        .await
        .map_err(|e| {
            error!(error = %e, "finalize: task failed");
            FinalizeError::Interrupted(e.to_string())
        })?
}

/// Close the open session on behalf of `teacher_id`.
///
/// # Errors
///
/// `Session(NoActiveSession | NotOwner | Closing)` before anything is
/// read or written; `ClassNotFound`, `Lookup`, `Persistence`, or
/// `PersistTimeout` after, with the session left open.
pub async fn finalize(state: &AppState, teacher_id: Uuid) -> Result<Finalized, FinalizeError> {
    // PHASE: SNAPSHOT
    // WHY: flag `closing` under the lock so concurrent marks are refused, not lost.
    let snapshot = state.session.lock().await.begin_close(teacher_id)?;
    let class_id = snapshot.class_id;
    info!(%class_id, marked = snapshot.attendance.len(), "finalize: snapshot taken");

    let records = match persist_snapshot(state, snapshot).await {
        Ok(records) => records,
        Err(e) => {
            state.session.lock().await.abort_close();
            warn!(%class_id, error = %e, "finalize: close aborted; session kept open");
            return Err(e);
        }
    };

    // PHASE: COMMIT
    state.session.lock().await.reset();
    let summary = Summary::tally(records.iter().map(|record| &record.status));
    info!(%class_id, present = summary.present, absent = summary.absent, total = summary.total, "finalize: session closed");

    let done = Envelope::for_kind(EventKind::Done, &DonePayload { message: PERSISTED_MESSAGE, summary });
    state.registry.broadcast(&done).await;

    Ok(Finalized { class_id, records, summary })
}

async fn persist_snapshot(state: &AppState, snapshot: Snapshot) -> Result<Vec<AttendanceRecord>, FinalizeError> {
    let class = state
        .classes
        .find_by_id(snapshot.class_id)
        .await
        .map_err(FinalizeError::Lookup)?
        .ok_or(FinalizeError::ClassNotFound(snapshot.class_id))?;

    let records = reconcile(snapshot, &class.student_ids);

    let limit = state.persist_timeout;
    match tokio::time::timeout(limit, state.store.insert_batch(&records)).await {
        Ok(Ok(())) => Ok(records),
        Ok(Err(e)) => Err(FinalizeError::Persistence(e)),
        Err(_) => Err(FinalizeError::PersistTimeout(limit)),
    }
}

/// Fill in `absent` for every enrolled student without a mark.
///
/// Marks for students no longer enrolled are kept. Output is ordered by
/// student ID.
#[must_use]
pub fn reconcile(snapshot: Snapshot, enrolled: &[Uuid]) -> Vec<AttendanceRecord> {
    let Snapshot { class_id, mut attendance } = snapshot;
    for student_id in enrolled {
        attendance.entry(*student_id).or_insert(AttendanceStatus::Absent);
    }

    let mut records: Vec<AttendanceRecord> = attendance
        .into_iter()
        .map(|(student_id, status)| AttendanceRecord { class_id, student_id, status })
        .collect();
    records.sort_by_key(|record| record.student_id);
    records
}

#[cfg(test)]
#[path = "finalize_test.rs"]
mod tests;
