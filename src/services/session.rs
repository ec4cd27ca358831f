//! Session service — the single in-memory attendance session.
//!
//! DESIGN
//! ======
//! `SessionState` holds zero or one open session. It is a plain struct; the
//! exclusive lock around it lives in `AppState`, so every read and mutation
//! is serialized by whoever holds the guard.
//!
//! A session moves `open → closing → reset`. `begin_close` flips the
//! `closing` flag and hands out a snapshot; while closing, marks are
//! refused so nothing can land between the snapshot and the reset and be
//! lost. `abort_close` returns the session to open with its map intact.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::event::ErrorCode;

/// Reported to a student whose status has not been marked.
pub const STATUS_NOT_YET_UPDATED: &str = "not yet updated";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            _ => None,
        }
    }
}

/// Counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub present: usize,
    pub absent: usize,
    pub total: usize,
}

impl Summary {
    pub fn tally<'a>(statuses: impl IntoIterator<Item = &'a AttendanceStatus>) -> Self {
        statuses.into_iter().fold(Self::default(), |mut acc, status| {
            match status {
                AttendanceStatus::Present => acc.present += 1,
                AttendanceStatus::Absent => acc.absent += 1,
            }
            acc.total += 1;
            acc
        })
    }
}

/// Identifying fields of the open session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub class_id: Uuid,
    pub teacher_id: Uuid,
    /// RFC 3339, UTC.
    pub started_at: String,
}

/// Copy of the session taken at close time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub class_id: Uuid,
    pub attendance: HashMap<Uuid, AttendanceStatus>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("attendance session already open for class {0}")]
    Conflict(Uuid),
    #[error("No active attendance session")]
    NoActiveSession,
    #[error("Forbidden, not class teacher")]
    NotOwner,
    #[error("attendance session is closing")]
    Closing,
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Conflict(_) => "E_SESSION_CONFLICT",
            Self::NoActiveSession => "E_NO_ACTIVE_SESSION",
            Self::NotOwner => "E_NOT_CLASS_TEACHER",
            Self::Closing => "E_SESSION_CLOSING",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Closing)
    }
}

struct ActiveSession {
    info: SessionInfo,
    attendance: HashMap<Uuid, AttendanceStatus>,
    closing: bool,
}

// =============================================================================
// SESSION STATE
// =============================================================================

#[derive(Default)]
pub struct SessionState {
    active: Option<ActiveSession>,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for `class_id`, owned by `teacher_id`.
    ///
    /// # Errors
    ///
    /// `Conflict` if any session is already open, including one for the
    /// same class. The open session is left untouched.
    pub fn start(&mut self, class_id: Uuid, teacher_id: Uuid) -> Result<SessionInfo, SessionError> {
        if let Some(active) = &self.active {
            return Err(SessionError::Conflict(active.info.class_id));
        }

        let started_at = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
        let info = SessionInfo { class_id, teacher_id, started_at };
        self.active = Some(ActiveSession { info: info.clone(), attendance: HashMap::new(), closing: false });
        Ok(info)
    }

    #[must_use]
    pub fn info(&self) -> Option<&SessionInfo> {
        self.active.as_ref().map(|active| &active.info)
    }

    /// Check that a session is open and owned by `teacher_id`.
    ///
    /// # Errors
    ///
    /// `NoActiveSession` or `NotOwner`.
    pub fn ensure_owner(&self, teacher_id: Uuid) -> Result<(), SessionError> {
        let active = self.active.as_ref().ok_or(SessionError::NoActiveSession)?;
        if active.info.teacher_id != teacher_id {
            return Err(SessionError::NotOwner);
        }
        Ok(())
    }

    /// Set or overwrite a student's status. Last write wins.
    ///
    /// # Errors
    ///
    /// `NoActiveSession` when none is open, `Closing` during a finalize.
    pub fn mark_status(&mut self, student_id: Uuid, status: AttendanceStatus) -> Result<(), SessionError> {
        let active = self.active.as_mut().ok_or(SessionError::NoActiveSession)?;
        if active.closing {
            return Err(SessionError::Closing);
        }
        active.attendance.insert(student_id, status);
        Ok(())
    }

    /// Current in-memory status. `None` when unmarked or no session is open.
    #[must_use]
    pub fn status_of(&self, student_id: Uuid) -> Option<AttendanceStatus> {
        self.active
            .as_ref()
            .and_then(|active| active.attendance.get(&student_id).copied())
    }

    /// Counts of the entries marked so far.
    ///
    /// # Errors
    ///
    /// `NoActiveSession` when none is open.
    pub fn summary(&self) -> Result<Summary, SessionError> {
        let active = self.active.as_ref().ok_or(SessionError::NoActiveSession)?;
        Ok(Summary::tally(active.attendance.values()))
    }

    /// # Errors
    ///
    /// `NoActiveSession` when none is open.
    pub fn snapshot(&self) -> Result<Snapshot, SessionError> {
        let active = self.active.as_ref().ok_or(SessionError::NoActiveSession)?;
        Ok(Snapshot { class_id: active.info.class_id, attendance: active.attendance.clone() })
    }

    /// Enter the closing phase and return the snapshot to persist.
    ///
    /// # Errors
    ///
    /// `NoActiveSession`, `NotOwner`, or `Closing` if another close is
    /// already in flight.
    pub fn begin_close(&mut self, teacher_id: Uuid) -> Result<Snapshot, SessionError> {
        self.ensure_owner(teacher_id)?;
        if self.is_closing() {
            return Err(SessionError::Closing);
        }
        let snapshot = self.snapshot()?;
        if let Some(active) = self.active.as_mut() {
            active.closing = true;
        }
        Ok(snapshot)
    }

    /// Leave the closing phase without resetting. Marks are accepted again.
    pub fn abort_close(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.closing = false;
        }
    }

    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.active.as_ref().is_some_and(|active| active.closing)
    }

    /// Drop the session. Only called once its records are durable.
    pub fn reset(&mut self) {
        self.active = None;
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
