//! Envelope — the wire message type for the attendance channel.
//!
//! ARCHITECTURE
//! ============
//! Every websocket message in either direction is `{event, data}`. Clients
//! send an inbound envelope, the router resolves its `event` name to a
//! closed `EventKind`, and replies or broadcasts flow back as envelopes of
//! the same shape. Errors always use the `ERROR` event.
//!
//! DESIGN
//! ======
//! - The event name is resolved before the payload is inspected, so unknown
//!   names and role mismatches are rejected without decoding `data`.
//! - `EventKind::required_role` is an exhaustive match: adding an event
//!   without deciding who may send it does not compile.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::services::auth::Role;
use crate::services::session::AttendanceStatus;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Event name carried by every error envelope.
pub const EVENT_ERROR: &str = "ERROR";

/// Envelope data key for error messages.
pub const FIELD_MESSAGE: &str = "message";

/// Envelope data key for grepable error codes.
pub const FIELD_CODE: &str = "code";

/// Envelope data key for the retryable flag on error envelopes.
pub const FIELD_RETRYABLE: &str = "retryable";

// =============================================================================
// TYPES
// =============================================================================

/// The universal message type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Inbound event vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AttendanceMarked,
    TodaySummary,
    MyAttendance,
    Done,
}

/// Decoded inbound event with its typed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    AttendanceMarked(MarkPayload),
    TodaySummary,
    MyAttendance,
    Done,
}

/// Payload of `ATTENDANCE_MARKED`, inbound and broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkPayload {
    pub student_id: Uuid,
    pub status: AttendanceStatus,
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag for structured error envelopes.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// EVENT KINDS
// =============================================================================

impl EventKind {
    pub const ALL: [EventKind; 4] = [Self::AttendanceMarked, Self::TodaySummary, Self::MyAttendance, Self::Done];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AttendanceMarked => "ATTENDANCE_MARKED",
            Self::TodaySummary => "TODAY_SUMMARY",
            Self::MyAttendance => "MY_ATTENDANCE",
            Self::Done => "DONE",
        }
    }

    /// Resolve a wire event name. `None` for anything outside the vocabulary.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// The only role allowed to send this event.
    #[must_use]
    pub fn required_role(self) -> Role {
        match self {
            Self::AttendanceMarked | Self::TodaySummary | Self::Done => Role::Teacher,
            Self::MyAttendance => Role::Student,
        }
    }
}

impl ClientEvent {
    /// Decode the payload for an already-resolved event kind.
    ///
    /// # Errors
    ///
    /// Returns the serde error if `data` does not match the event's payload.
    pub fn decode(kind: EventKind, data: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            EventKind::AttendanceMarked => Self::AttendanceMarked(serde_json::from_value(data)?),
            EventKind::TodaySummary => Self::TodaySummary,
            EventKind::MyAttendance => Self::MyAttendance,
            EventKind::Done => Self::Done,
        })
    }
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self { event: event.into(), data }
    }

    /// Build an outbound envelope for `kind` from any serializable payload.
    pub fn for_kind(kind: EventKind, payload: &impl Serialize) -> Self {
        Self::new(kind.as_str(), serde_json::to_value(payload).unwrap_or_default())
    }

    /// Structured error envelope from a typed error.
    #[must_use]
    pub fn error_from(err: &(impl ErrorCode + ?Sized)) -> Self {
        let mut data = Map::new();
        data.insert(FIELD_MESSAGE.into(), Value::String(err.to_string()));
        data.insert(FIELD_CODE.into(), Value::String(err.error_code().to_string()));
        data.insert(FIELD_RETRYABLE.into(), Value::Bool(err.retryable()));
        Self::new(EVENT_ERROR, Value::Object(data))
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.event == EVENT_ERROR
    }

    /// String field from `data`, if present.
    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
