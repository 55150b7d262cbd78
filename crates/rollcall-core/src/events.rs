//! Core events emitted by the engine

use chrono::{DateTime, Local};
use rollcall_api::{AttendanceStatus, CloseReason};
use rollcall_util::{AttendeeId, SessionId};

/// Events emitted by the core engine.
///
/// These are requests to notify; delivery is up to the service.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    SessionOpened {
        session_id: SessionId,
        title: String,
        ends_at: DateTime<Local>,
    },

    SessionClosingSoon {
        session_id: SessionId,
        closes_at: DateTime<Local>,
    },

    SessionClosed {
        session_id: SessionId,
        reason: CloseReason,
    },

    /// Next occurrence of a recurring series was persisted
    OccurrenceScheduled {
        session_id: SessionId,
        series_id: SessionId,
        start_time: DateTime<Local>,
    },

    TokenRotated {
        session_id: SessionId,
        expires_at: DateTime<Local>,
    },

    CheckInRecorded {
        session_id: SessionId,
        attendee_id: AttendeeId,
        status: AttendanceStatus,
    },
}
