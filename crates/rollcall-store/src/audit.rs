//! Audit event types

use chrono::{DateTime, Local};
use rollcall_api::{AttendanceStatus, CloseReason, VerificationMethod};
use rollcall_util::{AttendeeId, OwnerId, SessionId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    SessionCreated {
        session_id: SessionId,
        owner_id: OwnerId,
        title: String,
        start_time: DateTime<Local>,
    },

    /// Authority edited a scheduled session
    SessionUpdated { session_id: SessionId },

    SessionOpened {
        session_id: SessionId,
        /// false when opened by the scheduler
        by_authority: bool,
    },

    SessionClosed {
        session_id: SessionId,
        reason: CloseReason,
    },

    SessionArchived { session_id: SessionId },

    /// Successor of a recurring session was materialized
    OccurrenceScheduled {
        session_id: SessionId,
        series_id: SessionId,
        occurrence: u32,
        start_time: DateTime<Local>,
    },

    /// Token issued or rotated (value is never logged)
    TokenIssued {
        session_id: SessionId,
        expires_at: DateTime<Local>,
    },

    CheckInAccepted {
        session_id: SessionId,
        attendee_id: AttendeeId,
        method: VerificationMethod,
        status: AttendanceStatus,
    },

    CheckInRejected {
        session_id: SessionId,
        attendee_id: AttendeeId,
        method: VerificationMethod,
        reason: String,
    },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self::at(event, rollcall_util::now())
    }

    /// Event stamped with an explicit time
    pub fn at(event: AuditEventType, timestamp: DateTime<Local>) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp,
            event,
        }
    }
}
