//! Command types for the rollcalld protocol

use rollcall_util::{ClientId, OwnerId, SessionId};
use serde::{Deserialize, Serialize};

use crate::{
    API_VERSION, AttendanceExportRow, AttendanceRecord, CheckInAttempt, HealthStatus, Session,
    SessionDraft, SessionStatus, VerificationToken,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    SessionNotFound,
    SessionNotOpen,
    MethodNotAccepted,
    InvalidOrExpiredToken,
    OutsideGeofence,
    VerifierUnavailable,
    VerificationFailed,
    AlreadyCheckedIn,
    ClockSkew,
    InvalidRecurrenceSpec,
    InvalidSession,
    InvalidTransition,
    NotEditable,
    RateLimited,
    StoreError,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Get health status
    GetHealth,

    /// Ping for keepalive
    Ping,

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    /// Unsubscribe from events
    UnsubscribeEvents,

    // Authority commands
    CreateSession { draft: SessionDraft },

    /// Replace the definition of a session that has not opened yet
    UpdateSession {
        session_id: SessionId,
        draft: SessionDraft,
    },

    OpenSession { session_id: SessionId },

    CloseSession { session_id: SessionId },

    /// Close a scheduled session without it ever opening
    CancelSession { session_id: SessionId },

    /// Retire a session (and its series) for good
    ArchiveSession { session_id: SessionId },

    /// Current token for display; rotates it if due
    GetToken { session_id: SessionId },

    // Queries
    GetSession { session_id: SessionId },

    ListSessions {
        #[serde(default)]
        status: Option<SessionStatus>,
        #[serde(default)]
        owner_id: Option<OwnerId>,
    },

    ListAttendance { session_id: SessionId },

    ExportAttendance {
        #[serde(default)]
        owner_id: Option<OwnerId>,
    },

    // Attendee commands
    CheckIn {
        session_id: SessionId,
        attempt: CheckInAttempt,
    },
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Session(Session),
    Sessions { sessions: Vec<Session> },
    Token(VerificationToken),
    CheckedIn(AttendanceRecord),
    Attendance { records: Vec<AttendanceRecord> },
    Export { rows: Vec<AttendanceExportRow> },
    Subscribed { client_id: ClientId },
    Unsubscribed,
    Health(HealthStatus),
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new() -> Self {
        Self {
            client_id: ClientId::new(),
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::new()
    }
}
