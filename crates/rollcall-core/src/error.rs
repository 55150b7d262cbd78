//! Error types for session management and check-in arbitration

use chrono::{DateTime, Local};
use rollcall_api::{ErrorCode, SessionStatus, VerificationMethod};
use rollcall_store::StoreError;
use rollcall_util::SessionId;
use thiserror::Error;

/// Errors from authority actions and lifecycle transitions
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Invalid recurrence: {0}")]
    InvalidRecurrenceSpec(String),

    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("Method not accepted: {0}")]
    MethodNotAccepted(String),

    #[error("Session {0} can only be edited while scheduled")]
    NotEditable(SessionId),

    #[error("Cannot {action} a {status} session")]
    InvalidTransition {
        action: &'static str,
        status: SessionStatus,
    },

    #[error("Session has not started yet (starts {starts_at})")]
    NotStarted { starts_at: DateTime<Local> },

    #[error("Clock skew: {now} is before the session was created ({created_at})")]
    ClockSkew {
        now: DateTime<Local>,
        created_at: DateTime<Local>,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::NotFound(_) => ErrorCode::SessionNotFound,
            SessionError::InvalidRecurrenceSpec(_) => ErrorCode::InvalidRecurrenceSpec,
            SessionError::InvalidSession(_) => ErrorCode::InvalidSession,
            SessionError::MethodNotAccepted(_) => ErrorCode::MethodNotAccepted,
            SessionError::NotEditable(_) => ErrorCode::NotEditable,
            SessionError::InvalidTransition { .. } | SessionError::NotStarted { .. } => {
                ErrorCode::InvalidTransition
            }
            SessionError::ClockSkew { .. } => ErrorCode::ClockSkew,
            SessionError::Store(_) => ErrorCode::StoreError,
        }
    }
}

/// Reasons a check-in attempt is rejected
#[derive(Debug, Error)]
pub enum CheckInError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Session is not open for check-in")]
    SessionNotOpen,

    #[error("Verification method '{0}' is not accepted for this session")]
    MethodNotAccepted(VerificationMethod),

    #[error("Token is invalid or expired")]
    InvalidOrExpiredToken,

    #[error("Outside geofence: {distance_meters:.0} m from center, limit {radius_meters:.0} m")]
    OutsideGeofence {
        distance_meters: f64,
        radius_meters: f64,
    },

    #[error("Verifier unavailable: {0}")]
    VerifierUnavailable(String),

    #[error("Verification failed")]
    VerificationFailed,

    #[error("Attendee already checked in")]
    AlreadyCheckedIn,

    #[error("Clock skew: check-in time precedes session creation")]
    ClockSkew,

    #[error("Too many check-in attempts")]
    RateLimited,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CheckInError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CheckInError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            CheckInError::SessionNotOpen => ErrorCode::SessionNotOpen,
            CheckInError::MethodNotAccepted(_) => ErrorCode::MethodNotAccepted,
            CheckInError::InvalidOrExpiredToken => ErrorCode::InvalidOrExpiredToken,
            CheckInError::OutsideGeofence { .. } => ErrorCode::OutsideGeofence,
            CheckInError::VerifierUnavailable(_) => ErrorCode::VerifierUnavailable,
            CheckInError::VerificationFailed => ErrorCode::VerificationFailed,
            CheckInError::AlreadyCheckedIn => ErrorCode::AlreadyCheckedIn,
            CheckInError::ClockSkew => ErrorCode::ClockSkew,
            CheckInError::RateLimited => ErrorCode::RateLimited,
            CheckInError::Store(_) => ErrorCode::StoreError,
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
pub type CheckInResult<T> = Result<T, CheckInError>;
