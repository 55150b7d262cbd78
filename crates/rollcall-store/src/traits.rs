//! Store trait definitions

use rollcall_api::{AttendanceExportRow, AttendanceRecord, Session, SessionStatus};
use rollcall_util::{AttendeeId, OwnerId, SessionId};

use crate::{AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Sessions

    /// Insert a new session. Fails with `Conflict` if the id or the
    /// (series, occurrence) pair already exists.
    fn insert_session(&self, session: &Session) -> StoreResult<()>;

    fn get_session(&self, id: &SessionId) -> StoreResult<Option<Session>>;

    /// Overwrite an existing session. Fails with `NotFound` if it is missing.
    fn update_session(&self, session: &Session) -> StoreResult<()>;

    /// Persist a transitioned session and, when given, the next occurrence of
    /// its series in one transaction: either both are written or neither is.
    fn commit_transition(&self, session: &Session, successor: Option<&Session>) -> StoreResult<()>;

    /// List sessions ordered by start time, optionally filtered
    fn list_sessions(
        &self,
        status: Option<SessionStatus>,
        owner_id: Option<&OwnerId>,
    ) -> StoreResult<Vec<Session>>;

    /// Scheduled and Open sessions that are not archived
    fn list_active_sessions(&self) -> StoreResult<Vec<Session>>;

    // Attendance

    /// Insert a record. Fails with `Conflict` if the attendee already has a
    /// record for the session; existing records are never overwritten.
    fn insert_attendance(&self, record: &AttendanceRecord) -> StoreResult<()>;

    fn get_attendance(
        &self,
        session_id: &SessionId,
        attendee_id: &AttendeeId,
    ) -> StoreResult<Option<AttendanceRecord>>;

    /// Records for one session ordered by check-in time
    fn list_attendance(&self, session_id: &SessionId) -> StoreResult<Vec<AttendanceRecord>>;

    /// Records joined with their sessions, optionally for one owner
    fn export_attendance(&self, owner_id: Option<&OwnerId>) -> StoreResult<Vec<AttendanceExportRow>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
