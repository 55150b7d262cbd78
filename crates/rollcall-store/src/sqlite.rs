//! SQLite-based store implementation

use chrono::{DateTime, Local};
use rollcall_api::{AttendanceExportRow, AttendanceRecord, Session, SessionStatus};
use rollcall_util::{AttendeeId, OwnerId, SessionId};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{AuditEvent, Store, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Sessions; one row per occurrence
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                series_id TEXT NOT NULL,
                occurrence INTEGER NOT NULL,
                owner_id TEXT NOT NULL,
                status TEXT NOT NULL,
                archived INTEGER NOT NULL DEFAULT 0,
                start_ts INTEGER NOT NULL,
                session_json TEXT NOT NULL,
                UNIQUE (series_id, occurrence)
            );

            -- Attendance; never deleted
            CREATE TABLE IF NOT EXISTS attendance (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                attendee_id TEXT NOT NULL,
                check_in_ts INTEGER NOT NULL,
                record_json TEXT NOT NULL,
                UNIQUE (session_id, attendee_id)
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status, archived);
            CREATE INDEX IF NOT EXISTS idx_sessions_owner ON sessions(owner_id);
            CREATE INDEX IF NOT EXISTS idx_attendance_session ON attendance(session_id);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn insert_session_row(conn: &Connection, session: &Session) -> StoreResult<()> {
    let json = serde_json::to_string(session)?;
    conn.execute(
        r#"
        INSERT INTO sessions
            (id, series_id, occurrence, owner_id, status, archived, start_ts, session_json)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            session.id.to_string(),
            session.series_id.to_string(),
            session.occurrence,
            session.owner_id.as_str(),
            session.status.as_str(),
            session.archived,
            session.start_time.timestamp_millis(),
            json,
        ],
    )?;
    Ok(())
}

fn update_session_row(conn: &Connection, session: &Session) -> StoreResult<()> {
    let json = serde_json::to_string(session)?;
    let changed = conn.execute(
        r#"
        UPDATE sessions
        SET owner_id = ?, status = ?, archived = ?, start_ts = ?, session_json = ?
        WHERE id = ?
        "#,
        params![
            session.owner_id.as_str(),
            session.status.as_str(),
            session.archived,
            session.start_time.timestamp_millis(),
            json,
            session.id.to_string(),
        ],
    )?;

    if changed == 0 {
        return Err(StoreError::NotFound(format!("session {}", session.id)));
    }
    Ok(())
}

fn parse_timestamp(s: &str) -> DateTime<Local> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Local))
        .unwrap_or_else(|_| rollcall_util::now())
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            events.push(AuditEvent {
                id,
                timestamp: parse_timestamp(&timestamp_str),
                event: serde_json::from_str(&event_json)?,
            });
        }

        Ok(events)
    }

    fn insert_session(&self, session: &Session) -> StoreResult<()> {
        let conn = self.conn()?;
        insert_session_row(&conn, session)?;
        debug!(session_id = %session.id, occurrence = session.occurrence, "Session inserted");
        Ok(())
    }

    fn get_session(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        let conn = self.conn()?;

        let json: Option<String> = conn
            .query_row(
                "SELECT session_json FROM sessions WHERE id = ?",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    fn update_session(&self, session: &Session) -> StoreResult<()> {
        let conn = self.conn()?;
        update_session_row(&conn, session)
    }

    fn commit_transition(&self, session: &Session, successor: Option<&Session>) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        update_session_row(&tx, session)?;
        if let Some(next) = successor {
            insert_session_row(&tx, next)?;
        }

        tx.commit()?;
        debug!(
            session_id = %session.id,
            status = %session.status,
            successor = ?successor.map(|s| s.id.to_string()),
            "Transition committed"
        );
        Ok(())
    }

    fn list_sessions(
        &self,
        status: Option<SessionStatus>,
        owner_id: Option<&OwnerId>,
    ) -> StoreResult<Vec<Session>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT session_json FROM sessions
            WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR owner_id = ?2)
            ORDER BY start_ts, occurrence
            "#,
        )?;

        let rows = stmt.query_map(
            params![status.map(|s| s.as_str()), owner_id.map(|o| o.as_str())],
            |row| row.get::<_, String>(0),
        )?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(serde_json::from_str(&row?)?);
        }
        Ok(sessions)
    }

    fn list_active_sessions(&self) -> StoreResult<Vec<Session>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT session_json FROM sessions
            WHERE status IN ('scheduled', 'open') AND archived = 0
            ORDER BY start_ts
            "#,
        )?;

        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(serde_json::from_str(&row?)?);
        }
        Ok(sessions)
    }

    fn insert_attendance(&self, record: &AttendanceRecord) -> StoreResult<()> {
        let conn = self.conn()?;
        let json = serde_json::to_string(record)?;

        conn.execute(
            r#"
            INSERT INTO attendance (id, session_id, attendee_id, check_in_ts, record_json)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                record.id.to_string(),
                record.session_id.to_string(),
                record.attendee_id.as_str(),
                record.check_in_time.timestamp_millis(),
                json,
            ],
        )?;

        debug!(
            session_id = %record.session_id,
            attendee_id = %record.attendee_id,
            "Attendance recorded"
        );
        Ok(())
    }

    fn get_attendance(
        &self,
        session_id: &SessionId,
        attendee_id: &AttendeeId,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let conn = self.conn()?;

        let json: Option<String> = conn
            .query_row(
                "SELECT record_json FROM attendance WHERE session_id = ? AND attendee_id = ?",
                params![session_id.to_string(), attendee_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    fn list_attendance(&self, session_id: &SessionId) -> StoreResult<Vec<AttendanceRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT record_json FROM attendance WHERE session_id = ? ORDER BY check_in_ts",
        )?;
        let rows = stmt.query_map([session_id.to_string()], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }
        Ok(records)
    }

    fn export_attendance(&self, owner_id: Option<&OwnerId>) -> StoreResult<Vec<AttendanceExportRow>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT s.session_json, a.record_json
            FROM attendance a
            JOIN sessions s ON s.id = a.session_id
            WHERE (?1 IS NULL OR s.owner_id = ?1)
            ORDER BY s.start_ts, a.check_in_ts
            "#,
        )?;

        let rows = stmt.query_map(params![owner_id.map(|o| o.as_str())], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut export = Vec::new();
        for row in rows {
            let (session_json, record_json) = row?;
            let session: Session = serde_json::from_str(&session_json)?;
            let record: AttendanceRecord = serde_json::from_str(&record_json)?;
            export.push(AttendanceExportRow {
                session_id: session.id,
                session_title: session.title,
                session_start: session.start_time,
                owner_id: session.owner_id,
                attendee_id: record.attendee_id,
                check_in_time: record.check_in_time,
                status: record.status,
                verification_method: record.verification_method,
            });
        }
        Ok(export)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
