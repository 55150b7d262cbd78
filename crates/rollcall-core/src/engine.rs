//! Core engine: lifecycle and arbitration bound to the store

use chrono::{DateTime, Local};
use rollcall_api::{
    AttendanceExportRow, AttendanceRecord, CheckInAttempt, HealthStatus, Session,
    SessionDraft, SessionStatus, VerificationMethod, VerificationToken,
};
use rollcall_config::ServiceSettings;
use rollcall_store::{AuditEvent, AuditEventType, Store, StoreError};
use rollcall_util::{AttendeeId, OwnerId, RateLimiter, SessionId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    CheckInArbiter, CheckInError, CheckInResult, CoreEvent, SessionError, SessionLifecycle,
    SessionResult, TokenRotator, Transition, Verifier,
};

/// Result of an authority action that changed a session
#[derive(Debug)]
pub struct Applied {
    /// Session after the change, without its token
    pub session: Session,
    pub events: Vec<CoreEvent>,
}

/// The core engine.
///
/// Every mutation of a session happens under that session's write lock.
/// Check-ins only take the read lock, and never while the verifier runs, so
/// attendees of one session check in concurrently and a slow verifier never
/// blocks a close.
pub struct CoreEngine {
    store: Arc<dyn Store>,
    lifecycle: SessionLifecycle,
    arbiter: CheckInArbiter,
    session_locks: Mutex<HashMap<SessionId, Arc<RwLock<()>>>>,
    rate_limiter: Mutex<RateLimiter<AttendeeId>>,
}

impl CoreEngine {
    pub fn new(settings: &ServiceSettings, store: Arc<dyn Store>, verifier: Arc<dyn Verifier>) -> Self {
        let rotator = TokenRotator::new(settings.token_rotation);
        let limit = &settings.check_in_rate_limit;

        info!(
            token_rotation_secs = settings.token_rotation.as_secs(),
            closing_soon_secs = settings.closing_soon.as_secs(),
            verifier_timeout_ms = settings.verifier_timeout.as_millis() as u64,
            "Core engine initialized"
        );

        Self {
            store,
            lifecycle: SessionLifecycle::new(rotator.clone(), settings.closing_soon),
            arbiter: CheckInArbiter::new(verifier, settings.verifier_timeout, rotator),
            session_locks: Mutex::new(HashMap::new()),
            rate_limiter: Mutex::new(RateLimiter::new(limit.max_attempts, limit.per)),
        }
    }

    // Authority actions

    pub async fn create_session(&self, draft: SessionDraft, now: DateTime<Local>) -> SessionResult<Session> {
        let session = self.lifecycle.create(draft, now)?;
        self.store.insert_session(&session)?;

        info!(
            session_id = %session.id,
            owner_id = %session.owner_id,
            title = %session.title,
            start = %session.start_time,
            recurring = session.is_recurring(),
            "Session created"
        );
        self.audit(AuditEventType::SessionCreated {
            session_id: session.id.clone(),
            owner_id: session.owner_id.clone(),
            title: session.title.clone(),
            start_time: session.start_time,
        });

        Ok(session)
    }

    pub async fn update_session(
        &self,
        session_id: &SessionId,
        draft: SessionDraft,
    ) -> SessionResult<Session> {
        let lock = self.session_lock(session_id);
        let _guard = lock.write().await;

        let session = self.load(session_id)?;
        let edited = self.lifecycle.edit(&session, draft)?;
        self.store.update_session(&edited)?;

        info!(session_id = %session_id, "Session updated");
        self.audit(AuditEventType::SessionUpdated {
            session_id: session_id.clone(),
        });

        Ok(edited.without_token())
    }

    pub async fn open_session(&self, session_id: &SessionId, now: DateTime<Local>) -> SessionResult<Applied> {
        self.apply(session_id, now, |lc, s| lc.open(s, now)).await
    }

    pub async fn close_session(&self, session_id: &SessionId, now: DateTime<Local>) -> SessionResult<Applied> {
        self.apply(session_id, now, |lc, s| lc.close(s, now)).await
    }

    pub async fn cancel_session(&self, session_id: &SessionId, now: DateTime<Local>) -> SessionResult<Applied> {
        self.apply(session_id, now, |lc, s| lc.cancel(s, now)).await
    }

    /// Retire a session; its series produces no further occurrences
    pub async fn archive_session(&self, session_id: &SessionId, now: DateTime<Local>) -> SessionResult<Applied> {
        let applied = self.apply(session_id, now, |lc, s| lc.archive(s, now)).await?;
        self.audit(AuditEventType::SessionArchived {
            session_id: session_id.clone(),
        });
        Ok(applied)
    }

    /// Token to display for an open QR session, rotating it if it expired
    pub async fn current_token(
        &self,
        session_id: &SessionId,
        now: DateTime<Local>,
    ) -> SessionResult<(VerificationToken, Vec<CoreEvent>)> {
        let lock = self.session_lock(session_id);
        let _guard = lock.write().await;

        let mut session = self.load(session_id)?;
        if !session.accepts(VerificationMethod::Qr) {
            return Err(SessionError::MethodNotAccepted(
                "session does not accept QR check-in".into(),
            ));
        }
        if session.status != SessionStatus::Open {
            return Err(SessionError::InvalidTransition {
                action: "issue a token for",
                status: session.status,
            });
        }

        let mut events = Vec::new();
        if let Some(transition) = self.lifecycle.rotate_token(&mut session, now) {
            events = self.commit(&mut session, vec![transition], true, now)?;
        }

        match session.token {
            Some(token) if now < token.expires_at => Ok((token, events)),
            _ => Err(SessionError::InvalidTransition {
                action: "issue a token for",
                status: session.status,
            }),
        }
    }

    /// Apply every automatic transition due at `now`.
    ///
    /// A session whose commit fails is left as it was and retried on the
    /// next tick; no events are emitted for it.
    pub async fn tick(&self, now: DateTime<Local>) -> Vec<CoreEvent> {
        let active = match self.store.list_active_sessions() {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(error = %e, "Failed to list active sessions");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        for candidate in active {
            let lock = self.session_lock(&candidate.id);
            let _guard = lock.write().await;

            // Reload under the lock; an authority action may have won the race
            let mut session = match self.store.get_session(&candidate.id) {
                Ok(Some(session)) => session,
                Ok(None) => continue,
                Err(e) => {
                    warn!(session_id = %candidate.id, error = %e, "Failed to load session");
                    continue;
                }
            };

            match self.lifecycle.advance(&mut session, now) {
                Ok(transitions) if transitions.is_empty() => {}
                Ok(transitions) => match self.commit(&mut session, transitions, false, now) {
                    Ok(emitted) => events.extend(emitted),
                    Err(e) => {
                        warn!(session_id = %session.id, error = %e, "Failed to commit transition, will retry");
                    }
                },
                Err(e) => {
                    warn!(session_id = %session.id, error = %e, "Skipping session");
                }
            }
        }

        self.prune_locks();
        events
    }

    // Check-in

    pub async fn check_in(
        &self,
        session_id: &SessionId,
        attempt: CheckInAttempt,
        now: DateTime<Local>,
    ) -> CheckInResult<(AttendanceRecord, CoreEvent)> {
        match self.try_check_in(session_id, &attempt, now).await {
            Ok(record) => {
                info!(
                    session_id = %session_id,
                    attendee_id = %record.attendee_id,
                    method = %record.verification_method,
                    status = record.status.as_str(),
                    "Check-in accepted"
                );
                self.audit(AuditEventType::CheckInAccepted {
                    session_id: session_id.clone(),
                    attendee_id: record.attendee_id.clone(),
                    method: record.verification_method,
                    status: record.status,
                });
                let event = CoreEvent::CheckInRecorded {
                    session_id: session_id.clone(),
                    attendee_id: record.attendee_id.clone(),
                    status: record.status,
                };
                Ok((record, event))
            }
            Err(e) => {
                debug!(
                    session_id = %session_id,
                    attendee_id = %attempt.attendee_id,
                    method = %attempt.method,
                    reason = %e,
                    "Check-in rejected"
                );
                if !matches!(e, CheckInError::Store(_)) {
                    self.audit(AuditEventType::CheckInRejected {
                        session_id: session_id.clone(),
                        attendee_id: attempt.attendee_id.clone(),
                        method: attempt.method,
                        reason: e.to_string(),
                    });
                }
                Err(e)
            }
        }
    }

    async fn try_check_in(
        &self,
        session_id: &SessionId,
        attempt: &CheckInAttempt,
        now: DateTime<Local>,
    ) -> CheckInResult<AttendanceRecord> {
        let allowed = self
            .rate_limiter
            .lock()
            .map(|mut limiter| limiter.check(&attempt.attendee_id))
            .unwrap_or(true);
        if !allowed {
            return Err(CheckInError::RateLimited);
        }

        let lock = self.session_lock(session_id);

        let snapshot = {
            let _guard = lock.read().await;
            self.store
                .get_session(session_id)?
                .ok_or_else(|| CheckInError::SessionNotFound(session_id.clone()))?
        };

        let record = self.arbiter.arbitrate(&snapshot, attempt, now).await?;

        // The session may have closed while the proof was being checked
        let _guard = lock.read().await;
        let current = self
            .store
            .get_session(session_id)?
            .ok_or_else(|| CheckInError::SessionNotFound(session_id.clone()))?;
        if current.status != SessionStatus::Open {
            return Err(CheckInError::SessionNotOpen);
        }

        match self.store.insert_attendance(&record) {
            Ok(()) => Ok(record),
            Err(StoreError::Conflict(_)) => Err(CheckInError::AlreadyCheckedIn),
            Err(e) => Err(e.into()),
        }
    }

    // Queries

    pub fn get_session(&self, session_id: &SessionId) -> SessionResult<Session> {
        Ok(self.load(session_id)?.without_token())
    }

    pub fn list_sessions(
        &self,
        status: Option<SessionStatus>,
        owner_id: Option<&OwnerId>,
    ) -> SessionResult<Vec<Session>> {
        let sessions = self.store.list_sessions(status, owner_id)?;
        Ok(sessions.iter().map(Session::without_token).collect())
    }

    pub fn list_attendance(&self, session_id: &SessionId) -> SessionResult<Vec<AttendanceRecord>> {
        self.load(session_id)?;
        Ok(self.store.list_attendance(session_id)?)
    }

    pub fn export_attendance(&self, owner_id: Option<&OwnerId>) -> SessionResult<Vec<AttendanceExportRow>> {
        Ok(self.store.export_attendance(owner_id)?)
    }

    pub fn health(&self) -> HealthStatus {
        let store_ok = self.store.is_healthy();
        let open_sessions = self
            .store
            .list_sessions(Some(SessionStatus::Open), None)
            .map(|s| s.len())
            .unwrap_or(0);

        HealthStatus {
            live: true,
            ready: store_ok,
            store_ok,
            open_sessions,
        }
    }

    // Internals

    async fn apply<F>(&self, session_id: &SessionId, now: DateTime<Local>, action: F) -> SessionResult<Applied>
    where
        F: FnOnce(&SessionLifecycle, &mut Session) -> SessionResult<Vec<Transition>>,
    {
        let lock = self.session_lock(session_id);
        let _guard = lock.write().await;

        let mut session = self.load(session_id)?;
        let transitions = action(&self.lifecycle, &mut session)?;
        let events = self.commit(&mut session, transitions, true, now)?;

        Ok(Applied {
            session: session.without_token(),
            events,
        })
    }

    /// Persist a transitioned session together with its successor, then
    /// audit and describe what happened. Nothing is emitted if the write fails.
    fn commit(
        &self,
        session: &mut Session,
        transitions: Vec<Transition>,
        by_authority: bool,
        now: DateTime<Local>,
    ) -> SessionResult<Vec<CoreEvent>> {
        let closed = transitions
            .iter()
            .any(|t| matches!(t, Transition::Closed { .. }));
        let successor = if closed {
            self.lifecycle.successor(session, now)
        } else {
            None
        };

        self.store.commit_transition(session, successor.as_ref())?;

        let mut events = Vec::with_capacity(transitions.len() + 1);
        for transition in transitions {
            events.push(self.record(session, transition, by_authority));
        }

        if let Some(next) = successor {
            info!(
                session_id = %next.id,
                series_id = %next.series_id,
                occurrence = next.occurrence,
                start = %next.start_time,
                "Next occurrence scheduled"
            );
            self.audit(AuditEventType::OccurrenceScheduled {
                session_id: next.id.clone(),
                series_id: next.series_id.clone(),
                occurrence: next.occurrence,
                start_time: next.start_time,
            });
            events.push(CoreEvent::OccurrenceScheduled {
                session_id: next.id,
                series_id: next.series_id,
                start_time: next.start_time,
            });
        }

        Ok(events)
    }

    fn record(&self, session: &Session, transition: Transition, by_authority: bool) -> CoreEvent {
        match transition {
            Transition::Opened => {
                info!(session_id = %session.id, title = %session.title, by_authority, "Session opened");
                self.audit(AuditEventType::SessionOpened {
                    session_id: session.id.clone(),
                    by_authority,
                });
                CoreEvent::SessionOpened {
                    session_id: session.id.clone(),
                    title: session.title.clone(),
                    ends_at: session.end_boundary(),
                }
            }
            Transition::TokenIssued { expires_at } => {
                debug!(session_id = %session.id, expires_at = %expires_at, "Token issued");
                self.audit(AuditEventType::TokenIssued {
                    session_id: session.id.clone(),
                    expires_at,
                });
                CoreEvent::TokenRotated {
                    session_id: session.id.clone(),
                    expires_at,
                }
            }
            Transition::ClosingSoon { closes_at } => {
                info!(session_id = %session.id, closes_at = %closes_at, "Session closing soon");
                CoreEvent::SessionClosingSoon {
                    session_id: session.id.clone(),
                    closes_at,
                }
            }
            Transition::Closed { reason } => {
                info!(session_id = %session.id, reason = ?reason, "Session closed");
                self.audit(AuditEventType::SessionClosed {
                    session_id: session.id.clone(),
                    reason,
                });
                CoreEvent::SessionClosed {
                    session_id: session.id.clone(),
                    reason,
                }
            }
        }
    }

    fn load(&self, session_id: &SessionId) -> SessionResult<Session> {
        self.store
            .get_session(session_id)?
            .ok_or_else(|| SessionError::NotFound(session_id.clone()))
    }

    fn session_lock(&self, session_id: &SessionId) -> Arc<RwLock<()>> {
        match self.session_locks.lock() {
            Ok(mut locks) => locks.entry(session_id.clone()).or_default().clone(),
            Err(poisoned) => poisoned
                .into_inner()
                .entry(session_id.clone())
                .or_default()
                .clone(),
        }
    }

    /// Drop locks nobody holds; they are recreated on demand
    fn prune_locks(&self) {
        if let Ok(mut locks) = self.session_locks.lock() {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        if let Ok(mut limiter) = self.rate_limiter.lock() {
            limiter.cleanup(std::time::Duration::from_secs(3600));
        }
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to append audit event");
        }
    }
}
