//! Session state machine
//!
//! `Scheduled -> Open -> Closed`, with `Closed` terminal. Everything here is
//! a pure function of the session and the supplied time; persistence and
//! locking belong to the engine.

use chrono::{DateTime, Local};
use rollcall_api::{
    CloseReason, Frequency, RecurrenceEnd, RecurrencePattern, ScheduleType, Session,
    SessionDraft, SessionStatus, VerificationMethod,
};
use rollcall_util::SessionId;
use std::time::Duration;

use crate::{SessionError, SessionResult, TokenRotator, recurrence};

/// A state change produced by the lifecycle, in the order it happened
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Opened,
    TokenIssued { expires_at: DateTime<Local> },
    ClosingSoon { closes_at: DateTime<Local> },
    Closed { reason: CloseReason },
}

/// Owns the rules for creating, editing and transitioning sessions
#[derive(Debug, Clone)]
pub struct SessionLifecycle {
    rotator: TokenRotator,
    closing_soon: chrono::Duration,
}

impl SessionLifecycle {
    pub fn new(rotator: TokenRotator, closing_soon: Duration) -> Self {
        Self {
            rotator,
            closing_soon: chrono::Duration::from_std(closing_soon)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
        }
    }

    /// Validate a draft and build the first occurrence of its series
    pub fn create(&self, draft: SessionDraft, now: DateTime<Local>) -> SessionResult<Session> {
        validate_draft(&draft)?;

        let id = SessionId::new();
        let duration_minutes = duration_minutes(&draft);
        let next_occurrence = draft
            .recurrence
            .as_ref()
            .and_then(|p| recurrence::next(p, draft.start_time, draft.start_time));

        Ok(Session {
            id: id.clone(),
            series_id: id,
            occurrence: 1,
            owner_id: draft.owner_id,
            title: draft.title,
            geofence: draft.geofence,
            start_time: draft.start_time,
            end_time: draft.end_time,
            duration_minutes,
            grace_period_minutes: draft.grace_period_minutes,
            schedule_type: draft.schedule_type,
            recurrence: draft.recurrence,
            series_start: draft.start_time,
            auto_start: draft.auto_start,
            auto_end: draft.auto_end,
            methods: draft.methods,
            token: None,
            status: SessionStatus::Scheduled,
            next_occurrence,
            created_at: now,
            opened_at: None,
            closed_at: None,
            close_reason: None,
            closing_soon_notified: false,
            archived: false,
        })
    }

    /// Replace the editable fields of a scheduled session.
    ///
    /// The edited occurrence becomes the new anchor of its series; a count
    /// limit is reduced by the occurrences already held so the series total
    /// is unchanged.
    pub fn edit(&self, session: &Session, draft: SessionDraft) -> SessionResult<Session> {
        if session.status != SessionStatus::Scheduled || session.archived {
            return Err(SessionError::NotEditable(session.id.clone()));
        }
        validate_draft(&draft)?;

        let held = session.occurrence.saturating_sub(1);
        let duration_minutes = duration_minutes(&draft);
        let recurrence = draft.recurrence.map(|mut p| {
            if let RecurrenceEnd::Count { occurrences } = p.end {
                p.end = RecurrenceEnd::Count {
                    occurrences: occurrences.saturating_sub(held).max(1),
                };
            }
            p
        });
        let next_occurrence = recurrence
            .as_ref()
            .and_then(|p| recurrence::next(p, draft.start_time, draft.start_time));

        Ok(Session {
            owner_id: draft.owner_id.clone(),
            title: draft.title.clone(),
            geofence: draft.geofence,
            start_time: draft.start_time,
            end_time: draft.end_time,
            duration_minutes,
            grace_period_minutes: draft.grace_period_minutes,
            schedule_type: draft.schedule_type,
            recurrence,
            series_start: draft.start_time,
            auto_start: draft.auto_start,
            auto_end: draft.auto_end,
            methods: draft.methods,
            next_occurrence,
            ..session.clone()
        })
    }

    /// Authority opens a scheduled session whose start time has come
    pub fn open(&self, session: &mut Session, now: DateTime<Local>) -> SessionResult<Vec<Transition>> {
        check_clock(session, now)?;
        if session.status != SessionStatus::Scheduled {
            return Err(SessionError::InvalidTransition {
                action: "open",
                status: session.status,
            });
        }
        if now < session.start_time {
            return Err(SessionError::NotStarted {
                starts_at: session.start_time,
            });
        }
        Ok(self.enter_open(session, now))
    }

    /// Authority closes an open session, early or late
    pub fn close(&self, session: &mut Session, now: DateTime<Local>) -> SessionResult<Vec<Transition>> {
        check_clock(session, now)?;
        if session.status != SessionStatus::Open {
            return Err(SessionError::InvalidTransition {
                action: "close",
                status: session.status,
            });
        }
        Ok(vec![enter_closed(session, now, CloseReason::Authority)])
    }

    /// Authority cancels a session that never opened
    pub fn cancel(&self, session: &mut Session, now: DateTime<Local>) -> SessionResult<Vec<Transition>> {
        check_clock(session, now)?;
        if session.status != SessionStatus::Scheduled {
            return Err(SessionError::InvalidTransition {
                action: "cancel",
                status: session.status,
            });
        }
        Ok(vec![enter_closed(session, now, CloseReason::Cancelled)])
    }

    /// Retire a session and stop its series. Closed sessions are only flagged.
    pub fn archive(&self, session: &mut Session, now: DateTime<Local>) -> SessionResult<Vec<Transition>> {
        check_clock(session, now)?;
        if session.archived {
            return Err(SessionError::InvalidTransition {
                action: "archive",
                status: session.status,
            });
        }

        session.archived = true;
        session.next_occurrence = None;
        match session.status {
            SessionStatus::Closed => Ok(Vec::new()),
            SessionStatus::Scheduled | SessionStatus::Open => {
                Ok(vec![enter_closed(session, now, CloseReason::Archived)])
            }
        }
    }

    /// Apply every automatic transition due at `now`.
    ///
    /// A scheduled session whose window has already passed closes as missed
    /// without opening, whether or not it starts automatically.
    ///
    /// Idempotent: a second call with the same `now` returns nothing.
    pub fn advance(&self, session: &mut Session, now: DateTime<Local>) -> SessionResult<Vec<Transition>> {
        check_clock(session, now)?;
        let mut transitions = Vec::new();
        if session.archived {
            return Ok(transitions);
        }

        let end = session.end_boundary();

        if session.status == SessionStatus::Scheduled && now >= end {
            transitions.push(enter_closed(session, now, CloseReason::Missed));
            return Ok(transitions);
        }

        if session.status == SessionStatus::Scheduled && session.auto_start && now >= session.start_time {
            transitions.extend(self.enter_open(session, now));
        }

        if session.status != SessionStatus::Open {
            return Ok(transitions);
        }

        if session.auto_end && now >= end {
            transitions.push(enter_closed(session, now, CloseReason::Ended));
            return Ok(transitions);
        }

        if !session.closing_soon_notified && now < end && now >= end - self.closing_soon {
            session.closing_soon_notified = true;
            transitions.push(Transition::ClosingSoon { closes_at: end });
        }

        if let Some(t) = self.rotate_token(session, now) {
            transitions.push(t);
        }

        Ok(transitions)
    }

    /// Issue a fresh token if the current one is missing or expired
    pub fn rotate_token(&self, session: &mut Session, now: DateTime<Local>) -> Option<Transition> {
        if !self.rotator.needs_rotation(session, now) {
            return None;
        }
        let token = self.rotator.issue(session, now);
        let expires_at = token.expires_at;
        session.token = Some(token);
        Some(Transition::TokenIssued { expires_at })
    }

    /// Next occurrence to materialize once `closed` has closed, if any
    pub fn successor(&self, closed: &Session, now: DateTime<Local>) -> Option<Session> {
        if closed.status != SessionStatus::Closed || closed.archived || !closed.is_recurring() {
            return None;
        }
        let pattern = closed.recurrence.as_ref()?;
        let start_time = recurrence::next(pattern, closed.start_time, closed.series_start)?;
        let window = closed.window_length();

        let id = SessionId::new();
        Some(Session {
            id,
            series_id: closed.series_id.clone(),
            occurrence: closed.occurrence + 1,
            owner_id: closed.owner_id.clone(),
            title: closed.title.clone(),
            geofence: closed.geofence,
            start_time,
            end_time: closed.end_time.map(|_| start_time + window),
            duration_minutes: closed.duration_minutes,
            grace_period_minutes: closed.grace_period_minutes,
            schedule_type: closed.schedule_type,
            recurrence: closed.recurrence.clone(),
            series_start: closed.series_start,
            auto_start: closed.auto_start,
            auto_end: closed.auto_end,
            methods: closed.methods,
            token: None,
            status: SessionStatus::Scheduled,
            next_occurrence: recurrence::next(pattern, start_time, closed.series_start),
            created_at: now,
            opened_at: None,
            closed_at: None,
            close_reason: None,
            closing_soon_notified: false,
            archived: false,
        })
    }

    fn enter_open(&self, session: &mut Session, now: DateTime<Local>) -> Vec<Transition> {
        session.status = SessionStatus::Open;
        session.opened_at = Some(now);
        session.closing_soon_notified = false;
        session.token = None;

        let mut transitions = vec![Transition::Opened];
        if let Some(t) = self.rotate_token(session, now) {
            transitions.push(t);
        }
        transitions
    }
}

fn enter_closed(session: &mut Session, now: DateTime<Local>, reason: CloseReason) -> Transition {
    session.status = SessionStatus::Closed;
    session.token = None;
    session.closed_at = Some(now);
    session.close_reason = Some(reason);
    if reason == CloseReason::Archived {
        session.next_occurrence = None;
    }
    Transition::Closed { reason }
}

fn check_clock(session: &Session, now: DateTime<Local>) -> SessionResult<()> {
    if now < session.created_at {
        return Err(SessionError::ClockSkew {
            now,
            created_at: session.created_at,
        });
    }
    Ok(())
}

fn duration_minutes(draft: &SessionDraft) -> u32 {
    match (draft.duration_minutes, draft.end_time) {
        (Some(minutes), _) => minutes,
        (None, Some(end)) => u32::try_from((end - draft.start_time).num_minutes()).unwrap_or(0),
        (None, None) => 0,
    }
}

/// Check a draft before it becomes a session
pub fn validate_draft(draft: &SessionDraft) -> SessionResult<()> {
    if draft.title.trim().is_empty() {
        return Err(SessionError::InvalidSession("title cannot be empty".into()));
    }
    if draft.owner_id.as_str().trim().is_empty() {
        return Err(SessionError::InvalidSession("owner cannot be empty".into()));
    }

    match (draft.end_time, draft.duration_minutes) {
        (Some(end), _) if end <= draft.start_time => {
            return Err(SessionError::InvalidSession(
                "end time must be after start time".into(),
            ));
        }
        (None, None) | (None, Some(0)) => {
            return Err(SessionError::InvalidSession(
                "a positive duration is required when no end time is given".into(),
            ));
        }
        _ => {}
    }

    if draft.methods.is_empty() {
        return Err(SessionError::InvalidSession(
            "at least one verification method is required".into(),
        ));
    }

    if let Some(fence) = &draft.geofence {
        if !fence.center.is_valid() {
            return Err(SessionError::InvalidSession(
                "geofence center is not a valid coordinate".into(),
            ));
        }
        if !fence.radius_meters.is_finite() || fence.radius_meters < 0.0 {
            return Err(SessionError::InvalidSession(
                "geofence radius must be a non-negative number of meters".into(),
            ));
        }
    } else if draft.methods.accepts(VerificationMethod::Location) {
        return Err(SessionError::MethodNotAccepted(
            "location check-in needs a geofence".into(),
        ));
    }

    validate_schedule(draft)
}

fn validate_schedule(draft: &SessionDraft) -> SessionResult<()> {
    let invalid = |msg: &str| Err(SessionError::InvalidRecurrenceSpec(msg.to_string()));

    let pattern = match (draft.schedule_type, &draft.recurrence) {
        (ScheduleType::OneTime, None) => return Ok(()),
        (ScheduleType::OneTime, Some(_)) => {
            return invalid("one-time sessions cannot have a recurrence pattern");
        }
        (_, None) => return invalid("recurring sessions need a recurrence pattern"),
        (_, Some(pattern)) => pattern,
    };

    match (draft.schedule_type, pattern.frequency) {
        (ScheduleType::Daily, Frequency::Weekly | Frequency::Monthly) => {
            return invalid("daily sessions need a daily frequency");
        }
        (ScheduleType::Weekly, Frequency::Daily | Frequency::Monthly) => {
            return invalid("weekly sessions need a weekly frequency");
        }
        _ => {}
    }

    validate_pattern(pattern, draft.start_time)
}

fn validate_pattern(pattern: &RecurrencePattern, start: DateTime<Local>) -> SessionResult<()> {
    let invalid = |msg: &str| Err(SessionError::InvalidRecurrenceSpec(msg.to_string()));

    if pattern.interval == 0 {
        return invalid("interval must be at least 1");
    }
    match pattern.frequency {
        Frequency::Weekly if pattern.days_of_week.is_empty() => {
            return invalid("weekly recurrence needs at least one day of the week");
        }
        Frequency::Monthly if pattern.days_of_month.is_empty() => {
            return invalid("monthly recurrence needs at least one day of the month");
        }
        _ => {}
    }
    match pattern.end {
        RecurrenceEnd::Count { occurrences: 0 } => invalid("occurrences must be at least 1"),
        RecurrenceEnd::Until { end_date } if end_date < start.date_naive() => {
            invalid("end date is before the first occurrence")
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rollcall_api::{Coordinate, Geofence, MethodSet};
    use rollcall_util::{DaysOfMonth, DaysOfWeek, OwnerId};

    fn start() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    fn minutes(m: i64) -> chrono::Duration {
        chrono::Duration::minutes(m)
    }

    fn lifecycle() -> SessionLifecycle {
        SessionLifecycle::new(
            TokenRotator::new(Duration::from_secs(45)),
            Duration::from_secs(5 * 60),
        )
    }

    fn draft() -> SessionDraft {
        SessionDraft {
            owner_id: OwnerId::new("dr-smith"),
            title: "Discrete Maths".into(),
            geofence: None,
            start_time: start(),
            end_time: None,
            duration_minutes: Some(60),
            grace_period_minutes: 5,
            schedule_type: ScheduleType::OneTime,
            recurrence: None,
            auto_start: true,
            auto_end: true,
            methods: MethodSet::QR | MethodSet::MANUAL,
        }
    }

    fn weekly_draft(occurrences: Option<u32>) -> SessionDraft {
        SessionDraft {
            schedule_type: ScheduleType::Weekly,
            recurrence: Some(RecurrencePattern {
                frequency: Frequency::Weekly,
                interval: 1,
                days_of_week: DaysOfWeek::from_indices(&[1, 3]).unwrap(),
                days_of_month: DaysOfMonth::NONE,
                end: occurrences
                    .map(|occurrences| RecurrenceEnd::Count { occurrences })
                    .unwrap_or_default(),
            }),
            ..draft()
        }
    }

    fn created(draft: SessionDraft) -> Session {
        lifecycle().create(draft, start() - minutes(60)).unwrap()
    }

    #[test]
    fn test_create_one_time() {
        let session = created(draft());
        assert_eq!(session.status, SessionStatus::Scheduled);
        assert_eq!(session.series_id, session.id);
        assert_eq!(session.occurrence, 1);
        assert_eq!(session.end_boundary(), start() + minutes(60));
        assert!(session.next_occurrence.is_none());
        assert!(session.token.is_none());
    }

    #[test]
    fn test_create_computes_next_occurrence() {
        let session = created(weekly_draft(None));
        assert_eq!(
            session.next_occurrence,
            Some(Local.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_draft_validation() {
        let lc = lifecycle();
        let now = start();

        let mut d = draft();
        d.end_time = Some(start() - minutes(1));
        assert!(matches!(lc.create(d, now), Err(SessionError::InvalidSession(_))));

        let mut d = draft();
        d.methods = MethodSet::empty();
        assert!(matches!(lc.create(d, now), Err(SessionError::InvalidSession(_))));

        let mut d = draft();
        d.methods = MethodSet::LOCATION;
        assert!(matches!(lc.create(d, now), Err(SessionError::MethodNotAccepted(_))));

        let mut d = draft();
        d.methods = MethodSet::LOCATION;
        d.geofence = Some(Geofence {
            center: Coordinate::new(0.0, 0.0),
            radius_meters: -5.0,
        });
        assert!(matches!(lc.create(d, now), Err(SessionError::InvalidSession(_))));
    }

    #[test]
    fn test_recurrence_validation() {
        let lc = lifecycle();
        let now = start();

        let mut d = weekly_draft(None);
        d.schedule_type = ScheduleType::Daily;
        assert!(matches!(lc.create(d, now), Err(SessionError::InvalidRecurrenceSpec(_))));

        let mut d = weekly_draft(None);
        if let Some(p) = d.recurrence.as_mut() {
            p.days_of_week = DaysOfWeek::NONE;
        }
        assert!(matches!(lc.create(d, now), Err(SessionError::InvalidRecurrenceSpec(_))));

        let mut d = weekly_draft(None);
        if let Some(p) = d.recurrence.as_mut() {
            p.interval = 0;
        }
        assert!(matches!(lc.create(d, now), Err(SessionError::InvalidRecurrenceSpec(_))));

        let mut d = draft();
        d.schedule_type = ScheduleType::Custom;
        assert!(matches!(lc.create(d, now), Err(SessionError::InvalidRecurrenceSpec(_))));

        let mut d = weekly_draft(None);
        d.schedule_type = ScheduleType::Custom;
        if let Some(p) = d.recurrence.as_mut() {
            p.frequency = Frequency::Monthly;
            p.days_of_month = DaysOfMonth::from_days(&[1]).unwrap();
        }
        assert!(lc.create(d, now).is_ok());
    }

    #[test]
    fn test_auto_open_issues_token() {
        let lc = lifecycle();
        let mut session = created(draft());

        assert!(lc.advance(&mut session, start() - minutes(1)).unwrap().is_empty());

        let transitions = lc.advance(&mut session, start()).unwrap();
        assert_eq!(transitions[0], Transition::Opened);
        assert!(matches!(transitions[1], Transition::TokenIssued { .. }));
        assert_eq!(session.status, SessionStatus::Open);
        assert!(session.token.is_some());
    }

    #[test]
    fn test_advance_is_idempotent() {
        let lc = lifecycle();
        let mut session = created(draft());
        let now = start() + minutes(1);

        assert!(!lc.advance(&mut session, now).unwrap().is_empty());
        let token = session.token.clone();
        assert!(lc.advance(&mut session, now).unwrap().is_empty());
        assert_eq!(session.token, token);
    }

    #[test]
    fn test_manual_start_waits_for_authority() {
        let lc = lifecycle();
        let mut d = draft();
        d.auto_start = false;
        let mut session = created(d);

        assert!(lc.advance(&mut session, start() + minutes(5)).unwrap().is_empty());
        assert_eq!(session.status, SessionStatus::Scheduled);

        assert!(matches!(
            lc.open(&mut session, start() - minutes(5)),
            Err(SessionError::NotStarted { .. })
        ));
        lc.open(&mut session, start() + minutes(5)).unwrap();
        assert_eq!(session.status, SessionStatus::Open);
    }

    #[test]
    fn test_closing_soon_then_auto_close() {
        let lc = lifecycle();
        let mut session = created(draft());
        lc.advance(&mut session, start()).unwrap();

        let transitions = lc.advance(&mut session, start() + minutes(56)).unwrap();
        assert!(transitions.contains(&Transition::ClosingSoon {
            closes_at: start() + minutes(60)
        }));
        // Only once
        let transitions = lc.advance(&mut session, start() + minutes(57)).unwrap();
        assert!(!transitions.iter().any(|t| matches!(t, Transition::ClosingSoon { .. })));

        let transitions = lc.advance(&mut session, start() + minutes(60)).unwrap();
        assert_eq!(transitions, vec![Transition::Closed { reason: CloseReason::Ended }]);
        assert_eq!(session.status, SessionStatus::Closed);
        assert!(session.token.is_none());
    }

    #[test]
    fn test_passed_window_closes_as_missed() {
        let lc = lifecycle();
        let mut session = created(draft());

        let transitions = lc.advance(&mut session, start() + minutes(60)).unwrap();
        assert_eq!(transitions, vec![Transition::Closed { reason: CloseReason::Missed }]);
        assert_eq!(session.status, SessionStatus::Closed);
        assert!(session.opened_at.is_none());
        assert!(session.token.is_none());

        // Manual start too, so the series keeps going
        let mut d = weekly_draft(None);
        d.auto_start = false;
        let mut manual = created(d);
        assert!(lc.advance(&mut manual, start() + minutes(30)).unwrap().is_empty());
        let transitions = lc.advance(&mut manual, start() + minutes(61)).unwrap();
        assert_eq!(transitions, vec![Transition::Closed { reason: CloseReason::Missed }]);
        assert!(lc.successor(&manual, start() + minutes(61)).is_some());
    }

    #[test]
    fn test_manual_end_stays_open() {
        let lc = lifecycle();
        let mut d = draft();
        d.auto_end = false;
        let mut session = created(d);
        lc.advance(&mut session, start()).unwrap();

        lc.advance(&mut session, start() + minutes(90)).unwrap();
        assert_eq!(session.status, SessionStatus::Open);

        let transitions = lc.close(&mut session, start() + minutes(90)).unwrap();
        assert_eq!(transitions, vec![Transition::Closed { reason: CloseReason::Authority }]);
    }

    #[test]
    fn test_invalid_transitions() {
        let lc = lifecycle();
        let mut session = created(draft());

        assert!(matches!(
            lc.close(&mut session, start()),
            Err(SessionError::InvalidTransition { action: "close", .. })
        ));

        lc.cancel(&mut session, start()).unwrap();
        assert_eq!(session.close_reason, Some(CloseReason::Cancelled));
        assert!(matches!(
            lc.open(&mut session, start()),
            Err(SessionError::InvalidTransition { action: "open", .. })
        ));
    }

    #[test]
    fn test_clock_skew_rejects_transitions() {
        let lc = lifecycle();
        let mut session = created(draft());
        let before_creation = session.created_at - minutes(1);

        assert!(matches!(
            lc.advance(&mut session, before_creation),
            Err(SessionError::ClockSkew { .. })
        ));
        assert!(matches!(
            lc.cancel(&mut session, before_creation),
            Err(SessionError::ClockSkew { .. })
        ));
    }

    #[test]
    fn test_edit_only_while_scheduled() {
        let lc = lifecycle();
        let mut session = created(draft());

        let mut d = draft();
        d.title = "Discrete Maths II".into();
        d.grace_period_minutes = 15;
        let edited = lc.edit(&session, d.clone()).unwrap();
        assert_eq!(edited.id, session.id);
        assert_eq!(edited.title, "Discrete Maths II");
        assert_eq!(edited.grace_period_minutes, 15);

        lc.advance(&mut session, start()).unwrap();
        assert!(matches!(lc.edit(&session, d), Err(SessionError::NotEditable(_))));
    }

    #[test]
    fn test_edit_reanchors_counted_series() {
        let lc = lifecycle();
        let mut session = created(weekly_draft(Some(5)));
        session.occurrence = 3;

        let mut d = weekly_draft(Some(5));
        d.duration_minutes = None;
        d.end_time = Some(start() + minutes(50));
        let edited = lc.edit(&session, d).unwrap();

        assert_eq!(edited.duration_minutes, 50);
        assert_eq!(edited.series_start, start());
        assert_eq!(
            edited.recurrence.map(|p| p.end),
            Some(RecurrenceEnd::Count { occurrences: 3 })
        );
        assert_eq!(edited.occurrence, 3);
    }

    #[test]
    fn test_successor_keeps_series_and_window() {
        let lc = lifecycle();
        let mut d = weekly_draft(None);
        d.duration_minutes = None;
        d.end_time = Some(start() + minutes(50));
        let mut session = created(d);

        lc.advance(&mut session, start()).unwrap();
        lc.advance(&mut session, start() + minutes(50)).unwrap();
        assert_eq!(session.status, SessionStatus::Closed);

        let next = lc.successor(&session, start() + minutes(50)).unwrap();
        let wednesday = Local.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap();
        assert_ne!(next.id, session.id);
        assert_eq!(next.series_id, session.series_id);
        assert_eq!(next.occurrence, 2);
        assert_eq!(next.start_time, wednesday);
        assert_eq!(next.end_time, Some(wednesday + minutes(50)));
        assert_eq!(next.status, SessionStatus::Scheduled);
        assert!(next.token.is_none());
        assert_eq!(
            next.next_occurrence,
            Some(Local.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_successor_respects_count_and_archive() {
        let lc = lifecycle();
        let mut session = created(weekly_draft(Some(2)));
        lc.advance(&mut session, start()).unwrap();
        lc.close(&mut session, start() + minutes(30)).unwrap();

        let mut second = lc.successor(&session, start() + minutes(30)).unwrap();
        assert!(second.next_occurrence.is_none());

        let wednesday = second.start_time;
        lc.advance(&mut second, wednesday).unwrap();
        lc.close(&mut second, wednesday + minutes(30)).unwrap();
        assert!(lc.successor(&second, wednesday + minutes(30)).is_none());

        let mut archived = created(weekly_draft(None));
        lc.archive(&mut archived, start()).unwrap();
        assert_eq!(archived.close_reason, Some(CloseReason::Archived));
        assert!(lc.successor(&archived, start()).is_none());
    }

    #[test]
    fn test_archive_closed_session_only_flags_it() {
        let lc = lifecycle();
        let mut session = created(draft());
        lc.cancel(&mut session, start()).unwrap();

        assert!(lc.archive(&mut session, start()).unwrap().is_empty());
        assert!(session.archived);
        assert_eq!(session.close_reason, Some(CloseReason::Cancelled));
        assert!(lc.archive(&mut session, start()).is_err());
    }

    #[test]
    fn test_token_rotation_on_advance() {
        let lc = lifecycle();
        let mut session = created(draft());
        lc.advance(&mut session, start()).unwrap();
        let first = session.token.clone().unwrap();

        let transitions = lc.advance(&mut session, first.expires_at).unwrap();
        assert!(matches!(transitions.as_slice(), [Transition::TokenIssued { .. }]));
        assert_ne!(session.token.as_ref().unwrap().value, first.value);
    }
}
