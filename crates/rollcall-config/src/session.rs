//! Session-definition files
//!
//! Authorities describe a session in a small TOML file that `rollcallctl`
//! turns into a `SessionDraft`:
//!
//! ```toml
//! [session]
//! owner = "dr-smith"
//! title = "Operating Systems"
//! start = "2025-09-01 09:00"
//! duration_minutes = 90
//! grace_period_minutes = 10
//! schedule = "weekly"
//! methods = ["qr", "location"]
//!
//! [session.geofence]
//! latitude = -25.7545
//! longitude = 28.2314
//! radius_meters = 120.0
//!
//! [session.recurrence]
//! frequency = "weekly"
//! days_of_week = ["mon", "wed"]
//! end_date = "2025-11-28"
//! ```

use crate::schema::{RawRecurrence, RawSession};
use crate::validation::{
    ValidationError, parse_date, parse_days_of_week, parse_frequency, parse_schedule,
};
use rollcall_api::{
    Coordinate, Geofence, MethodSet, RecurrenceEnd, RecurrencePattern, SessionDraft,
    VerificationMethod,
};
use rollcall_util::{DaysOfMonth, OwnerId, parse_local_datetime};

/// Convert a validated raw session into a draft
pub(crate) fn draft_from_raw(raw: RawSession) -> Result<SessionDraft, ValidationError> {
    let start_time = parse_local_datetime(&raw.start).map_err(|message| {
        ValidationError::InvalidTimestamp {
            value: raw.start.clone(),
            message,
        }
    })?;
    let end_time = raw
        .end
        .as_deref()
        .map(|end| {
            parse_local_datetime(end).map_err(|message| ValidationError::InvalidTimestamp {
                value: end.to_string(),
                message,
            })
        })
        .transpose()?;

    let schedule_type = parse_schedule(&raw.schedule).map_err(|message| {
        ValidationError::SessionError {
            field: "schedule".into(),
            message,
        }
    })?;

    let methods = raw
        .methods
        .iter()
        .map(|m| {
            m.parse::<VerificationMethod>()
                .map_err(|_| ValidationError::UnknownMethod(m.clone()))
        })
        .collect::<Result<MethodSet, _>>()?;

    let geofence = raw.geofence.map(|g| Geofence {
        center: Coordinate::new(g.latitude, g.longitude),
        radius_meters: g.radius_meters,
    });

    let recurrence = raw.recurrence.map(convert_recurrence).transpose()?;

    Ok(SessionDraft {
        owner_id: OwnerId::new(raw.owner),
        title: raw.title,
        geofence,
        start_time,
        end_time,
        duration_minutes: raw.duration_minutes,
        grace_period_minutes: raw.grace_period_minutes,
        schedule_type,
        recurrence,
        auto_start: raw.auto_start,
        auto_end: raw.auto_end,
        methods,
    })
}

fn convert_recurrence(raw: RawRecurrence) -> Result<RecurrencePattern, ValidationError> {
    let frequency = parse_frequency(&raw.frequency).map_err(ValidationError::InvalidRecurrence)?;
    let days_of_week =
        parse_days_of_week(&raw.days_of_week).map_err(ValidationError::InvalidDaySpec)?;
    let days_of_month = DaysOfMonth::from_days(&raw.days_of_month)
        .map_err(|e| ValidationError::InvalidDaySpec(e.to_string()))?;

    let end = match (raw.end_date, raw.occurrences) {
        (Some(_), Some(_)) => {
            return Err(ValidationError::InvalidRecurrence(
                "end_date and occurrences are mutually exclusive".into(),
            ));
        }
        (Some(date), None) => RecurrenceEnd::Until {
            end_date: parse_date(&date).map_err(|message| ValidationError::InvalidTimestamp {
                value: date.clone(),
                message,
            })?,
        },
        (None, Some(occurrences)) => RecurrenceEnd::Count { occurrences },
        (None, None) => RecurrenceEnd::Never,
    };

    Ok(RecurrencePattern {
        frequency,
        interval: raw.interval,
        days_of_week,
        days_of_month,
        end,
    })
}
