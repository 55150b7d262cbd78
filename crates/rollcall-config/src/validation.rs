//! Configuration validation

use crate::schema::{RawConfig, RawRecurrence, RawSession, RawWeekday};
use chrono::NaiveDate;
use rollcall_api::{Frequency, ScheduleType, VerificationMethod};
use rollcall_util::{DaysOfMonth, DaysOfWeek, parse_local_datetime};
use thiserror::Error;

/// Token lifetime bounds, in seconds
pub const MIN_TOKEN_ROTATION_SECS: u64 = 5;
pub const MAX_TOKEN_ROTATION_SECS: u64 = 600;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Service config error: {0}")]
    ServiceError(String),

    #[error("Verifier config error: {0}")]
    VerifierError(String),

    #[error("Session field '{field}': {message}")]
    SessionError { field: String, message: String },

    #[error("Invalid timestamp '{value}': {message}")]
    InvalidTimestamp { value: String, message: String },

    #[error("Invalid recurrence: {0}")]
    InvalidRecurrence(String),

    #[error("Unknown verification method: {0}")]
    UnknownMethod(String),

    #[error("Invalid day specification: {0}")]
    InvalidDaySpec(String),
}

/// Validate a raw service configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let service = &config.service;

    if service.tick_interval_ms == Some(0) {
        errors.push(ValidationError::ServiceError(
            "tick_interval_ms must be greater than 0".into(),
        ));
    }

    if let Some(secs) = service.token_rotation_seconds
        && !(MIN_TOKEN_ROTATION_SECS..=MAX_TOKEN_ROTATION_SECS).contains(&secs)
    {
        errors.push(ValidationError::ServiceError(format!(
            "token_rotation_seconds must be between {} and {} (got {})",
            MIN_TOKEN_ROTATION_SECS, MAX_TOKEN_ROTATION_SECS, secs
        )));
    }

    if service.verifier_timeout_ms == Some(0) {
        errors.push(ValidationError::ServiceError(
            "verifier_timeout_ms must be greater than 0".into(),
        ));
    }

    if let Some(limit) = &service.check_in_rate_limit {
        if limit.max_attempts == 0 {
            errors.push(ValidationError::ServiceError(
                "check_in_rate_limit.max_attempts must be greater than 0".into(),
            ));
        }
        if limit.per_seconds == 0 {
            errors.push(ValidationError::ServiceError(
                "check_in_rate_limit.per_seconds must be greater than 0".into(),
            ));
        }
    }

    if let Some(verifier) = &config.verifier
        && verifier.command.first().is_none_or(|c| c.trim().is_empty())
    {
        errors.push(ValidationError::VerifierError(
            "command cannot be empty".into(),
        ));
    }

    errors
}

/// Validate a raw session definition
pub fn validate_session(session: &RawSession) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if session.owner.trim().is_empty() {
        errors.push(field_error("owner", "cannot be empty"));
    }
    if session.title.trim().is_empty() {
        errors.push(field_error("title", "cannot be empty"));
    }

    let start = match parse_local_datetime(&session.start) {
        Ok(start) => Some(start),
        Err(message) => {
            errors.push(ValidationError::InvalidTimestamp {
                value: session.start.clone(),
                message,
            });
            None
        }
    };

    if let Some(end) = &session.end {
        match parse_local_datetime(end) {
            Ok(end) => {
                if let Some(start) = start
                    && end <= start
                {
                    errors.push(field_error("end", "must be after start"));
                }
            }
            Err(message) => errors.push(ValidationError::InvalidTimestamp {
                value: end.clone(),
                message,
            }),
        }
    }

    match (&session.end, session.duration_minutes) {
        (None, None) => errors.push(field_error(
            "duration_minutes",
            "required when end is not given",
        )),
        (None, Some(0)) => errors.push(field_error("duration_minutes", "must be greater than 0")),
        _ => {}
    }

    if session.methods.is_empty() {
        errors.push(field_error("methods", "at least one method is required"));
    }
    for method in &session.methods {
        if method.parse::<VerificationMethod>().is_err() {
            errors.push(ValidationError::UnknownMethod(method.clone()));
        }
    }

    if let Some(fence) = &session.geofence {
        if !(-90.0..=90.0).contains(&fence.latitude) || !(-180.0..=180.0).contains(&fence.longitude)
        {
            errors.push(field_error("geofence", "center is not a valid coordinate"));
        }
        if fence.radius_meters.is_nan() || fence.radius_meters < 0.0 {
            errors.push(field_error("geofence.radius_meters", "must be >= 0"));
        }
    }

    let schedule = match parse_schedule(&session.schedule) {
        Ok(schedule) => Some(schedule),
        Err(message) => {
            errors.push(field_error("schedule", &message));
            None
        }
    };

    match (schedule, &session.recurrence) {
        (Some(ScheduleType::OneTime), Some(_)) => errors.push(ValidationError::InvalidRecurrence(
            "one_time sessions cannot have a recurrence".into(),
        )),
        (Some(ScheduleType::OneTime), None) | (None, _) => {}
        (Some(_), None) => errors.push(ValidationError::InvalidRecurrence(
            "recurring sessions need a [session.recurrence] table".into(),
        )),
        (Some(_), Some(recurrence)) => errors.extend(validate_recurrence(recurrence)),
    }

    errors
}

fn validate_recurrence(recurrence: &RawRecurrence) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Err(message) = parse_frequency(&recurrence.frequency) {
        errors.push(ValidationError::InvalidRecurrence(message));
    }
    if recurrence.interval == 0 {
        errors.push(ValidationError::InvalidRecurrence(
            "interval must be at least 1".into(),
        ));
    }
    if let Err(message) = parse_days_of_week(&recurrence.days_of_week) {
        errors.push(ValidationError::InvalidDaySpec(message));
    }
    if let Err(e) = DaysOfMonth::from_days(&recurrence.days_of_month) {
        errors.push(ValidationError::InvalidDaySpec(e.to_string()));
    }
    if recurrence.end_date.is_some() && recurrence.occurrences.is_some() {
        errors.push(ValidationError::InvalidRecurrence(
            "end_date and occurrences are mutually exclusive".into(),
        ));
    }
    if let Some(end_date) = &recurrence.end_date
        && let Err(message) = parse_date(end_date)
    {
        errors.push(ValidationError::InvalidTimestamp {
            value: end_date.clone(),
            message,
        });
    }
    if recurrence.occurrences == Some(0) {
        errors.push(ValidationError::InvalidRecurrence(
            "occurrences must be at least 1".into(),
        ));
    }

    errors
}

fn field_error(field: &str, message: &str) -> ValidationError {
    ValidationError::SessionError {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Parse a schedule type name
pub fn parse_schedule(s: &str) -> Result<ScheduleType, String> {
    match s.trim().to_lowercase().replace('-', "_").as_str() {
        "one_time" | "once" => Ok(ScheduleType::OneTime),
        "daily" => Ok(ScheduleType::Daily),
        "weekly" => Ok(ScheduleType::Weekly),
        "custom" => Ok(ScheduleType::Custom),
        other => Err(format!("Unknown schedule type: {}", other)),
    }
}

/// Parse a recurrence frequency name
pub fn parse_frequency(s: &str) -> Result<Frequency, String> {
    match s.trim().to_lowercase().as_str() {
        "daily" => Ok(Frequency::Daily),
        "weekly" => Ok(Frequency::Weekly),
        "monthly" => Ok(Frequency::Monthly),
        other => Err(format!("Unknown frequency: {}", other)),
    }
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| "Expected YYYY-MM-DD format".to_string())
}

/// Parse a weekday list of `0 = Sunday` indices and/or names
pub fn parse_days_of_week(days: &[RawWeekday]) -> Result<DaysOfWeek, String> {
    let mut indices = Vec::with_capacity(days.len());
    for day in days {
        let index = match day {
            RawWeekday::Index(i) => *i,
            RawWeekday::Name(name) => match name.to_lowercase().as_str() {
                "sun" | "sunday" => 0,
                "mon" | "monday" => 1,
                "tue" | "tuesday" => 2,
                "wed" | "wednesday" => 3,
                "thu" | "thursday" => 4,
                "fri" | "friday" => 5,
                "sat" | "saturday" => 6,
                other => return Err(format!("Unknown day: {}", other)),
            },
        };
        indices.push(index);
    }
    DaysOfWeek::from_indices(&indices).map_err(|e| e.to_string())
}
