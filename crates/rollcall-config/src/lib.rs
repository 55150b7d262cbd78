//! Configuration parsing and validation for rollcalld
//!
//! Supports TOML files of two kinds:
//! - The versioned service configuration (socket, store, scheduler and
//!   token timing, rate limits, external verifier)
//! - Session-definition files that become a `SessionDraft`
//!
//! Validation collects every problem so the operator can fix them in one go.

mod schema;
mod session;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use rollcall_api::SessionDraft;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading configuration");
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Config::from_raw(raw))
}

/// Load a session-definition file
pub fn load_session_draft(path: impl AsRef<Path>) -> ConfigResult<SessionDraft> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading session definition");
    let content = std::fs::read_to_string(path)?;
    parse_session_draft(&content)
}

/// Parse and validate a session definition from a TOML string
pub fn parse_session_draft(content: &str) -> ConfigResult<SessionDraft> {
    let raw: RawSessionFile = toml::from_str(content)?;

    let errors = validate_session(&raw.session);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    session::draft_from_raw(raw.session)
        .map_err(|e| ConfigError::ValidationFailed { errors: vec![e] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use rollcall_api::{Frequency, RecurrenceEnd, ScheduleType, VerificationMethod};
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn parse_minimal_config() {
        let config = parse_config("config_version = 1").unwrap();
        assert_eq!(config.service.tick_interval, DEFAULT_TICK_INTERVAL);
        assert_eq!(config.service.token_rotation, Duration::from_secs(45));
        assert_eq!(config.service.closing_soon, Duration::from_secs(300));
        assert_eq!(config.service.check_in_rate_limit.max_attempts, 10);
        assert!(config.verifier.is_none());
    }

    #[test]
    fn parse_full_config() {
        let config = parse_config(
            r#"
            config_version = 1

            [service]
            socket_path = "/run/rollcall/rollcalld.sock"
            data_dir = "/var/lib/rollcall"
            tick_interval_ms = 500
            token_rotation_seconds = 30
            closing_soon_minutes = 10
            verifier_timeout_ms = 1500

            [service.check_in_rate_limit]
            max_attempts = 3
            per_seconds = 30

            [verifier]
            command = ["/usr/lib/rollcall/verify", "--quiet"]
            "#,
        )
        .unwrap();

        assert_eq!(
            config.service.socket_path.to_string_lossy(),
            "/run/rollcall/rollcalld.sock"
        );
        assert_eq!(config.service.tick_interval, Duration::from_millis(500));
        assert_eq!(config.service.closing_soon, Duration::from_secs(600));
        assert_eq!(config.service.verifier_timeout, Duration::from_millis(1500));
        assert_eq!(config.service.check_in_rate_limit.per, Duration::from_secs(30));

        let verifier = config.verifier.unwrap();
        assert_eq!(verifier.program, "/usr/lib/rollcall/verify");
        assert_eq!(verifier.args, vec!["--quiet".to_string()]);
    }

    #[test]
    fn reject_wrong_version() {
        let result = parse_config("config_version = 99");
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_out_of_range_rotation() {
        let result = parse_config(
            r#"
            config_version = 1
            [service]
            token_rotation_seconds = 3600
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationFailed { .. })));
    }

    #[test]
    fn parse_weekly_session() {
        let draft = parse_session_draft(
            r#"
            [session]
            owner = "dr-smith"
            title = "Operating Systems"
            start = "2024-01-01 09:00"
            duration_minutes = 90
            grace_period_minutes = 10
            schedule = "weekly"
            methods = ["qr", "location"]

            [session.geofence]
            latitude = -25.7545
            longitude = 28.2314
            radius_meters = 120.0

            [session.recurrence]
            frequency = "weekly"
            days_of_week = ["mon", 3]
            end_date = "2024-03-29"
            "#,
        )
        .unwrap();

        assert_eq!(draft.owner_id.as_str(), "dr-smith");
        assert_eq!(draft.start_time.day(), 1);
        assert_eq!(draft.start_time.hour(), 9);
        assert_eq!(draft.duration_minutes, Some(90));
        assert_eq!(draft.schedule_type, ScheduleType::Weekly);
        assert!(draft.methods.accepts(VerificationMethod::Location));
        assert!(!draft.methods.accepts(VerificationMethod::Nfc));
        assert_eq!(draft.geofence.unwrap().radius_meters, 120.0);

        let recurrence = draft.recurrence.unwrap();
        assert_eq!(recurrence.frequency, Frequency::Weekly);
        assert_eq!(recurrence.days_of_week.indices(), vec![1, 3]);
        assert!(matches!(recurrence.end, RecurrenceEnd::Until { end_date } if end_date.month() == 3));
    }

    #[test]
    fn reject_session_with_both_terminations() {
        let result = parse_session_draft(
            r#"
            [session]
            owner = "dr-smith"
            title = "Operating Systems"
            start = "2024-01-01 09:00"
            duration_minutes = 90
            schedule = "daily"
            methods = ["manual"]

            [session.recurrence]
            frequency = "daily"
            end_date = "2024-03-29"
            occurrences = 5
            "#,
        );

        match result {
            Err(ConfigError::ValidationFailed { errors }) => {
                assert!(errors
                    .iter()
                    .any(|e| matches!(e, ValidationError::InvalidRecurrence(_))));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn load_session_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [session]
            owner = "ta-jones"
            title = "Lab"
            start = "2024-02-05T14:00:00+00:00"
            end = "2024-02-05T16:00:00+00:00"
            methods = ["nfc"]
            "#
        )
        .unwrap();

        let draft = load_session_draft(file.path()).unwrap();
        assert_eq!(draft.title, "Lab");
        assert!(draft.end_time.is_some());
        assert_eq!(draft.schedule_type, ScheduleType::OneTime);
        assert!(draft.auto_start && draft.auto_end);
    }
}
