//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw service configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// External verifier for biometric, facial and NFC check-ins
    #[serde(default)]
    pub verifier: Option<RawVerifierConfig>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Data directory for the store
    pub data_dir: Option<PathBuf>,

    /// Scheduler tick interval
    pub tick_interval_ms: Option<u64>,

    /// Lifetime of a single verification token
    pub token_rotation_seconds: Option<u64>,

    /// Lead time for the closing-soon notification
    pub closing_soon_minutes: Option<u64>,

    /// Upper bound on one external verifier call
    pub verifier_timeout_ms: Option<u64>,

    /// Per-attendee check-in attempt budget
    pub check_in_rate_limit: Option<RawRateLimit>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawRateLimit {
    pub max_attempts: u32,
    pub per_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawVerifierConfig {
    /// argv of the verifier; the method name is appended
    pub command: Vec<String>,
}

/// A session-definition file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawSessionFile {
    pub session: RawSession,
}

/// Raw session definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawSession {
    /// Authority that owns the session
    pub owner: String,

    pub title: String,

    /// RFC 3339 or local `YYYY-MM-DD HH:MM`
    pub start: String,

    pub end: Option<String>,

    pub duration_minutes: Option<u32>,

    #[serde(default)]
    pub grace_period_minutes: u32,

    /// "one_time", "daily", "weekly" or "custom"
    #[serde(default = "default_schedule")]
    pub schedule: String,

    #[serde(default = "default_true")]
    pub auto_start: bool,

    #[serde(default = "default_true")]
    pub auto_end: bool,

    /// Accepted verification methods, e.g. ["qr", "location"]
    pub methods: Vec<String>,

    #[serde(default)]
    pub geofence: Option<RawGeofence>,

    #[serde(default)]
    pub recurrence: Option<RawRecurrence>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawGeofence {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawRecurrence {
    /// "daily", "weekly" or "monthly"
    pub frequency: String,

    #[serde(default = "default_interval")]
    pub interval: u32,

    /// Numbers 0-6 (0 = Sunday) or names like "mon"
    #[serde(default)]
    pub days_of_week: Vec<RawWeekday>,

    #[serde(default)]
    pub days_of_month: Vec<u8>,

    /// Last date (inclusive) an occurrence may start on, `YYYY-MM-DD`
    pub end_date: Option<String>,

    /// Total number of occurrences, including the first
    pub occurrences: Option<u32>,
}

/// Weekday given either as an index or a name
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawWeekday {
    Index(u8),
    Name(String),
}

fn default_schedule() -> String {
    "one_time".to_string()
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_service_section() {
        let toml_str = r#"
            config_version = 1

            [service]
            tick_interval_ms = 1000
            token_rotation_seconds = 30

            [service.check_in_rate_limit]
            max_attempts = 5
            per_seconds = 60

            [verifier]
            command = ["/usr/lib/rollcall/verify", "--strict"]
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.service.tick_interval_ms, Some(1000));
        assert_eq!(config.service.check_in_rate_limit.unwrap().max_attempts, 5);
        assert_eq!(config.verifier.unwrap().command.len(), 2);
    }

    #[test]
    fn parse_session_with_mixed_weekdays() {
        let toml_str = r#"
            [session]
            owner = "dr-smith"
            title = "Operating Systems"
            start = "2024-01-01 09:00"
            duration_minutes = 90
            schedule = "weekly"
            methods = ["qr", "location"]

            [session.geofence]
            latitude = -25.7545
            longitude = 28.2314
            radius_meters = 100.0

            [session.recurrence]
            frequency = "weekly"
            days_of_week = [1, "wed"]
            occurrences = 12
        "#;

        let file: RawSessionFile = toml::from_str(toml_str).unwrap();
        let recurrence = file.session.recurrence.unwrap();
        assert_eq!(recurrence.interval, 1);
        assert!(matches!(recurrence.days_of_week[0], RawWeekday::Index(1)));
        assert!(matches!(&recurrence.days_of_week[1], RawWeekday::Name(n) if n == "wed"));
        assert!(file.session.auto_start);
    }
}
