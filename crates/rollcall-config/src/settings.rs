//! Validated service settings

use crate::schema::{RawConfig, RawServiceConfig, RawVerifierConfig};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_TOKEN_ROTATION: Duration = Duration::from_secs(45);
pub const DEFAULT_CLOSING_SOON: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_VERIFIER_TIMEOUT: Duration = Duration::from_millis(5000);

/// Validated configuration ready for use by the service
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub service: ServiceSettings,

    /// None means biometric, facial and NFC check-ins cannot be verified
    pub verifier: Option<VerifierSettings>,
}

impl Config {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceSettings::from_raw(raw.service),
            verifier: raw.verifier.map(VerifierSettings::from_raw),
        }
    }
}

/// Service settings
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
    pub tick_interval: Duration,
    pub token_rotation: Duration,
    pub closing_soon: Duration,
    pub verifier_timeout: Duration,
    pub check_in_rate_limit: RateLimitSettings,
}

impl ServiceSettings {
    fn from_raw(raw: RawServiceConfig) -> Self {
        let defaults = Self::default();
        Self {
            socket_path: raw.socket_path.unwrap_or(defaults.socket_path),
            data_dir: raw.data_dir.unwrap_or(defaults.data_dir),
            tick_interval: raw
                .tick_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_interval),
            token_rotation: raw
                .token_rotation_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.token_rotation),
            closing_soon: raw
                .closing_soon_minutes
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(defaults.closing_soon),
            verifier_timeout: raw
                .verifier_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.verifier_timeout),
            check_in_rate_limit: raw
                .check_in_rate_limit
                .map(|l| RateLimitSettings {
                    max_attempts: l.max_attempts,
                    per: Duration::from_secs(l.per_seconds),
                })
                .unwrap_or_default(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            socket_path: rollcall_util::default_socket_path(),
            data_dir: rollcall_util::default_data_dir(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            token_rotation: DEFAULT_TOKEN_ROTATION,
            closing_soon: DEFAULT_CLOSING_SOON,
            verifier_timeout: DEFAULT_VERIFIER_TIMEOUT,
            check_in_rate_limit: RateLimitSettings::default(),
        }
    }
}

/// Per-attendee check-in attempt budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub max_attempts: u32,
    pub per: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            per: Duration::from_secs(60),
        }
    }
}

/// External verifier command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierSettings {
    pub program: String,
    pub args: Vec<String>,
}

impl VerifierSettings {
    fn from_raw(raw: RawVerifierConfig) -> Self {
        let mut argv = raw.command.into_iter();
        Self {
            program: argv.next().unwrap_or_default(),
            args: argv.collect(),
        }
    }
}
