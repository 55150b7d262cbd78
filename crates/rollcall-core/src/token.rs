//! Verification token rotation

use chrono::{DateTime, Local};
use rand::Rng;
use rollcall_api::{Session, SessionStatus, VerificationMethod, VerificationToken};
use std::time::Duration;

/// Issues and validates the rotating token shown on the session display.
///
/// A session holds at most one token. Issuing replaces it, so any earlier
/// value stops validating immediately.
#[derive(Debug, Clone)]
pub struct TokenRotator {
    rotation_window: chrono::Duration,
}

impl TokenRotator {
    pub fn new(rotation_window: Duration) -> Self {
        Self {
            rotation_window: chrono::Duration::from_std(rotation_window)
                .unwrap_or_else(|_| chrono::Duration::seconds(45)),
        }
    }

    pub fn rotation_window(&self) -> chrono::Duration {
        self.rotation_window
    }

    /// Fresh token expiring one window from now, never after the session ends
    pub fn issue(&self, session: &Session, now: DateTime<Local>) -> VerificationToken {
        VerificationToken {
            value: generate_token_value(),
            expires_at: (now + self.rotation_window).min(session.end_boundary()),
        }
    }

    /// True only for the session's current token, before it expires
    pub fn validate(&self, session: &Session, presented: &str, now: DateTime<Local>) -> bool {
        if session.status != SessionStatus::Open {
            return false;
        }
        match &session.token {
            Some(token) => now < token.expires_at && constant_time_eq(&token.value, presented),
            None => false,
        }
    }

    /// Whether an open QR session needs a new token at `now`
    pub fn needs_rotation(&self, session: &Session, now: DateTime<Local>) -> bool {
        session.status == SessionStatus::Open
            && session.accepts(VerificationMethod::Qr)
            && now < session.end_boundary()
            && session
                .token
                .as_ref()
                .is_none_or(|token| now >= token.expires_at)
    }
}

fn generate_token_value() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
