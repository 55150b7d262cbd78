//! Check-in arbitration

use chrono::{DateTime, Local};
use rollcall_api::{
    AttendanceRecord, AttendanceStatus, CheckInAttempt, Session, SessionStatus,
    VerificationMethod,
};
use rollcall_util::RecordId;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::{CheckInError, CheckInResult, TokenRotator, Verifier, geo};

/// Judges a check-in attempt against a session snapshot.
///
/// Checks run in a fixed order and the first failure wins: session open,
/// method accepted, proof. Uniqueness per attendee is enforced by the store
/// when the returned record is inserted.
pub struct CheckInArbiter {
    verifier: Arc<dyn Verifier>,
    verifier_timeout: Duration,
    rotator: TokenRotator,
}

impl CheckInArbiter {
    pub fn new(verifier: Arc<dyn Verifier>, verifier_timeout: Duration, rotator: TokenRotator) -> Self {
        Self {
            verifier,
            verifier_timeout,
            rotator,
        }
    }

    pub async fn arbitrate(
        &self,
        session: &Session,
        attempt: &CheckInAttempt,
        now: DateTime<Local>,
    ) -> CheckInResult<AttendanceRecord> {
        if now < session.created_at {
            return Err(CheckInError::ClockSkew);
        }

        if session.status != SessionStatus::Open {
            return Err(CheckInError::SessionNotOpen);
        }

        if !session.accepts(attempt.method) {
            return Err(CheckInError::MethodNotAccepted(attempt.method));
        }

        let verified_location = self.check_proof(session, attempt, now).await?;
        let status = attendance_status(session, now);

        debug!(
            session_id = %session.id,
            attendee_id = %attempt.attendee_id,
            method = %attempt.method,
            status = status.as_str(),
            "Check-in arbitrated"
        );

        Ok(AttendanceRecord {
            id: RecordId::new(),
            session_id: session.id.clone(),
            attendee_id: attempt.attendee_id.clone(),
            check_in_time: now,
            status,
            verification_method: attempt.method,
            verified_location,
            device_id: attempt.device_id.clone(),
        })
    }

    /// Returns the verified position for location check-ins
    async fn check_proof(
        &self,
        session: &Session,
        attempt: &CheckInAttempt,
        now: DateTime<Local>,
    ) -> CheckInResult<Option<rollcall_api::Coordinate>> {
        match attempt.method {
            VerificationMethod::Qr => {
                let presented = attempt.token.as_deref().unwrap_or_default();
                if self.rotator.validate(session, presented, now) {
                    Ok(None)
                } else {
                    Err(CheckInError::InvalidOrExpiredToken)
                }
            }
            VerificationMethod::Location => {
                // Sessions accepting Location without a geofence are refused at creation
                let fence = session
                    .geofence
                    .as_ref()
                    .ok_or(CheckInError::MethodNotAccepted(VerificationMethod::Location))?;
                let position = attempt
                    .location
                    .filter(|p| p.is_valid())
                    .ok_or(CheckInError::OutsideGeofence {
                        distance_meters: f64::INFINITY,
                        radius_meters: fence.radius_meters,
                    })?;

                if geo::within(fence, &position) {
                    Ok(Some(position))
                } else {
                    Err(CheckInError::OutsideGeofence {
                        distance_meters: geo::distance(&fence.center, &position),
                        radius_meters: fence.radius_meters,
                    })
                }
            }
            VerificationMethod::Biometric | VerificationMethod::Facial | VerificationMethod::Nfc => {
                let verdict = tokio::time::timeout(
                    self.verifier_timeout,
                    self.verifier.verify(attempt.method, attempt),
                )
                .await;

                match verdict {
                    Ok(Ok(true)) => Ok(attempt.location),
                    Ok(Ok(false)) => Err(CheckInError::VerificationFailed),
                    Ok(Err(e)) => Err(CheckInError::VerifierUnavailable(e.to_string())),
                    Err(_) => Err(CheckInError::VerifierUnavailable(format!(
                        "no verdict within {}ms",
                        self.verifier_timeout.as_millis()
                    ))),
                }
            }
            VerificationMethod::Manual => Ok(None),
        }
    }
}

/// Present up to the end of the grace period (including early arrivals),
/// Late afterwards. Arbitration never yields Absent.
pub fn attendance_status(session: &Session, now: DateTime<Local>) -> AttendanceStatus {
    let elapsed = now - session.start_time;
    let grace = chrono::Duration::minutes(i64::from(session.grace_period_minutes));

    if elapsed <= grace {
        AttendanceStatus::Present
    } else {
        AttendanceStatus::Late
    }
}
