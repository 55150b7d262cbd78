//! External verifier seam for biometric, facial and NFC check-ins

use async_trait::async_trait;
use rollcall_api::{CheckInAttempt, VerificationMethod};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Verifier errors. Any of these makes the check-in `VerifierUnavailable`.
#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("No verifier configured")]
    NotConfigured,

    #[error("Verifier failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Checks an attendee-supplied proof.
///
/// `Ok(false)` means the proof was examined and rejected; errors mean no
/// verdict could be reached.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(
        &self,
        method: VerificationMethod,
        attempt: &CheckInAttempt,
    ) -> Result<bool, VerifierError>;
}

/// Verifier used when none is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVerifier;

#[async_trait]
impl Verifier for NoVerifier {
    async fn verify(
        &self,
        _method: VerificationMethod,
        _attempt: &CheckInAttempt,
    ) -> Result<bool, VerifierError> {
        Err(VerifierError::NotConfigured)
    }
}

/// What a `MockVerifier` answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOutcome {
    Accept,
    Reject,
    Fail,
}

/// Mock verifier for unit/integration testing
pub struct MockVerifier {
    /// Configured verdict
    pub outcome: Arc<Mutex<MockOutcome>>,

    /// Simulated latency
    pub delay: Arc<Mutex<Option<Duration>>>,

    calls: AtomicUsize,
}

impl MockVerifier {
    pub fn new(outcome: MockOutcome) -> Self {
        Self {
            outcome: Arc::new(Mutex::new(outcome)),
            delay: Arc::new(Mutex::new(None)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        if let Ok(mut d) = self.delay.lock() {
            *d = Some(delay);
        }
        self
    }

    pub fn set_outcome(&self, outcome: MockOutcome) {
        if let Ok(mut o) = self.outcome.lock() {
            *o = outcome;
        }
    }

    /// Number of verify calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockVerifier {
    fn default() -> Self {
        Self::new(MockOutcome::Accept)
    }
}

#[async_trait]
impl Verifier for MockVerifier {
    async fn verify(
        &self,
        method: VerificationMethod,
        _attempt: &CheckInAttempt,
    ) -> Result<bool, VerifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self
            .outcome
            .lock()
            .map(|o| *o)
            .unwrap_or(MockOutcome::Fail);
        match outcome {
            MockOutcome::Accept => Ok(true),
            MockOutcome::Reject => Ok(false),
            MockOutcome::Fail => Err(VerifierError::Failed(format!(
                "mock failure for {}",
                method
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_util::AttendeeId;

    fn attempt() -> CheckInAttempt {
        CheckInAttempt {
            attendee_id: AttendeeId::new("s-1"),
            method: VerificationMethod::Facial,
            token: None,
            location: None,
            device_id: None,
            proof: Some(serde_json::json!({ "template": "abc" })),
        }
    }

    #[tokio::test]
    async fn test_mock_verifier_outcomes() {
        let verifier = MockVerifier::new(MockOutcome::Accept);
        assert!(verifier.verify(VerificationMethod::Facial, &attempt()).await.unwrap());

        verifier.set_outcome(MockOutcome::Reject);
        assert!(!verifier.verify(VerificationMethod::Facial, &attempt()).await.unwrap());

        verifier.set_outcome(MockOutcome::Fail);
        assert!(verifier.verify(VerificationMethod::Facial, &attempt()).await.is_err());

        assert_eq!(verifier.calls(), 3);
    }

    #[tokio::test]
    async fn test_no_verifier_is_unconfigured() {
        let result = NoVerifier.verify(VerificationMethod::Nfc, &attempt()).await;
        assert!(matches!(result, Err(VerifierError::NotConfigured)));
    }
}
