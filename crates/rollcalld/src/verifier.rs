//! Verifier backed by an external command
//!
//! The command is run once per attempt with the method name appended to its
//! arguments and the attempt as JSON on stdin. Exit status 0 accepts, 1
//! rejects; anything else means no verdict.

use async_trait::async_trait;
use rollcall_api::{CheckInAttempt, VerificationMethod};
use rollcall_core::{Verifier, VerifierError};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

pub struct CommandVerifier {
    program: String,
    args: Vec<String>,
}

impl CommandVerifier {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl Verifier for CommandVerifier {
    async fn verify(
        &self,
        method: VerificationMethod,
        attempt: &CheckInAttempt,
    ) -> Result<bool, VerifierError> {
        let input = serde_json::to_vec(attempt)
            .map_err(|e| VerifierError::Failed(format!("cannot encode attempt: {e}")))?;

        // Killed if the arbiter's timeout drops this future
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(method.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&input).await {
                Ok(()) => {}
                // Verifier decided without reading its input
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(e.into()),
            }
        }

        let status = child.wait().await?;
        debug!(
            program = %self.program,
            method = %method,
            attendee_id = %attempt.attendee_id,
            status = ?status.code(),
            "Verifier finished"
        );

        match status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            Some(code) => Err(VerifierError::Failed(format!("verifier exited with status {code}"))),
            None => Err(VerifierError::Failed("verifier terminated by signal".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_util::AttendeeId;

    fn attempt() -> CheckInAttempt {
        CheckInAttempt {
            attendee_id: AttendeeId::new("s-42"),
            method: VerificationMethod::Nfc,
            token: None,
            location: None,
            device_id: Some("reader-3".into()),
            proof: Some(serde_json::json!({ "card": "04a2" })),
        }
    }

    fn shell(script: &str) -> CommandVerifier {
        CommandVerifier::new("sh", vec!["-c".into(), script.into(), "verifier".into()])
    }

    #[tokio::test]
    async fn test_exit_status_is_verdict() {
        assert!(shell("exit 0").verify(VerificationMethod::Nfc, &attempt()).await.unwrap());
        assert!(!shell("exit 1").verify(VerificationMethod::Nfc, &attempt()).await.unwrap());
        assert!(shell("exit 7").verify(VerificationMethod::Nfc, &attempt()).await.is_err());
    }

    #[tokio::test]
    async fn test_method_and_attempt_are_passed() {
        // $1 is the method; stdin carries the attempt
        let verifier = shell(r#"[ "$1" = nfc ] && grep -q '"card":"04a2"'"#);
        assert!(verifier.verify(VerificationMethod::Nfc, &attempt()).await.unwrap());
        assert!(!verifier.verify(VerificationMethod::Facial, &attempt()).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let verifier = CommandVerifier::new("/nonexistent/rollcall-verifier", Vec::new());
        let result = verifier.verify(VerificationMethod::Biometric, &attempt()).await;
        assert!(matches!(result, Err(VerifierError::Io(_))));
    }
}
