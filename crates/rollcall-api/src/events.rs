//! Event types for rollcalld -> client streaming

use chrono::{DateTime, Local};
use rollcall_util::{AttendeeId, SessionId};
use serde::{Deserialize, Serialize};

use crate::{API_VERSION, AttendanceStatus, CloseReason};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: rollcall_util::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    SessionOpened {
        session_id: SessionId,
        title: String,
        ends_at: DateTime<Local>,
    },

    /// Raised once per session, a configured lead time before its end boundary
    SessionClosingSoon {
        session_id: SessionId,
        closes_at: DateTime<Local>,
    },

    SessionClosed {
        session_id: SessionId,
        reason: CloseReason,
    },

    /// Next occurrence of a recurring series was materialized
    OccurrenceScheduled {
        session_id: SessionId,
        series_id: SessionId,
        start_time: DateTime<Local>,
    },

    /// A new token was issued. The value is only available via GetToken.
    TokenRotated {
        session_id: SessionId,
        expires_at: DateTime<Local>,
    },

    CheckInRecorded {
        session_id: SessionId,
        attendee_id: AttendeeId,
        status: AttendanceStatus,
    },

    /// Service is shutting down
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization() {
        let event = Event::new(EventPayload::SessionOpened {
            session_id: SessionId::new(),
            title: "Linear Algebra".into(),
            ends_at: rollcall_util::now(),
        });

        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.api_version, API_VERSION);
        assert!(matches!(parsed.payload, EventPayload::SessionOpened { .. }));
    }

    #[test]
    fn token_rotated_never_carries_value() {
        let event = Event::new(EventPayload::TokenRotated {
            session_id: SessionId::new(),
            expires_at: rollcall_util::now(),
        });

        let json = serde_json::to_value(&event).unwrap();
        let payload = json.get("payload").unwrap();
        assert_eq!(payload.get("type").unwrap(), "token_rotated");
        assert!(payload.get("value").is_none());
    }

    #[test]
    fn closed_event_reason_is_snake_case() {
        let event = Event::new(EventPayload::SessionClosed {
            session_id: SessionId::new(),
            reason: CloseReason::Ended,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""reason":"ended""#));
    }
}
