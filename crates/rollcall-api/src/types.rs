//! Shared types for the rollcall data model and API

use bitflags::bitflags;
use chrono::{DateTime, Local, NaiveDate};
use rollcall_util::{AttendeeId, DaysOfMonth, DaysOfWeek, OwnerId, RecordId, SessionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A point on the Earth's surface, in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

/// Circular region a location check-in must fall inside
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub center: Coordinate,
    pub radius_meters: f64,
}

/// Ways an attendee can prove presence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    Qr,
    Location,
    Biometric,
    Facial,
    Nfc,
    Manual,
}

impl VerificationMethod {
    pub const ALL: [VerificationMethod; 6] = [
        VerificationMethod::Qr,
        VerificationMethod::Location,
        VerificationMethod::Biometric,
        VerificationMethod::Facial,
        VerificationMethod::Nfc,
        VerificationMethod::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMethod::Qr => "qr",
            VerificationMethod::Location => "location",
            VerificationMethod::Biometric => "biometric",
            VerificationMethod::Facial => "facial",
            VerificationMethod::Nfc => "nfc",
            VerificationMethod::Manual => "manual",
        }
    }

    fn flag(self) -> MethodSet {
        match self {
            VerificationMethod::Qr => MethodSet::QR,
            VerificationMethod::Location => MethodSet::LOCATION,
            VerificationMethod::Biometric => MethodSet::BIOMETRIC,
            VerificationMethod::Facial => MethodSet::FACIAL,
            VerificationMethod::Nfc => MethodSet::NFC,
            VerificationMethod::Manual => MethodSet::MANUAL,
        }
    }
}

impl fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown verification method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for VerificationMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "qr" => Ok(VerificationMethod::Qr),
            "location" | "gps" => Ok(VerificationMethod::Location),
            "biometric" | "fingerprint" => Ok(VerificationMethod::Biometric),
            "facial" | "face" => Ok(VerificationMethod::Facial),
            "nfc" => Ok(VerificationMethod::Nfc),
            "manual" => Ok(VerificationMethod::Manual),
            other => Err(UnknownMethod(other.to_string())),
        }
    }
}

bitflags! {
    /// Set of accepted verification methods
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(from = "Vec<VerificationMethod>", into = "Vec<VerificationMethod>")]
    pub struct MethodSet: u8 {
        const QR = 1 << 0;
        const LOCATION = 1 << 1;
        const BIOMETRIC = 1 << 2;
        const FACIAL = 1 << 3;
        const NFC = 1 << 4;
        const MANUAL = 1 << 5;
    }
}

impl MethodSet {
    pub fn accepts(&self, method: VerificationMethod) -> bool {
        self.contains(method.flag())
    }

    pub fn methods(&self) -> Vec<VerificationMethod> {
        VerificationMethod::ALL
            .into_iter()
            .filter(|m| self.accepts(*m))
            .collect()
    }
}

impl FromIterator<VerificationMethod> for MethodSet {
    fn from_iter<I: IntoIterator<Item = VerificationMethod>>(iter: I) -> Self {
        iter.into_iter()
            .fold(MethodSet::empty(), |set, m| set | m.flag())
    }
}

impl From<Vec<VerificationMethod>> for MethodSet {
    fn from(methods: Vec<VerificationMethod>) -> Self {
        methods.into_iter().collect()
    }
}

impl From<MethodSet> for Vec<VerificationMethod> {
    fn from(set: MethodSet) -> Self {
        set.methods()
    }
}

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    Open,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Open => "open",
            SessionStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(SessionStatus::Scheduled),
            "open" => Ok(SessionStatus::Open),
            "closed" => Ok(SessionStatus::Closed),
            other => Err(format!("Unknown session status: {}", other)),
        }
    }
}

/// How a session repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    OneTime,
    Daily,
    Weekly,
    Custom,
}

/// Recurrence frequency unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

/// When a recurrence stops producing occurrences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecurrenceEnd {
    /// Open-ended
    #[default]
    Never,
    /// Last calendar day (inclusive) an occurrence may start on
    Until { end_date: NaiveDate },
    /// Total number of occurrences, the first session included
    Count { occurrences: u32 },
}

/// Recurrence rule for non one-time sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrencePattern {
    pub frequency: Frequency,
    /// Every N units
    pub interval: u32,
    /// Required for weekly patterns
    #[serde(default)]
    pub days_of_week: DaysOfWeek,
    /// Required for monthly patterns
    #[serde(default)]
    pub days_of_month: DaysOfMonth,
    #[serde(default)]
    pub end: RecurrenceEnd,
}

/// One-time verification token shown to attendees (e.g. as a QR code)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationToken {
    pub value: String,
    pub expires_at: DateTime<Local>,
}

/// Why a session was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// End boundary reached with auto-end enabled
    Ended,
    /// Closed early or on time by the authority
    Authority,
    /// Cancelled before it opened
    Cancelled,
    /// Retired by the authority; no further occurrences
    Archived,
    /// Window passed before the session was opened
    Missed,
}

/// Everything an authority supplies to create or edit a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDraft {
    pub owner_id: OwnerId,
    pub title: String,
    #[serde(default)]
    pub geofence: Option<Geofence>,
    pub start_time: DateTime<Local>,
    #[serde(default)]
    pub end_time: Option<DateTime<Local>>,
    /// Required when `end_time` is absent
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub grace_period_minutes: u32,
    pub schedule_type: ScheduleType,
    #[serde(default)]
    pub recurrence: Option<RecurrencePattern>,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default)]
    pub auto_end: bool,
    pub methods: MethodSet,
}

/// A single class occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Id of the first occurrence of the series (equal to `id` for one-time sessions)
    pub series_id: SessionId,
    /// 1-based position of this occurrence in its series
    pub occurrence: u32,
    pub owner_id: OwnerId,
    pub title: String,
    pub geofence: Option<Geofence>,
    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
    pub duration_minutes: u32,
    pub grace_period_minutes: u32,
    pub schedule_type: ScheduleType,
    pub recurrence: Option<RecurrencePattern>,
    /// Start of the first occurrence; recurrence keeps its time of day
    pub series_start: DateTime<Local>,
    pub auto_start: bool,
    pub auto_end: bool,
    pub methods: MethodSet,
    pub token: Option<VerificationToken>,
    pub status: SessionStatus,
    pub next_occurrence: Option<DateTime<Local>>,
    pub created_at: DateTime<Local>,
    pub opened_at: Option<DateTime<Local>>,
    pub closed_at: Option<DateTime<Local>>,
    pub close_reason: Option<CloseReason>,
    /// SessionClosingSoon already requested for this occurrence
    #[serde(default)]
    pub closing_soon_notified: bool,
    #[serde(default)]
    pub archived: bool,
}

impl Session {
    /// Instant after which the session is over: `end_time`, or start plus duration
    pub fn end_boundary(&self) -> DateTime<Local> {
        self.end_time.unwrap_or_else(|| {
            self.start_time + chrono::Duration::minutes(i64::from(self.duration_minutes))
        })
    }

    /// Length of the attendance window
    pub fn window_length(&self) -> chrono::Duration {
        self.end_boundary() - self.start_time
    }

    pub fn is_recurring(&self) -> bool {
        self.schedule_type != ScheduleType::OneTime && self.recurrence.is_some()
    }

    pub fn accepts(&self, method: VerificationMethod) -> bool {
        self.methods.accepts(method)
    }

    /// Copy safe to hand to any client: the token value is never exposed here
    pub fn without_token(&self) -> Session {
        Session {
            token: None,
            ..self.clone()
        }
    }
}

/// Attendance outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Absent => "absent",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(AttendanceStatus::Present),
            "late" => Ok(AttendanceStatus::Late),
            "absent" => Ok(AttendanceStatus::Absent),
            other => Err(format!("Unknown attendance status: {}", other)),
        }
    }
}

/// A raw check-in attempt as submitted by an attendee's device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInAttempt {
    pub attendee_id: AttendeeId,
    pub method: VerificationMethod,
    /// Token value scanned from the session display (QR)
    #[serde(default)]
    pub token: Option<String>,
    /// Device-reported position (Location)
    #[serde(default)]
    pub location: Option<Coordinate>,
    #[serde(default)]
    pub device_id: Option<String>,
    /// Opaque proof forwarded to the external verifier (Biometric/Facial/NFC)
    #[serde(default)]
    pub proof: Option<serde_json::Value>,
}

/// Accepted check-in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: RecordId,
    pub session_id: SessionId,
    pub attendee_id: AttendeeId,
    pub check_in_time: DateTime<Local>,
    pub status: AttendanceStatus,
    pub verification_method: VerificationMethod,
    pub verified_location: Option<Coordinate>,
    pub device_id: Option<String>,
}

/// Attendance joined with the session it belongs to, for export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceExportRow {
    pub session_id: SessionId,
    pub session_title: String,
    pub session_start: DateTime<Local>,
    pub owner_id: OwnerId,
    pub attendee_id: AttendeeId,
    pub check_in_time: DateTime<Local>,
    pub status: AttendanceStatus,
    pub verification_method: VerificationMethod,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
    pub open_sessions: usize,
}
