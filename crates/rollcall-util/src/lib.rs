//! Shared utilities for rollcall
//!
//! This crate provides:
//! - ID types (SessionId, AttendeeId, OwnerId, RecordId, ClientId)
//! - Wall-clock time with a debug-only mock clock
//! - Weekday and day-of-month sets used by recurrence patterns
//! - Keyed rate limiting
//! - Default paths for socket, data, and config

mod days;
mod ids;
mod paths;
mod rate_limit;
mod time;

pub use days::*;
pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use time::*;
