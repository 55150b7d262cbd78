//! Data model and protocol types for rollcall
//!
//! This crate defines the types shared by every other crate and the stable
//! API between rollcalld and its clients:
//! - Sessions, recurrence patterns, attendance records
//! - Commands (requests from clients) and responses
//! - Events (service -> subscribed clients)
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
