//! Session lifecycle and check-in verification engine for rollcalld
//!
//! This crate is the heart of rollcalld, containing:
//! - Great-circle distance and geofence checks
//! - Recurrence resolution (daily, weekly, monthly patterns)
//! - Verification token rotation
//! - Session state machine (Scheduled -> Open -> Closed)
//! - Check-in arbitration producing Present/Late records
//! - The engine tying these to the store, and the scheduler driving it

mod arbiter;
mod engine;
mod error;
mod events;
pub mod geo;
mod lifecycle;
pub mod recurrence;
mod scheduler;
mod token;
mod verifier;

pub use arbiter::*;
pub use engine::*;
pub use error::*;
pub use events::*;
pub use lifecycle::*;
pub use scheduler::*;
pub use token::*;
pub use verifier::*;
