//! Shared types for the stream test harness
//!
//! Identifiers, statuses and logging helpers used by both the coordinator
//! and the workers it launches.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;
