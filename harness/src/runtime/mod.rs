//! Runtime Management
//!
//! Stream assignment, callback listeners, polling and concurrent validation,
//! plus the coordinator that drives workers over them.

pub mod coordinator;
pub mod listener;
pub mod poll;
pub mod pool;
pub mod validation;

// Re-export main types
pub use coordinator::{Coordinator, RunOutcome, WorkerFailure};
pub use listener::{NotificationEvent, NotificationListener};
pub use poll::{MockStateSource, PollReport, PollWaiter, StateSource};
pub use pool::{AssignmentOrder, ResourcePool, WorkerAssignment};
pub use validation::{ValidationHarness, ValidationResult, ValidationTask};
