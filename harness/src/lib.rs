//! Stream Test Harness
//!
//! Test-execution engine for a distributed media-recording platform. Test
//! cases run on parallel workers, each bound exclusively to one stream, and
//! verify long-running platform operations through push callbacks
//! ([`NotificationListener`]) and polled state ([`PollWaiter`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use harness::*;
//!
//! # async fn run() -> HarnessResult<()> {
//! let config = RunConfig::builder()
//!     .resources(["s1", "s2", "s3"])
//!     .try_build()?;
//!
//! let coordinator = Coordinator::new(config, ExecutionReport::new())?;
//! let outcome = coordinator.run(TestScenarios::suite("loopback")?).await?;
//! assert!(outcome.succeeded());
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod config;
pub mod error;
pub mod runtime;
pub mod scenarios;
pub mod testing;

// Main interfaces - re-exported at crate root for convenience
pub use config::{Distribution, ListenerConfig, PollConfig, RunConfig, RunConfigBuilder, SkipMap};
pub use error::{HarnessError, HarnessResult};
pub use runtime::{Coordinator, RunOutcome, WorkerFailure};
pub use testing::{ExecutionReport, ReportDocument, Skip, TestCase, TestContext};

// Supporting types
pub use runtime::coordinator::Selection;
pub use runtime::{
    AssignmentOrder, NotificationEvent, NotificationListener, PollReport, PollWaiter, ResourcePool, StateSource,
    ValidationHarness, ValidationResult, ValidationTask, WorkerAssignment,
};
pub use scenarios::TestScenarios;
pub use testing::{CaseState, TestCaseRecord};
