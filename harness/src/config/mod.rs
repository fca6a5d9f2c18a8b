//! Configuration Management
//!
//! Run inputs: declared streams, parallelism, skip rules and wait defaults.

pub mod builder;
pub mod run_config;
pub mod skip;

// Re-export main types
pub use builder::RunConfigBuilder;
pub use run_config::{Distribution, ListenerConfig, PollConfig, RunConfig};
pub use skip::SkipMap;
