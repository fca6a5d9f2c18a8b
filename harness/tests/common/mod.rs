//! Common test utilities shared by the harness integration suites

pub mod cases;

pub use cases::{FailingCase, LeakyCase, PanickingCase, RecordingCase, SkippingCase};

use harness::{RunConfig, RunConfigBuilder};
use std::time::Duration;

/// Run configuration with short waits so failing paths stay fast
pub fn quick_config(streams: &[&str]) -> RunConfigBuilder {
    RunConfig::builder()
        .resources(streams.iter().copied())
        .poll_interval(Duration::from_millis(20))
        .poll_timeout(Duration::from_secs(2))
        .harness_drain_timeout(Duration::from_secs(2))
}
