//! Test Scenarios
//!
//! Built-in test case catalogue, addressable by suite name.

pub mod loopback;

use std::sync::Arc;

use crate::error::{HarnessError, HarnessResult};
use crate::testing::TestCase;

pub struct TestScenarios;

impl TestScenarios {
    pub const SUITES: &'static [&'static str] = &["loopback", "all"];

    /// Cases of one suite
    pub fn suite(name: &str) -> HarnessResult<Vec<Arc<dyn TestCase>>> {
        match name {
            "loopback" | "all" => Ok(loopback::cases()),
            other => Err(HarnessError::configuration(format!(
                "unknown suite '{other}' (expected one of: {})",
                Self::SUITES.join(", ")
            ))),
        }
    }
}
