//! Run Configuration
//!
//! Static inputs of one run: the declared streams, parallelism and the
//! defaults handed to every test case.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared::ResourceId;

use super::skip::SkipMap;
use crate::error::{HarnessError, HarnessResult};
use crate::runtime::pool::AssignmentOrder;

/// How test cases are spread across workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    /// Every worker runs every selected case against its own stream
    #[default]
    Each,
    /// Workers pull cases from one shared queue
    Load,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface notification listeners bind on
    pub bind_host: String,
    /// Host written into callback URLs; falls back to `bind_host`
    pub advertise_host: Option<String>,
    /// Top-level payload field holding the status value
    pub status_field: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            advertise_host: None,
            status_field: "status".to_string(),
        }
    }
}

impl ListenerConfig {
    pub fn advertise_host(&self) -> &str {
        match self.advertise_host.as_deref() {
            Some(host) => host,
            None if self.bind_host == "0.0.0.0" => "127.0.0.1",
            None => &self.bind_host,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            timeout_ms: 300_000,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub resources: Vec<ResourceId>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub distribution: Distribution,
    #[serde(default)]
    pub assignment_order: AssignmentOrder,
    #[serde(default)]
    pub skip: SkipMap,
    #[serde(default)]
    pub skip_tags: BTreeSet<String>,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default = "default_drain_timeout_ms")]
    pub harness_drain_timeout_ms: u64,
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_drain_timeout_ms() -> u64 {
    30_000
}

fn default_report_path() -> PathBuf {
    PathBuf::from("output/report.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            resources: Vec::new(),
            workers: None,
            distribution: Distribution::default(),
            assignment_order: AssignmentOrder::default(),
            skip: SkipMap::default(),
            skip_tags: BTreeSet::new(),
            listener: ListenerConfig::default(),
            poll: PollConfig::default(),
            harness_drain_timeout_ms: default_drain_timeout_ms(),
            report_path: default_report_path(),
            log_level: default_log_level(),
        }
    }
}

impl RunConfig {
    /// Create a new builder
    pub fn builder() -> super::builder::RunConfigBuilder {
        super::builder::RunConfigBuilder::new()
    }

    /// Load and validate a JSON run configuration
    pub fn load(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: RunConfig = serde_json::from_str(&raw).map_err(|e| {
            HarnessError::configuration(format!("malformed {}: {e}", path.display()))
        })?;
        config.validate()?;
        tracing::debug!(
            "Loaded run configuration from {} ({} streams)",
            path.display(),
            config.resources.len()
        );
        Ok(config)
    }

    /// Number of workers to launch
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or(self.resources.len())
    }

    pub fn harness_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.harness_drain_timeout_ms)
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.resources.is_empty() {
            return Err(HarnessError::configuration("resource list is empty"));
        }

        let mut seen = HashSet::new();
        for resource in &self.resources {
            if !seen.insert(resource) {
                return Err(HarnessError::configuration(format!(
                    "stream '{resource}' is declared more than once"
                )));
            }
        }

        if self.workers == Some(0) {
            return Err(HarnessError::configuration("worker count must be at least 1"));
        }

        if self.poll.interval_ms == 0 || self.poll.timeout_ms == 0 {
            return Err(HarnessError::configuration(
                "poll interval and timeout must be greater than zero",
            ));
        }

        if self.listener.status_field.trim().is_empty() {
            return Err(HarnessError::configuration("listener status_field is empty"));
        }

        self.skip.validate_against(&self.resources)
    }
}
