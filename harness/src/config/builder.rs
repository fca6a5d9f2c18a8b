//! Run Configuration Builder
//!
//! Provides a flexible builder pattern for constructing run configurations

use std::path::PathBuf;
use std::time::Duration;

use shared::ResourceId;

use super::run_config::{Distribution, RunConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::runtime::pool::AssignmentOrder;

pub struct RunConfigBuilder {
    config: RunConfig,
    rejected: Vec<String>,
}

impl RunConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RunConfig::default(),
            rejected: Vec::new(),
        }
    }

    fn resource_id(&mut self, raw: &str) -> Option<ResourceId> {
        match ResourceId::new(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                self.rejected.push(raw.to_string());
                None
            }
        }
    }

    /// Set the declared streams, in declaration order
    pub fn resources<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut resources = Vec::new();
        for raw in ids {
            if let Some(id) = self.resource_id(raw.as_ref()) {
                resources.push(id);
            }
        }
        self.config.resources = resources;
        self
    }

    /// Set number of workers (defaults to one per stream)
    pub fn workers(mut self, count: usize) -> Self {
        self.config.workers = Some(count);
        self
    }

    pub fn distribution(mut self, distribution: Distribution) -> Self {
        self.config.distribution = distribution;
        self
    }

    pub fn assignment_order(mut self, order: AssignmentOrder) -> Self {
        self.config.assignment_order = order;
        self
    }

    /// Exclude tagged tests from one stream
    pub fn skip_stream<I, S>(mut self, stream: &str, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(id) = self.resource_id(stream) {
            self.config.skip.insert(id, tags);
        }
        self
    }

    /// Exclude tagged tests from every stream
    pub fn skip_tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.config.skip_tags.insert(tag.into());
        self
    }

    pub fn listener_bind_host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.listener.bind_host = host.into();
        self
    }

    pub fn listener_advertise_host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.listener.advertise_host = Some(host.into());
        self
    }

    pub fn status_field<S: Into<String>>(mut self, field: S) -> Self {
        self.config.listener.status_field = field.into();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll.interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.poll.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn harness_drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.harness_drain_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn report_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.report_path = path.into();
        self
    }

    /// Set log level (trace, debug, info, warn, error)
    pub fn log_level<S: Into<String>>(mut self, level: S) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Build the configuration without validating it
    pub fn build(self) -> RunConfig {
        if !self.rejected.is_empty() {
            tracing::warn!("Dropped invalid stream ids: {:?}", self.rejected);
        }
        self.config
    }

    /// Build and validate, reporting any id the builder had to drop
    pub fn try_build(self) -> HarnessResult<RunConfig> {
        if let Some(raw) = self.rejected.first() {
            return Err(HarnessError::configuration(format!("invalid stream id '{raw}'")));
        }
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for RunConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
