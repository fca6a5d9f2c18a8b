//! Test case interface and the per-case context handed to it

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use shared::{CorrelationKey, ResourceId, WorkerId};

use crate::config::RunConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::runtime::listener::NotificationListener;
use crate::runtime::poll::PollWaiter;
use crate::runtime::pool::WorkerAssignment;
use crate::runtime::validation::ValidationHarness;

/// A unit of verification run against one stream
#[async_trait]
pub trait TestCase: Send + Sync {
    fn name(&self) -> &str;

    /// Selection and skip tags
    fn tags(&self) -> &[&'static str] {
        &[]
    }

    /// Placement in the run: `0, 1, ..` first, `-1` last, `None` in between
    fn order(&self) -> Option<i32> {
        None
    }

    /// An `Err` fails the case; returning [`Skip`] skips it
    async fn run(&self, ctx: &mut TestContext) -> anyhow::Result<()>;
}

/// Error a case returns to skip itself at runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skip(pub String);

impl Skip {
    pub fn new(reason: impl Into<String>) -> Self {
        Skip(reason.into())
    }
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "skipped: {}", self.0)
    }
}

impl std::error::Error for Skip {}

/// What one case may touch while it runs
pub struct TestContext {
    assignment: WorkerAssignment,
    config: Arc<RunConfig>,
    listeners: Vec<NotificationListener>,
    harnesses: Vec<ValidationHarness>,
    message: Option<String>,
}

impl fmt::Debug for TestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("worker", &self.assignment.worker())
            .field("resource", self.assignment.resource())
            .field("listeners", &self.listeners.len())
            .field("harnesses", &self.harnesses.len())
            .finish_non_exhaustive()
    }
}

impl TestContext {
    pub fn new(assignment: WorkerAssignment, config: Arc<RunConfig>) -> Self {
        Self {
            assignment,
            config,
            listeners: Vec::new(),
            harnesses: Vec::new(),
            message: None,
        }
    }

    pub fn assignment(&self) -> &WorkerAssignment {
        &self.assignment
    }

    pub fn worker(&self) -> WorkerId {
        self.assignment.worker()
    }

    pub fn resource(&self) -> &ResourceId {
        self.assignment.resource()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Open a listener that is closed automatically when the case ends
    pub async fn open_listener(&mut self, key: &str) -> HarnessResult<NotificationListener> {
        let key = CorrelationKey::new(key)?;
        let listener = NotificationListener::open(key, &self.config.listener).await?;
        self.listeners.push(listener.clone());
        Ok(listener)
    }

    /// Poll waiter carrying the run's default interval and timeout
    pub fn poll_waiter(&self) -> PollWaiter {
        PollWaiter::from_config(&self.config.poll)
    }

    /// Borrow a fresh validation pool owned by this case
    ///
    /// The pool is shut down with the case if the case did not do so itself.
    pub fn validation_harness(&mut self, capacity: usize) -> HarnessResult<&mut ValidationHarness> {
        let harness = ValidationHarness::new(capacity, self.config.harness_drain_timeout())?;
        self.harnesses.push(harness);
        let last = self.harnesses.len() - 1;
        Ok(&mut self.harnesses[last])
    }

    /// Override the report message for this case
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub(crate) fn take_message(&mut self) -> Option<String> {
        self.message.take()
    }

    /// Release everything the case left open
    ///
    /// Returns the leaks found; each was force-closed.
    pub async fn cleanup(&mut self) -> Vec<HarnessError> {
        let mut leaks = Vec::new();

        for listener in self.listeners.drain(..) {
            if !listener.is_closed() {
                let leak = HarnessError::ListenerLeak {
                    key: listener.key().to_string(),
                };
                tracing::warn!("🚨 {}", leak);
                listener.close().await;
                leaks.push(leak);
            }
        }

        for mut harness in self.harnesses.drain(..) {
            harness.shutdown().await;
        }

        leaks
    }
}

/// Stable sort by order markers
///
/// Non-negative orders come first ascending, then unordered cases in their
/// given order, then negative orders ascending so `-1` runs last.
pub fn sort_by_order(cases: &mut [Arc<dyn TestCase>]) {
    cases.sort_by_key(|case| match case.order() {
        Some(n) if n >= 0 => (0, n),
        None => (1, 0),
        Some(n) => (2, n),
    });
}
