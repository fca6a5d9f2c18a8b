//! Poll Waiter
//!
//! Fallback for state the platform does not push: re-evaluate a predicate at
//! a fixed interval until it holds or the timeout elapses. A timeout is an
//! ordinary return value; the caller turns it into a pass/fail decision.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use crate::config::PollConfig;
use crate::error::{HarnessError, HarnessResult};

/// Read side of the platform under test (storage placement, copy counts, ...)
#[mockall::automock]
#[async_trait]
pub trait StateSource: Send + Sync {
    /// Fetch the current state document for `key`
    async fn fetch_state(&self, key: &str) -> anyhow::Result<Value>;
}

/// How a satisfied poll went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub attempts: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollWaiter {
    interval: Duration,
    timeout: Duration,
}

impl PollWaiter {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn from_config(config: &PollConfig) -> Self {
        Self::new(config.interval(), config.timeout())
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn poll_until<F>(&self, what: &str, mut predicate: F) -> HarnessResult<PollReport>
    where
        F: FnMut() -> bool,
    {
        self.poll_until_async(what, || std::future::ready(predicate())).await
    }

    /// Await `predicate` immediately, then once per interval
    ///
    /// The last evaluation happens at the deadline, so an unsatisfied poll
    /// returns within `timeout + interval` of the call. An evaluation still
    /// pending at the deadline is abandoned and counts as unsatisfied.
    pub async fn poll_until_async<F, Fut>(&self, what: &str, mut predicate: F) -> HarnessResult<PollReport>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = Instant::now();
        let deadline = deadline_after(start, self.timeout);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let satisfied = match tokio::time::timeout_at(deadline, predicate()).await {
                Ok(satisfied) => satisfied,
                Err(_) => {
                    tracing::debug!("{} evaluation still pending at the deadline", what);
                    false
                }
            };
            if satisfied {
                let report = PollReport {
                    attempts,
                    elapsed: start.elapsed(),
                };
                tracing::debug!("✅ {} satisfied after {} attempts ({:?})", what, attempts, report.elapsed);
                return Ok(report);
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!("⏰ {} not satisfied after {} attempts in {:?}", what, attempts, self.timeout);
                return Err(HarnessError::timeout(what, self.timeout));
            }

            tokio::time::sleep(self.interval.min(deadline - now)).await;
        }
    }

    /// Poll `key` through `source` until `predicate` accepts the fetched state
    ///
    /// A failed fetch counts as "not yet".
    pub async fn poll_state<S, P>(&self, source: &S, key: &str, predicate: P) -> HarnessResult<PollReport>
    where
        S: StateSource + ?Sized,
        P: Fn(&Value) -> bool,
    {
        let what = format!("state of '{key}'");
        let predicate = &predicate;
        self.poll_until_async(&what, move || async move {
            match source.fetch_state(key).await {
                Ok(state) => predicate(&state),
                Err(e) => {
                    tracing::debug!("State fetch for '{}' failed: {:#}", key, e);
                    false
                }
            }
        })
        .await
    }
}

/// `start + wait`, saturating to a far-future instant for huge waits
pub(crate) fn deadline_after(start: Instant, wait: Duration) -> Instant {
    // Roughly 30 years, the same horizon tokio uses for an unbounded sleep
    const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);
    start
        .checked_add(wait)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

impl Default for PollWaiter {
    fn default() -> Self {
        Self::from_config(&PollConfig::default())
    }
}
