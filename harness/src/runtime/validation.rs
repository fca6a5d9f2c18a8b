//! Concurrent Validation Harness
//!
//! Fans independent, usually network-bound validations out across a bounded
//! pool and collects their outcomes. Results arrive in completion order, not
//! submission order; callers that need to map results back to entities carry
//! the entity id in the detail text.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

use crate::error::{HarnessError, HarnessResult};

/// Outcome of one validation; a failed check is a normal result, not an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub success: bool,
    pub detail: String,
}

impl ValidationResult {
    pub fn pass(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }
}

impl From<Result<(), String>> for ValidationResult {
    fn from(outcome: Result<(), String>) -> Self {
        match outcome {
            Ok(()) => ValidationResult::pass(""),
            Err(detail) => ValidationResult::fail(detail),
        }
    }
}

/// A unit of work submitted to the harness
pub struct ValidationTask {
    label: String,
    work: BoxFuture<'static, ValidationResult>,
}

impl ValidationTask {
    pub fn new<F>(label: impl Into<String>, work: F) -> Self
    where
        F: Future<Output = ValidationResult> + Send + 'static,
    {
        Self {
            label: label.into(),
            work: Box::pin(work),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for ValidationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationTask").field("label", &self.label).finish_non_exhaustive()
    }
}

pub struct ValidationHarness {
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
    running: Arc<AtomicUsize>,
    results_tx: mpsc::UnboundedSender<ValidationResult>,
    results_rx: mpsc::UnboundedReceiver<ValidationResult>,
    capacity: usize,
    submitted: usize,
    collected: usize,
    drain_timeout: Duration,
    shut_down: bool,
}

impl fmt::Debug for ValidationHarness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationHarness")
            .field("capacity", &self.capacity)
            .field("submitted", &self.submitted)
            .field("collected", &self.collected)
            .field("in_flight", &self.in_flight())
            .field("shut_down", &self.shut_down)
            .finish()
    }
}

impl ValidationHarness {
    /// Create a pool running at most `capacity` validations at once
    pub fn new(capacity: usize, drain_timeout: Duration) -> HarnessResult<Self> {
        if capacity == 0 {
            return Err(HarnessError::configuration("validation pool capacity must be at least 1"));
        }
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Ok(Self {
            permits: Arc::new(Semaphore::new(capacity)),
            tasks: JoinSet::new(),
            running: Arc::new(AtomicUsize::new(0)),
            results_tx,
            results_rx,
            capacity,
            submitted: 0,
            collected: 0,
            drain_timeout,
            shut_down: false,
        })
    }

    /// Queue a validation; never waits for pool capacity
    pub fn submit(&mut self, task: ValidationTask) -> HarnessResult<()> {
        if self.shut_down {
            return Err(HarnessError::HarnessShutdown);
        }

        let ValidationTask { label, work } = task;
        let permits = Arc::clone(&self.permits);
        let results = self.results_tx.clone();
        let running = InFlight::enter(&self.running);

        self.tasks.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => {
                        let reason = panic_message(panic.as_ref());
                        tracing::error!("💥 Validation '{}' panicked: {}", label, reason);
                        ValidationResult::fail(format!("{label}: validation panicked: {reason}"))
                    }
                },
                Err(_) => ValidationResult::fail(format!("{label}: could not be scheduled")),
            };
            drop(running);
            // The receiver lives as long as the harness
            let _ = results.send(result);
        });

        self.submitted += 1;
        tracing::debug!("📤 Submitted validation ({} total)", self.submitted);
        Ok(())
    }

    /// Block until `count` results arrive, each within `per_result_timeout`
    ///
    /// On expiry returns [`HarnessError::CollectionTimeout`] carrying the
    /// results gathered so far.
    pub async fn collect_all(
        &mut self,
        count: usize,
        per_result_timeout: Duration,
    ) -> HarnessResult<Vec<ValidationResult>> {
        let mut results = Vec::with_capacity(count);

        while results.len() < count {
            match tokio::time::timeout(per_result_timeout, self.results_rx.recv()).await {
                Ok(Some(result)) => {
                    self.collected += 1;
                    results.push(result);
                }
                // Sender half is owned by self, so the channel never closes while we hold it
                Ok(None) | Err(_) => {
                    tracing::warn!(
                        "⏰ Collected {} of {} validation results within {:?} per result",
                        results.len(),
                        count,
                        per_result_timeout
                    );
                    return Err(HarnessError::CollectionTimeout {
                        expected: count,
                        received: results.len(),
                        partial: results,
                    });
                }
            }
        }

        let failures = results.iter().filter(|r| !r.success).count();
        tracing::info!("📥 Collected {} validation results ({} failed)", results.len(), failures);
        Ok(results)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Validations submitted but not yet finished, queued ones included
    pub fn in_flight(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Wait for running work, aborting whatever outlives the drain timeout
    ///
    /// Validations still waiting for a permit never start; each reports a
    /// "could not be scheduled" failure instead. Calling it again is a no-op.
    pub async fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.permits.close();

        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(self.drain_timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                "🔨 {} validations still running after {:?}, aborting",
                self.in_flight(),
                self.drain_timeout
            );
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
        }

        let uncollected = self.submitted.saturating_sub(self.collected);
        if uncollected > 0 {
            tracing::debug!("{} validation results were never collected", uncollected);
        }
        tracing::debug!("🛑 Validation harness shut down");
    }
}

impl Drop for ValidationHarness {
    fn drop(&mut self) {
        if !self.shut_down && !self.tasks.is_empty() {
            tracing::warn!(
                "🚨 Validation harness dropped without shutdown, aborting {} tasks",
                self.tasks.len()
            );
            self.tasks.abort_all();
        }
    }
}

/// Counts one submitted validation until its task finishes or is aborted
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn checksum_task(i: usize) -> ValidationTask {
        ValidationTask::new(format!("rec-{i}"), async move {
            tokio::time::sleep(Duration::from_millis(10 * (5 - i as u64))).await;
            if i == 3 {
                ValidationResult::fail("checksum mismatch")
            } else {
                ValidationResult::pass(format!("rec-{i} ok"))
            }
        })
    }

    #[tokio::test]
    async fn test_five_tasks_one_checksum_mismatch() {
        let mut harness = ValidationHarness::new(5, Duration::from_secs(5)).unwrap();
        for i in 1..=5 {
            harness.submit(checksum_task(i)).unwrap();
        }

        let results = harness.collect_all(5, Duration::from_secs(5)).await.unwrap();
        assert_eq!(results.len(), 5);

        let failures: Vec<_> = results.iter().filter(|r| !r.success).collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].detail, "checksum mismatch");

        let details: HashSet<_> = results.iter().map(|r| r.detail.clone()).collect();
        assert_eq!(details.len(), 5, "duplicate result delivered");

        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_blocked_task_yields_partial_collection() {
        let mut harness = ValidationHarness::new(3, Duration::from_millis(100)).unwrap();
        harness
            .submit(ValidationTask::new("fast-1", async { ValidationResult::pass("fast-1") }))
            .unwrap();
        harness
            .submit(ValidationTask::new("stuck", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                ValidationResult::pass("stuck")
            }))
            .unwrap();
        harness
            .submit(ValidationTask::new("fast-2", async { ValidationResult::pass("fast-2") }))
            .unwrap();

        let err = harness.collect_all(3, Duration::from_millis(300)).await.unwrap_err();
        assert_matches!(
            err,
            HarnessError::CollectionTimeout { expected: 3, received: 2, ref partial } if partial.len() == 2
        );

        let start = std::time::Instant::now();
        harness.shutdown().await;
        assert!(start.elapsed() < Duration::from_secs(5), "shutdown waited on a stuck task");
    }

    #[tokio::test]
    async fn test_capacity_bounds_concurrency() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut harness = ValidationHarness::new(2, Duration::from_secs(5)).unwrap();

        for i in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            harness
                .submit(ValidationTask::new(format!("t{i}"), async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    ValidationResult::pass(format!("t{i}"))
                }))
                .unwrap();
        }

        let results = harness.collect_all(6, Duration::from_secs(5)).await.unwrap();
        assert_eq!(results.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_task_still_reports() {
        let mut harness = ValidationHarness::new(2, Duration::from_secs(1)).unwrap();
        async fn read_manifest() -> ValidationResult {
            panic!("playback manifest missing");
        }

        harness.submit(ValidationTask::new("boom", read_manifest())).unwrap();

        let results = harness.collect_all(1, Duration::from_secs(2)).await.unwrap();
        assert!(!results[0].success);
        assert!(results[0].detail.contains("boom"));
        assert!(results[0].detail.contains("playback manifest missing"));
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_idempotent_and_rejects_submissions() {
        let mut harness = ValidationHarness::new(1, Duration::from_secs(1)).unwrap();
        harness.shutdown().await;
        harness.shutdown().await;
        assert!(harness.is_shut_down());

        let err = harness
            .submit(ValidationTask::new("late", async { ValidationResult::pass("late") }))
            .unwrap_err();
        assert_matches!(err, HarnessError::HarnessShutdown);
    }

    #[tokio::test]
    async fn test_in_flight_drops_once_results_arrive() {
        let mut harness = ValidationHarness::new(2, Duration::from_secs(1)).unwrap();
        for i in 0..3 {
            harness
                .submit(ValidationTask::new(format!("rec-{i}"), async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    ValidationResult::pass(format!("rec-{i}"))
                }))
                .unwrap();
        }
        assert_eq!(harness.in_flight(), 3);

        harness.collect_all(3, Duration::from_secs(2)).await.unwrap();
        assert_eq!(harness.in_flight(), 0);
        harness.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_fails_queued_validations() {
        let mut harness = ValidationHarness::new(1, Duration::from_secs(2)).unwrap();
        harness
            .submit(ValidationTask::new("rec-running", async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                ValidationResult::pass("rec-running")
            }))
            .unwrap();
        harness
            .submit(ValidationTask::new("rec-queued", async { ValidationResult::pass("rec-queued") }))
            .unwrap();
        // Let the first task take the only permit
        tokio::time::sleep(Duration::from_millis(50)).await;

        harness.shutdown().await;
        let results = harness.collect_all(2, Duration::from_secs(1)).await.unwrap();

        assert!(results.contains(&ValidationResult::pass("rec-running")));
        let queued = results.iter().find(|r| !r.success).unwrap();
        assert_eq!(queued.detail, "rec-queued: could not be scheduled");
        assert_eq!(harness.in_flight(), 0);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_matches!(
            ValidationHarness::new(0, Duration::from_secs(1)),
            Err(HarnessError::Configuration { .. })
        );
    }

    #[test]
    fn test_result_from_outcome() {
        assert!(ValidationResult::from(Ok(())).success);
        let failed = ValidationResult::from(Err("copy count 0".to_string()));
        assert!(!failed.success);
        assert_eq!(failed.detail, "copy count 0");
    }
}
