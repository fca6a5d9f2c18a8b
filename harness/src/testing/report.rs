//! Execution Report
//!
//! One record per test case, shared by every worker of a run. The report is
//! handed to the coordinator explicitly and cloned into workers; clones share
//! the same underlying map.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{ResourceId, TestStatus, WorkerId};
use uuid::Uuid;

use super::record::{CaseState, TestCaseRecord};
use crate::error::{HarnessError, HarnessResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusCounts {
    pub pass: usize,
    pub fail: usize,
    pub skip: usize,
    pub running: usize,
    #[serde(rename = "total")]
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusPercentages {
    pub pass: f64,
    pub fail: f64,
    pub skip: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteTiming {
    pub start_time: DateTime<Utc>,
    pub snapshot_time: DateTime<Utc>,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub counts: StatusCounts,
    pub percentage: StatusPercentages,
    pub suite: SuiteTiming,
}

/// Serialized form of a report at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub run_id: Uuid,
    pub testcases: BTreeMap<String, TestCaseRecord>,
    pub summary: ReportSummary,
}

impl ReportDocument {
    pub fn has_failures(&self) -> bool {
        self.summary.counts.fail > 0
    }
}

#[derive(Debug)]
struct ReportState {
    run_id: Uuid,
    suite_start: DateTime<Utc>,
    records: BTreeMap<String, TestCaseRecord>,
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    state: Arc<Mutex<ReportState>>,
}

impl Default for ExecutionReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionReport {
    pub fn new() -> Self {
        let run_id = Uuid::new_v4();
        tracing::debug!("📝 Execution report {} initialized", run_id);
        Self {
            state: Arc::new(Mutex::new(ReportState {
                run_id,
                suite_start: Utc::now(),
                records: BTreeMap::new(),
            })),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.lock().run_id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move `name` from not-started to running
    pub fn record_start(
        &self,
        name: &str,
        resource: Option<&ResourceId>,
        worker: Option<WorkerId>,
        tags: &[&str],
    ) -> HarnessResult<()> {
        let mut state = self.lock();
        if let Some(existing) = state.records.get(name) {
            return Err(HarnessError::InvalidTransition {
                name: name.to_string(),
                from: existing.state().as_str(),
                to: CaseState::Running.as_str(),
            });
        }

        let tags = tags.iter().map(|t| t.to_string()).collect();
        state.records.insert(
            name.to_string(),
            TestCaseRecord::started(name, resource.cloned(), worker, tags),
        );
        Ok(())
    }

    /// Finalize `name`; only `Skip` may finish a case that never started
    pub fn record_end(
        &self,
        name: &str,
        status: TestStatus,
        duration_nanos: u128,
        error: Option<String>,
        message: Option<String>,
    ) -> HarnessResult<()> {
        let mut state = self.lock();
        let invalid = |from: CaseState| HarnessError::InvalidTransition {
            name: name.to_string(),
            from: from.as_str(),
            to: status.as_str(),
        };

        match state.records.get_mut(name) {
            Some(record) if record.state() == CaseState::Running => {
                record.finish(status, duration_nanos, error, message);
            }
            Some(record) => return Err(invalid(record.state())),
            None if status == TestStatus::Skip => {
                let mut record = TestCaseRecord::skipped(name, None, None, Vec::new());
                record.finish(status, duration_nanos, error, message);
                state.records.insert(name.to_string(), record);
            }
            None => return Err(invalid(CaseState::NotStarted)),
        }
        Ok(())
    }

    /// Record `name` as skipped before it started, keeping where it would have run
    pub fn record_skipped(
        &self,
        name: &str,
        resource: Option<&ResourceId>,
        worker: Option<WorkerId>,
        tags: &[&str],
        reason: Option<String>,
    ) -> HarnessResult<()> {
        let mut state = self.lock();
        if let Some(existing) = state.records.get(name) {
            return Err(HarnessError::InvalidTransition {
                name: name.to_string(),
                from: existing.state().as_str(),
                to: TestStatus::Skip.as_str(),
            });
        }

        let tags = tags.iter().map(|t| t.to_string()).collect();
        let mut record = TestCaseRecord::skipped(name, resource.cloned(), worker, tags);
        record.finish(TestStatus::Skip, 0, None, reason);
        state.records.insert(name.to_string(), record);
        Ok(())
    }

    /// Fail every case still running, e.g. after an interrupt
    pub fn fail_running(&self, reason: &str) -> usize {
        let mut state = self.lock();
        let now = Utc::now();
        let mut failed = 0;
        for record in state.records.values_mut() {
            if record.state() == CaseState::Running {
                let nanos = record
                    .start_time
                    .and_then(|start| (now - start).num_nanoseconds())
                    .map_or(0, |n| n.max(0) as u128);
                record.finish(TestStatus::Fail, nanos, Some(reason.to_string()), Some(reason.to_string()));
                failed += 1;
            }
        }
        if failed > 0 {
            tracing::warn!("⚠️ Marked {} running test cases as failed: {}", failed, reason);
        }
        failed
    }

    pub fn get(&self, name: &str) -> Option<TestCaseRecord> {
        self.lock().records.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Consistent snapshot of every record plus the summary
    pub fn serialize(&self) -> ReportDocument {
        let state = self.lock();
        let snapshot_time = Utc::now();

        let mut counts = StatusCounts::default();
        for record in state.records.values() {
            match record.state() {
                CaseState::Finished(TestStatus::Pass) => counts.pass += 1,
                CaseState::Finished(TestStatus::Fail) => counts.fail += 1,
                CaseState::Finished(TestStatus::Skip) => counts.skip += 1,
                CaseState::Running | CaseState::NotStarted => counts.running += 1,
            }
        }
        counts.total = state.records.len();

        let percent = |n: usize| {
            if counts.total == 0 {
                0.0
            } else {
                (n as f64 * 10_000.0 / counts.total as f64).round() / 100.0
            }
        };
        let percentage = StatusPercentages {
            pass: percent(counts.pass),
            fail: percent(counts.fail),
            skip: percent(counts.skip),
        };

        let duration_secs = (snapshot_time - state.suite_start)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        ReportDocument {
            run_id: state.run_id,
            testcases: state.records.clone(),
            summary: ReportSummary {
                counts,
                percentage,
                suite: SuiteTiming {
                    start_time: state.suite_start,
                    snapshot_time,
                    duration_secs,
                },
            },
        }
    }

    /// Write the current snapshot as pretty JSON, creating parent directories
    pub fn write_to(&self, path: impl AsRef<Path>) -> HarnessResult<ReportDocument> {
        let path = path.as_ref();
        let document = self.serialize();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&document)?)?;

        tracing::info!(
            "💾 Report written to {} ({} pass, {} fail, {} skip)",
            path.display(),
            document.summary.counts.pass,
            document.summary.counts.fail,
            document.summary.counts.skip
        );
        Ok(document)
    }
}
