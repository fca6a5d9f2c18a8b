//! Per-test-case execution record

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use shared::{ResourceId, TestStatus, WorkerId};

static TC_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"tc\d+").expect("valid test-case id pattern"));

/// Lifecycle position of one test case in the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseState {
    NotStarted,
    Running,
    Finished(TestStatus),
}

impl CaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseState::NotStarted => "NotStarted",
            CaseState::Running => "Running",
            CaseState::Finished(status) => status.as_str(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseState::Finished(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseRecord {
    pub name: String,
    /// `Running` until the case finishes
    pub status: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_nanos: Option<u128>,
    pub duration_secs: Option<f64>,
    pub resource: Option<ResourceId>,
    pub worker: Option<WorkerId>,
    /// Tracker identifiers (`tc123`) found in the name
    pub ids: Vec<String>,
    pub tags: Vec<String>,
    pub error: Option<String>,
    pub message: String,
    #[serde(skip)]
    pub(crate) state: Option<CaseState>,
}

impl TestCaseRecord {
    pub(crate) fn started(
        name: &str,
        resource: Option<ResourceId>,
        worker: Option<WorkerId>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            status: CaseState::Running.as_str().to_string(),
            start_time: Some(Utc::now()),
            end_time: None,
            duration_nanos: None,
            duration_secs: None,
            resource,
            worker,
            ids: extract_case_ids(name),
            tags,
            error: None,
            message: String::new(),
            state: Some(CaseState::Running),
        }
    }

    /// Skipped before it ever started
    pub(crate) fn skipped(
        name: &str,
        resource: Option<ResourceId>,
        worker: Option<WorkerId>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            start_time: None,
            ..Self::started(name, resource, worker, tags)
        }
    }

    pub(crate) fn finish(
        &mut self,
        status: TestStatus,
        duration_nanos: u128,
        error: Option<String>,
        message: Option<String>,
    ) {
        self.state = Some(CaseState::Finished(status));
        self.status = status.as_str().to_string();
        self.end_time = Some(Utc::now());
        self.duration_nanos = Some(duration_nanos);
        self.duration_secs = Some(duration_nanos as f64 / 1e9);
        self.error = error;
        self.message = message.unwrap_or_else(|| status.default_message().to_string());
    }

    pub fn state(&self) -> CaseState {
        self.state.unwrap_or(CaseState::NotStarted)
    }

    pub fn outcome(&self) -> Option<TestStatus> {
        match self.state() {
            CaseState::Finished(status) => Some(status),
            _ => None,
        }
    }
}

/// Test-case identifiers embedded in a name, e.g. `test_tc101_tc102_archive`
pub fn extract_case_ids(name: &str) -> Vec<String> {
    TC_ID.find_iter(name).map(|m| m.as_str().to_string()).collect()
}
