//! Run Coordinator
//!
//! Partitions the stream pool once, launches one worker per assignment and
//! drives the selected test cases through each worker. Every case outcome
//! lands in the shared [`ExecutionReport`], whatever happened to the case.

use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use futures_util::FutureExt;
use shared::logging::{log_case_ended, log_case_failure, log_case_skipped, log_case_started, worker_span};
use shared::{TestStatus, WorkerId};
use tracing::Instrument;

use super::pool::{ResourcePool, WorkerAssignment};
use super::validation::panic_message;
use crate::config::{Distribution, RunConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::testing::{ExecutionReport, ReportDocument, Skip, TestCase, TestContext, sort_by_order};

/// A worker that never ran, or died outside any test case
#[derive(Debug)]
pub struct WorkerFailure {
    pub worker: WorkerId,
    pub error: HarnessError,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub report: ReportDocument,
    pub worker_failures: Vec<WorkerFailure>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        !self.report.has_failures() && self.worker_failures.is_empty()
    }
}

/// `-k` / `-m` style case selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub keyword: Option<String>,
    pub marker: Option<String>,
}

impl Selection {
    pub fn matches(&self, case: &dyn TestCase) -> bool {
        let keyword_ok = self.keyword.as_deref().is_none_or(|k| case.name().contains(k));
        let marker_ok = self
            .marker
            .as_deref()
            .is_none_or(|m| case.tags().iter().any(|tag| *tag == m));
        keyword_ok && marker_ok
    }

    pub fn apply(&self, cases: Vec<Arc<dyn TestCase>>) -> Vec<Arc<dyn TestCase>> {
        let total = cases.len();
        let selected: Vec<_> = cases.into_iter().filter(|c| self.matches(c.as_ref())).collect();
        if selected.len() < total {
            tracing::info!("🔎 Selected {} of {} test cases", selected.len(), total);
        }
        selected
    }
}

enum WorkSource {
    /// Every worker runs every case
    Each(Arc<[Arc<dyn TestCase>]>),
    /// Workers drain one shared queue
    Shared(Arc<Mutex<VecDeque<Arc<dyn TestCase>>>>),
}

struct Worker {
    assignment: WorkerAssignment,
    config: Arc<RunConfig>,
    report: ExecutionReport,
    source: WorkSource,
}

impl Worker {
    async fn run(self) -> usize {
        let mut executed = 0;
        match &self.source {
            WorkSource::Each(cases) => {
                for case in cases.iter() {
                    let name = format!("{}[{}]", case.name(), self.assignment.resource());
                    self.run_case(case.as_ref(), &name).await;
                    executed += 1;
                }
            }
            WorkSource::Shared(queue) => loop {
                let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
                let Some(case) = next else { break };
                self.run_case(case.as_ref(), case.name()).await;
                executed += 1;
            },
        }
        tracing::info!("🏁 Worker {} finished {} test cases", self.assignment.worker(), executed);
        executed
    }

    fn skip_reason(&self, case: &dyn TestCase) -> Option<String> {
        let resource = self.assignment.resource();
        if let Some(tag) = self.config.skip.skip_reason(resource, case.tags()) {
            return Some(format!("'{tag}' is excluded on stream {resource}"));
        }
        case.tags()
            .iter()
            .find(|tag| self.config.skip_tags.contains(**tag))
            .map(|tag| format!("'{tag}' is excluded for this run"))
    }

    async fn run_case(&self, case: &dyn TestCase, name: &str) {
        let report = &self.report;

        if let Some(reason) = self.skip_reason(case) {
            log_case_skipped(name, &reason);
            if let Err(e) = report.record_skipped(
                name,
                Some(self.assignment.resource()),
                Some(self.assignment.worker()),
                case.tags(),
                Some(reason),
            ) {
                tracing::error!("Report rejected skip of '{}': {}", name, e);
            }
            return;
        }

        if let Err(e) = report.record_start(
            name,
            Some(self.assignment.resource()),
            Some(self.assignment.worker()),
            case.tags(),
        ) {
            tracing::error!("Report rejected start of '{}': {}", name, e);
            return;
        }
        log_case_started(name);

        let mut ctx = TestContext::new(self.assignment.clone(), Arc::clone(&self.config));
        let started = Instant::now();
        let outcome = AssertUnwindSafe(case.run(&mut ctx)).catch_unwind().await;
        let leaks = ctx.cleanup().await;
        let duration_nanos = started.elapsed().as_nanos();

        if !leaks.is_empty() {
            tracing::debug!("'{}' left {} listeners open", name, leaks.len());
        }

        let mut message = ctx.take_message();
        let (status, error) = match outcome {
            Ok(Ok(())) => (TestStatus::Pass, None),
            Ok(Err(e)) => match e.downcast_ref::<Skip>() {
                Some(Skip(reason)) => {
                    message.get_or_insert_with(|| reason.clone());
                    (TestStatus::Skip, None)
                }
                None => (TestStatus::Fail, Some(format!("{e:#}"))),
            },
            Err(panic) => (
                TestStatus::Fail,
                Some(format!("test case panicked: {}", panic_message(panic.as_ref()))),
            ),
        };

        if let Some(error) = &error {
            log_case_failure(name, error);
        }

        if let Err(e) = report.record_end(name, status, duration_nanos, error, message) {
            tracing::error!("Report rejected end of '{}': {}", name, e);
        }
        log_case_ended(name, &status);
    }
}

pub struct Coordinator {
    config: Arc<RunConfig>,
    report: ExecutionReport,
}

impl Coordinator {
    pub fn new(config: RunConfig, report: ExecutionReport) -> HarnessResult<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            report,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn report(&self) -> &ExecutionReport {
        &self.report
    }

    /// Run `cases` across all workers and wait for every worker to finish
    ///
    /// Case names key the report, so a name declared twice is rejected
    /// before any worker starts.
    pub async fn run(&self, mut cases: Vec<Arc<dyn TestCase>>) -> HarnessResult<RunOutcome> {
        let mut names = HashSet::with_capacity(cases.len());
        for case in &cases {
            if !names.insert(case.name()) {
                return Err(HarnessError::configuration(format!(
                    "test case '{}' is declared more than once",
                    case.name()
                )));
            }
        }

        let config = &self.config;
        let pool = ResourcePool::initialize(config.resources.clone(), config.assignment_order)?;

        sort_by_order(&mut cases);
        let worker_count = config.worker_count();
        tracing::info!(
            "🚀 Running {} test cases on {} workers ({:?} distribution)",
            cases.len(),
            worker_count,
            config.distribution
        );

        let each: Arc<[Arc<dyn TestCase>]> = cases.clone().into();
        let queue = Arc::new(Mutex::new(VecDeque::from(cases)));

        let mut worker_failures = Vec::new();
        let mut handles = Vec::with_capacity(worker_count);

        for index in 0..worker_count {
            let worker = WorkerId::new(index as u32);
            let assignment = match pool.assign(worker) {
                Ok(assignment) => assignment,
                Err(error) => {
                    tracing::error!("❌ Worker {} cannot start: {}", worker, error);
                    worker_failures.push(WorkerFailure { worker, error });
                    continue;
                }
            };

            let span = worker_span(worker, assignment.resource());
            let source = match config.distribution {
                Distribution::Each => WorkSource::Each(Arc::clone(&each)),
                Distribution::Load => WorkSource::Shared(Arc::clone(&queue)),
            };
            let runner = Worker {
                assignment,
                config: Arc::clone(config),
                report: self.report.clone(),
                source,
            };
            handles.push((worker, tokio::spawn(runner.run().instrument(span))));
        }

        for (worker, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!("❌ Worker {} stopped unexpectedly: {}", worker, e);
                worker_failures.push(WorkerFailure {
                    worker,
                    error: HarnessError::WorkerAborted {
                        worker,
                        reason: e.to_string(),
                    },
                });
            }
        }

        let report = self.report.serialize();
        let counts = &report.summary.counts;
        tracing::info!(
            "📊 Run {} finished: {} pass, {} fail, {} skip",
            report.run_id,
            counts.pass,
            counts.fail,
            counts.skip
        );

        Ok(RunOutcome {
            report,
            worker_failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counted {
        name: &'static str,
        tags: &'static [&'static str],
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TestCase for Counted {
        fn name(&self) -> &str {
            self.name
        }

        fn tags(&self) -> &[&'static str] {
            self.tags
        }

        async fn run(&self, _ctx: &mut TestContext) -> anyhow::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counted(name: &'static str, tags: &'static [&'static str]) -> (Arc<dyn TestCase>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let case: Arc<dyn TestCase> = Arc::new(Counted {
            name,
            tags,
            runs: Arc::clone(&runs),
        });
        (case, runs)
    }

    #[test]
    fn test_selection_by_keyword_and_marker() {
        let (archive, _) = counted("tc1_archive", &["archive"]);
        let (start, _) = counted("tc2_start", &["smoke"]);

        let by_keyword = Selection {
            keyword: Some("archive".into()),
            marker: None,
        };
        assert!(by_keyword.matches(archive.as_ref()));
        assert!(!by_keyword.matches(start.as_ref()));

        let by_marker = Selection {
            keyword: None,
            marker: Some("smoke".into()),
        };
        assert_eq!(by_marker.apply(vec![archive, start]).len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_load_distribution_runs_each_case_once() {
        let config = RunConfig::builder()
            .resources(["s1", "s2"])
            .distribution(Distribution::Load)
            .build();
        let coordinator = Coordinator::new(config, ExecutionReport::new()).unwrap();

        let (a, a_runs) = counted("tc1_a", &[]);
        let (b, b_runs) = counted("tc2_b", &[]);
        let (c, c_runs) = counted("tc3_c", &[]);
        let outcome = coordinator.run(vec![a, b, c]).await.unwrap();

        assert!(outcome.succeeded());
        assert_eq!(outcome.report.summary.counts.pass, 3);
        for runs in [a_runs, b_runs, c_runs] {
            assert_eq!(runs.load(Ordering::SeqCst), 1);
        }
        assert!(outcome.report.testcases.contains_key("tc1_a"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_global_skip_tag() {
        let config = RunConfig::builder().resources(["s1"]).skip_tag("destructive").build();
        let coordinator = Coordinator::new(config, ExecutionReport::new()).unwrap();

        let (destructive, runs) = counted("tc5_disk_full", &["destructive"]);
        let outcome = coordinator.run(vec![destructive]).await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        let record = &outcome.report.testcases["tc5_disk_full[s1]"];
        assert_eq!(record.status, "Skip");
        assert!(record.message.contains("destructive"));
    }

    #[tokio::test]
    async fn test_duplicate_case_names_rejected_before_running() {
        let config = RunConfig::builder().resources(["s1"]).build();
        let report = ExecutionReport::new();
        let coordinator = Coordinator::new(config, report.clone()).unwrap();

        let (first, first_runs) = counted("tc7_copies", &[]);
        let (second, second_runs) = counted("tc7_copies", &["archive"]);
        let result = coordinator.run(vec![first, second]).await;

        assert_matches::assert_matches!(
            result,
            Err(HarnessError::Configuration { reason }) if reason.contains("tc7_copies")
        );
        assert_eq!(first_runs.load(Ordering::SeqCst), 0);
        assert_eq!(second_runs.load(Ordering::SeqCst), 0);
        assert!(report.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_skipped_case_keeps_placement() {
        let config = RunConfig::builder().resources(["s1"]).skip_tag("destructive").build();
        let coordinator = Coordinator::new(config, ExecutionReport::new()).unwrap();

        let (destructive, _) = counted("tc5_disk_full", &["destructive", "storage"]);
        let outcome = coordinator.run(vec![destructive]).await.unwrap();

        let record = &outcome.report.testcases["tc5_disk_full[s1]"];
        assert_eq!(record.resource.as_ref().map(|r| r.as_str()), Some("s1"));
        assert_eq!(record.worker, Some(WorkerId::new(0)));
        assert_eq!(record.tags, vec!["destructive", "storage"]);
        assert!(record.start_time.is_none());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = RunConfig::builder().build();
        assert!(Coordinator::new(config, ExecutionReport::new()).is_err());
    }
}
