//! End-to-end tests for the harness engine
//!
//! These drive real listeners over loopback HTTP and full coordinator runs
//! with scripted test cases.

use std::sync::Arc;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use harness::*;
use shared::{CorrelationKey, TestStatus};

mod common;
use common::{FailingCase, LeakyCase, PanickingCase, RecordingCase, SkippingCase, quick_config};

/// No completion callback for rec-42 within 2s yields a timeout, not a hang
#[tokio::test]
async fn test_missing_completion_callback_times_out() {
    // Arrange
    let listener = NotificationListener::open(CorrelationKey::new("rec-42").unwrap(), &ListenerConfig::default())
        .await
        .unwrap();

    // Act
    let start = Instant::now();
    let result = listener.wait_for("RecordingComplete", Duration::from_secs(2)).await;
    let elapsed = start.elapsed();

    // Assert
    assert_matches!(result, Err(HarnessError::Timeout { .. }));
    assert!(elapsed >= Duration::from_secs(2), "returned early after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "hung for {elapsed:?}");

    listener.close().await;
    assert!(listener.is_closed());
}

/// s1/s2/s3 with a fourth worker: three bijective assignments, one exhaustion
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_excess_worker_fails_and_run_continues() {
    // Arrange
    let config = quick_config(&["s1", "s2", "s3"]).workers(4).try_build().unwrap();
    let coordinator = Coordinator::new(config, ExecutionReport::new()).unwrap();
    let case = Arc::new(RecordingCase::default());
    let seen = Arc::clone(&case.seen);

    // Act
    let outcome = coordinator.run(vec![case as Arc<dyn TestCase>]).await.unwrap();

    // Assert
    assert_eq!(outcome.worker_failures.len(), 1);
    assert_matches!(
        outcome.worker_failures[0].error,
        HarnessError::ResourceExhausted { capacity: 3, .. }
    );

    let seen = seen.lock().unwrap();
    let mut streams: Vec<String> = seen.values().map(|r| r.to_string()).collect();
    streams.sort();
    assert_eq!(streams, ["s1", "s2", "s3"]);

    assert_eq!(outcome.report.summary.counts.pass, 3);
    for stream in ["s1", "s2", "s3"] {
        let record = &outcome.report.testcases[&format!("tc201_binds_stream[{stream}]")];
        assert_eq!(record.resource.as_ref().unwrap().as_str(), stream);
    }
    assert!(!outcome.succeeded());
}

/// Tail order hands the first worker the last declared stream, and records follow it
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tail_order_flows_into_records() {
    // Arrange
    let config = quick_config(&["s1", "s2", "s3"])
        .assignment_order(AssignmentOrder::Tail)
        .workers(1)
        .try_build()
        .unwrap();
    let coordinator = Coordinator::new(config, ExecutionReport::new()).unwrap();
    let case = Arc::new(RecordingCase::default());
    let seen = Arc::clone(&case.seen);

    // Act
    let outcome = coordinator.run(vec![case as Arc<dyn TestCase>]).await.unwrap();

    // Assert
    assert!(outcome.succeeded());
    assert_eq!(outcome.report.testcases.len(), 1);
    let record = &outcome.report.testcases["tc201_binds_stream[s3]"];
    assert_eq!(record.resource.as_ref().unwrap().as_str(), "s3");
    assert_eq!(record.worker, Some(shared::WorkerId::new(0)));

    let seen = seen.lock().unwrap();
    assert_eq!(seen[&shared::WorkerId::new(0)].as_str(), "s3");
}

/// Two cases sharing a name abort the run before any worker starts
#[tokio::test]
async fn test_duplicate_case_names_fail_fast() {
    let config = quick_config(&["s1"]).try_build().unwrap();
    let report = ExecutionReport::new();
    let coordinator = Coordinator::new(config, report.clone()).unwrap();

    let result = coordinator
        .run(vec![Arc::new(FailingCase) as Arc<dyn TestCase>, Arc::new(FailingCase)])
        .await;

    assert_matches!(result, Err(HarnessError::Configuration { .. }));
    assert!(report.is_empty());
}

/// Failures, panics, runtime skips and skip-map exclusions all land in the report
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_every_outcome_is_recorded() {
    // Arrange
    let config = quick_config(&["s1", "s2"])
        .skip_stream("s2", ["archive"])
        .try_build()
        .unwrap();
    let coordinator = Coordinator::new(config, ExecutionReport::new()).unwrap();
    let cases: Vec<Arc<dyn TestCase>> = vec![
        Arc::new(FailingCase),
        Arc::new(PanickingCase),
        Arc::new(SkippingCase),
    ];

    // Act
    let outcome = coordinator.run(cases).await.unwrap();
    let doc = &outcome.report;

    // Assert
    let failed = &doc.testcases["tc202_copy_count[s1]"];
    assert_eq!(failed.status, "Fail");
    assert_eq!(failed.message, "copy count check failed");
    assert!(failed.error.as_deref().unwrap().contains("found 1"));
    assert_eq!(failed.ids, ["tc202"]);

    let excluded = &doc.testcases["tc202_copy_count[s2]"];
    assert_eq!(excluded.status, "Skip");
    assert!(excluded.start_time.is_none());
    assert_eq!(excluded.resource.as_ref().map(|r| r.as_str()), Some("s2"));
    assert!(excluded.worker.is_some());
    assert_eq!(excluded.tags, ["archive"]);
    assert!(excluded.message.contains("s2"));

    for stream in ["s1", "s2"] {
        let panicked = &doc.testcases[&format!("tc203_validator_bug[{stream}]")];
        assert_eq!(panicked.status, "Fail");
        assert!(panicked.error.as_deref().unwrap().contains("indexed past the manifest"));

        let skipped = &doc.testcases[&format!("tc204_cold_tier[{stream}]")];
        assert_eq!(skipped.status, "Skip");
        assert_eq!(skipped.message, "cold tier not provisioned");
    }

    assert_eq!(doc.summary.counts.total, 6);
    assert_eq!(doc.summary.counts.fail, 3);
    assert_eq!(doc.summary.counts.skip, 3);
    assert_eq!(doc.summary.counts.running, 0);
    assert!(outcome.worker_failures.is_empty());
}

/// A listener left open by a case is closed by cleanup and the case still passes
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_leaked_listener_does_not_fail_case() {
    let config = quick_config(&["s1"]).try_build().unwrap();
    let coordinator = Coordinator::new(config, ExecutionReport::new()).unwrap();

    let outcome = coordinator.run(vec![Arc::new(LeakyCase) as Arc<dyn TestCase>]).await.unwrap();

    let record = &outcome.report.testcases["tc205_forgets_close[s1]"];
    assert_eq!(record.outcome(), Some(TestStatus::Pass));
    assert_eq!(record.message, TestStatus::Pass.default_message());
    assert!(outcome.succeeded());
}

/// The built-in loopback suite passes end to end on every stream
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_loopback_suite_passes() {
    let config = quick_config(&["s1", "s2"]).try_build().unwrap();
    let coordinator = Coordinator::new(config, ExecutionReport::new()).unwrap();

    let outcome = coordinator.run(TestScenarios::suite("loopback").unwrap()).await.unwrap();

    assert!(outcome.succeeded(), "{:#?}", outcome.report.testcases);
    assert_eq!(outcome.report.summary.counts.pass, 6);
    assert_eq!(outcome.report.summary.percentage.pass, 100.0);
}

/// The report file carries the summary an external uploader reads
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_report_file_shape() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("output").join("report.json");
    let config = quick_config(&["s1"]).report_path(&path).try_build().unwrap();
    let report = ExecutionReport::new();
    let coordinator = Coordinator::new(config, report.clone()).unwrap();

    // Act
    coordinator
        .run(vec![Arc::new(FailingCase) as Arc<dyn TestCase>, Arc::new(SkippingCase)])
        .await
        .unwrap();
    report.write_to(&coordinator.config().report_path).unwrap();

    // Assert
    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["run_id"], report.run_id().to_string());
    assert_eq!(json["summary"]["counts"]["Fail"], 1);
    assert_eq!(json["summary"]["counts"]["Skip"], 1);
    assert_eq!(json["summary"]["percentage"]["Fail"], 50.0);
    assert_eq!(json["testcases"]["tc202_copy_count[s1]"]["worker"], 0);
    assert!(json["summary"]["suite"]["duration_secs"].as_f64().unwrap() >= 0.0);
}
