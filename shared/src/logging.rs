//! Shared logging utilities for consistent tracing across coordinator and workers

use chrono::{DateTime, Utc};
use tracing::{Span, info, info_span, warn};

use crate::types::{ResourceId, WorkerId};

const BANNER: &str = "##############################";

/// Default filter directives for the given base level
pub fn default_filter(log_level: &str) -> String {
    format!("harness={log_level},shared={log_level},axum=warn,hyper=warn,reqwest=warn,tower=warn")
}

/// Initialize the tracing subscriber
///
/// `RUST_LOG` wins over the computed filter when set.
pub fn init_tracing(log_level: Option<&str>, verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let base_level = match (verbose, log_level) {
        (true, _) => "debug",
        (false, Some(level)) => level,
        (false, None) => "info",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(base_level)));

    // try_init so tests and embedding binaries can call this more than once
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(verbose)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Span every log line of one worker is emitted under
pub fn worker_span(worker: WorkerId, resource: &ResourceId) -> Span {
    info_span!("worker", worker = %worker, resource = %resource)
}

/// Banner logged when a test case starts
pub fn log_case_started(name: &str) {
    info!(timestamp = format_timestamp(), "{BANNER} STARTED : {name} {BANNER}");
}

/// Banner logged when a test case ends, whatever its outcome
pub fn log_case_ended(name: &str, status: &dyn std::fmt::Display) {
    info!(
        timestamp = format_timestamp(),
        status = %status,
        "{BANNER} ENDED : {name} {BANNER}"
    );
}

/// Banner logged when a test case is skipped before it runs
pub fn log_case_skipped(name: &str, reason: &str) {
    info!(
        timestamp = format_timestamp(),
        reason,
        "{BANNER} SKIPPED : {name} {BANNER}"
    );
}

/// Error block logged for a failing test case
pub fn log_case_failure(name: &str, error: &str) {
    let marker = "XX".repeat(25);
    warn!("{marker}  E R R O R  {marker}");
    warn!(test = name, "Test failed: {error}");
}
