//! Harness error types

use std::time::Duration;

use shared::{SharedError, WorkerId};
use thiserror::Error;

use crate::runtime::validation::ValidationResult;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Resource pool exhausted: worker {worker} found no free resource (pool capacity {capacity})")]
    ResourceExhausted { worker: WorkerId, capacity: usize },

    #[error("Worker {worker} stopped outside any test case: {reason}")]
    WorkerAborted { worker: WorkerId, reason: String },

    #[error("Timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },

    #[error("Collected {received} of {expected} validation results before timing out")]
    CollectionTimeout {
        expected: usize,
        received: usize,
        partial: Vec<ValidationResult>,
    },

    #[error("Notification listener for '{key}' was still open at cleanup")]
    ListenerLeak { key: String },

    #[error("Failed to bind notification listener on {addr}")]
    ListenerBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Validation harness already shut down")]
    HarnessShutdown,

    #[error("Invalid transition for test case '{name}': {from} -> {to}")]
    InvalidTransition {
        name: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("Shared component error")]
    Shared(#[from] SharedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        HarnessError::Configuration { reason: reason.into() }
    }

    pub fn timeout(what: impl Into<String>, waited: Duration) -> Self {
        HarnessError::Timeout {
            what: what.into(),
            waited,
        }
    }

    /// Bounded wait expired; the caller decides whether that fails the test
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            HarnessError::Timeout { .. } | HarnessError::CollectionTimeout { .. }
        )
    }

    /// Errors that abort the affected worker rather than a single test case
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarnessError::Configuration { .. } | HarnessError::ResourceExhausted { .. }
        )
    }

    pub(crate) fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        HarnessError::ListenerBind {
            addr: addr.into(),
            source,
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
