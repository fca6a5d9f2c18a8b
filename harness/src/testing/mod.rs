//! Testing Framework
//!
//! Test case interface, execution records and the run report.

pub mod case;
pub mod record;
pub mod report;

// Re-export main types
pub use case::{Skip, TestCase, TestContext, sort_by_order};
pub use record::{CaseState, TestCaseRecord, extract_case_ids};
pub use report::{ExecutionReport, ReportDocument, ReportSummary, StatusCounts, StatusPercentages};
