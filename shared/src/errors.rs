//! Shared error types for the stream test harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Invalid {kind}: '{input}'")]
    InvalidIdentifier { kind: &'static str, input: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
