//! Test outcome errors
//!
//! Every test phase returns `HarnessResult`. The variant decides how the
//! runner records the iteration: `Failure` fails it, `Skipped` skips it and
//! everything else is an error.

use std::time::Duration;
use thiserror::Error;

use crate::models::TestStatus;

pub type HarnessResult<T> = std::result::Result<T, TestError>;

/// Failure of one concurrent worker, kept in registration order
#[derive(Debug)]
pub struct WorkerFailure {
    pub worker: String,
    pub error: TestError,
}

#[derive(Error, Debug)]
pub enum TestError {
    /// An assertion about device behaviour did not hold
    #[error("Test failed: {0}")]
    Failure(String),

    /// Infrastructure or setup problem
    #[error("Test error: {0}")]
    Error(String),

    /// Precondition not met
    #[error("Test skipped: {0}")]
    Skipped(String),

    #[error("Worker '{worker}' panicked: {message}")]
    Panicked { worker: String, message: String },

    #[error("Timed out after {elapsed:?} waiting for {what}")]
    Timeout { what: String, elapsed: Duration },

    #[error("Cancelled before start")]
    Cancelled,

    #[error("{} concurrent workers failed: {}", .0.len(), summarize(.0))]
    Multiple(Vec<WorkerFailure>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn summarize(failures: &[WorkerFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("[{}] {}", f.worker, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl TestError {
    pub fn failure(message: impl Into<String>) -> Self {
        TestError::Failure(message.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        TestError::Error(message.into())
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        TestError::Skipped(reason.into())
    }

    pub fn timeout(what: impl Into<String>, elapsed: Duration) -> Self {
        TestError::Timeout {
            what: what.into(),
            elapsed,
        }
    }

    /// Status recorded for an iteration that ended with this error
    pub fn status(&self) -> TestStatus {
        match self {
            TestError::Failure(_) => TestStatus::Fail,
            TestError::Skipped(_) => TestStatus::Skip,
            TestError::Multiple(failures)
                if !failures.is_empty()
                    && failures.iter().all(|f| f.error.status() == TestStatus::Fail) =>
            {
                TestStatus::Fail
            }
            _ => TestStatus::Error,
        }
    }
}

/// Fail the current phase unless `condition` holds
pub fn fail_unless(condition: bool, message: impl Into<String>) -> HarnessResult<()> {
    if condition {
        Ok(())
    } else {
        Err(TestError::failure(message))
    }
}

/// Skip the current phase unless `condition` holds
pub fn skip_unless(condition: bool, reason: impl Into<String>) -> HarnessResult<()> {
    if condition {
        Ok(())
    } else {
        Err(TestError::skipped(reason))
    }
}
