//! Worker outcomes and their aggregation.

use std::fmt;

use serde::Serialize;
use tracing::warn;

/// What a worker reports for its cluster entry. Sent exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Succeeded,
    Failed(String),
}

impl<E: fmt::Display> From<Result<(), E>> for WorkerOutcome {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => WorkerOutcome::Succeeded,
            Err(e) => WorkerOutcome::Failed(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterFailure {
    /// Cluster name, or the entry index when the name is unknown.
    pub cluster: String,
    pub message: String,
}

/// Every per-cluster failure of one fan-out.
///
/// Displays as a JSON array of `"<operation> <cluster>: <message>"` strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiError {
    operation: &'static str,
    failures: Vec<ClusterFailure>,
}

impl MultiError {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            failures: Vec::new(),
        }
    }

    pub fn push(&mut self, cluster: impl Into<String>, message: impl Into<String>) {
        self.failures.push(ClusterFailure {
            cluster: cluster.into(),
            message: message.into(),
        });
    }

    pub fn failures(&self) -> &[ClusterFailure] {
        &self.failures
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn messages(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|f| format!("{} {}: {}", self.operation, f.cluster, f.message))
            .collect()
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string(&self.messages()).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}

impl std::error::Error for MultiError {}

/// How a fan-out turns its collected failures into a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Any failure fails the operation with the full [`MultiError`].
    Aggregate,
    /// Failures are logged and the operation succeeds.
    BestEffort,
}

impl FailurePolicy {
    pub fn resolve(self, errors: MultiError) -> Result<(), MultiError> {
        if errors.is_empty() {
            return Ok(());
        }
        match self {
            FailurePolicy::Aggregate => Err(errors),
            FailurePolicy::BestEffort => {
                for failure in errors.failures() {
                    warn!(
                        cluster = %failure.cluster,
                        error = %failure.message,
                        "{} failed",
                        errors.operation()
                    );
                }
                Ok(())
            }
        }
    }
}
