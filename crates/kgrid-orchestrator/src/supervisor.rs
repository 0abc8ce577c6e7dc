//! Fan-in for one fan-out operation.
//!
//! Workers share a single bounded queue of capacity N and each sends one
//! `(index, WorkerOutcome)` before exiting. A supervisor task owns the
//! [`Tally`], stops once every index is terminal, and hands the collected
//! [`MultiError`] to the caller over a oneshot.

use std::future::Future;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::outcome::{ClusterFailure, MultiError, WorkerOutcome};

/// Failure recorded for workers that dropped their sender without reporting.
pub const SILENT_WORKER: &str = "worker exited without reporting";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryStatus {
    InProgress,
    Succeeded,
    Failed,
}

/// Per-index status of a fan-out. Owned by the supervisor alone.
#[derive(Debug)]
pub struct Tally {
    names: Vec<String>,
    status: Vec<EntryStatus>,
    pending: usize,
    errors: MultiError,
}

impl Tally {
    pub fn new(operation: &'static str, names: Vec<String>) -> Self {
        let n = names.len();
        Self {
            names,
            status: vec![EntryStatus::InProgress; n],
            pending: n,
            errors: MultiError::new(operation),
        }
    }

    fn label(&self, index: usize) -> String {
        match self.names.get(index) {
            Some(name) if !name.is_empty() => name.clone(),
            _ => index.to_string(),
        }
    }

    /// Record a report. Returns the failure when this report newly failed its index.
    ///
    /// Reports for an already terminal or unknown index are ignored.
    pub fn record(&mut self, index: usize, outcome: WorkerOutcome) -> Option<ClusterFailure> {
        match self.status.get(index) {
            Some(EntryStatus::InProgress) => {}
            Some(_) => {
                debug!(index, "ignoring duplicate worker report");
                return None;
            }
            None => {
                warn!(index, "ignoring report for unknown worker");
                return None;
            }
        }
        self.pending -= 1;
        match outcome {
            WorkerOutcome::Succeeded => {
                self.status[index] = EntryStatus::Succeeded;
                None
            }
            WorkerOutcome::Failed(message) => {
                self.status[index] = EntryStatus::Failed;
                let failure = ClusterFailure {
                    cluster: self.label(index),
                    message,
                };
                self.errors.push(failure.cluster.clone(), failure.message.clone());
                Some(failure)
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.pending == 0
    }

    /// Fail every index still in progress. Returns those indexes.
    pub fn close(&mut self) -> Vec<usize> {
        let silent: Vec<usize> = self
            .status
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == EntryStatus::InProgress)
            .map(|(i, _)| i)
            .collect();
        for &index in &silent {
            self.record(index, WorkerOutcome::Failed(SILENT_WORKER.to_string()));
        }
        silent
    }

    pub fn into_errors(self) -> MultiError {
        self.errors
    }
}

/// Follow-up hook for fan-outs that do nothing extra on failure.
pub fn no_followup(_index: usize) -> Option<std::future::Ready<()>> {
    None
}

/// Spawn one worker per name plus the supervisor; returns the finished signal.
///
/// `worker(i)` builds the future for entry `i`. `on_failure(i)` may return a
/// follow-up task for a failed entry; the supervisor runs those in a join set
/// and drains it before signalling. Must be called inside a Tokio runtime.
pub fn supervise<W, WF, D, DF>(
    operation: &'static str,
    names: Vec<String>,
    mut worker: W,
    mut on_failure: D,
) -> oneshot::Receiver<MultiError>
where
    W: FnMut(usize) -> WF,
    WF: Future<Output = WorkerOutcome> + Send + 'static,
    D: FnMut(usize) -> Option<DF> + Send + 'static,
    DF: Future<Output = ()> + Send + 'static,
{
    let n = names.len();
    let (results_tx, mut results_rx) = mpsc::channel::<(usize, WorkerOutcome)>(n.max(1));

    for index in 0..n {
        let results_tx = results_tx.clone();
        let work = worker(index);
        tokio::spawn(async move {
            let outcome = work.await;
            if results_tx.send((index, outcome)).await.is_err() {
                debug!(index, "supervisor gone before worker reported");
            }
        });
    }
    drop(results_tx);

    let (finished_tx, finished_rx) = oneshot::channel();
    tokio::spawn(async move {
        let mut tally = Tally::new(operation, names);
        let mut followups = JoinSet::new();

        while !tally.is_complete() {
            let Some((index, outcome)) = results_rx.recv().await else {
                break;
            };
            if let Some(failure) = tally.record(index, outcome) {
                warn!(cluster = %failure.cluster, error = %failure.message, "{operation} failed");
                if let Some(task) = on_failure(index) {
                    followups.spawn(task);
                }
            }
        }

        for index in tally.close() {
            warn!(index, "{operation}: {SILENT_WORKER}");
            if let Some(task) = on_failure(index) {
                followups.spawn(task);
            }
        }

        while let Some(joined) = followups.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "follow-up task did not complete");
            }
        }

        let errors = tally.into_errors();
        debug!(operation, failures = errors.len(), "fan-out finished");
        // The caller may have gone away; nothing left to do then.
        let _ = finished_tx.send(errors);
    });

    finished_rx
}
