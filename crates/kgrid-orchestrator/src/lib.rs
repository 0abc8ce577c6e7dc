//! kgrid orchestration — fan a grid out to one worker per cluster and fan the results back in.
//!
//! Every operation follows the same shape: one task per cluster entry, each
//! reporting exactly once on a shared bounded queue, and a single supervisor
//! that tallies the reports and signals the caller when every entry is
//! terminal. Sibling workers are never cancelled by a failure.
//!
//! # Components
//!
//! - **`outcome`** — worker outcomes, [`MultiError`] aggregation, [`FailurePolicy`]
//! - **`supervisor`** — the result queue, tally and finished signal
//! - **`coordinator`** — [`Coordinator`]: `create`, `delete`, `deploy`
//! - **`provision`** — per-cluster create and teardown pipelines

pub mod coordinator;
pub mod error;
pub mod outcome;
mod provision;
pub mod supervisor;

pub use coordinator::Coordinator;
pub use error::{CoordinatorError, CoordinatorResult};
pub use outcome::{ClusterFailure, FailurePolicy, MultiError, WorkerOutcome};
