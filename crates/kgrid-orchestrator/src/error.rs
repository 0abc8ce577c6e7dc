//! Coordinator error types.

use kgrid_state::StateError;
use thiserror::Error;

use crate::outcome::MultiError;

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Configuration error raised before any worker launches.
    #[error("grid {0} has no clusters")]
    EmptyGrid(String),

    #[error("grid {0} not found")]
    GridNotFound(String),

    #[error(transparent)]
    Store(#[from] StateError),

    /// One or more workers failed; siblings ran to completion.
    #[error(transparent)]
    Clusters(#[from] MultiError),

    #[error("supervisor for {0} exited before signalling completion")]
    SupervisorLost(&'static str),
}
