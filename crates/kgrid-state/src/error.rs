//! Error types for the grids store.

use thiserror::Error;

/// Result type alias for store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to create config dir: {0}")]
    CreateDir(String),

    #[error("failed to read config file: {0}")]
    Read(String),

    #[error("failed to write config file: {0}")]
    Write(String),

    #[error("failed to marshal config: {0}")]
    Serialize(String),

    #[error("failed to unmarshal config: {0}")]
    Deserialize(String),

    #[error("grid with name {0} already exists. if you want to delete it, run kgrid delete")]
    DuplicateGrid(String),

    #[error("grid {0} not found")]
    GridNotFound(String),
}
