//! Error types for application deployment and diagnostics.

use kgrid_core::ProcessError;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to http get {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to download from {url}, unexpected status code {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read release archive: {0}")]
    Archive(#[source] std::io::Error),

    #[error("{0} binary not found in release")]
    BinaryNotFound(String),

    #[error("failed to load license: {0}")]
    License(#[source] serde_yaml::Error),

    #[error("failed to marshal config values: {0}")]
    ConfigValues(#[source] serde_yaml::Error),

    #[error("failed to write {what}: {source}")]
    TempFile {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Command(#[from] ProcessError),

    #[error("failed to parse {what} output: {source}")]
    Output {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to upload to s3: {0}")]
    Upload(#[source] ProcessError),
}
