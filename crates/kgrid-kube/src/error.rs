use kgrid_core::ProcessError;
use thiserror::Error;

pub type KubeResult<T> = Result<T, KubeError>;

#[derive(Debug, Error)]
pub enum KubeError {
    #[error("failed to write kubeconfig: {0}")]
    Kubeconfig(#[source] std::io::Error),

    #[error("failed to run kubectl command: {0}")]
    Command(#[from] ProcessError),

    #[error("failed to unmarshal kubectl output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("api server not ready: {0}")]
    ApiServerNotReady(String),
}
