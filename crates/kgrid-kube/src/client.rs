//! `KubeClient` — the kubectl-equivalent seam.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use kgrid_core::{CommandSpec, Settings};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{KubeError, KubeResult};
use crate::namespaces::NamespaceList;
use crate::nodes::NodeList;

/// Operations against a cluster addressed by kubeconfig content.
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// `kubectl apply -f -` with `manifest` on stdin.
    async fn apply(&self, kubeconfig: &str, manifest: &str) -> KubeResult<()>;

    async fn nodes(&self, kubeconfig: &str) -> KubeResult<NodeList>;

    async fn namespaces(&self, kubeconfig: &str) -> KubeResult<NamespaceList>;

    /// Succeeds once the API server answers `cluster-info`.
    async fn check_api_server(&self, kubeconfig: &str) -> KubeResult<()>;
}

/// Write kubeconfig content to a temp file that lives as long as the guard.
pub fn kubeconfig_file(kubeconfig: &str) -> Result<NamedTempFile, std::io::Error> {
    let mut file = tempfile::Builder::new()
        .prefix("kgrid-kubeconfig-")
        .tempfile()?;
    file.write_all(kubeconfig.as_bytes())?;
    file.flush()?;
    Ok(file)
}

pub struct Kubectl {
    binary: PathBuf,
    timeout: Duration,
}

impl Kubectl {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            binary: settings.binaries.kubectl.clone(),
            timeout: settings.timeouts.command,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, kubeconfig: &NamedTempFile) -> CommandSpec {
        CommandSpec::new(&self.binary)
            .arg("--kubeconfig")
            .arg(kubeconfig.path().display().to_string())
            .timeout(self.timeout)
    }
}

#[async_trait]
impl KubeClient for Kubectl {
    async fn apply(&self, kubeconfig: &str, manifest: &str) -> KubeResult<()> {
        let file = kubeconfig_file(kubeconfig).map_err(KubeError::Kubeconfig)?;
        let out = self
            .command(&file)
            .args(["apply", "-f", "-"])
            .stdin(manifest)
            .run()
            .await?;
        debug!(output = %out.trim(), "kubectl apply");
        Ok(())
    }

    async fn nodes(&self, kubeconfig: &str) -> KubeResult<NodeList> {
        let file = kubeconfig_file(kubeconfig).map_err(KubeError::Kubeconfig)?;
        let out = self
            .command(&file)
            .args(["get", "nodes", "-o", "json"])
            .run()
            .await?;
        Ok(serde_json::from_str(&out)?)
    }

    async fn namespaces(&self, kubeconfig: &str) -> KubeResult<NamespaceList> {
        let file = kubeconfig_file(kubeconfig).map_err(KubeError::Kubeconfig)?;
        let out = self
            .command(&file)
            .args(["get", "namespaces", "-o", "json"])
            .run()
            .await?;
        Ok(serde_json::from_str(&out)?)
    }

    async fn check_api_server(&self, kubeconfig: &str) -> KubeResult<()> {
        let file = kubeconfig_file(kubeconfig).map_err(KubeError::Kubeconfig)?;
        let out = self.command(&file).arg("cluster-info").run().await?;
        // Output carries terminal colour codes in the middle of the phrase.
        if out.contains("is running")
            && (out.contains("Kubernetes control plane") || out.contains("Kubernetes master"))
        {
            Ok(())
        } else {
            Err(KubeError::ApiServerNotReady(out.trim().to_string()))
        }
    }
}
