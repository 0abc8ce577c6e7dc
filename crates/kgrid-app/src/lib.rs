//! kgrid-app — putting an application on a cluster and finding out why it failed.
//!
//! # Components
//!
//! - **`kots`** — [`KotsInstaller`], the [`AppInstaller`] that drives the `kots` CLI
//! - **`support_bundle`** — [`SupportBundleCollector`], the [`DiagnosticCollector`]
//!   that runs `support-bundle` and uploads the archive to S3
//! - **`download`** — release tarball download and in-memory extraction
//! - **`license`** — license download and app slug derivation

pub mod download;
pub mod error;
pub mod kots;
pub mod license;
pub mod support_bundle;

use async_trait::async_trait;
use kgrid_core::ApplicationSpec;
use kgrid_state::ClusterRecord;
use serde::{Deserialize, Serialize};

pub use error::{AppError, AppResult};
pub use kots::KotsInstaller;
pub use support_bundle::{S3Upload, SupportBundleCollector, UploadSkipped};

/// Application state as reported by the installer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStatus {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub resource_states: Vec<ResourceState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub state: String,
}

impl AppStatus {
    pub fn is_ready(&self) -> bool {
        self.state == "ready"
    }
}

/// Installs an application onto one cluster and reports its status.
#[async_trait]
pub trait AppInstaller: Send + Sync {
    async fn install(&self, cluster: &ClusterRecord, app: &ApplicationSpec) -> AppResult<()>;

    async fn status(&self, cluster: &ClusterRecord, app: &ApplicationSpec) -> AppResult<AppStatus>;
}

/// Gathers diagnostics from a cluster whose deployment failed.
#[async_trait]
pub trait DiagnosticCollector: Send + Sync {
    async fn collect(&self, cluster: &ClusterRecord) -> AppResult<()>;
}
