//! Support-bundle diagnostics for clusters whose deployment failed.
//!
//! The bundle is collected with the `support-bundle` CLI and, when S3
//! credentials are present in the environment, uploaded with `aws s3 cp`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use kgrid_core::{CommandSpec, ProcessError, Settings};
use kgrid_kube::kubeconfig_file;
use kgrid_state::ClusterRecord;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::DiagnosticCollector;
use crate::download::{BinaryCache, release_platform};
use crate::error::{AppError, AppResult};

const TROUBLESHOOT_RELEASES: &str =
    "https://github.com/replicatedhq/troubleshoot/releases/latest/download";

/// Spec URI the bundle is collected against.
const BUNDLE_SPEC: &str = "https://kots.io";

/// Why a collected bundle stays on local disk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadSkipped {
    #[error("AWS_S3_BUCKET not set")]
    NoBucket,
    #[error("AWS_S3_ACCESS_KEY_ID and AWS_S3_SECRET_ACCESS_KEY must both be set")]
    NoCredentials,
}

/// Destination and credentials for bundle uploads.
#[derive(Clone, PartialEq, Eq)]
pub struct S3Upload {
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: Option<String>,
    pub test_id: Option<String>,
    pub run_id: Option<String>,
}

impl std::fmt::Debug for S3Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Upload")
            .field("bucket", &self.bucket)
            .field("access_key_id", &"<redacted>")
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .field("test_id", &self.test_id)
            .field("run_id", &self.run_id)
            .finish()
    }
}

impl S3Upload {
    pub fn from_env() -> Result<Self, UploadSkipped> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the upload settings through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, UploadSkipped>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let bucket = get("AWS_S3_BUCKET").ok_or(UploadSkipped::NoBucket)?;
        let (Some(access_key_id), Some(secret_access_key)) =
            (get("AWS_S3_ACCESS_KEY_ID"), get("AWS_S3_SECRET_ACCESS_KEY"))
        else {
            return Err(UploadSkipped::NoCredentials);
        };
        Ok(Self {
            bucket,
            access_key_id,
            secret_access_key,
            region: get("AWS_S3_REGION"),
            test_id: get("TEST_ID"),
            run_id: get("RUN_ID"),
        })
    }

    /// `[RUN_ID/]TEST_ID.tar.gz`, with the cluster name standing in for a missing TEST_ID.
    pub fn key(&self, cluster: &str) -> String {
        let name = self.test_id.as_deref().unwrap_or(cluster);
        match &self.run_id {
            Some(run_id) => format!("{run_id}/{name}.tar.gz"),
            None => format!("{name}.tar.gz"),
        }
    }

    fn command(&self, aws: &Path, archive: &Path, key: &str) -> CommandSpec {
        let mut command = CommandSpec::new(aws)
            .args(["s3", "cp"])
            .arg(archive.display().to_string())
            .arg(format!("s3://{}/{key}", self.bucket))
            .env("AWS_ACCESS_KEY_ID", &self.access_key_id)
            .env("AWS_SECRET_ACCESS_KEY", &self.secret_access_key)
            .env("AWS_PAGER", "");
        if let Some(region) = &self.region {
            command = command.args(["--region", region.as_str()]);
        }
        command
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BundleOutput {
    archive_path: String,
}

/// Archive path printed by `support-bundle`.
pub fn parse_archive_path(output: &str) -> AppResult<PathBuf> {
    let out: BundleOutput = serde_json::from_str(output).map_err(|source| AppError::Output {
        what: "support-bundle",
        source,
    })?;
    Ok(PathBuf::from(out.archive_path))
}

pub fn release_url() -> String {
    format!(
        "{TROUBLESHOOT_RELEASES}/support-bundle_{}.tar.gz",
        release_platform()
    )
}

pub struct SupportBundleCollector {
    binaries: BinaryCache,
    support_bundle: Option<PathBuf>,
    aws: PathBuf,
    bundle_timeout: Duration,
    upload_timeout: Duration,
    upload: Result<S3Upload, UploadSkipped>,
}

impl SupportBundleCollector {
    pub fn from_settings(settings: &Settings) -> AppResult<Self> {
        Ok(Self {
            binaries: BinaryCache::new(reqwest::Client::new())?,
            support_bundle: settings.binaries.support_bundle.clone(),
            aws: settings.binaries.aws.clone(),
            bundle_timeout: settings.timeouts.support_bundle,
            upload_timeout: settings.timeouts.command,
            upload: S3Upload::from_env(),
        })
    }

    pub fn with_upload(mut self, upload: Result<S3Upload, UploadSkipped>) -> Self {
        self.upload = upload;
        self
    }

    async fn binary(&self) -> AppResult<PathBuf> {
        if let Some(path) = &self.support_bundle {
            return Ok(path.clone());
        }
        self.binaries.get(&release_url(), "support-bundle").await
    }

    async fn upload(&self, cluster: &str, archive: &Path) -> AppResult<()> {
        let upload = match &self.upload {
            Ok(upload) => upload,
            Err(reason) => {
                info!(%cluster, archive = %archive.display(), %reason, "not uploading support bundle");
                return Ok(());
            }
        };
        let key = upload.key(cluster);
        upload
            .command(&self.aws, archive, &key)
            .timeout(self.upload_timeout)
            .run()
            .await
            .map_err(AppError::Upload)?;
        info!(%cluster, bucket = %upload.bucket, %key, "uploaded support bundle");
        Ok(())
    }
}

#[async_trait]
impl DiagnosticCollector for SupportBundleCollector {
    async fn collect(&self, cluster: &ClusterRecord) -> AppResult<()> {
        let binary = self.binary().await?;
        let kubeconfig = kubeconfig_file(&cluster.kubeconfig).map_err(|source| {
            AppError::TempFile {
                what: "kubeconfig",
                source,
            }
        })?;
        info!(cluster = %cluster.name, "collecting support bundle");
        let out = CommandSpec::new(&binary)
            .arg(BUNDLE_SPEC)
            .arg("--kubeconfig")
            .arg(kubeconfig.path().display().to_string())
            .arg("--interactive=false")
            .timeout(self.bundle_timeout)
            .run()
            .await
            .inspect_err(|e| {
                if let ProcessError::TimedOut { stdout, .. } = e {
                    warn!(cluster = %cluster.name, stdout = %stdout.trim(), "support-bundle timed out");
                }
            })?;
        let archive = parse_archive_path(&out)?;
        info!(cluster = %cluster.name, archive = %archive.display(), "support bundle collected");
        self.upload(&cluster.name, &archive).await
    }
}
