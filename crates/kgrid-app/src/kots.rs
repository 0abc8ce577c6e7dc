//! `kots` CLI backed [`AppInstaller`].

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use kgrid_core::{ApplicationSpec, CommandSpec, KotsApplicationSpec, ProcessError, Settings};
use kgrid_kube::kubeconfig_file;
use kgrid_state::ClusterRecord;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::download::{BinaryCache, release_platform};
use crate::error::{AppError, AppResult};
use crate::license::{app_slug, download_license};
use crate::{AppInstaller, AppStatus};

const KOTS_RELEASES: &str = "https://github.com/replicatedhq/kots/releases/download";

/// Admin console password set on install. The console is never port-forwarded.
const SHARED_PASSWORD: &str = "password";

pub struct KotsInstaller {
    http: reqwest::Client,
    binaries: BinaryCache,
    kots: Option<PathBuf>,
    install_timeout: Duration,
    status_timeout: Duration,
    slugs: Mutex<HashMap<String, String>>,
}

impl KotsInstaller {
    pub fn from_settings(settings: &Settings) -> AppResult<Self> {
        let http = reqwest::Client::new();
        Ok(Self {
            binaries: BinaryCache::new(http.clone())?,
            http,
            kots: settings.binaries.kots.clone(),
            install_timeout: settings.timeouts.app_install,
            status_timeout: settings.timeouts.app_status,
            slugs: Mutex::new(HashMap::new()),
        })
    }

    /// `kots` for `version`: the configured binary, or the matching release.
    async fn binary(&self, version: &str) -> AppResult<PathBuf> {
        if let Some(path) = &self.kots {
            return Ok(path.clone());
        }
        self.binaries.get(&release_url(version), "kots").await
    }

    async fn license(&self, app: &KotsApplicationSpec) -> AppResult<Vec<u8>> {
        download_license(&self.http, app.endpoint(), &app.app, &app.license_id).await
    }

    /// App slug from the license, fetched once per app and license.
    async fn slug(&self, app: &KotsApplicationSpec) -> AppResult<String> {
        let key = format!("{}|{}|{}", app.endpoint(), app.app, app.license_id);
        if let Some(slug) = self.slugs.lock().await.get(&key) {
            return Ok(slug.clone());
        }
        let slug = app_slug(&self.license(app).await?)?;
        self.slugs.lock().await.insert(key, slug.clone());
        Ok(slug)
    }
}

pub fn release_url(version: &str) -> String {
    format!(
        "{KOTS_RELEASES}/{version}/kots_{}.tar.gz",
        release_platform()
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigValuesDocument<'a> {
    api_version: &'static str,
    kind: &'static str,
    metadata: ConfigValuesMetadata,
    spec: &'a serde_yaml::Value,
}

#[derive(Serialize)]
struct ConfigValuesMetadata {
    name: &'static str,
}

/// Wrap free-form config values in a `kots.io/v1beta1` `ConfigValues` document.
pub fn config_values_document(values: &serde_yaml::Value) -> AppResult<String> {
    serde_yaml::to_string(&ConfigValuesDocument {
        api_version: "kots.io/v1beta1",
        kind: "ConfigValues",
        metadata: ConfigValuesMetadata {
            name: "automated-config-values",
        },
        spec: values,
    })
    .map_err(AppError::ConfigValues)
}

pub fn install_args(
    app: &KotsApplicationSpec,
    license: &Path,
    kubeconfig: &Path,
    config_values: Option<&Path>,
) -> Vec<String> {
    let mut args = vec![
        "install".to_string(),
        app.app.clone(),
        "--namespace".to_string(),
        app.namespace().to_string(),
        "--license-file".to_string(),
        license.display().to_string(),
        "--shared-password".to_string(),
        SHARED_PASSWORD.to_string(),
        "--port-forward=false".to_string(),
        "--kubeconfig".to_string(),
        kubeconfig.display().to_string(),
    ];
    if let Some(path) = config_values {
        args.push("--config-values".to_string());
        args.push(path.display().to_string());
    }
    if app.skip_preflights {
        args.push("--skip-preflights".to_string());
    }
    args
}

pub fn status_args(namespace: &str, slug: &str, kubeconfig: &Path) -> Vec<String> {
    vec![
        "app-status".to_string(),
        "-n".to_string(),
        namespace.to_string(),
        slug.to_string(),
        "--namespace".to_string(),
        namespace.to_string(),
        "--kubeconfig".to_string(),
        kubeconfig.display().to_string(),
    ]
}

#[derive(Debug, Default, Deserialize)]
struct AppStatusOutput {
    #[serde(default)]
    appstatus: AppStatus,
}

pub fn parse_status(output: &str) -> AppResult<AppStatus> {
    let out: AppStatusOutput = serde_json::from_str(output).map_err(|source| AppError::Output {
        what: "kots app-status",
        source,
    })?;
    Ok(out.appstatus)
}

fn write_temp(prefix: &str, what: &'static str, content: &[u8]) -> AppResult<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .tempfile()
        .map_err(|source| AppError::TempFile { what, source })?;
    file.write_all(content)
        .and_then(|_| file.flush())
        .map_err(|source| AppError::TempFile { what, source })?;
    Ok(file)
}

#[async_trait]
impl AppInstaller for KotsInstaller {
    async fn install(&self, cluster: &ClusterRecord, app: &ApplicationSpec) -> AppResult<()> {
        let spec = &app.kots;
        let binary = self.binary(spec.version()).await?;
        let license = write_temp("kgrid-license-", "license", &self.license(spec).await?)?;
        let kubeconfig = kubeconfig_file(&cluster.kubeconfig).map_err(|source| {
            AppError::TempFile {
                what: "kubeconfig",
                source,
            }
        })?;
        let config_values = spec
            .config_values
            .as_ref()
            .map(|values| {
                let doc = config_values_document(values)?;
                write_temp("kgrid-config-values-", "config values", doc.as_bytes())
            })
            .transpose()?;

        let args = install_args(
            spec,
            license.path(),
            kubeconfig.path(),
            config_values.as_ref().map(|f| f.path()),
        );
        info!(cluster = %cluster.name, app = %spec.app, version = %spec.version(), "installing app with kots");
        match CommandSpec::new(&binary)
            .args(args)
            .timeout(self.install_timeout)
            .run()
            .await
        {
            Ok(out) => {
                debug!(cluster = %cluster.name, output = %out.trim(), "kots install finished");
                Ok(())
            }
            // The install may still converge; status polling decides.
            Err(ProcessError::TimedOut { timeout, stdout, .. }) => {
                warn!(
                    cluster = %cluster.name,
                    timeout = ?timeout,
                    stdout = %stdout.trim(),
                    "kots install timed out, checking app status"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn status(&self, cluster: &ClusterRecord, app: &ApplicationSpec) -> AppResult<AppStatus> {
        let spec = &app.kots;
        let binary = self.binary(spec.version()).await?;
        let slug = self.slug(spec).await?;
        let kubeconfig = kubeconfig_file(&cluster.kubeconfig).map_err(|source| {
            AppError::TempFile {
                what: "kubeconfig",
                source,
            }
        })?;
        let out = CommandSpec::new(&binary)
            .args(status_args(spec.namespace(), &slug, kubeconfig.path()))
            .timeout(self.status_timeout)
            .run()
            .await?;
        let status = parse_status(&out)?;
        debug!(cluster = %cluster.name, %slug, state = %status.state, "kots app status");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(config_values: Option<serde_yaml::Value>, skip_preflights: bool) -> KotsApplicationSpec {
        KotsApplicationSpec {
            version: None,
            app: "sentry-pro".to_string(),
            license_id: "lic".to_string(),
            endpoint: None,
            skip_preflights,
            namespace: None,
            config_values,
        }
    }

    #[test]
    fn config_values_are_wrapped() {
        let values: serde_yaml::Value =
            serde_yaml::from_str("values:\n  hostname:\n    value: example.com\n").unwrap();
        let doc = config_values_document(&values).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&doc).unwrap();
        assert_eq!(parsed["apiVersion"], "kots.io/v1beta1");
        assert_eq!(parsed["kind"], "ConfigValues");
        assert_eq!(parsed["metadata"]["name"], "automated-config-values");
        assert_eq!(parsed["spec"]["values"]["hostname"]["value"], "example.com");
    }

    #[test]
    fn install_args_minimal() {
        let args = install_args(
            &app(None, false),
            Path::new("/tmp/license"),
            Path::new("/tmp/kubeconfig"),
            None,
        );
        assert_eq!(
            args,
            [
                "install",
                "sentry-pro",
                "--namespace",
                "sentry-pro",
                "--license-file",
                "/tmp/license",
                "--shared-password",
                "password",
                "--port-forward=false",
                "--kubeconfig",
                "/tmp/kubeconfig",
            ]
        );
    }

    #[test]
    fn install_args_with_optional_flags() {
        let args = install_args(
            &app(Some(serde_yaml::Value::Null), true),
            Path::new("/tmp/license"),
            Path::new("/tmp/kubeconfig"),
            Some(Path::new("/tmp/values")),
        );
        let tail: Vec<&str> = args.iter().rev().take(3).rev().map(String::as_str).collect();
        assert_eq!(tail, ["--config-values", "/tmp/values", "--skip-preflights"]);
    }

    #[test]
    fn status_args_name_namespace_twice() {
        let args = status_args("ns", "my-app", Path::new("/k"));
        assert_eq!(
            args,
            ["app-status", "-n", "ns", "my-app", "--namespace", "ns", "--kubeconfig", "/k"]
        );
    }

    #[test]
    fn parses_app_status() {
        let raw = r#"{"appstatus": {"appId": "1", "state": "ready", "resourceStates": [
            {"kind": "deployment", "name": "web", "namespace": "ns", "state": "ready"}
        ]}}"#;
        let status = parse_status(raw).unwrap();
        assert!(status.is_ready());
        assert_eq!(status.resource_states.len(), 1);

        let missing = parse_status(r#"{"appstatus": {"state": "missing"}}"#).unwrap();
        assert!(!missing.is_ready());
    }

    #[test]
    fn non_json_status_is_an_error() {
        let err = parse_status("error: no app").unwrap_err();
        assert!(err.to_string().starts_with("failed to parse kots app-status output"));
    }

    #[test]
    fn release_url_includes_version() {
        let url = release_url("v1.27.0");
        assert!(url.starts_with("https://github.com/replicatedhq/kots/releases/download/v1.27.0/kots_"));
        assert!(url.ends_with(".tar.gz"));
    }
}
