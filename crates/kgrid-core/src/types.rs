//! Grid, cluster and application manifests.
//!
//! Manifests are Kubernetes-style YAML documents (`apiVersion`, `kind`,
//! `metadata.name`, `spec`). On the wire a cluster entry keeps the
//! `{eks: {newCluster: …}}` / `{eks: {existingCluster: …}}` shape; in memory it
//! is a closed sum type so every provider is matched exhaustively.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::value::ValueOrValueFrom;

/// KOTS release used when an application manifest does not pin one.
pub const DEFAULT_KOTS_VERSION: &str = "v1.27.0";

/// License server used when an application manifest has no endpoint.
pub const DEFAULT_LICENSE_ENDPOINT: &str = "https://replicated.app";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("cluster entry has no supported provider")]
    UnknownProvider,
    #[error("eks cluster must have exactly one of newCluster or existingCluster")]
    AmbiguousEks,
    #[error("application has no supported installer")]
    NoInstaller,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest<S> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default)]
    metadata: ObjectMeta,
    spec: S,
}

// ── Grid ───────────────────────────────────────────────────────────

/// The desired state of a grid: a name and an ordered list of clusters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSpec {
    pub name: String,
    pub clusters: Vec<ClusterSpec>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GridBody {
    #[serde(default)]
    clusters: Vec<ClusterSpec>,
}

impl GridSpec {
    pub fn new(name: impl Into<String>, clusters: Vec<ClusterSpec>) -> Self {
        Self {
            name: name.into(),
            clusters,
        }
    }

    /// Parse a `kind: Grid` manifest.
    pub fn from_yaml(content: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest<GridBody> = serde_yaml::from_str(content)?;
        Ok(Self {
            name: manifest.metadata.name,
            clusters: manifest.spec.clusters,
        })
    }

    pub fn to_yaml(&self) -> Result<String, ManifestError> {
        let manifest = Manifest {
            api_version: Some("kgrid.io/v1alpha1".to_string()),
            kind: Some("Grid".to_string()),
            metadata: ObjectMeta {
                name: self.name.clone(),
            },
            spec: GridBody {
                clusters: self.clusters.clone(),
            },
        };
        Ok(serde_yaml::to_string(&manifest)?)
    }
}

// ── Clusters ───────────────────────────────────────────────────────

/// One cluster entry of a grid, tagged by provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ClusterSpecWire", into = "ClusterSpecWire")]
pub enum ClusterSpec {
    Eks(EksSpec),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EksSpec {
    /// Attach to a cluster that already exists.
    Existing(EksExistingClusterSpec),
    /// Create a cluster (and the shared network it lives in).
    New(EksNewClusterSpec),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EksExistingClusterSpec {
    pub access_key_id: ValueOrValueFrom,
    pub secret_access_key: ValueOrValueFrom,
    pub cluster_name: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EksNewClusterSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub access_key_id: ValueOrValueFrom,
    pub secret_access_key: ValueOrValueFrom,
    pub region: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterSpecWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    eks: Option<EksSpecWire>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EksSpecWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    existing_cluster: Option<EksExistingClusterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    new_cluster: Option<EksNewClusterSpec>,
}

impl TryFrom<ClusterSpecWire> for ClusterSpec {
    type Error = ManifestError;

    fn try_from(wire: ClusterSpecWire) -> Result<Self, Self::Error> {
        let eks = wire.eks.ok_or(ManifestError::UnknownProvider)?;
        match (eks.existing_cluster, eks.new_cluster) {
            (Some(existing), None) => Ok(ClusterSpec::Eks(EksSpec::Existing(existing))),
            (None, Some(new)) => Ok(ClusterSpec::Eks(EksSpec::New(new))),
            _ => Err(ManifestError::AmbiguousEks),
        }
    }
}

impl From<ClusterSpec> for ClusterSpecWire {
    fn from(spec: ClusterSpec) -> Self {
        match spec {
            ClusterSpec::Eks(EksSpec::Existing(existing)) => ClusterSpecWire {
                eks: Some(EksSpecWire {
                    existing_cluster: Some(existing),
                    new_cluster: None,
                }),
            },
            ClusterSpec::Eks(EksSpec::New(new)) => ClusterSpecWire {
                eks: Some(EksSpecWire {
                    existing_cluster: None,
                    new_cluster: Some(new),
                }),
            },
        }
    }
}

impl ClusterSpec {
    /// Name used in logs and aggregated errors.
    ///
    /// A described new cluster reads `description (grid-…)` so the physical
    /// name is always present.
    pub fn display_name(&self) -> String {
        match self {
            ClusterSpec::Eks(EksSpec::Existing(existing)) => existing.cluster_name.clone(),
            ClusterSpec::Eks(EksSpec::New(new)) if !new.description.is_empty() => {
                format!("{} ({})", new.description, new.cluster_name())
            }
            ClusterSpec::Eks(EksSpec::New(new)) => new.cluster_name(),
        }
    }

    /// Name of the physical cluster this entry creates, if it creates one.
    pub fn created_cluster_name(&self) -> Option<String> {
        match self {
            ClusterSpec::Eks(EksSpec::New(new)) => Some(new.cluster_name()),
            ClusterSpec::Eks(EksSpec::Existing(_)) => None,
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            ClusterSpec::Eks(_) => "aws",
        }
    }
}

impl EksNewClusterSpec {
    /// Deterministic physical name derived from description, region and version.
    ///
    /// Re-submitting the same spec yields the same name, so a create that
    /// failed half way can be re-run against the resources it left behind.
    pub fn cluster_name(&self) -> String {
        let seed = format!(
            "{}-{}-{}",
            self.description,
            self.region,
            self.version.as_deref().unwrap_or("")
        );
        let digest = Sha256::digest(seed.as_bytes());
        format!("grid-{}", &hex::encode(digest)[..32])
    }
}

// ── Applications ───────────────────────────────────────────────────

/// An application to install on every cluster of a grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationSpec {
    pub name: String,
    pub kots: KotsApplicationSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KotsApplicationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub app: String,
    #[serde(rename = "licenseID")]
    pub license_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub skip_preflights: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Free-form config values, rendered into a `ConfigValues` document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_values: Option<serde_yaml::Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ApplicationBody {
    #[serde(default)]
    kots: Option<KotsApplicationSpec>,
}

impl ApplicationSpec {
    /// Parse a `kind: Application` manifest.
    pub fn from_yaml(content: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest<ApplicationBody> = serde_yaml::from_str(content)?;
        let kots = manifest.spec.kots.ok_or(ManifestError::NoInstaller)?;
        Ok(Self {
            name: manifest.metadata.name,
            kots,
        })
    }

    pub fn display_name(&self) -> &str {
        &self.kots.app
    }
}

impl KotsApplicationSpec {
    pub fn version(&self) -> &str {
        self.version
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_KOTS_VERSION)
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .filter(|e| !e.is_empty())
            .unwrap_or(DEFAULT_LICENSE_ENDPOINT)
    }

    /// Target namespace; defaults to the app slug.
    pub fn namespace(&self) -> &str {
        self.namespace
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRID: &str = r#"
apiVersion: kgrid.io/v1alpha1
kind: Grid
metadata:
  name: matrix
spec:
  clusters:
    - eks:
        newCluster:
          description: eks 1.18 us-west
          version: "1.18"
          region: us-west-1
          accessKeyId:
            valueFrom:
              osEnv: AWS_ACCESS_KEY_ID
          secretAccessKey:
            valueFrom:
              osEnv: AWS_SECRET_ACCESS_KEY
    - eks:
        existingCluster:
          clusterName: shared
          region: us-east-1
          accessKeyId:
            value: AKIA
          secretAccessKey:
            value: secret
"#;

    fn new_cluster(description: &str, region: &str, version: Option<&str>) -> EksNewClusterSpec {
        EksNewClusterSpec {
            description: description.to_string(),
            version: version.map(str::to_string),
            access_key_id: ValueOrValueFrom::literal("a"),
            secret_access_key: ValueOrValueFrom::literal("b"),
            region: region.to_string(),
        }
    }

    #[test]
    fn parses_grid_manifest() {
        let grid = GridSpec::from_yaml(GRID).unwrap();
        assert_eq!(grid.name, "matrix");
        assert_eq!(grid.clusters.len(), 2);
        assert!(matches!(grid.clusters[0], ClusterSpec::Eks(EksSpec::New(_))));
        match &grid.clusters[1] {
            ClusterSpec::Eks(EksSpec::Existing(existing)) => {
                assert_eq!(existing.cluster_name, "shared");
                assert_eq!(existing.region, "us-east-1");
            }
            other => panic!("expected existing cluster, got {other:?}"),
        }
    }

    #[test]
    fn grid_manifest_survives_reserialization() {
        let grid = GridSpec::from_yaml(GRID).unwrap();
        let again = GridSpec::from_yaml(&grid.to_yaml().unwrap()).unwrap();
        assert_eq!(grid, again);
    }

    #[test]
    fn rejects_entry_without_provider() {
        let yaml = "metadata:\n  name: g\nspec:\n  clusters:\n    - {}\n";
        let err = GridSpec::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("no supported provider"), "{err}");
    }

    #[test]
    fn rejects_eks_with_both_variants() {
        let yaml = r#"
metadata:
  name: g
spec:
  clusters:
    - eks:
        existingCluster:
          clusterName: a
          region: r
          accessKeyId: {value: a}
          secretAccessKey: {value: b}
        newCluster:
          region: r
          accessKeyId: {value: a}
          secretAccessKey: {value: b}
"#;
        let err = GridSpec::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("exactly one"), "{err}");
    }

    #[test]
    fn derived_name_is_deterministic() {
        let a = new_cluster("desc", "us-west-1", Some("1.18"));
        let b = new_cluster("desc", "us-west-1", Some("1.18"));
        assert_eq!(a.cluster_name(), b.cluster_name());
        assert!(a.cluster_name().starts_with("grid-"));
        assert_eq!(a.cluster_name().len(), "grid-".len() + 32);
    }

    #[test]
    fn derived_name_changes_with_each_field() {
        let base = new_cluster("desc", "us-west-1", Some("1.18")).cluster_name();
        assert_ne!(base, new_cluster("other", "us-west-1", Some("1.18")).cluster_name());
        assert_ne!(base, new_cluster("desc", "us-east-1", Some("1.18")).cluster_name());
        assert_ne!(base, new_cluster("desc", "us-west-1", Some("1.19")).cluster_name());
        assert_ne!(base, new_cluster("desc", "us-west-1", None).cluster_name());
    }

    #[test]
    fn display_name_falls_back_to_derived_name() {
        let spec = ClusterSpec::Eks(EksSpec::New(new_cluster("", "us-west-1", None)));
        assert_eq!(spec.display_name(), spec.created_cluster_name().unwrap());
    }

    #[test]
    fn display_name_carries_description_and_derived_name() {
        let new = new_cluster("nightly east", "us-east-1", None);
        let name = new.cluster_name();
        let spec = ClusterSpec::Eks(EksSpec::New(new));
        assert_eq!(spec.display_name(), format!("nightly east ({name})"));
    }

    #[test]
    fn parses_application_manifest() {
        let yaml = r#"
apiVersion: kgrid.io/v1alpha1
kind: Application
metadata:
  name: sentry
spec:
  kots:
    app: sentry-pro
    licenseID: abc123
    skipPreflights: true
    configValues:
      hostname:
        value: example.com
"#;
        let app = ApplicationSpec::from_yaml(yaml).unwrap();
        assert_eq!(app.display_name(), "sentry-pro");
        assert_eq!(app.kots.namespace(), "sentry-pro");
        assert_eq!(app.kots.version(), DEFAULT_KOTS_VERSION);
        assert_eq!(app.kots.endpoint(), DEFAULT_LICENSE_ENDPOINT);
        assert!(app.kots.skip_preflights);
        assert!(app.kots.config_values.is_some());
    }

    #[test]
    fn application_without_installer_is_rejected() {
        let err = ApplicationSpec::from_yaml("metadata:\n  name: x\nspec: {}\n").unwrap_err();
        assert!(matches!(err, ManifestError::NoInstaller));
    }
}
