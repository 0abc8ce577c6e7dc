//! Persisted records: the grids document and the clusters inside it.

use serde::{Deserialize, Serialize};

/// The whole store: every grid known to this config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GridsDocument {
    #[serde(default)]
    pub grids: Vec<GridRecord>,
}

/// A named grid and the clusters that were successfully provisioned into it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GridRecord {
    pub name: String,
    #[serde(default)]
    pub clusters: Vec<ClusterRecord>,
}

/// The realized state of one cluster. Written once, removed with its grid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRecord {
    pub name: String,
    /// Cloud provider, currently always `aws`.
    pub provider: String,
    /// True when the cluster was attached to rather than created.
    pub is_existing: bool,
    pub region: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Kubeconfig sufficient to address the cluster.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kubeconfig: String,
}

impl GridsDocument {
    pub fn grid(&self, name: &str) -> Option<&GridRecord> {
        self.grids.iter().find(|g| g.name == name)
    }

    pub fn grid_mut(&mut self, name: &str) -> Option<&mut GridRecord> {
        self.grids.iter_mut().find(|g| g.name == name)
    }
}

impl GridRecord {
    /// An empty grid, as inserted before any cluster is provisioned.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clusters: Vec::new(),
        }
    }

    pub fn cluster(&self, name: &str) -> Option<&ClusterRecord> {
        self.clusters.iter().find(|c| c.name == name)
    }
}
