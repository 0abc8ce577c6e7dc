//! The slice of `kubectl get namespaces -o json` shown by `kgrid get namespaces`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamespaceList {
    #[serde(default)]
    pub items: Vec<Namespace>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Namespace {
    #[serde(default)]
    pub metadata: NamespaceMetadata,
    #[serde(default)]
    pub status: NamespaceStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub creation_timestamp: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamespaceStatus {
    #[serde(default)]
    pub phase: String,
}

impl NamespaceList {
    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(|ns| ns.metadata.name.as_str()).collect()
    }
}
