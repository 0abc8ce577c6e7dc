//! The slice of `kubectl get nodes -o json` that readiness checks need.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct NodeList {
    #[serde(default)]
    pub items: Vec<Node>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Node {
    #[serde(default)]
    pub metadata: NodeMetadata,
    #[serde(default)]
    pub status: NodeStatus,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct NodeMetadata {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct NodeStatus {
    #[serde(default)]
    pub conditions: Vec<NodeCondition>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

impl Node {
    /// True when the node reports `Ready=True`.
    pub fn is_ready(&self) -> bool {
        self.status
            .conditions
            .iter()
            .any(|c| c.kind == "Ready" && c.status == "True")
    }
}

impl NodeList {
    pub fn ready_count(&self) -> usize {
        self.items.iter().filter(|n| n.is_ready()).count()
    }

    /// True when exactly `desired` nodes exist and every one of them is Ready.
    pub fn all_ready(&self, desired: u32) -> bool {
        self.items.len() == desired as usize && self.ready_count() == self.items.len()
    }
}
