//! Kubeconfig rendering for EKS clusters.

use serde_json::json;

use crate::api::{AwsContext, ClusterInfo};
use crate::error::{EksError, EksResult};

/// Render a kubeconfig that authenticates through `aws eks get-token`.
///
/// The exec plugin carries the same key pair used to provision the cluster,
/// so the kubeconfig works without any ambient AWS profile.
pub fn render_kubeconfig(cluster: &ClusterInfo, ctx: &AwsContext) -> EksResult<String> {
    let doc = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{
            "name": "kubernetes",
            "cluster": {
                "server": cluster.endpoint,
                "certificate-authority-data": cluster.certificate_authority_data,
            },
        }],
        "contexts": [{
            "name": "aws",
            "context": { "cluster": "kubernetes", "user": "aws" },
        }],
        "current-context": "aws",
        "preferences": {},
        "users": [{
            "name": "aws",
            "user": {
                "exec": {
                    "apiVersion": "client.authentication.k8s.io/v1beta1",
                    "command": "aws",
                    "args": [
                        "eks", "get-token",
                        "--cluster-name", cluster.name,
                        "--region", ctx.region,
                    ],
                    "env": [
                        { "name": "AWS_ACCESS_KEY_ID", "value": ctx.access_key_id },
                        { "name": "AWS_SECRET_ACCESS_KEY", "value": ctx.secret_access_key },
                    ],
                },
            },
        }],
    });
    serde_yaml::to_string(&doc).map_err(|e| EksError::Kubeconfig(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kubeconfig_points_at_cluster() {
        let cluster = ClusterInfo {
            name: "grid-abc".to_string(),
            status: "ACTIVE".to_string(),
            endpoint: "https://ABC.gr7.us-west-1.eks.amazonaws.com".to_string(),
            certificate_authority_data: "LS0tLS1CRUdJTg==".to_string(),
        };
        let ctx = AwsContext::new("AKIA", "secret", "us-west-1");

        let rendered = render_kubeconfig(&cluster, &ctx).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&rendered).unwrap();

        assert_eq!(doc["current-context"].as_str(), Some("aws"));
        assert_eq!(
            doc["clusters"][0]["cluster"]["server"].as_str(),
            Some("https://ABC.gr7.us-west-1.eks.amazonaws.com")
        );
        assert_eq!(
            doc["clusters"][0]["cluster"]["certificate-authority-data"].as_str(),
            Some("LS0tLS1CRUdJTg==")
        );

        let exec = &doc["users"][0]["user"]["exec"];
        assert_eq!(exec["command"].as_str(), Some("aws"));
        let args: Vec<&str> = exec["args"]
            .as_sequence()
            .unwrap()
            .iter()
            .filter_map(|a| a.as_str())
            .collect();
        assert_eq!(
            args,
            ["eks", "get-token", "--cluster-name", "grid-abc", "--region", "us-west-1"]
        );
        assert_eq!(exec["env"][0]["value"].as_str(), Some("AKIA"));
        assert_eq!(exec["env"][1]["value"].as_str(), Some("secret"));
    }
}
