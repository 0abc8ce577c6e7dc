//! Manifests applied to every freshly created EKS cluster.

/// Reduce an IAM role ARN with a path to `prefix/name`.
///
/// `aws-auth` does not accept role paths, so
/// `arn:aws:iam::123:role/kgrid/kgrid-eks` becomes
/// `arn:aws:iam::123:role/kgrid-eks`.
pub fn strip_role_path(role_arn: &str) -> String {
    let parts: Vec<&str> = role_arn.split('/').collect();
    match parts.as_slice() {
        [first, .., last] if parts.len() > 2 => format!("{first}/{last}"),
        _ => role_arn.to_string(),
    }
}

/// `aws-auth` ConfigMap letting nodes running as `role_arn` join the cluster.
pub fn aws_auth_config_map(role_arn: &str) -> String {
    format!(
        r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: aws-auth
  namespace: kube-system
data:
  mapRoles: |
    - rolearn: {}
      username: system:node:{{{{EC2PrivateDNSName}}}}
      groups:
        - system:bootstrappers
        - system:nodes
"#,
        strip_role_path(role_arn)
    )
}

/// gp2 StorageClass named `default`, for apps that request that class by name.
pub fn default_storage_class() -> &'static str {
    r#"apiVersion: storage.k8s.io/v1
kind: StorageClass
metadata:
  name: default
parameters:
  fsType: ext4
  type: gp2
provisioner: kubernetes.io/aws-ebs
reclaimPolicy: Delete
volumeBindingMode: WaitForFirstConsumer
"#
}
