//! The `EksApi` seam and the values that cross it.

use std::fmt;

use async_trait::async_trait;
use kgrid_core::{ValueError, ValueOrValueFrom};

use crate::error::EksResult;

/// Static credentials and region for one cluster entry.
#[derive(Clone, PartialEq, Eq)]
pub struct AwsContext {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

impl AwsContext {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
        }
    }

    /// Resolve both key halves from manifest values.
    pub fn resolve(
        access_key_id: &ValueOrValueFrom,
        secret_access_key: &ValueOrValueFrom,
        region: &str,
    ) -> Result<Self, CredentialError> {
        let access_key_id = access_key_id.resolve().map_err(CredentialError::AccessKeyId)?;
        let secret_access_key = secret_access_key
            .resolve()
            .map_err(CredentialError::SecretAccessKey)?;
        Ok(Self::new(access_key_id, secret_access_key, region))
    }
}

impl fmt::Debug for AwsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsContext")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("failed to read access key id: {0}")]
    AccessKeyId(ValueError),
    #[error("failed to read secret access key: {0}")]
    SecretAccessKey(ValueError),
}

/// The shared network every kgrid cluster in an account/region is placed in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkConfig {
    pub vpc_id: String,
    pub internet_gateway_id: String,
    pub security_group_ids: Vec<String>,
    pub private_subnet_ids: Vec<String>,
    pub public_subnet_id: String,
    pub eip_allocation_id: String,
    pub nat_gateway_id: String,
    /// IAM role used by both the control plane and the node group.
    pub role_arn: String,
}

/// The parts of `DescribeCluster` kgrid consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    pub name: String,
    pub status: String,
    pub endpoint: String,
    /// Base64-encoded CA bundle, passed through to the kubeconfig as-is.
    pub certificate_authority_data: String,
}

impl ClusterInfo {
    pub fn is_active(&self) -> bool {
        self.status == "ACTIVE"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGroupInfo {
    pub name: String,
    pub status: String,
    pub desired_size: u32,
}

/// Cloud operations needed to create, attach to and tear down EKS clusters.
///
/// Creation calls report an existing resource as
/// [`EksError::AlreadyExists`](crate::EksError::AlreadyExists) and deletion
/// calls report a missing one as [`EksError::NotFound`](crate::EksError::NotFound);
/// callers decide whether those are failures.
#[async_trait]
pub trait EksApi: Send + Sync {
    /// Find or create the tagged VPC, gateways, subnets, route tables and IAM role.
    async fn ensure_network(&self, ctx: &AwsContext) -> EksResult<NetworkConfig>;

    async fn create_control_plane(
        &self,
        ctx: &AwsContext,
        name: &str,
        version: &str,
        network: &NetworkConfig,
    ) -> EksResult<()>;

    async fn describe_cluster(&self, ctx: &AwsContext, name: &str) -> EksResult<ClusterInfo>;

    /// Create the node group for `cluster`. The node group shares the cluster's name.
    async fn create_node_group(
        &self,
        ctx: &AwsContext,
        cluster: &str,
        network: &NetworkConfig,
    ) -> EksResult<()>;

    async fn describe_node_group(
        &self,
        ctx: &AwsContext,
        cluster: &str,
        node_group: &str,
    ) -> EksResult<NodeGroupInfo>;

    async fn delete_node_group(
        &self,
        ctx: &AwsContext,
        cluster: &str,
        node_group: &str,
    ) -> EksResult<()>;

    async fn delete_cluster(&self, ctx: &AwsContext, name: &str) -> EksResult<()>;
}
