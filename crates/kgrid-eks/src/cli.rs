//! `aws` CLI backed [`EksApi`].
//!
//! Each call runs `aws <service> <operation> ... --region R --output json`
//! with the entry's key pair in the child environment, then decodes the JSON
//! response. Failures are classified by the AWS error code printed on stderr.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use kgrid_core::{CommandSpec, Settings};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::api::{AwsContext, ClusterInfo, EksApi, NetworkConfig, NodeGroupInfo};
use crate::error::{EksError, EksResult};

pub struct AwsCli {
    binary: PathBuf,
    /// Serializes network ensure so workers in one process never race to create the same VPC.
    network_lock: tokio::sync::Mutex<()>,
    command_timeout: Duration,
    pub(crate) nat_gateway_attempts: u32,
    pub(crate) poll: Duration,
}

impl AwsCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            network_lock: tokio::sync::Mutex::new(()),
            command_timeout: Duration::from_secs(120),
            nat_gateway_attempts: 10,
            poll: Duration::from_secs(10),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            binary: settings.binaries.aws.clone(),
            network_lock: tokio::sync::Mutex::new(()),
            command_timeout: settings.timeouts.command,
            nat_gateway_attempts: settings.timeouts.nat_gateway_attempts,
            poll: settings.timeouts.node_poll,
        }
    }

    pub fn with_poll(mut self, poll: Duration, nat_gateway_attempts: u32) -> Self {
        self.poll = poll;
        self.nat_gateway_attempts = nat_gateway_attempts;
        self
    }

    fn command(&self, ctx: &AwsContext, service: &str, operation: &str, args: &[String]) -> CommandSpec {
        CommandSpec::new(&self.binary)
            .arg(service)
            .arg(operation)
            .args(args.iter().cloned())
            .args(["--region", ctx.region.as_str(), "--output", "json"])
            .env("AWS_ACCESS_KEY_ID", &ctx.access_key_id)
            .env("AWS_SECRET_ACCESS_KEY", &ctx.secret_access_key)
            .env("AWS_DEFAULT_REGION", &ctx.region)
            .env("AWS_PAGER", "")
            .timeout(self.command_timeout)
    }

    /// Run an operation and decode its JSON response.
    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        ctx: &AwsContext,
        service: &str,
        operation: &str,
        args: &[String],
    ) -> EksResult<T> {
        let label = format!("{service} {operation}");
        let stdout = self
            .command(ctx, service, operation, args)
            .run()
            .await
            .map_err(|e| EksError::from_process(&label, e))?;
        serde_json::from_str(&stdout).map_err(|source| EksError::Parse {
            operation: label,
            source,
        })
    }

    /// Run an operation whose response is not needed.
    pub(crate) async fn call_unit(
        &self,
        ctx: &AwsContext,
        service: &str,
        operation: &str,
        args: &[String],
    ) -> EksResult<()> {
        let label = format!("{service} {operation}");
        self.command(ctx, service, operation, args)
            .run()
            .await
            .map_err(|e| EksError::from_process(&label, e))?;
        Ok(())
    }
}

/// Idempotency token for `CreateCluster`, stable per cluster name.
pub fn client_request_token(cluster: &str) -> String {
    let digest = Sha256::digest(cluster.as_bytes());
    format!("kgrid-{}", &hex::encode(digest)[..32])
}

pub(crate) fn strings<const N: usize>(args: [&str; N]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

// ── EKS responses ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DescribeClusterOutput {
    cluster: ClusterOut,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterOut {
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    certificate_authority: Option<CertificateAuthorityOut>,
}

#[derive(Debug, Deserialize)]
struct CertificateAuthorityOut {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DescribeNodegroupOutput {
    nodegroup: NodegroupOut,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodegroupOut {
    nodegroup_name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    scaling_config: Option<ScalingConfigOut>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScalingConfigOut {
    #[serde(default)]
    desired_size: Option<u32>,
}

impl From<ClusterOut> for ClusterInfo {
    fn from(out: ClusterOut) -> Self {
        ClusterInfo {
            name: out.name,
            status: out.status,
            endpoint: out.endpoint.unwrap_or_default(),
            certificate_authority_data: out
                .certificate_authority
                .and_then(|ca| ca.data)
                .unwrap_or_default(),
        }
    }
}

impl From<NodegroupOut> for NodeGroupInfo {
    fn from(out: NodegroupOut) -> Self {
        NodeGroupInfo {
            name: out.nodegroup_name,
            status: out.status,
            desired_size: out
                .scaling_config
                .and_then(|s| s.desired_size)
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl EksApi for AwsCli {
    async fn ensure_network(&self, ctx: &AwsContext) -> EksResult<NetworkConfig> {
        let _guard = self.network_lock.lock().await;
        self.ensure_vpc(ctx).await
    }

    async fn create_control_plane(
        &self,
        ctx: &AwsContext,
        name: &str,
        version: &str,
        network: &NetworkConfig,
    ) -> EksResult<()> {
        let vpc_config = format!(
            "subnetIds={},securityGroupIds={}",
            network.private_subnet_ids.join(","),
            network.security_group_ids.join(",")
        );
        let args = vec![
            "--name".to_string(),
            name.to_string(),
            "--role-arn".to_string(),
            network.role_arn.clone(),
            "--kubernetes-version".to_string(),
            version.to_string(),
            "--resources-vpc-config".to_string(),
            vpc_config,
            "--client-request-token".to_string(),
            client_request_token(name),
        ];
        self.call_unit(ctx, "eks", "create-cluster", &args).await?;
        info!(cluster = %name, %version, region = %ctx.region, "eks control plane requested");
        Ok(())
    }

    async fn describe_cluster(&self, ctx: &AwsContext, name: &str) -> EksResult<ClusterInfo> {
        let out: DescribeClusterOutput = self
            .call(ctx, "eks", "describe-cluster", &strings(["--name", name]))
            .await?;
        let info = ClusterInfo::from(out.cluster);
        debug!(cluster = %name, status = %info.status, "described eks cluster");
        Ok(info)
    }

    async fn create_node_group(
        &self,
        ctx: &AwsContext,
        cluster: &str,
        network: &NetworkConfig,
    ) -> EksResult<()> {
        let mut args = strings([
            "--cluster-name",
            cluster,
            "--nodegroup-name",
            cluster,
            "--node-role",
            network.role_arn.as_str(),
            "--subnets",
        ]);
        args.extend(network.private_subnet_ids.iter().cloned());
        self.call_unit(ctx, "eks", "create-nodegroup", &args).await?;
        info!(%cluster, "eks node group requested");
        Ok(())
    }

    async fn describe_node_group(
        &self,
        ctx: &AwsContext,
        cluster: &str,
        node_group: &str,
    ) -> EksResult<NodeGroupInfo> {
        let out: DescribeNodegroupOutput = self
            .call(
                ctx,
                "eks",
                "describe-nodegroup",
                &strings(["--cluster-name", cluster, "--nodegroup-name", node_group]),
            )
            .await?;
        Ok(out.nodegroup.into())
    }

    async fn delete_node_group(
        &self,
        ctx: &AwsContext,
        cluster: &str,
        node_group: &str,
    ) -> EksResult<()> {
        self.call_unit(
            ctx,
            "eks",
            "delete-nodegroup",
            &strings(["--cluster-name", cluster, "--nodegroup-name", node_group]),
        )
        .await
    }

    async fn delete_cluster(&self, ctx: &AwsContext, name: &str) -> EksResult<()> {
        self.call_unit(ctx, "eks", "delete-cluster", &strings(["--name", name]))
            .await
    }
}
