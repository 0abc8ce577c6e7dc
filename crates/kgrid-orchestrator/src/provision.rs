//! Per-cluster pipelines run by create and delete workers.
//!
//! Every step error becomes the worker's failure message, prefixed with the
//! step that failed.

use kgrid_core::{ClusterSpec, EksExistingClusterSpec, EksNewClusterSpec, EksSpec};
use kgrid_eks::{AwsContext, ClusterInfo, DEFAULT_EKS_VERSION, render_kubeconfig};
use kgrid_kube::{aws_auth_config_map, default_storage_class};
use kgrid_state::ClusterRecord;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::coordinator::Coordinator;

type StepResult<T> = Result<T, String>;

impl Coordinator {
    pub(crate) async fn create_cluster(&self, grid: &str, spec: &ClusterSpec) -> StepResult<()> {
        match spec {
            ClusterSpec::Eks(EksSpec::Existing(existing)) => {
                self.attach_existing_eks(grid, spec.provider(), existing).await
            }
            ClusterSpec::Eks(EksSpec::New(new)) => {
                self.create_new_eks(grid, spec.provider(), new).await
            }
        }
    }

    async fn attach_existing_eks(
        &self,
        grid: &str,
        provider: &str,
        spec: &EksExistingClusterSpec,
    ) -> StepResult<()> {
        let ctx = AwsContext::resolve(&spec.access_key_id, &spec.secret_access_key, &spec.region)
            .map_err(|e| e.to_string())?;
        let cluster = self
            .eks
            .describe_cluster(&ctx, &spec.cluster_name)
            .await
            .map_err(|e| format!("failed to get eks cluster: {e}"))?;
        let kubeconfig = render_kubeconfig(&cluster, &ctx)
            .map_err(|e| format!("failed to get kubeconfig from eks cluster: {e}"))?;

        self.store
            .append_cluster(
                grid,
                ClusterRecord {
                    name: spec.cluster_name.clone(),
                    provider: provider.to_string(),
                    is_existing: true,
                    region: spec.region.clone(),
                    version: String::new(),
                    description: String::new(),
                    kubeconfig,
                },
            )
            .map_err(|e| format!("failed to update grid config: {e}"))?;
        info!(%grid, cluster = %spec.cluster_name, "existing eks cluster attached");
        Ok(())
    }

    async fn create_new_eks(
        &self,
        grid: &str,
        provider: &str,
        spec: &EksNewClusterSpec,
    ) -> StepResult<()> {
        let name = spec.cluster_name();
        let version = spec
            .version
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_EKS_VERSION);
        let ctx = AwsContext::resolve(&spec.access_key_id, &spec.secret_access_key, &spec.region)
            .map_err(|e| e.to_string())?;
        info!(%grid, cluster = %name, region = %spec.region, %version, "creating eks cluster");

        let network = self
            .eks
            .ensure_network(&ctx)
            .await
            .map_err(|e| format!("failed to ensure vpc: {e}"))?;

        match self.eks.create_control_plane(&ctx, &name, version, &network).await {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => info!(cluster = %name, "eks cluster already exists"),
            Err(e) => return Err(format!("failed to create eks cluster: {e}")),
        }
        let cluster = self.wait_control_plane_active(&ctx, &name).await?;

        match self.eks.create_node_group(&ctx, &name, &network).await {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => info!(cluster = %name, "node group already exists"),
            Err(e) => return Err(format!("failed to create eks node group: {e}")),
        }
        let node_group = self
            .eks
            .describe_node_group(&ctx, &name, &name)
            .await
            .map_err(|e| format!("failed to describe eks node group: {e}"))?;

        let kubeconfig = render_kubeconfig(&cluster, &ctx)
            .map_err(|e| format!("failed to get kubeconfig from eks cluster: {e}"))?;
        self.store
            .append_cluster(
                grid,
                ClusterRecord {
                    name: name.clone(),
                    provider: provider.to_string(),
                    is_existing: false,
                    region: spec.region.clone(),
                    version: version.to_string(),
                    description: spec.description.clone(),
                    kubeconfig: kubeconfig.clone(),
                },
            )
            .map_err(|e| format!("failed to update grid config: {e}"))?;

        self.wait_api_server(&kubeconfig).await?;
        self.kube
            .apply(&kubeconfig, &aws_auth_config_map(&network.role_arn))
            .await
            .map_err(|e| format!("failed to apply aws-auth configmap: {e}"))?;
        self.kube
            .apply(&kubeconfig, default_storage_class())
            .await
            .map_err(|e| format!("failed to create default storage class: {e}"))?;
        self.wait_nodes(&kubeconfig, node_group.desired_size).await?;

        info!(%grid, cluster = %name, "eks cluster ready");
        Ok(())
    }

    async fn wait_control_plane_active(&self, ctx: &AwsContext, name: &str) -> StepResult<ClusterInfo> {
        let deadline = Instant::now() + self.timeouts.control_plane_active;
        loop {
            let cluster = self
                .eks
                .describe_cluster(ctx, name)
                .await
                .map_err(|e| format!("error checking cluster status: {e}"))?;
            if cluster.is_active() {
                return Ok(cluster);
            }
            debug!(cluster = %name, status = %cluster.status, "waiting for control plane");
            if Instant::now() >= deadline {
                return Err("timed out waiting for control plane to become active".to_string());
            }
            sleep(self.timeouts.control_plane_poll).await;
        }
    }

    async fn wait_api_server(&self, kubeconfig: &str) -> StepResult<()> {
        let mut last_error = String::new();
        for attempt in 1..=self.timeouts.api_server_attempts {
            match self.kube.check_api_server(kubeconfig).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(attempt, error = %e, "api server not reachable yet");
                    last_error = e.to_string();
                }
            }
            sleep(self.timeouts.node_poll).await;
        }
        Err(format!(
            "timed out waiting for api server, last error: {last_error}"
        ))
    }

    async fn wait_nodes(&self, kubeconfig: &str, desired: u32) -> StepResult<()> {
        let mut last_error = String::from("none");
        for attempt in 1..=self.timeouts.node_ready_attempts {
            match self.kube.nodes(kubeconfig).await {
                Ok(nodes) if nodes.all_ready(desired) => return Ok(()),
                Ok(nodes) => debug!(
                    attempt,
                    nodes = nodes.items.len(),
                    ready = nodes.ready_count(),
                    desired,
                    "waiting for nodes"
                ),
                Err(e) => last_error = e.to_string(),
            }
            sleep(self.timeouts.node_poll).await;
        }
        Err(format!("timed out waiting for nodes, last error: {last_error}"))
    }

    /// Delete the node group, wait for it to go, then delete the control plane.
    pub(crate) async fn delete_cluster(&self, ctx: &AwsContext, name: &str) -> StepResult<()> {
        info!(cluster = %name, "deleting node group (this may take a few minutes)");
        match self.eks.delete_node_group(ctx, name, name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!(cluster = %name, "node group already gone"),
            Err(e) => return Err(format!("failed to delete node group: {e}")),
        }
        self.wait_node_group_gone(ctx, name).await?;

        info!(cluster = %name, "deleting eks cluster");
        match self.eks.delete_cluster(ctx, name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(format!("failed to delete cluster: {e}")),
        }
    }

    async fn wait_node_group_gone(&self, ctx: &AwsContext, name: &str) -> StepResult<()> {
        for _ in 0..self.timeouts.node_group_delete_attempts {
            match self.eks.describe_node_group(ctx, name, name).await {
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(format!("failed to describe node group: {e}")),
                Ok(group) => debug!(cluster = %name, status = %group.status, "waiting for node group delete"),
            }
            sleep(self.timeouts.node_poll).await;
        }
        Err("timed out waiting for node group to be deleted".to_string())
    }
}
