//! In-memory backends for coordinator tests.
//!
//! Cluster entries are told apart by their access key id, which the fakes
//! see on every call through the `AwsContext`.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kgrid_app::{AppError, AppInstaller, AppResult, AppStatus, DiagnosticCollector};
use kgrid_core::{
    ApplicationSpec, ClusterSpec, EksExistingClusterSpec, EksNewClusterSpec, EksSpec, GridSpec,
    KotsApplicationSpec, Timeouts, ValueOrValueFrom,
};
use kgrid_eks::{AwsContext, ClusterInfo, EksApi, EksError, EksResult, NetworkConfig, NodeGroupInfo};
use kgrid_kube::{KubeClient, KubeError, KubeResult, NamespaceList, Node, NodeCondition, NodeList};
use kgrid_orchestrator::Coordinator;
use kgrid_state::{ClusterRecord, GridStore, MemoryStore};

pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        control_plane_active: Duration::from_millis(40),
        control_plane_poll: Duration::from_millis(1),
        api_server_attempts: 3,
        node_ready_attempts: 3,
        node_poll: Duration::from_millis(1),
        node_group_delete_attempts: 3,
        nat_gateway_attempts: 2,
        app_ready: Duration::from_millis(30),
        app_poll: Duration::from_millis(2),
        ..Timeouts::default()
    }
}

pub fn new_cluster(key: &str) -> ClusterSpec {
    ClusterSpec::Eks(EksSpec::New(EksNewClusterSpec {
        description: format!("cluster {key}"),
        version: None,
        access_key_id: ValueOrValueFrom::literal(key),
        secret_access_key: ValueOrValueFrom::literal("secret"),
        region: "us-west-1".to_string(),
    }))
}

pub fn existing_cluster(key: &str, name: &str) -> ClusterSpec {
    ClusterSpec::Eks(EksSpec::Existing(EksExistingClusterSpec {
        access_key_id: ValueOrValueFrom::literal(key),
        secret_access_key: ValueOrValueFrom::literal("secret"),
        cluster_name: name.to_string(),
        region: "us-east-1".to_string(),
    }))
}

pub fn grid(name: &str, keys: &[&str]) -> GridSpec {
    GridSpec::new(name, keys.iter().map(|k| new_cluster(k)).collect())
}

pub fn derived_name(spec: &ClusterSpec) -> String {
    spec.created_cluster_name().unwrap_or_else(|| spec.display_name())
}

pub fn app() -> ApplicationSpec {
    ApplicationSpec {
        name: "sentry".to_string(),
        kots: KotsApplicationSpec {
            version: None,
            app: "sentry-pro".to_string(),
            license_id: "license".to_string(),
            endpoint: None,
            skip_preflights: true,
            namespace: None,
            config_values: None,
        },
    }
}

// ── EKS ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeEks {
    pub calls: AtomicUsize,
    /// Access keys whose network setup fails.
    pub fail_network: HashSet<String>,
    /// Access keys whose network setup takes this long.
    pub delays: HashMap<String, Duration>,
    /// Control planes never leave CREATING.
    pub never_active: bool,
    pub desired_size: u32,
    /// Access keys whose node group delete is rejected.
    pub fail_delete: HashSet<String>,
    /// Delete calls answer NotFound, as if someone tore the cluster down by hand.
    pub not_found_on_delete: AtomicBool,
    pub created: Mutex<Vec<String>>,
    pub deleted_node_groups: Mutex<Vec<String>>,
    pub deleted_clusters: Mutex<Vec<String>>,
    /// Every cluster `delete_cluster` was called for, including NotFound answers.
    pub delete_cluster_calls: Mutex<Vec<String>>,
}

impl FakeEks {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn gone(&self) -> bool {
        self.not_found_on_delete.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EksApi for FakeEks {
    async fn ensure_network(&self, ctx: &AwsContext) -> EksResult<NetworkConfig> {
        self.hit();
        if let Some(delay) = self.delays.get(&ctx.access_key_id) {
            tokio::time::sleep(*delay).await;
        }
        if self.fail_network.contains(&ctx.access_key_id) {
            return Err(EksError::Api {
                operation: "ec2 create-vpc".to_string(),
                code: Some("VpcLimitExceeded".to_string()),
                message: "VpcLimitExceeded".to_string(),
            });
        }
        Ok(NetworkConfig {
            vpc_id: "vpc-1".to_string(),
            private_subnet_ids: vec!["subnet-a".to_string(), "subnet-b".to_string()],
            security_group_ids: vec!["sg-1".to_string()],
            role_arn: "arn:aws:iam::1:role/kgrid/kgrid-eks".to_string(),
            ..Default::default()
        })
    }

    async fn create_control_plane(
        &self,
        _ctx: &AwsContext,
        name: &str,
        _version: &str,
        _network: &NetworkConfig,
    ) -> EksResult<()> {
        self.hit();
        let mut created = self.created.lock().unwrap();
        if created.iter().any(|c| c == name) {
            return Err(EksError::AlreadyExists(name.to_string()));
        }
        created.push(name.to_string());
        Ok(())
    }

    async fn describe_cluster(&self, _ctx: &AwsContext, name: &str) -> EksResult<ClusterInfo> {
        self.hit();
        if self.deleted_clusters.lock().unwrap().iter().any(|c| c == name) {
            return Err(EksError::NotFound(name.to_string()));
        }
        Ok(ClusterInfo {
            name: name.to_string(),
            status: if self.never_active { "CREATING" } else { "ACTIVE" }.to_string(),
            endpoint: format!("https://{name}.eks.example"),
            certificate_authority_data: "Q0E=".to_string(),
        })
    }

    async fn create_node_group(
        &self,
        _ctx: &AwsContext,
        _cluster: &str,
        _network: &NetworkConfig,
    ) -> EksResult<()> {
        self.hit();
        Ok(())
    }

    async fn describe_node_group(
        &self,
        _ctx: &AwsContext,
        cluster: &str,
        node_group: &str,
    ) -> EksResult<NodeGroupInfo> {
        self.hit();
        if self.gone()
            || self
                .deleted_node_groups
                .lock()
                .unwrap()
                .iter()
                .any(|g| g == node_group)
        {
            return Err(EksError::NotFound(format!("{cluster}/{node_group}")));
        }
        Ok(NodeGroupInfo {
            name: node_group.to_string(),
            status: "ACTIVE".to_string(),
            desired_size: self.desired_size,
        })
    }

    async fn delete_node_group(
        &self,
        ctx: &AwsContext,
        cluster: &str,
        node_group: &str,
    ) -> EksResult<()> {
        self.hit();
        if self.fail_delete.contains(&ctx.access_key_id) {
            return Err(EksError::Api {
                operation: "eks delete-nodegroup".to_string(),
                code: Some("AccessDeniedException".to_string()),
                message: "not authorized to perform eks:DeleteNodegroup".to_string(),
            });
        }
        if self.gone() {
            return Err(EksError::NotFound(format!("{cluster}/{node_group}")));
        }
        self.deleted_node_groups
            .lock()
            .unwrap()
            .push(node_group.to_string());
        Ok(())
    }

    async fn delete_cluster(&self, _ctx: &AwsContext, name: &str) -> EksResult<()> {
        self.hit();
        self.delete_cluster_calls.lock().unwrap().push(name.to_string());
        if self.gone() {
            return Err(EksError::NotFound(name.to_string()));
        }
        self.deleted_clusters.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

// ── Kubernetes ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeKube {
    pub ready_nodes: u32,
    pub api_down: bool,
    pub applied: Mutex<Vec<String>>,
}

fn ready_node(i: u32) -> Node {
    let mut node = Node::default();
    node.metadata.name = format!("node-{i}");
    node.status.conditions.push(NodeCondition {
        kind: "Ready".to_string(),
        status: "True".to_string(),
        reason: "KubeletReady".to_string(),
        message: String::new(),
    });
    node
}

#[async_trait]
impl KubeClient for FakeKube {
    async fn apply(&self, _kubeconfig: &str, manifest: &str) -> KubeResult<()> {
        self.applied.lock().unwrap().push(manifest.to_string());
        Ok(())
    }

    async fn nodes(&self, _kubeconfig: &str) -> KubeResult<NodeList> {
        Ok(NodeList {
            items: (0..self.ready_nodes).map(ready_node).collect(),
        })
    }

    async fn namespaces(&self, _kubeconfig: &str) -> KubeResult<NamespaceList> {
        Ok(NamespaceList::default())
    }

    async fn check_api_server(&self, _kubeconfig: &str) -> KubeResult<()> {
        if self.api_down {
            return Err(KubeError::ApiServerNotReady("connection refused".to_string()));
        }
        Ok(())
    }
}

// ── Application ────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeInstaller {
    pub fail_install: HashSet<String>,
    pub never_ready: HashSet<String>,
    pub installs: AtomicUsize,
}

#[async_trait]
impl AppInstaller for FakeInstaller {
    async fn install(&self, cluster: &ClusterRecord, _app: &ApplicationSpec) -> AppResult<()> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        if self.fail_install.contains(&cluster.name) {
            return Err(AppError::BinaryNotFound("kots".to_string()));
        }
        Ok(())
    }

    async fn status(&self, cluster: &ClusterRecord, _app: &ApplicationSpec) -> AppResult<AppStatus> {
        let state = if self.never_ready.contains(&cluster.name) {
            "unavailable"
        } else {
            "ready"
        };
        Ok(AppStatus {
            state: state.to_string(),
            resource_states: Vec::new(),
        })
    }
}

#[derive(Default)]
pub struct FakeDiagnostics {
    pub collected: Mutex<Vec<String>>,
}

#[async_trait]
impl DiagnosticCollector for FakeDiagnostics {
    async fn collect(&self, cluster: &ClusterRecord) -> AppResult<()> {
        // Slow enough that a deploy returning early would miss it.
        tokio::time::sleep(Duration::from_millis(25)).await;
        self.collected.lock().unwrap().push(cluster.name.clone());
        Ok(())
    }
}

// ── Harness ────────────────────────────────────────────────────────

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub eks: Arc<FakeEks>,
    pub kube: Arc<FakeKube>,
    pub installer: Arc<FakeInstaller>,
    pub diagnostics: Arc<FakeDiagnostics>,
    pub coordinator: Coordinator,
}

impl Harness {
    pub fn new(eks: FakeEks, kube: FakeKube, installer: FakeInstaller) -> Self {
        let store = Arc::new(MemoryStore::new());
        let eks = Arc::new(eks);
        let kube = Arc::new(kube);
        let installer = Arc::new(installer);
        let diagnostics = Arc::new(FakeDiagnostics::default());
        let coordinator = Coordinator::new(
            store.clone(),
            eks.clone(),
            kube.clone(),
            installer.clone(),
            diagnostics.clone(),
            fast_timeouts(),
        );
        Self {
            store,
            eks,
            kube,
            installer,
            diagnostics,
            coordinator,
        }
    }

    /// Backends where every cluster comes up with two ready nodes.
    pub fn healthy() -> Self {
        Self::new(
            FakeEks {
                desired_size: 2,
                ..Default::default()
            },
            FakeKube {
                ready_nodes: 2,
                ..Default::default()
            },
            FakeInstaller::default(),
        )
    }

    pub fn cluster_names(&self, grid: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .store
            .get(grid)
            .unwrap()
            .map(|g| g.clusters.into_iter().map(|c| c.name).collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}
