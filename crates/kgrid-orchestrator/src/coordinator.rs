//! Coordinator — grid create, delete and app deployment.

use std::sync::Arc;

use kgrid_app::{AppInstaller, DiagnosticCollector};
use kgrid_core::{ApplicationSpec, ClusterSpec, EksSpec, GridSpec, Timeouts};
use kgrid_eks::{AwsContext, EksApi};
use kgrid_kube::KubeClient;
use kgrid_state::{ClusterRecord, GridRecord, GridStore};
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::outcome::{FailurePolicy, MultiError, WorkerOutcome};
use crate::supervisor::{no_followup, supervise};

/// Drives fan-out operations against the backends it is built with.
///
/// Cloning is cheap; every backend sits behind an `Arc`.
#[derive(Clone)]
pub struct Coordinator {
    pub(crate) store: Arc<dyn GridStore>,
    pub(crate) eks: Arc<dyn EksApi>,
    pub(crate) kube: Arc<dyn KubeClient>,
    pub(crate) installer: Arc<dyn AppInstaller>,
    pub(crate) diagnostics: Arc<dyn DiagnosticCollector>,
    pub(crate) timeouts: Timeouts,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn GridStore>,
        eks: Arc<dyn EksApi>,
        kube: Arc<dyn KubeClient>,
        installer: Arc<dyn AppInstaller>,
        diagnostics: Arc<dyn DiagnosticCollector>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            store,
            eks,
            kube,
            installer,
            diagnostics,
            timeouts,
        }
    }

    pub fn store(&self) -> &Arc<dyn GridStore> {
        &self.store
    }

    /// Provision or attach every cluster of `grid`.
    ///
    /// [`FailurePolicy::Aggregate`]: returns once every entry is terminal and
    /// fails with all per-cluster errors if any entry failed. The grid record
    /// keeps the clusters that were persisted.
    pub async fn create(&self, grid: &GridSpec) -> CoordinatorResult<()> {
        if grid.clusters.is_empty() {
            return Err(CoordinatorError::EmptyGrid(grid.name.clone()));
        }
        self.store.add_grid(&grid.name)?;
        info!(grid = %grid.name, clusters = grid.clusters.len(), "creating grid");

        let names = grid.clusters.iter().map(ClusterSpec::display_name).collect();
        let finished = supervise(
            "create cluster",
            names,
            |index| {
                let this = self.clone();
                let grid_name = grid.name.clone();
                let spec = grid.clusters[index].clone();
                async move { WorkerOutcome::from(this.create_cluster(&grid_name, &spec).await) }
            },
            no_followup,
        );
        let errors = finished
            .await
            .map_err(|_| CoordinatorError::SupervisorLost("create"))?;
        FailurePolicy::Aggregate.resolve(errors)?;

        info!(grid = %grid.name, "grid created");
        Ok(())
    }

    /// Tear down the clusters this grid created, then forget the grid.
    ///
    /// [`FailurePolicy::BestEffort`]: teardown failures are logged and the
    /// grid record is removed regardless. Attached clusters are left alone
    /// and an unknown grid is not an error.
    pub async fn delete(&self, grid: &GridSpec) -> CoordinatorResult<()> {
        let Some(record) = self.store.get(&grid.name)? else {
            info!(grid = %grid.name, "grid not found, nothing to delete");
            return Ok(());
        };

        let mut workers = JoinSet::new();
        for spec in &grid.clusters {
            let new = match spec {
                ClusterSpec::Eks(EksSpec::New(new)) => new,
                ClusterSpec::Eks(EksSpec::Existing(existing)) => {
                    debug!(cluster = %existing.cluster_name, "existing cluster is not deleted");
                    continue;
                }
            };
            let name = new.cluster_name();
            let Some(cluster) = record.cluster(&name) else {
                debug!(cluster = %name, "cluster has no record in grid, skipping");
                continue;
            };
            let ctx = match AwsContext::resolve(
                &new.access_key_id,
                &new.secret_access_key,
                &cluster.region,
            ) {
                Ok(ctx) => ctx,
                Err(e) => {
                    warn!(cluster = %name, error = %e, "skipping cluster delete");
                    continue;
                }
            };

            let this = self.clone();
            workers.spawn(async move {
                let result = this.delete_cluster(&ctx, &name).await;
                (name, result)
            });
        }

        info!(grid = %grid.name, clusters = workers.len(), "deleting grid");
        let mut errors = MultiError::new("delete cluster");
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((name, Ok(()))) => info!(cluster = %name, "cluster deleted"),
                Ok((name, Err(message))) => errors.push(name, message),
                Err(e) => errors.push("unknown", format!("delete task did not complete: {e}")),
            }
        }
        FailurePolicy::BestEffort.resolve(errors)?;

        self.store.remove_grid(&grid.name)?;
        info!(grid = %grid.name, "grid removed");
        Ok(())
    }

    /// Deploy `app` to the grid stored under `grid`.
    pub async fn deploy_grid(&self, grid: &str, app: &ApplicationSpec) -> CoordinatorResult<()> {
        let record = self
            .store
            .get(grid)?
            .ok_or_else(|| CoordinatorError::GridNotFound(grid.to_string()))?;
        self.deploy(&record, app).await
    }

    /// Install `app` on every cluster of `grid` and wait for it to be ready.
    ///
    /// [`FailurePolicy::Aggregate`]. Each failed cluster gets one diagnostic
    /// collection; this returns only after all of them have finished.
    pub async fn deploy(&self, grid: &GridRecord, app: &ApplicationSpec) -> CoordinatorResult<()> {
        if grid.clusters.is_empty() {
            return Err(CoordinatorError::EmptyGrid(grid.name.clone()));
        }
        info!(grid = %grid.name, app = %app.display_name(), clusters = grid.clusters.len(), "deploying app");

        let clusters: Arc<Vec<ClusterRecord>> = Arc::new(grid.clusters.clone());
        let app = Arc::new(app.clone());
        let names = clusters.iter().map(|c| c.name.clone()).collect();

        let collector = self.diagnostics.clone();
        let failed_clusters = clusters.clone();
        let finished = supervise(
            "deploy app to cluster",
            names,
            |index| {
                let this = self.clone();
                let cluster = clusters[index].clone();
                let app = app.clone();
                async move { WorkerOutcome::from(this.deploy_to_cluster(&cluster, &app).await) }
            },
            move |index| {
                let Some(cluster) = failed_clusters.get(index).cloned() else {
                    return None;
                };
                let collector = collector.clone();
                Some(async move {
                    info!(cluster = %cluster.name, "collecting diagnostics");
                    if let Err(e) = collector.collect(&cluster).await {
                        warn!(cluster = %cluster.name, error = %e, "failed to collect diagnostics");
                    }
                })
            },
        );
        let errors = finished
            .await
            .map_err(|_| CoordinatorError::SupervisorLost("deploy"))?;
        FailurePolicy::Aggregate.resolve(errors)?;

        info!(grid = %grid.name, app = %app.display_name(), "app deployed");
        Ok(())
    }

    async fn deploy_to_cluster(
        &self,
        cluster: &ClusterRecord,
        app: &ApplicationSpec,
    ) -> Result<(), String> {
        self.installer
            .install(cluster, app)
            .await
            .map_err(|e| format!("failed to install {}: {e}", app.display_name()))?;

        let deadline = Instant::now() + self.timeouts.app_ready;
        loop {
            let status = self
                .installer
                .status(cluster, app)
                .await
                .map_err(|e| format!("failed to get app status: {e}"))?;
            debug!(cluster = %cluster.name, state = %status.state, "app status");
            if status.is_ready() {
                info!(cluster = %cluster.name, app = %app.display_name(), "app ready");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err("timed out waiting for app ready status".to_string());
            }
            sleep(self.timeouts.app_poll).await;
        }
    }
}
