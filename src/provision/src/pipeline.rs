/// Provisioning pipeline
///
/// Stages run strictly in order against one `ClusterState`:
/// account bootstrap, project selection, storage, DNS zone (cloud set),
/// cluster (kubernetes set), identities, application rollout, persistence.
use crate::config::Settings;
use crate::error::ProvisionError;
use crate::gcloud::cloud_operations;
use crate::identity::provision_identities;
use crate::kubernetes::cluster_operations;
use crate::operation::ExecContext;
use crate::registry::OperationSet;
use crate::rollout::{ManifestSource, Rollout};
use crate::state::ClusterState;
use crate::store::ClusterStore;
use std::time::Instant;

pub struct Provisioner<'a> {
    exec: ExecContext<'a>,
    store: &'a ClusterStore,
    settings: &'a Settings,
    source: &'a dyn ManifestSource,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        exec: ExecContext<'a>,
        store: &'a ClusterStore,
        settings: &'a Settings,
        source: &'a dyn ManifestSource,
    ) -> Self {
        Self {
            exec,
            store,
            settings,
            source,
        }
    }

    /// Provision cluster `name` serving `domain` and persist its state.
    ///
    /// Only the account and project stages, cancellation and persistence
    /// can fail the run; everything else is logged and skipped past. A
    /// failed run removes the cluster directory if it created it.
    pub async fn create(&self, name: &str, domain: &str) -> Result<ClusterState, ProvisionError> {
        let started = Instant::now();
        tracing::info!("[Provisioner] Creating cluster {} ({})", name, domain);

        let fresh = self.store.cluster_dir(name).is_err();
        let mut state = ClusterState::new(name, domain);
        state.config_path = self.store.create_cluster_dir(name)?;

        if let Err(e) = self.provision(&mut state).await {
            if fresh {
                if let Err(cleanup) = self.store.remove(name) {
                    tracing::warn!("[Provisioner] Failed to remove {}: {}", name, cleanup);
                }
            }
            return Err(e);
        }

        tracing::info!(
            "[TIMING] Cluster {} provisioned in {}ms",
            name,
            started.elapsed().as_millis()
        );
        Ok(state)
    }

    async fn provision(&self, state: &mut ClusterState) -> Result<(), ProvisionError> {
        let mut cloud = cloud_operations(self.settings)?;
        let mut cluster = cluster_operations(self.settings)?;
        self.run_set(&mut cloud, state).await?;
        self.run_set(&mut cluster, state).await?;

        let stage = Instant::now();
        let failed = provision_identities(&self.exec, state).await?;
        if !failed.is_empty() {
            tracing::warn!(
                "[Provisioner] {} identity steps failed: {}",
                failed.len(),
                failed.join(", ")
            );
        }
        tracing::info!(
            "[TIMING] Identities completed in {}ms",
            stage.elapsed().as_millis()
        );

        let stage = Instant::now();
        match Rollout::new(self.source, self.settings)
            .run(&self.exec, state)
            .await
        {
            Ok(report) => {
                let failed: Vec<&str> = report.failed().collect();
                if !failed.is_empty() {
                    tracing::warn!("[Provisioner] Applications not rolled out: {}", failed.join(", "));
                }
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => tracing::error!("[Provisioner] Application rollout failed: {}", e),
        }
        tracing::info!(
            "[TIMING] Rollout completed in {}ms",
            stage.elapsed().as_millis()
        );

        state.refresh_derived();
        self.store.save(state)?;
        Ok(())
    }

    async fn run_set(
        &self,
        set: &mut OperationSet,
        state: &mut ClusterState,
    ) -> Result<(), ProvisionError> {
        let stage = Instant::now();
        set.run(&self.exec, state).await?;
        tracing::info!(
            "[TIMING] Operation set '{}' completed in {}ms",
            set.name(),
            stage.elapsed().as_millis()
        );
        Ok(())
    }
}
