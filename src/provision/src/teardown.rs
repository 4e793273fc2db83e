//! Best-effort removal of everything a cluster provisioned.

use crate::error::ProvisionError;
use crate::gcloud::{GCLOUD, GSUTIL};
use crate::operation::{ExecContext, Operation};
use crate::state::{bucket_url, ClusterState};
use crate::store::ClusterStore;

/// Deletions that failed; the local directory is gone regardless.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub failures: Vec<(String, String)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Every deletion for `state`, in execution order.
pub fn teardown_plan(state: &ClusterState, leave_dns_zone: bool) -> Vec<Operation> {
    let mut plan = vec![Operation::new(
        "delete-kubernetes-cluster",
        GCLOUD,
        [
            "container",
            "clusters",
            "delete",
            state.name.as_str(),
            "--quiet",
            "--zone",
            state.zone.as_str(),
            "--project",
            state.project.as_str(),
        ],
    )];

    if !leave_dns_zone {
        plan.push(Operation::new(
            "delete-dns-zone",
            GCLOUD,
            [
                "dns",
                "managed-zones",
                "delete",
                state.name.as_str(),
                "--project",
                state.project.as_str(),
            ],
        ));
    }

    for bucket in state.storage.buckets() {
        plan.push(Operation::new(
            format!("delete-bucket-{}", bucket),
            GSUTIL,
            ["-m".to_string(), "rm".to_string(), "-r".to_string(), bucket_url(bucket)],
        ));
    }

    for email in state.service_account.emails() {
        plan.push(Operation::new(
            format!("delete-serviceaccount-{}", email),
            GCLOUD,
            ["iam", "service-accounts", "delete", email, "--quiet"],
        ));
    }

    plan
}

/// Tear down cluster `name`.
///
/// Fails without touching anything if the cluster is unknown. A directory
/// without persisted state is left over from an aborted create and is
/// removed without running any deletion. Individual
/// deletions are logged and reported; removing the local directory is the
/// only step whose failure is returned.
pub async fn teardown(
    exec: &ExecContext<'_>,
    store: &ClusterStore,
    name: &str,
    leave_dns_zone: bool,
) -> Result<TeardownReport, ProvisionError> {
    let mut state = match store.load(name) {
        Ok(state) => state,
        Err(ProvisionError::ClusterNotFound(_)) if store.cluster_dir(name).is_ok() => {
            tracing::warn!("[Teardown] No state persisted for {}, removing its directory", name);
            store.remove(name)?;
            return Ok(TeardownReport::default());
        }
        Err(e) => return Err(e),
    };
    tracing::info!("[Teardown] Deleting cluster {}", name);

    let mut report = TeardownReport::default();
    for mut op in teardown_plan(&state, leave_dns_zone) {
        op.execute(exec, &mut state).await?;
        if let Some(e) = op.failure() {
            if e.is_cancelled() {
                return Err(e);
            }
            tracing::warn!("[Teardown] '{}' failed, continuing: {}", op.name, e);
            report.failures.push((op.name.clone(), e.to_string()));
        }
    }

    store.remove(name)?;
    tracing::info!(
        "[Teardown] Cluster {} removed ({} failed deletions)",
        name,
        report.failures.len()
    );
    Ok(report)
}
