//! GKE cluster creation, credentials and admin binding.

use crate::config::Settings;
use crate::error::ProvisionError;
use crate::gcloud::GCLOUD;
use crate::kubectl::{cluster_admin_binding, KUBECTL};
use crate::operation::Operation;
use crate::registry::OperationSet;
use crate::state::ClusterState;

pub const CREATE_CLUSTER: &str = "create-kubernetes-cluster";
pub const GET_CREDENTIALS: &str = "get-kubernetes-credentials";
pub const CLUSTER_ADMIN_ROLE: &str = "gke-cluster-admin-role";

const NODE_SCOPES: [&str; 7] = [
    "https://www.googleapis.com/auth/devstorage.read_only",
    "https://www.googleapis.com/auth/logging.write",
    "https://www.googleapis.com/auth/monitoring",
    "https://www.googleapis.com/auth/servicecontrol",
    "https://www.googleapis.com/auth/service.management.readonly",
    "https://www.googleapis.com/auth/trace.append",
    "https://www.googleapis.com/auth/ndev.clouddns.readwrite",
];

fn create_cluster_args(settings: &Settings, c: &ClusterState) -> Vec<String> {
    vec![
        "container".to_string(),
        "clusters".to_string(),
        "create".to_string(),
        c.name.clone(),
        "--project".to_string(),
        c.project.clone(),
        "--zone".to_string(),
        c.zone.clone(),
        "--no-enable-basic-auth".to_string(),
        "--cluster-version".to_string(),
        settings.cluster_version.clone(),
        "--machine-type".to_string(),
        settings.machine_type.clone(),
        "--image-type".to_string(),
        "COS".to_string(),
        "--disk-type".to_string(),
        "pd-standard".to_string(),
        format!("--disk-size={}", settings.disk_size_gb),
        "--scopes".to_string(),
        NODE_SCOPES.join(","),
        "--preemptible".to_string(),
        format!("--num-nodes={}", settings.num_nodes),
        "--network".to_string(),
        format!("projects/{}/global/networks/default", c.project),
        "--subnetwork".to_string(),
        format!(
            "projects/{}/regions/{}/subnetworks/default",
            c.project, c.region
        ),
        "--addons".to_string(),
        "HttpLoadBalancing".to_string(),
    ]
}

/// Cluster, local credentials, then cluster-admin for the invoking account.
///
/// The admin binding can fail on projects where the account lacks
/// `container.clusterRoleBindings.create`; re-run it after elevating IAM.
pub fn cluster_operations(settings: &Settings) -> Result<OperationSet, ProvisionError> {
    let shape = settings.clone();

    OperationSet::from_operations(
        "kubernetes",
        [
            Operation::generated(CREATE_CLUSTER, GCLOUD, move |c: &ClusterState| {
                create_cluster_args(&shape, c)
            }),
            Operation::generated(GET_CREDENTIALS, GCLOUD, |c: &ClusterState| {
                vec![
                    "container".to_string(),
                    "clusters".to_string(),
                    "get-credentials".to_string(),
                    c.name.clone(),
                    "--zone".to_string(),
                    c.zone.clone(),
                    "--project".to_string(),
                    c.project.clone(),
                ]
            }),
            Operation::generated(CLUSTER_ADMIN_ROLE, KUBECTL, |c: &ClusterState| {
                cluster_admin_binding(&c.account)
            }),
        ],
    )
}
