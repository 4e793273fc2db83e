//! Service accounts, their role bindings and credential keys.

use crate::error::ProvisionError;
use crate::gcloud::{GCLOUD, GSUTIL};
use crate::operation::{ExecContext, Operation};
use crate::state::{bucket_url, AccountPurpose, ClusterState};

pub const DNS_ADMIN_ROLE: &str = "roles/dns.admin";
pub const BUILD_EDITOR_ROLE: &str = "roles/cloudbuild.builds.editor";

fn create_account(purpose: AccountPurpose) -> Operation {
    Operation::generated(
        format!("create-{}-serviceaccount", purpose.suffix()),
        GCLOUD,
        move |c: &ClusterState| {
            let name = c.service_account_name(purpose);
            vec![
                "iam".to_string(),
                "service-accounts".to_string(),
                "create".to_string(),
                name.clone(),
                "--display-name".to_string(),
                name,
            ]
        },
    )
}

fn bind_project_role(purpose: AccountPurpose, role: &'static str) -> Operation {
    Operation::generated(
        format!("bind-{}-{}", purpose.suffix(), role),
        GCLOUD,
        move |c: &ClusterState| {
            vec![
                "projects".to_string(),
                "add-iam-policy-binding".to_string(),
                c.project.clone(),
                "--member".to_string(),
                format!("serviceAccount:{}", c.service_account_principal(purpose)),
                "--role".to_string(),
                role.to_string(),
            ]
        },
    )
}

/// Bucket-level grant; `log_bucket` picks the build-log bucket over the source bucket.
fn bind_bucket_role(purpose: AccountPurpose, role: &'static str, log_bucket: bool) -> Operation {
    Operation::generated(
        format!("bind-{}-{}", purpose.suffix(), role),
        GSUTIL,
        move |c: &ClusterState| {
            let storage = c.storage();
            let bucket = if log_bucket {
                storage.cloud_build_bucket
            } else {
                storage.source_code_bucket
            };
            vec![
                "iam".to_string(),
                "ch".to_string(),
                format!(
                    "serviceAccount:{}:{}",
                    c.service_account_principal(purpose),
                    role
                ),
                bucket_url(&bucket),
            ]
        },
    )
}

fn create_key(purpose: AccountPurpose) -> Operation {
    Operation::generated(
        format!("create-{}-key", purpose.suffix()),
        GCLOUD,
        move |c: &ClusterState| {
            vec![
                "iam".to_string(),
                "service-accounts".to_string(),
                "keys".to_string(),
                "create".to_string(),
                "--iam-account".to_string(),
                c.service_account_principal(purpose),
                c.key_file(purpose).display().to_string(),
            ]
        },
    )
}

/// Every identity step, in execution order.
pub fn identity_plan() -> Vec<Operation> {
    use AccountPurpose::*;

    vec![
        create_account(Dns),
        bind_project_role(Dns, DNS_ADMIN_ROLE),
        create_account(Storage),
        bind_bucket_role(Storage, "objectCreator", false),
        bind_bucket_role(Storage, "objectViewer", true),
        create_account(CloudBuild),
        bind_project_role(CloudBuild, BUILD_EDITOR_ROLE),
        create_key(CloudBuild),
        create_key(Storage),
        create_key(Dns),
    ]
}

/// Run the identity plan. Failures are logged and the next step still runs;
/// the names of failed steps are returned. Only cancellation stops the plan.
pub async fn provision_identities(
    exec: &ExecContext<'_>,
    state: &mut ClusterState,
) -> Result<Vec<String>, ProvisionError> {
    let mut failed = Vec::new();

    for mut op in identity_plan() {
        op.execute(exec, state).await?;
        match op.failure() {
            None => {}
            Some(e) if e.is_cancelled() => return Err(e),
            Some(e) if e.is_already_exists() => {
                tracing::info!("[Identity] '{}' already done: {}", op.name, e);
            }
            Some(e) => {
                tracing::warn!("[Identity] '{}' failed, continuing: {}", op.name, e);
                failed.push(op.name.clone());
            }
        }
    }

    Ok(failed)
}
