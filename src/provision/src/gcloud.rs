//! Cloud account, storage and DNS operations (`gcloud` / `gsutil`).

use crate::config::Settings;
use crate::error::ProvisionError;
use crate::operation::{HookContext, Operation, PostHook};
use crate::registry::OperationSet;
use crate::state::{bucket_url, ClusterState};
use async_trait::async_trait;
use serde::Deserialize;

pub const GCLOUD: &str = "gcloud";
pub const GSUTIL: &str = "gsutil";

pub const CHECK_LOGIN: &str = "check-gcloud-login";
pub const LOGIN: &str = "gcloud-login";
pub const LIST_PROJECTS: &str = "list-gcloud-projects";
pub const CREATE_SOURCE_BUCKET: &str = "create-storage-bucket-sourcecode";
pub const CREATE_LOG_BUCKET: &str = "create-storage-bucket-cloudbuild-logs";
pub const LIST_DNS_SERVERS: &str = "list-dns-server";
pub const CREATE_DNS_ZONE: &str = "create-dns-zone";

const REGISTRAR_NOTICE: &str = "This zone will not normally be usable until you register the related domain and configure following records with your registrar";

/// `gcloud config list --format json`
#[derive(Debug, Default, Deserialize)]
pub struct GcloudConfig {
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default)]
    pub core: CoreConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct ComputeConfig {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub zone: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub project: String,
}

/// Entry of `gcloud projects list --format json`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub name: String,
    pub project_id: String,
    #[serde(default)]
    pub lifecycle_state: String,
}

/// Entry of `gcloud dns record-sets list --format json`
#[derive(Debug, Deserialize)]
pub struct DnsRecord {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    #[serde(default)]
    pub rrdatas: Vec<String>,
    #[serde(default)]
    pub ttl: u64,
}

pub fn parse_gcloud_config(raw: &str) -> Result<GcloudConfig, ProvisionError> {
    serde_json::from_str(raw)
        .map_err(|e| ProvisionError::Parse(format!("gcloud config list: {}", e)))
}

/// Project choices rendered as `Display Name (project-id)`.
pub fn project_options(raw: &str) -> Result<Vec<String>, ProvisionError> {
    let projects: Vec<Project> = serde_json::from_str(raw)
        .map_err(|e| ProvisionError::Parse(format!("gcloud projects list: {}", e)))?;
    Ok(projects
        .iter()
        .map(|p| format!("{} ({})", p.name, p.project_id))
        .collect())
}

/// Extract `project-id` from `Display Name (project-id)`.
pub fn parse_project_choice(choice: &str) -> Result<String, ProvisionError> {
    let open = choice.find('(');
    let close = choice.find(')');
    match (open, close) {
        (Some(open), Some(close)) if open < close => {
            let id = choice[open + 1..close].trim();
            if id.is_empty() {
                Err(ProvisionError::InvalidInput("Invalid project name".to_string()))
            } else {
                Ok(id.to_string())
            }
        }
        _ => Err(ProvisionError::InvalidInput("Invalid project name".to_string())),
    }
}

/// Authoritative nameservers from a record-set listing.
pub fn nameservers(raw: &str) -> Result<Vec<String>, ProvisionError> {
    let records: Vec<DnsRecord> = serde_json::from_str(raw)
        .map_err(|e| ProvisionError::Parse(format!("gcloud dns record-sets list: {}", e)))?;
    if records.is_empty() {
        return Err(ProvisionError::Parse(
            "the 'parameters.managedZone' resource named does not exist".to_string(),
        ));
    }
    records
        .into_iter()
        .rev()
        .find(|r| r.record_type == "NS" && !r.rrdatas.is_empty())
        .map(|r| r.rrdatas)
        .ok_or_else(|| ProvisionError::Parse("no NS record in the managed zone".to_string()))
}

fn lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

pub fn list_regions_op() -> Operation {
    Operation::new(
        "list-region",
        GCLOUD,
        ["compute", "regions", "list", "--format", "value(selfLink.scope())"],
    )
}

pub fn list_zones_op(region: &str) -> Operation {
    Operation::new(
        "list-zone",
        GCLOUD,
        [
            "compute".to_string(),
            "zones".to_string(),
            "list".to_string(),
            "--format".to_string(),
            "value(selfLink.scope())".to_string(),
            "--filter".to_string(),
            format!("name~'{}'", region),
            "--sort-by=name".to_string(),
        ],
    )
}

async fn select_region(ctx: &mut HookContext<'_, '_>) -> Result<String, ProvisionError> {
    let out = list_regions_op().run_once(ctx.exec, ctx.state).await?;
    ctx.exec.prompter.select("Choose region:", &lines(&out))
}

async fn select_zone(ctx: &mut HookContext<'_, '_>, region: &str) -> Result<String, ProvisionError> {
    let out = list_zones_op(region).run_once(ctx.exec, ctx.state).await?;
    ctx.exec.prompter.select("Choose zone:", &lines(&out))
}

/// Reads the active gcloud identity, logging in when there is none, and
/// resolves region and zone.
pub struct CheckLoginHook;

#[async_trait]
impl PostHook for CheckLoginHook {
    async fn after(
        &self,
        op: &Operation,
        ctx: &mut HookContext<'_, '_>,
    ) -> Result<(), ProvisionError> {
        if let Some(e) = op.failure() {
            return Err(e);
        }

        let mut config = parse_gcloud_config(op.stdout())?;
        if config.core.account.is_empty() {
            tracing::info!("[gcloud] No active account, starting login");
            ctx.run_sibling(LOGIN).await?;
            let refreshed = Operation::new("read-gcloud-config", GCLOUD, ["config", "list", "--format", "json"])
                .run_once(ctx.exec, ctx.state)
                .await?;
            config = parse_gcloud_config(&refreshed)?;
        }

        if config.core.account.is_empty() {
            return Err(ProvisionError::StageFailed {
                operation: op.name.clone(),
                reason: "no active gcloud account after login".to_string(),
            });
        }
        ctx.state.account = config.core.account;

        if !config.compute.region.is_empty() {
            ctx.state.region = config.compute.region;
        } else if ctx.state.region.is_empty() {
            ctx.state.region = select_region(ctx).await?;
        }

        if !config.compute.zone.is_empty() {
            ctx.state.zone = config.compute.zone;
        } else if ctx.state.zone.is_empty() {
            let region = ctx.state.region.clone();
            ctx.state.zone = select_zone(ctx, &region).await?;
        }

        tracing::info!(
            "[gcloud] Account {} (region {}, zone {})",
            ctx.state.account,
            ctx.state.region,
            ctx.state.zone
        );
        Ok(())
    }
}

/// Prompts for one of the active projects and stores its id.
pub struct SelectProjectHook;

#[async_trait]
impl PostHook for SelectProjectHook {
    async fn after(
        &self,
        op: &Operation,
        ctx: &mut HookContext<'_, '_>,
    ) -> Result<(), ProvisionError> {
        if let Some(e) = op.failure() {
            return Err(e);
        }

        let options = project_options(op.stdout())?;
        if options.is_empty() {
            return Err(ProvisionError::InvalidInput(
                "no active google cloud project found".to_string(),
            ));
        }

        let choice = ctx
            .exec
            .prompter
            .select("Choose google cloud project:", &options)?;
        ctx.state.project = parse_project_choice(&choice)?;
        tracing::info!("[gcloud] Using project {}", ctx.state.project);
        Ok(())
    }
}

/// Shows the zone's nameservers and waits until the operator has delegated
/// the domain to them. An existing zone counts as created.
pub struct DnsZoneHook;

#[async_trait]
impl PostHook for DnsZoneHook {
    async fn after(
        &self,
        op: &Operation,
        ctx: &mut HookContext<'_, '_>,
    ) -> Result<(), ProvisionError> {
        if let Some(e) = op.failure() {
            if !e.is_already_exists() {
                return Err(e);
            }
            tracing::info!("[gcloud] DNS zone {} already exists", ctx.state.name);
        }

        let listing = ctx.run_sibling(LIST_DNS_SERVERS).await?;
        let servers = nameservers(&listing)?;

        let prompter = ctx.exec.prompter;
        prompter.notify(REGISTRAR_NOTICE);
        prompter.notify(&servers.join("\n"));

        loop {
            if ctx.exec.cancel.is_cancelled() {
                return Err(ProvisionError::Cancelled(
                    "waiting for nameserver delegation".to_string(),
                ));
            }
            if prompter.confirm("Have you added them?")? {
                return Ok(());
            }
        }
    }
}

/// Account bootstrap, project selection, storage and DNS zone, in that order.
pub fn cloud_operations(settings: &Settings) -> Result<OperationSet, ProvisionError> {
    let zone_description = settings.zone_description.clone();

    OperationSet::from_operations(
        "gcloud",
        [
            Operation::new(CHECK_LOGIN, GCLOUD, ["config", "list", "--format", "json"])
                .required()
                .with_hook(CheckLoginHook),
            Operation::new(LOGIN, GCLOUD, ["auth", "login"])
                .internal()
                .interactive(),
            Operation::new(
                LIST_PROJECTS,
                GCLOUD,
                [
                    "projects",
                    "list",
                    "--filter",
                    "lifecycleState:ACTIVE",
                    "--format",
                    "json",
                ],
            )
            .required()
            .with_hook(SelectProjectHook),
            Operation::generated(CREATE_SOURCE_BUCKET, GSUTIL, |c: &ClusterState| {
                vec![
                    "mb".to_string(),
                    "-l".to_string(),
                    c.region.clone(),
                    bucket_url(&c.storage().source_code_bucket),
                ]
            }),
            Operation::generated(CREATE_LOG_BUCKET, GSUTIL, |c: &ClusterState| {
                vec![
                    "mb".to_string(),
                    "-l".to_string(),
                    c.region.clone(),
                    bucket_url(&c.storage().cloud_build_bucket),
                ]
            }),
            Operation::generated(LIST_DNS_SERVERS, GCLOUD, |c: &ClusterState| {
                vec![
                    "dns".to_string(),
                    "record-sets".to_string(),
                    "list".to_string(),
                    "--zone".to_string(),
                    c.name.clone(),
                    "--project".to_string(),
                    c.project.clone(),
                    "--format".to_string(),
                    "json".to_string(),
                ]
            })
            .internal(),
            Operation::generated(CREATE_DNS_ZONE, GCLOUD, move |c: &ClusterState| {
                vec![
                    "dns".to_string(),
                    "managed-zones".to_string(),
                    "create".to_string(),
                    c.name.clone(),
                    "--dns-name".to_string(),
                    c.domain.clone(),
                    "--project".to_string(),
                    c.project.clone(),
                    "--description".to_string(),
                    zone_description.clone(),
                ]
            })
            .with_hook(DnsZoneHook),
        ],
    )
}
