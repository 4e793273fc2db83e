/// Application renderers: per-application template bindings and pre-apply setup
///
/// The rollout loop looks applications up by index name. Applications
/// without a renderer are applied exactly as fetched.
use crate::error::ProvisionError;
use crate::kubectl;
use crate::operation::{ExecContext, Operation};
use crate::state::{AccountPurpose, ClusterState};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tera::Context;

pub const INGRESS_CONTROLLER_SERVICE: &str = "ingress-controller-nginx-ingress";
pub const CLUSTER_ISSUER: &str = "letsencrypt-prod";
pub const WILDCARD_SECRET: &str = "wildcard-cert-secret";
pub const CERT_MANAGER_NAMESPACE: &str = "cert-manager";
pub const GENERATOR_NAMESPACE: &str = "generator";

/// How the rollout decides an application is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// `kubectl wait` on every pod.
    Pods,
    /// Poll until the named secret exists, then fall back to a placeholder.
    Secret(String),
}

#[async_trait]
pub trait AppRenderer: Send + Sync {
    /// Template bindings for this application against the current state.
    fn bindings(&self, state: &ClusterState) -> Result<Context, ProvisionError>;

    /// Cluster objects the manifest expects to exist already.
    async fn before_apply(
        &self,
        _exec: &ExecContext<'_>,
        _state: &mut ClusterState,
    ) -> Result<(), ProvisionError> {
        Ok(())
    }

    fn readiness(&self) -> Readiness {
        Readiness::Pods
    }
}

fn context_of<T: Serialize>(bindings: &T) -> Result<Context, ProvisionError> {
    Context::from_serialize(bindings).map_err(|e| ProvisionError::Template(e.to_string()))
}

/// Run a setup step, logging instead of failing. Cancellation still propagates.
async fn best_effort(
    op: Operation,
    exec: &ExecContext<'_>,
    state: &mut ClusterState,
) -> Result<(), ProvisionError> {
    let name = op.name.clone();
    match op.run_once(exec, state).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_cancelled() => Err(e),
        Err(e) => {
            tracing::warn!("[Rollout] Setup step '{}' failed: {}", name, e);
            Ok(())
        }
    }
}

#[derive(Debug, Serialize)]
struct ExternalDnsBindings {
    #[serde(rename = "IngressControllerService")]
    ingress_controller_service: String,
    #[serde(rename = "DomainName")]
    domain_name: String,
    #[serde(rename = "ProjectName")]
    project_name: String,
    #[serde(rename = "Email")]
    email: String,
}

pub struct ExternalDns;

#[async_trait]
impl AppRenderer for ExternalDns {
    fn bindings(&self, state: &ClusterState) -> Result<Context, ProvisionError> {
        context_of(&ExternalDnsBindings {
            ingress_controller_service: INGRESS_CONTROLLER_SERVICE.to_string(),
            domain_name: state.domain.clone(),
            project_name: state.project.clone(),
            email: state.account.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct WildcardCertBindings {
    #[serde(rename = "DNSName")]
    dns_name: String,
}

/// Wildcard certificate; ready once cert-manager has written its secret.
pub struct WildcardCert;

#[async_trait]
impl AppRenderer for WildcardCert {
    fn bindings(&self, state: &ClusterState) -> Result<Context, ProvisionError> {
        context_of(&WildcardCertBindings {
            dns_name: format!("*.{}", state.domain),
        })
    }

    fn readiness(&self) -> Readiness {
        Readiness::Secret(WILDCARD_SECRET.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ClusterIssuerBindings {
    #[serde(rename = "Email")]
    email: String,
    #[serde(rename = "ProjectName")]
    project_name: String,
    #[serde(rename = "ServiceAccountSecret")]
    service_account_secret: String,
    #[serde(rename = "SecretFileKey")]
    secret_file_key: String,
}

pub struct ClusterIssuer;

#[async_trait]
impl AppRenderer for ClusterIssuer {
    fn bindings(&self, state: &ClusterState) -> Result<Context, ProvisionError> {
        let secret = state.service_account_name(AccountPurpose::Dns);
        context_of(&ClusterIssuerBindings {
            email: state.account.clone(),
            project_name: state.project.clone(),
            service_account_secret: secret.clone(),
            secret_file_key: secret,
        })
    }

    async fn before_apply(
        &self,
        exec: &ExecContext<'_>,
        state: &mut ClusterState,
    ) -> Result<(), ProvisionError> {
        let secret = state.service_account_name(AccountPurpose::Dns);
        let key = state.key_file(AccountPurpose::Dns);
        best_effort(
            kubectl::create_secret(&secret, CERT_MANAGER_NAMESPACE, Some(&key)),
            exec,
            state,
        )
        .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvVar {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: String,
}

impl EnvVar {
    fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GeneratorBindings {
    #[serde(rename = "ClusterIssuer")]
    cluster_issuer: String,
    #[serde(rename = "DNSName")]
    dns_name: String,
    #[serde(rename = "Envs")]
    envs: Vec<EnvVar>,
}

/// Environment handed to the generator workload.
pub fn generator_envs(state: &ClusterState) -> Vec<EnvVar> {
    let storage = state.storage();
    vec![
        EnvVar::new("FLASK_ENV", "production"),
        EnvVar::new("GCP_PROJECT", state.project.clone()),
        EnvVar::new("SOURCE_BUCKET", storage.source_code_bucket),
        EnvVar::new("CLOUDBUILD_BUCKET", storage.cloud_build_bucket),
        EnvVar::new("ISSUER_NAME", CLUSTER_ISSUER),
        EnvVar::new("CLUSTER_NAME", state.name.clone()),
        EnvVar::new("COMPUTE_ZONE", state.zone.clone()),
        EnvVar::new("DNS_NAME", state.domain.clone()),
    ]
}

pub struct Generator;

#[async_trait]
impl AppRenderer for Generator {
    fn bindings(&self, state: &ClusterState) -> Result<Context, ProvisionError> {
        context_of(&GeneratorBindings {
            cluster_issuer: CLUSTER_ISSUER.to_string(),
            dns_name: format!("generator.{}", state.domain),
            envs: generator_envs(state),
        })
    }

    async fn before_apply(
        &self,
        exec: &ExecContext<'_>,
        state: &mut ClusterState,
    ) -> Result<(), ProvisionError> {
        best_effort(kubectl::create_namespace(GENERATOR_NAMESPACE), exec, state).await?;

        let build_key = state.key_file(AccountPurpose::CloudBuild);
        best_effort(
            kubectl::create_secret("cloudbuild-secret", GENERATOR_NAMESPACE, Some(&build_key)),
            exec,
            state,
        )
        .await?;

        let storage_key = state.key_file(AccountPurpose::Storage);
        best_effort(
            kubectl::create_secret("cloudstorage-secret", GENERATOR_NAMESPACE, Some(&storage_key)),
            exec,
            state,
        )
        .await
    }
}

/// Application name to renderer.
#[derive(Clone, Default)]
pub struct RendererRegistry {
    renderers: HashMap<String, Arc<dyn AppRenderer>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The renderers for the stock application catalogue.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("externalDNS", ExternalDns);
        registry.register("wildcard-cert", WildcardCert);
        registry.register("cluster-issuer", ClusterIssuer);
        registry.register("generator", Generator);
        registry
    }

    pub fn register(&mut self, app: impl Into<String>, renderer: impl AppRenderer + 'static) {
        self.renderers.insert(app.into(), Arc::new(renderer));
    }

    pub fn get(&self, app: &str) -> Option<Arc<dyn AppRenderer>> {
        self.renderers.get(app).cloned()
    }
}
