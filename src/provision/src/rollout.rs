/// Application rollout: fetch the index, render, apply and gate each application
///
/// Rollout is best-effort across applications: a failure for one
/// application is logged and the loop moves on to the next.
use crate::apps::{Readiness, RendererRegistry};
use crate::config::Settings;
use crate::error::ProvisionError;
use crate::kubectl::{self, KUBECTL};
use crate::operation::ExecContext;
use crate::readiness::{poll_until, GateOutcome};
use crate::state::{AppDescriptor, AppIndex, ClusterState};
use crate::template_renderer::TemplateRenderer;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;

/// Where raw manifests and the index come from.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch(&self, location: &str) -> Result<String, ProvisionError>;
}

/// Unauthenticated HTTPS GET.
pub struct HttpManifestSource {
    client: Client,
}

impl HttpManifestSource {
    pub fn new(timeout: Duration) -> Result<Self, ProvisionError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch(&self, location: &str) -> Result<String, ProvisionError> {
        tracing::debug!("[Rollout] GET {}", location);
        let response = self.client.get(location).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

/// What happened to one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppOutcome {
    Ready,
    /// The readiness secret never appeared; a placeholder was created.
    Placeholder,
    Failed(String),
}

#[derive(Debug, Default)]
pub struct RolloutReport {
    pub outcomes: Vec<(String, AppOutcome)>,
}

impl RolloutReport {
    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, AppOutcome::Failed(_)))
            .map(|(name, _)| name.as_str())
    }

    pub fn outcome(&self, app: &str) -> Option<&AppOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == app)
            .map(|(_, o)| o)
    }
}

pub async fn fetch_index(
    source: &dyn ManifestSource,
    url: &str,
) -> Result<AppIndex, ProvisionError> {
    let raw = source.fetch(url).await?;
    let index = AppIndex::from_yaml(&raw)?;
    tracing::info!(
        "[Rollout] Index {} {} lists {} applications",
        index.metadata.name,
        index.metadata.version,
        index.apps.len()
    );
    Ok(index)
}

pub struct Rollout<'a> {
    source: &'a dyn ManifestSource,
    renderers: RendererRegistry,
    index_url: String,
    pod_ready_timeout: Duration,
    secret_poll_interval: Duration,
    secret_poll_timeout: Duration,
}

impl<'a> Rollout<'a> {
    pub fn new(source: &'a dyn ManifestSource, settings: &Settings) -> Self {
        Self {
            source,
            renderers: RendererRegistry::with_defaults(),
            index_url: settings.index_url.clone(),
            pod_ready_timeout: settings.pod_ready_timeout(),
            secret_poll_interval: settings.secret_poll_interval(),
            secret_poll_timeout: settings.secret_poll_timeout(),
        }
    }

    pub fn with_renderers(mut self, renderers: RendererRegistry) -> Self {
        self.renderers = renderers;
        self
    }

    /// Fetch the index and roll out every active application in index order.
    pub async fn run(
        &self,
        exec: &ExecContext<'_>,
        state: &mut ClusterState,
    ) -> Result<RolloutReport, ProvisionError> {
        let index = fetch_index(self.source, &self.index_url).await?;
        state.set_app_index(index.clone());

        let mut report = RolloutReport::default();
        let mut renderer = TemplateRenderer::new();
        let mut seen = HashSet::new();

        for app in index.active_apps() {
            if !seen.insert(app.name.clone()) {
                tracing::debug!("[Rollout] Skipping duplicate entry for {}", app.name);
                continue;
            }

            let started = std::time::Instant::now();
            let outcome = match self.deploy(exec, state, &mut renderer, app).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::error!("[Rollout] {} failed, continuing: {}", app.name, e);
                    AppOutcome::Failed(e.to_string())
                }
            };
            tracing::info!(
                "[TIMING] Rollout of '{}' finished in {}ms",
                app.name,
                started.elapsed().as_millis()
            );
            report.outcomes.push((app.name.clone(), outcome));
        }

        Ok(report)
    }

    async fn deploy(
        &self,
        exec: &ExecContext<'_>,
        state: &mut ClusterState,
        renderer: &mut TemplateRenderer,
        app: &AppDescriptor,
    ) -> Result<AppOutcome, ProvisionError> {
        tracing::info!("[Rollout] Deploying {}", app.name);
        let raw = self.source.fetch(&app.path).await?;

        let app_renderer = self.renderers.get(&app.name);
        let manifest = match &app_renderer {
            Some(r) => {
                r.before_apply(exec, state).await?;
                let context = r.bindings(state)?;
                renderer.render_manifest(&app.name, &raw, &context)?
            }
            None => raw,
        };

        let path = state.config_path.join(format!("{}.yaml", app.name));
        TemplateRenderer::write_manifest(&manifest, &path)?;
        kubectl::apply(&app.name, &path).run_once(exec, state).await?;

        let readiness = app_renderer
            .map(|r| r.readiness())
            .unwrap_or(Readiness::Pods);
        match readiness {
            Readiness::Pods => {
                kubectl::wait_pods_ready(self.pod_ready_timeout)
                    .run_once(exec, state)
                    .await?;
                Ok(AppOutcome::Ready)
            }
            Readiness::Secret(secret) => self.await_secret(exec, state, &secret).await,
        }
    }

    /// Poll for `secret`; on timeout create an empty one so dependants still apply.
    async fn await_secret(
        &self,
        exec: &ExecContext<'_>,
        state: &mut ClusterState,
        secret: &str,
    ) -> Result<AppOutcome, ProvisionError> {
        tracing::info!(
            "[ReadinessGate] Waiting up to {}s for secret {}",
            self.secret_poll_timeout.as_secs(),
            secret
        );

        let args = kubectl::get_secret(secret).resolve_args(state);
        let gate = poll_until(self.secret_poll_interval, self.secret_poll_timeout, || {
            let args = args.clone();
            async move { exec.runner.run(KUBECTL, &args, &exec.cancel).await.is_ok() }
        });

        let outcome = tokio::select! {
            _ = exec.cancel.cancelled() => {
                return Err(ProvisionError::Cancelled(format!("waiting for secret {}", secret)));
            }
            outcome = gate => outcome,
        };

        match outcome {
            GateOutcome::Ready => Ok(AppOutcome::Ready),
            GateOutcome::TimedOut => {
                tracing::warn!(
                    "[ReadinessGate] Secret {} did not appear, creating placeholder",
                    secret
                );
                kubectl::create_secret(secret, "default", None)
                    .run_once(exec, state)
                    .await?;
                Ok(AppOutcome::Placeholder)
            }
        }
    }
}
