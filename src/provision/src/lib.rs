//! Managed GKE cluster provisioning
//!
//! This crate drives the cloud and cluster CLIs that create and remove a
//! single-tenant cluster: DNS zone, buckets, service accounts, the GKE
//! cluster itself and the stock in-cluster applications.
//! Operations are named external-process invocations grouped into ordered
//! operation sets; the pipelines thread one `ClusterState` through them.

pub mod error;
pub use error::ProvisionError;

// Execution engine
pub mod operation;
pub mod prompt;
pub mod registry;
pub mod runner;
pub use operation::{ExecContext, HookContext, Operation, OperationResult, PostHook};
pub use prompt::Prompter;
pub use registry::OperationSet;
pub use runner::{CommandRunner, ProcessRunner};

// State, settings and persistence
pub mod config;
pub mod state;
pub mod store;
pub mod validate;
pub use config::Settings;
pub use state::{AccountPurpose, AppDescriptor, AppIndex, ClusterState, ServiceAccounts, Storage};
pub use store::ClusterStore;
pub use validate::{validate_cluster_name, validate_domain_name};

// Cloud and cluster operations
pub mod gcloud;
pub mod identity;
pub mod kubectl;
pub mod kubernetes;

// Rollout
pub mod apps;
pub mod readiness;
pub mod rollout;
pub mod template_renderer;
pub use apps::{AppRenderer, Readiness, RendererRegistry};
pub use readiness::{poll_until, GateOutcome};
pub use rollout::{AppOutcome, HttpManifestSource, ManifestSource, Rollout, RolloutReport};
pub use template_renderer::TemplateRenderer;

// Pipelines
pub mod pipeline;
pub mod teardown;
pub use pipeline::Provisioner;
pub use teardown::{teardown, teardown_plan, TeardownReport};
