//! Cluster state threaded through every provisioning step.
//!
//! Identity fields are filled in progressively by the pipeline. Bucket and
//! service-account names are derived from identity on every call to
//! [`ClusterState::storage`] / [`ClusterState::service_accounts`]; the
//! `storage` and `service_account` fields only hold the snapshot that gets
//! persisted (and that teardown works from).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// `{account}@{project}.iam.gserviceaccount.com`
pub fn service_account_email(account: &str, project: &str) -> String {
    format!("{}@{}.iam.gserviceaccount.com", account, project)
}

/// `gs://{bucket}`
pub fn bucket_url(bucket: &str) -> String {
    format!("gs://{}", bucket)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storage {
    #[serde(rename = "cloudbuild_bucket_name", default)]
    pub cloud_build_bucket: String,
    #[serde(rename = "sourcecode_bucket_name", default)]
    pub source_code_bucket: String,
}

impl Storage {
    /// Non-empty bucket names, build-log bucket first.
    pub fn buckets(&self) -> Vec<&str> {
        [
            self.cloud_build_bucket.as_str(),
            self.source_code_bucket.as_str(),
        ]
        .into_iter()
        .filter(|b| !b.is_empty())
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccounts {
    #[serde(rename = "cloudbuild_serviceaccount_name", default)]
    pub cloud_build_name: String,
    #[serde(rename = "cloudbuild_serviceaccount", default)]
    pub cloud_build: String,
    #[serde(rename = "storage_serviceaccount_name", default)]
    pub storage_name: String,
    #[serde(rename = "storage_serviceaccount", default)]
    pub storage: String,
    #[serde(rename = "clouddns_serviceaccount_name", default)]
    pub dns_name: String,
    #[serde(rename = "clouddns_serviceaccount", default)]
    pub dns: String,
}

impl ServiceAccounts {
    /// Non-empty principal emails, build account first.
    pub fn emails(&self) -> Vec<&str> {
        [
            self.cloud_build.as_str(),
            self.storage.as_str(),
            self.dns.as_str(),
        ]
        .into_iter()
        .filter(|e| !e.is_empty())
        .collect()
    }
}

/// Service-account purposes provisioned for every cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountPurpose {
    CloudBuild,
    Storage,
    Dns,
}

impl AccountPurpose {
    pub fn suffix(self) -> &'static str {
        match self {
            AccountPurpose::CloudBuild => "cloudbuild",
            AccountPurpose::Storage => "storage",
            AccountPurpose::Dns => "cert-manager-clouddns",
        }
    }
}

/// One entry in the remote application index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDescriptor {
    #[serde(default)]
    pub deprecated: bool,
    pub path: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Remote manifest index document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIndex {
    #[serde(rename = "apiVersion", default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: IndexMetadata,
    #[serde(default)]
    pub apps: Vec<AppDescriptor>,
}

impl AppIndex {
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// Non-deprecated applications in index order.
    pub fn active_apps(&self) -> impl Iterator<Item = &AppDescriptor> {
        self.apps.iter().filter(|app| !app.deprecated)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterState {
    #[serde(rename = "cluster_name")]
    pub name: String,
    #[serde(rename = "project_name", default)]
    pub project: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub zone: String,
    #[serde(rename = "dns_name", default)]
    pub domain: String,
    #[serde(default)]
    pub storage: Storage,
    #[serde(rename = "service_account", default)]
    pub service_account: ServiceAccounts,
    #[serde(rename = "kubeapp", default)]
    pub app_index: Option<AppIndex>,
    /// Rebuilt from the index on every rollout.
    #[serde(skip)]
    pub apps: HashMap<String, AppDescriptor>,
    #[serde(rename = "config_path", default)]
    pub config_path: PathBuf,
}

impl ClusterState {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            ..Default::default()
        }
    }

    /// Bucket names derived from the current cluster name.
    pub fn storage(&self) -> Storage {
        Storage {
            cloud_build_bucket: format!("{}-cloudbuild-logs", self.name),
            source_code_bucket: format!("{}-sourcecode", self.name),
        }
    }

    pub fn service_account_name(&self, purpose: AccountPurpose) -> String {
        format!("{}-{}", self.name, purpose.suffix())
    }

    pub fn service_account_principal(&self, purpose: AccountPurpose) -> String {
        service_account_email(&self.service_account_name(purpose), &self.project)
    }

    /// Service-account identities derived from the current name and project.
    pub fn service_accounts(&self) -> ServiceAccounts {
        ServiceAccounts {
            cloud_build_name: self.service_account_name(AccountPurpose::CloudBuild),
            cloud_build: self.service_account_principal(AccountPurpose::CloudBuild),
            storage_name: self.service_account_name(AccountPurpose::Storage),
            storage: self.service_account_principal(AccountPurpose::Storage),
            dns_name: self.service_account_name(AccountPurpose::Dns),
            dns: self.service_account_principal(AccountPurpose::Dns),
        }
    }

    /// Location of the downloaded credential key for `purpose`.
    pub fn key_file(&self, purpose: AccountPurpose) -> PathBuf {
        self.config_path
            .join(format!("{}.json", self.service_account_name(purpose)))
    }

    /// Refresh the persisted snapshot from the current identity fields.
    pub fn refresh_derived(&mut self) {
        self.storage = self.storage();
        self.service_account = self.service_accounts();
    }

    /// Record the index and rebuild the name lookup. First registration wins.
    pub fn set_app_index(&mut self, index: AppIndex) {
        self.apps.clear();
        for app in index.active_apps() {
            self.apps
                .entry(app.name.clone())
                .or_insert_with(|| app.clone());
        }
        self.app_index = Some(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_names_follow_project_changes() {
        let mut state = ClusterState::new("demo", "demo.example.com");
        state.project = "proj-1".to_string();
        assert_eq!(
            state.service_accounts().dns,
            "demo-cert-manager-clouddns@proj-1.iam.gserviceaccount.com"
        );

        state.project = "proj-2".to_string();
        assert_eq!(
            state.service_accounts().storage,
            "demo-storage@proj-2.iam.gserviceaccount.com"
        );
        assert_eq!(state.storage().source_code_bucket, "demo-sourcecode");
    }

    #[test]
    fn test_snapshot_only_changes_on_refresh() {
        let mut state = ClusterState::new("demo", "demo.example.com");
        assert!(state.storage.buckets().is_empty());
        state.refresh_derived();
        assert_eq!(
            state.storage.buckets(),
            vec!["demo-cloudbuild-logs", "demo-sourcecode"]
        );
    }

    #[test]
    fn test_app_index_first_registration_wins() {
        let index = AppIndex {
            apps: vec![
                AppDescriptor {
                    name: "externalDNS".into(),
                    path: "https://a/one.yaml".into(),
                    deprecated: false,
                },
                AppDescriptor {
                    name: "externalDNS".into(),
                    path: "https://a/two.yaml".into(),
                    deprecated: false,
                },
                AppDescriptor {
                    name: "legacy".into(),
                    path: "https://a/legacy.yaml".into(),
                    deprecated: true,
                },
            ],
            ..Default::default()
        };
        let mut state = ClusterState::default();
        state.set_app_index(index);
        assert_eq!(state.apps.len(), 1);
        assert_eq!(state.apps["externalDNS"].path, "https://a/one.yaml");
    }
}
