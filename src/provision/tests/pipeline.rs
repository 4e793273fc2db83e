//! Integration tests for the provisioning pipeline.

mod common;

use common::{catalogue, cloud_runner, exec, test_settings, FakePrompter, FakeRunner};
use provision::{ClusterStore, ExecContext, Prompter, ProvisionError, Provisioner};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_create_demo_cluster() {
    let dir = TempDir::new().unwrap();
    let store = ClusterStore::new(dir.path());
    let settings = test_settings();
    let source = catalogue();
    let runner = cloud_runner();
    let prompter = FakePrompter::new().choose("proj-1");

    let state = Provisioner::new(exec(&runner, &prompter), &store, &settings, &source)
        .create("demo", "demo.example.com")
        .await
        .unwrap();

    assert_eq!(state.account, "me@example.com");
    assert_eq!(state.project, "proj-1");
    assert_eq!(state.region, "europe-west1");
    assert_eq!(state.zone, "europe-west1-b");
    assert_eq!(state.config_path, dir.path().join("demo"));

    let raw = std::fs::read_to_string(dir.path().join("demo").join("config.json")).unwrap();
    assert!(raw.contains("\"demo-cloudbuild-logs\""));
    assert!(raw.contains("\"demo-sourcecode\""));
    assert!(raw.contains("\"demo-cert-manager-clouddns@proj-1.iam.gserviceaccount.com\""));
    assert_eq!(store.load("demo").unwrap().project, "proj-1");

    // Stage order
    let order = [
        "gcloud config list --format json",
        "gcloud projects list --filter lifecycleState:ACTIVE --format json",
        "gsutil mb -l europe-west1 gs://demo-sourcecode",
        "gsutil mb -l europe-west1 gs://demo-cloudbuild-logs",
        "gcloud dns managed-zones create demo --dns-name demo.example.com --project proj-1",
        "gcloud dns record-sets list --zone demo --project proj-1 --format json",
        "gcloud container clusters create demo --project proj-1 --zone europe-west1-b",
        "gcloud container clusters get-credentials demo --zone europe-west1-b --project proj-1",
        "kubectl create clusterrolebinding cluster-admin-binding --clusterrole=cluster-admin --user=me@example.com",
        "gcloud iam service-accounts create demo-cert-manager-clouddns",
        "gcloud projects add-iam-policy-binding proj-1 --member serviceAccount:demo-cert-manager-clouddns@proj-1.iam.gserviceaccount.com --role roles/dns.admin",
        "gsutil iam ch serviceAccount:demo-storage@proj-1.iam.gserviceaccount.com:objectCreator gs://demo-sourcecode",
        "gcloud iam service-accounts keys create --iam-account demo-cert-manager-clouddns@proj-1.iam.gserviceaccount.com",
        "kubectl apply -f",
    ];
    let positions: Vec<usize> = order.iter().map(|p| runner.position(p)).collect();
    assert!(
        positions.windows(2).all(|w| w[0] < w[1]),
        "out of order: {:#?}",
        runner.calls()
    );

    assert_eq!(runner.count("gcloud auth login"), 0);
    assert_eq!(prompter.asked("Have you added them?"), 1);
    let notices = prompter.notices.lock().unwrap().clone();
    assert!(notices.iter().any(|n| n.contains("ns-cloud-b1.googledomains.com.")));
}

#[tokio::test]
async fn test_login_and_location_prompts_when_gcloud_is_unconfigured() {
    let dir = TempDir::new().unwrap();
    let store = ClusterStore::new(dir.path());
    let settings = test_settings();
    let source = catalogue();
    let runner = cloud_runner();

    let reads = Arc::new(AtomicUsize::new(0));
    let seen = reads.clone();
    runner.on("gcloud config list", move |_| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(r#"{"core": {"disable_usage_reporting": "True"}}"#.to_string())
        } else {
            Ok(r#"{"core": {"account": "new@example.com"}}"#.to_string())
        }
    });
    runner.ok("gcloud compute regions list", "asia-east1\neurope-west1\nus-central1\n");
    runner.ok("gcloud compute zones list", "europe-west1-b\neurope-west1-c\neurope-west1-d\n");

    let prompter = FakePrompter::new()
        .choose("europe-west1")
        .choose("europe-west1-c")
        .choose("proj-2");

    let state = Provisioner::new(exec(&runner, &prompter), &store, &settings, &source)
        .create("demo", "demo.example.com")
        .await
        .unwrap();

    assert_eq!(state.account, "new@example.com");
    assert_eq!(state.region, "europe-west1");
    assert_eq!(state.zone, "europe-west1-c");
    assert_eq!(state.project, "proj-2");

    assert_eq!(reads.load(Ordering::SeqCst), 2);
    assert!(runner.position("gcloud auth login") < runner.position("gcloud compute regions list"));
    assert!(runner.position("--filter name~'europe-west1' --sort-by=name") < runner.position("gcloud projects list"));
    assert_eq!(
        runner.count("gcloud iam service-accounts create demo-storage"),
        1
    );
    assert_eq!(runner.count("demo-storage@proj-2.iam.gserviceaccount.com"), 3);
}

#[tokio::test]
async fn test_existing_dns_zone_still_waits_for_delegation() {
    let dir = TempDir::new().unwrap();
    let store = ClusterStore::new(dir.path());
    let settings = test_settings();
    let source = catalogue();
    let runner = cloud_runner();
    runner.fail(
        "gcloud dns managed-zones create",
        "ERROR: (gcloud.dns.managed-zones.create) The resource 'entity.managedZone' named 'demo' already exists",
    );
    let prompter = FakePrompter::new().confirm_with(&[false, false, true]);

    Provisioner::new(exec(&runner, &prompter), &store, &settings, &source)
        .create("demo", "demo.example.com")
        .await
        .unwrap();

    assert_eq!(runner.count("gcloud dns record-sets list"), 1);
    assert_eq!(prompter.asked("Have you added them?"), 3);
}

#[tokio::test]
async fn test_project_selection_failure_aborts_before_any_resource() {
    let dir = TempDir::new().unwrap();
    let store = ClusterStore::new(dir.path());
    let settings = test_settings();
    let source = catalogue();
    let runner = cloud_runner();
    runner.ok("gcloud projects list", "[]");
    let prompter = FakePrompter::new();

    let err = Provisioner::new(exec(&runner, &prompter), &store, &settings, &source)
        .create("demo", "demo.example.com")
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::StageFailed { ref operation, .. } if operation == "list-gcloud-projects"));
    assert_eq!(runner.count("gsutil"), 0);
    assert_eq!(runner.count("clusters create"), 0);
    assert!(store.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_rerun_keeps_existing_cluster_directory() {
    let dir = TempDir::new().unwrap();
    let store = ClusterStore::new(dir.path());
    let settings = test_settings();
    let source = catalogue();
    let runner = cloud_runner();
    runner.ok("gcloud projects list", "[]");
    let prompter = FakePrompter::new();
    std::fs::create_dir_all(dir.path().join("demo")).unwrap();
    std::fs::write(dir.path().join("demo").join("config.json"), "{}").unwrap();

    Provisioner::new(exec(&runner, &prompter), &store, &settings, &source)
        .create("demo", "demo.example.com")
        .await
        .unwrap_err();

    assert_eq!(store.list().unwrap(), vec!["demo".to_string()]);
    assert!(dir.path().join("demo").join("config.json").exists());
}

#[tokio::test]
async fn test_identity_failures_are_skipped() {
    let dir = TempDir::new().unwrap();
    let store = ClusterStore::new(dir.path());
    let settings = test_settings();
    let source = catalogue();
    let runner = cloud_runner();
    runner.fail(
        "add-iam-policy-binding",
        "ERROR: (gcloud.projects.add-iam-policy-binding) User does not have permission",
    );
    let prompter = FakePrompter::new();

    Provisioner::new(exec(&runner, &prompter), &store, &settings, &source)
        .create("demo", "demo.example.com")
        .await
        .unwrap();

    assert_eq!(runner.count("add-iam-policy-binding"), 2);
    assert_eq!(runner.count("service-accounts keys create"), 3);
    assert!(dir.path().join("demo").join("config.json").exists());
}

#[tokio::test]
async fn test_rollout_failure_still_persists_state() {
    let dir = TempDir::new().unwrap();
    let store = ClusterStore::new(dir.path());
    let settings = test_settings();
    let source = common::MemorySource::new();
    let runner = cloud_runner();
    let prompter = FakePrompter::new();

    Provisioner::new(exec(&runner, &prompter), &store, &settings, &source)
        .create("demo", "demo.example.com")
        .await
        .unwrap();

    assert_eq!(runner.count("kubectl apply"), 0);
    assert!(store.load("demo").unwrap().app_index.is_none());
}

#[tokio::test]
async fn test_cancelled_run_persists_nothing() {
    let dir = TempDir::new().unwrap();
    let store = ClusterStore::new(dir.path());
    let settings = test_settings();
    let source = catalogue();
    let runner = FakeRunner::new();
    let prompter = FakePrompter::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = Provisioner::new(
        ExecContext::new(&runner, &prompter, cancel),
        &store,
        &settings,
        &source,
    )
    .create("demo", "demo.example.com")
    .await
    .unwrap_err();

    assert!(err.is_cancelled());
    assert!(store.list().unwrap().is_empty());
}

/// Never confirms; the operator interrupts while the question is open.
struct InterruptedOperator {
    cancel: CancellationToken,
    confirms: AtomicUsize,
}

impl Prompter for InterruptedOperator {
    fn select(&self, _message: &str, options: &[String]) -> Result<String, ProvisionError> {
        Ok(options[0].clone())
    }

    fn confirm(&self, _message: &str) -> Result<bool, ProvisionError> {
        self.confirms.fetch_add(1, Ordering::SeqCst);
        self.cancel.cancel();
        Ok(false)
    }

    fn notify(&self, _message: &str) {}
}

#[tokio::test]
async fn test_interrupt_ends_nameserver_confirmation() {
    let dir = TempDir::new().unwrap();
    let store = ClusterStore::new(dir.path());
    let settings = test_settings();
    let source = catalogue();
    let runner = cloud_runner();
    let cancel = CancellationToken::new();
    let prompter = InterruptedOperator {
        cancel: cancel.clone(),
        confirms: AtomicUsize::new(0),
    };

    let err = Provisioner::new(
        ExecContext::new(&runner, &prompter, cancel),
        &store,
        &settings,
        &source,
    )
    .create("demo", "demo.example.com")
    .await
    .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(prompter.confirms.load(Ordering::SeqCst), 1);
    assert_eq!(runner.count("clusters create"), 0);
    assert!(store.list().unwrap().is_empty());
}
