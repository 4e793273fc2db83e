//! Fakes shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use provision::{
    ClusterState, CommandRunner, ExecContext, ManifestSource, Prompter, ProvisionError, Settings,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

type Responder = Box<dyn Fn(&str) -> Result<String, String> + Send + Sync>;

/// Records every command line and answers from scripted rules.
///
/// Rules match on a substring of `program args...`; the most recently added
/// matching rule answers. Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct FakeRunner {
    rules: Mutex<Vec<(String, Responder)>>,
    calls: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, pattern: &str, respond: F)
    where
        F: Fn(&str) -> Result<String, String> + Send + Sync + 'static,
    {
        self.rules
            .lock()
            .unwrap()
            .push((pattern.to_string(), Box::new(respond)));
    }

    pub fn ok(&self, pattern: &str, stdout: &str) {
        let stdout = stdout.to_string();
        self.on(pattern, move |_| Ok(stdout.clone()));
    }

    pub fn fail(&self, pattern: &str, stderr: &str) {
        let stderr = stderr.to_string();
        self.on(pattern, move |_| Err(stderr.clone()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(pattern)).count()
    }

    /// Position of the first call containing `pattern`.
    pub fn position(&self, pattern: &str) -> usize {
        self.calls()
            .iter()
            .position(|c| c.contains(pattern))
            .unwrap_or_else(|| panic!("no call matching {:?} in {:#?}", pattern, self.calls()))
    }

    fn answer(&self, program: &str, args: &[String]) -> Result<String, ProvisionError> {
        let line = format!("{} {}", program, args.join(" "));
        self.calls.lock().unwrap().push(line.clone());

        let rules = self.rules.lock().unwrap();
        let reply = rules
            .iter()
            .rev()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, respond)| respond(&line))
            .unwrap_or_else(|| Ok(String::new()));

        reply.map_err(|detail| ProvisionError::CommandFailed {
            program: program.to_string(),
            detail,
        })
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<String, ProvisionError> {
        if cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled(program.to_string()));
        }
        self.answer(program, args)
    }

    async fn run_interactive(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), ProvisionError> {
        if cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled(program.to_string()));
        }
        self.answer(program, args).map(|_| ())
    }
}

/// Scripted answers. `select` picks the first option containing the next
/// scripted answer (or the first option); `confirm` pops scripted answers
/// and says yes once they run out.
#[derive(Default)]
pub struct FakePrompter {
    selections: Mutex<VecDeque<String>>,
    confirmations: Mutex<VecDeque<bool>>,
    pub questions: Mutex<Vec<String>>,
    pub notices: Mutex<Vec<String>>,
}

impl FakePrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn choose(self, answer: &str) -> Self {
        self.selections.lock().unwrap().push_back(answer.to_string());
        self
    }

    pub fn confirm_with(self, answers: &[bool]) -> Self {
        self.confirmations.lock().unwrap().extend(answers);
        self
    }

    pub fn asked(&self, pattern: &str) -> usize {
        self.questions
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.contains(pattern))
            .count()
    }
}

impl Prompter for FakePrompter {
    fn select(&self, message: &str, options: &[String]) -> Result<String, ProvisionError> {
        self.questions.lock().unwrap().push(message.to_string());
        let wanted = self.selections.lock().unwrap().pop_front();
        let choice = match wanted {
            Some(w) => options.iter().find(|o| o.contains(&w)),
            None => options.first(),
        };
        choice
            .cloned()
            .ok_or_else(|| ProvisionError::Prompt(format!("nothing to choose for {}", message)))
    }

    fn confirm(&self, message: &str) -> Result<bool, ProvisionError> {
        self.questions.lock().unwrap().push(message.to_string());
        Ok(self.confirmations.lock().unwrap().pop_front().unwrap_or(true))
    }

    fn notify(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }
}

/// Manifests keyed by location.
#[derive(Default)]
pub struct MemorySource {
    documents: HashMap<String, String>,
    pub fetches: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, location: &str, body: &str) -> Self {
        self.documents.insert(location.to_string(), body.to_string());
        self
    }
}

#[async_trait]
impl ManifestSource for MemorySource {
    async fn fetch(&self, location: &str) -> Result<String, ProvisionError> {
        self.fetches.lock().unwrap().push(location.to_string());
        self.documents
            .get(location)
            .cloned()
            .ok_or_else(|| ProvisionError::InvalidInput(format!("404 {}", location)))
    }
}

pub const INDEX_URL: &str = "mem://index.yaml";

pub const GCLOUD_CONFIG: &str = r#"{
  "compute": {"region": "europe-west1", "zone": "europe-west1-b"},
  "core": {"account": "me@example.com", "disable_usage_reporting": "True", "project": "proj-0"}
}"#;

pub const PROJECTS: &str = r#"[
  {"createTime": "2020-05-01T10:00:00.000Z", "lifecycleState": "ACTIVE", "name": "Demo", "projectId": "proj-1", "projectNumber": "1001"},
  {"createTime": "2020-05-02T10:00:00.000Z", "lifecycleState": "ACTIVE", "name": "Sandbox", "projectId": "proj-2", "projectNumber": "1002"}
]"#;

pub const RECORD_SETS: &str = r#"[
  {"kind": "dns#resourceRecordSet", "name": "demo.example.com.", "rrdatas": ["ns-cloud-b1.googledomains.com.", "ns-cloud-b2.googledomains.com."], "ttl": 21600, "type": "NS"},
  {"kind": "dns#resourceRecordSet", "name": "demo.example.com.", "rrdatas": ["ns-cloud-b1.googledomains.com. cloud-dns-hostmaster.google.com. 1 21600 3600 259200 300"], "ttl": 21600, "type": "SOA"}
]"#;

pub const INDEX: &str = r#"
apiVersion: v1
kind: AppIndex
metadata:
  name: kubepaas
  version: 0.1.0
apps:
  - name: externalDNS
    path: mem://external-dns.yaml
  - name: legacy-dashboard
    path: mem://legacy.yaml
    deprecated: true
  - name: wildcard-cert
    path: mem://wildcard-cert.yaml
  - name: externalDNS
    path: mem://external-dns-v2.yaml
"#;

pub const EXTERNAL_DNS: &str = "args:\n  - --domain-filter={{ .DomainName }}\n  - --google-project={{ .ProjectName }}\n";
pub const WILDCARD_CERT: &str = "spec:\n  secretName: wildcard-cert-secret\n  dnsNames:\n    - \"{{ .DNSName }}\"\n";

/// Runner scripted for a clean provisioning run.
pub fn cloud_runner() -> FakeRunner {
    let runner = FakeRunner::new();
    runner.ok("gcloud config list", GCLOUD_CONFIG);
    runner.ok("gcloud projects list", PROJECTS);
    runner.ok("gcloud dns record-sets list", RECORD_SETS);
    runner
}

pub fn catalogue() -> MemorySource {
    MemorySource::new()
        .with(INDEX_URL, INDEX)
        .with("mem://external-dns.yaml", EXTERNAL_DNS)
        .with("mem://wildcard-cert.yaml", WILDCARD_CERT)
}

pub fn test_settings() -> Settings {
    Settings {
        index_url: INDEX_URL.to_string(),
        ..Settings::default()
    }
}

pub fn exec<'a>(runner: &'a FakeRunner, prompter: &'a FakePrompter) -> ExecContext<'a> {
    ExecContext::new(runner, prompter, CancellationToken::new())
}

/// State as it looks after account and project selection.
pub fn demo_state() -> ClusterState {
    let mut state = ClusterState::new("demo", "demo.example.com");
    state.account = "me@example.com".to_string();
    state.project = "proj-1".to_string();
    state.region = "europe-west1".to_string();
    state.zone = "europe-west1-b".to_string();
    state
}
