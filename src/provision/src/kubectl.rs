/// kubectl invocations used by cluster setup and rollout
use crate::operation::Operation;
use std::path::Path;
use std::time::Duration;

pub const KUBECTL: &str = "kubectl";

/// `kubectl apply -f <manifest>`
pub fn apply(app: &str, path: &Path) -> Operation {
    Operation::new(
        format!("kubectl/apply-{}", app),
        KUBECTL,
        ["apply".to_string(), "-f".to_string(), path.display().to_string()],
    )
}

pub fn create_namespace(namespace: &str) -> Operation {
    Operation::new(
        format!("kubectl/create-ns-{}", namespace),
        KUBECTL,
        ["create", "ns", namespace],
    )
}

/// Generic secret, optionally holding one file under the secret's own name.
pub fn create_secret(name: &str, namespace: &str, from_file: Option<&Path>) -> Operation {
    let mut args = vec![
        "create".to_string(),
        "secret".to_string(),
        "generic".to_string(),
        name.to_string(),
        format!("--namespace={}", namespace),
    ];
    if let Some(path) = from_file {
        args.push(format!("--from-file={}={}", name, path.display()));
    }
    Operation::new(format!("kubectl/create-secret-{}", name), KUBECTL, args)
}

/// Block until every pod in every namespace is ready, or `timeout`.
pub fn wait_pods_ready(timeout: Duration) -> Operation {
    Operation::new(
        "kubectl/wait-pods-ready",
        KUBECTL,
        [
            "wait".to_string(),
            "--for=condition=Ready".to_string(),
            format!("--timeout={}s", timeout.as_secs()),
            "pods".to_string(),
            "--all".to_string(),
            "--all-namespaces=true".to_string(),
        ],
    )
}

pub fn get_secret(name: &str) -> Operation {
    Operation::new(
        format!("kubectl/get-secret-{}", name),
        KUBECTL,
        ["get", "secret", name],
    )
}

pub fn cluster_admin_binding(account: &str) -> Vec<String> {
    vec![
        "create".to_string(),
        "clusterrolebinding".to_string(),
        "cluster-admin-binding".to_string(),
        "--clusterrole=cluster-admin".to_string(),
        format!("--user={}", account),
    ]
}
