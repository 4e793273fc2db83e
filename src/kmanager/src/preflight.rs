//! Required CLI tools.

use provision::CommandRunner;
use tokio_util::sync::CancellationToken;

struct Tool {
    program: &'static str,
    args: &'static [&'static str],
    guide: &'static str,
}

const TOOLS: [Tool; 2] = [
    Tool {
        program: "kubectl",
        args: &["version", "--client"],
        guide: "https://kubernetes.io/docs/tasks/tools/install-kubectl",
    },
    Tool {
        program: "gcloud",
        args: &["--version"],
        guide: "https://cloud.google.com/sdk/docs/install",
    },
];

/// Check that every required tool runs. Prints an install hint for each
/// missing one and returns false if any is missing.
pub async fn check_tools(runner: &dyn CommandRunner, cancel: &CancellationToken) -> bool {
    let mut ok = true;
    for tool in &TOOLS {
        let args: Vec<String> = tool.args.iter().map(|a| a.to_string()).collect();
        if let Err(e) = runner.run(tool.program, &args, cancel).await {
            tracing::debug!("[Preflight] {} check failed: {}", tool.program, e);
            eprintln!(
                "Seems like you don't have \"{}\" installed. Please follow the installation guide: {}",
                tool.program, tool.guide
            );
            ok = false;
        }
    }
    ok
}
