/// External process runner
///
/// Runs cloud/cluster CLIs as opaque child processes. Captured mode drains
/// stdout and stderr concurrently with waiting for exit so a chatty tool can
/// never block on a full pipe.
use crate::error::ProvisionError;
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Launches external programs on behalf of operations.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with captured output. Returns stdout on success.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<String, ProvisionError>;

    /// Run `program` attached to the caller's terminal. Success is exit-code based.
    async fn run_interactive(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), ProvisionError>;
}

/// Runner backed by real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    echo: bool,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self { echo: true }
    }

    /// Runner that does not print the command line before running it.
    pub fn quiet() -> Self {
        Self { echo: false }
    }

    fn announce(&self, program: &str, args: &[String]) {
        if self.echo {
            println!("{} {}", program, args.join(" "));
        }
        tracing::debug!("[Runner] {} {:?}", program, args);
    }
}

async fn drain<R>(reader: Option<R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

fn exit_failure(program: &str, status: ExitStatus, stderr: &[u8]) -> ProvisionError {
    let detail = String::from_utf8_lossy(stderr).trim().to_string();
    if detail.is_empty() {
        ProvisionError::CommandFailed {
            program: program.to_string(),
            detail: status.to_string(),
        }
    } else {
        ProvisionError::CommandFailed {
            program: program.to_string(),
            detail,
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<String, ProvisionError> {
        self.announce(program, args);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProvisionError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Dropping the child on cancellation kills it (kill_on_drop).
        let completion = async { tokio::try_join!(drain(stdout), drain(stderr), child.wait()) };
        let (out, err, status) = tokio::select! {
            res = completion => res.map_err(|source| ProvisionError::Spawn {
                program: program.to_string(),
                source,
            })?,
            _ = cancel.cancelled() => {
                tracing::warn!("[Runner] Cancelled {}", program);
                return Err(ProvisionError::Cancelled(program.to_string()));
            }
        };

        if !status.success() {
            return Err(exit_failure(program, status, &err));
        }

        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    async fn run_interactive(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), ProvisionError> {
        self.announce(program, args);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProvisionError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let status = tokio::select! {
            res = child.wait() => res.map_err(|source| ProvisionError::Spawn {
                program: program.to_string(),
                source,
            })?,
            _ = cancel.cancelled() => {
                tracing::warn!("[Runner] Cancelled interactive {}", program);
                return Err(ProvisionError::Cancelled(program.to_string()));
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(exit_failure(program, status, &[]))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let runner = ProcessRunner::quiet();
        let out = runner
            .run("sh", &args(&["-c", "echo hello"]), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_prefers_stderr_on_failure() {
        let runner = ProcessRunner::quiet();
        let err = runner
            .run(
                "sh",
                &args(&["-c", "echo boom >&2; exit 3"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.detail(), Some("boom"));
    }

    #[tokio::test]
    async fn test_run_reports_status_without_stderr() {
        let runner = ProcessRunner::quiet();
        let err = runner
            .run("sh", &args(&["-c", "exit 4"]), &CancellationToken::new())
            .await
            .unwrap_err();
        let detail = err.detail().unwrap_or_default().to_string();
        assert!(detail.contains('4'), "unexpected detail: {}", detail);
    }

    #[tokio::test]
    async fn test_run_drains_large_output_on_both_streams() {
        let runner = ProcessRunner::quiet();
        let script = "i=0; while [ $i -lt 20000 ]; do echo out-line-$i; echo err-line-$i >&2; i=$((i+1)); done";
        let out = runner
            .run("sh", &args(&["-c", script]), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.lines().count(), 20000);
    }

    #[tokio::test]
    async fn test_run_missing_program_is_spawn_error() {
        let runner = ProcessRunner::quiet();
        let err = runner
            .run("definitely-not-a-real-binary-xyz", &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_run_cancelled() {
        let runner = ProcessRunner::quiet();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = runner
            .run("sleep", &args(&["5"]), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
