/// Operation: a named external-process invocation
///
/// Arguments are either fixed or generated from the cluster state at the
/// moment of execution. An optional post-hook observes the completed
/// operation and may mutate state or run sibling operations.
use crate::error::ProvisionError;
use crate::prompt::Prompter;
use crate::registry::OperationSet;
use crate::runner::CommandRunner;
use crate::state::ClusterState;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub type ArgGenerator = Arc<dyn Fn(&ClusterState) -> Vec<String> + Send + Sync>;

/// Collaborators shared by every operation in a run.
pub struct ExecContext<'a> {
    pub runner: &'a dyn CommandRunner,
    pub prompter: &'a dyn Prompter,
    pub cancel: CancellationToken,
}

impl<'a> ExecContext<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        prompter: &'a dyn Prompter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            runner,
            prompter,
            cancel,
        }
    }
}

/// What a post-hook gets to work with.
pub struct HookContext<'a, 'b> {
    pub exec: &'a ExecContext<'b>,
    pub state: &'a mut ClusterState,
    pub siblings: Option<&'a OperationSet>,
}

impl HookContext<'_, '_> {
    /// Fresh copy of a sibling operation, ready to execute.
    pub fn sibling(&self, name: &str) -> Result<Operation, ProvisionError> {
        match self.siblings {
            Some(set) => set.lookup(name).cloned(),
            None => Err(ProvisionError::OperationNotFound(name.to_string())),
        }
    }

    /// Look up a sibling by name, run it, and return its stdout.
    pub async fn run_sibling(&mut self, name: &str) -> Result<String, ProvisionError> {
        let mut op = self.sibling(name)?;
        op.execute_with(self.exec, self.state, self.siblings).await?;
        op.into_output()
    }
}

/// Runs after an operation completes, successful or not.
#[async_trait]
pub trait PostHook: Send + Sync {
    async fn after(
        &self,
        op: &Operation,
        ctx: &mut HookContext<'_, '_>,
    ) -> Result<(), ProvisionError>;
}

#[derive(Clone)]
pub enum Args {
    Fixed(Vec<String>),
    Generated(ArgGenerator),
}

/// Result of the most recent execution.
#[derive(Debug, Clone, Default)]
pub struct OperationResult {
    pub succeeded: bool,
    pub stdout: String,
    pub error: Option<Arc<ProvisionError>>,
}

#[derive(Clone)]
pub struct Operation {
    pub name: String,
    pub program: String,
    args: Args,
    /// Excluded from pipeline iteration, reachable only by name.
    pub internal: bool,
    /// Attach the caller's terminal instead of capturing output.
    pub interactive: bool,
    /// Failure of this operation aborts the pipeline.
    pub required: bool,
    hook: Option<Arc<dyn PostHook>>,
    last_args: Vec<String>,
    result: OperationResult,
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("program", &self.program)
            .field("internal", &self.internal)
            .field("interactive", &self.interactive)
            .field("required", &self.required)
            .field("has_hook", &self.hook.is_some())
            .field("result", &self.result)
            .finish()
    }
}

impl Operation {
    pub fn new<I, S>(name: impl Into<String>, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_args(
            name,
            program,
            Args::Fixed(args.into_iter().map(Into::into).collect()),
        )
    }

    /// Operation whose arguments are computed from the state at execution time.
    pub fn generated<F>(name: impl Into<String>, program: impl Into<String>, generate: F) -> Self
    where
        F: Fn(&ClusterState) -> Vec<String> + Send + Sync + 'static,
    {
        Self::with_args(name, program, Args::Generated(Arc::new(generate)))
    }

    fn with_args(name: impl Into<String>, program: impl Into<String>, args: Args) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
            internal: false,
            interactive: false,
            required: false,
            hook: None,
            last_args: Vec::new(),
            result: OperationResult::default(),
        }
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_hook(mut self, hook: impl PostHook + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn succeeded(&self) -> bool {
        self.result.succeeded
    }

    pub fn stdout(&self) -> &str {
        &self.result.stdout
    }

    pub fn error(&self) -> Option<&ProvisionError> {
        self.result.error.as_deref()
    }

    /// Arguments used by the most recent execution.
    pub fn last_args(&self) -> &[String] {
        &self.last_args
    }

    /// Arguments the operation would run with against `state`.
    pub fn resolve_args(&self, state: &ClusterState) -> Vec<String> {
        match &self.args {
            Args::Fixed(args) => args.clone(),
            Args::Generated(generate) => generate(state),
        }
    }

    /// Execute without sibling lookup. Returns the post-hook outcome.
    pub async fn execute(
        &mut self,
        exec: &ExecContext<'_>,
        state: &mut ClusterState,
    ) -> Result<(), ProvisionError> {
        self.execute_with(exec, state, None).await
    }

    /// Execute the command, then the post-hook. Returns the post-hook outcome;
    /// the command outcome lives in the result fields.
    pub async fn execute_with(
        &mut self,
        exec: &ExecContext<'_>,
        state: &mut ClusterState,
        siblings: Option<&OperationSet>,
    ) -> Result<(), ProvisionError> {
        self.result = OperationResult::default();
        self.last_args = self.resolve_args(state);

        tracing::info!("[Operation] Executing '{}'", self.name);
        let started = std::time::Instant::now();

        let outcome = if self.interactive {
            exec.runner
                .run_interactive(&self.program, &self.last_args, &exec.cancel)
                .await
                .map(|_| String::new())
        } else {
            exec.runner
                .run(&self.program, &self.last_args, &exec.cancel)
                .await
        };

        match outcome {
            Ok(stdout) => {
                self.result.succeeded = true;
                self.result.stdout = stdout;
                tracing::info!(
                    "[TIMING] Operation '{}' completed in {}ms",
                    self.name,
                    started.elapsed().as_millis()
                );
            }
            Err(e) => {
                tracing::debug!("[Operation] '{}' failed: {}", self.name, e);
                self.result.error = Some(Arc::new(e));
            }
        }

        match self.hook.clone() {
            Some(hook) => {
                let mut ctx = HookContext {
                    exec,
                    state,
                    siblings,
                };
                hook.after(self, &mut ctx).await
            }
            None => Ok(()),
        }
    }

    /// Failure of the last execution as an owned error.
    pub fn failure(&self) -> Option<ProvisionError> {
        if self.result.succeeded {
            return None;
        }
        Some(match self.error() {
            Some(ProvisionError::CommandFailed { program, detail }) => {
                ProvisionError::CommandFailed {
                    program: program.clone(),
                    detail: detail.clone(),
                }
            }
            Some(ProvisionError::Cancelled(what)) => ProvisionError::Cancelled(what.clone()),
            Some(other) => ProvisionError::StageFailed {
                operation: self.name.clone(),
                reason: other.to_string(),
            },
            None => ProvisionError::StageFailed {
                operation: self.name.clone(),
                reason: "not executed".to_string(),
            },
        })
    }

    /// Stdout of a successful execution, or its failure.
    pub fn into_output(self) -> Result<String, ProvisionError> {
        match self.failure() {
            None => Ok(self.result.stdout),
            Some(e) => Err(e),
        }
    }

    /// Execute once with no siblings and turn any failure into an error.
    pub async fn run_once(
        mut self,
        exec: &ExecContext<'_>,
        state: &mut ClusterState,
    ) -> Result<String, ProvisionError> {
        self.execute(exec, state).await?;
        self.into_output()
    }
}
