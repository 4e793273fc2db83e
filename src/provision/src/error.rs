//! Error type for provisioning operations.

/// Error type for provisioning, teardown and rollout.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Operation redefined: {0}")]
    DuplicateOperation(String),

    #[error("No operation found of name {0}")]
    OperationNotFound(String),

    #[error("{program} failed: {detail}")]
    CommandFailed { program: String, detail: String },

    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} was cancelled")]
    Cancelled(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Operation {operation} failed: {reason}")]
    StageFailed { operation: String, reason: String },

    #[error("No cluster found with name \"{0}\"")]
    ClusterNotFound(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ProvisionError {
    /// Failure detail as reported by the external tool, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ProvisionError::CommandFailed { detail, .. } => Some(detail),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProvisionError::Cancelled(_))
    }

    /// True when a create call failed because the resource is already there.
    pub fn is_already_exists(&self) -> bool {
        self.detail()
            .map(|d| d.contains("already exists"))
            .unwrap_or(false)
    }
}
