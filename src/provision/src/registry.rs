/// Operation sets: named, ordered, uniquely keyed collections of operations
///
/// Registration order is execution order. Duplicate names are rejected when
/// the set is built.
use crate::error::ProvisionError;
use crate::operation::{ExecContext, Operation};
use crate::state::ClusterState;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct OperationSet {
    name: String,
    ops: Vec<Operation>,
    index: HashMap<String, usize>,
}

impl OperationSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ops: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Build a set from `ops`, failing on the first duplicate name.
    pub fn from_operations(
        name: impl Into<String>,
        ops: impl IntoIterator<Item = Operation>,
    ) -> Result<Self, ProvisionError> {
        let mut set = Self::new(name);
        for op in ops {
            set.register(op)?;
        }
        Ok(set)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register(&mut self, op: Operation) -> Result<(), ProvisionError> {
        if self.index.contains_key(&op.name) {
            return Err(ProvisionError::DuplicateOperation(op.name));
        }
        self.index.insert(op.name.clone(), self.ops.len());
        self.ops.push(op);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&Operation, ProvisionError> {
        self.index
            .get(name)
            .map(|&i| &self.ops[i])
            .ok_or_else(|| ProvisionError::OperationNotFound(name.to_string()))
    }

    /// All operations in registration order.
    pub fn all(&self) -> impl Iterator<Item = &Operation> {
        self.ops.iter()
    }

    /// Operations the pipeline runs, in registration order.
    pub fn pipeline(&self) -> impl Iterator<Item = &Operation> {
        self.ops.iter().filter(|op| !op.internal)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Run every non-internal operation in order against `state`.
    ///
    /// Command failures and hook errors are logged and the run continues,
    /// except for `required` operations, whose failure aborts the set.
    /// Cancellation always aborts.
    pub async fn run(
        &mut self,
        exec: &ExecContext<'_>,
        state: &mut ClusterState,
    ) -> Result<(), ProvisionError> {
        tracing::info!(
            "[OperationSet] Running '{}' ({} operations)",
            self.name,
            self.pipeline().count()
        );

        for idx in 0..self.ops.len() {
            if self.ops[idx].internal {
                continue;
            }

            let mut op = self.ops[idx].clone();
            let hook_result = op.execute_with(exec, state, Some(&*self)).await;

            let command_failure = op.failure();
            if let Some(e) = &command_failure {
                tracing::error!("[OperationSet] '{}' failed: {}", op.name, e);
            }
            if let Err(e) = &hook_result {
                tracing::warn!("[OperationSet] '{}' hook error: {}", op.name, e);
            }

            let cancelled = exec.cancel.is_cancelled()
                || command_failure.as_ref().map(|e| e.is_cancelled()).unwrap_or(false);
            let name = op.name.clone();
            let required = op.required;
            self.ops[idx] = op;

            if cancelled {
                return Err(ProvisionError::Cancelled(name));
            }

            if required {
                if let Some(e) = command_failure {
                    return Err(ProvisionError::StageFailed {
                        operation: name,
                        reason: e.to_string(),
                    });
                }
                if let Err(e) = hook_result {
                    return Err(ProvisionError::StageFailed {
                        operation: name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}
