//! Interactive questions asked from inside the pipeline.

use crate::error::ProvisionError;

/// Answers the questions hooks need a human for.
///
/// Implementations validate and re-ask on their own; a returned error means
/// the question could not be answered at all (closed terminal, interrupt).
pub trait Prompter: Send + Sync {
    /// Pick one of `options`. Returns the chosen option verbatim.
    fn select(&self, message: &str, options: &[String]) -> Result<String, ProvisionError>;

    /// Yes/no confirmation.
    fn confirm(&self, message: &str) -> Result<bool, ProvisionError>;

    /// Show information to the operator.
    fn notify(&self, message: &str) {
        println!("{}", message);
    }
}
