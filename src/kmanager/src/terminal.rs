//! Line-oriented terminal prompts.

use provision::{validate_cluster_name, validate_domain_name, Prompter, ProvisionError};
use std::io::{self, BufRead, Write};
use tokio_util::sync::CancellationToken;

/// Prompts on stdin. An answer read after the run was interrupted is
/// discarded and the prompt fails with `Cancelled`.
pub struct TerminalPrompter {
    cancel: CancellationToken,
}

impl TerminalPrompter {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    fn read_line(&self, question: &str) -> Result<String, ProvisionError> {
        if self.cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled(question.to_string()));
        }
        print!("{} ", question);
        io::stdout().flush()?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if self.cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled(question.to_string()));
        }
        if read == 0 {
            return Err(ProvisionError::Prompt("input closed".to_string()));
        }
        Ok(line.trim().to_string())
    }

    /// Ask until `validate` accepts the answer.
    fn ask_valid<F>(&self, question: &str, validate: F) -> Result<String, ProvisionError>
    where
        F: Fn(&str) -> Result<(), ProvisionError>,
    {
        loop {
            let answer = self.read_line(question)?;
            match validate(&answer) {
                Ok(()) => return Ok(answer),
                Err(e) => eprintln!("{}", e),
            }
        }
    }

    pub fn cluster_name(&self) -> Result<String, ProvisionError> {
        self.ask_valid("Cluster name:", validate_cluster_name)
    }

    pub fn domain_name(&self) -> Result<String, ProvisionError> {
        self.ask_valid("Domain name:", validate_domain_name)
    }
}

impl Prompter for TerminalPrompter {
    fn select(&self, message: &str, options: &[String]) -> Result<String, ProvisionError> {
        if options.is_empty() {
            return Err(ProvisionError::Prompt(format!("no options for '{}'", message)));
        }

        println!("{}", message);
        for (i, option) in options.iter().enumerate() {
            println!("  {:>3}) {}", i + 1, option);
        }

        loop {
            let answer = self.read_line(&format!("Select [1-{}]:", options.len()))?;
            match answer.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Ok(options[n - 1].clone()),
                _ => {
                    if let Some(exact) = options.iter().find(|o| **o == answer) {
                        return Ok(exact.clone());
                    }
                    eprintln!("please choose one of the listed options");
                }
            }
        }
    }

    fn confirm(&self, message: &str) -> Result<bool, ProvisionError> {
        let answer = self.read_line(&format!("{} [y/N]", message))?;
        Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
    }
}
