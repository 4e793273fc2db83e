//! Input patterns enforced at the prompt boundary.

use crate::error::ProvisionError;
use regex::Regex;
use std::sync::OnceLock;

static CLUSTER_NAME: OnceLock<Regex> = OnceLock::new();
static DOMAIN_NAME: OnceLock<Regex> = OnceLock::new();

fn cluster_name_pattern() -> &'static Regex {
    CLUSTER_NAME.get_or_init(|| {
        Regex::new(r"^([^\W])(?:[a-zA-Z1-9-]+)$").expect("cluster name pattern")
    })
}

fn domain_name_pattern() -> &'static Regex {
    DOMAIN_NAME.get_or_init(|| {
        Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z0-9][a-z0-9-]{0,61}[a-z0-9]$")
            .expect("domain name pattern")
    })
}

pub fn validate_cluster_name(name: &str) -> Result<(), ProvisionError> {
    if cluster_name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(ProvisionError::InvalidInput(
            "please enter valid name. Name can contains [ A-Z a-z 1-9 or `-` ]".to_string(),
        ))
    }
}

pub fn validate_domain_name(domain: &str) -> Result<(), ProvisionError> {
    if domain_name_pattern().is_match(domain) {
        Ok(())
    } else {
        Err(ProvisionError::InvalidInput(
            "please enter valid domain name".to_string(),
        ))
    }
}
