//! Configuration validation.
//!
//! Semantic checks only; serde handles the syntactic layer. Returns all
//! validation errors, not just the first.

use thiserror::Error;

use crate::config::schema::AgentConfig;

/// A single semantic problem found in the configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("service.name must not be empty")]
    EmptyServiceName,

    #[error("pipeline.excluded_methods entry {0:?} is not a valid HTTP method token")]
    InvalidExcludedMethod(String),

    #[error("pipeline.request_id_header must not be empty")]
    EmptyRequestIdHeader,

    #[error("observability.metrics_address {0:?} is not a valid socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AgentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.service.name.trim().is_empty() {
        errors.push(ValidationError::EmptyServiceName);
    }

    for method in &config.pipeline.excluded_methods {
        let valid = !method.is_empty()
            && method
                .chars()
                .all(|c| c.is_ascii_alphabetic() && c.is_ascii_uppercase());
        if !valid {
            errors.push(ValidationError::InvalidExcludedMethod(method.clone()));
        }
    }

    if config.pipeline.request_id_header.trim().is_empty() {
        errors.push(ValidationError::EmptyRequestIdHeader);
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
