//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that addresses parse and plugin specs are addressable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AgentConfig → Result<(), Vec<ValidationError>>
//! - Kind-specific settings are checked by each plugin when it is built

use std::net::SocketAddr;

use crate::config::schema::AgentConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("address {0:?} is not a socket address")]
    Address(String),

    #[error("metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),

    #[error("plugin No.{index} has an empty kind")]
    EmptyKind { index: usize },

    #[error("plugin No.{index} ({kind}) has an empty name")]
    EmptyName { index: usize, kind: String },

    #[error("control.request_timeout_secs must be greater than zero")]
    ZeroTimeout,
}

pub fn validate_config(config: &AgentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::Address(config.address.clone()));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if config.control.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    for (i, spec) in config.plugins.iter().enumerate() {
        let index = i + 1;
        if spec.kind.trim().is_empty() {
            errors.push(ValidationError::EmptyKind { index });
        } else if spec.name.trim().is_empty() {
            errors.push(ValidationError::EmptyName {
                index,
                kind: spec.kind.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
