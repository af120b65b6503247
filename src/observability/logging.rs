//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the `tracing` subscriber once per process
//! - Pick the filter from `RUST_LOG`, falling back to the configured level
//!
//! # Design Decisions
//! - JSON format for production, pretty format for development
//! - Spans from the log reporter use their own target so they can be
//!   filtered independently of agent logs

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter {filter:?}: {reason}")]
    Filter { filter: String, reason: String },

    #[error("a global logger is already installed")]
    AlreadyInstalled,
}

/// Filter directives for a configured level, keeping HTTP plumbing quieter.
pub fn default_directives(level: &str) -> String {
    format!("mesh_agent={level},agent_cli={level},tower_http=info")
}

fn filter(config: &ObservabilityConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = default_directives(&config.log_level);
    EnvFilter::try_new(&directives).map_err(|e| LoggingError::Filter {
        filter: directives,
        reason: e.to_string(),
    })
}

/// Install the global subscriber.
pub fn init(config: &ObservabilityConfig) -> Result<(), LoggingError> {
    let filter = filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    result.map_err(|_| LoggingError::AlreadyInstalled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_parse() {
        assert!(EnvFilter::try_new(default_directives("debug")).is_ok());
    }
}
