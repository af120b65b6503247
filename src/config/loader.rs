//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::AgentConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Parse a document. `.json` files are read as JSON, anything else as TOML.
pub fn parse_config(content: &str, path: &Path) -> Result<AgentConfig, ConfigError> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        Ok(serde_json::from_str(content)?)
    } else {
        Ok(toml::from_str(content)?)
    }
}

/// Load and validate configuration from a TOML or JSON file.
pub fn load_config(path: &Path) -> Result<AgentConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = parse_config(&content, path)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("mesh-agent-{}-{name}", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_json() {
        let path = write_temp(
            "agent.json",
            r#"{"address": "127.0.0.1:9901", "plugins": [{"kind": "Zipkin", "name": "zipkin", "serviceName": "orders"}]}"#,
        );
        let config = load_config(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.address, "127.0.0.1:9901");
        assert_eq!(config.plugins[0].settings["serviceName"], "orders");
    }

    #[test]
    fn test_load_toml_with_dotted_keys() {
        let path = write_temp(
            "agent.toml",
            r#"
            address = "127.0.0.1:9902"

            [[plugins]]
            kind = "Zipkin"
            name = "zipkin"
            "tracing.sample.rate" = 0.5
            "#,
        );
        let config = load_config(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.plugins[0].settings["tracing.sample.rate"], 0.5);
    }

    #[test]
    fn test_validation_errors_reported() {
        let path = write_temp("bad.toml", "address = \"nowhere\"\n");
        let err = load_config(&path).unwrap_err();
        fs::remove_file(&path).ok();

        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
        assert!(err.to_string().contains("address"));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_config(Path::new("/nonexistent/agent.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
