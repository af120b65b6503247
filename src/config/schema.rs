//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so a minimal document only lists plugins.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::plugins::{zipkin, Spec};

/// Default control-plane bind address.
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:9900";

/// Root configuration for the agent.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Control-plane bind address.
    pub address: String,

    /// Plugin specs, in composition order.
    pub plugins: Vec<Spec>,

    pub control: ControlPlaneConfig,

    pub observability: ObservabilityConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            plugins: Vec::new(),
            control: ControlPlaneConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Append a plugin spec.
    pub fn with_spec(mut self, spec: Spec) -> Self {
        self.plugins.push(spec);
        self
    }

    /// Merge `tags` into the default span tags of every Zipkin spec.
    pub fn with_zipkin_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        for spec in self.plugins.iter_mut().filter(|s| s.kind == zipkin::KIND) {
            let entry = spec
                .settings
                .entry("tags")
                .or_insert_with(|| serde_json::Value::Object(Default::default()));
            if !entry.is_object() {
                *entry = serde_json::Value::Object(Default::default());
            }
            if let Some(existing) = entry.as_object_mut() {
                for (key, value) in &tags {
                    existing.insert(key.clone(), serde_json::Value::String(value.clone()));
                }
            }
        }
        self
    }
}

/// Control-plane server settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_document() {
        let config: AgentConfig = toml::from_str(
            r#"
            [[plugins]]
            kind = "EaseMesh"
            name = "easemesh"
            "#,
        )
        .unwrap();

        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert_eq!(config.plugins.len(), 1);
        assert_eq!(config.control.request_timeout_secs, 10);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_builders() {
        let tags = BTreeMap::from([("zone".to_string(), "a".to_string())]);
        let config = AgentConfig::default()
            .with_address("127.0.0.1:0")
            .with_spec(zipkin::console_report_spec(""))
            .with_spec(Spec::new("Health", "Health"))
            .with_zipkin_tags(tags);

        assert_eq!(config.address, "127.0.0.1:0");
        assert_eq!(config.plugins[0].settings["tags"]["zone"], "a");
        assert!(config.plugins[1].settings.get("tags").is_none());
    }
}
