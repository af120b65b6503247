//! Declarative plugin specs.
//!
//! A [`Spec`] is a tagged value: `kind` selects the constructor, `name`
//! identifies the configured instance, and every other field of the document
//! is kept as the kind-specific payload. Decoding happens in two passes:
//! the document is first read as a `Spec` (discriminant and name), then the
//! matching descriptor decodes the payload into its own typed spec on top of
//! that kind's defaults (see [`Spec::decode`]).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error type for spec decoding and validation.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("spec {name:?} has an empty kind")]
    EmptyKind { name: String },

    #[error("decode {kind} spec failed: {source}")]
    Decode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("encode {kind} spec failed: {reason}")]
    Encode { kind: String, reason: String },

    #[error("invalid {kind} spec: {reason}")]
    Invalid { kind: String, reason: String },
}

/// Kind-specific settings decoded from a [`Spec`] payload.
pub trait PluginSpec: Serialize + DeserializeOwned + Default {
    /// Semantic checks serde cannot express.
    fn validate(&self) -> Result<(), String>;
}

/// Configuration for one plugin instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spec {
    /// Instance name, must be non-empty before instantiation.
    #[serde(default)]
    pub name: String,

    /// Selects the registered constructor.
    #[serde(default)]
    pub kind: String,

    /// Remaining fields of the document.
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl Spec {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            settings: Map::new(),
        }
    }

    /// Build a spec whose payload is the serialized form of `settings`.
    /// `settings` must serialize to a map.
    pub fn from_settings<T: Serialize>(
        kind: impl Into<String>,
        name: impl Into<String>,
        settings: &T,
    ) -> Result<Self, SpecError> {
        let kind = kind.into();
        let map = match serde_json::to_value(settings) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(SpecError::Encode {
                    kind,
                    reason: format!("expected a map, got {other}"),
                })
            }
            Err(e) => {
                return Err(SpecError::Encode {
                    kind,
                    reason: e.to_string(),
                })
            }
        };

        let mut spec = Self::new(kind, name);
        spec.settings = map;
        Ok(spec)
    }

    /// Set a single payload field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Checks common to every kind.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.kind.trim().is_empty() {
            return Err(SpecError::EmptyKind {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Decode the payload over `defaults`. Fields absent from the payload
    /// keep their default value.
    pub fn decode<T>(&self, defaults: T) -> Result<T, SpecError>
    where
        T: Serialize + DeserializeOwned,
    {
        let decode_err = |source| SpecError::Decode {
            kind: self.kind.clone(),
            source,
        };

        let mut document = match serde_json::to_value(defaults).map_err(decode_err)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in &self.settings {
            document.insert(key.clone(), value.clone());
        }

        serde_json::from_value(Value::Object(document)).map_err(decode_err)
    }

    /// Decode into a typed spec and run its validation.
    pub fn decode_validated<T: PluginSpec>(&self) -> Result<T, SpecError> {
        let typed: T = self.decode(T::default())?;
        typed.validate().map_err(|reason| SpecError::Invalid {
            kind: self.kind.clone(),
            reason,
        })?;
        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        #[serde(rename = "sample.rate")]
        rate: f64,
        endpoint: String,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                rate: 1.0,
                endpoint: "http://127.0.0.1:9411".to_string(),
            }
        }
    }

    impl PluginSpec for Sample {
        fn validate(&self) -> Result<(), String> {
            if (0.0..=1.0).contains(&self.rate) {
                Ok(())
            } else {
                Err(format!("rate {} out of range", self.rate))
            }
        }
    }

    #[test]
    fn test_two_phase_json_decode() {
        let spec: Spec = serde_json::from_str(
            r#"{"name": "tracing", "kind": "Sample", "sample.rate": 0.25}"#,
        )
        .unwrap();
        assert_eq!(spec.name, "tracing");
        assert_eq!(spec.kind, "Sample");
        assert_eq!(spec.settings.len(), 1);

        let typed: Sample = spec.decode_validated().unwrap();
        assert_eq!(typed.rate, 0.25);
        assert_eq!(typed.endpoint, "http://127.0.0.1:9411");
    }

    #[test]
    fn test_toml_decode() {
        let spec: Spec = toml::from_str(
            r#"
            name = "tracing"
            kind = "Sample"
            endpoint = "http://collector:9411"
            "#,
        )
        .unwrap();
        let typed: Sample = spec.decode_validated().unwrap();
        assert_eq!(typed.endpoint, "http://collector:9411");
        assert_eq!(typed.rate, 1.0);
    }

    #[test]
    fn test_missing_name_defaults_empty() {
        let spec: Spec = serde_json::from_str(r#"{"kind": "Sample"}"#).unwrap();
        assert!(spec.name.is_empty());
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_empty_kind_rejected() {
        let spec = Spec::new("", "nameless");
        assert!(matches!(spec.validate(), Err(SpecError::EmptyKind { .. })));
    }

    #[test]
    fn test_typed_validation_failure() {
        let spec = Spec::new("Sample", "s").with("sample.rate", 3.0);
        let err = spec.decode_validated::<Sample>().unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_wrong_field_type_is_decode_error() {
        let spec = Spec::new("Sample", "s").with("sample.rate", "high");
        assert!(matches!(
            spec.decode_validated::<Sample>(),
            Err(SpecError::Decode { .. })
        ));
    }

    #[test]
    fn test_from_settings_round_trip() {
        let spec = Spec::from_settings("Sample", "s", &Sample::default()).unwrap();
        let json = serde_json::to_string(&spec).unwrap();
        let back: Spec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, back);
    }

    #[test]
    fn test_from_settings_rejects_non_map() {
        let err = Spec::from_settings("Sample", "s", &5).unwrap_err();
        assert!(matches!(err, SpecError::Encode { ref kind, .. } if kind == "Sample"));

        let mut unencodable = std::collections::HashMap::new();
        unencodable.insert(vec![1u8], 1);
        assert!(matches!(
            Spec::from_settings("Sample", "s", &unencodable),
            Err(SpecError::Encode { .. })
        ));
    }
}
