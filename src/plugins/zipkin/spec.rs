//! Zipkin plugin settings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::plugins::spec::{PluginSpec, Spec};
use crate::plugins::zipkin::{KIND, NAME};

pub const DEFAULT_SERVER_URL: &str = "https://127.0.0.1:8080/report";
pub const DEFAULT_SERVICE_NAME: &str = "default-service";
pub const DEFAULT_TRACING_TYPE: &str = "log-tracing";
pub const DEFAULT_LOCAL_HOSTPORT: &str = "127.0.0.1:80";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZipkinSpec {
    /// Collector URL. Empty sends spans to the log instead.
    #[serde(rename = "reporter.output.server")]
    pub output_server_url: String,

    #[serde(rename = "reporter.output.server.tls.enable")]
    pub enable_tls: bool,
    #[serde(rename = "reporter.output.server.tls.key")]
    pub tls_key: String,
    #[serde(rename = "reporter.output.server.tls.cert")]
    pub tls_cert: String,
    #[serde(rename = "reporter.output.server.tls.caCert")]
    pub tls_ca_cert: String,

    #[serde(rename = "reporter.output.server.auth.enable")]
    pub enable_basic_auth: bool,
    #[serde(rename = "reporter.output.server.auth.username")]
    pub username: String,
    #[serde(rename = "reporter.output.server.auth.password")]
    pub password: String,

    #[serde(rename = "serviceName")]
    pub service_name: String,
    #[serde(rename = "tracing.type")]
    pub tracing_type: String,
    /// Reported as the `system` field of every span when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// `host:port` of this service; `:port` picks the outbound address.
    #[serde(rename = "localHostport")]
    pub local_hostport: String,
    pub tags: BTreeMap<String, String>,

    #[serde(rename = "tracing.enable")]
    pub enable_tracing: bool,
    #[serde(rename = "tracing.sample.rate")]
    pub sample_rate: f64,
    #[serde(rename = "tracing.shared.spans")]
    pub shared_spans: bool,
    #[serde(rename = "tracing.id128bit")]
    pub id_128bit: bool,
}

impl Default for ZipkinSpec {
    fn default() -> Self {
        Self {
            output_server_url: DEFAULT_SERVER_URL.to_string(),
            enable_tls: false,
            tls_key: String::new(),
            tls_cert: String::new(),
            tls_ca_cert: String::new(),
            enable_basic_auth: false,
            username: String::new(),
            password: String::new(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            tracing_type: DEFAULT_TRACING_TYPE.to_string(),
            system: None,
            local_hostport: DEFAULT_LOCAL_HOSTPORT.to_string(),
            tags: BTreeMap::new(),
            enable_tracing: true,
            sample_rate: 1.0,
            shared_spans: true,
            id_128bit: false,
        }
    }
}

impl PluginSpec for ZipkinSpec {
    fn validate(&self) -> Result<(), String> {
        if self.enable_tls
            && (self.tls_key.is_empty() || self.tls_cert.is_empty() || self.tls_ca_cert.is_empty())
        {
            return Err("key, cert, cacert are not all specified".to_string());
        }
        if self.enable_basic_auth && (self.username.is_empty() || self.password.is_empty()) {
            return Err("username and password are not all specified".to_string());
        }
        if !(0.0..=1.0).contains(&self.sample_rate) {
            return Err(format!("tracing.sample.rate {} must be within [0, 1]", self.sample_rate));
        }
        if !self.output_server_url.is_empty() {
            url::Url::parse(&self.output_server_url)
                .map_err(|e| format!("invalid reporter.output.server {:?}: {e}", self.output_server_url))?;
        }
        Ok(())
    }
}

pub fn default_spec() -> Spec {
    to_spec(&ZipkinSpec::default())
}

/// Spec that reports spans to the log, for local runs without a collector.
pub fn console_report_spec(local_hostport: &str) -> Spec {
    let settings = ZipkinSpec {
        output_server_url: String::new(),
        local_hostport: local_hostport.to_string(),
        ..ZipkinSpec::default()
    };
    to_spec(&settings)
}

/// Wrap typed settings as a spec. An encoding failure leaves the payload
/// empty, which decodes back to the defaults.
pub fn to_spec(settings: &ZipkinSpec) -> Spec {
    Spec::from_settings(KIND, NAME, settings).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Zipkin settings not encodable, using defaults");
        Spec::new(KIND, NAME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_spec() {
        let spec = default_spec();
        assert_eq!(spec.kind, KIND);
        assert_eq!(spec.name, NAME);

        let decoded: ZipkinSpec = spec.decode_validated().unwrap();
        assert_eq!(decoded, ZipkinSpec::default());
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let spec: Spec = serde_json::from_value(serde_json::json!({
            "kind": "Zipkin",
            "name": "zipkin",
            "serviceName": "orders",
            "tracing.sample.rate": 0.25,
            "tags": {"zone": "a"}
        }))
        .unwrap();

        let decoded: ZipkinSpec = spec.decode_validated().unwrap();
        assert_eq!(decoded.service_name, "orders");
        assert_eq!(decoded.sample_rate, 0.25);
        assert_eq!(decoded.tags.get("zone").map(String::as_str), Some("a"));
        assert_eq!(decoded.output_server_url, DEFAULT_SERVER_URL);
        assert!(decoded.shared_spans);
    }

    #[test]
    fn test_validation() {
        let tls = ZipkinSpec {
            enable_tls: true,
            tls_key: "key".to_string(),
            ..ZipkinSpec::default()
        };
        assert!(tls.validate().unwrap_err().contains("cacert"));

        let auth = ZipkinSpec {
            enable_basic_auth: true,
            username: "admin".to_string(),
            ..ZipkinSpec::default()
        };
        assert!(auth.validate().unwrap_err().contains("password"));

        let rate = ZipkinSpec {
            sample_rate: 1.5,
            ..ZipkinSpec::default()
        };
        assert!(rate.validate().is_err());

        let url = ZipkinSpec {
            output_server_url: "not a url".to_string(),
            ..ZipkinSpec::default()
        };
        assert!(url.validate().is_err());
    }

    #[test]
    fn test_console_spec() {
        let decoded: ZipkinSpec = console_report_spec(":8090").decode_validated().unwrap();
        assert!(decoded.output_server_url.is_empty());
        assert_eq!(decoded.local_hostport, ":8090");
    }
}
