//! Reporter construction from plugin settings.

use std::sync::Arc;
use std::time::Duration;

use crate::net::tls::ClientTlsMaterial;
use crate::plugins::capability::PluginError;
use crate::plugins::zipkin::spec::ZipkinSpec;
use crate::tracer::reporter::{BasicAuth, HttpReporter, HttpReporterConfig, LogReporter, Reporter};
use crate::tracer::SpanSerializer;

const COLLECTOR_TIMEOUT: Duration = Duration::from_secs(10);

pub fn new_serializer(spec: &ZipkinSpec) -> SpanSerializer {
    SpanSerializer::new(spec.service_name.clone(), spec.tracing_type.clone()).with_system(spec.system.clone())
}

/// Log reporter when no collector is configured, else a batching HTTP
/// reporter. The HTTP reporter must be built inside a tokio runtime.
pub fn new_reporter(spec: &ZipkinSpec) -> Result<Arc<dyn Reporter>, PluginError> {
    let serializer = new_serializer(spec);
    if spec.output_server_url.is_empty() {
        return Ok(Arc::new(LogReporter::new(serializer)));
    }

    let client = new_http_client(spec)?;
    let mut config = HttpReporterConfig::new(spec.output_server_url.clone());
    if spec.enable_basic_auth {
        config.auth = Some(BasicAuth {
            username: spec.username.clone(),
            password: spec.password.clone(),
        });
    }

    Ok(Arc::new(HttpReporter::spawn(config, client, serializer)?))
}

pub fn new_http_client(spec: &ZipkinSpec) -> Result<reqwest::Client, PluginError> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(COLLECTOR_TIMEOUT);

    if spec.enable_tls {
        let material = ClientTlsMaterial::from_pem(&spec.tls_cert, &spec.tls_key, &spec.tls_ca_cert)?;
        builder = builder.identity(reqwest::Identity::from_pem(material.identity_pem())?);
        for der in material.ca_certificates() {
            builder = builder.add_root_certificate(reqwest::Certificate::from_der(der)?);
        }
    }

    Ok(builder.build()?)
}
