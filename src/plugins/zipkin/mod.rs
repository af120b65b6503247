//! Zipkin tracing plugin.
//!
//! # Responsibilities
//! - Build a [`Tracer`] from the plugin settings (sampler, local endpoint,
//!   default tags, reporter)
//! - Open server spans for inbound requests and client spans for outgoing
//!   ones, propagating B3 headers
//! - Move the active span context from an inbound request onto outgoing
//!   requests built by the application
//! - Flush the reporter on close
//!
//! # Design Decisions
//! - An empty collector URL reports to the log, so a local run needs no
//!   collector
//! - TLS material and the collector URL are checked at construction; a
//!   plugin that builds is ready to report
//! - Disabled tracing samples nothing but still decorates the outbound
//!   client, so B3 headers keep flowing to downstream services

pub mod middleware;
pub mod reporter;
pub mod spec;

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    http::{Extensions, Request},
};
use futures_util::future::BoxFuture;

use crate::plugins::capability::{
    BoxClient, BoxHandler, ClientWrapper, InboundWrapper, Plugin, PluginError, RequestContextWrapper, Wrapped,
};
use crate::plugins::registry::Descriptor;
use crate::plugins::spec::Spec;
use crate::tracer::{Endpoint, Reporter, Sampler, Tracer, TracerOptions};

pub use spec::{console_report_spec, default_spec, ZipkinSpec};

pub const KIND: &str = "Zipkin";
pub const NAME: &str = "Zipkin";

pub fn descriptor() -> Descriptor {
    Descriptor::new(KIND, default_spec, |spec: Spec| {
        Ok(Arc::new(Zipkin::new(spec)?) as Arc<dyn Plugin>)
    })
}

pub struct Zipkin {
    name: String,
    settings: ZipkinSpec,
    tracer: Arc<Tracer>,
}

impl Zipkin {
    pub fn new(spec: Spec) -> Result<Self, PluginError> {
        let settings: ZipkinSpec = spec.decode_validated()?;
        let reporter = reporter::new_reporter(&settings)?;
        Self::build(spec.name, settings, reporter)
    }

    /// Build with a caller-supplied reporter instead of the configured one.
    pub fn with_reporter(spec: Spec, reporter: Arc<dyn Reporter>) -> Result<Self, PluginError> {
        let settings: ZipkinSpec = spec.decode_validated()?;
        Self::build(spec.name, settings, reporter)
    }

    fn build(name: String, settings: ZipkinSpec, reporter: Arc<dyn Reporter>) -> Result<Self, PluginError> {
        let local_endpoint = local_endpoint(&settings.service_name, &settings.local_hostport)?;

        let sampler = if settings.enable_tracing {
            let salt = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            Sampler::boundary(settings.sample_rate, salt).map_err(PluginError::other)?
        } else {
            Sampler::Never
        };

        let options = TracerOptions {
            local_endpoint: Some(local_endpoint),
            sampler,
            tags: settings.tags.clone(),
            shared_spans: settings.shared_spans,
            id_128bit: settings.id_128bit,
        };

        tracing::debug!(
            plugin = %name,
            service = %settings.service_name,
            collector = %settings.output_server_url,
            "Zipkin tracer ready"
        );

        Ok(Self {
            name,
            settings,
            tracer: Arc::new(Tracer::new(reporter, options)),
        })
    }

    pub fn settings(&self) -> &ZipkinSpec {
        &self.settings
    }
}

/// Resolve the endpoint spans are attributed to.
pub fn local_endpoint(service_name: &str, hostport: &str) -> Result<Endpoint, PluginError> {
    if hostport.is_empty() {
        return Ok(Endpoint::named(service_name));
    }

    let endpoint_err = |reason: String| PluginError::Endpoint {
        hostport: hostport.to_string(),
        reason,
    };

    let (host, port) = hostport
        .rsplit_once(':')
        .ok_or_else(|| endpoint_err("missing port".to_string()))?;
    if !host.is_empty() {
        return Endpoint::from_hostport(service_name, hostport).map_err(endpoint_err);
    }

    let port: u16 = port.parse().map_err(|_| endpoint_err(format!("invalid port {port:?}")))?;
    let ip = outbound_ipv4().map_err(|e| endpoint_err(format!("no outbound address: {e}")))?;
    Ok(Endpoint::from_socket_addr(
        Some(service_name.to_string()),
        SocketAddr::new(ip, port),
    ))
}

/// Address the host would use to reach the network. Connecting a UDP socket
/// sends nothing; it only selects a route.
fn outbound_ipv4() -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("192.0.2.1:80")?;
    let ip = socket.local_addr()?.ip();
    if ip.is_loopback() || ip.is_unspecified() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            "only loopback is routable",
        ));
    }
    Ok(ip)
}

impl Plugin for Zipkin {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        KIND
    }

    fn inbound_wrapper(&self) -> Option<&dyn InboundWrapper> {
        Some(self)
    }

    fn client_wrapper(&self) -> Option<&dyn ClientWrapper> {
        Some(self)
    }

    fn request_wrapper(&self) -> Option<&dyn RequestContextWrapper> {
        Some(self)
    }

    fn tracer(&self) -> Option<Arc<Tracer>> {
        Some(self.tracer.clone())
    }

    fn close(&self) -> BoxFuture<'_, Result<(), PluginError>> {
        Box::pin(async move {
            self.tracer.reporter().close().await?;
            Ok(())
        })
    }
}

impl InboundWrapper for Zipkin {
    fn wrap_handler(&self, next: BoxHandler) -> Wrapped<BoxHandler> {
        Wrapped::Decorated(middleware::server(self.tracer.clone(), next))
    }
}

impl ClientWrapper for Zipkin {
    fn wrap_client(&self, next: BoxClient) -> Wrapped<BoxClient> {
        Wrapped::Decorated(middleware::client(self.tracer.clone(), next))
    }
}

impl RequestContextWrapper for Zipkin {
    fn wrap_request(&self, parent: &Extensions, request: Request<Body>) -> Request<Body> {
        middleware::propagate_context(parent, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::{MemoryReporter, SpanKind};
    use std::net::Ipv4Addr;

    #[test]
    fn test_local_endpoint_rules() {
        let named = local_endpoint("svc", "").unwrap();
        assert_eq!(named, Endpoint::named("svc"));

        let fixed = local_endpoint("svc", "127.0.0.1:8090").unwrap();
        assert_eq!(fixed.ipv4, Some(Ipv4Addr::LOCALHOST));
        assert_eq!(fixed.port, Some(8090));

        assert!(matches!(
            local_endpoint("svc", "no-port"),
            Err(PluginError::Endpoint { .. })
        ));
    }

    #[test]
    fn test_with_reporter_and_tags() {
        let reporter = Arc::new(MemoryReporter::new());
        let spec = console_report_spec("127.0.0.1:80").with("tags", serde_json::json!({"zone": "a"}));
        let zipkin = Zipkin::with_reporter(spec, reporter.clone()).unwrap();

        assert_eq!(zipkin.name(), NAME);
        let tracer = zipkin.tracer().unwrap();
        tracer.start_span("op", Some(SpanKind::Client), None).finish();

        let span = &reporter.spans()[0];
        assert_eq!(span.tags.get("zone").map(String::as_str), Some("a"));
        assert_eq!(
            span.local_endpoint.as_ref().and_then(|e| e.service_name.as_deref()),
            Some(spec::DEFAULT_SERVICE_NAME)
        );
    }

    #[tokio::test]
    async fn test_disabled_tracing_still_injects_headers() {
        use tower::ServiceExt;

        let reporter = Arc::new(MemoryReporter::new());
        let spec = console_report_spec("").with("tracing.enable", false);
        let zipkin = Zipkin::with_reporter(spec, reporter.clone()).unwrap();

        let client: BoxClient = tower::util::BoxCloneSyncService::new(tower::service_fn(|req: Request<Body>| async move {
            let sampled = req
                .headers()
                .get(crate::tracer::propagation::SAMPLED_HEADER)
                .map(|v| v.as_bytes().to_vec())
                .unwrap_or_default();
            Ok::<_, tower::BoxError>(axum::http::Response::new(Body::from(sampled)))
        }));
        let Wrapped::Decorated(client) = zipkin.wrap_client(client) else {
            panic!("client left undecorated");
        };

        let response = client.oneshot(Request::new(Body::empty())).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
        assert_eq!(&body[..], b"0");
        assert!(reporter.spans().is_empty());
        assert!(!zipkin.tracer.start_span("x", None, None).is_recording());
    }

    #[test]
    fn test_invalid_tls_rejected() {
        let spec = default_spec()
            .with("reporter.output.server.tls.enable", true)
            .with("reporter.output.server.tls.key", "bad")
            .with("reporter.output.server.tls.cert", "bad")
            .with("reporter.output.server.tls.caCert", "bad");
        assert!(matches!(Zipkin::new(spec), Err(PluginError::Tls(_))));
    }
}
