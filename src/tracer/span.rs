//! Span data model.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;

use crate::tracer::context::SpanContext;
use crate::tracer::reporter::Reporter;

/// Tag keys shared with the collector UI.
pub mod tags {
    pub const HTTP_ROUTE: &str = "http.route";
    pub const HTTP_METHOD: &str = "http.method";
    pub const HTTP_PATH: &str = "http.path";
    pub const HTTP_STATUS_CODE: &str = "http.status_code";
    pub const HTTP_RESPONSE_SIZE: &str = "http.response.size";
    pub const CLIENT_ADDRESS: &str = "Client Address";
    pub const ERROR: &str = "error";

    pub const MYSQL_SQL: &str = "sql";
    pub const MYSQL_URL: &str = "url";
    pub const REDIS_METHOD: &str = "redis.method";
    pub const ELASTICSEARCH_INDEX: &str = "es.index";
    pub const ELASTICSEARCH_OPERATION: &str = "es.operation";
    pub const ELASTICSEARCH_BODY: &str = "es.body";
    pub const KAFKA_TOPIC: &str = "kafka.topic";
    pub const KAFKA_KEY: &str = "kafka.key";
    pub const KAFKA_BROKER: &str = "kafka.broker";
    pub const RABBIT_EXCHANGE: &str = "rabbit.exchange";
    pub const RABBIT_ROUTING_KEY: &str = "rabbit.routing_key";
    pub const RABBIT_QUEUE: &str = "rabbit.queue";
    pub const RABBIT_BROKER: &str = "rabbit.broker";
    pub const MONGODB_COMMAND: &str = "mongodb.command";
    pub const MONGODB_COLLECTION: &str = "mongodb.collection";
    pub const MONGODB_CLUSTER_ID: &str = "mongodb.cluster_id";
}

/// Tag marking a span as a middleware call.
pub const MIDDLEWARE_TAG: &str = "component.type";

/// Middleware families with dedicated views in the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareType {
    MySql,
    Redis,
    ElasticSearch,
    Kafka,
    RabbitMq,
    MongoDb,
}

impl MiddlewareType {
    pub fn tag_value(&self) -> &'static str {
        match self {
            MiddlewareType::MySql => "database",
            MiddlewareType::Redis => "redis",
            MiddlewareType::ElasticSearch => "elasticsearch",
            MiddlewareType::Kafka => "kafka",
            MiddlewareType::RabbitMq => "rabbitmq",
            MiddlewareType::MongoDb => "mongodb",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanKind {
    Client,
    Server,
    Producer,
    Consumer,
}

/// Network location of a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<Ipv4Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<Ipv6Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Endpoint {
    pub fn named(service_name: impl Into<String>) -> Self {
        Self {
            service_name: Some(service_name.into()),
            ..Self::default()
        }
    }

    pub fn from_socket_addr(service_name: Option<String>, addr: SocketAddr) -> Self {
        let mut endpoint = Self {
            service_name,
            port: Some(addr.port()).filter(|p| *p != 0),
            ..Self::default()
        };
        match addr.ip() {
            IpAddr::V4(ip) => endpoint.ipv4 = Some(ip),
            IpAddr::V6(ip) => endpoint.ipv6 = Some(ip),
        }
        endpoint
    }

    /// Build an endpoint from `host:port`, resolving host names.
    pub fn from_hostport(service_name: &str, hostport: &str) -> Result<Self, String> {
        let (host, port) = hostport
            .rsplit_once(':')
            .ok_or_else(|| "missing port".to_string())?;
        let port: u16 = port.parse().map_err(|_| format!("invalid port {port:?}"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');

        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| format!("resolve {host:?} failed: {e}"))?
            .collect();
        let addr = addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| format!("no address for {host:?}"))?;

        Ok(Self::from_socket_addr(Some(service_name.to_string()), addr))
    }

    pub fn is_empty(&self) -> bool {
        self.service_name.as_deref().map_or(true, str::is_empty)
            && self.ipv4.is_none()
            && self.ipv6.is_none()
            && self.port.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub timestamp: SystemTime,
    pub value: String,
}

/// A finished span as handed to a reporter.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanModel {
    pub context: SpanContext,
    pub name: String,
    pub kind: Option<SpanKind>,
    pub timestamp: SystemTime,
    pub duration: Duration,
    /// Server side of a span id shared with the client.
    pub shared: bool,
    pub local_endpoint: Option<Endpoint>,
    pub remote_endpoint: Option<Endpoint>,
    pub annotations: Vec<Annotation>,
    pub tags: BTreeMap<String, String>,
}

/// An in-flight span. Dropping it without [`Span::finish`] discards it.
pub struct Span {
    model: SpanModel,
    started: Instant,
    reporter: Option<Arc<dyn Reporter>>,
}

impl Span {
    pub(crate) fn new(model: SpanModel, reporter: Arc<dyn Reporter>) -> Self {
        let reporter = model.context.is_sampled().then_some(reporter);
        Self {
            model,
            started: Instant::now(),
            reporter,
        }
    }

    pub fn context(&self) -> SpanContext {
        self.model.context
    }

    /// Whether the span will be reported on finish.
    pub fn is_recording(&self) -> bool {
        self.reporter.is_some()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.model.name = name.into();
    }

    pub fn set_remote_endpoint(&mut self, endpoint: Endpoint) {
        self.model.remote_endpoint = Some(endpoint);
    }

    pub fn tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        if self.is_recording() {
            self.model.tags.insert(key.into(), value.into());
        }
    }

    pub fn annotate(&mut self, value: impl Into<String>) {
        if self.is_recording() {
            self.model.annotations.push(Annotation {
                timestamp: SystemTime::now(),
                value: value.into(),
            });
        }
    }

    pub fn finish(mut self) {
        if let Some(reporter) = self.reporter.take() {
            self.model.duration = self.started.elapsed();
            reporter.send(self.model);
        }
    }
}
