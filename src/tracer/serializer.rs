//! Zipkin v2 JSON encoding, extended with the collector's routing fields.
//!
//! Every span carries `type` (the tracing pipeline) and `service` so the
//! collector can file it without parsing endpoints. Spans tagged as a
//! middleware call get a remote endpoint named after the middleware family.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::tracer::span::{Endpoint, SpanKind, SpanModel, MIDDLEWARE_TAG};

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("span timestamp is before the unix epoch")]
    Timestamp,

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireAnnotation<'a> {
    timestamp: u64,
    value: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireSpan<'a> {
    trace_id: String,
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<SpanKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<u64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    debug: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    shared: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    local_endpoint: Option<&'a Endpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_endpoint: Option<Endpoint>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    annotations: Vec<WireAnnotation<'a>>,
    #[serde(skip_serializing_if = "no_tags")]
    tags: &'a BTreeMap<String, String>,
    #[serde(rename = "type")]
    tracing_type: &'a str,
    service: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

fn no_tags(tags: &&BTreeMap<String, String>) -> bool {
    tags.is_empty()
}

fn micros_since_epoch(at: SystemTime) -> Result<u64, SerializeError> {
    let since = at.duration_since(UNIX_EPOCH).map_err(|_| SerializeError::Timestamp)?;
    Ok(since.as_micros() as u64)
}

/// Durations under a microsecond are reported as one so they stay visible.
fn duration_micros(duration: Duration) -> Option<u64> {
    match duration.as_micros() as u64 {
        0 if duration.is_zero() => None,
        0 => Some(1),
        micros => Some(micros),
    }
}

#[derive(Debug, Clone)]
pub struct SpanSerializer {
    service_name: String,
    tracing_type: String,
    system: Option<String>,
}

impl SpanSerializer {
    pub fn new(service_name: impl Into<String>, tracing_type: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            tracing_type: tracing_type.into(),
            system: None,
        }
    }

    pub fn with_system(mut self, system: Option<String>) -> Self {
        self.system = system.filter(|s| !s.is_empty());
        self
    }

    fn remote_endpoint(span: &SpanModel) -> Option<Endpoint> {
        let middleware = span.tags.get(MIDDLEWARE_TAG);
        match (span.remote_endpoint.clone(), middleware) {
            (None, Some(name)) => Some(Endpoint::named(name.clone())),
            (Some(mut endpoint), Some(name)) => {
                if endpoint.service_name.as_deref().map_or(true, str::is_empty) {
                    endpoint.service_name = Some(name.clone());
                }
                Some(endpoint)
            }
            (endpoint, None) => endpoint,
        }
    }

    fn wire<'a>(&'a self, span: &'a SpanModel) -> Result<WireSpan<'a>, SerializeError> {
        Ok(WireSpan {
            trace_id: span.context.trace_id.to_string(),
            id: span.context.span_id.to_string(),
            parent_id: span.context.parent_id.map(|id| id.to_string()),
            name: span.name.to_lowercase(),
            kind: span.kind,
            timestamp: Some(micros_since_epoch(span.timestamp)?),
            duration: duration_micros(span.duration),
            debug: span.context.debug,
            shared: span.shared,
            local_endpoint: span.local_endpoint.as_ref().filter(|e| !e.is_empty()),
            remote_endpoint: Self::remote_endpoint(span).filter(|e| !e.is_empty()),
            annotations: span
                .annotations
                .iter()
                .map(|a| {
                    Ok(WireAnnotation {
                        timestamp: micros_since_epoch(a.timestamp)?,
                        value: &a.value,
                    })
                })
                .collect::<Result<_, SerializeError>>()?,
            tags: &span.tags,
            tracing_type: &self.tracing_type,
            service: &self.service_name,
            system: self.system.as_deref(),
        })
    }

    pub fn to_value(&self, span: &SpanModel) -> Result<serde_json::Value, SerializeError> {
        Ok(serde_json::to_value(self.wire(span)?)?)
    }

    /// Encode a batch as the JSON array the collector accepts.
    pub fn serialize(&self, spans: &[SpanModel]) -> Result<Vec<u8>, SerializeError> {
        let wire = spans.iter().map(|s| self.wire(s)).collect::<Result<Vec<_>, _>>()?;
        Ok(serde_json::to_vec(&wire)?)
    }

    pub fn content_type(&self) -> &'static str {
        "application/json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::context::{SpanContext, SpanId, TraceId};
    use crate::tracer::span::{Annotation, MiddlewareType};

    fn span() -> SpanModel {
        SpanModel {
            context: SpanContext {
                trace_id: TraceId::new(0, 1),
                span_id: SpanId(2),
                parent_id: None,
                sampled: Some(true),
                debug: false,
            },
            name: "GET /Orders".to_string(),
            kind: Some(SpanKind::Server),
            timestamp: UNIX_EPOCH + Duration::from_secs(10),
            duration: Duration::from_millis(3),
            shared: false,
            local_endpoint: Some(Endpoint::named("orders")),
            remote_endpoint: None,
            annotations: vec![Annotation {
                timestamp: UNIX_EPOCH + Duration::from_secs(11),
                value: "ws".to_string(),
            }],
            tags: BTreeMap::new(),
        }
    }

    #[test]
    fn test_wire_fields() {
        let serializer = SpanSerializer::new("orders", "log-tracing");
        let value = serializer.to_value(&span()).unwrap();

        assert_eq!(value["traceId"], "0000000000000001");
        assert_eq!(value["id"], "0000000000000002");
        assert_eq!(value["name"], "get /orders");
        assert_eq!(value["kind"], "SERVER");
        assert_eq!(value["timestamp"], 10_000_000);
        assert_eq!(value["duration"], 3_000);
        assert_eq!(value["type"], "log-tracing");
        assert_eq!(value["service"], "orders");
        assert_eq!(value["localEndpoint"]["serviceName"], "orders");
        assert_eq!(value["annotations"][0]["timestamp"], 11_000_000);
        assert!(value.get("parentId").is_none());
        assert!(value.get("tags").is_none());
        assert!(value.get("system").is_none());
        assert!(value.get("shared").is_none());
    }

    #[test]
    fn test_sub_microsecond_duration() {
        let mut span = span();
        span.duration = Duration::from_nanos(200);
        let value = SpanSerializer::new("s", "t").to_value(&span).unwrap();
        assert_eq!(value["duration"], 1);
    }

    #[test]
    fn test_middleware_remote_endpoint() {
        let mut span = span();
        span.tags.insert(
            MIDDLEWARE_TAG.to_string(),
            MiddlewareType::Redis.tag_value().to_string(),
        );
        let value = SpanSerializer::new("s", "t").to_value(&span).unwrap();
        assert_eq!(value["remoteEndpoint"]["serviceName"], "redis");

        span.remote_endpoint = Some(Endpoint::named("cache-1"));
        let value = SpanSerializer::new("s", "t").to_value(&span).unwrap();
        assert_eq!(value["remoteEndpoint"]["serviceName"], "cache-1");
    }

    #[test]
    fn test_batch_and_system() {
        let serializer = SpanSerializer::new("s", "t").with_system(Some("mesh".to_string()));
        let bytes = serializer.serialize(&[span(), span()]).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[0]["system"], "mesh");
    }

    #[test]
    fn test_timestamp_before_epoch() {
        let mut span = span();
        span.timestamp = UNIX_EPOCH - Duration::from_secs(1);
        assert!(matches!(
            SpanSerializer::new("s", "t").to_value(&span),
            Err(SerializeError::Timestamp)
        ));
    }
}
