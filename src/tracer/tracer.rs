//! Span factory.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::http::Extensions;

use crate::tracer::context::{SpanContext, SpanId, TraceId};
use crate::tracer::reporter::Reporter;
use crate::tracer::sampler::Sampler;
use crate::tracer::span::{Endpoint, MiddlewareType, Span, SpanKind, SpanModel, MIDDLEWARE_TAG};

#[derive(Debug, Clone)]
pub struct TracerOptions {
    pub local_endpoint: Option<Endpoint>,
    pub sampler: Sampler,
    /// Tags added to every span.
    pub tags: BTreeMap<String, String>,
    /// Server spans join the caller's span id instead of starting a child.
    pub shared_spans: bool,
    pub id_128bit: bool,
}

impl Default for TracerOptions {
    fn default() -> Self {
        Self {
            local_endpoint: None,
            sampler: Sampler::Always,
            tags: BTreeMap::new(),
            shared_spans: true,
            id_128bit: false,
        }
    }
}

pub struct Tracer {
    reporter: Arc<dyn Reporter>,
    options: TracerOptions,
}

impl Tracer {
    pub fn new(reporter: Arc<dyn Reporter>, options: TracerOptions) -> Self {
        Self { reporter, options }
    }

    pub fn reporter(&self) -> &Arc<dyn Reporter> {
        &self.reporter
    }

    pub fn options(&self) -> &TracerOptions {
        &self.options
    }

    /// Start a span, as a child of `parent` when given, else as a new root.
    pub fn start_span(&self, name: &str, kind: Option<SpanKind>, parent: Option<&SpanContext>) -> Span {
        let (context, shared) = match parent {
            None => {
                let trace_id = TraceId::random(self.options.id_128bit);
                let context = SpanContext {
                    trace_id,
                    span_id: SpanId::random(),
                    parent_id: None,
                    sampled: Some(self.options.sampler.sample(trace_id.low)),
                    debug: false,
                };
                (context, false)
            }
            Some(parent) => {
                let sampled = parent
                    .sampled
                    .or_else(|| Some(self.options.sampler.sample(parent.trace_id.low)));
                let join = kind == Some(SpanKind::Server) && self.options.shared_spans;
                let context = SpanContext {
                    trace_id: parent.trace_id,
                    span_id: if join { parent.span_id } else { SpanId::random() },
                    parent_id: if join { parent.parent_id } else { Some(parent.span_id) },
                    sampled,
                    debug: parent.debug,
                };
                (context, join)
            }
        };

        let model = SpanModel {
            context,
            name: name.to_string(),
            kind,
            timestamp: SystemTime::now(),
            duration: Duration::ZERO,
            shared,
            local_endpoint: self.options.local_endpoint.clone(),
            remote_endpoint: None,
            annotations: Vec::new(),
            tags: self.options.tags.clone(),
        };
        Span::new(model, self.reporter.clone())
    }

    pub fn start_child(&self, parent: &Span, name: &str, kind: Option<SpanKind>) -> Span {
        self.start_span(name, kind, Some(&parent.context()))
    }

    /// Start a span under the context stored in request extensions.
    pub fn start_span_from(&self, extensions: &Extensions, name: &str, kind: Option<SpanKind>) -> Span {
        self.start_span(name, kind, extensions.get::<SpanContext>())
    }

    /// Start a client span for a middleware call (database, cache, broker).
    pub fn start_middleware_span(
        &self,
        parent: Option<&SpanContext>,
        name: &str,
        middleware: MiddlewareType,
    ) -> Span {
        let mut span = self.start_span(name, Some(SpanKind::Client), parent);
        span.tag(MIDDLEWARE_TAG, middleware.tag_value());
        span
    }
}
