//! HTTP server and client instrumentation.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Extensions, Request, Response},
};
use hyper::body::Body as _;
use tower::{service_fn, util::BoxCloneSyncService, ServiceExt};

use crate::observability::metrics;
use crate::plugins::capability::{BoxClient, BoxHandler};
use crate::tracer::span::tags;
use crate::tracer::{propagation, Endpoint, Span, SpanContext, SpanKind, Tracer};

fn tag_response(span: &mut Span, response: &Response<Body>) {
    let status = response.status();
    if !status.is_success() {
        span.tag(tags::HTTP_STATUS_CODE, status.as_str());
    }
    if status.is_client_error() || status.is_server_error() {
        span.tag(tags::ERROR, status.as_str());
    }
}

/// Opens a server span per request, continuing the caller's trace when B3
/// headers are present. The span context is stored in the request extensions
/// for the application and for [`propagate_context`].
pub fn server(tracer: Arc<Tracer>, next: BoxHandler) -> BoxHandler {
    let service = service_fn(move |mut request: Request<Body>| {
        let tracer = tracer.clone();
        let next = next.clone();
        async move {
            let parent = propagation::extract(request.headers()).unwrap_or_else(|e| {
                tracing::debug!(error = %e, "Ignoring malformed trace headers");
                None
            });

            let mut span = tracer.start_span(request.method().as_str(), Some(SpanKind::Server), parent.as_ref());
            span.tag(tags::HTTP_METHOD, request.method().as_str());
            span.tag(tags::HTTP_PATH, request.uri().path());
            if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
                span.tag(tags::CLIENT_ADDRESS, addr.ip().to_string());
                span.set_remote_endpoint(Endpoint::from_socket_addr(None, *addr));
            }
            request.extensions_mut().insert(span.context());

            let started = Instant::now();
            let response = match next.oneshot(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            };
            metrics::record_inbound_duration(started.elapsed());

            tag_response(&mut span, &response);
            if let Some(size) = response.body().size_hint().exact() {
                span.tag(tags::HTTP_RESPONSE_SIZE, size.to_string());
            }
            span.finish();
            Ok::<_, Infallible>(response)
        }
    });
    BoxCloneSyncService::new(service)
}

/// Opens a client span per outgoing request and injects its context as B3
/// headers. The parent is taken from the request extensions.
pub fn client(tracer: Arc<Tracer>, next: BoxClient) -> BoxClient {
    let service = service_fn(move |mut request: Request<Body>| {
        let tracer = tracer.clone();
        let next = next.clone();
        async move {
            let mut span = tracer.start_span_from(
                request.extensions(),
                request.method().as_str(),
                Some(SpanKind::Client),
            );
            span.tag(tags::HTTP_METHOD, request.method().as_str());
            span.tag(tags::HTTP_PATH, request.uri().path());
            if let Some(host) = request.uri().host() {
                span.set_remote_endpoint(Endpoint::named(host));
            }
            propagation::inject(&span.context(), request.headers_mut());

            match next.oneshot(request).await {
                Ok(response) => {
                    tag_response(&mut span, &response);
                    span.finish();
                    Ok(response)
                }
                Err(e) => {
                    span.tag(tags::ERROR, e.to_string());
                    span.finish();
                    Err(e)
                }
            }
        }
    });
    BoxCloneSyncService::new(service)
}

/// Carry the inbound span context onto an outgoing request.
pub fn propagate_context(parent: &Extensions, mut request: Request<Body>) -> Request<Body> {
    if let Some(context) = parent.get::<SpanContext>() {
        request.extensions_mut().insert(*context);
    }
    request
}
