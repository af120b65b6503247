//! Request and client wrapping chains.
//!
//! Wrappers nest like an onion: the first composed plugin is the outermost
//! layer, so for plugins `[A, B]` a request runs A, then B, then the
//! application, and the response passes back through B before A. The fold
//! therefore starts from the last plugin.

use std::convert::Infallible;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::{Extensions, Request, Response},
};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};

use crate::agent::Agent;
use crate::plugins::{BoxClient, BoxHandler, Plugin, Wrapped};

fn accept<T>(wrapped: Wrapped<T>, plugin: &dyn Plugin, target: &'static str) -> T {
    match wrapped {
        Wrapped::Decorated(decorated) => decorated,
        Wrapped::Declined { original, reason } => {
            tracing::warn!(
                plugin = plugin.name(),
                kind = plugin.kind(),
                wrapping = target,
                reason = %reason,
                "Plugin declined to wrap, continuing undecorated"
            );
            original
        }
    }
}

impl Agent {
    /// Decorate an inbound handler with every inbound wrapper.
    pub fn wrap_handler(&self, handler: BoxHandler) -> BoxHandler {
        self.plugins().iter().rev().fold(handler, |next, plugin| match plugin.inbound_wrapper() {
            Some(wrapper) => accept(wrapper.wrap_handler(next), plugin.as_ref(), "handler"),
            None => next,
        })
    }

    /// [`Agent::wrap_handler`] for any cloneable tower service.
    pub fn wrap_service<S>(&self, service: S) -> BoxHandler
    where
        S: Service<Request<Body>, Response = Response<Body>, Error = Infallible> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        self.wrap_handler(BoxCloneSyncService::new(service))
    }

    /// Decorate an outbound client with every client wrapper.
    pub fn wrap_client(&self, client: BoxClient) -> BoxClient {
        self.plugins().iter().rev().fold(client, |next, plugin| match plugin.client_wrapper() {
            Some(wrapper) => accept(wrapper.wrap_client(next), plugin.as_ref(), "client"),
            None => next,
        })
    }

    /// Copy per-request state (the active span) from an inbound request's
    /// extensions onto an outgoing request.
    pub fn wrap_request(&self, parent: &Extensions, request: Request<Body>) -> Request<Body> {
        self.plugins()
            .iter()
            .filter_map(|plugin| plugin.request_wrapper())
            .fold(request, |request, wrapper| wrapper.wrap_request(parent, request))
    }

    /// Tower layer applying [`Agent::wrap_handler`], for
    /// `router.layer(agent.layer())`.
    pub fn layer(&self) -> AgentLayer {
        AgentLayer { agent: self.clone() }
    }
}

#[derive(Clone)]
pub struct AgentLayer {
    agent: Agent,
}

impl<S> Layer<S> for AgentLayer
where
    S: Service<Request<Body>, Response = Response<Body>, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = AgentService;

    fn layer(&self, inner: S) -> Self::Service {
        AgentService {
            inner: self.agent.wrap_service(inner),
        }
    }
}

/// Service produced by [`AgentLayer`].
#[derive(Clone)]
pub struct AgentService {
    inner: BoxHandler,
}

impl Service<Request<Body>> for AgentService {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = <BoxHandler as Service<Request<Body>>>::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        self.inner.call(request)
    }
}
