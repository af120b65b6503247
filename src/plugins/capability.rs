//! Plugin contract.
//!
//! A plugin is polymorphic over a closed set of capabilities. Each capability
//! is its own trait and a [`Plugin`] advertises the ones it implements through
//! the accessor methods, so callers never downcast.
//!
//! Wrappers run on the request path of the host application: they must stay
//! non-blocking and add bounded overhead. Work that may block (reporting
//! spans, talking to a collector) belongs to a buffered task owned by the
//! plugin.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Extensions, Request, Response, StatusCode},
    response::IntoResponse,
};
use futures_util::future::BoxFuture;
use tower::util::BoxCloneSyncService;
use tower::BoxError;

use crate::net::tls::TlsError;
use crate::plugins::spec::SpecError;
use crate::tracer::{ReportError, Tracer};

/// Type-erased inbound HTTP handler.
pub type BoxHandler = BoxCloneSyncService<Request<Body>, Response<Body>, Infallible>;

/// Type-erased outbound HTTP client.
pub type BoxClient = BoxCloneSyncService<Request<Body>, Response<Body>, BoxError>;

/// Result of asking a wrapper to decorate a handler or client.
pub enum Wrapped<T> {
    Decorated(T),
    /// The wrapper could not decorate; `original` is passed on untouched.
    Declined { original: T, reason: String },
}

/// Result of offering a control-plane request to a plugin.
pub enum Dispatch {
    Handled(Response<Body>),
    /// The path is not owned by the plugin; the request is handed back.
    Declined(Request<Body>),
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::Handled(response) => f.debug_tuple("Handled").field(&response.status()).finish(),
            Dispatch::Declined(request) => f.debug_tuple("Declined").field(request.uri()).finish(),
        }
    }
}

/// Error raised while handling a single control-plane request.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    pub fn status(&self) -> StatusCode {
        match self {
            ControlError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ControlError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Error raised while constructing or closing a plugin.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error("load tls material failed: {0}")]
    Tls(#[from] TlsError),

    #[error("build http client failed: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid local endpoint {hostport:?}: {reason}")]
    Endpoint { hostport: String, reason: String },

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("{0}")]
    Other(BoxError),
}

impl PluginError {
    pub fn other(err: impl Into<BoxError>) -> Self {
        PluginError::Other(err.into())
    }
}

/// Answers requests arriving on the control-plane port.
pub trait ControlHandler: Send + Sync {
    /// Must hand the request back via [`Dispatch::Declined`] for any path the
    /// plugin does not own, without reading the body.
    fn handle_control(&self, request: Request<Body>) -> BoxFuture<'_, Result<Dispatch, ControlError>>;
}

/// Decorates the application's inbound handler.
pub trait InboundWrapper: Send + Sync {
    /// The returned handler must call `next` unless it answers the request
    /// itself.
    fn wrap_handler(&self, next: BoxHandler) -> Wrapped<BoxHandler>;
}

/// Decorates the application's outbound HTTP client.
pub trait ClientWrapper: Send + Sync {
    fn wrap_client(&self, next: BoxClient) -> Wrapped<BoxClient>;
}

/// Copies state from an inbound request onto an outgoing one.
pub trait RequestContextWrapper: Send + Sync {
    fn wrap_request(&self, parent: &Extensions, request: Request<Body>) -> Request<Body>;
}

/// A live plugin instance.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> &str;

    fn control_handler(&self) -> Option<&dyn ControlHandler> {
        None
    }

    fn inbound_wrapper(&self) -> Option<&dyn InboundWrapper> {
        None
    }

    fn client_wrapper(&self) -> Option<&dyn ClientWrapper> {
        None
    }

    fn request_wrapper(&self) -> Option<&dyn RequestContextWrapper> {
        None
    }

    /// Tracer exposed to application code for manual spans.
    fn tracer(&self) -> Option<Arc<Tracer>> {
        None
    }

    /// Release reporting resources. Called once when the agent closes.
    fn close(&self) -> BoxFuture<'_, Result<(), PluginError>> {
        Box::pin(async { Ok(()) })
    }
}

/// Capability set of a plugin, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub control: bool,
    pub inbound: bool,
    pub client: bool,
    pub request: bool,
}

impl Capabilities {
    pub fn of(plugin: &dyn Plugin) -> Self {
        Self {
            control: plugin.control_handler().is_some(),
            inbound: plugin.inbound_wrapper().is_some(),
            client: plugin.client_wrapper().is_some(),
            request: plugin.request_wrapper().is_some(),
        }
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (self.control, "control"),
            (self.inbound, "inbound"),
            (self.client, "client"),
            (self.request, "request-context"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect();

        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join(","))
        }
    }
}
