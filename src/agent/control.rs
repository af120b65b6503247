//! Control-plane dispatch and agent shutdown.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;

use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
    response::IntoResponse,
};
use futures_util::FutureExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::agent::{Agent, AgentError};
use crate::http::server::ControlPlaneServer;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::plugins::Dispatch;

/// Metric label for requests no plugin claimed.
const UNMATCHED: &str = "unmatched";

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// A running control-plane server.
#[derive(Debug)]
pub struct ControlPlaneHandle {
    local_addr: SocketAddr,
    task: JoinHandle<std::io::Result<()>>,
}

impl ControlPlaneHandle {
    /// Bound address; differs from the configured one when port 0 was used.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the server to stop after shutdown is triggered.
    pub async fn join(self) -> std::io::Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(std::io::Error::other(e)),
        }
    }
}

impl Agent {
    /// Offer a control-plane request to each plugin in composition order.
    ///
    /// The first plugin to answer wins. A handler error becomes that
    /// request's error response and a panic becomes a 500; neither reaches
    /// the caller or other requests.
    pub async fn dispatch(&self, request: Request<Body>) -> Dispatch {
        self.dispatch_with_owner(request).await.0
    }

    /// Like [`Agent::dispatch`], also returning the kind of the plugin that
    /// answered.
    async fn dispatch_with_owner(&self, request: Request<Body>) -> (Dispatch, Option<&str>) {
        let mut request = request;

        for plugin in self.plugins() {
            let Some(handler) = plugin.control_handler() else {
                continue;
            };

            let outcome = AssertUnwindSafe(async move { handler.handle_control(request).await })
                .catch_unwind()
                .await;

            let handled = match outcome {
                Ok(Ok(Dispatch::Declined(returned))) => {
                    request = returned;
                    continue;
                }
                Ok(Ok(handled)) => handled,
                Ok(Err(e)) => {
                    tracing::warn!(plugin = plugin.name(), error = %e, "Control request failed");
                    Dispatch::Handled(e.into_response())
                }
                Err(panic) => {
                    tracing::error!(
                        plugin = plugin.name(),
                        panic = panic_message(panic.as_ref()),
                        "Control handler panicked"
                    );
                    Dispatch::Handled(StatusCode::INTERNAL_SERVER_ERROR.into_response())
                }
            };
            return (handled, Some(plugin.kind()));
        }

        (Dispatch::Declined(request), None)
    }

    /// Dispatch and turn an unclaimed request into 404. Requests are counted
    /// by the kind of the plugin that answered.
    pub async fn serve_control(&self, request: Request<Body>) -> Response<Body> {
        let (dispatch, owner) = self.dispatch_with_owner(request).await;

        let response = match dispatch {
            Dispatch::Handled(response) => response,
            Dispatch::Declined(_) => StatusCode::NOT_FOUND.into_response(),
        };

        metrics::record_control_request(owner.unwrap_or(UNMATCHED), response.status().as_u16());
        response
    }

    /// Bind the configured address and serve the control plane on a
    /// background task until `shutdown` fires.
    pub async fn spawn_control_plane(&self, shutdown: &Shutdown) -> Result<ControlPlaneHandle, AgentError> {
        let bind_err = |source| AgentError::Bind {
            address: self.address().to_string(),
            source,
        };

        let listener = TcpListener::bind(self.address()).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        let server = ControlPlaneServer::new(self.clone(), self.control_config());
        let task = tokio::spawn(server.run(listener, shutdown.subscribe()));

        Ok(ControlPlaneHandle { local_addr, task })
    }

    /// Close every plugin. All plugins are closed even when some fail; the
    /// failures are returned together.
    pub async fn close(&self) -> Result<(), AgentError> {
        let mut failures = Vec::new();

        for plugin in self.plugins() {
            match plugin.close().await {
                Ok(()) => tracing::debug!(plugin = plugin.name(), "Plugin closed"),
                Err(e) => {
                    tracing::warn!(plugin = plugin.name(), error = %e, "Plugin failed to close");
                    failures.push((plugin.name().to_string(), e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AgentError::Shutdown(failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use futures_util::future::BoxFuture;

    use crate::config::AgentConfig;
    use crate::plugins::{ControlError, ControlHandler, Descriptor, Plugin, PluginError, Registry, Spec};

    #[derive(Clone, Copy)]
    enum Behavior {
        Claim(&'static str),
        Fail,
        Panic,
    }

    struct Scripted {
        name: String,
        behavior: Behavior,
    }

    impl Plugin for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> &str {
            &self.name
        }

        fn control_handler(&self) -> Option<&dyn ControlHandler> {
            Some(self)
        }

        fn close(&self) -> BoxFuture<'_, Result<(), PluginError>> {
            Box::pin(async move {
                match self.behavior {
                    Behavior::Fail => Err(PluginError::other("flush failed")),
                    _ => Ok(()),
                }
            })
        }
    }

    impl ControlHandler for Scripted {
        fn handle_control(&self, request: Request<Body>) -> BoxFuture<'_, Result<Dispatch, ControlError>> {
            Box::pin(async move {
                match self.behavior {
                    Behavior::Claim(path) if request.uri().path() == path => {
                        Ok(Dispatch::Handled(self.name.clone().into_response()))
                    }
                    Behavior::Claim(_) => Ok(Dispatch::Declined(request)),
                    Behavior::Fail if request.uri().path() == "/fail" => {
                        Err(ControlError::BadRequest("nope".to_string()))
                    }
                    Behavior::Fail => Ok(Dispatch::Declined(request)),
                    Behavior::Panic if request.uri().path() == "/panic" => panic!("handler exploded"),
                    Behavior::Panic => Ok(Dispatch::Declined(request)),
                }
            })
        }
    }

    fn agent(plugins: &[(&'static str, Behavior)]) -> Agent {
        let registry = Registry::from_descriptors(plugins.iter().map(|&(kind, behavior)| {
            Descriptor::new(
                kind,
                move || Spec::new(kind, kind),
                move |spec: Spec| {
                    Ok(Arc::new(Scripted {
                        name: spec.name,
                        behavior,
                    }) as Arc<dyn Plugin>)
                },
            )
        }))
        .unwrap();
        let config = plugins
            .iter()
            .fold(AgentConfig::default(), |config, &(kind, _)| config.with_spec(Spec::new(kind, kind)));
        Agent::new(config, &registry).unwrap()
    }

    fn request(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    async fn body(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_first_claim_wins() {
        let agent = agent(&[("first", Behavior::Claim("/x")), ("second", Behavior::Claim("/x"))]);
        let response = agent.serve_control(request("/x")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, "first");
    }

    #[tokio::test]
    async fn test_declined_request_passed_on() {
        let agent = agent(&[("first", Behavior::Claim("/a")), ("second", Behavior::Claim("/b"))]);
        assert_eq!(body(agent.serve_control(request("/b")).await).await, "second");

        match agent.dispatch(request("/c")).await {
            Dispatch::Declined(request) => assert_eq!(request.uri().path(), "/c"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(agent.serve_control(request("/c")).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_owner_is_answering_kind() {
        let agent = agent(&[
            ("failing", Behavior::Fail),
            ("panicking", Behavior::Panic),
            ("healthy", Behavior::Claim("/ok")),
        ]);

        let owner = |path: &'static str| {
            let agent = agent.clone();
            async move { agent.dispatch_with_owner(request(path)).await.1.map(str::to_string) }
        };
        assert_eq!(owner("/ok?id=1").await.as_deref(), Some("healthy"));
        assert_eq!(owner("/fail").await.as_deref(), Some("failing"));
        assert_eq!(owner("/panic").await.as_deref(), Some("panicking"));
        assert_eq!(owner("/random/123").await, None);
    }

    #[tokio::test]
    async fn test_handler_error_and_panic_isolated() {
        let agent = agent(&[
            ("failing", Behavior::Fail),
            ("panicking", Behavior::Panic),
            ("healthy", Behavior::Claim("/ok")),
        ]);

        assert_eq!(agent.serve_control(request("/fail")).await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            agent.serve_control(request("/panic")).await.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(agent.serve_control(request("/ok")).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_close_collects_failures() {
        let agent = agent(&[
            ("a", Behavior::Fail),
            ("b", Behavior::Claim("/")),
            ("c", Behavior::Fail),
        ]);

        match agent.close().await {
            Err(AgentError::Shutdown(failures)) => {
                let names: Vec<&str> = failures.iter().map(|(name, _)| name.as_str()).collect();
                assert_eq!(names, vec!["a", "c"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
