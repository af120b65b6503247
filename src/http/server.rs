//! Control-plane HTTP server.
//!
//! # Responsibilities
//! - Create the Axum Router whose fallback hands every request to the agent
//! - Wire up middleware (tracing, request timeout)
//! - Serve on a bound listener until the shutdown signal fires

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::agent::Agent;
use crate::config::ControlPlaneConfig;

/// HTTP server for the control plane.
pub struct ControlPlaneServer {
    router: Router,
}

impl ControlPlaneServer {
    pub fn new(agent: Agent, config: &ControlPlaneConfig) -> Self {
        Self {
            router: Self::build_router(agent, config),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(agent: Agent, config: &ControlPlaneConfig) -> Router {
        Router::new()
            .fallback(control_handler)
            .with_state(agent)
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// The router, for serving it elsewhere or driving it in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Control plane listening");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!(address = %addr, "Control plane stopped");
        Ok(())
    }
}

async fn control_handler(State(agent): State<Agent>, request: Request<Body>) -> Response {
    agent.serve_control(request).await
}
