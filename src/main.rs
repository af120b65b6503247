//! Mesh agent.
//!
//! Runs the agent's control plane next to a small demo application whose
//! handlers and outbound client are wrapped by the composed plugins.
//!
//! # Architecture Overview
//!
//! ```text
//!     Mesh control plane              Application traffic
//!            │                                │
//!            ▼                                ▼
//!   ┌──────────────────┐          ┌───────────────────────┐
//!   │  control server  │          │  inbound wrappers     │
//!   │  (0.0.0.0:9900)  │          │  (EaseMesh, Zipkin)   │
//!   └────────┬─────────┘          └───────────┬───────────┘
//!            │ dispatch                       ▼
//!            ▼                        application handler
//!   Health / EaseMesh / ...                   │
//!                                             ▼
//!                                 request-context + client
//!                                 wrappers → downstream
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use clap::Parser;
use tokio::net::TcpListener;

use mesh_agent::config::{discover_mesh_file, load_config, AgentConfig, ObservabilityConfig};
use mesh_agent::http::client;
use mesh_agent::lifecycle::{signals, Shutdown};
use mesh_agent::observability::{logging, metrics};
use mesh_agent::plugins::{BoxClient, Registry};
use mesh_agent::tracer::SpanContext;
use mesh_agent::Agent;

#[derive(Parser, Debug)]
#[command(name = "mesh-agent", version, about = "Service-mesh instrumentation agent")]
struct Args {
    /// Agent config file (TOML or JSON). Without it the mesh YAML file is
    /// discovered and used
    #[arg(short, long, env = "MESH_AGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Address of the demo application
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// URL called by the demo application's /chain route
    #[arg(long)]
    downstream: Option<Uri>,
}

#[derive(Clone)]
struct AppState {
    agent: Agent,
    client: BoxClient,
    downstream: Option<Uri>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // The mesh file has no logging settings; logging starts before it is read.
    let config = match &args.config {
        Some(path) => {
            let config = load_config(path).map_err(|e| {
                eprintln!("Failed to load config {}: {e}", path.display());
                e
            })?;
            logging::init(&config.observability)?;
            config
        }
        None => {
            logging::init(&ObservabilityConfig::default())?;
            let mesh_file = discover_mesh_file();
            match &mesh_file {
                Some(path) => tracing::info!(path = %path.display(), "Loading mesh file"),
                None => tracing::info!("No mesh file found, using default plugin specs"),
            }
            AgentConfig::from_mesh_file(mesh_file.as_deref(), &args.listen.to_string())
        }
    };

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "mesh-agent starting");

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        if let Err(e) = metrics::init_metrics(addr) {
            tracing::error!(error = %e, "Failed to start metrics exporter");
        }
    }

    let registry = Registry::builtin()?;
    let agent = Agent::new(config, &registry).map_err(|e| {
        tracing::error!(error = %e, "Agent composition failed");
        e
    })?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    let control = agent.spawn_control_plane(&shutdown).await?;
    tracing::info!(address = %control.local_addr(), "Control plane started");

    let state = AppState {
        agent: agent.clone(),
        client: agent.wrap_client(client::from_hyper(client::default_client())),
        downstream: args.downstream,
    };
    let app = Router::new()
        .route("/", get(hello))
        .route("/chain", get(chain))
        .with_state(state)
        .layer(agent.layer());

    let listener = TcpListener::bind(args.listen).await?;
    tracing::info!(address = %listener.local_addr()?, "Demo application listening");

    let mut app_shutdown = shutdown.subscribe();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = app_shutdown.recv().await;
        })
        .await?;

    if let Err(e) = control.join().await {
        tracing::warn!(error = %e, "Control plane stopped with error");
    }
    if let Err(e) = agent.close().await {
        tracing::warn!(error = %e, "Agent closed with errors");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn hello(request: Request<Body>) -> String {
    match request.extensions().get::<SpanContext>() {
        Some(context) => format!("hello, trace {}\n", context.trace_id),
        None => "hello\n".to_string(),
    }
}

/// Call the downstream service, continuing the current trace.
async fn chain(State(state): State<AppState>, request: Request<Body>) -> Response {
    let Some(downstream) = state.downstream.clone() else {
        return (StatusCode::NOT_FOUND, "no downstream configured\n").into_response();
    };

    let outgoing = match Request::get(downstream).body(Body::empty()) {
        Ok(outgoing) => outgoing,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };
    let outgoing = state.agent.wrap_request(request.extensions(), outgoing);

    match client::send(&state.client, outgoing).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "Downstream call failed");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}
