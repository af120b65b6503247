//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderMap, Request, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower::{service_fn, util::BoxCloneSyncService, ServiceExt};

use mesh_agent::agent::ControlPlaneHandle;
use mesh_agent::lifecycle::Shutdown;
use mesh_agent::plugins::{zipkin, BoxHandler, Descriptor, InboundWrapper, Plugin, Spec, Wrapped};
use mesh_agent::tracer::propagation::TRACE_ID_HEADER;
use mesh_agent::tracer::{MemoryReporter, Reporter};
use mesh_agent::Agent;

pub type Log = Arc<Mutex<Vec<String>>>;

/// Plugin that records when its inbound wrapper runs.
pub struct Marker {
    name: String,
    log: Log,
}

impl Plugin for Marker {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        &self.name
    }

    fn inbound_wrapper(&self) -> Option<&dyn InboundWrapper> {
        Some(self)
    }
}

impl InboundWrapper for Marker {
    fn wrap_handler(&self, next: BoxHandler) -> Wrapped<BoxHandler> {
        let name = self.name.clone();
        let log = self.log.clone();
        Wrapped::Decorated(BoxCloneSyncService::new(service_fn(move |request: Request<Body>| {
            let name = name.clone();
            let log = log.clone();
            let next = next.clone();
            async move {
                log.lock().unwrap().push(format!("{name}>"));
                let response = next.oneshot(request).await;
                log.lock().unwrap().push(format!("<{name}"));
                response
            }
        })))
    }
}

/// Descriptor for a [`Marker`] whose instance name equals its kind.
pub fn marker_descriptor(kind: &'static str, log: &Log) -> Descriptor {
    let log = log.clone();
    Descriptor::new(
        kind,
        move || Spec::new(kind, kind),
        move |spec: Spec| {
            Ok(Arc::new(Marker {
                name: spec.name,
                log: log.clone(),
            }) as Arc<dyn Plugin>)
        },
    )
}

/// Zipkin descriptor that reports into `reporter` instead of a collector.
pub fn memory_zipkin_descriptor(reporter: &Arc<MemoryReporter>) -> Descriptor {
    let reporter = reporter.clone();
    Descriptor::new(
        zipkin::KIND,
        || zipkin::console_report_spec(""),
        move |spec: Spec| {
            let reporter: Arc<dyn Reporter> = reporter.clone();
            Ok(Arc::new(zipkin::Zipkin::with_reporter(spec, reporter)?) as Arc<dyn Plugin>)
        },
    )
}

/// Handler answering `ok` and logging that it ran.
pub fn app(log: &Log) -> BoxHandler {
    let log = log.clone();
    BoxCloneSyncService::new(service_fn(move |_request: Request<Body>| {
        let log = log.clone();
        async move {
            log.lock().unwrap().push("app".to_string());
            Ok::<_, Infallible>(Response::new(Body::from("ok")))
        }
    }))
}

/// Start a downstream service that answers with the trace id it received.
pub async fn start_downstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new().route(
        "/",
        get(|headers: HeaderMap| async move {
            headers
                .get(TRACE_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("none")
                .to_string()
        }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    addr
}

/// Serve the agent's control plane on an ephemeral port.
pub async fn start_control_plane(agent: &Agent) -> (ControlPlaneHandle, Shutdown) {
    let shutdown = Shutdown::new();
    let handle = agent.spawn_control_plane(&shutdown).await.unwrap();

    // Let the server task start accepting.
    tokio::time::sleep(Duration::from_millis(50)).await;
    (handle, shutdown)
}
