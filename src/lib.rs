//! Mesh agent library.
//!
//! Composes instrumentation plugins (health probes, service-mesh control,
//! Zipkin tracing) into an [`Agent`] that serves a control plane and wraps
//! the host application's inbound handlers and outbound clients.

pub mod agent;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod plugins;
pub mod tracer;

pub use agent::{Agent, AgentError, AgentLayer};
pub use config::AgentConfig;
pub use http::ControlPlaneServer;
pub use lifecycle::Shutdown;
pub use plugins::{Plugin, Registry, Spec};
