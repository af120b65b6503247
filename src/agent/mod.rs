//! Agent subsystem.
//!
//! # Data Flow
//! ```text
//! AgentConfig + Registry
//!     → composer.rs (configured plugins, then missing system plugins)
//!     → Agent (immutable plugin list, shared by clones)
//!
//! Control-plane request  → control.rs (first plugin that claims it answers)
//! Application request    → chain.rs (onion of inbound wrappers)
//! Outgoing request       → chain.rs (request-context wrappers, client wrappers)
//! ```
//!
//! # Design Decisions
//! - Composition is all or nothing: any failure drops every built plugin
//! - The plugin list never changes after composition, so it is read without
//!   locks
//! - A wrapper that declines leaves the chain intact; the request path never
//!   fails because of instrumentation

mod chain;
mod composer;
mod control;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::ControlPlaneConfig;
use crate::plugins::{Plugin, PluginError, SpecError};
use crate::tracer::Tracer;

pub use chain::{AgentLayer, AgentService};
pub use control::ControlPlaneHandle;

/// Error type for agent construction and shutdown.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("failed to create No.{index} plugin: {source}")]
    InvalidSpec {
        index: usize,
        #[source]
        source: SpecError,
    },

    #[error("failed to create No.{index} plugin: kind {kind} not found")]
    KindNotFound { index: usize, kind: String },

    #[error("failed to create No.{index} plugin {kind}: empty name")]
    EmptyName { index: usize, kind: String },

    #[error("failed to create No.{index} plugin {kind}/{name}: kind {kind} already configured")]
    DuplicateKind { index: usize, kind: String, name: String },

    #[error("failed to create No.{index} plugin {kind}/{name}: {source}")]
    Instantiate {
        index: usize,
        kind: String,
        name: String,
        #[source]
        source: PluginError,
    },

    #[error("failed to create system plugin {kind}: {source}")]
    SystemPlugin {
        kind: String,
        #[source]
        source: PluginError,
    },

    #[error("control plane bind {address} failed: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{} plugin(s) failed to close: {}", .0.len(), join_close_errors(.0))]
    Shutdown(Vec<(String, PluginError)>),
}

fn join_close_errors(errors: &[(String, PluginError)]) -> String {
    errors
        .iter()
        .map(|(name, e)| format!("{name}: {e}"))
        .collect::<Vec<_>>()
        .join("; ")
}

struct AgentInner {
    address: String,
    control: ControlPlaneConfig,
    plugins: Vec<Arc<dyn Plugin>>,
}

/// A composed set of plugins. Cloning is cheap and shares the same plugins.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl Agent {
    /// Plugins in composition order.
    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.inner.plugins
    }

    /// First plugin with the given instance name.
    pub fn plugin(&self, name: &str) -> Option<&Arc<dyn Plugin>> {
        self.inner.plugins.iter().find(|p| p.name() == name)
    }

    /// Tracer of the first plugin that exposes one.
    pub fn tracer(&self) -> Option<Arc<Tracer>> {
        self.inner.plugins.iter().find_map(|p| p.tracer())
    }

    /// Configured control-plane address.
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Parsed control-plane address.
    pub fn socket_addr(&self) -> Result<SocketAddr, AgentError> {
        self.inner.address.parse().map_err(|e| AgentError::Bind {
            address: self.inner.address.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
        })
    }

    pub(crate) fn control_config(&self) -> &ControlPlaneConfig {
        &self.inner.control
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let plugins: Vec<String> = self
            .inner
            .plugins
            .iter()
            .map(|p| format!("{}/{}", p.kind(), p.name()))
            .collect();
        f.debug_struct("Agent")
            .field("address", &self.inner.address)
            .field("plugins", &plugins)
            .finish()
    }
}
