//! Plugin subsystem.
//!
//! # Data Flow
//! ```text
//! Config document
//!     → spec.rs (kind, name, raw settings)
//!     → registry.rs (kind → descriptor)
//!     → descriptor instantiates the plugin (health.rs, mesh.rs, zipkin/)
//!     → capability.rs accessors tell the agent what the plugin can do
//! ```
//!
//! # Design Decisions
//! - Capabilities are separate traits discovered through `Option<&dyn _>`
//!   accessors on [`Plugin`]; a plugin implements only what it needs
//! - The registry is a value built at startup, never global state
//! - Settings decode over kind defaults, so documents list only overrides

pub mod capability;
pub mod health;
pub mod mesh;
pub mod registry;
pub mod spec;
pub mod zipkin;

pub use capability::{
    BoxClient, BoxHandler, Capabilities, ClientWrapper, ControlError, ControlHandler, Dispatch, InboundWrapper,
    Plugin, PluginError, RequestContextWrapper, Wrapped,
};
pub use registry::{Descriptor, Registry, RegistryError};
pub use spec::{PluginSpec, Spec, SpecError};
