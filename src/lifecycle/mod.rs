//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Compose agent → Start control plane → Start app
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Close plugins (flush spans) → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: a composition error is fatal at startup
//! - Plugins close after the servers stop so in-flight spans are flushed

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
