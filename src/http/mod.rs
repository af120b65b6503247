//! HTTP plumbing subsystem.
//!
//! # Data Flow
//! ```text
//! Control-plane connection
//!     → server.rs (Axum setup, tracing, timeout)
//!     → Agent::serve_control (plugin dispatch)
//!
//! Application outbound call
//!     → client.rs (hyper client erased to BoxClient)
//!     → Agent::wrap_client (plugin decoration)
//! ```

pub mod client;
pub mod server;

pub use server::ControlPlaneServer;
