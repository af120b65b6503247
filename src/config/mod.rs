//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML/JSON)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AgentConfig (validated, immutable)
//!     → handed to Agent::new
//!
//! mesh file (flat YAML, discovered)
//!     → mesh_file.rs (per-part decode with fallbacks)
//!     → AgentConfig (Health, EaseMesh, Zipkin)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the only runtime change is the mesh
//!   header allow-list pushed through the control plane
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod mesh_file;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use mesh_file::{discover_mesh_file, MeshFileError};
pub use schema::{AgentConfig, ControlPlaneConfig, LogFormat, ObservabilityConfig};
pub use validation::{validate_config, ValidationError};
