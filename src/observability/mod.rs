//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, histograms via `metrics`)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint
//! ```
//!
//! Distributed traces of the host application are a plugin concern and live
//! in the `tracer` module, not here.

pub mod logging;
pub mod metrics;
