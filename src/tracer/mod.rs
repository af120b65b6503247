//! Distributed tracing core.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → propagation.rs (read B3 headers)
//!     → tracer.rs (open span, sample root traces via sampler.rs)
//!     → span.rs (tags, annotations, finish)
//!     → reporter.rs (queue, batch)
//!     → serializer.rs (Zipkin JSON)
//!     → Collector or log
//! ```
//!
//! # Design Decisions
//! - The active [`SpanContext`] travels in request extensions, not in
//!   thread-local or task-local state
//! - Unsampled spans are never buffered
//! - Reporting is off the request path

pub mod context;
pub mod propagation;
pub mod reporter;
pub mod sampler;
pub mod serializer;
pub mod span;
#[allow(clippy::module_inception)]
pub mod tracer;

pub use context::{SpanContext, SpanId, TraceId};
pub use reporter::{HttpReporter, HttpReporterConfig, LogReporter, MemoryReporter, ReportError, Reporter};
pub use sampler::Sampler;
pub use serializer::SpanSerializer;
pub use span::{Endpoint, MiddlewareType, Span, SpanKind, SpanModel};
pub use tracer::{Tracer, TracerOptions};
