//! B3 multi-header propagation.

use axum::http::{HeaderMap, HeaderValue};

use crate::tracer::context::{IdParseError, SpanContext, SpanId, TraceId};

pub const TRACE_ID_HEADER: &str = "x-b3-traceid";
pub const SPAN_ID_HEADER: &str = "x-b3-spanid";
pub const PARENT_SPAN_ID_HEADER: &str = "x-b3-parentspanid";
pub const SAMPLED_HEADER: &str = "x-b3-sampled";
pub const FLAGS_HEADER: &str = "x-b3-flags";

#[derive(Debug, thiserror::Error)]
pub enum PropagationError {
    #[error(transparent)]
    Id(#[from] IdParseError),

    #[error("header {0} is not valid text")]
    NotText(&'static str),

    #[error("invalid sampled value {0:?}")]
    Sampled(String),

    #[error("trace id and span id must be sent together")]
    Incomplete,
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>, PropagationError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|s| Some(s.trim()))
            .map_err(|_| PropagationError::NotText(name)),
    }
}

/// Read a span context from B3 headers. `Ok(None)` when the request carries
/// no trace identity.
pub fn extract(headers: &HeaderMap) -> Result<Option<SpanContext>, PropagationError> {
    let trace_id = header(headers, TRACE_ID_HEADER)?;
    let span_id = header(headers, SPAN_ID_HEADER)?;

    let (trace_id, span_id) = match (trace_id, span_id) {
        (None, None) => return Ok(None),
        (Some(trace), Some(span)) => (trace.parse::<TraceId>()?, span.parse::<SpanId>()?),
        _ => return Err(PropagationError::Incomplete),
    };

    let parent_id = header(headers, PARENT_SPAN_ID_HEADER)?
        .map(str::parse::<SpanId>)
        .transpose()?;

    let sampled = match header(headers, SAMPLED_HEADER)? {
        None => None,
        Some("1") | Some("true") => Some(true),
        Some("0") | Some("false") => Some(false),
        Some(other) => return Err(PropagationError::Sampled(other.to_string())),
    };

    let debug = header(headers, FLAGS_HEADER)? == Some("1");

    Ok(Some(SpanContext {
        trace_id,
        span_id,
        parent_id,
        sampled,
        debug,
    }))
}

/// Write `context` as B3 headers, replacing any already present.
pub fn inject(context: &SpanContext, headers: &mut HeaderMap) {
    let mut set = |name: &'static str, value: String| {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    };

    set(TRACE_ID_HEADER, context.trace_id.to_string());
    set(SPAN_ID_HEADER, context.span_id.to_string());
    if let Some(parent) = context.parent_id {
        set(PARENT_SPAN_ID_HEADER, parent.to_string());
    }
    if context.debug {
        set(FLAGS_HEADER, "1".to_string());
    } else if let Some(sampled) = context.sampled {
        set(SAMPLED_HEADER, if sampled { "1" } else { "0" }.to_string());
    }
}
