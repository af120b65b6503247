//! Trace identifiers and span context.

use std::fmt;
use std::str::FromStr;

use rand::Rng;

/// Error parsing a hex identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {what} {value:?}")]
pub struct IdParseError {
    what: &'static str,
    value: String,
}

/// 64 or 128-bit trace identifier. `high` is zero for 64-bit ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId {
    pub high: u64,
    pub low: u64,
}

impl TraceId {
    pub fn new(high: u64, low: u64) -> Self {
        Self { high, low }
    }

    pub fn random(id_128bit: bool) -> Self {
        let mut rng = rand::thread_rng();
        let high = if id_128bit { rng.gen() } else { 0 };
        Self { high, low: nonzero(&mut rng) }
    }

    pub fn is_empty(&self) -> bool {
        self.high == 0 && self.low == 0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.high == 0 {
            write!(f, "{:016x}", self.low)
        } else {
            write!(f, "{:016x}{:016x}", self.high, self.low)
        }
    }
}

impl FromStr for TraceId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || IdParseError {
            what: "trace id",
            value: s.to_string(),
        };
        if s.is_empty() || s.len() > 32 {
            return Err(err());
        }

        let (high, low) = if s.len() > 16 {
            let split = s.len() - 16;
            (
                u64::from_str_radix(&s[..split], 16).map_err(|_| err())?,
                u64::from_str_radix(&s[split..], 16).map_err(|_| err())?,
            )
        } else {
            (0, u64::from_str_radix(s, 16).map_err(|_| err())?)
        };

        let id = TraceId { high, low };
        if id.is_empty() {
            return Err(err());
        }
        Ok(id)
    }
}

/// 64-bit span identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(pub u64);

impl SpanId {
    pub fn random() -> Self {
        SpanId(nonzero(&mut rand::thread_rng()))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SpanId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || IdParseError {
            what: "span id",
            value: s.to_string(),
        };
        if s.is_empty() || s.len() > 16 {
            return Err(err());
        }
        match u64::from_str_radix(s, 16) {
            Ok(0) | Err(_) => Err(err()),
            Ok(id) => Ok(SpanId(id)),
        }
    }
}

fn nonzero(rng: &mut impl Rng) -> u64 {
    loop {
        let id: u64 = rng.gen();
        if id != 0 {
            return id;
        }
    }
}

/// Identity and sampling state of a span, as propagated between services.
///
/// Stored in request extensions by the tracing plugin so application code and
/// outbound requests can pick up the active span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_id: Option<SpanId>,
    /// `None` defers the decision to the receiving tracer.
    pub sampled: Option<bool>,
    pub debug: bool,
}

impl SpanContext {
    pub fn is_sampled(&self) -> bool {
        self.debug || self.sampled == Some(true)
    }
}
