//! Context carrier: trace identity across a process boundary.
//!
//! # Responsibilities
//! - Encode the minimal identity a downstream service needs to continue a
//!   trace (trace ID, parent span ID, sampling decision) as header pairs
//! - Decode incoming headers, degrading gracefully on absent or malformed
//!   input
//!
//! # Design Decisions
//! - Pure data, no behavior beyond encode/decode
//! - Decode failure is recovered by the caller with a fresh trace identity;
//!   it never propagates out of the tracing core

use serde::Serialize;

use crate::trace::ids::TraceId;

/// Header carrying the trace ID.
pub const TRACE_ID_HEADER: &str = "x-trace-id";
/// Header carrying the span ID the downstream spans should treat as parent.
pub const PARENT_SPAN_HEADER: &str = "x-trace-parent-span";
/// Header carrying the sampling decision ("1" or "0").
pub const SAMPLED_HEADER: &str = "x-trace-sampled";

/// Serialized trace identity attached to an outbound call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextCarrier {
    pub trace_id: TraceId,
    /// Span ID of the upstream span, kept as the string form it travels in.
    pub parent_span_id: String,
    pub sampled: bool,
}

/// Why an incoming carrier could not be decoded.
///
/// Always recovered inside the tracing core; exposed so adapters can tell
/// "no upstream" apart from "garbled upstream" when logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierError {
    /// No carrier headers present; the request starts a fresh trace.
    Absent,
    /// Headers present but unparseable.
    Malformed,
}

impl ContextCarrier {
    /// Header pairs to attach to the downstream request.
    pub fn to_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            (TRACE_ID_HEADER, self.trace_id.to_string()),
            (PARENT_SPAN_HEADER, self.parent_span_id.clone()),
            (SAMPLED_HEADER, if self.sampled { "1" } else { "0" }.to_string()),
        ]
    }

    /// Decode from HTTP headers.
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Result<Self, CarrierError> {
        Self::from_lookup(|name| headers.get(name).and_then(|v| v.to_str().ok()))
    }

    /// Decode from a header lookup function.
    ///
    /// The lookup abstracts over whatever header map the host framework
    /// uses; [`from_headers`](Self::from_headers) adapts `axum`'s map to it.
    pub fn from_lookup<'a>(get: impl Fn(&str) -> Option<&'a str>) -> Result<Self, CarrierError> {
        let trace_id = match get(TRACE_ID_HEADER) {
            Some(raw) => raw.parse::<TraceId>().map_err(|_| CarrierError::Malformed)?,
            None => return Err(CarrierError::Absent),
        };
        let parent_span_id = get(PARENT_SPAN_HEADER)
            .filter(|v| !v.is_empty())
            .ok_or(CarrierError::Malformed)?
            .to_string();
        let sampled = match get(SAMPLED_HEADER) {
            Some("1") => true,
            Some("0") => false,
            // Absent sampling flag defaults to sampled; anything else is noise.
            None => true,
            Some(_) => return Err(CarrierError::Malformed),
        };

        Ok(Self {
            trace_id,
            parent_span_id,
            sampled,
        })
    }
}

/// Cross-process parent recorded on an entry span.
///
/// Kept separate from the local parent span ID: the upstream span belongs to
/// another process segment and never participates in the local ancestor
/// chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamReference {
    pub trace_id: TraceId,
    pub span_id: String,
    pub sampled: bool,
}

impl From<&ContextCarrier> for UpstreamReference {
    fn from(carrier: &ContextCarrier) -> Self {
        Self {
            trace_id: carrier.trace_id,
            span_id: carrier.parent_span_id.clone(),
            sampled: carrier.sampled,
        }
    }
}
