//! Error definitions for the tracing core.

use thiserror::Error;

use crate::trace::ids::SpanId;

/// Errors surfaced by segment lifecycle operations.
///
/// All variants indicate a bug in instrumentation code rather than a
/// recoverable runtime condition; callers log them and let the host
/// request proceed.
#[derive(Debug, Error)]
pub enum TraceError {
    /// Mutation attempted on a segment that has already been finished.
    #[error("segment {span} already finished, {operation} rejected")]
    InvalidState {
        span: SpanId,
        operation: &'static str,
    },

    /// Release called twice on the same segment.
    #[error("segment {span} released twice")]
    DoubleRelease { span: SpanId },

    /// Release attempted from a flow that does not own the segment's
    /// ambient slot. Cross-flow teardown must go through
    /// [`Tracer::adopt_and_release`](crate::tracer::Tracer::adopt_and_release).
    #[error("segment {span} released outside its owning flow")]
    ForeignRelease { span: SpanId },
}

/// Result type for tracing operations.
pub type TraceResult<T> = Result<T, TraceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TraceError::DoubleRelease { span: SpanId(3) };
        assert_eq!(err.to_string(), "segment 3 released twice");

        let err = TraceError::InvalidState {
            span: SpanId(1),
            operation: "add_tag",
        };
        assert!(err.to_string().contains("add_tag"));
    }
}
