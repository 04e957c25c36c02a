//! Segment context: the span model.
//!
//! # Responsibilities
//! - Represent one timed unit of work (entry, local, or exit span)
//! - Carry identity, parent linkage, tags, logs, and error status
//! - Latch the finished state exactly once at release
//! - Snapshot into an owned, serializable form for the exporter
//!
//! # Design Decisions
//! - Open/finished and error flags are atomics; append-only collections
//!   sit behind a mutex held only for the duration of a push
//! - Cross-process parentage is a separate upstream reference, never
//!   mixed into the local parent span ID

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::ambient::EnterToken;
use crate::error::{TraceError, TraceResult};
use crate::trace::carrier::{ContextCarrier, UpstreamReference};
use crate::trace::ids::{SpanId, SpanIdAllocator, TraceId};

/// The role a span plays in its trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    /// First span of a flow, created for an inbound request.
    Entry,
    /// In-process work with no outbound call.
    Local,
    /// Wraps an outbound call; emits a carrier for the downstream peer.
    Exit,
}

/// A timestamped event recorded on a span.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp_ms: u64,
    pub event: String,
    pub message: String,
}

/// Mutable interior of an open segment.
#[derive(Debug, Default)]
struct SegmentState {
    tags: Vec<(String, String)>,
    logs: Vec<LogEntry>,
    error_cause: Option<String>,
}

/// One span of a trace.
///
/// Created by the [`Tracer`](crate::tracer::Tracer), owned by the caller
/// that created it, and referenced by the ambient slot while it is the
/// innermost open span of its flow. Tags, logs, and the error flag may only
/// be mutated while the segment is open; every mutator reports
/// [`TraceError::InvalidState`] once the segment has been finished.
#[derive(Debug)]
pub struct SegmentContext {
    trace_id: TraceId,
    span_id: SpanId,
    parent_span_id: Option<SpanId>,
    kind: SpanKind,
    operation: String,
    peer: Option<String>,
    upstream: Option<UpstreamReference>,
    sampled: bool,
    started_at: SystemTime,
    allocator: SpanIdAllocator,
    error: AtomicBool,
    finished: AtomicBool,
    state: Mutex<SegmentState>,
    /// Restoration token captured at the matching ambient enter.
    ambient: Mutex<Option<EnterToken>>,
}

impl SegmentContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        trace_id: TraceId,
        span_id: SpanId,
        parent_span_id: Option<SpanId>,
        kind: SpanKind,
        operation: String,
        peer: Option<String>,
        upstream: Option<UpstreamReference>,
        sampled: bool,
        allocator: SpanIdAllocator,
    ) -> Self {
        Self {
            trace_id,
            span_id,
            parent_span_id,
            kind,
            operation,
            peer,
            upstream,
            sampled,
            started_at: SystemTime::now(),
            allocator,
            error: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            state: Mutex::new(SegmentState::default()),
            ambient: Mutex::new(None),
        }
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    pub fn kind(&self) -> SpanKind {
        self.kind
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn sampled(&self) -> bool {
        self.sampled
    }

    /// Cross-process parent decoded from the incoming carrier, if any.
    pub fn upstream(&self) -> Option<&UpstreamReference> {
        self.upstream.as_ref()
    }

    /// True once the segment has been released.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn error_occurred_flag(&self) -> bool {
        self.error.load(Ordering::Relaxed)
    }

    pub(crate) fn allocator(&self) -> &SpanIdAllocator {
        &self.allocator
    }

    /// Outgoing carrier for the downstream call. Present on exit spans only.
    pub fn carrier(&self) -> Option<ContextCarrier> {
        match self.kind {
            SpanKind::Exit => Some(ContextCarrier {
                trace_id: self.trace_id,
                parent_span_id: self.span_id.to_string(),
                sampled: self.sampled,
            }),
            _ => None,
        }
    }

    fn check_open(&self, operation: &'static str) -> TraceResult<()> {
        if self.is_finished() {
            return Err(TraceError::InvalidState {
                span: self.span_id,
                operation,
            });
        }
        Ok(())
    }

    /// Append a tag. Tags keep insertion order and are never overwritten.
    pub fn add_tag(&self, key: impl Into<String>, value: impl Into<String>) -> TraceResult<()> {
        self.check_open("add_tag")?;
        let mut state = self.state.lock().expect("segment state mutex poisoned");
        state.tags.push((key.into(), value.into()));
        Ok(())
    }

    /// Append a timestamped log event.
    pub fn add_log(&self, event: impl Into<String>, message: impl Into<String>) -> TraceResult<()> {
        self.check_open("add_log")?;
        let entry = LogEntry {
            timestamp_ms: now_millis(),
            event: event.into(),
            message: message.into(),
        };
        let mut state = self.state.lock().expect("segment state mutex poisoned");
        state.logs.push(entry);
        Ok(())
    }

    /// Set the error flag. Idempotent; the flag is never reset.
    pub fn error_occurred(&self) -> TraceResult<()> {
        self.check_open("error_occurred")?;
        self.error.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Set the error flag and record its cause.
    ///
    /// Idempotent with respect to the flag; the first cause wins, later
    /// causes are still appended to the span log.
    pub fn error_occurred_with_cause(&self, cause: impl std::fmt::Display) -> TraceResult<()> {
        self.check_open("error_occurred")?;
        self.error.store(true, Ordering::Relaxed);
        let message = cause.to_string();
        let mut state = self.state.lock().expect("segment state mutex poisoned");
        if state.error_cause.is_none() {
            state.error_cause = Some(message.clone());
        }
        state.logs.push(LogEntry {
            timestamp_ms: now_millis(),
            event: "error".to_string(),
            message,
        });
        Ok(())
    }

    /// Attach the ambient restoration token captured at enter.
    pub(crate) fn bind_ambient(&self, token: EnterToken) {
        let mut slot = self.ambient.lock().expect("ambient token mutex poisoned");
        *slot = Some(token);
    }

    /// The restoration token captured at enter, if the segment was entered.
    pub(crate) fn ambient_token(&self) -> Option<EnterToken> {
        self.ambient
            .lock()
            .expect("ambient token mutex poisoned")
            .clone()
    }

    /// Latch the finished state and snapshot the segment for export.
    ///
    /// Exactly one caller wins; every later call reports `DoubleRelease`.
    pub(crate) fn finish(&self) -> TraceResult<FinishedSegment> {
        if self
            .finished
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TraceError::DoubleRelease { span: self.span_id });
        }

        let finished_ms = now_millis();
        let started_ms = unix_millis(self.started_at);
        let state = self.state.lock().expect("segment state mutex poisoned");

        Ok(FinishedSegment {
            trace_id: self.trace_id,
            span_id: self.span_id,
            parent_span_id: self.parent_span_id,
            kind: self.kind,
            operation: self.operation.clone(),
            peer: self.peer.clone(),
            upstream: self.upstream.clone(),
            sampled: self.sampled,
            error: self.error.load(Ordering::Relaxed),
            error_cause: state.error_cause.clone(),
            tags: state.tags.clone(),
            logs: state.logs.clone(),
            started_ms,
            finished_ms,
            duration_ms: finished_ms.saturating_sub(started_ms),
        })
    }
}

/// Owned snapshot of a finished segment, handed to the exporter.
#[derive(Debug, Clone, Serialize)]
pub struct FinishedSegment {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub kind: SpanKind,
    pub operation: String,
    pub peer: Option<String>,
    pub upstream: Option<UpstreamReference>,
    pub sampled: bool,
    pub error: bool,
    pub error_cause: Option<String>,
    pub tags: Vec<(String, String)>,
    pub logs: Vec<LogEntry>,
    pub started_ms: u64,
    pub finished_ms: u64,
    pub duration_ms: u64,
}

fn now_millis() -> u64 {
    unix_millis(SystemTime::now())
}

fn unix_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_segment(kind: SpanKind) -> SegmentContext {
        let alloc = SpanIdAllocator::new();
        let span_id = alloc.allocate();
        SegmentContext::new(
            TraceId::new(),
            span_id,
            None,
            kind,
            "test-op".to_string(),
            None,
            None,
            true,
            alloc,
        )
    }

    #[test]
    fn test_mutators_while_open() {
        let segment = open_segment(SpanKind::Local);
        segment.add_tag("http.method", "GET").unwrap();
        segment.add_log("start", "request starting").unwrap();
        segment.error_occurred().unwrap();
        assert!(segment.error_occurred_flag());
        assert!(!segment.is_finished());
    }

    #[test]
    fn test_mutation_after_finish_rejected() {
        let segment = open_segment(SpanKind::Local);
        segment.finish().unwrap();

        let err = segment.add_tag("k", "v").unwrap_err();
        assert!(matches!(err, TraceError::InvalidState { .. }));
        let err = segment.error_occurred().unwrap_err();
        assert!(matches!(err, TraceError::InvalidState { .. }));
    }

    #[test]
    fn test_finish_latches_once() {
        let segment = open_segment(SpanKind::Entry);
        let finished = segment.finish().unwrap();
        assert!(finished.finished_ms >= finished.started_ms);

        let err = segment.finish().unwrap_err();
        assert!(matches!(err, TraceError::DoubleRelease { .. }));
    }

    #[test]
    fn test_error_cause_first_wins() {
        let segment = open_segment(SpanKind::Local);
        segment.error_occurred_with_cause("first failure").unwrap();
        segment.error_occurred_with_cause("second failure").unwrap();

        let finished = segment.finish().unwrap();
        assert!(finished.error);
        assert_eq!(finished.error_cause.as_deref(), Some("first failure"));
        // Both causes stay visible in the span log.
        assert_eq!(finished.logs.len(), 2);
    }

    #[test]
    fn test_carrier_only_on_exit_spans() {
        let exit = open_segment(SpanKind::Exit);
        let carrier = exit.carrier().expect("exit span emits a carrier");
        assert_eq!(carrier.trace_id, exit.trace_id());
        assert_eq!(carrier.parent_span_id, exit.span_id().to_string());

        assert!(open_segment(SpanKind::Local).carrier().is_none());
        assert!(open_segment(SpanKind::Entry).carrier().is_none());
    }
}
