//! Exporter boundary for finished segments.
//!
//! # Responsibilities
//! - Define the handoff contract between the tracing core and whatever
//!   ships finished spans off-process
//! - Provide the in-process implementations: a channel bridge to a real
//!   sender task, a structured-log sink, and an in-memory sink for tests
//!
//! # Design Decisions
//! - `submit` is fire-and-forget and must never block a release
//! - Exporters receive owned snapshots, so they process segments
//!   independently of request flows

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::observability::metrics;
use crate::trace::segment::FinishedSegment;

/// Receives finished segments from the tracing core.
pub trait SegmentExporter: Send + Sync {
    /// Hand over a finished segment. Must not block.
    fn submit(&self, segment: FinishedSegment);
}

/// Bridges finished segments onto an unbounded channel.
///
/// The receiving half is typically drained by a sender task owned by the
/// host; when the receiver is gone, segments are dropped and counted.
pub struct ChannelExporter {
    tx: mpsc::UnboundedSender<FinishedSegment>,
}

impl ChannelExporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FinishedSegment>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SegmentExporter for ChannelExporter {
    fn submit(&self, segment: FinishedSegment) {
        if self.tx.send(segment).is_err() {
            metrics::record_export_dropped();
            tracing::debug!("Segment receiver gone, dropping finished segment");
        }
    }
}

/// Emits each finished segment as a structured log event.
pub struct LogExporter;

impl SegmentExporter for LogExporter {
    fn submit(&self, segment: FinishedSegment) {
        let payload = serde_json::to_string(&segment).unwrap_or_default();
        tracing::info!(
            trace_id = %segment.trace_id,
            span_id = %segment.span_id,
            operation = %segment.operation,
            duration_ms = segment.duration_ms,
            error = segment.error,
            segment = %payload,
            "Segment finished"
        );
    }
}

/// Collects finished segments in memory.
///
/// Test collaborator: assertions drain and inspect what the core submitted.
#[derive(Default)]
pub struct InMemoryExporter {
    segments: Mutex<Vec<FinishedSegment>>,
}

impl InMemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of segments submitted so far.
    pub fn len(&self) -> usize {
        self.segments.lock().expect("exporter mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every collected segment, oldest first.
    pub fn drain(&self) -> Vec<FinishedSegment> {
        std::mem::take(&mut *self.segments.lock().expect("exporter mutex poisoned"))
    }
}

impl SegmentExporter for InMemoryExporter {
    fn submit(&self, segment: FinishedSegment) {
        self.segments
            .lock()
            .expect("exporter mutex poisoned")
            .push(segment);
    }
}
