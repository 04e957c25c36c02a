//! Tracing façade used by instrumented code.
//!
//! # Responsibilities
//! - Create entry/local/exit segment contexts, linking each to whatever is
//!   currently ambient as its parent
//! - Release contexts: finalize timing, restore the ambient slot, hand the
//!   finished segment to the exporter
//! - Provide the explicit cross-flow teardown (`adopt_and_release`) and
//!   snapshot capture for detached work
//!
//! # Design Decisions
//! - Release pairs with the exact restoration token captured at creation;
//!   a flow that does not own that token is refused
//! - Carrier decode failures are recovered here with a fresh trace
//!   identity and never surfaced to the caller

use std::future::Future;
use std::sync::Arc;

use crate::ambient::{self, AmbientSnapshot};
use crate::config::AgentConfig;
use crate::error::{TraceError, TraceResult};
use crate::export::SegmentExporter;
use crate::observability::metrics;
use crate::trace::carrier::{CarrierError, ContextCarrier, UpstreamReference};
use crate::trace::ids::{SpanIdAllocator, TraceId};
use crate::trace::segment::{SegmentContext, SpanKind};

/// Creates, correlates, and tears down segment contexts.
///
/// Cheap to clone-by-Arc and share across the application; all state it
/// carries is the exporter handle and service identity.
///
/// Contexts are never released implicitly. The creator owns an explicit
/// [`release`](Self::release) on every exit path, including error and
/// cancellation paths; a flow aborted while holding open contexts leaves
/// them unfinished rather than guessing at their timing.
pub struct Tracer {
    service_name: String,
    service_instance: String,
    follow_upstream_sampling: bool,
    exporter: Arc<dyn SegmentExporter>,
}

impl Tracer {
    pub fn new(config: &AgentConfig, exporter: Arc<dyn SegmentExporter>) -> Self {
        Self {
            service_name: config.service.name.clone(),
            service_instance: config.service.instance.clone(),
            follow_upstream_sampling: config.sampling.follow_upstream,
            exporter,
        }
    }

    /// The calling flow's current segment context, if any.
    pub fn current_context(&self) -> Option<Arc<SegmentContext>> {
        ambient::current()
    }

    /// Capture the calling flow's ambient context for detached work.
    pub fn capture(&self) -> AmbientSnapshot {
        ambient::snapshot()
    }

    /// Decode an incoming carrier, recovering failures locally.
    ///
    /// Absent headers mean "no upstream context"; malformed headers are
    /// counted, logged, and likewise treated as no upstream context.
    pub fn decode_carrier(headers: &axum::http::HeaderMap) -> Option<ContextCarrier> {
        match ContextCarrier::from_headers(headers) {
            Ok(carrier) => Some(carrier),
            Err(CarrierError::Absent) => None,
            Err(CarrierError::Malformed) => {
                metrics::record_carrier_decode_failure();
                tracing::debug!("Malformed trace carrier, starting fresh trace");
                None
            }
        }
    }

    /// Create the entry context for an inbound request and make it current.
    ///
    /// A valid carrier continues the upstream trace: its trace ID is
    /// inherited and the upstream span recorded as a cross-process
    /// reference. Otherwise a fresh trace identity is minted.
    pub fn create_entry_context(
        &self,
        operation: impl Into<String>,
        carrier: Option<&ContextCarrier>,
    ) -> Arc<SegmentContext> {
        let allocator = SpanIdAllocator::new();
        let span_id = allocator.allocate();
        let trace_id = carrier.map(|c| c.trace_id).unwrap_or_default();
        let sampled = match carrier {
            Some(c) if self.follow_upstream_sampling => c.sampled,
            _ => true,
        };
        let upstream = carrier.map(UpstreamReference::from);

        let context = Arc::new(SegmentContext::new(
            trace_id,
            span_id,
            None,
            SpanKind::Entry,
            operation.into(),
            None,
            upstream,
            sampled,
            allocator,
        ));
        let _ = context.add_tag("service.name", self.service_name.as_str());
        let _ = context.add_tag("service.instance", self.service_instance.as_str());

        self.activate(&context);
        metrics::record_segment_created("entry");
        context
    }

    /// Create a local context parented on the ambient current and make it
    /// current.
    ///
    /// With no ambient context this degrades to a fresh trace identity
    /// with no parent.
    pub fn create_local_context(&self, operation: impl Into<String>) -> Arc<SegmentContext> {
        let context = self.create_child(operation.into(), SpanKind::Local, None);
        metrics::record_segment_created("local");
        context
    }

    /// Create an exit context around an outbound call to `peer`.
    ///
    /// The returned context's [`carrier`](SegmentContext::carrier) encodes
    /// the identity to attach to the downstream request.
    pub fn create_exit_context(
        &self,
        operation: impl Into<String>,
        peer: impl Into<String>,
    ) -> Arc<SegmentContext> {
        let context = self.create_child(operation.into(), SpanKind::Exit, Some(peer.into()));
        metrics::record_segment_created("exit");
        context
    }

    fn create_child(
        &self,
        operation: String,
        kind: SpanKind,
        peer: Option<String>,
    ) -> Arc<SegmentContext> {
        let parent = ambient::current();
        let (trace_id, parent_span_id, sampled, allocator) = match &parent {
            Some(p) => (
                p.trace_id(),
                Some(p.span_id()),
                p.sampled(),
                p.allocator().clone(),
            ),
            None => (TraceId::new(), None, true, SpanIdAllocator::new()),
        };
        let span_id = allocator.allocate();

        let context = Arc::new(SegmentContext::new(
            trace_id,
            span_id,
            parent_span_id,
            kind,
            operation,
            peer,
            None,
            sampled,
            allocator,
        ));
        self.activate(&context);
        context
    }

    fn activate(&self, context: &Arc<SegmentContext>) {
        let token = ambient::enter(context);
        context.bind_ambient(token);
    }

    /// Finish a context: latch timing, restore the ambient slot to what
    /// the matching enter captured, and submit to the exporter.
    ///
    /// Must be called from the flow that created the context; a foreign
    /// flow is refused without mutating anything and must use
    /// [`adopt_and_release`](Self::adopt_and_release) instead. A second
    /// release reports [`TraceError::DoubleRelease`] and has no further
    /// effect on the ambient slot.
    pub fn release(&self, context: &Arc<SegmentContext>) -> TraceResult<()> {
        let token = context.ambient_token();
        if let Some(token) = &token {
            if token.flow.is_some() && token.flow != ambient::current_flow() {
                metrics::record_release_fault("foreign_flow");
                return Err(TraceError::ForeignRelease {
                    span: context.span_id(),
                });
            }
        }

        let finished = context.finish().inspect_err(|_| {
            metrics::record_release_fault("double_release");
        })?;

        if let Some(token) = &token {
            if !ambient::exit(token) {
                // Flow ownership was checked above; reaching this means the
                // scope ended underneath the release.
                tracing::debug!(span = %context.span_id(), "Ambient scope gone at release");
            }
        }

        metrics::record_segment_finished(kind_label(finished.kind), finished.error, finished.duration_ms);
        self.exporter.submit(finished);
        Ok(())
    }

    /// Finish a context from outside its owning flow.
    ///
    /// The explicit ownership transfer for detached work: the segment is
    /// finished and submitted, the owning flow's slot is left alone, and
    /// that flow's next ambient read resolves to the segment's parent.
    pub fn adopt_and_release(&self, context: &Arc<SegmentContext>) -> TraceResult<()> {
        let finished = context.finish().inspect_err(|_| {
            metrics::record_release_fault("double_release");
        })?;

        metrics::record_segment_finished(kind_label(finished.kind), finished.error, finished.duration_ms);
        self.exporter.submit(finished);
        Ok(())
    }

    /// Run a future inside a local span.
    ///
    /// Marks the span failed with the error as cause when the body returns
    /// `Err`, and always releases. Tracing faults are logged and swallowed;
    /// the body's result passes through untouched.
    pub async fn in_local_span<F, T, E>(&self, operation: &str, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let span = self.create_local_context(operation);
        let result = fut.await;

        if let Err(cause) = &result {
            if let Err(fault) = span.error_occurred_with_cause(cause) {
                tracing::warn!(span = %span.span_id(), error = %fault, "Failed to record span error");
            }
        }
        if let Err(fault) = self.release(&span) {
            tracing::warn!(span = %span.span_id(), error = %fault, "Failed to release local span");
        }
        result
    }
}

fn kind_label(kind: SpanKind) -> &'static str {
    match kind {
        SpanKind::Entry => "entry",
        SpanKind::Local => "local",
        SpanKind::Exit => "exit",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ambient::FlowScope;
    use crate::config::AgentConfig;
    use crate::export::InMemoryExporter;
    use crate::trace::ids::SpanId;

    fn tracer() -> (Tracer, Arc<InMemoryExporter>) {
        let exporter = Arc::new(InMemoryExporter::new());
        let tracer = Tracer::new(&AgentConfig::default(), exporter.clone());
        (tracer, exporter)
    }

    #[test]
    fn test_entry_local_exit_parent_chain() {
        let (tracer, exporter) = tracer();
        FlowScope::new().run_sync(|| {
            let entry = tracer.create_entry_context("GET /api/apps", None);
            let local = tracer.create_local_context("load-apps");
            let exit = tracer.create_exit_context("db-query", "db:5432");

            assert_eq!(local.parent_span_id(), Some(entry.span_id()));
            assert_eq!(exit.parent_span_id(), Some(local.span_id()));
            assert_eq!(local.trace_id(), entry.trace_id());
            assert_eq!(exit.trace_id(), entry.trace_id());

            tracer.release(&exit).unwrap();
            tracer.release(&local).unwrap();
            tracer.release(&entry).unwrap();
            assert!(ambient::current().is_none());
        });
        assert_eq!(exporter.len(), 3);
    }

    #[test]
    fn test_release_restores_parent_as_current() {
        let (tracer, _exporter) = tracer();
        FlowScope::new().run_sync(|| {
            let entry = tracer.create_entry_context("op", None);
            let local = tracer.create_local_context("inner");
            assert!(Arc::ptr_eq(&ambient::current().unwrap(), &local));

            tracer.release(&local).unwrap();
            assert!(Arc::ptr_eq(&ambient::current().unwrap(), &entry));
        });
    }

    #[test]
    fn test_local_without_ambient_degrades_to_fresh_trace() {
        let (tracer, exporter) = tracer();
        FlowScope::new().run_sync(|| {
            let local = tracer.create_local_context("standalone");
            assert_eq!(local.parent_span_id(), None);
            assert_eq!(local.span_id(), SpanId(0));
            tracer.release(&local).unwrap();
        });
        let finished = exporter.drain();
        assert_eq!(finished.len(), 1);
        assert!(finished[0].parent_span_id.is_none());
    }

    #[test]
    fn test_double_release_reported_without_slot_effect() {
        let (tracer, exporter) = tracer();
        FlowScope::new().run_sync(|| {
            let entry = tracer.create_entry_context("op", None);
            let local = tracer.create_local_context("inner");

            tracer.release(&local).unwrap();
            let err = tracer.release(&local).unwrap_err();
            assert!(matches!(err, TraceError::DoubleRelease { .. }));
            // Slot still points at the entry, untouched by the second call.
            assert!(Arc::ptr_eq(&ambient::current().unwrap(), &entry));
            tracer.release(&entry).unwrap();
        });
        assert_eq!(exporter.len(), 2);
    }

    #[test]
    fn test_entry_continues_upstream_trace() {
        let (tracer, _exporter) = tracer();
        let carrier = ContextCarrier {
            trace_id: TraceId::new(),
            parent_span_id: "9".to_string(),
            sampled: false,
        };
        FlowScope::new().run_sync(|| {
            let entry = tracer.create_entry_context("op", Some(&carrier));
            assert_eq!(entry.trace_id(), carrier.trace_id);
            assert!(!entry.sampled());
            // Cross-process parent is an upstream reference, not a local parent.
            assert_eq!(entry.parent_span_id(), None);
            let upstream = entry.upstream().unwrap();
            assert_eq!(upstream.span_id, "9");
            tracer.release(&entry).unwrap();
        });
    }

    #[test]
    fn test_exit_carrier_round_trips_into_entry() {
        let (tracer, _exporter) = tracer();
        FlowScope::new().run_sync(|| {
            let entry = tracer.create_entry_context("op", None);
            let exit = tracer.create_exit_context("call-backend", "backend:8080");
            let carrier = exit.carrier().unwrap();

            // What the downstream service would do with the carrier.
            FlowScope::new().run_sync(|| {
                let downstream = tracer.create_entry_context("downstream-op", Some(&carrier));
                assert_eq!(downstream.trace_id(), entry.trace_id());
                assert_eq!(
                    downstream.upstream().unwrap().span_id,
                    exit.span_id().to_string()
                );
                tracer.release(&downstream).unwrap();
            });

            tracer.release(&exit).unwrap();
            tracer.release(&entry).unwrap();
        });
    }

    #[tokio::test]
    async fn test_foreign_flow_release_refused() {
        let (tracer, exporter) = tracer();
        let tracer = Arc::new(tracer);

        let local = FlowScope::new()
            .run(async { tracer.create_local_context("owned") })
            .await;

        let t = tracer.clone();
        let ctx = local.clone();
        let err = tokio::spawn(async move {
            FlowScope::new()
                .run(async move { t.release(&ctx).unwrap_err() })
                .await
        })
        .await
        .unwrap();

        assert!(matches!(err, TraceError::ForeignRelease { .. }));
        assert!(!local.is_finished());
        assert!(exporter.is_empty());

        tracer.adopt_and_release(&local).unwrap();
        assert_eq!(exporter.len(), 1);
    }

    #[tokio::test]
    async fn test_in_local_span_records_error_and_releases() {
        let (tracer, exporter) = tracer();
        FlowScope::new()
            .run(async {
                let result: Result<(), String> = tracer
                    .in_local_span("failing-op", async { Err("boom".to_string()) })
                    .await;
                assert!(result.is_err());
                assert!(ambient::current().is_none());
            })
            .await;

        let finished = exporter.drain();
        assert_eq!(finished.len(), 1);
        assert!(finished[0].error);
        assert_eq!(finished[0].error_cause.as_deref(), Some("boom"));
    }
}
