//! Request pipeline adapter.
//!
//! # Responsibilities
//! - Open an entry context at request start and finish it at request end
//! - Store in-flight contexts keyed by request, since the end callback may
//!   run in a different logical flow than the start in some hosts
//! - Exclude configured verbs from tracing entirely, at both ends
//!
//! # Design Decisions
//! - Missing stored context at request end is a tolerated no-op
//! - Adapter failures are logged and never abort the host request

pub mod middleware;

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::PipelineTracingConfig;
use crate::error::TraceError;
use crate::trace::carrier::ContextCarrier;
use crate::trace::segment::SegmentContext;
use crate::tracer::Tracer;

/// Binds the tracer into a request pipeline.
pub struct RequestTracing {
    tracer: Arc<Tracer>,
    /// In-flight entry contexts keyed by request ID.
    inflight: DashMap<String, Arc<SegmentContext>>,
    excluded_methods: HashSet<String>,
    request_id_header: String,
}

impl RequestTracing {
    pub fn new(tracer: Arc<Tracer>, config: &PipelineTracingConfig) -> Self {
        Self {
            tracer,
            inflight: DashMap::new(),
            excluded_methods: config
                .excluded_methods
                .iter()
                .map(|m| m.to_ascii_uppercase())
                .collect(),
            request_id_header: config.request_id_header.clone(),
        }
    }

    pub fn tracer(&self) -> &Arc<Tracer> {
        &self.tracer
    }

    /// Header carrying the per-request correlation ID.
    pub fn request_id_header(&self) -> &str {
        &self.request_id_header
    }

    /// Whether a verb is excluded from tracing.
    pub fn is_excluded(&self, method: &str) -> bool {
        self.excluded_methods.contains(&method.to_ascii_uppercase())
    }

    /// Open and store the entry context for an inbound request.
    ///
    /// Excluded verbs produce no context and no side effects. The returned
    /// handle is also retrievable by request ID until the request ends.
    pub fn on_request_start(
        &self,
        request_id: &str,
        method: &str,
        path: &str,
        url: &str,
        carrier: Option<&ContextCarrier>,
    ) -> Option<Arc<SegmentContext>> {
        if self.is_excluded(method) {
            return None;
        }

        let context = self.tracer.create_entry_context(path, carrier);
        let _ = context.add_tag("http.method", method);
        let _ = context.add_tag("path", path);
        let _ = context.add_tag("url", url);
        let _ = context.add_log("request.start", format!("Request starting {} {}", method, url));

        self.inflight.insert(request_id.to_string(), context.clone());
        Some(context)
    }

    /// Finish the stored entry context for a request.
    ///
    /// Tolerates a missing key (excluded verb, or a host that never called
    /// start) by returning without effect. When the end callback runs
    /// outside the flow that started the request, teardown goes through the
    /// explicit adopt-and-release transfer.
    pub fn on_request_end(&self, request_id: &str, status: u16, error: Option<&str>) {
        let Some((_, context)) = self.inflight.remove(request_id) else {
            tracing::debug!(request_id = %request_id, "No stored context for request");
            return;
        };

        if status >= 400 {
            let _ = context.error_occurred();
        }
        if let Some(cause) = error {
            let _ = context.error_occurred_with_cause(cause);
        }
        let _ = context.add_tag("http.status_code", status.to_string());
        let _ = context.add_log("request.end", format!("Request finished {}", status));

        match self.tracer.release(&context) {
            Ok(()) => {}
            Err(TraceError::ForeignRelease { .. }) => {
                tracing::debug!(
                    request_id = %request_id,
                    "Request ended outside its starting flow, adopting context"
                );
                if let Err(e) = self.tracer.adopt_and_release(&context) {
                    tracing::warn!(request_id = %request_id, error = %e, "Failed to finish entry context");
                }
            }
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "Failed to release entry context");
            }
        }
    }
}
