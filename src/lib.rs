//! Ambient-context propagation core for request tracing.
//!
//! # Architecture Overview
//!
//! ```text
//!     Inbound request          ┌──────────────────────────────────────────┐
//!     ─────────────────────────┼─▶ pipeline (adapter + axum middleware)   │
//!                              │        │ entry context per request       │
//!                              │        ▼                                  │
//!     Instrumented code ───────┼─▶ tracer (create entry/local/exit,       │
//!                              │        │  release, adopt_and_release)     │
//!                              │        ▼                                  │
//!                              │    ambient (flow-scoped current slot,    │
//!                              │        enter/exit tokens, snapshots)      │
//!                              │        │                                  │
//!                              │        ▼                                  │
//!     Finished segments ◀──────┼── export (channel / log / in-memory)     │
//!                              │                                           │
//!                              │  Cross-cutting: config, observability    │
//!                              └──────────────────────────────────────────┘
//! ```
//!
//! The ambient slot is flow-scoped, not thread-scoped: it is carried by the
//! logical flow itself through suspension and resumption, so a span created
//! before an `.await` is still current when execution resumes on another
//! worker thread, and unrelated concurrent flows never observe each other's
//! slot.

// Core subsystems
pub mod ambient;
pub mod trace;
pub mod tracer;

// Pipeline integration
pub mod pipeline;

// Collaborator boundaries
pub mod export;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod observability;

pub use ambient::{AmbientSnapshot, FlowScope};
pub use config::AgentConfig;
pub use error::{TraceError, TraceResult};
pub use export::SegmentExporter;
pub use pipeline::RequestTracing;
pub use trace::{ContextCarrier, FinishedSegment, SegmentContext, SpanId, SpanKind, TraceId};
pub use tracer::Tracer;
