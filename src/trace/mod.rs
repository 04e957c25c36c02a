//! Span model subsystem.
//!
//! # Data Flow
//! ```text
//! Tracer creates:
//!     → ids.rs (trace/span identity)
//!     → segment.rs (open SegmentContext, mutated by its owning flow)
//!     → carrier.rs (identity continued across a process boundary)
//!
//! Release:
//!     → segment.rs FinishedSegment snapshot
//!     → exporter
//! ```

pub mod carrier;
pub mod ids;
pub mod segment;

pub use carrier::{ContextCarrier, UpstreamReference};
pub use ids::{SpanId, TraceId};
pub use segment::{FinishedSegment, SegmentContext, SpanKind};
