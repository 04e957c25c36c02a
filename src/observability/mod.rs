//! Observability for the tracing core itself.
//!
//! # Data Flow
//! ```text
//! core subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Tracing faults are reported here, on a side channel; they never abort
//!   the host request
//! - Metric updates are cheap (atomic increments behind the metrics facade)

pub mod logging;
pub mod metrics;
