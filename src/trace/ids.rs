//! Trace and span identifiers.
//!
//! # Responsibilities
//! - Globally unique trace IDs shared by every span of one logical flow
//! - Span IDs unique within a trace, monotonic across siblings
//! - String round-trips for the wire carrier

use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trace ID correlating every span of one logical flow.
///
/// Minted once at the entry span, or inherited from an incoming carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(Uuid);

impl TraceId {
    /// Mint a fresh trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TraceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Span ID unique within one trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpanId(pub u32);

impl std::fmt::Display for SpanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SpanId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>().map(Self)
    }
}

/// Allocates span IDs for one trace.
///
/// The allocator is created with the entry span and handed down the parent
/// chain, so sibling spans draw from the same counter. The entry span takes
/// ID 0.
#[derive(Debug, Clone)]
pub struct SpanIdAllocator {
    next: Arc<AtomicU32>,
}

impl SpanIdAllocator {
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Allocate the next span ID in this trace.
    pub fn allocate(&self) -> SpanId {
        SpanId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SpanIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
