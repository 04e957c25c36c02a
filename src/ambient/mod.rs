//! Flow-scoped ambient context slot.
//!
//! # Responsibilities
//! - Hold, per logical flow, the currently active segment context
//! - Save and restore that slot across asynchronous suspension points
//! - Keep unrelated flows' slots invisible to each other
//!
//! # Design Decisions
//! - The slot lives in a `tokio::task_local!`, making it part of the
//!   flow's own state: it travels with the future through suspension and
//!   resumption on any worker thread, with no manual re-establishment. A
//!   plain thread-local would lose the slot on worker migration and bleed
//!   state between flows sharing a thread.
//! - Detached work (`tokio::spawn`) starts with no slot; inheriting the
//!   creator's context requires an explicit [`snapshot`] handed to
//!   [`FlowScope::continued`]. The live slot is never shared.
//! - Slot reads and writes are O(1) and touch no cross-flow state.

use std::cell::RefCell;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::trace::segment::SegmentContext;

static NEXT_FLOW_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one logical flow.
///
/// A flow is one causally continuous unit of execution; it may suspend and
/// resume on different worker threads, as distinct from an OS thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowId(u64);

impl FlowId {
    fn next() -> Self {
        Self(NEXT_FLOW_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct FlowCell {
    id: FlowId,
    slot: RefCell<Option<Arc<SegmentContext>>>,
}

tokio::task_local! {
    static FLOW: FlowCell;
}

/// Opaque restoration token returned by [`enter`].
///
/// Captures the slot value that was ambient immediately before the enter,
/// together with the flow that performed it. [`exit`] restores exactly that
/// value, regardless of what intervening misuse left in the slot.
#[derive(Debug, Clone)]
pub struct EnterToken {
    pub(crate) flow: Option<FlowId>,
    pub(crate) prior: Option<Arc<SegmentContext>>,
}

/// The flow executing the caller, if a flow scope is active.
pub fn current_flow() -> Option<FlowId> {
    FLOW.try_with(|flow| flow.id).ok()
}

/// The calling flow's current segment context. Never blocks, never fails.
///
/// Returns `None` outside any flow scope. Reading also heals the slot: an
/// occupant finished through a cross-flow adopt-and-release is replaced by
/// the prior value captured at its enter, so a released context is never
/// reported as current.
pub fn current() -> Option<Arc<SegmentContext>> {
    FLOW.try_with(|flow| {
        let mut slot = flow.slot.borrow_mut();
        while let Some(occupant) = slot.as_ref() {
            if !occupant.is_finished() {
                break;
            }
            let prior = occupant.ambient_token().and_then(|token| token.prior);
            *slot = prior;
        }
        slot.clone()
    })
    .unwrap_or(None)
}

/// Record the prior slot value, then make `context` current.
///
/// Outside a flow scope nothing is written and the token records that.
pub fn enter(context: &Arc<SegmentContext>) -> EnterToken {
    FLOW.try_with(|flow| {
        let prior = flow.slot.replace(Some(context.clone()));
        EnterToken {
            flow: Some(flow.id),
            prior,
        }
    })
    .unwrap_or(EnterToken {
        flow: None,
        prior: None,
    })
}

/// Restore the slot to the value captured by `token`.
///
/// Only the flow that performed the matching [`enter`] may restore; a
/// foreign flow gets `false` back and no slot is touched.
#[must_use]
pub fn exit(token: &EnterToken) -> bool {
    let Some(owner) = token.flow else {
        // Nothing was written at enter; nothing to restore.
        return true;
    };
    FLOW.try_with(|flow| {
        if flow.id != owner {
            return false;
        }
        *flow.slot.borrow_mut() = token.prior.clone();
        true
    })
    .unwrap_or(false)
}

/// Point-in-time copy of the calling flow's ambient context.
///
/// Hand this to detached work via [`FlowScope::continued`] to give it an
/// explicit, independent starting point.
#[derive(Debug, Clone)]
pub struct AmbientSnapshot(Option<Arc<SegmentContext>>);

/// Capture the calling flow's current context for detached work.
pub fn snapshot() -> AmbientSnapshot {
    AmbientSnapshot(current())
}

/// Establishes a logical flow around a unit of execution.
///
/// Every `run` gets a fresh [`FlowId`] and its own slot; nested scopes
/// shadow the outer flow for the duration of the inner future.
pub struct FlowScope {
    initial: Option<Arc<SegmentContext>>,
}

impl FlowScope {
    /// A flow starting with an empty ambient slot.
    pub fn new() -> Self {
        Self { initial: None }
    }

    /// A flow starting from an explicitly inherited snapshot.
    pub fn continued(snapshot: AmbientSnapshot) -> Self {
        Self {
            initial: snapshot.0,
        }
    }

    /// Run a future inside this flow.
    pub async fn run<F: Future>(self, fut: F) -> F::Output {
        FLOW.scope(
            FlowCell {
                id: FlowId::next(),
                slot: RefCell::new(self.initial),
            },
            fut,
        )
        .await
    }

    /// Run synchronous code inside this flow.
    pub fn run_sync<T>(self, f: impl FnOnce() -> T) -> T {
        FLOW.sync_scope(
            FlowCell {
                id: FlowId::next(),
                slot: RefCell::new(self.initial),
            },
            f,
        )
    }
}

impl Default for FlowScope {
    fn default() -> Self {
        Self::new()
    }
}
