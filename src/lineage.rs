//! Creation lineage: who created whom, and the bridge across creation.
//!
//! Two stores cooperate here:
//!
//! - **Creation edges** (child task -> parent task): written once at the
//!   child's first running transition, immutable until deleted at the
//!   child's death.
//! - **Pending creations** (creation-site token -> creator task): the
//!   short-lived bridge between "creation requested" and "child starts
//!   running". Intent recording is last-write-wins (the same site fires
//!   repeatedly); consumption is exactly-once, so a token left behind by a
//!   dead sequence can never attach an unrelated later task to a stale
//!   parent.
//!
//! Lineage completeness is best-effort by contract. Events arrive from
//! independent execution units with no ordering guarantee; a start-running
//! that beats its create-intent simply yields a parentless task, which the
//! collector treats as a provisional root.

use crate::atomic_map::FixedU64Map;
use crate::context::{CreationToken, SpanContext, TaskId};
use crate::context_map::SpanContextMap;

/// Creation edges plus the pending-creation bridge.
pub struct LineageStore {
    edges: FixedU64Map,
    pending: FixedU64Map,
    max_ancestor_hops: u32,
}

impl LineageStore {
    pub fn new(max_tasks: usize, max_pending: usize, max_ancestor_hops: u32) -> Self {
        LineageStore {
            edges: FixedU64Map::new(max_tasks),
            pending: FixedU64Map::new(max_pending),
            max_ancestor_hops,
        }
    }

    /// Record that `creator` requested a task creation at `token`'s site.
    ///
    /// Last-write-wins and idempotent; returns false only when the pending
    /// table is full (write silently dropped).
    pub fn record_intent(&self, token: CreationToken, creator: TaskId) -> bool {
        if token.is_none() {
            return false;
        }
        self.pending.insert(token.0, creator.0).is_ok()
    }

    /// Consume the pending entry for `token`, exactly once.
    ///
    /// A second consumer of the same token observes `None` — the stale-token
    /// outcome, indistinguishable from plain absence by design.
    pub fn consume_pending(&self, token: CreationToken) -> Option<TaskId> {
        if token.is_none() {
            return None;
        }
        self.pending.take(token.0).map(TaskId)
    }

    /// Write the child's creation edge. Write-once: a concurrent or repeated
    /// attempt never mutates an existing edge.
    pub fn record_edge(&self, child: TaskId, parent: TaskId) -> bool {
        self.edges.insert_if_absent(child.0, parent.0).is_ok()
    }

    pub fn parent_of(&self, child: TaskId) -> Option<TaskId> {
        self.edges.get(child.0).map(TaskId)
    }

    /// Delete the child's edge at its terminal transition.
    pub fn remove_edge(&self, child: TaskId) {
        let _ = self.edges.take(child.0);
    }

    /// Walk the lineage chain upward to the nearest ancestor holding a live
    /// span context.
    ///
    /// Iterative with an explicit hop counter, never recursive. The ceiling
    /// is a deliberate safety bound: a cyclic or corrupted chain reports
    /// "not found" instead of looping. Most tasks never cross an
    /// instrumented boundary themselves, so context reaches them lazily
    /// through this walk rather than being pushed to every descendant at
    /// creation time.
    pub fn nearest_ancestor_context(
        &self,
        task: TaskId,
        contexts: &SpanContextMap,
    ) -> Option<SpanContext> {
        let mut current = task;
        for _ in 0..self.max_ancestor_hops {
            let parent = self.parent_of(current)?;
            if let Some(ctx) = contexts.get(parent) {
                return Some(ctx);
            }
            current = parent;
        }
        None
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&self) {
        self.edges.clear();
        self.pending.clear();
    }
}
