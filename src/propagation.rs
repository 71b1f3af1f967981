//! Context propagation: the begin/end span operations adapters call.
//!
//! `begin_span` decides what trace a call belongs to, in priority order:
//! the calling task's own live context, the nearest ancestor's context
//! through the lineage walk, or — when neither exists — a freshly
//! synthesized root bound to the task with insert-or-fetch semantics so
//! concurrent call sites on one task can never mint two roots.
//!
//! Context flows lazily: deriving from an ancestor does *not* store a
//! context on the descendant. Only a synthesized root is stored, and
//! `end_span` of that root deletes it again, so a later unrelated operation
//! on the same task starts a fresh trace.

use crate::context::{SpanContext, TaskId, ThreadId};
use crate::context_map::{PutOutcome, SpanContextMap};
use crate::emitter::{RecordChannel, RecordKind, WireRecord};
use crate::extract::FieldSet;
use crate::lineage::LineageStore;
use crate::span_table::{SpanInstance, SpanInstanceTable};
use crate::thread_map::ThreadBindings;
use serde::Serialize;

/// Completed span, produced by `end_span` and mirrored to the collector.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SpanRecord {
    /// Instance key of the call this span covers.
    pub instance_key: u64,
    /// Task the span ran on, if the thread was bound at entry.
    pub task: Option<TaskId>,
    pub context: SpanContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_context: Option<SpanContext>,
    pub start_time_ns: u64,
    pub end_time_ns: u64,
    pub fields: FieldSet,
    /// True when this call created (and has now closed) its trace root.
    pub is_root: bool,
}

impl SpanRecord {
    pub fn duration_ns(&self) -> u64 {
        self.end_time_ns.saturating_sub(self.start_time_ns)
    }
}

/// Start a span for the call identified by `key` on `thread`.
///
/// Infallible by contract: every internal failure (unresolvable task, full
/// context table, lost span-table slot) degrades to a span that is simply
/// less connected, never an error to the instrumented code.
#[allow(clippy::too_many_arguments)]
pub(crate) fn begin_span(
    thread: ThreadId,
    key: u64,
    fields: FieldSet,
    threads: &ThreadBindings,
    lineage: &LineageStore,
    contexts: &SpanContextMap,
    spans: &SpanInstanceTable,
    channel: &RecordChannel,
    now_ns: u64,
) -> SpanContext {
    let owner = threads.current_task(thread);

    let (context, parent_context, is_root) = match owner {
        Some(task) => {
            if let Some(own) = contexts.get(task) {
                // Concurrent call site on a task already inside a trace.
                (own.child_of(), Some(own), false)
            } else if let Some(ancestor) = lineage.nearest_ancestor_context(task, contexts) {
                (ancestor.child_of(), Some(ancestor), false)
            } else {
                let fresh = SpanContext::new_root();
                match contexts.put_if_absent(task, fresh) {
                    PutOutcome::Inserted(winner) => {
                        channel.publish(WireRecord::context(
                            RecordKind::ContextBound,
                            task.0,
                            0,
                            winner,
                            now_ns,
                        ));
                        (winner, None, true)
                    }
                    // Raced against another call site: adopt its root.
                    PutOutcome::Existing(winner) => (winner.child_of(), Some(winner), false),
                    // Table full: the span still gets ids, the task just
                    // carries no live context for descendants to find.
                    PutOutcome::CapacityExceeded => (fresh, None, true),
                }
            }
        }
        // Unbound thread (e.g. binding record lost): isolated root span,
        // nothing stored against any task.
        None => (SpanContext::new_root(), None, true),
    };

    spans.begin(SpanInstance {
        key,
        owner,
        context,
        parent_context,
        start_time_ns: now_ns,
        fields,
        is_root,
    });

    context
}

/// Finish the span under `key` and emit its completed record.
///
/// A missing instance (return probe without an entry, or slot recycled
/// under load) is a silent no-op.
pub(crate) fn end_span(
    key: u64,
    contexts: &SpanContextMap,
    spans: &SpanInstanceTable,
    channel: &RecordChannel,
    now_ns: u64,
) -> Option<SpanRecord> {
    let instance = spans.take(key)?;

    if instance.is_root {
        // Close the lineage root: later unrelated work starts fresh.
        if let Some(task) = instance.owner {
            contexts.remove(task);
        }
    }

    let record = SpanRecord {
        instance_key: instance.key,
        task: instance.owner,
        context: instance.context,
        parent_context: instance.parent_context,
        start_time_ns: instance.start_time_ns,
        end_time_ns: now_ns,
        fields: instance.fields,
        is_root: instance.is_root,
    };

    channel.publish(WireRecord::context(
        RecordKind::SpanCompleted,
        record.instance_key,
        record.task.map_or(0, |t| t.0),
        record.context,
        now_ns,
    ));

    Some(record)
}
