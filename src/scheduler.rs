//! Scheduler transition handling: the state machine that builds lineage.
//!
//! The observed runtime reports every task status change; three of those
//! transitions matter here:
//!
//! - **create-intent** — a running task asked the scheduler for a new task,
//!   observed as the child's idle→runnable transition carrying the
//!   creation-site token. The token is remembered against the creator
//!   (last-write-wins; the same site fires for every creation it performs).
//!   A yield back to runnable is rescheduling, not creation, and carries no
//!   intent even when a stale token rides along.
//! - **start-running** — a task is put on an OS thread. Its first such
//!   transition consumes the pending entry for its creation token and, on a
//!   hit, writes the immutable creation edge. The thread binding is
//!   rewritten unconditionally every time.
//! - **terminate** — the task's edge, context and stale bindings are torn
//!   down, best-effort.
//!
//! Transitions arrive concurrently from independent execution units with no
//! ordering guarantee. A start-running that outruns its create-intent just
//! produces a parentless task; lineage completeness is best-effort and
//! never required for correctness.

use crate::context::{CreationToken, TaskId, ThreadId};
use crate::context_map::SpanContextMap;
use crate::emitter::{RecordChannel, RecordKind, WireRecord};
use crate::lineage::LineageStore;
use crate::thread_map::ThreadBindings;
use serde::{Deserialize, Serialize};

/// Task run-state codes as reported by the observed runtime.
///
/// These are the runtime's own small stable integers; the engine passes
/// them through rather than inventing its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum TaskStatus {
    Idle = 0,
    Runnable = 1,
    Running = 2,
    InSyscall = 3,
    Waiting = 4,
    Dead = 6,
}

impl TaskStatus {
    pub fn from_code(code: u32) -> Option<TaskStatus> {
        match code {
            0 => Some(TaskStatus::Idle),
            1 => Some(TaskStatus::Runnable),
            2 => Some(TaskStatus::Running),
            3 => Some(TaskStatus::InSyscall),
            4 => Some(TaskStatus::Waiting),
            6 => Some(TaskStatus::Dead),
            _ => None,
        }
    }
}

/// One scheduler status-change event, as delivered by the probe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// Task whose status changed.
    pub task: TaskId,
    /// Status code before the change.
    pub previous_status: u32,
    /// Status code after the change.
    pub new_status: u32,
    /// Creation-site token, zero when the transition has none.
    #[serde(default)]
    pub creation_token: CreationToken,
    /// OS thread the transition was observed on.
    pub os_thread: ThreadId,
}

/// Apply one transition to the stores and emit the matching records.
///
/// Never fails: every degraded case (unknown status, unattributable
/// creator, full map) collapses to a local no-op.
pub(crate) fn apply_transition(
    ev: &TransitionEvent,
    threads: &ThreadBindings,
    lineage: &LineageStore,
    contexts: &SpanContextMap,
    channel: &RecordChannel,
    now_ns: u64,
) {
    match TaskStatus::from_code(ev.new_status) {
        Some(TaskStatus::Runnable)
            if ev.previous_status == TaskStatus::Idle as u32 && !ev.creation_token.is_none() =>
        {
            // Create-intent: attribute the new task to whoever is running
            // on this thread right now. An unbound thread cannot be
            // attributed; the child will surface as a lineage root.
            if let Some(creator) = threads.current_task(ev.os_thread) {
                if lineage.record_intent(ev.creation_token, creator) {
                    channel.publish(WireRecord::lineage(
                        RecordKind::PendingLineage,
                        ev.creation_token.0,
                        creator.0,
                        now_ns,
                    ));
                }
            }
        }
        Some(TaskStatus::Running) => {
            // Consume-once guards against a recycled token attaching an
            // unrelated later task to a stale parent.
            if let Some(parent) = lineage.consume_pending(ev.creation_token) {
                if lineage.record_edge(ev.task, parent) {
                    channel.publish(WireRecord::lineage(
                        RecordKind::CreationEdge,
                        ev.task.0,
                        parent.0,
                        now_ns,
                    ));
                }
            }
            // Rebind unconditionally: many tasks share few threads, and the
            // binding must always name the latest occupant.
            if threads.bind(ev.os_thread, ev.task) {
                channel.publish(WireRecord::lineage(
                    RecordKind::ThreadBinding,
                    ev.os_thread.0,
                    ev.task.0,
                    now_ns,
                ));
            }
        }
        Some(TaskStatus::Dead) => {
            lineage.remove_edge(ev.task);
            contexts.remove(ev.task);
            threads.unbind_task(ev.task);
        }
        // Idle / syscall / waiting transitions and unknown codes carry no
        // lineage information.
        _ => {}
    }
}
