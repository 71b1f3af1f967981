//! Fixed-capacity span-context store: task id -> active {trace id, span id}.
//!
//! The value is three words, too wide for a single atomic, so slots publish
//! their key *last*: a writer claims a free slot, stores all three value
//! words, then stores the key. A context visible through its key is always
//! fully written. A removed slot can still be reclaimed for another task
//! while a reader is mid-read, though, so each slot also carries an
//! even/odd sequence counter bumped around every value write; readers
//! re-validate the counter and the key after reading and retry on churn.
//! That keeps torn and foreign reads impossible without a per-slot lock.
//!
//! # Insert-or-fetch
//!
//! [`SpanContextMap::put_if_absent`] is the concurrency-critical operation:
//! when several call sites race to bind the first context on one task,
//! exactly one synthesized root may win, and every racer must observe that
//! same winner. The claim CAS decides the winner; losers re-examine the
//! contested slot (spinning briefly across the publish window) and fetch
//! the winning value instead of probing past it.

use crate::context::{SpanContext, TaskId};
use fnv::FnvHasher;
use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};

const EMPTY: u64 = u64::MAX;
const TOMBSTONE: u64 = u64::MAX - 1;
const CLAIMED: u64 = u64::MAX - 2;

const PUBLISH_SPIN_BOUND: u32 = 1 << 12;

/// Result of [`SpanContextMap::put_if_absent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Our context won the slot; this call created the canonical entry.
    Inserted(SpanContext),
    /// Another context was already live for the task; use that one.
    Existing(SpanContext),
    /// Table full; nothing stored. Caller proceeds without a live context.
    CapacityExceeded,
}

struct ContextSlot {
    key: AtomicU64,
    /// Even = stable, odd = context write in progress.
    seq: AtomicU64,
    trace_hi: AtomicU64,
    trace_lo: AtomicU64,
    span: AtomicU64,
}

impl ContextSlot {
    fn read_context(&self) -> SpanContext {
        let hi = self.trace_hi.load(Ordering::Acquire) as u128;
        let lo = self.trace_lo.load(Ordering::Acquire) as u128;
        SpanContext {
            trace_id: (hi << 64) | lo,
            span_id: self.span.load(Ordering::Acquire),
        }
    }

    fn write_context(&self, ctx: SpanContext) {
        self.trace_hi
            .store((ctx.trace_id >> 64) as u64, Ordering::Release);
        self.trace_lo.store(ctx.trace_id as u64, Ordering::Release);
        self.span.store(ctx.span_id, Ordering::Release);
    }

    /// Read the context only if the slot stays keyed to `key` with no write
    /// overlapping the read. `None` means the slot churned underneath the
    /// reader, who re-examines it.
    fn read_validated(&self, key: u64) -> Option<SpanContext> {
        let seq = self.seq.load(Ordering::Acquire);
        if seq & 1 == 1 {
            return None;
        }
        let ctx = self.read_context();
        if self.seq.load(Ordering::Acquire) == seq && self.key.load(Ordering::Acquire) == key {
            Some(ctx)
        } else {
            None
        }
    }
}

/// Fixed-capacity map from task id to its single live span context.
pub struct SpanContextMap {
    slots: Box<[ContextSlot]>,
    mask: usize,
}

impl SpanContextMap {
    pub fn new(capacity: usize) -> Self {
        let n = capacity.max(1).next_power_of_two();
        let slots = (0..n)
            .map(|_| ContextSlot {
                key: AtomicU64::new(EMPTY),
                seq: AtomicU64::new(0),
                trace_hi: AtomicU64::new(0),
                trace_lo: AtomicU64::new(0),
                span: AtomicU64::new(0),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        SpanContextMap { slots, mask: n - 1 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn home_slot(&self, task: TaskId) -> usize {
        let mut h = FnvHasher::default();
        h.write_u64(task.0);
        (h.finish() as usize) & self.mask
    }

    fn await_publish(slot: &ContextSlot) -> u64 {
        for _ in 0..PUBLISH_SPIN_BOUND {
            let k = slot.key.load(Ordering::Acquire);
            if k != CLAIMED {
                return k;
            }
            std::hint::spin_loop();
        }
        CLAIMED
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.get(task).is_some()
    }

    pub fn get(&self, task: TaskId) -> Option<SpanContext> {
        let mut idx = self.home_slot(task);
        for _ in 0..self.slots.len() {
            let slot = &self.slots[idx];
            let mut k = slot.key.load(Ordering::Acquire);
            if k == CLAIMED {
                k = Self::await_publish(slot);
            }
            if k == task.0 {
                if let Some(ctx) = slot.read_validated(task.0) {
                    return Some(ctx);
                }
                // Slot churned mid-read: re-examine it.
                continue;
            }
            if k == EMPTY {
                return None;
            }
            idx = (idx + 1) & self.mask;
        }
        None
    }

    /// Atomic insert-or-fetch: first writer wins, everyone sees the winner.
    pub fn put_if_absent(&self, task: TaskId, ctx: SpanContext) -> PutOutcome {
        let mut idx = self.home_slot(task);
        for _ in 0..self.slots.len() {
            let slot = &self.slots[idx];
            let mut k = slot.key.load(Ordering::Acquire);
            if k == CLAIMED {
                k = Self::await_publish(slot);
                if k == CLAIMED {
                    // Publish window overran the spin bound; treat the slot
                    // as foreign and keep probing.
                    idx = (idx + 1) & self.mask;
                    continue;
                }
            }
            if k == task.0 {
                if let Some(existing) = slot.read_validated(task.0) {
                    return PutOutcome::Existing(existing);
                }
                // Slot churned mid-read: re-examine it.
                continue;
            }
            if k == EMPTY || k == TOMBSTONE {
                match slot
                    .key
                    .compare_exchange(k, CLAIMED, Ordering::AcqRel, Ordering::Acquire)
                {
                    Ok(_) => {
                        slot.seq.fetch_add(1, Ordering::AcqRel);
                        slot.write_context(ctx);
                        slot.seq.fetch_add(1, Ordering::AcqRel);
                        slot.key.store(task.0, Ordering::Release);
                        return PutOutcome::Inserted(ctx);
                    }
                    // Lost the claim: the winner may be binding this very
                    // task. Re-examine the same slot.
                    Err(_) => continue,
                }
            }
            idx = (idx + 1) & self.mask;
        }
        PutOutcome::CapacityExceeded
    }

    /// Delete the task's context. Best-effort; absence is fine.
    pub fn remove(&self, task: TaskId) {
        let mut idx = self.home_slot(task);
        for _ in 0..self.slots.len() {
            let slot = &self.slots[idx];
            let mut k = slot.key.load(Ordering::Acquire);
            if k == CLAIMED {
                k = Self::await_publish(slot);
            }
            if k == task.0 {
                let _ = slot.key.compare_exchange(
                    task.0,
                    TOMBSTONE,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                return;
            }
            if k == EMPTY {
                return;
            }
            idx = (idx + 1) & self.mask;
        }
    }

    /// Live entry count. Diagnostics and teardown only.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.key.load(Ordering::Acquire) < CLAIMED)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Teardown only; not safe against concurrent writers.
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            slot.key.store(EMPTY, Ordering::Release);
        }
    }
}
