//! In-flight span instances, from entry probe to return probe.
//!
//! The table is direct-mapped: an instance key hashes to exactly one slot,
//! and a colliding key recycles whatever was there. That makes leaks
//! self-healing by construction — an entry probe whose return never fires
//! squats in its slot only until the next key that maps there evicts it,
//! so orphaned instances are bounded by the slot count, never growing.
//!
//! Slots are guarded by a per-slot sequence counter. A writer claims the
//! slot with a CAS from an even sequence to odd, copies the payload, and
//! releases back to even. A claim that fails (another probe mid-write on
//! the same slot) drops the operation — the usual best-effort contract.
//! The payload is a plain `Copy` struct behind an `UnsafeCell`; the odd/
//! even protocol is what keeps readers and writers exclusive.

use crate::context::{SpanContext, TaskId};
use crate::extract::FieldSet;
use fnv::FnvHasher;
use std::cell::UnsafeCell;
use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};

/// Payload of one in-flight call.
#[derive(Debug, Clone, Copy)]
pub struct SpanInstance {
    /// Instance key the entry probe supplied (0 = slot empty).
    pub key: u64,
    /// Task that was running when the entry probe fired, if resolvable.
    pub owner: Option<TaskId>,
    /// Context assigned to this span.
    pub context: SpanContext,
    /// Context this span descends from, if any.
    pub parent_context: Option<SpanContext>,
    /// Monotonic entry timestamp.
    pub start_time_ns: u64,
    /// Fields the adapter extracted at entry.
    pub fields: FieldSet,
    /// True when this call created its trace's root context.
    pub is_root: bool,
}

impl SpanInstance {
    const fn vacant() -> Self {
        SpanInstance {
            key: 0,
            owner: None,
            context: SpanContext {
                trace_id: 0,
                span_id: 0,
            },
            parent_context: None,
            start_time_ns: 0,
            fields: FieldSet::empty(),
            is_root: false,
        }
    }
}

struct Slot {
    /// Even = stable, odd = write in progress.
    seq: AtomicU64,
    data: UnsafeCell<SpanInstance>,
}

/// Fixed-capacity direct-mapped table of in-flight spans.
pub struct SpanInstanceTable {
    slots: Box<[Slot]>,
    mask: usize,
    evicted: AtomicU64,
}

// The odd/even sequence protocol serializes all access to each slot's
// UnsafeCell payload.
unsafe impl Sync for SpanInstanceTable {}
unsafe impl Send for SpanInstanceTable {}

impl SpanInstanceTable {
    pub fn new(capacity: usize) -> Self {
        let n = capacity.max(1).next_power_of_two();
        let slots = (0..n)
            .map(|_| Slot {
                seq: AtomicU64::new(0),
                data: UnsafeCell::new(SpanInstance::vacant()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        SpanInstanceTable {
            slots,
            mask: n - 1,
            evicted: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot_of(&self, key: u64) -> &Slot {
        let mut h = FnvHasher::default();
        h.write_u64(key);
        &self.slots[(h.finish() as usize) & self.mask]
    }

    /// Store an instance, recycling the slot if a previous key squats there.
    ///
    /// Returns false when the write lost the slot claim to a concurrent
    /// probe (dropped, best-effort) or when `key` is zero.
    pub fn begin(&self, instance: SpanInstance) -> bool {
        if instance.key == 0 {
            return false;
        }
        let slot = self.slot_of(instance.key);
        let seq = slot.seq.load(Ordering::Acquire);
        if seq & 1 == 1 {
            return false;
        }
        if slot
            .seq
            .compare_exchange(seq, seq + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        // Claim held: exclusive access to the payload.
        unsafe {
            let data = slot.data.get();
            if (*data).key != 0 && (*data).key != instance.key {
                // Evicting an orphan whose return probe never fired.
                self.evicted.fetch_add(1, Ordering::Relaxed);
            }
            *data = instance;
        }
        slot.seq.store(seq + 2, Ordering::Release);
        true
    }

    /// Remove and return the instance stored under `key`.
    ///
    /// Exact-key match only: a recycled or never-written slot yields `None`,
    /// and the caller treats that as a silent no-op (e.g. a return probe
    /// firing with no surviving entry).
    pub fn take(&self, key: u64) -> Option<SpanInstance> {
        if key == 0 {
            return None;
        }
        let slot = self.slot_of(key);
        let seq = slot.seq.load(Ordering::Acquire);
        if seq & 1 == 1 {
            return None;
        }
        if slot
            .seq
            .compare_exchange(seq, seq + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let taken = unsafe {
            let data = slot.data.get();
            if (*data).key == key {
                let instance = *data;
                *data = SpanInstance::vacant();
                Some(instance)
            } else {
                None
            }
        };
        slot.seq.store(seq + 2, Ordering::Release);
        taken
    }

    /// Orphans evicted by slot recycling so far.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Occupied slots. Diagnostics and teardown only.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| {
                // Teardown-grade read; racing writers tolerated.
                s.seq.load(Ordering::Acquire) & 1 == 0 && unsafe { (*s.data.get()).key != 0 }
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Teardown only; not safe against concurrent writers.
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            unsafe {
                *slot.data.get() = SpanInstance::vacant();
            }
        }
    }
}
