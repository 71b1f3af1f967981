//! Fixed-capacity, lock-free `u64 -> u64` map.
//!
//! This is the workhorse behind the thread-identity, creation-edge and
//! pending-creation stores. It mirrors the semantics of a kernel hash map
//! pinned at a fixed `max_entries`: pre-sized at init, per-key atomic
//! updates, silent failure when full.
//!
//! # Design
//!
//! Open addressing with linear probing over power-of-two slots. Each slot
//! is a pair of atomics:
//!
//! ```text
//! ┌────────────────────┬─────────────────────┐
//! │ key: AtomicU64     │ value: AtomicU64    │
//! │  EMPTY             │  (unpublished)      │
//! │  TOMBSTONE         │  (stale)            │
//! │  CLAIMED           │  (being written)    │
//! │  <user key>        │  (live)             │
//! └────────────────────┴─────────────────────┘
//! ```
//!
//! A writer claims a free slot with a CAS to `CLAIMED`, stores the value,
//! then publishes the key last. Readers therefore never observe a key whose
//! value has not been written. Rewrites of a live key re-claim the slot the
//! same way, and readers re-validate the key after loading the value, so a
//! store or load can never target a slot a racing removal has recycled for
//! another key. A reader or second writer that lands on a
//! `CLAIMED` slot spins for a bounded number of iterations waiting for the
//! publish (the window is three plain stores, never a syscall), then gives
//! up and moves on — a transient miss, not an error.
//!
//! # Contract
//!
//! - No operation blocks, sleeps, allocates, or loops past the probe bound.
//! - Writes are best-effort: a full table returns [`MapError::CapacityExceeded`]
//!   and the caller is expected to drop the update silently.
//! - Per-key updates are individually linearizable; there is no cross-key
//!   ordering guarantee.

use fnv::FnvHasher;
use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Slot holds no key and never has.
const EMPTY: u64 = u64::MAX;
/// Slot held a key that was removed.
const TOMBSTONE: u64 = u64::MAX - 1;
/// Slot is claimed by a writer that has not published its key yet.
const CLAIMED: u64 = u64::MAX - 2;

/// Largest key a caller may use (the three sentinels are reserved).
pub const MAX_KEY: u64 = u64::MAX - 3;

/// Iterations spent waiting on an in-progress publish before giving up.
const PUBLISH_SPIN_BOUND: u32 = 1 << 12;

/// Internal outcome of a failed map write.
///
/// Never surfaced to instrumented code; callers degrade to a local no-op.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("map full, write dropped")]
    CapacityExceeded,
    #[error("key already present")]
    AlreadyPresent,
}

struct Slot {
    key: AtomicU64,
    value: AtomicU64,
}

/// Fixed-capacity lock-free map from `u64` keys to `u64` values.
pub struct FixedU64Map {
    slots: Box<[Slot]>,
    mask: usize,
}

impl FixedU64Map {
    /// Allocate a map holding at least `capacity` entries.
    ///
    /// The slot count is rounded up to a power of two; this is the only
    /// allocation the map ever performs.
    pub fn new(capacity: usize) -> Self {
        let n = capacity.max(1).next_power_of_two();
        let slots = (0..n)
            .map(|_| Slot {
                key: AtomicU64::new(EMPTY),
                value: AtomicU64::new(0),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        FixedU64Map { slots, mask: n - 1 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn home_slot(&self, key: u64) -> usize {
        let mut h = FnvHasher::default();
        h.write_u64(key);
        (h.finish() as usize) & self.mask
    }

    /// Wait briefly for a claimed slot to publish its key.
    ///
    /// Returns the published key, or `CLAIMED` if the bound ran out.
    fn await_publish(slot: &Slot) -> u64 {
        for _ in 0..PUBLISH_SPIN_BOUND {
            let k = slot.key.load(Ordering::Acquire);
            if k != CLAIMED {
                return k;
            }
            std::hint::spin_loop();
        }
        CLAIMED
    }

    /// Insert or overwrite (last-write-wins).
    pub fn insert(&self, key: u64, value: u64) -> Result<(), MapError> {
        self.insert_inner(key, value, true).map(|_| ())
    }

    /// Insert only if the key is absent (write-once).
    ///
    /// Returns [`MapError::AlreadyPresent`] without touching the existing
    /// value when the key is live.
    pub fn insert_if_absent(&self, key: u64, value: u64) -> Result<(), MapError> {
        self.insert_inner(key, value, false)
    }

    fn insert_inner(&self, key: u64, value: u64, overwrite: bool) -> Result<(), MapError> {
        debug_assert!(key <= MAX_KEY, "key collides with slot sentinel");
        let mut idx = self.home_slot(key);
        for _ in 0..self.slots.len() {
            let slot = &self.slots[idx];
            let mut k = slot.key.load(Ordering::Acquire);
            if k == CLAIMED {
                k = Self::await_publish(slot);
            }
            match k {
                _ if k == key => {
                    if !overwrite {
                        return Err(MapError::AlreadyPresent);
                    }
                    // Rewrite through the claim: a bare store could land in
                    // a slot a racing take has already recycled for another
                    // key.
                    match slot.key.compare_exchange(
                        key,
                        CLAIMED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            slot.value.store(value, Ordering::Release);
                            slot.key.store(key, Ordering::Release);
                            return Ok(());
                        }
                        // Slot changed under us: re-examine it.
                        Err(_) => continue,
                    }
                }
                EMPTY | TOMBSTONE => {
                    match slot.key.compare_exchange(
                        k,
                        CLAIMED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            slot.value.store(value, Ordering::Release);
                            slot.key.store(key, Ordering::Release);
                            return Ok(());
                        }
                        // Lost the claim race: re-examine this slot, it may
                        // now hold our own key.
                        Err(_) => continue,
                    }
                }
                // Still claimed after the spin bound, or another key:
                // keep probing.
                _ => idx = (idx + 1) & self.mask,
            }
        }
        Err(MapError::CapacityExceeded)
    }

    /// O(1)-expected lookup. Absence is a legitimate outcome, never an error.
    pub fn get(&self, key: u64) -> Option<u64> {
        let mut idx = self.home_slot(key);
        for _ in 0..self.slots.len() {
            let slot = &self.slots[idx];
            let mut k = slot.key.load(Ordering::Acquire);
            if k == CLAIMED {
                k = Self::await_publish(slot);
            }
            if k == key {
                let value = slot.value.load(Ordering::Acquire);
                // Re-validate: a racing take may have recycled the slot for
                // another key while the value was read.
                if slot.key.load(Ordering::Acquire) == key {
                    return Some(value);
                }
                continue;
            }
            if k == EMPTY {
                return None;
            }
            idx = (idx + 1) & self.mask;
        }
        None
    }

    /// Remove a key, returning its value.
    ///
    /// Consume-once: when several threads race to take the same key, exactly
    /// one wins the CAS to tombstone and observes the value; the rest see
    /// `None`.
    pub fn take(&self, key: u64) -> Option<u64> {
        let mut idx = self.home_slot(key);
        for _ in 0..self.slots.len() {
            let slot = &self.slots[idx];
            let mut k = slot.key.load(Ordering::Acquire);
            if k == CLAIMED {
                k = Self::await_publish(slot);
            }
            if k == key {
                let value = slot.value.load(Ordering::Acquire);
                match slot.key.compare_exchange(
                    key,
                    TOMBSTONE,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return Some(value),
                    // Someone else consumed it first: a stale token, treated
                    // as plain absence.
                    Err(TOMBSTONE) => return None,
                    // A rewrite holds the slot claimed: re-examine it.
                    Err(_) => continue,
                }
            }
            if k == EMPTY {
                return None;
            }
            idx = (idx + 1) & self.mask;
        }
        None
    }

    /// Remove every entry whose value equals `value` (best-effort sweep).
    ///
    /// Used to clear stale thread bindings that still point at a dead task;
    /// a binding that slips through self-heals on the next overwrite.
    pub fn retire_value(&self, value: u64) {
        for slot in self.slots.iter() {
            let k = slot.key.load(Ordering::Acquire);
            if k > MAX_KEY {
                continue;
            }
            if slot.value.load(Ordering::Acquire) == value {
                let _ = slot
                    .key
                    .compare_exchange(k, TOMBSTONE, Ordering::AcqRel, Ordering::Acquire);
            }
        }
    }

    /// Live entry count. Linear scan; diagnostics and teardown only.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.key.load(Ordering::Acquire) <= MAX_KEY)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Teardown only; not safe against concurrent writers.
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            slot.key.store(EMPTY, Ordering::Release);
            slot.value.store(0, Ordering::Release);
        }
    }
}
