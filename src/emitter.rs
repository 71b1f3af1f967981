//! Non-blocking record emission toward the external collector.
//!
//! The engine never talks to the collector directly; it publishes
//! fixed-layout records into a lock-free bounded channel and the collector
//! process drains the other end. Probe-path latency always beats
//! completeness: a full channel drops the record on the floor, bumps a
//! counter, and moves on. There is no cross-record ordering guarantee —
//! the collector reconstructs lineage tolerating missing and out-of-order
//! records (a child seen without its edge becomes a provisional root,
//! re-parented if the edge shows up later).
//!
//! # Wire layout
//!
//! Every record encodes to the same 49 little-endian bytes:
//!
//! ```text
//! ┌─────────┬───────────┬──────────────┬────────────┬──────────────┬──────┐
//! │ key: u64│ value: u64│ trace: 16 B  │ span: 8 B  │ ts_ns: u64   │ kind │
//! └─────────┴───────────┴──────────────┴────────────┴──────────────┴──────┘
//!   8         8           16             8            8              1
//! ```

use crate::context::SpanContext;
use crossbeam::queue::ArrayQueue;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// What a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RecordKind {
    /// key = creation token, value = creator task.
    PendingLineage = 1,
    /// key = child task, value = parent task.
    CreationEdge = 2,
    /// key = OS thread, value = running task.
    ThreadBinding = 3,
    /// key = task; ids carry the newly bound root context.
    ContextBound = 4,
    /// key = instance key, value = owning task; ids carry the span context.
    SpanCompleted = 5,
}

impl RecordKind {
    pub fn from_code(code: u8) -> Option<RecordKind> {
        match code {
            1 => Some(RecordKind::PendingLineage),
            2 => Some(RecordKind::CreationEdge),
            3 => Some(RecordKind::ThreadBinding),
            4 => Some(RecordKind::ContextBound),
            5 => Some(RecordKind::SpanCompleted),
            _ => None,
        }
    }
}

/// One fixed-layout record bound for the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WireRecord {
    pub key: u64,
    pub value: u64,
    pub trace_id: u128,
    pub span_id: u64,
    pub timestamp_ns: u64,
    pub kind: RecordKind,
}

impl WireRecord {
    pub const ENCODED_LEN: usize = 49;

    /// Lineage record with no span ids (pending / edge / binding kinds).
    pub fn lineage(kind: RecordKind, key: u64, value: u64, timestamp_ns: u64) -> Self {
        WireRecord {
            key,
            value,
            trace_id: 0,
            span_id: 0,
            timestamp_ns,
            kind,
        }
    }

    /// Record carrying a span context (context-bound / span-completed kinds).
    pub fn context(
        kind: RecordKind,
        key: u64,
        value: u64,
        ctx: SpanContext,
        timestamp_ns: u64,
    ) -> Self {
        WireRecord {
            key,
            value,
            trace_id: ctx.trace_id,
            span_id: ctx.span_id,
            timestamp_ns,
            kind,
        }
    }

    /// Fixed 49-byte little-endian encoding.
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[0..8].copy_from_slice(&self.key.to_le_bytes());
        buf[8..16].copy_from_slice(&self.value.to_le_bytes());
        buf[16..32].copy_from_slice(&self.trace_id.to_le_bytes());
        buf[32..40].copy_from_slice(&self.span_id.to_le_bytes());
        buf[40..48].copy_from_slice(&self.timestamp_ns.to_le_bytes());
        buf[48] = self.kind as u8;
        buf
    }

    /// Decode a collector-side buffer; `None` on short input or unknown kind.
    pub fn decode(buf: &[u8]) -> Option<WireRecord> {
        if buf.len() < Self::ENCODED_LEN {
            return None;
        }
        Some(WireRecord {
            key: u64::from_le_bytes(buf[0..8].try_into().ok()?),
            value: u64::from_le_bytes(buf[8..16].try_into().ok()?),
            trace_id: u128::from_le_bytes(buf[16..32].try_into().ok()?),
            span_id: u64::from_le_bytes(buf[32..40].try_into().ok()?),
            timestamp_ns: u64::from_le_bytes(buf[40..48].try_into().ok()?),
            kind: RecordKind::from_code(buf[48])?,
        })
    }
}

/// Bounded lock-free channel from probes to the collector.
pub struct RecordChannel {
    queue: ArrayQueue<WireRecord>,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl RecordChannel {
    pub fn new(capacity: usize) -> Self {
        RecordChannel {
            queue: ArrayQueue::new(capacity.max(1)),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Publish one record. Never blocks, never retries: a full queue drops
    /// the record and only the drop counter remembers it.
    pub fn publish(&self, record: WireRecord) {
        if self.queue.push(record).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        } else {
            self.published.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Collector side: pop one record.
    pub fn pop(&self) -> Option<WireRecord> {
        self.queue.pop()
    }

    /// Collector side: drain up to `max` records into `out`.
    pub fn drain(&self, max: usize, out: &mut Vec<WireRecord>) -> usize {
        let mut n = 0;
        while n < max {
            match self.queue.pop() {
                Some(rec) => {
                    out.push(rec);
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            published: self.published.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            depth: self.queue.len(),
            capacity: self.queue.capacity(),
        }
    }
}

/// Channel counters; drops are the only trace of backpressure.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChannelStats {
    /// Records successfully enqueued.
    pub published: u64,
    /// Records dropped on a full queue.
    pub dropped: u64,
    pub depth: usize,
    pub capacity: usize,
}

impl ChannelStats {
    /// Fraction of offered records that were dropped.
    pub fn drop_rate(&self) -> f64 {
        let offered = self.published + self.dropped;
        if offered == 0 {
            0.0
        } else {
            self.dropped as f64 / offered as f64
        }
    }
}
