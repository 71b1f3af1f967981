//! Property-based tests for the fixed-capacity stores and the wire format.
//!
//! The lock-free maps are checked against a plain `HashMap` model over
//! arbitrary operation sequences; the bounded buffers and the ancestor
//! walk are checked over arbitrary inputs and depths.

use linaje::atomic_map::FixedU64Map;
use linaje::context::SpanContext;
use linaje::context_map::SpanContextMap;
use linaje::emitter::{RecordKind, WireRecord};
use linaje::extract::{FieldBuf, FIELD_BUF_LEN};
use linaje::lineage::LineageStore;
use linaje::context::TaskId;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum MapOp {
    Insert(u64, u64),
    Take(u64),
    Get(u64),
}

fn map_op() -> impl Strategy<Value = MapOp> {
    // Small key space to force collisions and tombstone reuse.
    prop_oneof![
        (0u64..32, any::<u64>().prop_map(|v| v >> 1)).prop_map(|(k, v)| MapOp::Insert(k, v)),
        (0u64..32).prop_map(MapOp::Take),
        (0u64..32).prop_map(MapOp::Get),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    // Property: single-threaded, the lock-free map behaves exactly like a
    // HashMap for any operation sequence that fits its capacity.
    #[test]
    fn prop_fixed_map_matches_model(ops in prop::collection::vec(map_op(), 0..200)) {
        let map = FixedU64Map::new(64);
        let mut model = std::collections::HashMap::new();

        for op in ops {
            match op {
                MapOp::Insert(k, v) => {
                    map.insert(k, v).unwrap();
                    model.insert(k, v);
                }
                MapOp::Take(k) => {
                    prop_assert_eq!(map.take(k), model.remove(&k));
                }
                MapOp::Get(k) => {
                    prop_assert_eq!(map.get(k), model.get(&k).copied());
                }
            }
        }
        prop_assert_eq!(map.len(), model.len());
    }

    // Property: FieldBuf never exceeds its inline capacity and preserves
    // every byte it kept.
    #[test]
    fn prop_field_buf_truncates_exactly(src in prop::collection::vec(any::<u8>(), 0..256)) {
        let buf = FieldBuf::copy_from(&src);
        let kept = src.len().min(FIELD_BUF_LEN);
        prop_assert_eq!(buf.len(), kept);
        prop_assert_eq!(buf.as_bytes(), &src[..kept]);
    }

    // Property: wire encoding survives a decode for every field value.
    #[test]
    fn prop_wire_record_roundtrip(
        key in any::<u64>(),
        value in any::<u64>(),
        trace in any::<u128>(),
        span in any::<u64>(),
        ts in any::<u64>(),
        kind_code in 1u8..=5,
    ) {
        let rec = WireRecord {
            key,
            value,
            trace_id: trace,
            span_id: span,
            timestamp_ns: ts,
            kind: RecordKind::from_code(kind_code).unwrap(),
        };
        prop_assert_eq!(WireRecord::decode(&rec.encode()), Some(rec));
    }

    // Property: on a linear chain with a context only at the top, the walk
    // finds it iff the depth is within the 16-hop ceiling.
    #[test]
    fn prop_ancestor_walk_respects_bound(depth in 1u64..40) {
        let lineage = LineageStore::new(128, 128, 16);
        let contexts = SpanContextMap::new(128);

        // chain: task 0 <- 1 <- ... <- depth
        for i in 0..depth {
            lineage.record_edge(TaskId(i + 1), TaskId(i));
        }
        let top = SpanContext { trace_id: 0xfeed, span_id: 0xbeef };
        contexts.put_if_absent(TaskId(0), top);

        let found = lineage.nearest_ancestor_context(TaskId(depth), &contexts);
        if depth <= 16 {
            prop_assert_eq!(found, Some(top));
        } else {
            prop_assert_eq!(found, None);
        }
    }

    // Property: derived children always keep the trace id and never reuse
    // the parent span id slot value zero.
    #[test]
    fn prop_child_derivation_preserves_trace(trace in 1u128.., span in 1u64..) {
        let parent = SpanContext { trace_id: trace, span_id: span };
        let child = parent.child_of();
        prop_assert_eq!(child.trace_id, trace);
        prop_assert_ne!(child.span_id, 0);
    }
}
