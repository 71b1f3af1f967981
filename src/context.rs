//! Identifiers and span context for the correlation engine.
//!
//! Span context follows the W3C Trace Context id model: a 128-bit trace id
//! shared by every span in a trace, and a 64-bit span id unique to one span.
//! The engine only ever derives ids (root generation and child derivation);
//! header parsing and wire encoding of exported traces belong to the
//! collector, not here.

use rand::Rng;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Identifier of a logical task, assigned by the observed runtime.
///
/// Logical tasks are the runtime's cooperatively-scheduled execution units,
/// distinct from the OS threads that run them. Ids are transient: they live
/// for the task's lifetime and may be reused by the runtime afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

/// Kernel-level identifier of an OS thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub u64);

/// Token identifying a task-creation site.
///
/// The probe at the runtime's task-creation function reports the same token
/// for the creation intent and for the new task's first running transition,
/// bridging the two. Zero means "no token on this event".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreationToken(pub u64);

impl CreationToken {
    pub const NONE: CreationToken = CreationToken(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

/// A node in a distributed trace: {trace id, span id}.
///
/// Generated ids are never zero; zero is reserved so that cleared map slots
/// can never be confused with a live context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanContext {
    /// 128-bit trace id shared across the whole trace.
    pub trace_id: u128,
    /// 64-bit span id for this node.
    pub span_id: u64,
}

impl SpanContext {
    /// Synthesize a fresh root context with random, nonzero ids.
    pub fn new_root() -> Self {
        let mut rng = rand::thread_rng();
        SpanContext {
            trace_id: rng.gen_range(1..=u128::MAX),
            span_id: rng.gen_range(1..=u64::MAX),
        }
    }

    /// Derive a child context: same trace id, fresh span id.
    pub fn child_of(&self) -> Self {
        let mut rng = rand::thread_rng();
        SpanContext {
            trace_id: self.trace_id,
            span_id: rng.gen_range(1..=u64::MAX),
        }
    }

    /// Trace id as 16 big-endian bytes (the wire form).
    pub fn trace_id_bytes(&self) -> [u8; 16] {
        self.trace_id.to_be_bytes()
    }

    /// Span id as 8 big-endian bytes (the wire form).
    pub fn span_id_bytes(&self) -> [u8; 8] {
        self.span_id.to_be_bytes()
    }
}

impl fmt::Display for SpanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            hex::encode(self.trace_id_bytes()),
            hex::encode(self.span_id_bytes())
        )
    }
}

// Serialized as hex strings so collector-side JSON matches the usual
// trace/span id presentation. Only the replay harness serializes; the
// probe path never does.
impl Serialize for SpanContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("SpanContext", 2)?;
        s.serialize_field("trace_id", &hex::encode(self.trace_id_bytes()))?;
        s.serialize_field("span_id", &hex::encode(self.span_id_bytes()))?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_ids_nonzero() {
        for _ in 0..64 {
            let ctx = SpanContext::new_root();
            assert_ne!(ctx.trace_id, 0);
            assert_ne!(ctx.span_id, 0);
        }
    }

    #[test]
    fn test_child_shares_trace_id() {
        let root = SpanContext::new_root();
        let child = root.child_of();
        assert_eq!(child.trace_id, root.trace_id);
        assert_ne!(child.span_id, 0);
    }

    #[test]
    fn test_display_is_hex_pair() {
        let ctx = SpanContext {
            trace_id: 0x0af7651916cd43dd8448eb211c80319c,
            span_id: 0xb7ad6b7169203331,
        };
        assert_eq!(
            ctx.to_string(),
            "0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331"
        );
    }

    #[test]
    fn test_serialize_hex_fields() {
        let ctx = SpanContext {
            trace_id: 1,
            span_id: 2,
        };
        let json = serde_json::to_value(ctx).unwrap();
        assert_eq!(json["trace_id"], "00000000000000000000000000000001");
        assert_eq!(json["span_id"], "0000000000000002");
    }

    #[test]
    fn test_creation_token_none() {
        assert!(CreationToken::NONE.is_none());
        assert!(!CreationToken(7).is_none());
    }
}
