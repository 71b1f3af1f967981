//! Bounded field extraction: the seam between probe adapters and the core.
//!
//! Call-site adapters (message producers, HTTP routers, loggers) read
//! domain fields out of foreign runtime structs at fixed offsets and hand
//! them to [`crate::engine::CorrelationEngine::begin_span`]. The offset
//! tables themselves are external configuration resolved at attach time;
//! the core only sees the extracted values, and it sees them in inline
//! fixed-size buffers because the probe path cannot allocate.

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::fmt;

/// Inline capacity of one extracted field value.
pub const FIELD_BUF_LEN: usize = 64;

/// Maximum named fields per span instance.
pub const MAX_FIELDS: usize = 4;

/// Fixed-size byte buffer with truncate-on-copy semantics.
///
/// Longer sources are silently cut at [`FIELD_BUF_LEN`]; the length prefix
/// records how much survived.
#[derive(Clone, Copy)]
pub struct FieldBuf {
    len: u8,
    bytes: [u8; FIELD_BUF_LEN],
}

impl FieldBuf {
    pub const fn empty() -> Self {
        FieldBuf {
            len: 0,
            bytes: [0; FIELD_BUF_LEN],
        }
    }

    /// Copy from `src`, truncating past the inline capacity.
    pub fn copy_from(src: &[u8]) -> Self {
        let n = src.len().min(FIELD_BUF_LEN);
        let mut bytes = [0u8; FIELD_BUF_LEN];
        bytes[..n].copy_from_slice(&src[..n]);
        FieldBuf {
            len: n as u8,
            bytes,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Lossy UTF-8 view; raw bytes shown as escapes. Display/serialize only.
    pub fn display_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

impl Default for FieldBuf {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for FieldBuf {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for FieldBuf {}

impl fmt::Debug for FieldBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldBuf")
            .field("len", &self.len)
            .field("value", &self.display_lossy())
            .finish()
    }
}

/// One named extracted field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Field {
    pub name: FieldBuf,
    pub value: FieldBuf,
}

impl Field {
    pub fn new(name: &str, value: &[u8]) -> Self {
        Field {
            name: FieldBuf::copy_from(name.as_bytes()),
            value: FieldBuf::copy_from(value),
        }
    }
}

/// Small fixed array of extracted fields.
///
/// `push` past [`MAX_FIELDS`] is silently dropped — same best-effort
/// contract as every other fixed structure on the probe path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldSet {
    len: u8,
    fields: [Field; MAX_FIELDS],
}

impl FieldSet {
    pub const fn empty() -> Self {
        FieldSet {
            len: 0,
            fields: [Field {
                name: FieldBuf::empty(),
                value: FieldBuf::empty(),
            }; MAX_FIELDS],
        }
    }

    pub fn push(&mut self, field: Field) -> bool {
        if (self.len as usize) < MAX_FIELDS {
            self.fields[self.len as usize] = field;
            self.len += 1;
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields[..self.len as usize].iter()
    }

    pub fn get(&self, name: &str) -> Option<&FieldBuf> {
        self.iter()
            .find(|f| f.name.as_bytes() == name.as_bytes())
            .map(|f| &f.value)
    }
}

impl Serialize for FieldSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut m = serializer.serialize_map(Some(self.len()))?;
        for field in self.iter() {
            m.serialize_entry(&field.name.display_lossy(), &field.value.display_lossy())?;
        }
        m.end()
    }
}

impl Serialize for FieldBuf {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("FieldBuf", 1)?;
        s.serialize_field("value", &self.display_lossy())?;
        s.end()
    }
}

/// Adapter-side extraction seam.
///
/// Implementations read typed values out of the instrumented library's
/// structures (fixed-offset memory reads resolved at attach time) and
/// return them already bounded. The core never dereferences foreign memory
/// itself.
pub trait FieldExtractor: Send + Sync {
    /// Fields to attach to the span started under `instance_key`.
    fn extract(&self, instance_key: u64) -> FieldSet;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_truncates_at_capacity() {
        let long = vec![b'x'; 200];
        let buf = FieldBuf::copy_from(&long);
        assert_eq!(buf.len(), FIELD_BUF_LEN);
        assert!(buf.as_bytes().iter().all(|&b| b == b'x'));
    }

    #[test]
    fn test_short_copy_preserved_exactly() {
        let buf = FieldBuf::copy_from(b"GET");
        assert_eq!(buf.as_bytes(), b"GET");
        assert_eq!(buf.display_lossy(), "GET");
    }

    #[test]
    fn test_fieldset_push_bounded() {
        let mut set = FieldSet::empty();
        for i in 0..MAX_FIELDS {
            assert!(set.push(Field::new("k", &[i as u8])));
        }
        assert!(!set.push(Field::new("overflow", b"dropped")));
        assert_eq!(set.len(), MAX_FIELDS);
    }

    #[test]
    fn test_fieldset_lookup_by_name() {
        let mut set = FieldSet::empty();
        set.push(Field::new("http.method", b"GET"));
        set.push(Field::new("http.path", b"/orders"));
        assert_eq!(set.get("http.path").unwrap().as_bytes(), b"/orders");
        assert!(set.get("missing").is_none());
    }

    #[test]
    fn test_fieldset_serializes_as_map() {
        let mut set = FieldSet::empty();
        set.push(Field::new("topic", b"audit"));
        let json = serde_json::to_value(set).unwrap();
        assert_eq!(json["topic"], "audit");
    }
}
