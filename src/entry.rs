//! Entry definitions
//!
//! The key/value record shared by every storage layer.

use bytes::Bytes;

/// A key with either a live value or a tombstone.
///
/// Keys order lexicographically over raw bytes. A tombstone (`value == None`)
/// is never handed to callers but is kept through flushes so that older values
/// of the same key stay shadowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    key: Bytes,
    value: Option<Bytes>,
}

impl Entry {
    /// Create a live entry
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Create a tombstone for `key`
    pub fn tombstone(key: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    pub(crate) fn from_parts(key: Bytes, value: Option<Bytes>) -> Self {
        Self { key, value }
    }

    pub fn key(&self) -> &Bytes {
        &self.key
    }

    /// The value, or `None` for a tombstone
    pub fn value(&self) -> Option<&Bytes> {
        self.value.as_ref()
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Bytes this entry contributes to memtable accounting
    pub fn encoded_size(&self) -> usize {
        self.key.len() + self.value.as_ref().map_or(0, |v| v.len())
    }

    pub fn into_parts(self) -> (Bytes, Option<Bytes>) {
        (self.key, self.value)
    }
}
