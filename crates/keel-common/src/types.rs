//! Key type tags for indexed attributes.

use serde::{Deserialize, Serialize};

/// Type of the attribute a secondary index is built over.
///
/// The tag is persisted in the index meta page and checked against the
/// caller's arguments when an existing index file is opened. Only 32-bit
/// signed integers are indexable in this revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum KeyType {
    /// 32-bit signed integer, little-endian on disk.
    Int32 = 1,
}

impl KeyType {
    /// Byte width of a key of this type.
    pub fn size(&self) -> usize {
        match self {
            KeyType::Int32 => 4,
        }
    }

    /// Decodes a persisted type tag.
    pub fn from_tag(tag: u8) -> Option<KeyType> {
        match tag {
            1 => Some(KeyType::Int32),
            _ => None,
        }
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyType::Int32 => write!(f, "INT32"),
        }
    }
}
