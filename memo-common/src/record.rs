//! # Stored Records
//!
//! Purpose: Disambiguate "the cached result is absent" from "nothing is
//! cached" when a backend uses the same signal for both.
//!
//! ## Design Principles
//! 1. **Type-Level Sentinel**: `Record::NotSet` replaces a magic stored object.
//! 2. **Self-Describing Bytes**: One tag byte followed by a JSON payload.
//! 3. **Transparent Above the Gateway**: Callers only see their own types.
//!
//! ## Byte Layout
//!
//! ```text
//! NotSet:  +--------+
//!          | 0x00   |
//!          +--------+
//! Value:   +--------+----------------+
//!          | 0x01   | JSON payload   |
//!          +--------+----------------+
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{MemoError, MemoResult};
use crate::shape;

/// Tag byte for a stored absence value.
pub const NOT_SET_TAG: u8 = 0x00;

/// Tag byte for a stored serialized value.
pub const VALUE_TAG: u8 = 0x01;

/// A value as held by a gateway, before or after the backend round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// The computed result was the absence value (`None`, `()`).
    NotSet,
    /// JSON-serialized payload.
    Value(Vec<u8>),
}

impl Record {
    /// Serializes `value`, substituting `NotSet` for absence values.
    ///
    /// # Errors
    /// Returns `MemoError::Codec` when `value` holds a NaN or infinite float,
    /// which JSON would otherwise flatten into `null`.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> MemoResult<Self> {
        if shape::is_absence(value)? {
            return Ok(Record::NotSet);
        }
        Ok(Record::Value(serde_json::to_vec(value)?))
    }

    /// Deserializes the record into `T`; `NotSet` decodes as `null`.
    pub fn decode<T: DeserializeOwned>(&self) -> MemoResult<T> {
        match self {
            Record::NotSet => Ok(serde_json::from_value(serde_json::Value::Null)?),
            Record::Value(bytes) => Ok(serde_json::from_slice(bytes)?),
        }
    }

    /// Returns true for the absence sentinel.
    pub fn is_not_set(&self) -> bool {
        matches!(self, Record::NotSet)
    }

    /// Encodes the record into backend bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Record::NotSet => vec![NOT_SET_TAG],
            Record::Value(payload) => {
                let mut buf = Vec::with_capacity(payload.len() + 1);
                buf.push(VALUE_TAG);
                buf.extend_from_slice(payload);
                buf
            }
        }
    }

    /// Parses backend bytes produced by [`Record::to_bytes`].
    ///
    /// # Errors
    /// Returns `MemoError::MalformedRecord` for empty input, an unknown tag,
    /// or trailing bytes after a `NotSet` tag.
    pub fn from_bytes(bytes: &[u8]) -> MemoResult<Self> {
        match bytes.split_first() {
            Some((&NOT_SET_TAG, rest)) if rest.is_empty() => Ok(Record::NotSet),
            Some((&VALUE_TAG, rest)) => Ok(Record::Value(rest.to_vec())),
            _ => Err(MemoError::MalformedRecord),
        }
    }
}
