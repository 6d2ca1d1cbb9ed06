//! # Error Taxonomy
//!
//! Purpose: One error type shared by gateways, pools, backends and the
//! memoizing wrapper so failures propagate with `?` across crate seams.
//!
//! ## Design Principles
//! 1. **Explicit Misses**: A missing key is `KeyNotFound`, never an absent value.
//! 2. **No Hidden Retries**: Backend failures surface unchanged to the caller.
//! 3. **Typed Sources**: IO and serialization errors keep their source chain.

use thiserror::Error;

/// Result type used across the memo crates.
pub type MemoResult<T> = Result<T, MemoError>;

/// Errors surfaced by gateways, pools and backends.
#[derive(Debug, Error)]
pub enum MemoError {
    /// The backend has no record for the key, or removed zero entries.
    #[error("key not found: {key}")]
    KeyNotFound { key: String },

    /// No member could be supplied, even after attempting growth.
    #[error("memory pool exhausted")]
    PoolExhausted,

    /// Connectivity failure talking to the backend.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[from] std::io::Error),

    /// Wire framing was invalid.
    #[error("protocol error")]
    Protocol,

    /// The backend answered with an error reply.
    #[error("server error: {message}")]
    Server { message: String },

    /// The reply type did not match the issued command.
    #[error("unexpected response")]
    UnexpectedResponse,

    /// Value could not be serialized or deserialized.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Stored bytes do not carry a known record tag.
    #[error("malformed record")]
    MalformedRecord,

    /// Key exceeds the backend key size limit.
    #[error("key too long: {len} bytes")]
    KeyTooLong { len: usize },

    /// Pool bounds are inverted.
    #[error("invalid pool limits: lower {lower} > upper {upper}")]
    InvalidLimits { lower: usize, upper: usize },

    /// Backend address could not be parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl MemoError {
    /// Builds a `KeyNotFound` for `key`.
    pub fn not_found(key: impl Into<String>) -> Self {
        MemoError::KeyNotFound { key: key.into() }
    }

    /// Returns true for the cache-miss signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MemoError::KeyNotFound { .. })
    }
}
