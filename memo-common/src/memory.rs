//! # Capability Traits
//!
//! Purpose: Enumerate exactly the operations the gateway and pool need from
//! a backend, and the dictionary-like contract they offer to callers.
//!
//! ## Design Principles
//! 1. **Strategy Pattern**: `Backend` hides the wire protocol behind five calls.
//! 2. **Same Contract Everywhere**: A single gateway and a pool both implement
//!    `Memory`, so callers cannot tell them apart.
//! 3. **Explicit Misses**: `fetch`/`delete` fail with `KeyNotFound`.
//!
//! ## Layering
//!
//! ```text
//! caller ─► Memory (get/set/delete/expire_key, typed)
//!              ├── Gateway ─► Backend (bytes, Option for missing)
//!              └── GatewayPool ─► claim ─► Gateway ─► Backend
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{MemoError, MemoResult};
use crate::key::KeyArgs;
use crate::memoize::Memoized;
use crate::record::Record;

/// Maximum key size in bytes, matching the memcache limit.
pub const MAX_KEY_SIZE: usize = 250;

/// Rejects keys the backends cannot store.
///
/// # Errors
/// Returns `MemoError::KeyTooLong` when `key` exceeds [`MAX_KEY_SIZE`].
pub fn validate_key(key: &str) -> MemoResult<()> {
    if key.len() > MAX_KEY_SIZE {
        return Err(MemoError::KeyTooLong { len: key.len() });
    }
    Ok(())
}

/// Byte-level binding to one backend connection.
///
/// Implementations own their connection exclusively; the gateway serializes
/// access, so methods take `&mut self`.
pub trait Backend: Send {
    /// Fetches raw bytes; `Ok(None)` is the backend's native "missing" signal.
    fn get(&mut self, key: &[u8]) -> MemoResult<Option<Vec<u8>>>;

    /// Stores raw bytes, expiring after `ttl` when provided.
    fn set(&mut self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> MemoResult<()>;

    /// Removes a key and returns how many entries were removed.
    fn delete(&mut self, key: &[u8]) -> MemoResult<u64>;

    /// Sets a time-to-live on an existing key. Returns false when the key
    /// is missing.
    fn expire(&mut self, key: &[u8], ttl: Duration) -> MemoResult<bool>;

    /// Releases the underlying connection.
    fn close(&mut self) -> MemoResult<()> {
        Ok(())
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn get(&mut self, key: &[u8]) -> MemoResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> MemoResult<()> {
        (**self).set(key, value, ttl)
    }

    fn delete(&mut self, key: &[u8]) -> MemoResult<u64> {
        (**self).delete(key)
    }

    fn expire(&mut self, key: &[u8], ttl: Duration) -> MemoResult<bool> {
        (**self).expire(key, ttl)
    }

    fn close(&mut self) -> MemoResult<()> {
        (**self).close()
    }
}

/// Connection parameters able to open fresh backends.
///
/// The pool keeps one connector and calls it on every growth step.
pub trait Connector: Send + Sync {
    type Backend: Backend;

    /// Opens a new backend connection.
    fn connect(&self) -> MemoResult<Self::Backend>;
}

/// Dictionary-like gateway contract shared by single gateways and pools.
pub trait Memory: Send + Sync {
    /// Fetches the record stored under `key`.
    ///
    /// # Errors
    /// Returns `MemoError::KeyNotFound` when nothing is stored.
    fn fetch(&self, key: &str) -> MemoResult<Record>;

    /// Stores `record` under `key` using the current expiration.
    fn store(&self, key: &str, record: &Record) -> MemoResult<()>;

    /// Deletes `key`.
    ///
    /// # Errors
    /// Returns `MemoError::KeyNotFound` when the backend removed nothing.
    fn delete(&self, key: &str) -> MemoResult<()>;

    /// Gives the record under `key` its own time-to-live, independent of
    /// the expiration applied to writes.
    ///
    /// # Errors
    /// Returns `MemoError::KeyNotFound` when nothing is stored.
    fn expire_key(&self, key: &str, ttl: Duration) -> MemoResult<()>;

    /// Expiration applied to writes; `None` means no expiry.
    fn expire(&self) -> Option<Duration>;

    /// Changes the expiration for all subsequently issued writes.
    fn set_expire(&self, ttl: Option<Duration>);

    /// Fetches and deserializes the value stored under `key`.
    fn get<T: DeserializeOwned>(&self, key: &str) -> MemoResult<T>
    where
        Self: Sized,
    {
        self.fetch(key)?.decode()
    }

    /// Serializes and stores `value`; absence values become `Record::NotSet`.
    fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> MemoResult<()>
    where
        Self: Sized,
    {
        self.store(key, &Record::encode(value)?)
    }

    /// Returns true when a record exists under `key`.
    fn contains(&self, key: &str) -> MemoResult<bool>
    where
        Self: Sized,
    {
        match self.fetch(key) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Wraps `func` so its results are cached in this memory.
    fn memoize<F, A, R>(self, name: impl Into<String>, func: F) -> Memoized<Self, F, A, R>
    where
        Self: Sized,
        F: Fn(A) -> R,
        A: KeyArgs,
        R: Serialize + DeserializeOwned,
    {
        Memoized::new(name, self, func)
    }
}

impl<M: Memory + ?Sized> Memory for Arc<M> {
    fn fetch(&self, key: &str) -> MemoResult<Record> {
        (**self).fetch(key)
    }

    fn store(&self, key: &str, record: &Record) -> MemoResult<()> {
        (**self).store(key, record)
    }

    fn delete(&self, key: &str) -> MemoResult<()> {
        (**self).delete(key)
    }

    fn expire_key(&self, key: &str, ttl: Duration) -> MemoResult<()> {
        (**self).expire_key(key, ttl)
    }

    fn expire(&self) -> Option<Duration> {
        (**self).expire()
    }

    fn set_expire(&self, ttl: Option<Duration>) {
        (**self).set_expire(ttl)
    }
}

impl<M: Memory + ?Sized> Memory for &M {
    fn fetch(&self, key: &str) -> MemoResult<Record> {
        (**self).fetch(key)
    }

    fn store(&self, key: &str, record: &Record) -> MemoResult<()> {
        (**self).store(key, record)
    }

    fn delete(&self, key: &str) -> MemoResult<()> {
        (**self).delete(key)
    }

    fn expire_key(&self, key: &str, ttl: Duration) -> MemoResult<()> {
        (**self).expire_key(key, ttl)
    }

    fn expire(&self) -> Option<Duration> {
        (**self).expire()
    }

    fn set_expire(&self, ttl: Option<Duration>) {
        (**self).set_expire(ttl)
    }
}
