//! # Gateway
//!
//! Purpose: Expose one backend connection through the dictionary-like
//! `Memory` contract.
//!
//! ## Design Principles
//! 1. **Adapter Pattern**: Translate `Record`s to tagged bytes and the
//!    backend's "missing" signal to `KeyNotFound`.
//! 2. **Live TTL**: The expiration is read on every write, so changing it
//!    takes effect without reconnecting.
//! 3. **Exclusive Backend**: The connection sits behind its own mutex; the
//!    pool never shares a member, so the lock is uncontended there.

use std::fmt;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use memo_common::{validate_key, Backend, Connector, MemoError, MemoResult, Memory, Record};

/// Dictionary-like gateway over a single backend connection.
pub struct Gateway<B> {
    id: u64,
    backend: Mutex<B>,
    expire: RwLock<Option<Duration>>,
}

impl<B: Backend> Gateway<B> {
    /// Wraps an open backend. A zero `expire` means no expiry.
    pub fn new(backend: B, expire: Option<Duration>) -> Self {
        Self::with_id(0, backend, expire)
    }

    /// Opens a backend through `connector` and wraps it.
    pub fn connect<C>(connector: &C, expire: Option<Duration>) -> MemoResult<Self>
    where
        C: Connector<Backend = B>,
    {
        Ok(Self::new(connector.connect()?, expire))
    }

    pub(crate) fn with_id(id: u64, backend: B, expire: Option<Duration>) -> Self {
        Gateway {
            id,
            backend: Mutex::new(backend),
            expire: RwLock::new(normalize_expire(expire)),
        }
    }

    /// Identifier assigned by the owning pool (0 for standalone gateways).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Closes the backend connection.
    pub fn close(self) -> MemoResult<()> {
        self.backend.into_inner().close()
    }
}

impl<B: Backend> Memory for Gateway<B> {
    fn fetch(&self, key: &str) -> MemoResult<Record> {
        validate_key(key)?;
        debug!(member = self.id, key, "accessing key");
        match self.backend.lock().get(key.as_bytes())? {
            Some(bytes) => Record::from_bytes(&bytes),
            None => Err(MemoError::not_found(key)),
        }
    }

    fn store(&self, key: &str, record: &Record) -> MemoResult<()> {
        validate_key(key)?;
        let ttl = self.expire();
        debug!(member = self.id, key, not_set = record.is_not_set(), "setting key");
        self.backend.lock().set(key.as_bytes(), &record.to_bytes(), ttl)
    }

    fn delete(&self, key: &str) -> MemoResult<()> {
        validate_key(key)?;
        debug!(member = self.id, key, "deleting key");
        match self.backend.lock().delete(key.as_bytes())? {
            0 => Err(MemoError::not_found(key)),
            _ => Ok(()),
        }
    }

    fn expire_key(&self, key: &str, ttl: Duration) -> MemoResult<()> {
        validate_key(key)?;
        debug!(member = self.id, key, ?ttl, "expiring key");
        if self.backend.lock().expire(key.as_bytes(), ttl)? {
            Ok(())
        } else {
            Err(MemoError::not_found(key))
        }
    }

    fn expire(&self) -> Option<Duration> {
        *self.expire.read()
    }

    fn set_expire(&self, ttl: Option<Duration>) {
        *self.expire.write() = normalize_expire(ttl);
    }
}

impl<B> fmt::Debug for Gateway<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("id", &self.id)
            .field("expire", &*self.expire.read())
            .finish_non_exhaustive()
    }
}

// Memcache treats an expiration of 0 as "never"; keep that meaning.
pub(crate) fn normalize_expire(ttl: Option<Duration>) -> Option<Duration> {
    ttl.filter(|ttl| !ttl.is_zero())
}
