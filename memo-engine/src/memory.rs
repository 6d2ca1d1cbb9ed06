//! # In-Memory Engine
//!
//! Provide an in-process backend with sharded locking and TTL-aware
//! lookups, so gateways and pools can be exercised without a server.
//!
//! ## Usage
//!
//! - Use `MemoryEngine::new()` for a default sharded engine.
//! - Clone the engine to share it: every clone sees the same entries, which
//!   is how several pool members attach to one in-process store.
//! - `start_expirer` runs a sweeper thread for entries nobody reads again.
//!
//! ## Design Principles
//!
//! 1. **Sharded Locks**: Keys hash to one of a power-of-two number of
//!    `RwLock`ed maps, so unrelated keys rarely contend.
//! 2. **Shared Buffers**: Reads hand out `Arc<[u8]>` clones.
//! 3. **Lazy Expiry**: Reads, deletes, and `expire` treat a passed deadline
//!    as absence; the optional sweeper reclaims the memory.
//! 4. **No Eviction**: Entries leave only by delete or expiry.
//!
//! ## Structure Overview
//!
//! ```text
//! MemoryEngine (Clone)
//!   └── inner: Arc<EngineInner>
//!         └── shards: Vec<Shard>
//!               └── RwLock<HashMap<Box<[u8]>, Entry>>
//!                     └── Entry { value, expires_at }
//! ```

use std::hash::BuildHasher;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use memo_common::{Backend, Connector, MemoResult};

const SHARDS_PER_CPU: usize = 4;

/// Remaining lifetime of a key, as reported by `TTL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    /// No live entry (`TTL` replies -2).
    Missing,
    /// Live entry without a deadline (`TTL` replies -1).
    NoExpiry,
    ExpiresIn(Duration),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Arc<[u8]>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

type ShardMap = HashMap<Box<[u8]>, Entry, RandomState>;

#[derive(Debug)]
struct Shard {
    map: RwLock<ShardMap>,
}

#[derive(Debug)]
struct EngineInner {
    shards: Vec<Shard>,
    // Power-of-two shard count allows masking instead of modulo.
    shard_mask: usize,
    hash_state: RandomState,
}

/// Sharded in-memory key/value store.
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    inner: Arc<EngineInner>,
}

/// Owns the sweeper thread started by [`MemoryEngine::start_expirer`].
///
/// Dropping the handle also shuts the sweeper down.
pub struct ExpirationHandle {
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ExpirationHandle {
    /// Signals the sweeper and joins it.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("expiration sweeper panicked");
            }
        }
    }
}

impl Drop for ExpirationHandle {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

impl MemoryEngine {
    /// Creates an engine sized from the available parallelism.
    pub fn new() -> Self {
        let cpus = std::thread::available_parallelism().map_or(1, |cpus| cpus.get());
        Self::with_shard_count(cpus.saturating_mul(SHARDS_PER_CPU))
    }

    /// Creates an engine with `shards` shards, rounded up to a power of two.
    pub fn with_shard_count(shards: usize) -> Self {
        let count = shards.max(1).next_power_of_two();
        let hash_state = RandomState::new();
        let shards = (0..count)
            .map(|_| Shard {
                map: RwLock::new(HashMap::with_hasher(hash_state.clone())),
            })
            .collect();

        MemoryEngine {
            inner: Arc::new(EngineInner {
                shards,
                shard_mask: count - 1,
                hash_state,
            }),
        }
    }

    /// Returns the live value for `key`, dropping it if it has expired.
    pub fn get(&self, key: &[u8]) -> Option<Arc<[u8]>> {
        let shard = self.shard_for(key);
        let now = Instant::now();
        {
            let map = shard.map.read();
            match map.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(Arc::clone(&entry.value)),
                Some(_) => {}
            }
        }

        let mut map = shard.map.write();
        if map.get(key).map(|entry| entry.is_expired(now)).unwrap_or(false) {
            map.remove(key);
        }
        None
    }

    /// Inserts or replaces `key`, expiring after `ttl` when provided.
    /// A `ttl` reaching past what `Instant` can represent never expires.
    pub fn set(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) {
        let entry = Entry {
            value: Arc::from(value),
            expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
        };
        self.shard_for(key).map.write().insert(Box::from(key), entry);
    }

    /// Removes `key`. Returns true when a live entry was removed.
    pub fn delete(&self, key: &[u8]) -> bool {
        let now = Instant::now();
        match self.shard_for(key).map.write().remove(key) {
            Some(entry) => !entry.is_expired(now),
            None => false,
        }
    }

    /// Sets a time-to-live on an existing key. Returns false when missing.
    /// As with `set`, an unrepresentable deadline clears the expiry.
    pub fn expire(&self, key: &[u8], ttl: Duration) -> bool {
        let now = Instant::now();
        let mut map = self.shard_for(key).map.write();
        let expired = match map.get_mut(key) {
            None => return false,
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => {
                entry.expires_at = now.checked_add(ttl);
                false
            }
        };
        if expired {
            map.remove(key);
        }
        !expired
    }

    /// Returns TTL state for a key.
    pub fn ttl(&self, key: &[u8]) -> TtlStatus {
        let now = Instant::now();
        let map = self.shard_for(key).map.read();
        match map.get(key) {
            None => TtlStatus::Missing,
            Some(entry) if entry.is_expired(now) => TtlStatus::Missing,
            Some(entry) => match entry.expires_at {
                None => TtlStatus::NoExpiry,
                Some(deadline) => TtlStatus::ExpiresIn(deadline - now),
            },
        }
    }

    /// Stored entries, counting expired ones that were not purged yet.
    pub fn len(&self) -> usize {
        self.inner.shards.iter().map(|shard| shard.map.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.shards.iter().all(|shard| shard.map.read().is_empty())
    }

    /// Drops every entry whose deadline is at or before `now`, shard by
    /// shard. Returns how many were dropped.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut removed = 0;
        for shard in &self.inner.shards {
            let mut map = shard.map.write();
            let before = map.len();
            map.retain(|_, entry| !entry.is_expired(now));
            removed += before - map.len();
        }
        removed
    }

    /// Purges expired entries every `interval` on a dedicated thread until
    /// the returned handle is stopped or dropped.
    pub fn start_expirer(&self, interval: Duration) -> ExpirationHandle {
        let interval = interval.max(Duration::from_millis(1));
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker = {
            let engine = self.clone();
            let shutdown = Arc::clone(&shutdown);
            std::thread::spawn(move || engine.sweep_until(&shutdown, interval))
        };

        ExpirationHandle {
            shutdown,
            worker: Some(worker),
        }
    }

    fn sweep_until(&self, shutdown: &AtomicBool, interval: Duration) {
        while !shutdown.load(Ordering::Acquire) {
            std::thread::sleep(interval);
            let removed = self.purge_expired(Instant::now());
            if removed > 0 {
                debug!(removed, "purged expired entries");
            }
        }
    }

    fn shard_for(&self, key: &[u8]) -> &Shard {
        let hash = self.inner.hash_state.hash_one(key) as usize;
        &self.inner.shards[hash & self.inner.shard_mask]
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        MemoryEngine::new()
    }
}

// Each clone is one "connection" onto the shared store.
impl Backend for MemoryEngine {
    fn get(&mut self, key: &[u8]) -> MemoResult<Option<Vec<u8>>> {
        Ok(MemoryEngine::get(self, key).map(|value| value.to_vec()))
    }

    fn set(&mut self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> MemoResult<()> {
        MemoryEngine::set(self, key, value, ttl);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> MemoResult<u64> {
        Ok(u64::from(MemoryEngine::delete(self, key)))
    }

    fn expire(&mut self, key: &[u8], ttl: Duration) -> MemoResult<bool> {
        Ok(MemoryEngine::expire(self, key, ttl))
    }
}

impl Connector for MemoryEngine {
    type Backend = MemoryEngine;

    fn connect(&self) -> MemoResult<MemoryEngine> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> MemoryEngine {
        MemoryEngine::with_shard_count(2)
    }

    #[test]
    fn stores_and_returns_values() {
        let store = MemoryEngine::with_shard_count(5);
        assert_eq!(store.inner.shards.len(), 8);
        store.set(b"alpha", b"one", None);
        store.set(b"alpha", b"two", None);
        assert_eq!(store.get(b"alpha").as_deref(), Some(&b"two"[..]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_reports_live_entries_only() {
        let store = engine();
        store.set(b"live", b"1", None);
        store.set(b"stale", b"1", Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(5));

        assert!(store.delete(b"live"));
        assert!(!store.delete(b"live"));
        assert!(!store.delete(b"stale"));
        assert!(store.is_empty());
    }

    #[test]
    fn reads_drop_expired_entries() {
        let store = engine();
        store.set(b"brief", b"1", Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.len(), 1);
        assert!(store.get(b"brief").is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn expire_applies_only_to_live_keys() {
        let store = engine();
        assert!(!store.expire(b"absent", Duration::from_secs(1)));

        store.set(b"key", b"1", None);
        assert!(store.expire(b"key", Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(!store.expire(b"key", Duration::from_secs(1)));
        assert!(store.get(b"key").is_none());
    }

    #[test]
    fn ttl_tracks_deadline() {
        let store = engine();
        assert_eq!(store.ttl(b"key"), TtlStatus::Missing);

        store.set(b"key", b"1", None);
        assert_eq!(store.ttl(b"key"), TtlStatus::NoExpiry);

        store.expire(b"key", Duration::from_secs(60));
        match store.ttl(b"key") {
            TtlStatus::ExpiresIn(left) => assert!(left > Duration::from_secs(59) && left <= Duration::from_secs(60)),
            other => panic!("unexpected ttl {other:?}"),
        }
    }

    #[test]
    fn unrepresentable_ttl_never_expires() {
        let store = engine();
        let forever = Duration::from_secs(u64::MAX);

        store.set(b"set", b"1", Some(forever));
        assert_eq!(store.ttl(b"set"), TtlStatus::NoExpiry);

        store.set(b"expired", b"1", Some(Duration::from_secs(60)));
        assert!(store.expire(b"expired", Duration::MAX));
        assert_eq!(store.ttl(b"expired"), TtlStatus::NoExpiry);
        assert_eq!(store.purge_expired(Instant::now()), 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn purge_counts_removed_entries() {
        let store = engine();
        let keys: [&[u8]; 3] = [b"a", b"b", b"c"];
        for key in keys {
            store.set(key, b"1", Some(Duration::from_millis(1)));
        }
        store.set(b"keep", b"1", None);
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(store.purge_expired(Instant::now()), 3);
        assert_eq!(store.purge_expired(Instant::now()), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn sweeper_purges_in_background() {
        let store = engine();
        store.set(b"brief", b"1", Some(Duration::from_millis(1)));

        let sweeper = store.start_expirer(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(store.len(), 0);
        drop(sweeper);
    }

    #[test]
    fn connections_share_one_store() {
        let store = engine();
        let mut writer = store.connect().unwrap();
        let mut reader = store.connect().unwrap();

        Backend::set(&mut writer, b"shared", b"1", Some(Duration::from_secs(5))).unwrap();
        assert_eq!(Backend::get(&mut reader, b"shared").unwrap(), Some(b"1".to_vec()));
        assert_eq!(Backend::delete(&mut reader, b"shared").unwrap(), 1);
        assert_eq!(Backend::delete(&mut writer, b"shared").unwrap(), 0);
        assert_eq!(Backend::get(&mut writer, b"shared").unwrap(), None);

        assert!(!Backend::expire(&mut writer, b"shared", Duration::from_secs(1)).unwrap());
        Backend::set(&mut writer, b"shared", b"2", None).unwrap();
        assert!(Backend::expire(&mut reader, b"shared", Duration::from_secs(30)).unwrap());
        assert!(matches!(store.ttl(b"shared"), TtlStatus::ExpiresIn(_)));
    }
}
