//! # Gateway Pool
//!
//! Purpose: Multiplex many backend connections behind the single-gateway
//! `Memory` contract, growing and shrinking within configured bounds.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Idle gateways live in one stack behind one mutex.
//! 2. **Minimal Locking**: The mutex covers only structural moves; connects,
//!    closes, and delegated backend calls run outside it.
//! 3. **Fail Fast**: When no member can be supplied, claims fail with
//!    `PoolExhausted` instead of waiting.
//! 4. **Scoped Claims**: `PooledGateway` returns its member on drop, so a
//!    failing delegated call still releases it.
//!
//! ## Member Lifecycle
//!
//! ```text
//!            grow / on-demand open
//!                     │
//!                     ▼
//!   ┌──────── Idle (in pool) ◄──────────┐
//!   │                 │ claim           │ release (room left)
//!   │ shrink          ▼                 │
//!   │            Claimed (one holder) ──┘
//!   ▼                 │ release (pool full)
//! Disposed ◄──────────┘
//! ```
//!
//! ## Claim Policy
//!
//! - When fewer than `lower_limit` members are idle, the pool first grows by
//!   exactly the deficit.
//! - If no member is idle afterwards and `idle + claimed < upper_limit`, one
//!   member is opened on demand and handed straight to the claimant.
//! - Otherwise the claim fails with `PoolExhausted`.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use memo_common::{Connector, MemoError, MemoResult, Memory, Record};

use crate::config::PoolConfig;
use crate::gateway::{normalize_expire, Gateway};
use crate::metrics::{PoolMetrics, PoolStats};

struct PoolState<B> {
    // Stack of idle members; claims pop from the end.
    idle: Vec<Gateway<B>>,
    claimed: usize,
    lower_limit: usize,
    upper_limit: usize,
}

impl<B> PoolState<B> {
    /// Members that may still be opened without passing `upper_limit`.
    fn room(&self) -> usize {
        self.upper_limit.saturating_sub(self.idle.len() + self.claimed)
    }
}

/// Outcome of the locked part of a claim.
enum Slot<B> {
    Idle(Gateway<B>),
    Reserved,
    Exhausted,
}

struct PoolInner<C: Connector> {
    name: String,
    connector: C,
    expire: RwLock<Option<Duration>>,
    state: Mutex<PoolState<C::Backend>>,
    next_id: AtomicU64,
    metrics: PoolMetrics,
}

impl<C: Connector> PoolInner<C> {
    fn dispose(&self, gateway: Gateway<C::Backend>) {
        let id = gateway.id();
        self.metrics.record_disposed();
        if let Err(err) = gateway.close() {
            warn!(pool = %self.name, member = id, error = %err, "failed to close member");
        }
    }
}

// Claimed members hold a pool handle, so only idle members remain here.
impl<C: Connector> Drop for PoolInner<C> {
    fn drop(&mut self) {
        let idle = std::mem::take(&mut self.state.get_mut().idle);
        if !idle.is_empty() {
            debug!(pool = %self.name, number = idle.len(), "closing pool members");
        }
        for gateway in idle {
            self.dispose(gateway);
        }
    }
}

/// Bounded, resizable pool of gateways that is itself a `Memory`.
pub struct GatewayPool<C: Connector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for GatewayPool<C> {
    fn clone(&self) -> Self {
        GatewayPool {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> GatewayPool<C> {
    /// Creates a pool and opens `config.initial_size()` members.
    ///
    /// # Errors
    /// Returns `MemoError::InvalidLimits` when `lower_limit > upper_limit`,
    /// or the connector's error when an initial member cannot be opened.
    pub fn new(connector: C, config: PoolConfig) -> MemoResult<Self> {
        if config.lower_limit > config.upper_limit {
            return Err(MemoError::InvalidLimits {
                lower: config.lower_limit,
                upper: config.upper_limit,
            });
        }

        let initial = config.initial_size();
        let pool = GatewayPool {
            inner: Arc::new(PoolInner {
                name: config.name,
                connector,
                expire: RwLock::new(normalize_expire(config.expire)),
                state: Mutex::new(PoolState {
                    idle: Vec::with_capacity(config.upper_limit.min(1024)),
                    claimed: 0,
                    lower_limit: config.lower_limit,
                    upper_limit: config.upper_limit,
                }),
                next_id: AtomicU64::new(1),
                metrics: PoolMetrics::default(),
            }),
        };

        // On failure, dropping `pool` closes the members opened so far.
        pool.grow(initial)?;
        info!(
            pool = %pool.inner.name,
            members = pool.count(),
            lower = config.lower_limit,
            upper = config.upper_limit,
            "memory pool ready"
        );
        Ok(pool)
    }

    /// Name carried on log events.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of idle members currently in the pool.
    pub fn count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Number of members currently held by callers.
    pub fn claimed(&self) -> usize {
        self.inner.state.lock().claimed
    }

    /// Current `(lower_limit, upper_limit)`.
    pub fn limits(&self) -> (usize, usize) {
        let state = self.inner.state.lock();
        (state.lower_limit, state.upper_limit)
    }

    /// Changes the bounds. Existing members are not closed eagerly; a pool
    /// above its new upper bound drains as members are released.
    pub fn set_limits(&self, lower_limit: usize, upper_limit: usize) -> MemoResult<()> {
        if lower_limit > upper_limit {
            return Err(MemoError::InvalidLimits {
                lower: lower_limit,
                upper: upper_limit,
            });
        }
        let mut state = self.inner.state.lock();
        state.lower_limit = lower_limit;
        state.upper_limit = upper_limit;
        debug!(pool = %self.inner.name, lower_limit, upper_limit, "pool limits changed");
        Ok(())
    }

    /// Opens up to `number` members and adds them to the pool.
    ///
    /// Growth stops at `upper_limit` (idle plus claimed). Returns how many
    /// members were added.
    ///
    /// # Errors
    /// Returns the connector's error if a connect fails; members opened before
    /// the failure are still added.
    pub fn grow(&self, number: usize) -> MemoResult<usize> {
        let wanted = number.min(self.inner.state.lock().room());
        if wanted == 0 {
            return Ok(0);
        }

        debug!(pool = %self.inner.name, number = wanted, "adding members to the pool");
        let mut opened = Vec::with_capacity(wanted);
        let mut failure = None;
        for _ in 0..wanted {
            match self.open_member() {
                Ok(gateway) => opened.push(gateway),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        // Concurrent growth may have used the room while we were connecting.
        let (added, surplus) = {
            let mut state = self.inner.state.lock();
            let keep = opened.len().min(state.room());
            let surplus = opened.split_off(keep);
            state.idle.extend(opened);
            (keep, surplus)
        };
        for gateway in surplus {
            self.dispose(gateway);
        }

        match failure {
            Some(err) => {
                warn!(pool = %self.inner.name, added, error = %err, "pool growth interrupted");
                Err(err)
            }
            None => Ok(added),
        }
    }

    /// Removes and closes up to `number` idle members.
    ///
    /// Never fails: shrinking past empty stops at zero. Returns how many
    /// members were removed.
    pub fn shrink(&self, number: usize) -> usize {
        let removed = {
            let mut state = self.inner.state.lock();
            let keep = state.idle.len().saturating_sub(number);
            state.idle.split_off(keep)
        };

        let count = removed.len();
        if count > 0 {
            debug!(pool = %self.inner.name, number = count, "deleting members from the pool");
        }
        for gateway in removed {
            self.dispose(gateway);
        }
        count
    }

    /// Takes exclusive hold of one member.
    ///
    /// # Errors
    /// Returns `MemoError::PoolExhausted` when no member is idle and the pool
    /// is at `upper_limit`, or the connector's error when an on-demand open
    /// fails.
    pub fn claim(&self) -> MemoResult<PooledGateway<C>> {
        let deficit = {
            let state = self.inner.state.lock();
            state.lower_limit.saturating_sub(state.idle.len())
        };
        if deficit > 0 {
            // A failed refill is not fatal while a member is still idle.
            if let Err(err) = self.grow(deficit) {
                warn!(pool = %self.inner.name, error = %err, "could not refill pool to its lower limit");
            }
        }

        let slot = {
            let mut state = self.inner.state.lock();
            match state.idle.pop() {
                Some(gateway) => {
                    state.claimed += 1;
                    Slot::Idle(gateway)
                }
                None if state.room() > 0 => {
                    state.claimed += 1;
                    Slot::Reserved
                }
                None => Slot::Exhausted,
            }
        };

        let (gateway, on_demand) = match slot {
            Slot::Idle(gateway) => (gateway, false),
            Slot::Reserved => match self.open_member() {
                Ok(gateway) => (gateway, true),
                Err(err) => {
                    self.unreserve();
                    return Err(err);
                }
            },
            Slot::Exhausted => {
                self.inner.metrics.record_exhausted();
                warn!(pool = %self.inner.name, "memory pool exhausted");
                return Err(MemoError::PoolExhausted);
            }
        };

        gateway.set_expire(self.expire());
        self.inner.metrics.record_claim(on_demand);
        debug!(pool = %self.inner.name, member = gateway.id(), on_demand, "claimed member");
        Ok(PooledGateway {
            pool: self.clone(),
            gateway: Some(gateway),
        })
    }

    /// Returns a claimed member. Same as dropping the guard.
    pub fn release(&self, member: PooledGateway<C>) {
        drop(member);
    }

    /// Snapshot of the pool's state and counters.
    pub fn stats(&self) -> PoolStats {
        let mut stats = {
            let state = self.inner.state.lock();
            PoolStats {
                idle: state.idle.len(),
                claimed: state.claimed,
                lower_limit: state.lower_limit,
                upper_limit: state.upper_limit,
                ..PoolStats::default()
            }
        };
        self.inner.metrics.fill(&mut stats);
        stats
    }

    fn open_member(&self) -> MemoResult<Gateway<C::Backend>> {
        let backend = self.inner.connector.connect()?;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.metrics.record_opened();
        Ok(Gateway::with_id(id, backend, self.expire()))
    }

    fn unreserve(&self) {
        let mut state = self.inner.state.lock();
        state.claimed = state.claimed.saturating_sub(1);
    }

    fn return_member(&self, gateway: Gateway<C::Backend>) {
        let rejected = {
            let mut state = self.inner.state.lock();
            state.claimed = state.claimed.saturating_sub(1);
            if state.idle.len() < state.upper_limit {
                state.idle.push(gateway);
                None
            } else {
                Some(gateway)
            }
        };

        if let Some(gateway) = rejected {
            debug!(pool = %self.inner.name, member = gateway.id(), "pool full, disposing released member");
            self.dispose(gateway);
        }
    }

    fn dispose(&self, gateway: Gateway<C::Backend>) {
        self.inner.dispose(gateway);
    }

    fn with_member<T>(&self, op: impl FnOnce(&Gateway<C::Backend>) -> MemoResult<T>) -> MemoResult<T> {
        let member = self.claim()?;
        op(&*member)
    }
}

impl<C: Connector> Memory for GatewayPool<C> {
    fn fetch(&self, key: &str) -> MemoResult<Record> {
        self.with_member(|member| member.fetch(key))
    }

    fn store(&self, key: &str, record: &Record) -> MemoResult<()> {
        self.with_member(|member| member.store(key, record))
    }

    fn delete(&self, key: &str) -> MemoResult<()> {
        self.with_member(|member| member.delete(key))
    }

    fn expire_key(&self, key: &str, ttl: Duration) -> MemoResult<()> {
        self.with_member(|member| member.expire_key(key, ttl))
    }

    fn expire(&self) -> Option<Duration> {
        *self.inner.expire.read()
    }

    /// Updates the pool's expiration and every idle member. Claimed members
    /// are synced when they are next claimed.
    fn set_expire(&self, ttl: Option<Duration>) {
        let ttl = normalize_expire(ttl);
        *self.inner.expire.write() = ttl;
        let state = self.inner.state.lock();
        for gateway in &state.idle {
            gateway.set_expire(ttl);
        }
        debug!(pool = %self.inner.name, ?ttl, "pool expiration changed");
    }
}

impl<C: Connector> fmt::Debug for GatewayPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayPool")
            .field("name", &self.inner.name)
            .field("stats", &self.stats())
            .finish()
    }
}

/// RAII guard holding one claimed member; returns it to the pool on drop.
pub struct PooledGateway<C: Connector> {
    pool: GatewayPool<C>,
    gateway: Option<Gateway<C::Backend>>,
}

impl<C: Connector> PooledGateway<C> {
    /// Identifier of the held member.
    pub fn id(&self) -> u64 {
        self.gateway().id()
    }

    fn gateway(&self) -> &Gateway<C::Backend> {
        self.gateway.as_ref().expect("member is held until drop")
    }
}

impl<C: Connector> Deref for PooledGateway<C> {
    type Target = Gateway<C::Backend>;

    fn deref(&self) -> &Self::Target {
        self.gateway()
    }
}

impl<C: Connector> Drop for PooledGateway<C> {
    fn drop(&mut self) {
        if let Some(gateway) = self.gateway.take() {
            self.pool.return_member(gateway);
        }
    }
}

impl<C: Connector> fmt::Debug for PooledGateway<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledGateway")
            .field("pool", &self.pool.inner.name)
            .field("member", &self.gateway.as_ref().map(Gateway::id))
            .finish()
    }
}
