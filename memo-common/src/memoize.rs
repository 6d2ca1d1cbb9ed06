//! # Memoizing Wrapper
//!
//! Purpose: Cache the results of an expensive computation in any `Memory`,
//! keyed by the computation's name and arguments.
//!
//! ## Design Principles
//! 1. **Decorator Pattern**: `Memoized` intercepts calls and keeps the wrapped
//!    function's argument and result types.
//! 2. **Miss Is Not an Error**: Only `KeyNotFound` falls through to computing;
//!    every other gateway failure propagates.
//! 3. **Absence Is Cached**: `None` results are stored as `NotSet` and served
//!    from the cache like any other value.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::MemoResult;
use crate::key::{CacheKey, KeyArgs, KeyCodec};
use crate::memory::Memory;

/// A computation whose results are cached in a `Memory`.
pub struct Memoized<M, F, A, R> {
    name: String,
    memory: M,
    codec: KeyCodec,
    func: F,
    _call: PhantomData<fn(A) -> R>,
}

impl<M, F, A, R> Memoized<M, F, A, R>
where
    M: Memory,
    F: Fn(A) -> R,
    A: KeyArgs,
    R: Serialize + DeserializeOwned,
{
    /// Wraps `func`, caching under keys qualified by `name`.
    pub fn new(name: impl Into<String>, memory: M, func: F) -> Self {
        Memoized {
            name: name.into(),
            memory,
            codec: KeyCodec::new(),
            func,
            _call: PhantomData,
        }
    }

    /// Replaces the key codec (e.g. to change the digest).
    pub fn with_codec(mut self, codec: KeyCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Name used as the computation's identity in cache keys.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Memory holding the cached results.
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Cache key for a call with `args`.
    pub fn key_for(&self, args: &A) -> CacheKey {
        self.codec.derive(&self.name, args)
    }

    /// Returns the cached result for `args`, computing and storing it on a miss.
    pub fn call(&self, args: A) -> MemoResult<R> {
        let key = self.key_for(&args);
        debug!(name = %self.name, key = %key, "calling memoized value");

        match self.memory.get::<R>(key.as_str()) {
            Ok(value) => return Ok(value),
            Err(err) if err.is_not_found() => {
                debug!(name = %self.name, key = %key, "no cached value, computing");
            }
            Err(err) => return Err(err),
        }

        let value = (self.func)(args);
        self.memory.set(key.as_str(), &value)?;
        Ok(value)
    }

    /// Drops the cached result for `args`. Returns false when nothing was cached.
    pub fn forget(&self, args: &A) -> MemoResult<bool> {
        let key = self.key_for(args);
        match self.memory.delete(key.as_str()) {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Converts the wrapper into a plain closure with the same call shape.
    pub fn into_fn(self) -> impl Fn(A) -> MemoResult<R> {
        move |args| self.call(args)
    }
}

impl<M, F, A, R> fmt::Debug for Memoized<M, F, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Wraps `func` so its results are cached in `memory`.
pub fn memoize<M, F, A, R>(name: impl Into<String>, memory: M, func: F) -> Memoized<M, F, A, R>
where
    M: Memory,
    F: Fn(A) -> R,
    A: KeyArgs,
    R: Serialize + DeserializeOwned,
{
    Memoized::new(name, memory, func)
}
