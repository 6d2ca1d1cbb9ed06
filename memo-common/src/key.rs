//! # Cache Key Derivation
//!
//! Purpose: Map a computation's identity and its arguments to a stable,
//! fixed-length cache key.
//!
//! ## Design Principles
//! 1. **Identity First**: The computation name is hashed before any argument,
//!    so two computations never share entries for equal arguments.
//! 2. **Normalized Keywords**: Keyword arguments live in a `BTreeMap`, so the
//!    hash input is sorted by name regardless of call-site order.
//! 3. **Length-Prefixed Fields**: Every field carries its length, so `("12")`
//!    and `("1", "2")` hash differently.
//! 4. **Pluggable Digest**: Any `Fn(&[u8]) -> Vec<u8>` works; SHA-256 by default.
//!
//! ## Hash Input Layout
//!
//! ```text
//! +----------+-----------+---------------+-----------+--------------------+
//! | identity | pos count | pos fields... | kw count  | (name, value)...   |
//! +----------+-----------+---------------+-----------+--------------------+
//! field = len:u64 (LE) + bytes; counts are u64 (LE)
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// Hex-encoded digest identifying one cached call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the key and returns the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Stringified call arguments: ordered positionals and name-sorted keywords.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallArgs {
    positional: Vec<String>,
    keyword: BTreeMap<String, String>,
}

impl CallArgs {
    /// Creates an empty argument list.
    pub fn new() -> Self {
        CallArgs::default()
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl fmt::Display) -> Self {
        self.positional.push(value.to_string());
        self
    }

    /// Sets a keyword argument, replacing any previous value for `name`.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.keyword.insert(name.into(), value.to_string());
        self
    }

    /// Positional arguments in call order.
    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    /// Keyword arguments sorted by name.
    pub fn keyword(&self) -> &BTreeMap<String, String> {
        &self.keyword
    }

    fn write_hash_input(&self, identity: &str, out: &mut Vec<u8>) {
        push_field(out, identity.as_bytes());
        push_count(out, self.positional.len());
        for arg in &self.positional {
            push_field(out, arg.as_bytes());
        }
        push_count(out, self.keyword.len());
        for (name, value) in &self.keyword {
            push_field(out, name.as_bytes());
            push_field(out, value.as_bytes());
        }
    }
}

/// Arguments that can be turned into a cache key.
pub trait KeyArgs {
    fn call_args(&self) -> CallArgs;
}

impl KeyArgs for CallArgs {
    fn call_args(&self) -> CallArgs {
        self.clone()
    }
}

impl KeyArgs for () {
    fn call_args(&self) -> CallArgs {
        CallArgs::new()
    }
}

impl<T: KeyArgs + ?Sized> KeyArgs for &T {
    fn call_args(&self) -> CallArgs {
        (**self).call_args()
    }
}

macro_rules! impl_key_args_for_tuple {
    ($($name:ident),+) => {
        impl<$($name: fmt::Display),+> KeyArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn call_args(&self) -> CallArgs {
                let ($($name,)+) = self;
                CallArgs::new()$(.arg($name))+
            }
        }
    };
}

impl_key_args_for_tuple!(A);
impl_key_args_for_tuple!(A, B);
impl_key_args_for_tuple!(A, B, C);
impl_key_args_for_tuple!(A, B, C, D);
impl_key_args_for_tuple!(A, B, C, D, E);
impl_key_args_for_tuple!(A, B, C, D, E, F);
impl_key_args_for_tuple!(A, B, C, D, E, F, G);
impl_key_args_for_tuple!(A, B, C, D, E, F, G, H);

type HashFn = dyn Fn(&[u8]) -> Vec<u8> + Send + Sync;

/// Derives cache keys with a pluggable digest function.
#[derive(Clone)]
pub struct KeyCodec {
    hasher: Arc<HashFn>,
}

impl KeyCodec {
    /// Creates a codec hashing with SHA-256.
    pub fn new() -> Self {
        Self::with_digest::<Sha256>()
    }

    /// Creates a codec hashing with any `Digest` implementation.
    pub fn with_digest<D: Digest + 'static>() -> Self {
        KeyCodec {
            hasher: Arc::new(|input: &[u8]| D::digest(input).to_vec()),
        }
    }

    /// Creates a codec from an arbitrary bytes-to-digest function.
    ///
    /// The function must be deterministic and return a fixed-size output.
    pub fn with_hasher<F>(hasher: F) -> Self
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        KeyCodec {
            hasher: Arc::new(hasher),
        }
    }

    /// Derives the key for `identity` called with `args`.
    pub fn derive_key(&self, identity: &str, args: &CallArgs) -> CacheKey {
        let mut input = Vec::with_capacity(64);
        args.write_hash_input(identity, &mut input);
        CacheKey(hex::encode((self.hasher)(&input)))
    }

    /// Derives the key for any [`KeyArgs`] value.
    pub fn derive<A: KeyArgs + ?Sized>(&self, identity: &str, args: &A) -> CacheKey {
        self.derive_key(identity, &args.call_args())
    }
}

impl Default for KeyCodec {
    fn default() -> Self {
        KeyCodec::new()
    }
}

impl fmt::Debug for KeyCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCodec").finish_non_exhaustive()
    }
}

/// Derives a key with the default SHA-256 codec.
pub fn derive_key(identity: &str, args: &CallArgs) -> CacheKey {
    KeyCodec::new().derive_key(identity, args)
}

fn push_count(out: &mut Vec<u8>, count: usize) {
    out.extend_from_slice(&(count as u64).to_le_bytes());
}

fn push_field(out: &mut Vec<u8>, data: &[u8]) {
    push_count(out, data.len());
    out.extend_from_slice(data);
}
