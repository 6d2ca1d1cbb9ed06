// memo-common - Shared contracts for the memo gateway and pool
//
// This crate defines the error taxonomy, the gateway capability traits,
// the NotSet record codec, cache key derivation and the memoizing wrapper.

pub mod error;
pub mod key;
pub mod memoize;
pub mod memory;
pub mod record;
mod shape;

// Re-export for convenience
pub use error::*;
pub use key::*;
pub use memoize::*;
pub use memory::*;
pub use record::*;
