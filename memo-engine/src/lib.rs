//! # memo-engine
//!
//! In-process key/value backend with TTL support. It implements both
//! `Backend` and `Connector`, so a gateway or pool can run entirely in
//! memory for tests, benchmarks, and the development server.

mod memory;

pub use memory::{ExpirationHandle, MemoryEngine, TtlStatus};
