//! # Memo Gateway Client
//!
//! Purpose: Provide dictionary-like gateways to key/value backends and a
//! bounded pool that multiplexes many gateways behind the same contract.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse backend connections behind one mutex.
//! 2. **Same Contract**: `Gateway` and `GatewayPool` both implement `Memory`.
//! 3. **Scoped Claims**: A claimed member is returned on every exit path.
//! 4. **Protocol Clarity**: The RESP2 binding encodes and parses explicitly.

mod config;
mod connection;
mod gateway;
mod metrics;
mod pool;
mod resp;

pub use config::{PoolConfig, RespConfig};
pub use connection::RespBackend;
pub use gateway::Gateway;
pub use metrics::PoolStats;
pub use pool::{GatewayPool, PooledGateway};

pub use memo_common::{memoize, CallArgs, KeyCodec, MemoError, MemoResult, Memoized, Memory};
