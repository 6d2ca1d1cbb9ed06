//! Pool and RESP binding configuration.
//!
//! Both structs deserialize from JSON with every field optional; durations
//! are written as whole seconds (`expire_secs`) or milliseconds (`*_ms`).
//! A zero timeout means "no timeout", like a zero expiration.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Configuration for a [`GatewayPool`](crate::GatewayPool).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Name carried as the `pool` field on log events.
    pub name: String,
    /// Low-water mark: claims refill the pool up to this many idle members.
    pub lower_limit: usize,
    /// Upper bound on members, idle and claimed together.
    pub upper_limit: usize,
    /// Members opened at construction; defaults to the midpoint of the limits.
    pub initial: Option<usize>,
    /// Expiration applied to writes; `None` or zero disables expiry.
    #[serde(rename = "expire_secs", deserialize_with = "de_secs")]
    pub expire: Option<Duration>,
}

impl PoolConfig {
    /// Number of members to open at construction, clamped to `upper_limit`.
    pub fn initial_size(&self) -> usize {
        self.initial
            .unwrap_or((self.lower_limit + self.upper_limit) / 2)
            .min(self.upper_limit)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            name: "memory-pool".to_string(),
            lower_limit: 1,
            upper_limit: 100,
            initial: None,
            expire: None,
        }
    }
}

/// Connection parameters for a Redis-compatible backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RespConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Optional TCP connect timeout.
    #[serde(rename = "connect_timeout_ms", deserialize_with = "de_millis")]
    pub connect_timeout: Option<Duration>,
    /// Optional TCP read timeout.
    #[serde(rename = "read_timeout_ms", deserialize_with = "de_millis")]
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    #[serde(rename = "write_timeout_ms", deserialize_with = "de_millis")]
    pub write_timeout: Option<Duration>,
}

impl RespConfig {
    /// Creates a configuration for `addr` with no timeouts.
    pub fn new(addr: impl Into<String>) -> Self {
        RespConfig {
            addr: addr.into(),
            ..RespConfig::default()
        }
    }
}

impl Default for RespConfig {
    fn default() -> Self {
        RespConfig {
            addr: "127.0.0.1:6379".to_string(),
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

fn de_secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
}

fn de_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    Ok(Option::<u64>::deserialize(deserializer)?
        .filter(|&millis| millis > 0)
        .map(Duration::from_millis))
}
