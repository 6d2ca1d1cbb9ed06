//! # RESP Backend Binding
//!
//! Purpose: Bind the `Backend` capability to a Redis-compatible server over
//! one TCP connection.
//!
//! ## Design Principles
//! 1. **Buffer Reuse**: Each connection keeps its own line and write buffers.
//! 2. **Self-Healing**: An IO or framing failure drops the socket; the next
//!    call reconnects, so a half-read reply never leaks into a later command.
//! 3. **Enumerated Surface**: Only GET/SET/DEL/PEXPIRE/PING are exposed.

use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use memo_common::{Backend, Connector, MemoError, MemoResult};

use crate::config::RespConfig;
use crate::resp::{encode_command, read_response, RespValue};

/// Single TCP connection with reusable buffers.
struct Connection {
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl Connection {
    fn open(config: &RespConfig) -> MemoResult<Self> {
        let addr = resolve(&config.addr)?;
        // The socket API rejects zero timeouts; treat them as unset.
        let timeout = |value: Option<Duration>| value.filter(|value| !value.is_zero());
        let stream = match timeout(config.connect_timeout) {
            Some(limit) => TcpStream::connect_timeout(&addr, limit)?,
            None => TcpStream::connect(addr)?,
        };
        stream.set_read_timeout(timeout(config.read_timeout))?;
        stream.set_write_timeout(timeout(config.write_timeout))?;
        // Small request/reply payloads; Nagle only adds latency here.
        stream.set_nodelay(true)?;

        Ok(Connection {
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
        })
    }

    fn exec(&mut self, args: &[&[u8]]) -> MemoResult<RespValue> {
        self.write_buf.clear();
        encode_command(args, &mut self.write_buf);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;

        read_response(&mut self.reader, &mut self.line_buf)
    }

    fn shutdown(self) -> MemoResult<()> {
        match self.reader.get_ref().shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn resolve(addr: &str) -> MemoResult<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|_| MemoError::InvalidAddress(addr.to_string()))?
        .next()
        .ok_or_else(|| MemoError::InvalidAddress(addr.to_string()))
}

/// `Backend` speaking RESP2 to a Redis-compatible server.
pub struct RespBackend {
    config: RespConfig,
    conn: Option<Connection>,
}

impl RespBackend {
    /// Opens a connection using `config`.
    ///
    /// # Errors
    /// Returns `MemoError::InvalidAddress` for unresolvable addresses and
    /// `MemoError::BackendUnavailable` when the connect fails.
    pub fn connect(config: RespConfig) -> MemoResult<Self> {
        let conn = Connection::open(&config)?;
        debug!(addr = %config.addr, "opened backend connection");
        Ok(RespBackend {
            config,
            conn: Some(conn),
        })
    }

    /// Returns true while a socket is open.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Round-trips a PING.
    pub fn ping(&mut self) -> MemoResult<()> {
        match self.exec(&[b"PING"])? {
            RespValue::Simple(_) | RespValue::Bulk(Some(_)) => Ok(()),
            _ => Err(MemoError::UnexpectedResponse),
        }
    }

    fn exec(&mut self, args: &[&[u8]]) -> MemoResult<RespValue> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                debug!(addr = %self.config.addr, "reconnecting backend");
                Connection::open(&self.config)?
            }
        };

        let response = conn.exec(args);
        if response.is_ok() {
            self.conn = Some(conn);
        } else {
            debug!(addr = %self.config.addr, "dropping broken backend connection");
        }
        response?.into_result()
    }
}

impl Backend for RespBackend {
    fn get(&mut self, key: &[u8]) -> MemoResult<Option<Vec<u8>>> {
        match self.exec(&[b"GET", key])? {
            RespValue::Bulk(data) => Ok(data),
            _ => Err(MemoError::UnexpectedResponse),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8], ttl: Option<Duration>) -> MemoResult<()> {
        let response = match ttl {
            Some(ttl) => {
                let millis = px_millis(ttl);
                self.exec(&[b"SET", key, value, b"PX", millis.as_bytes()])?
            }
            None => self.exec(&[b"SET", key, value])?,
        };
        match response {
            RespValue::Simple(_) => Ok(()),
            _ => Err(MemoError::UnexpectedResponse),
        }
    }

    fn delete(&mut self, key: &[u8]) -> MemoResult<u64> {
        match self.exec(&[b"DEL", key])? {
            RespValue::Integer(count) => Ok(count.max(0) as u64),
            _ => Err(MemoError::UnexpectedResponse),
        }
    }

    fn expire(&mut self, key: &[u8], ttl: Duration) -> MemoResult<bool> {
        let millis = px_millis(ttl);
        match self.exec(&[b"PEXPIRE", key, millis.as_bytes()])? {
            RespValue::Integer(applied) => Ok(applied > 0),
            _ => Err(MemoError::UnexpectedResponse),
        }
    }

    fn close(&mut self) -> MemoResult<()> {
        match self.conn.take() {
            Some(conn) => conn.shutdown(),
            None => Ok(()),
        }
    }
}

// Whole milliseconds, rounded up to 1 and saturating at u64::MAX.
fn px_millis(ttl: Duration) -> String {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1).to_string()
}

impl Connector for RespConfig {
    type Backend = RespBackend;

    fn connect(&self) -> MemoResult<RespBackend> {
        RespBackend::connect(self.clone())
    }
}
