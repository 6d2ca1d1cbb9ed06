//! # TCP Server
//!
//! Accept RESP2 connections, parse commands, and dispatch them to the
//! in-memory engine. This is the Redis-compatible peer the RESP backend
//! binding talks to in development and tests.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use memo_engine::{MemoryEngine, TtlStatus};

use crate::protocol::RespParser;

/// Errors surfaced by the listener.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Listening server bound to one address and one engine.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    engine: MemoryEngine,
}

impl Server {
    /// Binds the listener. Pass port 0 to pick a free port.
    pub async fn bind(addr: impl AsRef<str>, engine: MemoryEngine) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: addr.to_owned(),
            source,
        })?;
        let local_addr = listener.local_addr()?;
        Ok(Server {
            listener,
            local_addr,
            engine,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn engine(&self) -> &MemoryEngine {
        &self.engine
    }

    /// Accepts connections until the task is dropped.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(address = %self.local_addr, "memo-server listening");

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    error!(error = %err, "failed to accept connection");
                    continue;
                }
            };

            debug!(%peer, "connection accepted");
            let engine = self.engine.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_connection(stream, engine).await {
                    warn!(%peer, error = %err, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single TCP client connection.
pub async fn handle_connection(mut stream: TcpStream, engine: MemoryEngine) -> std::io::Result<()> {
    let mut buffer = BytesMut::with_capacity(8 * 1024);
    let mut out = Vec::with_capacity(1024);
    let parser = RespParser::new();

    loop {
        if stream.read_buf(&mut buffer).await? == 0 {
            return Ok(());
        }

        // Answer every complete command in the buffer with one write.
        out.clear();
        let mut close = false;
        loop {
            match parser.parse(&mut buffer) {
                Ok(Some(args)) => {
                    let command = Command::parse(&args);
                    close = matches!(command, Ok(Command::Quit));
                    match command {
                        Ok(command) => command.execute(&engine),
                        Err(message) => Reply::Error(message),
                    }
                    .write_to(&mut out);
                    if close {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    debug!(error = %err, "rejecting malformed request");
                    Reply::Error(err.to_string()).write_to(&mut out);
                    close = true;
                    break;
                }
            }
        }

        stream.write_all(&out).await?;
        if close {
            return Ok(());
        }
    }
}

/// A validated client command borrowing its arguments from the request.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Ping(Option<&'a [u8]>),
    Get(&'a [u8]),
    Set {
        key: &'a [u8],
        value: &'a [u8],
        ttl: Option<Duration>,
    },
    Del(&'a [Vec<u8>]),
    Expire(&'a [u8], Duration),
    Ttl(&'a [u8]),
    Info,
    Quit,
}

impl<'a> Command<'a> {
    fn parse(args: &'a [Vec<u8>]) -> Result<Self, String> {
        let (name, rest) = args.split_first().ok_or_else(|| "empty command".to_string())?;
        let name = String::from_utf8_lossy(name).to_ascii_uppercase();

        let command = match (name.as_str(), rest) {
            ("PING", []) => Command::Ping(None),
            ("PING", [message]) => Command::Ping(Some(message.as_slice())),
            ("GET", [key]) => Command::Get(key),
            ("SET", [key, value]) => Command::Set { key, value, ttl: None },
            ("SET", [key, value, unit, amount]) => {
                let amount = parse_u64(amount)?;
                let ttl = if unit.eq_ignore_ascii_case(b"EX") {
                    Duration::from_secs(amount)
                } else if unit.eq_ignore_ascii_case(b"PX") {
                    Duration::from_millis(amount)
                } else {
                    return Err("unsupported SET options".to_string());
                };
                if ttl.is_zero() {
                    return Err("invalid expire time in SET".to_string());
                }
                Command::Set {
                    key,
                    value,
                    ttl: Some(ttl),
                }
            }
            ("DEL", keys) if !keys.is_empty() => Command::Del(keys),
            ("EXPIRE", [key, seconds]) => Command::Expire(key, Duration::from_secs(parse_u64(seconds)?)),
            ("PEXPIRE", [key, millis]) => Command::Expire(key, Duration::from_millis(parse_u64(millis)?)),
            ("TTL", [key]) => Command::Ttl(key),
            ("INFO", _) => Command::Info,
            ("QUIT", _) => Command::Quit,
            ("PING" | "GET" | "SET" | "DEL" | "EXPIRE" | "PEXPIRE" | "TTL", _) => {
                return Err(format!("wrong number of arguments for {name}"));
            }
            _ => return Err("unknown command".to_string()),
        };
        Ok(command)
    }

    fn execute(self, engine: &MemoryEngine) -> Reply {
        match self {
            Command::Ping(None) => Reply::Simple("PONG"),
            Command::Ping(Some(message)) => Reply::Bulk(message.to_vec()),
            Command::Get(key) => engine.get(key).map_or(Reply::Null, |value| Reply::Bulk(value.to_vec())),
            Command::Set { key, value, ttl } => {
                engine.set(key, value, ttl);
                Reply::Simple("OK")
            }
            Command::Del(keys) => Reply::Integer(keys.iter().filter(|key| engine.delete(key)).count() as i64),
            Command::Expire(key, ttl) => Reply::Integer(i64::from(engine.expire(key, ttl))),
            Command::Ttl(key) => Reply::Integer(match engine.ttl(key) {
                TtlStatus::Missing => -2,
                TtlStatus::NoExpiry => -1,
                TtlStatus::ExpiresIn(remaining) => remaining.as_secs() as i64,
            }),
            Command::Info => Reply::Bulk(format!("role:master\r\nengine:memo\r\nkeys:{}\r\n", engine.len()).into_bytes()),
            Command::Quit => Reply::Simple("OK"),
        }
    }
}

/// RESP2 reply frames the server emits.
#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Simple(&'static str),
    Error(String),
    Integer(i64),
    Bulk(Vec<u8>),
    Null,
}

impl Reply {
    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Reply::Simple(message) => {
                out.push(b'+');
                out.extend_from_slice(message.as_bytes());
            }
            Reply::Error(message) => {
                out.extend_from_slice(b"-ERR ");
                out.extend_from_slice(message.as_bytes());
            }
            Reply::Integer(value) => {
                out.push(b':');
                out.extend_from_slice(value.to_string().as_bytes());
            }
            Reply::Bulk(data) => {
                out.push(b'$');
                out.extend_from_slice(data.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(data);
            }
            Reply::Null => out.extend_from_slice(b"$-1"),
        }
        out.extend_from_slice(b"\r\n");
    }
}

fn parse_u64(arg: &[u8]) -> Result<u64, String> {
    std::str::from_utf8(arg)
        .ok()
        .filter(|text| !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| "invalid integer".to_string())
}
