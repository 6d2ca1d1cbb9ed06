//! # RESP2 Request Parsing
//!
//! Purpose: Pull complete command arrays out of a connection's read buffer
//! without copying partial frames.
//!
//! ## Design Principles
//! 1. **Incremental**: An incomplete frame leaves the buffer untouched and
//!    returns `Ok(None)`; the caller reads more and retries.
//! 2. **Bounded**: Header lines, argument counts, and bulk lengths are capped
//!    so a hostile peer cannot make the server allocate without limit.
//! 3. **Arrays Only**: Clients send `*N` arrays of `$len` bulk strings.

use bytes::{Buf, BytesMut};
use thiserror::Error;

/// Longest accepted `*N` or `$len` header line, excluding CRLF.
const MAX_HEADER_LEN: usize = 32;

/// Errors raised while parsing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RespError {
    /// Malformed framing.
    #[error("protocol error")]
    Protocol,
    /// A count or length exceeded the configured limits.
    #[error("request too large")]
    TooLarge,
}

/// Parser for client command frames.
#[derive(Debug, Clone)]
pub struct RespParser {
    max_args: usize,
    max_bulk_len: usize,
}

impl RespParser {
    /// Creates a parser with 1024 arguments and 64 MiB bulk strings at most.
    pub fn new() -> Self {
        Self::with_limits(1024, 64 * 1024 * 1024)
    }

    pub fn with_limits(max_args: usize, max_bulk_len: usize) -> Self {
        RespParser { max_args, max_bulk_len }
    }

    /// Removes and returns one complete command from `buf`.
    pub fn parse(&self, buf: &mut BytesMut) -> Result<Option<Vec<Vec<u8>>>, RespError> {
        let mut cursor = 0;
        let count = match read_header(buf, &mut cursor, b'*')? {
            Some(count) => count,
            None => return Ok(None),
        };
        if count > self.max_args {
            return Err(RespError::TooLarge);
        }

        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            let len = match read_header(buf, &mut cursor, b'$')? {
                Some(len) => len,
                None => return Ok(None),
            };
            if len > self.max_bulk_len {
                return Err(RespError::TooLarge);
            }

            let end = cursor + len;
            if buf.len() < end + 2 {
                return Ok(None);
            }
            if &buf[end..end + 2] != b"\r\n" {
                return Err(RespError::Protocol);
            }
            args.push(buf[cursor..end].to_vec());
            cursor = end + 2;
        }

        buf.advance(cursor);
        Ok(Some(args))
    }
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

fn read_header(buf: &[u8], cursor: &mut usize, kind: u8) -> Result<Option<usize>, RespError> {
    let rest = &buf[*cursor..];
    let newline = match rest.iter().position(|&b| b == b'\n') {
        Some(pos) => pos,
        None if rest.len() > MAX_HEADER_LEN + 1 => return Err(RespError::Protocol),
        None => return Ok(None),
    };
    if newline < 2 || newline > MAX_HEADER_LEN + 1 || rest[newline - 1] != b'\r' || rest[0] != kind {
        return Err(RespError::Protocol);
    }

    let value = parse_usize(&rest[1..newline - 1])?;
    *cursor += newline + 1;
    Ok(Some(value))
}

fn parse_usize(digits: &[u8]) -> Result<usize, RespError> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(RespError::Protocol);
    }
    std::str::from_utf8(digits)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(RespError::TooLarge)
}
