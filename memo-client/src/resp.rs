//! # RESP2 Encoding and Parsing
//!
//! Purpose: Frame commands for a Redis-compatible backend and parse its
//! replies, reusing caller-provided buffers.
//!
//! ## Design Principles
//! 1. **Top-Down Parsing**: Replies are parsed recursively with no extra state.
//! 2. **Buffer Reuse**: Callers own the line and write buffers.
//! 3. **Binary-Safe**: Bulk strings are raw bytes.
//! 4. **Fail Fast**: Invalid framing returns `MemoError::Protocol` immediately.

use std::io::{BufRead, Read};

use memo_common::{MemoError, MemoResult};

/// Nested arrays deeper than this are rejected as malformed.
const MAX_DEPTH: usize = 8;

/// Largest bulk string accepted from a server (Redis' default
/// `proto-max-bulk-len`).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// RESP reply value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// +OK or +PONG style replies.
    Simple(Vec<u8>),
    /// -ERR ... replies.
    Error(Vec<u8>),
    /// :123 replies.
    Integer(i64),
    /// $... bulk strings, with None for null.
    Bulk(Option<Vec<u8>>),
    /// *... arrays.
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Converts an error reply into `MemoError::Server`, passing others through.
    pub fn into_result(self) -> MemoResult<RespValue> {
        match self {
            RespValue::Error(message) => Err(MemoError::Server {
                message: String::from_utf8_lossy(&message).into_owned(),
            }),
            other => Ok(other),
        }
    }
}

/// Encodes a RESP2 array command into `out`.
pub fn encode_command(args: &[&[u8]], out: &mut Vec<u8>) {
    push_header(out, b'*', args.len());
    for arg in args {
        push_header(out, b'$', arg.len());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

/// Reads one RESP reply from `reader`.
pub fn read_response<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> MemoResult<RespValue> {
    read_value(reader, line_buf, 0)
}

fn read_value<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>, depth: usize) -> MemoResult<RespValue> {
    if depth > MAX_DEPTH {
        return Err(MemoError::Protocol);
    }

    read_line(reader, line_buf)?;
    let (&kind, rest) = line_buf.split_first().ok_or(MemoError::Protocol)?;
    match kind {
        b'+' => Ok(RespValue::Simple(rest.to_vec())),
        b'-' => Ok(RespValue::Error(rest.to_vec())),
        b':' => Ok(RespValue::Integer(parse_i64(rest)?)),
        b'$' => {
            let len = parse_i64(rest)?;
            read_bulk(reader, len)
        }
        b'*' => {
            let len = parse_i64(rest)?;
            if len < 0 {
                return Ok(RespValue::Array(Vec::new()));
            }
            let mut items = Vec::with_capacity(len.min(64) as usize);
            for _ in 0..len {
                items.push(read_value(reader, line_buf, depth + 1)?);
            }
            Ok(RespValue::Array(items))
        }
        _ => Err(MemoError::Protocol),
    }
}

fn read_bulk<R: BufRead>(reader: &mut R, len: i64) -> MemoResult<RespValue> {
    if len < 0 {
        return Ok(RespValue::Bulk(None));
    }
    let len = usize::try_from(len).map_err(|_| MemoError::Protocol)?;
    if len > MAX_BULK_LEN {
        return Err(MemoError::Protocol);
    }

    // Grow with the bytes that actually arrive rather than the announced length.
    let mut data = Vec::with_capacity(len.min(64 * 1024));
    reader.by_ref().take(len as u64).read_to_end(&mut data)?;
    if data.len() != len {
        return Err(MemoError::Protocol);
    }

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if &crlf != b"\r\n" {
        return Err(MemoError::Protocol);
    }
    Ok(RespValue::Bulk(Some(data)))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> MemoResult<()> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Err(MemoError::Protocol);
    }
    if !buf.ends_with(b"\r\n") {
        return Err(MemoError::Protocol);
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> MemoResult<i64> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(MemoError::Protocol)
}

fn push_header(out: &mut Vec<u8>, kind: u8, len: usize) {
    out.push(kind);
    out.extend_from_slice(len.to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(bytes: &[u8]) -> MemoResult<RespValue> {
        let mut reader = Cursor::new(bytes.to_vec());
        let mut line = Vec::new();
        read_response(&mut reader, &mut line)
    }

    #[test]
    fn encodes_command() {
        let mut buf = Vec::new();
        encode_command(&[b"SET", b"key", b"value"], &mut buf);
        assert_eq!(&buf, b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n");
    }

    #[test]
    fn parses_scalar_replies() {
        assert_eq!(parse(b"+OK\r\n").unwrap(), RespValue::Simple(b"OK".to_vec()));
        assert_eq!(parse(b":-2\r\n").unwrap(), RespValue::Integer(-2));
        assert_eq!(parse(b"$5\r\nhello\r\n").unwrap(), RespValue::Bulk(Some(b"hello".to_vec())));
        assert_eq!(parse(b"$-1\r\n").unwrap(), RespValue::Bulk(None));
    }

    #[test]
    fn bulk_strings_are_binary_safe() {
        assert_eq!(parse(b"$4\r\n\x00\r\n\x01\r\n").unwrap(), RespValue::Bulk(Some(vec![0, b'\r', b'\n', 1])));
    }

    #[test]
    fn parses_arrays() {
        let value = parse(b"*2\r\n:1\r\n$1\r\na\r\n").unwrap();
        assert_eq!(
            value,
            RespValue::Array(vec![RespValue::Integer(1), RespValue::Bulk(Some(b"a".to_vec()))])
        );
    }

    #[test]
    fn error_replies_become_server_errors() {
        let err = parse(b"-ERR boom\r\n").unwrap().into_result().unwrap_err();
        assert!(matches!(err, MemoError::Server { message } if message == "ERR boom"));
    }

    #[test]
    fn rejects_bad_framing() {
        assert!(matches!(parse(b"+OK\n"), Err(MemoError::Protocol)));
        assert!(matches!(parse(b"?what\r\n"), Err(MemoError::Protocol)));
        assert!(matches!(parse(b":12x\r\n"), Err(MemoError::Protocol)));
        assert!(matches!(parse(b""), Err(MemoError::Protocol)));
    }

    #[test]
    fn bulk_length_is_bounded() {
        let oversized = format!("${}\r\n", MAX_BULK_LEN + 1);
        assert!(matches!(parse(oversized.as_bytes()), Err(MemoError::Protocol)));
        assert!(matches!(parse(b"$9223372036854775807\r\n"), Err(MemoError::Protocol)));
        assert!(matches!(parse(b"$10\r\nshort\r\n"), Err(MemoError::Protocol)));
    }
}
