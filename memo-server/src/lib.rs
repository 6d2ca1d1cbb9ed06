//! # Memo Server
//!
//! A small Redis-compatible TCP server over `MemoryEngine`, serving the
//! subset of commands the RESP backend binding issues plus a few
//! inspection commands.

pub mod protocol;
pub mod server;

pub use protocol::{RespError, RespParser};
pub use server::{handle_connection, Server, ServerError};
