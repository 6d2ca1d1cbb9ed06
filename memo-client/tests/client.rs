use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use memo_client::{Gateway, GatewayPool, MemoError, Memory, PoolConfig, RespBackend, RespConfig};
use memo_common::{Backend, Record};

/// Canned reply a scripted peer sends back.
enum Reply {
    Simple(&'static str),
    Error(&'static str),
    Integer(i64),
    Bulk(Vec<u8>),
    Null,
}

impl Reply {
    fn frame(&self) -> Vec<u8> {
        match self {
            Reply::Simple(text) => format!("+{text}\r\n").into_bytes(),
            Reply::Error(text) => format!("-{text}\r\n").into_bytes(),
            Reply::Integer(value) => format!(":{value}\r\n").into_bytes(),
            Reply::Bulk(data) => {
                let mut frame = format!("${}\r\n", data.len()).into_bytes();
                frame.extend_from_slice(data);
                frame.extend_from_slice(b"\r\n");
                frame
            }
            Reply::Null => b"$-1\r\n".to_vec(),
        }
    }
}

/// Scripted peer: accepts one connection per entry in `sessions`, answers
/// that many commands through `script`, then hangs up. `script` gets the
/// command's index across all sessions.
fn scripted_peer(sessions: Vec<usize>, script: fn(usize, Vec<Vec<u8>>) -> Reply) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();

    thread::spawn(move || {
        let mut seen = 0;
        for budget in sessions {
            let (mut stream, _) = listener.accept().expect("accept");
            stream.set_read_timeout(Some(Duration::from_secs(2))).expect("timeout");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            for _ in 0..budget {
                let command = next_command(&mut reader).expect("command");
                stream.write_all(&script(seen, command).frame()).expect("reply");
                seen += 1;
            }
        }
    });

    addr
}

fn invalid(what: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, what.to_string())
}

fn header(reader: &mut impl BufRead, marker: char) -> std::io::Result<usize> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    line.strip_prefix(marker)
        .and_then(|rest| rest.strip_suffix("\r\n"))
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| invalid("bad header"))
}

fn next_command(reader: &mut impl BufRead) -> std::io::Result<Vec<Vec<u8>>> {
    let count = header(reader, '*')?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        let len = header(reader, '$')?;
        let mut data = vec![0u8; len + 2];
        reader.read_exact(&mut data)?;
        if !data.ends_with(b"\r\n") {
            return Err(invalid("missing crlf"));
        }
        data.truncate(len);
        args.push(data);
    }
    Ok(args)
}

fn config_for(addr: String) -> RespConfig {
    RespConfig {
        addr,
        connect_timeout: Some(Duration::from_secs(1)),
        read_timeout: Some(Duration::from_secs(1)),
        write_timeout: Some(Duration::from_secs(1)),
    }
}

#[test]
fn backend_speaks_get_set_del() {
    let addr = scripted_peer(vec![4], |idx, args| match idx {
        0 => {
            assert_eq!(args, vec![b"SET".to_vec(), b"key".to_vec(), b"value".to_vec(), b"PX".to_vec(), b"1500".to_vec()]);
            Reply::Simple("OK")
        }
        1 => {
            assert_eq!(args, vec![b"GET".to_vec(), b"key".to_vec()]);
            Reply::Bulk(b"value".to_vec())
        }
        2 => {
            assert_eq!(args, vec![b"GET".to_vec(), b"other".to_vec()]);
            Reply::Null
        }
        _ => {
            assert_eq!(args, vec![b"DEL".to_vec(), b"key".to_vec()]);
            Reply::Integer(1)
        }
    });

    let mut backend = RespBackend::connect(config_for(addr)).expect("connect");
    backend.set(b"key", b"value", Some(Duration::from_millis(1500))).expect("set");
    assert_eq!(backend.get(b"key").expect("get"), Some(b"value".to_vec()));
    assert_eq!(backend.get(b"other").expect("get"), None);
    assert_eq!(backend.delete(b"key").expect("delete"), 1);
}

#[test]
fn sub_millisecond_ttl_rounds_up() {
    let addr = scripted_peer(vec![1], |_, args| {
        assert_eq!(args[3], b"PX");
        assert_eq!(args[4], b"1");
        Reply::Simple("OK")
    });

    let mut backend = RespBackend::connect(config_for(addr)).expect("connect");
    backend.set(b"key", b"v", Some(Duration::from_micros(10))).expect("set");
}

#[test]
fn gateway_stores_tagged_records() {
    let addr = scripted_peer(vec![3], |idx, args| match idx {
        0 => {
            assert_eq!(args[0], b"SET");
            assert_eq!(args[1], b"answer");
            assert_eq!(args[2], Record::encode(&42).unwrap().to_bytes());
            assert_eq!(args.len(), 3);
            Reply::Simple("OK")
        }
        1 => {
            assert_eq!(args[1], b"answer");
            Reply::Bulk(Record::encode(&42).unwrap().to_bytes())
        }
        _ => {
            assert_eq!(args[1], b"nothing");
            Reply::Bulk(Record::NotSet.to_bytes())
        }
    });

    let gateway = Gateway::connect(&config_for(addr), None).expect("connect");
    gateway.set("answer", &42).expect("set");
    assert_eq!(gateway.get::<i32>("answer").expect("get"), 42);
    assert_eq!(gateway.get::<Option<i32>>("nothing").expect("get"), None);
}

#[test]
fn gateway_maps_missing_and_zero_deletes_to_key_not_found() {
    let addr = scripted_peer(vec![2], |idx, _| {
        if idx == 0 {
            Reply::Null
        } else {
            Reply::Integer(0)
        }
    });

    let gateway = Gateway::connect(&config_for(addr), None).expect("connect");
    assert!(gateway.get::<String>("gone").unwrap_err().is_not_found());
    assert!(gateway.delete("gone").unwrap_err().is_not_found());
}

#[test]
fn error_reply_keeps_connection() {
    let addr = scripted_peer(vec![2], |idx, _| {
        if idx == 0 {
            Reply::Error("ERR wrong kind")
        } else {
            Reply::Simple("PONG")
        }
    });

    let mut backend = RespBackend::connect(config_for(addr)).expect("connect");
    let err = backend.get(b"key").unwrap_err();
    assert!(matches!(err, MemoError::Server { ref message } if message == "ERR wrong kind"));
    assert!(backend.is_connected());
    backend.ping().expect("ping");
}

#[test]
fn reconnects_after_dropped_connection() {
    let addr = scripted_peer(vec![1, 1], |idx, args| {
        assert_eq!(args[0], b"GET");
        Reply::Bulk(format!("reply-{idx}").into_bytes())
    });

    let mut backend = RespBackend::connect(config_for(addr)).expect("connect");
    assert_eq!(backend.get(b"key").expect("get"), Some(b"reply-0".to_vec()));

    // The first session hangs up after one command.
    assert!(backend.get(b"key").is_err());
    assert!(!backend.is_connected());

    assert_eq!(backend.get(b"key").expect("get"), Some(b"reply-1".to_vec()));
    assert!(backend.is_connected());
}

#[test]
fn unreachable_backend_fails_pool_creation() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    drop(listener);

    let config = PoolConfig {
        lower_limit: 1,
        upper_limit: 2,
        ..PoolConfig::default()
    };
    let err = GatewayPool::new(config_for(addr), config).unwrap_err();
    assert!(matches!(err, MemoError::BackendUnavailable(_)));
}

#[test]
fn pool_over_resp_releases_after_each_call() {
    let addr = scripted_peer(vec![3], |idx, args| match idx {
        0 => {
            assert_eq!(&args[..2], &[b"SET".to_vec(), b"k".to_vec()]);
            assert_eq!(args[3], b"PX");
            assert_eq!(args[4], b"2000");
            Reply::Simple("OK")
        }
        1 => Reply::Bulk(Record::encode("v").unwrap().to_bytes()),
        _ => Reply::Integer(1),
    });

    let config = PoolConfig {
        lower_limit: 1,
        upper_limit: 1,
        expire: Some(Duration::from_secs(2)),
        ..PoolConfig::default()
    };
    let pool = GatewayPool::new(config_for(addr), config).expect("pool");
    assert_eq!(pool.count(), 1);

    pool.set("k", "v").expect("set");
    assert_eq!(pool.get::<String>("k").expect("get"), "v");
    pool.delete("k").expect("delete");
    assert_eq!(pool.count(), 1);
    assert_eq!(pool.claimed(), 0);
    assert_eq!(pool.stats().opened, 1);
}

#[test]
fn expire_key_sends_pexpire() {
    let addr = scripted_peer(vec![3], |idx, args| match idx {
        0 => {
            assert_eq!(args, vec![b"PEXPIRE".to_vec(), b"key".to_vec(), b"1500".to_vec()]);
            Reply::Integer(1)
        }
        1 => {
            assert_eq!(args[1], b"gone");
            Reply::Integer(0)
        }
        _ => {
            assert_eq!(args[0], b"SET");
            assert_eq!(args[4], u64::MAX.to_string().as_bytes());
            Reply::Simple("OK")
        }
    });

    let gateway = Gateway::connect(&config_for(addr), None).expect("connect");
    gateway.expire_key("key", Duration::from_millis(1500)).expect("expire");
    assert!(gateway.expire_key("gone", Duration::from_secs(1)).unwrap_err().is_not_found());

    // Deadlines beyond u64 milliseconds saturate instead of overflowing.
    gateway.set_expire(Some(Duration::MAX));
    gateway.set("key", &1).expect("set");
}

#[test]
fn zero_timeouts_are_left_unset() {
    let addr = scripted_peer(vec![1], |_, args| {
        assert_eq!(args, vec![b"PING".to_vec()]);
        Reply::Simple("PONG")
    });

    let config = RespConfig {
        addr,
        connect_timeout: Some(Duration::ZERO),
        read_timeout: Some(Duration::ZERO),
        write_timeout: Some(Duration::ZERO),
    };
    let mut backend = RespBackend::connect(config).expect("connect");
    backend.ping().expect("ping");
}
