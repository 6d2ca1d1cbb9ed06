use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use memo_client::{memoize, Gateway, GatewayPool, Memory, PoolConfig, RespBackend, RespConfig};
use memo_common::Backend;
use memo_engine::MemoryEngine;
use memo_server::Server;

async fn start_server() -> (RespConfig, MemoryEngine) {
    let engine = MemoryEngine::with_shard_count(4);
    let server = Server::bind("127.0.0.1:0", engine.clone()).await.expect("bind");
    let mut config = RespConfig::new(server.local_addr().to_string());
    config.read_timeout = Some(Duration::from_secs(2));
    config.write_timeout = Some(Duration::from_secs(2));
    tokio::spawn(server.run());
    (config, engine)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backend_commands_against_server() {
    let (config, engine) = start_server().await;

    tokio::task::spawn_blocking(move || {
        let mut backend = RespBackend::connect(config).expect("connect");
        backend.ping().expect("ping");
        backend.set(b"key", b"value", None).expect("set");
        assert_eq!(backend.get(b"key").expect("get"), Some(b"value".to_vec()));
        assert_eq!(backend.delete(b"key").expect("delete"), 1);
        assert_eq!(backend.delete(b"key").expect("delete"), 0);
        assert_eq!(backend.get(b"key").expect("get"), None);
        backend.close().expect("close");
    })
    .await
    .expect("client task");

    assert!(engine.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn gateway_expiry_is_enforced_by_server() {
    let (config, _engine) = start_server().await;

    tokio::task::spawn_blocking(move || {
        let gateway = Gateway::connect(&config, Some(Duration::from_millis(50))).expect("connect");
        gateway.set("short", "lived").expect("set");
        assert_eq!(gateway.get::<String>("short").expect("get"), "lived");
        std::thread::sleep(Duration::from_millis(120));
        assert!(gateway.get::<String>("short").unwrap_err().is_not_found());
    })
    .await
    .expect("client task");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expire_key_over_server() {
    let (config, engine) = start_server().await;

    tokio::task::spawn_blocking(move || {
        let mut backend = RespBackend::connect(config.clone()).expect("connect");
        assert!(!backend.expire(b"absent", Duration::from_secs(1)).expect("expire"));

        let pool_config = PoolConfig {
            lower_limit: 1,
            upper_limit: 2,
            ..PoolConfig::default()
        };
        let pool = GatewayPool::new(config, pool_config).expect("pool");
        pool.set("kept", &1).expect("set");
        pool.set("brief", &2).expect("set");
        pool.expire_key("brief", Duration::from_millis(30)).expect("expire");
        assert!(pool.expire_key("absent", Duration::from_secs(1)).unwrap_err().is_not_found());
        std::thread::sleep(Duration::from_millis(80));

        assert_eq!(pool.get::<i32>("kept").expect("get"), 1);
        assert!(pool.get::<i32>("brief").unwrap_err().is_not_found());
    })
    .await
    .expect("client task");

    assert_eq!(engine.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn huge_expiry_survives_the_server() {
    let (config, engine) = start_server().await;

    tokio::task::spawn_blocking(move || {
        let gateway = Gateway::connect(&config, Some(Duration::from_secs(u64::MAX))).expect("connect");
        gateway.set("k", &1).expect("set");
        gateway.expire_key("k", Duration::MAX).expect("expire");
        assert_eq!(gateway.get::<i32>("k").expect("get"), 1);
    })
    .await
    .expect("client task");

    assert_eq!(engine.ttl(b"k"), memo_engine::TtlStatus::NoExpiry);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pooled_memoization_over_server() {
    let (config, engine) = start_server().await;

    let calls = tokio::task::spawn_blocking(move || {
        let pool_config = PoolConfig {
            name: "server-test".to_string(),
            lower_limit: 1,
            upper_limit: 4,
            ..PoolConfig::default()
        };
        let pool = Arc::new(GatewayPool::new(config, pool_config).expect("pool"));
        let calls = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    let square = memoize("square", &*pool, |(n,): (u32,)| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        n * n
                    });
                    for n in 0..10u32 {
                        // Four workers against four members; claims never exhaust.
                        assert_eq!(square.call((n,)).expect("call"), n * n);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker");
        }

        assert_eq!(pool.claimed(), 0);
        assert!(pool.count() <= 4);
        calls.load(Ordering::SeqCst)
    })
    .await
    .expect("client task");

    // Racing workers may each compute a value before the first write lands.
    assert!((10..=40).contains(&calls));
    assert_eq!(engine.len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_request_closes_connection() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (config, _engine) = start_server().await;
    let mut stream = tokio::net::TcpStream::connect(&config.addr).await.expect("connect");
    stream.write_all(b"HELLO\r\n").await.expect("write");

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.expect("read");
    assert_eq!(reply, b"-ERR protocol error\r\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn quit_acknowledges_and_closes() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (config, _engine) = start_server().await;
    let mut stream = tokio::net::TcpStream::connect(&config.addr).await.expect("connect");
    stream.write_all(b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nQUIT\r\n").await.expect("write");

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.expect("read");
    assert_eq!(reply, b"+PONG\r\n+OK\r\n");
}
