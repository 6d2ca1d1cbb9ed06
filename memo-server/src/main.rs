use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use memo_engine::MemoryEngine;
use memo_server::Server;

const DEFAULT_ADDR: &str = "127.0.0.1:6379";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let addr = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let engine = MemoryEngine::new();
    let expirer = engine.start_expirer(Duration::from_millis(100));

    let server = Server::bind(&addr, engine)
        .await
        .with_context(|| format!("starting memo-server on {addr}"))?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }

    expirer.stop();
    Ok(())
}
