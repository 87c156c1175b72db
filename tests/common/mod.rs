use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use notifier_sync::server;
use notifier_sync::SyncConfig;
use notifier_sync::SyncEngine;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const WAIT_FOR_DELIVERY_IN_SEC: u64 = 5;

/// Poll interval small enough to keep fallback tests quick
pub const POLL_INTERVAL_IN_MS: u64 = 250;

pub struct TestServer {
    pub addr: SocketAddr,
    pub engine: Arc<SyncEngine>,
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }
}

pub fn test_config() -> SyncConfig {
    let mut config = SyncConfig::default();
    config.delivery.poll_interval_ms = POLL_INTERVAL_IN_MS;
    config.delivery.reconnect_backoff_ms = 200;
    config
}

/// Full route set on an ephemeral port.
pub async fn start_server() -> TestServer {
    let engine = SyncEngine::new(test_config()).expect("engine");
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let (addr, server) = server::bind(
        "127.0.0.1:0".parse().unwrap(),
        server::routes(engine.clone()),
        shutdown_rx,
    )
    .expect("bind");

    TestServer {
        addr,
        engine,
        shutdown_tx,
        handle: tokio::spawn(server),
    }
}

/// Polling endpoint only: the push route is missing, as behind a proxy that
/// refuses WebSocket upgrades.
pub async fn start_poll_only_server() -> TestServer {
    let engine = SyncEngine::new(test_config()).expect("engine");
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let (addr, server) = server::bind(
        "127.0.0.1:0".parse().unwrap(),
        server::poll_routes(engine.clone()),
        shutdown_rx,
    )
    .expect("bind");

    TestServer {
        addr,
        engine,
        shutdown_tx,
        handle: tokio::spawn(server),
    }
}

pub fn delivery_timeout() -> Duration {
    Duration::from_secs(WAIT_FOR_DELIVERY_IN_SEC)
}
