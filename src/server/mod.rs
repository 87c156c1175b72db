//! HTTP surface of the engine, served with warp.
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /state/{id}` | polling view of one notifier's change feed |
//! | `GET /ws` | push channel (WebSocket), channels named `state:{id}` |
//! | `GET /notifier-sync.js` | browser runtime |
//! | `GET /metrics` | prometheus text, when enabled |
//!
//! Both delivery paths read the same [`ChangeFeed`](crate::feed::ChangeFeed).

mod poll;
mod push;

#[cfg(test)]
mod server_test;

pub use poll::PollQuery;
pub use poll::PollEvents;

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use crate::client::runtime_script;
use crate::config::DeliveryConfig;
use crate::constants::METRICS_ROUTE;
use crate::constants::PUSH_ROUTE;
use crate::constants::RUNTIME_SCRIPT_ROUTE;
use crate::constants::STATE_ROUTE;
use crate::engine::SyncEngine;
use crate::errors::SystemError;
use crate::metrics::gather_text;
use crate::Result;

fn with_engine(engine: Arc<SyncEngine>) -> impl Filter<Extract = (Arc<SyncEngine>,), Error = Infallible> + Clone {
    warp::any().map(move || engine.clone())
}

/// Every route the engine serves.
pub fn routes(engine: Arc<SyncEngine>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let metrics_enabled = engine.config().monitoring.metrics_enabled;
    let engine_config = engine.config().delivery.clone();
    poll_routes(engine.clone())
        .or(push_routes(engine))
        .or(script_route(&engine_config))
        .or(metrics_route(metrics_enabled))
}

/// `GET /state/{notifierID}[?listener=..][&since=..]`
pub fn poll_routes(engine: Arc<SyncEngine>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path(STATE_ROUTE)
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<PollQuery>())
        .and(with_engine(engine))
        .and_then(poll::poll_handler)
}

/// `GET /ws` upgraded to a push session.
pub fn push_routes(engine: Arc<SyncEngine>) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path(PUSH_ROUTE)
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_engine(engine))
        .map(|ws: warp::ws::Ws, engine: Arc<SyncEngine>| {
            ws.on_upgrade(move |socket| push::run_session(socket, engine))
        })
}

/// Browser runtime, configured with the engine's delivery timings.
pub fn script_route(config: &DeliveryConfig) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let script = runtime_script(config);
    warp::path(RUNTIME_SCRIPT_ROUTE)
        .and(warp::path::end())
        .and(warp::get())
        .map(move || {
            warp::reply::with_header(
                script.clone(),
                "content-type",
                "application/javascript; charset=utf-8",
            )
        })
}

pub fn metrics_route(enabled: bool) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path(METRICS_ROUTE)
        .and(warp::path::end())
        .and(warp::get())
        .and_then(move || async move {
            if enabled {
                Ok(gather_text())
            } else {
                Err(warp::reject::not_found())
            }
        })
}

/// Binds `filter` on `addr`. The returned future serves until
/// `shutdown_signal` fires or its sender is dropped.
pub fn bind<F, R>(
    addr: SocketAddr,
    filter: F,
    mut shutdown_signal: watch::Receiver<()>,
) -> Result<(SocketAddr, impl Future<Output = ()> + 'static)>
where
    F: Filter<Extract = (R,), Error = Rejection> + Clone + Send + Sync + 'static,
    R: Reply,
{
    warp::serve(filter)
        .try_bind_with_graceful_shutdown(addr, async move {
            let _ = shutdown_signal.changed().await;
        })
        .map_err(|e| SystemError::ServerBind(format!("{addr}: {e}")).into())
}

/// Serves [`routes`] on `addr` until shutdown.
pub async fn start_server(
    addr: SocketAddr,
    engine: Arc<SyncEngine>,
    shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    let (bound, server) = bind(addr, routes(engine), shutdown_signal)?;
    info!("sync server listening on {}", bound);
    server.await;
    info!("sync server stopped");
    Ok(())
}
