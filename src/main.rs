use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notifier_sync::metrics::init_metrics;
use notifier_sync::server;
use notifier_sync::utils::async_task::spawn_task;
use notifier_sync::widget::Element;
use notifier_sync::widget::Text;
use notifier_sync::Error;
use notifier_sync::Result;
use notifier_sync::SyncConfig;
use notifier_sync::SyncEngine;
use notifier_sync::SystemError;
use notifier_sync::ValueNotifier;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use warp::Filter;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = SyncConfig::new()?.validate()?;

    // Initializing Logs
    let _guard = init_observability(&settings.monitoring.log_dir)?;
    if settings.monitoring.metrics_enabled {
        init_metrics();
    }

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    let engine = SyncEngine::new(settings.clone())?;
    let reclamation = engine.start(graceful_rx.clone());

    let counter = engine.notifier(0i64);
    let message = engine.notifier(String::from("waiting for the first tick"));
    let mut handles = Vec::new();
    spawn_task(
        "ticker",
        {
            let counter = counter.clone();
            let message = message.clone();
            let shutdown = graceful_rx.clone();
            move || tick(counter, message, shutdown)
        },
        Some(&mut handles),
    );

    info!("Application started. Waiting for CTRL+C signal...");
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    if settings.server.enabled {
        let page = {
            let engine = engine.clone();
            warp::path::end()
                .and(warp::get())
                .map(move || warp::reply::html(render_page(&engine, &counter, &message)))
        };
        let (addr, server) = server::bind(
            settings.server.socket_addr()?,
            page.or(server::routes(engine.clone())),
            graceful_rx.clone(),
        )?;
        info!("demo page on http://{}/", addr);
        server.await;
    } else {
        info!("server disabled, running engine only");
        let mut shutdown = graceful_rx.clone();
        let _ = shutdown.changed().await;
    }

    for handle in handles {
        let _ = handle.await;
    }
    reclamation.await.map_err(SystemError::TaskFailed)?;

    println!("Exiting program.");
    Ok(())
}

/// Bumps the counter every second and rewrites the message every ten ticks.
async fn tick(
    counter: Arc<ValueNotifier<i64>>,
    message: Arc<ValueNotifier<String>>,
    mut shutdown: watch::Receiver<()>,
) -> Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                counter.update(|v| *v += 1);
                let n = counter.get();
                if n % 10 == 0 {
                    message.set(format!("reached {n} ticks"));
                }
            }
            _ = shutdown.changed() => {
                info!("ticker received shutdown signal");
                return Ok(());
            }
        }
    }
}

/// Each request renders fresh bindings; the browser runtime claims them over
/// the push channel and releases them on disconnect.
fn render_page(
    engine: &Arc<SyncEngine>,
    counter: &Arc<ValueNotifier<i64>>,
    message: &Arc<ValueNotifier<String>>,
) -> String {
    // Fresh bindings per response; reaped unless the page claims or polls them
    let count = engine
        .listener_builder()
        .notifier(counter.clone())
        .builder(|v: &i64| Some(Element::new("strong").child(Text::new(v.to_string()))))
        .per_request()
        .build();
    let text = engine
        .listener_builder()
        .notifier(message.clone())
        .builder(|v: &String| {
            if v.is_empty() {
                None
            } else {
                Some(Text::new(v.clone()))
            }
        })
        .per_request()
        .build();

    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>notifier-sync</title></head>\
         <body><h1>notifier-sync</h1><p>Ticks: {}</p><p>Message: {}</p>\
         <script src=\"/notifier-sync.js\" defer></script></body></html>",
        count.render(),
        text.render()
    )
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    info!("Shutdown server..");
    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::System(SystemError::SignalSenderClosed(format!(
            "Failed to send shutdown signal: {}",
            e
        )))
    })?;

    info!("Shutdown completed");
    Ok(())
}

pub fn init_observability(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let log_file = tracing_appender::rolling::never(log_dir, "notifier-sync.log");

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
