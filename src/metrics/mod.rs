use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tracing::error;


lazy_static! {
    pub static ref BATCH_FLUSHES: IntCounter =
        IntCounter::new("batch_flushes", "Render batcher flushes delivered to the change feed")
            .expect("metric can not be created");

    pub static ref FLUSHED_UPDATES: IntCounter =
        IntCounter::new("flushed_updates", "Listener updates carried by all flushes")
            .expect("metric can not be created");

    pub static ref SUPPRESSED_UPDATES: IntCounter = IntCounter::new(
        "suppressed_updates",
        "Notifier changes skipped because the listener already rendered the same value"
    )
    .expect("metric can not be created");

    pub static ref BUILDER_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("builder_failures", "Listener renders that produced a diagnostic fragment"),
        &["kind"]
    )
    .expect("Should succeed to create metric");

    pub static ref REAPED_RECORDS: IntCounterVec = IntCounterVec::new(
        Opts::new("reaped_records", "Registry records removed by the reclamation sweep"),
        &["record"]
    )
    .expect("Should succeed to create metric");

    pub static ref PUSH_SUBSCRIPTIONS: IntGauge =
        IntGauge::new("push_subscriptions", "Live push channel subscriptions")
            .expect("metric can not be created");

    pub static ref POLL_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("poll_requests", "Polling endpoint requests by outcome"),
        &["outcome"]
    )
    .expect("Should succeed to create metric");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

pub fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(BATCH_FLUSHES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(FLUSHED_UPDATES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(SUPPRESSED_UPDATES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(BUILDER_FAILURES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(REAPED_RECORDS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(PUSH_SUBSCRIPTIONS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(POLL_REQUESTS.clone()))
        .expect("collector can be registered");
}

/// Registers the crate collectors into [`REGISTRY`]; later calls are no-ops.
pub fn init_metrics() {
    REGISTER.call_once(|| register_custom_metrics(&REGISTRY));
}

/// Text exposition of [`REGISTRY`] for `GET /metrics`.
pub fn gather_text() -> String {
    init_metrics();

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
