//! Client side of the delivery channel.
//!
//! - [`DeliveryMachine`] - push/poll state machine
//! - [`SyncClient`] - async Rust client following one notifier
//! - [`runtime_script`] - the same machine for browsers, served at
//!   `/notifier-sync.js` with the configured intervals
//!
//! # Basic Usage
//! ```no_run
//! use notifier_sync::client::SyncClient;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let client = SyncClient::builder("http://127.0.0.1:8080", "vn-counter")
//!         .connect()
//!         .unwrap();
//!
//!     let mut updates = client.subscribe();
//!     while updates.changed().await.is_ok() {
//!         println!("value: {:?}", updates.borrow().as_ref().map(|e| e.value.clone()));
//!     }
//! }
//! ```

mod builder;
mod machine;
mod sync_client;

#[cfg(test)]
mod sync_client_test;

pub use builder::*;
pub use machine::*;
pub use sync_client::*;

use crate::config::DeliveryConfig;

/// Browser runtime: drains the bootstrap queue, subscribes over WebSocket,
/// falls back to polling and shows an offline marker when both fail.
pub const RUNTIME_SCRIPT: &str = include_str!("runtime.js");

/// [`RUNTIME_SCRIPT`] preceded by the delivery timings it should use.
pub fn runtime_script(config: &DeliveryConfig) -> String {
    let settings = serde_json::json!({
        "pollIntervalMs": config.poll_interval_ms,
        "reconnectBackoffMs": config.reconnect_backoff_ms,
    });
    format!("window.NotifierSyncConfig={settings};\n{RUNTIME_SCRIPT}")
}
