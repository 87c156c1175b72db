use std::time::Duration;

use super::SyncClient;
use crate::config::DeliveryConfig;
use crate::Result;

pub struct SyncClientBuilder {
    base_url: String,
    notifier_id: String,
    config: DeliveryConfig,
    push_enabled: bool,
}

impl SyncClientBuilder {
    /// Builder for a client following `notifier_id` on the server at
    /// `base_url` (e.g. `http://127.0.0.1:8080`).
    pub fn new(
        base_url: impl Into<String>,
        notifier_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            notifier_id: notifier_id.into(),
            config: DeliveryConfig::default(),
            push_enabled: true,
        }
    }

    /// Poll interval while the push channel is down (default: 1.5s)
    pub fn poll_interval(
        mut self,
        interval: Duration,
    ) -> Self {
        self.config.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Delay before reopening a closed push channel (default: 2s)
    pub fn reconnect_backoff(
        mut self,
        backoff: Duration,
    ) -> Self {
        self.config.reconnect_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// With push disabled the client only polls.
    pub fn push_enabled(
        mut self,
        enabled: bool,
    ) -> Self {
        self.push_enabled = enabled;
        self
    }

    /// Completely replaces the delivery settings, discarding earlier
    /// [`poll_interval`](Self::poll_interval) or
    /// [`reconnect_backoff`](Self::reconnect_backoff) calls.
    pub fn set_config(
        mut self,
        config: DeliveryConfig,
    ) -> Self {
        self.config = config;
        self
    }

    /// Starts the delivery driver. Must be called inside a tokio runtime.
    pub fn connect(self) -> Result<SyncClient> {
        SyncClient::spawn(self.base_url, self.notifier_id, self.config, self.push_enabled)
    }
}
