use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Push channel, polling fallback and change feed sizing
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeliveryConfig {
    /// Polling interval used while the push channel is down
    /// Range: 250-60000
    /// Default: 1500
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Fixed delay before a closed push channel is reopened
    /// Range: 100-60000
    /// Default: 2000
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    /// Change events retained per notifier for `?since=` polling
    /// Default: 64
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Broadcast buffer per notifier; slower push subscribers are resynced
    /// Default: 128
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            history_capacity: default_history_capacity(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl DeliveryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(250..=60_000).contains(&self.poll_interval_ms) {
            return Err(Error::Config(ConfigError::Message(format!(
                "delivery poll_interval_ms must be between 250 and 60000, got {}",
                self.poll_interval_ms
            ))));
        }

        if !(100..=60_000).contains(&self.reconnect_backoff_ms) {
            return Err(Error::Config(ConfigError::Message(format!(
                "delivery reconnect_backoff_ms must be between 100 and 60000, got {}",
                self.reconnect_backoff_ms
            ))));
        }

        if self.history_capacity == 0 || self.channel_capacity == 0 {
            return Err(Error::Config(ConfigError::Message(
                "delivery history_capacity and channel_capacity must be greater than 0".into(),
            )));
        }

        Ok(())
    }
}

fn default_poll_interval_ms() -> u64 {
    1500
}

fn default_reconnect_backoff_ms() -> u64 {
    2000
}

fn default_history_capacity() -> usize {
    64
}

fn default_channel_capacity() -> usize {
    128
}
