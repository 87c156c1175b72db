use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Registry reclamation settings
///
/// ```toml
/// [registry]
/// sweep_interval_ms = 300000  # run the reclamation sweep every 5 minutes
/// idle_threshold_ms = 600000  # reap inactive entries idle for 10 minutes
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegistryConfig {
    /// How often the background sweep wakes up
    /// Default: 300000 (5 minutes)
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Grace period an inactive widget or listener survives after its last use
    /// Default: 600000 (10 minutes)
    #[serde(default = "default_idle_threshold_ms")]
    pub idle_threshold_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: default_sweep_interval_ms(),
            idle_threshold_ms: default_idle_threshold_ms(),
        }
    }
}

impl RegistryConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }

    /// Returns error if:
    /// - `sweep_interval_ms` is 0
    /// - `idle_threshold_ms` is below one second
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "registry sweep_interval_ms must be greater than 0".into(),
            )));
        }

        // A shorter grace period would reap bindings still being rendered
        if self.idle_threshold_ms < 1000 {
            return Err(Error::Config(ConfigError::Message(format!(
                "registry idle_threshold_ms must be at least 1000, got {}",
                self.idle_threshold_ms
            ))));
        }

        Ok(())
    }
}

fn default_sweep_interval_ms() -> u64 {
    5 * 60 * 1000
}

fn default_idle_threshold_ms() -> u64 {
    10 * 60 * 1000
}
