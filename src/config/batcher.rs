use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BatcherConfig {
    /// Debounce window; a burst of updates inside it collapses into one flush
    /// Default: 16 (one frame at 60Hz)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl BatcherConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=1000).contains(&self.debounce_ms) {
            return Err(Error::Config(ConfigError::Message(format!(
                "batcher debounce_ms must be between 1 and 1000, got {}",
                self.debounce_ms
            ))));
        }
        Ok(())
    }
}

fn default_debounce_ms() -> u64 {
    16
}
