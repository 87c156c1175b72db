use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    /// Expose prometheus collectors on `GET /metrics`
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,

    /// Directory the binary writes its log file into
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: default_metrics_enabled(),
            log_dir: default_log_dir(),
        }
    }
}

impl MonitoringConfig {
    pub fn validate(&self) -> Result<()> {
        if self.log_dir.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "monitoring log_dir cannot be empty".into(),
            )));
        }
        Ok(())
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}
