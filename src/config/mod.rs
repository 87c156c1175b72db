//! Configuration management for the synchronization engine.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`SYNC__` prefix)
//! - Component-wise validation
mod batcher;
mod delivery;
mod monitoring;
mod registry;
mod server;
pub use batcher::*;
pub use delivery::*;
pub use monitoring::*;
pub use registry::*;
pub use server::*;

#[cfg(test)]
mod config_test;

use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable prefix for overrides, e.g. `SYNC__BATCHER__DEBOUNCE_MS`.
pub const ENV_PREFIX: &str = "SYNC";

/// Main configuration container
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct SyncConfig {
    /// Widget/listener registry and reclamation sweep
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Render batcher debounce window
    #[serde(default)]
    pub batcher: BatcherConfig,
    /// Push channel, polling fallback and change feed sizing
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// HTTP surface
    #[serde(default)]
    pub server: ServerConfig,
    /// Metrics and log output
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Debug for SyncConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("registry", &self.registry)
            .field("batcher", &self.batcher)
            .field("delivery", &self.delivery)
            .field("server", &self.server)
            .field("monitoring", &self.monitoring)
            .finish()
    }
}

impl SyncConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Sources are merged in order (later sources override earlier):
    /// 1. Type defaults
    /// 2. Configuration file from `CONFIG_PATH` (if set)
    /// 3. Environment variables with `SYNC__` prefix
    ///
    /// Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("SYNC__BATCHER__DEBOUNCE_MS", "32");
    /// let cfg = SyncConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order: current values, then the file, then the latest
    /// environment variables.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every subsystem and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.registry.validate()?;
        self.batcher.validate()?;
        self.delivery.validate()?;
        self.server.validate()?;
        self.monitoring.validate()?;
        Ok(self)
    }
}
