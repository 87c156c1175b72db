use std::net::SocketAddr;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Serve the polling, push and script endpoints
    /// Default: true
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Address the HTTP server binds to
    /// Default: "127.0.0.1:8080"
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            listen_addr: default_listen_addr(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr.parse().map_err(|e| {
            Error::Config(ConfigError::Message(format!(
                "invalid server listen_addr {}: {}",
                self.listen_addr, e
            )))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.enabled {
            self.socket_addr()?;
        }
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}
