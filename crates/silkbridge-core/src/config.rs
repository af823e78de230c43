use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "127.0.0.1".into()
}
const fn default_port() -> u16 {
    8000
}
const fn default_true() -> bool {
    true
}
fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}
fn default_log_filter() -> String {
    "info".into()
}

// ---------------------------------------------------------------------------
// BridgeConfig
// ---------------------------------------------------------------------------

/// Start-up configuration for the bridge server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// Listening socket settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSection {
    /// Bind host (default: loopback).
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port (default: 8000).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Set `TCP_NODELAY` on accepted connections.
    #[serde(default = "default_true")]
    pub nodelay: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            nodelay: true,
        }
    }
}

/// Where checkpoints live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSection {
    /// Root directory for `<model_dir>/<task>/checkpoint` (default: `models`).
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
        }
    }
}

/// Policy engine settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSection {
    /// RNG seed for action sampling and minibatch shuffling. Entropy when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// `tracing-subscriber` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl BridgeConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "server.host".into(),
                message: "must not be empty".into(),
            });
        }
        if self.storage.model_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.model_dir".into(),
                message: "must not be empty".into(),
            });
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "logging.filter".into(),
                message: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        // IPv6 literals need brackets.
        if self.server.host.contains(':') && !self.server.host.starts_with('[') {
            format!("[{}]:{}", self.server.host, self.server.port)
        } else {
            format!("{}:{}", self.server.host, self.server.port)
        }
    }

    /// Parsed bind address, when the host is an IP literal.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.bind_address().parse().ok()
    }

    /// Parse from a TOML string and validate.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
