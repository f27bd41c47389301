//! Server configuration.
//!
//! Loaded from TOML, then overridden by `OBJLINK_BIND` and command-line
//! flags. Every field has a default, so an empty file is a valid config.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use objlink_core::{SerializeOptions, DEFAULT_MAX_DEPTH};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::{RegistryLimits, DEFAULT_MAX_OBJECTS};

/// Default listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:31950";

/// Environment variable overriding the listen address.
pub const BIND_ENV: &str = "OBJLINK_BIND";

/// Maximum accepted text frame (1MB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Maximum concurrent sessions.
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {error}")]
    Read { path: PathBuf, error: std::io::Error },

    #[error("failed to parse config {path}: {error}")]
    Parse { path: PathBuf, error: toml::de::Error },

    #[error("invalid {var}={value}: expected host:port")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which sessions share a registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryScope {
    /// Every session gets its own registry, dropped on disconnect
    #[default]
    Session,

    /// One registry for the server's lifetime
    Shared,
}

impl std::fmt::Display for RegistryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session => write!(f, "session"),
            Self::Shared => write!(f, "shared"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub registry_scope: RegistryScope,
    pub max_objects: usize,
    pub idle_ttl_secs: Option<u64>,
    pub call_timeout_ms: Option<u64>,
    pub max_connections: usize,
    pub max_message_bytes: usize,
    pub max_depth: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 31950)),
            registry_scope: RegistryScope::Session,
            max_objects: DEFAULT_MAX_OBJECTS,
            idle_ttl_secs: None,
            call_timeout_ms: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ServerConfig {
    /// Reads and validates a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_path_buf(),
            error,
        })?;
        Self::from_toml(&text).map_err(|error| match error {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Loads the default config file if it exists, otherwise defaults.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|error| ConfigError::Parse {
            path: PathBuf::new(),
            error,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// `$XDG_CONFIG_HOME/objlink/config.toml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("objlink").join("config.toml"))
    }

    /// Applies `OBJLINK_BIND` if set.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var(BIND_ENV) {
            self.bind = parse_bind(&value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_objects == 0 {
            return Err(ConfigError::Invalid("max_objects must be positive".into()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be positive".into(),
            ));
        }
        if self.max_message_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_message_bytes must be positive".into(),
            ));
        }
        if self.idle_ttl_secs == Some(0) {
            return Err(ConfigError::Invalid("idle_ttl_secs must be positive".into()));
        }
        if self.call_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "call_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn idle_ttl(&self) -> Option<Duration> {
        self.idle_ttl_secs.map(Duration::from_secs)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    pub fn registry_limits(&self) -> RegistryLimits {
        RegistryLimits {
            max_objects: self.max_objects,
            idle_ttl: self.idle_ttl(),
        }
    }

    /// Options for call results. Control messages are always shallow.
    pub fn serialize_options(&self) -> SerializeOptions {
        SerializeOptions::deep().with_max_depth(self.max_depth)
    }
}

/// Parses a `host:port` listen address.
pub fn parse_bind(value: &str) -> Result<SocketAddr, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var: BIND_ENV,
        value: value.to_string(),
    })
}
