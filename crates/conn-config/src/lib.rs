//! Config discovery and loading for [`conn_core::Settings`].
//!
//! Mirrors this lineage's bootstrap-config crates: layered TOML discovery
//! (system, user, local) overlaid with environment variable overrides,
//! producing the single typed value the application hands to
//! `ConnectionManager::spawn`. Loading is ambient stack — `Settings`'s shape
//! itself lives in `conn-core` and stays agnostic to how it was populated.

mod loader;

pub use loader::{discover_config_files, load, load_from_file, ConfigSources};

use std::net::AddrParseError;
use std::path::PathBuf;
use std::time::Duration;

use conn_core::{Credentials, Settings};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid address {address:?}: {message}")]
    InvalidAddress { address: String, message: String },
}

/// Raw, fully-optional shape deserialized straight from TOML. Every field
/// defaults to `None` so a partial file, or a partial env overlay, merges
/// cleanly onto `Settings::new`'s built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConnCoreConfig {
    pub address: Option<String>,
    pub connection_timeout_ms: Option<u64>,
    pub max_reconnections: Option<i64>,
    pub reconnection_delay_min_ms: Option<u64>,
    pub reconnection_delay_max_ms: Option<u64>,
    pub heartbeat_interval_ms: Option<u64>,
    pub heartbeat_timeout_ms: Option<u64>,
    pub credentials: Option<CredentialsConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    pub username: String,
    pub password: String,
}

impl ConnCoreConfig {
    /// Overlay `other` on top of `self`: any field `other` sets wins.
    pub fn merged_with(self, other: Self) -> Self {
        Self {
            address: other.address.or(self.address),
            connection_timeout_ms: other.connection_timeout_ms.or(self.connection_timeout_ms),
            max_reconnections: other.max_reconnections.or(self.max_reconnections),
            reconnection_delay_min_ms: other.reconnection_delay_min_ms.or(self.reconnection_delay_min_ms),
            reconnection_delay_max_ms: other.reconnection_delay_max_ms.or(self.reconnection_delay_max_ms),
            heartbeat_interval_ms: other.heartbeat_interval_ms.or(self.heartbeat_interval_ms),
            heartbeat_timeout_ms: other.heartbeat_timeout_ms.or(self.heartbeat_timeout_ms),
            credentials: other.credentials.or(self.credentials),
        }
    }

    /// Resolve into a concrete `Settings`. `address` must have been set by
    /// some layer (file or env); every other field falls back to
    /// `Settings::new`'s defaults.
    pub fn into_settings(self) -> Result<Settings, ConfigError> {
        let address_str = self.address.ok_or_else(|| ConfigError::InvalidAddress {
            address: String::new(),
            message: "no address configured; set `address` in a config file or CONN_CORE_ADDRESS".to_string(),
        })?;
        let address = address_str.parse().map_err(|e: AddrParseError| ConfigError::InvalidAddress {
            address: address_str.clone(),
            message: e.to_string(),
        })?;

        let mut settings = Settings::new(address);
        if let Some(ms) = self.connection_timeout_ms {
            settings.connection_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = self.max_reconnections {
            settings.max_reconnections = n;
        }
        if let Some(ms) = self.reconnection_delay_min_ms {
            settings.reconnection_delay_min = Duration::from_millis(ms);
        }
        if let Some(ms) = self.reconnection_delay_max_ms {
            settings.reconnection_delay_max = Duration::from_millis(ms);
        }
        if let Some(ms) = self.heartbeat_interval_ms {
            settings.heartbeat_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.heartbeat_timeout_ms {
            settings.heartbeat_timeout = Duration::from_millis(ms);
        }
        if let Some(creds) = self.credentials {
            settings.default_credentials = Some(Credentials {
                username: creds.username,
                password: creds.password,
            });
        }
        Ok(settings)
    }
}
