//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, ConnCoreConfig};
use conn_core::Settings;
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded, in overlay order (system, user, local).
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode a loaded value.
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local). Only returns files
/// that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/conn-core/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("conn-core/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    let local = PathBuf::from("conn-core.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load a single TOML file into a raw, fully-optional config.
pub fn load_from_file(path: &Path) -> Result<ConnCoreConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_toml(&contents, path)
}

fn parse_toml(contents: &str, path: &Path) -> Result<ConnCoreConfig, ConfigError> {
    toml::from_str(contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Discover every config file, overlay them in order, apply environment
/// overrides, and resolve the result into a concrete `Settings`.
pub fn load() -> Result<Settings, ConfigError> {
    let mut sources = ConfigSources::default();
    let mut config = ConnCoreConfig::default();

    for path in discover_config_files() {
        let layer = load_from_file(&path)?;
        config = config.merged_with(layer);
        sources.files.push(path);
    }

    apply_env_overrides(&mut config, &mut sources);
    config.into_settings()
}

/// Apply `CONN_CORE_*` environment overrides onto an already-loaded config.
pub fn apply_env_overrides(config: &mut ConnCoreConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("CONN_CORE_ADDRESS") {
        config.address = Some(v);
        sources.env_overrides.push("CONN_CORE_ADDRESS".to_string());
    }
    if let Ok(v) = env::var("CONN_CORE_CONNECTION_TIMEOUT_MS") {
        if let Ok(ms) = v.parse() {
            config.connection_timeout_ms = Some(ms);
            sources.env_overrides.push("CONN_CORE_CONNECTION_TIMEOUT_MS".to_string());
        }
    }
    if let Ok(v) = env::var("CONN_CORE_MAX_RECONNECTIONS") {
        if let Ok(n) = v.parse() {
            config.max_reconnections = Some(n);
            sources.env_overrides.push("CONN_CORE_MAX_RECONNECTIONS".to_string());
        }
    }
    if let Ok(v) = env::var("CONN_CORE_RECONNECTION_DELAY_MIN_MS") {
        if let Ok(ms) = v.parse() {
            config.reconnection_delay_min_ms = Some(ms);
            sources.env_overrides.push("CONN_CORE_RECONNECTION_DELAY_MIN_MS".to_string());
        }
    }
    if let Ok(v) = env::var("CONN_CORE_RECONNECTION_DELAY_MAX_MS") {
        if let Ok(ms) = v.parse() {
            config.reconnection_delay_max_ms = Some(ms);
            sources.env_overrides.push("CONN_CORE_RECONNECTION_DELAY_MAX_MS".to_string());
        }
    }
    if let Ok(v) = env::var("CONN_CORE_HEARTBEAT_INTERVAL_MS") {
        if let Ok(ms) = v.parse() {
            config.heartbeat_interval_ms = Some(ms);
            sources.env_overrides.push("CONN_CORE_HEARTBEAT_INTERVAL_MS".to_string());
        }
    }
    if let Ok(v) = env::var("CONN_CORE_HEARTBEAT_TIMEOUT_MS") {
        if let Ok(ms) = v.parse() {
            config.heartbeat_timeout_ms = Some(ms);
            sources.env_overrides.push("CONN_CORE_HEARTBEAT_TIMEOUT_MS".to_string());
        }
    }
    if let Ok(v) = env::var("CONN_CORE_USERNAME") {
        let password = env::var("CONN_CORE_PASSWORD").unwrap_or_default();
        config.credentials = Some(crate::CredentialsConfig { username: v, password });
        sources.env_overrides.push("CONN_CORE_USERNAME".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_config_files_does_not_panic() {
        let _files = discover_config_files();
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
address = "127.0.0.1:1113"
"#;
        let config = parse_toml(toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.address.as_deref(), Some("127.0.0.1:1113"));
        assert_eq!(config.max_reconnections, None);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
address = "10.0.0.5:1113"
connection_timeout_ms = 5000
max_reconnections = -1
heartbeat_interval_ms = 15000
heartbeat_timeout_ms = 5000

[credentials]
username = "admin"
password = "changeit"
"#;
        let config = parse_toml(toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.address.as_deref(), Some("10.0.0.5:1113"));
        assert_eq!(config.connection_timeout_ms, Some(5000));
        assert_eq!(config.max_reconnections, Some(-1));
        assert_eq!(config.heartbeat_interval_ms, Some(15000));
        let creds = config.credentials.as_ref().unwrap();
        assert_eq!(creds.username, "admin");
    }

    #[test]
    fn test_env_override_wins_over_file() {
        let mut config = ConnCoreConfig {
            address: Some("127.0.0.1:1113".to_string()),
            ..Default::default()
        };
        let mut sources = ConfigSources::default();
        std::env::set_var("CONN_CORE_ADDRESS", "192.168.1.1:1113");
        apply_env_overrides(&mut config, &mut sources);
        std::env::remove_var("CONN_CORE_ADDRESS");

        assert_eq!(config.address.as_deref(), Some("192.168.1.1:1113"));
        assert!(sources.env_overrides.contains(&"CONN_CORE_ADDRESS".to_string()));
    }

    #[test]
    fn test_into_settings_requires_address() {
        let config = ConnCoreConfig::default();
        assert!(config.into_settings().is_err());
    }

    #[test]
    fn test_into_settings_applies_overrides_onto_defaults() {
        let config = ConnCoreConfig {
            address: Some("127.0.0.1:1113".to_string()),
            max_reconnections: Some(3),
            ..Default::default()
        };
        let settings = config.into_settings().unwrap();
        assert_eq!(settings.max_reconnections, 3);
        assert_eq!(settings.heartbeat_interval, Settings::new(settings.address).heartbeat_interval);
    }
}
