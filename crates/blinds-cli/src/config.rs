//! Configuration file management.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use blinds_core::{ControllerConfig, ReconnectOptions};
use blinds_types::DeviceId;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Address prefix identifying blinds controllers
    #[serde(default)]
    pub address_prefix: Option<String>,

    /// Milliseconds between reconnection attempts
    #[serde(default)]
    pub reconnect_interval_ms: Option<u64>,

    /// Device aliases (friendly name -> device address)
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("blinds")
            .join("config.toml")
    }

    /// Load config from file, or return default if not found
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`, or return default if missing or unreadable.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!("Warning: Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    eprintln!("Warning: Failed to read config: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    /// Save config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Build the controller configuration, command-line values winning over
    /// file values.
    pub fn controller_config(
        &self,
        prefix: Option<&str>,
        interval_ms: Option<u64>,
    ) -> Result<ControllerConfig> {
        let mut config = ControllerConfig::default();
        if let Some(prefix) = prefix.or(self.address_prefix.as_deref()) {
            config.address_prefix = prefix.to_string();
        }
        if let Some(ms) = interval_ms.or(self.reconnect_interval_ms) {
            config.reconnect = ReconnectOptions::fixed_interval(Duration::from_millis(ms));
        }
        config.validate()?;
        Ok(config)
    }

    /// The alias pointing at `device`, if any.
    pub fn alias_for(&self, device: &DeviceId) -> Option<&str> {
        let mut names: Vec<_> = self
            .aliases
            .iter()
            .filter(|(_, address)| DeviceId::new(address) == *device)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names.into_iter().next()
    }
}

/// Resolve an alias or address to a device identity.
pub fn resolve_device(device: &str, config: &Config) -> Result<DeviceId> {
    let address = config
        .aliases
        .get(device)
        .map(String::as_str)
        .unwrap_or(device);
    address
        .parse()
        .map_err(|e| anyhow!("'{}' is neither an alias nor a device address: {}", device, e))
}

/// Check if a string looks like a device address.
pub fn looks_like_address(s: &str) -> bool {
    s.chars().filter(|c| *c == ':' || *c == '-').count() >= 5
        && s.chars()
            .all(|c| c.is_ascii_hexdigit() || c == ':' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_alias() -> Config {
        let mut config = Config::default();
        config
            .aliases
            .insert("office".to_string(), "03:80:e1:00:00:07".to_string());
        config
    }

    #[test]
    fn test_config_path_ends_with_app_dir() {
        let path = Config::path();
        assert!(path.ends_with("blinds/config.toml"));
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("missing.toml"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = config_with_alias();
        config.reconnect_interval_ms = Some(1500);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_invalid_toml_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "aliases = 5").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_controller_config_defaults() {
        let config = Config::default().controller_config(None, None).unwrap();
        assert_eq!(config, ControllerConfig::default());
    }

    #[test]
    fn test_controller_config_flags_override_file() {
        let config = Config {
            address_prefix: Some("03:80".to_string()),
            reconnect_interval_ms: Some(1000),
            ..Default::default()
        };

        let from_file = config.controller_config(None, None).unwrap();
        assert_eq!(from_file.address_prefix, "03:80");
        assert_eq!(from_file.reconnect.interval, Duration::from_millis(1000));

        let overridden = config.controller_config(Some("C0:FF"), Some(250)).unwrap();
        assert_eq!(overridden.address_prefix, "C0:FF");
        assert_eq!(overridden.reconnect.interval, Duration::from_millis(250));
    }

    #[test]
    fn test_controller_config_rejects_zero_interval() {
        assert!(Config::default().controller_config(None, Some(0)).is_err());
    }

    #[test]
    fn test_resolve_device_by_alias_and_address() {
        let config = config_with_alias();
        assert_eq!(
            resolve_device("office", &config).unwrap(),
            DeviceId::new("03:80:E1:00:00:07")
        );
        assert_eq!(
            resolve_device("03:80:e1:00:00:08", &config).unwrap(),
            DeviceId::new("03:80:E1:00:00:08")
        );
        assert!(resolve_device("kitchen", &config).is_err());
    }

    #[test]
    fn test_alias_for_matches_normalised_address() {
        let config = config_with_alias();
        assert_eq!(
            config.alias_for(&DeviceId::new("03:80:E1:00:00:07")),
            Some("office")
        );
        assert_eq!(config.alias_for(&DeviceId::new("03:80:E1:00:00:08")), None);
    }

    #[test]
    fn test_looks_like_address() {
        assert!(looks_like_address("03:80:E1:00:00:01"));
        assert!(looks_like_address("aa-bb-cc-dd-ee-ff"));
        assert!(!looks_like_address("living-room"));
    }
}
