//! Configuration system for camfleet
//!
//! Supports TOML configuration files with sensible defaults.
//! Configuration is loaded from:
//! - macOS: ~/Library/Application Support/camfleet/config.toml
//! - Linux: ~/.config/camfleet/config.toml
//! - Windows: %APPDATA%/camfleet/config.toml

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use crate::error::ConfigError;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP control surface
    pub server: ServerConfig,
    /// Discovery and connection settings
    pub fleet: FleetConfig,
    /// Health monitor timing
    pub health: HealthConfig,
    /// Preset file settings
    pub preset: PresetConfig,
    /// Bulk transfer settings
    pub transfer: TransferConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen port
    pub port: u16,
    /// Bind address
    pub bind: IpAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

/// Discovery and connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Substring an identity must contain to be supervised
    pub model_filter: String,
    /// Open attempts per camera before giving up
    pub connect_attempts: u32,
    /// Delay between attempts when no hardware reset is available
    pub retry_delay_ms: u64,
    /// Settle time after a hardware reset between attempts
    pub reset_settle_ms: u64,
    /// Settle time after the hardware reset that precedes a scan
    pub scan_reset_settle_ms: u64,
    /// Enumeration timeout
    pub enumerate_timeout_secs: u64,
    /// Pause between connecting new cameras and applying the preset
    pub post_scan_settle_ms: u64,
    /// Upper bound on waiting for the connected event
    pub connect_timeout_secs: u64,
    /// How long disconnect waits for the disconnected event
    pub disconnect_timeout_ms: u64,
    /// USB vendor id used for hardware resets
    pub usb_vendor_id: u16,
    /// USB product id used for hardware resets
    pub usb_product_id: u16,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            model_filter: "FX30".into(),
            connect_attempts: 3,
            retry_delay_ms: 3000,
            reset_settle_ms: 4000,
            scan_reset_settle_ms: 6000,
            enumerate_timeout_secs: 3,
            post_scan_settle_ms: 1500,
            connect_timeout_secs: 30,
            disconnect_timeout_ms: 3000,
            usb_vendor_id: 0x054c,
            usb_product_id: 0x0e10,
        }
    }
}

impl FleetConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn reset_settle(&self) -> Duration {
        Duration::from_millis(self.reset_settle_ms)
    }

    pub fn scan_reset_settle(&self) -> Duration {
        Duration::from_millis(self.scan_reset_settle_ms)
    }

    pub fn enumerate_timeout(&self) -> Duration {
        Duration::from_secs(self.enumerate_timeout_secs)
    }

    pub fn post_scan_settle(&self) -> Duration {
        Duration::from_millis(self.post_scan_settle_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }
}

/// Health monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Interval between health checks
    pub tick_secs: u64,
    /// Quiet period after the initial scan
    pub stabilize_secs: u64,
    /// Accumulated disconnection that triggers a full reset
    pub reset_after_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            tick_secs: 5,
            stabilize_secs: 15,
            reset_after_secs: 20,
        }
    }
}

impl HealthConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn stabilize(&self) -> Duration {
        Duration::from_secs(self.stabilize_secs)
    }

    pub fn reset_after(&self) -> Duration {
        Duration::from_secs(self.reset_after_secs)
    }
}

/// Preset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetConfig {
    /// Preset file location
    pub path: PathBuf,
    /// Pause after each property write
    pub apply_settle_ms: u64,
}

impl Default for PresetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("fx30_preset.json"),
            apply_settle_ms: 500,
        }
    }
}

impl PresetConfig {
    pub fn apply_settle(&self) -> Duration {
        Duration::from_millis(self.apply_settle_ms)
    }
}

/// Bulk transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Initial download directory
    pub download_dir: PathBuf,
    /// Settle time after switching connection mode
    pub mode_switch_settle_ms: u64,
    /// Settle time after transfer-mode connections come up
    pub ready_settle_ms: u64,
    /// Upper bound on one file pull
    pub file_timeout_secs: u64,
    /// Pause between pulls
    pub inter_file_pause_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("/tmp/fx30_downloads"),
            mode_switch_settle_ms: 2000,
            ready_settle_ms: 3000,
            file_timeout_secs: 300,
            inter_file_pause_ms: 100,
        }
    }
}

impl TransferConfig {
    pub fn mode_switch_settle(&self) -> Duration {
        Duration::from_millis(self.mode_switch_settle_ms)
    }

    pub fn ready_settle(&self) -> Duration {
        Duration::from_millis(self.ready_settle_ms)
    }

    pub fn file_timeout(&self) -> Duration {
        Duration::from_secs(self.file_timeout_secs)
    }

    pub fn inter_file_pause(&self) -> Duration {
        Duration::from_millis(self.inter_file_pause_ms)
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("Failed to load config from {:?}: {}, using defaults", path, e);
                Self::default()
            }),
            None => {
                debug!("No config directory found, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Write the default configuration to `path`, or to the platform config
    /// path when none is given. Returns where it was written.
    pub fn write_default(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path().ok_or(ConfigError::NoConfigDir)?,
        };
        Self::default().save_to(&path)?;
        Ok(path)
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "camfleet", "camfleet")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Generate a sample configuration file content
    pub fn sample() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.fleet.connect_attempts, 3);
        assert_eq!(config.fleet.model_filter, "FX30");
        assert_eq!(config.health.reset_after(), Duration::from_secs(20));
        assert_eq!(config.transfer.file_timeout(), Duration::from_secs(300));
        assert_eq!(config.preset.path, PathBuf::from("fx30_preset.json"));
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
            [health]
            tick_secs = 1
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.health.tick_secs, 1);
        // Other values should be defaults
        assert_eq!(config.health.stabilize_secs, 15);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_sample_config() {
        let sample = Config::sample();
        assert!(sample.contains("[server]"));
        assert!(sample.contains("[fleet]"));
        assert!(sample.contains("[transfer]"));
    }

    #[test]
    fn test_config_load_missing() {
        let config = Config::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.server.port = 9191;
        config.transfer.download_dir = PathBuf::from("/srv/clips");
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.server.port, 9191);
        assert_eq!(loaded.transfer.download_dir, PathBuf::from("/srv/clips"));
    }

    #[test]
    fn test_write_default_to_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camfleet.toml");

        let written = Config::write_default(Some(&path)).unwrap();
        assert_eq!(written, path);
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.server.port, Config::default().server.port);
        assert_eq!(loaded.fleet.model_filter, Config::default().fleet.model_filter);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
    }
}
