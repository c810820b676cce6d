//! Application Configuration
//!
//! Settings for the emulator lifecycle and logging, stored as TOML:
//! - boot wait timeout and polling interval
//! - external command timeout
//! - default console port
//! - log filter

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CoreError, Result};

/// Emulator lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmulatorConfig {
    /// How long `wait-boot` waits for `sys.boot_completed`
    pub boot_timeout_secs: u64,
    /// Interval between boot-completion polls
    pub poll_interval_secs: u64,
    /// Upper bound for every external command, unlimited when unset
    pub command_timeout_secs: Option<u64>,
    /// Console port used to address a running emulator
    pub console_port: u16,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            boot_timeout_secs: 180,
            poll_interval_secs: 5,
            command_timeout_secs: Some(120),
            console_port: crate::DEFAULT_CONSOLE_PORT,
        }
    }
}

impl EmulatorConfig {
    pub fn boot_timeout(&self) -> Duration {
        Duration::from_secs(self.boot_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Emulator settings
    pub emulator: EmulatorConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Get the configuration directory path
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "avdkit", "avdkit").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the configuration file path
    pub fn config_file() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Parse configuration from TOML text
    pub fn from_toml(path: &Path, contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).map_err(|source| CoreError::TomlParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location, falling back to defaults
    pub async fn load() -> Result<Self> {
        match Self::config_file() {
            Some(path) => Self::load_from(&path).await,
            None => {
                info!("Cannot determine config path, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a file, falling back to defaults when it is missing
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        debug!("Loading config from {:?}", path);
        let contents = tokio::fs::read_to_string(path).await?;
        Self::from_toml(path, &contents)
    }

    /// Save configuration to a file
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = toml::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.emulator.poll_interval_secs == 0 {
            return Err(CoreError::Config(
                "emulator.poll_interval_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.emulator.boot_timeout_secs, 180);
        assert_eq!(config.emulator.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.emulator.console_port, 5554);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml(
            Path::new("config.toml"),
            "[emulator]\nboot_timeout_secs = 30\n",
        )
        .unwrap();
        assert_eq!(config.emulator.boot_timeout(), Duration::from_secs(30));
        assert_eq!(config.emulator.poll_interval_secs, 5);
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let err = AppConfig::from_toml(
            Path::new("config.toml"),
            "[emulator]\npoll_interval_secs = 0\n",
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.emulator.command_timeout_secs = Some(45);
        config.logging.filter = "avdkit=debug".to_string();
        config.save_to(&path).await.unwrap();

        let loaded = AppConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = AppConfig::load_from(&dir.path().join("absent.toml")).await.unwrap();
        assert_eq!(loaded, AppConfig::default());
    }
}
