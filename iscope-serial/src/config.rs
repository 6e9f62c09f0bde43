//! Configuration management for iscope-serial.
//!
//! Configuration comes from an optional TOML file, then a couple of
//! environment overrides. Every section has defaults, so an empty file (or
//! no file at all) describes the stock accessory link.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::link::{DEFAULT_BAUD_RATE, DEFAULT_DEVICE_PATH};

/// Used when `ISCOPE_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/iscope/iscope.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Serial device configuration
    pub device: DeviceConfig,

    /// Logging configuration
    pub log: LogConfig,

    /// Capture tool configuration
    pub capture: CaptureConfig,
}

/// Which device to open and how.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Character device of the accessory serial interface
    pub path: PathBuf,

    /// Link speed
    pub baud_rate: u32,

    /// Re-apply the attributes found at open when the device is closed
    pub restore_on_close: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DEVICE_PATH),
            baud_rate: DEFAULT_BAUD_RATE,
            restore_on_close: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level when RUST_LOG is unset
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Bytes per read, and per printed line
    pub chunk_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { chunk_size: 16 }
    }
}

impl Config {
    /// Load configuration from `$ISCOPE_CONFIG`, or the default location
    /// if it exists, then apply environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var_os("ISCOPE_CONFIG") {
            Some(path) => Self::load_from(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load_from(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Override device settings from `ISCOPE_DEVICE` and `ISCOPE_BAUD`.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = var("ISCOPE_DEVICE") {
            self.device.path = PathBuf::from(path);
        }
        if let Some(baud) = var("ISCOPE_BAUD") {
            self.device.baud_rate = baud.trim().parse().map_err(|_| {
                Error::Config(format!("ISCOPE_BAUD is not a baud rate: {baud:?}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.path.as_os_str().is_empty() {
            return Err(Error::Config("device.path must not be empty".into()));
        }
        if self.device.baud_rate == 0 {
            return Err(Error::Config("device.baud_rate must be greater than zero".into()));
        }
        if self.capture.chunk_size == 0 {
            return Err(Error::Config("capture.chunk_size must be greater than zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_file_is_stock_link() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.device, DeviceConfig::default());
        assert_eq!(config.device.path, PathBuf::from("/dev/tty.iap"));
        assert_eq!(config.device.baud_rate, 19200);
        assert!(!config.device.restore_on_close);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.capture.chunk_size, 16);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_file() {
        let config = Config::from_toml(
            r#"
            [device]
            path = "/dev/ttyUSB0"
            baud_rate = 115200
            restore_on_close = true

            [log]
            level = "debug"

            [capture]
            chunk_size = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.device.path, PathBuf::from("/dev/ttyUSB0"));
        assert_eq!(config.device.baud_rate, 115200);
        assert!(config.device.restore_on_close);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.capture.chunk_size, 4);
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config = Config::from_toml("[device]\nbaud_rate = 9600\n").unwrap();
        assert_eq!(config.device.path, PathBuf::from(DEFAULT_DEVICE_PATH));
        assert_eq!(config.device.baud_rate, 9600);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ISCOPE_DEVICE", "/dev/pts/7"),
            ("ISCOPE_BAUD", " 57600 "),
        ]);
        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.device.path, PathBuf::from("/dev/pts/7"));
        assert_eq!(config.device.baud_rate, 57600);
    }

    #[test]
    fn test_bad_baud_override() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == "ISCOPE_BAUD").then(|| "fast".to_string())
        });
        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("fast"), "{msg}"),
            other => panic!("expected config error, got {other:?}"),
        }
        assert_eq!(config.device.baud_rate, DEFAULT_BAUD_RATE);
    }

    #[test]
    fn test_validate_rejects_zero_baud() {
        let config = Config::from_toml("[device]\nbaud_rate = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_path_and_chunk() {
        let config = Config::from_toml("[device]\npath = \"\"\n").unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = Config::from_toml("[capture]\nchunk_size = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: capture.chunk_size must be greater than zero"
        );
        assert_eq!(err.code(), -1);
    }

    #[test]
    fn test_unknown_type_is_error() {
        assert!(Config::from_toml("[device]\nbaud_rate = \"fast\"\n").is_err());
    }
}
