//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load the wrapper's TOML
//! configuration file.
//!
//! # Usage
//!
//! ```rust,no_run
//! use ndis_common::config::{ConfigError, ConfigLoader, WrapperConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = WrapperConfig::load(Path::new("ndiswrapper.toml"))?;
//!     config.validate()?;
//!     println!("Interfaces will be named {}N", config.wrapper.basename);
//!     Ok(())
//! }
//! ```

use crate::consts::{
    DEFAULT_BASENAME, DEFAULT_HANGCHECK_INTERVAL_MS, DEFAULT_SCAN_INTERVAL_MS, MAX_BASENAME_LEN,
    MAX_SIMULATED_DEVICES, WRAPPER_SERVICE_NAME,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

fn default_service_name() -> String {
    WRAPPER_SERVICE_NAME.to_string()
}

/// Common configuration fields.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "ndiswrapper-lab"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: default_service_name(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_basename() -> String {
    DEFAULT_BASENAME.to_string()
}

fn default_scan_interval_ms() -> u64 {
    DEFAULT_SCAN_INTERVAL_MS
}

fn default_hangcheck_interval_ms() -> u64 {
    DEFAULT_HANGCHECK_INTERVAL_MS
}

/// Per-adapter behaviour applied to every Device Handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Interface basename; the host appends an index (`wlan` -> `wlan0`).
    #[serde(default = "default_basename")]
    pub basename: String,

    /// Scan trigger period in milliseconds.
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    /// Hang-check period in milliseconds. 0 disables the hang check.
    #[serde(default = "default_hangcheck_interval_ms")]
    pub hangcheck_interval_ms: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            basename: default_basename(),
            scan_interval_ms: default_scan_interval_ms(),
            hangcheck_interval_ms: default_hangcheck_interval_ms(),
        }
    }
}

impl AdapterConfig {
    /// Scan trigger period.
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    /// Hang-check period, `None` when disabled.
    pub fn hangcheck_interval(&self) -> Option<Duration> {
        (self.hangcheck_interval_ms > 0).then(|| Duration::from_millis(self.hangcheck_interval_ms))
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `basename` is empty, longer than `MAX_BASENAME_LEN` or contains `%`/`/`
    /// - `scan_interval_ms` is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.basename.is_empty() {
            return Err(ConfigError::ValidationError(
                "basename cannot be empty".to_string(),
            ));
        }
        if self.basename.len() > MAX_BASENAME_LEN {
            return Err(ConfigError::ValidationError(format!(
                "basename '{}' is too long (max {} bytes)",
                self.basename, MAX_BASENAME_LEN
            )));
        }
        if self.basename.contains(['%', '/']) || self.basename.contains(char::is_whitespace) {
            return Err(ConfigError::ValidationError(format!(
                "basename '{}' contains invalid characters",
                self.basename
            )));
        }
        if self.scan_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "scan_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// A device the simulated bus exposes at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedDeviceConfig {
    /// PCI vendor identifier.
    pub vendor: u16,
    /// PCI device identifier.
    pub device: u16,
    /// Permanent MAC address reported by the simulated miniport.
    #[serde(default)]
    pub mac: Option<String>,
}

/// Simulation backend configuration (`--simulate` mode).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Devices present on the simulated bus.
    #[serde(default)]
    pub devices: Vec<SimulatedDeviceConfig>,

    /// Complete query/set requests asynchronously.
    #[serde(default)]
    pub pending_requests: bool,

    /// Complete sends asynchronously.
    #[serde(default)]
    pub pending_sends: bool,
}

impl SimulationConfig {
    /// Validate the simulation section.
    ///
    /// # Errors
    /// `ConfigError::ValidationError` when more devices are listed than the
    /// simulated bus has slots.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.len() > MAX_SIMULATED_DEVICES {
            return Err(ConfigError::ValidationError(format!(
                "{} simulated devices listed (max {})",
                self.devices.len(),
                MAX_SIMULATED_DEVICES
            )));
        }
        Ok(())
    }
}

/// Main configuration loaded from `ndiswrapper.toml`.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "info"
///
/// [wrapper]
/// basename = "wlan"
/// scan_interval_ms = 10000
/// hangcheck_interval_ms = 2000
///
/// [[simulation.devices]]
/// vendor = 0x14e4
/// device = 0x4320
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WrapperConfig {
    /// Common fields.
    #[serde(default)]
    pub shared: SharedConfig,

    /// Adapter behaviour.
    #[serde(default)]
    pub wrapper: AdapterConfig,

    /// Simulation backend.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl WrapperConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.wrapper.validate()?;
        self.simulation.validate()?;
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Warn.as_directive(), "warn");
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"trace\"")
                .unwrap()
                .level,
            LogLevel::Trace
        );
        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"error\"")
                .unwrap()
                .level,
            LogLevel::Error
        );
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_adapter_config_defaults() {
        let config = AdapterConfig::default();
        assert_eq!(config.basename, "eth");
        assert_eq!(config.scan_interval(), Duration::from_secs(10));
        assert_eq!(config.hangcheck_interval(), Some(Duration::from_secs(2)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_adapter_config_basename_too_long() {
        let config = AdapterConfig {
            basename: "averyverylongname".to_string(),
            ..AdapterConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let config = AdapterConfig {
            basename: "wl%d".to_string(),
            ..AdapterConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_simulation_device_limit() {
        let device = SimulatedDeviceConfig {
            vendor: 0x14e4,
            device: 0x4320,
            mac: None,
        };
        let mut config = WrapperConfig::default();
        config.simulation.devices = vec![device; MAX_SIMULATED_DEVICES];
        assert!(config.validate().is_ok());

        config.simulation.devices.push(config.simulation.devices[0].clone());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_hangcheck_zero_disables() {
        let config = AdapterConfig {
            hangcheck_interval_ms: 0,
            ..AdapterConfig::default()
        };
        assert_eq!(config.hangcheck_interval(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = WrapperConfig::load(Path::new("/nonexistent/path/ndiswrapper.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = WrapperConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_wrapper_config_load() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[shared]
log_level = "debug"

[wrapper]
basename = "wlan"
scan_interval_ms = 500

[simulation]
pending_requests = true

[[simulation.devices]]
vendor = 0x14e4
device = 0x4320
mac = "00:11:22:33:44:55"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = WrapperConfig::load(file.path()).unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.shared.service_name, "ndiswrapper");
        assert_eq!(config.wrapper.basename, "wlan");
        assert_eq!(config.wrapper.scan_interval_ms, 500);
        assert_eq!(config.wrapper.hangcheck_interval_ms, 2000);
        assert!(config.simulation.pending_requests);
        assert_eq!(config.simulation.devices.len(), 1);
        assert_eq!(config.simulation.devices[0].vendor, 0x14e4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_wrapper_config_empty_file_uses_defaults() {
        let file = NamedTempFile::new().unwrap();
        let config = WrapperConfig::load(file.path()).unwrap();
        assert_eq!(config.wrapper, AdapterConfig::default());
        assert!(config.simulation.devices.is_empty());
    }
}
