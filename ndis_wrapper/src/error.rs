//! Error types for wrapper operations

use ndis_common::config::ConfigError;
use ndis_common::hardware::{HardwareError, HardwareId};
use ndis_common::miniport::LoaderError;
use ndis_common::ndis::Status;
use ndis_common::netdev::NetdevError;
use ndis_common::setting::SettingError;
use thiserror::Error;

/// Errors that can occur during wrapper operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WrapperError {
    /// Allocation failed; nothing was changed
    #[error("Resource exhausted: {what}")]
    ResourceExhausted {
        /// What could not be allocated
        what: &'static str,
    },

    /// Miniport returned a non-success, non-pending status
    #[error("Miniport request failed with status {0}")]
    Miniport(Status),

    /// Module entry routine failed
    #[error("Driver entry failed with status {0}")]
    EntryFailed(Status),

    /// Adapter initialization failed
    #[error("Adapter initialization failed with status {0}")]
    InitFailed(Status),

    /// Malformed request or unknown control code
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Declared size does not match the payload
    #[error("Size mismatch: declared {declared}, actual {actual}")]
    SizeMismatch {
        /// Size announced in the header
        declared: usize,
        /// Size received
        actual: usize,
    },

    /// Payload shorter than its fixed header
    #[error("Truncated payload: need {needed} bytes, got {actual}")]
    Truncated {
        /// Minimum size
        needed: usize,
        /// Size received
        actual: usize,
    },

    /// Another registered driver claims the same hardware or name
    #[error("Duplicate driver: {name} ({hardware})")]
    Duplicate {
        /// Driver name
        name: String,
        /// Hardware match key
        hardware: HardwareId,
    },

    /// No device matching the hardware key is present
    #[error("No hardware present for {0}")]
    HardwareNotPresent(HardwareId),

    /// Image rejected by the loader
    #[error("Invalid image: {0}")]
    InvalidImage(#[from] LoaderError),

    /// A driver record is already pending on this channel
    #[error("A driver load is already pending")]
    LoadPending,

    /// No registered driver with this name
    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    /// Interface is detached, stopped or torn down
    #[error("Device not ready: {0}")]
    NotReady(String),

    /// Setting payload rejected
    #[error("Invalid setting: {0}")]
    Setting(#[from] SettingError),

    /// Bus operation failed
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),

    /// Host interface registration failed
    #[error("Network device error: {0}")]
    Netdev(#[from] NetdevError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ConfigError> for WrapperError {
    fn from(err: ConfigError) -> Self {
        WrapperError::Config(err.to_string())
    }
}

/// Result type alias for wrapper operations
pub type Result<T> = std::result::Result<T, WrapperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WrapperError::Miniport(Status::FAILURE);
        assert!(err.to_string().contains("0xc0000001"));

        let err = WrapperError::Duplicate {
            name: "bcmwl5".to_string(),
            hardware: HardwareId::new(0x14e4, 0x4320),
        };
        assert!(err.to_string().contains("bcmwl5"));
        assert!(err.to_string().contains("14e4:4320"));
    }

    #[test]
    fn test_from_loader_error() {
        let err: WrapperError = LoaderError::InvalidImage("bad magic".to_string()).into();
        assert!(matches!(err, WrapperError::InvalidImage(_)));
    }
}
