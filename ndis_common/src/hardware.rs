//! Hardware bus contract.
//!
//! This module defines:
//! - `HardwareId` - vendor/device match key
//! - `HardwareDevice` - one discovered hardware instance
//! - `HardwareBus` trait - discovery, hot-plug registration and DMA mapping
//! - `HotplugHandler` trait - arrival/removal/power callbacks delivered by the bus
//! - `HardwareError` enum - bus error types

use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;

/// Error types for bus operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardwareError {
    /// Handler refused the device.
    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    /// Bus rejected the driver registration.
    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    /// DMA mapping could not be established.
    #[error("DMA mapping failed: {0}")]
    DmaMapFailed(String),

    /// Device is not present on the bus.
    #[error("No such device: {0}")]
    NoSuchDevice(String),

    /// Power transition failed.
    #[error("Power transition failed: {0}")]
    PowerFailed(String),
}

/// Vendor/device identifier pair used to match drivers to hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HardwareId {
    /// Vendor identifier.
    pub vendor: u16,
    /// Device identifier.
    pub device: u16,
}

impl HardwareId {
    /// Create a match key.
    pub const fn new(vendor: u16, device: u16) -> Self {
        Self { vendor, device }
    }
}

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor, self.device)
    }
}

/// Location of a device on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BusAddress {
    /// Bus number.
    pub bus: u8,
    /// Slot number.
    pub slot: u8,
    /// Function number.
    pub function: u8,
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0000:{:02x}:{:02x}.{}", self.bus, self.slot, self.function)
    }
}

/// A discovered hardware instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareDevice {
    /// Bus location.
    pub address: BusAddress,
    /// Match key.
    pub id: HardwareId,
    /// Interrupt line.
    pub irq: u32,
    /// Memory-mapped register window.
    pub mem: Range<u64>,
}

/// Bus address of a mapped buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DmaAddress(pub u64);

/// Token returned by `HardwareBus::register_driver`, consumed by
/// `HardwareBus::unregister_driver`.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct BusBinding {
    /// Registration sequence number assigned by the bus.
    pub id: u64,
    /// Match key the registration covers.
    pub hardware: HardwareId,
}

/// Callbacks the bus delivers for devices matching a registered driver.
///
/// `probe` is called for every present device at registration time and for
/// every device that arrives later. `remove` is called for each bound device
/// when it leaves the bus or when the driver is unregistered.
pub trait HotplugHandler: Send + Sync {
    /// Bind a device. An error leaves the device unbound.
    fn probe(&self, device: &HardwareDevice) -> Result<(), HardwareError>;

    /// Unbind a device previously accepted by `probe`.
    fn remove(&self, device: &HardwareDevice);

    /// Enter a low-power state. Called from a context that may block.
    fn suspend(&self, _device: &HardwareDevice) -> Result<(), HardwareError> {
        Ok(())
    }

    /// Return to full power. Called from a context that may block.
    fn resume(&self, _device: &HardwareDevice) -> Result<(), HardwareError> {
        Ok(())
    }
}

/// Host hardware bus.
pub trait HardwareBus: Send + Sync {
    /// Find a present device matching `id`.
    fn find_device(&self, id: HardwareId) -> Option<HardwareDevice>;

    /// Register a hot-plug handler for `id`; probes every present device
    /// before returning. Probe failures do not fail the registration.
    fn register_driver(
        &self,
        id: HardwareId,
        handler: Arc<dyn HotplugHandler>,
    ) -> Result<BusBinding, HardwareError>;

    /// Unregister a handler; `remove` is delivered for every bound device
    /// before returning.
    fn unregister_driver(&self, binding: BusBinding);

    /// Map a buffer for device reads.
    fn map_single(&self, device: &HardwareDevice, data: &[u8])
    -> Result<DmaAddress, HardwareError>;

    /// Release a mapping created by `map_single`.
    fn unmap_single(&self, device: &HardwareDevice, addr: DmaAddress, len: usize);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_id_display() {
        assert_eq!(HardwareId::new(0x14e4, 0x4320).to_string(), "14e4:4320");
    }

    #[test]
    fn test_bus_address_display() {
        let addr = BusAddress {
            bus: 2,
            slot: 0x1f,
            function: 3,
        };
        assert_eq!(addr.to_string(), "0000:02:1f.3");
    }

    #[test]
    fn test_hardware_error_display() {
        let err = HardwareError::ProbeFailed("init returned 0xc0000001".to_string());
        assert!(err.to_string().contains("0xc0000001"));
    }
}
