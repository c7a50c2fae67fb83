//! Registry of started drivers.
//!
//! One `RegisteredDriver` per loaded foreign image. A record is the bus's
//! hot-plug handler for its hardware key and owns the device handles it
//! bound. The registry itself is a single lock around a short list; no
//! miniport or bus call is made while it is held.

use crate::error::{Result, WrapperError};
use crate::handle::{AdapterSetup, DeviceHandle};
use ndis_common::consts::MAX_DRIVER_NAME_LEN;
use ndis_common::hardware::{
    BusAddress, BusBinding, HardwareDevice, HardwareError, HardwareId, HotplugHandler,
};
use ndis_common::setting::Setting;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Registry-assigned driver identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DriverId(pub u64);

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "driver#{}", self.0)
    }
}

/// Bounded driver name.
pub type DriverName = heapless::String<32>;

/// Build a driver name from `raw`, truncated to 31 bytes at a character
/// boundary.
pub fn driver_name(raw: &str) -> DriverName {
    let mut end = raw.len().min(MAX_DRIVER_NAME_LEN);
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    DriverName::try_from(&raw[..end]).unwrap_or_default()
}

/// Registration state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// Not (or no longer) registered with the bus.
    Unregistered,
    /// Hot-plug handler registered with the bus.
    Registered,
}

/// A started driver.
pub struct RegisteredDriver {
    name: DriverName,
    hardware: HardwareId,
    image: Vec<u8>,
    setup: AdapterSetup,
    state: Mutex<RegistrationState>,
    binding: Mutex<Option<BusBinding>>,
    handles: Mutex<BTreeMap<BusAddress, Arc<DeviceHandle>>>,
}

impl RegisteredDriver {
    /// Create an unregistered record. The record's id is `setup.driver_id`.
    pub fn new(name: DriverName, hardware: HardwareId, image: Vec<u8>, setup: AdapterSetup) -> Self {
        Self {
            name,
            hardware,
            image,
            setup,
            state: Mutex::new(RegistrationState::Unregistered),
            binding: Mutex::new(None),
            handles: Mutex::new(BTreeMap::new()),
        }
    }

    /// Registry id.
    pub fn id(&self) -> DriverId {
        self.setup.driver_id
    }

    /// Driver name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hardware match key.
    pub fn hardware(&self) -> HardwareId {
        self.hardware
    }

    /// Size of the owned image copy.
    pub fn image_len(&self) -> usize {
        self.image.len()
    }

    /// Settings attached before start.
    pub fn settings(&self) -> &[Setting] {
        &self.setup.settings
    }

    /// Registration state.
    pub fn state(&self) -> RegistrationState {
        *self.state.lock()
    }

    /// Record the bus binding; the record is now registered.
    pub(crate) fn bind(&self, binding: BusBinding) {
        *self.binding.lock() = Some(binding);
        *self.state.lock() = RegistrationState::Registered;
    }

    /// Unregister from the bus and tear down every handle still bound.
    pub(crate) fn unbind(&self) {
        let binding = self.binding.lock().take();
        if let Some(binding) = binding {
            self.setup.bus.unregister_driver(binding);
        }
        let remaining = std::mem::take(&mut *self.handles.lock());
        for handle in remaining.into_values() {
            handle.teardown();
        }
        *self.state.lock() = RegistrationState::Unregistered;
    }

    /// Bound device handles, ordered by bus address.
    pub fn handles(&self) -> Vec<Arc<DeviceHandle>> {
        self.handles.lock().values().cloned().collect()
    }

    /// Handle bound to `address`.
    pub fn handle(&self, address: BusAddress) -> Option<Arc<DeviceHandle>> {
        self.handles.lock().get(&address).cloned()
    }
}

impl fmt::Debug for RegisteredDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredDriver")
            .field("id", &self.id())
            .field("name", &self.name)
            .field("hardware", &self.hardware)
            .field("image_len", &self.image.len())
            .field("settings", &self.setup.settings.len())
            .field("state", &self.state())
            .finish()
    }
}

impl HotplugHandler for RegisteredDriver {
    fn probe(&self, device: &HardwareDevice) -> std::result::Result<(), HardwareError> {
        if self.handles.lock().contains_key(&device.address) {
            debug!("{}: already bound to {}", device.address, self.name);
            return Ok(());
        }
        let handle = DeviceHandle::probe(&self.setup, device.clone())
            .map_err(|e| HardwareError::ProbeFailed(format!("{}: {}", device.address, e)))?;
        let duplicate = match self.handles.lock().entry(device.address) {
            Entry::Vacant(slot) => {
                slot.insert(handle);
                None
            }
            Entry::Occupied(_) => Some(handle),
        };
        if let Some(handle) = duplicate {
            debug!("{}: lost bind race for {}", device.address, self.name);
            handle.teardown();
        }
        Ok(())
    }

    fn remove(&self, device: &HardwareDevice) {
        let handle = self.handles.lock().remove(&device.address);
        match handle {
            Some(handle) => handle.teardown(),
            None => debug!("{}: not bound to {}", device.address, self.name),
        }
    }

    fn suspend(&self, device: &HardwareDevice) -> std::result::Result<(), HardwareError> {
        let handle = self
            .handle(device.address)
            .ok_or_else(|| HardwareError::NoSuchDevice(device.address.to_string()))?;
        handle
            .suspend()
            .map_err(|e| HardwareError::PowerFailed(e.to_string()))
    }

    fn resume(&self, device: &HardwareDevice) -> std::result::Result<(), HardwareError> {
        let handle = self
            .handle(device.address)
            .ok_or_else(|| HardwareError::NoSuchDevice(device.address.to_string()))?;
        handle
            .resume()
            .map_err(|e| HardwareError::PowerFailed(e.to_string()))
    }
}

/// Registry of started drivers.
///
/// At most one record per hardware key and per name.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: Mutex<Vec<Arc<RegisteredDriver>>>,
    next_id: AtomicU64,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a driver id.
    pub fn next_id(&self) -> DriverId {
        DriverId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Insert a record.
    ///
    /// # Errors
    /// `WrapperError::Duplicate` if a record with the same hardware key or
    /// name exists; the registry is left unchanged.
    pub fn insert(&self, driver: Arc<RegisteredDriver>) -> Result<()> {
        let mut drivers = self.drivers.lock();
        if let Some(existing) = drivers
            .iter()
            .find(|d| d.hardware == driver.hardware || d.name == driver.name)
        {
            warn!(
                "{} ({}) conflicts with registered {} ({})",
                driver.name, driver.hardware, existing.name, existing.hardware
            );
            return Err(WrapperError::Duplicate {
                name: existing.name.to_string(),
                hardware: existing.hardware,
            });
        }
        info!("registered {} for {}", driver.name, driver.hardware);
        drivers.push(driver);
        Ok(())
    }

    /// Remove a record by id.
    pub fn remove(&self, id: DriverId) -> Option<Arc<RegisteredDriver>> {
        let mut drivers = self.drivers.lock();
        let index = drivers.iter().position(|d| d.id() == id)?;
        Some(drivers.remove(index))
    }

    /// Remove a record by name.
    pub fn remove_by_name(&self, name: &str) -> Option<Arc<RegisteredDriver>> {
        let mut drivers = self.drivers.lock();
        let index = drivers.iter().position(|d| d.name() == name)?;
        Some(drivers.remove(index))
    }

    /// Find a record by name.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<RegisteredDriver>> {
        self.drivers
            .lock()
            .iter()
            .find(|d| d.name() == name)
            .cloned()
    }

    /// Remove and return every record.
    pub fn drain(&self) -> Vec<Arc<RegisteredDriver>> {
        std::mem::take(&mut *self.drivers.lock())
    }

    /// Current records, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<RegisteredDriver>> {
        self.drivers.lock().clone()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.drivers.lock().len()
    }

    /// True when no driver is registered.
    pub fn is_empty(&self) -> bool {
        self.drivers.lock().is_empty()
    }
}
