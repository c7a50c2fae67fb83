//! Simulated hardware bus.
//!
//! Devices are added and removed at runtime; registered handlers are probed
//! for matching arrivals and told about removals. Handlers are never called
//! with the bus lock held. DMA mappings are counted so tests can check that
//! every mapping is released.

use ndis_common::config::SimulationConfig;
use ndis_common::hardware::{
    BusAddress, BusBinding, DmaAddress, HardwareBus, HardwareDevice, HardwareError, HardwareId,
    HotplugHandler,
};
use ndis_common::ndis::MacAddress;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

const SIM_BUS: u8 = 2;
const DMA_BASE: u64 = 0x1000_0000;

/// Bus address of the `index`-th simulated device.
pub fn simulated_address(index: u8) -> BusAddress {
    BusAddress {
        bus: SIM_BUS,
        slot: index,
        function: 0,
    }
}

/// The `index`-th simulated device with match key `id`.
pub fn simulated_device(index: u8, id: HardwareId) -> HardwareDevice {
    let base = 0xf000_0000 + u64::from(index) * 0x1_0000;
    HardwareDevice {
        address: simulated_address(index),
        id,
        irq: 16 + u32::from(index),
        mem: base..base + 0x2000,
    }
}

/// Locally administered MAC derived from a bus address.
pub fn default_mac(address: BusAddress) -> MacAddress {
    MacAddress([
        0x02,
        0x00,
        0x4e,
        address.bus,
        address.slot,
        address.function,
    ])
}

struct Registration {
    id: u64,
    hardware: HardwareId,
    handler: Arc<dyn HotplugHandler>,
    bound: BTreeSet<BusAddress>,
}

#[derive(Default)]
struct BusState {
    devices: BTreeMap<BusAddress, HardwareDevice>,
    registrations: Vec<Registration>,
    next_binding: u64,
}

impl BusState {
    fn handler_for(&self, address: BusAddress) -> Option<Arc<dyn HotplugHandler>> {
        self.registrations
            .iter()
            .find(|r| r.bound.contains(&address))
            .map(|r| Arc::clone(&r.handler))
    }

    fn mark_bound(&mut self, binding: u64, address: BusAddress) {
        if let Some(registration) = self.registrations.iter_mut().find(|r| r.id == binding) {
            registration.bound.insert(address);
        }
    }
}

/// Software bus for development and tests.
#[derive(Default)]
pub struct SimulatedBus {
    state: Mutex<BusState>,
    live_mappings: AtomicU64,
    total_mappings: AtomicU64,
    next_dma: AtomicU64,
    fail_mappings: AtomicBool,
}

impl SimulatedBus {
    /// Empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus populated with the configured devices, in order. Devices past the
    /// last slot are ignored; `WrapperConfig::validate` rejects such lists.
    pub fn from_config(config: &SimulationConfig) -> Self {
        let bus = Self::new();
        {
            let mut state = bus.state.lock();
            for (index, dev) in (0..=u8::MAX).zip(&config.devices) {
                let device = simulated_device(index, HardwareId::new(dev.vendor, dev.device));
                state.devices.insert(device.address, device);
            }
        }
        bus
    }

    /// Plug in `device`; a matching registered handler probes it.
    pub fn add_device(&self, device: HardwareDevice) -> Result<(), HardwareError> {
        let address = device.address;
        let matching = {
            let mut state = self.state.lock();
            if state.devices.contains_key(&address) {
                return Err(HardwareError::ProbeFailed(format!(
                    "{} already present",
                    address
                )));
            }
            state.devices.insert(address, device.clone());
            state
                .registrations
                .iter()
                .find(|r| r.hardware == device.id)
                .map(|r| (r.id, Arc::clone(&r.handler)))
        };
        info!("{}: device {} arrived", address, device.id);

        let Some((binding, handler)) = matching else {
            return Ok(());
        };
        handler.probe(&device)?;
        self.state.lock().mark_bound(binding, address);
        Ok(())
    }

    /// Plug in a device with match key `id` at the lowest free slot.
    ///
    /// # Errors
    /// `HardwareError::ProbeFailed` when every slot is taken or a matching
    /// handler refuses the device.
    pub fn plug_in(&self, id: HardwareId) -> Result<BusAddress, HardwareError> {
        let index = {
            let state = self.state.lock();
            (0..=u8::MAX)
                .find(|&index| !state.devices.contains_key(&simulated_address(index)))
                .ok_or_else(|| HardwareError::ProbeFailed("simulated bus is full".to_string()))?
        };
        self.add_device(simulated_device(index, id))?;
        Ok(simulated_address(index))
    }

    /// Unplug the device at `address`; its handler is told first.
    pub fn remove_device(&self, address: BusAddress) -> Result<(), HardwareError> {
        let (device, handler) = {
            let mut state = self.state.lock();
            let device = state
                .devices
                .remove(&address)
                .ok_or_else(|| HardwareError::NoSuchDevice(address.to_string()))?;
            let handler = state.handler_for(address);
            for registration in &mut state.registrations {
                registration.bound.remove(&address);
            }
            (device, handler)
        };
        info!("{}: device removed", address);
        if let Some(handler) = handler {
            handler.remove(&device);
        }
        Ok(())
    }

    /// Deliver a suspend to the handler bound to `address`.
    pub fn suspend(&self, address: BusAddress) -> Result<(), HardwareError> {
        let (device, handler) = self.bound(address)?;
        handler.suspend(&device)
    }

    /// Deliver a resume to the handler bound to `address`.
    pub fn resume(&self, address: BusAddress) -> Result<(), HardwareError> {
        let (device, handler) = self.bound(address)?;
        handler.resume(&device)
    }

    fn bound(
        &self,
        address: BusAddress,
    ) -> Result<(HardwareDevice, Arc<dyn HotplugHandler>), HardwareError> {
        let state = self.state.lock();
        let device = state
            .devices
            .get(&address)
            .cloned()
            .ok_or_else(|| HardwareError::NoSuchDevice(address.to_string()))?;
        let handler = state
            .handler_for(address)
            .ok_or_else(|| HardwareError::NoSuchDevice(format!("{} is not bound", address)))?;
        Ok((device, handler))
    }

    /// Present devices, ordered by address.
    pub fn devices(&self) -> Vec<HardwareDevice> {
        self.state.lock().devices.values().cloned().collect()
    }

    /// Number of active driver registrations.
    pub fn registration_count(&self) -> usize {
        self.state.lock().registrations.len()
    }

    /// True if a handler is bound to `address`.
    pub fn is_bound(&self, address: BusAddress) -> bool {
        self.state.lock().handler_for(address).is_some()
    }

    /// Make every following `map_single` fail (or succeed again).
    pub fn fail_mappings(&self, fail: bool) {
        self.fail_mappings.store(fail, Ordering::Release);
    }

    /// Mappings not yet released.
    pub fn live_mappings(&self) -> u64 {
        self.live_mappings.load(Ordering::Acquire)
    }

    /// Mappings created since start.
    pub fn total_mappings(&self) -> u64 {
        self.total_mappings.load(Ordering::Acquire)
    }
}

impl HardwareBus for SimulatedBus {
    fn find_device(&self, id: HardwareId) -> Option<HardwareDevice> {
        self.state
            .lock()
            .devices
            .values()
            .find(|d| d.id == id)
            .cloned()
    }

    fn register_driver(
        &self,
        id: HardwareId,
        handler: Arc<dyn HotplugHandler>,
    ) -> Result<BusBinding, HardwareError> {
        let (binding, present) = {
            let mut state = self.state.lock();
            if state.registrations.iter().any(|r| r.hardware == id) {
                return Err(HardwareError::RegistrationFailed(format!(
                    "{} already claimed",
                    id
                )));
            }
            state.next_binding += 1;
            let binding = state.next_binding;
            state.registrations.push(Registration {
                id: binding,
                hardware: id,
                handler: Arc::clone(&handler),
                bound: BTreeSet::new(),
            });
            let present: Vec<HardwareDevice> = state
                .devices
                .values()
                .filter(|d| d.id == id)
                .cloned()
                .collect();
            (binding, present)
        };
        debug!("{}: registered binding {}", id, binding);

        for device in present {
            match handler.probe(&device) {
                Ok(()) => self.state.lock().mark_bound(binding, device.address),
                Err(e) => warn!("{}: probe failed: {}", device.address, e),
            }
        }
        Ok(BusBinding {
            id: binding,
            hardware: id,
        })
    }

    fn unregister_driver(&self, binding: BusBinding) {
        let removed = {
            let mut state = self.state.lock();
            let Some(index) = state
                .registrations
                .iter()
                .position(|r| r.id == binding.id)
            else {
                warn!("{}: unknown binding {}", binding.hardware, binding.id);
                return;
            };
            let registration = state.registrations.remove(index);
            let devices: Vec<HardwareDevice> = registration
                .bound
                .iter()
                .filter_map(|address| state.devices.get(address).cloned())
                .collect();
            (registration.handler, devices)
        };
        let (handler, devices) = removed;
        for device in devices {
            handler.remove(&device);
        }
        debug!("{}: binding {} released", binding.hardware, binding.id);
    }

    fn map_single(
        &self,
        device: &HardwareDevice,
        data: &[u8],
    ) -> Result<DmaAddress, HardwareError> {
        if self.fail_mappings.load(Ordering::Acquire) {
            return Err(HardwareError::DmaMapFailed(format!(
                "{}: {} bytes",
                device.address,
                data.len()
            )));
        }
        self.live_mappings.fetch_add(1, Ordering::AcqRel);
        self.total_mappings.fetch_add(1, Ordering::AcqRel);
        let offset = self
            .next_dma
            .fetch_add(data.len().max(1) as u64, Ordering::Relaxed);
        Ok(DmaAddress(DMA_BASE + offset))
    }

    fn unmap_single(&self, device: &HardwareDevice, addr: DmaAddress, len: usize) {
        let previous = self
            .live_mappings
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if previous.is_err() {
            warn!(
                "{}: unmap of {:#x} ({} bytes) without a mapping",
                device.address, addr.0, len
            );
        }
    }
}
