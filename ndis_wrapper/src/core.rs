//! Wrapper core: driver load/start/unload against a bus, loader and host
//! network stack.
//!
//! The `NdisWrapper` struct is the main entry point. Drivers normally arrive
//! through a `ControlChannel`; `load_driver` and `start_driver` are the two
//! halves of that protocol.

use crate::control::ControlChannel;
use crate::driver_registry::{DriverName, DriverRegistry, RegisteredDriver, driver_name};
use crate::error::{Result, WrapperError};
use crate::handle::{AdapterSetup, DeviceHandle};
use ndis_common::config::WrapperConfig;
use ndis_common::hardware::{HardwareBus, HardwareId};
use ndis_common::miniport::{DriverEntry, ImageLoader};
use ndis_common::netdev::NetStack;
use ndis_common::setting::Setting;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A driver image that passed the loader and has matching hardware, not yet
/// started.
pub struct LoadedDriver {
    name: DriverName,
    hardware: HardwareId,
    image: Vec<u8>,
    entry: Arc<dyn DriverEntry>,
    settings: Vec<Setting>,
}

impl LoadedDriver {
    /// Driver name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hardware match key.
    pub fn hardware(&self) -> HardwareId {
        self.hardware
    }

    /// Settings attached so far, in order.
    pub fn settings(&self) -> &[Setting] {
        &self.settings
    }

    /// Append a setting.
    pub fn add_setting(&mut self, setting: Setting) {
        debug!("{}: setting {} = {}", self.name, setting.name(), setting.value());
        self.settings.push(setting);
    }
}

impl fmt::Debug for LoadedDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedDriver")
            .field("name", &self.name)
            .field("hardware", &self.hardware)
            .field("image_len", &self.image.len())
            .field("settings", &self.settings)
            .finish()
    }
}

/// Wrapper core.
pub struct NdisWrapper {
    config: WrapperConfig,
    registry: DriverRegistry,
    bus: Arc<dyn HardwareBus>,
    loader: Arc<dyn ImageLoader>,
    netstack: Arc<dyn NetStack>,
}

impl NdisWrapper {
    /// Create a wrapper over the given collaborators.
    ///
    /// # Errors
    /// `WrapperError::Config` if the configuration is invalid.
    pub fn new(
        config: WrapperConfig,
        bus: Arc<dyn HardwareBus>,
        loader: Arc<dyn ImageLoader>,
        netstack: Arc<dyn NetStack>,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            "NdisWrapper created (basename={}, scan={}ms, hangcheck={}ms)",
            config.wrapper.basename,
            config.wrapper.scan_interval_ms,
            config.wrapper.hangcheck_interval_ms
        );
        Ok(Self {
            config,
            registry: DriverRegistry::new(),
            bus,
            loader,
            netstack,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &WrapperConfig {
        &self.config
    }

    /// Open a control channel. Each channel holds at most one pending load.
    pub fn open_control(&self) -> ControlChannel<'_> {
        ControlChannel::new(self)
    }

    /// Copy `image`, resolve its entry point and check that matching
    /// hardware is present.
    ///
    /// # Errors
    /// - `WrapperError::InvalidArgument` for an empty name
    /// - `WrapperError::ResourceExhausted` if the image cannot be copied
    /// - `WrapperError::InvalidImage` if the loader rejects the image
    /// - `WrapperError::HardwareNotPresent` if no device matches `hardware`
    pub fn load_driver(
        &self,
        name: &str,
        hardware: HardwareId,
        image: &[u8],
    ) -> Result<LoadedDriver> {
        if name.is_empty() {
            return Err(WrapperError::InvalidArgument(
                "driver name is empty".to_string(),
            ));
        }
        let name = driver_name(name);

        let mut copy = Vec::new();
        copy.try_reserve_exact(image.len())
            .map_err(|_| WrapperError::ResourceExhausted {
                what: "driver image",
            })?;
        copy.extend_from_slice(image);

        let entry = self.loader.prepare_image(&copy).map_err(|e| {
            warn!("{}: {}", name, e);
            WrapperError::from(e)
        })?;

        if self.bus.find_device(hardware).is_none() {
            warn!("{}: no hardware matching {}", name, hardware);
            return Err(WrapperError::HardwareNotPresent(hardware));
        }

        info!("loaded {} ({} bytes) for {}", name, copy.len(), hardware);
        Ok(LoadedDriver {
            name,
            hardware,
            image: copy,
            entry,
            settings: Vec::new(),
        })
    }

    /// Call the entry routine, register the driver and bind it to every
    /// present matching device.
    ///
    /// # Errors
    /// - `WrapperError::EntryFailed` if the entry routine fails
    /// - `WrapperError::Duplicate` if the hardware key or name is taken
    /// - `WrapperError::Hardware` if the bus refuses the registration
    ///
    /// On error nothing stays registered.
    pub fn start_driver(&self, loaded: LoadedDriver) -> Result<Arc<RegisteredDriver>> {
        let LoadedDriver {
            name,
            hardware,
            image,
            entry,
            settings,
        } = loaded;

        let miniport = entry.call().map_err(|status| {
            warn!("{}: entry routine failed with {}", name, status);
            WrapperError::EntryFailed(status)
        })?;

        let setup = AdapterSetup {
            driver_id: self.registry.next_id(),
            driver_name: name.to_string(),
            miniport,
            settings: Arc::from(settings),
            bus: Arc::clone(&self.bus),
            netstack: Arc::clone(&self.netstack),
            config: self.config.wrapper.clone(),
        };
        let driver = Arc::new(RegisteredDriver::new(name, hardware, image, setup));
        self.registry.insert(Arc::clone(&driver))?;

        match self.bus.register_driver(hardware, driver.clone()) {
            Ok(binding) => driver.bind(binding),
            Err(e) => {
                warn!("{}: bus registration failed: {}", driver.name(), e);
                self.registry.remove(driver.id());
                return Err(e.into());
            }
        }

        info!(
            "started {} ({}) with {} device(s)",
            driver.name(),
            driver.id(),
            driver.handles().len()
        );
        Ok(driver)
    }

    /// Unbind and remove the driver called `name`.
    ///
    /// # Errors
    /// `WrapperError::DriverNotFound` if no such driver is registered.
    pub fn unload(&self, name: &str) -> Result<()> {
        let driver = self
            .registry
            .find_by_name(name)
            .ok_or_else(|| WrapperError::DriverNotFound(name.to_string()))?;
        // Listed until every device is unbound.
        driver.unbind();
        self.registry.remove_by_name(name);
        info!("unloaded {}", name);
        Ok(())
    }

    /// Unload every driver.
    pub fn shutdown(&self) {
        let drivers = self.registry.drain();
        if drivers.is_empty() {
            return;
        }
        info!("shutting down {} driver(s)", drivers.len());
        for driver in drivers {
            driver.unbind();
            debug!("unloaded {}", driver.name());
        }
    }

    /// Registered drivers.
    pub fn drivers(&self) -> Vec<Arc<RegisteredDriver>> {
        self.registry.snapshot()
    }

    /// Registered driver called `name`.
    pub fn driver(&self, name: &str) -> Option<Arc<RegisteredDriver>> {
        self.registry.find_by_name(name)
    }

    /// Every bound device handle.
    pub fn devices(&self) -> Vec<Arc<DeviceHandle>> {
        self.registry
            .snapshot()
            .iter()
            .flat_map(|driver| driver.handles())
            .collect()
    }

    /// Device handle whose interface is called `name`.
    pub fn device(&self, name: &str) -> Option<Arc<DeviceHandle>> {
        self.devices().into_iter().find(|h| h.name() == name)
    }
}

impl Drop for NdisWrapper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
