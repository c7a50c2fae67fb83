//! Simulation backends.
//!
//! A software bus, miniport and image loader for development and testing
//! without foreign driver images or hardware.

mod bus;
mod loader;
mod miniport;

pub use bus::{SimulatedBus, default_mac, simulated_address, simulated_device};
pub use loader::{IMAGE_SIGNATURE, SimulationLoader};
pub use miniport::{MiniportCall, NETWORK_ADDRESS_SETTING, SimulatedMiniport};

use ndis_common::config::SimulationConfig;
use ndis_common::ndis::MacAddress;
use std::sync::Arc;
use tracing::warn;

/// Simulated miniport configured from `[simulation]`.
pub fn create_miniport(config: &SimulationConfig) -> SimulatedMiniport {
    let mut miniport = SimulatedMiniport::new()
        .with_pending_requests(config.pending_requests)
        .with_pending_sends(config.pending_sends);
    for (index, device) in config.devices.iter().enumerate() {
        let Some(text) = &device.mac else {
            continue;
        };
        match MacAddress::parse(text) {
            Some(mac) => miniport = miniport.with_mac(simulated_address(index as u8), mac),
            None => warn!("device {}: ignoring malformed MAC '{}'", index, text),
        }
    }
    miniport
}

/// Bus, loader and the miniport behind the loader, from `[simulation]`.
pub fn create_backend(
    config: &SimulationConfig,
) -> (Arc<SimulatedBus>, Arc<SimulationLoader>, Arc<SimulatedMiniport>) {
    let miniport = Arc::new(create_miniport(config));
    let loader = Arc::new(SimulationLoader::new(miniport.clone()));
    let bus = Arc::new(SimulatedBus::from_config(config));
    (bus, loader, miniport)
}
