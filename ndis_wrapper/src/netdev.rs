//! In-process network stack.
//!
//! Keeps the interface table the wrapper registers into and counts delivered
//! frames. Used by the binary and by tests in place of a kernel stack.

use ndis_common::ndis::MacAddress;
use ndis_common::netdev::{NetStack, NetdevError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::{debug, info};

const NAME_PLACEHOLDER: &str = "%d";
const MAX_INDEX: u32 = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Interface {
    mac: MacAddress,
    rx_frames: u64,
}

/// Interface table of a local network stack.
#[derive(Debug, Default)]
pub struct LocalNetStack {
    interfaces: Mutex<BTreeMap<String, Interface>>,
}

impl LocalNetStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered interface names, sorted.
    pub fn interfaces(&self) -> Vec<String> {
        self.interfaces.lock().keys().cloned().collect()
    }

    /// Hardware address of a registered interface.
    pub fn mac(&self, name: &str) -> Option<MacAddress> {
        self.interfaces.lock().get(name).map(|i| i.mac)
    }

    /// Frames delivered to `name`.
    pub fn rx_frames(&self, name: &str) -> u64 {
        self.interfaces
            .lock()
            .get(name)
            .map_or(0, |i| i.rx_frames)
    }
}

impl NetStack for LocalNetStack {
    fn register_netdev(&self, template: &str, mac: MacAddress) -> Result<String, NetdevError> {
        if template.matches(NAME_PLACEHOLDER).count() != 1 {
            return Err(NetdevError::InvalidTemplate(template.to_string()));
        }
        let mut interfaces = self.interfaces.lock();
        let name = (0..MAX_INDEX)
            .map(|i| template.replacen(NAME_PLACEHOLDER, &i.to_string(), 1))
            .find(|candidate| !interfaces.contains_key(candidate))
            .ok_or_else(|| NetdevError::NamesExhausted(template.to_string()))?;
        interfaces.insert(name.clone(), Interface { mac, rx_frames: 0 });
        info!("registered interface {} ({})", name, mac);
        Ok(name)
    }

    fn unregister_netdev(&self, name: &str) -> Result<(), NetdevError> {
        self.interfaces
            .lock()
            .remove(name)
            .map(|_| info!("unregistered interface {}", name))
            .ok_or_else(|| NetdevError::UnknownInterface(name.to_string()))
    }

    fn receive(&self, name: &str, frame: &[u8]) {
        if let Some(iface) = self.interfaces.lock().get_mut(name) {
            iface.rx_frames += 1;
            debug!("{}: received {} bytes", name, frame.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowest_free_index() {
        let stack = LocalNetStack::new();
        let mac = MacAddress([0, 1, 2, 3, 4, 5]);
        assert_eq!(stack.register_netdev("wlan%d", mac).unwrap(), "wlan0");
        assert_eq!(stack.register_netdev("wlan%d", mac).unwrap(), "wlan1");
        stack.unregister_netdev("wlan0").unwrap();
        assert_eq!(stack.register_netdev("wlan%d", mac).unwrap(), "wlan0");
        assert_eq!(stack.interfaces(), vec!["wlan0", "wlan1"]);
    }

    #[test]
    fn test_invalid_template() {
        let stack = LocalNetStack::new();
        let err = stack.register_netdev("wlan", MacAddress::default());
        assert!(matches!(err, Err(NetdevError::InvalidTemplate(_))));
    }

    #[test]
    fn test_unregister_unknown() {
        let stack = LocalNetStack::new();
        assert!(matches!(
            stack.unregister_netdev("eth7"),
            Err(NetdevError::UnknownInterface(_))
        ));
    }

    #[test]
    fn test_receive_counts_frames() {
        let stack = LocalNetStack::new();
        let name = stack.register_netdev("eth%d", MacAddress::default()).unwrap();
        stack.receive(&name, &[0u8; 60]);
        stack.receive("missing0", &[0u8; 60]);
        assert_eq!(stack.rx_frames(&name), 1);
    }
}
