//! Configuration-driven startup tests.

use ndis_common::config::{ConfigLoader, WrapperConfig};
use ndis_common::hardware::{HardwareBus, HardwareId};
use ndis_common::ndis::MacAddress;
use ndis_wrapper::NdisWrapper;
use ndis_wrapper::drivers::simulation::create_backend;
use ndis_wrapper::netdev::LocalNetStack;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

const CONFIG: &str = r#"
[shared]
log_level = "debug"

[wrapper]
basename = "wlan"
scan_interval_ms = 500
hangcheck_interval_ms = 0

[simulation]
pending_requests = true

[[simulation.devices]]
vendor = 0x14e4
device = 0x4320
mac = "02:aa:bb:cc:dd:01"

[[simulation.devices]]
vendor = 0x14e4
device = 0x4320

[[simulation.devices]]
vendor = 0x168c
device = 0x0013
"#;

fn start(config: WrapperConfig) -> (NdisWrapper, Arc<LocalNetStack>) {
    let (bus, loader, _miniport) = create_backend(&config.simulation);
    assert_eq!(bus.devices().len(), config.simulation.devices.len());
    let netstack = Arc::new(LocalNetStack::new());
    let wrapper = NdisWrapper::new(config, bus, loader, netstack.clone()).expect("wrapper");
    (wrapper, netstack)
}

#[test]
fn test_configured_backend_binds_devices() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    let config = WrapperConfig::load(file.path()).unwrap();
    config.validate().unwrap();

    let (wrapper, netstack) = start(config);
    let loaded = wrapper
        .load_driver("bcmwl5", HardwareId::new(0x14e4, 0x4320), b"MZsim")
        .unwrap();
    wrapper.start_driver(loaded).unwrap();

    assert_eq!(netstack.interfaces(), vec!["wlan0", "wlan1"]);
    let first = wrapper.device("wlan0").unwrap();
    assert_eq!(first.mac(), MacAddress([0x02, 0xaa, 0xbb, 0xcc, 0xdd, 0x01]));
    assert!(!first.hangcheck_timer_running());
    assert_eq!(first.get_essid().unwrap().as_bytes(), b"simnet");
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config: WrapperConfig = toml::from_str(CONFIG).unwrap();
    config.wrapper.basename = "wl%d".to_string();
    let (bus, loader, _miniport) = create_backend(&config.simulation);
    assert!(bus.find_device(HardwareId::new(0x168c, 0x0013)).is_some());
    let result = NdisWrapper::new(config, bus, loader, Arc::new(LocalNetStack::new()));
    assert!(matches!(result, Err(ndis_wrapper::WrapperError::Config(_))));
}

#[test]
fn test_stats_serialize() {
    let config: WrapperConfig = toml::from_str(CONFIG).unwrap();
    let (wrapper, _netstack) = start(config);
    let loaded = wrapper
        .load_driver("ath", HardwareId::new(0x168c, 0x0013), b"MZsim")
        .unwrap();
    wrapper.start_driver(loaded).unwrap();

    let device = wrapper.device("wlan0").unwrap();
    let json = serde_json::to_value(device.stats()).unwrap();
    assert_eq!(json["tx_packets"], 0);
    assert_eq!(json["rx_bytes"], 0);
}
