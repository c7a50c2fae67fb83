//! Wireless configuration integration tests against the simulated miniport.

use ndis_common::config::WrapperConfig;
use ndis_common::hardware::HardwareId;
use ndis_common::ndis::{MacAddress, Status, auth_mode, encryption, mode, network_type, oid};
use ndis_common::wire::{BSSID_ITEM_LEN, BssidItem, Configuration, Essid, WEP_TRANSMIT_KEY};
use ndis_wrapper::drivers::simulation::{
    MiniportCall, SimulatedBus, SimulatedMiniport, SimulationLoader, simulated_device,
};
use ndis_wrapper::netdev::LocalNetStack;
use ndis_wrapper::wireless::freq::Frequency;
use ndis_wrapper::wireless::scan::event;
use ndis_wrapper::wireless::txpower::TxPower;
use ndis_wrapper::wireless::{EncodeFlags, PowerMode, WirelessMode};
use ndis_wrapper::{DeviceHandle, NdisWrapper, WrapperError};
use std::sync::Arc;

const BCM: HardwareId = HardwareId::new(0x14e4, 0x4320);

struct Fixture {
    wrapper: NdisWrapper,
    miniport: Arc<SimulatedMiniport>,
}

impl Fixture {
    fn new(pending: bool) -> Self {
        let bus = Arc::new(SimulatedBus::new());
        bus.add_device(simulated_device(0, BCM)).expect("add device");
        let miniport = Arc::new(SimulatedMiniport::new().with_pending_requests(pending));
        let wrapper = NdisWrapper::new(
            WrapperConfig::default(),
            bus,
            Arc::new(SimulationLoader::new(miniport.clone())),
            Arc::new(LocalNetStack::new()),
        )
        .expect("wrapper");
        let loaded = wrapper.load_driver("bcmwl5", BCM, b"MZsim").expect("load");
        wrapper.start_driver(loaded).expect("start");
        Self { wrapper, miniport }
    }

    fn handle(&self) -> Arc<DeviceHandle> {
        self.wrapper.device("eth0").expect("eth0")
    }

    /// Sets of `target`, oldest first.
    fn sets_of(&self, target: ndis_common::ndis::Oid) -> Vec<Vec<u8>> {
        self.miniport
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                MiniportCall::Set(o, data) if o == target => Some(data),
                _ => None,
            })
            .collect()
    }
}

fn u32_bytes(value: u32) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

#[test]
fn test_essid_round_trip() {
    for pending in [false, true] {
        let fx = Fixture::new(pending);
        let handle = fx.handle();
        assert_eq!(handle.get_essid().unwrap().as_bytes(), b"simnet");

        handle.set_essid(b"lab-ap").unwrap();
        assert_eq!(handle.get_essid().unwrap().as_bytes(), b"lab-ap");

        assert!(matches!(
            handle.set_essid(&[b'x'; 33]),
            Err(WrapperError::InvalidArgument(_))
        ));
    }
}

#[test]
fn test_name_mode_and_bitrate() {
    let fx = Fixture::new(false);
    let handle = fx.handle();
    assert_eq!(handle.get_name(), "IEEE 802.11g");
    assert_eq!(handle.get_mode().unwrap(), WirelessMode::Infrastructure);
    assert_eq!(handle.get_bitrate().unwrap(), 54_000_000);

    handle.set_mode(WirelessMode::Adhoc).unwrap();
    assert_eq!(handle.get_mode().unwrap(), WirelessMode::Adhoc);
    assert_eq!(
        fx.sets_of(oid::INFRASTRUCTURE_MODE),
        vec![u32_bytes(mode::ADHOC)]
    );
    assert!(handle.set_mode(WirelessMode::Auto).is_err());
}

#[test]
fn test_frequency() {
    let fx = Fixture::new(false);
    let handle = fx.handle();
    assert_eq!(handle.get_freq().unwrap(), Frequency { m: 243_700, e: 4 });

    // Table index 0 is 2412 MHz.
    handle.set_freq(Frequency::channel(0)).unwrap();
    let set = fx.sets_of(oid::CONFIGURATION);
    let config = Configuration::decode(set.last().unwrap()).unwrap();
    assert_eq!(config.ds_config, 2_412_000);

    handle.set_freq(Frequency { m: 2462, e: 6 }).unwrap();
    assert_eq!(handle.get_freq().unwrap(), Frequency { m: 246_200, e: 4 });

    assert!(handle.set_freq(Frequency::channel(14)).is_err());
}

#[test]
fn test_tx_power() {
    let fx = Fixture::new(false);
    let handle = fx.handle();
    assert_eq!(handle.get_tx_power().unwrap(), 100);

    handle.set_tx_power(TxPower::Dbm(20)).unwrap();
    assert_eq!(handle.get_tx_power().unwrap(), 100);
    handle.set_tx_power(TxPower::Dbm(30)).unwrap();
    assert_eq!(handle.get_tx_power().unwrap(), 1000);
    handle.set_tx_power(TxPower::MilliWatts(25)).unwrap();
    assert_eq!(handle.get_tx_power().unwrap(), 25);

    assert!(handle.set_tx_power(TxPower::Dbm(51)).is_err());

    handle.set_tx_power(TxPower::Disabled).unwrap();
    assert_eq!(fx.sets_of(oid::DISASSOCIATE), vec![u32_bytes(0)]);
}

#[test]
fn test_thresholds_and_ap_address() {
    let fx = Fixture::new(true);
    let handle = fx.handle();
    assert_eq!(handle.get_rts_threshold().unwrap(), 2347);
    assert_eq!(handle.get_frag_threshold().unwrap(), 2346);
    handle.set_rts_threshold(500).unwrap();
    handle.set_frag_threshold(1500).unwrap();
    assert_eq!(handle.get_rts_threshold().unwrap(), 500);
    assert_eq!(handle.get_frag_threshold().unwrap(), 1500);

    assert_eq!(
        handle.get_ap_address().unwrap(),
        MacAddress([0x02, 0x5a, 0x00, 0x00, 0x00, 0x01])
    );
    let ap = MacAddress([0x02, 0x5a, 0x00, 0x00, 0x00, 0x02]);
    handle.set_ap_address(ap).unwrap();
    assert_eq!(handle.get_ap_address().unwrap(), ap);
}

#[test]
fn test_encode_enable_and_disable() {
    let fx = Fixture::new(false);
    let handle = fx.handle();

    let info = handle.get_encode().unwrap();
    assert!(info.flags.contains(EncodeFlags::DISABLED | EncodeFlags::OPEN));

    let key = [0x11, 0x22, 0x33, 0x44, 0x55];
    handle
        .set_encode(EncodeFlags::from_bits_retain(1) | EncodeFlags::RESTRICTED, &key)
        .unwrap();
    assert_eq!(fx.sets_of(oid::ADD_WEP).len(), 1);
    assert_eq!(
        fx.sets_of(oid::WEP_STATUS),
        vec![u32_bytes(encryption::ENABLED)]
    );
    assert_eq!(
        fx.sets_of(oid::AUTHENTICATION_MODE),
        vec![u32_bytes(auth_mode::SHARED)]
    );
    let info = handle.get_encode().unwrap();
    assert_eq!(info.flags, EncodeFlags::RESTRICTED);
    assert_eq!(info.key.as_slice(), &key);

    fx.miniport.clear_calls();
    handle
        .set_encode(EncodeFlags::from_bits_retain(1) | EncodeFlags::DISABLED, &[])
        .unwrap();
    assert_eq!(
        fx.sets_of(oid::WEP_STATUS),
        vec![u32_bytes(encryption::DISABLED)]
    );
    assert_eq!(
        fx.sets_of(oid::REMOVE_WEP),
        vec![u32_bytes(1 | WEP_TRANSMIT_KEY)]
    );
    assert_eq!(
        fx.sets_of(oid::AUTHENTICATION_MODE),
        vec![u32_bytes(auth_mode::OPEN)]
    );

    assert!(handle.set_encode(EncodeFlags::OPEN, &[0u8; 33]).is_err());
}

#[test]
fn test_encode_without_mode_uses_restricted() {
    let fx = Fixture::new(false);
    let handle = fx.handle();
    handle.set_encode(EncodeFlags::empty(), &[1, 2, 3, 4, 5]).unwrap();
    assert_eq!(
        fx.sets_of(oid::AUTHENTICATION_MODE),
        vec![u32_bytes(auth_mode::SHARED)]
    );
}

#[test]
fn test_scan_results() {
    let fx = Fixture::new(true);
    let handle = fx.handle();
    handle.set_scan().unwrap();

    let results = handle.get_scan().unwrap();
    assert_eq!(results.entries.len(), 2);
    assert!(!results.truncated);
    let first = &results.entries[0];
    assert_eq!(first.essid, b"simnet");
    assert_eq!(first.mode, WirelessMode::Infrastructure);
    assert_eq!(first.rates.first(), Some(&1_000_000));
    assert!(!first.privacy);
    assert!(results.entries[1].privacy);

    // First event of the stream is the AP address.
    assert_eq!(
        u16::from_le_bytes([results.events[2], results.events[3]]),
        event::AP
    );
}

#[test]
fn test_scan_list_is_capped() {
    let fx = Fixture::new(false);
    let handle = fx.handle();
    let items: Vec<_> = (0..12u8)
        .map(|i| BssidItem {
            length: BSSID_ITEM_LEN as u32,
            mac: MacAddress([0x02, 0, 0, 0, 1, i]),
            ssid: Essid::from_bytes(b"crowded").unwrap(),
            privacy: 0,
            rssi: -70,
            net_type: network_type::DS,
            config: Configuration::with_frequency(2_412_000),
            mode: mode::INFRASTRUCTURE,
            rates: [0x82, 0x84, 0, 0, 0, 0, 0, 0],
        })
        .collect();
    fx.miniport.set_scan_results(items);

    // The buffer holds 10 items; the miniport reports a short buffer.
    assert_eq!(
        handle.get_scan().unwrap_err(),
        WrapperError::Miniport(Status::BUFFER_TOO_SHORT)
    );

    fx.miniport.set_scan_results(Vec::new());
    assert!(handle.get_scan().unwrap().entries.is_empty());
}

#[test]
fn test_power_mode_and_stats() {
    let fx = Fixture::new(false);
    let handle = fx.handle();
    assert_eq!(handle.get_power_mode().unwrap(), PowerMode::Off);
    handle.set_power_mode(PowerMode::Min).unwrap();
    assert_eq!(handle.get_power_mode().unwrap(), PowerMode::Min);
    assert_eq!(handle.wireless_stats().level, Some(-52));
}
