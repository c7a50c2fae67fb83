//! Transmit path and scan translation micro-benchmarks.
//!
//! - Queue push/pop alone
//! - Queue-to-release through the simulated miniport (in-line completion)
//! - BSSID list translation into the event stream

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use ndis_common::config::WrapperConfig;
use ndis_common::hardware::HardwareId;
use ndis_common::ndis::{MacAddress, mode, network_type};
use ndis_common::wire::{BSSID_ITEM_LEN, BssidItem, Configuration, Essid, encode_bssid_list};
use ndis_wrapper::drivers::simulation::{
    SimulatedBus, SimulatedMiniport, SimulationLoader, simulated_device,
};
use ndis_wrapper::netdev::LocalNetStack;
use ndis_wrapper::NdisWrapper;
use ndis_wrapper::wireless::scan::translate_list;
use ndis_wrapper::xmit::TxQueue;
use std::sync::Arc;

const BCM: HardwareId = HardwareId::new(0x14e4, 0x4320);
const FRAME: [u8; 1500] = [0x5a; 1500];

fn bench_queue_only(c: &mut Criterion) {
    let queue = TxQueue::new();

    c.bench_function("tx_queue_push_pop", |b| {
        b.iter(|| {
            queue.push(FRAME.to_vec());
            black_box(queue.pop())
        });
    });
}

fn bench_xmit_flush(c: &mut Criterion) {
    let bus = Arc::new(SimulatedBus::new());
    bus.add_device(simulated_device(0, BCM)).expect("add device");
    let miniport = Arc::new(SimulatedMiniport::new());
    let wrapper = NdisWrapper::new(
        WrapperConfig::default(),
        bus,
        Arc::new(SimulationLoader::new(miniport.clone())),
        Arc::new(LocalNetStack::new()),
    )
    .expect("wrapper");
    let loaded = wrapper.load_driver("bcmwl5", BCM, b"MZsim").expect("load");
    wrapper.start_driver(loaded).expect("start");
    let handle = wrapper.device("eth0").expect("eth0");

    c.bench_function("xmit_32_frames_and_flush", |b| {
        b.iter(|| {
            for _ in 0..32 {
                handle.start_xmit(&FRAME);
            }
            handle.flush();
            // Keep the call log from growing across iterations.
            miniport.clear_calls();
        });
    });
}

fn bench_scan_translation(c: &mut Criterion) {
    let items: Vec<_> = (0..10u8)
        .map(|i| BssidItem {
            length: BSSID_ITEM_LEN as u32,
            mac: MacAddress([0x02, 0x5a, 0, 0, 0, i]),
            ssid: Essid::from_bytes(b"benchmark-network").unwrap_or_default(),
            privacy: u32::from(i % 2),
            rssi: -40 - i32::from(i),
            net_type: network_type::OFDM24,
            config: Configuration::with_frequency(2_412_000 + u32::from(i) * 5_000),
            mode: mode::INFRASTRUCTURE,
            rates: [0x82, 0x84, 0x8b, 0x96, 0x0c, 0x12, 0x18, 0x24],
        })
        .collect();
    let raw = encode_bssid_list(&items);

    c.bench_function("translate_10_bssid_items", |b| {
        b.iter(|| black_box(translate_list(black_box(&raw))));
    });
}

criterion_group!(
    benches,
    bench_queue_only,
    bench_xmit_flush,
    bench_scan_translation
);
criterion_main!(benches);
