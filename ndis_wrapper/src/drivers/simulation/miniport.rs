//! Simulated miniport.
//!
//! Keeps an OID store per adapter, answers queries from it and stores set
//! payloads back into it. Requests and sends either complete in-line or
//! return pending and complete from a helper thread; helper threads are
//! joined in `halt`. Every entry-point invocation is appended to a call log.

use super::bus::default_mac;
use ndis_common::hardware::BusAddress;
use ndis_common::miniport::{
    AdapterContext, EntryPoints, InformationBuffer, Miniport, MiniportCallbacks, MiniportHost,
    Packet, SendDisposition,
};
use ndis_common::ndis::{
    MacAddress, Oid, Status, auth_mode, encryption, mode, network_type, oid, power_mode,
    power_state, privacy,
};
use ndis_common::setting::SettingValue;
use ndis_common::wire::{BSSID_ITEM_LEN, BssidItem, Configuration, Essid, encode_bssid_list};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Setting the simulated miniport reads to override its MAC address.
pub const NETWORK_ADDRESS_SETTING: &str = "NetworkAddress";

/// One recorded entry-point invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiniportCall {
    /// `initialize`
    Initialize,
    /// `halt`
    Halt,
    /// `query_information`
    Query(Oid),
    /// `set_information` with the payload received
    Set(Oid, Vec<u8>),
    /// `send` or `send_packets`, one entry per packet
    Send(u64),
    /// `check_for_hang`
    CheckForHang,
    /// `reset`
    Reset,
}

struct SimAdapter {
    callbacks: Arc<dyn MiniportCallbacks>,
    oids: BTreeMap<Oid, Vec<u8>>,
}

/// Software miniport for development and tests.
pub struct SimulatedMiniport {
    entry_points: EntryPoints,
    pending_requests: bool,
    pending_sends: bool,
    fail_init: Option<Status>,
    send_status: Status,
    macs: BTreeMap<BusAddress, MacAddress>,
    scan_results: Mutex<Vec<BssidItem>>,
    adapters: Mutex<BTreeMap<u64, SimAdapter>>,
    calls: Mutex<Vec<MiniportCall>>,
    helpers: Mutex<Vec<JoinHandle<()>>>,
    sends_held: Mutex<bool>,
    sends_released: Condvar,
    next_ctx: AtomicU64,
    hang: AtomicBool,
}

impl SimulatedMiniport {
    /// Miniport with every entry point, in-line completions and two
    /// access points in its scan list.
    pub fn new() -> Self {
        Self {
            entry_points: EntryPoints::all(),
            pending_requests: false,
            pending_sends: false,
            fail_init: None,
            send_status: Status::SUCCESS,
            macs: BTreeMap::new(),
            scan_results: Mutex::new(default_scan_results()),
            adapters: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            helpers: Mutex::new(Vec::new()),
            sends_held: Mutex::new(false),
            sends_released: Condvar::new(),
            next_ctx: AtomicU64::new(0),
            hang: AtomicBool::new(false),
        }
    }

    /// Advertise only `entry_points`.
    pub fn with_entry_points(mut self, entry_points: EntryPoints) -> Self {
        self.entry_points = entry_points;
        self
    }

    /// Complete queries and sets from a helper thread.
    pub fn with_pending_requests(mut self, pending: bool) -> Self {
        self.pending_requests = pending;
        self
    }

    /// Complete sends from a helper thread.
    pub fn with_pending_sends(mut self, pending: bool) -> Self {
        self.pending_sends = pending;
        self
    }

    /// Refuse every adapter with `status`.
    pub fn with_init_failure(mut self, status: Status) -> Self {
        self.fail_init = Some(status);
        self
    }

    /// Complete every send with `status`.
    pub fn with_send_status(mut self, status: Status) -> Self {
        self.send_status = status;
        self
    }

    /// Report `mac` for the device at `address`.
    pub fn with_mac(mut self, address: BusAddress, mac: MacAddress) -> Self {
        self.macs.insert(address, mac);
        self
    }

    /// Replace the access points returned by `OID_802_11_BSSID_LIST`.
    pub fn set_scan_results(&self, items: Vec<BssidItem>) {
        *self.scan_results.lock() = items;
    }

    /// Make the next `check_for_hang` report a hang.
    pub fn inject_hang(&self) {
        self.hang.store(true, Ordering::Release);
    }

    /// Block `send` and `send_packets` after they are recorded, until
    /// `release_sends`.
    pub fn hold_sends(&self) {
        *self.sends_held.lock() = true;
    }

    /// Let held sends continue.
    pub fn release_sends(&self) {
        *self.sends_held.lock() = false;
        self.sends_released.notify_all();
    }

    fn wait_for_send_gate(&self) {
        let mut held = self.sends_held.lock();
        while *held {
            self.sends_released.wait(&mut held);
        }
    }

    /// Indicate `frame` as received on every adapter.
    pub fn inject_receive(&self, frame: &[u8]) {
        for callbacks in self.all_callbacks() {
            callbacks.indicate_receive(frame);
        }
    }

    /// Indicate `status` on every adapter.
    pub fn indicate_status(&self, status: Status) {
        for callbacks in self.all_callbacks() {
            callbacks.indicate_status(status);
        }
    }

    /// Recorded invocations, oldest first.
    pub fn calls(&self) -> Vec<MiniportCall> {
        self.calls.lock().clone()
    }

    /// Forget recorded invocations.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Number of live adapters.
    pub fn adapter_count(&self) -> usize {
        self.adapters.lock().len()
    }

    /// Stored value of `oid` on adapter `ctx`.
    pub fn oid_value(&self, ctx: AdapterContext, oid: Oid) -> Option<Vec<u8>> {
        self.adapters
            .lock()
            .get(&ctx.0)
            .and_then(|adapter| adapter.oids.get(&oid).cloned())
    }

    fn record(&self, call: MiniportCall) {
        self.calls.lock().push(call);
    }

    fn all_callbacks(&self) -> Vec<Arc<dyn MiniportCallbacks>> {
        self.adapters
            .lock()
            .values()
            .map(|adapter| Arc::clone(&adapter.callbacks))
            .collect()
    }

    fn callbacks(&self, ctx: AdapterContext) -> Option<Arc<dyn MiniportCallbacks>> {
        self.adapters
            .lock()
            .get(&ctx.0)
            .map(|adapter| Arc::clone(&adapter.callbacks))
    }

    fn spawn_helper(&self, work: impl FnOnce() + Send + 'static) {
        match std::thread::Builder::new()
            .name("sim-miniport".to_string())
            .spawn(work)
        {
            Ok(handle) => {
                let mut helpers = self.helpers.lock();
                helpers.retain(|helper| !helper.is_finished());
                helpers.push(handle);
            }
            Err(e) => warn!("simulated miniport: helper thread failed: {}", e),
        }
    }

    fn answer_query(&self, ctx: AdapterContext, oid: Oid, buffer: &InformationBuffer) -> Status {
        let value = if oid == oid::BSSID_LIST {
            Some(encode_bssid_list(&self.scan_results.lock()))
        } else {
            self.oid_value(ctx, oid)
        };
        match value {
            Some(value) => buffer.write(&value),
            None => Status::NOT_SUPPORTED,
        }
    }

    fn apply_set(&self, ctx: AdapterContext, oid: Oid, buffer: &InformationBuffer) -> Status {
        let data = buffer.to_vec();
        let mut adapters = self.adapters.lock();
        let Some(adapter) = adapters.get_mut(&ctx.0) else {
            return Status::FAILURE;
        };
        buffer.set_written(data.len() as u32);
        if oid != oid::BSSID_LIST_SCAN {
            adapter.oids.insert(oid, data);
        }
        Status::SUCCESS
    }
}

impl Default for SimulatedMiniport {
    fn default() -> Self {
        Self::new()
    }
}

impl Miniport for SimulatedMiniport {
    fn entry_points(&self) -> EntryPoints {
        self.entry_points
    }

    fn initialize(&self, host: MiniportHost) -> Result<AdapterContext, Status> {
        self.record(MiniportCall::Initialize);
        if let Some(status) = self.fail_init {
            warn!("{}: simulated init failure {}", host.device.address, status);
            return Err(status);
        }

        let mac = match host.read_setting(NETWORK_ADDRESS_SETTING) {
            Some(SettingValue::String(text)) => MacAddress::parse(text).unwrap_or_else(|| {
                warn!("ignoring malformed {} '{}'", NETWORK_ADDRESS_SETTING, text);
                self.mac_for(host.device.address)
            }),
            _ => self.mac_for(host.device.address),
        };

        let ctx = AdapterContext(self.next_ctx.fetch_add(1, Ordering::Relaxed) + 1);
        let callbacks = Arc::clone(&host.callbacks);
        self.adapters.lock().insert(
            ctx.0,
            SimAdapter {
                callbacks: Arc::clone(&callbacks),
                oids: default_oids(mac),
            },
        );
        info!(
            "{}: simulated adapter {} up ({})",
            host.device.address, ctx.0, mac
        );
        callbacks.indicate_status(Status::MEDIA_CONNECT);
        Ok(ctx)
    }

    fn halt(&self, ctx: AdapterContext) {
        self.record(MiniportCall::Halt);
        let helpers = std::mem::take(&mut *self.helpers.lock());
        for helper in helpers {
            if helper.join().is_err() {
                warn!("simulated miniport: helper thread panicked");
            }
        }
        self.adapters.lock().remove(&ctx.0);
        debug!("simulated adapter {} halted", ctx.0);
    }

    fn query_information(
        &self,
        ctx: AdapterContext,
        oid: Oid,
        buffer: &InformationBuffer,
    ) -> Status {
        self.record(MiniportCall::Query(oid));
        if !self.pending_requests {
            return self.answer_query(ctx, oid, buffer);
        }
        let Some(callbacks) = self.callbacks(ctx) else {
            return Status::FAILURE;
        };
        let status = self.answer_query(ctx, oid, buffer);
        self.spawn_helper(move || callbacks.query_complete(status));
        Status::PENDING
    }

    fn set_information(
        &self,
        ctx: AdapterContext,
        oid: Oid,
        buffer: &InformationBuffer,
    ) -> Status {
        self.record(MiniportCall::Set(oid, buffer.to_vec()));
        if !self.pending_requests {
            return self.apply_set(ctx, oid, buffer);
        }
        let Some(callbacks) = self.callbacks(ctx) else {
            return Status::FAILURE;
        };
        let status = self.apply_set(ctx, oid, buffer);
        self.spawn_helper(move || callbacks.set_complete(status));
        Status::PENDING
    }

    fn send(&self, ctx: AdapterContext, packet: Packet) -> SendDisposition {
        self.record(MiniportCall::Send(packet.sequence()));
        self.wait_for_send_gate();
        if !self.pending_sends {
            return SendDisposition::Complete(packet, self.send_status);
        }
        let Some(callbacks) = self.callbacks(ctx) else {
            return SendDisposition::Complete(packet, Status::FAILURE);
        };
        let status = self.send_status;
        self.spawn_helper(move || callbacks.send_complete(packet, status));
        SendDisposition::Pending
    }

    fn send_packets(&self, ctx: AdapterContext, packets: Vec<Packet>) -> Vec<(Packet, Status)> {
        for packet in &packets {
            self.record(MiniportCall::Send(packet.sequence()));
        }
        self.wait_for_send_gate();
        if !self.pending_sends {
            return packets
                .into_iter()
                .map(|packet| (packet, self.send_status))
                .collect();
        }
        let Some(callbacks) = self.callbacks(ctx) else {
            return packets
                .into_iter()
                .map(|packet| (packet, Status::FAILURE))
                .collect();
        };
        let status = self.send_status;
        self.spawn_helper(move || {
            for packet in packets {
                callbacks.send_complete(packet, status);
            }
        });
        Vec::new()
    }

    fn check_for_hang(&self, _ctx: AdapterContext) -> bool {
        self.record(MiniportCall::CheckForHang);
        self.hang.swap(false, Ordering::AcqRel)
    }

    fn reset(&self, ctx: AdapterContext) -> Status {
        self.record(MiniportCall::Reset);
        info!("simulated adapter {} reset", ctx.0);
        Status::SUCCESS
    }
}

impl SimulatedMiniport {
    fn mac_for(&self, address: BusAddress) -> MacAddress {
        self.macs
            .get(&address)
            .copied()
            .unwrap_or_else(|| default_mac(address))
    }
}

fn u32_value(value: u32) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

fn default_oids(mac: MacAddress) -> BTreeMap<Oid, Vec<u8>> {
    let essid = Essid::from_bytes(b"simnet").unwrap_or_default();
    BTreeMap::from([
        (oid::CURRENT_ADDRESS, mac.octets().to_vec()),
        // 54 Mb/s in units of 100 b/s.
        (oid::GEN_LINK_SPEED, u32_value(540_000)),
        (oid::SSID, essid.encode().to_vec()),
        (oid::BSSID, vec![0x02, 0x5a, 0x00, 0x00, 0x00, 0x01]),
        (oid::INFRASTRUCTURE_MODE, u32_value(mode::INFRASTRUCTURE)),
        (oid::NETWORK_TYPE_IN_USE, u32_value(network_type::OFDM24)),
        (
            oid::CONFIGURATION,
            Configuration::with_frequency(2_437_000).encode().to_vec(),
        ),
        (oid::TX_POWER_LEVEL, u32_value(100)),
        (oid::RSSI, u32_value(-52i32 as u32)),
        (oid::RTS_THRESHOLD, u32_value(2347)),
        (oid::FRAGMENTATION_THRESHOLD, u32_value(2346)),
        (oid::WEP_STATUS, u32_value(encryption::DISABLED)),
        (oid::AUTHENTICATION_MODE, u32_value(auth_mode::OPEN)),
        (oid::POWER_MODE, u32_value(power_mode::CAM)),
        (oid::PNP_QUERY_POWER, u32_value(power_state::D3)),
    ])
}

fn access_point(last: u8, ssid: &[u8], ds_config: u32, rssi: i32, filter: u32) -> BssidItem {
    BssidItem {
        length: BSSID_ITEM_LEN as u32,
        mac: MacAddress([0x02, 0x5a, 0x00, 0x00, 0x00, last]),
        ssid: Essid::from_bytes(ssid).unwrap_or_default(),
        privacy: filter,
        rssi,
        net_type: network_type::OFDM24,
        config: Configuration::with_frequency(ds_config),
        mode: mode::INFRASTRUCTURE,
        rates: [0x82, 0x84, 0x8b, 0x96, 0x0c, 0x12, 0x18, 0x24],
    }
}

fn default_scan_results() -> Vec<BssidItem> {
    vec![
        access_point(1, b"simnet", 2_437_000, -52, privacy::ACCEPT_ALL),
        access_point(2, b"simnet-secure", 2_462_000, -71, privacy::FILTER_8021X),
    ]
}
