//! Device handle: one per bound hardware instance.
//!
//! A handle owns the adapter's network identity, its transmit queue, the
//! query/set completion slots, the deferred-work worker and both periodic
//! timers.
//!
//! # Construction
//!
//! 1. Create the shared adapter state and its miniport callbacks
//! 2. `Miniport::initialize`
//! 3. Spawn the worker
//! 4. Query the permanent MAC address through the request bridge
//! 5. Register the host interface (`<basename>%d`)
//! 6. Start the scan timer and, when the miniport can check for hangs, the
//!    hang-check timer
//!
//! Any failure after step 2 tears the handle down again.
//!
//! # Teardown
//!
//! Stop timers, unregister the host interface, stop the worker and drain the
//! transmit queue, then halt the miniport. Teardown runs once; later calls
//! return immediately.

use crate::bridge::{RequestBridge, RequestKind, RequestOutcome};
use crate::callbacks::AdapterCallbacks;
use crate::driver_registry::DriverId;
use crate::error::{Result, WrapperError};
use crate::power::PowerState;
use crate::stats::{AdapterStats, StatsSnapshot};
use crate::timers::PeriodicTimer;
use crate::work::{WorkItems, WorkQueue, spawn_worker};
use crate::xmit::{Transmitter, TxQueue, TxRelease};
use ndis_common::config::AdapterConfig;
use ndis_common::consts::MAX_KEY_LEN;
use ndis_common::hardware::{HardwareBus, HardwareDevice};
use ndis_common::miniport::{AdapterContext, EntryPoints, Miniport, MiniportHost};
use ndis_common::ndis::{MacAddress, Oid, Status, oid};
use ndis_common::netdev::NetStack;
use ndis_common::setting::Setting;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Host-visible interface state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceState {
    /// Interface name assigned by the host stack.
    pub name: String,
    /// Hardware address reported by the miniport.
    pub mac: MacAddress,
    /// Registered with the host stack.
    pub registered: bool,
    /// Attached (present) from the host's point of view.
    pub attached: bool,
    /// Transmit queue accepting frames.
    pub queue_started: bool,
    /// Opened by the host.
    pub up: bool,
}

/// State shared between the handle, its worker and the miniport callbacks.
pub(crate) struct AdapterShared {
    pub(crate) device: HardwareDevice,
    pub(crate) bridge: RequestBridge,
    pub(crate) tx_queue: TxQueue,
    pub(crate) release: TxRelease,
    pub(crate) link: AtomicBool,
    pub(crate) iface: Mutex<InterfaceState>,
    pub(crate) netstack: Arc<dyn NetStack>,
}

impl AdapterShared {
    /// True while the interface is attached and its queue is started.
    fn accepting_output(&self) -> bool {
        let iface = self.iface.lock();
        iface.attached && iface.queue_started
    }
}

/// Everything needed to bind a driver to a device.
#[derive(Clone)]
pub struct AdapterSetup {
    /// Owning driver record.
    pub driver_id: DriverId,
    /// Driver name, for logs.
    pub driver_name: String,
    /// Driver entry points.
    pub miniport: Arc<dyn Miniport>,
    /// Settings attached to the driver record.
    pub settings: Arc<[Setting]>,
    /// Bus the device sits on.
    pub bus: Arc<dyn HardwareBus>,
    /// Host network stack.
    pub netstack: Arc<dyn NetStack>,
    /// Adapter behaviour.
    pub config: AdapterConfig,
}

/// One bound adapter.
pub struct DeviceHandle {
    driver_id: DriverId,
    driver_name: String,
    pub(crate) shared: Arc<AdapterShared>,
    pub(crate) miniport: Arc<dyn Miniport>,
    pub(crate) entry_points: EntryPoints,
    pub(crate) ctx: AdapterContext,
    pub(crate) work: Arc<WorkQueue>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pub(crate) scan_timer: PeriodicTimer,
    hangcheck_timer: Option<PeriodicTimer>,
    pub(crate) wep_key: Mutex<heapless::Vec<u8, MAX_KEY_LEN>>,
    pub(crate) power: Mutex<PowerState>,
    torn_down: AtomicBool,
}

impl DeviceHandle {
    /// Bind `setup`'s driver to `device`.
    ///
    /// # Errors
    /// - `WrapperError::InitFailed` if the miniport refuses the adapter
    /// - `WrapperError::Miniport` if the MAC address query fails
    /// - `WrapperError::Netdev` if the host refuses the interface
    /// - `WrapperError::ResourceExhausted` if a thread cannot be spawned
    pub fn probe(setup: &AdapterSetup, device: HardwareDevice) -> Result<Arc<Self>> {
        let stats = Arc::new(AdapterStats::default());
        let shared = Arc::new(AdapterShared {
            device: device.clone(),
            bridge: RequestBridge::new(),
            tx_queue: TxQueue::new(),
            release: TxRelease::new(Arc::clone(&setup.bus), device.clone(), stats),
            link: AtomicBool::new(false),
            iface: Mutex::new(InterfaceState::default()),
            netstack: Arc::clone(&setup.netstack),
        });

        let host = MiniportHost {
            device: device.clone(),
            settings: Arc::clone(&setup.settings),
            callbacks: Arc::new(AdapterCallbacks::new(Arc::clone(&shared))),
        };
        let ctx = setup.miniport.initialize(host).map_err(|status| {
            warn!(
                "{}: {} init failed with {}",
                device.address, setup.driver_name, status
            );
            WrapperError::InitFailed(status)
        })?;
        let entry_points = setup.miniport.entry_points();
        debug!("{}: initialized, entry points {:?}", device.address, entry_points);

        let work = Arc::new(WorkQueue::new());
        let worker = {
            let shared = Arc::clone(&shared);
            let miniport = Arc::clone(&setup.miniport);
            spawn_worker(
                format!("ndis-work-{}", device.address),
                Arc::clone(&work),
                move |items| run_work(&shared, miniport.as_ref(), ctx, entry_points, items),
            )
        };
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                setup.miniport.halt(ctx);
                return Err(e);
            }
        };

        let scan_timer = PeriodicTimer::new(
            format!("ndis-scan-{}", device.address),
            setup.config.scan_interval(),
            true,
            WorkItems::SCAN,
            Arc::clone(&work),
        );
        let hangcheck_timer = setup
            .config
            .hangcheck_interval()
            .filter(|_| entry_points.contains(EntryPoints::CHECK_FOR_HANG))
            .map(|interval| {
                PeriodicTimer::new(
                    format!("ndis-hang-{}", device.address),
                    interval,
                    false,
                    WorkItems::HANGCHECK,
                    Arc::clone(&work),
                )
            });

        let handle = Arc::new(Self {
            driver_id: setup.driver_id,
            driver_name: setup.driver_name.clone(),
            shared,
            miniport: Arc::clone(&setup.miniport),
            entry_points,
            ctx,
            work,
            worker: Mutex::new(Some(worker)),
            scan_timer,
            hangcheck_timer,
            wep_key: Mutex::new(heapless::Vec::new()),
            power: Mutex::new(PowerState::Active),
            torn_down: AtomicBool::new(false),
        });

        if let Err(e) = handle.bring_up(&setup.config.basename) {
            handle.teardown();
            return Err(e);
        }
        Ok(handle)
    }

    fn bring_up(&self, basename: &str) -> Result<()> {
        let mac = self.query_mac()?;
        let name = self
            .shared
            .netstack
            .register_netdev(&format!("{basename}%d"), mac)?;
        {
            let mut iface = self.shared.iface.lock();
            iface.name = name.clone();
            iface.mac = mac;
            iface.registered = true;
            iface.attached = true;
            iface.queue_started = true;
        }

        self.scan_timer.start()?;
        if let Some(timer) = &self.hangcheck_timer {
            timer.start()?;
        }
        info!(
            "{}: {} bound to {} ({})",
            name, self.driver_name, self.shared.device.address, mac
        );
        Ok(())
    }

    fn query_mac(&self) -> Result<MacAddress> {
        let outcome = self.query(oid::CURRENT_ADDRESS, vec![0; 6])?;
        let octets: [u8; 6] = outcome
            .data
            .get(..6)
            .and_then(|b| b.try_into().ok())
            .ok_or(WrapperError::Miniport(Status::INVALID_LENGTH))?;
        Ok(MacAddress(octets))
    }

    /// Stop timers, unregister the interface, stop the worker, drain the
    /// transmit queue and halt the miniport. Runs once.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("{}: tearing down", self.shared.device.address);

        self.scan_timer.stop();
        if let Some(timer) = &self.hangcheck_timer {
            timer.stop();
        }

        self.unregister_interface();

        self.work.shutdown();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                error!("{}: worker panicked", self.shared.device.address);
            }
        }
        let dropped = self.shared.tx_queue.drain();
        if dropped > 0 {
            self.shared.release.stats().dropped(dropped as u64);
            debug!("{}: dropped {} queued frames", self.shared.device.address, dropped);
        }

        self.miniport.halt(self.ctx);
        info!(
            "{}: {} unbound",
            self.shared.device.address, self.driver_name
        );
    }

    fn unregister_interface(&self) {
        let name = {
            let mut iface = self.shared.iface.lock();
            iface.attached = false;
            iface.queue_started = false;
            iface.up = false;
            if !iface.registered {
                return;
            }
            iface.registered = false;
            iface.name.clone()
        };
        if let Err(e) = self.shared.netstack.unregister_netdev(&name) {
            warn!("{}: {}", name, e);
        }
    }

    /// Mark the interface open.
    pub fn open(&self) -> Result<()> {
        let mut iface = self.shared.iface.lock();
        if !iface.registered {
            return Err(WrapperError::NotReady(self.shared.device.address.to_string()));
        }
        iface.up = true;
        Ok(())
    }

    /// Mark the interface closed.
    pub fn close(&self) {
        self.shared.iface.lock().up = false;
    }

    /// Queue a frame for transmission. Never blocks.
    ///
    /// Returns false while the interface is detached or its queue is stopped,
    /// and after teardown.
    pub fn start_xmit(&self, payload: &[u8]) -> bool {
        if self.torn_down.load(Ordering::Acquire) {
            return false;
        }
        {
            let iface = self.shared.iface.lock();
            if !iface.attached || !iface.queue_started {
                return false;
            }
        }
        let mut data = Vec::new();
        if data.try_reserve_exact(payload.len()).is_err() {
            self.shared.release.stats().dropped(1);
            return false;
        }
        data.extend_from_slice(payload);
        if self.shared.tx_queue.push(data).is_none() {
            self.shared.release.stats().dropped(1);
            return false;
        }
        self.work.schedule(WorkItems::XMIT);
        true
    }

    /// Block until the worker has nothing pending or running.
    pub fn flush(&self) {
        self.work.flush();
    }

    /// Issue a request and block until it completes.
    pub fn request(&self, kind: RequestKind, oid: Oid, data: Vec<u8>) -> RequestOutcome {
        self.shared
            .bridge
            .call(self.miniport.as_ref(), self.ctx, kind, oid, data)
    }

    /// Query `oid` with `data` as the initial buffer contents.
    ///
    /// # Errors
    /// `WrapperError::Miniport` with the miniport's status on failure.
    pub fn query(&self, oid: Oid, data: Vec<u8>) -> Result<RequestOutcome> {
        let outcome = self.request(RequestKind::Query, oid, data);
        if outcome.status.is_success() {
            Ok(outcome)
        } else {
            Err(WrapperError::Miniport(outcome.status))
        }
    }

    /// Set `oid` from `data`.
    ///
    /// # Errors
    /// `WrapperError::Miniport` with the miniport's status on failure.
    pub fn set(&self, oid: Oid, data: Vec<u8>) -> Result<RequestOutcome> {
        let outcome = self.request(RequestKind::Set, oid, data);
        if outcome.status.is_success() {
            Ok(outcome)
        } else {
            Err(WrapperError::Miniport(outcome.status))
        }
    }

    /// Query a 4-byte OID.
    pub fn query_u32(&self, oid: Oid) -> Result<u32> {
        let outcome = self.query(oid, vec![0; 4])?;
        outcome
            .data
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .map(u32::from_le_bytes)
            .ok_or(WrapperError::Miniport(Status::INVALID_LENGTH))
    }

    /// Set a 4-byte OID.
    pub fn set_u32(&self, oid: Oid, value: u32) -> Result<()> {
        self.set(oid, value.to_le_bytes().to_vec()).map(|_| ())
    }

    /// Cached counters. Never calls into the miniport.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.release.stats().snapshot()
    }

    /// Link state from the last media indication.
    pub fn link_status(&self) -> bool {
        self.shared.link.load(Ordering::Acquire)
    }

    /// Host-visible interface state.
    pub fn interface(&self) -> InterfaceState {
        self.shared.iface.lock().clone()
    }

    /// Interface name.
    pub fn name(&self) -> String {
        self.shared.iface.lock().name.clone()
    }

    /// Hardware address.
    pub fn mac(&self) -> MacAddress {
        self.shared.iface.lock().mac
    }

    /// Bound hardware instance.
    pub fn device(&self) -> &HardwareDevice {
        &self.shared.device
    }

    /// Owning driver record.
    pub fn driver_id(&self) -> DriverId {
        self.driver_id
    }

    /// Owning driver name.
    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    /// Entry points advertised by the miniport.
    pub fn entry_points(&self) -> EntryPoints {
        self.entry_points
    }

    /// Frames waiting for the worker.
    pub fn tx_queue_len(&self) -> usize {
        self.shared.tx_queue.len()
    }

    /// True while the scan timer runs.
    pub fn scan_timer_running(&self) -> bool {
        self.scan_timer.is_running()
    }

    /// True while the hang-check timer runs. Always false when the miniport
    /// cannot check for hangs or the check is disabled.
    pub fn hangcheck_timer_running(&self) -> bool {
        self.hangcheck_timer
            .as_ref()
            .is_some_and(PeriodicTimer::is_running)
    }

    /// True after teardown.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn run_work(
    shared: &AdapterShared,
    miniport: &dyn Miniport,
    ctx: AdapterContext,
    entry_points: EntryPoints,
    items: WorkItems,
) {
    if items.contains(WorkItems::XMIT) {
        let tx = Transmitter {
            miniport,
            ctx,
            entry_points,
            release: &shared.release,
        };
        tx.drain(&shared.tx_queue, || shared.accepting_output());
    }

    // Suspended or detaching: leave the miniport alone.
    if !shared.iface.lock().attached {
        return;
    }

    if items.contains(WorkItems::SCAN) {
        let scan = shared.bridge.set_detached(
            miniport,
            ctx,
            oid::BSSID_LIST_SCAN,
            0u32.to_le_bytes().to_vec(),
        );
        if let Some(status) = scan.filter(|s| !s.is_success() && !s.is_pending()) {
            error!("{}: BSSID list scan failed with {}", shared.device.address, status);
        }
    }

    if items.contains(WorkItems::HANGCHECK) && miniport.check_for_hang(ctx) {
        warn!("{}: hang detected, resetting", shared.device.address);
        if entry_points.contains(EntryPoints::RESET) {
            let status = miniport.reset(ctx);
            debug!("{}: reset returned {}", shared.device.address, status);
        }
    }
}
