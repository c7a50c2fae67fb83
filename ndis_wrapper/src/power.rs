//! Suspend/resume orchestration.
//!
//! Transitions of one handle are serialized by its power lock; handles are
//! independent. Both transitions go through the request bridge and must run
//! in a context that may block.

use crate::error::{Result, WrapperError};
use crate::handle::DeviceHandle;
use crate::work::WorkItems;
use ndis_common::ndis::{oid, power_state};
use tracing::{debug, info, warn};

/// Power state of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// Full power, interface attached.
    Active,
    /// Suspended in the given device power state.
    Suspended {
        /// State set through `OID_PNP_SET_POWER`.
        device_state: u32,
    },
}

impl DeviceHandle {
    /// Current power state.
    pub fn power_state(&self) -> PowerState {
        *self.power.lock()
    }

    /// Suspend the adapter.
    ///
    /// Stops the scan timer, detaches the interface and stops its queue, waits
    /// for the worker to go idle, then asks the miniport for its preferred
    /// low-power state (D3 when it cannot answer) and sets it. A failed set is logged; the handle still counts as
    /// suspended. Suspending a suspended handle does nothing.
    pub fn suspend(&self) -> Result<()> {
        let mut power = self.power.lock();
        if matches!(*power, PowerState::Suspended { .. }) {
            debug!("{}: already suspended", self.device().address);
            return Ok(());
        }
        if self.is_torn_down() {
            return Err(WrapperError::NotReady(self.device().address.to_string()));
        }

        self.scan_timer.stop();
        {
            let mut iface = self.shared.iface.lock();
            iface.attached = false;
            iface.queue_started = false;
        }
        // Let an item that passed the attach check finish before D3.
        self.work.flush();

        let device_state = match self.query(oid::PNP_QUERY_POWER, power_state::D3.to_le_bytes().to_vec())
        {
            Ok(outcome) => outcome
                .data
                .get(..4)
                .and_then(|b| b.try_into().ok())
                .map_or(power_state::D3, u32::from_le_bytes),
            Err(e) => {
                warn!("{}: power query failed ({}), using D3", self.device().address, e);
                power_state::D3
            }
        };
        if let Err(e) = self.set_u32(oid::PNP_SET_POWER, device_state) {
            warn!(
                "{}: setting power state {} failed: {}",
                self.device().address,
                device_state,
                e
            );
        }

        *power = PowerState::Suspended { device_state };
        info!("{}: suspended (D{})", self.name(), device_state.saturating_sub(1));
        Ok(())
    }

    /// Resume the adapter.
    ///
    /// Sets D0, restarts the queue, reattaches the interface, restarts the
    /// scan timer and sends frames left queued at suspend. Resuming an active handle does nothing.
    pub fn resume(&self) -> Result<()> {
        let mut power = self.power.lock();
        if *power == PowerState::Active {
            debug!("{}: not suspended", self.device().address);
            return Ok(());
        }
        if self.is_torn_down() {
            return Err(WrapperError::NotReady(self.device().address.to_string()));
        }

        if let Err(e) = self.set_u32(oid::PNP_SET_POWER, power_state::D0) {
            warn!("{}: setting D0 failed: {}", self.device().address, e);
        }
        {
            let mut iface = self.shared.iface.lock();
            iface.queue_started = true;
            iface.attached = true;
        }
        self.scan_timer.start()?;
        self.work.schedule(WorkItems::XMIT);

        *power = PowerState::Active;
        info!("{}: resumed", self.name());
        Ok(())
    }
}
