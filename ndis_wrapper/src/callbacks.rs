//! Completion and indication callbacks handed to the miniport.
//!
//! Every callback may run on any thread the miniport chooses. They only
//! store-and-wake, release a packet, flip the link flag or log.

use crate::bridge::RequestKind;
use crate::handle::AdapterShared;
use ndis_common::miniport::{MiniportCallbacks, Packet};
use ndis_common::ndis::Status;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

/// Callbacks bound to one adapter.
pub struct AdapterCallbacks {
    shared: Arc<AdapterShared>,
}

impl AdapterCallbacks {
    /// Callbacks for `shared`.
    pub(crate) fn new(shared: Arc<AdapterShared>) -> Self {
        Self { shared }
    }
}

impl MiniportCallbacks for AdapterCallbacks {
    fn query_complete(&self, status: Status) {
        self.shared.bridge.slot(RequestKind::Query).complete(status);
    }

    fn set_complete(&self, status: Status) {
        self.shared.bridge.slot(RequestKind::Set).complete(status);
    }

    fn send_complete(&self, packet: Packet, status: Status) {
        self.shared.release.release(packet, status);
    }

    fn reset_complete(&self, status: Status, addressing_reset: bool) {
        if status.is_success() {
            info!(
                "{}: reset complete (addressing reset: {})",
                self.shared.device.address, addressing_reset
            );
        } else {
            warn!(
                "{}: reset failed with {}",
                self.shared.device.address, status
            );
        }
    }

    fn indicate_status(&self, status: Status) {
        match status {
            Status::MEDIA_CONNECT => {
                self.shared.link.store(true, Ordering::Release);
                info!("{}: link up", self.shared.device.address);
            }
            Status::MEDIA_DISCONNECT => {
                self.shared.link.store(false, Ordering::Release);
                info!("{}: link down", self.shared.device.address);
            }
            other => debug!("{}: status indication {}", self.shared.device.address, other),
        }
    }

    fn indicate_receive(&self, frame: &[u8]) {
        self.shared.release.stats().received(frame.len());
        let name = {
            let iface = self.shared.iface.lock();
            if !iface.registered {
                return;
            }
            iface.name.clone()
        };
        self.shared.netstack.receive(&name, frame);
    }
}
