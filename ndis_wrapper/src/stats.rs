//! Cached interface counters.
//!
//! Updated by the transmit release path and the receive indication; read by
//! the host without ever calling into the miniport.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters of one adapter.
#[derive(Debug, Default)]
pub struct AdapterStats {
    tx_packets: AtomicU64,
    tx_bytes: AtomicU64,
    tx_errors: AtomicU64,
    tx_dropped: AtomicU64,
    tx_in_flight: AtomicU64,
    rx_packets: AtomicU64,
    rx_bytes: AtomicU64,
}

/// Point-in-time copy of `AdapterStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Frames the miniport sent successfully
    pub tx_packets: u64,
    /// Bytes the miniport sent successfully
    pub tx_bytes: u64,
    /// Frames released with a failure status
    pub tx_errors: u64,
    /// Frames dropped before reaching the miniport
    pub tx_dropped: u64,
    /// Frames handed to the miniport and not yet released
    pub tx_in_flight: u64,
    /// Frames indicated by the miniport
    pub rx_packets: u64,
    /// Bytes indicated by the miniport
    pub rx_bytes: u64,
}

impl AdapterStats {
    /// Packet handed to the miniport.
    pub fn dispatched(&self) {
        self.tx_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Dispatched packet released.
    pub fn released(&self, len: usize, success: bool) {
        self.tx_in_flight.fetch_sub(1, Ordering::Relaxed);
        if success {
            self.tx_packets.fetch_add(1, Ordering::Relaxed);
            self.tx_bytes.fetch_add(len as u64, Ordering::Relaxed);
        } else {
            self.tx_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Packet dropped before dispatch.
    pub fn dropped(&self, count: u64) {
        self.tx_dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Frame received.
    pub fn received(&self, len: usize) {
        self.rx_packets.fetch_add(1, Ordering::Relaxed);
        self.rx_bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Copy the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            tx_packets: self.tx_packets.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            tx_errors: self.tx_errors.load(Ordering::Relaxed),
            tx_dropped: self.tx_dropped.load(Ordering::Relaxed),
            tx_in_flight: self.tx_in_flight.load(Ordering::Relaxed),
            rx_packets: self.rx_packets.load(Ordering::Relaxed),
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
        }
    }
}
