//! BSSID list translation.
//!
//! The miniport's list is walked item by item, advancing by each item's own
//! length field. Each item becomes a `ScanEntry` and a run of wireless-event
//! records appended to a stream capped at `SCAN_MAX_DATA` bytes.
//!
//! Event record: `len u16 | cmd u16 | payload`, little-endian.

use super::WirelessMode;
use super::freq::{Frequency, from_ds_config};
use ndis_common::consts::{IFNAMSIZ, MAX_SCAN_LIST_ITEMS, SCAN_MAX_DATA};
use ndis_common::ndis::{MacAddress, network_type_name, privacy};
use ndis_common::wire::{BSSID_ITEM_LEN, BSSID_LIST_HEADER_LEN, BssidItem};
use serde::Serialize;
use tracing::warn;

/// Event command codes.
pub mod event {
    /// Access point address.
    pub const AP: u16 = 0x8B15;
    /// Network name.
    pub const ESSID: u16 = 0x8B1B;
    /// Protocol name.
    pub const NAME: u16 = 0x8B01;
    /// Operating mode.
    pub const MODE: u16 = 0x8B07;
    /// Frequency.
    pub const FREQ: u16 = 0x8B05;
    /// Link quality.
    pub const QUAL: u16 = 0x8C01;
    /// Encryption.
    pub const ENCODE: u16 = 0x8B2B;
    /// Bit rates.
    pub const RATE: u16 = 0x8B21;
}

const EVENT_HEADER_LEN: usize = 4;
const ARPHRD_ETHER: u16 = 1;
const ENCODE_ENABLED_NOKEY: u16 = 0x0800;
const ENCODE_DISABLED: u16 = 0x8000;

/// One translated scan result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanEntry {
    /// Access point address.
    pub bssid: MacAddress,
    /// Network name bytes.
    pub essid: Vec<u8>,
    /// Protocol name.
    pub protocol: &'static str,
    /// Operating mode.
    pub mode: WirelessMode,
    /// Frequency in host encoding.
    pub frequency: Frequency,
    /// Signal level in dBm.
    pub level: i32,
    /// Network requires encryption.
    pub privacy: bool,
    /// Supported rates in b/s.
    pub rates: Vec<u32>,
}

/// Translated scan results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResults {
    /// Structured entries.
    pub entries: Vec<ScanEntry>,
    /// Wireless-event stream.
    pub events: Vec<u8>,
    /// True when events were dropped for lack of space.
    pub truncated: bool,
}

/// Walk a raw `OID_802_11_BSSID_LIST` buffer.
///
/// Stops after `MAX_SCAN_LIST_ITEMS`, at the end of the buffer, or at an
/// item whose length field is shorter than the fixed item layout.
pub fn parse_bssid_list(data: &[u8]) -> Vec<BssidItem> {
    let Some(header) = data.get(..BSSID_LIST_HEADER_LEN) else {
        return Vec::new();
    };
    let count = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;

    let mut items = Vec::new();
    let mut offset = BSSID_LIST_HEADER_LEN;
    for _ in 0..count.min(MAX_SCAN_LIST_ITEMS) {
        let Some(item) = data.get(offset..).and_then(BssidItem::decode) else {
            break;
        };
        let len = item.length as usize;
        if len < BSSID_ITEM_LEN {
            warn!("malformed BSSID item length {} at offset {}", len, offset);
            break;
        }
        items.push(item);
        offset = match offset.checked_add(len) {
            Some(next) => next,
            None => break,
        };
    }
    items
}

/// Translate one item into a structured entry.
pub fn translate(item: &BssidItem) -> ScanEntry {
    ScanEntry {
        bssid: item.mac,
        essid: item.ssid.as_bytes().to_vec(),
        protocol: network_type_name(item.net_type),
        mode: WirelessMode::from_ndis(item.mode),
        frequency: from_ds_config(item.config.ds_config),
        level: item.rssi,
        privacy: item.privacy != privacy::ACCEPT_ALL,
        rates: item
            .rates
            .iter()
            .take_while(|&&r| r != 0)
            .map(|&r| u32::from(r & 0x7f) * 500_000)
            .collect(),
    }
}

struct EventStream {
    buf: Vec<u8>,
    truncated: bool,
}

impl EventStream {
    fn push(&mut self, cmd: u16, payload: &[u8]) {
        let len = EVENT_HEADER_LEN + payload.len();
        if self.buf.len() + len > SCAN_MAX_DATA {
            self.truncated = true;
            return;
        }
        self.buf.extend_from_slice(&(len as u16).to_le_bytes());
        self.buf.extend_from_slice(&cmd.to_le_bytes());
        self.buf.extend_from_slice(payload);
    }

    fn push_point(&mut self, cmd: u16, flags: u16, data: &[u8]) {
        let mut payload = Vec::with_capacity(4 + data.len());
        payload.extend_from_slice(&(data.len() as u16).to_le_bytes());
        payload.extend_from_slice(&flags.to_le_bytes());
        payload.extend_from_slice(data);
        self.push(cmd, &payload);
    }

    fn push_entry(&mut self, entry: &ScanEntry) {
        let mut addr = [0u8; 16];
        addr[..2].copy_from_slice(&ARPHRD_ETHER.to_le_bytes());
        addr[2..8].copy_from_slice(&entry.bssid.octets());
        self.push(event::AP, &addr);

        self.push_point(event::ESSID, 1, &entry.essid);

        let mut name = [0u8; IFNAMSIZ];
        let proto = entry.protocol.as_bytes();
        let n = proto.len().min(IFNAMSIZ - 1);
        name[..n].copy_from_slice(&proto[..n]);
        self.push(event::NAME, &name);

        self.push(event::MODE, &entry.mode.to_iw().to_le_bytes());

        let mut freq = [0u8; 8];
        freq[..4].copy_from_slice(&entry.frequency.m.to_le_bytes());
        freq[4..6].copy_from_slice(&entry.frequency.e.to_le_bytes());
        self.push(event::FREQ, &freq);

        self.push(event::QUAL, &[0, entry.level as u8, 0, 0]);

        let flags = if entry.privacy {
            ENCODE_ENABLED_NOKEY
        } else {
            ENCODE_DISABLED
        };
        self.push_point(event::ENCODE, flags, &[]);

        if !entry.rates.is_empty() {
            let mut rates = Vec::with_capacity(entry.rates.len() * 8);
            for rate in &entry.rates {
                rates.extend_from_slice(&(*rate as i32).to_le_bytes());
                rates.extend_from_slice(&[0u8; 4]);
            }
            self.push(event::RATE, &rates);
        }
    }
}

/// Translate a raw BSSID list into entries and an event stream.
pub fn translate_list(data: &[u8]) -> ScanResults {
    let mut stream = EventStream {
        buf: Vec::new(),
        truncated: false,
    };
    let entries: Vec<ScanEntry> = parse_bssid_list(data).iter().map(translate).collect();
    for entry in &entries {
        stream.push_entry(entry);
    }
    ScanResults {
        entries,
        events: stream.buf,
        truncated: stream.truncated,
    }
}
