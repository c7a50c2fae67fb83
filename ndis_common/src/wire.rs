//! Byte layouts of OID payloads.
//!
//! All fields are little-endian. Layouts follow the 802.11 NDIS structures
//! foreign drivers read and write:
//!
//! | Payload | Size |
//! |---------|------|
//! | ESSID request | 36 |
//! | Radio configuration | 32 |
//! | WEP key request | 44 |
//! | BSSID list item | 104 |

use crate::consts::{ESSID_MAX_SIZE, MAX_KEY_LEN, MAX_RATES};
use crate::ndis::MacAddress;
use static_assertions::const_assert_eq;

/// ESSID request size (`len u32` + 32 bytes).
pub const ESSID_REQ_LEN: usize = 4 + ESSID_MAX_SIZE;
/// Radio configuration size.
pub const CONFIGURATION_LEN: usize = 32;
/// Frequency-hopping sub-structure size.
pub const FH_CONFIG_LEN: usize = 16;
/// WEP key request size.
pub const WEP_REQ_LEN: usize = 12 + MAX_KEY_LEN;
/// BSSID list item size.
pub const BSSID_ITEM_LEN: usize = 104;
/// BSSID list header (`num_items u32`).
pub const BSSID_LIST_HEADER_LEN: usize = 4;

const_assert_eq!(ESSID_REQ_LEN, 36);
const_assert_eq!(CONFIGURATION_LEN, 16 + FH_CONFIG_LEN);
const_assert_eq!(WEP_REQ_LEN, 44);
const_assert_eq!(
    BSSID_ITEM_LEN,
    4 + 6 + 2 + ESSID_REQ_LEN + 4 + 4 + 4 + CONFIGURATION_LEN + 4 + MAX_RATES
);

/// Key index flag marking the transmit key.
pub const WEP_TRANSMIT_KEY: u32 = 1 << 31;

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn put_u32(out: &mut [u8], offset: usize, value: u32) {
    out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Network name as carried by `OID_802_11_SSID`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Essid(pub heapless::Vec<u8, ESSID_MAX_SIZE>);

impl Essid {
    /// Build from raw bytes; `None` when longer than 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        heapless::Vec::from_slice(bytes).ok().map(Self)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encode as a request payload.
    pub fn encode(&self) -> [u8; ESSID_REQ_LEN] {
        let mut out = [0u8; ESSID_REQ_LEN];
        put_u32(&mut out, 0, self.0.len() as u32);
        out[4..4 + self.0.len()].copy_from_slice(&self.0);
        out
    }

    /// Decode a request payload; the length field is clamped to 32.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < ESSID_REQ_LEN {
            return None;
        }
        let len = (read_u32(bytes, 0) as usize).min(ESSID_MAX_SIZE);
        Self::from_bytes(&bytes[4..4 + len])
    }
}

/// Frequency-hopping parameters of a radio configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FhConfig {
    pub length: u32,
    pub hop_pattern: u32,
    pub hop_set: u32,
    pub dwell_time: u32,
}

/// Radio configuration (`OID_802_11_CONFIGURATION`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Configuration {
    /// Structure length.
    pub length: u32,
    /// Beacon period in Kusec.
    pub beacon_period: u32,
    /// ATIM window in Kusec.
    pub atim_window: u32,
    /// Frequency in kHz.
    pub ds_config: u32,
    /// Frequency-hopping parameters.
    pub fh_config: FhConfig,
}

impl Configuration {
    /// Configuration selecting `ds_config` kHz, everything else zero.
    pub fn with_frequency(ds_config: u32) -> Self {
        Self {
            ds_config,
            ..Self::default()
        }
    }

    /// Encode.
    pub fn encode(&self) -> [u8; CONFIGURATION_LEN] {
        let mut out = [0u8; CONFIGURATION_LEN];
        put_u32(&mut out, 0, self.length);
        put_u32(&mut out, 4, self.beacon_period);
        put_u32(&mut out, 8, self.atim_window);
        put_u32(&mut out, 12, self.ds_config);
        put_u32(&mut out, 16, self.fh_config.length);
        put_u32(&mut out, 20, self.fh_config.hop_pattern);
        put_u32(&mut out, 24, self.fh_config.hop_set);
        put_u32(&mut out, 28, self.fh_config.dwell_time);
        out
    }

    /// Decode; `None` when `bytes` is shorter than the structure.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < CONFIGURATION_LEN {
            return None;
        }
        Some(Self {
            length: read_u32(bytes, 0),
            beacon_period: read_u32(bytes, 4),
            atim_window: read_u32(bytes, 8),
            ds_config: read_u32(bytes, 12),
            fh_config: FhConfig {
                length: read_u32(bytes, 16),
                hop_pattern: read_u32(bytes, 20),
                hop_set: read_u32(bytes, 24),
                dwell_time: read_u32(bytes, 28),
            },
        })
    }
}

/// Encode an `OID_802_11_ADD_WEP` request. `key` must be at most 32 bytes.
pub fn encode_wep_request(index: u32, key: &[u8]) -> Option<[u8; WEP_REQ_LEN]> {
    if key.len() > MAX_KEY_LEN {
        return None;
    }
    let mut out = [0u8; WEP_REQ_LEN];
    put_u32(&mut out, 0, WEP_REQ_LEN as u32);
    put_u32(&mut out, 4, index | WEP_TRANSMIT_KEY);
    put_u32(&mut out, 8, key.len() as u32);
    out[12..12 + key.len()].copy_from_slice(key);
    Some(out)
}

/// One entry of `OID_802_11_BSSID_LIST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BssidItem {
    /// Item length in bytes, used to advance to the next item.
    pub length: u32,
    /// Access point address.
    pub mac: MacAddress,
    /// Network name.
    pub ssid: Essid,
    /// Privacy filter (`ndis::privacy`).
    pub privacy: u32,
    /// Signal level in dBm.
    pub rssi: i32,
    /// Physical network type (`ndis::network_type`).
    pub net_type: u32,
    /// Radio configuration.
    pub config: Configuration,
    /// Infrastructure mode (`ndis::mode`).
    pub mode: u32,
    /// Supported rates in 500 kb/s units, zero-terminated.
    pub rates: [u8; MAX_RATES],
}

impl BssidItem {
    /// Decode an item; `None` when `bytes` is shorter than the fixed layout.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < BSSID_ITEM_LEN {
            return None;
        }
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&bytes[4..10]);
        let mut rates = [0u8; MAX_RATES];
        rates.copy_from_slice(&bytes[96..96 + MAX_RATES]);
        Some(Self {
            length: read_u32(bytes, 0),
            mac: MacAddress(mac),
            ssid: Essid::decode(&bytes[12..12 + ESSID_REQ_LEN])?,
            privacy: read_u32(bytes, 48),
            rssi: read_u32(bytes, 52) as i32,
            net_type: read_u32(bytes, 56),
            config: Configuration::decode(&bytes[60..60 + CONFIGURATION_LEN])?,
            mode: read_u32(bytes, 92),
            rates,
        })
    }

    /// Encode; `length` is written as given.
    pub fn encode(&self) -> [u8; BSSID_ITEM_LEN] {
        let mut out = [0u8; BSSID_ITEM_LEN];
        put_u32(&mut out, 0, self.length);
        out[4..10].copy_from_slice(&self.mac.octets());
        out[12..12 + ESSID_REQ_LEN].copy_from_slice(&self.ssid.encode());
        put_u32(&mut out, 48, self.privacy);
        put_u32(&mut out, 52, self.rssi as u32);
        put_u32(&mut out, 56, self.net_type);
        out[60..60 + CONFIGURATION_LEN].copy_from_slice(&self.config.encode());
        put_u32(&mut out, 92, self.mode);
        out[96..96 + MAX_RATES].copy_from_slice(&self.rates);
        out
    }
}

/// Encode a BSSID list from `items`.
pub fn encode_bssid_list(items: &[BssidItem]) -> Vec<u8> {
    let mut out = Vec::with_capacity(BSSID_LIST_HEADER_LEN + items.len() * BSSID_ITEM_LEN);
    out.extend_from_slice(&(items.len() as u32).to_le_bytes());
    for item in items {
        out.extend_from_slice(&item.encode());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndis::{mode, network_type, privacy};

    #[test]
    fn test_essid_encode_layout() {
        let essid = Essid::from_bytes(b"lab").unwrap();
        let bytes = essid.encode();
        assert_eq!(&bytes[..4], &3u32.to_le_bytes());
        assert_eq!(&bytes[4..7], b"lab");
        assert!(bytes[7..].iter().all(|&b| b == 0));
        assert_eq!(Essid::decode(&bytes), Some(essid));
    }

    #[test]
    fn test_essid_too_long() {
        assert!(Essid::from_bytes(&[b'a'; 33]).is_none());
        assert!(Essid::from_bytes(&[b'a'; 32]).is_some());
    }

    #[test]
    fn test_essid_decode_clamps_length() {
        let mut bytes = [b'x'; ESSID_REQ_LEN];
        bytes[..4].copy_from_slice(&500u32.to_le_bytes());
        assert_eq!(Essid::decode(&bytes).unwrap().as_bytes().len(), 32);
    }

    #[test]
    fn test_configuration_ds_config_offset() {
        let bytes = Configuration::with_frequency(2_437_000).encode();
        assert_eq!(&bytes[12..16], &2_437_000u32.to_le_bytes());
        assert_eq!(Configuration::decode(&bytes).unwrap().ds_config, 2_437_000);
        assert!(Configuration::decode(&bytes[..31]).is_none());
    }

    #[test]
    fn test_wep_request_layout() {
        let bytes = encode_wep_request(1, b"12345").unwrap();
        assert_eq!(read_u32(&bytes, 0), 44);
        assert_eq!(read_u32(&bytes, 4), 1 | WEP_TRANSMIT_KEY);
        assert_eq!(read_u32(&bytes, 8), 5);
        assert_eq!(&bytes[12..17], b"12345");
        assert!(encode_wep_request(0, &[0; 33]).is_none());
    }

    #[test]
    fn test_bssid_item_decode() {
        let item = BssidItem {
            length: BSSID_ITEM_LEN as u32,
            mac: MacAddress([0, 1, 2, 3, 4, 5]),
            ssid: Essid::from_bytes(b"ap").unwrap(),
            privacy: privacy::FILTER_8021X,
            rssi: -55,
            net_type: network_type::OFDM24,
            config: Configuration::with_frequency(2_412_000),
            mode: mode::INFRASTRUCTURE,
            rates: [0x82, 0x84, 0x0b, 0x16, 0, 0, 0, 0],
        };
        let bytes = item.encode();
        assert_eq!(BssidItem::decode(&bytes), Some(item));
        assert!(BssidItem::decode(&bytes[..100]).is_none());
    }
}
