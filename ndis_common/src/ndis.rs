//! NDIS status codes, OIDs and 802.11 enumerations.
//!
//! Values are opaque to the wrapper beyond the distinction between
//! "pending" and everything else; they are kept numerically compatible with
//! the values foreign drivers expect.

use std::fmt;

/// Result code returned by a miniport entry point or passed to a
/// completion callback.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub u32);

impl Status {
    /// Operation completed successfully.
    pub const SUCCESS: Status = Status(0x0000_0000);
    /// Operation will complete later through a completion callback.
    pub const PENDING: Status = Status(0x0000_0103);
    /// Generic failure.
    pub const FAILURE: Status = Status(0xC000_0001);
    /// Out of resources.
    pub const RESOURCES: Status = Status(0xC000_009A);
    /// Entry point or OID not supported.
    pub const NOT_SUPPORTED: Status = Status(0xC000_00BB);
    /// Information buffer has the wrong length.
    pub const INVALID_LENGTH: Status = Status(0xC001_0014);
    /// Information buffer too short.
    pub const BUFFER_TOO_SHORT: Status = Status(0xC001_0016);
    /// Invalid data in the information buffer.
    pub const INVALID_DATA: Status = Status(0xC001_0015);
    /// Status indication: link up.
    pub const MEDIA_CONNECT: Status = Status(0x4001_000B);
    /// Status indication: link down.
    pub const MEDIA_DISCONNECT: Status = Status(0x4001_000C);

    /// True for the pending sentinel.
    pub fn is_pending(self) -> bool {
        self == Self::PENDING
    }

    /// True for `SUCCESS`.
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status({:#010x})", self.0)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Object identifier selecting the parameter a query or set targets.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid(pub u32);

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({:#010x})", self.0)
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// OIDs issued by the wrapper.
pub mod oid {
    use super::Oid;

    pub const GEN_LINK_SPEED: Oid = Oid(0x0001_0107);
    pub const CURRENT_ADDRESS: Oid = Oid(0x0101_0102);
    pub const BSSID: Oid = Oid(0x0D01_0101);
    pub const SSID: Oid = Oid(0x0D01_0102);
    pub const NETWORK_TYPE_IN_USE: Oid = Oid(0x0D01_0204);
    pub const TX_POWER_LEVEL: Oid = Oid(0x0D01_0205);
    pub const RSSI: Oid = Oid(0x0D01_0206);
    pub const INFRASTRUCTURE_MODE: Oid = Oid(0x0D01_0108);
    pub const FRAGMENTATION_THRESHOLD: Oid = Oid(0x0D01_0209);
    pub const RTS_THRESHOLD: Oid = Oid(0x0D01_020A);
    pub const CONFIGURATION: Oid = Oid(0x0D01_0211);
    pub const ADD_WEP: Oid = Oid(0x0D01_0113);
    pub const REMOVE_WEP: Oid = Oid(0x0D01_0114);
    pub const DISASSOCIATE: Oid = Oid(0x0D01_0115);
    pub const POWER_MODE: Oid = Oid(0x0D01_0216);
    pub const BSSID_LIST: Oid = Oid(0x0D01_0217);
    pub const AUTHENTICATION_MODE: Oid = Oid(0x0D01_0118);
    pub const BSSID_LIST_SCAN: Oid = Oid(0x0D01_011A);
    pub const WEP_STATUS: Oid = Oid(0x0D01_011B);
    pub const PNP_SET_POWER: Oid = Oid(0xFD01_0101);
    pub const PNP_QUERY_POWER: Oid = Oid(0xFD01_0102);
}

/// Device power states passed through the PnP power OIDs.
pub mod power_state {
    /// Full power.
    pub const D0: u32 = 1;
    /// Light sleep.
    pub const D1: u32 = 2;
    /// Deep sleep.
    pub const D2: u32 = 3;
    /// Off.
    pub const D3: u32 = 4;
}

/// Infrastructure mode values (`OID_802_11_INFRASTRUCTURE_MODE`).
pub mod mode {
    pub const ADHOC: u32 = 0;
    pub const INFRASTRUCTURE: u32 = 1;
    pub const AUTO: u32 = 2;
}

/// Encryption status values (`OID_802_11_WEP_STATUS`).
pub mod encryption {
    pub const ENABLED: u32 = 0;
    pub const DISABLED: u32 = 1;
    pub const KEY_ABSENT: u32 = 2;
    pub const NOT_SUPPORTED: u32 = 3;
}

/// Authentication mode values (`OID_802_11_AUTHENTICATION_MODE`).
pub mod auth_mode {
    pub const OPEN: u32 = 0;
    pub const SHARED: u32 = 1;
    pub const AUTO_SWITCH: u32 = 2;
}

/// Power saving mode values (`OID_802_11_POWER_MODE`).
pub mod power_mode {
    pub const CAM: u32 = 0;
    pub const MAX_PSP: u32 = 1;
    pub const FAST_PSP: u32 = 2;
}

/// Privacy filter values reported in BSSID items.
pub mod privacy {
    pub const ACCEPT_ALL: u32 = 0;
    pub const FILTER_8021X: u32 = 1;
}

/// Physical network types (`OID_802_11_NETWORK_TYPE_IN_USE`).
pub mod network_type {
    pub const FH: u32 = 0;
    pub const DS: u32 = 1;
    pub const OFDM5: u32 = 2;
    pub const OFDM24: u32 = 3;
}

/// Protocol name shown to the host for a network type.
pub fn network_type_name(net_type: u32) -> &'static str {
    const NAMES: [&str; 4] = ["IEEE 802.11FH", "IEEE 802.11b", "IEEE 802.11a", "IEEE 802.11g"];
    NAMES
        .get(net_type as usize)
        .copied()
        .unwrap_or("IEEE 802.11")
}

/// Ethernet hardware address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Parse `aa:bb:cc:dd:ee:ff`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut bytes = [0u8; 6];
        let mut parts = text.split(':');
        for byte in bytes.iter_mut() {
            *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
        }
        if parts.next().is_some() {
            return None;
        }
        Some(Self(bytes))
    }

    /// Raw bytes.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl serde::Serialize for MacAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
