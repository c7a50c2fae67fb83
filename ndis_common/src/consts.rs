//! Workspace-wide constants.
//!
//! Limits inherited from the host network stack (interface names, wireless
//! extension buffers) and from the 802.11 OID payload layouts.

/// Canonical service name (used for logging).
pub const WRAPPER_SERVICE_NAME: &str = "ndiswrapper";

/// Maximum driver name length in bytes, NUL terminator excluded.
pub const MAX_DRIVER_NAME_LEN: usize = 31;

/// Size of the NUL-padded name field in the PutDriver payload.
pub const DRIVER_NAME_FIELD_LEN: usize = 32;

/// Maximum setting name length in bytes.
pub const MAX_SETTING_NAME_LEN: usize = 64;

/// Maximum string setting payload in bytes.
pub const MAX_SETTING_STRING_LEN: usize = 255;

/// Host interface name size (including NUL), as in `IFNAMSIZ`.
pub const IFNAMSIZ: usize = 16;

/// Longest accepted interface basename; leaves room for `%d`.
pub const MAX_BASENAME_LEN: usize = IFNAMSIZ - 3;

/// Slots on the simulated bus; device indices are a `u8`.
pub const MAX_SIMULATED_DEVICES: usize = u8::MAX as usize + 1;

/// Default interface basename.
pub const DEFAULT_BASENAME: &str = "eth";

/// Default scan trigger period in milliseconds.
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 10_000;

/// Default hang-check period in milliseconds.
pub const DEFAULT_HANGCHECK_INTERVAL_MS: u64 = 2_000;

/// Maximum ESSID length in bytes.
pub const ESSID_MAX_SIZE: usize = 32;

/// Maximum WEP key length in bytes.
pub const MAX_KEY_LEN: usize = 32;

/// Maximum number of supported-rate entries per BSSID item.
pub const MAX_RATES: usize = 8;

/// Maximum number of BSSID items translated per scan retrieval.
pub const MAX_SCAN_LIST_ITEMS: usize = 10;

/// Maximum size of the translated scan event stream.
pub const SCAN_MAX_DATA: usize = 4096;

/// Number of channels in the 2.4 GHz table.
pub const CHANNEL_COUNT: usize = 14;

/// Highest tx power accepted in dBm.
pub const MAX_TX_POWER_DBM: i32 = 50;
