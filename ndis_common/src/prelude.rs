//! Prelude module for common re-exports.
//!
//! This module provides convenient re-exports of commonly used types
//! so that consumers can do `use ndis_common::prelude::*;` and get
//! the most important types without listing individual paths.
//!
//! # Usage
//!
//! ```rust
//! use ndis_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    AdapterConfig, ConfigError, ConfigLoader, LogLevel, SharedConfig, WrapperConfig,
};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{DEFAULT_BASENAME, MAX_DRIVER_NAME_LEN, WRAPPER_SERVICE_NAME};

// ─── Hardware ───────────────────────────────────────────────────────
pub use crate::hardware::{
    BusBinding, HardwareBus, HardwareDevice, HardwareError, HardwareId, HotplugHandler,
};

// ─── Miniport Contract ──────────────────────────────────────────────
pub use crate::miniport::{
    AdapterContext, DriverEntry, EntryPoints, ImageLoader, InformationBuffer, LoaderError,
    Miniport, MiniportCallbacks, MiniportHost, Packet, SendDisposition,
};

// ─── NDIS Values ────────────────────────────────────────────────────
pub use crate::ndis::{MacAddress, Oid, Status, oid};

// ─── Host Network Stack ─────────────────────────────────────────────
pub use crate::netdev::{NetStack, NetdevError};

// ─── Settings ───────────────────────────────────────────────────────
pub use crate::setting::{Setting, SettingKind, SettingValue};
