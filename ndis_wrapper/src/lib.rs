//! # NDIS Wrapper Library
//!
//! Hosts foreign NDIS miniport drivers behind a host network stack, with
//! pluggable bus, image loader and network stack backends.
//!
//! Backends implement the contracts in `ndis_common::hardware`,
//! `ndis_common::miniport` and `ndis_common::netdev`.
//!
//! # Module Structure
//!
//! - [`core`] - NdisWrapper struct, driver load/start/unload
//! - [`control`] - Control channel (PutDriver, PutSetting, StartDriver, CancelLoad)
//! - [`driver_registry`] - Registered driver records and hot-plug binding
//! - [`handle`] - Per-device handle: bring-up and teardown
//! - [`bridge`] - Synchronous query/set over asynchronous completion
//! - [`xmit`] - Transmit queue, DMA mapping and release
//! - [`work`] - Deferred work queue and worker thread
//! - [`timers`] - Periodic scan and hang-check timers
//! - [`power`] - Suspend and resume
//! - [`wireless`] - Wireless configuration and scan translation
//! - [`callbacks`] - Completion and indication callbacks
//! - [`stats`] - Cached interface counters
//! - [`netdev`] - In-process host network stack
//! - [`drivers`] - Bus/loader/miniport backends
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                    ndis_wrapper (single crate)                    │
//! │  ┌──────────────┐    ┌──────────────┐    ┌─────────────────────┐  │
//! │  │ ControlChannel│──►│  NdisWrapper │◄──►│  Driver Registry    │  │
//! │  └──────────────┘    └──────┬───────┘    └──────────┬──────────┘  │
//! │                             │ register / probe      │             │
//! │                             ▼                       ▼             │
//! │                   ┌────────────────┐       ┌────────────────┐     │
//! │                   │  HardwareBus   │──────►│  DeviceHandle  │     │
//! │                   └────────────────┘       └───────┬────────┘     │
//! │                                 bridge / xmit / work / timers     │
//! │                                                    ▼              │
//! │                                           ┌────────────────┐      │
//! │                                           │   Miniport     │      │
//! │                                           │ (trait object) │      │
//! │                                           └────────────────┘      │
//! └───────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod bridge;
pub mod callbacks;
pub mod control;
pub mod core;
pub mod driver_registry;
pub mod drivers;
pub mod error;
pub mod handle;
pub mod netdev;
pub mod power;
pub mod stats;
pub mod timers;
pub mod wireless;
pub mod work;
pub mod xmit;

// Re-export key types for convenience
pub use crate::control::ControlChannel;
pub use crate::core::{LoadedDriver, NdisWrapper};
pub use crate::driver_registry::{DriverId, DriverRegistry, RegisteredDriver};
pub use crate::error::{Result, WrapperError};
pub use crate::handle::DeviceHandle;
pub use crate::power::PowerState;
