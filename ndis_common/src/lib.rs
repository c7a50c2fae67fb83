//! NDIS Common Library
//!
//! Shared types, the miniport contract and configuration loading used by
//! every crate in the wrapper workspace.
//!
//! # Module Structure
//!
//! - [`config`] - TOML configuration loading and validation
//! - [`consts`] - Workspace-wide limits and defaults
//! - [`hardware`] - Hardware bus contract (discovery, hot-plug, DMA)
//! - [`miniport`] - Foreign driver contract and loader traits
//! - [`ndis`] - Status codes, OIDs and 802.11 enumerations
//! - [`netdev`] - Host network stack contract
//! - [`setting`] - Typed driver settings
//! - [`wire`] - Byte layouts of OID payloads
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```toml
//! [dependencies]
//! ndis_common = { path = "../ndis_common" }
//! ```
//!
//! ```rust
//! use ndis_common::prelude::*;
//! ```

pub mod config;
pub mod consts;
pub mod hardware;
pub mod miniport;
pub mod ndis;
pub mod netdev;
pub mod prelude;
pub mod setting;
pub mod wire;
