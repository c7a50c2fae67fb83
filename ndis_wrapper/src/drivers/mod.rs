//! Backends for the wrapper's external collaborators.
//!
//! - [`simulation`] - Software bus, miniport and image loader for
//!   development and testing
//!
//! # Adding Backends
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement `HardwareBus` and `ImageLoader` from `ndis_common`
//! 3. Wire it into `NdisWrapper::new` from the binary

pub mod simulation;
