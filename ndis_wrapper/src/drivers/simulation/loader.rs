//! Simulated image loader.
//!
//! Accepts any image carrying the PE `MZ` signature and resolves its entry
//! point to a fixed miniport.

use ndis_common::miniport::{DriverEntry, ImageLoader, LoaderError, Miniport};
use ndis_common::ndis::Status;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// DOS header signature every accepted image starts with.
pub const IMAGE_SIGNATURE: &[u8; 2] = b"MZ";

/// Loader whose entry point hands out one shared miniport.
pub struct SimulationLoader {
    miniport: Arc<dyn Miniport>,
    entry_failure: Mutex<Option<Status>>,
}

impl SimulationLoader {
    /// Loader resolving every image to `miniport`.
    pub fn new(miniport: Arc<dyn Miniport>) -> Self {
        Self {
            miniport,
            entry_failure: Mutex::new(None),
        }
    }

    /// Make entry routines of images prepared from now on fail with
    /// `status`, or succeed again with `None`.
    pub fn fail_entry(&self, status: Option<Status>) {
        *self.entry_failure.lock() = status;
    }
}

impl ImageLoader for SimulationLoader {
    fn prepare_image(&self, image: &[u8]) -> Result<Arc<dyn DriverEntry>, LoaderError> {
        if !image.starts_with(IMAGE_SIGNATURE) {
            return Err(LoaderError::InvalidImage(format!(
                "missing MZ signature ({} bytes)",
                image.len()
            )));
        }
        debug!("prepared {} byte image", image.len());
        Ok(Arc::new(SimulatedEntry {
            miniport: Arc::clone(&self.miniport),
            failure: *self.entry_failure.lock(),
        }))
    }
}

struct SimulatedEntry {
    miniport: Arc<dyn Miniport>,
    failure: Option<Status>,
}

impl DriverEntry for SimulatedEntry {
    fn call(&self) -> Result<Arc<dyn Miniport>, Status> {
        match self.failure {
            Some(status) => Err(status),
            None => Ok(Arc::clone(&self.miniport)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::simulation::SimulatedMiniport;

    #[test]
    fn test_rejects_image_without_signature() {
        let loader = SimulationLoader::new(Arc::new(SimulatedMiniport::new()));
        assert!(matches!(
            loader.prepare_image(b"\x7fELF"),
            Err(LoaderError::InvalidImage(_))
        ));
        assert!(loader.prepare_image(b"M").is_err());
    }

    #[test]
    fn test_entry_returns_miniport() {
        let loader = SimulationLoader::new(Arc::new(SimulatedMiniport::new()));
        let entry = loader.prepare_image(b"MZ\x90\x00").unwrap();
        assert!(entry.call().is_ok());
    }

    #[test]
    fn test_entry_failure() {
        let loader = SimulationLoader::new(Arc::new(SimulatedMiniport::new()));
        loader.fail_entry(Some(Status::FAILURE));
        let entry = loader.prepare_image(b"MZ").unwrap();
        assert_eq!(entry.call().err(), Some(Status::FAILURE));
    }
}
