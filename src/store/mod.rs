//! The store abstraction: a named aggregate serving the storage surface.

pub mod fs;
pub mod tape;

use std::sync::Arc;

use crate::config::StoreConfig;
use crate::errors::Result;
use crate::storage::Storage;
use crate::store::tape::{DeviceMode, Volume};

/// The administrative surface of a store.
pub trait Management: Send + Sync {
    /// Returns a list of known volumes.
    fn volumes(&self) -> Result<Vec<Volume>>;
}

/// The store interface.
pub trait Store: Storage {
    /// The configured name of the store.
    fn name(&self) -> &str;

    /// The management surface, for stores that have one.
    fn management(&self) -> Option<Arc<dyn Management>> {
        None
    }

    /// Releases the store's resources on shutdown.
    fn stop(&self) {}
}

impl std::fmt::Debug for dyn Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("name", &self.name()).finish()
    }
}

/// Flags that shape store creation, from the server command line.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub reset_db: bool,
    pub audit: bool,
    pub device_mode: DeviceMode,
}

impl Default for RunOptions {
    fn default() -> RunOptions {
        RunOptions {
            reset_db: false,
            audit: false,
            device_mode: DeviceMode::Real,
        }
    }
}

/// Creates a store from its configuration. The backend set is closed:
/// unknown backends are already rejected when the configuration is
/// parsed.
pub fn create(name: &str, cfg: &StoreConfig, opts: &RunOptions) -> Result<Arc<dyn Store>> {
    match cfg {
        StoreConfig::Fs(cfg) => fs::new(name, cfg),
        StoreConfig::Tape(cfg) => tape::service::new(name, cfg.as_ref(), opts),
    }
}
