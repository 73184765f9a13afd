//! The storage format layer: turning a raw device path plus a volume
//! identity into a mountable, byte-addressable filesystem.

pub mod fsdir;
pub mod ltfs;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::errors::{Error, Kind, Result};
use crate::storage::Storage;
use crate::store::tape::{DeviceMode, DriverConfig, Volume};

/// A mount/unmount capability for formats that need one. The drive
/// manager calls `mount` right after a successful format and `unmount`
/// on shutdown.
pub trait Mount: Send + Sync {
    fn mount(&self) -> Result<()>;
    fn unmount(&self) -> Result<()>;
}

/// The outcome of formatting a device.
pub struct Formatted {
    /// True when a fresh filesystem was written; the caller promotes the
    /// volume to `filling`.
    pub formatted: bool,

    /// The storage surface of the (to be) mounted filesystem.
    pub storage: Arc<dyn Storage>,

    /// Present when the format must be mounted before use.
    pub mount: Option<Box<dyn Mount>>,
}

impl std::fmt::Debug for Formatted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Formatted")
            .field("formatted", &self.formatted)
            .field("mount", &self.mount.is_some())
            .finish()
    }
}

/// A storage format backend.
pub trait Format: Send + Sync {
    /// Formats the volume in the device at `devpath` if it is freshly
    /// allocated, and returns its storage surface.
    fn format(&self, devpath: &Path, vol: &Volume) -> Result<Formatted>;
}

/// A Constructor is a function that creates a Format.
pub type Constructor = fn(&DriverConfig, DeviceMode) -> Result<Box<dyn Format>>;

/// An explicit registry of format backends.
pub struct Registry {
    backends: HashMap<&'static str, Constructor>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            backends: HashMap::new(),
        }
    }

    /// Returns a registry populated with the built-in backends.
    pub fn builtin() -> Registry {
        let mut r = Registry::new();
        r.register("ltfs", ltfs::new);
        r.register("fsdir", fsdir::new);
        r
    }

    pub fn register(&mut self, name: &'static str, ctor: Constructor) {
        if self.backends.insert(name, ctor).is_some() {
            panic!("format backend {name} registered twice");
        }
    }

    pub fn create(&self, cfg: &DriverConfig, mode: DeviceMode) -> Result<Box<dyn Format>> {
        const OP: &str = "format.create";

        match self.backends.get(cfg.driver.as_str()) {
            Some(ctor) => ctor(cfg, mode),
            None => Err(Error::new(Kind::Invalid)
                .op(OP)
                .with(format!("unknown format backend type: {}", cfg.driver))),
        }
    }
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::builtin()
    }
}
