//! The inventory: the single source of truth for volume state.
//!
//! All mutations that move volumes or change category are transactional.
//! Physical moves follow a two-phase protocol: the intent is committed
//! (mark), the robot acts with no database lock held, and the outcome is
//! committed (reconcile). The committed `transferring` flag plus a NULL
//! location is the durable witness of an in-progress move; `audit`
//! resolves it against ground truth after a crash.

pub mod sqlite;

use std::collections::HashMap;

use crate::errors::{Error, Kind, Result};
use crate::store::tape::changer::Changer;
use crate::store::tape::{Location, Serial, Volume};
use crate::PathName;

/// An Inventory tracks volumes in a tape store. Implementations MUST be
/// safe for concurrent use.
pub trait Inventory: Send + Sync {
    /// Moves a volume from a storage or import/export slot into the
    /// transfer slot `dst`.
    fn load(&self, serial: &Serial, dst: Location, chgr: &dyn Changer) -> Result<()>;

    /// Moves a volume out of a drive. A destination address of zero
    /// returns the volume to its home slot.
    fn unload(&self, serial: &Serial, dst: Location, chgr: &dyn Changer) -> Result<()>;

    /// Moves a volume between storage and import/export slots.
    fn transfer(&self, serial: &Serial, dst: Location, chgr: &dyn Changer) -> Result<()>;

    /// Reconciles the inventory against the physical state reported by
    /// the changer. Audit is the only operation that creates volume rows
    /// from physical discovery.
    fn audit(&self, chgr: &dyn Changer) -> Result<()>;

    /// Selects a volume to receive new data, preferring partially
    /// filled volumes over scratch ones.
    fn alloc(&self) -> Result<Serial>;

    /// Returns the serial of the volume occupying the given location,
    /// if any.
    fn loaded(&self, loc: Location) -> Result<Option<Serial>>;

    /// Returns all known volumes, ordered by serial.
    fn volumes(&self) -> Result<Vec<Volume>>;

    /// Updates volume information.
    fn update(&self, vol: &Volume) -> Result<()>;

    /// Retrieves info about a volume.
    fn info(&self, serial: &Serial) -> Result<Volume>;

    /// Destroys all inventory state.
    fn reset(&self) -> Result<()>;

    /// Looks up the volume that stores the given path.
    fn lookup(&self, path: &PathName) -> Result<Volume>;

    /// Binds a path to the volume with the given serial.
    fn create(&self, path: &PathName, serial: &Serial) -> Result<()>;
}

/// Options handed to an inventory constructor.
#[derive(Default)]
pub struct Options {
    /// Backend-specific options from the configuration file.
    pub options: HashMap<String, serde_yaml::Value>,

    /// Prefix that identifies cleaning cartridges.
    pub cleaning_prefix: String,
}

/// A Constructor is a function that creates an Inventory.
pub type Constructor = fn(&Options) -> Result<Box<dyn Inventory>>;

/// An explicit registry of inventory backends.
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
        r.register("sqlite", sqlite::new);
        r
    }

    pub fn register(&mut self, name: &'static str, ctor: Constructor) {
        if self.backends.insert(name, ctor).is_some() {
            panic!("inventory backend {name} registered twice");
        }
    }

    pub fn create(&self, name: &str, opts: &Options) -> Result<Box<dyn Inventory>> {
        const OP: &str = "inv.create";

        match self.backends.get(name) {
            Some(ctor) => ctor(opts),
            None => Err(Error::new(Kind::Invalid)
                .op(OP)
                .with(format!("unknown inventory backend type: {name}"))),
        }
    }
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::builtin()
    }
}
