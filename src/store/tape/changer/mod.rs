//! The media changer abstraction: serialized access to the robotic arm
//! that moves cartridges between slots.

pub mod emulated;
pub mod mtx;

use std::collections::HashMap;

use crate::errors::{Error, Kind, Result};
use crate::store::tape::{Location, SlotMap, Volume};

/// A media changer. Implementations MUST serialize physical commands;
/// concurrent calls may block on the changer's internal mutex.
pub trait Changer: Send + Sync {
    /// Returns the complete physical census of the library.
    fn status(&self) -> Result<SlotMap>;

    /// Loads a drive with the volume from a storage or import/export
    /// slot.
    fn load(&self, src: Location, dst: Location) -> Result<()>;

    /// Unloads a volume from a drive and returns it to a slot.
    fn unload(&self, src: Location, dst: Location) -> Result<()>;

    /// Moves a volume between storage and import/export slots.
    fn transfer(&self, src: Location, dst: Location) -> Result<()>;
}

/// Options handed to a changer constructor.
#[derive(Default)]
pub struct Options {
    /// Backend-specific options from the configuration file.
    pub options: HashMap<String, serde_yaml::Value>,

    /// Prefix that identifies cleaning cartridges.
    pub cleaning_prefix: String,

    /// Initial volume placement for emulated libraries.
    pub seed_volumes: Vec<Volume>,
}

/// A Constructor is a function that creates a Changer.
pub type Constructor = fn(&Options) -> Result<Box<dyn Changer>>;

/// An explicit registry of changer backends.
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
        r.register("mtx", mtx::new);
        r.register("emulated", emulated::new);
        r
    }

    pub fn register(&mut self, name: &'static str, ctor: Constructor) {
        if self.backends.insert(name, ctor).is_some() {
            panic!("changer backend {name} registered twice");
        }
    }

    pub fn create(&self, name: &str, opts: &Options) -> Result<Box<dyn Changer>> {
        const OP: &str = "changer.create";

        match self.backends.get(name) {
            Some(ctor) => ctor(opts),
            None => Err(Error::new(Kind::Invalid)
                .op(OP)
                .with(format!("unknown changer backend type: {name}"))),
        }
    }
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::builtin()
    }
}
