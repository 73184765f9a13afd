//! The per-drive lifecycle: bring a configured drive to a serving state,
//! then act as the drive's data plane.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{Error, Result};
use crate::format::{Format, Mount};
use crate::storage::Storage;
use crate::store::tape::changer::Changer;
use crate::store::tape::inv::Inventory;
use crate::store::tape::{DeviceMode, DriveConfig, Location, Serial, VolumeCategory};

/// A tape drive.
pub struct Drive {
    name: String,
    devpath: PathBuf,
    loc: Location,

    serial: Option<Serial>,
    storage: Option<Arc<dyn Storage>>,
    mount: Option<Box<dyn Mount>>,
}

impl Drive {
    /// Creates a new drive from its configuration. Emulated device paths
    /// are created on demand.
    pub fn new(name: &str, cfg: &DriveConfig, mode: DeviceMode) -> Result<Drive> {
        let op = format!("drive.new[{} (slot {}) ({})]", name, cfg.slot, cfg.path.display());

        if mode == DeviceMode::Emulated {
            fs::create_dir_all(&cfg.path).map_err(|e| Error::from(e).op(op.clone()))?;
        }

        debug!("{op}: created");

        Ok(Drive {
            name: name.to_string(),
            devpath: cfg.path.clone(),
            loc: Location::transfer(cfg.slot),
            serial: None,
            storage: None,
            mount: None,
        })
    }

    /// Starts the drive: ensure a volume is loaded, format it if it is
    /// freshly allocated, mount it, and expose its storage.
    pub fn start(
        &mut self,
        inv: &dyn Inventory,
        chgr: &dyn Changer,
        fmtr: &dyn Format,
    ) -> Result<()> {
        let op = format!(
            "drive.start[{} (slot {}) ({})]",
            self.name,
            self.loc.addr,
            self.devpath.display()
        );

        let serial = match inv.loaded(self.loc)? {
            Some(serial) => serial,
            None => {
                debug!("{op}: drive is empty, allocating");

                let serial = inv.alloc()?;

                debug!("{op}: loading {serial} into {}", self.loc);
                inv.load(&serial, self.loc, chgr)?;

                serial
            }
        };

        let vol = inv.info(&serial)?;

        let out = fmtr.format(&self.devpath, &vol)?;

        if out.formatted {
            let mut vol = vol;
            vol.category = VolumeCategory::Filling;
            inv.update(&vol)?;
        }

        if let Some(mount) = &out.mount {
            mount.mount()?;
        }

        debug!("{op}: serving {serial}");

        self.serial = Some(serial);
        self.storage = Some(out.storage);
        self.mount = out.mount;

        Ok(())
    }

    /// Unmounts the drive's filesystem, if it has one.
    pub fn stop(&self) -> Result<()> {
        if let Some(mount) = &self.mount {
            mount.unmount()?;
        }

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> Location {
        self.loc
    }

    /// The serial of the loaded volume, once the drive is serving.
    pub fn serial(&self) -> Option<&Serial> {
        self.serial.as_ref()
    }

    /// The drive's storage surface, once the drive is serving.
    pub fn storage(&self) -> Option<&Arc<dyn Storage>> {
        self.storage.as_ref()
    }
}
