//! The tape store facade: one inventory, one changer, a storage format
//! and a set of drives, serving the storage surface.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{Error, Kind, Result};
use crate::format;
use crate::storage::{File, FileInfo, OpenFlags, Storage};
use crate::store::tape::changer::{self, Changer};
use crate::store::tape::drive::Drive;
use crate::store::tape::inv::{self, Inventory};
use crate::store::tape::{Config, DeviceMode, Volume};
use crate::store::{Management, RunOptions, Store};
use crate::PathName;

pub struct Tape {
    name: String,

    inv: Arc<dyn Inventory>,
    #[allow(dead_code)]
    chgr: Arc<dyn Changer>,
    drives: BTreeMap<String, Drive>,
}

/// Creates a new tape store service.
pub fn new(name: &str, cfg: &Config, opts: &RunOptions) -> Result<Arc<dyn Store>> {
    let op = format!("store/tape.new[{name}]");

    // inventory
    let invdb = inv::Registry::builtin().create(
        &cfg.inventory.driver,
        &inv::Options {
            options: cfg.inventory.options.clone(),
            cleaning_prefix: cfg.cleaning_prefix.clone(),
        },
    )?;
    let invdb: Arc<dyn Inventory> = Arc::from(invdb);

    if opts.reset_db {
        debug!("{op}: resetting inventory database");
        invdb.reset()?;
    }

    // changer
    let chgr_cfg = cfg.changers.get("primary").ok_or_else(|| {
        Error::new(Kind::Invalid)
            .op(op.clone())
            .with("no primary changer configured")
    })?;

    let mut chgr_opts = changer::Options {
        options: chgr_cfg.options.clone(),
        cleaning_prefix: cfg.cleaning_prefix.clone(),
        seed_volumes: Vec::new(),
    };

    if opts.device_mode == DeviceMode::Emulated {
        // an emulated library starts out holding what the inventory
        // last knew about
        chgr_opts.seed_volumes = invdb.volumes()?;
    }

    let chgr = changer::Registry::builtin().create(&chgr_cfg.driver, &chgr_opts)?;
    let chgr: Arc<dyn Changer> = Arc::from(chgr);

    if opts.audit {
        debug!("{op}: auditing inventory");
        invdb.audit(chgr.as_ref())?;
    }

    // storage format
    let fmt_cfg = cfg.format_config().ok_or_else(|| {
        Error::new(Kind::Invalid)
            .op(op.clone())
            .with("no storage format configured")
    })?;
    let fmtr = format::Registry::builtin().create(fmt_cfg, opts.device_mode)?;

    // drives; startup runs in parallel and every drive must come up
    let mut drives = BTreeMap::new();
    for (drv_name, drv_cfg) in &cfg.drives.write {
        drives.insert(
            drv_name.clone(),
            Drive::new(drv_name, drv_cfg, opts.device_mode)?,
        );
    }

    let results: Vec<(String, Result<()>)> = std::thread::scope(|s| {
        let handles: Vec<_> = drives
            .iter_mut()
            .map(|(drv_name, drv)| {
                let invdb = Arc::clone(&invdb);
                let chgr = Arc::clone(&chgr);
                let fmtr = &fmtr;
                let drv_name = drv_name.clone();

                s.spawn(move || {
                    let res = drv.start(invdb.as_ref(), chgr.as_ref(), fmtr.as_ref());
                    (drv_name, res)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("drive startup thread panicked"))
            .collect()
    });

    for (drv_name, res) in results {
        res.map_err(|e| Error::new(Kind::Other).op(format!("{op}: drive {drv_name}")).with(e))?;
    }

    debug!("{op}: drives ready");

    Ok(Arc::new(Tape {
        name: name.to_string(),
        inv: invdb,
        chgr,
        drives,
    }))
}

impl Tape {
    /// The drive serving writes: the first available write-class drive.
    fn write_drive(&self) -> Result<&Drive> {
        self.drives
            .values()
            .find(|d| d.storage().is_some())
            .ok_or_else(|| {
                Error::new(Kind::Transient)
                    .op("store/tape.write_drive")
                    .with("no write drive available")
            })
    }

    fn drive_storage(&self) -> Result<&Arc<dyn Storage>> {
        Ok(self.write_drive()?.storage().expect("drive is serving"))
    }

    /// Records the path to volume binding for a newly created file.
    fn index(&self, name: &PathName, drv: &Drive) {
        let serial = match drv.serial() {
            Some(serial) => serial,
            None => return,
        };

        match self.inv.create(name, serial) {
            Ok(()) => {}
            // re-pushing an existing path keeps its original binding
            Err(e) if e.is(Kind::Exist) => {}
            Err(e) => debug!("store/tape.index: {name}: {e}"),
        }
    }
}

impl Storage for Tape {
    fn open_file(&self, name: &PathName, flags: OpenFlags) -> Result<Box<dyn File>> {
        let drv = self.write_drive()?;
        let f = drv.storage().expect("drive is serving").open_file(name, flags)?;

        if flags.create {
            self.index(name, drv);
        }

        Ok(f)
    }

    fn stat(&self, name: &PathName) -> Result<FileInfo> {
        self.drive_storage()?.stat(name)
    }

    fn mkdir(&self, name: &PathName) -> Result<()> {
        self.drive_storage()?.mkdir(name)
    }

    fn mkdir_all(&self, name: &PathName) -> Result<()> {
        self.drive_storage()?.mkdir_all(name)
    }
}

impl Store for Tape {
    fn name(&self) -> &str {
        &self.name
    }

    fn management(&self) -> Option<Arc<dyn Management>> {
        Some(Arc::new(InvManagement(Arc::clone(&self.inv))))
    }

    fn stop(&self) {
        for (name, drv) in &self.drives {
            if let Err(e) = drv.stop() {
                debug!("store/tape.stop: drive {name}: {e}");
            }
        }
    }
}

struct InvManagement(Arc<dyn Inventory>);

impl Management for InvManagement {
    fn volumes(&self) -> Result<Vec<Volume>> {
        self.0.volumes()
    }
}
