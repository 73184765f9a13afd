//! A SQLite backed inventory.
//!
//! The schema keeps one row per volume. Location and home are `(addr,
//! category)` column pairs under composite UNIQUE constraints, so a
//! physical cell can hold at most one cartridge and no two volumes can
//! claim the same home. The category column stores the numeric
//! discriminant, whose order puts `filling` before `scratch`; the plain
//! `ORDER BY category` in `alloc` is the allocation preference.
//!
//! A single connection behind a mutex serializes row access; the mutex
//! stands in for `SELECT ... FOR UPDATE` and is never held across a
//! changer operation.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::debug;

use crate::bitmask;
use crate::config::opt_str;
use crate::errors::{Error, Kind, Result};
use crate::store::tape::changer::Changer;
use crate::store::tape::inv::{Inventory, Options};
use crate::store::tape::{
    Location, Serial, SlotCategory, Volume, VolumeCategory, SLOT_CATEGORIES, STATUS_MOUNTED,
    STATUS_TRANSFERRING,
};
use crate::PathName;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS volumes (
    serial    TEXT PRIMARY KEY,

    -- current location; NULL while the volume is in the changer arm
    loc_addr  INTEGER,
    loc_cat   TEXT,

    -- home location to return to after unload
    home_addr INTEGER,
    home_cat  TEXT,

    category  INTEGER NOT NULL DEFAULT 4,
    flags     INTEGER NOT NULL DEFAULT 0,

    -- only one volume can occupy a cell
    UNIQUE (loc_addr, loc_cat),
    UNIQUE (home_addr, home_cat)
);

CREATE TABLE IF NOT EXISTS tree (
    path   TEXT PRIMARY KEY,
    serial TEXT NOT NULL,

    FOREIGN KEY (serial) REFERENCES volumes (serial)
);
";

const VOLUME_COLUMNS: &str = "serial, loc_addr, loc_cat, home_addr, home_cat, category, flags";

pub struct Sqlite {
    conn: Mutex<Connection>,
    cleaning_prefix: String,
}

/// Returns a new SQLite backed inventory. Requires the `path` option
/// naming the database file.
pub fn new(opts: &Options) -> Result<Box<dyn Inventory>> {
    const OP: &str = "inv/sqlite.new";

    let path = opt_str(&opts.options, "path").map_err(|e| e.op(OP))?;

    let conn = Connection::open(&path).map_err(|e| Error::from(e).op(OP))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|e| Error::from(e).op(OP))?;
    conn.execute_batch(SCHEMA)
        .map_err(|e| Error::from(e).op(OP))?;

    Ok(Box::new(Sqlite {
        conn: Mutex::new(conn),
        cleaning_prefix: opts.cleaning_prefix.clone(),
    }))
}

fn location_params(loc: Option<Location>) -> (Option<i64>, Option<String>) {
    match loc {
        Some(loc) => (Some(loc.addr), Some(loc.category.to_string())),
        None => (None, None),
    }
}

fn location_from(addr: Option<i64>, cat: Option<String>) -> Option<Location> {
    match (addr, cat) {
        (Some(addr), Some(cat)) => Some(Location::new(
            addr,
            SlotCategory::parse(&cat).unwrap_or(SlotCategory::Unknown),
        )),
        _ => None,
    }
}

fn row_to_volume(row: &rusqlite::Row<'_>) -> rusqlite::Result<Volume> {
    Ok(Volume {
        serial: Serial(row.get(0)?),
        location: location_from(row.get(1)?, row.get(2)?),
        home: location_from(row.get(3)?, row.get(4)?),
        category: VolumeCategory::from_i64(row.get(5)?),
        flags: row.get::<_, i64>(6)? as u32,
    })
}

fn get_volume(tx: &Transaction<'_>, serial: &Serial) -> Result<Volume> {
    tx.query_row(
        &format!("SELECT {VOLUME_COLUMNS} FROM volumes WHERE serial = ?1"),
        params![serial.as_str()],
        row_to_volume,
    )
    .map_err(Error::from)
}

impl Sqlite {
    fn write_volume(&self, vol: &Volume) -> Result<()> {
        let (loc_addr, loc_cat) = location_params(vol.location);
        let (home_addr, home_cat) = location_params(vol.home);

        let conn = self.conn.lock();
        conn.execute(
            "UPDATE volumes
             SET loc_addr = ?1, loc_cat = ?2, home_addr = ?3, home_cat = ?4,
                 category = ?5, flags = ?6
             WHERE serial = ?7",
            params![
                loc_addr,
                loc_cat,
                home_addr,
                home_cat,
                vol.category.as_i64(),
                vol.flags as i64,
                vol.serial.as_str()
            ],
        )?;

        Ok(())
    }
}

impl Inventory for Sqlite {
    fn volumes(&self) -> Result<Vec<Volume>> {
        let conn = self.conn.lock();

        let mut stmt =
            conn.prepare(&format!("SELECT {VOLUME_COLUMNS} FROM volumes ORDER BY serial"))?;
        let rows = stmt.query_map([], row_to_volume)?;

        let mut vols = Vec::new();
        for row in rows {
            vols.push(row?);
        }

        Ok(vols)
    }

    fn audit(&self, chgr: &dyn Changer) -> Result<()> {
        const OP: &str = "inv/sqlite.audit";

        // The status scan can take seconds; take it before the lock.
        let slots = chgr.status().map_err(|e| Error::new(Kind::Other).op(OP).with(e))?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let mut observed: Vec<String> = Vec::new();

        for cat in SLOT_CATEGORIES {
            let mut flags: u32 = 0;
            if cat == SlotCategory::Transfer {
                bitmask::set(&mut flags, STATUS_MOUNTED);
            }

            for slot in slots.get(&cat).map(Vec::as_slice).unwrap_or(&[]) {
                let vol = match &slot.volume {
                    Some(vol) => vol,
                    None => continue,
                };

                let category = if vol.serial.as_str().starts_with(&self.cleaning_prefix) {
                    VolumeCategory::Cleaning
                } else {
                    VolumeCategory::Scratch
                };

                tx.execute(
                    "INSERT INTO volumes (serial, loc_addr, loc_cat, category, flags)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (serial) DO UPDATE SET
                         loc_addr = excluded.loc_addr,
                         loc_cat = excluded.loc_cat,
                         flags = excluded.flags",
                    params![
                        vol.serial.as_str(),
                        slot.location.addr,
                        slot.location.category.to_string(),
                        category.as_i64(),
                        flags as i64
                    ],
                )?;

                observed.push(vol.serial.as_str().to_string());
            }
        }

        // Volumes committed as in-flight that the census did not find
        // have left the library; mark them missing.
        let stragglers: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT serial FROM volumes
                 WHERE loc_addr IS NULL AND (flags & ?1) != 0",
            )?;
            let rows = stmt.query_map(params![STATUS_TRANSFERRING as i64], |row| row.get(0))?;

            let mut serials = Vec::new();
            for row in rows {
                let serial: String = row?;
                if !observed.contains(&serial) {
                    serials.push(serial);
                }
            }
            serials
        };

        for serial in &stragglers {
            debug!("{OP}: {serial} not found by census; marking missing");
            tx.execute(
                "UPDATE volumes SET category = ?1, flags = flags & ~?2 WHERE serial = ?3",
                params![
                    VolumeCategory::Missing.as_i64(),
                    STATUS_TRANSFERRING as i64,
                    serial
                ],
            )?;
        }

        tx.commit()?;

        Ok(())
    }

    fn alloc(&self) -> Result<Serial> {
        const OP: &str = "inv/sqlite.alloc";

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let (serial, category): (String, i64) = tx
            .query_row(
                "SELECT serial, category FROM volumes
                 WHERE category IN (?1, ?2) AND loc_cat = 'storage'
                 ORDER BY category, serial
                 LIMIT 1",
                params![
                    VolumeCategory::Filling.as_i64(),
                    VolumeCategory::Scratch.as_i64()
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| Error::from(e).op(OP))?;

        if VolumeCategory::from_i64(category) != VolumeCategory::Filling {
            tx.execute(
                "UPDATE volumes SET category = ?1 WHERE serial = ?2",
                params![VolumeCategory::Allocating.as_i64(), serial],
            )?;
        }

        tx.commit()?;

        debug!("{OP}: allocated {serial}");

        Ok(Serial(serial))
    }

    fn loaded(&self, loc: Location) -> Result<Option<Serial>> {
        let conn = self.conn.lock();

        let serial: Option<String> = conn
            .query_row(
                "SELECT serial FROM volumes WHERE loc_addr = ?1 AND loc_cat = ?2",
                params![loc.addr, loc.category.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(serial.map(Serial))
    }

    fn info(&self, serial: &Serial) -> Result<Volume> {
        const OP: &str = "inv/sqlite.info";

        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {VOLUME_COLUMNS} FROM volumes WHERE serial = ?1"),
            params![serial.as_str()],
            row_to_volume,
        )
        .map_err(|e| Error::from(e).op(OP))
    }

    fn update(&self, vol: &Volume) -> Result<()> {
        self.write_volume(vol)
    }

    fn load(&self, serial: &Serial, dst: Location, chgr: &dyn Changer) -> Result<()> {
        const OP: &str = "inv/sqlite.load";

        // mark: commit the intent, then release the lock so the
        // multi-second robotic move holds no database transaction
        let (src, mut flags, category) = {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;

            let vol = get_volume(&tx, serial).map_err(|e| e.op(OP))?;

            let src = match vol.location {
                Some(loc)
                    if loc.category == SlotCategory::Storage
                        || loc.category == SlotCategory::ImportExport =>
                {
                    loc
                }
                _ => {
                    return Err(Error::new(Kind::Invalid)
                        .op(OP)
                        .with("invalid source slot for load operation"))
                }
            };

            if dst.category != SlotCategory::Transfer {
                return Err(Error::new(Kind::Invalid)
                    .op(OP)
                    .with("invalid destination slot for load operation"));
            }

            let mut flags = vol.flags;
            bitmask::set(&mut flags, STATUS_TRANSFERRING);
            bitmask::set(&mut flags, STATUS_MOUNTED);

            tx.execute(
                "UPDATE volumes
                 SET loc_addr = NULL, loc_cat = NULL,
                     home_addr = ?1, home_cat = ?2, flags = ?3
                 WHERE serial = ?4",
                params![
                    src.addr,
                    src.category.to_string(),
                    flags as i64,
                    serial.as_str()
                ],
            )?;
            tx.commit()?;

            (src, flags, vol.category)
        };

        debug!("{OP}: loading {serial} from {src} to {dst}");

        // act
        chgr.load(src, dst)?;

        // reconcile
        bitmask::clear(&mut flags, STATUS_TRANSFERRING);

        let category = if category == VolumeCategory::Allocating {
            VolumeCategory::Allocated
        } else {
            category
        };

        let conn = self.conn.lock();
        conn.execute(
            "UPDATE volumes
             SET loc_addr = ?1, loc_cat = ?2, category = ?3, flags = ?4
             WHERE serial = ?5",
            params![
                dst.addr,
                dst.category.to_string(),
                category.as_i64(),
                flags as i64,
                serial.as_str()
            ],
        )?;

        Ok(())
    }

    fn unload(&self, serial: &Serial, dst: Location, chgr: &dyn Changer) -> Result<()> {
        const OP: &str = "inv/sqlite.unload";

        let (src, dst, mut flags) = {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;

            let vol = get_volume(&tx, serial).map_err(|e| e.op(OP))?;

            // an address of zero means the home slot
            let dst = if dst.addr == 0 {
                match vol.home {
                    Some(home) => home,
                    None => {
                        return Err(Error::new(Kind::Invalid)
                            .op(OP)
                            .with("volume has no home slot"))
                    }
                }
            } else {
                dst
            };

            let src = match vol.location {
                Some(loc) if loc.category == SlotCategory::Transfer => loc,
                _ => {
                    return Err(Error::new(Kind::Invalid)
                        .op(OP)
                        .with("invalid source slot for unload operation"))
                }
            };

            if dst.category != SlotCategory::Storage && dst.category != SlotCategory::ImportExport
            {
                return Err(Error::new(Kind::Invalid)
                    .op(OP)
                    .with("invalid destination slot for unload operation"));
            }

            let mut flags = vol.flags;
            bitmask::clear(&mut flags, STATUS_MOUNTED);
            bitmask::set(&mut flags, STATUS_TRANSFERRING);

            tx.execute(
                "UPDATE volumes
                 SET loc_addr = NULL, loc_cat = NULL, flags = ?1
                 WHERE serial = ?2",
                params![flags as i64, serial.as_str()],
            )?;
            tx.commit()?;

            (src, dst, flags)
        };

        debug!("{OP}: unloading {serial} from {src} to {dst}");

        chgr.unload(src, dst)?;

        bitmask::clear(&mut flags, STATUS_TRANSFERRING);

        let conn = self.conn.lock();
        conn.execute(
            "UPDATE volumes
             SET loc_addr = ?1, loc_cat = ?2,
                 home_addr = NULL, home_cat = NULL, flags = ?3
             WHERE serial = ?4",
            params![
                dst.addr,
                dst.category.to_string(),
                flags as i64,
                serial.as_str()
            ],
        )?;

        Ok(())
    }

    fn transfer(&self, serial: &Serial, dst: Location, chgr: &dyn Changer) -> Result<()> {
        const OP: &str = "inv/sqlite.transfer";

        let (src, mut flags) = {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;

            let vol = get_volume(&tx, serial).map_err(|e| e.op(OP))?;

            let src = match vol.location {
                Some(loc)
                    if loc.category == SlotCategory::Storage
                        || loc.category == SlotCategory::ImportExport =>
                {
                    loc
                }
                _ => {
                    return Err(Error::new(Kind::Invalid)
                        .op(OP)
                        .with("invalid source slot for transfer operation"))
                }
            };

            if dst.category != SlotCategory::Storage && dst.category != SlotCategory::ImportExport
            {
                return Err(Error::new(Kind::Invalid)
                    .op(OP)
                    .with("invalid destination slot for transfer operation"));
            }

            let mut flags = vol.flags;
            bitmask::set(&mut flags, STATUS_TRANSFERRING);

            tx.execute(
                "UPDATE volumes
                 SET loc_addr = NULL, loc_cat = NULL, flags = ?1
                 WHERE serial = ?2",
                params![flags as i64, serial.as_str()],
            )?;
            tx.commit()?;

            (src, flags)
        };

        debug!("{OP}: transferring {serial} from {src} to {dst}");

        chgr.transfer(src, dst)?;

        bitmask::clear(&mut flags, STATUS_TRANSFERRING);

        let conn = self.conn.lock();
        conn.execute(
            "UPDATE volumes
             SET loc_addr = ?1, loc_cat = ?2, flags = ?3
             WHERE serial = ?4",
            params![
                dst.addr,
                dst.category.to_string(),
                flags as i64,
                serial.as_str()
            ],
        )?;

        Ok(())
    }

    fn lookup(&self, path: &PathName) -> Result<Volume> {
        const OP: &str = "inv/sqlite.lookup";

        let conn = self.conn.lock();
        conn.query_row(
            "SELECT v.serial, v.loc_addr, v.loc_cat, v.home_addr, v.home_cat,
                    v.category, v.flags
             FROM tree t
             JOIN volumes v ON v.serial = t.serial
             WHERE t.path = ?1",
            params![path],
            row_to_volume,
        )
        .map_err(|e| Error::from(e).op(OP).path(path.clone()))
    }

    fn create(&self, path: &PathName, serial: &Serial) -> Result<()> {
        const OP: &str = "inv/sqlite.create";

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tree (path, serial) VALUES (?1, ?2)",
            params![path, serial.as_str()],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(f, _)
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::new(Kind::Exist).op(OP).path(path.clone())
            }
            other => Error::from(other).op(OP),
        })?;

        Ok(())
    }

    fn reset(&self) -> Result<()> {
        const OP: &str = "inv/sqlite.reset";

        debug!("{OP}: dropping all inventory state");

        let conn = self.conn.lock();
        conn.execute_batch(
            "DROP TABLE IF EXISTS tree;
             DROP TABLE IF EXISTS volumes;",
        )?;
        conn.execute_batch(SCHEMA)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tape::changer::{self, Changer};

    fn emulated(transfer: i64, storage: i64, ix: i64, volumes: i64) -> Box<dyn Changer> {
        let mut options = std::collections::HashMap::new();
        options.insert("transfer".to_string(), serde_yaml::Value::from(transfer));
        options.insert("storage".to_string(), serde_yaml::Value::from(storage));
        options.insert("ix".to_string(), serde_yaml::Value::from(ix));
        options.insert("volumes".to_string(), serde_yaml::Value::from(volumes));

        changer::emulated::new(&changer::Options {
            options,
            cleaning_prefix: "CLN".to_string(),
            seed_volumes: Vec::new(),
        })
        .unwrap()
    }

    fn inventory(dir: &std::path::Path) -> Box<dyn Inventory> {
        let mut options = std::collections::HashMap::new();
        options.insert(
            "path".to_string(),
            serde_yaml::Value::from(dir.join("inv.db").to_string_lossy().into_owned()),
        );

        new(&Options {
            options,
            cleaning_prefix: "CLN".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn audit_discovers_volumes() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(dir.path());
        let chgr = emulated(4, 32, 4, 16);

        inv.audit(chgr.as_ref()).unwrap();

        let vols = inv.volumes().unwrap();
        assert_eq!(vols.len(), 17);

        assert_eq!(vols[0].serial.as_str(), "A00000L7");
        assert_eq!(vols[0].category, VolumeCategory::Scratch);
        assert_eq!(vols[0].location, Some(Location::storage(1)));

        let cln = vols.iter().find(|v| v.serial.as_str() == "CLN000L1").unwrap();
        assert_eq!(cln.category, VolumeCategory::Cleaning);
    }

    #[test]
    fn audit_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(dir.path());
        let chgr = emulated(2, 8, 0, 4);

        inv.audit(chgr.as_ref()).unwrap();
        let first = inv.volumes().unwrap();

        inv.audit(chgr.as_ref()).unwrap();
        let second = inv.volumes().unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn audit_preserves_specific_category() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(dir.path());
        let chgr = emulated(2, 8, 0, 4);

        inv.audit(chgr.as_ref()).unwrap();

        let mut vol = inv.info(&Serial::from("A00000L7")).unwrap();
        vol.category = VolumeCategory::Full;
        inv.update(&vol).unwrap();

        inv.audit(chgr.as_ref()).unwrap();

        let vol = inv.info(&Serial::from("A00000L7")).unwrap();
        assert_eq!(vol.category, VolumeCategory::Full);
    }

    #[test]
    fn alloc_prefers_filling() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(dir.path());
        let chgr = emulated(2, 8, 0, 4);

        inv.audit(chgr.as_ref()).unwrap();

        // A00002L7 is filling; allocation must prefer it over the
        // lexically earlier scratch volumes.
        let mut vol = inv.info(&Serial::from("A00002L7")).unwrap();
        vol.category = VolumeCategory::Filling;
        inv.update(&vol).unwrap();

        let serial = inv.alloc().unwrap();
        assert_eq!(serial.as_str(), "A00002L7");

        // a filling volume stays filling
        let vol = inv.info(&serial).unwrap();
        assert_eq!(vol.category, VolumeCategory::Filling);
    }

    #[test]
    fn alloc_promotes_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(dir.path());
        let chgr = emulated(2, 8, 0, 4);

        inv.audit(chgr.as_ref()).unwrap();

        let serial = inv.alloc().unwrap();
        assert_eq!(serial.as_str(), "A00000L7");

        let vol = inv.info(&serial).unwrap();
        assert_eq!(vol.category, VolumeCategory::Allocating);

        // the next allocation must pick a different volume
        let next = inv.alloc().unwrap();
        assert_eq!(next.as_str(), "A00001L7");
    }

    #[test]
    fn alloc_without_candidates_fails() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(dir.path());
        let chgr = emulated(2, 8, 0, 0);

        inv.audit(chgr.as_ref()).unwrap();

        // only the cleaning cartridge exists
        let err = inv.alloc().unwrap_err();
        assert!(err.is(Kind::NotExist));
    }

    #[test]
    fn load_then_unload_returns_home() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(dir.path());
        let chgr = emulated(4, 8, 0, 4);

        inv.audit(chgr.as_ref()).unwrap();

        let serial = Serial::from("A00000L7");
        let dst = Location::transfer(2);

        inv.load(&serial, dst, chgr.as_ref()).unwrap();

        let vol = inv.info(&serial).unwrap();
        assert_eq!(vol.location, Some(dst));
        assert_eq!(vol.home, Some(Location::storage(1)));
        assert!(bitmask::is_set(vol.flags, STATUS_MOUNTED));
        assert!(!bitmask::is_set(vol.flags, STATUS_TRANSFERRING));

        // address zero returns the volume to its home slot
        inv.unload(&serial, Location::new(0, SlotCategory::Storage), chgr.as_ref())
            .unwrap();

        let vol = inv.info(&serial).unwrap();
        assert_eq!(vol.location, Some(Location::storage(1)));
        assert_eq!(vol.home, None);
        assert!(!bitmask::is_set(vol.flags, STATUS_MOUNTED));
        assert!(!bitmask::is_set(vol.flags, STATUS_TRANSFERRING));
    }

    #[test]
    fn load_promotes_allocating_volume() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(dir.path());
        let chgr = emulated(2, 8, 0, 4);

        inv.audit(chgr.as_ref()).unwrap();

        let serial = inv.alloc().unwrap();
        inv.load(&serial, Location::transfer(0), chgr.as_ref()).unwrap();

        let vol = inv.info(&serial).unwrap();
        assert_eq!(vol.category, VolumeCategory::Allocated);
    }

    #[test]
    fn load_rejects_bad_slots() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(dir.path());
        let chgr = emulated(2, 8, 0, 4);

        inv.audit(chgr.as_ref()).unwrap();

        let serial = Serial::from("A00000L7");

        // destination must be a transfer slot
        let err = inv
            .load(&serial, Location::storage(5), chgr.as_ref())
            .unwrap_err();
        assert!(err.is(Kind::Invalid));

        // a loaded volume cannot be loaded again
        inv.load(&serial, Location::transfer(0), chgr.as_ref()).unwrap();
        let err = inv
            .load(&serial, Location::transfer(1), chgr.as_ref())
            .unwrap_err();
        assert!(err.is(Kind::Invalid));
    }

    #[test]
    fn transfer_moves_between_shelves() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(dir.path());
        let chgr = emulated(2, 8, 2, 4);

        inv.audit(chgr.as_ref()).unwrap();

        let serial = Serial::from("A00003L7");
        let dst = Location::new(9, SlotCategory::ImportExport);

        inv.transfer(&serial, dst, chgr.as_ref()).unwrap();

        let vol = inv.info(&serial).unwrap();
        assert_eq!(vol.location, Some(dst));
        assert!(!bitmask::is_set(vol.flags, STATUS_TRANSFERRING));
    }

    #[test]
    fn audit_reconciles_interrupted_load() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(dir.path());
        let chgr = emulated(4, 32, 4, 16);

        inv.audit(chgr.as_ref()).unwrap();

        // simulate a crash mid-move: location lost, transferring set
        let mut vol = inv.info(&Serial::from("A00001L7")).unwrap();
        vol.location = None;
        bitmask::set(&mut vol.flags, STATUS_TRANSFERRING);
        inv.update(&vol).unwrap();

        // the cartridge is still physically in its slot; audit restores it
        inv.audit(chgr.as_ref()).unwrap();

        let vol = inv.info(&Serial::from("A00001L7")).unwrap();
        assert_eq!(vol.location, Some(Location::storage(2)));
        assert!(!bitmask::is_set(vol.flags, STATUS_TRANSFERRING));
    }

    #[test]
    fn audit_marks_vanished_volume_missing() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(dir.path());
        let chgr = emulated(2, 8, 0, 4);

        inv.audit(chgr.as_ref()).unwrap();

        let mut vol = inv.info(&Serial::from("A00000L7")).unwrap();
        vol.location = None;
        bitmask::set(&mut vol.flags, STATUS_TRANSFERRING);
        inv.update(&vol).unwrap();

        // audit against a library where the cartridge is gone entirely
        let bare = emulated(2, 8, 0, 0);
        inv.audit(bare.as_ref()).unwrap();

        let vol = inv.info(&Serial::from("A00000L7")).unwrap();
        assert_eq!(vol.category, VolumeCategory::Missing);
        assert!(!bitmask::is_set(vol.flags, STATUS_TRANSFERRING));
    }

    #[test]
    fn create_and_lookup_paths() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(dir.path());
        let chgr = emulated(2, 8, 0, 4);

        inv.audit(chgr.as_ref()).unwrap();

        let path = "data/foo".to_string();
        inv.create(&path, &Serial::from("A00000L7")).unwrap();

        let vol = inv.lookup(&path).unwrap();
        assert_eq!(vol.serial.as_str(), "A00000L7");

        // one-to-one per path
        let err = inv.create(&path, &Serial::from("A00001L7")).unwrap_err();
        assert!(err.is(Kind::Exist));

        let err = inv.lookup(&"data/missing".to_string()).unwrap_err();
        assert!(err.is(Kind::NotExist));
    }

    #[test]
    fn reset_destroys_state() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(dir.path());
        let chgr = emulated(2, 8, 0, 4);

        inv.audit(chgr.as_ref()).unwrap();
        assert!(!inv.volumes().unwrap().is_empty());

        inv.reset().unwrap();
        assert!(inv.volumes().unwrap().is_empty());
    }
}
