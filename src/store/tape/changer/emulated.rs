//! An emulated media changer backed by an in-memory slot map.
//!
//! This is how tests (and `-simulate` runs) drive full end-to-end flows
//! without a robot. Moves optionally sleep under the simulation switch
//! to emulate physical timing.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::opt_i64;
use crate::errors::{Error, Kind, Result};
use crate::sim;
use crate::store::tape::{
    Location, Serial, Slot, SlotCategory, SlotMap, Volume, VolumeCategory,
};
use crate::store::tape::changer::{Changer, Options};

const MOVE_NOISE: sim::Noise =
    sim::Noise::new(Duration::from_millis(1000), Duration::from_millis(100));
const TRANSFER_NOISE: sim::Noise =
    sim::Noise::new(Duration::from_millis(3000), Duration::from_millis(1000));

pub struct Emulated {
    slots: Mutex<SlotMap>,
}

/// Returns a new emulated changer. Requires the `transfer`, `storage`,
/// `ix` and `volumes` count options.
pub fn new(opts: &Options) -> Result<Box<dyn Changer>> {
    const OP: &str = "changer/emulated.new";

    let transfer = opt_i64(&opts.options, "transfer").map_err(|e| e.op(OP))?;
    let storage = opt_i64(&opts.options, "storage").map_err(|e| e.op(OP))?;
    let ix = opt_i64(&opts.options, "ix").map_err(|e| e.op(OP))?;
    let volumes = opt_i64(&opts.options, "volumes").map_err(|e| e.op(OP))?;

    if storage < 1 {
        return Err(Error::new(Kind::Invalid)
            .op(OP)
            .with("at least one storage slot is required"));
    }

    let mut slots = SlotMap::new();

    let drives: Vec<Slot> = (0..transfer)
        .map(|i| Slot::empty(Location::transfer(i)))
        .collect();
    slots.insert(SlotCategory::Transfer, drives);

    // Storage slots are numbered from 1; address 0 is an invalid slot.
    let mut shelf = vec![Slot::empty(Location::new(0, SlotCategory::Invalid))];
    for i in 0..storage {
        let mut slot = Slot::empty(Location::storage(i + 1));

        if opts.seed_volumes.is_empty() && i < volumes {
            slot.volume = Some(Volume {
                serial: Serial(format!("A{i:05}L7")),
                location: Some(slot.location),
                home: None,
                category: VolumeCategory::Unknown,
                flags: 0,
            });
        }

        shelf.push(slot);
    }

    // A cleaning cartridge lives in the last storage slot.
    let last = shelf.last_mut().expect("storage slots");
    last.volume = Some(Volume {
        serial: Serial::from("CLN000L1"),
        location: Some(last.location),
        home: None,
        category: VolumeCategory::Unknown,
        flags: 0,
    });

    slots.insert(SlotCategory::Storage, shelf);

    let mail: Vec<Slot> = (0..ix)
        .map(|i| Slot::empty(Location::new(storage + i + 1, SlotCategory::ImportExport)))
        .collect();
    slots.insert(SlotCategory::ImportExport, mail);

    let chgr = Emulated {
        slots: Mutex::new(slots),
    };

    // Place seed volumes at their recorded location; a volume caught
    // mid-move at crash time sits at its home slot.
    for vol in &opts.seed_volumes {
        let loc = match vol.location.or(vol.home) {
            Some(loc) => loc,
            None => continue,
        };

        let mut slots = chgr.slots.lock();
        if let Some(slot) = slot_mut(&mut slots, loc) {
            let mut v = vol.clone();
            v.location = Some(loc);
            slot.volume = Some(v);
        }
    }

    Ok(Box::new(chgr))
}

fn slot_mut(slots: &mut SlotMap, loc: Location) -> Option<&mut Slot> {
    slots
        .get_mut(&loc.category)?
        .iter_mut()
        .find(|s| s.location.addr == loc.addr)
}

impl Emulated {
    fn do_move(&self, op: &'static str, src: Location, dst: Location, noise: sim::Noise) -> Result<()> {
        let mut slots = self.slots.lock();

        debug!("{op}: moving from {src} to {dst}");

        let vol = match slot_mut(&mut slots, src) {
            Some(slot) => slot.volume.take(),
            None => {
                return Err(Error::new(Kind::Invalid)
                    .op(op)
                    .with(format!("no such source slot: {src}")))
            }
        };

        let mut vol = match vol {
            Some(vol) => vol,
            None => {
                return Err(Error::new(Kind::Invalid)
                    .op(op)
                    .with(format!("source slot {src} is empty")))
            }
        };

        sim::simulate(noise);

        vol.location = Some(dst);

        match slot_mut(&mut slots, dst) {
            Some(slot) if slot.volume.is_none() => {
                slot.volume = Some(vol);
                Ok(())
            }
            Some(_) => Err(Error::new(Kind::Invalid)
                .op(op)
                .with(format!("destination slot {dst} is occupied"))),
            None => Err(Error::new(Kind::Invalid)
                .op(op)
                .with(format!("no such destination slot: {dst}"))),
        }
    }
}

impl Changer for Emulated {
    fn status(&self) -> Result<SlotMap> {
        let slots = self.slots.lock();

        sim::simulate(MOVE_NOISE);

        Ok(slots.clone())
    }

    fn load(&self, src: Location, dst: Location) -> Result<()> {
        self.do_move("changer/emulated.load", src, dst, MOVE_NOISE)?;

        // Record where the cartridge came from.
        let mut slots = self.slots.lock();
        if let Some(slot) = slot_mut(&mut slots, dst) {
            if let Some(vol) = slot.volume.as_mut() {
                vol.home = Some(src);
            }
        }

        Ok(())
    }

    fn unload(&self, src: Location, dst: Location) -> Result<()> {
        self.do_move("changer/emulated.unload", src, dst, MOVE_NOISE)?;

        let mut slots = self.slots.lock();
        if let Some(slot) = slot_mut(&mut slots, dst) {
            if let Some(vol) = slot.volume.as_mut() {
                vol.home = None;
            }
        }

        Ok(())
    }

    fn transfer(&self, src: Location, dst: Location) -> Result<()> {
        self.do_move("changer/emulated.transfer", src, dst, TRANSFER_NOISE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(transfer: i64, storage: i64, ix: i64, volumes: i64) -> Options {
        let mut options = std::collections::HashMap::new();
        options.insert("transfer".to_string(), serde_yaml::Value::from(transfer));
        options.insert("storage".to_string(), serde_yaml::Value::from(storage));
        options.insert("ix".to_string(), serde_yaml::Value::from(ix));
        options.insert("volumes".to_string(), serde_yaml::Value::from(volumes));

        Options {
            options,
            cleaning_prefix: "CLN".to_string(),
            seed_volumes: Vec::new(),
        }
    }

    #[test]
    fn census_matches_counts() {
        let chgr = new(&options(4, 32, 4, 16)).unwrap();
        let slots = chgr.status().unwrap();

        assert_eq!(slots[&SlotCategory::Transfer].len(), 4);
        // 32 storage slots plus the invalid slot at address 0
        assert_eq!(slots[&SlotCategory::Storage].len(), 33);
        assert_eq!(slots[&SlotCategory::ImportExport].len(), 4);

        let occupied: Vec<_> = slots[&SlotCategory::Storage]
            .iter()
            .filter_map(|s| s.volume.as_ref())
            .collect();
        assert_eq!(occupied.len(), 17);

        assert_eq!(occupied[0].serial.as_str(), "A00000L7");
        assert_eq!(occupied.last().unwrap().serial.as_str(), "CLN000L1");
    }

    #[test]
    fn load_moves_volume() {
        let chgr = new(&options(2, 8, 0, 4)).unwrap();

        let src = Location::storage(1);
        let dst = Location::transfer(0);
        chgr.load(src, dst).unwrap();

        let slots = chgr.status().unwrap();
        let drive = &slots[&SlotCategory::Transfer][0];
        let vol = drive.volume.as_ref().expect("drive loaded");

        assert_eq!(vol.serial.as_str(), "A00000L7");
        assert_eq!(vol.location, Some(dst));
        assert_eq!(vol.home, Some(src));

        let shelf = &slots[&SlotCategory::Storage][1];
        assert!(shelf.volume.is_none());
    }

    #[test]
    fn load_from_empty_slot_fails() {
        let chgr = new(&options(2, 8, 0, 4)).unwrap();

        let err = chgr
            .load(Location::storage(7), Location::transfer(0))
            .unwrap_err();
        assert!(err.is(Kind::Invalid));
    }

    #[test]
    fn unload_returns_volume() {
        let chgr = new(&options(1, 8, 0, 2)).unwrap();

        chgr.load(Location::storage(2), Location::transfer(0)).unwrap();
        chgr.unload(Location::transfer(0), Location::storage(2)).unwrap();

        let slots = chgr.status().unwrap();
        let shelf = &slots[&SlotCategory::Storage][2];
        let vol = shelf.volume.as_ref().expect("volume back home");
        assert_eq!(vol.serial.as_str(), "A00001L7");
        assert_eq!(vol.home, None);
    }

    #[test]
    fn seed_volume_placement() {
        let mut opts = options(1, 4, 0, 0);
        opts.seed_volumes = vec![Volume {
            serial: Serial::from("B00000L7"),
            location: Some(Location::storage(2)),
            home: None,
            category: VolumeCategory::Scratch,
            flags: 0,
        }];

        let chgr = new(&opts).unwrap();
        let slots = chgr.status().unwrap();

        let slot = &slots[&SlotCategory::Storage][2];
        assert_eq!(
            slot.volume.as_ref().map(|v| v.serial.as_str()),
            Some("B00000L7")
        );
    }
}
