//! End-to-end tests of the tape store against a simulated library.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tapestore::bitmask;
use tapestore::store::tape::changer;
use tapestore::store::tape::inv;
use tapestore::store::tape::{
    service, Config, DeviceMode, DriveConfig, DriverConfig, DrivesConfig, Location, Serial,
    SlotCategory, VolumeCategory, STATUS_MOUNTED, STATUS_TRANSFERRING,
};
use tapestore::store::RunOptions;
use tapestore::Kind;

fn changer_options(dir_counts: (i64, i64, i64, i64)) -> HashMap<String, serde_yaml::Value> {
    let (transfer, storage, ix, volumes) = dir_counts;

    let mut opts = HashMap::new();
    opts.insert("transfer".to_string(), serde_yaml::Value::from(transfer));
    opts.insert("storage".to_string(), serde_yaml::Value::from(storage));
    opts.insert("ix".to_string(), serde_yaml::Value::from(ix));
    opts.insert("volumes".to_string(), serde_yaml::Value::from(volumes));
    opts
}

fn inventory_options(dir: &Path) -> HashMap<String, serde_yaml::Value> {
    let mut opts = HashMap::new();
    opts.insert(
        "path".to_string(),
        serde_yaml::Value::from(dir.join("inv.db").to_string_lossy().into_owned()),
    );
    opts
}

fn tape_config(dir: &Path, drives: usize) -> Config {
    let mut write = BTreeMap::new();
    for i in 0..drives {
        write.insert(
            format!("write{i}"),
            DriveConfig {
                slot: i as i64,
                path: dir.join(format!("dev/st{i}")),
            },
        );
    }

    let mut changers = HashMap::new();
    changers.insert(
        "primary".to_string(),
        DriverConfig {
            driver: "emulated".to_string(),
            options: changer_options((4, 32, 4, 16)),
        },
    );

    Config {
        cleaning_prefix: "CLN".to_string(),
        format: None,
        inventory: DriverConfig {
            driver: "sqlite".to_string(),
            options: inventory_options(dir),
        },
        changers,
        drives: DrivesConfig {
            format: Some(DriverConfig {
                driver: "fsdir".to_string(),
                options: HashMap::new(),
            }),
            read: BTreeMap::new(),
            write,
        },
    }
}

fn cold_start_options() -> RunOptions {
    RunOptions {
        reset_db: true,
        audit: true,
        device_mode: DeviceMode::Emulated,
    }
}

#[test]
fn cold_start_simulated_library() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = tape_config(dir.path(), 4);

    let store = service::new("archive", &cfg, &cold_start_options()).unwrap();

    let mgnt = store.management().expect("tape store has a management surface");
    let vols = mgnt.volumes().unwrap();

    // 16 data cartridges plus one cleaning cartridge
    assert_eq!(vols.len(), 17);

    let serials: Vec<&str> = vols.iter().map(|v| v.serial.as_str()).collect();
    let mut expected: Vec<String> = (0..16).map(|i| format!("A{i:05}L7")).collect();
    expected.push("CLN000L1".to_string());
    assert_eq!(serials, expected.iter().map(String::as_str).collect::<Vec<_>>());

    let cln = vols.iter().find(|v| v.serial.as_str() == "CLN000L1").unwrap();
    assert_eq!(cln.category, VolumeCategory::Cleaning);

    // four volumes are serving in the drives
    let serving: Vec<_> = vols
        .iter()
        .filter(|v| {
            v.location
                .map(|loc| loc.category == SlotCategory::Transfer)
                .unwrap_or(false)
        })
        .collect();
    assert_eq!(serving.len(), 4);

    let mut slots: Vec<i64> = serving.iter().map(|v| v.location.unwrap().addr).collect();
    slots.sort();
    assert_eq!(slots, vec![0, 1, 2, 3]);

    for vol in serving {
        assert_eq!(vol.category, VolumeCategory::Filling);
        assert!(bitmask::is_set(vol.flags, STATUS_MOUNTED));
        assert!(!bitmask::is_set(vol.flags, STATUS_TRANSFERRING));
        assert_ne!(vol.category, VolumeCategory::Cleaning);
    }
}

#[test]
fn warm_start_reuses_loaded_volumes() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = tape_config(dir.path(), 2);

    let store = service::new("archive", &cfg, &cold_start_options()).unwrap();
    let first: Vec<_> = store
        .management()
        .unwrap()
        .volumes()
        .unwrap()
        .into_iter()
        .filter(|v| v.location.map(|l| l.category == SlotCategory::Transfer).unwrap_or(false))
        .map(|v| v.serial)
        .collect();
    drop(store);

    // restart without a reset: the same volumes are found in the drives
    let opts = RunOptions {
        reset_db: false,
        audit: true,
        device_mode: DeviceMode::Emulated,
    };
    let store = service::new("archive", &cfg, &opts).unwrap();
    let second: Vec<_> = store
        .management()
        .unwrap()
        .volumes()
        .unwrap()
        .into_iter()
        .filter(|v| v.location.map(|l| l.category == SlotCategory::Transfer).unwrap_or(false))
        .map(|v| v.serial)
        .collect();

    assert_eq!(first, second);
}

#[test]
fn facade_dispatches_to_first_write_drive() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = tape_config(dir.path(), 2);

    let store = service::new("archive", &cfg, &cold_start_options()).unwrap();

    let name = "data/hello".to_string();
    store.mkdir_all(&"data".to_string()).unwrap();

    let mut f = store.create(&name).unwrap();
    use std::io::Write;
    f.write_all(b"hello tape").unwrap();
    drop(f);

    assert_eq!(store.stat(&name).unwrap().size, 10);

    // the bytes land under the first write drive's device directory
    let backing = dir.path().join("dev/st0/data/hello");
    assert_eq!(std::fs::read(backing).unwrap(), b"hello tape");

    // the path is bound to the serving volume in the inventory
    let inv = inv::Registry::builtin()
        .create(
            "sqlite",
            &inv::Options {
                options: inventory_options(dir.path()),
                cleaning_prefix: "CLN".to_string(),
            },
        )
        .unwrap();

    let vol = inv.lookup(&name).unwrap();
    assert_eq!(vol.location.unwrap().category, SlotCategory::Transfer);
}

#[test]
fn restart_audit_reconciles_interrupted_load() {
    let dir = tempfile::tempdir().unwrap();

    let inv_opts = inv::Options {
        options: inventory_options(dir.path()),
        cleaning_prefix: "CLN".to_string(),
    };

    let chgr_opts = changer::Options {
        options: changer_options((4, 32, 4, 16)),
        cleaning_prefix: "CLN".to_string(),
        seed_volumes: Vec::new(),
    };

    {
        let inv = inv::Registry::builtin().create("sqlite", &inv_opts).unwrap();
        let chgr = changer::Registry::builtin().create("emulated", &chgr_opts).unwrap();
        inv.audit(chgr.as_ref()).unwrap();

        // leave A00001L7 exactly as a crash mid-load would: location
        // lost, home recorded, transferring committed
        let mut vol = inv.info(&Serial::from("A00001L7")).unwrap();
        vol.home = vol.location.take();
        vol.flags |= STATUS_TRANSFERRING;
        inv.update(&vol).unwrap();
    }

    // restart: the emulated library is seeded from what the inventory
    // last knew, and the audit restores ground truth
    let inv = inv::Registry::builtin().create("sqlite", &inv_opts).unwrap();

    let seeded = changer::Options {
        options: changer_options((4, 32, 4, 16)),
        cleaning_prefix: "CLN".to_string(),
        seed_volumes: inv.volumes().unwrap(),
    };

    let chgr = changer::Registry::builtin().create("emulated", &seeded).unwrap();
    inv.audit(chgr.as_ref()).unwrap();

    let vol = inv.info(&Serial::from("A00001L7")).unwrap();
    assert_eq!(vol.location, Some(Location::storage(2)));
    assert!(!bitmask::is_set(vol.flags, STATUS_TRANSFERRING));
    assert_ne!(vol.category, VolumeCategory::Missing);
}

#[test]
fn startup_fails_without_primary_changer() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = tape_config(dir.path(), 1);
    cfg.changers.clear();

    let err = service::new("archive", &cfg, &cold_start_options()).unwrap_err();
    assert!(err.is(Kind::Invalid));
}

#[test]
fn startup_fails_with_unknown_driver() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = tape_config(dir.path(), 1);
    cfg.inventory.driver = "postgres".to_string();

    let err = service::new("archive", &cfg, &cold_start_options()).unwrap_err();
    assert!(err.is(Kind::Invalid));
}
