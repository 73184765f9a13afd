//! Core types for tape stores: volumes, slots, locations and the tape
//! store configuration records.

pub mod changer;
pub mod drive;
pub mod inv;
pub mod service;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::bitmask;

/// A Serial is the volume serial number (VOLSER) of a tape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Serial(pub String);

impl Serial {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The volume label: the first six characters of the serial.
    pub fn label(&self) -> &str {
        if self.0.len() > 6 {
            &self.0[..6]
        } else {
            &self.0
        }
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Serial {
    fn from(s: &str) -> Serial {
        Serial(s.to_string())
    }
}

impl From<String> for Serial {
    fn from(s: String) -> Serial {
        Serial(s)
    }
}

/// The volume lifecycle category.
///
/// The numeric order matters: `filling` sorts before `scratch` so that
/// allocation prefers partially filled volumes without a CASE in the
/// query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeCategory {
    Unknown,
    Allocating,
    Allocated,
    Filling,
    Scratch,
    Full,
    Missing,
    Damaged,
    Cleaning,
}

impl VolumeCategory {
    pub fn as_i64(self) -> i64 {
        match self {
            VolumeCategory::Unknown => 0,
            VolumeCategory::Allocating => 1,
            VolumeCategory::Allocated => 2,
            VolumeCategory::Filling => 3,
            VolumeCategory::Scratch => 4,
            VolumeCategory::Full => 5,
            VolumeCategory::Missing => 6,
            VolumeCategory::Damaged => 7,
            VolumeCategory::Cleaning => 8,
        }
    }

    pub fn from_i64(v: i64) -> VolumeCategory {
        match v {
            1 => VolumeCategory::Allocating,
            2 => VolumeCategory::Allocated,
            3 => VolumeCategory::Filling,
            4 => VolumeCategory::Scratch,
            5 => VolumeCategory::Full,
            6 => VolumeCategory::Missing,
            7 => VolumeCategory::Damaged,
            8 => VolumeCategory::Cleaning,
            _ => VolumeCategory::Unknown,
        }
    }
}

impl fmt::Display for VolumeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VolumeCategory::Unknown => "unknown",
            VolumeCategory::Allocating => "allocating",
            VolumeCategory::Allocated => "allocated",
            VolumeCategory::Filling => "filling",
            VolumeCategory::Scratch => "scratch",
            VolumeCategory::Full => "full",
            VolumeCategory::Missing => "missing",
            VolumeCategory::Damaged => "damaged",
            VolumeCategory::Cleaning => "cleaning",
        };
        write!(f, "{s}")
    }
}

// Volume status flags.

/// The volume is currently being moved by the media changer.
pub const STATUS_TRANSFERRING: u32 = 1 << 0;

/// The volume is mounted in a drive.
pub const STATUS_MOUNTED: u32 = 1 << 1;

/// The volume needs cleaning.
pub const STATUS_NEEDS_CLEANING: u32 = 1 << 2;

/// Formats the flags for human consumption.
pub fn format_volume_flags(f: u32) -> String {
    let mut out = Vec::new();

    if bitmask::is_set(f, STATUS_TRANSFERRING) {
        out.push("transferring");
    }
    if bitmask::is_set(f, STATUS_MOUNTED) {
        out.push("mounted");
    }
    if bitmask::is_set(f, STATUS_NEEDS_CLEANING) {
        out.push("needs-cleaning");
    }

    out.join(",")
}

/// An element/slot address in a store.
pub type Addr = i64;

/// The type of slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotCategory {
    Unknown,
    Invalid,
    Transfer,
    Storage,
    #[serde(rename = "ix")]
    ImportExport,
}

/// All slot categories a library reports in a census.
pub const SLOT_CATEGORIES: [SlotCategory; 3] = [
    SlotCategory::Transfer,
    SlotCategory::Storage,
    SlotCategory::ImportExport,
];

impl fmt::Display for SlotCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlotCategory::Unknown => "unknown",
            SlotCategory::Invalid => "invalid",
            SlotCategory::Transfer => "transfer",
            SlotCategory::Storage => "storage",
            SlotCategory::ImportExport => "ix",
        };
        write!(f, "{s}")
    }
}

impl SlotCategory {
    pub fn parse(s: &str) -> Option<SlotCategory> {
        match s {
            "unknown" => Some(SlotCategory::Unknown),
            "invalid" => Some(SlotCategory::Invalid),
            "transfer" => Some(SlotCategory::Transfer),
            "storage" => Some(SlotCategory::Storage),
            "ix" => Some(SlotCategory::ImportExport),
            _ => None,
        }
    }
}

/// A location uniquely identifies a physical cell within a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub addr: Addr,
    pub category: SlotCategory,
}

impl Location {
    pub const fn new(addr: Addr, category: SlotCategory) -> Location {
        Location { addr, category }
    }

    pub const fn transfer(addr: Addr) -> Location {
        Location::new(addr, SlotCategory::Transfer)
    }

    pub const fn storage(addr: Addr) -> Location {
        Location::new(addr, SlotCategory::Storage)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.addr, self.category)
    }
}

/// A usable volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    /// The volume serial (VOLSER).
    pub serial: Serial,

    /// Current location in the store; absent while the volume is in the
    /// changer arm.
    pub location: Option<Location>,

    /// The storage slot to return to after unload.
    pub home: Option<Location>,

    /// Lifecycle category.
    pub category: VolumeCategory,

    /// Transient status flags.
    pub flags: u32,
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{},{}",
            self.serial,
            self.category,
            format_volume_flags(self.flags)
        )
    }
}

/// A slot in a store, represented by its element address and current
/// occupant (if any).
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub location: Location,
    pub volume: Option<Volume>,
}

impl Slot {
    pub fn empty(location: Location) -> Slot {
        Slot {
            location,
            volume: None,
        }
    }
}

/// The complete physical census of a library, keyed by slot category.
pub type SlotMap = HashMap<SlotCategory, Vec<Slot>>;

/// Whether drives are real devices or emulated with directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Real,
    Emulated,
}

// Tape store configuration records.

/// A driver selection with its backend-specific options.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriverConfig {
    pub driver: String,

    #[serde(default)]
    pub options: HashMap<String, serde_yaml::Value>,
}

/// Configuration for a single drive.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveConfig {
    /// The transfer slot address of the drive.
    pub slot: Addr,

    /// The device path (a directory when devices are emulated).
    pub path: PathBuf,
}

/// The drives section of a tape store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DrivesConfig {
    /// Storage format used by the drives; falls back to the store-level
    /// format block when absent.
    #[serde(default)]
    pub format: Option<DriverConfig>,

    #[serde(default)]
    pub read: BTreeMap<String, DriveConfig>,

    #[serde(default)]
    pub write: BTreeMap<String, DriveConfig>,
}

/// The tape store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Prefix that identifies cleaning cartridges.
    #[serde(rename = "cleaning-prefix")]
    pub cleaning_prefix: String,

    /// Store-level storage format.
    #[serde(default)]
    pub format: Option<DriverConfig>,

    /// Inventory database configuration.
    pub inventory: DriverConfig,

    /// Media changer configuration; one must be named `primary`.
    pub changers: HashMap<String, DriverConfig>,

    /// Drive configuration.
    #[serde(default)]
    pub drives: DrivesConfig,
}

impl Config {
    /// The format configuration in effect: the drives block wins over
    /// the store-level block.
    pub fn format_config(&self) -> Option<&DriverConfig> {
        self.drives.format.as_ref().or(self.format.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_order_prefers_filling() {
        assert!(VolumeCategory::Filling.as_i64() < VolumeCategory::Scratch.as_i64());
    }

    #[test]
    fn category_roundtrip() {
        for cat in [
            VolumeCategory::Unknown,
            VolumeCategory::Allocating,
            VolumeCategory::Allocated,
            VolumeCategory::Filling,
            VolumeCategory::Scratch,
            VolumeCategory::Full,
            VolumeCategory::Missing,
            VolumeCategory::Damaged,
            VolumeCategory::Cleaning,
        ] {
            assert_eq!(VolumeCategory::from_i64(cat.as_i64()), cat);
        }
    }

    #[test]
    fn slot_category_roundtrip() {
        for cat in SLOT_CATEGORIES {
            assert_eq!(SlotCategory::parse(&cat.to_string()), Some(cat));
        }
    }

    #[test]
    fn flags_format() {
        let mut f = 0;
        bitmask::set(&mut f, STATUS_TRANSFERRING);
        bitmask::set(&mut f, STATUS_MOUNTED);
        assert_eq!(format_volume_flags(f), "transferring,mounted");
        assert_eq!(format_volume_flags(0), "");
    }

    #[test]
    fn serial_label() {
        let s = Serial::from("A00000L7");
        assert_eq!(s.label(), "A00000");
    }
}
