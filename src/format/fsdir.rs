//! A directory backed storage format for emulated devices: the device
//! path is a directory, formatting writes a volume label into it, and
//! the storage surface is the directory itself. No mount step is
//! involved.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{Error, Kind, Result};
use crate::format::{Format, Formatted};
use crate::storage::fsdir::FsDir;
use crate::store::tape::{DeviceMode, DriverConfig, Volume, VolumeCategory};

const LABEL_FILE: &str = ".volume-label";

pub struct FsDirFormat;

pub fn new(_cfg: &DriverConfig, _mode: DeviceMode) -> Result<Box<dyn Format>> {
    Ok(Box::new(FsDirFormat))
}

impl Format for FsDirFormat {
    fn format(&self, devpath: &Path, vol: &Volume) -> Result<Formatted> {
        const OP: &str = "format/fsdir.format";

        let md = fs::metadata(devpath).map_err(|e| {
            Error::new(Kind::Invalid)
                .op(OP)
                .with(format!("{}: {e}", devpath.display()))
        })?;

        if !md.is_dir() {
            return Err(Error::new(Kind::Invalid)
                .op(OP)
                .with(format!("{} is not a directory", devpath.display())));
        }

        let mut formatted = false;

        if vol.category == VolumeCategory::Allocated {
            debug!("{OP}: labeling {} as {}", devpath.display(), vol.serial);

            fs::write(devpath.join(LABEL_FILE), vol.serial.label())
                .map_err(|e| Error::from(e).op(OP))?;

            formatted = true;
        }

        Ok(Formatted {
            formatted,
            storage: Arc::new(FsDir::new(devpath)),
            mount: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tape::{Location, Serial};

    fn volume(category: VolumeCategory) -> Volume {
        Volume {
            serial: Serial::from("A00000L7"),
            location: Some(Location::transfer(0)),
            home: None,
            category,
            flags: 0,
        }
    }

    #[test]
    fn formats_allocated_volume() {
        let dir = tempfile::tempdir().unwrap();
        let fmtr = FsDirFormat;

        let out = fmtr
            .format(dir.path(), &volume(VolumeCategory::Allocated))
            .unwrap();
        assert!(out.formatted);
        assert!(out.mount.is_none());

        let label = fs::read_to_string(dir.path().join(LABEL_FILE)).unwrap();
        assert_eq!(label, "A00000");
    }

    #[test]
    fn leaves_filling_volume_alone() {
        let dir = tempfile::tempdir().unwrap();
        let fmtr = FsDirFormat;

        let out = fmtr
            .format(dir.path(), &volume(VolumeCategory::Filling))
            .unwrap();
        assert!(!out.formatted);
        assert!(!dir.path().join(LABEL_FILE).exists());
    }

    #[test]
    fn rejects_missing_device() {
        let dir = tempfile::tempdir().unwrap();
        let fmtr = FsDirFormat;

        let err = fmtr
            .format(&dir.path().join("nope"), &volume(VolumeCategory::Scratch))
            .unwrap_err();
        assert!(err.is(Kind::Invalid));
    }
}
