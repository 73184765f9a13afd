//! The LTFS storage format, driven through the reference implementation
//! tools: `mkltfs` writes a fresh filesystem, `ltfs` mounts it over
//! FUSE, `fusermount` takes it down again.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tracing::debug;

use crate::config::opt_str;
use crate::errors::{Error, Kind, Result};
use crate::format::{Format, Formatted, Mount};
use crate::storage::fsdir::FsDir;
use crate::store::tape::{DeviceMode, DriverConfig, Volume, VolumeCategory};

const LTFS_COMMAND: &str = "/usr/local/bin/ltfs";
const MKLTFS_COMMAND: &str = "/usr/local/bin/mkltfs";
const FUSERMOUNT_COMMAND: &str = "/usr/bin/fusermount";

pub struct Ltfs {
    mountdir: PathBuf,
    mode: DeviceMode,
}

/// Returns a new LTFS format. Requires the `mountdir` option naming the
/// directory volumes are mounted beneath.
pub fn new(cfg: &DriverConfig, mode: DeviceMode) -> Result<Box<dyn Format>> {
    const OP: &str = "format/ltfs.new";

    let mountdir = PathBuf::from(opt_str(&cfg.options, "mountdir").map_err(|e| e.op(OP))?);

    fs::create_dir_all(&mountdir).map_err(|e| Error::from(e).op(OP))?;

    Ok(Box::new(Ltfs { mountdir, mode }))
}

impl Format for Ltfs {
    fn format(&self, devpath: &Path, vol: &Volume) -> Result<Formatted> {
        const OP: &str = "format/ltfs.format";

        let md = fs::metadata(devpath).map_err(|e| {
            Error::new(Kind::Invalid)
                .op(OP)
                .with(format!("{}: {e}", devpath.display()))
        })?;

        if self.mode == DeviceMode::Emulated && !md.is_dir() {
            return Err(Error::new(Kind::Invalid)
                .op(OP)
                .with(format!("{} is not a directory", devpath.display())));
        }

        let mut formatted = false;

        if vol.category == VolumeCategory::Allocated {
            let mut args = vec![
                format!("--device={}", devpath.display()),
                format!("--tape-serial={}", vol.serial.label()),
            ];

            if self.mode == DeviceMode::Emulated {
                args.push("--backend=file".to_string());
            }

            run(Command::new(MKLTFS_COMMAND).args(&args))
                .map_err(|e| Error::new(Kind::Other).op(OP).with(e))?;

            formatted = true;
        }

        let mountpath = self.mountdir.join(vol.serial.as_str());

        Ok(Formatted {
            formatted,
            storage: Arc::new(FsDir::new(&mountpath)),
            mount: Some(Box::new(LtfsMount {
                devpath: devpath.to_path_buf(),
                mountpath,
                mode: self.mode,
            })),
        })
    }
}

struct LtfsMount {
    devpath: PathBuf,
    mountpath: PathBuf,
    mode: DeviceMode,
}

impl Mount for LtfsMount {
    fn mount(&self) -> Result<()> {
        const OP: &str = "format/ltfs.mount";

        fs::create_dir_all(&self.mountpath).map_err(|e| Error::from(e).op(OP))?;

        let mut args = vec![
            self.mountpath.display().to_string(),
            "-o".to_string(),
            format!("devname={}", self.devpath.display()),
            "-o".to_string(),
            "sync_type=unmount".to_string(),
        ];

        if self.mode == DeviceMode::Emulated {
            args.push("-o".to_string());
            args.push("tape_backend=file".to_string());
        }

        run(Command::new(LTFS_COMMAND).args(&args))
            .map_err(|e| Error::new(Kind::Other).op(OP).with(e))?;

        Ok(())
    }

    fn unmount(&self) -> Result<()> {
        const OP: &str = "format/ltfs.unmount";

        run(Command::new(FUSERMOUNT_COMMAND)
            .arg("-u")
            .arg(&self.mountpath))
        .map_err(|e| Error::new(Kind::Other).op(OP).with(e))?;

        Ok(())
    }
}

fn run(cmd: &mut Command) -> Result<Vec<u8>> {
    debug!("running: {cmd:?}");

    let out = cmd.output().map_err(Error::from)?;

    if !out.status.success() {
        return Err(Error::new(Kind::IO).with(format!(
            "{}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    Ok(out.stdout)
}
