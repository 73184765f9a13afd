//! A changer that drives a SCSI media changer through the `mtx`
//! command-line tool, parsing its textual status output.

use std::path::PathBuf;
use std::process::Command;

use parking_lot::Mutex;
use regex::Regex;
use tracing::debug;

use crate::config::opt_str;
use crate::errors::{Error, Kind, Result};
use crate::store::tape::changer::{Changer, Options};
use crate::store::tape::{Location, Serial, Slot, SlotCategory, SlotMap, Volume};

const MTX_COMMAND: &str = "/usr/bin/mtx";

pub struct Mtx {
    path: String,
    prog: PathBuf,

    // physical commands must never overlap
    mu: Mutex<()>,
}

/// Returns a new mtx-backed changer. Requires the `path` option naming
/// the changer device.
pub fn new(opts: &Options) -> Result<Box<dyn Changer>> {
    const OP: &str = "changer/mtx.new";

    let path = opt_str(&opts.options, "path").map_err(|e| e.op(OP))?;

    Ok(Box::new(Mtx {
        path,
        prog: PathBuf::from(MTX_COMMAND),
        mu: Mutex::new(()),
    }))
}

impl Mtx {
    fn run(&self, args: &[String]) -> Result<Vec<u8>> {
        const OP: &str = "changer/mtx.run";

        let _guard = self.mu.lock();

        debug!("{OP}: {} -f {} {}", self.prog.display(), self.path, args.join(" "));

        let out = Command::new(&self.prog)
            .arg("-f")
            .arg(&self.path)
            .args(args)
            .output()
            .map_err(|e| Error::from(e).op(OP))?;

        if !out.status.success() {
            return Err(Error::new(Kind::IO).op(OP).with(format!(
                "{}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }

        Ok(out.stdout)
    }

    fn do_move(&self, verb: &str, src: Location, dst: Location) -> Result<()> {
        self.run(&[verb.to_string(), src.addr.to_string(), dst.addr.to_string()])
            .map(|_| ())
    }
}

impl Changer for Mtx {
    fn status(&self) -> Result<SlotMap> {
        let out = self.run(&["status".to_string()])?;
        parse_elements(&String::from_utf8_lossy(&out))
    }

    fn load(&self, src: Location, dst: Location) -> Result<()> {
        self.do_move("load", src, dst)
    }

    fn unload(&self, src: Location, dst: Location) -> Result<()> {
        self.do_move("unload", src, dst)
    }

    fn transfer(&self, src: Location, dst: Location) -> Result<()> {
        self.do_move("transfer", src, dst)
    }
}

struct StatusPatterns {
    drive: Regex,
    drive_element: Regex,
    slot: Regex,
    mail_slot: Regex,
    slot_element: Regex,
}

impl StatusPatterns {
    fn new() -> StatusPatterns {
        StatusPatterns {
            drive: Regex::new(r"Data Transfer Element (\d+):(.*)").unwrap(),
            drive_element: Regex::new(r"Full \(Storage Element (\d+) Loaded\):VolumeTag = (.*)")
                .unwrap(),
            slot: Regex::new(r"\s*Storage Element (\d+):(.*)").unwrap(),
            mail_slot: Regex::new(r"\s*Storage Element (\d+) IMPORT/EXPORT:(.*)").unwrap(),
            slot_element: Regex::new(r"Full :VolumeTag=(.*)").unwrap(),
        }
    }
}

/// Parses the element census out of `mtx status` output.
fn parse_elements(status: &str) -> Result<SlotMap> {
    const OP: &str = "changer/mtx.status";

    let pats = StatusPatterns::new();

    let mut elements = SlotMap::new();
    elements.insert(SlotCategory::Transfer, Vec::new());
    elements.insert(SlotCategory::Storage, Vec::new());
    elements.insert(SlotCategory::ImportExport, Vec::new());

    // the first line is the header establishing counts
    for line in status.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }

        // data transfer elements
        if let Some(m) = pats.drive.captures(line) {
            let addr: i64 = m[1].parse().map_err(|_| bad_line(OP, line))?;

            let mut slot = Slot::empty(Location::transfer(addr));

            let rest = &m[2];
            if rest != "Empty" {
                let m = pats
                    .drive_element
                    .captures(rest)
                    .ok_or_else(|| bad_element(OP, "transfer", rest))?;

                let home: i64 = m[1].parse().map_err(|_| bad_line(OP, line))?;

                slot.volume = Some(Volume {
                    serial: Serial(m[2].trim().to_string()),
                    location: Some(slot.location),
                    home: Some(Location::storage(home)),
                    category: crate::store::tape::VolumeCategory::Unknown,
                    flags: 0,
                });
            }

            elements.get_mut(&SlotCategory::Transfer).unwrap().push(slot);
            continue;
        }

        // mailslot elements (must be tried before plain storage)
        if let Some(m) = pats.mail_slot.captures(line) {
            let addr: i64 = m[1].parse().map_err(|_| bad_line(OP, line))?;

            let mut slot = Slot::empty(Location::new(addr, SlotCategory::ImportExport));

            let rest = &m[2];
            if rest != "Empty" {
                let m = pats
                    .slot_element
                    .captures(rest)
                    .ok_or_else(|| bad_element(OP, "import/export", rest))?;

                slot.volume = Some(Volume {
                    serial: Serial(m[1].trim().to_string()),
                    location: Some(slot.location),
                    home: None,
                    category: crate::store::tape::VolumeCategory::Unknown,
                    flags: 0,
                });
            }

            elements
                .get_mut(&SlotCategory::ImportExport)
                .unwrap()
                .push(slot);
            continue;
        }

        // storage elements
        if let Some(m) = pats.slot.captures(line) {
            let addr: i64 = m[1].parse().map_err(|_| bad_line(OP, line))?;

            let mut slot = Slot::empty(Location::storage(addr));

            let rest = &m[2];
            if rest != "Empty" {
                let m = pats
                    .slot_element
                    .captures(rest)
                    .ok_or_else(|| bad_element(OP, "storage", rest))?;

                slot.volume = Some(Volume {
                    serial: Serial(m[1].trim().to_string()),
                    location: Some(slot.location),
                    home: None,
                    category: crate::store::tape::VolumeCategory::Unknown,
                    flags: 0,
                });
            }

            elements.get_mut(&SlotCategory::Storage).unwrap().push(slot);
            continue;
        }

        return Err(bad_line(OP, line));
    }

    Ok(elements)
}

fn bad_line(op: &str, line: &str) -> Error {
    Error::new(Kind::Invalid)
        .op(op)
        .with(format!("failed to parse status line: {line:?}"))
}

fn bad_element(op: &str, what: &str, rest: &str) -> Error {
    Error::new(Kind::Invalid)
        .op(op)
        .with(format!("failed to parse {what} element: {rest:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = "  Storage Changer /dev/sg3:2 Drives, 4 Slots ( 2 Import/Export )
Data Transfer Element 0:Full (Storage Element 2 Loaded):VolumeTag = A00001L7
Data Transfer Element 1:Empty
      Storage Element 1:Full :VolumeTag=A00000L7
      Storage Element 2:Empty
      Storage Element 3:Full :VolumeTag=CLN000L1
      Storage Element 4:Empty
      Storage Element 5 IMPORT/EXPORT:Empty
      Storage Element 6 IMPORT/EXPORT:Full :VolumeTag=B00000L7
";

    #[test]
    fn parse_status() {
        let slots = parse_elements(STATUS).unwrap();

        let drives = &slots[&SlotCategory::Transfer];
        assert_eq!(drives.len(), 2);

        let loaded = drives[0].volume.as_ref().expect("drive 0 loaded");
        assert_eq!(loaded.serial.as_str(), "A00001L7");
        assert_eq!(loaded.home, Some(Location::storage(2)));
        assert!(drives[1].volume.is_none());

        let shelf = &slots[&SlotCategory::Storage];
        assert_eq!(shelf.len(), 4);
        assert_eq!(
            shelf[0].volume.as_ref().map(|v| v.serial.as_str()),
            Some("A00000L7")
        );
        assert!(shelf[1].volume.is_none());

        let mail = &slots[&SlotCategory::ImportExport];
        assert_eq!(mail.len(), 2);
        assert!(mail[0].volume.is_none());
        assert_eq!(
            mail[1].volume.as_ref().map(|v| v.serial.as_str()),
            Some("B00000L7")
        );
        assert_eq!(mail[1].location.addr, 6);
    }

    #[test]
    fn parse_rejects_malformed_line() {
        let status = "  Storage Changer /dev/sg3:1 Drives, 1 Slots ( 0 Import/Export )
Data Transfer Element 0:Empty
      garbage line
";
        let err = parse_elements(status).unwrap_err();
        assert!(err.is(Kind::Invalid));
    }

    #[test]
    fn parse_rejects_malformed_element() {
        let status = "  Storage Changer /dev/sg3:1 Drives, 1 Slots ( 0 Import/Export )
      Storage Element 1:Full VolumeTag A00000L7
";
        let err = parse_elements(status).unwrap_err();
        assert!(err.is(Kind::Invalid));
    }
}
