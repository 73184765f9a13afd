//! A storage backend that reads and writes beneath a mounted file
//! system directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::storage::{File, FileInfo, OpenFlags, Storage};
use crate::PathName;

pub struct FsDir {
    root: PathBuf,
}

impl FsDir {
    /// Returns a new storage rooted at the specified directory.
    pub fn new(root: impl Into<PathBuf>) -> FsDir {
        FsDir { root: root.into() }
    }

    fn join(&self, name: &PathName) -> PathBuf {
        // Store paths are absolute-looking; strip the leading separator
        // so they stay inside the root.
        self.root.join(name.trim_start_matches('/'))
    }
}

impl Storage for FsDir {
    fn open_file(&self, name: &PathName, flags: OpenFlags) -> Result<Box<dyn File>> {
        let mut opts = fs::OpenOptions::new();
        opts.read(flags.read)
            .write(flags.write)
            .create(flags.create)
            .append(flags.append)
            .truncate(flags.truncate);

        let f = opts.open(self.join(name))?;
        Ok(Box::new(f))
    }

    fn stat(&self, name: &PathName) -> Result<FileInfo> {
        let md = fs::metadata(self.join(name))?;
        Ok(FileInfo {
            size: md.len() as i64,
        })
    }

    fn mkdir(&self, name: &PathName) -> Result<()> {
        fs::create_dir(self.join(name))?;
        Ok(())
    }

    fn mkdir_all(&self, name: &PathName) -> Result<()> {
        fs::create_dir_all(self.join(name))?;
        Ok(())
    }
}

/// Creates the directory if missing and returns a storage rooted there.
pub fn create_root(root: &Path) -> Result<FsDir> {
    fs::create_dir_all(root)?;
    Ok(FsDir::new(root))
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Seek, SeekFrom, Write};

    use super::*;
    use crate::Kind;

    #[test]
    fn create_write_read() {
        let dir = tempfile::tempdir().unwrap();
        let stg = FsDir::new(dir.path());

        let name = "foo".to_string();

        let mut f = stg.create(&name).unwrap();
        f.write_all(b"hello tape").unwrap();
        drop(f);

        let mut f = stg.open(&name).unwrap();
        let mut buf = String::new();
        f.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "hello tape");

        assert_eq!(stg.stat(&name).unwrap().size, 10);
    }

    #[test]
    fn append_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let stg = FsDir::new(dir.path());

        let name = "bar".to_string();

        stg.create(&name).unwrap().write_all(&[0u8; 4096]).unwrap();
        stg.append(&name).unwrap().write_all(&[1u8; 2048]).unwrap();

        assert_eq!(stg.stat(&name).unwrap().size, 6144);
    }

    #[test]
    fn seek_from_offset() {
        let dir = tempfile::tempdir().unwrap();
        let stg = FsDir::new(dir.path());

        let name = "baz".to_string();
        stg.create(&name).unwrap().write_all(b"0123456789").unwrap();

        let mut f = stg.open(&name).unwrap();
        f.seek(SeekFrom::Start(4)).unwrap();

        let mut buf = String::new();
        f.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "456789");
    }

    #[test]
    fn stat_missing_is_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        let stg = FsDir::new(dir.path());

        let err = stg.stat(&"nope".to_string()).unwrap_err();
        assert!(err.is(Kind::NotExist));
    }

    #[test]
    fn mkdir_all_nested() {
        let dir = tempfile::tempdir().unwrap();
        let stg = FsDir::new(dir.path());

        stg.mkdir_all(&"a/b/c".to_string()).unwrap();
        stg.create(&"a/b/c/f".to_string()).unwrap();
        assert_eq!(stg.stat(&"a/b/c/f".to_string()).unwrap().size, 0);
    }
}
