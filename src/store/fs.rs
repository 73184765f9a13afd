//! A simple store over an existing file system directory.

use std::sync::Arc;

use tracing::debug;

use crate::config::FsConfig;
use crate::errors::Result;
use crate::storage::fsdir::{self, FsDir};
use crate::storage::{File, FileInfo, OpenFlags, Storage};
use crate::store::Store;
use crate::PathName;

pub struct Fs {
    name: String,
    storage: FsDir,
}

/// Creates a new file system backed store.
pub fn new(name: &str, cfg: &FsConfig) -> Result<Arc<dyn Store>> {
    let op = format!("store/fs.new[{name}]");

    debug!("{op}: creating store at {}", cfg.root.display());

    let storage = fsdir::create_root(&cfg.root).map_err(|e| e.op(op))?;

    Ok(Arc::new(Fs {
        name: name.to_string(),
        storage,
    }))
}

impl Storage for Fs {
    fn open_file(&self, name: &PathName, flags: OpenFlags) -> Result<Box<dyn File>> {
        self.storage.open_file(name, flags)
    }

    fn stat(&self, name: &PathName) -> Result<FileInfo> {
        self.storage.stat(name)
    }

    fn mkdir(&self, name: &PathName) -> Result<()> {
        self.storage.mkdir(name)
    }

    fn mkdir_all(&self, name: &PathName) -> Result<()> {
        self.storage.mkdir_all(name)
    }
}

impl Store for Fs {
    fn name(&self) -> &str {
        &self.name
    }
}
