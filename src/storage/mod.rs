//! The storage interface: a small file API presented by every backing
//! medium, whether an OS directory or a mounted tape filesystem.

pub mod fsdir;

use std::io::{Read, Seek, Write};

use crate::errors::Result;
use crate::PathName;

/// An open file handle. Handles are owned exclusively by one reader or
/// writer at a time; dropping the handle closes it.
pub trait File: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> File for T {}

/// Basic information about a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    pub size: i64,
}

/// Flags for the generalized open call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub append: bool,
    pub truncate: bool,
}

impl OpenFlags {
    pub const fn new() -> OpenFlags {
        OpenFlags {
            read: false,
            write: false,
            create: false,
            append: false,
            truncate: false,
        }
    }

    pub const fn read(mut self) -> OpenFlags {
        self.read = true;
        self
    }

    pub const fn write(mut self) -> OpenFlags {
        self.write = true;
        self
    }

    pub const fn create(mut self) -> OpenFlags {
        self.create = true;
        self
    }

    pub const fn append(mut self) -> OpenFlags {
        self.append = true;
        self
    }

    pub const fn truncate(mut self) -> OpenFlags {
        self.truncate = true;
        self
    }
}

/// The storage interface.
pub trait Storage: Send + Sync {
    /// Creates the named file, truncating it if it already exists.
    fn create(&self, name: &PathName) -> Result<Box<dyn File>> {
        self.open_file(name, OpenFlags::new().create().write().truncate())
    }

    /// Opens the named file for reading.
    fn open(&self, name: &PathName) -> Result<Box<dyn File>> {
        self.open_file(name, OpenFlags::new().read())
    }

    /// Opens the named file for appending.
    fn append(&self, name: &PathName) -> Result<Box<dyn File>> {
        self.open_file(name, OpenFlags::new().create().write().append())
    }

    /// The generalized open call.
    fn open_file(&self, name: &PathName, flags: OpenFlags) -> Result<Box<dyn File>>;

    /// Returns information about the named file.
    fn stat(&self, name: &PathName) -> Result<FileInfo>;

    /// Creates a new directory.
    fn mkdir(&self, name: &PathName) -> Result<()>;

    /// Creates a directory along with any necessary parents.
    fn mkdir_all(&self, name: &PathName) -> Result<()>;
}
