//! Backends that can be mounted on the search path.
//!
//! Every mounted entry owns one [`Driver`]. Paths handed to a driver are
//! already normalized logical paths relative to the mount (`""` is the
//! mount's root).

mod dir;
mod pack;

pub use dir::DirDriver;
pub use pack::ZipDriver;

use crate::error::{Error, Result};
use crate::file::FileHandle;
use indexmap::IndexSet;
use std::fmt;
use std::path::PathBuf;
pub use virtfs_zip::EntryKind;

/// Kind of a mounted entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MountKind {
    Directory,
    Zip,
}

impl fmt::Display for MountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountKind::Directory => f.write_str("directory"),
            MountKind::Zip => f.write_str("zip"),
        }
    }
}

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Capability set shared by directory and zip mounts.
pub trait Driver: fmt::Debug + Send + Sync {
    fn kind(&self) -> MountKind;

    /// Whether `path` names a file or directory in this entry.
    fn exists(&self, path: &str) -> bool;

    /// `Some(true)` for a directory, `Some(false)` for a file, `None` when
    /// this entry does not have the path.
    fn is_directory(&self, path: &str) -> Option<bool>;

    fn open_read(&self, path: &str) -> Result<FileHandle>;

    fn open_write(&self, path: &str) -> Result<FileHandle> {
        Err(Error::ReadOnlyBacking(path.to_string()))
    }

    fn open_append(&self, path: &str) -> Result<FileHandle> {
        Err(Error::ReadOnlyBacking(path.to_string()))
    }

    /// Immediate children of `dir`; empty when the directory is absent.
    fn list(&self, dir: &str) -> Vec<DirEntry>;

    /// Real filesystem location that backs `path`, if this entry has it.
    fn real_dir(&self, path: &str) -> Option<PathBuf>;

    /// Read a whole file into memory.
    fn load_file(&self, path: &str) -> Result<Vec<u8>> {
        self.open_read(path)?.read_to_end()
    }

    /// Add the names of all children of `dir` to `names`. Names already
    /// present keep their earlier position.
    fn enumerate(&self, dir: &str, names: &mut IndexSet<String>) {
        names.extend(self.list(dir).into_iter().map(|entry| entry.name));
    }

    fn get_files(&self, dir: &str, names: &mut IndexSet<String>) {
        for entry in self.list(dir) {
            if entry.kind == EntryKind::File {
                names.insert(entry.name);
            }
        }
    }

    fn get_dirs(&self, dir: &str, names: &mut IndexSet<String>) {
        for entry in self.list(dir) {
            if entry.kind == EntryKind::Directory {
                names.insert(entry.name);
            }
        }
    }
}
