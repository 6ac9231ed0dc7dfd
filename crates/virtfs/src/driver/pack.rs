use super::{DirEntry, Driver, MountKind};
use crate::error::{Error, Result};
use crate::file::FileHandle;
use crate::path;
use std::path::{Path, PathBuf};
use virtfs_zip::{Error as ZipError, ZipPack};

/// A zip archive exposed as a read-only mount.
///
/// The central directory is parsed once when the driver is created. Opening
/// a file decompresses the whole entry into a memory-backed handle.
#[derive(Debug)]
pub struct ZipDriver {
    pack: ZipPack,
    subdir: String,
}

impl ZipDriver {
    /// Open `archive` and index it, optionally exposing only `subdir`.
    ///
    /// Nothing is registered anywhere until this returns `Ok`, so a corrupt
    /// archive leaves no trace.
    pub fn new(archive: &Path, subdir: &str) -> Result<Self> {
        let pack = ZipPack::open(archive).map_err(|e| match e {
            ZipError::IoError(err) => Error::MountFailed {
                path: archive.display().to_string(),
                reason: err.to_string(),
            },
            other => Error::CorruptArchive {
                path: archive.display().to_string(),
                reason: other.to_string(),
            },
        })?;

        if !subdir.is_empty() && !pack.index().contains_dir(subdir) {
            return Err(Error::MountFailed {
                path: archive.display().to_string(),
                reason: format!("no directory {} in archive", subdir),
            });
        }

        Ok(Self {
            pack,
            subdir: subdir.to_string(),
        })
    }

    /// Path of the archive file.
    pub fn archive_path(&self) -> &Path {
        self.pack.archive_path()
    }

    fn key(&self, path: &str) -> String {
        path::join(&self.subdir, path)
    }
}

impl Driver for ZipDriver {
    fn kind(&self) -> MountKind {
        MountKind::Zip
    }

    fn exists(&self, path: &str) -> bool {
        let key = self.key(path);
        let index = self.pack.index();
        index.contains_file(&key) || index.contains_dir(&key)
    }

    fn is_directory(&self, path: &str) -> Option<bool> {
        let key = self.key(path);
        let index = self.pack.index();
        if index.contains_dir(&key) {
            Some(true)
        } else if index.contains_file(&key) {
            Some(false)
        } else {
            None
        }
    }

    fn open_read(&self, path: &str) -> Result<FileHandle> {
        let data = self.load_file(path)?;
        Ok(FileHandle::from_bytes(path, data))
    }

    fn list(&self, dir: &str) -> Vec<DirEntry> {
        self.pack
            .index()
            .children(&self.key(dir))
            .map(|(name, kind)| DirEntry {
                name: name.to_string(),
                kind,
            })
            .collect()
    }

    fn real_dir(&self, path: &str) -> Option<PathBuf> {
        self.exists(path)
            .then(|| self.pack.archive_path().to_path_buf())
    }

    fn load_file(&self, path: &str) -> Result<Vec<u8>> {
        let key = self.key(path);
        self.pack.read_entry(&key).map_err(|e| match e {
            ZipError::MissingEntry(_) => Error::NotFound(path.to_string()),
            other => Error::CorruptEntry {
                archive: self.pack.archive_path().display().to_string(),
                name: path.to_string(),
                reason: other.to_string(),
            },
        })
    }
}
