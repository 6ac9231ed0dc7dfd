use crate::error::{Error, Result};
use crate::index::ZipIndex;
use log::{debug, trace};
use parking_lot::Mutex;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Upper bound on the buffer reserved up front from a header's declared size.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

/// An opened zip archive with its parsed index.
///
/// The index is built once in [`ZipPack::open`] and never changes. Entry
/// reads share one archive reader behind a mutex.
#[derive(Debug)]
pub struct ZipPack {
    path: PathBuf,
    index: ZipIndex,
    archive: Mutex<ZipArchive<File>>,
}

impl ZipPack {
    /// Open an archive and parse its central directory.
    ///
    /// Fails with [`Error::IoError`] if the file cannot be opened and with
    /// [`Error::InvalidArchive`] if it is not a readable zip.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        let mut archive =
            ZipArchive::new(file).map_err(|e| Error::InvalidArchive(e.to_string()))?;
        let index =
            ZipIndex::from_archive(&mut archive).map_err(|e| Error::InvalidArchive(e.to_string()))?;

        debug!("opened zip {} ({} files)", path.display(), index.len());

        Ok(Self {
            path: path.to_path_buf(),
            index,
            archive: Mutex::new(archive),
        })
    }

    /// Get the parsed index.
    pub fn index(&self) -> &ZipIndex {
        &self.index
    }

    /// Get the path to the archive file.
    pub fn archive_path(&self) -> &Path {
        &self.path
    }

    /// Decompress one entry into memory.
    ///
    /// The zip reader verifies the CRC-32 when the entry is fully read, so a
    /// checksum mismatch surfaces here as [`Error::CorruptEntry`].
    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        let record = self
            .index
            .record(name)
            .ok_or_else(|| Error::MissingEntry(name.to_string()))?;

        trace!(
            "reading {} from {} ({:?}, {} -> {} bytes)",
            name,
            self.path.display(),
            record.compression,
            record.compressed_size,
            record.uncompressed_size
        );

        let corrupt = |reason: String| Error::CorruptEntry {
            name: name.to_string(),
            reason,
        };

        let mut archive = self.archive.lock();
        let mut file = archive
            .by_index(record.index)
            .map_err(|e| corrupt(e.to_string()))?;

        // read at most one byte past the declared size
        let declared = record.uncompressed_size;
        let mut data = Vec::with_capacity(declared.min(MAX_PREALLOC) as usize);
        (&mut file)
            .take(declared.saturating_add(1))
            .read_to_end(&mut data)
            .map_err(|e| corrupt(e.to_string()))?;

        if data.len() as u64 > declared {
            return Err(corrupt(format!(
                "entry inflates past its declared {} bytes",
                declared
            )));
        }
        if data.len() as u64 != declared {
            return Err(corrupt(format!(
                "expected {} bytes, got {}",
                record.uncompressed_size,
                data.len()
            )));
        }

        Ok(data)
    }
}
