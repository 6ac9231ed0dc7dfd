use crate::error::{Error, Result};
use crate::index::normalize_entry_name;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

#[derive(Debug, Clone)]
enum PackEntry {
    File { name: String, data: Vec<u8> },
    Dir { name: String },
}

/// Builder for content-pack archives that can be mounted by `virtfs`.
#[derive(Debug, Clone)]
pub struct PackBuilder {
    entries: Vec<PackEntry>,
    compression: CompressionMethod,
}

impl Default for PackBuilder {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            compression: CompressionMethod::Deflated,
        }
    }
}

impl PackBuilder {
    /// Create a new builder. Files are DEFLATE-compressed by default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every regular file below `root`, keeping paths relative to it.
    ///
    /// Symbolic links are not followed.
    pub fn from_dir<P: AsRef<Path>>(root: P) -> Result<Self> {
        let mut builder = Self::new();
        collect_dir(root.as_ref(), Path::new(""), &mut builder)?;
        Ok(builder)
    }

    /// Set the compression method used for file entries.
    pub fn with_compression(mut self, compression: CompressionMethod) -> Self {
        self.compression = compression;
        self
    }

    /// Add a file entry.
    pub fn with_file(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.entries.push(PackEntry::File {
            name: name.into(),
            data: data.into(),
        });
        self
    }

    /// Add an explicit directory entry.
    pub fn with_dir(mut self, name: impl Into<String>) -> Self {
        self.entries.push(PackEntry::Dir { name: name.into() });
        self
    }

    /// Number of entries queued so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the archive to the specified path.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(path)?;
        let mut zip = ZipWriter::new(file);
        let options: FileOptions<()> = FileOptions::default().compression_method(self.compression);
        let dir_options: FileOptions<()> =
            FileOptions::default().compression_method(CompressionMethod::Stored);

        for entry in &self.entries {
            match entry {
                PackEntry::File { name, data } => {
                    let name = checked_name(name)?;
                    zip.start_file(name, options)?;
                    zip.write_all(data)?;
                }
                PackEntry::Dir { name } => {
                    let name = checked_name(name)?;
                    zip.add_directory(format!("{}/", name), dir_options)?;
                }
            }
        }

        zip.finish()?;

        Ok(path.to_path_buf())
    }
}

fn checked_name(name: &str) -> Result<String> {
    match normalize_entry_name(name) {
        Some(normalized) if !normalized.is_empty() => Ok(normalized),
        _ => Err(Error::InvalidName(name.to_string())),
    }
}

fn collect_dir(base: &Path, rel: &Path, builder: &mut PackBuilder) -> Result<()> {
    let mut children: Vec<_> = fs::read_dir(base.join(rel))?.collect::<std::io::Result<_>>()?;
    children.sort_by_key(|entry| entry.file_name());

    for entry in children {
        let file_type = entry.file_type()?;
        let child_rel = rel.join(entry.file_name());
        let name = child_rel.to_string_lossy().replace('\\', "/");

        if file_type.is_dir() {
            builder.entries.push(PackEntry::Dir { name });
            collect_dir(base, &child_rel, builder)?;
        } else if file_type.is_file() {
            let data = fs::read(entry.path())?;
            builder.entries.push(PackEntry::File { name, data });
        }
    }
    Ok(())
}
