use crate::error::Result;
use indexmap::IndexMap;
use log::{debug, warn};
use std::io::{Read, Seek};
use zip::{CompressionMethod, ZipArchive};

/// Kind of a child entry inside a directory listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// Location and size information for one file inside an archive.
#[derive(Debug, Clone)]
pub struct ZipRecord {
    /// Position of the entry in the central directory.
    pub index: usize,
    /// Byte offset of the entry data within the archive.
    pub offset: u64,
    /// Size of the stored (possibly compressed) data.
    pub compressed_size: u64,
    /// Size after decompression.
    pub uncompressed_size: u64,
    /// Compression method used for this entry.
    pub compression: CompressionMethod,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
}

/// Immutable lookup table built from an archive's central directory.
///
/// Keys are normalized relative paths (`/`-separated, no leading or trailing
/// separator). Lookups are exact and therefore case-sensitive. Every parent
/// of a file is registered as a directory, so `a/b.txt` implies `a`.
#[derive(Debug, Clone)]
pub struct ZipIndex {
    files: IndexMap<String, ZipRecord>,
    dirs: IndexMap<String, IndexMap<String, EntryKind>>,
}

impl Default for ZipIndex {
    fn default() -> Self {
        let mut dirs = IndexMap::new();
        dirs.insert(String::new(), IndexMap::new());
        Self {
            files: IndexMap::new(),
            dirs,
        }
    }
}

impl ZipIndex {
    /// Build the index by walking every central directory record.
    pub fn from_archive<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Self> {
        let mut index = Self::default();

        for i in 0..archive.len() {
            let file = archive.by_index_raw(i)?;
            let raw_name = file.name().to_string();
            let Some(name) = normalize_entry_name(&raw_name) else {
                warn!("skipping zip entry with unusable name: {}", raw_name);
                continue;
            };

            if file.is_dir() || raw_name.ends_with('/') || raw_name.ends_with('\\') {
                index.insert_dir(&name);
                continue;
            }

            let record = ZipRecord {
                index: i,
                offset: file.data_start(),
                compressed_size: file.compressed_size(),
                uncompressed_size: file.size(),
                compression: file.compression(),
                crc32: file.crc32(),
            };
            index.insert_file(name, record);
        }

        debug!(
            "indexed {} files and {} directories",
            index.files.len(),
            index.dirs.len()
        );
        Ok(index)
    }

    pub(crate) fn insert_file(&mut self, name: String, record: ZipRecord) {
        if name.is_empty() || self.files.contains_key(&name) || self.dirs.contains_key(&name) {
            return;
        }
        let (parent, leaf) = split_parent(&name);
        self.insert_dir(parent);
        if let Some(children) = self.dirs.get_mut(parent) {
            children.entry(leaf.to_string()).or_insert(EntryKind::File);
        }
        self.files.insert(name, record);
    }

    pub(crate) fn insert_dir(&mut self, name: &str) {
        if self.dirs.contains_key(name) {
            return;
        }
        let (parent, leaf) = split_parent(name);
        self.insert_dir(parent);
        if let Some(children) = self.dirs.get_mut(parent) {
            children
                .entry(leaf.to_string())
                .or_insert(EntryKind::Directory);
        }
        self.dirs.insert(name.to_string(), IndexMap::new());
    }

    /// Look up a file record.
    pub fn record(&self, path: &str) -> Option<&ZipRecord> {
        self.files.get(path)
    }

    /// Whether `path` names a file in the archive.
    pub fn contains_file(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Whether `path` names an explicit or implied directory. The empty path
    /// is the archive root.
    pub fn contains_dir(&self, path: &str) -> bool {
        self.dirs.contains_key(path)
    }

    /// Immediate children of a directory in archive order.
    pub fn children(&self, dir: &str) -> impl Iterator<Item = (&str, EntryKind)> + '_ {
        self.dirs
            .get(dir)
            .into_iter()
            .flat_map(|children| children.iter().map(|(name, kind)| (name.as_str(), *kind)))
    }

    /// All file paths in archive order.
    pub fn files(&self) -> impl Iterator<Item = (&str, &ZipRecord)> + '_ {
        self.files.iter().map(|(name, record)| (name.as_str(), record))
    }

    /// Number of file entries.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Convert a raw zip entry name into a normalized relative path.
///
/// Backslashes are treated as separators, empty and `.` components are
/// dropped. Returns `None` for names containing `..`.
pub fn normalize_entry_name(name: &str) -> Option<String> {
    let mut parts = Vec::new();
    for part in name.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => return None,
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: usize) -> ZipRecord {
        ZipRecord {
            index,
            offset: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            compression: CompressionMethod::Stored,
            crc32: 0,
        }
    }

    #[test]
    fn test_normalize_entry_name() {
        assert_eq!(normalize_entry_name("a/b.txt"), Some("a/b.txt".to_string()));
        assert_eq!(normalize_entry_name("a\\b\\c.txt"), Some("a/b/c.txt".to_string()));
        assert_eq!(normalize_entry_name("./a//b/"), Some("a/b".to_string()));
        assert_eq!(normalize_entry_name("a/../b"), None);
    }

    #[test]
    fn test_implied_directories() {
        let mut index = ZipIndex::default();
        index.insert_file("a/b/c.txt".to_string(), record(0));

        assert!(index.contains_dir(""));
        assert!(index.contains_dir("a"));
        assert!(index.contains_dir("a/b"));
        assert!(index.contains_file("a/b/c.txt"));
        assert!(!index.contains_file("a/b"));

        let root: Vec<_> = index.children("").collect();
        assert_eq!(root, vec![("a", EntryKind::Directory)]);
        let leaf: Vec<_> = index.children("a/b").collect();
        assert_eq!(leaf, vec![("c.txt", EntryKind::File)]);
    }

    #[test]
    fn test_children_keep_archive_order() {
        let mut index = ZipIndex::default();
        index.insert_file("z.txt".to_string(), record(0));
        index.insert_dir("m");
        index.insert_file("a.txt".to_string(), record(1));
        index.insert_file("m/inner.txt".to_string(), record(2));

        let names: Vec<_> = index.children("").map(|(name, _)| name).collect();
        assert_eq!(names, vec!["z.txt", "m", "a.txt"]);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_duplicate_file_keeps_first() {
        let mut index = ZipIndex::default();
        index.insert_file("dup.txt".to_string(), record(0));
        index.insert_file("dup.txt".to_string(), record(5));

        assert_eq!(index.record("dup.txt").map(|r| r.index), Some(0));
        assert_eq!(index.children("").count(), 1);
    }

    #[test]
    fn test_unknown_directory_has_no_children() {
        let index = ZipIndex::default();
        assert_eq!(index.children("missing").count(), 0);
        assert!(index.is_empty());
    }
}
