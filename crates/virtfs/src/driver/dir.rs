use super::{DirEntry, Driver, EntryKind, MountKind};
use crate::error::{Error, Result};
use crate::file::FileHandle;
use log::{trace, warn};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A real directory subtree exposed as a mount.
///
/// While symbolic links are not permitted, every component between the
/// mount root and the target is checked with `symlink_metadata`; a link
/// anywhere on that walk makes the path absent. The root itself may be a
/// link.
#[derive(Debug)]
pub struct DirDriver {
    real_root: PathBuf,
    base: PathBuf,
    links: Arc<AtomicBool>,
}

impl DirDriver {
    /// Mount `root`, optionally narrowed to `subdir` inside it.
    pub fn new(root: &Path, subdir: &str, links: Arc<AtomicBool>) -> Result<Self> {
        let meta = fs::metadata(root).map_err(|e| Error::MountFailed {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;
        if !meta.is_dir() {
            return Err(Error::NotADirectory(root.display().to_string()));
        }

        let real_root = std::path::absolute(root).map_err(|e| Error::MountFailed {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut driver = Self {
            base: real_root.clone(),
            real_root,
            links,
        };
        if !subdir.is_empty() {
            let base = driver.resolve(subdir, true)?;
            if !base.is_dir() {
                return Err(Error::NotADirectory(base.display().to_string()));
            }
            driver.base = base;
        }
        Ok(driver)
    }

    /// Absolute path of the mounted root (without any subdir).
    pub fn real_root(&self) -> &Path {
        &self.real_root
    }

    fn links_permitted(&self) -> bool {
        self.links.load(Ordering::Relaxed)
    }

    /// Compose the real path for a logical path.
    ///
    /// With `must_exist` false, missing trailing components are accepted so
    /// that files can be created.
    fn resolve(&self, path: &str, must_exist: bool) -> Result<PathBuf> {
        let mut real = self.base.clone();
        let check_links = !self.links_permitted();
        let mut missing = false;

        for part in path.split('/').filter(|p| !p.is_empty()) {
            real.push(part);
            if missing || !(check_links || must_exist) {
                continue;
            }
            match fs::symlink_metadata(&real) {
                Ok(meta) if check_links && meta.file_type().is_symlink() => {
                    trace!("rejecting symlink {}", real.display());
                    return Err(Error::SymlinkRejected(path.to_string()));
                }
                Ok(_) => {}
                Err(_) if !must_exist => missing = true,
                Err(e) => return Err(Error::from_lookup_io(e, path)),
            }
        }
        Ok(real)
    }

    fn open_with(&self, path: &str, options: &OpenOptions, writable: bool) -> Result<FileHandle> {
        let real = self.resolve(path, false)?;
        if real.is_dir() {
            return Err(Error::NotFound(path.to_string()));
        }
        if let Some(parent) = real.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::from_io(e, path))?;
        }
        let file = options.open(&real).map_err(|e| Error::from_io(e, path))?;
        Ok(FileHandle::native(path, file, writable))
    }

    /// Whether the final component of `path` is a symbolic link. Always false
    /// while links are not permitted.
    pub fn is_symbolic_link(&self, path: &str) -> bool {
        if !self.links_permitted() {
            return false;
        }
        match self.resolve(path, false) {
            Ok(real) => fs::symlink_metadata(real)
                .map(|meta| meta.file_type().is_symlink())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Create `path` and any missing parents.
    pub fn mkdir(&self, path: &str) -> Result<()> {
        let real = self.resolve(path, false)?;
        fs::create_dir_all(&real).map_err(|e| Error::from_io(e, path))
    }

    /// Remove a file or an empty directory.
    pub fn remove(&self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(Error::InvalidPath(path.to_string()));
        }
        let real = self.resolve(path, true)?;
        let meta = fs::symlink_metadata(&real).map_err(|e| Error::from_io(e, path))?;
        let result = if meta.is_dir() {
            fs::remove_dir(&real)
        } else {
            fs::remove_file(&real)
        };
        result.map_err(|e| Error::from_io(e, path))
    }
}

impl Driver for DirDriver {
    fn kind(&self) -> MountKind {
        MountKind::Directory
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path, true)
            .map(|real| fs::metadata(real).is_ok())
            .unwrap_or(false)
    }

    fn is_directory(&self, path: &str) -> Option<bool> {
        let real = self.resolve(path, true).ok()?;
        fs::metadata(real).ok().map(|meta| meta.is_dir())
    }

    fn open_read(&self, path: &str) -> Result<FileHandle> {
        let real = self.resolve(path, true)?;
        let meta = fs::metadata(&real).map_err(|e| Error::from_lookup_io(e, path))?;
        if meta.is_dir() {
            return Err(Error::NotFound(path.to_string()));
        }
        let file = File::open(&real).map_err(|e| Error::from_lookup_io(e, path))?;
        trace!("open {} -> {}", path, real.display());
        Ok(FileHandle::native(path, file, false))
    }

    fn open_write(&self, path: &str) -> Result<FileHandle> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        self.open_with(path, &options, true)
    }

    fn open_append(&self, path: &str) -> Result<FileHandle> {
        let mut options = OpenOptions::new();
        options.append(true).create(true);
        self.open_with(path, &options, true)
    }

    fn list(&self, dir: &str) -> Vec<DirEntry> {
        let Ok(real) = self.resolve(dir, true) else {
            return Vec::new();
        };
        let Ok(read_dir) = fs::read_dir(&real) else {
            return Vec::new();
        };

        let permit = self.links_permitted();
        let mut entries = Vec::new();
        for entry in read_dir.flatten() {
            let Ok(name) = entry.file_name().into_string() else {
                warn!("skipping non UTF-8 name in {}", real.display());
                continue;
            };
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let is_dir = if file_type.is_symlink() {
                if !permit {
                    continue;
                }
                match fs::metadata(entry.path()) {
                    Ok(meta) => meta.is_dir(),
                    Err(_) => continue,
                }
            } else {
                file_type.is_dir()
            };
            entries.push(DirEntry {
                name,
                kind: if is_dir {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
            });
        }
        entries
    }

    fn real_dir(&self, path: &str) -> Option<PathBuf> {
        self.exists(path).then(|| self.real_root.clone())
    }

    fn load_file(&self, path: &str) -> Result<Vec<u8>> {
        let real = self.resolve(path, true)?;
        if real.is_dir() {
            return Err(Error::NotFound(path.to_string()));
        }
        fs::read(&real).map_err(|e| Error::from_lookup_io(e, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn driver(root: &Path) -> DirDriver {
        DirDriver::new(root, "", Arc::new(AtomicBool::new(false))).unwrap()
    }

    #[test]
    fn test_exists_and_open() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data/units.xml"), b"<units/>").unwrap();

        let driver = driver(dir.path());
        assert!(driver.exists("data/units.xml"));
        assert!(driver.exists("data"));
        assert!(driver.exists(""));
        assert!(!driver.exists("data/missing.xml"));
        assert_eq!(driver.is_directory("data"), Some(true));
        assert_eq!(driver.is_directory("data/units.xml"), Some(false));
        assert_eq!(driver.is_directory("nothing"), None);

        let mut handle = driver.open_read("data/units.xml").unwrap();
        assert_eq!(handle.read_to_end().unwrap(), b"<units/>");
        assert!(matches!(driver.open_read("data"), Err(Error::NotFound(_))));
        assert!(matches!(driver.open_read("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_mount_rejects_file_root() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, b"x").unwrap();

        let links = Arc::new(AtomicBool::new(false));
        let err = DirDriver::new(&file, "", links.clone()).unwrap_err();
        assert!(matches!(err, Error::NotADirectory(_)));

        let err = DirDriver::new(&dir.path().join("missing"), "", links).unwrap_err();
        assert!(matches!(err, Error::MountFailed { .. }));
    }

    #[test]
    fn test_subdir_mount() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("client/data")).unwrap();
        fs::write(dir.path().join("client/data/a.txt"), b"a").unwrap();

        let links = Arc::new(AtomicBool::new(false));
        let driver = DirDriver::new(dir.path(), "client", links).unwrap();
        assert!(driver.exists("data/a.txt"));
        assert!(!driver.exists("client/data/a.txt"));
        assert_eq!(
            driver.real_dir("data/a.txt"),
            Some(std::path::absolute(dir.path()).unwrap())
        );
    }

    #[test]
    fn test_list_kinds() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("maps")).unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let driver = driver(dir.path());
        let mut files = indexmap::IndexSet::new();
        driver.get_files("", &mut files);
        let files: Vec<String> = files.into_iter().collect();
        assert_eq!(files, vec!["a.txt".to_string()]);

        let mut dirs = indexmap::IndexSet::new();
        driver.get_dirs("", &mut dirs);
        let dirs: Vec<String> = dirs.into_iter().collect();
        assert_eq!(dirs, vec!["maps".to_string()]);

        let mut all = indexmap::IndexSet::new();
        driver.enumerate("", &mut all);
        let mut all: Vec<String> = all.into_iter().collect();
        all.sort();
        assert_eq!(all, vec!["a.txt".to_string(), "maps".to_string()]);
        assert!(driver.list("missing").is_empty());
    }

    #[test]
    fn test_write_creates_parents_and_remove() {
        let dir = tempdir().unwrap();
        let driver = driver(dir.path());

        let mut handle = driver.open_write("config/settings.xml").unwrap();
        handle.write(b"<settings/>", 1, 11).unwrap();
        handle.close().unwrap();

        let mut handle = driver.open_append("config/settings.xml").unwrap();
        handle.write(b"!", 1, 1).unwrap();
        handle.close().unwrap();

        assert_eq!(
            fs::read(dir.path().join("config/settings.xml")).unwrap(),
            b"<settings/>!"
        );

        driver.mkdir("screenshots/2026").unwrap();
        assert!(dir.path().join("screenshots/2026").is_dir());
        driver.remove("screenshots/2026").unwrap();
        assert!(!dir.path().join("screenshots/2026").exists());
        driver.remove("config/settings.xml").unwrap();
        assert!(matches!(
            driver.remove("config/settings.xml"),
            Err(Error::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_follow_policy() {
        let outside = tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), b"secret").unwrap();

        let dir = tempdir().unwrap();
        fs::write(dir.path().join("normal.txt"), b"ok").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();

        let links = Arc::new(AtomicBool::new(false));
        let driver = DirDriver::new(dir.path(), "", links.clone()).unwrap();

        assert!(!driver.exists("escape/secret.txt"));
        assert!(!driver.exists("escape"));
        assert!(!driver.is_symbolic_link("escape"));
        assert!(matches!(
            driver.open_read("escape/secret.txt"),
            Err(Error::SymlinkRejected(_))
        ));
        assert!(matches!(
            driver.open_write("escape/new.txt"),
            Err(Error::SymlinkRejected(_))
        ));
        let names: Vec<_> = driver.list("").into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["normal.txt".to_string()]);

        links.store(true, Ordering::Relaxed);
        assert!(driver.exists("escape/secret.txt"));
        assert!(driver.is_symbolic_link("escape"));
        assert_eq!(driver.list("").len(), 2);
    }
}
