use crate::driver::{DirDriver, Driver, MountKind, ZipDriver};
use crate::error::{Error, Result};
use crate::file::FileHandle;
use crate::path::{self, root_key};
use crate::stream::VfsStream;
use indexmap::IndexSet;
use log::{debug, info, trace, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Where a new mount goes on the search path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// Lowest priority: searched after everything already mounted.
    #[default]
    Append,
    /// Highest priority: shadows everything already mounted.
    Prepend,
}

/// Lifecycle of a [`VirtFs`] registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initialized,
    Deinitialized,
}

/// Public description of one search-path entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub root: String,
    pub subdir: String,
    pub kind: MountKind,
}

#[derive(Debug, Clone)]
struct MountEntry {
    /// Position in mount order, independent of placement.
    seq: u64,
    root: String,
    subdir: String,
    driver: Arc<dyn Driver>,
    dir: Option<Arc<DirDriver>>,
}

impl MountEntry {
    fn kind(&self) -> MountKind {
        self.driver.kind()
    }

    fn matches(&self, root: &str, subdir: &str, kind: MountKind) -> bool {
        self.root == root && self.subdir == subdir && self.kind() == kind
    }
}

#[derive(Debug, Clone)]
struct WriteDir {
    root: String,
    driver: Arc<DirDriver>,
}

#[derive(Debug)]
struct State {
    lifecycle: Lifecycle,
    entries: Arc<Vec<MountEntry>>,
    next_seq: u64,
    write_dir: Option<WriteDir>,
    base_dir: Option<PathBuf>,
    user_dir: Option<PathBuf>,
}

/// The search-path registry.
///
/// Logical paths resolve against the mounted entries in order, and the first
/// entry that has a path supplies all of its bytes. Queries work on a
/// snapshot of the entry list taken under a short read lock, so concurrent
/// opens never see a half-applied mount or unmount. Share it as
/// `Arc<VirtFs>`.
#[derive(Debug)]
pub struct VirtFs {
    state: RwLock<State>,
    links: Arc<AtomicBool>,
}

impl Default for VirtFs {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtFs {
    /// Create an uninitialized registry.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                lifecycle: Lifecycle::Uninitialized,
                entries: Arc::new(Vec::new()),
                next_seq: 0,
                write_dir: None,
                base_dir: None,
                user_dir: None,
            }),
            links: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Move to the initialized state and record the base and user
    /// directories. Calling it again while initialized does nothing.
    pub fn init(&self) {
        let mut state = self.state.write();
        if state.lifecycle == Lifecycle::Initialized {
            return;
        }
        state.base_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        state.user_dir = dirs::home_dir();
        state.lifecycle = Lifecycle::Initialized;
        info!("virtual filesystem initialized");
    }

    /// Unmount everything, most recently mounted first, and drop the write
    /// directory. Safe to call in any state.
    ///
    /// Handles and snapshots still held elsewhere keep their driver alive
    /// until they are dropped.
    pub fn deinit(&self) {
        let mut state = self.state.write();
        let entries = std::mem::take(&mut state.entries);
        for entry in release_order(entries) {
            debug!("unmounting {} {}", entry.kind(), entry.root);
            drop(entry);
        }
        state.write_dir = None;
        if state.lifecycle == Lifecycle::Initialized {
            state.lifecycle = Lifecycle::Deinitialized;
            info!("virtual filesystem deinitialized");
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.read().lifecycle
    }

    /// Directory containing the running executable, recorded by `init`.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.state.read().base_dir.clone()
    }

    /// The user's home directory, recorded by `init`.
    pub fn user_dir(&self) -> Option<PathBuf> {
        self.state.read().user_dir.clone()
    }

    /// Allow or forbid symbolic links in directory mounts. Applies to
    /// entries that are already mounted.
    pub fn permit_links(&self, permit: bool) {
        self.links.store(permit, Ordering::Relaxed);
    }

    pub fn links_permitted(&self) -> bool {
        self.links.load(Ordering::Relaxed)
    }

    /// Current search path, highest priority first.
    pub fn mounts(&self) -> Vec<MountInfo> {
        self.snapshot()
            .iter()
            .map(|entry| MountInfo {
                root: entry.root.clone(),
                subdir: entry.subdir.clone(),
                kind: entry.kind(),
            })
            .collect()
    }

    fn snapshot(&self) -> Arc<Vec<MountEntry>> {
        let state = self.state.read();
        if state.lifecycle == Lifecycle::Initialized {
            state.entries.clone()
        } else {
            Arc::new(Vec::new())
        }
    }

    // ------------------------------------------------------------------
    // Mounting
    // ------------------------------------------------------------------

    /// Mount a directory or zip archive, picking the driver by probing the
    /// filesystem: directories get the directory driver, files the zip
    /// driver.
    pub fn mount<P: AsRef<Path>>(&self, root: P, placement: Placement) -> Result<()> {
        let root = root.as_ref();
        if self.lifecycle() != Lifecycle::Initialized {
            return Err(Error::NotInitialized);
        }
        let meta = std::fs::metadata(root).map_err(|e| Error::MountFailed {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;
        if meta.is_dir() {
            self.mount_dir(root, placement)
        } else {
            self.mount_zip(root, placement)
        }
    }

    pub fn mount_dir<P: AsRef<Path>>(&self, root: P, placement: Placement) -> Result<()> {
        self.mount_dir_subdir(root, "", placement)
    }

    /// Mount only `subdir` of a directory as the logical root.
    pub fn mount_dir_subdir<P: AsRef<Path>>(
        &self,
        root: P,
        subdir: &str,
        placement: Placement,
    ) -> Result<()> {
        let root = root.as_ref();
        let subdir = path::normalize(subdir)?;
        self.insert(root, &subdir, MountKind::Directory, placement, || {
            let driver = Arc::new(DirDriver::new(root, &subdir, self.links.clone())?);
            Ok((driver.clone() as Arc<dyn Driver>, Some(driver)))
        })
    }

    pub fn mount_zip<P: AsRef<Path>>(&self, archive: P, placement: Placement) -> Result<()> {
        self.mount_zip_subdir(archive, "", placement)
    }

    /// Mount only `subdir` of an archive as the logical root.
    pub fn mount_zip_subdir<P: AsRef<Path>>(
        &self,
        archive: P,
        subdir: &str,
        placement: Placement,
    ) -> Result<()> {
        let archive = archive.as_ref();
        let subdir = path::normalize(subdir)?;
        self.insert(archive, &subdir, MountKind::Zip, placement, || {
            let driver = ZipDriver::new(archive, &subdir)?;
            Ok((Arc::new(driver) as Arc<dyn Driver>, None))
        })
    }

    /// Build the driver outside the lock, then publish a new entry list in
    /// one swap. A failed build leaves the search path untouched.
    fn insert<F>(
        &self,
        root: &Path,
        subdir: &str,
        kind: MountKind,
        placement: Placement,
        build: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Result<(Arc<dyn Driver>, Option<Arc<DirDriver>>)>,
    {
        let key = root_key(root);
        self.check_mountable(&key, subdir, kind)?;

        let (driver, dir) = build()?;

        let mut state = self.state.write();
        if state.lifecycle != Lifecycle::Initialized {
            return Err(Error::NotInitialized);
        }
        if state.entries.iter().any(|e| e.matches(&key, subdir, kind)) {
            debug!("{} {} already mounted", kind, key);
            return Err(Error::AlreadyMounted(key));
        }

        let entry = MountEntry {
            seq: state.next_seq,
            root: key.clone(),
            subdir: subdir.to_string(),
            driver,
            dir,
        };
        state.next_seq += 1;
        let mut entries = state.entries.as_ref().clone();
        match placement {
            Placement::Append => entries.push(entry),
            Placement::Prepend => entries.insert(0, entry),
        }
        state.entries = Arc::new(entries);

        if subdir.is_empty() {
            info!("mounted {} {} ({:?})", kind, key, placement);
        } else {
            info!("mounted {} {}:{} ({:?})", kind, key, subdir, placement);
        }
        Ok(())
    }

    fn check_mountable(&self, key: &str, subdir: &str, kind: MountKind) -> Result<()> {
        let state = self.state.read();
        if state.lifecycle != Lifecycle::Initialized {
            return Err(Error::NotInitialized);
        }
        if state.entries.iter().any(|e| e.matches(key, subdir, kind)) {
            debug!("{} {} already mounted", kind, key);
            return Err(Error::AlreadyMounted(key.to_string()));
        }
        Ok(())
    }

    /// Remove the whole-root mount of `root`, whatever its kind.
    pub fn unmount<P: AsRef<Path>>(&self, root: P) -> Result<()> {
        self.unmount_subdir(root, "")
    }

    /// Remove the mount of `subdir` inside `root`.
    pub fn unmount_subdir<P: AsRef<Path>>(&self, root: P, subdir: &str) -> Result<()> {
        let key = root_key(root.as_ref());
        let subdir = path::normalize(subdir)?;

        let mut state = self.state.write();
        if state.lifecycle != Lifecycle::Initialized {
            return Err(Error::NotInitialized);
        }
        let Some(pos) = state
            .entries
            .iter()
            .position(|e| e.root == key && e.subdir == subdir)
        else {
            warn!("unmount of {} which is not mounted", key);
            return Err(Error::NotMounted(key));
        };

        let mut entries = state.entries.as_ref().clone();
        let removed = entries.remove(pos);
        state.entries = Arc::new(entries);
        info!("unmounted {} {}", removed.kind(), key);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Whether any mounted entry has `path`. Never fails; invalid paths and
    /// unreadable entries count as absent.
    pub fn exists(&self, path: &str) -> bool {
        let Some(path) = checked(path, "exists") else {
            return false;
        };
        self.snapshot().iter().any(|e| e.driver.exists(&path))
    }

    /// Whether `path` is a directory in the first entry that has it.
    pub fn is_directory(&self, path: &str) -> bool {
        let Some(path) = checked(path, "is_directory") else {
            return false;
        };
        self.snapshot()
            .iter()
            .find_map(|e| e.driver.is_directory(&path))
            .unwrap_or(false)
    }

    /// Whether `path` is a symbolic link inside some directory mount.
    /// Always false while links are not permitted.
    pub fn is_symbolic_link(&self, path: &str) -> bool {
        if !self.links_permitted() {
            return false;
        }
        let Some(path) = checked(path, "is_symbolic_link") else {
            return false;
        };
        self.snapshot()
            .iter()
            .filter_map(|e| e.dir.as_ref())
            .any(|dir| dir.is_symbolic_link(&path))
    }

    /// Real filesystem location backing `path`: the mounted directory for
    /// directory entries, the archive file for zip entries.
    pub fn real_dir(&self, path: &str) -> Option<PathBuf> {
        let path = checked(path, "real_dir")?;
        self.snapshot().iter().find_map(|e| e.driver.real_dir(&path))
    }

    /// Names of the children of `dir`, merged across all entries. A name is
    /// listed once, in the position of its highest-priority occurrence.
    pub fn enumerate_files(&self, dir: &str) -> Vec<String> {
        self.collect(dir, "enumerate_files", |driver, dir, names| {
            driver.enumerate(dir, names)
        })
    }

    /// Like [`VirtFs::enumerate_files`], files only.
    pub fn get_files(&self, dir: &str) -> Vec<String> {
        self.collect(dir, "get_files", |driver, dir, names| {
            driver.get_files(dir, names)
        })
    }

    /// Like [`VirtFs::get_files`], with each name prefixed by `dir`.
    pub fn get_files_with_dir(&self, dir: &str) -> Vec<String> {
        let Some(normalized) = checked(dir, "get_files_with_dir") else {
            return Vec::new();
        };
        self.get_files(&normalized)
            .into_iter()
            .map(|name| path::join(&normalized, &name))
            .collect()
    }

    /// Like [`VirtFs::enumerate_files`], directories only.
    pub fn get_dirs(&self, dir: &str) -> Vec<String> {
        self.collect(dir, "get_dirs", |driver, dir, names| {
            driver.get_dirs(dir, names)
        })
    }

    fn collect<F>(&self, dir: &str, op: &str, visit: F) -> Vec<String>
    where
        F: Fn(&dyn Driver, &str, &mut IndexSet<String>),
    {
        let Some(dir) = checked(dir, op) else {
            return Vec::new();
        };
        let mut names = IndexSet::new();
        for entry in self.snapshot().iter() {
            visit(entry.driver.as_ref(), &dir, &mut names);
        }
        names.into_iter().collect()
    }

    // ------------------------------------------------------------------
    // Opening files
    // ------------------------------------------------------------------

    /// Open `path` from the first entry that has it.
    ///
    /// Once an entry reports the file, its result is final: a corrupt entry
    /// in a higher-priority archive is an error, never a fallback to a lower
    /// entry's bytes.
    pub fn open_read(&self, path: &str) -> Result<FileHandle> {
        let path = self.checked_open(path)?;
        self.first_match(&path, |driver| driver.open_read(&path))
    }

    /// Read a whole file, resolved like [`VirtFs::open_read`].
    pub fn load_file(&self, path: &str) -> Result<Vec<u8>> {
        let path = self.checked_open(path)?;
        self.first_match(&path, |driver| driver.load_file(&path))
    }

    /// Open `path` and wrap it as a standard `Read + Seek` stream.
    pub fn open_stream(&self, path: &str) -> Result<VfsStream> {
        self.open_read(path).map(VfsStream::new)
    }

    fn first_match<T, F>(&self, path: &str, open: F) -> Result<T>
    where
        F: Fn(&dyn Driver) -> Result<T>,
    {
        let mut rejected = None;
        for entry in self.snapshot().iter() {
            match open(entry.driver.as_ref()) {
                Ok(value) => {
                    trace!("{} resolved by {} {}", path, entry.kind(), entry.root);
                    return Ok(value);
                }
                Err(err @ Error::SymlinkRejected(_)) => rejected = Some(err),
                Err(err) if err.is_absent() => {}
                Err(err) => return Err(err),
            }
        }
        Err(rejected.unwrap_or_else(|| Error::NotFound(path.to_string())))
    }

    /// Create or truncate `path` in the write directory.
    pub fn open_write(&self, path: &str) -> Result<FileHandle> {
        let path = self.checked_open(path)?;
        self.write_dir_driver()?.open_write(&path)
    }

    /// Open `path` in the write directory for appending, creating it if
    /// needed.
    pub fn open_append(&self, path: &str) -> Result<FileHandle> {
        let path = self.checked_open(path)?;
        self.write_dir_driver()?.open_append(&path)
    }

    fn checked_open(&self, path: &str) -> Result<String> {
        if self.lifecycle() != Lifecycle::Initialized {
            return Err(Error::NotInitialized);
        }
        path::normalize(path).map_err(|err| {
            warn!("rejected logical path {:?}", path);
            err
        })
    }

    // ------------------------------------------------------------------
    // Write directory
    // ------------------------------------------------------------------

    /// Designate `dir` as the single write directory, replacing any previous
    /// one. The directory is also appended to the search path if it is not
    /// mounted yet.
    pub fn set_write_dir<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        let key = root_key(dir);
        if self.lifecycle() != Lifecycle::Initialized {
            return Err(Error::NotInitialized);
        }
        let driver = Arc::new(DirDriver::new(dir, "", self.links.clone())?);

        let mut state = self.state.write();
        if state.lifecycle != Lifecycle::Initialized {
            return Err(Error::NotInitialized);
        }

        let mounted = state
            .entries
            .iter()
            .any(|e| e.matches(&key, "", MountKind::Directory));
        if !mounted {
            let mut entries = state.entries.as_ref().clone();
            entries.push(MountEntry {
                seq: state.next_seq,
                root: key.clone(),
                subdir: String::new(),
                driver: driver.clone(),
                dir: Some(driver.clone()),
            });
            state.entries = Arc::new(entries);
            state.next_seq += 1;
            info!("mounted directory {} (write directory)", key);
        }

        if let Some(previous) = state.write_dir.replace(WriteDir {
            root: key.clone(),
            driver,
        }) {
            debug!("write directory {} replaced", previous.root);
        }
        info!("write directory set to {}", key);
        Ok(())
    }

    /// Root of the current write directory.
    pub fn write_dir(&self) -> Option<String> {
        self.state.read().write_dir.as_ref().map(|w| w.root.clone())
    }

    fn write_dir_driver(&self) -> Result<Arc<DirDriver>> {
        let state = self.state.read();
        if state.lifecycle != Lifecycle::Initialized {
            return Err(Error::NotInitialized);
        }
        state
            .write_dir
            .as_ref()
            .map(|w| w.driver.clone())
            .ok_or(Error::NoWriteDirectory)
    }

    /// Create a directory (and parents) inside the write directory.
    pub fn mkdir(&self, dir: &str) -> Result<()> {
        let dir = self.checked_open(dir)?;
        self.write_dir_driver()?.mkdir(&dir)
    }

    /// Remove a file or empty directory inside the write directory.
    pub fn remove(&self, path: &str) -> Result<()> {
        let path = self.checked_open(path)?;
        self.write_dir_driver()?.remove(&path)
    }

    // ------------------------------------------------------------------
    // Archive discovery
    // ------------------------------------------------------------------

    /// Mount every file in logical directory `dir` whose name ends with
    /// `ext` as a zip entry. Returns how many archives were newly mounted.
    ///
    /// Archives that are already mounted are skipped silently; archives that
    /// fail to mount are logged and skipped.
    pub fn search_and_add_archives(&self, dir: &str, ext: &str, placement: Placement) -> usize {
        let mut added = 0;
        for archive in self.find_archives(dir, ext) {
            match self.mount_zip(&archive, placement) {
                Ok(()) => added += 1,
                Err(Error::AlreadyMounted(_)) => {}
                Err(err) => warn!("skipping archive {}: {}", archive.display(), err),
            }
        }
        added
    }

    /// Unmount every archive that [`VirtFs::search_and_add_archives`] would
    /// find for the same arguments. Returns how many were removed.
    pub fn search_and_remove_archives(&self, dir: &str, ext: &str) -> usize {
        self.find_archives(dir, ext)
            .into_iter()
            .filter(|archive| self.unmount(archive).is_ok())
            .count()
    }

    fn find_archives(&self, dir: &str, ext: &str) -> IndexSet<PathBuf> {
        let Some(dir) = checked(dir, "search_archives") else {
            return IndexSet::new();
        };
        let mut found = IndexSet::new();
        for name in self.get_files(&dir) {
            if !path::has_extension(&name, ext) {
                continue;
            }
            let logical = path::join(&dir, &name);
            match self.archive_location(&logical) {
                Some(real) => {
                    found.insert(real);
                }
                None => warn!("{} is not on a real directory; not mounting", logical),
            }
        }
        found
    }

    /// Real path of a logical file that lives in a directory mount.
    fn archive_location(&self, logical: &str) -> Option<PathBuf> {
        self.snapshot().iter().find_map(|entry| {
            if !entry.driver.exists(logical) {
                return None;
            }
            let dir = entry.dir.as_ref()?;
            let mut real = dir.real_root().to_path_buf();
            if !entry.subdir.is_empty() {
                real.extend(entry.subdir.split('/'));
            }
            real.extend(logical.split('/'));
            Some(real)
        })
    }
}

/// Entries sorted for teardown: reverse of the order they were mounted in.
fn release_order(entries: Arc<Vec<MountEntry>>) -> Vec<MountEntry> {
    let mut entries = Arc::try_unwrap(entries).unwrap_or_else(|shared| shared.as_ref().clone());
    entries.sort_by(|a, b| b.seq.cmp(&a.seq));
    entries
}

fn checked(path: &str, op: &str) -> Option<String> {
    match path::normalize(path) {
        Ok(path) => Some(path),
        Err(_) => {
            warn!("{}: invalid path {:?}", op, path);
            None
        }
    }
}
