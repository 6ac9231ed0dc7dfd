//! # virtfs
//!
//! A virtual filesystem that unifies real directories and zip archives
//! behind one ordered search path.
//!
//! This crate provides:
//! - [`VirtFs`], the search-path registry (first match wins)
//! - Directory and zip drivers behind the [`Driver`] trait
//! - [`FileHandle`] over native files, decompressed buffers or platform streams
//! - A single write directory for `open_write`/`open_append`
//! - [`VfsStream`], a `Read + Seek + Write` adapter for stream consumers
//! - [`VfsConfig`], a TOML description of mounts and archive scans
//!
//! ## Example
//!
//! ```ignore
//! use virtfs::{Placement, VirtFs};
//!
//! let vfs = VirtFs::new();
//! vfs.init();
//! vfs.mount_dir("base", Placement::Append)?;
//! vfs.mount_zip("patch1.zip", Placement::Prepend)?;
//!
//! // patch1.zip shadows base for every path it contains
//! let units = vfs.load_file("data/units.xml")?;
//!
//! vfs.set_write_dir("save")?;
//! let mut out = vfs.open_write("slot1.dat")?;
//! out.write(b"progress", 1, 8)?;
//! out.close()?;
//! ```
//!
//! ## Sharing
//!
//! Every method takes `&self`. Wrap the registry in an `Arc` to share it
//! between threads; mounts and unmounts are atomic with respect to
//! concurrent lookups.

pub mod config;
pub mod driver;
pub mod error;
pub mod file;
pub mod path;
pub mod registry;
pub mod stream;

pub use config::{ArchiveScan, MountConfig, VfsConfig};
pub use driver::{DirDriver, DirEntry, Driver, EntryKind, MountKind, ZipDriver};
pub use error::{Error, Result};
pub use file::{FileHandle, PlatformStream};
pub use registry::{Lifecycle, MountInfo, Placement, VirtFs};
pub use stream::VfsStream;
