//! # virtfs-zip
//!
//! Zip archive support for the `virtfs` search path.
//!
//! This crate provides:
//! - Central directory parsing into an immutable [`ZipIndex`]
//! - Synthetic directory inference (`a/b.txt` implies directory `a`)
//! - Whole-entry decompression of stored and DEFLATE entries
//! - [`PackBuilder`] for writing content-pack archives
//!
//! ## Example
//!
//! ```ignore
//! use virtfs_zip::{PackBuilder, ZipPack};
//!
//! PackBuilder::new()
//!     .with_file("data/units.xml", b"<units/>".to_vec())
//!     .write_to("patch1.zip")?;
//!
//! let pack = ZipPack::open("patch1.zip")?;
//! assert!(pack.index().contains_dir("data"));
//! let bytes = pack.read_entry("data/units.xml")?;
//! ```

mod builder;
mod error;
mod index;
mod pack;

pub use builder::PackBuilder;
pub use error::{Error, Result};
pub use index::{normalize_entry_name, EntryKind, ZipIndex, ZipRecord};
pub use pack::ZipPack;

/// Re-exported so callers can pick entry compression without depending on `zip`.
pub use zip::CompressionMethod;
