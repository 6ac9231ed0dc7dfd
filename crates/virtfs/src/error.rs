use std::io;
use std::path::Path;
use thiserror::Error;

/// Errors surfaced by the virtual filesystem.
///
/// Driver failures are translated into these variants at the driver
/// boundary; OS error codes only reach callers through [`Error::Io`] when no
/// other variant applies.
#[derive(Debug, Error)]
pub enum Error {
    /// No mounted entry provides the requested path.
    #[error("not found: {0}")]
    NotFound(String),

    /// The root is already on the search path.
    #[error("already mounted: {0}")]
    AlreadyMounted(String),

    /// The root is not on the search path.
    #[error("not mounted: {0}")]
    NotMounted(String),

    /// The root could not be mounted (missing or unreadable path).
    #[error("mount failed for {path}: {reason}")]
    MountFailed { path: String, reason: String },

    /// The zip central directory could not be parsed.
    #[error("corrupt archive {path}: {reason}")]
    CorruptArchive { path: String, reason: String },

    /// A zip entry failed decompression or its checksum.
    #[error("corrupt entry {name} in {archive}: {reason}")]
    CorruptEntry {
        archive: String,
        name: String,
        reason: String,
    },

    /// The handle or entry cannot be written to.
    #[error("read-only backing: {0}")]
    ReadOnlyBacking(String),

    /// A write operation was requested with no write directory designated.
    #[error("no write directory set")]
    NoWriteDirectory,

    /// The OS refused access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A directory was expected.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The path crosses a symbolic link while links are not permitted.
    #[error("symbolic link rejected: {0}")]
    SymlinkRejected(String),

    /// The registry is not in the initialized state.
    #[error("virtual filesystem not initialized")]
    NotInitialized,

    /// The logical path is malformed (for example it contains `..`).
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Seek past the end of a read-only handle.
    #[error("seek to {pos} past end of {len}-byte file")]
    InvalidSeek { pos: u64, len: u64 },

    /// The configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error without a more specific variant.
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Translate an OS error for `path` into the taxonomy.
    pub(crate) fn from_io(err: io::Error, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().display().to_string();
        match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound(path),
            io::ErrorKind::PermissionDenied => Error::PermissionDenied(path),
            _ => Error::Io { path, source: err },
        }
    }

    /// Translate an OS error raised while looking `path` up for reading.
    ///
    /// A component that is a regular file (`ENOTDIR`) or a name the OS
    /// cannot represent means the entry does not have the path.
    pub(crate) fn from_lookup_io(err: io::Error, path: impl AsRef<Path>) -> Self {
        match err.kind() {
            io::ErrorKind::NotADirectory | io::ErrorKind::InvalidInput => {
                Error::NotFound(path.as_ref().display().to_string())
            }
            _ => Error::from_io(err, path),
        }
    }

    /// Whether the error means "this entry does not have it", which lets a
    /// search continue with the next mounted entry.
    pub(crate) fn is_absent(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::SymlinkRejected(_))
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::NotFound(_) | Error::NotMounted(_) => io::ErrorKind::NotFound,
            Error::PermissionDenied(_)
            | Error::ReadOnlyBacking(_)
            | Error::SymlinkRejected(_) => io::ErrorKind::PermissionDenied,
            Error::AlreadyMounted(_) => io::ErrorKind::AlreadyExists,
            Error::InvalidPath(_) | Error::InvalidSeek { .. } => io::ErrorKind::InvalidInput,
            Error::CorruptArchive { .. } | Error::CorruptEntry { .. } => {
                io::ErrorKind::InvalidData
            }
            Error::Io { source, .. } => source.kind(),
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

/// Result type for virtfs operations.
pub type Result<T> = std::result::Result<T, Error>;
