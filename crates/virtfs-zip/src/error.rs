use thiserror::Error;

/// Errors that can occur when reading or writing zip content packs.
#[derive(Debug, Error)]
pub enum Error {
    /// The central directory could not be parsed.
    #[error("invalid zip archive: {0}")]
    InvalidArchive(String),

    /// The requested entry is not present in the index.
    #[error("missing entry: {0}")]
    MissingEntry(String),

    /// The entry failed to decompress or its checksum did not match.
    #[error("corrupt entry {name}: {reason}")]
    CorruptEntry { name: String, reason: String },

    /// An entry name that cannot be expressed as a logical path.
    #[error("invalid entry name: {0}")]
    InvalidName(String),

    /// Error from the zip library.
    #[error("zip error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    /// I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for virtfs-zip operations.
pub type Result<T> = std::result::Result<T, Error>;
