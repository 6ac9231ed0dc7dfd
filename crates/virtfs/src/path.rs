//! Logical path handling.
//!
//! Logical paths are `/`-separated and relative to every mounted root.
//! Backslashes are accepted as separators on input. Case is preserved and
//! compared exactly; whether `Data/A.xml` and `data/a.xml` are the same file
//! is decided by the entry that answers the lookup (the host filesystem for
//! directories, exact match for zip archives).

use crate::error::{Error, Result};
use std::path::Path;

/// Normalize a logical path.
///
/// Empty and `.` components are dropped, so `"/a//./b/"` becomes `"a/b"`
/// and the root is the empty string. A `..` component makes the path invalid.
pub fn normalize(path: &str) -> Result<String> {
    let mut parts = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => return Err(Error::InvalidPath(path.to_string())),
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

/// Join two normalized logical paths.
pub fn join(dir: &str, name: &str) -> String {
    match (dir.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (_, true) => dir.to_string(),
        _ => format!("{}/{}", dir, name),
    }
}

/// Canonical identity string for a mount root as given by the caller.
///
/// Separators are unified to `/` and trailing separators removed, so
/// `"data/"` and `"data"` name the same mount.
pub fn root_key(root: &Path) -> String {
    let text = root.to_string_lossy().replace('\\', "/");
    let trimmed = text.trim_end_matches('/');
    if trimmed.is_empty() && text.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Whether `name` ends with `ext` and has at least one character before it.
pub fn has_extension(name: &str, ext: &str) -> bool {
    name.len() > ext.len() && name.ends_with(ext)
}
