//! TOML description of a search path.
//!
//! ```toml
//! permit_links = false
//! write_dir = "save"
//!
//! [[mount]]
//! path = "data"
//!
//! [[mount]]
//! path = "patches/patch1.zip"
//! placement = "prepend"
//!
//! [[archives]]
//! dir = "mods"
//! ext = ".zip"
//! ```

use crate::error::{Error, Result};
use crate::registry::{Placement, VirtFs};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VfsConfig {
    /// Allow symbolic links inside directory mounts.
    #[serde(default)]
    pub permit_links: bool,

    /// Directory that receives writes. Mounted too if not listed below.
    #[serde(default)]
    pub write_dir: Option<PathBuf>,

    /// Explicit mounts, applied in order.
    #[serde(default, rename = "mount")]
    pub mounts: Vec<MountConfig>,

    /// Logical directories scanned for archives after the mounts are in
    /// place.
    #[serde(default)]
    pub archives: Vec<ArchiveScan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Directory or zip archive on the real filesystem.
    pub path: PathBuf,

    #[serde(default)]
    pub subdir: String,

    #[serde(default)]
    pub placement: Placement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveScan {
    /// Logical directory to scan.
    pub dir: String,

    #[serde(default = "default_archive_ext")]
    pub ext: String,

    #[serde(default)]
    pub placement: Placement,
}

fn default_archive_ext() -> String {
    ".zip".to_string()
}

impl VfsConfig {
    /// Parse a config from TOML bytes.
    pub fn from_toml(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data).map_err(|e| Error::Config(e.to_string()))?;
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read a config file. Relative mount and write directory paths are
    /// taken relative to the file's directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_toml(&data)?;
        if let Some(base) = path.parent() {
            config.resolve_relative(base);
        }
        Ok(config)
    }

    fn resolve_relative(&mut self, base: &Path) {
        for mount in &mut self.mounts {
            if mount.path.is_relative() {
                mount.path = base.join(&mount.path);
            }
        }
        if let Some(dir) = self.write_dir.as_mut() {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }
}

impl VirtFs {
    /// Apply a config: link policy, then mounts in order, then the write
    /// directory, then archive scans.
    ///
    /// Roots that are already mounted are skipped. Any other mount failure
    /// stops the apply and is returned; earlier mounts stay in place.
    pub fn apply_config(&self, config: &VfsConfig) -> Result<()> {
        self.permit_links(config.permit_links);

        for mount in &config.mounts {
            let result = if mount.subdir.is_empty() {
                self.mount(&mount.path, mount.placement)
            } else if mount.path.is_dir() {
                self.mount_dir_subdir(&mount.path, &mount.subdir, mount.placement)
            } else {
                self.mount_zip_subdir(&mount.path, &mount.subdir, mount.placement)
            };
            match result {
                Ok(()) => {}
                Err(Error::AlreadyMounted(root)) => debug!("{} already mounted, skipping", root),
                Err(err) => return Err(err),
            }
        }

        if let Some(dir) = &config.write_dir {
            self.set_write_dir(dir)?;
        }

        for scan in &config.archives {
            let added = self.search_and_add_archives(&scan.dir, &scan.ext, scan.placement);
            info!("{} archive(s) added from {}", added, scan.dir);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_full_config() {
        let config = VfsConfig::from_toml(
            br#"
permit_links = true
write_dir = "/tmp/save"

[[mount]]
path = "data"

[[mount]]
path = "patch1.zip"
subdir = "data"
placement = "prepend"

[[archives]]
dir = "mods"
"#,
        )
        .unwrap();

        assert!(config.permit_links);
        assert_eq!(config.write_dir, Some(PathBuf::from("/tmp/save")));
        assert_eq!(config.mounts.len(), 2);
        assert_eq!(config.mounts[0].placement, Placement::Append);
        assert_eq!(config.mounts[1].placement, Placement::Prepend);
        assert_eq!(config.mounts[1].subdir, "data");
        assert_eq!(config.archives[0].ext, ".zip");
    }

    #[test]
    fn test_empty_config_defaults() {
        let config = VfsConfig::from_toml(b"").unwrap();
        assert!(!config.permit_links);
        assert!(config.write_dir.is_none());
        assert!(config.mounts.is_empty());
        assert!(config.archives.is_empty());
    }

    #[test]
    fn test_bad_placement_is_config_error() {
        let err = VfsConfig::from_toml(b"[[mount]]\npath = \"a\"\nplacement = \"middle\"\n")
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("virtfs.toml");
        fs::write(
            &file,
            "write_dir = \"save\"\n[[mount]]\npath = \"data\"\n[[mount]]\npath = \"/abs\"\n",
        )
        .unwrap();

        let config = VfsConfig::load(&file).unwrap();
        assert_eq!(config.mounts[0].path, dir.path().join("data"));
        assert_eq!(config.mounts[1].path, PathBuf::from("/abs"));
        assert_eq!(config.write_dir, Some(dir.path().join("save")));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = VfsConfig::load(dir.path().join("none.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
