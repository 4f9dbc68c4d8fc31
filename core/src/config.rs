//! Editor configuration
//!
//! Where the default environment block lives

use std::path::{Path, PathBuf};

/// Boot directory holding the default environment block
pub const DEFAULT_BOOT_DIR: &str = "/boot/grub";

/// File name of the environment block inside the boot directory
pub const ENVBLK_FILE_NAME: &str = "grubenv";

/// Argument that selects the default environment block path
pub const DEFAULT_PATH_ARG: &str = "-";

/// Editor configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory probed for on-block support
    pub boot_dir: PathBuf,
    /// Environment block file name inside `boot_dir`
    pub envblk_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            boot_dir: PathBuf::from(DEFAULT_BOOT_DIR),
            envblk_name: ENVBLK_FILE_NAME.to_string(),
        }
    }
}

impl Config {
    /// Config with a different boot directory
    pub fn with_boot_dir(boot_dir: impl Into<PathBuf>) -> Self {
        Self {
            boot_dir: boot_dir.into(),
            ..Default::default()
        }
    }

    pub fn default_envblk_path(&self) -> PathBuf {
        self.boot_dir.join(&self.envblk_name)
    }

    /// Path named on the command line; absent or `-` means the default
    pub fn resolve(&self, filename: Option<&str>) -> PathBuf {
        match filename {
            None | Some(DEFAULT_PATH_ARG) => self.default_envblk_path(),
            Some(name) => PathBuf::from(name),
        }
    }

    /// Probing is limited to the default block; other files are assumed not
    /// to sit on a filesystem with a reserved region
    pub fn should_probe(&self, path: &Path) -> bool {
        path == self.default_envblk_path()
    }
}
