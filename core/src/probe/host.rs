// Linux host topology: mountinfo, sysfs and superblock sniffing
//
// Multi-device btrfs lists its members under /sys/fs/btrfs/<fsid>/devices;
// every member is a root device for the abstraction check.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::fs_detect::detect_filesystem;
use super::{DeviceTopology, DiskDriver, Drive, ProbeError};
use crate::error::EditEnvError;
use crate::store::device::FileBlockDevice;

const MOUNTINFO: &str = "/proc/self/mountinfo";
const SYS_DIR: &str = "/sys";
const DEV_DIR: &str = "/dev";

/// One line of `/proc/self/mountinfo`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub mount_point: PathBuf,
    pub fs_type: String,
    pub source: String,
}

impl MountEntry {
    /// Parse `id parent maj:min root mount-point opts [optional...] - fstype source superopts`
    pub fn parse(line: &str) -> Option<Self> {
        let (head, tail) = line.split_once(" - ")?;
        let mount_point = head.split(' ').nth(4)?;

        let mut tail = tail.split(' ');
        let fs_type = tail.next()?;
        let source = tail.next()?;

        Some(Self {
            mount_point: PathBuf::from(unescape(mount_point)),
            fs_type: fs_type.to_string(),
            source: unescape(source),
        })
    }
}

/// Undo the octal escapes (`\040` etc.) mountinfo uses for blanks
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let code = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(code) = u8::try_from(code) {
                    out.push(code);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Device queries against the running Linux host
#[derive(Debug, Clone)]
pub struct HostTopology {
    mountinfo: PathBuf,
    sys_dir: PathBuf,
    dev_dir: PathBuf,
}

impl Default for HostTopology {
    fn default() -> Self {
        Self {
            mountinfo: PathBuf::from(MOUNTINFO),
            sys_dir: PathBuf::from(SYS_DIR),
            dev_dir: PathBuf::from(DEV_DIR),
        }
    }
}

impl HostTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Topology rooted somewhere other than `/proc`, `/sys` and `/dev`
    pub fn with_roots(mountinfo: &Path, sys_dir: &Path, dev_dir: &Path) -> Self {
        Self {
            mountinfo: mountinfo.to_path_buf(),
            sys_dir: sys_dir.to_path_buf(),
            dev_dir: dev_dir.to_path_buf(),
        }
    }

    fn mounts(&self) -> Option<Vec<MountEntry>> {
        let text = fs::read_to_string(&self.mountinfo).ok()?;
        Some(text.lines().filter_map(MountEntry::parse).collect())
    }

    /// Mount with the longest mount point containing `dir`
    pub fn mount_for(&self, dir: &Path) -> Option<MountEntry> {
        let dir = fs::canonicalize(dir).ok()?;
        self.mounts()?
            .into_iter()
            .filter(|m| dir.starts_with(&m.mount_point))
            .max_by_key(|m| m.mount_point.components().count())
    }

    fn classify(&self, name: &str) -> DiskDriver {
        if name.starts_with("md") {
            return DiskDriver::DiskFilter;
        }
        if !name.starts_with("dm-") {
            return DiskDriver::Plain;
        }

        // Any device-mapper target other than dm-crypt remaps sectors too
        let uuid = fs::read_to_string(
            self.sys_dir
                .join("class/block")
                .join(name)
                .join("dm/uuid"),
        )
        .unwrap_or_default();
        if uuid.starts_with("CRYPT-") {
            DiskDriver::CryptoDisk
        } else {
            DiskDriver::DiskFilter
        }
    }

    /// Other members of the btrfs filesystem that `source` belongs to, sorted
    fn btrfs_members(&self, source: &Path) -> Vec<PathBuf> {
        let Some(own) = kernel_name(source) else {
            return Vec::new();
        };
        let Ok(filesystems) = fs::read_dir(self.sys_dir.join("fs/btrfs")) else {
            return Vec::new();
        };

        for fsid in filesystems.flatten() {
            // /sys/fs/btrfs/features has no devices directory
            let Ok(devices) = fs::read_dir(fsid.path().join("devices")) else {
                continue;
            };
            let mut names: Vec<String> = devices
                .flatten()
                .filter_map(|dev| dev.file_name().into_string().ok())
                .collect();
            if !names.contains(&own) {
                continue;
            }

            names.sort_unstable();
            return names
                .into_iter()
                .filter(|name| *name != own)
                .map(|name| self.dev_dir.join(name))
                .collect();
        }
        Vec::new()
    }
}

/// Kernel block device name behind a device path
///
/// `/dev/mapper/*` and `/dev/disk/by-*` are symlinks to the kernel node.
fn kernel_name(device: &Path) -> Option<String> {
    let node = fs::canonicalize(device).ok()?;
    node.file_name()?.to_str().map(str::to_string)
}

impl DeviceTopology for HostTopology {
    fn root_devices(&self, dir: &Path) -> Result<Vec<PathBuf>, ProbeError> {
        let no_device = || ProbeError::NoDevice(dir.to_path_buf());
        let mount = self.mount_for(dir).ok_or_else(no_device)?;
        debug!(mount_point = %mount.mount_point.display(), source = %mount.source, fs = %mount.fs_type, "resolved mount");

        if !mount.source.starts_with('/') {
            return Err(no_device());
        }

        let source = PathBuf::from(mount.source);
        let mut devices = Vec::new();
        if mount.fs_type == "btrfs" {
            devices = self.btrfs_members(&source);
            debug!(members = devices.len(), "additional btrfs devices");
        }
        devices.insert(0, source);
        Ok(devices)
    }

    fn drive_name(&self, device: &Path) -> Option<String> {
        kernel_name(device)
    }

    fn open_drive(&self, name: &str) -> Result<Drive, ProbeError> {
        let device = self.dev_dir.join(name);
        fs::metadata(&device).map_err(|e| ProbeError::Open {
            drive: name.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Drive {
            name: name.to_string(),
            device,
            driver: self.classify(name),
        })
    }

    fn probe_fs(&self, drive: &Drive) -> Result<String, ProbeError> {
        let failed = |reason: String| ProbeError::Filesystem {
            drive: drive.name.clone(),
            reason,
        };

        let mut dev = FileBlockDevice::open(&drive.device).map_err(|e| match e {
            EditEnvError::Io { source, .. } => failed(source.to_string()),
            other => failed(other.to_string()),
        })?;
        match detect_filesystem(&mut dev) {
            Ok(Some(fs_name)) => Ok(fs_name.to_string()),
            Ok(None) => Err(failed("unknown filesystem".to_string())),
            Err(e) => Err(failed(e.to_string())),
        }
    }
}
