//! Device abstraction probe
//!
//! Decides whether the on-block copy may be used for the filesystem holding
//! a directory. Raw sector writes are only safe when the filesystem sits
//! directly on plain disks: below a RAID/LVM layer or an encrypted mapping
//! the bytes would land in the wrong place, or corrupt the layer's own
//! metadata.
//!
//! Host device handling is behind [`DeviceTopology`]; this module only
//! implements the decision. Every failure degrades to [`Placement::FileOnly`]
//! with a warning.

pub mod fs_detect;
pub mod host;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::store::device::SECTOR_SIZE;
use crate::store::{Placement, RawRegion};

pub use host::HostTopology;

/// Raw region a filesystem keeps free for the bootloader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedRegion {
    pub fs_name: &'static str,
    /// Byte offset from the start of the device
    pub offset: u64,
    /// Region size in bytes
    pub size: usize,
}

/// Filesystems with a reserved environment region
pub const RESERVED_REGIONS: &[ReservedRegion] = &[ReservedRegion {
    fs_name: "btrfs",
    offset: 256 * 1024,
    size: SECTOR_SIZE,
}];

/// Table lookup by filesystem name
pub fn reserved_region(fs_name: &str) -> Option<&'static ReservedRegion> {
    RESERVED_REGIONS.iter().find(|r| r.fs_name == fs_name)
}

/// Disk driver class of an opened drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskDriver {
    /// Partition or whole disk
    Plain,
    /// Software RAID or volume manager
    DiskFilter,
    /// Transparent encryption
    CryptoDisk,
}

impl DiskDriver {
    pub fn is_abstraction(self) -> bool {
        matches!(self, Self::DiskFilter | Self::CryptoDisk)
    }
}

/// An opened bootloader drive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drive {
    pub name: String,
    pub device: PathBuf,
    pub driver: DiskDriver,
}

/// Probe failures; never fatal
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("cannot find a device for {} (is /dev mounted?)", .0.display())]
    NoDevice(PathBuf),

    #[error("cannot find a GRUB drive for {}.  Check your device.map", .0.display())]
    NoDrive(PathBuf),

    #[error("cannot open device {drive}: {reason}")]
    Open { drive: String, reason: String },

    #[error("cannot probe fs for {drive}: {reason}")]
    Filesystem { drive: String, reason: String },
}

/// Host device queries the probe needs
pub trait DeviceTopology {
    /// Host devices backing the filesystem that holds `dir`
    fn root_devices(&self, dir: &Path) -> Result<Vec<PathBuf>, ProbeError>;

    /// Bootloader drive name of a host device
    fn drive_name(&self, device: &Path) -> Option<String>;

    fn open_drive(&self, name: &str) -> Result<Drive, ProbeError>;

    /// Filesystem type name on an opened drive
    fn probe_fs(&self, drive: &Drive) -> Result<String, ProbeError>;
}

/// Outcome of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    /// First host device; the on-block copy is addressed on it
    pub device: PathBuf,
    pub fs_type: String,
    /// Some drive sits below a RAID, LVM or encryption layer
    pub has_abstraction: bool,
}

impl ProbeReport {
    pub fn reserved_region(&self) -> Option<&'static ReservedRegion> {
        reserved_region(&self.fs_type)
    }

    /// On-block support needs plain disks and a filesystem with a reserved region
    pub fn placement(&self) -> Placement {
        if self.has_abstraction {
            debug!(device = %self.device.display(), "device abstraction present, on-block environment disabled");
            return Placement::FileOnly;
        }

        match self.reserved_region() {
            Some(region) => Placement::FileAndBlock(RawRegion {
                device: self.device.clone(),
                region: *region,
            }),
            None => {
                debug!(fs = %self.fs_type, "filesystem has no reserved environment region");
                Placement::FileOnly
            }
        }
    }
}

/// Inspect the devices under `dir`
pub fn probe<T: DeviceTopology + ?Sized>(topology: &T, dir: &Path) -> Result<ProbeReport, ProbeError> {
    let devices = topology.root_devices(dir)?;
    let Some(first) = devices.first() else {
        return Err(ProbeError::NoDevice(dir.to_path_buf()));
    };

    let drives = devices
        .iter()
        .map(|dev| {
            topology
                .drive_name(dev)
                .ok_or_else(|| ProbeError::NoDrive(dev.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let root = topology.open_drive(&drives[0])?;
    let fs_type = topology.probe_fs(&root)?;

    let mut has_abstraction = root.driver.is_abstraction();
    for name in &drives[1..] {
        if has_abstraction {
            break;
        }
        // Drives that fail to open cannot veto the others
        match topology.open_drive(name) {
            Ok(drive) => has_abstraction = drive.driver.is_abstraction(),
            Err(err) => debug!(drive = %name, "skipping drive: {err}"),
        }
    }

    debug!(device = %first.display(), fs = %fs_type, has_abstraction, "probed root device");
    Ok(ProbeReport {
        device: first.clone(),
        fs_type,
        has_abstraction,
    })
}

/// Placement for the env block under `dir`; probe failures fall back to file only
pub fn resolve_placement<T: DeviceTopology + ?Sized>(topology: &T, dir: &Path) -> Placement {
    match probe(topology, dir) {
        Ok(report) => report.placement(),
        Err(err) => {
            warn!("{err}");
            Placement::FileOnly
        }
    }
}
