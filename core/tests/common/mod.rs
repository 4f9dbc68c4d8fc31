//! Common test utilities: in-memory block devices, device image files and a
//! scripted device topology

#![allow(dead_code)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use editenv_core::probe::{reserved_region, DeviceTopology, DiskDriver, Drive, ProbeError};
use editenv_core::store::RawRegion;
use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};

/// Size of the scratch device images; covers the btrfs reserved region
pub const DEVICE_SIZE: u64 = 1024 * 1024;

/// In-memory block device for testing
#[derive(Debug, Clone)]
pub struct MemoryBlockDevice {
    pub data: Vec<u8>,
    pub block_size: usize,
}

impl MemoryBlockDevice {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            block_size: 512,
        }
    }

    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0u8; len])
    }

    /// Place `bytes` at byte `offset`
    pub fn poke(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

impl BlockIo for MemoryBlockDevice {
    type Error = io::Error;

    fn block_size(&self) -> BlockSize {
        BlockSize::new(self.block_size as u32).expect("valid block size")
    }

    fn num_blocks(&mut self) -> Result<u64, Self::Error> {
        Ok((self.data.len() / self.block_size) as u64)
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> Result<(), Self::Error> {
        let offset = start_lba.0 as usize * self.block_size;
        if offset + dst.len() > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read beyond end of device",
            ));
        }
        dst.copy_from_slice(&self.data[offset..offset + dst.len()]);
        Ok(())
    }

    fn write_blocks(&mut self, start_lba: Lba, src: &[u8]) -> Result<(), Self::Error> {
        let offset = start_lba.0 as usize * self.block_size;
        if offset + src.len() > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "write beyond end of device",
            ));
        }
        self.data[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Zero-filled image file standing in for a block device node
pub fn device_image(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let file = fs::File::create(&path).expect("create device image");
    file.set_len(DEVICE_SIZE).expect("size device image");
    path
}

/// btrfs reserved region on `device`
pub fn btrfs_region(device: &Path) -> RawRegion {
    RawRegion {
        device: device.to_path_buf(),
        region: *reserved_region("btrfs").expect("btrfs has a reserved region"),
    }
}

/// Scripted topology: every answer comes from the fields
#[derive(Debug, Clone, Default)]
pub struct FakeTopology {
    pub devices: Vec<PathBuf>,
    /// device -> drive name
    pub drives: Vec<(PathBuf, String)>,
    /// drives that can be opened
    pub drivers: Vec<(String, DiskDriver)>,
    pub fs_type: Option<String>,
}

impl FakeTopology {
    /// One plain drive holding `fs_type`
    pub fn single(device: &Path, fs_type: &str) -> Self {
        Self {
            devices: vec![device.to_path_buf()],
            drives: vec![(device.to_path_buf(), "hd0,gpt2".to_string())],
            drivers: vec![("hd0,gpt2".to_string(), DiskDriver::Plain)],
            fs_type: Some(fs_type.to_string()),
        }
    }

    /// Add another device/drive pair
    pub fn with_drive(mut self, device: &str, drive: &str, driver: Option<DiskDriver>) -> Self {
        self.devices.push(PathBuf::from(device));
        self.drives.push((PathBuf::from(device), drive.to_string()));
        if let Some(driver) = driver {
            self.drivers.push((drive.to_string(), driver));
        }
        self
    }
}

impl DeviceTopology for FakeTopology {
    fn root_devices(&self, dir: &Path) -> Result<Vec<PathBuf>, ProbeError> {
        if self.devices.is_empty() {
            return Err(ProbeError::NoDevice(dir.to_path_buf()));
        }
        Ok(self.devices.clone())
    }

    fn drive_name(&self, device: &Path) -> Option<String> {
        self.drives
            .iter()
            .find(|(dev, _)| dev == device)
            .map(|(_, drive)| drive.clone())
    }

    fn open_drive(&self, name: &str) -> Result<Drive, ProbeError> {
        let (_, driver) = self
            .drivers
            .iter()
            .find(|(drive, _)| drive == name)
            .ok_or_else(|| ProbeError::Open {
                drive: name.to_string(),
                reason: "no such device".to_string(),
            })?;
        let device = self
            .drives
            .iter()
            .find(|(_, drive)| drive == name)
            .map(|(dev, _)| dev.clone())
            .unwrap_or_default();

        Ok(Drive {
            name: name.to_string(),
            device,
            driver: *driver,
        })
    }

    fn probe_fs(&self, drive: &Drive) -> Result<String, ProbeError> {
        self.fs_type.clone().ok_or_else(|| ProbeError::Filesystem {
            drive: drive.name.clone(),
            reason: "unknown filesystem".to_string(),
        })
    }
}
