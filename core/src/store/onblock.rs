//! On-block secondary environment block
//!
//! Some filesystems reserve a fixed raw region that the bootloader can
//! write without a filesystem driver. The primary block records where the
//! copy lives in its `env_block` variable, as `<offset>+<size>` in 512-byte
//! sectors. Once that variable exists the copy must be readable: every
//! failure past that point is fatal.

use core::fmt;
use core::str::FromStr;
use std::path::{Path, PathBuf};

use gpt_disk_io::BlockIo;
use tracing::{debug, info};

use crate::envblk::EnvBlock;
use crate::error::{EditEnvError, FormatError, IoOp, Result};
use crate::probe::ReservedRegion;
use crate::store::device::{read_region, write_region, FileBlockDevice, SECTOR_BITS, SECTOR_SIZE};

/// Reserved variable holding the on-block location
pub const ENV_BLOCK_VAR: &str = "env_block";

/// Parsed `env_block` value, in sectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPointer {
    pub offset: u64,
    pub size: u64,
}

impl BlockPointer {
    /// Pointer for a byte range; the size is rounded up to whole sectors
    pub fn from_bytes(offset: u64, size: usize) -> Self {
        Self {
            offset: offset >> SECTOR_BITS,
            size: size.div_ceil(SECTOR_SIZE) as u64,
        }
    }

    pub fn byte_offset(&self) -> u64 {
        self.offset << SECTOR_BITS
    }

    pub fn byte_size(&self) -> usize {
        (self.size as usize) << SECTOR_BITS
    }
}

impl fmt::Display for BlockPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.offset, self.size)
    }
}

impl FromStr for BlockPointer {
    type Err = FormatError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        let bad = || FormatError::BadPointer(s.to_string());
        let (offset, size) = s.split_once('+').ok_or_else(bad)?;

        let offset = parse_sectors(offset).ok_or_else(bad)?;
        let size = parse_sectors(size).ok_or_else(bad)?;
        if size == 0 {
            return Err(bad());
        }

        // Both ends must stay addressable once shifted to bytes
        let addressable = offset
            .checked_add(size)
            .and_then(|end| end.checked_mul(SECTOR_SIZE as u64))
            .and_then(|_| usize::try_from(size << SECTOR_BITS).ok());
        if addressable.is_none() {
            return Err(bad());
        }

        Ok(Self { offset, size })
    }
}

fn parse_sectors(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Where a secondary block lives on a raw device, in bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlockSpec {
    pub device: PathBuf,
    pub offset: u64,
    pub size: usize,
}

impl RawBlockSpec {
    pub fn from_pointer(device: &Path, pointer: BlockPointer) -> Self {
        Self {
            device: device.to_path_buf(),
            offset: pointer.byte_offset(),
            size: pointer.byte_size(),
        }
    }
}

/// Device plus the reserved region its filesystem sets aside
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRegion {
    pub device: PathBuf,
    pub region: ReservedRegion,
}

impl RawRegion {
    pub fn spec(&self) -> RawBlockSpec {
        RawBlockSpec {
            device: self.device.clone(),
            offset: self.region.offset,
            size: self.region.size,
        }
    }
}

/// A secondary block and the location it was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryBlock {
    pub block: EnvBlock,
    pub location: RawBlockSpec,
}

/// The primary block's `env_block` value, if any
pub fn pointer(primary: &EnvBlock) -> core::result::Result<Option<BlockPointer>, FormatError> {
    primary
        .get(ENV_BLOCK_VAR)
        .map(|raw| match core::str::from_utf8(raw) {
            Ok(text) => text.parse::<BlockPointer>(),
            Err(_) => Err(FormatError::BadPointer(String::from_utf8_lossy(raw).into_owned())),
        })
        .transpose()
}

/// Load the block at `spec`
pub fn read(spec: &RawBlockSpec) -> Result<SecondaryBlock> {
    let mut dev = FileBlockDevice::open(&spec.device)?;
    let buf = read_region(&mut dev, spec.offset, spec.size)
        .map_err(|e| EditEnvError::io(IoOp::Read, &spec.device, e))?;

    let block = EnvBlock::open(buf)?;
    debug!(
        device = %spec.device.display(),
        offset = spec.offset,
        size = spec.size,
        "read on-block environment"
    );
    Ok(SecondaryBlock {
        block,
        location: spec.clone(),
    })
}

/// Follow the primary block's `env_block` pointer on `device`
///
/// Returns `None` when the primary block has no pointer.
pub fn discover(primary: &EnvBlock, device: &Path) -> Result<Option<SecondaryBlock>> {
    match pointer(primary)? {
        Some(ptr) => read(&RawBlockSpec::from_pointer(device, ptr)).map(Some),
        None => Ok(None),
    }
}

/// Discover the secondary block, or start a blank one in `region`
///
/// A block whose size differs from the reserved region is replaced. A new
/// block exists only in memory: the primary block gets a fresh `env_block`
/// pointer and nothing touches the device until [`persist`]. The caller
/// persists the secondary first, then the primary.
pub fn open_or_create(primary: &mut EnvBlock, region: &RawRegion) -> Result<SecondaryBlock> {
    if let Some(found) = discover(primary, &region.device)? {
        if found.block.capacity() == region.region.size {
            return Ok(found);
        }
        info!(
            found = found.block.capacity(),
            expected = region.region.size,
            "on-block environment has unexpected size, recreating"
        );
    }

    let location = region.spec();
    let block = EnvBlock::blank(location.size)?;
    let ptr = BlockPointer::from_bytes(location.offset, location.size);
    primary.set(ENV_BLOCK_VAR, ptr.to_string())?;
    info!(
        device = %location.device.display(),
        pointer = %ptr,
        "new on-block environment"
    );

    Ok(SecondaryBlock { block, location })
}

/// Write the block back where it was read from and sync the device
pub fn persist(secondary: &SecondaryBlock) -> Result<()> {
    let location = &secondary.location;
    if secondary.block.capacity() > location.size {
        return Err(EditEnvError::TooSmall {
            needed: secondary.block.capacity(),
            capacity: location.size,
        });
    }

    write(location, &secondary.block)
}

fn write(spec: &RawBlockSpec, block: &EnvBlock) -> Result<()> {
    let mut dev = FileBlockDevice::open_rw(&spec.device)?;
    write_region(&mut dev, spec.offset, block.as_bytes())
        .map_err(|e| EditEnvError::io(IoOp::Write, &spec.device, e))?;
    dev.flush()
        .map_err(|e| EditEnvError::io(IoOp::Sync, &spec.device, e))?;

    debug!(device = %spec.device.display(), offset = spec.offset, "wrote on-block environment");
    Ok(())
}
