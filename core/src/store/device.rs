// Raw sector access for the on-block copy

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use gpt_disk_io::BlockIo;
use gpt_disk_types::{BlockSize, Lba};

use crate::error::{EditEnvError, IoOp, Result};

/// log2 of the sector size used by the `env_block` pointer
pub const SECTOR_BITS: u32 = 9;

/// Sector size in bytes
pub const SECTOR_SIZE: usize = 1 << SECTOR_BITS;

/// Block device node (or plain image file) addressed in 512-byte sectors
#[derive(Debug)]
pub struct FileBlockDevice {
    file: File,
}

impl FileBlockDevice {
    /// Open for reading only
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| EditEnvError::io(IoOp::Open, path, e))?;
        Ok(Self { file })
    }

    /// Open for in-place writes; never creates or truncates
    pub fn open_rw(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| EditEnvError::io(IoOp::Open, path, e))?;
        Ok(Self { file })
    }

    fn seek_to(&mut self, lba: Lba) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(lba.0 * SECTOR_SIZE as u64))?;
        Ok(())
    }
}

impl BlockIo for FileBlockDevice {
    type Error = io::Error;

    fn block_size(&self) -> BlockSize {
        BlockSize::BS_512
    }

    fn num_blocks(&mut self) -> core::result::Result<u64, Self::Error> {
        // Block device nodes report a zero length in their metadata
        let end = self.file.seek(SeekFrom::End(0))?;
        Ok(end / SECTOR_SIZE as u64)
    }

    fn read_blocks(&mut self, start_lba: Lba, dst: &mut [u8]) -> core::result::Result<(), Self::Error> {
        self.seek_to(start_lba)?;
        self.file.read_exact(dst)
    }

    fn write_blocks(&mut self, start_lba: Lba, src: &[u8]) -> core::result::Result<(), Self::Error> {
        self.seek_to(start_lba)?;
        self.file.write_all(src)
    }

    fn flush(&mut self) -> core::result::Result<(), Self::Error> {
        self.file.sync_all()
    }
}

/// Sector span `[first_lba, first_lba + sectors)` covering a byte range
struct Span {
    first_lba: u64,
    skip: usize,
    bytes: usize,
}

impl Span {
    fn covering(offset: u64, len: usize) -> Self {
        let skip = (offset % SECTOR_SIZE as u64) as usize;
        Self {
            first_lba: offset >> SECTOR_BITS,
            skip,
            bytes: (skip + len).div_ceil(SECTOR_SIZE) * SECTOR_SIZE,
        }
    }

    fn is_aligned(&self, len: usize) -> bool {
        self.skip == 0 && self.bytes == len
    }
}

/// Read `len` bytes at byte `offset`
///
/// Unaligned ranges are widened to whole sectors and trimmed afterwards.
pub fn read_region<B: BlockIo>(
    io: &mut B,
    offset: u64,
    len: usize,
) -> core::result::Result<Vec<u8>, B::Error> {
    let span = Span::covering(offset, len);
    let mut buf = vec![0u8; span.bytes];
    io.read_blocks(Lba(span.first_lba), &mut buf)?;

    buf.drain(..span.skip);
    buf.truncate(len);
    Ok(buf)
}

/// Write `data` at byte `offset`, preserving the rest of partially covered sectors
pub fn write_region<B: BlockIo>(
    io: &mut B,
    offset: u64,
    data: &[u8],
) -> core::result::Result<(), B::Error> {
    let span = Span::covering(offset, data.len());
    if span.is_aligned(data.len()) {
        return io.write_blocks(Lba(span.first_lba), data);
    }

    let mut buf = vec![0u8; span.bytes];
    io.read_blocks(Lba(span.first_lba), &mut buf)?;
    buf[span.skip..span.skip + data.len()].copy_from_slice(data);
    io.write_blocks(Lba(span.first_lba), &buf)
}
