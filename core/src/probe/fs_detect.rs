//! Filesystem identification by superblock magic

use gpt_disk_io::BlockIo;

use crate::store::device::{read_region, SECTOR_SIZE};

/// Magic bytes at a fixed byte offset
struct Magic {
    fs_name: &'static str,
    offset: u64,
    bytes: &'static [u8],
}

// Lowest offsets first so small devices are still recognised
const MAGICS: &[Magic] = &[
    Magic {
        fs_name: "xfs",
        offset: 0,
        bytes: b"XFSB",
    },
    Magic {
        // ext2/3/4 share the superblock layout
        fs_name: "ext2",
        offset: 0x438,
        bytes: &[0x53, 0xEF],
    },
    Magic {
        fs_name: "btrfs",
        offset: 0x1_0040,
        bytes: b"_BHRfS_M",
    },
];

/// Name of the filesystem on `io`, or `None` if no known magic matches
pub fn detect_filesystem<B: BlockIo>(io: &mut B) -> Result<Option<&'static str>, B::Error> {
    let device_bytes = io.num_blocks()?.saturating_mul(SECTOR_SIZE as u64);

    for magic in MAGICS {
        let end = magic.offset + magic.bytes.len() as u64;
        if end > device_bytes {
            continue;
        }

        let found = read_region(io, magic.offset, magic.bytes.len())?;
        if found == magic.bytes {
            return Ok(Some(magic.fs_name));
        }
    }

    Ok(None)
}
