//! Environment block stores
//!
//! The primary block is an ordinary file. A secondary copy may live in a
//! reserved raw region of the device under the file; whether it is used is
//! decided once per invocation and expressed as a [`Placement`].

pub mod device;
pub mod onblock;
pub mod primary;

pub use device::{FileBlockDevice, SECTOR_BITS, SECTOR_SIZE};
pub use onblock::{BlockPointer, RawBlockSpec, RawRegion, SecondaryBlock, ENV_BLOCK_VAR};

/// Which stores an invocation operates on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Placement {
    /// Primary file only
    #[default]
    FileOnly,
    /// Primary file plus the on-block copy in a reserved region
    FileAndBlock(RawRegion),
}

impl Placement {
    pub fn raw_region(&self) -> Option<&RawRegion> {
        match self {
            Self::FileOnly => None,
            Self::FileAndBlock(region) => Some(region),
        }
    }
}
