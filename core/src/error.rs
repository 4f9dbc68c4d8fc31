//! Error types for environment block operations

use core::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for editenv operations
pub type Result<T> = core::result::Result<T, EditEnvError>;

/// Structural problems found while decoding a block
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Buffer cannot even hold the signature
    #[error("block of {size} bytes is smaller than the signature")]
    TooShort { size: usize },

    /// Buffer does not start with the environment block signature
    #[error("signature mismatch")]
    BadSignature,

    /// Record runs into the end of the buffer without a NUL byte
    #[error("record at offset {offset} is not NUL-terminated")]
    UnterminatedRecord { offset: usize },

    /// Record has no `=` between name and value
    #[error("record at offset {offset} has no `=` separator")]
    MissingSeparator { offset: usize },

    /// The `env_block` pointer is not `<offset>+<size>`
    #[error("malformed env_block value `{0}`")]
    BadPointer(String),
}

/// Mutations refused by the codec. The buffer is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvBlockError {
    #[error("environment block too small: {needed} bytes needed, capacity is {capacity}")]
    TooSmall { needed: usize, capacity: usize },

    #[error("invalid variable name `{0}`")]
    InvalidName(String),

    #[error("value of `{0}` contains a NUL byte")]
    InvalidValue(String),
}

/// I/O step that failed, used in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Open,
    Seek,
    Read,
    Write,
    Sync,
    Rename,
}

impl fmt::Display for IoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Open => "open",
            Self::Seek => "seek",
            Self::Read => "read",
            Self::Write => "write to",
            Self::Sync => "sync",
            Self::Rename => "rename",
        };
        f.write_str(verb)
    }
}

/// Fatal errors of an editenv command
#[derive(Error, Debug)]
pub enum EditEnvError {
    /// Malformed `NAME=VALUE` argument
    #[error("invalid parameter {0}")]
    InvalidParameter(String),

    /// Block failed to decode
    #[error("invalid environment block")]
    Format(#[from] FormatError),

    /// Open/seek/read/write/sync failure on a file or raw device
    #[error("cannot {} `{}`", .op, .path.display())]
    Io {
        op: IoOp,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Listing could not be written out
    #[error("cannot write listing")]
    Output(#[source] io::Error),

    /// Mutation does not fit into the block
    #[error("environment block too small")]
    TooSmall { needed: usize, capacity: usize },

    /// Name or value the block format cannot represent
    #[error("{0}")]
    InvalidVariable(EnvBlockError),
}

impl EditEnvError {
    pub(crate) fn io(op: IoOp, path: &Path, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<EnvBlockError> for EditEnvError {
    fn from(err: EnvBlockError) -> Self {
        match err {
            EnvBlockError::TooSmall { needed, capacity } => Self::TooSmall { needed, capacity },
            other => Self::InvalidVariable(other),
        }
    }
}
