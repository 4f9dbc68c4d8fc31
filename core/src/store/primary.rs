// File-backed primary environment block

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::envblk::{EnvBlock, DEFAULT_ENVBLK_SIZE};
use crate::error::{EditEnvError, IoOp, Result};

/// Write a blank block of the default capacity, replacing any existing file
///
/// The block is staged in `<path>.new` and renamed into place.
pub fn create(path: &Path) -> Result<()> {
    let block = EnvBlock::blank(DEFAULT_ENVBLK_SIZE)?;
    let staging = staging_path(path);

    write_file(&staging, block.as_bytes())?;
    fs::rename(&staging, path).map_err(|e| EditEnvError::io(IoOp::Rename, &staging, e))?;

    debug!(path = %path.display(), size = DEFAULT_ENVBLK_SIZE, "created blank environment block");
    Ok(())
}

/// Load the block at `path`, creating a blank one first if the file is absent
pub fn open_or_create(path: &Path) -> Result<EnvBlock> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            create(path)?;
            File::open(path).map_err(|e| EditEnvError::io(IoOp::Open, path, e))?
        }
        Err(e) => return Err(EditEnvError::io(IoOp::Open, path, e)),
    };

    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .map_err(|e| EditEnvError::io(IoOp::Read, path, e))?;

    let block = EnvBlock::open(buf)?;
    debug!(path = %path.display(), capacity = block.capacity(), vars = block.len(), "opened environment block");
    Ok(block)
}

/// Rewrite the whole file and sync it to disk
pub fn persist(path: &Path, block: &EnvBlock) -> Result<()> {
    write_file(path, block.as_bytes())?;
    debug!(path = %path.display(), "wrote environment block");
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| EditEnvError::io(IoOp::Open, path, e))?;
    file.write_all(bytes)
        .map_err(|e| EditEnvError::io(IoOp::Write, path, e))?;
    file.sync_all()
        .map_err(|e| EditEnvError::io(IoOp::Sync, path, e))
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".new");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envblk::{FILLER, SIGNATURE};

    #[test]
    fn test_open_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grubenv");

        let block = open_or_create(&path).unwrap();
        assert!(block.is_empty());
        assert_eq!(fs::metadata(&path).unwrap().len(), DEFAULT_ENVBLK_SIZE as u64);
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn test_open_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grubenv");
        fs::write(&path, b"definitely not an environment block").unwrap();

        let err = open_or_create(&path).unwrap_err();
        assert!(matches!(err, EditEnvError::Format(_)));
    }

    #[test]
    fn test_open_keeps_file_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grubenv");
        let mut buf = SIGNATURE.to_vec();
        buf.resize(4096, FILLER);
        fs::write(&path, &buf).unwrap();

        assert_eq!(open_or_create(&path).unwrap().capacity(), 4096);
    }

    #[test]
    fn test_persist_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grubenv");

        let mut block = open_or_create(&path).unwrap();
        block.set("saved_entry", "0").unwrap();
        persist(&path, &block).unwrap();

        assert_eq!(open_or_create(&path).unwrap(), block);
    }

    #[test]
    fn test_io_error_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("grubenv");

        let err = open_or_create(&path).unwrap_err();
        assert!(err.to_string().contains("missing-dir"));
        assert!(matches!(err, EditEnvError::Io { op: IoOp::Open, .. }));
    }
}
