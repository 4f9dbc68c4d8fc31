//! Editor commands
//!
//! Each command is a complete open, mutate, persist cycle. Nothing is kept
//! between invocations; the secondary block exists only inside one call.

use core::str::FromStr;
use std::io::Write;
use std::path::Path;

use tracing::{debug, warn};

use crate::envblk::EnvBlock;
use crate::error::{EditEnvError, Result};
use crate::store::{onblock, primary, Placement, SecondaryBlock, ENV_BLOCK_VAR};

/// Variable routed to the on-block copy when one is in use
pub const NEXT_ENTRY_VAR: &str = "next_entry";

/// One `NAME=VALUE` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub name: String,
    pub value: String,
}

impl FromStr for Assignment {
    type Err = EditEnvError;

    /// Splits at the first `=`; the value may contain more
    fn from_str(s: &str) -> Result<Self> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| EditEnvError::InvalidParameter(s.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create,
    List,
    Set(Vec<Assignment>),
    Unset(Vec<String>),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::List => "list",
            Self::Set(_) => "set",
            Self::Unset(_) => "unset",
        }
    }
}

/// Run `command` against the block at `path`
pub fn run<W: Write>(command: &Command, path: &Path, placement: &Placement, out: &mut W) -> Result<()> {
    debug!(command = command.name(), path = %path.display(), ?placement, "running");
    match command {
        Command::Create => create(path),
        Command::List => list(path, placement, out),
        Command::Set(assignments) => set(path, placement, assignments),
        Command::Unset(names) => unset(path, placement, names),
    }
}

/// Overwrite `path` with a blank block, discarding every variable
pub fn create(path: &Path) -> Result<()> {
    primary::create(path)
}

/// Print primary variables, then on-block variables
///
/// Names present in both stores are printed twice. `list` never creates an
/// on-block copy.
pub fn list<W: Write>(path: &Path, placement: &Placement, out: &mut W) -> Result<()> {
    let primary = primary::open_or_create(path)?;
    let secondary = match placement.raw_region() {
        Some(region) => onblock::discover(&primary, &region.device)?,
        None => None,
    };

    print_vars(&primary, out)?;
    if let Some(secondary) = &secondary {
        print_vars(&secondary.block, out)?;
    }
    Ok(())
}

/// Apply `assignments` in order
///
/// `next_entry` goes to the on-block copy when there is one. `env_block` is
/// maintained by the tool and bootloader only; attempts to set it are
/// dropped with a warning. Everything else is written to the primary block
/// and removed from the on-block copy so the new value wins.
pub fn set(path: &Path, placement: &Placement, assignments: &[Assignment]) -> Result<()> {
    let mut primary = primary::open_or_create(path)?;
    let mut secondary = open_secondary(&mut primary, placement)?;

    for Assignment { name, value } in assignments {
        if name == NEXT_ENTRY_VAR {
            if let Some(secondary) = secondary.as_mut() {
                secondary.block.set(name, value)?;
                continue;
            }
        }

        if name == ENV_BLOCK_VAR {
            warn!("can't set {ENV_BLOCK_VAR} as it's read-only");
            continue;
        }

        primary.set(name, value)?;
        if let Some(secondary) = secondary.as_mut() {
            if secondary.block.delete(name) {
                debug!(%name, "dropped shadowed on-block value");
            }
        }
    }

    write_back(path, &primary, secondary.as_ref())
}

/// Delete `names` from both stores; absent names are ignored
pub fn unset(path: &Path, placement: &Placement, names: &[String]) -> Result<()> {
    let mut primary = primary::open_or_create(path)?;
    let mut secondary = open_secondary(&mut primary, placement)?;

    for name in names {
        primary.delete(name);
        if let Some(secondary) = secondary.as_mut() {
            secondary.block.delete(name);
        }
    }

    write_back(path, &primary, secondary.as_ref())
}

fn open_secondary(primary: &mut EnvBlock, placement: &Placement) -> Result<Option<SecondaryBlock>> {
    match placement {
        Placement::FileOnly => Ok(None),
        Placement::FileAndBlock(region) => onblock::open_or_create(primary, region).map(Some),
    }
}

/// Raw region first: the primary must never point at a block that was not written
fn write_back(path: &Path, primary: &EnvBlock, secondary: Option<&SecondaryBlock>) -> Result<()> {
    if let Some(secondary) = secondary {
        onblock::persist(secondary)?;
    }
    primary::persist(path, primary)
}

fn print_vars<W: Write>(block: &EnvBlock, out: &mut W) -> Result<()> {
    for var in block {
        var.write_line(out).map_err(EditEnvError::Output)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_parse() {
        let a: Assignment = "kopts=root=/dev/sda1".parse().unwrap();
        assert_eq!(a.name, "kopts");
        assert_eq!(a.value, "root=/dev/sda1");

        let empty: Assignment = "x=".parse().unwrap();
        assert_eq!(empty.value, "");
    }

    #[test]
    fn test_assignment_without_separator() {
        let err = "FOO".parse::<Assignment>().unwrap_err();
        assert_eq!(err.to_string(), "invalid parameter FOO");
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_list_output_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grubenv");
        set(&path, &Placement::FileOnly, &["a=1".parse().unwrap()]).unwrap();

        let err = list(&path, &Placement::FileOnly, &mut BrokenPipe).unwrap_err();
        assert!(matches!(err, EditEnvError::Output(ref e) if e.kind() == std::io::ErrorKind::BrokenPipe));
        assert_eq!(err.to_string(), "cannot write listing");
    }
}
