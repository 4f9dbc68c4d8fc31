//! Environment block codec
//!
//! An environment block is a fixed-capacity byte buffer:
//!
//! ```text
//! +-----------------------------+------------------------------+--------+
//! | "# GRUB Environment Block\n" | name=value\0 name=value\0 ... | ###### |
//! +-----------------------------+------------------------------+--------+
//! ```
//!
//! The capacity is fixed when the block is opened. Every mutation rebuilds
//! the record area (signature, packed records, `#` filler up to capacity),
//! so the buffer never holds stale bytes between records.
//!
//! Names and values are raw bytes. The bootloader writes whatever it was
//! given, so no character set is assumed here.

use core::fmt;
use core::ops::ControlFlow;
use std::io::{self, Write};

use crate::error::{EnvBlockError, FormatError};

/// Signature at offset 0 of every block
pub const SIGNATURE: &[u8] = b"# GRUB Environment Block\n";

/// Filler byte for the unused tail
pub const FILLER: u8 = b'#';

/// Capacity of a freshly created file-backed block
pub const DEFAULT_ENVBLK_SIZE: usize = 1024;

/// One `name=value` record
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Variable<'a> {
    pub name: &'a [u8],
    pub value: &'a [u8],
}

impl Variable<'_> {
    /// `name=value` followed by a newline, bytes unchanged
    pub fn write_line<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut line = Vec::with_capacity(self.name.len() + self.value.len() + 2);
        line.extend_from_slice(self.name);
        line.push(b'=');
        line.extend_from_slice(self.value);
        line.push(b'\n');
        out.write_all(&line)
    }
}

/// Lossy: invalid UTF-8 shows as U+FFFD
impl fmt::Display for Variable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}",
            String::from_utf8_lossy(self.name),
            String::from_utf8_lossy(self.value)
        )
    }
}

impl fmt::Debug for Variable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string())
    }
}

/// In-memory environment block
#[derive(Clone, PartialEq, Eq)]
pub struct EnvBlock {
    buf: Vec<u8>,
}

impl EnvBlock {
    /// Signature followed by filler, no variables
    pub fn blank(size: usize) -> Result<Self, FormatError> {
        if size < SIGNATURE.len() {
            return Err(FormatError::TooShort { size });
        }

        let mut buf = vec![FILLER; size];
        buf[..SIGNATURE.len()].copy_from_slice(SIGNATURE);
        Ok(Self { buf })
    }

    /// Take ownership of a serialized block
    ///
    /// The whole record area is validated here, so iteration over an open
    /// block cannot fail.
    pub fn open(buf: Vec<u8>) -> Result<Self, FormatError> {
        if buf.len() < SIGNATURE.len() {
            return Err(FormatError::TooShort { size: buf.len() });
        }
        if !buf.starts_with(SIGNATURE) {
            return Err(FormatError::BadSignature);
        }

        for record in Records::new(&buf) {
            record?;
        }

        Ok(Self { buf })
    }

    /// Total size in bytes; never changes
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Serialized form, exactly `capacity()` bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Bytes taken by the signature and records
    pub fn used(&self) -> usize {
        SIGNATURE.len() + self.iter().map(|var| record_len(var.name, var.value)).sum::<usize>()
    }

    /// Variables in stored order
    pub fn iter(&self) -> Vars<'_> {
        Vars {
            records: Records::new(&self.buf),
        }
    }

    /// Visit variables in stored order until the visitor breaks
    pub fn iterate<'a, B, F>(&'a self, mut visitor: F) -> ControlFlow<B>
    where
        F: FnMut(Variable<'a>) -> ControlFlow<B>,
    {
        for var in self.iter() {
            if let ControlFlow::Break(b) = visitor(var) {
                return ControlFlow::Break(b);
            }
        }
        ControlFlow::Continue(())
    }

    pub fn get(&self, name: impl AsRef<[u8]>) -> Option<&[u8]> {
        let name = name.as_ref();
        self.iter().find(|var| var.name == name).map(|var| var.value)
    }

    pub fn contains(&self, name: impl AsRef<[u8]>) -> bool {
        self.get(name).is_some()
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Insert or overwrite `name`
    ///
    /// An existing variable keeps its position. If the result does not fit,
    /// `TooSmall` is returned and the block is unchanged.
    pub fn set(&mut self, name: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<(), EnvBlockError> {
        let (name, value) = (name.as_ref(), value.as_ref());
        validate_name(name)?;
        if value.contains(&0) {
            return Err(EnvBlockError::InvalidValue(lossy(name)));
        }

        let mut replaced = false;
        let mut next = Vec::with_capacity(self.capacity());
        next.extend_from_slice(SIGNATURE);
        for var in self.iter() {
            if var.name != name {
                push_record(&mut next, var.name, var.value);
            } else if !replaced {
                push_record(&mut next, name, value);
                replaced = true;
            }
        }
        if !replaced {
            push_record(&mut next, name, value);
        }

        self.commit(next)
    }

    /// Remove `name`; returns whether it was present
    pub fn delete(&mut self, name: impl AsRef<[u8]>) -> bool {
        let name = name.as_ref();
        if !self.contains(name) {
            return false;
        }

        let mut next = Vec::with_capacity(self.capacity());
        next.extend_from_slice(SIGNATURE);
        for var in self.iter().filter(|var| var.name != name) {
            push_record(&mut next, var.name, var.value);
        }

        // Removing a record only ever shrinks the used area
        next.resize(self.capacity(), FILLER);
        self.buf = next;
        true
    }

    fn commit(&mut self, mut next: Vec<u8>) -> Result<(), EnvBlockError> {
        let capacity = self.capacity();
        if next.len() > capacity {
            return Err(EnvBlockError::TooSmall {
                needed: next.len(),
                capacity,
            });
        }

        next.resize(capacity, FILLER);
        self.buf = next;
        Ok(())
    }
}

impl fmt::Debug for EnvBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvBlock")
            .field("capacity", &self.capacity())
            .field("vars", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}

impl<'a> IntoIterator for &'a EnvBlock {
    type Item = Variable<'a>;
    type IntoIter = Vars<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the variables of a validated block
pub struct Vars<'a> {
    records: Records<'a>,
}

impl<'a> Iterator for Vars<'a> {
    type Item = Variable<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next()?.ok()
    }
}

/// Raw record scanner; stops at the first filler byte or the end of buffer
struct Records<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Records<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: SIGNATURE.len().min(buf.len()),
        }
    }

    fn fail(&mut self, err: FormatError) -> Option<Result<Variable<'a>, FormatError>> {
        self.pos = self.buf.len();
        Some(Err(err))
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<Variable<'a>, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.buf[self.pos..];
        match rest.first() {
            None | Some(&FILLER) => return None,
            Some(_) => {}
        }

        let offset = self.pos;
        let Some(len) = rest.iter().position(|&b| b == 0) else {
            return self.fail(FormatError::UnterminatedRecord { offset });
        };
        self.pos += len + 1;

        let record = &rest[..len];
        match record.iter().position(|&b| b == b'=') {
            Some(eq) => Some(Ok(Variable {
                name: &record[..eq],
                value: &record[eq + 1..],
            })),
            None => self.fail(FormatError::MissingSeparator { offset }),
        }
    }
}

fn validate_name(name: &[u8]) -> Result<(), EnvBlockError> {
    let bad = name.first().map_or(true, |&b| b == FILLER) || name.iter().any(|&b| b == b'=' || b == 0);
    if bad {
        return Err(EnvBlockError::InvalidName(lossy(name)));
    }
    Ok(())
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn record_len(name: &[u8], value: &[u8]) -> usize {
    name.len() + 1 + value.len() + 1
}

fn push_record(out: &mut Vec<u8>, name: &[u8], value: &[u8]) {
    out.extend_from_slice(name);
    out.push(b'=');
    out.extend_from_slice(value);
    out.push(0);
}
