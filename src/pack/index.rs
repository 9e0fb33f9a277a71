//! Index decoding.
//!
//! The whole index is fetched with a single positioned read, then parsed in
//! memory. This is one round trip for remote sources regardless of entry
//! count. Limits on entry count and index size are applied before any
//! allocation is sized from a value read out of the file.

use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashSet;
use std::io::Cursor;
use std::ops::Range;

use crate::error::{FormatError, Result};
use crate::io::ReadAt;

use super::header::Header;
use super::legacy;
use super::structures::*;

/// Smallest possible binary entry: empty name prefix, offset, size, flags.
const MIN_ENTRY_SIZE: u64 = 2 + 8 + 8 + 4;

/// Caps that protect against corrupt count and length fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexLimits {
    pub max_entries: u32,
    pub max_index_bytes: u64,
}

impl Default for IndexLimits {
    fn default() -> Self {
        Self {
            max_entries: 1_000_000,
            max_index_bytes: 256 * 1024 * 1024,
        }
    }
}

/// Decode the entry table described by `header`.
///
/// Returns entries in on-disk order. Names are checked for emptiness and
/// uniqueness, and every payload range is checked against the payload region.
/// Building a lookup structure is left to the caller.
pub async fn decode_index<R: ReadAt + ?Sized>(
    source: &R,
    header: &Header,
    limits: &IndexLimits,
) -> Result<Vec<FileEntry>> {
    let index = header.index;
    let size = source.size();

    if index.len > limits.max_index_bytes {
        return Err(FormatError::IndexTooLarge {
            what: "index length",
            value: index.len,
            limit: limits.max_index_bytes,
        }
        .into());
    }
    if index.offset > size || index.len > size - index.offset {
        return Err(FormatError::Truncated {
            field: "index",
            offset: index.offset,
            needed: index.len,
            available: size.saturating_sub(index.offset),
        }
        .into());
    }

    let mut data = vec![0u8; index.len as usize];
    source.read_exact_at(index.offset, &mut data).await?;

    let entries = match header.metadata.version {
        VERSION_BINARY => parse_binary(&data, index.offset, limits)?,
        VERSION_JSON => legacy::parse_index(&data, limits)?,
        v => return Err(FormatError::UnsupportedVersion(v).into()),
    };

    validate_entries(&entries, &header.payload)?;
    Ok(entries)
}

/// Bounds-checked reader over the in-memory index.
struct IndexCursor<'a> {
    inner: Cursor<&'a [u8]>,
    /// Absolute offset of the index, for error reporting.
    base: u64,
}

impl<'a> IndexCursor<'a> {
    fn remaining(&self) -> u64 {
        self.inner.get_ref().len() as u64 - self.inner.position()
    }

    fn ensure(&self, n: u64, field: &'static str) -> Result<()> {
        let available = self.remaining();
        if n > available {
            return Err(FormatError::Truncated {
                field,
                offset: self.base + self.inner.position(),
                needed: n,
                available,
            }
            .into());
        }
        Ok(())
    }

    fn u16(&mut self, field: &'static str) -> Result<u16> {
        self.ensure(2, field)?;
        Ok(self.inner.read_u16::<LittleEndian>()?)
    }

    fn u32(&mut self, field: &'static str) -> Result<u32> {
        self.ensure(4, field)?;
        Ok(self.inner.read_u32::<LittleEndian>()?)
    }

    fn u64(&mut self, field: &'static str) -> Result<u64> {
        self.ensure(8, field)?;
        Ok(self.inner.read_u64::<LittleEndian>()?)
    }

    fn name(&mut self) -> Result<String> {
        let len = self.u16("entry name")? as u64;
        self.ensure(len, "entry name")?;
        let data: &'a [u8] = self.inner.get_ref();
        let start = self.inner.position() as usize;
        let bytes = &data[start..start + len as usize];
        self.inner.set_position(self.inner.position() + len);
        let name = std::str::from_utf8(bytes).map_err(|_| FormatError::InvalidText {
            field: "entry name",
        })?;
        Ok(name.to_owned())
    }
}

fn parse_binary(data: &[u8], base: u64, limits: &IndexLimits) -> Result<Vec<FileEntry>> {
    let mut cursor = IndexCursor {
        inner: Cursor::new(data),
        base,
    };

    let count = cursor.u32("entry count")?;
    if count > limits.max_entries {
        return Err(FormatError::IndexTooLarge {
            what: "entry count",
            value: count as u64,
            limit: limits.max_entries as u64,
        }
        .into());
    }
    cursor.ensure(count as u64 * MIN_ENTRY_SIZE, "index entries")?;

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        entries.push(parse_binary_entry(&mut cursor)?);
    }

    let parsed = cursor.inner.position();
    if parsed != data.len() as u64 {
        return Err(FormatError::IndexLengthMismatch {
            declared: data.len() as u64,
            parsed,
        }
        .into());
    }

    Ok(entries)
}

fn parse_binary_entry(cursor: &mut IndexCursor<'_>) -> Result<FileEntry> {
    let name = cursor.name()?;
    let offset = cursor.u64("entry offset")?;
    let size = cursor.u64("entry size")?;
    let flags = EntryFlags::from_bits(&name, cursor.u32("entry flags")?)?;

    let original_size = if flags.is_encoded() {
        cursor.u64("entry original size")?
    } else {
        size
    };
    let checksum = if flags.has_checksum() {
        Some(Checksum::Crc32(cursor.u32("entry checksum")?))
    } else {
        None
    };

    Ok(FileEntry {
        name,
        offset,
        size,
        original_size,
        flags,
        checksum,
    })
}

/// Enforce name and range invariants shared by every layout.
fn validate_entries(
    entries: &[FileEntry],
    region: &Range<u64>,
) -> std::result::Result<(), FormatError> {
    let mut seen = HashSet::with_capacity(entries.len());

    for (i, entry) in entries.iter().enumerate() {
        if entry.name.is_empty() {
            return Err(FormatError::EmptyName(format!("entry #{i}")));
        }
        if !seen.insert(entry.name.as_str()) {
            return Err(FormatError::DuplicateName(entry.name.clone()));
        }

        let end = entry.offset.checked_add(entry.size);
        match end {
            Some(end) if entry.offset >= region.start && end <= region.end => {}
            _ => {
                return Err(FormatError::OutOfBounds {
                    name: entry.name.clone(),
                    offset: entry.offset,
                    end: end.unwrap_or(u64::MAX),
                    region_start: region.start,
                    region_end: region.end,
                });
            }
        }
    }

    Ok(())
}
