//! Header decoding.
//!
//! The prologue (magic and version) is shared by every layout. What follows
//! depends on the version: version 2 stores length-prefixed binary fields,
//! version 1 stores a JSON manifest and a pointer to a JSON index at the end
//! of the file. Either way the result is a [`Header`] that tells the index
//! decoder where to look next.

use byteorder::{ByteOrder, LittleEndian};
use std::ops::Range;

use crate::error::{FormatError, Result};
use crate::io::ReadAt;

use super::legacy;
use super::structures::*;

/// Bytes fetched per source read while walking header fields.
const READ_AHEAD: u64 = 4096;

/// Where the index lives and how long it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexLocation {
    pub offset: u64,
    pub len: u64,
}

impl IndexLocation {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Decoded pack header.
#[derive(Debug, Clone)]
pub struct Header {
    pub metadata: PackMetadata,
    /// CRC-32 of the payload region, when the pack records one.
    pub archive_checksum: Option<u32>,
    pub index: IndexLocation,
    /// Byte range every entry payload must fall inside.
    pub payload: Range<u64>,
}

/// Forward-only cursor over a [`ReadAt`] source.
///
/// Every length is checked against the bytes left in the source before it is
/// used, so a corrupt length can neither read out of bounds nor drive a large
/// allocation. Reads are served from a small window to keep round trips low
/// on remote sources.
pub(crate) struct SourceCursor<'a, R: ReadAt + ?Sized> {
    source: &'a R,
    pos: u64,
    window: Vec<u8>,
    window_start: u64,
}

impl<'a, R: ReadAt + ?Sized> SourceCursor<'a, R> {
    pub fn new(source: &'a R, pos: u64) -> Self {
        Self {
            source,
            pos,
            window: Vec::new(),
            window_start: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn source_len(&self) -> u64 {
        self.source.size()
    }

    pub fn remaining(&self) -> u64 {
        self.source.size().saturating_sub(self.pos)
    }

    /// Consume `n` bytes, failing with `Truncated` if the source is shorter.
    pub async fn take(&mut self, n: u64, field: &'static str) -> Result<&[u8]> {
        let available = self.remaining();
        if n > available {
            return Err(FormatError::Truncated {
                field,
                offset: self.pos,
                needed: n,
                available,
            }
            .into());
        }

        let window_end = self.window_start + self.window.len() as u64;
        if self.pos < self.window_start || self.pos + n > window_end {
            let want = n.max(READ_AHEAD).min(available) as usize;
            self.window.clear();
            self.window.resize(want, 0);
            self.source.read_exact_at(self.pos, &mut self.window).await?;
            self.window_start = self.pos;
        }

        let start = (self.pos - self.window_start) as usize;
        self.pos += n;
        Ok(&self.window[start..start + n as usize])
    }

    pub async fn u8(&mut self, field: &'static str) -> Result<u8> {
        Ok(self.take(1, field).await?[0])
    }

    pub async fn u16(&mut self, field: &'static str) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2, field).await?))
    }

    pub async fn u32(&mut self, field: &'static str) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4, field).await?))
    }

    pub async fn i32(&mut self, field: &'static str) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4, field).await?))
    }

    pub async fn u64(&mut self, field: &'static str) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8, field).await?))
    }

    /// Length-prefixed text where [`ABSENT_TEXT`] means "no value".
    pub async fn optional_text(&mut self, field: &'static str) -> Result<Option<String>> {
        let len = self.u16(field).await?;
        if len == ABSENT_TEXT {
            return Ok(None);
        }
        let bytes = self.take(len as u64, field).await?;
        let text = std::str::from_utf8(bytes).map_err(|_| FormatError::InvalidText { field })?;
        Ok(Some(text.to_owned()))
    }
}

/// Decode the header of the pack in `source`.
///
/// The magic is compared before anything else is interpreted, so arbitrary
/// non-pack files are rejected after a single small read.
pub async fn decode_header<R: ReadAt + ?Sized>(source: &R) -> Result<Header> {
    let mut cursor = SourceCursor::new(source, 0);

    if cursor.remaining() < MAGIC.len() as u64 {
        let found = cursor.take(cursor.remaining(), "magic").await?.to_vec();
        return Err(FormatError::BadMagic { found }.into());
    }
    let magic = cursor.take(MAGIC.len() as u64, "magic").await?;
    if magic != MAGIC {
        return Err(FormatError::BadMagic {
            found: magic.to_vec(),
        }
        .into());
    }

    let version = cursor.u32("version").await?;
    let header = match version {
        VERSION_BINARY => decode_binary(&mut cursor).await?,
        VERSION_JSON => legacy::decode_header(&mut cursor).await?,
        v => return Err(FormatError::UnsupportedVersion(v).into()),
    };

    tracing::trace!(
        version,
        name = %header.metadata.name,
        index_offset = header.index.offset,
        index_len = header.index.len,
        "decoded pack header"
    );
    Ok(header)
}

async fn decode_binary<R: ReadAt + ?Sized>(cursor: &mut SourceCursor<'_, R>) -> Result<Header> {
    let flags = cursor.u16("header flags").await?;
    if flags & !HEADER_FLAGS_KNOWN != 0 {
        return Err(FormatError::ReservedFlags {
            context: "pack header".to_string(),
            flags: flags as u32,
        }
        .into());
    }

    let name = match cursor.optional_text("pack name").await? {
        Some(name) if !name.is_empty() => name,
        _ => return Err(FormatError::EmptyName("pack".to_string()).into()),
    };
    let author = cursor.optional_text("author").await?;
    let kind = PackKind::from_u8(cursor.u8("pack kind").await?)?;
    let priority = cursor.i32("priority").await?;
    let lang = cursor.optional_text("lang").await?;

    let archive_checksum = if flags & HEADER_FLAG_ARCHIVE_CHECKSUM != 0 {
        Some(cursor.u32("archive checksum").await?)
    } else {
        None
    };

    let index_len = cursor.u32("index length").await? as u64;
    let index = IndexLocation {
        offset: cursor.position(),
        len: index_len,
    };

    Ok(Header {
        metadata: PackMetadata {
            name,
            author,
            version: VERSION_BINARY,
            kind,
            priority,
            lang,
            pack_version: None,
            description: None,
            website: None,
            custom_ref: None,
        },
        archive_checksum,
        index,
        payload: index.end()..cursor.source_len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::io::MemoryReader;

    fn text(buf: &mut Vec<u8>, s: Option<&str>) {
        match s {
            Some(s) => {
                buf.extend_from_slice(&(s.len() as u16).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
            None => buf.extend_from_slice(&ABSENT_TEXT.to_le_bytes()),
        }
    }

    fn binary_header(name: Option<&str>, author: Option<&str>) -> Vec<u8> {
        let mut buf = MAGIC.to_vec();
        buf.extend_from_slice(&VERSION_BINARY.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        text(&mut buf, name);
        text(&mut buf, author);
        buf.push(PackKind::Text.as_u8());
        buf.extend_from_slice(&(-3i32).to_le_bytes());
        text(&mut buf, Some("th"));
        buf.extend_from_slice(&4u32.to_le_bytes());
        buf
    }

    #[tokio::test]
    async fn decodes_binary_fields() {
        let src = MemoryReader::new(binary_header(Some("Demo"), Some("")));
        let header = decode_header(&src).await.unwrap();
        let meta = &header.metadata;
        assert_eq!(meta.name, "Demo");
        assert_eq!(meta.author.as_deref(), Some(""));
        assert_eq!(meta.kind, PackKind::Text);
        assert_eq!(meta.priority, -3);
        assert_eq!(meta.lang.as_deref(), Some("th"));
        assert_eq!(header.archive_checksum, None);
        assert_eq!(header.index.len, 4);
        assert_eq!(header.index.offset, src.size());
        assert_eq!(header.payload, src.size() + 4..src.size());
    }

    #[tokio::test]
    async fn absent_author_is_none() {
        let src = MemoryReader::new(binary_header(Some("Demo"), None));
        let header = decode_header(&src).await.unwrap();
        assert_eq!(header.metadata.author, None);
    }

    #[tokio::test]
    async fn rejects_bad_magic_before_anything_else() {
        let src = MemoryReader::new(b"PK\x03\x04 not a pack".to_vec());
        let err = decode_header(&src).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Format(FormatError::BadMagic { ref found }) if found == b"PK\x03\x04 "
        ));
    }

    #[tokio::test]
    async fn tiny_source_is_bad_magic() {
        let src = MemoryReader::new(b"LP".to_vec());
        let err = decode_header(&src).await.unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::BadMagic { .. })));
    }

    #[tokio::test]
    async fn rejects_unknown_version() {
        let mut buf = MAGIC.to_vec();
        buf.extend_from_slice(&9u32.to_le_bytes());
        let err = decode_header(&MemoryReader::new(buf)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Format(FormatError::UnsupportedVersion(9))
        ));
    }

    #[tokio::test]
    async fn oversized_text_length_is_truncation() {
        let mut buf = MAGIC.to_vec();
        buf.extend_from_slice(&VERSION_BINARY.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&500u16.to_le_bytes());
        buf.extend_from_slice(b"short");
        let err = decode_header(&MemoryReader::new(buf)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Format(FormatError::Truncated {
                field: "pack name",
                needed: 500,
                available: 5,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn empty_pack_name_is_rejected() {
        let src = MemoryReader::new(binary_header(Some(""), None));
        let err = decode_header(&src).await.unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::EmptyName(_))));
    }

    #[tokio::test]
    async fn reserved_header_flags_are_rejected() {
        let mut buf = binary_header(Some("Demo"), None);
        buf[9] = 0x02;
        let err = decode_header(&MemoryReader::new(buf)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Format(FormatError::ReservedFlags { flags: 2, .. })
        ));
    }

    #[tokio::test]
    async fn cursor_refills_window_across_boundary() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let src = MemoryReader::new(data.clone());
        let mut cursor = SourceCursor::new(&src, 4090);
        let bytes = cursor.take(12, "span").await.unwrap().to_vec();
        assert_eq!(bytes, &data[4090..4102]);
        let bytes = cursor.take(5000, "big").await.unwrap().to_vec();
        assert_eq!(bytes, &data[4102..9102]);
        assert_eq!(cursor.position(), 9102);
    }
}
