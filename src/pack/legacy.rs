//! Version 1 layout, as written by the first LayerPack packer.
//!
//! The manifest sits right after the prologue as a length-prefixed JSON
//! object, followed by an `(offset, len)` pointer to a JSON array of entries
//! stored after all payload data:
//!
//! ```text
//! [magic][version=1][manifest_len: u32][manifest JSON]
//! [index_offset: u64][index_len: u32]
//! <payload region>
//! [index JSON]            (at index_offset, index_len bytes)
//! ```

use serde::Deserialize;

use crate::error::{FormatError, Result};
use crate::io::ReadAt;

use super::header::{Header, IndexLocation, SourceCursor};
use super::index::IndexLimits;
use super::structures::*;

#[derive(Debug, Deserialize)]
struct Manifest {
    name: String,
    #[serde(rename = "type")]
    kind: PackKind,
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    custom_ref: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    website: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Encryption {
    #[default]
    None,
    Aes256gcm,
}

#[derive(Debug, Deserialize)]
struct IndexRecord {
    path: String,
    offset: u64,
    original_size: u64,
    compressed_size: u64,
    compression: Codec,
    #[serde(default)]
    encryption: Encryption,
    #[serde(default)]
    hash: String,
}

pub(crate) async fn decode_header<R: ReadAt + ?Sized>(
    cursor: &mut SourceCursor<'_, R>,
) -> Result<Header> {
    let manifest_len = cursor.u32("manifest length").await? as u64;
    let manifest_bytes = cursor.take(manifest_len, "manifest").await?;
    let manifest: Manifest =
        serde_json::from_slice(manifest_bytes).map_err(|source| FormatError::Json {
            section: "manifest",
            source,
        })?;

    if manifest.name.is_empty() {
        return Err(FormatError::EmptyName("pack".to_string()).into());
    }

    let index = IndexLocation {
        offset: cursor.u64("index offset").await?,
        len: cursor.u32("index length").await? as u64,
    };
    let payload = cursor.position()..index.offset;

    Ok(Header {
        metadata: PackMetadata {
            name: manifest.name,
            author: manifest.author,
            version: VERSION_JSON,
            kind: manifest.kind,
            priority: manifest.priority,
            lang: manifest.lang,
            pack_version: manifest.version,
            description: manifest.description,
            website: manifest.website,
            custom_ref: manifest.custom_ref,
        },
        archive_checksum: None,
        index,
        payload,
    })
}

/// Parse the JSON index of a version 1 pack.
pub(crate) fn parse_index(data: &[u8], limits: &IndexLimits) -> Result<Vec<FileEntry>> {
    let records: Vec<IndexRecord> =
        serde_json::from_slice(data).map_err(|source| FormatError::Json {
            section: "index",
            source,
        })?;

    if records.len() as u64 > limits.max_entries as u64 {
        return Err(FormatError::IndexTooLarge {
            what: "entry count",
            value: records.len() as u64,
            limit: limits.max_entries as u64,
        }
        .into());
    }

    records.into_iter().map(into_entry).collect()
}

fn into_entry(record: IndexRecord) -> Result<FileEntry> {
    let checksum = if record.hash.is_empty() {
        None
    } else {
        let digest = hex::decode(&record.hash)
            .ok()
            .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
            .ok_or_else(|| FormatError::InvalidChecksum {
                name: record.path.clone(),
                reason: format!("expected 64 hex digits of SHA-256, got {:?}", record.hash),
            })?;
        Some(Checksum::Sha256(digest))
    };

    let encrypted = matches!(record.encryption, Encryption::Aes256gcm);
    Ok(FileEntry {
        flags: EntryFlags::new(record.compression, encrypted, false),
        name: record.path,
        offset: record.offset,
        size: record.compressed_size,
        original_size: record.original_size,
        checksum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn parses_json_index_records() {
        let json = br#"[
            {"path":"a.txt","offset":40,"original_size":3,"compressed_size":3,
             "compression":"store","hash":""},
            {"path":"b.lua","offset":43,"original_size":10,"compressed_size":7,
             "compression":"lz4","encryption":"none",
             "hash":"0000000000000000000000000000000000000000000000000000000000000001"}
        ]"#;
        let entries = parse_index(json, &IndexLimits::default()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.txt");
        assert_eq!(entries[0].checksum, None);
        assert_eq!(entries[1].codec(), Codec::Lz4);
        assert_eq!(entries[1].size, 7);
        assert_eq!(entries[1].original_size, 10);
        assert!(matches!(entries[1].checksum, Some(Checksum::Sha256(d)) if d[31] == 1));
    }

    #[test]
    fn encrypted_records_carry_the_flag() {
        let json = br#"[{"path":"s","offset":0,"original_size":1,"compressed_size":29,
                         "compression":"store","encryption":"aes256gcm","hash":""}]"#;
        let entries = parse_index(json, &IndexLimits::default()).unwrap();
        assert!(entries[0].is_encrypted());
    }

    #[test]
    fn malformed_hash_is_rejected() {
        let json = br#"[{"path":"a","offset":0,"original_size":1,"compressed_size":1,
                         "compression":"store","hash":"xyz"}]"#;
        let err = parse_index(json, &IndexLimits::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::Format(FormatError::InvalidChecksum { .. })
        ));
    }

    #[test]
    fn unknown_compression_is_json_error() {
        let json = br#"[{"path":"a","offset":0,"original_size":1,"compressed_size":1,
                         "compression":"brotli","hash":""}]"#;
        let err = parse_index(json, &IndexLimits::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::Format(FormatError::Json { section: "index", .. })
        ));
    }

    #[test]
    fn entry_cap_applies() {
        let json = br#"[{"path":"a","offset":0,"original_size":0,"compressed_size":0,"compression":"store"},
                        {"path":"b","offset":0,"original_size":0,"compressed_size":0,"compression":"store"}]"#;
        let limits = IndexLimits {
            max_entries: 1,
            ..IndexLimits::default()
        };
        let err = parse_index(json, &limits).unwrap_err();
        assert!(matches!(
            err,
            Error::Format(FormatError::IndexTooLarge { value: 2, .. })
        ));
    }
}
