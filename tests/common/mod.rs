//! Test-only pack writer for both layouts.
#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use sha2::{Digest, Sha256};
use std::io::Write;

use lpack::pack::{
    ABSENT_TEXT, Codec, EntryFlags, HEADER_FLAG_ARCHIVE_CHECKSUM, MAGIC, PackKind, VERSION_BINARY,
    VERSION_JSON,
};

pub fn encode(codec: Codec, data: &[u8]) -> Vec<u8> {
    match codec {
        Codec::Store => data.to_vec(),
        Codec::Deflate => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        }
        Codec::Lz4 => lz4_flex::compress_prepend_size(data),
        Codec::Zstd => zstd::encode_all(data, 3).unwrap(),
    }
}

struct PendingEntry {
    name: String,
    data: Vec<u8>,
    codec: Codec,
    checksum: bool,
    encrypted: bool,
}

/// Key of the toy cipher used for encrypted test entries.
pub const XOR_KEY: u8 = 0x5A;

pub fn xor(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| b ^ XOR_KEY).collect()
}

/// Writes version 2 packs.
pub struct PackBuilder {
    name: Option<String>,
    author: Option<String>,
    kind: PackKind,
    priority: i32,
    lang: Option<String>,
    archive_checksum: bool,
    entries: Vec<PendingEntry>,
}

impl PackBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            author: None,
            kind: PackKind::Base,
            priority: 0,
            lang: None,
            archive_checksum: false,
            entries: Vec::new(),
        }
    }

    pub fn author(mut self, author: &str) -> Self {
        self.author = Some(author.to_string());
        self
    }

    pub fn kind(mut self, kind: PackKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn lang(mut self, lang: &str) -> Self {
        self.lang = Some(lang.to_string());
        self
    }

    pub fn archive_checksum(mut self) -> Self {
        self.archive_checksum = true;
        self
    }

    /// Stored entry with a CRC-32.
    pub fn file(self, name: &str, data: &[u8]) -> Self {
        self.entry(name, data, Codec::Store, true)
    }

    pub fn entry(mut self, name: &str, data: &[u8], codec: Codec, checksum: bool) -> Self {
        self.entries.push(PendingEntry {
            name: name.to_string(),
            data: data.to_vec(),
            codec,
            checksum,
            encrypted: false,
        });
        self
    }

    /// Entry whose encoded bytes are passed through [`xor`].
    pub fn encrypted(mut self, name: &str, data: &[u8], codec: Codec) -> Self {
        self.entries.push(PendingEntry {
            name: name.to_string(),
            data: data.to_vec(),
            codec,
            checksum: true,
            encrypted: true,
        });
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut header = MAGIC.to_vec();
        header.write_u32::<LittleEndian>(VERSION_BINARY).unwrap();
        let flags = if self.archive_checksum {
            HEADER_FLAG_ARCHIVE_CHECKSUM
        } else {
            0
        };
        header.write_u16::<LittleEndian>(flags).unwrap();
        write_text(&mut header, self.name.as_deref());
        write_text(&mut header, self.author.as_deref());
        header.push(self.kind.as_u8());
        header.write_i32::<LittleEndian>(self.priority).unwrap();
        write_text(&mut header, self.lang.as_deref());

        let stored: Vec<Vec<u8>> = self
            .entries
            .iter()
            .map(|e| {
                let encoded = encode(e.codec, &e.data);
                if e.encrypted { xor(&encoded) } else { encoded }
            })
            .collect();

        let index_len: usize = 4 + self
            .entries
            .iter()
            .map(|e| {
                let mut n = 2 + e.name.len() + 8 + 8 + 4;
                if e.codec != Codec::Store || e.encrypted {
                    n += 8;
                }
                if e.checksum {
                    n += 4;
                }
                n
            })
            .sum::<usize>();

        let crc_len = if self.archive_checksum { 4 } else { 0 };
        let payload_start = (header.len() + crc_len + 4 + index_len) as u64;

        let mut index = Vec::with_capacity(index_len);
        index
            .write_u32::<LittleEndian>(self.entries.len() as u32)
            .unwrap();
        let mut payload = Vec::new();
        for (entry, bytes) in self.entries.iter().zip(&stored) {
            let flags = EntryFlags::new(entry.codec, entry.encrypted, entry.checksum);
            write_text(&mut index, Some(&entry.name));
            index
                .write_u64::<LittleEndian>(payload_start + payload.len() as u64)
                .unwrap();
            index.write_u64::<LittleEndian>(bytes.len() as u64).unwrap();
            index.write_u32::<LittleEndian>(flags.bits()).unwrap();
            if flags.is_encoded() {
                index
                    .write_u64::<LittleEndian>(entry.data.len() as u64)
                    .unwrap();
            }
            if entry.checksum {
                index
                    .write_u32::<LittleEndian>(crc32fast::hash(bytes))
                    .unwrap();
            }
            payload.extend_from_slice(bytes);
        }
        assert_eq!(index.len(), index_len);

        let mut out = header;
        if self.archive_checksum {
            out.write_u32::<LittleEndian>(crc32fast::hash(&payload))
                .unwrap();
        }
        out.write_u32::<LittleEndian>(index_len as u32).unwrap();
        out.extend_from_slice(&index);
        out.extend_from_slice(&payload);
        out
    }
}

fn write_text(buf: &mut Vec<u8>, text: Option<&str>) {
    match text {
        Some(s) => {
            buf.write_u16::<LittleEndian>(s.len() as u16).unwrap();
            buf.extend_from_slice(s.as_bytes());
        }
        None => buf.write_u16::<LittleEndian>(ABSENT_TEXT).unwrap(),
    }
}

/// Write a version 1 pack the way the JSON-era packer lays it out, with a
/// SHA-256 of every file's logical bytes.
pub fn legacy_pack(manifest: &str, files: &[(&str, &[u8], Codec)]) -> Vec<u8> {
    let mut out = MAGIC.to_vec();
    out.write_u32::<LittleEndian>(VERSION_JSON).unwrap();
    out.write_u32::<LittleEndian>(manifest.len() as u32).unwrap();
    out.extend_from_slice(manifest.as_bytes());

    let pointer_at = out.len();
    out.write_u64::<LittleEndian>(0).unwrap();
    out.write_u32::<LittleEndian>(0).unwrap();

    let mut records = Vec::new();
    for (path, data, codec) in files {
        let stored = encode(*codec, data);
        records.push(format!(
            r#"{{"path":"{}","offset":{},"original_size":{},"compressed_size":{},"compression":"{}","encryption":"none","hash":"{}"}}"#,
            path,
            out.len(),
            data.len(),
            stored.len(),
            codec.as_str(),
            hex::encode(Sha256::digest(data)),
        ));
        out.extend_from_slice(&stored);
    }

    let index = format!("[{}]", records.join(","));
    let index_offset = out.len() as u64;
    out.extend_from_slice(index.as_bytes());

    let mut pointer = Vec::new();
    pointer.write_u64::<LittleEndian>(index_offset).unwrap();
    pointer
        .write_u32::<LittleEndian>(index.len() as u32)
        .unwrap();
    out[pointer_at..pointer_at + 12].copy_from_slice(&pointer);
    out
}
