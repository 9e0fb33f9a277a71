use serde::Deserialize;
use std::fmt;

use crate::error::FormatError;

/// Signature at offset 0 of every pack.
pub const MAGIC: &[u8; 5] = b"LPACK";

/// Legacy layout: JSON manifest and JSON index.
pub const VERSION_JSON: u32 = 1;
/// Binary layout with length-prefixed fields.
pub const VERSION_BINARY: u32 = 2;

/// Length prefix marking an optional text field as absent.
pub const ABSENT_TEXT: u16 = 0xFFFF;

/// Pack-level flag: a CRC-32 of the payload region follows the metadata.
pub const HEADER_FLAG_ARCHIVE_CHECKSUM: u16 = 0x0001;
pub const HEADER_FLAGS_KNOWN: u16 = HEADER_FLAG_ARCHIVE_CHECKSUM;

/// File extension of pack files, without the dot.
pub const PACK_EXTENSION: &str = "lpack";

/// MIME type the packer registers for `.lpack` files.
pub const CONTENT_TYPE: &str = "application/x-layerpack";

/// Codec applied to an entry's payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Store,
    Deflate,
    Lz4,
    Zstd,
}

impl Codec {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Codec::Store),
            1 => Some(Codec::Deflate),
            2 => Some(Codec::Lz4),
            3 => Some(Codec::Zstd),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Codec::Store => 0,
            Codec::Deflate => 1,
            Codec::Lz4 => 2,
            Codec::Zstd => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::Store => "store",
            Codec::Deflate => "deflate",
            Codec::Lz4 => "lz4",
            Codec::Zstd => "zstd",
        }
    }
}

/// Per-entry flag word.
///
/// Bits 0..3 select the [`Codec`], bit 4 marks the payload as encrypted,
/// bit 5 says a CRC-32 of the stored bytes follows the entry. All other bits
/// are reserved and must be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryFlags(u32);

impl EntryFlags {
    pub const CODEC_MASK: u32 = 0x0000_000F;
    pub const ENCRYPTED: u32 = 0x0000_0010;
    pub const HAS_CHECKSUM: u32 = 0x0000_0020;
    pub const KNOWN: u32 = Self::CODEC_MASK | Self::ENCRYPTED | Self::HAS_CHECKSUM;

    /// Validate a raw flag word read from entry `name`.
    pub fn from_bits(name: &str, bits: u32) -> Result<Self, FormatError> {
        if bits & !Self::KNOWN != 0 {
            return Err(FormatError::ReservedFlags {
                context: format!("entry {name:?}"),
                flags: bits,
            });
        }
        let codec = bits & Self::CODEC_MASK;
        if Codec::from_u32(codec).is_none() {
            return Err(FormatError::UnknownCodec {
                name: name.to_string(),
                codec,
            });
        }
        Ok(Self(bits))
    }

    pub fn new(codec: Codec, encrypted: bool, has_checksum: bool) -> Self {
        let mut bits = codec.as_u32();
        if encrypted {
            bits |= Self::ENCRYPTED;
        }
        if has_checksum {
            bits |= Self::HAS_CHECKSUM;
        }
        Self(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn codec(&self) -> Codec {
        // Checked in from_bits / built by new, so the fallback never fires.
        Codec::from_u32(self.0 & Self::CODEC_MASK).unwrap_or(Codec::Store)
    }

    pub fn is_encrypted(&self) -> bool {
        self.0 & Self::ENCRYPTED != 0
    }

    pub fn has_checksum(&self) -> bool {
        self.0 & Self::HAS_CHECKSUM != 0
    }

    /// Whether the stored bytes differ from the logical bytes.
    pub fn is_encoded(&self) -> bool {
        self.codec() != Codec::Store || self.is_encrypted()
    }
}

/// Integrity value recorded for an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checksum {
    /// CRC-32 (IEEE) of the stored bytes, before any decoding.
    Crc32(u32),
    /// SHA-256 of the logical bytes, after decoding.
    Sha256([u8; 32]),
}

impl Checksum {
    pub fn algorithm(&self) -> &'static str {
        match self {
            Checksum::Crc32(_) => "crc32",
            Checksum::Sha256(_) => "sha256",
        }
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checksum::Crc32(v) => write!(f, "{v:08x}"),
            Checksum::Sha256(d) => f.write_str(&hex::encode(d)),
        }
    }
}

/// What a pack holds, as declared by its author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackKind {
    Base,
    Text,
    Image,
    Audio,
    Script,
    Mod,
    Other,
}

impl PackKind {
    pub fn from_u8(value: u8) -> Result<Self, FormatError> {
        Ok(match value {
            0 => PackKind::Base,
            1 => PackKind::Text,
            2 => PackKind::Image,
            3 => PackKind::Audio,
            4 => PackKind::Script,
            5 => PackKind::Mod,
            6 => PackKind::Other,
            v => return Err(FormatError::UnknownPackKind(v)),
        })
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            PackKind::Base => 0,
            PackKind::Text => 1,
            PackKind::Image => 2,
            PackKind::Audio => 3,
            PackKind::Script => 4,
            PackKind::Mod => 5,
            PackKind::Other => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PackKind::Base => "base",
            PackKind::Text => "text",
            PackKind::Image => "image",
            PackKind::Audio => "audio",
            PackKind::Script => "script",
            PackKind::Mod => "mod",
            PackKind::Other => "other",
        }
    }
}

/// Pack-level attributes decoded from the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackMetadata {
    pub name: String,
    /// `None` when the pack records no author; `Some("")` is a present but
    /// empty author and is kept distinct.
    pub author: Option<String>,
    /// Format version the pack was decoded with.
    pub version: u32,
    pub kind: PackKind,
    /// Layer ordering: higher priority wins in a [`PackStack`](super::PackStack).
    pub priority: i32,
    pub lang: Option<String>,
    // The remaining fields are only carried by version 1 manifests.
    /// Free-form release string chosen by the pack author, e.g. `"1.0"`.
    pub pack_version: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub custom_ref: Option<String>,
}

/// One named resource inside a pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    /// Absolute offset of the stored bytes within the source.
    pub offset: u64,
    /// Stored length, after any encoding.
    pub size: u64,
    /// Logical length, after decoding.
    pub original_size: u64,
    pub flags: EntryFlags,
    pub checksum: Option<Checksum>,
}

impl FileEntry {
    /// One past the last stored byte.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn codec(&self) -> Codec {
        self.flags.codec()
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags.is_encrypted()
    }
}
