//! Error types for reading LayerPack archives.
//!
//! Failures fall into three families that callers can branch on:
//!
//! - [`FormatError`]: the source is not a well-formed pack. Raised only while
//!   opening, and fatal to that open call.
//! - [`Error::NotFound`]: a requested entry is absent from the index. Local to
//!   a single read.
//! - [`IntegrityError`]: an entry's bytes failed verification or decoding.
//!   Local to a single read; other entries stay readable.

use thiserror::Error;

/// Structural problems detected while decoding the header or the index.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The source does not start with the `LPACK` signature.
    #[error("bad magic: expected \"LPACK\", found {found:02x?}")]
    BadMagic { found: Vec<u8> },

    /// The format version is not one this reader knows how to decode.
    #[error("unsupported pack version: {0} (supported: 1-2)")]
    UnsupportedVersion(u32),

    /// A field extends past the end of the source or of its enclosing section.
    #[error("truncated {field} at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        field: &'static str,
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// An entry's payload range falls outside the region it must live in.
    #[error("entry {name:?} spans {offset}..{end}, outside the payload region {region_start}..{region_end}")]
    OutOfBounds {
        name: String,
        offset: u64,
        end: u64,
        region_start: u64,
        region_end: u64,
    },

    /// Two entries share a name.
    #[error("duplicate entry name: {0:?}")]
    DuplicateName(String),

    /// An entry (or the pack itself) has an empty name.
    #[error("empty name for {0}")]
    EmptyName(String),

    /// The index declares more entries or bytes than the configured cap.
    #[error("index too large: {what} is {value}, limit is {limit}")]
    IndexTooLarge {
        what: &'static str,
        value: u64,
        limit: u64,
    },

    /// The declared index length disagrees with the bytes actually parsed.
    #[error("index length mismatch: header declares {declared} bytes, entries occupy {parsed}")]
    IndexLengthMismatch { declared: u64, parsed: u64 },

    /// Reserved flag bits are set.
    #[error("reserved flag bits set on {context}: {flags:#x}")]
    ReservedFlags { context: String, flags: u32 },

    /// The codec field names no known codec.
    #[error("unknown codec {codec} on entry {name:?}")]
    UnknownCodec { name: String, codec: u32 },

    /// The pack kind byte is outside the known range.
    #[error("unknown pack kind: {0}")]
    UnknownPackKind(u8),

    /// A text field is not valid UTF-8.
    #[error("{field} is not valid UTF-8")]
    InvalidText { field: &'static str },

    /// A checksum field cannot be parsed.
    #[error("invalid checksum on entry {name:?}: {reason}")]
    InvalidChecksum { name: String, reason: String },

    /// The JSON manifest or index of a version 1 pack is malformed.
    #[error("malformed {section} JSON: {source}")]
    Json {
        section: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Per-entry verification and decoding failures.
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// The stored or decoded bytes do not match the recorded checksum.
    #[error("checksum mismatch for {name:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// The payload region does not match the whole-archive checksum.
    #[error("archive checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ArchiveChecksumMismatch { expected: u32, actual: u32 },

    /// Decryption or decompression failed, or produced the wrong length.
    #[error("failed to decode {name:?}: {reason}")]
    DecodeFailed { name: String, reason: String },
}

/// The error type for all pack operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// The requested entry is not in the index.
    #[error("entry not found in pack: {0}")]
    NotFound(String),

    /// An entry name cannot be mapped safely onto the filesystem.
    #[error("refusing to extract unsafe path: {0}")]
    UnsafePath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn as_format(&self) -> Option<&FormatError> {
        match self {
            Error::Format(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_integrity(&self) -> Option<&IntegrityError> {
        match self {
            Error::Integrity(e) => Some(e),
            _ => None,
        }
    }
}

/// A convenience `Result` alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
