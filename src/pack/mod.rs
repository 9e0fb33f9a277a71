//! LayerPack archive parsing and extraction.
//!
//! A pack is a single file holding named resources plus pack-level metadata.
//! This module reads packs from any [`ReadAt`](crate::io::ReadAt) source
//! without loading payloads up front.
//!
//! ## Architecture
//!
//! - [`structures`]: constants, flag words and the decoded data model
//! - [`header`]: magic, version and metadata decoding
//! - [`index`]: entry table decoding and validation
//! - [`legacy`]: the JSON-based version 1 layout
//! - [`integrity`]: checksums, decryption hook, decompression
//! - [`reader`]: [`ArchiveReader`], the query API
//! - [`extractor`]: writing entries to files or streams
//! - [`stack`]: priority-ordered overlay of several packs
//!
//! ## Pack Format Overview (version 2)
//!
//! ```text
//! [magic "LPACK"][version: u32][header flags: u16]
//! [name][author][kind: u8][priority: i32][lang]      text = u16 len + UTF-8
//! [archive crc32: u32]?                              0xFFFF len = absent
//! [index_len: u32]
//! [entry_count: u32] entry_count x {
//!     [name][offset: u64][size: u64][flags: u32]
//!     [original_size: u64]?  [crc32: u32]?
//! }
//! <payload region>
//! ```
//!
//! All integers are little-endian and offsets are absolute. The header is
//! read field by field, the index in one request, and each payload on demand.
//!
//! ## Supported Features
//!
//! - Version 1 (JSON manifest and index) and version 2 (binary) layouts
//! - STORE, DEFLATE, LZ4 and Zstandard payloads
//! - CRC-32 (stored bytes) and SHA-256 (logical bytes) entry checksums
//! - Whole-archive CRC-32, verified eagerly or on request
//!
//! ## Limitations
//!
//! - Read only; packs are produced by a separate packer
//! - No built-in cipher; encrypted entries need a [`PayloadDecryptor`]

mod extractor;
mod header;
mod index;
mod integrity;
mod legacy;
mod reader;
mod stack;
mod structures;

pub use extractor::{output_path, PackExtractor};
pub use header::{decode_header, Header, IndexLocation};
pub use index::{decode_index, IndexLimits};
pub use integrity::{decode_payload, verify, verify_logical, PayloadDecryptor};
pub use reader::{ArchiveReader, OpenOptions};
pub use stack::PackStack;
pub use structures::*;
