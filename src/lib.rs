//! # lpack
//!
//! A random-access reader for LayerPack (`.lpack`) archives.
//!
//! A LayerPack bundles named resources with pack-level metadata (name,
//! author, kind, priority). This library opens packs from the local
//! filesystem, from memory, or from HTTP servers using Range requests. Only
//! the header and index are read up front; each entry is fetched and decoded
//! when it is asked for.
//!
//! ## Features
//!
//! - Open packs from local files, memory buffers, or HTTP/HTTPS URLs
//! - Name lookup over an in-memory index, listing in on-disk order
//! - STORE, DEFLATE, LZ4 and Zstandard payloads
//! - Per-entry and whole-archive checksums, verified lazily or at open time
//! - Priority-ordered overlays of several packs ([`PackStack`])
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lpack::{ArchiveReader, HttpRangeReader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Open a remote pack; only the header and index are downloaded
//!     let reader = Arc::new(HttpRangeReader::new("https://example.com/base.lpack".to_string()).await?);
//!     let pack = ArchiveReader::open(reader).await?;
//!
//!     println!("{} (author: {:?})", pack.metadata().name, pack.metadata().author);
//!     for name in pack.list() {
//!         println!("{}", name);
//!     }
//!
//!     let bytes = pack.read("hello.txt").await?;
//!     println!("{}", String::from_utf8_lossy(&bytes));
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod pack;

pub use cli::Cli;
pub use error::{Error, FormatError, IntegrityError, Result};
pub use io::{HttpRangeReader, LocalFileReader, MemoryReader, ReadAt};
pub use pack::{
    ArchiveReader, FileEntry, OpenOptions, PackExtractor, PackMetadata, PackStack,
    PayloadDecryptor,
};
