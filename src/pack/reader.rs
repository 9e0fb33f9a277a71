use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, IntegrityError, Result};
use crate::io::{HttpRangeReader, LocalFileReader, MemoryReader, ReadAt};

use super::header::{decode_header, Header};
use super::index::{decode_index, IndexLimits};
use super::integrity::{self, PayloadDecryptor};
use super::structures::{FileEntry, PackMetadata};

/// Settings applied when opening a pack.
#[derive(Clone)]
pub struct OpenOptions {
    eager_checksum: bool,
    verify_checksums: bool,
    limits: IndexLimits,
    decryptor: Option<Arc<dyn PayloadDecryptor>>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            eager_checksum: false,
            verify_checksums: true,
            limits: IndexLimits::default(),
            decryptor: None,
        }
    }
}

impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("eager_checksum", &self.eager_checksum)
            .field("verify_checksums", &self.verify_checksums)
            .field("limits", &self.limits)
            .field("decryptor", &self.decryptor.is_some())
            .finish()
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify every entry and the archive checksum during `open`, failing fast
    /// on the first mismatch. Off by default: open stays cheap and each entry
    /// is verified when it is read.
    ///
    /// Eager verification always checks checksums, even with
    /// [`verify_checksums(false)`](Self::verify_checksums). It also decodes
    /// every entry, so a pack holding encrypted entries fails to open unless a
    /// [`decryptor`](Self::decryptor) is set.
    pub fn eager_checksum(mut self, eager: bool) -> Self {
        self.eager_checksum = eager;
        self
    }

    /// Check recorded checksums at all. Decoding still happens when disabled.
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    pub fn max_entries(mut self, max: u32) -> Self {
        self.limits.max_entries = max;
        self
    }

    pub fn max_index_bytes(mut self, max: u64) -> Self {
        self.limits.max_index_bytes = max;
        self
    }

    pub fn decryptor(mut self, decryptor: Arc<dyn PayloadDecryptor>) -> Self {
        self.decryptor = Some(decryptor);
        self
    }
}

/// Random-access reader over an opened pack.
///
/// Opening decodes the header and index and builds the name lookup; that is
/// the only eager work. Payloads are read on demand with positioned reads, so
/// a reader can be shared across tasks (e.g. behind an `Arc`) and read from
/// concurrently.
///
/// ## Example
///
/// ```no_run
/// use lpack::ArchiveReader;
///
/// # async fn run() -> lpack::Result<()> {
/// let pack = ArchiveReader::open_path("demo.lpack").await?;
/// println!("{} by {:?}", pack.metadata().name, pack.metadata().author);
/// for name in pack.list() {
///     let bytes = pack.read(name).await?;
///     println!("{name}: {} bytes", bytes.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct ArchiveReader<R: ReadAt + ?Sized> {
    source: Arc<R>,
    metadata: PackMetadata,
    entries: Vec<FileEntry>,
    lookup: HashMap<String, usize>,
    header: Header,
    options: OpenOptions,
}

impl<R: ReadAt + ?Sized> ArchiveReader<R> {
    /// Open a pack with default options.
    pub async fn open(source: Arc<R>) -> Result<Self> {
        Self::open_with(source, OpenOptions::default()).await
    }

    /// Decode header and index from `source`.
    ///
    /// Any format violation aborts the open; no partially decoded reader is
    /// ever returned.
    pub async fn open_with(source: Arc<R>, options: OpenOptions) -> Result<Self> {
        let header = decode_header(source.as_ref()).await?;
        let entries = decode_index(source.as_ref(), &header, &options.limits).await?;

        let lookup = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();

        let reader = Self {
            source,
            metadata: header.metadata.clone(),
            entries,
            lookup,
            header,
            options,
        };

        tracing::debug!(
            name = %reader.metadata.name,
            version = reader.metadata.version,
            entries = reader.entries.len(),
            "opened pack"
        );

        if reader.options.eager_checksum {
            reader.verify_archive().await?;
            reader.verify_all().await?;
        }

        Ok(reader)
    }

    pub fn metadata(&self) -> &PackMetadata {
        &self.metadata
    }

    /// Entry names in on-disk order.
    pub fn list(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// All entries in on-disk order.
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&FileEntry> {
        self.lookup.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The whole-archive CRC-32 recorded in the header, if any.
    pub fn archive_checksum(&self) -> Option<u32> {
        self.header.archive_checksum
    }

    pub fn source(&self) -> &Arc<R> {
        &self.source
    }

    fn lookup_entry(&self, name: &str) -> Result<&FileEntry> {
        self.entry(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    async fn read_stored(&self, entry: &FileEntry) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; entry.size as usize];
        self.source.read_exact_at(entry.offset, &mut buf).await?;
        Ok(buf)
    }

    /// Read and decode the entry called `name`.
    ///
    /// Checksums are verified (unless disabled) and the payload is decoded
    /// before it is returned. Nothing is cached: every call performs a fresh
    /// read from the source, so callers reading the same entry repeatedly
    /// should keep the bytes themselves.
    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self.lookup_entry(name)?;
        tracing::trace!(name, offset = entry.offset, size = entry.size, "reading entry");

        let stored = self.read_stored(entry).await?;
        if self.options.verify_checksums {
            integrity::verify(entry, &stored)?;
        }
        let logical = integrity::decode_payload(entry, stored, self.options.decryptor.as_deref())?;
        if self.options.verify_checksums {
            integrity::verify_logical(entry, &logical)?;
        }
        Ok(logical)
    }

    /// Read the stored bytes of `name` without verifying or decoding them.
    pub async fn read_raw(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self.lookup_entry(name)?;
        self.read_stored(entry).await
    }

    /// Fully read, verify and decode one entry, discarding the bytes.
    pub async fn verify_entry(&self, name: &str) -> Result<()> {
        let entry = self.lookup_entry(name)?;
        let stored = self.read_stored(entry).await?;
        integrity::verify(entry, &stored)?;
        let logical = integrity::decode_payload(entry, stored, self.options.decryptor.as_deref())?;
        integrity::verify_logical(entry, &logical)
    }

    /// Verify every entry, stopping at the first failure.
    pub async fn verify_all(&self) -> Result<()> {
        for entry in &self.entries {
            self.verify_entry(&entry.name).await?;
        }
        Ok(())
    }

    /// Check the whole-archive checksum. Packs without one pass trivially.
    pub async fn verify_archive(&self) -> Result<()> {
        let Some(expected) = self.header.archive_checksum else {
            return Ok(());
        };
        let actual =
            integrity::archive_checksum(self.source.as_ref(), self.header.payload.clone()).await?;
        if actual != expected {
            return Err(IntegrityError::ArchiveChecksumMismatch { expected, actual }.into());
        }
        Ok(())
    }
}

impl<R: ReadAt + 'static> ArchiveReader<R> {
    /// Erase the source type so packs from different sources can share a
    /// collection, such as a [`PackStack`](super::PackStack).
    pub fn into_dyn(self) -> ArchiveReader<dyn ReadAt> {
        ArchiveReader {
            source: self.source,
            metadata: self.metadata,
            entries: self.entries,
            lookup: self.lookup,
            header: self.header,
            options: self.options,
        }
    }
}

impl ArchiveReader<LocalFileReader> {
    pub async fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_path_with(path, OpenOptions::default()).await
    }

    pub async fn open_path_with(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let reader = LocalFileReader::new(path.as_ref())?;
        Self::open_with(Arc::new(reader), options).await
    }
}

impl ArchiveReader<MemoryReader> {
    pub async fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with(data, OpenOptions::default()).await
    }

    pub async fn from_bytes_with(data: Vec<u8>, options: OpenOptions) -> Result<Self> {
        Self::open_with(Arc::new(MemoryReader::from(data)), options).await
    }
}

impl ArchiveReader<HttpRangeReader> {
    pub async fn open_url(url: impl Into<String>) -> Result<Self> {
        Self::open_url_with(url, OpenOptions::default()).await
    }

    pub async fn open_url_with(url: impl Into<String>, options: OpenOptions) -> Result<Self> {
        let reader = HttpRangeReader::new(url.into()).await?;
        Self::open_with(Arc::new(reader), options).await
    }
}
