//! Payload verification and decoding.
//!
//! A read goes through these steps in order:
//!
//! 1. [`verify`] checks a CRC-32 over the stored bytes.
//! 2. [`decode_payload`] decrypts (through a caller-supplied
//!    [`PayloadDecryptor`]) and decompresses. Output is capped at the entry's
//!    recorded logical size.
//! 3. [`verify_logical`] checks a SHA-256 over the decoded bytes.
//!
//! Checksum failures and decode failures are reported as different
//! [`IntegrityError`] variants.

use byteorder::{ByteOrder, LittleEndian};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::ops::Range;

use crate::error::{IntegrityError, Result};
use crate::io::ReadAt;

use super::structures::{Checksum, Codec, FileEntry};

/// Chunk size for streaming the archive checksum.
const ARCHIVE_CHUNK: u64 = 64 * 1024;
/// Upper bound on preallocation for decoded output; the rest grows on demand.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;
/// An LZ4 block cannot expand by more than this factor, since a single
/// sequence byte encodes at most 255 bytes of match length.
const LZ4_MAX_RATIO: u64 = 255;

/// Decrypts entries whose flags mark them as encrypted.
///
/// No cipher is built in; callers that ship encrypted packs plug their own in
/// through [`OpenOptions::decryptor`](super::OpenOptions::decryptor).
pub trait PayloadDecryptor: Send + Sync {
    fn decrypt(&self, entry: &FileEntry, data: &[u8]) -> std::result::Result<Vec<u8>, String>;
}

fn decode_failed(entry: &FileEntry, reason: impl Into<String>) -> IntegrityError {
    IntegrityError::DecodeFailed {
        name: entry.name.clone(),
        reason: reason.into(),
    }
}

fn mismatch(entry: &FileEntry, expected: &Checksum, actual: String) -> IntegrityError {
    IntegrityError::ChecksumMismatch {
        name: entry.name.clone(),
        expected: expected.to_string(),
        actual,
    }
}

/// Check the stored-bytes checksum of `entry`, if it has one.
pub fn verify(entry: &FileEntry, stored: &[u8]) -> Result<()> {
    if let Some(expected @ Checksum::Crc32(crc)) = &entry.checksum {
        let actual = crc32fast::hash(stored);
        if actual != *crc {
            return Err(mismatch(entry, expected, Checksum::Crc32(actual).to_string()).into());
        }
    }
    Ok(())
}

/// Check the logical-bytes checksum of `entry`, if it has one.
pub fn verify_logical(entry: &FileEntry, logical: &[u8]) -> Result<()> {
    if let Some(expected @ Checksum::Sha256(digest)) = &entry.checksum {
        let actual: [u8; 32] = Sha256::digest(logical).into();
        if actual != *digest {
            return Err(mismatch(entry, expected, hex::encode(actual)).into());
        }
    }
    Ok(())
}

/// Turn stored bytes into the logical payload.
pub fn decode_payload(
    entry: &FileEntry,
    stored: Vec<u8>,
    decryptor: Option<&dyn PayloadDecryptor>,
) -> Result<Vec<u8>> {
    let plain = if entry.is_encrypted() {
        let decryptor = decryptor
            .ok_or_else(|| decode_failed(entry, "entry is encrypted but no decryptor is configured"))?;
        decryptor
            .decrypt(entry, &stored)
            .map_err(|e| decode_failed(entry, format!("decryption failed: {e}")))?
    } else {
        stored
    };

    let logical = match entry.codec() {
        Codec::Store => plain,
        Codec::Deflate => read_bounded(entry, flate2::read::DeflateDecoder::new(&plain[..]))?,
        Codec::Zstd => {
            let decoder = zstd::stream::read::Decoder::new(&plain[..])
                .map_err(|e| decode_failed(entry, format!("zstd: {e}")))?;
            read_bounded(entry, decoder)?
        }
        Codec::Lz4 => decode_lz4(entry, &plain)?,
    };

    if logical.len() as u64 != entry.original_size {
        return Err(decode_failed(
            entry,
            format!(
                "decoded {} bytes, expected {}",
                logical.len(),
                entry.original_size
            ),
        )
        .into());
    }
    Ok(logical)
}

/// Drain a decompressor, reading at most one byte past the expected size so
/// that oversized output is detected without being buffered.
fn read_bounded<D: Read>(entry: &FileEntry, decoder: D) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(entry.original_size.min(MAX_PREALLOC) as usize);
    decoder
        .take(entry.original_size + 1)
        .read_to_end(&mut out)
        .map_err(|e| decode_failed(entry, format!("{}: {e}", entry.codec().as_str())))?;
    Ok(out)
}

fn decode_lz4(entry: &FileEntry, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 4 {
        return Err(decode_failed(entry, "lz4 payload is missing its size prefix").into());
    }
    let declared = LittleEndian::read_u32(&data[..4]) as u64;
    if declared != entry.original_size {
        return Err(decode_failed(
            entry,
            format!(
                "lz4 size prefix says {declared} bytes, index says {}",
                entry.original_size
            ),
        )
        .into());
    }
    // The decoder allocates the prefix size up front
    let limit = (data.len() as u64 - 4).saturating_mul(LZ4_MAX_RATIO) + 16;
    if declared > limit {
        return Err(decode_failed(
            entry,
            format!(
                "lz4 size prefix of {declared} bytes exceeds what {} stored bytes can hold",
                data.len() - 4
            ),
        )
        .into());
    }
    lz4_flex::decompress_size_prepended(data)
        .map_err(|e| decode_failed(entry, format!("lz4: {e}")).into())
}

/// CRC-32 of `region`, streamed from `source` in fixed-size chunks.
pub async fn archive_checksum<R: ReadAt + ?Sized>(source: &R, region: Range<u64>) -> Result<u32> {
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; ARCHIVE_CHUNK.min(region.end.saturating_sub(region.start)) as usize];
    let mut pos = region.start;
    while pos < region.end {
        let n = (region.end - pos).min(ARCHIVE_CHUNK) as usize;
        source.read_exact_at(pos, &mut buf[..n]).await?;
        hasher.update(&buf[..n]);
        pos += n as u64;
    }
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::io::MemoryReader;
    use crate::pack::structures::EntryFlags;
    use std::io::Write;

    fn entry(codec: Codec, size: u64, original_size: u64, checksum: Option<Checksum>) -> FileEntry {
        FileEntry {
            name: "e".to_string(),
            offset: 0,
            size,
            original_size,
            flags: EntryFlags::new(codec, false, checksum.is_some()),
            checksum,
        }
    }

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc =
            flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn crc_over_stored_bytes() {
        let e = entry(Codec::Store, 5, 5, Some(Checksum::Crc32(crc32fast::hash(b"hello"))));
        verify(&e, b"hello").unwrap();
        let err = verify(&e, b"hellO").unwrap_err();
        assert!(matches!(
            err,
            Error::Integrity(IntegrityError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn sha256_over_logical_bytes() {
        let digest: [u8; 32] = Sha256::digest(b"hello").into();
        let e = entry(Codec::Store, 5, 5, Some(Checksum::Sha256(digest)));
        // stored-bytes verification ignores a logical checksum
        verify(&e, b"xxxxx").unwrap();
        verify_logical(&e, b"hello").unwrap();
        assert!(verify_logical(&e, b"world").is_err());
    }

    #[test]
    fn decodes_deflate() {
        let data = b"abcabcabcabcabcabcabc".repeat(10);
        let packed = deflate(&data);
        let e = entry(Codec::Deflate, packed.len() as u64, data.len() as u64, None);
        assert_eq!(decode_payload(&e, packed, None).unwrap(), data);
    }

    #[test]
    fn decodes_zstd() {
        let data = b"zstd zstd zstd zstd".repeat(20);
        let packed = zstd::stream::encode_all(&data[..], 3).unwrap();
        let e = entry(Codec::Zstd, packed.len() as u64, data.len() as u64, None);
        assert_eq!(decode_payload(&e, packed, None).unwrap(), data);
    }

    #[test]
    fn decodes_lz4_size_prepended() {
        let data = b"lz4 lz4 lz4 lz4 lz4".repeat(20);
        let packed = lz4_flex::compress_prepend_size(&data);
        let e = entry(Codec::Lz4, packed.len() as u64, data.len() as u64, None);
        assert_eq!(decode_payload(&e, packed, None).unwrap(), data);
    }

    #[test]
    fn lz4_prefix_must_match_index() {
        let packed = lz4_flex::compress_prepend_size(b"0123456789");
        let e = entry(Codec::Lz4, packed.len() as u64, 4, None);
        let err = decode_payload(&e, packed, None).unwrap_err();
        assert!(matches!(
            err,
            Error::Integrity(IntegrityError::DecodeFailed { .. })
        ));
    }

    #[test]
    fn lz4_prefix_beyond_block_capacity_is_refused() {
        let mut packed = u32::MAX.to_le_bytes().to_vec();
        packed.extend_from_slice(&[0x10, b'a', 0, 0]);
        let e = entry(Codec::Lz4, packed.len() as u64, u32::MAX as u64, None);
        let err = decode_payload(&e, packed, None).unwrap_err();
        assert!(matches!(
            err,
            Error::Integrity(IntegrityError::DecodeFailed { ref reason, .. })
                if reason.contains("exceeds")
        ));
    }

    #[test]
    fn oversized_output_is_decode_failure() {
        let data = vec![7u8; 4096];
        let packed = deflate(&data);
        let e = entry(Codec::Deflate, packed.len() as u64, 100, None);
        let err = decode_payload(&e, packed, None).unwrap_err();
        assert!(matches!(
            err,
            Error::Integrity(IntegrityError::DecodeFailed { ref reason, .. })
                if reason.contains("decoded 101 bytes")
        ));
    }

    #[test]
    fn garbage_is_decode_failure_not_checksum_failure() {
        let e = entry(Codec::Zstd, 8, 8, None);
        let err = decode_payload(&e, b"notzstd!".to_vec(), None).unwrap_err();
        assert!(matches!(
            err,
            Error::Integrity(IntegrityError::DecodeFailed { .. })
        ));
    }

    #[test]
    fn encrypted_without_decryptor_fails() {
        let mut e = entry(Codec::Store, 3, 3, None);
        e.flags = EntryFlags::new(Codec::Store, true, false);
        let err = decode_payload(&e, b"abc".to_vec(), None).unwrap_err();
        assert!(matches!(
            err,
            Error::Integrity(IntegrityError::DecodeFailed { ref reason, .. })
                if reason.contains("no decryptor")
        ));
    }

    struct Reverse;

    impl PayloadDecryptor for Reverse {
        fn decrypt(&self, _: &FileEntry, data: &[u8]) -> std::result::Result<Vec<u8>, String> {
            Ok(data.iter().rev().copied().collect())
        }
    }

    #[test]
    fn decryptor_runs_before_codec() {
        let mut e = entry(Codec::Store, 3, 3, None);
        e.flags = EntryFlags::new(Codec::Store, true, false);
        let out = decode_payload(&e, b"cba".to_vec(), Some(&Reverse)).unwrap();
        assert_eq!(out, b"abc");
    }

    #[tokio::test]
    async fn archive_checksum_streams_region() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 13) as u8).collect();
        let src = MemoryReader::new(data.clone());
        let crc = archive_checksum(&src, 100..data.len() as u64).await.unwrap();
        assert_eq!(crc, crc32fast::hash(&data[100..]));
        assert_eq!(archive_checksum(&src, 50..50).await.unwrap(), crc32fast::hash(b""));
    }
}
