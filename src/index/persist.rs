// SPDX-License-Identifier: MIT OR Apache-2.0

//! Binary artifacts for the index and its metadata.
//!
//! A corpus is persisted as two files written together:
//!
//! ```text
//! index.bin      "DQIX" | version u16 | flags u16 | dimension u32 | rows u64
//!                | pair_tag u64 | rows * dimension f32 | blake3 checksum
//! metadata.bin   "DQMD" | version u16 | reserved u16 | count u64 | pair_tag u64
//!                | count * { page u32, chunk_id u32, text, source } | blake3 checksum
//! ```
//!
//! All integers are little-endian; strings are a u32 byte length followed by
//! UTF-8. The pair tag is a digest of the vector payload and the encoded
//! records together. It must match in both headers and be reproducible from
//! the loaded contents, along with the row count, for a load to succeed.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::{RagError, Result};
use crate::index::{ChunkRecord, IndexBackend, IndexSnapshot, MetadataStore, VectorIndex};

pub const INDEX_FILE: &str = "index.bin";
pub const METADATA_FILE: &str = "metadata.bin";

const INDEX_MAGIC: &[u8; 4] = b"DQIX";
const METADATA_MAGIC: &[u8; 4] = b"DQMD";
const FORMAT_VERSION: u16 = 1;
const FLAG_NORMALIZED: u16 = 1;
const CHECKSUM_LEN: usize = 32;

/// Locations of the two artifacts that make up one persisted corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub index: PathBuf,
    pub metadata: PathBuf,
}

impl ArtifactPaths {
    pub fn new(index: impl Into<PathBuf>, metadata: impl Into<PathBuf>) -> Self {
        Self {
            index: index.into(),
            metadata: metadata.into(),
        }
    }

    /// Default artifact names inside an index directory.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(INDEX_FILE), dir.join(METADATA_FILE))
    }

    /// True when both artifacts are present.
    pub fn exists(&self) -> bool {
        self.index.is_file() && self.metadata.is_file()
    }

    /// Whether `path` is one of the two artifacts.
    pub fn contains(&self, path: &Path) -> bool {
        path == self.index || path == self.metadata
    }
}

/// Writes both artifacts. Each file is written to a temporary sibling, synced,
/// and renamed over the target, so readers never see a partial file.
pub fn save(index: &dyn VectorIndex, metadata: &MetadataStore, paths: &ArtifactPaths) -> Result<()> {
    if index.count() != metadata.len() {
        return Err(RagError::corrupt(
            &paths.index,
            format!(
                "refusing to save {} index rows with {} metadata records",
                index.count(),
                metadata.len()
            ),
        ));
    }

    let snapshot = index.snapshot();
    let data = encode_f32s(&snapshot.data);
    let records = encode_records(metadata)?;
    let pair_tag = pair_tag(&data, &records);

    let index_bytes = encode_index(&snapshot, &data, pair_tag);
    let metadata_bytes = encode_metadata(metadata.len(), &records, pair_tag);

    write_atomic(&paths.index, &index_bytes)?;
    write_atomic(&paths.metadata, &metadata_bytes)?;

    tracing::info!(
        rows = metadata.len(),
        dimension = snapshot.dimension,
        index = %paths.index.display(),
        "saved corpus artifacts"
    );
    Ok(())
}

/// Reads both artifacts into an index of `backend` and its metadata.
pub fn load(paths: &ArtifactPaths, backend: IndexBackend) -> Result<(Box<dyn VectorIndex>, MetadataStore)> {
    for path in [&paths.index, &paths.metadata] {
        if !path.is_file() {
            return Err(RagError::NotFound(path.clone()));
        }
    }

    let (snapshot, index_tag) = read_index(&paths.index)?;
    let (metadata, metadata_tag, records) = read_metadata(&paths.metadata)?;

    if index_tag != metadata_tag || pair_tag(&encode_f32s(&snapshot.data), &records) != index_tag {
        return Err(RagError::corrupt(
            &paths.metadata,
            "metadata was not written together with the index",
        ));
    }
    if snapshot.rows() != metadata.len() {
        return Err(RagError::corrupt(
            &paths.metadata,
            format!(
                "index has {} rows but metadata has {} records",
                snapshot.rows(),
                metadata.len()
            ),
        ));
    }

    tracing::debug!(rows = metadata.len(), dimension = snapshot.dimension, "loaded corpus artifacts");
    Ok((backend.restore(snapshot), metadata))
}

fn read_index(path: &Path) -> Result<(IndexSnapshot, u64)> {
    let bytes = fs::read(path)?;
    if bytes.is_empty() {
        return Err(RagError::corrupt(path, "empty file"));
    }
    let body = verify_checksum(path, &bytes)?;

    let mut reader = ByteReader::new(path, body);
    reader.expect_magic(INDEX_MAGIC)?;
    reader.expect_version()?;
    let flags = reader.u16()?;
    let dimension = reader.u32()? as usize;
    let rows = reader.u64()?;
    let pair_tag = reader.u64()?;

    let values = usize::try_from(rows)
        .ok()
        .and_then(|rows| rows.checked_mul(dimension))
        .ok_or_else(|| RagError::corrupt(path, "row count overflows"))?;
    let byte_len = values
        .checked_mul(4)
        .ok_or_else(|| RagError::corrupt(path, "row count overflows"))?;
    let raw = reader.bytes(byte_len)?;
    reader.finish()?;

    if rows > 0 && dimension == 0 {
        return Err(RagError::corrupt(path, "rows stored with zero dimension"));
    }

    let snapshot = IndexSnapshot {
        dimension,
        normalized: flags & FLAG_NORMALIZED != 0,
        data: decode_f32s(raw),
    };
    Ok((snapshot, pair_tag))
}

/// Returns the store, its header tag and the raw record bytes.
fn read_metadata(path: &Path) -> Result<(MetadataStore, u64, Vec<u8>)> {
    let bytes = fs::read(path)?;
    let body = verify_checksum(path, &bytes)?;

    let mut reader = ByteReader::new(path, body);
    reader.expect_magic(METADATA_MAGIC)?;
    reader.expect_version()?;
    let _reserved = reader.u16()?;
    let count = reader.u64()?;
    let pair_tag = reader.u64()?;
    let records_start = reader.pos;

    // Each record is at least 16 bytes, which bounds the preallocation.
    let capacity = usize::try_from(count).unwrap_or(usize::MAX).min(body.len() / 16);
    let mut records = Vec::with_capacity(capacity);
    for _ in 0..count {
        let page = reader.u32()?;
        let chunk_id = reader.u32()?;
        let text = reader.string()?;
        let source = reader.string()?;
        records.push(ChunkRecord {
            page,
            chunk_id,
            text,
            source,
        });
    }
    reader.finish()?;

    let raw_records = body[records_start..].to_vec();
    Ok((MetadataStore::from_records(records), pair_tag, raw_records))
}

fn encode_index(snapshot: &IndexSnapshot, data: &[u8], pair_tag: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(28 + data.len() + CHECKSUM_LEN);
    bytes.extend_from_slice(INDEX_MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    let flags = if snapshot.normalized { FLAG_NORMALIZED } else { 0 };
    bytes.extend_from_slice(&flags.to_le_bytes());
    bytes.extend_from_slice(&(snapshot.dimension as u32).to_le_bytes());
    bytes.extend_from_slice(&(snapshot.rows() as u64).to_le_bytes());
    bytes.extend_from_slice(&pair_tag.to_le_bytes());
    bytes.extend_from_slice(data);
    append_checksum(&mut bytes);
    bytes
}

fn encode_records(metadata: &MetadataStore) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    for record in metadata.iter() {
        bytes.extend_from_slice(&record.page.to_le_bytes());
        bytes.extend_from_slice(&record.chunk_id.to_le_bytes());
        push_string(&mut bytes, &record.text)?;
        push_string(&mut bytes, &record.source)?;
    }
    Ok(bytes)
}

fn encode_metadata(count: usize, records: &[u8], pair_tag: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(24 + records.len() + CHECKSUM_LEN);
    bytes.extend_from_slice(METADATA_MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&(count as u64).to_le_bytes());
    bytes.extend_from_slice(&pair_tag.to_le_bytes());
    bytes.extend_from_slice(records);
    append_checksum(&mut bytes);
    bytes
}

fn push_string(bytes: &mut Vec<u8>, value: &str) -> Result<()> {
    let len = u32::try_from(value.len()).map_err(|_| {
        RagError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "metadata string longer than 4 GiB",
        ))
    })?;
    bytes.extend_from_slice(&len.to_le_bytes());
    bytes.extend_from_slice(value.as_bytes());
    Ok(())
}

fn append_checksum(bytes: &mut Vec<u8>) {
    let checksum = blake3::hash(bytes);
    bytes.extend_from_slice(checksum.as_bytes());
}

fn verify_checksum<'a>(path: &Path, bytes: &'a [u8]) -> Result<&'a [u8]> {
    if bytes.len() < CHECKSUM_LEN {
        return Err(RagError::corrupt(path, "file is truncated"));
    }
    let (body, stored) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    if blake3::hash(body).as_bytes() != stored {
        return Err(RagError::corrupt(path, "checksum mismatch"));
    }
    Ok(body)
}

fn pair_tag(vectors: &[u8], records: &[u8]) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(vectors.len() as u64).to_le_bytes());
    hasher.update(vectors);
    hasher.update(records);
    let hash = hasher.finalize();
    let mut tag = [0u8; 8];
    tag.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(tag)
}

/// Converts vector data to a compact little-endian blob.
fn encode_f32s(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_f32s(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Bounds-checked cursor over an artifact body.
struct ByteReader<'a> {
    path: &'a Path,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(path: &'a Path, bytes: &'a [u8]) -> Self {
        Self { path, bytes, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| RagError::corrupt(self.path, "unexpected end of file"))?;
        let bytes: &'a [u8] = self.bytes;
        let slice = &bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let raw = self.bytes(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| RagError::corrupt(self.path, "invalid UTF-8 in record"))
    }

    fn expect_magic(&mut self, magic: &[u8; 4]) -> Result<()> {
        if &self.array::<4>()? != magic {
            return Err(RagError::corrupt(self.path, "bad magic"));
        }
        Ok(())
    }

    fn expect_version(&mut self) -> Result<()> {
        let version = self.u16()?;
        if version != FORMAT_VERSION {
            return Err(RagError::corrupt(
                self.path,
                format!("unsupported format version {version} (expected {FORMAT_VERSION})"),
            ));
        }
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        if self.pos != self.bytes.len() {
            return Err(RagError::corrupt(self.path, "trailing bytes after records"));
        }
        Ok(())
    }
}
