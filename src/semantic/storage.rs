//! Binary storage for per-platform vector indexes.
//!
//! One file per platform: `<index_dir>/<platform>.bin`
//!
//! Header (49 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u32 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated entry_count times):
//! - id_len: u32, id: [u8; id_len] (UTF-8)
//! - text_len: u32, text: [u8; text_len] (UTF-8)
//! - embedding: [f32; dimensions] (little-endian)
//!
//! Trailer:
//! - entries_checksum: u32 (CRC32 of all entry bytes)

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::platform::Platform;
use crate::semantic::index::{IndexError, VectorIndex};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(4) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 49;

/// Upper bound for a single id or text field, guards allocations on corrupt lengths
const MAX_FIELD_LEN: u32 = 1 << 20;

/// Upper bound for embedding dimensionality, same purpose as `MAX_FIELD_LEN`
const MAX_DIMENSIONS: u32 = 1 << 16;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("index file not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: index was built with a different embedding model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Inconsistent index: {0}")]
    Inconsistent(#[from] IndexError),
}

/// SHA256 of the model name, stored in every header.
pub fn model_id_hash(model_name: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(model_name.as_bytes());
    hasher.finalize().into()
}

/// Storage manager for vector index files.
#[derive(Debug, Clone)]
pub struct VectorStorage {
    dir: PathBuf,
}

impl VectorStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Path of the index file for `platform`.
    pub fn path(&self, platform: Platform) -> PathBuf {
        self.dir.join(format!("{}.bin", platform.as_str()))
    }

    pub fn exists(&self, platform: Platform) -> bool {
        self.path(platform).exists()
    }

    /// Load the index persisted for `platform`.
    ///
    /// A missing file is reported as `NotFound`, distinct from every other failure.
    pub fn load(
        &self,
        platform: Platform,
        expected_model_id: &[u8; 32],
    ) -> Result<VectorIndex, VectorStorageError> {
        let path = self.path(platform);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(VectorStorageError::NotFound(path))
            }
            Err(e) => return Err(e.into()),
        };
        let mut reader = BufReader::new(file);

        let header = Self::read_header(&mut reader)?;
        if header.model_id != *expected_model_id {
            return Err(VectorStorageError::ModelMismatch);
        }

        let dimensions = header.dimensions as usize;
        let count = usize::try_from(header.entry_count)
            .map_err(|_| VectorStorageError::InvalidFormat("entry count overflows".into()))?;

        let mut ids = Vec::new();
        let mut texts = Vec::new();
        let mut vectors = Vec::new();
        let mut hasher = crc32fast::Hasher::new();

        for _ in 0..count {
            let id = Self::read_string(&mut reader, &mut hasher)?;
            let text = Self::read_string(&mut reader, &mut hasher)?;
            let embedding = Self::read_embedding(&mut reader, &mut hasher, dimensions)?;
            ids.push(id);
            texts.push(text);
            vectors.push(embedding);
        }

        let stored = u32::from_le_bytes(read_array(&mut reader)?);
        if stored != hasher.finalize() {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        let mut rest = [0u8; 1];
        if reader.read(&mut rest)? != 0 {
            return Err(VectorStorageError::InvalidFormat(
                "trailing bytes after index data".into(),
            ));
        }

        let index = VectorIndex::from_parts(ids, texts, vectors)?;
        if !index.is_empty() && index.dimensions() != dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions,
                got: index.dimensions(),
            }
            .into());
        }

        Ok(index)
    }

    /// Persist `index` for `platform`, replacing any previous file.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save(
        &self,
        platform: Platform,
        index: &VectorIndex,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        std::fs::create_dir_all(&self.dir)?;

        let path = self.path(platform);
        let temp_path = path.with_extension("tmp");

        let result = Self::write_to_file(&temp_path, index, model_id);

        if result.is_err() {
            // Clean up temp file on error
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &path)?;

        Ok(())
    }

    /// Delete the file for `platform`. Missing files are not an error.
    pub fn delete(&self, platform: Platform) -> Result<bool, VectorStorageError> {
        match std::fs::remove_file(self.path(platform)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn write_to_file(
        path: &Path,
        index: &VectorIndex,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        let dimensions = u32::try_from(index.dimensions())
            .ok()
            .filter(|d| *d <= MAX_DIMENSIONS)
            .ok_or_else(|| VectorStorageError::InvalidFormat("too many dimensions".into()))?;

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = Header {
            version: FORMAT_VERSION,
            model_id: *model_id,
            dimensions,
            entry_count: index.len() as u64,
        };
        Self::write_header(&mut writer, &header)?;

        let mut hasher = crc32fast::Hasher::new();
        for (id, text, embedding) in index.iter() {
            Self::write_string(&mut writer, &mut hasher, id)?;
            Self::write_string(&mut writer, &mut hasher, text)?;
            for &value in embedding {
                let bytes = value.to_le_bytes();
                hasher.update(&bytes);
                writer.write_all(&bytes)?;
            }
        }
        writer.write_all(&hasher.finalize().to_le_bytes())?;

        // Flush and sync
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?;
        file.sync_all()?;

        Ok(())
    }

    fn read_header(reader: &mut impl Read) -> Result<Header, VectorStorageError> {
        let header_bytes: [u8; HEADER_SIZE] = read_array(reader)?;

        let version = header_bytes[0];
        if version != FORMAT_VERSION {
            return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        // checksum is computed over the header without the checksum field
        let stored_checksum = u32::from_le_bytes(slice_array(&header_bytes[45..49]));
        if stored_checksum != crc32fast::hash(&header_bytes[0..45]) {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        let dimensions = u32::from_le_bytes(slice_array(&header_bytes[33..37]));
        if dimensions > MAX_DIMENSIONS {
            return Err(VectorStorageError::InvalidFormat(format!(
                "{dimensions} dimensions exceeds the limit of {MAX_DIMENSIONS}"
            )));
        }

        Ok(Header {
            version,
            model_id: slice_array(&header_bytes[1..33]),
            dimensions,
            entry_count: u64::from_le_bytes(slice_array(&header_bytes[37..45])),
        })
    }

    fn write_header(writer: &mut impl Write, header: &Header) -> Result<(), VectorStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];

        header_bytes[0] = header.version;
        header_bytes[1..33].copy_from_slice(&header.model_id);
        header_bytes[33..37].copy_from_slice(&header.dimensions.to_le_bytes());
        header_bytes[37..45].copy_from_slice(&header.entry_count.to_le_bytes());

        let checksum = crc32fast::hash(&header_bytes[0..45]);
        header_bytes[45..49].copy_from_slice(&checksum.to_le_bytes());

        writer.write_all(&header_bytes)?;
        Ok(())
    }

    fn read_string(
        reader: &mut impl Read,
        hasher: &mut crc32fast::Hasher,
    ) -> Result<String, VectorStorageError> {
        let len_bytes: [u8; 4] = read_array(reader)?;
        hasher.update(&len_bytes);

        let len = u32::from_le_bytes(len_bytes);
        if len > MAX_FIELD_LEN {
            return Err(VectorStorageError::InvalidFormat(format!(
                "field length {len} exceeds limit"
            )));
        }

        let mut bytes = vec![0u8; len as usize];
        read_exact(reader, &mut bytes)?;
        hasher.update(&bytes);

        String::from_utf8(bytes)
            .map_err(|_| VectorStorageError::InvalidFormat("field is not valid UTF-8".into()))
    }

    fn write_string(
        writer: &mut impl Write,
        hasher: &mut crc32fast::Hasher,
        value: &str,
    ) -> Result<(), VectorStorageError> {
        let len = u32::try_from(value.len())
            .ok()
            .filter(|len| *len <= MAX_FIELD_LEN)
            .ok_or_else(|| VectorStorageError::InvalidFormat("field too long".into()))?;
        let len_bytes = len.to_le_bytes();

        hasher.update(&len_bytes);
        hasher.update(value.as_bytes());
        writer.write_all(&len_bytes)?;
        writer.write_all(value.as_bytes())?;
        Ok(())
    }

    fn read_embedding(
        reader: &mut impl Read,
        hasher: &mut crc32fast::Hasher,
        dimensions: usize,
    ) -> Result<Vec<f32>, VectorStorageError> {
        let mut embedding = Vec::with_capacity(dimensions);
        for _ in 0..dimensions {
            let float_bytes: [u8; 4] = read_array(reader)?;
            hasher.update(&float_bytes);
            embedding.push(f32::from_le_bytes(float_bytes));
        }
        Ok(embedding)
    }
}

/// File header structure.
#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u32,
    entry_count: u64,
}

/// `read_exact` that reports a short file as a format error instead of I/O.
fn read_exact(reader: &mut impl Read, buf: &mut [u8]) -> Result<(), VectorStorageError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => VectorStorageError::InvalidFormat("file is truncated".into()),
        _ => VectorStorageError::Io(e),
    })
}

fn read_array<const N: usize>(reader: &mut impl Read) -> Result<[u8; N], VectorStorageError> {
    let mut buf = [0u8; N];
    read_exact(reader, &mut buf)?;
    Ok(buf)
}

fn slice_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom};

    fn test_model_id() -> [u8; 32] {
        model_id_hash("test-model")
    }

    fn sample_index() -> VectorIndex {
        VectorIndex::from_parts(
            vec!["gid://shopify/1".into(), "gid://shopify/2".into(), "3".into()],
            vec!["Mice".into(), "Кухня > Чайники".into(), "Tab\tinside".into()],
            vec![
                vec![0.1, -0.25, 3.5e-8],
                vec![f32::MIN_POSITIVE, 1.0, -1.0],
                vec![0.0, 0.0, 0.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_save_and_load_roundtrip_is_exact() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().join("vectors"));
        let index = sample_index();

        storage.save(Platform::Shopify, &index, &test_model_id()).unwrap();
        assert!(storage.exists(Platform::Shopify));

        let loaded = storage.load(Platform::Shopify, &test_model_id()).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_save_and_load_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().to_path_buf());

        let empty = VectorIndex::from_parts(vec![], vec![], vec![]).unwrap();

        storage.save(Platform::Ozon, &empty, &test_model_id()).unwrap();
        let loaded = storage.load(Platform::Ozon, &test_model_id()).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().to_path_buf());

        let result = storage.load(Platform::Yandex, &test_model_id());
        assert!(matches!(result, Err(VectorStorageError::NotFound(_))));
    }

    #[test]
    fn test_model_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().to_path_buf());
        storage
            .save(Platform::Shopify, &sample_index(), &test_model_id())
            .unwrap();

        let result = storage.load(Platform::Shopify, &model_id_hash("another-model"));
        assert!(matches!(result, Err(VectorStorageError::ModelMismatch)));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().to_path_buf());
        storage
            .save(Platform::Shopify, &sample_index(), &test_model_id())
            .unwrap();

        assert!(storage.delete(Platform::Shopify).unwrap());
        assert!(!storage.exists(Platform::Shopify));
        assert!(!storage.delete(Platform::Shopify).unwrap());
    }

    #[test]
    fn test_atomic_write_cleans_up_on_error() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().to_path_buf());
        // a directory where the temp file should go makes File::create fail
        std::fs::create_dir(storage.path(Platform::Ozon).with_extension("tmp")).unwrap();

        let result = storage.save(Platform::Ozon, &sample_index(), &test_model_id());
        assert!(result.is_err());
        assert!(!storage.exists(Platform::Ozon));
    }

    #[test]
    fn test_header_checksum_detects_corruption() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().to_path_buf());
        storage
            .save(Platform::Shopify, &sample_index(), &test_model_id())
            .unwrap();

        // flip a byte inside entry_count
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .open(storage.path(Platform::Shopify))
            .unwrap();
        file.seek(SeekFrom::Start(40)).unwrap();
        file.write_all(&[0xFF]).unwrap();

        let result = storage.load(Platform::Shopify, &test_model_id());
        assert!(matches!(result, Err(VectorStorageError::ChecksumMismatch)));
    }

    #[test]
    fn test_entry_checksum_detects_corruption() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().to_path_buf());
        storage
            .save(Platform::Shopify, &sample_index(), &test_model_id())
            .unwrap();

        let path = storage.path(Platform::Shopify);
        let mut bytes = std::fs::read(&path).unwrap();
        let last_float = bytes.len() - 5;
        bytes[last_float] ^= 0x01;
        std::fs::write(&path, bytes).unwrap();

        let result = storage.load(Platform::Shopify, &test_model_id());
        assert!(matches!(result, Err(VectorStorageError::ChecksumMismatch)));
    }

    #[test]
    fn test_truncated_file_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().to_path_buf());
        storage
            .save(Platform::Shopify, &sample_index(), &test_model_id())
            .unwrap();

        let path = storage.path(Platform::Shopify);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 20]).unwrap();

        let result = storage.load(Platform::Shopify, &test_model_id());
        assert!(matches!(result, Err(VectorStorageError::InvalidFormat(_))));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().to_path_buf());
        storage
            .save(Platform::Shopify, &sample_index(), &test_model_id())
            .unwrap();

        let path = storage.path(Platform::Shopify);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        std::fs::write(&path, bytes).unwrap();

        let result = storage.load(Platform::Shopify, &test_model_id());
        assert!(matches!(result, Err(VectorStorageError::InvalidFormat(_))));
    }

    #[test]
    fn test_oversized_dimensions_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(tmp.path().to_path_buf());

        let mut bytes = Vec::new();
        VectorStorage::write_header(
            &mut bytes,
            &Header {
                version: FORMAT_VERSION,
                model_id: test_model_id(),
                dimensions: u32::MAX,
                entry_count: 1,
            },
        )
        .unwrap();
        bytes.extend_from_slice(&[1, 0, 0, 0, b'a', 1, 0, 0, 0, b'b']);
        std::fs::write(storage.path(Platform::Shopify), bytes).unwrap();

        let result = storage.load(Platform::Shopify, &test_model_id());
        match result {
            Err(VectorStorageError::InvalidFormat(msg)) => assert!(msg.contains("dimensions")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
