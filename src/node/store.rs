//! Content stores backing a storage node
//!
//! Two backends share the [`ContentStore`] trait:
//! - [`MemStore`]: a mutex-guarded map, used when no data directory is configured
//! - [`DiskStore`]: one framed file per key under `data/<prefix>/<blake3(key)>.blob`
//!
//! Disk record format:
//! `[MAGIC:4][KEY_LEN:4][VALUE_LEN:8][KEY:n][VALUE:m][CRC32:4]`

use crate::common::utils::crc32;
use crate::common::{Error, Result};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const BLOB_MAGIC: [u8; 4] = [0x42, 0x4C, 0x4F, 0x42]; // "BLOB"
const HEADER_LEN: usize = 4 + 4 + 8;
const BLOB_EXT: &str = "blob";

/// Byte-blob store keyed by object key
pub trait ContentStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Returns only once the bytes are durable for this backend.
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
    fn len(&self) -> Result<usize>;
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// In-memory store
#[derive(Default)]
pub struct MemStore {
    map: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.map
            .lock()
            .map_err(|_| Error::Internal("content map lock poisoned".into()))
    }
}

impl ContentStore for MemStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }
}

/// File-per-key store with CRC-checked records
pub struct DiskStore {
    data_path: PathBuf,
}

impl DiskStore {
    /// Open or create a store rooted at `data_path`
    pub fn open(data_path: &Path) -> Result<Self> {
        fs::create_dir_all(data_path)?;
        tracing::info!("DiskStore opened at {:?}", data_path);
        Ok(Self {
            data_path: data_path.to_path_buf(),
        })
    }

    /// File names are fixed-length key digests so any valid key fits the
    /// filesystem's name limit. The full key is kept inside the record.
    fn blob_path(&self, key: &str) -> PathBuf {
        let digest = blake3::hash(key.as_bytes()).to_hex();
        self.data_path
            .join(&digest[..2])
            .join(format!("{}.{}", digest, BLOB_EXT))
    }

    fn encode_record(key: &str, value: &[u8]) -> Vec<u8> {
        let mut record = Vec::with_capacity(HEADER_LEN + key.len() + value.len() + 4);
        record.extend_from_slice(&BLOB_MAGIC);
        record.extend_from_slice(&(key.len() as u32).to_le_bytes());
        record.extend_from_slice(&(value.len() as u64).to_le_bytes());
        record.extend_from_slice(key.as_bytes());
        record.extend_from_slice(value);

        // checksum covers everything after the magic
        let checksum = crc32(&record[4..]);
        record.extend_from_slice(&checksum.to_le_bytes());
        record
    }

    fn decode_record(key: &str, record: &[u8]) -> Result<Vec<u8>> {
        if record.len() < HEADER_LEN + 4 || record[..4] != BLOB_MAGIC {
            return Err(Error::Corrupted(format!("invalid blob header for {}", key)));
        }

        let key_len = u32::from_le_bytes([record[4], record[5], record[6], record[7]]) as u64;
        let mut val_len_bytes = [0u8; 8];
        val_len_bytes.copy_from_slice(&record[8..16]);
        let val_len = u64::from_le_bytes(val_len_bytes);

        // Lengths come from disk; reject anything that does not fit the file
        let body_end = (HEADER_LEN as u64)
            .checked_add(key_len)
            .and_then(|n| n.checked_add(val_len))
            .filter(|n| n.checked_add(4) == Some(record.len() as u64))
            .ok_or_else(|| Error::Corrupted(format!("truncated blob for {}", key)))?
            as usize;
        let key_len = key_len as usize;

        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&record[body_end..]);
        let expected = u32::from_le_bytes(crc_bytes);
        let actual = crc32(&record[4..body_end]);
        if expected != actual {
            return Err(Error::Corrupted(format!(
                "checksum mismatch for {}: expected {:08x}, got {:08x}",
                key, expected, actual
            )));
        }

        if &record[HEADER_LEN..HEADER_LEN + key_len] != key.as_bytes() {
            return Err(Error::Corrupted(format!("blob file for {} holds another key", key)));
        }

        Ok(record[HEADER_LEN + key_len..body_end].to_vec())
    }
}

impl ContentStore for DiskStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let record = match fs::read(self.blob_path(key)) {
            Ok(record) => record,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Self::decode_record(key, &record).map(Some)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.blob_path(key);
        let dir = path
            .parent()
            .ok_or_else(|| Error::Internal(format!("no parent for {:?}", path)))?;
        fs::create_dir_all(dir)?;

        // write-then-rename so readers never observe a half-written record
        let tmp_path = path.with_extension(format!("{}.tmp", BLOB_EXT));
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&Self::encode_record(key, value))?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        let mut count = 0;
        for prefix in fs::read_dir(&self.data_path)? {
            let prefix = prefix?;
            if !prefix.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(prefix.path())? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) == Some(BLOB_EXT) {
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}
