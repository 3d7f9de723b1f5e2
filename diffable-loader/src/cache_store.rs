//! Cache stores: persisted code of previously loaded resources.
//!
//! [`FileCacheStore`] persists one JSON document per cache key at
//! `<home>/.diffable/cache/<key>.json`. Writes use the same atomic `.tmp` +
//! rename pattern as the registry, and every record carries the SHA-256 of
//! its code. A damaged record (bad digest or undecodable) reads as a miss and
//! is overwritten by the next full load.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use diffable_core::{registry, Version};

use crate::error::{io_err, CollaboratorError, StoreError};

/// A cached resource body and the version it represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCode {
    pub version: Version,
    pub code: String,
    /// When the record was written, if the store tracks it.
    pub stored_at: Option<DateTime<Utc>>,
}

/// Persistent key/value store consulted by the coordinator.
///
/// Availability is a capability: when [`is_available`](CacheStore::is_available)
/// is false every cache read and write is skipped.
pub trait CacheStore {
    fn is_available(&self) -> bool;

    fn get(&self, key: &str) -> Result<Option<CachedCode>, CollaboratorError>;

    fn set(&mut self, key: &str, version: &Version, code: &str) -> Result<(), CollaboratorError>;

    fn has_any(&self, key: &str) -> Result<bool, CollaboratorError> {
        Ok(self.get(key)?.is_some())
    }

    /// Drop the record for `key`. Returns whether one existed.
    fn remove(&mut self, key: &str) -> Result<bool, CollaboratorError>;

    /// All keys with a record, sorted.
    fn keys(&self) -> Result<Vec<String>, CollaboratorError>;
}

/// `None` is a store that is never available.
impl<S: CacheStore> CacheStore for Option<S> {
    fn is_available(&self) -> bool {
        self.as_ref().is_some_and(|s| s.is_available())
    }

    fn get(&self, key: &str) -> Result<Option<CachedCode>, CollaboratorError> {
        match self {
            Some(store) => store.get(key),
            None => Ok(None),
        }
    }

    fn set(&mut self, key: &str, version: &Version, code: &str) -> Result<(), CollaboratorError> {
        match self {
            Some(store) => store.set(key, version, code),
            None => Ok(()),
        }
    }

    fn has_any(&self, key: &str) -> Result<bool, CollaboratorError> {
        match self {
            Some(store) => store.has_any(key),
            None => Ok(false),
        }
    }

    fn remove(&mut self, key: &str) -> Result<bool, CollaboratorError> {
        match self {
            Some(store) => store.remove(key),
            None => Ok(false),
        }
    }

    fn keys(&self) -> Result<Vec<String>, CollaboratorError> {
        match self {
            Some(store) => store.keys(),
            None => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

/// On-disk cache record payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheRecordFile {
    pub version: Version,
    pub code: String,
    pub sha256: String,
    pub stored_at: DateTime<Utc>,
}

/// JSON-file cache rooted at `<home>/.diffable/cache/`.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    root: PathBuf,
}

/// `<home>/.diffable/cache/`
pub fn cache_dir_at(home: &Path) -> PathBuf {
    registry::root_at(home).join("cache")
}

impl FileCacheStore {
    pub fn at(home: &Path) -> Self {
        Self::with_root(cache_dir_at(home))
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<key>.json`
    pub fn record_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty()
            || key == "."
            || key == ".."
            || key.contains(['/', '\\'])
            || key.contains('\0')
        {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }

    /// Load the record for `key`.
    ///
    /// Returns `None` if the file does not exist, cannot be decoded, or its
    /// digest does not match its code.
    pub fn load(&self, key: &str) -> Result<Option<CacheRecordFile>, StoreError> {
        let path = self.record_path(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let record: CacheRecordFile = match serde_json::from_str(&contents) {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!(
                    key,
                    path = %path.display(),
                    %error,
                    "discarding undecodable cache record"
                );
                return Ok(None);
            }
        };
        if record.sha256 != digest(&record.code) {
            tracing::warn!(key, path = %path.display(), "discarding cache record with bad digest");
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Save the record for `key` atomically.
    ///
    /// Writes to `<path>.tmp` then renames to `<path>`.
    pub fn save(&self, key: &str, version: &Version, code: &str) -> Result<(), StoreError> {
        let path = self.record_path(key)?;
        std::fs::create_dir_all(&self.root).map_err(|e| io_err(&self.root, e))?;

        let record = CacheRecordFile {
            version: version.clone(),
            code: code.to_string(),
            sha256: digest(code),
            stored_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&record)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&path, e));
        }
        tracing::debug!(key, version = %version, "wrote cache record");
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.record_path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_err(&path, err)),
        }
    }

    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut keys: Vec<String> = std::fs::read_dir(&self.root)
            .map_err(|e| io_err(&self.root, e))?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.strip_suffix(".json").map(str::to_string)
            })
            .collect();
        keys.sort();
        Ok(keys)
    }
}

impl CacheStore for FileCacheStore {
    /// The cache directory, or its nearest existing ancestor, is a writable
    /// directory. Nothing is created until the first `set`.
    fn is_available(&self) -> bool {
        self.root
            .ancestors()
            .find_map(|dir| std::fs::metadata(dir).ok())
            .is_some_and(|meta| meta.is_dir() && !meta.permissions().readonly())
    }

    fn get(&self, key: &str) -> Result<Option<CachedCode>, CollaboratorError> {
        Ok(self.load(key)?.map(|record| CachedCode {
            version: record.version,
            code: record.code,
            stored_at: Some(record.stored_at),
        }))
    }

    fn set(&mut self, key: &str, version: &Version, code: &str) -> Result<(), CollaboratorError> {
        Ok(self.save(key, version, code)?)
    }

    fn remove(&mut self, key: &str) -> Result<bool, CollaboratorError> {
        Ok(self.delete(key)?)
    }

    fn keys(&self) -> Result<Vec<String>, CollaboratorError> {
        Ok(self.list()?)
    }
}

// ---------------------------------------------------------------------------
// Memory store
// ---------------------------------------------------------------------------

/// In-process store, e.g. for embedding hosts and tests.
#[derive(Debug, Clone)]
pub struct MemoryCacheStore {
    records: HashMap<String, CachedCode>,
    available: bool,
    writes: usize,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            available: true,
            writes: 0,
        }
    }

    /// A store that reports itself unavailable.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Seed a record without counting it as a write.
    pub fn with_record(
        mut self,
        key: impl Into<String>,
        version: impl Into<Version>,
        code: impl Into<String>,
    ) -> Self {
        self.records.insert(
            key.into(),
            CachedCode {
                version: version.into(),
                code: code.into(),
                stored_at: None,
            },
        );
        self
    }

    pub fn record(&self, key: &str) -> Option<&CachedCode> {
        self.records.get(key)
    }

    /// Number of successful `set` calls.
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl CacheStore for MemoryCacheStore {
    fn is_available(&self) -> bool {
        self.available
    }

    fn get(&self, key: &str) -> Result<Option<CachedCode>, CollaboratorError> {
        Ok(self.records.get(key).cloned())
    }

    fn set(&mut self, key: &str, version: &Version, code: &str) -> Result<(), CollaboratorError> {
        self.records.insert(
            key.to_string(),
            CachedCode {
                version: version.clone(),
                code: code.to_string(),
                stored_at: Some(Utc::now()),
            },
        );
        self.writes += 1;
        Ok(())
    }

    fn has_any(&self, key: &str) -> Result<bool, CollaboratorError> {
        Ok(self.records.contains_key(key))
    }

    fn remove(&mut self, key: &str) -> Result<bool, CollaboratorError> {
        Ok(self.records.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, CollaboratorError> {
        let mut keys: Vec<String> = self.records.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

fn digest(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}
