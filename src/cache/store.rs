//! Persistent string key-value stores
//!
//! The persistent tier only needs `get_item`/`set_item` on strings, the same
//! surface as a browser's local storage. [`FileStore`] keeps one JSON file per
//! key on disk; [`MemoryStore`] keeps everything in a map and can simulate
//! full or unavailable storage.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use directories::ProjectDirs;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Longest escaped key used verbatim as a file stem
///
/// Leaves headroom under the common 255-byte file name limit for the
/// `.json` suffix.
const MAX_FILE_STEM: usize = 200;

/// Errors raised by a persistent store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem read or write failed
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The write would exceed the store's capacity
    #[error("storage quota exceeded: need {needed} bytes, {available} available")]
    QuotaExceeded { needed: usize, available: usize },

    /// The store cannot be used at all
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// A synchronous string key-value store
pub trait PersistentStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` if there is none
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value
    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Stores each key as a JSON file in a directory
///
/// Uses an XDG-compliant cache directory (`~/.cache/swrcache/` on Linux) unless
/// a directory is given explicitly. The directory is created on first write.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates a store in the platform cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "swrcache")?;
        Some(Self {
            dir: project_dirs.cache_dir().to_path_buf(),
        })
    }

    /// Creates a store rooted at `dir`
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the entry files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`
    ///
    /// Bytes outside `[A-Za-z0-9_-]` are percent-escaped so keys such as
    /// `home:latest` or full URLs map to valid, distinct file names. Stems
    /// longer than 200 bytes are cut short and suffixed with `~` and the
    /// SHA-256 of the whole key.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", escape_key(key)))
    }
}

impl PersistentStore for FileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), value)?;
        Ok(())
    }
}

fn escape_key(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            escaped.push(char::from(byte));
        } else {
            escaped.push_str(&format!("%{:02X}", byte));
        }
    }
    if escaped.len() <= MAX_FILE_STEM {
        return escaped;
    }

    // `~` never appears in an escaped key, so hashed stems cannot collide
    // with verbatim ones.
    let digest = format!("{:x}", Sha256::digest(key.as_bytes()));
    let keep = MAX_FILE_STEM - digest.len() - 1;
    escaped.truncate(keep);
    format!("{}~{}", escaped, digest)
}

/// An in-memory store
///
/// Optionally bounded by a byte quota (keys plus values), and can be switched
/// into an unavailable state to exercise storage failure paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Creates an unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that rejects writes once `quota_bytes` would be exceeded
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::default()
        }
    }

    /// Makes every subsequent read and write fail (or succeed again)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store disabled".to_string()));
        }
        Ok(())
    }
}

impl PersistentStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let mut items = self.items.lock();

        if let Some(quota) = self.quota_bytes {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = key.len() + value.len();
            let available = quota.saturating_sub(used);
            if needed > available {
                return Err(StoreError::QuotaExceeded { needed, available });
            }
        }

        items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
