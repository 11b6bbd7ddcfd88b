//! Policy store: the key/value region shared by the foreground daemon and
//! the background filter agent.
//!
//! Two well-known keys:
//! - `blocked_domains`: JSON array of lowercase domain suffixes
//! - `filter_enabled`:  JSON bool
//!
//! Writes replace a key's whole value atomically. There is no locking
//! between processes: the last writer wins and a reader may see the
//! previous value for a short while, never a partial one. Inside one
//! process, clones of a `PolicyStore` serialize their list edits.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use nearguard_core::PolicySnapshot;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("policy store unavailable at {0}: {1}")]
    Unavailable(PathBuf, std::io::Error),
    #[error("failed to access {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("corrupt value for key {0}: {1}")]
    Corrupt(String, serde_json::Error),
}

/// Narrow get/set contract over whole JSON values.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

// ── File-backed store ─────────────────────────────────────────────────────────

/// One JSON file per key inside a shared directory.
///
/// `set` writes a temporary file next to the target and renames it over the
/// target, so readers in other processes see either the old or the new value.
pub struct FileKvStore {
    dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileKvStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Unavailable(dir.clone(), e))?;
        Ok(Self {
            dir,
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.key_path(key);
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(path, e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| StoreError::Corrupt(key.to_string(), e))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let path = self.key_path(key);
        let text =
            serde_json::to_string(&value).map_err(|e| StoreError::Corrupt(key.to_string(), e))?;
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!(".{key}.{}.{n}.tmp", std::process::id()));
        std::fs::write(&tmp, text).map_err(|e| StoreError::Io(tmp.clone(), e))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(StoreError::Io(path, e));
        }
        Ok(())
    }
}

// ── In-memory store ───────────────────────────────────────────────────────────

/// Process-local store. Clones share the same values.
#[derive(Clone, Default)]
pub struct MemoryKvStore {
    values: Arc<DashMap<String, Value>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

// ── Typed policy view ─────────────────────────────────────────────────────────

/// Typed access to the two policy keys.
#[derive(Clone)]
pub struct PolicyStore {
    kv: Arc<dyn KvStore>,
    // Held across read-modify-write of the list.
    edit: Arc<Mutex<()>>,
}

impl fmt::Debug for PolicyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyStore").finish_non_exhaustive()
    }
}

impl PolicyStore {
    pub const BLOCKED_DOMAINS: &'static str = "blocked_domains";
    pub const FILTER_ENABLED: &'static str = "filter_enabled";

    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            edit: Arc::new(Mutex::new(())),
        }
    }

    fn lock_edits(&self) -> MutexGuard<'_, ()> {
        self.edit.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open the shared file store in `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Ok(Self::new(Arc::new(FileKvStore::open(dir)?)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKvStore::new()))
    }

    /// Stored domains in stored order. Missing key reads as empty.
    pub fn read_blocked_domains(&self) -> Result<Vec<String>, StoreError> {
        match self.kv.get(Self::BLOCKED_DOMAINS)? {
            Some(v) => serde_json::from_value(v)
                .map_err(|e| StoreError::Corrupt(Self::BLOCKED_DOMAINS.to_string(), e)),
            None => Ok(Vec::new()),
        }
    }

    /// Replace the whole list. Entries are lowercased; order and empty
    /// entries are kept as given.
    pub fn write_blocked_domains(&self, domains: &[String]) -> Result<(), StoreError> {
        let _guard = self.lock_edits();
        self.replace_domains(domains)
    }

    fn replace_domains(&self, domains: &[String]) -> Result<(), StoreError> {
        let lowered: Vec<String> = domains.iter().map(|d| d.to_lowercase()).collect();
        self.kv
            .set(Self::BLOCKED_DOMAINS, Value::from(lowered))
    }

    /// Filter switch. Missing key reads as enabled.
    pub fn read_enabled(&self) -> Result<bool, StoreError> {
        match self.kv.get(Self::FILTER_ENABLED)? {
            Some(v) => serde_json::from_value(v)
                .map_err(|e| StoreError::Corrupt(Self::FILTER_ENABLED.to_string(), e)),
            None => Ok(true),
        }
    }

    pub fn write_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.kv.set(Self::FILTER_ENABLED, Value::Bool(enabled))
    }

    /// Append `domain` unless an entry already equals it ignoring case.
    /// Returns true if the list changed.
    pub fn add_domain(&self, domain: &str) -> Result<bool, StoreError> {
        let _guard = self.lock_edits();
        let mut domains = self.read_blocked_domains()?;
        if domains.iter().any(|d| d.eq_ignore_ascii_case(domain)) {
            return Ok(false);
        }
        domains.push(domain.to_lowercase());
        self.replace_domains(&domains)?;
        Ok(true)
    }

    /// Remove the entry at `index`. Returns the removed entry.
    pub fn remove_domain_at(&self, index: usize) -> Result<Option<String>, StoreError> {
        let _guard = self.lock_edits();
        let mut domains = self.read_blocked_domains()?;
        if index >= domains.len() {
            return Ok(None);
        }
        let removed = domains.remove(index);
        self.replace_domains(&domains)?;
        Ok(Some(removed))
    }

    /// Defaults followed by stored entries, plus the switch.
    pub fn snapshot(&self, defaults: &[String]) -> Result<PolicySnapshot, StoreError> {
        let stored = self.read_blocked_domains()?;
        let enabled = self.read_enabled()?;
        Ok(PolicySnapshot::new(defaults, &stored, enabled))
    }
}
