//! Durable cache of the last known comment count per thread.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::warn;

use super::errors::StorageError;
use crate::models::ThreadId;

const KEY_PREFIX: &str = "giscus-comment-count-";

/// Raw string key/value storage.
pub trait StorageBackend {
    /// Reads a raw entry.
    ///
    /// # Errors
    /// Returns [`StorageError::Unavailable`] if the backend cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes a raw entry.
    ///
    /// # Errors
    /// Returns [`StorageError`] if the backend rejects the write.
    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// In-process storage. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Rc<RefCell<BTreeMap<String, String>>>,
    read_only: bool,
}

impl MemoryStorage {
    /// Empty, writable storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that rejects every write, like a full or disabled `localStorage`.
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    /// Inserts an entry directly, bypassing the read-only flag.
    pub fn insert(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    /// Raw entry under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether nothing was stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl StorageBackend for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get(key))
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::Write {
                key: key.to_string(),
                reason: "storage is read-only".to_string(),
            });
        }
        self.insert(key, value);
        Ok(())
    }
}

/// Per-thread comment count cache over a [`StorageBackend`].
pub struct PersistenceStore {
    backend: Box<dyn StorageBackend>,
}

impl std::fmt::Debug for PersistenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceStore").finish_non_exhaustive()
    }
}

impl PersistenceStore {
    /// A cache over `backend`.
    #[must_use]
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Storage key of a thread's count.
    #[must_use]
    pub fn key(thread: &ThreadId) -> String {
        format!("{KEY_PREFIX}{thread}")
    }

    /// Last persisted count. Unreadable or malformed entries read as absent.
    #[must_use]
    pub fn get(&self, thread: &ThreadId) -> Option<u64> {
        let key = Self::key(thread);
        match self.backend.read(&key) {
            Ok(Some(raw)) => raw.trim().parse().ok(),
            Ok(None) => None,
            Err(error) => {
                warn!(thread = %thread, %error, "failed to read cached comment count");
                None
            }
        }
    }

    /// Persists a count. Failures are logged and otherwise ignored.
    pub fn set(&mut self, thread: &ThreadId, value: u64) {
        let key = Self::key(thread);
        if let Err(error) = self.backend.write(&key, &value.to_string()) {
            warn!(thread = %thread, %error, "failed to cache comment count");
        }
    }
}
