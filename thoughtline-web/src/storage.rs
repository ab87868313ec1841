//! `localStorage` backend for the count cache.

use shared::engine::{StorageBackend, StorageError};
use web_sys::{Storage, Window};

/// Raw string entries in the page's `localStorage`.
///
/// Values are stored as plain text rather than gloo's JSON encoding so
/// entries written by older page scripts (a bare integer) stay readable.
/// Storage is looked up on every access: a page with storage disabled, or one
/// where touching it raises a `SecurityError`, reports
/// [`StorageError::Unavailable`] instead of throwing.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorageBackend;

impl LocalStorageBackend {
    pub const fn new() -> Self {
        Self
    }
}

fn local_storage(window: Option<Window>) -> Result<Storage, StorageError> {
    let window = window.ok_or_else(|| StorageError::Unavailable("no window".to_string()))?;
    window
        .local_storage()
        .map_err(|error| StorageError::Unavailable(format!("{error:?}")))?
        .ok_or_else(|| StorageError::Unavailable("localStorage is disabled".to_string()))
}

impl StorageBackend for LocalStorageBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        local_storage(web_sys::window())?
            .get_item(key)
            .map_err(|error| StorageError::Unavailable(format!("{error:?}")))
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        local_storage(web_sys::window())?
            .set_item(key, value)
            .map_err(|error| StorageError::Write {
                key: key.to_string(),
                reason: format!("{error:?}"),
            })
    }
}
