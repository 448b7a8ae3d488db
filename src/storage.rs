//! Durable key-value storage used by the identity cache and the notification
//! store.
//!
//! [`KeyValueStore`] is a small synchronous string-to-string map. Writes are
//! expected to be durable by the time a call returns, which is what lets the
//! game store promise write-through semantics for identity fields.
//!
//! Two implementations are provided:
//!
//! | Type          | Backing                               |
//! |---------------|---------------------------------------|
//! | [`MemoryStore`] | process memory, lost on exit        |
//! | [`FileStore`]   | one file per key inside a directory |

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{RealtimeError, Result};

/// A durable string key-value store.
///
/// Implementations must be safe to share between the stores that use them
/// (`Send + Sync`), so a single instance can back both the identity cache and
/// the notification queue.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, or `None` if the key is unset.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Storage`] or [`RealtimeError::Io`] if the
    /// backing medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value could not be made durable.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key`. Deleting an unset key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium rejects the deletion.
    fn remove(&self, key: &str) -> Result<()>;
}

// ── MemoryStore ─────────────────────────────────────────────────────

/// An in-memory [`KeyValueStore`].
///
/// Useful for tests and for hosts that have no durable medium. Cloning the
/// store is not supported; share it behind an `Arc` instead.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| RealtimeError::Storage("memory store lock poisoned".into()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries()?.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

// ── FileStore ───────────────────────────────────────────────────────

/// A [`KeyValueStore`] that keeps each key in its own file under a directory.
///
/// Writes go to a temporary sibling file that is then renamed over the
/// target, so a crash mid-write leaves either the old or the new value.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create, if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Io`] if the directory cannot be created.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        tracing::debug!(root = %root.display(), "opened file store");
        Ok(Self { root })
    }

    /// The directory backing this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(RealtimeError::Storage(format!("invalid key: {key:?}")));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("username").unwrap(), None);

        store.set("username", "alice").unwrap();
        assert_eq!(store.get("username").unwrap().as_deref(), Some("alice"));

        store.set("username", "bob").unwrap();
        assert_eq!(store.get("username").unwrap().as_deref(), Some("bob"));

        store.remove("username").unwrap();
        assert_eq!(store.get("username").unwrap(), None);
    }

    #[test]
    fn memory_store_remove_missing_key_is_ok() {
        let store = MemoryStore::new();
        store.remove("nothing-here").unwrap();
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let first = FileStore::open(dir.path()).unwrap();
        first.set("playerId", "p-42").unwrap();
        drop(first);

        let second = FileStore::open(dir.path()).unwrap();
        assert_eq!(second.get("playerId").unwrap().as_deref(), Some("p-42"));
    }

    #[test]
    fn file_store_remove_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.set("username", "alice").unwrap();
        assert!(dir.path().join("username.json").is_file());

        store.remove("username").unwrap();
        assert!(!dir.path().join("username.json").exists());
        assert_eq!(store.get("username").unwrap(), None);

        // Removing again is still fine.
        store.remove("username").unwrap();
    }

    #[test]
    fn file_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        let err = store.set("../escape", "x").unwrap_err();
        assert!(matches!(err, RealtimeError::Storage(_)));
        assert!(matches!(
            store.get("").unwrap_err(),
            RealtimeError::Storage(_)
        ));
    }

    #[test]
    fn file_store_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = FileStore::open(&nested).unwrap();
        assert!(store.root().is_dir());
    }
}
