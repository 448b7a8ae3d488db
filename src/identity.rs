//! Durable cache of the player's display name and identifier.

use std::sync::Arc;

use crate::error::Result;
use crate::storage::KeyValueStore;

/// Storage key for the cached display name.
pub const USERNAME_KEY: &str = "username";

/// Storage key for the cached player identifier.
pub const PLAYER_ID_KEY: &str = "playerId";

/// Identity fields read back from the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedIdentity {
    pub username: Option<String>,
    pub player_id: Option<String>,
}

/// Reads and writes the two identity fields in a [`KeyValueStore`].
///
/// A `None` or empty value deletes the entry rather than storing an empty
/// string.
#[derive(Clone)]
pub struct IdentityCache {
    store: Arc<dyn KeyValueStore>,
}

impl IdentityCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Read both fields. Unreadable entries are logged and treated as unset.
    pub fn load(&self) -> CachedIdentity {
        CachedIdentity {
            username: self.read(USERNAME_KEY),
            player_id: self.read(PLAYER_ID_KEY),
        }
    }

    /// Write or delete the cached display name.
    ///
    /// # Errors
    ///
    /// Propagates the underlying storage error.
    pub fn store_username(&self, username: Option<&str>) -> Result<()> {
        self.write(USERNAME_KEY, username)
    }

    /// Write or delete the cached player identifier.
    ///
    /// # Errors
    ///
    /// Propagates the underlying storage error.
    pub fn store_player_id(&self, player_id: Option<&str>) -> Result<()> {
        self.write(PLAYER_ID_KEY, player_id)
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::warn!(key, "failed to read identity field: {e}");
                None
            }
        }
    }

    fn write(&self, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(v) if !v.is_empty() => self.store.set(key, v),
            _ => self.store.remove(key),
        }
    }
}

impl std::fmt::Debug for IdentityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCache").finish_non_exhaustive()
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
    use crate::storage::MemoryStore;

    #[test]
    fn empty_store_loads_default_identity() {
        let cache = IdentityCache::new(Arc::new(MemoryStore::new()));
        assert_eq!(cache.load(), CachedIdentity::default());
    }

    #[test]
    fn stores_and_loads_both_fields() {
        let store = Arc::new(MemoryStore::new());
        let cache = IdentityCache::new(store.clone());

        cache.store_username(Some("alice")).unwrap();
        cache.store_player_id(Some("p-1")).unwrap();

        assert_eq!(store.get(USERNAME_KEY).unwrap().as_deref(), Some("alice"));
        assert_eq!(store.get(PLAYER_ID_KEY).unwrap().as_deref(), Some("p-1"));
        assert_eq!(
            cache.load(),
            CachedIdentity {
                username: Some("alice".into()),
                player_id: Some("p-1".into()),
            }
        );
    }

    #[test]
    fn none_and_empty_delete_the_entry() {
        let store = Arc::new(MemoryStore::new());
        let cache = IdentityCache::new(store.clone());

        cache.store_username(Some("alice")).unwrap();
        cache.store_username(None).unwrap();
        assert_eq!(store.get(USERNAME_KEY).unwrap(), None);

        cache.store_player_id(Some("p-1")).unwrap();
        cache.store_player_id(Some("")).unwrap();
        assert_eq!(store.get(PLAYER_ID_KEY).unwrap(), None);
    }
}
