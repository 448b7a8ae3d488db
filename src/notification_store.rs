//! Persisted, observable notification queue.
//!
//! Notifications are kept newest first. After every mutation the unread
//! count is recomputed from the entries, and the whole snapshot is written to
//! the [`KeyValueStore`] under [`NOTIFICATION_STORAGE_KEY`]. Mutations that
//! change nothing skip both the subscriber notification and the write.
//!
//! Persistence is best-effort: a failed write is logged and the in-memory
//! state stays authoritative. On startup, unreadable or malformed data
//! yields an empty queue.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::protocol::{NewNotification, NotificationType};
use crate::storage::KeyValueStore;

/// Storage key holding the persisted queue.
pub const NOTIFICATION_STORAGE_KEY: &str = "notification-storage";

/// Version written into the persisted envelope.
const STORAGE_VERSION: u32 = 0;

/// A notification owned by the [`NotificationStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actionable: Option<bool>,
}

impl Notification {
    fn create(payload: NewNotification) -> Self {
        let timestamp = now_millis();
        Self {
            id: format!("{timestamp}-{}", Uuid::new_v4().simple()),
            kind: payload.kind,
            title: payload.title,
            message: payload.message,
            timestamp,
            read: false,
            data: payload.data,
            actionable: payload.actionable,
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Snapshot of the notification store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStoreState {
    /// Newest first.
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}

impl NotificationStoreState {
    fn recount(&mut self) {
        self.unread_count = self.notifications.iter().filter(|n| !n.read).count();
    }
}

/// On-disk shape: `{"state": {...}, "version": 0}`.
#[derive(Serialize, Deserialize)]
struct PersistedEnvelope {
    state: NotificationStoreState,
    #[serde(default)]
    version: u32,
}

/// Observable notification queue with durable persistence.
///
/// Share behind an `Arc`; all methods take `&self` and never fail.
pub struct NotificationStore {
    state: watch::Sender<NotificationStoreState>,
    storage: Arc<dyn KeyValueStore>,
}

impl NotificationStore {
    /// Create an empty store that persists into `storage`, ignoring anything
    /// already stored there until the first mutation overwrites it.
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            state: watch::Sender::new(NotificationStoreState::default()),
            storage,
        }
    }

    /// Create a store rehydrated from `storage`.
    ///
    /// The persisted unread count is not trusted; it is recomputed from the
    /// entries. Missing, unreadable or malformed data gives an empty store.
    pub fn hydrate(storage: Arc<dyn KeyValueStore>) -> Self {
        let state = load_state(storage.as_ref());
        tracing::debug!(
            notifications = state.notifications.len(),
            unread = state.unread_count,
            "hydrated notification store"
        );
        Self {
            state: watch::Sender::new(state),
            storage,
        }
    }

    pub fn snapshot(&self) -> NotificationStoreState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NotificationStoreState> {
        self.state.subscribe()
    }

    pub fn unread_count(&self) -> usize {
        self.state.borrow().unread_count
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.state
            .borrow()
            .notifications
            .iter()
            .find(|n| n.id == id)
            .cloned()
    }

    /// Create a notification from `payload` and put it at the head of the
    /// queue. Identical payloads are not deduplicated.
    pub fn add_notification(&self, payload: NewNotification) -> Notification {
        let notification = Notification::create(payload);
        let created = notification.clone();
        self.mutate(move |state| {
            state.notifications.insert(0, notification);
            true
        });
        created
    }

    /// Mark one notification read. Unknown ids are ignored.
    pub fn mark_as_read(&self, id: &str) {
        self.mutate(|state| {
            match state
                .notifications
                .iter_mut()
                .find(|n| n.id == id && !n.read)
            {
                Some(n) => {
                    n.read = true;
                    true
                }
                None => false,
            }
        });
    }

    pub fn mark_all_as_read(&self) {
        self.mutate(|state| {
            let mut changed = false;
            for n in state.notifications.iter_mut().filter(|n| !n.read) {
                n.read = true;
                changed = true;
            }
            changed
        });
    }

    /// Remove one notification. Unknown ids are ignored.
    pub fn remove_notification(&self, id: &str) {
        self.mutate(|state| {
            let before = state.notifications.len();
            state.notifications.retain(|n| n.id != id);
            state.notifications.len() != before
        });
    }

    pub fn clear_all(&self) {
        self.mutate(|state| {
            let changed = !state.notifications.is_empty();
            state.notifications.clear();
            changed
        });
    }

    /// Apply `f`, then recount and persist if it reported a change.
    fn mutate(&self, f: impl FnOnce(&mut NotificationStoreState) -> bool) {
        let changed = self.state.send_if_modified(|state| {
            let changed = f(state);
            state.recount();
            changed
        });
        if changed {
            self.persist();
        }
    }

    fn persist(&self) {
        let envelope = PersistedEnvelope {
            state: self.snapshot(),
            version: STORAGE_VERSION,
        };
        let result = serde_json::to_string(&envelope)
            .map_err(crate::RealtimeError::from)
            .and_then(|json| self.storage.set(NOTIFICATION_STORAGE_KEY, &json));
        if let Err(e) = result {
            tracing::warn!("failed to persist notifications: {e}");
        }
    }
}

impl std::fmt::Debug for NotificationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("NotificationStore")
            .field("notifications", &state.notifications.len())
            .field("unread_count", &state.unread_count)
            .finish()
    }
}

fn load_state(storage: &dyn KeyValueStore) -> NotificationStoreState {
    let raw = match storage.get(NOTIFICATION_STORAGE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return NotificationStoreState::default(),
        Err(e) => {
            tracing::warn!("failed to read persisted notifications: {e}");
            return NotificationStoreState::default();
        }
    };

    match serde_json::from_str::<PersistedEnvelope>(&raw) {
        Ok(envelope) => {
            if envelope.version != STORAGE_VERSION {
                tracing::debug!(version = envelope.version, "unknown notification storage version");
            }
            let mut state = envelope.state;
            state.recount();
            state
        }
        Err(e) => {
            tracing::warn!("discarding malformed persisted notifications: {e}");
            NotificationStoreState::default()
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
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn store() -> (NotificationStore, Arc<MemoryStore>) {
        let backing = Arc::new(MemoryStore::new());
        (NotificationStore::hydrate(backing.clone()), backing)
    }

    fn payload(kind: NotificationType, title: &str) -> NewNotification {
        NewNotification::new(kind, title, format!("{title} body"))
    }

    fn assert_invariant(store: &NotificationStore) {
        let state = store.snapshot();
        let unread = state.notifications.iter().filter(|n| !n.read).count();
        assert_eq!(state.unread_count, unread);
    }

    #[test]
    fn add_prepends_and_counts_unread() {
        let (store, _) = store();
        let a = store.add_notification(payload(NotificationType::Message, "A"));
        assert_invariant(&store);
        let b = store.add_notification(payload(NotificationType::Message, "B"));
        assert_invariant(&store);

        let state = store.snapshot();
        assert_eq!(state.notifications.len(), 2);
        assert_eq!(state.notifications[0].id, b.id);
        assert_eq!(state.notifications[1].id, a.id);
        assert_eq!(state.unread_count, 2);
        assert!(!b.read);
    }

    #[test]
    fn identical_payloads_are_not_deduplicated() {
        let (store, _) = store();
        let p = payload(NotificationType::System, "Maintenance");
        let first = store.add_notification(p.clone());
        let second = store.add_notification(p);
        assert_ne!(first.id, second.id);
        assert_eq!(store.snapshot().notifications.len(), 2);
    }

    #[test]
    fn mark_all_then_add_leaves_one_unread() {
        let (store, _) = store();
        store.add_notification(payload(NotificationType::Message, "A"));
        store.add_notification(payload(NotificationType::Achievement, "B"));
        store.mark_all_as_read();
        assert_eq!(store.unread_count(), 0);

        store.add_notification(payload(NotificationType::LevelUp, "C"));
        assert_eq!(store.unread_count(), 1);
        assert_invariant(&store);
    }

    #[test]
    fn mark_as_read_scenario() {
        let (store, _) = store();
        store.add_notification(payload(NotificationType::Message, "first"));
        let second = store.add_notification(payload(NotificationType::Achievement, "second"));
        store.add_notification(payload(NotificationType::System, "third"));

        store.mark_as_read(&second.id);

        let state = store.snapshot();
        let kinds: Vec<_> = state.notifications.iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NotificationType::System,
                NotificationType::Achievement,
                NotificationType::Message
            ]
        );
        assert!(!state.notifications[0].read);
        assert!(state.notifications[1].read);
        assert!(!state.notifications[2].read);
        assert_eq!(state.unread_count, 2);
    }

    #[test]
    fn unknown_ids_leave_state_and_storage_untouched() {
        let (store, backing) = store();
        store.add_notification(payload(NotificationType::Message, "A"));
        let before = store.snapshot();
        let persisted = backing.get(NOTIFICATION_STORAGE_KEY).unwrap();
        let mut rx = store.subscribe();

        store.remove_notification("missing");
        store.mark_as_read("missing");

        assert_eq!(store.snapshot(), before);
        assert_eq!(backing.get(NOTIFICATION_STORAGE_KEY).unwrap(), persisted);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn remove_and_clear() {
        let (store, _) = store();
        let a = store.add_notification(payload(NotificationType::FriendRequest, "A"));
        store.add_notification(payload(NotificationType::FriendAccepted, "B"));

        store.remove_notification(&a.id);
        assert_eq!(store.snapshot().notifications.len(), 1);
        assert!(store.get(&a.id).is_none());
        assert_eq!(store.unread_count(), 1);

        store.clear_all();
        assert_eq!(store.snapshot(), NotificationStoreState::default());
    }

    #[test]
    fn every_mutation_is_persisted_and_rehydrated() {
        let (store, backing) = store();
        let invite = store.add_notification(
            payload(NotificationType::GameInvitation, "Join us")
                .with_data(json!({"roomCode": "ABCD"}))
                .with_actionable(true),
        );
        store.add_notification(payload(NotificationType::Message, "hi"));
        store.mark_as_read(&invite.id);

        let restored = NotificationStore::hydrate(backing);
        assert_eq!(restored.snapshot(), store.snapshot());
        let restored_invite = restored.get(&invite.id).unwrap();
        assert_eq!(restored_invite.data, Some(json!({"roomCode": "ABCD"})));
        assert_eq!(restored_invite.actionable, Some(true));
        assert!(restored_invite.read);
    }

    #[test]
    fn persisted_layout_uses_state_envelope() {
        let (store, backing) = store();
        store.add_notification(payload(NotificationType::Message, "A"));

        let raw: serde_json::Value =
            serde_json::from_str(&backing.get(NOTIFICATION_STORAGE_KEY).unwrap().unwrap())
                .unwrap();
        assert_eq!(raw["version"], 0);
        assert_eq!(raw["state"]["unreadCount"], 1);
        assert_eq!(raw["state"]["notifications"][0]["type"], "message");
        assert_eq!(raw["state"]["notifications"][0]["read"], false);
    }

    #[test]
    fn malformed_storage_falls_back_to_empty() {
        let backing = Arc::new(MemoryStore::new());
        backing
            .set(NOTIFICATION_STORAGE_KEY, r#"{"state": {"notifications": [{"id": 1}]}"#)
            .unwrap();
        let store = NotificationStore::hydrate(backing.clone());
        assert_eq!(store.snapshot(), NotificationStoreState::default());

        backing.set(NOTIFICATION_STORAGE_KEY, "not json").unwrap();
        let store = NotificationStore::hydrate(backing);
        assert_eq!(store.snapshot(), NotificationStoreState::default());
    }

    #[test]
    fn stale_unread_count_is_recomputed_on_load() {
        let backing = Arc::new(MemoryStore::new());
        let stored = json!({
            "state": {
                "notifications": [
                    {"id": "1-a", "type": "system", "title": "t", "message": "m",
                     "timestamp": 1, "read": false},
                    {"id": "2-b", "type": "level_up", "title": "t", "message": "m",
                     "timestamp": 2, "read": true}
                ],
                "unreadCount": 7
            },
            "version": 0
        });
        backing
            .set(NOTIFICATION_STORAGE_KEY, &stored.to_string())
            .unwrap();

        let store = NotificationStore::hydrate(backing);
        assert_eq!(store.unread_count(), 1);
        assert_eq!(store.snapshot().notifications.len(), 2);
    }

    #[test]
    fn id_carries_timestamp_prefix() {
        let (store, _) = store();
        let n = store.add_notification(payload(NotificationType::Message, "A"));
        let (prefix, suffix) = n.id.split_once('-').unwrap();
        assert_eq!(prefix, n.timestamp.to_string());
        assert_eq!(suffix.len(), 32);
    }

    #[test]
    fn mutations_succeed_in_memory_when_storage_fails() {
        struct Unavailable;
        impl KeyValueStore for Unavailable {
            fn get(&self, _: &str) -> crate::Result<Option<String>> {
                Err(crate::RealtimeError::Storage("unavailable".into()))
            }
            fn set(&self, _: &str, _: &str) -> crate::Result<()> {
                Err(crate::RealtimeError::Storage("unavailable".into()))
            }
            fn remove(&self, _: &str) -> crate::Result<()> {
                Err(crate::RealtimeError::Storage("unavailable".into()))
            }
        }

        let store = NotificationStore::hydrate(Arc::new(Unavailable));
        assert_eq!(store.snapshot(), NotificationStoreState::default());

        let first = store.add_notification(payload(NotificationType::Message, "one"));
        let second = store.add_notification(payload(NotificationType::System, "two"));
        let third = store.add_notification(payload(NotificationType::LevelUp, "three"));
        let ids: Vec<_> = store.snapshot().notifications.into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![third.id.clone(), second.id.clone(), first.id.clone()]);
        assert_eq!(store.unread_count(), 3);
        assert_invariant(&store);

        store.mark_as_read(&second.id);
        assert!(store.get(&second.id).unwrap().read);
        assert_eq!(store.unread_count(), 2);
        assert_invariant(&store);

        store.remove_notification(&first.id);
        assert!(store.get(&first.id).is_none());
        assert_eq!(store.snapshot().notifications.len(), 2);
        assert_eq!(store.unread_count(), 1);
        assert_invariant(&store);

        store.mark_all_as_read();
        assert!(store.snapshot().notifications.iter().all(|n| n.read));
        assert_eq!(store.unread_count(), 0);
        assert_invariant(&store);

        store.clear_all();
        assert!(store.snapshot().notifications.is_empty());
        assert_eq!(store.unread_count(), 0);
        assert_invariant(&store);
    }
}
