#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use party_realtime_client::notification_store::NOTIFICATION_STORAGE_KEY;
use party_realtime_client::{KeyValueStore, MemoryStore, NotificationStore};

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    let storage = Arc::new(MemoryStore::new());
    if storage.set(NOTIFICATION_STORAGE_KEY, raw).is_err() {
        return;
    }

    // Hydration never fails and the unread count always matches the list.
    let store = NotificationStore::hydrate(storage);
    let state = store.snapshot();
    let unread = state.notifications.iter().filter(|n| !n.read).count();
    assert_eq!(state.unread_count, unread);
});
