//! Event-kind to handler table.
//!
//! [`EventDispatcher`] is the explicit replacement for registering
//! `on(event, callback)` listeners on a socket: handlers are stored per
//! [`EventKind`] and invoked synchronously, in registration order, for each
//! event in the order events arrive.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::event::{ChannelEvent, EventKind};

type Handler = Box<dyn FnMut(&ChannelEvent) + Send>;

/// Dispatches [`ChannelEvent`]s to handlers registered per [`EventKind`].
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<EventKind, Vec<Handler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> &mut Self
    where
        F: FnMut(&ChannelEvent) + Send + 'static,
    {
        self.handlers
            .entry(kind)
            .or_default()
            .push(Box::new(handler));
        self
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Run every handler registered for the event's kind. Returns how many ran.
    pub fn dispatch(&mut self, event: &ChannelEvent) -> usize {
        let Some(handlers) = self.handlers.get_mut(&event.kind()) else {
            tracing::trace!(kind = ?event.kind(), "no handler for event");
            return 0;
        };
        for handler in handlers.iter_mut() {
            handler(event);
        }
        handlers.len()
    }

    /// Dispatch events from `events` until the channel closes.
    pub async fn run(&mut self, mut events: mpsc::Receiver<ChannelEvent>) {
        while let Some(event) = events.recv().await {
            self.dispatch(&event);
        }
        tracing::debug!("event channel closed, dispatcher stopped");
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
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
    use crate::protocol::ServerMessage;
    use std::sync::{Arc, Mutex};

    #[test]
    fn handlers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();

        let first = Arc::clone(&log);
        let second = Arc::clone(&log);
        dispatcher
            .on(EventKind::Connected, move |_| first.lock().unwrap().push("first"))
            .on(EventKind::Connected, move |_| second.lock().unwrap().push("second"));

        assert_eq!(dispatcher.dispatch(&ChannelEvent::Connected), 2);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn unregistered_kinds_are_ignored() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.on(EventKind::Connected, |_| {});
        assert_eq!(dispatcher.dispatch(&ChannelEvent::Server(ServerMessage::Pong)), 0);
        assert_eq!(dispatcher.handler_count(EventKind::Pong), 0);
        assert_eq!(dispatcher.handler_count(EventKind::Connected), 1);
    }

    #[tokio::test]
    async fn run_preserves_arrival_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        for kind in [EventKind::Connecting, EventKind::Connected, EventKind::Pong] {
            let log = Arc::clone(&log);
            dispatcher.on(kind, move |event| log.lock().unwrap().push(event.kind()));
        }

        let (tx, rx) = mpsc::channel(8);
        tx.send(ChannelEvent::Connecting { attempt: 0 }).await.unwrap();
        tx.send(ChannelEvent::Connected).await.unwrap();
        tx.send(ChannelEvent::Server(ServerMessage::Pong)).await.unwrap();
        drop(tx);

        dispatcher.run(rx).await;
        assert_eq!(
            *log.lock().unwrap(),
            vec![EventKind::Connecting, EventKind::Connected, EventKind::Pong]
        );
    }
}
