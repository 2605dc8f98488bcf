//! In-process reload notifications
//!
//! [`EventBus`] is the notifier a host wires to its reload client: the client
//! calls [`EventBus::emit`] after it has re-imported changed units, and every
//! subscriber for that event name runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use reload_bridge_sdk::events::{ReloadHandler, ReloadNotifier, Subscription};

/// Fired by the reload client once changed units are evaluated
pub const AFTER_LOAD_EVENT: &str = "figwheel.after-load";

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    handlers: DashMap<u64, (String, ReloadHandler)>,
}

/// Event name keyed handler table
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Listeners>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every handler subscribed to `event`, returning how many ran
    pub fn emit(&self, event: &str) -> usize {
        // Collected first so handlers may subscribe or unsubscribe
        let handlers: Vec<ReloadHandler> = self
            .listeners
            .handlers
            .iter()
            .filter(|entry| entry.value().0 == event)
            .map(|entry| Arc::clone(&entry.value().1))
            .collect();

        tracing::debug!(event, listeners = handlers.len(), "Emitting event");
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    /// Number of handlers subscribed to `event`
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .handlers
            .iter()
            .filter(|entry| entry.value().0 == event)
            .count()
    }
}

impl ReloadNotifier for EventBus {
    fn subscribe(&self, event: &str, handler: ReloadHandler) -> Subscription {
        let id = self.listeners.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.handlers.insert(id, (event.to_string(), handler));

        let listeners: Weak<Listeners> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.handlers.remove(&id);
            }
        })
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.handlers.len())
            .finish()
    }
}
