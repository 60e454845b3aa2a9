//! Inbound event dispatch
//!
//! Handlers are additive per event name. Dispatch isolates each handler:
//! one panicking handler cannot prevent delivery to the others. Every
//! registration is paired with a subscription object that removes the
//! handler when dropped, so teardown cannot leak listeners.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// A named event exchanged with the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl ChannelEvent {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

pub(crate) type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    handlers: Mutex<HashMap<String, Vec<(u64, Handler)>>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    fn locked(&self) -> MutexGuard<'_, HashMap<String, Vec<(u64, Handler)>>> {
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, event: &str, handler: Handler) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.locked()
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    pub fn remove(&self, event: &str, id: u64) {
        let mut handlers = self.locked();
        if let Some(list) = handlers.get_mut(event) {
            list.retain(|(handler_id, _)| *handler_id != id);
            if list.is_empty() {
                handlers.remove(event);
            }
        }
    }

    pub fn clear(&self) {
        self.locked().clear();
    }

    pub fn dispatch(&self, event: &str, payload: &Value) {
        // Snapshot outside the lock so handlers may register/unregister.
        let snapshot: Vec<(u64, Handler)> =
            self.locked().get(event).cloned().unwrap_or_default();

        for (id, handler) in snapshot {
            let outcome =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(payload)));
            if outcome.is_err() {
                warn!(event = %event, handler = id, "event handler panicked, continuing dispatch");
            }
        }
    }

    #[cfg(test)]
    pub fn handler_count(&self) -> usize {
        self.locked().values().map(Vec::len).sum()
    }
}

/// Removes its handler when dropped.
#[must_use = "dropping the subscription unregisters the handler"]
pub struct EventSubscription {
    registry: Weak<HandlerRegistry>,
    event: String,
    id: u64,
}

impl EventSubscription {
    pub(crate) fn new(registry: &Arc<HandlerRegistry>, event: String, id: u64) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            event,
            id,
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.event, self.id);
        }
    }
}
