//! In-memory event storage for tests and local development.

use crate::event::Event;
use crate::storage::{validate_event, EventStore, StorageError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[cfg(test)]
#[path = "memory_store_tests.rs"]
mod tests;

#[derive(Debug, Default)]
struct StoreState {
    events: Mutex<Vec<Event>>,
    next_id: AtomicI64,
    unavailable: AtomicBool,
}

/// Event store that keeps saved events in memory
///
/// Clones share the same storage. Identifiers start at 1 and increase with
/// every successful save.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventStore {
    state: Arc<StoreState>,
}

impl InMemoryEventStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every saved event, in save order
    pub fn events(&self) -> Vec<Event> {
        self.lock_events().clone()
    }

    /// Number of saved events
    pub fn len(&self) -> usize {
        self.lock_events().len()
    }

    /// Whether nothing has been saved yet
    pub fn is_empty(&self) -> bool {
        self.lock_events().is_empty()
    }

    /// Make every subsequent save fail with [`StorageError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock_events(&self) -> MutexGuard<'_, Vec<Event>> {
        // Recover from poisoning; every write is a single push.
        self.state
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn save(&self, event: &Event) -> Result<i64, StorageError> {
        if self.state.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                message: "in-memory store switched off".to_string(),
            });
        }

        validate_event(event)?;

        let mut events = self.lock_events();
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        events.push(event.clone().with_id(id));

        debug!(event_id = id, event_type = %event.event_type, "Event stored in memory");
        Ok(id)
    }
}
