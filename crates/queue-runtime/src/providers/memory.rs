//! In-memory queue provider implementation for testing and development.
//!
//! This module provides a fully functional in-memory queue implementation that:
//! - Creates named queues on first use
//! - Hides received messages for a visibility timeout and redelivers them
//!   with a fresh receipt handle if they are not deleted in time
//! - Long-polls empty queues, waking up as soon as a message is sent
//! - Optionally moves messages that exceed a maximum delivery count to a
//!   per-queue dead-letter store, like a broker redrive policy
//! - Provides thread-safe concurrent access
//!
//! Cloning the provider yields another handle onto the same storage, which lets
//! tests inspect queue state while a consumer owns the client.

use crate::client::QueueProvider;
use crate::error::QueueError;
use crate::message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage, Timestamp};
use crate::provider::{InMemoryConfig, ProviderType};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Notify;
use tokio::time::Instant;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Thread-safe storage for all queues
struct QueueStorage {
    queues: HashMap<QueueName, InMemoryQueue>,
    config: InMemoryConfig,
}

impl QueueStorage {
    fn new(config: InMemoryConfig) -> Self {
        Self {
            queues: HashMap::new(),
            config,
        }
    }

    /// Get or create a queue
    fn get_or_create_queue(&mut self, queue_name: &QueueName) -> &mut InMemoryQueue {
        self.queues.entry(queue_name.clone()).or_default()
    }
}

/// Internal queue state for a single queue
#[derive(Default)]
struct InMemoryQueue {
    /// Messages available for delivery
    messages: VecDeque<StoredMessage>,
    /// Delivered messages hidden until deleted or their visibility expires
    in_flight: HashMap<String, InFlightMessage>,
    /// Messages moved aside after too many deliveries
    dead_letter: VecDeque<StoredMessage>,
}

impl InMemoryQueue {
    /// Return expired in-flight messages to the visible queue
    fn release_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, flight)| flight.visible_at <= now)
            .map(|(handle, _)| handle.clone())
            .collect();

        for handle in expired {
            if let Some(flight) = self.in_flight.remove(&handle) {
                self.messages.push_back(flight.message);
            }
        }
    }

    /// Earliest instant at which an in-flight message becomes visible again
    fn next_visibility(&self) -> Option<Instant> {
        self.in_flight.values().map(|flight| flight.visible_at).min()
    }

    fn len(&self) -> usize {
        self.messages.len() + self.in_flight.len()
    }
}

/// A message stored in the queue with metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: Bytes,
    attributes: HashMap<String, String>,
    delivery_count: u32,
}

impl StoredMessage {
    fn from_message(message: &Message, message_id: MessageId) -> Self {
        Self {
            message_id,
            body: message.body.clone(),
            attributes: message.attributes.clone(),
            delivery_count: 0,
        }
    }
}

/// A message currently hidden from other consumers
struct InFlightMessage {
    message: StoredMessage,
    visible_at: Instant,
}

// ============================================================================
// InMemoryProvider
// ============================================================================

/// In-memory queue provider implementation
#[derive(Clone)]
pub struct InMemoryProvider {
    storage: Arc<RwLock<QueueStorage>>,
    message_arrived: Arc<Notify>,
}

impl InMemoryProvider {
    /// Create new in-memory provider with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(RwLock::new(QueueStorage::new(config))),
            message_arrived: Arc::new(Notify::new()),
        }
    }

    /// Number of messages currently available for delivery
    pub fn visible_count(&self, queue: &QueueName) -> usize {
        self.read_queue(queue, |q| q.messages.len())
    }

    /// Number of delivered messages that are neither deleted nor visible again
    pub fn in_flight_count(&self, queue: &QueueName) -> usize {
        self.read_queue(queue, |q| q.in_flight.len())
    }

    /// Bodies of every message still held by the queue, visible or in flight
    pub fn message_bodies(&self, queue: &QueueName) -> Vec<Bytes> {
        self.read_queue(queue, |q| {
            q.messages
                .iter()
                .chain(q.in_flight.values().map(|flight| &flight.message))
                .map(|m| m.body.clone())
                .collect()
        })
    }

    /// Bodies of messages the broker moved aside after too many deliveries
    pub fn dead_letter_bodies(&self, queue: &QueueName) -> Vec<Bytes> {
        self.read_queue(queue, |q| {
            q.dead_letter.iter().map(|m| m.body.clone()).collect()
        })
    }

    fn read_queue<T: Default>(&self, queue: &QueueName, read: impl FnOnce(&InMemoryQueue) -> T) -> T {
        match self.storage.read() {
            Ok(storage) => storage.queues.get(queue).map(read).unwrap_or_default(),
            Err(_) => T::default(),
        }
    }

    fn read_storage(&self) -> Result<RwLockReadGuard<'_, QueueStorage>, QueueError> {
        self.storage.read().map_err(|_| poisoned())
    }

    fn write_storage(&self) -> Result<RwLockWriteGuard<'_, QueueStorage>, QueueError> {
        self.storage.write().map_err(|_| poisoned())
    }

    /// Take up to `max_messages` visible messages, marking them in flight
    fn take_available(
        &self,
        queue: &QueueName,
        max_messages: u32,
    ) -> Result<(Vec<ReceivedMessage>, Option<Instant>), QueueError> {
        let mut storage = self.write_storage()?;
        let visibility_timeout = storage.config.visibility_timeout;
        let max_delivery_count = storage.config.max_delivery_count;
        let queue_state = storage.get_or_create_queue(queue);

        let now = Instant::now();
        queue_state.release_expired(now);

        let mut received = Vec::new();
        while received.len() < max_messages as usize {
            let Some(mut stored) = queue_state.messages.pop_front() else {
                break;
            };

            if max_delivery_count.is_some_and(|max| stored.delivery_count >= max) {
                tracing::debug!(
                    queue = %queue,
                    message_id = %stored.message_id,
                    delivery_count = stored.delivery_count,
                    "Maximum delivery count exceeded, moving message to dead-letter store"
                );
                queue_state.dead_letter.push_back(stored);
                continue;
            }

            stored.delivery_count += 1;
            let handle = uuid::Uuid::new_v4().to_string();

            received.push(ReceivedMessage {
                message_id: stored.message_id.clone(),
                body: stored.body.clone(),
                attributes: stored.attributes.clone(),
                receipt_handle: ReceiptHandle::new(
                    handle.clone(),
                    queue.clone(),
                    ProviderType::InMemory,
                ),
                delivery_count: stored.delivery_count,
                delivered_at: Timestamp::now(),
            });

            queue_state.in_flight.insert(
                handle,
                InFlightMessage {
                    message: stored,
                    visible_at: now + visibility_timeout,
                },
            );
        }

        Ok((received, queue_state.next_visibility()))
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

fn poisoned() -> QueueError {
    QueueError::ProviderError {
        provider: ProviderType::InMemory.to_string(),
        code: "StoragePoisoned".to_string(),
        message: "queue storage lock was poisoned".to_string(),
    }
}

#[async_trait]
impl QueueProvider for InMemoryProvider {
    async fn resolve_queue(&self, queue: &QueueName) -> Result<(), QueueError> {
        self.write_storage()?.get_or_create_queue(queue);
        Ok(())
    }

    async fn send_message(
        &self,
        queue: &QueueName,
        message: &Message,
    ) -> Result<MessageId, QueueError> {
        let message_id = MessageId::new();
        {
            let mut storage = self.write_storage()?;
            let max_queue_size = storage.config.max_queue_size;
            let queue_state = storage.get_or_create_queue(queue);

            if queue_state.len() >= max_queue_size {
                return Err(QueueError::ProviderError {
                    provider: ProviderType::InMemory.to_string(),
                    code: "QueueFull".to_string(),
                    message: format!("queue '{}' holds {} messages", queue, max_queue_size),
                });
            }

            queue_state
                .messages
                .push_back(StoredMessage::from_message(message, message_id.clone()));
        }

        self.message_arrived.notify_waiters();
        Ok(message_id)
    }

    async fn receive_messages(
        &self,
        queue: &QueueName,
        max_messages: u32,
        wait_time: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let deadline = Instant::now() + wait_time.to_std().unwrap_or_default();

        loop {
            // Register interest before checking so a concurrent send is not missed
            let arrived = self.message_arrived.notified();
            tokio::pin!(arrived);
            arrived.as_mut().enable();

            let (received, next_visibility) = self.take_available(queue, max_messages)?;
            if !received.is_empty() || Instant::now() >= deadline {
                return Ok(received);
            }

            let wake_at = next_visibility.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = &mut arrived => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let mut storage = self.write_storage()?;
        let removed = storage
            .queues
            .get_mut(receipt.queue())
            .and_then(|q| q.in_flight.remove(receipt.handle()));

        match removed {
            Some(_) => Ok(()),
            None => Err(QueueError::MessageNotFound {
                receipt: receipt.to_string(),
            }),
        }
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }

    fn max_batch_size(&self) -> u32 {
        ProviderType::InMemory.max_batch_size()
    }
}

impl std::fmt::Debug for InMemoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queue_count = self.read_storage().map(|s| s.queues.len()).unwrap_or(0);
        f.debug_struct("InMemoryProvider")
            .field("queue_count", &queue_count)
            .finish()
    }
}
