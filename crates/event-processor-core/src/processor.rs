//! # Consumption Loop
//!
//! Drains the primary queue, turning every received message into either a
//! persisted [`Event`] or a dead-lettered message.
//!
//! Per-message state machine:
//!
//! ```text
//! Received --decode ok--> persist --ok--> delete --> Done
//!                                 --err-> left in queue (broker redelivers)
//! Received --decode err-> send body to DLQ --ok--> delete --> Done
//!                                          --err-> left in queue
//! ```
//!
//! A message is only deleted from the primary queue after it was persisted or
//! copied to the dead-letter queue. Failures of one message never affect the
//! others in the same batch, and no error escapes the loop.

use crate::event::Event;
use crate::storage::EventStore;
use chrono::Duration;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use queue_runtime::{Message, QueueClient, QueueError, QueueName, ReceivedMessage};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;

/// Tuning for the consumption loop
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Messages requested per receive, capped by the client's batch limit
    pub batch_size: u32,
    /// Long-poll wait when the queue is empty
    pub wait_time: Duration,
    /// Pause after a failed receive when the error suggests no delay of its own
    pub receive_error_backoff: Duration,
    /// Messages of one batch processed at the same time
    pub max_concurrency: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            wait_time: Duration::seconds(5),
            receive_error_backoff: Duration::seconds(1),
            max_concurrency: 1,
        }
    }
}

/// Terminal state of one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Stored; `acknowledged` is false when the delete afterwards failed
    Persisted { event_id: i64, acknowledged: bool },
    /// Body copied to the dead-letter queue and removed from the primary queue
    DeadLettered,
    /// Undecodable body that could not be fully moved to the dead-letter queue
    DeadLetterFailed { reason: String },
    /// Storage refused or failed; the message stays for redelivery
    PersistFailed { reason: String },
}

impl MessageOutcome {
    /// Whether the delivery is still in the primary queue
    pub fn left_in_queue(&self) -> bool {
        match self {
            Self::Persisted { acknowledged, .. } => !acknowledged,
            Self::DeadLettered => false,
            Self::DeadLetterFailed { .. } => true,
            Self::PersistFailed { .. } => true,
        }
    }
}

/// Per-batch counts of message outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub received: usize,
    pub persisted: usize,
    pub dead_lettered: usize,
    /// Messages neither deleted nor dead-lettered
    pub left_in_queue: usize,
    /// Persisted messages whose delete failed
    pub unacknowledged: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Persisted { acknowledged, .. } => {
                self.persisted += 1;
                if !acknowledged {
                    self.unacknowledged += 1;
                }
            }
            MessageOutcome::DeadLettered => self.dead_lettered += 1,
            MessageOutcome::DeadLetterFailed { .. } | MessageOutcome::PersistFailed { .. } => {
                self.left_in_queue += 1
            }
        }
    }
}

/// Failure while moving a message to the dead-letter queue
#[derive(Debug, Error)]
pub enum DeadLetterError {
    #[error("Failed to send message to dead-letter queue: {0}")]
    Send(#[source] QueueError),

    #[error("Message copied to dead-letter queue but not deleted from primary queue: {0}")]
    Delete(#[source] QueueError),
}

/// Mediator between the primary queue, the dead-letter queue and storage
pub struct EventProcessor {
    queue_client: Arc<dyn QueueClient>,
    store: Arc<dyn EventStore>,
    queue: QueueName,
    dead_letter_queue: QueueName,
    config: ProcessorConfig,
}

impl EventProcessor {
    /// Create a processor over already resolved queues
    pub fn new(
        queue_client: Arc<dyn QueueClient>,
        store: Arc<dyn EventStore>,
        queue: QueueName,
        dead_letter_queue: QueueName,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            queue_client,
            store,
            queue,
            dead_letter_queue,
            config,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    fn batch_size(&self) -> u32 {
        self.config
            .batch_size
            .clamp(1, self.queue_client.max_batch_size().max(1))
    }

    /// Consume until `cancellation` fires
    ///
    /// Cancellation abandons a pending receive or error pause immediately. A
    /// batch that was already received is processed to completion first.
    pub async fn run(&self, cancellation: CancellationToken) {
        info!(
            queue = %self.queue,
            dead_letter_queue = %self.dead_letter_queue,
            batch_size = self.batch_size(),
            wait_time_secs = self.config.wait_time.num_seconds(),
            max_concurrency = self.config.max_concurrency,
            "Starting consumption loop"
        );

        loop {
            let received = tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                result = self.receive() => result,
            };

            match received {
                Ok(messages) if messages.is_empty() => {
                    debug!(queue = %self.queue, "No messages received");
                }
                Ok(messages) => {
                    let summary = self.process_messages(&messages).await;
                    info!(
                        queue = %self.queue,
                        received = summary.received,
                        persisted = summary.persisted,
                        dead_lettered = summary.dead_lettered,
                        left_in_queue = summary.left_in_queue,
                        unacknowledged = summary.unacknowledged,
                        "Batch processed"
                    );
                }
                Err(e) => {
                    let backoff = e.retry_after().unwrap_or(self.config.receive_error_backoff);
                    error!(
                        queue = %self.queue,
                        error = %e,
                        transient = e.is_transient(),
                        retry_in_ms = backoff.num_milliseconds(),
                        "Failed to receive messages"
                    );

                    tokio::select! {
                        biased;
                        _ = cancellation.cancelled() => break,
                        _ = tokio::time::sleep(backoff.to_std().unwrap_or_default()) => {}
                    }
                }
            }
        }

        info!(queue = %self.queue, "Consumption loop stopped");
    }

    async fn receive(&self) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.queue_client
            .receive_messages(&self.queue, self.batch_size(), self.config.wait_time)
            .await
    }

    /// Receive one batch and process every message in it
    pub async fn process_batch(&self) -> Result<BatchSummary, QueueError> {
        let messages = self.receive().await?;
        Ok(self.process_messages(&messages).await)
    }

    async fn process_messages(&self, messages: &[ReceivedMessage]) -> BatchSummary {
        let mut summary = BatchSummary {
            received: messages.len(),
            ..BatchSummary::default()
        };

        if self.config.max_concurrency <= 1 {
            for message in messages {
                summary.record(&self.process_message(message).await);
            }
        } else {
            // Built eagerly so the stream holds no closure over borrowed messages
            let pending: Vec<BoxFuture<'_, MessageOutcome>> = messages
                .iter()
                .map(|message| -> BoxFuture<'_, MessageOutcome> {
                    Box::pin(self.process_message(message))
                })
                .collect();
            let outcomes: Vec<MessageOutcome> = stream::iter(pending)
                .buffer_unordered(self.config.max_concurrency)
                .collect()
                .await;
            for outcome in &outcomes {
                summary.record(outcome);
            }
        }

        summary
    }

    /// Decode, persist and acknowledge a single delivery
    pub async fn process_message(&self, message: &ReceivedMessage) -> MessageOutcome {
        let event = match Event::decode(&message.body) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    message_id = %message.message_id,
                    receipt = %message.receipt_handle,
                    delivery_count = message.delivery_count,
                    body = %message.body_text(),
                    error = %e,
                    "Failed to decode message, routing to dead-letter queue"
                );
                return self.dead_letter(message).await;
            }
        };

        let event_id = match self.store.save(&event).await {
            Ok(event_id) => event_id,
            Err(e) => {
                error!(
                    message_id = %message.message_id,
                    event_type = %event.event_type,
                    client_id = %event.client_id,
                    delivery_count = message.delivery_count,
                    error = %e,
                    transient = e.is_transient(),
                    "Failed to persist event, leaving message in queue"
                );
                return MessageOutcome::PersistFailed {
                    reason: e.to_string(),
                };
            }
        };

        match self
            .queue_client
            .complete_message(&message.receipt_handle)
            .await
        {
            Ok(()) => {
                info!(
                    event_id,
                    message_id = %message.message_id,
                    event_type = %event.event_type,
                    client_id = %event.client_id,
                    timestamp = %event.timestamp.to_rfc3339(),
                    "Event persisted"
                );
                MessageOutcome::Persisted {
                    event_id,
                    acknowledged: true,
                }
            }
            Err(e) => {
                error!(
                    event_id,
                    message_id = %message.message_id,
                    receipt = %message.receipt_handle,
                    event_type = %event.event_type,
                    client_id = %event.client_id,
                    error = %e,
                    "Event persisted but message could not be deleted; it may be persisted again on redelivery"
                );
                MessageOutcome::Persisted {
                    event_id,
                    acknowledged: false,
                }
            }
        }
    }

    async fn dead_letter(&self, message: &ReceivedMessage) -> MessageOutcome {
        match self.send_to_dead_letter(message).await {
            Ok(()) => {
                info!(
                    message_id = %message.message_id,
                    dead_letter_queue = %self.dead_letter_queue,
                    body = %message.body_text(),
                    "Message moved to dead-letter queue"
                );
                MessageOutcome::DeadLettered
            }
            Err(e) => {
                error!(
                    message_id = %message.message_id,
                    receipt = %message.receipt_handle,
                    dead_letter_queue = %self.dead_letter_queue,
                    body = %message.body_text(),
                    error = %e,
                    "Failed to move message to dead-letter queue"
                );
                MessageOutcome::DeadLetterFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Copy the raw body to the dead-letter queue, then delete the original
    ///
    /// The body is forwarded byte for byte without the original attributes.
    /// Nothing is deleted when the send fails.
    pub async fn send_to_dead_letter(
        &self,
        message: &ReceivedMessage,
    ) -> Result<(), DeadLetterError> {
        self.queue_client
            .send_message(&self.dead_letter_queue, Message::new(message.body.clone()))
            .await
            .map_err(DeadLetterError::Send)?;

        self.queue_client
            .complete_message(&message.receipt_handle)
            .await
            .map_err(DeadLetterError::Delete)?;

        Ok(())
    }
}
