//! # Traffic Producer
//!
//! Generates `transaction_approved` test events and publishes them to the
//! primary queue on a fixed interval.

use crate::event::{DecodeError, Event};
use bytes::Bytes;
use chrono::Utc;
use queue_runtime::{Message, MessageId, QueueClient, QueueError, QueueName};
use rand::Rng;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[cfg(test)]
#[path = "producer_tests.rs"]
mod tests;

/// Clients generated events are attributed to
pub const CLIENT_IDS: [&str; 3] = ["client_123", "client_456", "client_789"];

/// Event type of every generated event
pub const PRODUCED_EVENT_TYPE: &str = "transaction_approved";

/// Pause between two generated events
pub const DEFAULT_PRODUCE_INTERVAL: Duration = Duration::from_secs(15);

/// Shortest accepted pause between two generated events
pub const MIN_PRODUCE_INTERVAL: Duration = Duration::from_secs(1);

/// Errors publishing a generated event
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("Failed to encode event: {0}")]
    Encode(#[from] DecodeError),

    #[error("Failed to send event: {0}")]
    Queue(#[from] QueueError),
}

/// Periodic publisher of generated events
pub struct EventProducer {
    queue_client: Arc<dyn QueueClient>,
    queue: QueueName,
    interval: Duration,
}

impl EventProducer {
    /// Intervals below [`MIN_PRODUCE_INTERVAL`] are raised to it.
    pub fn new(queue_client: Arc<dyn QueueClient>, queue: QueueName, interval: Duration) -> Self {
        let interval = if interval < MIN_PRODUCE_INTERVAL {
            warn!(
                requested_ms = interval.as_millis() as u64,
                interval_secs = MIN_PRODUCE_INTERVAL.as_secs(),
                "Produce interval too short, using minimum"
            );
            MIN_PRODUCE_INTERVAL
        } else {
            interval
        };

        Self {
            queue_client,
            queue,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Build a random event stamped with the current time
    pub fn generate_event<R: Rng + ?Sized>(rng: &mut R) -> Event {
        let client_id = CLIENT_IDS[rng.random_range(0..CLIENT_IDS.len())];
        let payload = json!({
            "transaction_id": format!("txn_{}", rng.random_range(0..1000)),
            "amount": format!("{}.{}", rng.random_range(0..1000), rng.random_range(0..99)),
            "currency": "GBP",
        });

        Event::new(PRODUCED_EVENT_TYPE, client_id, payload, Utc::now())
    }

    /// Generate one event and send it to the queue
    pub async fn send_event(&self) -> Result<(Event, MessageId), ProducerError> {
        let event = {
            let mut rng = rand::rng();
            Self::generate_event(&mut rng)
        };
        let body = event.encode()?;

        let message_id = self
            .queue_client
            .send_message(&self.queue, Message::new(Bytes::from(body)))
            .await?;

        Ok((event, message_id))
    }

    /// Publish one event per interval until cancelled, starting immediately
    ///
    /// A failed send is logged and the next tick proceeds as usual.
    pub async fn run(&self, cancellation: CancellationToken) {
        info!(
            queue = %self.queue,
            interval_secs = self.interval.as_secs(),
            "Starting event producer"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.send_event().await {
                Ok((event, message_id)) => info!(
                    message_id = %message_id,
                    event_type = %event.event_type,
                    client_id = %event.client_id,
                    payload = %event.payload,
                    "Event produced"
                ),
                Err(e) => error!(queue = %self.queue, error = %e, "Failed to produce event"),
            }
        }

        info!(queue = %self.queue, "Event producer stopped");
    }
}
