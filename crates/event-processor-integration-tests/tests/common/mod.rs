//! Common test utilities for event processor integration tests
//!
//! Wires an [`EventProcessor`] to the in-memory queue provider and the
//! in-memory event store, keeping handles on both for inspection.

use bytes::Bytes;
use event_processor_core::{EventProcessor, InMemoryEventStore, ProcessorConfig};
use queue_runtime::{
    InMemoryConfig, InMemoryProvider, Message, QueueClient, QueueConfig, QueueName,
    StandardQueueClient,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const APPROVED_BODY: &str = r#"{"event_type":"transaction_approved","client_id":"client_123","payload":{"amount":"120.50","currency":"GBP"},"timestamp":"2025-08-18T07:48:48Z"}"#;

pub const EMPTY_EVENT_TYPE_BODY: &str = r#"{"event_type":"","client_id":"client_123","payload":{"amount":"1.00"},"timestamp":"2025-08-18T07:48:48Z"}"#;

pub fn primary_queue() -> QueueName {
    QueueName::new("events".to_string()).unwrap()
}

pub fn dead_letter_queue() -> QueueName {
    QueueName::new("events-dlq".to_string()).unwrap()
}

/// Body of a well-formed event for `client_id`
#[allow(dead_code)]
pub fn event_body(client_id: &str, amount: &str) -> String {
    serde_json::json!({
        "event_type": "transaction_approved",
        "client_id": client_id,
        "payload": {"amount": amount, "currency": "GBP"},
        "timestamp": "2025-08-18T07:48:48Z",
    })
    .to_string()
}

/// Processor plus inspectable queue and storage state
pub struct Harness {
    pub provider: InMemoryProvider,
    pub client: Arc<dyn QueueClient>,
    pub store: InMemoryEventStore,
    pub processor: Arc<EventProcessor>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_queue_config(InMemoryConfig::default())
    }

    pub fn with_queue_config(queue_config: InMemoryConfig) -> Self {
        let provider = InMemoryProvider::new(queue_config);
        let client: Arc<dyn QueueClient> = Arc::new(StandardQueueClient::new(
            Box::new(provider.clone()),
            QueueConfig::default(),
        ));
        let store = InMemoryEventStore::new();
        let processor = Arc::new(EventProcessor::new(
            client.clone(),
            Arc::new(store.clone()),
            primary_queue(),
            dead_letter_queue(),
            ProcessorConfig::default(),
        ));

        Self {
            provider,
            client,
            store,
            processor,
        }
    }

    pub async fn enqueue(&self, body: &str) {
        self.client
            .send_message(&primary_queue(), Message::from(body.to_string()))
            .await
            .unwrap();
    }

    pub fn primary_bodies(&self) -> Vec<Bytes> {
        self.provider.message_bodies(&primary_queue())
    }

    pub fn dead_letter_bodies(&self) -> Vec<Bytes> {
        self.provider.message_bodies(&dead_letter_queue())
    }

    /// Start the consumption loop on its own task
    #[allow(dead_code)]
    pub fn spawn(&self) -> RunningProcessor {
        let token = CancellationToken::new();
        let processor = self.processor.clone();
        let handle = tokio::spawn({
            let token = token.clone();
            async move { processor.run(token).await }
        });

        RunningProcessor { token, handle }
    }
}

/// Handle on a spawned consumption loop
#[allow(dead_code)]
pub struct RunningProcessor {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

#[allow(dead_code)]
impl RunningProcessor {
    pub async fn stop(self) {
        self.token.cancel();
        self.handle.await.unwrap();
    }
}

/// Poll `condition` every 100ms of (possibly paused) time until it holds
#[allow(dead_code)]
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    while !condition() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
