//! Tests for the traffic producer.

use super::*;
use async_trait::async_trait;
use queue_runtime::{
    InMemoryConfig, InMemoryProvider, ProviderType, QueueConfig, ReceiptHandle, ReceivedMessage,
    StandardQueueClient,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU32, Ordering};

fn queue() -> QueueName {
    QueueName::new("events".to_string()).unwrap()
}

fn producer(provider: &InMemoryProvider, interval: Duration) -> Arc<EventProducer> {
    let client = StandardQueueClient::new(Box::new(provider.clone()), QueueConfig::default());
    Arc::new(EventProducer::new(Arc::new(client), queue(), interval))
}

/// Client whose first sends fail
struct FlakyClient {
    inner: StandardQueueClient,
    failures_left: AtomicU32,
}

#[async_trait]
impl QueueClient for FlakyClient {
    async fn resolve_queue(&self, queue: &QueueName) -> Result<(), QueueError> {
        self.inner.resolve_queue(queue).await
    }

    async fn send_message(
        &self,
        queue: &QueueName,
        message: Message,
    ) -> Result<MessageId, QueueError> {
        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueError::ConnectionFailed {
                message: "broker unreachable".to_string(),
            });
        }
        self.inner.send_message(queue, message).await
    }

    async fn receive_messages(
        &self,
        queue: &QueueName,
        max_messages: u32,
        wait_time: chrono::Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.inner
            .receive_messages(queue, max_messages, wait_time)
            .await
    }

    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        self.inner.complete_message(receipt).await
    }

    fn provider_type(&self) -> ProviderType {
        self.inner.provider_type()
    }

    fn max_batch_size(&self) -> u32 {
        self.inner.max_batch_size()
    }
}

#[test]
fn test_generated_events_follow_transaction_shape() {
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..50 {
        let event = EventProducer::generate_event(&mut rng);

        assert_eq!(event.event_type, "transaction_approved");
        assert!(CLIENT_IDS.contains(&event.client_id.as_str()));
        assert_eq!(event.payload["currency"], "GBP");

        let transaction = event.payload["transaction_id"].as_str().unwrap();
        let number: u32 = transaction.strip_prefix("txn_").unwrap().parse().unwrap();
        assert!(number < 1000);

        let amount = event.payload["amount"].as_str().unwrap();
        let (units, fraction) = amount.split_once('.').unwrap();
        assert!(units.parse::<u32>().unwrap() < 1000);
        assert!(fraction.parse::<u32>().unwrap() < 99);
    }
}

#[test]
fn test_generated_event_passes_storage_validation() {
    let mut rng = StdRng::seed_from_u64(42);
    let event = EventProducer::generate_event(&mut rng);

    assert!(crate::storage::validate_event(&event).is_ok());
}

#[tokio::test]
async fn test_send_event_publishes_decodable_body() {
    let provider = InMemoryProvider::new(InMemoryConfig::default());
    let producer = producer(&provider, DEFAULT_PRODUCE_INTERVAL);

    let (event, _) = producer.send_event().await.unwrap();

    let bodies = provider.message_bodies(&queue());
    assert_eq!(bodies.len(), 1);
    let decoded = Event::decode(&bodies[0]).unwrap();
    assert_eq!(decoded, event);
}

#[tokio::test(start_paused = true)]
async fn test_run_sends_one_event_per_interval() {
    let provider = InMemoryProvider::new(InMemoryConfig::default());
    let producer = producer(&provider, Duration::from_secs(15));
    let token = CancellationToken::new();

    let handle = tokio::spawn({
        let producer = producer.clone();
        let token = token.clone();
        async move { producer.run(token).await }
    });

    tokio::time::sleep(Duration::from_secs(31)).await;
    token.cancel();
    handle.await.unwrap();

    // Ticks at 0s, 15s and 30s
    assert_eq!(provider.visible_count(&queue()), 3);
}

#[tokio::test(start_paused = true)]
async fn test_run_continues_after_send_failure() {
    let provider = InMemoryProvider::new(InMemoryConfig::default());
    let client = FlakyClient {
        inner: StandardQueueClient::new(Box::new(provider.clone()), QueueConfig::default()),
        failures_left: AtomicU32::new(1),
    };
    let producer = Arc::new(EventProducer::new(
        Arc::new(client),
        queue(),
        Duration::from_secs(1),
    ));
    let token = CancellationToken::new();

    let handle = tokio::spawn({
        let producer = producer.clone();
        let token = token.clone();
        async move { producer.run(token).await }
    });

    tokio::time::sleep(Duration::from_millis(2500)).await;
    token.cancel();
    handle.await.unwrap();

    assert_eq!(provider.visible_count(&queue()), 2);
}

#[test]
fn test_short_interval_is_raised_to_minimum() {
    let provider = InMemoryProvider::new(InMemoryConfig::default());

    assert_eq!(producer(&provider, Duration::ZERO).interval(), MIN_PRODUCE_INTERVAL);
    assert_eq!(
        producer(&provider, Duration::from_millis(200)).interval(),
        MIN_PRODUCE_INTERVAL
    );
    assert_eq!(
        producer(&provider, Duration::from_secs(3)).interval(),
        Duration::from_secs(3)
    );
}

#[tokio::test(start_paused = true)]
async fn test_run_with_zero_interval_sends_at_minimum_rate() {
    let provider = InMemoryProvider::new(InMemoryConfig::default());
    let producer = producer(&provider, Duration::ZERO);
    let token = CancellationToken::new();

    let handle = tokio::spawn({
        let producer = producer.clone();
        let token = token.clone();
        async move { producer.run(token).await }
    });

    tokio::time::sleep(Duration::from_millis(2500)).await;
    token.cancel();
    handle.await.unwrap();

    // Ticks at 0s, 1s and 2s
    assert_eq!(provider.visible_count(&queue()), 3);
}
