//! Client traits and implementations for queue operations.

use crate::error::{QueueError, ValidationError};
use crate::message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage};
use crate::provider::{InMemoryConfig, ProviderConfig, ProviderType, QueueConfig};
use crate::providers::{AwsSqsProvider, InMemoryProvider};
use async_trait::async_trait;
use chrono::Duration;
use std::future::Future;
use tracing::debug;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Main interface for queue operations across all providers
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Resolve the queue identity, failing if the queue does not exist
    async fn resolve_queue(&self, queue: &QueueName) -> Result<(), QueueError>;

    /// Send single message to queue
    async fn send_message(
        &self,
        queue: &QueueName,
        message: Message,
    ) -> Result<MessageId, QueueError>;

    /// Receive up to `max_messages`, waiting at most `wait_time` when the queue is empty
    async fn receive_messages(
        &self,
        queue: &QueueName,
        max_messages: u32,
        wait_time: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Delete the delivery identified by the receipt from its queue
    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;

    /// Maximum number of messages a single receive may request
    fn max_batch_size(&self) -> u32;
}

/// Interface implemented by specific queue providers
#[async_trait]
pub trait QueueProvider: Send + Sync {
    /// Look up (and cache) the queue
    async fn resolve_queue(&self, queue: &QueueName) -> Result<(), QueueError>;

    /// Send single message
    async fn send_message(
        &self,
        queue: &QueueName,
        message: &Message,
    ) -> Result<MessageId, QueueError>;

    /// Receive multiple messages
    async fn receive_messages(
        &self,
        queue: &QueueName,
        max_messages: u32,
        wait_time: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Delete a delivered message
    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;

    /// Get maximum batch size
    fn max_batch_size(&self) -> u32;
}

/// Factory for creating queue clients with appropriate providers
pub struct QueueClientFactory;

impl QueueClientFactory {
    /// Create queue client from configuration
    pub async fn create_client(config: QueueConfig) -> Result<Box<dyn QueueClient>, QueueError> {
        let provider: Box<dyn QueueProvider> = match &config.provider {
            ProviderConfig::InMemory(in_memory_config) => {
                Box::new(InMemoryProvider::new(in_memory_config.clone()))
            }
            ProviderConfig::AwsSqs(aws_config) => Box::new(
                AwsSqsProvider::new(aws_config.clone())
                    .await
                    .map_err(|e| e.to_queue_error())?,
            ),
        };

        Ok(Box::new(StandardQueueClient::new(provider, config)))
    }

    /// Create test client with in-memory provider
    pub fn create_test_client() -> Box<dyn QueueClient> {
        let provider = InMemoryProvider::new(InMemoryConfig::default());
        let config = QueueConfig::default();
        Box::new(StandardQueueClient::new(Box::new(provider), config))
    }
}

/// Standard queue client implementation
///
/// Validates requests against provider limits and bounds every provider call
/// by the configured request timeout (plus the long-poll wait for receives).
pub struct StandardQueueClient {
    provider: Box<dyn QueueProvider>,
    config: QueueConfig,
}

impl StandardQueueClient {
    /// Create new standard queue client with provider
    pub fn new(provider: Box<dyn QueueProvider>, config: QueueConfig) -> Self {
        Self { provider, config }
    }

    async fn with_timeout<T, F>(&self, extra: Duration, operation: F) -> Result<T, QueueError>
    where
        T: Send,
        F: Future<Output = Result<T, QueueError>> + Send,
    {
        let limit = self.config.request_timeout + extra;
        let std_limit = limit.to_std().unwrap_or(std::time::Duration::ZERO);

        match tokio::time::timeout(std_limit, operation).await {
            Ok(result) => result,
            Err(_) => Err(QueueError::Timeout { duration: limit }),
        }
    }
}

#[async_trait]
impl QueueClient for StandardQueueClient {
    async fn resolve_queue(&self, queue: &QueueName) -> Result<(), QueueError> {
        self.with_timeout(Duration::zero(), self.provider.resolve_queue(queue))
            .await
    }

    async fn send_message(
        &self,
        queue: &QueueName,
        message: Message,
    ) -> Result<MessageId, QueueError> {
        let max_size = self.provider.provider_type().max_message_size();
        if message.body.len() > max_size {
            return Err(QueueError::MessageTooLarge {
                size: message.body.len(),
                max_size,
            });
        }

        let message_id = self
            .with_timeout(Duration::zero(), self.provider.send_message(queue, &message))
            .await?;
        debug!(queue = %queue, message_id = %message_id, "Message sent");
        Ok(message_id)
    }

    async fn receive_messages(
        &self,
        queue: &QueueName,
        max_messages: u32,
        wait_time: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        if max_messages == 0 {
            return Err(ValidationError::OutOfRange {
                field: "max_messages".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }

        let max_size = self.provider.max_batch_size();
        if max_messages > max_size {
            return Err(QueueError::BatchTooLarge {
                size: max_messages as usize,
                max_size: max_size as usize,
            });
        }

        let wait_time = wait_time.max(Duration::zero());
        self.with_timeout(
            wait_time,
            self.provider
                .receive_messages(queue, max_messages, wait_time),
        )
        .await
    }

    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        self.with_timeout(Duration::zero(), self.provider.complete_message(receipt))
            .await
    }

    fn provider_type(&self) -> ProviderType {
        self.provider.provider_type()
    }

    fn max_batch_size(&self) -> u32 {
        self.provider.max_batch_size()
    }
}
