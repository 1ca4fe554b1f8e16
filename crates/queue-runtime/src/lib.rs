//! # Queue Runtime
//!
//! Provider-agnostic queue runtime used by the event processor to talk to a
//! managed message queue.
//!
//! This library provides:
//! - Batch receive with a bounded long-poll wait
//! - Per-delivery receipt handles for acknowledgement
//! - Plain message send (used for dead-letter forwarding)
//! - An AWS SQS provider speaking the HTTP query API
//! - An in-memory provider with visibility timeouts for tests and development
//!
//! ## Example
//!
//! ```
//! use chrono::Duration;
//! use queue_runtime::{Message, QueueClientFactory, QueueName};
//!
//! # tokio_test::block_on(async {
//! let client = QueueClientFactory::create_test_client();
//! let queue: QueueName = "events".parse().unwrap();
//!
//! client
//!     .send_message(&queue, Message::from("hello".to_string()))
//!     .await
//!     .unwrap();
//!
//! let received = client
//!     .receive_messages(&queue, 10, Duration::seconds(1))
//!     .await
//!     .unwrap();
//! for message in &received {
//!     client.complete_message(&message.receipt_handle).await.unwrap();
//! }
//! # });
//! ```
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Message structures and receipt handles
//! - [`provider`] - Provider types and configuration
//! - [`client`] - Client traits and the provider-backed client
//! - [`providers`] - Concrete provider implementations

pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;

// Re-export commonly used types at crate root for convenience
pub use client::{QueueClient, QueueClientFactory, QueueProvider, StandardQueueClient};
pub use error::{ConfigurationError, QueueError, SerializationError, ValidationError};
pub use message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage, Timestamp};
pub use provider::{AwsSqsConfig, InMemoryConfig, ProviderConfig, ProviderType, QueueConfig};
pub use providers::{AwsSqsProvider, InMemoryProvider};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
