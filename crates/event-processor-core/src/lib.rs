//! # Event Processor Core
//!
//! Consumes business events from a primary queue, persists them and diverts
//! undecodable messages to a dead-letter queue.
//!
//! The consumption loop depends only on two ports:
//! - [`EventStore`] for durable event storage
//! - [`queue_runtime::QueueClient`] for the primary and dead-letter queues
//!
//! Both are injected at construction; adapters live in [`adapters`] and in the
//! `queue-runtime` crate.
//!
//! ## Usage
//!
//! ```rust
//! use event_processor_core::{EventProcessor, InMemoryEventStore, ProcessorConfig};
//! use queue_runtime::{Message, QueueClient, QueueClientFactory, QueueName};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let client: Arc<dyn QueueClient> = Arc::from(QueueClientFactory::create_test_client());
//! let store = InMemoryEventStore::new();
//! let queue: QueueName = "events".parse().unwrap();
//! let dlq: QueueName = "events-dlq".parse().unwrap();
//!
//! client
//!     .send_message(&queue, Message::from("not-json".to_string()))
//!     .await
//!     .unwrap();
//!
//! let processor = EventProcessor::new(
//!     client,
//!     Arc::new(store.clone()),
//!     queue,
//!     dlq,
//!     ProcessorConfig::default(),
//! );
//! let summary = processor.process_batch().await.unwrap();
//!
//! assert_eq!(summary.dead_lettered, 1);
//! assert!(store.is_empty());
//! # });
//! ```
//!
//! ## Module Organization
//!
//! - [`event`] - Event model and wire format
//! - [`storage`] - Persistence port
//! - [`adapters`] - Postgres and in-memory event stores
//! - [`processor`] - Consumption loop and dead-letter routing
//! - [`producer`] - Test traffic generator
//! - [`config`] - Environment settings

pub mod adapters;
pub mod config;
pub mod event;
pub mod processor;
pub mod producer;
pub mod storage;

pub use adapters::{InMemoryEventStore, PoolSettings, PostgresEventStore};
pub use config::{ConfigError, ConsumerSettings, DatabaseSettings, QueueSettings};
pub use event::{unset_timestamp, DecodeError, Event};
pub use processor::{
    BatchSummary, DeadLetterError, EventProcessor, MessageOutcome, ProcessorConfig,
};
pub use producer::{
    EventProducer, ProducerError, DEFAULT_PRODUCE_INTERVAL, MIN_PRODUCE_INTERVAL,
};
pub use storage::{validate_event, EventStore, StorageError};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
