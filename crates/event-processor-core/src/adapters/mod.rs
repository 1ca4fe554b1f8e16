//! Concrete [`EventStore`](crate::storage::EventStore) implementations.

pub mod memory_store;
pub mod postgres_store;

pub use memory_store::InMemoryEventStore;
pub use postgres_store::{PostgresEventStore, PoolSettings, MIGRATOR};
