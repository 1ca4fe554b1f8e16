//! # Persistence Port
//!
//! Single-operation interface the consumption loop uses to durably store
//! decoded events. Implementations live in [`crate::adapters`].

use crate::event::Event;
use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;

/// Interface for durable event storage
///
/// Implementations must reject events with an empty `event_type` or
/// `client_id`, store the payload as JSON and store the timestamp in UTC.
/// They may be invoked concurrently.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one event, returning the storage-assigned identifier
    async fn save(&self, event: &Event) -> Result<i64, StorageError>;
}

/// Errors that can occur while persisting events
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid event: {field} must not be empty")]
    InvalidEvent { field: String },

    #[error("Failed to connect to database: {message}")]
    Connection { message: String },

    #[error("Failed to run database migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Failed to save event: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage unavailable: {message}")]
    Unavailable { message: String },
}

impl StorageError {
    /// Check if a later attempt for the same event may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::InvalidEvent { .. } => false,
            Self::Connection { .. } => true,
            Self::Migration(_) => false,
            Self::Database(_) => true,
            Self::Unavailable { .. } => true,
        }
    }
}

/// Check the fields storage requires before an event is written
pub fn validate_event(event: &Event) -> Result<(), StorageError> {
    if event.event_type.is_empty() {
        return Err(StorageError::InvalidEvent {
            field: "event_type".to_string(),
        });
    }

    if event.client_id.is_empty() {
        return Err(StorageError::InvalidEvent {
            field: "client_id".to_string(),
        });
    }

    Ok(())
}
