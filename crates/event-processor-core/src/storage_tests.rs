//! Tests for the persistence port.

use super::*;
use chrono::Utc;
use serde_json::json;

fn event(event_type: &str, client_id: &str) -> Event {
    Event::new(event_type, client_id, json!({}), Utc::now())
}

#[test]
fn test_validate_accepts_complete_event() {
    assert!(validate_event(&event("transaction_approved", "client_123")).is_ok());
}

#[test]
fn test_validate_rejects_empty_event_type() {
    match validate_event(&event("", "client_123")) {
        Err(StorageError::InvalidEvent { field }) => assert_eq!(field, "event_type"),
        other => panic!("expected InvalidEvent, got {:?}", other),
    }
}

#[test]
fn test_validate_rejects_empty_client_id() {
    match validate_event(&event("transaction_approved", "")) {
        Err(StorageError::InvalidEvent { field }) => assert_eq!(field, "client_id"),
        other => panic!("expected InvalidEvent, got {:?}", other),
    }
}

#[test]
fn test_error_classification() {
    assert!(!StorageError::InvalidEvent {
        field: "event_type".to_string()
    }
    .is_transient());
    assert!(StorageError::Unavailable {
        message: "down".to_string()
    }
    .is_transient());
    assert!(StorageError::Database(sqlx::Error::PoolTimedOut).is_transient());
}
