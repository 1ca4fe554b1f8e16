//! Tests for the Postgres store that need no running database.

use super::*;
use crate::config::DatabaseSettings;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;

fn lazy_store() -> PostgresEventStore {
    let vars: HashMap<String, String> = [
        ("DB_USER", "processor"),
        ("DB_PASSWORD", "secret"),
        ("DB_HOST", "127.0.0.1"),
        ("DB_PORT", "1"),
        ("DB_NAME", "events"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let settings = DatabaseSettings::from_vars(vars).unwrap();

    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(200))
        .connect_lazy_with(settings.connect_options());
    PostgresEventStore::from_pool(pool)
}

#[tokio::test]
async fn test_save_rejects_empty_event_type_before_touching_database() {
    let store = lazy_store();
    let event = Event::new("", "client_123", json!({}), Utc::now());

    match store.save(&event).await {
        Err(StorageError::InvalidEvent { field }) => assert_eq!(field, "event_type"),
        other => panic!("expected InvalidEvent, got {:?}", other),
    }
}

#[tokio::test]
async fn test_save_rejects_empty_client_id_before_touching_database() {
    let store = lazy_store();
    let event = Event::new("transaction_approved", "", json!({}), Utc::now());

    match store.save(&event).await {
        Err(StorageError::InvalidEvent { field }) => assert_eq!(field, "client_id"),
        other => panic!("expected InvalidEvent, got {:?}", other),
    }
}

#[tokio::test]
async fn test_save_reports_unreachable_database_as_transient() {
    let store = lazy_store();
    let event = Event::new("transaction_approved", "client_123", json!({}), Utc::now());

    let error = store.save(&event).await.unwrap_err();
    assert!(matches!(error, StorageError::Database(_)));
    assert!(error.is_transient());
}

#[test]
fn test_migrations_create_events_table() {
    let migrations: Vec<_> = MIGRATOR.iter().collect();

    assert_eq!(migrations.len(), 1);
    assert!(migrations[0].sql.contains("CREATE TABLE"));
    assert!(migrations[0].sql.contains("events"));
}
