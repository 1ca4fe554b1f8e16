//! Tests for the event model.

use super::*;
use chrono::TimeZone;
use serde_json::json;

const APPROVED: &str = r#"{"event_type":"transaction_approved","client_id":"client_123","payload":{"amount":"120.50","currency":"GBP"},"timestamp":"2025-08-18T07:48:48Z"}"#;

#[test]
fn test_decode_well_formed_event() {
    let event = Event::decode(APPROVED.as_bytes()).unwrap();

    assert_eq!(event.id, None);
    assert_eq!(event.event_type, "transaction_approved");
    assert_eq!(event.client_id, "client_123");
    assert_eq!(event.payload, json!({"amount": "120.50", "currency": "GBP"}));
    assert_eq!(
        event.timestamp,
        Utc.with_ymd_and_hms(2025, 8, 18, 7, 48, 48).unwrap()
    );
}

#[test]
fn test_decode_normalizes_offset_to_utc() {
    let body = r#"{"event_type":"t","client_id":"c","payload":null,"timestamp":"2025-08-18T03:48:48-04:00"}"#;

    let event = Event::decode(body.as_bytes()).unwrap();

    assert_eq!(
        event.timestamp,
        Utc.with_ymd_and_hms(2025, 8, 18, 7, 48, 48).unwrap()
    );
}

#[test]
fn test_decode_ignores_unknown_fields() {
    let body = r#"{"event_type":"t","client_id":"c","payload":[1,2],"timestamp":"2025-08-18T07:48:48Z","source":"producer"}"#;

    let event = Event::decode(body.as_bytes()).unwrap();
    assert_eq!(event.payload, json!([1, 2]));
}

#[test]
fn test_decode_accepts_empty_strings() {
    let body = r#"{"event_type":"","client_id":"client_123","payload":{},"timestamp":"2025-08-18T07:48:48Z"}"#;

    let event = Event::decode(body.as_bytes()).unwrap();
    assert!(event.event_type.is_empty());
}

#[test]
fn test_decode_fills_missing_fields_with_empty_values() {
    let event = Event::decode(br#"{"client_id":"client_123"}"#).unwrap();

    assert_eq!(event.event_type, "");
    assert_eq!(event.client_id, "client_123");
    assert_eq!(event.payload, serde_json::Value::Null);
    assert_eq!(event.timestamp, unset_timestamp());
}

#[test]
fn test_decode_empty_object() {
    let event = Event::decode(b"{}").unwrap();

    assert!(event.event_type.is_empty());
    assert!(event.client_id.is_empty());
}

#[test]
fn test_decode_missing_timestamp_uses_year_one() {
    let body = r#"{"event_type":"t","client_id":"c","payload":{}}"#;

    let event = Event::decode(body.as_bytes()).unwrap();

    assert_eq!(
        event.timestamp,
        Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap()
    );
}

#[test]
fn test_decode_rejects_malformed_bodies() {
    let bodies = [
        "not-json",
        "",
        "[]",
        "42",
        r#"{"event_type":1,"client_id":"c","payload":{},"timestamp":"2025-08-18T07:48:48Z"}"#,
        r#"{"event_type":"t","client_id":"c","payload":{},"timestamp":"yesterday"}"#,
    ];

    for body in bodies {
        assert!(
            Event::decode(body.as_bytes()).is_err(),
            "expected decode failure for {:?}",
            body
        );
    }
}

#[test]
fn test_encode_omits_missing_id() {
    let event = Event::new(
        "transaction_approved",
        "client_456",
        json!({"amount": "1.2"}),
        Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
    );

    let encoded: serde_json::Value = serde_json::from_slice(&event.encode().unwrap()).unwrap();

    assert_eq!(
        encoded,
        json!({
            "event_type": "transaction_approved",
            "client_id": "client_456",
            "payload": {"amount": "1.2"},
            "timestamp": "2025-01-02T03:04:05Z"
        })
    );
}

#[test]
fn test_encoded_event_decodes_to_same_event() {
    let event = Event::decode(APPROVED.as_bytes()).unwrap();
    let decoded = Event::decode(&event.encode().unwrap()).unwrap();

    assert_eq!(decoded, event);
}

#[test]
fn test_with_id_sets_identifier() {
    let event = Event::decode(APPROVED.as_bytes()).unwrap().with_id(42);
    assert_eq!(event.id, Some(42));
}
