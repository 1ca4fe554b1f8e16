//! # Event Model
//!
//! Canonical decoded representation of a queue message and its JSON wire
//! encoding.
//!
//! The wire format is a JSON object with `event_type`, `client_id`, `payload`
//! and `timestamp` (RFC 3339). Timestamps carrying any UTC offset are normalized
//! to UTC on decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

/// A business event received from the primary queue
///
/// `id` is assigned by storage on persist and is `None` before that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default = "unset_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Seconds from 0001-01-01T00:00:00Z to the Unix epoch
const UNSET_TIMESTAMP_SECS: i64 = -62_135_596_800;

/// Timestamp given to bodies that carry none: 0001-01-01T00:00:00Z
pub fn unset_timestamp() -> DateTime<Utc> {
    DateTime::from_timestamp(UNSET_TIMESTAMP_SECS, 0).unwrap_or_default()
}

impl Event {
    /// Create a new, not yet persisted event
    pub fn new(
        event_type: impl Into<String>,
        client_id: impl Into<String>,
        payload: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            event_type: event_type.into(),
            client_id: client_id.into(),
            payload,
            timestamp,
        }
    }

    /// Decode an event from a message body
    ///
    /// Missing wire fields decode to empty values: `""` for the strings,
    /// `null` for the payload and [`unset_timestamp`] for the timestamp. Unknown
    /// fields are ignored. Empty strings decode successfully; rejecting them is
    /// up to storage.
    ///
    /// # Examples
    ///
    /// ```
    /// use event_processor_core::Event;
    ///
    /// let body = br#"{"event_type":"transaction_approved","client_id":"client_123",
    ///     "payload":{"amount":"120.50"},"timestamp":"2025-08-18T09:48:48+02:00"}"#;
    /// let event = Event::decode(body).unwrap();
    ///
    /// assert_eq!(event.client_id, "client_123");
    /// assert_eq!(event.timestamp.to_rfc3339(), "2025-08-18T07:48:48+00:00");
    /// ```
    pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
        let event: Event = serde_json::from_slice(body)?;
        Ok(event)
    }

    /// Encode the event in its wire format
    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Copy of the event carrying the storage-assigned identifier
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }
}

/// Errors converting between events and their wire format
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid event JSON: {0}")]
    Json(#[from] serde_json::Error),
}
