//! Tests for error types.

use super::*;

#[test]
fn test_error_transience() {
    assert!(QueueError::ConnectionFailed {
        message: "network error".to_string(),
    }
    .is_transient());

    assert!(QueueError::Timeout {
        duration: Duration::seconds(5),
    }
    .is_transient());

    assert!(!QueueError::QueueNotFound {
        queue_name: "test".to_string(),
    }
    .is_transient());

    assert!(!QueueError::MessageNotFound {
        receipt: "abc".to_string(),
    }
    .is_transient());

    assert!(!QueueError::MessageTooLarge {
        size: 1000,
        max_size: 500
    }
    .is_transient());
}

#[test]
fn test_retry_suggestions() {
    let connection = QueueError::ConnectionFailed {
        message: "refused".to_string(),
    };
    assert_eq!(connection.retry_after(), Some(Duration::seconds(5)));

    let not_found = QueueError::QueueNotFound {
        queue_name: "test".to_string(),
    };
    assert_eq!(not_found.retry_after(), None);
}

#[test]
fn test_nested_errors_convert_into_queue_error() {
    let err: QueueError = ValidationError::Required {
        field: "queue_name".to_string(),
    }
    .into();
    assert!(matches!(err, QueueError::ValidationError(_)));
    assert!(!err.is_transient());

    let err: QueueError = SerializationError::MissingElement {
        element: "QueueUrl".to_string(),
    }
    .into();
    assert_eq!(
        err.to_string(),
        "Serialization failed: Response is missing element 'QueueUrl'"
    );
}
