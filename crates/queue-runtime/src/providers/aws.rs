//! AWS SQS provider implementation using the HTTP query API.
//!
//! This module talks to SQS (or an SQS-compatible endpoint such as LocalStack or
//! ElasticMQ) with plain HTTP calls instead of the AWS SDK, which keeps the
//! request/response handling visible and lets unit tests run against a mock
//! HTTP server.
//!
//! ## Key Features
//!
//! - **Query API over HTTP**: Form-encoded `POST` requests, XML responses
//! - **AWS Signature V4**: Manual request signing with static credentials
//! - **Endpoint override**: Point at a local emulator via [`AwsSqsConfig::endpoint`]
//! - **Verbatim bodies**: Message bodies are sent and received as-is, so a body
//!   forwarded to another queue arrives byte-for-byte identical
//! - **Queue URL caching**: `GetQueueUrl` is issued once per queue name
//!
//! ## Long Polling
//!
//! `ReceiveMessage` waits up to `WaitTimeSeconds` (0-20) for messages to arrive.
//! Requested wait times outside that range are clamped.
//!
//! ## Example
//!
//! ```no_run
//! use queue_runtime::{AwsSqsConfig, ProviderConfig, QueueClientFactory, QueueConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = QueueConfig {
//!     provider: ProviderConfig::AwsSqs(AwsSqsConfig {
//!         region: "us-east-1".to_string(),
//!         endpoint: Some("http://localhost:4566".to_string()),
//!         access_key_id: "test".to_string(),
//!         secret_access_key: "test".to_string(),
//!     }),
//!     ..Default::default()
//! };
//!
//! let client = QueueClientFactory::create_client(config).await?;
//! # Ok(())
//! # }
//! ```

use crate::client::QueueProvider;
use crate::error::{ConfigurationError, QueueError, SerializationError};
use crate::message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage, Timestamp};
use crate::provider::{AwsSqsConfig, ProviderType};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client as HttpClient;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "aws_tests.rs"]
mod tests;

const API_VERSION: &str = "2012-11-05";
const MAX_WAIT_SECONDS: i64 = 20;
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

// ============================================================================
// Error Types
// ============================================================================

/// AWS SQS specific errors
#[derive(Debug, thiserror::Error)]
pub enum AwsError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("SQS service error: {code}: {message}")]
    ServiceError { code: String, message: String },

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Invalid receipt handle: {0}")]
    InvalidReceipt(String),

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),

    #[error("Malformed response: {0}")]
    SerializationError(String),

    #[error("Message body is not valid UTF-8")]
    InvalidBody,
}

impl AwsError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::ServiceError { .. })
    }

    /// Map AWS error to QueueError
    pub fn to_queue_error(self) -> QueueError {
        match self {
            Self::Authentication(message) => QueueError::AuthenticationFailed { message },
            Self::NetworkError(message) => QueueError::ConnectionFailed { message },
            Self::ServiceError { code, message } => QueueError::ProviderError {
                provider: ProviderType::AwsSqs.to_string(),
                code,
                message,
            },
            Self::QueueNotFound(queue_name) => QueueError::QueueNotFound { queue_name },
            Self::InvalidReceipt(receipt) => QueueError::MessageNotFound { receipt },
            Self::MessageTooLarge { size, max_size } => {
                QueueError::MessageTooLarge { size, max_size }
            }
            Self::ConfigurationError(message) => {
                QueueError::ConfigurationError(ConfigurationError::Invalid { message })
            }
            Self::SerializationError(message) => {
                QueueError::SerializationError(SerializationError::MalformedResponse { message })
            }
            Self::InvalidBody => QueueError::SerializationError(SerializationError::InvalidUtf8),
        }
    }
}

// ============================================================================
// AWS Signature V4 Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// AWS Signature Version 4 signer for request authentication
///
/// Implements the AWS Signature V4 signing process:
/// 1. Create canonical request (method, URI, query, headers, payload)
/// 2. Create string to sign (algorithm, timestamp, scope, request hash)
/// 3. Derive signing key (4-level HMAC chain)
/// 4. Calculate signature and build Authorization header
///
/// ## References
///
/// - [AWS Signature V4](https://docs.aws.amazon.com/general/latest/gr/signature-version-4.html)
#[derive(Clone)]
struct AwsV4Signer {
    access_key: String,
    secret_key: String,
    region: String,
    service: String,
}

impl AwsV4Signer {
    fn new(access_key: String, secret_key: String, region: String) -> Self {
        Self {
            access_key,
            secret_key,
            region,
            service: "sqs".to_string(),
        }
    }

    /// Sign a request whose parameters travel in the body
    ///
    /// Returns the `Authorization` and `x-amz-date` header values. The query
    /// string is always empty for form-encoded requests.
    fn sign_request(
        &self,
        method: &str,
        host: &str,
        path: &str,
        body: &str,
        timestamp: &DateTime<Utc>,
    ) -> SignedHeaders {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        let canonical_headers = format!("host:{}\nx-amz-date:{}\n", host, amz_date);
        let signed_headers = "host;x-amz-date";
        let payload_hash = hex::encode(Sha256::digest(body.as_bytes()));

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method, path, canonical_headers, signed_headers, payload_hash
        );

        let algorithm = "AWS4-HMAC-SHA256";
        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            algorithm,
            amz_date,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = self.calculate_signature(&string_to_sign, &date_stamp);

        SignedHeaders {
            authorization: format!(
                "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                algorithm, self.access_key, credential_scope, signed_headers, signature
            ),
            amz_date,
        }
    }

    /// Derive the signing key for a date
    ///
    /// kSecret = "AWS4" + secret, then HMAC over date, region, service and
    /// "aws4_request" in turn.
    fn signing_key(&self, date_stamp: &str) -> Vec<u8> {
        let k_secret = format!("AWS4{}", self.secret_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, self.service.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }

    fn calculate_signature(&self, string_to_sign: &str, date_stamp: &str) -> String {
        let k_signing = self.signing_key(date_stamp);
        hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()))
    }
}

/// Header values produced by [`AwsV4Signer::sign_request`]
struct SignedHeaders {
    authorization: String,
    amz_date: String,
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

// ============================================================================
// AWS SQS Provider
// ============================================================================

/// AWS SQS queue provider implementation
///
/// The provider is thread-safe and can be shared across async tasks. The queue
/// URL cache is protected by a `RwLock`.
pub struct AwsSqsProvider {
    http_client: HttpClient,
    signer: AwsV4Signer,
    config: AwsSqsConfig,
    endpoint: String,
    host: String,
    path: String,
    queue_url_cache: Arc<RwLock<HashMap<QueueName, String>>>,
}

impl AwsSqsProvider {
    /// Create new AWS SQS provider
    ///
    /// # Errors
    ///
    /// Returns [`AwsError::ConfigurationError`] if the region or credentials are
    /// empty or the endpoint is not a valid URL.
    pub async fn new(config: AwsSqsConfig) -> Result<Self, AwsError> {
        if config.region.is_empty() {
            return Err(AwsError::ConfigurationError(
                "Region cannot be empty".to_string(),
            ));
        }
        if config.access_key_id.is_empty() || config.secret_access_key.is_empty() {
            return Err(AwsError::ConfigurationError(
                "Access key ID and secret access key are required".to_string(),
            ));
        }

        let endpoint = config.endpoint_url();
        let parsed = url::Url::parse(&endpoint)
            .map_err(|e| AwsError::ConfigurationError(format!("Invalid endpoint: {}", e)))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(AwsError::ConfigurationError(format!(
                    "Endpoint has no host: {}",
                    endpoint
                )))
            }
        };
        let path = parsed.path().to_string();

        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AwsError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        let signer = AwsV4Signer::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            config.region.clone(),
        );

        Ok(Self {
            http_client,
            signer,
            config,
            endpoint,
            host,
            path,
            queue_url_cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Get queue URL for a queue name, with caching
    async fn get_queue_url(&self, queue_name: &QueueName) -> Result<String, AwsError> {
        {
            let cache = self.queue_url_cache.read().await;
            if let Some(url) = cache.get(queue_name) {
                return Ok(url.clone());
            }
        }

        let params = vec![
            ("Action", "GetQueueUrl".to_string()),
            ("QueueName", queue_name.as_str().to_string()),
            ("Version", API_VERSION.to_string()),
        ];

        let response = self.make_request(&params).await.map_err(|e| match e {
            AwsError::QueueNotFound(_) => AwsError::QueueNotFound(queue_name.to_string()),
            other => other,
        })?;
        let queue_url = parse_queue_url_response(&response)?;

        debug!(queue = %queue_name, queue_url = %queue_url, "Resolved queue URL");

        let mut cache = self.queue_url_cache.write().await;
        cache.insert(queue_name.clone(), queue_url.clone());

        Ok(queue_url)
    }

    /// Send a signed, form-encoded request to the SQS endpoint
    async fn make_request<K: AsRef<str>>(&self, params: &[(K, String)]) -> Result<String, AwsError> {
        let body = encode_form(params);
        let timestamp = Utc::now();
        let signed = self
            .signer
            .sign_request("POST", &self.host, &self.path, &body, &timestamp);

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("host", &self.host)
            .header("x-amz-date", signed.amz_date)
            .header("authorization", signed.authorization)
            .header("content-type", FORM_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AwsError::NetworkError(format!("Request timeout: {}", e))
                } else if e.is_connect() {
                    AwsError::NetworkError(format!("Connection failed: {}", e))
                } else {
                    AwsError::NetworkError(format!("HTTP request failed: {}", e))
                }
            })?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| AwsError::NetworkError(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(parse_error_response(&response_body, status.as_u16()));
        }

        Ok(response_body)
    }
}

impl fmt::Debug for AwsSqsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSqsProvider")
            .field("config", &self.config)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl QueueProvider for AwsSqsProvider {
    async fn resolve_queue(&self, queue: &QueueName) -> Result<(), QueueError> {
        self.get_queue_url(queue)
            .await
            .map(|_| ())
            .map_err(|e| e.to_queue_error())
    }

    async fn send_message(
        &self,
        queue: &QueueName,
        message: &Message,
    ) -> Result<MessageId, QueueError> {
        let max_size = ProviderType::AwsSqs.max_message_size();
        if message.body.len() > max_size {
            return Err(AwsError::MessageTooLarge {
                size: message.body.len(),
                max_size,
            }
            .to_queue_error());
        }

        let body = std::str::from_utf8(&message.body)
            .map_err(|_| AwsError::InvalidBody.to_queue_error())?;

        let queue_url = self
            .get_queue_url(queue)
            .await
            .map_err(|e| e.to_queue_error())?;

        let mut params = vec![
            ("Action", "SendMessage".to_string()),
            ("Version", API_VERSION.to_string()),
            ("QueueUrl", queue_url),
            ("MessageBody", body.to_string()),
        ];

        if queue.is_fifo() {
            let group_id = message
                .attributes
                .get("MessageGroupId")
                .cloned()
                .unwrap_or_else(|| "default".to_string());
            params.push(("MessageGroupId", group_id));
            params.push(("MessageDeduplicationId", uuid::Uuid::new_v4().to_string()));
        }

        let response = self
            .make_request(&with_message_attributes(params, message))
            .await
            .map_err(|e| e.to_queue_error())?;

        parse_send_message_response(&response).map_err(|e| e.to_queue_error())
    }

    async fn receive_messages(
        &self,
        queue: &QueueName,
        max_messages: u32,
        wait_time: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let queue_url = self
            .get_queue_url(queue)
            .await
            .map_err(|e| e.to_queue_error())?;

        let wait_time_seconds = wait_time.num_seconds().clamp(0, MAX_WAIT_SECONDS);
        let max_messages = max_messages.clamp(1, ProviderType::AwsSqs.max_batch_size());

        let params = vec![
            ("Action", "ReceiveMessage".to_string()),
            ("Version", API_VERSION.to_string()),
            ("QueueUrl", queue_url),
            ("MaxNumberOfMessages", max_messages.to_string()),
            ("WaitTimeSeconds", wait_time_seconds.to_string()),
            ("AttributeName.1", "All".to_string()),
            ("MessageAttributeName.1", "All".to_string()),
        ];

        let response = self
            .make_request(&params)
            .await
            .map_err(|e| e.to_queue_error())?;

        parse_receive_message_response(&response, queue).map_err(|e| e.to_queue_error())
    }

    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let queue_url = self
            .get_queue_url(receipt.queue())
            .await
            .map_err(|e| e.to_queue_error())?;

        let params = vec![
            ("Action", "DeleteMessage".to_string()),
            ("Version", API_VERSION.to_string()),
            ("QueueUrl", queue_url),
            ("ReceiptHandle", receipt.handle().to_string()),
        ];

        // DeleteMessage returns an empty result on success
        self.make_request(&params).await.map_err(|e| match e {
            AwsError::InvalidReceipt(_) => QueueError::MessageNotFound {
                receipt: receipt.to_string(),
            },
            other => other.to_queue_error(),
        })?;

        Ok(())
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::AwsSqs
    }

    fn max_batch_size(&self) -> u32 {
        ProviderType::AwsSqs.max_batch_size()
    }
}

// ============================================================================
// Request Encoding
// ============================================================================

/// Encode parameters as an `application/x-www-form-urlencoded` body
fn encode_form<K: AsRef<str>>(params: &[(K, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                urlencoding::encode(k.as_ref()),
                urlencoding::encode(v)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Append message attributes as `MessageAttribute.N.*` parameters
fn with_message_attributes(params: Vec<(&str, String)>, message: &Message) -> Vec<(String, String)> {
    let mut keys: Vec<&String> = message.attributes.keys().collect();
    keys.sort();

    let mut encoded: Vec<(String, String)> = params
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

    for (idx, key) in keys.into_iter().enumerate() {
        let n = idx + 1;
        encoded.push((format!("MessageAttribute.{}.Name", n), key.clone()));
        encoded.push((
            format!("MessageAttribute.{}.Value.DataType", n),
            "String".to_string(),
        ));
        encoded.push((
            format!("MessageAttribute.{}.Value.StringValue", n),
            message.attributes[key].clone(),
        ));
    }

    encoded
}

// ============================================================================
// Response Parsing
// ============================================================================

fn xml_error(e: quick_xml::Error) -> AwsError {
    AwsError::SerializationError(format!("XML parsing error: {}", e))
}

/// Extract the text of the first element named `element`
fn parse_single_element(xml: &str, element: &[u8]) -> Result<Option<String>, AwsError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut inside = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(ref e) if e.local_name().as_ref() == element => inside = true,
            Event::Text(e) if inside => {
                return e.unescape().map(|s| Some(s.into_owned())).map_err(xml_error);
            }
            Event::End(ref e) if e.local_name().as_ref() == element => return Ok(None),
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

/// Parse GetQueueUrl XML response
fn parse_queue_url_response(xml: &str) -> Result<String, AwsError> {
    parse_single_element(xml, b"QueueUrl")?.ok_or_else(|| {
        AwsError::SerializationError("QueueUrl not found in response".to_string())
    })
}

/// Parse SendMessage XML response
fn parse_send_message_response(xml: &str) -> Result<MessageId, AwsError> {
    let id = parse_single_element(xml, b"MessageId")?.ok_or_else(|| {
        AwsError::SerializationError("MessageId not found in response".to_string())
    })?;

    MessageId::from_str(&id).map_err(|e| AwsError::SerializationError(e.to_string()))
}

/// Parse an `<ErrorResponse>` document into the matching error
fn parse_error_response(xml: &str, status_code: u16) -> AwsError {
    let code = parse_single_element(xml, b"Code")
        .ok()
        .flatten()
        .unwrap_or_else(|| "Unknown".to_string());
    let message = parse_single_element(xml, b"Message")
        .ok()
        .flatten()
        .unwrap_or_else(|| format!("HTTP status {}", status_code));

    match code.as_str() {
        "AWS.SimpleQueueService.NonExistentQueue" | "QueueDoesNotExist" => {
            AwsError::QueueNotFound(message)
        }
        "InvalidClientTokenId" | "UnrecognizedClientException" | "SignatureDoesNotMatch"
        | "InvalidAccessKeyId" => AwsError::Authentication(format!("{}: {}", code, message)),
        "InvalidReceiptHandle" | "ReceiptHandleIsInvalid" => AwsError::InvalidReceipt(message),
        _ if status_code == 401 || status_code == 403 => {
            AwsError::Authentication(format!("{}: {}", code, message))
        }
        _ => AwsError::ServiceError { code, message },
    }
}

/// Fields collected for one `<Message>` element
#[derive(Default)]
struct PartialMessage {
    message_id: Option<String>,
    receipt_handle: Option<String>,
    body: String,
    delivery_count: Option<u32>,
    attributes: HashMap<String, String>,
    pending_name: Option<String>,
    pending_value: Option<String>,
}

impl PartialMessage {
    fn finish(self, queue: &QueueName) -> Option<ReceivedMessage> {
        let receipt_handle = self.receipt_handle?;
        let message_id = self
            .message_id
            .as_deref()
            .and_then(|id| MessageId::from_str(id).ok())
            .unwrap_or_default();

        Some(ReceivedMessage {
            message_id,
            body: Bytes::from(self.body),
            attributes: self.attributes,
            receipt_handle: ReceiptHandle::new(
                receipt_handle,
                queue.clone(),
                ProviderType::AwsSqs,
            ),
            delivery_count: self.delivery_count.unwrap_or(1),
            delivered_at: Timestamp::now(),
        })
    }
}

/// Parse ReceiveMessage XML response
///
/// Whitespace is not trimmed so that bodies are returned exactly as sent.
fn parse_receive_message_response(
    xml: &str,
    queue: &QueueName,
) -> Result<Vec<ReceivedMessage>, AwsError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut messages = Vec::new();
    let mut current: Option<PartialMessage> = None;
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(ref e) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"Message" {
                    current = Some(PartialMessage::default());
                }
                path.push(name);
            }
            Event::Text(e) => {
                if let Some(message) = current.as_mut() {
                    let text = e.unescape().map_err(xml_error)?;
                    apply_text(message, &path, &text);
                }
            }
            Event::End(ref e) => {
                path.pop();
                match e.local_name().as_ref() {
                    b"Message" => {
                        if let Some(partial) = current.take() {
                            match partial.finish(queue) {
                                Some(message) => messages.push(message),
                                None => warn!(queue = %queue, "Skipping message without receipt handle"),
                            }
                        }
                    }
                    b"Attribute" | b"MessageAttribute" => {
                        if let Some(message) = current.as_mut() {
                            if let (Some(name), Some(value)) =
                                (message.pending_name.take(), message.pending_value.take())
                            {
                                if name == "ApproximateReceiveCount" {
                                    message.delivery_count = value.parse().ok();
                                } else {
                                    message.attributes.insert(name, value);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(messages)
}

/// Route element text to the field named by the innermost open elements
fn apply_text(message: &mut PartialMessage, path: &[Vec<u8>], text: &str) {
    let tail: Vec<&[u8]> = path.iter().rev().take(3).map(|n| n.as_slice()).collect();

    match tail.as_slice() {
        [b"MessageId", b"Message", ..] => message.message_id = Some(text.to_string()),
        [b"ReceiptHandle", b"Message", ..] => message.receipt_handle = Some(text.to_string()),
        [b"Body", b"Message", ..] => message.body.push_str(text),
        [b"Name", b"Attribute" | b"MessageAttribute", ..] => {
            message.pending_name = Some(text.to_string())
        }
        [b"Value", b"Attribute", ..] | [b"StringValue", b"Value", b"MessageAttribute"] => {
            message.pending_value = Some(text.to_string())
        }
        _ => {}
    }
}
