//! # Settings
//!
//! Environment-driven settings for the database connection and the queues.
//!
//! Variables are read through the `config` crate's environment source. An
//! unset variable and one set to an empty string are both treated as missing.
//! Every `from_env` constructor has a `from_vars` twin that reads an explicit
//! map instead of the process environment.

use queue_runtime::{AwsSqsConfig, ProviderConfig, QueueConfig, QueueName};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Port used when `DB_PORT` is not set
pub const DEFAULT_DB_PORT: u16 = 5432;

/// SSL mode used when `DB_SSLMODE` is not set
pub const DEFAULT_DB_SSLMODE: &str = "disable";

/// Errors that can occur while loading settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Required configuration missing: {key}")]
    MissingRequired { key: String },

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("Failed to read configuration source: {0}")]
    Source(#[from] ::config::ConfigError),
}

/// Raw view of the variables this crate understands
///
/// The environment source lowercases keys, hence the field names.
#[derive(Debug, Default, Deserialize)]
struct RawEnvironment {
    db_user: Option<String>,
    db_password: Option<String>,
    db_host: Option<String>,
    db_port: Option<String>,
    db_name: Option<String>,
    db_sslmode: Option<String>,
    sqs_queue_name: Option<String>,
    sqs_dlq_name: Option<String>,
    sqs_endpoint: Option<String>,
    aws_region: Option<String>,
    aws_access_key_id: Option<String>,
    aws_secret_access_key: Option<String>,
}

impl RawEnvironment {
    /// Read from the process environment, or from `vars` when given
    fn load(vars: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::Environment::default().source(vars))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn required(value: &Option<String>, key: &str) -> Result<String, ConfigError> {
    present(value)
        .map(str::to_string)
        .ok_or_else(|| ConfigError::MissingRequired {
            key: key.to_string(),
        })
}

fn queue_name(value: &Option<String>, key: &str) -> Result<QueueName, ConfigError> {
    QueueName::new(required(value, key)?).map_err(|e| ConfigError::Invalid {
        key: key.to_string(),
        message: e.to_string(),
    })
}

// ============================================================================
// Database Settings
// ============================================================================

/// Connection settings for the event database
#[derive(Clone)]
pub struct DatabaseSettings {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub ssl_mode: PgSslMode,
}

impl DatabaseSettings {
    /// Load from `DB_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_raw(&RawEnvironment::load(None)?)
    }

    /// Load from an explicit variable map
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_raw(&RawEnvironment::load(Some(vars))?)
    }

    fn from_raw(raw: &RawEnvironment) -> Result<Self, ConfigError> {
        let user = required(&raw.db_user, "DB_USER")?;
        let password = required(&raw.db_password, "DB_PASSWORD")?;
        let host = required(&raw.db_host, "DB_HOST")?;

        let port = match present(&raw.db_port) {
            Some(port) => port.parse().map_err(|_| ConfigError::Invalid {
                key: "DB_PORT".to_string(),
                message: format!("'{}' is not a valid port number", port),
            })?,
            None => {
                warn!(key = "DB_PORT", default = DEFAULT_DB_PORT, "DB_PORT is not set, using default");
                DEFAULT_DB_PORT
            }
        };

        let name = required(&raw.db_name, "DB_NAME")?;

        let ssl_mode = match present(&raw.db_sslmode) {
            Some(mode) => mode,
            None => {
                warn!(key = "DB_SSLMODE", default = DEFAULT_DB_SSLMODE, "DB_SSLMODE is not set, using default");
                DEFAULT_DB_SSLMODE
            }
        };
        let ssl_mode = PgSslMode::from_str(ssl_mode).map_err(|_| ConfigError::Invalid {
            key: "DB_SSLMODE".to_string(),
            message: format!("unknown SSL mode '{}'", ssl_mode),
        })?;

        Ok(Self {
            user,
            password,
            host,
            port,
            name,
            ssl_mode,
        })
    }

    /// Connection options for the Postgres driver
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
            .ssl_mode(self.ssl_mode)
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

// ============================================================================
// Queue Settings
// ============================================================================

/// Settings shared by everything that talks to the primary queue
#[derive(Clone)]
pub struct QueueSettings {
    pub queue_name: QueueName,
    pub endpoint: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl QueueSettings {
    /// Load from `SQS_*` and `AWS_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_raw(&RawEnvironment::load(None)?)
    }

    /// Load from an explicit variable map
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_raw(&RawEnvironment::load(Some(vars))?)
    }

    fn from_raw(raw: &RawEnvironment) -> Result<Self, ConfigError> {
        Ok(Self {
            queue_name: queue_name(&raw.sqs_queue_name, "SQS_QUEUE_NAME")?,
            endpoint: required(&raw.sqs_endpoint, "SQS_ENDPOINT")?,
            region: required(&raw.aws_region, "AWS_REGION")?,
            access_key_id: required(&raw.aws_access_key_id, "AWS_ACCESS_KEY_ID")?,
            secret_access_key: required(&raw.aws_secret_access_key, "AWS_SECRET_ACCESS_KEY")?,
        })
    }

    /// Queue client configuration for the SQS provider
    pub fn to_queue_config(&self) -> QueueConfig {
        QueueConfig {
            provider: ProviderConfig::AwsSqs(AwsSqsConfig {
                region: self.region.clone(),
                endpoint: Some(self.endpoint.clone()),
                access_key_id: self.access_key_id.clone(),
                secret_access_key: self.secret_access_key.clone(),
            }),
            ..QueueConfig::default()
        }
    }
}

impl fmt::Debug for QueueSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueSettings")
            .field("queue_name", &self.queue_name)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Queue settings for the consumer, which also needs a dead-letter queue
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub queue: QueueSettings,
    pub dead_letter_queue: QueueName,
}

impl ConsumerSettings {
    /// Load queue settings plus `SQS_DLQ_NAME`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_raw(&RawEnvironment::load(None)?)
    }

    /// Load from an explicit variable map
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_raw(&RawEnvironment::load(Some(vars))?)
    }

    fn from_raw(raw: &RawEnvironment) -> Result<Self, ConfigError> {
        Ok(Self {
            queue: QueueSettings::from_raw(raw)?,
            dead_letter_queue: queue_name(&raw.sqs_dlq_name, "SQS_DLQ_NAME")?,
        })
    }
}
