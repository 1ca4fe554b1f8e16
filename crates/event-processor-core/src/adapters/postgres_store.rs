//! Postgres-backed event storage.

use crate::config::DatabaseSettings;
use crate::event::Event;
use crate::storage::{validate_event, EventStore, StorageError};
use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, error, info};

#[cfg(test)]
#[path = "postgres_store_tests.rs"]
mod tests;

/// Schema migrations embedded from the crate's `migrations/` directory
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const INSERT_EVENT: &str = r#"
    INSERT INTO events (event_type, client_id, payload, "timestamp")
    VALUES ($1, $2, $3, $4)
    RETURNING id
"#;

/// Connection pool sizing and timeouts
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    /// Time allowed to get a connection from the pool
    pub acquire_timeout: Duration,
    /// Time allowed for the connectivity check after connecting
    pub verify_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
            verify_timeout: Duration::from_secs(5),
        }
    }
}

/// Event store writing to the `events` table
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Connect with default pool settings and verify the database responds
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, StorageError> {
        Self::connect_with(settings, PoolSettings::default()).await
    }

    /// Connect with explicit pool settings and verify the database responds
    pub async fn connect_with(
        settings: &DatabaseSettings,
        pool_settings: PoolSettings,
    ) -> Result<Self, StorageError> {
        debug!(
            host = %settings.host,
            port = settings.port,
            database = %settings.name,
            max_connections = pool_settings.max_connections,
            "Connecting to database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(pool_settings.max_connections)
            .acquire_timeout(pool_settings.acquire_timeout)
            .connect_with(settings.connect_options())
            .await
            .map_err(|e| {
                error!(host = %settings.host, error = %e, "Failed to connect to database");
                StorageError::Connection {
                    message: e.to_string(),
                }
            })?;

        match tokio::time::timeout(
            pool_settings.verify_timeout,
            sqlx::query("SELECT 1").execute(&pool),
        )
        .await
        {
            Ok(Ok(_)) => {
                info!(host = %settings.host, database = %settings.name, "Database connection verified");
                Ok(Self { pool })
            }
            Ok(Err(e)) => {
                error!(host = %settings.host, error = %e, "Database connection verification failed");
                Err(StorageError::Connection {
                    message: e.to_string(),
                })
            }
            Err(_) => {
                error!(
                    host = %settings.host,
                    timeout_secs = pool_settings.verify_timeout.as_secs(),
                    "Database connection verification timed out"
                );
                Err(StorageError::Connection {
                    message: "connection verification timed out".to_string(),
                })
            }
        }
    }

    /// Wrap an existing pool without verifying it
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply all pending schema migrations
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        debug!("Running database migrations");
        MIGRATOR.run(&self.pool).await?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn save(&self, event: &Event) -> Result<i64, StorageError> {
        validate_event(event)?;

        let id: i64 = sqlx::query_scalar(INSERT_EVENT)
            .bind(&event.event_type)
            .bind(&event.client_id)
            .bind(&event.payload)
            .bind(event.timestamp)
            .fetch_one(&self.pool)
            .await?;

        debug!(event_id = id, event_type = %event.event_type, "Event inserted");
        Ok(id)
    }
}
