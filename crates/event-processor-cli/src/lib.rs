//! # Event Processor CLI
//!
//! Process bootstrap for the event processor:
//! - `migrate` applies the database schema
//! - `process` runs the consumption loop until SIGINT or SIGTERM
//! - `produce` publishes generated test events until SIGINT or SIGTERM
//!
//! All connection settings come from environment variables; see
//! [`event_processor_core::config`].

use clap::{Parser, Subcommand};
use event_processor_core::{
    ConfigError, ConsumerSettings, DatabaseSettings, EventProcessor, EventProducer,
    PostgresEventStore, ProcessorConfig, QueueSettings, StorageError,
};
use queue_runtime::{QueueClient, QueueClientFactory, QueueConfig, QueueError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// Event processor - persist queued business events
#[derive(Debug, Parser)]
#[command(name = "event-processor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Consumes events from SQS and stores them in Postgres")]
pub struct Cli {
    /// Log filter, e.g. `info` or `event_processor_core=debug`
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Consume the primary queue until interrupted
    Process,

    /// Publish generated events until interrupted
    Produce {
        /// Seconds between two events
        #[arg(
            long,
            env = "PRODUCE_INTERVAL_SECONDS",
            default_value_t = 15,
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        interval_seconds: u64,
    },
}

// ============================================================================
// Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Failed to initialize logging: {message}")]
    Logging { message: String },
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Storage(_) => 2,
            Self::Queue(_) => 3,
            Self::Logging { .. } => 4,
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Parse arguments, set up logging and run the selected command
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli.log_level, cli.json_logs)?;

    match cli.command {
        Commands::Migrate => execute_migrate_command().await,
        Commands::Process => execute_process_command(cancel_on_shutdown_signal()).await,
        Commands::Produce { interval_seconds } => {
            execute_produce_command(
                Duration::from_secs(interval_seconds),
                cancel_on_shutdown_signal(),
            )
            .await
        }
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn initialize_logging(level: &str, json: bool) -> Result<(), CliError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|e| CliError::Logging {
            message: format!("invalid log level '{}': {}", level, e),
        })?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| CliError::Logging {
        message: e.to_string(),
    })
}

/// Token cancelled on the first SIGINT or SIGTERM
pub fn cancel_on_shutdown_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });
    token
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Connect to the database and apply migrations
pub async fn execute_migrate_command() -> Result<(), CliError> {
    let database = DatabaseSettings::from_env()?;
    info!(host = %database.host, database = %database.name, "Running migrations");

    let store = PostgresEventStore::connect(&database).await?;
    let result = store.run_migrations().await;
    store.close().await;

    result?;
    info!("Migrations applied");
    Ok(())
}

/// Run the consumption loop until `shutdown` is cancelled
///
/// All settings are loaded before any connection is attempted. Failing to
/// reach the database or to resolve either queue aborts startup.
pub async fn execute_process_command(shutdown: CancellationToken) -> Result<(), CliError> {
    let database = DatabaseSettings::from_env()?;
    let consumer = ConsumerSettings::from_env()?;

    info!(
        queue = %consumer.queue.queue_name,
        dead_letter_queue = %consumer.dead_letter_queue,
        endpoint = %consumer.queue.endpoint,
        "Starting event processor"
    );

    let store = PostgresEventStore::connect(&database).await?;
    let client = connect_queue(consumer.queue.to_queue_config()).await?;
    client.resolve_queue(&consumer.queue.queue_name).await?;
    client.resolve_queue(&consumer.dead_letter_queue).await?;

    let processor = EventProcessor::new(
        client,
        Arc::new(store.clone()),
        consumer.queue.queue_name.clone(),
        consumer.dead_letter_queue.clone(),
        ProcessorConfig::default(),
    );
    processor.run(shutdown).await;

    store.close().await;
    info!("Event processor stopped");
    Ok(())
}

/// Publish generated events every `interval` until `shutdown` is cancelled
pub async fn execute_produce_command(
    interval: Duration,
    shutdown: CancellationToken,
) -> Result<(), CliError> {
    let settings = QueueSettings::from_env()?;

    let client = connect_queue(settings.to_queue_config()).await?;
    client.resolve_queue(&settings.queue_name).await?;

    let producer = EventProducer::new(client, settings.queue_name.clone(), interval);
    producer.run(shutdown).await;
    Ok(())
}

async fn connect_queue(config: QueueConfig) -> Result<Arc<dyn QueueClient>, CliError> {
    let client = QueueClientFactory::create_client(config).await?;
    Ok(Arc::from(client))
}
