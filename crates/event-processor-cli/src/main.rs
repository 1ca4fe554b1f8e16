use event_processor_cli::{run_cli, CliError};
use tracing::error;

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        match &e {
            // No subscriber is installed when logging setup itself failed
            CliError::Logging { .. } => eprintln!("event-processor: {}", e),
            _ => error!(error = %e, "event-processor failed"),
        }

        std::process::exit(e.exit_code());
    }
}
