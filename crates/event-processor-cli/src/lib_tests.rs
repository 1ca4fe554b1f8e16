//! Tests for the event-processor-cli library module.

use super::*;
use serial_test::serial;

const SETTINGS_KEYS: [&str; 13] = [
    "DB_USER",
    "DB_PASSWORD",
    "DB_HOST",
    "DB_PORT",
    "DB_NAME",
    "DB_SSLMODE",
    "SQS_QUEUE_NAME",
    "SQS_DLQ_NAME",
    "SQS_ENDPOINT",
    "AWS_REGION",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "PRODUCE_INTERVAL_SECONDS",
];

fn clear_settings() {
    for key in SETTINGS_KEYS {
        std::env::remove_var(key);
    }
}

mod parsing {
    use super::*;

    #[test]
    #[serial]
    fn test_subcommands_parse() {
        clear_settings();

        let cli = Cli::try_parse_from(["event-processor", "migrate"]).unwrap();
        assert_eq!(cli.command, Commands::Migrate);

        let cli = Cli::try_parse_from(["event-processor", "process"]).unwrap();
        assert_eq!(cli.command, Commands::Process);

        let cli = Cli::try_parse_from(["event-processor", "produce"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Produce {
                interval_seconds: 15
            }
        );
    }

    #[test]
    #[serial]
    fn test_produce_interval_override() {
        clear_settings();

        let cli =
            Cli::try_parse_from(["event-processor", "produce", "--interval-seconds", "2"]).unwrap();
        assert_eq!(cli.command, Commands::Produce { interval_seconds: 2 });
    }

    #[test]
    #[serial]
    fn test_zero_produce_interval_is_rejected() {
        clear_settings();

        let result = Cli::try_parse_from(["event-processor", "produce", "--interval-seconds", "0"]);
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_zero_produce_interval_from_environment_is_rejected() {
        clear_settings();
        std::env::set_var("PRODUCE_INTERVAL_SECONDS", "0");

        let result = Cli::try_parse_from(["event-processor", "produce"]);

        std::env::remove_var("PRODUCE_INTERVAL_SECONDS");
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "event-processor",
            "process",
            "--json-logs",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert!(cli.json_logs);
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["event-processor"]).is_err());
        assert!(Cli::try_parse_from(["event-processor", "serve"]).is_err());
    }
}

mod errors {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let configuration = CliError::Configuration(ConfigError::MissingRequired {
            key: "DB_USER".to_string(),
        });
        let storage = CliError::Storage(StorageError::Connection {
            message: "refused".to_string(),
        });
        let queue = CliError::Queue(QueueError::QueueNotFound {
            queue_name: "events".to_string(),
        });
        let logging = CliError::Logging {
            message: "bad filter".to_string(),
        };

        assert_eq!(configuration.exit_code(), 1);
        assert_eq!(storage.exit_code(), 2);
        assert_eq!(queue.exit_code(), 3);
        assert_eq!(logging.exit_code(), 4);
    }

    #[test]
    #[serial]
    fn test_invalid_log_level_is_rejected() {
        std::env::remove_var("RUST_LOG");

        let result = initialize_logging("event_processor=verbose", false);
        assert!(matches!(result, Err(CliError::Logging { .. })));
    }
}

mod commands {
    use super::*;

    #[tokio::test]
    #[serial]
    async fn test_migrate_fails_fast_without_database_settings() {
        clear_settings();

        let error = execute_migrate_command().await.unwrap_err();

        assert!(matches!(error, CliError::Configuration(_)));
        assert_eq!(error.exit_code(), 1);
    }

    #[tokio::test]
    #[serial]
    async fn test_process_requires_dead_letter_queue_before_connecting() {
        clear_settings();
        for (key, value) in [
            ("DB_USER", "processor"),
            ("DB_PASSWORD", "secret"),
            ("DB_HOST", "127.0.0.1"),
            ("DB_NAME", "events"),
            ("SQS_QUEUE_NAME", "events"),
            ("SQS_ENDPOINT", "http://127.0.0.1:1"),
            ("AWS_REGION", "us-east-1"),
            ("AWS_ACCESS_KEY_ID", "test"),
            ("AWS_SECRET_ACCESS_KEY", "test"),
        ] {
            std::env::set_var(key, value);
        }

        let result = execute_process_command(CancellationToken::new()).await;
        clear_settings();

        match result {
            Err(CliError::Configuration(ConfigError::MissingRequired { key })) => {
                assert_eq!(key, "SQS_DLQ_NAME")
            }
            other => panic!("expected missing SQS_DLQ_NAME, got {:?}", other),
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_produce_fails_fast_without_queue_settings() {
        clear_settings();

        let error = execute_produce_command(Duration::from_secs(1), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(error, CliError::Configuration(_)));
    }
}
