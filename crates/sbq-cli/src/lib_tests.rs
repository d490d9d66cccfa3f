//! Tests for the sbq-cli library module.

use super::*;
use sbq_runtime::{InMemoryConfig, InMemoryProvider, ServiceBusAuth};
use serial_test::serial;
use std::io::Write;

// ============================================================================
// Argument Parsing Tests
// ============================================================================

mod parse_tests {
    use super::*;

    #[test]
    fn test_send_parses_queue_name() {
        let cli = parse_args(["sbq", "send", "jobs"]).unwrap();

        assert_eq!(
            cli.command,
            Commands::Send {
                queue: QueueName::new("jobs"),
                ignored: vec![],
            }
        );
    }

    #[test]
    fn test_receive_parses_queue_name() {
        let cli = parse_args(["sbq", "receive", "orders"]).unwrap();

        assert_eq!(
            cli.command,
            Commands::Receive {
                queue: QueueName::new("orders"),
                ignored: vec![],
            }
        );
    }

    #[test]
    fn test_list_queues_takes_no_arguments() {
        let cli = parse_args(["sbq", "list-queues"]).unwrap();

        assert_eq!(cli.command, Commands::ListQueues { ignored: vec![] });
    }

    #[test]
    fn test_no_arguments_is_usage_error() {
        let result = parse_args(["sbq"]);

        assert!(matches!(result, Err(CliError::Usage)));
    }

    #[test]
    fn test_unknown_command_is_usage_error() {
        assert!(matches!(
            parse_args(["sbq", "purge", "jobs"]),
            Err(CliError::Usage)
        ));
    }

    #[test]
    fn test_missing_queue_is_usage_error() {
        assert!(matches!(parse_args(["sbq", "send"]), Err(CliError::Usage)));
        assert!(matches!(parse_args(["sbq", "receive"]), Err(CliError::Usage)));
    }

    #[test]
    fn test_extra_arguments_are_ignored() {
        let send = parse_args(["sbq", "send", "jobs", "extra"]).unwrap();
        let receive = parse_args(["sbq", "receive", "jobs", "more", "args"]).unwrap();
        let list = parse_args(["sbq", "list-queues", "x"]).unwrap();

        assert!(matches!(
            send.command,
            Commands::Send { ref queue, .. } if queue.as_str() == "jobs"
        ));
        assert!(matches!(
            receive.command,
            Commands::Receive { ref queue, .. } if queue.as_str() == "jobs"
        ));
        assert!(matches!(list.command, Commands::ListQueues { .. }));
    }

    #[test]
    fn test_help_flags_are_not_recognized() {
        assert!(matches!(parse_args(["sbq", "--help"]), Err(CliError::Usage)));
        assert!(matches!(parse_args(["sbq", "help"]), Err(CliError::Usage)));
        assert!(matches!(parse_args(["sbq", "--version"]), Err(CliError::Usage)));
    }

    #[test]
    fn test_every_error_exits_with_one() {
        let errors = [
            CliError::Usage,
            CliError::Configuration(ConfigError::MissingRequired {
                key: NAMESPACE_ENV_VAR.to_string(),
            }),
            CliError::Queue(QueueError::AuthenticationFailed {
                message: "denied".to_string(),
            }),
            CliError::Io(std::io::Error::other("broken pipe")),
        ];

        for error in errors {
            assert_eq!(error.exit_code(), 1, "{}", error);
        }
    }

    #[test]
    fn test_only_transient_queue_errors_are_transient() {
        let transient = CliError::Queue(QueueError::ConnectionFailed {
            message: "connection refused".to_string(),
        });
        let permanent = CliError::Queue(QueueError::AuthenticationFailed {
            message: "denied".to_string(),
        });

        assert!(transient.is_transient());
        assert!(!permanent.is_transient());
        assert!(!CliError::Usage.is_transient());
        assert!(!CliError::Io(std::io::Error::other("closed")).is_transient());
    }

    #[test]
    fn test_usage_is_two_lines() {
        assert_eq!(USAGE.lines().count(), 2);
        assert_eq!(USAGE.lines().next(), Some("Usage:"));
    }
}

// ============================================================================
// Configuration Tests
// ============================================================================

mod config_tests {
    use super::*;

    const ALL_VARS: [&str; 7] = [
        NAMESPACE_ENV_VAR,
        CONNECTION_STRING_ENV_VAR,
        CONFIG_FILE_ENV_VAR,
        "SBQ__NAMESPACE",
        "SBQ__RECEIVE_TIMEOUT_SECS",
        "SBQ__LIST_PAGE_SIZE",
        "SBQ__CONNECT_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for var in ALL_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = CliConfig::default();

        assert_eq!(config.namespace, None);
        assert_eq!(config.receive_timeout_secs, None);
        assert_eq!(config.list_page_size, 100);
        assert_eq!(config.connect_timeout_secs, 30);
    }

    #[test]
    #[serial]
    fn test_load_reads_namespace_from_environment() {
        // Arrange
        clear_env();
        std::env::set_var(NAMESPACE_ENV_VAR, "contoso");

        // Act
        let config = load_configuration().unwrap();

        // Assert
        assert_eq!(config.namespace.as_deref(), Some("contoso"));
        assert_eq!(config.list_page_size, 100);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_load_reads_prefixed_overrides() {
        clear_env();
        std::env::set_var(NAMESPACE_ENV_VAR, "contoso");
        std::env::set_var("SBQ__RECEIVE_TIMEOUT_SECS", "5");
        std::env::set_var("SBQ__LIST_PAGE_SIZE", "20");

        let config = load_configuration().unwrap();

        assert_eq!(config.receive_timeout_secs, Some(5));
        assert_eq!(config.list_page_size, 20);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_empty_namespace_variable_is_ignored() {
        clear_env();
        std::env::set_var(NAMESPACE_ENV_VAR, "");

        let config = load_configuration().unwrap();

        assert_eq!(config.namespace, None);
        assert!(matches!(
            config.service_bus_config(),
            Err(ConfigError::MissingRequired { .. })
        ));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_file_values_are_overridden_by_environment() {
        // Arrange
        clear_env();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "namespace = \"from-file\"").unwrap();
        writeln!(file, "list_page_size = 25").unwrap();
        writeln!(file, "connect_timeout_secs = 5").unwrap();
        file.flush().unwrap();

        std::env::set_var(CONFIG_FILE_ENV_VAR, file.path());
        std::env::set_var(NAMESPACE_ENV_VAR, "from-env");
        std::env::set_var("SBQ__LIST_PAGE_SIZE", "7");

        // Act
        let config = load_configuration().unwrap();

        // Assert
        assert_eq!(config.namespace.as_deref(), Some("from-env"));
        assert_eq!(config.list_page_size, 7);
        assert_eq!(config.connect_timeout_secs, 5);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_config_file_is_an_error() {
        clear_env();
        std::env::set_var(CONFIG_FILE_ENV_VAR, "/nonexistent/sbq-config.toml");

        let result = load_configuration();

        assert!(matches!(result, Err(ConfigError::Load(_))));

        clear_env();
    }

    #[test]
    fn test_service_bus_config_from_namespace() {
        let config = CliConfig {
            namespace: Some("contoso".to_string()),
            receive_timeout_secs: Some(10),
            ..CliConfig::default()
        };

        let service_bus = config.service_bus_config().unwrap();

        assert_eq!(
            service_bus.endpoint.as_str(),
            "https://contoso.servicebus.windows.net/"
        );
        assert_eq!(service_bus.auth, ServiceBusAuth::DefaultCredential);
        assert_eq!(service_bus.receive_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_connection_string_wins_over_namespace() {
        let config = CliConfig {
            namespace: Some("ignored".to_string()),
            connection_string: Some(
                "Endpoint=sb://contoso.servicebus.windows.net/;SharedAccessKeyName=send;SharedAccessKey=abc"
                    .to_string(),
            ),
            ..CliConfig::default()
        };

        let service_bus = config.service_bus_config().unwrap();

        assert_eq!(
            service_bus.endpoint.as_str(),
            "https://contoso.servicebus.windows.net/"
        );
        assert!(matches!(
            service_bus.auth,
            ServiceBusAuth::SharedAccessKey { ref key_name, .. } if key_name == "send"
        ));
    }

    #[test]
    fn test_out_of_range_page_size_is_invalid() {
        let config = CliConfig {
            namespace: Some("contoso".to_string()),
            list_page_size: 0,
            ..CliConfig::default()
        };

        assert!(matches!(
            config.service_bus_config(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_debug_redacts_connection_string() {
        let config = CliConfig {
            connection_string: Some("SharedAccessKey=very-secret".to_string()),
            ..CliConfig::default()
        };

        let debug = format!("{:?}", config);

        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("<REDACTED>"));
    }
}

// ============================================================================
// Command Tests
// ============================================================================

mod command_tests {
    use super::*;

    fn queue(name: &str) -> QueueName {
        QueueName::new(name)
    }

    #[tokio::test]
    async fn test_send_then_receive_returns_original_bytes() {
        // Arrange
        let provider = InMemoryProvider::default();
        let jobs = queue("jobs");
        let payload: &[u8] = b"\x00binary\npayload\xff";

        // Act
        let sent = send_command(&provider, &jobs, payload).await.unwrap();
        let mut output = Vec::new();
        let received = receive_command(&provider, &jobs, None, &mut output)
            .await
            .unwrap();

        // Assert
        assert_eq!(received, Some(sent));
        assert_eq!(output, payload);
        assert_eq!(provider.active_message_count(&jobs).unwrap(), 0);
        assert_eq!(provider.locked_message_count(&jobs).unwrap(), 0);
    }

    /// Delegates to an in-memory namespace but refuses every completion
    struct LostLockProvider {
        inner: InMemoryProvider,
    }

    #[async_trait::async_trait]
    impl QueueProvider for LostLockProvider {
        async fn send_message(
            &self,
            queue: &QueueName,
            message: &Message,
        ) -> Result<MessageId, QueueError> {
            self.inner.send_message(queue, message).await
        }

        async fn receive_message(
            &self,
            queue: &QueueName,
            timeout: Option<Duration>,
        ) -> Result<Option<sbq_runtime::ReceivedMessage>, QueueError> {
            self.inner.receive_message(queue, timeout).await
        }

        async fn complete_message(
            &self,
            receipt: &sbq_runtime::ReceiptHandle,
        ) -> Result<(), QueueError> {
            Err(QueueError::MessageNotFound {
                receipt: receipt.to_string(),
            })
        }

        fn provider_type(&self) -> sbq_runtime::ProviderType {
            self.inner.provider_type()
        }
    }

    #[tokio::test]
    async fn test_failed_completion_after_print_is_fatal() {
        // Arrange
        let provider = LostLockProvider {
            inner: InMemoryProvider::default(),
        };
        let jobs = queue("jobs");
        send_command(&provider, &jobs, &b"body"[..]).await.unwrap();

        // Act
        let mut output = Vec::new();
        let result = receive_command(&provider, &jobs, None, &mut output).await;

        // Assert
        assert_eq!(output, b"body");
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            CliError::Queue(QueueError::MessageNotFound { .. })
        ));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(provider.inner.locked_message_count(&jobs).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_receive_on_empty_queue_prints_nothing() {
        let provider = InMemoryProvider::default();
        let jobs = queue("jobs");
        provider.create_queue(&jobs).unwrap();

        let mut output = Vec::new();
        let received = receive_command(
            &provider,
            &jobs,
            Some(Duration::from_millis(20)),
            &mut output,
        )
        .await
        .unwrap();

        assert_eq!(received, None);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_send_with_immediate_eof_sends_empty_message() {
        let provider = InMemoryProvider::default();
        let jobs = queue("jobs");

        send_command(&provider, &jobs, tokio::io::empty()).await.unwrap();

        assert_eq!(provider.active_message_count(&jobs).unwrap(), 1);
        let mut output = Vec::new();
        let received = receive_command(&provider, &jobs, None, &mut output)
            .await
            .unwrap();
        assert!(received.is_some());
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_receive_does_not_add_newline() {
        let provider = InMemoryProvider::default();
        let jobs = queue("jobs");
        send_command(&provider, &jobs, &b"no newline"[..]).await.unwrap();

        let mut output = Vec::new();
        receive_command(&provider, &jobs, None, &mut output)
            .await
            .unwrap();

        assert_eq!(output, b"no newline");
    }

    #[tokio::test]
    async fn test_receive_from_unknown_queue_fails() {
        let provider = InMemoryProvider::default();

        let mut output = Vec::new();
        let result = receive_command(&provider, &queue("missing"), None, &mut output).await;

        assert!(matches!(
            result,
            Err(CliError::Queue(QueueError::QueueNotFound { .. }))
        ));
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_list_queues_prints_each_queue_once_across_pages() {
        // Arrange
        let provider = InMemoryProvider::new(InMemoryConfig {
            page_size: 2,
            ..InMemoryConfig::default()
        });
        for name in ["c", "a", "b"] {
            provider.create_queue(&queue(name)).unwrap();
        }

        // Act
        let mut output = Vec::new();
        let count = list_queues_command(&provider, &mut output).await.unwrap();

        // Assert
        assert_eq!(count, 3);
        assert_eq!(String::from_utf8(output).unwrap(), "a\nb\nc\n");
    }

    #[tokio::test]
    async fn test_list_queues_on_empty_namespace_prints_nothing() {
        let provider = InMemoryProvider::default();

        let mut output = Vec::new();
        let count = list_queues_command(&provider, &mut output).await.unwrap();

        assert_eq!(count, 0);
        assert!(output.is_empty());
    }
}
