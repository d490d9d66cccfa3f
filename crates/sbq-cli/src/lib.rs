//! # sbq CLI
//!
//! Command-line client for Azure Service Bus queues.
//!
//! This module provides:
//! - `send <queue>`: enqueue standard input as a single message
//! - `receive <queue>`: print and complete at most one message
//! - `list-queues`: print every queue in the namespace, one per line
//!
//! Anything else prints the usage text and fails with exit status 1.

use bytes::Bytes;
use clap::{Parser, Subcommand};
use sbq_runtime::{
    token_provider_for, AzureServiceBusAdmin, AzureServiceBusProvider, ConfigurationError,
    Message, MessageId, QueueAdmin, QueueError, QueueName, QueuePager, QueueProvider,
    ServiceBusConfig,
};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::io::IsTerminal;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// Printed on any command line that is not one of the three commands
pub const USAGE: &str = "Usage:\n\t sbq send|receive queueName | list-queues";

/// Namespace name, host or URL
pub const NAMESPACE_ENV_VAR: &str = "SERVICEBUS_NAMESPACE";

/// Shared access connection string, used instead of the default credential chain
pub const CONNECTION_STRING_ENV_VAR: &str = "SERVICEBUS_CONNECTION_STRING";

/// Optional configuration file (TOML, YAML or JSON)
pub const CONFIG_FILE_ENV_VAR: &str = "SBQ_CONFIG_FILE";

/// Prefix for `SBQ__<FIELD>` environment overrides
pub const ENV_PREFIX: &str = "SBQ";

const DEFAULT_LOG_FILTER: &str = "warn";
const DEFAULT_LIST_PAGE_SIZE: u32 = 100;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// CLI Structure
// ============================================================================

/// sbq - send, receive and list Service Bus queues
#[derive(Parser, Debug)]
#[command(name = "sbq")]
#[command(disable_help_flag = true, disable_version_flag = true)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Send standard input as one message
    Send {
        #[arg(allow_hyphen_values = true)]
        queue: QueueName,

        /// Trailing arguments, accepted and ignored
        #[arg(hide = true, num_args = 0.., allow_hyphen_values = true)]
        ignored: Vec<OsString>,
    },

    /// Receive, print and complete one message
    Receive {
        #[arg(allow_hyphen_values = true)]
        queue: QueueName,

        /// Trailing arguments, accepted and ignored
        #[arg(hide = true, num_args = 0.., allow_hyphen_values = true)]
        ignored: Vec<OsString>,
    },

    /// List all queues in the namespace
    #[command(name = "list-queues")]
    ListQueues {
        /// Trailing arguments, accepted and ignored
        #[arg(hide = true, num_args = 0.., allow_hyphen_values = true)]
        ignored: Vec<OsString>,
    },
}

/// Parse the full argument list, program name included
///
/// # Errors
///
/// Every rejection is reported as [`CliError::Usage`]; clap's own message is
/// only logged at debug level.
pub fn parse_args<I, T>(args: I) -> Result<Cli, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args).map_err(|e| {
        debug!(error = %e, "Rejected command line");
        CliError::Usage
    })
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Invalid command line")]
    Usage,

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit status; callers can only tell success from failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage | Self::Configuration(_) | Self::Queue(_) | Self::Io(_) => 1,
        }
    }

    /// Whether a later run could succeed unchanged; logged with fatal errors
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Queue(e) => e.is_transient(),
            Self::Usage | Self::Configuration(_) | Self::Io(_) => false,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ConfigurationError),
}

// ============================================================================
// Configuration Types
// ============================================================================

/// CLI configuration structure
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CliConfig {
    /// Namespace name, host or URL
    pub namespace: Option<String>,

    /// Connection string with a shared access key; wins over `namespace`
    pub connection_string: Option<String>,

    /// Receive wait in seconds; unset keeps the service default
    pub receive_timeout_secs: Option<u64>,

    pub list_page_size: u32,

    pub connect_timeout_secs: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            connection_string: None,
            receive_timeout_secs: None,
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for CliConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CliConfig")
            .field("namespace", &self.namespace)
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "<REDACTED>"),
            )
            .field("receive_timeout_secs", &self.receive_timeout_secs)
            .field("list_page_size", &self.list_page_size)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl CliConfig {
    /// Resolve the runtime configuration for the Service Bus clients
    ///
    /// # Errors
    ///
    /// Returns `MissingRequired` when neither a namespace nor a connection
    /// string is set, and `Invalid` when a value is out of range or malformed.
    pub fn service_bus_config(&self) -> Result<ServiceBusConfig, ConfigError> {
        let mut config = match (&self.connection_string, &self.namespace) {
            (Some(connection_string), _) => {
                ServiceBusConfig::from_connection_string(connection_string)?
            }
            (None, Some(namespace)) => ServiceBusConfig::for_namespace(namespace)?,
            (None, None) => {
                return Err(ConfigError::MissingRequired {
                    key: NAMESPACE_ENV_VAR.to_string(),
                })
            }
        };

        config.receive_timeout = self.receive_timeout_secs.map(Duration::from_secs);
        config.list_page_size = self.list_page_size;
        config.connect_timeout = Duration::from_secs(self.connect_timeout_secs);
        config.validate()?;

        Ok(config)
    }
}

/// Load configuration from defaults, file and environment
///
/// Sources, later ones winning:
/// 1. Built-in defaults
/// 2. The file named by `SBQ_CONFIG_FILE`, if set
/// 3. `SBQ__<FIELD>` environment variables, e.g. `SBQ__RECEIVE_TIMEOUT_SECS=5`
/// 4. `SERVICEBUS_NAMESPACE` and `SERVICEBUS_CONNECTION_STRING`
pub fn load_configuration() -> Result<CliConfig, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = non_empty_env(CONFIG_FILE_ENV_VAR) {
        debug!(path = %path, "Loading configuration file");
        builder = builder.add_source(config::File::with_name(&path).required(true));
    }

    let config = builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .set_override_option("namespace", non_empty_env(NAMESPACE_ENV_VAR))?
        .set_override_option(
            "connection_string",
            non_empty_env(CONNECTION_STRING_ENV_VAR),
        )?
        .build()?;

    let cli_config: CliConfig = config.try_deserialize()?;
    debug!(config = ?cli_config, "Loaded configuration");
    Ok(cli_config)
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Install the stderr subscriber; `RUST_LOG` overrides the default filter
pub fn initialize_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal()),
        )
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
///
/// Arguments are checked before any configuration is read, so a bad command
/// line is reported as usage even when the environment is incomplete.
pub async fn run_cli<I, T>(args: I) -> Result<(), CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = parse_args(args)?;
    let config = load_configuration()?;
    let service_bus = config.service_bus_config()?;
    let tokens = token_provider_for(&service_bus)?;

    info!(endpoint = %service_bus.endpoint, command = ?cli.command, "Running command");

    match cli.command {
        Commands::Send { queue, .. } => {
            let provider =
                AzureServiceBusProvider::new(service_bus, tokens).map_err(QueueError::from)?;
            send_command(&provider, &queue, tokio::io::stdin()).await?;
        }
        Commands::Receive { queue, .. } => {
            let timeout = service_bus.receive_timeout;
            let provider =
                AzureServiceBusProvider::new(service_bus, tokens).map_err(QueueError::from)?;
            receive_command(&provider, &queue, timeout, &mut tokio::io::stdout()).await?;
        }
        Commands::ListQueues { .. } => {
            let admin =
                AzureServiceBusAdmin::new(service_bus, tokens).map_err(QueueError::from)?;
            list_queues_command(&admin, &mut tokio::io::stdout()).await?;
        }
    }

    Ok(())
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Read `input` to the end and send it as a single message
pub async fn send_command<P, R>(
    provider: &P,
    queue: &QueueName,
    mut input: R,
) -> Result<MessageId, CliError>
where
    P: QueueProvider + ?Sized,
    R: AsyncRead + Unpin,
{
    let mut body = Vec::new();
    input.read_to_end(&mut body).await?;

    let size = body.len();
    let message = Message::new(Bytes::from(body));
    let message_id = provider.send_message(queue, &message).await?;

    info!(queue = %queue, message_id = %message_id, size, "Sent message");
    Ok(message_id)
}

/// Receive at most one message, write its body to `output` and complete it
///
/// Returns the id of the printed message, or `None` when the queue stayed
/// empty for the whole wait. The body is flushed before completion, so a
/// failed completion leaves a printed message locked on the service.
pub async fn receive_command<P, W>(
    provider: &P,
    queue: &QueueName,
    timeout: Option<Duration>,
    output: &mut W,
) -> Result<Option<MessageId>, CliError>
where
    P: QueueProvider + ?Sized,
    W: AsyncWrite + Unpin,
{
    let Some(received) = provider.receive_message(queue, timeout).await? else {
        info!(queue = %queue, "No message available");
        return Ok(None);
    };

    output.write_all(&received.body).await?;
    output.flush().await?;

    if let Err(e) = provider.complete_message(&received.receipt_handle).await {
        warn!(
            receipt = %received.receipt_handle,
            "Message was printed but could not be completed"
        );
        return Err(e.into());
    }

    info!(
        queue = %queue,
        message_id = %received.message_id,
        delivery_count = received.delivery_count,
        "Received and completed message"
    );
    Ok(Some(received.message_id))
}

/// Write every queue name to `output`, one per line, flushing per page
///
/// Returns the number of queues written. An error on a later page leaves the
/// names from earlier pages in the output.
pub async fn list_queues_command<A, W>(admin: &A, output: &mut W) -> Result<usize, CliError>
where
    A: QueueAdmin + ?Sized,
    W: AsyncWrite + Unpin,
{
    let mut pager = QueuePager::new(admin);
    let mut count = 0;

    while let Some(page) = pager.next_page().await? {
        for queue in &page {
            output.write_all(queue.as_str().as_bytes()).await?;
            output.write_all(b"\n").await?;
        }
        output.flush().await?;

        count += page.len();
        debug!(page_len = page.len(), total = count, "Listed queue page");
    }

    Ok(count)
}
