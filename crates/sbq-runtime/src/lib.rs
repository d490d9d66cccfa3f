//! # sbq runtime
//!
//! Queue runtime behind the `sbq` command line tool, talking to Azure Service
//! Bus over its REST API.
//!
//! This library provides:
//! - Sending a raw message body to a queue
//! - Peek-lock receive and completion of a single message
//! - Paged listing of the queues in a namespace
//! - Entra ID and shared access signature authorization
//! - An in-memory namespace for tests and local development
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Message structures and receipt handles
//! - [`provider`] - Provider types and configuration
//! - [`client`] - Data and management plane traits, queue paging
//! - [`auth`] - Authorization header sources
//! - [`providers`] - Azure Service Bus and in-memory backends

// Module declarations
pub mod auth;
pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;

// Re-export commonly used types at crate root for convenience
pub use auth::{token_provider_for, AccessTokenProvider};
pub use client::{QueueAdmin, QueuePager, QueueProvider};
pub use error::{ConfigurationError, QueueError, SerializationError};
pub use message::{Message, MessageId, QueueName, ReceivedMessage, ReceiptHandle, Timestamp};
pub use provider::{InMemoryConfig, ProviderType, ServiceBusAuth, ServiceBusConfig};
pub use providers::{AzureError, AzureServiceBusAdmin, AzureServiceBusProvider, InMemoryProvider};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
