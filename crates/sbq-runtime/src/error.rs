//! Error types for queue operations.

use std::time::Duration;
use thiserror::Error;

/// Error type for all queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Message not found or lock expired: {receipt}")]
    MessageNotFound { receipt: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Permission denied for operation: {operation}")]
    PermissionDenied { operation: String },

    #[error("Message too large: {size} bytes")]
    MessageTooLarge { size: usize },

    #[error("Provider error ({provider}): {code} - {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("Serialization failed: {0}")]
    SerializationError(#[from] SerializationError),

    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),
}

impl QueueError {
    /// Check if the failure would likely succeed on a later attempt.
    ///
    /// Nothing in this crate retries; the flag is reported alongside fatal
    /// errors so operators can tell a flaky network from a broken setup.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueNotFound { .. } => false,
            Self::MessageNotFound { .. } => false,
            Self::Timeout { .. } => true,
            Self::ConnectionFailed { .. } => true,
            Self::AuthenticationFailed { .. } => false,
            Self::PermissionDenied { .. } => false,
            Self::MessageTooLarge { .. } => false,
            Self::ProviderError { .. } => true,
            Self::SerializationError(_) => false,
            Self::ConfigurationError(_) => false,
        }
    }
}

/// Errors while decoding data returned by the service
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON decoding failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("XML decoding failed: {message}")]
    XmlError { message: String },

    #[error("Header '{header}' has invalid value")]
    InvalidHeader { header: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
