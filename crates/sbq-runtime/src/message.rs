//! Message types for queue operations including core domain identifiers.

use crate::provider::ProviderType;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Name of a queue in the namespace
///
/// Names are passed through to the service untouched; the service is the
/// authority on which names are legal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create queue name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for QueueName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of a message within a queue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Wrap an identifier assigned elsewhere (usually by the service)
    pub fn from_service(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Parse an HTTP-date (RFC 1123) as used in Service Bus broker properties
    pub fn from_http_date(value: &str) -> Option<Self> {
        DateTime::parse_from_rfc2822(value)
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message to be sent to a queue
///
/// The body is opaque: no framing or encoding is applied on the way out.
#[derive(Debug, Clone)]
pub struct Message {
    pub body: Bytes,
    pub message_id: MessageId,
}

impl Message {
    /// Create new message with body and a freshly generated ID
    pub fn new(body: Bytes) -> Self {
        Self {
            body,
            message_id: MessageId::new(),
        }
    }

    /// Use a caller-chosen message ID
    pub fn with_message_id(mut self, message_id: MessageId) -> Self {
        self.message_id = message_id;
        self
    }
}

/// A message received in peek-lock mode with its delivery metadata
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub body: Bytes,
    pub receipt_handle: ReceiptHandle,
    pub delivery_count: u32,
    pub sequence_number: Option<i64>,
}

/// Token for settling a locked message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptHandle {
    queue: QueueName,
    message_id: MessageId,
    lock_token: String,
    locked_until: Option<Timestamp>,
    provider_type: ProviderType,
}

impl ReceiptHandle {
    /// Create new receipt handle
    pub fn new(
        queue: QueueName,
        message_id: MessageId,
        lock_token: String,
        locked_until: Option<Timestamp>,
        provider_type: ProviderType,
    ) -> Self {
        Self {
            queue,
            message_id,
            lock_token,
            locked_until,
            provider_type,
        }
    }

    /// Queue the message was received from
    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    /// ID of the locked message
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// Lock token issued by the provider
    pub fn lock_token(&self) -> &str {
        &self.lock_token
    }

    /// Check if the lock has lapsed. Unknown expiry counts as still held.
    pub fn is_expired(&self) -> bool {
        match &self.locked_until {
            Some(until) => Timestamp::now() >= *until,
            None => false,
        }
    }

    /// Get provider type
    pub fn provider_type(&self) -> ProviderType {
        self.provider_type
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.queue, self.message_id, self.lock_token)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
