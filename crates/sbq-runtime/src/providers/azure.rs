//! Azure Service Bus provider implementation using the HTTP REST API.
//!
//! Two clients share one HTTP stack and one token source:
//! - [`AzureServiceBusProvider`] for the data plane (send, peek-lock receive, complete)
//! - [`AzureServiceBusAdmin`] for the management plane (queue listing)
//!
//! ## REST mapping
//!
//! | Operation | Request |
//! |-----------|---------|
//! | send      | `POST {ns}/{queue}/messages` |
//! | receive   | `POST {ns}/{queue}/messages/head[?timeout=N]` (201 message, 204 empty) |
//! | complete  | `DELETE {ns}/{queue}/messages/{message_id}/{lock_token}` |
//! | list      | `GET {ns}/$Resources/Queues?api-version=2021-05&$skip=S&$top=T` (Atom feed) |
//!
//! ## Example
//!
//! ```no_run
//! use sbq_runtime::auth::token_provider_for;
//! use sbq_runtime::providers::AzureServiceBusProvider;
//! use sbq_runtime::{QueueName, QueueProvider, ServiceBusConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServiceBusConfig::for_namespace("contoso")?;
//! let tokens = token_provider_for(&config)?;
//! let provider = AzureServiceBusProvider::new(config, tokens)?;
//!
//! if let Some(message) = provider.receive_message(&QueueName::from("jobs"), None).await? {
//!     provider.complete_message(&message.receipt_handle).await?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::auth::AccessTokenProvider;
use crate::client::{QueueAdmin, QueueProvider};
use crate::error::{ConfigurationError, QueueError, SerializationError};
use crate::message::{
    Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage, Timestamp,
};
use crate::provider::{ProviderType, ServiceBusConfig};
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client as HttpClient, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

#[cfg(test)]
#[path = "azure_tests.rs"]
mod tests;

/// Management API version used for entity listing
pub const MANAGEMENT_API_VERSION: &str = "2021-05";

const PROVIDER_NAME: &str = "AzureServiceBus";
const BROKER_PROPERTIES_HEADER: &str = "BrokerProperties";

// ============================================================================
// Error Types
// ============================================================================

/// Azure Service Bus specific errors
#[derive(Debug, thiserror::Error)]
pub enum AzureError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Message lock lost: {0}")]
    MessageLockLost(String),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Service Bus error ({status}): {message}")]
    ServiceBusError { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),

    #[error("Invalid BrokerProperties header: {0}")]
    InvalidBrokerProperties(String),

    #[error("Invalid entity feed: {0}")]
    InvalidFeed(String),
}

impl AzureError {
    /// Map Azure error to QueueError
    pub fn to_queue_error(self) -> QueueError {
        match self {
            Self::AuthenticationError(msg) => QueueError::AuthenticationFailed { message: msg },
            Self::Forbidden(operation) => QueueError::PermissionDenied { operation },
            Self::NetworkError(msg) => QueueError::ConnectionFailed { message: msg },
            Self::Timeout(duration) => QueueError::Timeout { duration },
            Self::EntityNotFound(queue_name) => QueueError::QueueNotFound { queue_name },
            Self::MessageLockLost(receipt) => QueueError::MessageNotFound { receipt },
            Self::MessageTooLarge(size) => QueueError::MessageTooLarge { size },
            Self::ServiceBusError { status, message } => QueueError::ProviderError {
                provider: PROVIDER_NAME.to_string(),
                code: status.to_string(),
                message,
            },
            Self::ConfigurationError(msg) => {
                QueueError::ConfigurationError(ConfigurationError::Invalid { message: msg })
            }
            Self::InvalidBrokerProperties(_) => {
                QueueError::SerializationError(SerializationError::InvalidHeader {
                    header: BROKER_PROPERTIES_HEADER.to_string(),
                })
            }
            Self::InvalidFeed(message) => {
                QueueError::SerializationError(SerializationError::XmlError { message })
            }
        }
    }
}

impl From<AzureError> for QueueError {
    fn from(err: AzureError) -> Self {
        err.to_queue_error()
    }
}

// ============================================================================
// Shared REST plumbing
// ============================================================================

/// HTTP stack shared by the data-plane and management-plane clients
#[derive(Clone)]
struct ServiceBusRest {
    http_client: HttpClient,
    endpoint: Url,
    tokens: Arc<dyn AccessTokenProvider>,
    connect_timeout: Duration,
}

impl ServiceBusRest {
    fn new(
        config: &ServiceBusConfig,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self, AzureError> {
        if config.endpoint.cannot_be_a_base() {
            return Err(AzureError::ConfigurationError(format!(
                "endpoint '{}' cannot carry entity paths",
                config.endpoint
            )));
        }

        // No overall request timeout: a receive long-polls for as long as the
        // service-side wait allows.
        let http_client = HttpClient::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| AzureError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            tokens,
            connect_timeout: config.connect_timeout,
        })
    }

    /// Build `{endpoint}/{segments...}`; a `/` inside a queue name becomes a
    /// path separator, matching how the service addresses nested entities.
    fn entity_url(&self, queue: Option<&QueueName>, tail: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            if let Some(queue) = queue {
                path.extend(queue.as_str().split('/'));
            }
            path.extend(tail);
        }
        url
    }

    async fn authorization(&self) -> Result<String, QueueError> {
        self.tokens.authorization().await
    }

    fn transport_error(&self, error: reqwest::Error) -> AzureError {
        if error.is_timeout() {
            AzureError::Timeout(self.connect_timeout)
        } else {
            AzureError::NetworkError(error.to_string())
        }
    }
}

/// Turn a non-success response into an [`AzureError`]
async fn error_for_response(response: Response, subject: &str) -> AzureError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string()
    } else {
        body.trim().to_string()
    };

    match status {
        StatusCode::UNAUTHORIZED => AzureError::AuthenticationError(detail),
        StatusCode::FORBIDDEN => AzureError::Forbidden(subject.to_string()),
        StatusCode::NOT_FOUND => AzureError::EntityNotFound(subject.to_string()),
        StatusCode::GONE => AzureError::MessageLockLost(subject.to_string()),
        _ => AzureError::ServiceBusError {
            status: status.as_u16(),
            message: detail,
        },
    }
}

// ============================================================================
// Broker properties
// ============================================================================

/// Subset of the `BrokerProperties` JSON header used by this client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BrokerProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lock_token: Option<String>,
    #[serde(default, skip_serializing)]
    delivery_count: u32,
    #[serde(default, skip_serializing)]
    sequence_number: Option<i64>,
    #[serde(default, skip_serializing)]
    locked_until_utc: Option<String>,
}

impl BrokerProperties {
    fn for_send(message: &Message) -> Self {
        Self {
            message_id: Some(message.message_id.as_str().to_string()),
            ..Default::default()
        }
    }

    fn from_response(response: &Response) -> Result<Self, AzureError> {
        let raw = response
            .headers()
            .get(BROKER_PROPERTIES_HEADER)
            .ok_or_else(|| AzureError::InvalidBrokerProperties("header missing".to_string()))?
            .to_str()
            .map_err(|e| AzureError::InvalidBrokerProperties(e.to_string()))?;

        serde_json::from_str(raw).map_err(|e| AzureError::InvalidBrokerProperties(e.to_string()))
    }
}

// ============================================================================
// Data plane
// ============================================================================

/// Azure Service Bus queue provider (data plane)
pub struct AzureServiceBusProvider {
    rest: ServiceBusRest,
    receive_timeout: Option<Duration>,
}

impl fmt::Debug for AzureServiceBusProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureServiceBusProvider")
            .field("endpoint", &self.rest.endpoint.as_str())
            .field("receive_timeout", &self.receive_timeout)
            .finish()
    }
}

impl AzureServiceBusProvider {
    /// Create new Azure Service Bus provider
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is unusable or the HTTP client cannot be built.
    pub fn new(
        config: ServiceBusConfig,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self, AzureError> {
        config
            .validate()
            .map_err(|e| AzureError::ConfigurationError(e.to_string()))?;

        Ok(Self {
            rest: ServiceBusRest::new(&config, tokens)?,
            receive_timeout: config.receive_timeout,
        })
    }

    /// Namespace endpoint requests are sent to
    pub fn endpoint(&self) -> &Url {
        &self.rest.endpoint
    }

    fn parse_received(
        queue: &QueueName,
        properties: BrokerProperties,
        body: bytes::Bytes,
    ) -> Result<ReceivedMessage, AzureError> {
        let message_id = properties
            .message_id
            .ok_or_else(|| AzureError::InvalidBrokerProperties("MessageId missing".to_string()))?;
        let lock_token = properties
            .lock_token
            .ok_or_else(|| AzureError::InvalidBrokerProperties("LockToken missing".to_string()))?;
        let locked_until = properties
            .locked_until_utc
            .as_deref()
            .and_then(Timestamp::from_http_date);

        let message_id = MessageId::from_service(message_id);
        Ok(ReceivedMessage {
            message_id: message_id.clone(),
            body,
            receipt_handle: ReceiptHandle::new(
                queue.clone(),
                message_id,
                lock_token,
                locked_until,
                ProviderType::AzureServiceBus,
            ),
            delivery_count: properties.delivery_count,
            sequence_number: properties.sequence_number,
        })
    }
}

#[async_trait]
impl QueueProvider for AzureServiceBusProvider {
    #[instrument(skip_all, fields(queue = %queue, size = message.body.len()))]
    async fn send_message(
        &self,
        queue: &QueueName,
        message: &Message,
    ) -> Result<MessageId, QueueError> {
        let url = self.rest.entity_url(Some(queue), &["messages"]);
        let properties = serde_json::to_string(&BrokerProperties::for_send(message))
            .map_err(SerializationError::from)?;
        let authorization = self.rest.authorization().await?;

        debug!(url = %url, message_id = %message.message_id, "Sending message");

        let response = self
            .rest
            .http_client
            .post(url)
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(BROKER_PROPERTIES_HEADER, properties)
            .body(message.body.clone())
            .send()
            .await
            .map_err(|e| self.rest.transport_error(e))?;

        if !response.status().is_success() {
            return Err(match error_for_response(response, queue.as_str()).await {
                AzureError::ServiceBusError { status: 413, .. } => {
                    AzureError::MessageTooLarge(message.body.len())
                }
                other => other,
            }
            .into());
        }

        debug!(message_id = %message.message_id, "Message sent");
        Ok(message.message_id.clone())
    }

    #[instrument(skip_all, fields(queue = %queue))]
    async fn receive_message(
        &self,
        queue: &QueueName,
        timeout: Option<Duration>,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let mut url = self.rest.entity_url(Some(queue), &["messages", "head"]);
        if let Some(wait) = timeout.or(self.receive_timeout) {
            url.query_pairs_mut()
                .append_pair("timeout", &wait.as_secs().to_string());
        }
        let authorization = self.rest.authorization().await?;

        debug!(url = %url, "Receiving message in peek-lock mode");

        let response = self
            .rest
            .http_client
            .post(url)
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_LENGTH, 0)
            .send()
            .await
            .map_err(|e| self.rest.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            debug!("No message available");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(error_for_response(response, queue.as_str()).await.into());
        }

        let properties = BrokerProperties::from_response(&response)?;
        let body = response
            .bytes()
            .await
            .map_err(|e| self.rest.transport_error(e))?;

        let received = Self::parse_received(queue, properties, body)?;
        debug!(
            message_id = %received.message_id,
            delivery_count = received.delivery_count,
            "Message received"
        );
        Ok(Some(received))
    }

    #[instrument(skip_all, fields(queue = %receipt.queue(), message_id = %receipt.message_id()))]
    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        if receipt.is_expired() {
            warn!("Lock appears to have expired; completion will likely fail");
        }

        let url = self.rest.entity_url(
            Some(receipt.queue()),
            &["messages", receipt.message_id().as_str(), receipt.lock_token()],
        );
        let authorization = self.rest.authorization().await?;

        let response = self
            .rest
            .http_client
            .delete(url)
            .header(AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| self.rest.transport_error(e))?;

        if !response.status().is_success() {
            // A vanished lock and a vanished message look the same to the caller.
            return Err(match error_for_response(response, &receipt.to_string()).await {
                AzureError::EntityNotFound(subject) => AzureError::MessageLockLost(subject),
                other => other,
            }
            .into());
        }

        debug!("Message completed");
        Ok(())
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::AzureServiceBus
    }
}

// ============================================================================
// Management plane
// ============================================================================

/// Azure Service Bus management client for entity listing
pub struct AzureServiceBusAdmin {
    rest: ServiceBusRest,
    page_size: u32,
}

impl fmt::Debug for AzureServiceBusAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureServiceBusAdmin")
            .field("endpoint", &self.rest.endpoint.as_str())
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl AzureServiceBusAdmin {
    /// Create new management client
    pub fn new(
        config: ServiceBusConfig,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self, AzureError> {
        config
            .validate()
            .map_err(|e| AzureError::ConfigurationError(e.to_string()))?;

        Ok(Self {
            rest: ServiceBusRest::new(&config, tokens)?,
            page_size: config.list_page_size,
        })
    }
}

#[async_trait]
impl QueueAdmin for AzureServiceBusAdmin {
    #[instrument(skip(self))]
    async fn list_queues_page(&self, skip: u32, top: u32) -> Result<Vec<QueueName>, QueueError> {
        let mut url = self.rest.entity_url(None, &["$Resources", "Queues"]);
        url.query_pairs_mut()
            .append_pair("api-version", MANAGEMENT_API_VERSION)
            .append_pair("$skip", &skip.to_string())
            .append_pair("$top", &top.to_string());
        let authorization = self.rest.authorization().await?;

        debug!(url = %url, "Listing queues");

        let response = self
            .rest
            .http_client
            .get(url)
            .header(AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| self.rest.transport_error(e))?;

        if !response.status().is_success() {
            return Err(error_for_response(response, "$Resources/Queues").await.into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.rest.transport_error(e))?;
        let names = parse_queue_feed(&body)?;

        debug!(count = names.len(), "Queue page received");
        Ok(names)
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }
}

/// Extract queue names (`feed/entry/title`) from an Atom entity feed
fn parse_queue_feed(xml: &str) -> Result<Vec<QueueName>, AzureError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut names = Vec::new();
    let mut in_entry = false;
    let mut in_title = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => match element.local_name().as_ref() {
                b"entry" => in_entry = true,
                b"title" if in_entry => in_title = true,
                _ => {}
            },
            Ok(Event::End(element)) => match element.local_name().as_ref() {
                b"entry" => in_entry = false,
                b"title" => in_title = false,
                _ => {}
            },
            Ok(Event::Text(text)) if in_title => {
                let name = text
                    .unescape()
                    .map_err(|e| AzureError::InvalidFeed(e.to_string()))?;
                names.push(QueueName::new(name.into_owned()));
            }
            Ok(Event::CData(data)) if in_title => {
                names.push(QueueName::new(
                    String::from_utf8_lossy(&data.into_inner()).into_owned(),
                ));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(AzureError::InvalidFeed(format!(
                    "error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(names)
}
