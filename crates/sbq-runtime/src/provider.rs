//! Provider types and configuration.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

/// DNS suffix appended to bare namespace names
pub const SERVICE_BUS_DNS_SUFFIX: &str = "servicebus.windows.net";

/// Largest page the management API will hand out
pub const MAX_LIST_PAGE_SIZE: u32 = 1000;

/// Enumeration of supported queue providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderType {
    AzureServiceBus,
    InMemory,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AzureServiceBus => write!(f, "AzureServiceBus"),
            Self::InMemory => write!(f, "InMemory"),
        }
    }
}

/// How requests to the namespace are authorized
#[derive(Clone, PartialEq, Eq)]
pub enum ServiceBusAuth {
    /// Entra ID token from the default Azure credential chain
    /// (environment, managed identity, Azure CLI)
    DefaultCredential,
    /// Shared access signature derived from a connection string key
    ///
    /// `entity_path` is set for keys scoped to a single queue; tokens are then
    /// signed for that entity instead of the whole namespace.
    SharedAccessKey {
        key_name: String,
        key: String,
        entity_path: Option<String>,
    },
}

impl fmt::Debug for ServiceBusAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DefaultCredential => write!(f, "DefaultCredential"),
            Self::SharedAccessKey {
                key_name,
                entity_path,
                ..
            } => f
                .debug_struct("SharedAccessKey")
                .field("key_name", key_name)
                .field("key", &"<REDACTED>")
                .field("entity_path", entity_path)
                .finish(),
        }
    }
}

/// Azure Service Bus configuration
#[derive(Debug, Clone)]
pub struct ServiceBusConfig {
    /// Base URL of the namespace, always ending in `/`
    pub endpoint: Url,
    pub auth: ServiceBusAuth,
    /// Long-poll wait for receive; `None` leaves the service default in place
    pub receive_timeout: Option<Duration>,
    /// Entries requested per management page
    pub list_page_size: u32,
    pub connect_timeout: Duration,
}

impl ServiceBusConfig {
    /// Configuration for a namespace reached with the default credential chain
    ///
    /// Accepts a bare namespace (`myns`), a host (`myns.servicebus.windows.net`)
    /// or a full URL (`https://myns.servicebus.windows.net`, `http://localhost:5672`).
    pub fn for_namespace(namespace: &str) -> Result<Self, ConfigurationError> {
        Ok(Self::with_endpoint(
            resolve_namespace_endpoint(namespace)?,
            ServiceBusAuth::DefaultCredential,
        ))
    }

    /// Configuration from a shared access connection string
    pub fn from_connection_string(connection_string: &str) -> Result<Self, ConfigurationError> {
        let parsed = ConnectionString::parse(connection_string)?;
        Ok(Self::with_endpoint(
            parsed.endpoint,
            ServiceBusAuth::SharedAccessKey {
                key_name: parsed.key_name,
                key: parsed.key,
                entity_path: parsed.entity_path,
            },
        ))
    }

    fn with_endpoint(endpoint: Url, auth: ServiceBusAuth) -> Self {
        Self {
            endpoint,
            auth,
            receive_timeout: None,
            list_page_size: 100,
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Validate settings that the constructors cannot check on their own
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.list_page_size == 0 || self.list_page_size > MAX_LIST_PAGE_SIZE {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "list page size must be between 1 and {}, got {}",
                    MAX_LIST_PAGE_SIZE, self.list_page_size
                ),
            });
        }

        if let Some(timeout) = self.receive_timeout {
            if timeout.as_secs() == 0 {
                return Err(ConfigurationError::Invalid {
                    message: "receive timeout must be at least one second".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Turn whatever the operator supplied as a namespace into a base URL
pub fn resolve_namespace_endpoint(namespace: &str) -> Result<Url, ConfigurationError> {
    let namespace = namespace.trim();
    if namespace.is_empty() {
        return Err(ConfigurationError::Missing {
            key: "namespace".to_string(),
        });
    }

    let raw = if namespace.contains("://") {
        namespace.to_string()
    } else if namespace.contains('.') {
        format!("https://{}", namespace)
    } else {
        format!("https://{}.{}", namespace, SERVICE_BUS_DNS_SUFFIX)
    };

    parse_endpoint(&raw)
}

fn parse_endpoint(raw: &str) -> Result<Url, ConfigurationError> {
    let mut url = Url::parse(raw).map_err(|e| ConfigurationError::Parsing {
        message: format!("invalid namespace endpoint '{}': {}", raw, e),
    })?;

    match url.scheme() {
        "https" | "http" => {}
        "sb" => {
            // AMQP-style endpoints in connection strings map onto the HTTPS API.
            url = Url::parse(&raw.replacen("sb://", "https://", 1)).map_err(|e| {
                ConfigurationError::Parsing {
                    message: format!("invalid namespace endpoint '{}': {}", raw, e),
                }
            })?;
        }
        other => {
            return Err(ConfigurationError::Invalid {
                message: format!("unsupported endpoint scheme '{}'", other),
            });
        }
    }

    if url.host_str().is_none() {
        return Err(ConfigurationError::Invalid {
            message: format!("endpoint '{}' has no host", raw),
        });
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);

    Ok(url)
}

/// Parsed `Endpoint=...;SharedAccessKeyName=...;SharedAccessKey=...` string
#[derive(Clone)]
pub struct ConnectionString {
    pub endpoint: Url,
    pub key_name: String,
    pub key: String,
    pub entity_path: Option<String>,
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("endpoint", &self.endpoint.as_str())
            .field("key_name", &self.key_name)
            .field("key", &"<REDACTED>")
            .field("entity_path", &self.entity_path)
            .finish()
    }
}

impl ConnectionString {
    /// Parse a shared access connection string
    pub fn parse(value: &str) -> Result<Self, ConfigurationError> {
        let mut endpoint = None;
        let mut key_name = None;
        let mut key = None;
        let mut entity_path = None;

        for part in value.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            // Keys are base64 and may end in '=', so split on the first one only.
            let (name, val) = part.split_once('=').ok_or_else(|| ConfigurationError::Parsing {
                message: "connection string segment is not key=value".to_string(),
            })?;

            match name.to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(val.to_string()),
                "sharedaccesskeyname" => key_name = Some(val.to_string()),
                "sharedaccesskey" => key = Some(val.to_string()),
                "entitypath" => entity_path = Some(val.to_string()),
                _ => {}
            }
        }

        let endpoint = endpoint.ok_or_else(|| ConfigurationError::Missing {
            key: "Endpoint".to_string(),
        })?;
        let key_name = key_name.ok_or_else(|| ConfigurationError::Missing {
            key: "SharedAccessKeyName".to_string(),
        })?;
        let key = key.ok_or_else(|| ConfigurationError::Missing {
            key: "SharedAccessKey".to_string(),
        })?;

        Ok(Self {
            endpoint: parse_endpoint(&endpoint)?,
            key_name,
            key,
            entity_path,
        })
    }
}

/// In-memory provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryConfig {
    /// Entries returned per management page
    pub page_size: u32,
    /// How long a received message stays locked before it is redelivered
    pub lock_duration: Duration,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            lock_duration: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
