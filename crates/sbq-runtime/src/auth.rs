//! Authorization header sources for Service Bus requests.
//!
//! Two methods are supported:
//! - **Entra ID**: bearer tokens from the default Azure credential chain
//!   (environment variables, managed identity, Azure CLI)
//! - **Shared access signature**: tokens signed locally with a key taken from a
//!   connection string

use crate::error::QueueError;
use crate::provider::{ServiceBusAuth, ServiceBusConfig};
use async_trait::async_trait;
use azure_core::auth::TokenCredential;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;

/// OAuth scope covering the Service Bus data and management planes
pub const SERVICE_BUS_SCOPE: &str = "https://servicebus.azure.net/.default";

/// Lifetime of locally signed SAS tokens, in seconds
pub const SAS_TOKEN_TTL_SECS: i64 = 3600;

type HmacSha256 = Hmac<Sha256>;

/// Produces the `Authorization` header value for each request
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn authorization(&self) -> Result<String, QueueError>;
}

/// Build the token provider matching the configured auth method
pub fn token_provider_for(
    config: &ServiceBusConfig,
) -> Result<Arc<dyn AccessTokenProvider>, QueueError> {
    match &config.auth {
        ServiceBusAuth::DefaultCredential => Ok(Arc::new(EntraIdTokenProvider::from_default_chain()?)),
        ServiceBusAuth::SharedAccessKey {
            key_name,
            key,
            entity_path,
        } => {
            let resource_uri = match entity_path.as_deref().map(|p| p.trim_matches('/')) {
                Some(path) if !path.is_empty() => format!("{}{}", config.endpoint, path),
                _ => config.endpoint.to_string(),
            };
            Ok(Arc::new(SharedAccessSignatureProvider::new(
                &resource_uri,
                key_name,
                key,
            )))
        }
    }
}

// ============================================================================
// Entra ID
// ============================================================================

/// Bearer tokens from an Azure identity credential
pub struct EntraIdTokenProvider {
    credential: Arc<dyn TokenCredential>,
}

impl EntraIdTokenProvider {
    /// Use the default credential chain
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailed` if no credential source can be set up.
    /// Token acquisition itself is deferred to the first request.
    pub fn from_default_chain() -> Result<Self, QueueError> {
        let credential = azure_identity::create_default_credential().map_err(|e| {
            QueueError::AuthenticationFailed {
                message: format!("failed to create default Azure credential: {}", e),
            }
        })?;

        Ok(Self { credential })
    }
}

impl fmt::Debug for EntraIdTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntraIdTokenProvider")
            .field("scope", &SERVICE_BUS_SCOPE)
            .finish()
    }
}

#[async_trait]
impl AccessTokenProvider for EntraIdTokenProvider {
    async fn authorization(&self) -> Result<String, QueueError> {
        let token = self
            .credential
            .get_token(&[SERVICE_BUS_SCOPE])
            .await
            .map_err(|e| QueueError::AuthenticationFailed {
                message: e.to_string(),
            })?;

        debug!(expires_on = %token.expires_on, "Acquired Service Bus access token");
        Ok(format!("Bearer {}", token.token.secret()))
    }
}

// ============================================================================
// Shared Access Signature
// ============================================================================

/// SAS tokens signed with a shared access key
#[derive(Clone)]
pub struct SharedAccessSignatureProvider {
    resource_uri: String,
    key_name: String,
    key: String,
}

impl SharedAccessSignatureProvider {
    pub fn new(resource_uri: &str, key_name: &str, key: &str) -> Self {
        Self {
            resource_uri: resource_uri.to_string(),
            key_name: key_name.to_string(),
            key: key.to_string(),
        }
    }

    /// Sign a token valid until `expiry` (unix seconds)
    ///
    /// The string to sign is the URL-encoded resource URI and the expiry,
    /// separated by a newline. The key is used as-is, not base64-decoded.
    pub fn sign(&self, expiry: i64) -> String {
        let encoded_uri = urlencoding::encode(&self.resource_uri);
        let string_to_sign = format!("{}\n{}", encoded_uri, expiry);

        let mut mac =
            HmacSha256::new_from_slice(self.key.as_bytes()).expect("HMAC can take key of any size");
        mac.update(string_to_sign.as_bytes());
        let signature = general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        format!(
            "SharedAccessSignature sr={}&sig={}&se={}&skn={}",
            encoded_uri,
            urlencoding::encode(&signature),
            expiry,
            urlencoding::encode(&self.key_name)
        )
    }
}

impl fmt::Debug for SharedAccessSignatureProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedAccessSignatureProvider")
            .field("resource_uri", &self.resource_uri)
            .field("key_name", &self.key_name)
            .field("key", &"<REDACTED>")
            .finish()
    }
}

#[async_trait]
impl AccessTokenProvider for SharedAccessSignatureProvider {
    async fn authorization(&self) -> Result<String, QueueError> {
        Ok(self.sign(Utc::now().timestamp() + SAS_TOKEN_TTL_SECS))
    }
}
