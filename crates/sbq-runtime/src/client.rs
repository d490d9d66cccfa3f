//! Client traits for queue operations.
//!
//! The data plane ([`QueueProvider`]) and the management plane ([`QueueAdmin`])
//! are separate traits because the service exposes them as separate APIs with
//! separate clients.

use crate::error::QueueError;
use crate::message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage};
use crate::provider::ProviderType;
use async_trait::async_trait;
use std::time::Duration;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Data-plane operations implemented by each queue backend
#[async_trait]
pub trait QueueProvider: Send + Sync {
    /// Send single message
    async fn send_message(
        &self,
        queue: &QueueName,
        message: &Message,
    ) -> Result<MessageId, QueueError>;

    /// Receive at most one message in peek-lock mode
    ///
    /// `timeout` of `None` uses the provider's own default wait. `Ok(None)`
    /// means nothing arrived within the wait.
    async fn receive_message(
        &self,
        queue: &QueueName,
        timeout: Option<Duration>,
    ) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Settle a locked message, removing it from the queue
    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

/// Management-plane operations
#[async_trait]
pub trait QueueAdmin: Send + Sync {
    /// Fetch one page of queue names, skipping the first `skip` entries
    async fn list_queues_page(&self, skip: u32, top: u32) -> Result<Vec<QueueName>, QueueError>;

    /// Page size requested by [`QueuePager`]
    fn page_size(&self) -> u32;
}

/// Walks the queues of a namespace one page at a time
///
/// Mirrors the service's `$skip`/`$top` paging: the offset advances by the
/// number of entries actually returned and the first empty page ends the walk.
pub struct QueuePager<'a, A: QueueAdmin + ?Sized> {
    admin: &'a A,
    skip: u32,
    done: bool,
}

impl<'a, A: QueueAdmin + ?Sized> QueuePager<'a, A> {
    /// Start a walk at the first queue of the namespace
    pub fn new(admin: &'a A) -> Self {
        Self {
            admin,
            skip: 0,
            done: false,
        }
    }

    /// Fetch the next page, or `Ok(None)` once the namespace is exhausted
    pub async fn next_page(&mut self) -> Result<Option<Vec<QueueName>>, QueueError> {
        if self.done {
            return Ok(None);
        }

        let page = self
            .admin
            .list_queues_page(self.skip, self.admin.page_size())
            .await?;

        if page.is_empty() {
            self.done = true;
            return Ok(None);
        }

        self.skip = self.skip.saturating_add(page.len() as u32);
        Ok(Some(page))
    }
}
