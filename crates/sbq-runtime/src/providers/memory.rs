//! In-memory queue provider implementation for testing and development.
//!
//! Behaves like a namespace with peek-lock semantics:
//! - Queues are created on first send
//! - A received message is locked until completed or until the lock lapses,
//!   after which it becomes visible again with a higher delivery count
//! - Queue listing is paged in name order

use crate::client::{QueueAdmin, QueueProvider};
use crate::error::QueueError;
use crate::message::{
    Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage, Timestamp,
};
use crate::provider::{InMemoryConfig, ProviderType};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message stored in the queue with metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: Bytes,
    sequence_number: i64,
    delivery_count: u32,
}

/// A message handed out under a lock
struct InFlightMessage {
    message: StoredMessage,
    lock_expires_at: Instant,
}

/// Internal queue state for a single queue
#[derive(Default)]
struct InMemoryQueue {
    messages: VecDeque<StoredMessage>,
    // lock_token -> locked message
    in_flight: HashMap<String, InFlightMessage>,
}

impl InMemoryQueue {
    /// Put messages whose lock has lapsed back at the front of the queue
    fn release_expired_locks(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, locked)| locked.lock_expires_at <= now)
            .map(|(token, _)| token.clone())
            .collect();

        let mut released: Vec<StoredMessage> = expired
            .into_iter()
            .filter_map(|token| self.in_flight.remove(&token))
            .map(|locked| locked.message)
            .collect();

        released.sort_by_key(|m| std::cmp::Reverse(m.sequence_number));
        for message in released {
            self.messages.push_front(message);
        }
    }
}

struct QueueStorage {
    queues: BTreeMap<QueueName, InMemoryQueue>,
    next_sequence_number: i64,
}

// ============================================================================
// In-Memory Provider
// ============================================================================

/// In-memory namespace implementing both the data and management planes
#[derive(Clone)]
pub struct InMemoryProvider {
    storage: Arc<RwLock<QueueStorage>>,
    config: InMemoryConfig,
}

impl InMemoryProvider {
    /// Create new in-memory provider
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(RwLock::new(QueueStorage {
                queues: BTreeMap::new(),
                next_sequence_number: 1,
            })),
            config,
        }
    }

    /// Create an empty queue so it shows up in listings
    pub fn create_queue(&self, queue: &QueueName) -> Result<(), QueueError> {
        let mut storage = self.write_storage()?;
        storage.queues.entry(queue.clone()).or_default();
        Ok(())
    }

    /// Number of messages waiting in a queue, excluding locked ones
    pub fn active_message_count(&self, queue: &QueueName) -> Result<usize, QueueError> {
        let storage = self.read_storage()?;
        Ok(storage.queues.get(queue).map_or(0, |q| q.messages.len()))
    }

    /// Number of messages currently locked by a receiver
    pub fn locked_message_count(&self, queue: &QueueName) -> Result<usize, QueueError> {
        let storage = self.read_storage()?;
        Ok(storage.queues.get(queue).map_or(0, |q| q.in_flight.len()))
    }

    fn read_storage(&self) -> Result<std::sync::RwLockReadGuard<'_, QueueStorage>, QueueError> {
        self.storage.read().map_err(|_| poisoned())
    }

    fn write_storage(&self) -> Result<std::sync::RwLockWriteGuard<'_, QueueStorage>, QueueError> {
        self.storage.write().map_err(|_| poisoned())
    }

    fn try_receive(&self, queue: &QueueName) -> Result<Option<ReceivedMessage>, QueueError> {
        let mut storage = self.write_storage()?;
        let Some(state) = storage.queues.get_mut(queue) else {
            return Err(QueueError::QueueNotFound {
                queue_name: queue.as_str().to_string(),
            });
        };

        let now = Instant::now();
        state.release_expired_locks(now);

        let Some(mut message) = state.messages.pop_front() else {
            return Ok(None);
        };
        message.delivery_count += 1;

        let lock_token = uuid::Uuid::new_v4().to_string();
        let locked_until = chrono::Duration::from_std(self.config.lock_duration)
            .ok()
            .map(|d| Timestamp::from_datetime(Utc::now() + d));

        let received = ReceivedMessage {
            message_id: message.message_id.clone(),
            body: message.body.clone(),
            receipt_handle: ReceiptHandle::new(
                queue.clone(),
                message.message_id.clone(),
                lock_token.clone(),
                locked_until,
                ProviderType::InMemory,
            ),
            delivery_count: message.delivery_count,
            sequence_number: Some(message.sequence_number),
        };

        state.in_flight.insert(
            lock_token,
            InFlightMessage {
                message,
                lock_expires_at: now + self.config.lock_duration,
            },
        );

        Ok(Some(received))
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

fn poisoned() -> QueueError {
    QueueError::ProviderError {
        provider: "InMemory".to_string(),
        code: "LockPoisoned".to_string(),
        message: "queue storage lock poisoned".to_string(),
    }
}

#[async_trait]
impl QueueProvider for InMemoryProvider {
    async fn send_message(
        &self,
        queue: &QueueName,
        message: &Message,
    ) -> Result<MessageId, QueueError> {
        let mut storage = self.write_storage()?;
        let sequence_number = storage.next_sequence_number;
        storage.next_sequence_number += 1;

        storage
            .queues
            .entry(queue.clone())
            .or_default()
            .messages
            .push_back(StoredMessage {
                message_id: message.message_id.clone(),
                body: message.body.clone(),
                sequence_number,
                delivery_count: 0,
            });

        Ok(message.message_id.clone())
    }

    /// Polls until a message shows up or the wait runs out; `None` means
    /// return immediately when the queue is empty.
    async fn receive_message(
        &self,
        queue: &QueueName,
        timeout: Option<Duration>,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if let Some(received) = self.try_receive(queue)? {
                return Ok(Some(received));
            }

            match deadline {
                Some(deadline) if Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                _ => return Ok(None),
            }
        }
    }

    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let mut storage = self.write_storage()?;
        let not_found = || QueueError::MessageNotFound {
            receipt: receipt.to_string(),
        };

        let state = storage.queues.get_mut(receipt.queue()).ok_or_else(not_found)?;
        match state.in_flight.remove(receipt.lock_token()) {
            Some(locked) if locked.lock_expires_at > Instant::now() => Ok(()),
            Some(locked) => {
                // Lock lapsed before completion; the message goes back.
                state.messages.push_front(locked.message);
                Err(not_found())
            }
            None => Err(not_found()),
        }
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}

#[async_trait]
impl QueueAdmin for InMemoryProvider {
    async fn list_queues_page(&self, skip: u32, top: u32) -> Result<Vec<QueueName>, QueueError> {
        let storage = self.read_storage()?;
        Ok(storage
            .queues
            .keys()
            .skip(skip as usize)
            .take(top as usize)
            .cloned()
            .collect())
    }

    fn page_size(&self) -> u32 {
        self.config.page_size
    }
}
