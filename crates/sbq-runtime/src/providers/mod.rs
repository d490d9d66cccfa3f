//! Queue provider implementations.
//!
//! This module contains concrete implementations of the `QueueProvider` and
//! `QueueAdmin` traits for different queue backends.

pub mod azure;
pub mod memory;

pub use azure::{AzureError, AzureServiceBusAdmin, AzureServiceBusProvider};
pub use memory::InMemoryProvider;
