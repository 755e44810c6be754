//! Queue store port: the durable at-least-once delivery queue.
//!
//! The store owns everything the router delegates: persistence, the delivery
//! loop, redelivery per backoff schedule, and dead-letter writes once the
//! schedule is exhausted. The router only ever sees this trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{DispatchError, MessageId, QueueKey, StoreError};

/// Delivery options attached to one enqueued value.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Wait time before redelivery attempt `n` is `backoff_schedule[n]`. When
    /// the schedule runs out the value is written to the undelivered keys.
    pub backoff_schedule: Vec<Duration>,
    /// Wait before the first delivery attempt.
    pub delay: Option<Duration>,
    /// Keys the value is written to if it is never successfully handled.
    pub keys_if_undelivered: Vec<QueueKey>,
}

/// Acknowledgement that the store accepted a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitResult {
    pub id: MessageId,
}

/// The single consumer callback registered via [`QueueStore::listen_queue`].
/// An `Err` return triggers redelivery per the value's backoff schedule.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn deliver(&self, value: Value) -> Result<(), DispatchError>;
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Persist `value` for later delivery.
    async fn enqueue(&self, value: Value, options: EnqueueOptions)
    -> Result<CommitResult, StoreError>;

    /// Run the delivery loop against `handler`. One value is dispatched and
    /// settled at a time; the call completes once the store is closed.
    async fn listen_queue(&self, handler: Arc<dyn DeliveryHandler>) -> Result<(), StoreError>;

    /// Release the store handle. Unblocks a pending `listen_queue`.
    async fn close(&self);
}
