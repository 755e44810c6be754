//! In-memory queue store for development and tests.
//!
//! Implements the full delivery contract sequentially: apply the enqueue
//! delay, deliver to the single registered handler, on failure wait out the
//! value's backoff schedule between redeliveries, and write the value to each
//! undelivered key once the schedule is exhausted. One delivery settles
//! before the next starts.

use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

use crate::domain::{MessageId, QueueKey, StoreError};
use crate::ports::store::{CommitResult, DeliveryHandler, EnqueueOptions, QueueStore};

/// Heap entry; reversed ordering turns `BinaryHeap` into a min-heap so the
/// earliest due delivery surfaces first.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledDelivery {
    due: Instant,
    id: MessageId,
}

impl PartialOrd for ScheduledDelivery {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledDelivery {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.id.cmp(&self.id))
    }
}

#[derive(Debug, Clone)]
struct DeliveryRecord {
    value: Value,
    /// Delivery attempts started, including the in-flight one.
    attempts: u32,
    backoff_schedule: Vec<Duration>,
    keys_if_undelivered: Vec<QueueKey>,
}

#[derive(Default)]
struct StoreState {
    records: HashMap<MessageId, DeliveryRecord>,
    scheduled: BinaryHeap<ScheduledDelivery>,
    dead_letters: HashMap<QueueKey, Value>,
    closed: bool,
}

enum Step {
    Deliver(MessageId, Value),
    Wait(Option<Instant>),
}

pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
    notify: Arc<Notify>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Value written to `key` after its retry schedule ran out, if any.
    pub async fn dead_letter(&self, key: &QueueKey) -> Option<Value> {
        self.state.lock().await.dead_letters.get(key).cloned()
    }

    pub async fn dead_letter_keys(&self) -> Vec<QueueKey> {
        self.state.lock().await.dead_letters.keys().cloned().collect()
    }

    /// Messages accepted but not yet settled (delivered or dead-lettered).
    pub async fn pending(&self) -> usize {
        self.state.lock().await.records.len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueStore for InMemoryStore {
    async fn enqueue(
        &self,
        value: Value,
        options: EnqueueOptions,
    ) -> Result<CommitResult, StoreError> {
        let id = MessageId::new();
        let due = Instant::now() + options.delay.unwrap_or(Duration::ZERO);
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(StoreError::Closed);
            }
            state.records.insert(
                id,
                DeliveryRecord {
                    value,
                    attempts: 0,
                    backoff_schedule: options.backoff_schedule,
                    keys_if_undelivered: options.keys_if_undelivered,
                },
            );
            state.scheduled.push(ScheduledDelivery { due, id });
        }
        self.notify.notify_one();
        Ok(CommitResult { id })
    }

    async fn listen_queue(&self, handler: Arc<dyn DeliveryHandler>) -> Result<(), StoreError> {
        loop {
            let step = {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Ok(());
                }
                let now = Instant::now();
                match state.scheduled.peek().map(|entry| entry.due) {
                    Some(due) if due <= now => {
                        let Some(entry) = state.scheduled.pop() else {
                            continue;
                        };
                        let Some(record) = state.records.get_mut(&entry.id) else {
                            // Already settled; stale heap entry.
                            continue;
                        };
                        record.attempts += 1;
                        Step::Deliver(entry.id, record.value.clone())
                    }
                    next => Step::Wait(next),
                }
            };

            match step {
                Step::Deliver(id, value) => {
                    let result = handler.deliver(value).await;
                    let mut state = self.state.lock().await;
                    match result {
                        Ok(()) => {
                            state.records.remove(&id);
                        }
                        Err(error) => {
                            let Some(record) = state.records.get_mut(&id) else {
                                continue;
                            };
                            let attempt = record.attempts as usize;
                            if attempt <= record.backoff_schedule.len() {
                                let wait = record.backoff_schedule[attempt - 1];
                                debug!(%id, attempt, ?wait, %error, "redelivery scheduled");
                                state.scheduled.push(ScheduledDelivery {
                                    due: Instant::now() + wait,
                                    id,
                                });
                            } else if let Some(record) = state.records.remove(&id) {
                                debug!(%id, attempt, %error, "schedule exhausted, dead-lettering");
                                for key in record.keys_if_undelivered {
                                    state.dead_letters.insert(key, record.value.clone());
                                }
                            }
                        }
                    }
                }
                Step::Wait(Some(due)) => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep_until(due) => {}
                    }
                }
                Step::Wait(None) => {
                    self.notify.notified().await;
                }
            }
        }
    }

    async fn close(&self) {
        {
            let mut state = self.state.lock().await;
            state.closed = true;
        }
        // A stored permit wakes the loop even if it is not waiting yet.
        self.notify.notify_one();
    }
}
