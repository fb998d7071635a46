//! Per-partition flow control.
//!
//! Every delivery holds a [`FlowPermit`] until it is acknowledged or dropped,
//! so no partition ever has more than the configured number of messages or
//! bytes outstanding in the worker pool.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::types::{FlowControlSettings, Partition};
use crate::{Error, Result};

/// Budget of one partition.
struct PartitionBudget {
    messages: Arc<Semaphore>,
    bytes: Arc<Semaphore>,
}

/// Outstanding-work permit for a single delivery.
#[derive(Debug)]
pub struct FlowPermit {
    partition: Option<Partition>,
    _messages: OwnedSemaphorePermit,
    _bytes: Option<OwnedSemaphorePermit>,
}

impl FlowPermit {
    /// Partition the permit was drawn from (`None` for undecodable ids).
    pub fn partition(&self) -> Option<Partition> {
        self.partition
    }
}

/// Tracks outstanding messages and bytes for every partition seen.
pub struct FlowController {
    settings: FlowControlSettings,
    byte_capacity: usize,
    partitions: Mutex<HashMap<Option<Partition>, Arc<PartitionBudget>>>,
}

impl FlowController {
    /// Create a controller with the given per-partition budget.
    pub fn new(settings: FlowControlSettings) -> Self {
        Self {
            settings,
            byte_capacity: settings.bytes_outstanding.min(u32::MAX as usize),
            partitions: Mutex::new(HashMap::new()),
        }
    }

    async fn budget(&self, partition: Option<Partition>) -> Arc<PartitionBudget> {
        let mut partitions = self.partitions.lock().await;
        partitions
            .entry(partition)
            .or_insert_with(|| {
                Arc::new(PartitionBudget {
                    messages: Arc::new(Semaphore::new(self.settings.messages_outstanding)),
                    bytes: Arc::new(Semaphore::new(self.byte_capacity)),
                })
            })
            .clone()
    }

    /// Byte permits charged for a message; oversized messages take the whole
    /// byte budget.
    fn byte_permits(&self, size: usize) -> u32 {
        // byte_capacity <= u32::MAX
        u32::try_from(size.min(self.byte_capacity)).unwrap_or(u32::MAX)
    }

    /// Wait until the partition has room for one more message of `size` bytes.
    ///
    /// A message larger than the byte budget takes the whole byte budget.
    pub async fn acquire(&self, partition: Option<Partition>, size: usize) -> Result<FlowPermit> {
        let budget = self.budget(partition).await;

        let messages = budget
            .messages
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("flow control closed".to_string()))?;

        let needed = self.byte_permits(size);
        let bytes = if needed == 0 {
            None
        } else {
            Some(
                budget
                    .bytes
                    .clone()
                    .acquire_many_owned(needed)
                    .await
                    .map_err(|_| Error::Internal("flow control closed".to_string()))?,
            )
        };

        Ok(FlowPermit {
            partition,
            _messages: messages,
            _bytes: bytes,
        })
    }

    /// Take a permit only if the partition has room right now.
    pub async fn try_acquire(&self, partition: Option<Partition>, size: usize) -> Option<FlowPermit> {
        let budget = self.budget(partition).await;

        let messages = budget.messages.clone().try_acquire_owned().ok()?;
        let needed = self.byte_permits(size);
        let bytes = if needed == 0 {
            None
        } else {
            Some(budget.bytes.clone().try_acquire_many_owned(needed).ok()?)
        };

        Some(FlowPermit {
            partition,
            _messages: messages,
            _bytes: bytes,
        })
    }

    /// Outstanding `(messages, bytes)` for a partition.
    pub async fn outstanding(&self, partition: Option<Partition>) -> (usize, usize) {
        let partitions = self.partitions.lock().await;
        match partitions.get(&partition) {
            Some(budget) => (
                self.settings.messages_outstanding - budget.messages.available_permits(),
                self.byte_capacity - budget.bytes.available_permits(),
            ),
            None => (0, 0),
        }
    }
}
