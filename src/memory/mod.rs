//! In-memory subscription service.
//!
//! Implements both [`MessageSource`] and [`AdminClient`] over partitioned
//! in-process logs, with leases, redelivery of expired leases, per-message
//! ack accounting and cursor seeks.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::admin::{AdminClient, SeekOperation, SeekTarget};
use crate::subscriber::{MessageSource, ReceivedMessage};
use crate::types::{InboundMessage, MessageMetadata, SubscriptionPath};
use crate::{Error, Result};

/// In-memory subscription service.
#[derive(Clone)]
pub struct InMemoryService {
    inner: Arc<InMemoryServiceInner>,
}

struct InMemoryServiceInner {
    /// Subscriptions by path.
    subscriptions: RwLock<HashMap<SubscriptionPath, SubscriptionData>>,
    /// Configuration.
    config: InMemoryConfig,
}

/// Configuration for the in-memory service.
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// How long a pulled message stays leased before redelivery.
    pub lease_duration: Duration,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            lease_duration: Duration::seconds(60),
        }
    }
}

/// A message to append to a partition.
#[derive(Debug, Clone, Default)]
pub struct PublishedMessage {
    /// String attributes.
    pub attributes: HashMap<String, String>,
    /// Payload.
    pub data: Vec<u8>,
    /// Publish time; defaults to now.
    pub publish_time: Option<DateTime<Utc>>,
    /// Event time; seeks by event time fall back to publish time without it.
    pub event_time: Option<DateTime<Utc>>,
}

/// Subscription state.
struct SubscriptionData {
    /// Partition logs.
    partitions: Vec<PartitionLog>,
    /// Outstanding leases by ack id.
    leases: HashMap<String, Lease>,
    /// Expired leases waiting for redelivery.
    redeliveries: VecDeque<(usize, usize)>,
    /// Acknowledgements per message id.
    ack_counts: HashMap<String, u32>,
    /// Seeks applied, oldest first.
    seeks: Vec<SeekTarget>,
    /// Partition to start the next pull from.
    next_partition: usize,
}

/// One partition.
struct PartitionLog {
    /// Stored messages; index is the offset.
    messages: Vec<StoredMessage>,
    /// Offset of the next message to deliver.
    cursor: usize,
}

/// Stored message with its event time.
struct StoredMessage {
    message: InboundMessage,
    event_time: Option<DateTime<Utc>>,
}

impl StoredMessage {
    fn publish_time(&self) -> DateTime<Utc> {
        self.message.publish_time.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Leased message.
struct Lease {
    partition: usize,
    offset: usize,
    expires_at: DateTime<Utc>,
}

impl SubscriptionData {
    fn new(partitions: usize) -> Self {
        Self {
            partitions: (0..partitions)
                .map(|_| PartitionLog {
                    messages: Vec::new(),
                    cursor: 0,
                })
                .collect(),
            leases: HashMap::new(),
            redeliveries: VecDeque::new(),
            ack_counts: HashMap::new(),
            seeks: Vec::new(),
            next_partition: 0,
        }
    }

    /// Move expired leases to the redelivery queue.
    fn expire_leases(&mut self, now: DateTime<Utc>) {
        let expired: Vec<String> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(ack_id, _)| ack_id.clone())
            .collect();

        for ack_id in expired {
            if let Some(lease) = self.leases.remove(&ack_id) {
                debug!(ack_id = %ack_id, "Lease expired, scheduling redelivery");
                self.redeliveries.push_back((lease.partition, lease.offset));
            }
        }
    }

    /// Next `(partition, offset)` to deliver, round-robin across partitions.
    fn next_position(&mut self) -> Option<(usize, usize)> {
        if let Some(position) = self.redeliveries.pop_front() {
            return Some(position);
        }

        let count = self.partitions.len();
        for step in 0..count {
            let index = (self.next_partition + step) % count;
            let log = &mut self.partitions[index];
            if log.cursor < log.messages.len() {
                let offset = log.cursor;
                log.cursor += 1;
                self.next_partition = (index + 1) % count;
                return Some((index, offset));
            }
        }
        None
    }

    fn apply_seek(&mut self, target: SeekTarget) {
        for log in &mut self.partitions {
            log.cursor = match target {
                SeekTarget::Beginning => 0,
                SeekTarget::End => log.messages.len(),
                SeekTarget::PublishTime(ts) => log
                    .messages
                    .iter()
                    .position(|m| m.publish_time() >= ts)
                    .unwrap_or(log.messages.len()),
                SeekTarget::EventTime(ts) => log
                    .messages
                    .iter()
                    .position(|m| m.event_time.unwrap_or_else(|| m.publish_time()) >= ts)
                    .unwrap_or(log.messages.len()),
            };
        }
        self.redeliveries.clear();
        self.seeks.push(target);
    }
}

impl InMemoryService {
    /// Create a new in-memory service with default configuration.
    pub fn new() -> Self {
        Self::with_config(InMemoryConfig::default())
    }

    /// Create a new in-memory service with custom configuration.
    pub fn with_config(config: InMemoryConfig) -> Self {
        info!(
            "Initializing in-memory subscription service with lease_duration={}s",
            config.lease_duration.num_seconds()
        );

        Self {
            inner: Arc::new(InMemoryServiceInner {
                subscriptions: RwLock::new(HashMap::new()),
                config,
            }),
        }
    }

    /// Create a subscription with `partitions` partitions.
    pub async fn create_subscription(&self, path: &SubscriptionPath, partitions: usize) -> Result<()> {
        let mut subscriptions = self.inner.subscriptions.write().await;
        if subscriptions.contains_key(path) {
            return Err(Error::SubscriptionAlreadyExists(path.to_string()));
        }
        subscriptions.insert(path.clone(), SubscriptionData::new(partitions.max(1)));
        info!(subscription = %path, partitions, "Created subscription");
        Ok(())
    }

    /// Append a message to a partition and return its metadata.
    pub async fn publish(
        &self,
        path: &SubscriptionPath,
        partition: u64,
        message: PublishedMessage,
    ) -> Result<MessageMetadata> {
        let mut subscriptions = self.inner.subscriptions.write().await;
        let data = subscriptions
            .get_mut(path)
            .ok_or_else(|| Error::SubscriptionNotFound(path.to_string()))?;

        let log = usize::try_from(partition)
            .ok()
            .and_then(|index| data.partitions.get_mut(index))
            .ok_or_else(|| Error::Internal(format!("Partition {} does not exist", partition)))?;

        let metadata = MessageMetadata::new(partition, log.messages.len() as i64);
        log.messages.push(StoredMessage {
            message: InboundMessage {
                message_id: metadata.encode(),
                attributes: message.attributes,
                data: message.data,
                publish_time: Some(message.publish_time.unwrap_or_else(Utc::now)),
            },
            event_time: message.event_time,
        });

        Ok(metadata)
    }

    /// Number of times a message has been acknowledged.
    pub async fn ack_count(&self, path: &SubscriptionPath, message_id: &str) -> u32 {
        let subscriptions = self.inner.subscriptions.read().await;
        subscriptions
            .get(path)
            .and_then(|data| data.ack_counts.get(message_id).copied())
            .unwrap_or(0)
    }

    /// Number of leased, un-acked messages.
    pub async fn outstanding(&self, path: &SubscriptionPath) -> usize {
        let subscriptions = self.inner.subscriptions.read().await;
        subscriptions.get(path).map_or(0, |data| data.leases.len())
    }

    /// Delivery cursor of a partition.
    pub async fn cursor(&self, path: &SubscriptionPath, partition: u64) -> Option<i64> {
        let subscriptions = self.inner.subscriptions.read().await;
        let data = subscriptions.get(path)?;
        let index = usize::try_from(partition).ok()?;
        data.partitions.get(index).map(|log| log.cursor as i64)
    }

    /// Seeks applied to a subscription, oldest first.
    pub async fn seeks(&self, path: &SubscriptionPath) -> Vec<SeekTarget> {
        let subscriptions = self.inner.subscriptions.read().await;
        subscriptions
            .get(path)
            .map(|data| data.seeks.clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageSource for InMemoryService {
    async fn pull(
        &self,
        subscription: &SubscriptionPath,
        max_messages: usize,
    ) -> Result<Vec<ReceivedMessage>> {
        let mut subscriptions = self.inner.subscriptions.write().await;
        let data = subscriptions
            .get_mut(subscription)
            .ok_or_else(|| Error::SubscriptionNotFound(subscription.to_string()))?;

        let now = Utc::now();
        data.expire_leases(now);

        let mut received = Vec::new();
        while received.len() < max_messages {
            let Some((partition, offset)) = data.next_position() else {
                break;
            };

            let ack_id = Uuid::new_v4().to_string();
            data.leases.insert(
                ack_id.clone(),
                Lease {
                    partition,
                    offset,
                    expires_at: now + self.inner.config.lease_duration,
                },
            );
            received.push(ReceivedMessage {
                ack_id,
                message: data.partitions[partition].messages[offset].message.clone(),
            });
        }

        Ok(received)
    }

    async fn acknowledge(&self, subscription: &SubscriptionPath, ack_ids: &[String]) -> Result<()> {
        let mut subscriptions = self.inner.subscriptions.write().await;
        let data = subscriptions
            .get_mut(subscription)
            .ok_or_else(|| Error::SubscriptionNotFound(subscription.to_string()))?;

        for ack_id in ack_ids {
            match data.leases.remove(ack_id) {
                Some(lease) => {
                    let message_id = data.partitions[lease.partition].messages[lease.offset]
                        .message
                        .message_id
                        .clone();
                    *data.ack_counts.entry(message_id).or_insert(0) += 1;
                }
                None => debug!(ack_id = %ack_id, "Ignoring ack for unknown or expired lease"),
            }
        }

        Ok(())
    }
}

#[async_trait]
impl AdminClient for InMemoryService {
    async fn seek_subscription(
        &self,
        subscription: &SubscriptionPath,
        target: SeekTarget,
    ) -> Result<SeekOperation> {
        let mut subscriptions = self.inner.subscriptions.write().await;
        let data = subscriptions
            .get_mut(subscription)
            .ok_or_else(|| Error::SubscriptionNotFound(subscription.to_string()))?;

        data.apply_seek(target);
        info!(subscription = %subscription, target = %target, "Applied seek");

        Ok(SeekOperation {
            name: format!(
                "projects/{}/locations/{}/operations/{}",
                subscription.project,
                subscription.region(),
                Uuid::new_v4()
            ),
            metadata: None,
        })
    }
}
