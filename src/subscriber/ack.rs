//! Acknowledgement handles and the batching acker task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::flow_control::FlowPermit;
use super::MessageSource;
use crate::types::SubscriptionPath;

/// Acknowledges one delivery.
///
/// [`AckHandle::ack`] consumes the handle, so a delivery is acknowledged at
/// most once. Dropping the handle without acking leaves the message to be
/// redelivered. Either way the flow-control permit is released.
#[derive(Debug)]
pub struct AckHandle {
    ack_id: String,
    acks: mpsc::UnboundedSender<String>,
    _permit: Option<FlowPermit>,
}

impl AckHandle {
    /// Create a handle that forwards its ack id to `acks`.
    pub fn new(
        ack_id: impl Into<String>,
        acks: mpsc::UnboundedSender<String>,
        permit: Option<FlowPermit>,
    ) -> Self {
        Self {
            ack_id: ack_id.into(),
            acks,
            _permit: permit,
        }
    }

    /// The collaborator's ack id.
    pub fn ack_id(&self) -> &str {
        &self.ack_id
    }

    /// Acknowledge the delivery.
    pub fn ack(self) {
        let AckHandle { ack_id, acks, .. } = self;
        if acks.send(ack_id).is_err() {
            warn!("Acker stopped before acknowledgement could be sent");
        }
    }
}

/// Acker batching parameters.
#[derive(Debug, Clone, Copy)]
pub struct AckerSettings {
    /// Flush once this many ack ids are pending.
    pub batch_size: usize,
    /// Flush pending ack ids at least this often.
    pub flush_interval: Duration,
}

/// Forward ack ids to the source in batches until every sender is gone.
pub async fn run_acker(
    source: Arc<dyn MessageSource>,
    subscription: SubscriptionPath,
    mut acks: mpsc::UnboundedReceiver<String>,
    settings: AckerSettings,
) {
    let mut pending: Vec<String> = Vec::with_capacity(settings.batch_size);
    let mut ticker = tokio::time::interval(settings.flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = acks.recv() => match received {
                Some(ack_id) => {
                    pending.push(ack_id);
                    if pending.len() >= settings.batch_size {
                        flush(source.as_ref(), &subscription, &mut pending).await;
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                flush(source.as_ref(), &subscription, &mut pending).await;
            }
        }
    }

    flush(source.as_ref(), &subscription, &mut pending).await;
    debug!("Acker stopped");
}

async fn flush(source: &dyn MessageSource, subscription: &SubscriptionPath, pending: &mut Vec<String>) {
    if pending.is_empty() {
        return;
    }

    let batch = std::mem::take(pending);
    debug!(count = batch.len(), "Acknowledging messages");
    if let Err(e) = source.acknowledge(subscription, &batch).await {
        // The messages will be redelivered once their leases expire.
        warn!(count = batch.len(), "Failed to acknowledge messages: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ack_consumes_handle() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = AckHandle::new("ack-1", tx, None);
        assert_eq!(handle.ack_id(), "ack-1");

        handle.ack();
        assert_eq!(rx.recv().await.as_deref(), Some("ack-1"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_ack() {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        drop(AckHandle::new("ack-2", tx, None));
        assert!(rx.recv().await.is_none());
    }
}
