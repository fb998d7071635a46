//! Subscriber sessions: the pull loop and its lifecycle handle.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info};

use super::ack::{run_acker, AckHandle, AckerSettings};
use super::flow_control::{FlowController, FlowPermit};
use super::sink::OutputSink;
use super::worker::WorkerPool;
use super::{Delivery, MessageSource, ReceivedMessage};
use crate::core::shutdown::{Interrupt, ShutdownSignal};
use crate::types::{FlowControlSettings, MessageMetadata, Partition, SubscriptionPath};
use crate::{Error, Result};

/// Tuning for a subscriber session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberSettings {
    /// Per-partition outstanding budget. The message budget is also the
    /// delivery channel capacity.
    pub flow_control: FlowControlSettings,
    /// Worker count; `None` means num_cpus * 2.
    pub workers: Option<usize>,
    /// Maximum messages requested per pull.
    pub pull_batch_size: usize,
    /// Pause after an empty pull.
    pub pull_interval: Duration,
    /// Acks sent per acknowledge call.
    pub ack_batch_size: usize,
    /// Maximum delay before pending acks are sent.
    pub ack_flush_interval: Duration,
}

impl Default for SubscriberSettings {
    fn default() -> Self {
        Self {
            flow_control: FlowControlSettings::default(),
            workers: None,
            pull_batch_size: 100,
            pull_interval: Duration::from_millis(500),
            ack_batch_size: 100,
            ack_flush_interval: Duration::from_millis(100),
        }
    }
}

/// Why a session stopped.
#[derive(Debug)]
pub enum StopReason {
    /// The run timeout elapsed.
    Timeout,
    /// A process signal arrived.
    Interrupted(Interrupt),
    /// The session was cancelled through its [`ShutdownSignal`].
    Cancelled,
    /// The session failed.
    Failed(Error),
}

/// Final state of a session, produced once every task has been joined.
#[derive(Debug)]
pub struct SessionEnd {
    /// Subscription the session consumed.
    pub subscription: SubscriptionPath,
    /// Why it stopped.
    pub reason: StopReason,
    /// How long the session ran.
    pub elapsed: Duration,
}

impl SessionEnd {
    /// Whether the session stopped for an expected reason.
    pub fn is_clean(&self) -> bool {
        !matches!(self.reason, StopReason::Failed(_))
    }
}

/// Creates subscriber sessions against a message source.
pub struct SubscriberClient {
    source: Arc<dyn MessageSource>,
    settings: SubscriberSettings,
}

impl SubscriberClient {
    /// Create a client.
    pub fn new(source: Arc<dyn MessageSource>, settings: SubscriberSettings) -> Self {
        Self { source, settings }
    }

    /// Start consuming `subscription`, writing rendered messages to `sink`.
    pub fn subscribe<W>(&self, subscription: SubscriptionPath, sink: OutputSink<W>) -> StreamingPull
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let shutdown = ShutdownSignal::new();
        let session = tokio::spawn(run_session(
            self.source.clone(),
            subscription.clone(),
            self.settings.clone(),
            sink,
            shutdown.clone(),
        ));

        info!(subscription = %subscription, "Subscriber session started");

        StreamingPull {
            subscription,
            shutdown,
            session: Some(session),
            started: Instant::now(),
        }
    }
}

/// Handle on a running session.
pub struct StreamingPull {
    subscription: SubscriptionPath,
    shutdown: ShutdownSignal,
    session: Option<JoinHandle<Result<()>>>,
    started: Instant,
}

enum Wake {
    Timeout,
    Interrupted(Interrupt),
    Ended(std::result::Result<Result<()>, JoinError>),
}

impl StreamingPull {
    /// Signal that cancels the session when triggered.
    pub fn cancel_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Whether the session and all of its tasks have completed.
    pub fn is_finished(&self) -> bool {
        self.session.as_ref().map_or(true, |session| session.is_finished())
    }

    /// Cancel the session and wait until every task has stopped.
    pub async fn cancel(&mut self) -> Result<()> {
        self.shutdown.shutdown();
        match self.session.take() {
            Some(session) => flatten(session.await),
            None => Ok(()),
        }
    }

    /// Run until `timeout` elapses, `interrupt` completes, or the session
    /// ends on its own, then cancel and join it.
    pub async fn stop_after<F>(mut self, timeout: Duration, interrupt: F) -> SessionEnd
    where
        F: Future<Output = Interrupt>,
    {
        let wake = match self.session.as_mut() {
            Some(session) => tokio::select! {
                _ = tokio::time::sleep(timeout) => Wake::Timeout,
                signal = interrupt => Wake::Interrupted(signal),
                joined = session => Wake::Ended(joined),
            },
            None => Wake::Ended(Ok(Ok(()))),
        };

        let reason = match wake {
            Wake::Timeout => {
                info!(timeout_secs = timeout.as_secs_f64(), "Run timeout elapsed, cancelling subscriber");
                self.finish(StopReason::Timeout).await
            }
            Wake::Interrupted(signal) => self.finish(StopReason::Interrupted(signal)).await,
            Wake::Ended(joined) => {
                self.session = None;
                match flatten(joined) {
                    Ok(()) => StopReason::Cancelled,
                    Err(e) => StopReason::Failed(e),
                }
            }
        };

        SessionEnd {
            subscription: self.subscription.clone(),
            reason,
            elapsed: self.started.elapsed(),
        }
    }

    async fn finish(&mut self, reason: StopReason) -> StopReason {
        match self.cancel().await {
            Ok(()) => reason,
            Err(e) => StopReason::Failed(e),
        }
    }
}

fn flatten(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    joined.map_err(|e| Error::Internal(format!("subscriber session panicked: {}", e)))?
}

/// Body of the session task. Returns once every task it spawned has stopped.
async fn run_session<W>(
    source: Arc<dyn MessageSource>,
    subscription: SubscriptionPath,
    settings: SubscriberSettings,
    sink: OutputSink<W>,
    shutdown: ShutdownSignal,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (delivery_tx, delivery_rx) = mpsc::channel(settings.flow_control.messages_outstanding.max(1));
    let (ack_tx, ack_rx) = mpsc::unbounded_channel();

    let acker = tokio::spawn(run_acker(
        source.clone(),
        subscription.clone(),
        ack_rx,
        AckerSettings {
            batch_size: settings.ack_batch_size.max(1),
            flush_interval: settings.ack_flush_interval,
        },
    ));
    let pool = WorkerPool::new(settings.workers, delivery_rx, sink, shutdown.clone());
    let flow = FlowController::new(settings.flow_control);

    let result = pull_loop(
        source.as_ref(),
        &subscription,
        &settings,
        &flow,
        &delivery_tx,
        &ack_tx,
        &shutdown,
    )
    .await;

    if let Err(e) = &result {
        error!(subscription = %subscription, "Subscriber session failed: {}", e);
        shutdown.shutdown();
    }

    drop(delivery_tx);
    drop(ack_tx);
    pool.join().await;
    if let Err(e) = acker.await {
        error!("Acker panicked: {}", e);
    }

    info!(subscription = %subscription, "Subscriber session stopped");
    result
}

/// Pulls into a bounded hold list and forwards every held message whose
/// partition has budget, so one saturated partition does not stall the rest.
async fn pull_loop(
    source: &dyn MessageSource,
    subscription: &SubscriptionPath,
    settings: &SubscriberSettings,
    flow: &FlowController,
    deliveries: &mpsc::Sender<Delivery>,
    acks: &mpsc::UnboundedSender<String>,
    shutdown: &ShutdownSignal,
) -> Result<()> {
    let batch_size = settings.pull_batch_size.max(1);
    let mut held: VecDeque<ReceivedMessage> = VecDeque::new();

    loop {
        if !dispatch_ready(&mut held, flow, deliveries, acks, shutdown).await {
            return Ok(());
        }

        let room = batch_size.saturating_sub(held.len());
        if room == 0 {
            // Hold list is full of blocked partitions; wait on the oldest.
            let Some(received) = held.pop_front() else {
                continue;
            };
            let permit = tokio::select! {
                biased;
                _ = shutdown.wait() => return Ok(()),
                permit = flow.acquire(partition_of(&received), received.message.size()) => permit?,
            };
            if !forward(received, permit, deliveries, acks, shutdown).await {
                return Ok(());
            }
            continue;
        }

        let max_messages = room.min(deliveries.capacity()).max(1);
        let batch = tokio::select! {
            biased;
            _ = shutdown.wait() => return Ok(()),
            batch = source.pull(subscription, max_messages) => batch?,
        };

        if batch.is_empty() {
            tokio::select! {
                biased;
                _ = shutdown.wait() => return Ok(()),
                _ = tokio::time::sleep(settings.pull_interval) => continue,
            }
        }

        debug!(count = batch.len(), held = held.len(), "Pulled messages");
        held.extend(batch);
    }
}

fn partition_of(received: &ReceivedMessage) -> Option<Partition> {
    MessageMetadata::decode(&received.message.message_id)
        .ok()
        .map(|metadata| metadata.partition)
}

/// Forward held messages whose partition has budget now, keeping per-partition
/// order. Returns false once the session is shutting down.
async fn dispatch_ready(
    held: &mut VecDeque<ReceivedMessage>,
    flow: &FlowController,
    deliveries: &mpsc::Sender<Delivery>,
    acks: &mpsc::UnboundedSender<String>,
    shutdown: &ShutdownSignal,
) -> bool {
    let mut blocked = HashSet::new();
    let mut waiting = VecDeque::with_capacity(held.len());

    while let Some(received) = held.pop_front() {
        let partition = partition_of(&received);
        if !blocked.contains(&partition) {
            if let Some(permit) = flow.try_acquire(partition, received.message.size()).await {
                if !forward(received, permit, deliveries, acks, shutdown).await {
                    return false;
                }
                continue;
            }
            blocked.insert(partition);
        }
        waiting.push_back(received);
    }

    *held = waiting;
    true
}

async fn forward(
    received: ReceivedMessage,
    permit: FlowPermit,
    deliveries: &mpsc::Sender<Delivery>,
    acks: &mpsc::UnboundedSender<String>,
    shutdown: &ShutdownSignal,
) -> bool {
    let delivery = Delivery {
        message: received.message,
        ack: AckHandle::new(received.ack_id, acks.clone(), Some(permit)),
    };

    tokio::select! {
        biased;
        _ = shutdown.wait() => false,
        sent = deliveries.send(delivery) => sent.is_ok(),
    }
}
