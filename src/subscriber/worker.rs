//! Worker pool draining the delivery channel.

use std::sync::Arc;

use chrono::Local;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::handler::handle_delivery;
use super::sink::OutputSink;
use super::Delivery;
use crate::core::shutdown::ShutdownSignal;

/// Fixed pool of workers handling deliveries concurrently.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `num_workers` workers (default: num_cpus * 2).
    ///
    /// Workers stop when the channel closes or `shutdown` fires. A worker
    /// finishes the delivery it holds; queued deliveries are dropped un-acked.
    pub fn new<W>(
        num_workers: Option<usize>,
        deliveries: mpsc::Receiver<Delivery>,
        sink: OutputSink<W>,
        shutdown: ShutdownSignal,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let num_workers = num_workers.unwrap_or_else(|| num_cpus::get() * 2).max(1);
        let deliveries = Arc::new(Mutex::new(deliveries));

        let workers = (0..num_workers)
            .map(|id| spawn_worker(id, deliveries.clone(), sink.clone(), shutdown.clone()))
            .collect();

        info!("Started subscriber worker pool with {} workers", num_workers);

        Self { workers }
    }

    /// Number of workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether the pool has no workers.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every worker to stop.
    pub async fn join(self) {
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("Subscriber worker panicked: {}", e);
            }
        }
        debug!("Subscriber worker pool stopped");
    }
}

/// Spawn a single worker.
fn spawn_worker<W>(
    id: usize,
    deliveries: Arc<Mutex<mpsc::Receiver<Delivery>>>,
    sink: OutputSink<W>,
    shutdown: ShutdownSignal,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        debug!("Subscriber worker {} started", id);

        loop {
            let delivery = {
                let mut deliveries = deliveries.lock().await;
                tokio::select! {
                    biased;
                    _ = shutdown.wait() => None,
                    delivery = deliveries.recv() => delivery,
                }
            };

            match delivery {
                Some(delivery) => process(id, delivery, &sink).await,
                None => break,
            }
        }

        debug!("Subscriber worker {} stopped", id);
    })
}

/// Handle one delivery and emit its block.
async fn process<W>(id: usize, delivery: Delivery, sink: &OutputSink<W>)
where
    W: AsyncWrite + Unpin + Send,
{
    let message_id = delivery.message.message_id.clone();

    match handle_delivery(delivery, Local::now()) {
        Ok(block) => {
            debug!(worker = id, message_id = %message_id, "Handled message");
            if let Err(e) = sink.emit(&block).await {
                error!(message_id = %message_id, "Failed to write message: {}", e);
            }
        }
        Err(e) => {
            warn!(
                worker = id,
                message_id = %message_id,
                "Message handler failed, leaving message un-acked: {}",
                e
            );
        }
    }
}
