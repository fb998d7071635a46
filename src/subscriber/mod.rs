//! Transaction event consumer pipeline.
//!
//! A pull loop leases messages from a [`MessageSource`], charges them against
//! per-partition flow control, and hands them to a fixed worker pool through a
//! bounded channel. Workers render each message, acknowledge it, and write the
//! rendered block to a shared [`OutputSink`].

use async_trait::async_trait;

use crate::types::{InboundMessage, SubscriptionPath};
use crate::Result;

pub mod ack;
pub mod flow_control;
pub mod handler;
pub mod rest;
pub mod sink;
pub mod streaming;
pub mod worker;

pub use ack::AckHandle;
pub use flow_control::{FlowController, FlowPermit};
pub use sink::OutputSink;
pub use streaming::{SessionEnd, StopReason, StreamingPull, SubscriberClient, SubscriberSettings};

/// A leased message together with its ack id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Lease token used to acknowledge the message.
    pub ack_id: String,
    /// The message.
    pub message: InboundMessage,
}

/// A message handed to a worker.
#[derive(Debug)]
pub struct Delivery {
    /// The message.
    pub message: InboundMessage,
    /// Acknowledges the message and releases its flow-control permit.
    pub ack: AckHandle,
}

/// Data plane of the subscription service.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Lease up to `max_messages` messages. May wait for messages to arrive;
    /// an empty batch means none were available.
    async fn pull(
        &self,
        subscription: &SubscriptionPath,
        max_messages: usize,
    ) -> Result<Vec<ReceivedMessage>>;

    /// Acknowledge leased messages.
    async fn acknowledge(&self, subscription: &SubscriptionPath, ack_ids: &[String]) -> Result<()>;
}
