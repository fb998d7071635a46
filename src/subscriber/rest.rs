//! Pub/Sub-compatible REST pull source.
//!
//! ## Endpoints
//! - `POST {endpoint}/v1/projects/{project}/subscriptions/{subscription}:pull`
//! - `POST {endpoint}/v1/projects/{project}/subscriptions/{subscription}:acknowledge`
//!
//! The zonal path is sent with its location dropped, so the endpoint must
//! serve Lite-style message ids (JSON `{"partition", "offset"}`). A classic
//! Pub/Sub subscription of the same name hands out numeric ids instead. Those
//! fail to decode, the handler never acks them, and the service redelivers
//! them until they expire.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{MessageSource, ReceivedMessage};
use crate::auth::TokenSource;
use crate::types::{InboundMessage, SubscriptionPath};
use crate::{Error, Result};

/// Environment variable pointing at a local emulator (`host:port`).
pub const EMULATOR_HOST_ENV: &str = "PUBSUB_EMULATOR_HOST";

const PULL_TIMEOUT_SECS: u64 = 90;

/// Request for pulling messages.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    max_messages: usize,
    return_immediately: bool,
}

/// Response for pulling messages.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<WireReceivedMessage>,
}

/// A received message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReceivedMessage {
    ack_id: String,
    message: WireMessage,
}

/// A Pub/Sub message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(default, with = "base64")]
    data: Vec<u8>,
    #[serde(default)]
    attributes: HashMap<String, String>,
    #[serde(default)]
    message_id: String,
    #[serde(default)]
    publish_time: Option<DateTime<Utc>>,
}

impl From<WireReceivedMessage> for ReceivedMessage {
    fn from(received: WireReceivedMessage) -> Self {
        ReceivedMessage {
            ack_id: received.ack_id,
            message: InboundMessage {
                message_id: received.message.message_id,
                attributes: received.message.attributes,
                data: received.message.data,
                publish_time: received.message.publish_time,
            },
        }
    }
}

/// Request for acknowledging messages.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcknowledgeRequest<'a> {
    ack_ids: &'a [String],
}

// Base64 decoding helper
mod base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)
    }
}

/// Message source speaking the Pub/Sub REST pull API.
pub struct RestMessageSource {
    client: Client,
    endpoint: String,
    tokens: Arc<TokenSource>,
}

impl RestMessageSource {
    /// Create a source for `endpoint` (e.g. `https://pubsub.googleapis.com`).
    pub fn new(endpoint: impl Into<String>, tokens: Arc<TokenSource>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(PULL_TIMEOUT_SECS))
            .user_agent(format!("txlog/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// Source for the emulator named by `PUBSUB_EMULATOR_HOST`, if set.
    pub fn from_emulator_env() -> Result<Option<Self>> {
        match std::env::var(EMULATOR_HOST_ENV) {
            Ok(host) if !host.trim().is_empty() => Ok(Some(Self::new(
                format!("http://{}", host.trim()),
                Arc::new(TokenSource::anonymous()),
            )?)),
            _ => Ok(None),
        }
    }

    /// Base endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, subscription: &SubscriptionPath, method: &str) -> String {
        format!(
            "{}/v1/{}:{}",
            self.endpoint,
            subscription.pull_resource(),
            method
        )
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        subscription: &SubscriptionPath,
        method: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        let request = self.client.post(self.url(subscription, method)).json(body);
        let response = self.tokens.authorize(request).await?.send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::SubscriptionNotFound(subscription.to_string()));
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl MessageSource for RestMessageSource {
    async fn pull(
        &self,
        subscription: &SubscriptionPath,
        max_messages: usize,
    ) -> Result<Vec<ReceivedMessage>> {
        let request = PullRequest {
            max_messages,
            return_immediately: false,
        };

        let response: PullResponse = self.post(subscription, "pull", &request).await?.json().await?;
        debug!(count = response.received_messages.len(), "Pull returned");

        Ok(response
            .received_messages
            .into_iter()
            .map(ReceivedMessage::from)
            .collect())
    }

    async fn acknowledge(&self, subscription: &SubscriptionPath, ack_ids: &[String]) -> Result<()> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        self.post(subscription, "acknowledge", &AcknowledgeRequest { ack_ids })
            .await?;
        Ok(())
    }
}
