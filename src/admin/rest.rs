//! Pub/Sub Lite admin REST client.
//!
//! `POST {endpoint}/v1/admin/projects/{p}/locations/{l}/subscriptions/{s}:seek`
//! where the default endpoint is `https://{region}-pubsublite.googleapis.com`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::debug;

use super::{AdminClient, SeekOperation, SeekTarget};
use crate::auth::TokenSource;
use crate::types::{CloudRegion, SubscriptionPath};
use crate::{Error, Result};

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Seek request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SeekSubscriptionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    named_target: Option<NamedTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_target: Option<TimeTarget>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum NamedTarget {
    Head,
    Tail,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum TimeTarget {
    PublishTime(String),
    EventTime(String),
}

impl From<SeekTarget> for SeekSubscriptionRequest {
    fn from(target: SeekTarget) -> Self {
        let (named_target, time_target) = match target {
            SeekTarget::Beginning => (Some(NamedTarget::Head), None),
            SeekTarget::End => (Some(NamedTarget::Tail), None),
            SeekTarget::PublishTime(ts) => (None, Some(TimeTarget::PublishTime(rfc3339(ts)))),
            SeekTarget::EventTime(ts) => (None, Some(TimeTarget::EventTime(rfc3339(ts)))),
        };
        Self {
            named_target,
            time_target,
        }
    }
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Admin client over REST.
pub struct RestAdminClient {
    client: Client,
    endpoint: String,
    tokens: Arc<TokenSource>,
}

impl RestAdminClient {
    /// Client for the regional endpoint of `region`.
    pub fn for_region(region: &CloudRegion, tokens: Arc<TokenSource>) -> Result<Self> {
        Self::with_endpoint(format!("https://{}-pubsublite.googleapis.com", region), tokens)
    }

    /// Client for an explicit endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>, tokens: Arc<TokenSource>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(format!("txlog/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// Base endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn seek_url(&self, subscription: &SubscriptionPath) -> String {
        format!("{}/v1/admin/{}:seek", self.endpoint, subscription)
    }
}

#[async_trait]
impl AdminClient for RestAdminClient {
    async fn seek_subscription(
        &self,
        subscription: &SubscriptionPath,
        target: SeekTarget,
    ) -> Result<SeekOperation> {
        let url = self.seek_url(subscription);
        debug!(url = %url, "Sending seek request");

        let request = self
            .client
            .post(&url)
            .json(&SeekSubscriptionRequest::from(target));
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

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn body(target: SeekTarget) -> serde_json::Value {
        serde_json::to_value(SeekSubscriptionRequest::from(target)).unwrap()
    }

    #[test]
    fn test_named_target_bodies() {
        assert_eq!(body(SeekTarget::Beginning), json!({"namedTarget": "HEAD"}));
        assert_eq!(body(SeekTarget::End), json!({"namedTarget": "TAIL"}));
    }

    #[test]
    fn test_time_target_bodies() {
        let ts = Utc.with_ymd_and_hms(2022, 2, 2, 15, 40, 0).unwrap();
        assert_eq!(
            body(SeekTarget::PublishTime(ts)),
            json!({"timeTarget": {"publishTime": "2022-02-02T15:40:00Z"}})
        );
        assert_eq!(
            body(SeekTarget::EventTime(ts + chrono::Duration::milliseconds(5))),
            json!({"timeTarget": {"eventTime": "2022-02-02T15:40:00.005Z"}})
        );
    }

    #[test]
    fn test_regional_endpoint() {
        let path = SubscriptionPath::parse("projects/123/locations/us-west1-a/subscriptions/txlog").unwrap();
        let client = RestAdminClient::for_region(path.region(), Arc::new(TokenSource::anonymous())).unwrap();

        assert_eq!(client.endpoint(), "https://us-west1-pubsublite.googleapis.com");
        assert_eq!(
            client.seek_url(&path),
            "https://us-west1-pubsublite.googleapis.com/v1/admin/projects/123/locations/us-west1-a/subscriptions/txlog:seek"
        );
    }
}
