//! Out-of-band seek of a subscription's read cursor.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SeekTargetError;
use crate::types::SubscriptionPath;
use crate::{Error, Result};

pub mod rest;

pub use rest::RestAdminClient;

/// Accepted timestamp layouts; fractional seconds are optional.
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Where to move a subscription's cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeekTarget {
    /// Oldest retained message.
    Beginning,
    /// Past all currently published messages.
    End,
    /// First message published at or after the timestamp.
    PublishTime(DateTime<Utc>),
    /// First message with event time at or after the timestamp.
    EventTime(DateTime<Utc>),
}

impl SeekTarget {
    /// Resolve a `BEGIN|END|PUBLISH|EVENT` token and optional timestamp.
    ///
    /// `BEGIN` and `END` ignore the timestamp.
    pub fn resolve(timestamp_type: &str, timestamp: Option<&str>) -> std::result::Result<Self, SeekTargetError> {
        match timestamp_type {
            "BEGIN" => Ok(SeekTarget::Beginning),
            "END" => Ok(SeekTarget::End),
            "PUBLISH" | "EVENT" => {
                let raw = timestamp
                    .ok_or_else(|| SeekTargetError::MissingTimestamp(timestamp_type.to_string()))?;
                let ts = parse_timestamp(raw)?;
                if timestamp_type == "PUBLISH" {
                    Ok(SeekTarget::PublishTime(ts))
                } else {
                    Ok(SeekTarget::EventTime(ts))
                }
            }
            other => Err(SeekTargetError::InvalidTimestampType(other.to_string())),
        }
    }
}

impl fmt::Display for SeekTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeekTarget::Beginning => write!(f, "Beginning"),
            SeekTarget::End => write!(f, "End"),
            SeekTarget::PublishTime(ts) => write!(f, "PublishTime({})", ts),
            SeekTarget::EventTime(ts) => write!(f, "EventTime({})", ts),
        }
    }
}

/// Parse `YYYY-MM-DD HH:MM:SS[.fff]` as a time in the local time zone.
pub fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, SeekTargetError> {
    parse_timestamp_in(raw, &Local)
}

/// Parse `YYYY-MM-DD HH:MM:SS[.fff]` as a wall-clock time in `tz`.
///
/// Wall-clock times skipped or repeated by a DST transition are rejected.
pub fn parse_timestamp_in<Tz: TimeZone>(
    raw: &str,
    tz: &Tz,
) -> std::result::Result<DateTime<Utc>, SeekTargetError> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .and_then(|naive| tz.from_local_datetime(&naive).single())
        .map(|ts| ts.with_timezone(&Utc))
        .ok_or_else(|| SeekTargetError::InvalidTimestamp(raw.to_string()))
}

/// Handle on the asynchronous seek propagation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeekOperation {
    /// Operation name.
    pub name: String,
    /// Opaque operation metadata, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Administrative plane of the subscription service.
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Register a seek. Returns once the request is accepted; the cursor
    /// moves on live sessions later.
    async fn seek_subscription(
        &self,
        subscription: &SubscriptionPath,
        target: SeekTarget,
    ) -> Result<SeekOperation>;
}

/// Result of one seek attempt as reported to the user.
#[derive(Debug)]
pub enum SeekReport {
    /// Seek registered.
    Registered {
        /// Requested target.
        target: SeekTarget,
        /// Propagation handle.
        operation: SeekOperation,
    },
    /// Subscription does not exist.
    NotFound(SubscriptionPath),
    /// Input could not be resolved; nothing was sent.
    InvalidInput(SeekTargetError),
}

impl fmt::Display for SeekReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeekReport::Registered { operation, .. } => write!(f, "Seek operation: {}", operation.name),
            SeekReport::NotFound(path) => write!(f, "{} not found.", path),
            SeekReport::InvalidInput(_) => write!(f, "invalid input timestamp, see --help"),
        }
    }
}

/// Resolves seek input and issues one request.
pub struct SeekIssuer<'a> {
    admin: &'a dyn AdminClient,
}

impl<'a> SeekIssuer<'a> {
    /// Create an issuer over an admin client.
    pub fn new(admin: &'a dyn AdminClient) -> Self {
        Self { admin }
    }

    /// Resolve the target and seek. Invalid input returns before any request.
    pub async fn issue(
        &self,
        subscription: &SubscriptionPath,
        timestamp_type: &str,
        timestamp: Option<&str>,
    ) -> Result<SeekReport> {
        let target = match SeekTarget::resolve(timestamp_type, timestamp) {
            Ok(target) => target,
            Err(e) => return Ok(SeekReport::InvalidInput(e)),
        };

        self.seek(subscription, target).await
    }

    /// Seek to an already resolved target.
    pub async fn seek(&self, subscription: &SubscriptionPath, target: SeekTarget) -> Result<SeekReport> {
        info!(subscription = %subscription, target = %target, "Issuing seek");

        match self.admin.seek_subscription(subscription, target).await {
            Ok(operation) => Ok(SeekReport::Registered { target, operation }),
            Err(Error::SubscriptionNotFound(_)) => Ok(SeekReport::NotFound(subscription.clone())),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_resolve_symbolic_targets() {
        assert_eq!(SeekTarget::resolve("BEGIN", None), Ok(SeekTarget::Beginning));
        assert_eq!(SeekTarget::resolve("BEGIN", Some("garbage")), Ok(SeekTarget::Beginning));
        assert_eq!(SeekTarget::resolve("END", None), Ok(SeekTarget::End));
    }

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_resolve_publish_time() {
        let target = SeekTarget::resolve("PUBLISH", Some("2022-02-02 15:40:00")).unwrap();
        assert_eq!(target, SeekTarget::PublishTime(local(2022, 2, 2, 15, 40, 0)));
    }

    #[test]
    fn test_resolve_event_time_with_fraction() {
        let target = SeekTarget::resolve("EVENT", Some("2011-11-04 00:05:23.283")).unwrap();
        let expected = local(2011, 11, 4, 0, 5, 23) + chrono::Duration::milliseconds(283);
        assert_eq!(target, SeekTarget::EventTime(expected));

        let iso = SeekTarget::resolve("EVENT", Some("2011-11-04T00:05:23")).unwrap();
        assert_eq!(iso, SeekTarget::EventTime(local(2011, 11, 4, 0, 5, 23)));
    }

    #[test]
    fn test_timestamp_uses_wall_clock_of_zone() {
        let los_angeles = FixedOffset::west_opt(8 * 3600).unwrap();
        assert_eq!(
            parse_timestamp_in("2022-02-02 15:40:00", &los_angeles),
            Ok(Utc.with_ymd_and_hms(2022, 2, 2, 23, 40, 0).unwrap())
        );
        assert_eq!(
            parse_timestamp_in("2022-02-02 15:40:00", &Utc),
            Ok(Utc.with_ymd_and_hms(2022, 2, 2, 15, 40, 0).unwrap())
        );

        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        assert_eq!(
            parse_timestamp_in("2022-02-02T09:00:00.5", &tokyo),
            Ok(Utc.with_ymd_and_hms(2022, 2, 2, 0, 0, 0).unwrap() + chrono::Duration::milliseconds(500))
        );
    }

    #[test]
    fn test_resolve_failures_are_distinct() {
        assert_eq!(
            SeekTarget::resolve("LATEST", None),
            Err(SeekTargetError::InvalidTimestampType("LATEST".to_string()))
        );
        assert_eq!(
            SeekTarget::resolve("PUBLISH", None),
            Err(SeekTargetError::MissingTimestamp("PUBLISH".to_string()))
        );
        assert_eq!(
            SeekTarget::resolve("EVENT", Some("02/02/2022")),
            Err(SeekTargetError::InvalidTimestamp("02/02/2022".to_string()))
        );
        assert!(SeekTarget::resolve("begin", None).is_err());
    }

    #[test]
    fn test_report_messages() {
        let path = SubscriptionPath::parse("projects/123/locations/us-west1-a/subscriptions/gone").unwrap();
        assert_eq!(
            SeekReport::NotFound(path).to_string(),
            "projects/123/locations/us-west1-a/subscriptions/gone not found."
        );
        assert_eq!(
            SeekReport::InvalidInput(SeekTargetError::InvalidTimestamp("x".to_string())).to_string(),
            "invalid input timestamp, see --help"
        );
        let registered = SeekReport::Registered {
            target: SeekTarget::End,
            operation: SeekOperation {
                name: "projects/123/locations/us-west1/operations/op-1".to_string(),
                metadata: None,
            },
        };
        assert_eq!(
            registered.to_string(),
            "Seek operation: projects/123/locations/us-west1/operations/op-1"
        );
    }
}
