//! Common data types for txlog.

pub mod validation;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result, ValidationError};

/// Attribute carrying the payload encoding.
pub const ATTR_CONTENT_ENCODING: &str = "Content-Encoding";
/// Attribute carrying the number of log lines in the payload.
pub const ATTR_LOG_COUNT: &str = "Log-Count";
/// Attribute carrying the field list of the payload.
pub const ATTR_FIELDS: &str = "Fields";

/// A cloud region such as `us-west1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CloudRegion(String);

impl CloudRegion {
    /// Create a region from its name.
    pub fn new(name: impl Into<String>) -> Self {
        CloudRegion(name.into())
    }

    /// Region name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CloudRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Location of a subscription: a region, or a zone inside a region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    /// Regional subscription.
    Region(CloudRegion),
    /// Zonal subscription.
    Zone {
        /// Parent region.
        region: CloudRegion,
        /// Zone letter.
        zone: char,
    },
}

impl Location {
    /// The region this location lives in.
    pub fn region(&self) -> &CloudRegion {
        match self {
            Location::Region(region) => region,
            Location::Zone { region, .. } => region,
        }
    }

    /// Zone letter, if zonal.
    pub fn zone(&self) -> Option<char> {
        match self {
            Location::Region(_) => None,
            Location::Zone { zone, .. } => Some(*zone),
        }
    }
}

impl FromStr for Location {
    type Err = Error;

    /// Parse `{region-part1}-{region-part2}[-{zone}]`.
    fn from_str(s: &str) -> Result<Self> {
        let tokens: Vec<&str> = s.split('-').collect();
        if tokens.len() < 2 || tokens.len() > 3 || tokens.iter().any(|t| t.is_empty()) {
            return Err(ValidationError::InvalidLocation(format!(
                "Expected <region>-<area>[-<zone>], got '{}'",
                s
            ))
            .into());
        }

        let region = CloudRegion::new(format!("{}-{}", tokens[0], tokens[1]));
        match tokens.get(2) {
            None => Ok(Location::Region(region)),
            Some(zone) => {
                let zone = validation::validate_zone(zone)?;
                Ok(Location::Zone { region, zone })
            }
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Region(region) => write!(f, "{}", region),
            Location::Zone { region, zone } => write!(f, "{}-{}", region, zone),
        }
    }
}

/// Fully qualified subscription name:
/// `projects/{project}/locations/{location}/subscriptions/{subscription}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionPath {
    /// Project number (or project id).
    pub project: String,
    /// Region or zone.
    pub location: Location,
    /// Subscription id.
    pub subscription_id: String,
}

impl SubscriptionPath {
    /// Build a path from its components.
    pub fn new(
        project: impl Into<String>,
        location: Location,
        subscription_id: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            location,
            subscription_id: subscription_id.into(),
        }
    }

    /// Parse a subscription path string.
    pub fn parse(path: &str) -> Result<Self> {
        let parts: Vec<&str> = path.split('/').collect();

        if parts.len() != 6
            || parts[0] != "projects"
            || parts[2] != "locations"
            || parts[4] != "subscriptions"
        {
            return Err(ValidationError::InvalidSubscriptionPath(format!(
                "Expected projects/<project>/locations/<location>/subscriptions/<id>, got '{}'",
                path
            ))
            .into());
        }

        validation::validate_project(parts[1])?;
        let location = parts[3].parse::<Location>()?;
        validation::validate_subscription_id(parts[5])?;

        Ok(Self::new(parts[1], location, parts[5]))
    }

    /// The region hosting the subscription.
    pub fn region(&self) -> &CloudRegion {
        self.location.region()
    }

    /// The zone letter for zonal subscriptions.
    pub fn zone(&self) -> Option<char> {
        self.location.zone()
    }

    /// Short resource name used by Pub/Sub-compatible pull endpoints.
    pub fn pull_resource(&self) -> String {
        format!(
            "projects/{}/subscriptions/{}",
            self.project, self.subscription_id
        )
    }
}

impl FromStr for SubscriptionPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SubscriptionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/locations/{}/subscriptions/{}",
            self.project, self.location, self.subscription_id
        )
    }
}

/// Partition number within a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Partition(pub u64);

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a message within its partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cursor {
    /// Monotonic offset.
    pub offset: i64,
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.offset)
    }
}

/// Partition and cursor encoded into a message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageMetadata {
    /// Source partition.
    pub partition: Partition,
    /// Cursor within the partition.
    pub cursor: Cursor,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EncodedMetadata {
    partition: u64,
    offset: i64,
}

impl MessageMetadata {
    /// Create metadata for a partition offset.
    pub fn new(partition: u64, offset: i64) -> Self {
        Self {
            partition: Partition(partition),
            cursor: Cursor { offset },
        }
    }

    /// Encode as a message id.
    pub fn encode(&self) -> String {
        // Two integers always serialize.
        serde_json::to_string(&EncodedMetadata {
            partition: self.partition.0,
            offset: self.cursor.offset,
        })
        .unwrap_or_default()
    }

    /// Decode a message id produced by [`MessageMetadata::encode`].
    pub fn decode(message_id: &str) -> Result<Self> {
        let encoded: EncodedMetadata = serde_json::from_str(message_id)
            .map_err(|_| Error::InvalidMessageId(message_id.to_string()))?;
        Ok(Self::new(encoded.partition, encoded.offset))
    }
}

/// A message as delivered by the subscription service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    /// Opaque id encoding partition and offset.
    pub message_id: String,
    /// String attributes.
    pub attributes: HashMap<String, String>,
    /// Raw payload.
    pub data: Vec<u8>,
    /// Server publish time, when known.
    pub publish_time: Option<DateTime<Utc>>,
}

impl InboundMessage {
    /// Look up a required attribute.
    pub fn attribute(&self, key: &str) -> Result<&str> {
        self.attributes
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| Error::MissingAttribute(key.to_string()))
    }

    /// Payload size in bytes, used for flow control.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Per-partition flow control budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowControlSettings {
    /// Maximum un-acked messages per partition.
    pub messages_outstanding: usize,
    /// Maximum un-acked payload bytes per partition.
    pub bytes_outstanding: usize,
}

impl Default for FlowControlSettings {
    fn default() -> Self {
        Self {
            messages_outstanding: 1000,
            bytes_outstanding: 10 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_zonal_path() {
        let path =
            SubscriptionPath::parse("projects/123/locations/us-west1-a/subscriptions/my_subscription")
                .unwrap();

        assert_eq!(path.project, "123");
        assert_eq!(path.region().as_str(), "us-west1");
        assert_eq!(path.zone(), Some('a'));
        assert_eq!(path.subscription_id, "my_subscription");
        assert_eq!(
            path.to_string(),
            "projects/123/locations/us-west1-a/subscriptions/my_subscription"
        );
    }

    #[test]
    fn test_parse_regional_path() {
        let path =
            SubscriptionPath::parse("projects/987/locations/europe-west4/subscriptions/txlog").unwrap();

        assert_eq!(path.region().as_str(), "europe-west4");
        assert_eq!(path.zone(), None);
        assert_eq!(
            path.to_string(),
            "projects/987/locations/europe-west4/subscriptions/txlog"
        );
        assert_eq!(path.pull_resource(), "projects/987/subscriptions/txlog");
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        assert!(SubscriptionPath::parse("").is_err());
        assert!(SubscriptionPath::parse("projects/123/subscriptions/sub").is_err());
        assert!(SubscriptionPath::parse("projects/123/regions/us-west1-a/subscriptions/sub").is_err());
        assert!(SubscriptionPath::parse("projects//locations/us-west1-a/subscriptions/sub").is_err());
        assert!(SubscriptionPath::parse("projects/123/locations/uswest1/subscriptions/sub").is_err());
        assert!(SubscriptionPath::parse("projects/123/locations/us-west1-a-b/subscriptions/sub").is_err());
        assert!(SubscriptionPath::parse("projects/123/locations/us-west1-ab/subscriptions/sub").is_err());
        assert!(SubscriptionPath::parse("projects/123/locations/us-west1-a/subscriptions/").is_err());
    }

    #[test]
    fn test_message_metadata_decode() {
        let metadata = MessageMetadata::decode(r#"{"partition": 3, "offset": 1042}"#).unwrap();
        assert_eq!(metadata.partition, Partition(3));
        assert_eq!(metadata.cursor.offset, 1042);

        let encoded = MessageMetadata::new(7, 12).encode();
        assert_eq!(MessageMetadata::decode(&encoded).unwrap(), MessageMetadata::new(7, 12));
    }

    #[test]
    fn test_message_metadata_decode_malformed() {
        assert!(matches!(
            MessageMetadata::decode("not-an-id"),
            Err(Error::InvalidMessageId(_))
        ));
        assert!(MessageMetadata::decode(r#"{"partition": -1, "offset": 1}"#).is_err());
        assert!(MessageMetadata::decode(r#"{"partition": 1}"#).is_err());
    }

    #[test]
    fn test_missing_attribute() {
        let message = InboundMessage::default();
        assert!(matches!(
            message.attribute(ATTR_FIELDS),
            Err(Error::MissingAttribute(key)) if key == "Fields"
        ));
    }
}
