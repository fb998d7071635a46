//! Error types for txlog.

use thiserror::Error;

/// Result type for txlog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for txlog.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Subscription not found.
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// Subscription already exists.
    #[error("Subscription already exists: {0}")]
    SubscriptionAlreadyExists(String),

    /// Message id that does not encode partition metadata.
    #[error("Invalid message id: {0}")]
    InvalidMessageId(String),

    /// Expected message attribute is absent.
    #[error("Missing message attribute: {0}")]
    MissingAttribute(String),

    /// Credential loading or token exchange failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Remote API answered with a failure.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or message.
        message: String,
    },

    /// Transport-level failure talking to a collaborator.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Validation error types.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Subscription path does not have the expected shape.
    #[error("Invalid subscription path: {0}")]
    InvalidSubscriptionPath(String),

    /// Invalid project number or id.
    #[error("Invalid project: {0}")]
    InvalidProject(String),

    /// Invalid region or zone.
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    /// Invalid subscription ID.
    #[error("Invalid subscription ID: {0}")]
    InvalidSubscriptionId(String),

    /// Invalid seek target input.
    #[error(transparent)]
    SeekTarget(#[from] SeekTargetError),
}

/// Reasons a seek target specifier cannot be resolved.
///
/// The CLI reports all of them with one combined message; the variants stay
/// distinct so callers can tell them apart.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeekTargetError {
    /// Token is not one of BEGIN, END, PUBLISH, EVENT.
    #[error("invalid timestamp type: {0}")]
    InvalidTimestampType(String),

    /// PUBLISH or EVENT was given without a timestamp.
    #[error("timestamp is required for {0}")]
    MissingTimestamp(String),

    /// Timestamp is not `YYYY-MM-DD HH:MM:SS[.fff]`.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

impl From<SeekTargetError> for Error {
    fn from(err: SeekTargetError) -> Self {
        Error::Validation(ValidationError::SeekTarget(err))
    }
}
