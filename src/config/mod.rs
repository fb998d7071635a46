//! Configuration system for txlog.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

use crate::subscriber::SubscriberSettings;
use crate::types::FlowControlSettings;
use crate::Error;

/// Default run timeout of the subscribe command, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 90;

/// Default Pub/Sub REST endpoint.
pub const DEFAULT_PULL_ENDPOINT: &str = "https://pubsub.googleapis.com";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxlogConfig {
    /// Subscriber configuration.
    pub subscriber: SubscriberConfig,
    /// Admin configuration.
    pub admin: AdminConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Subscriber configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// Pull endpoint.
    pub endpoint: String,
    /// Run timeout in seconds.
    pub timeout_secs: u64,
    /// Session tuning.
    pub settings: SubscriberSettings,
}

/// Admin configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Endpoint override; the regional endpoint is used when unset.
    pub endpoint: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    pub level: String,
    /// Log format (text or json).
    pub format: LogFormat,
}

/// Log format enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text format.
    Text,
    /// JSON format.
    Json,
}

impl Default for TxlogConfig {
    fn default() -> Self {
        Self {
            subscriber: SubscriberConfig {
                endpoint: DEFAULT_PULL_ENDPOINT.to_string(),
                timeout_secs: DEFAULT_TIMEOUT_SECS,
                settings: SubscriberSettings::default(),
            },
            admin: AdminConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Text,
            },
        }
    }
}

impl LoggingConfig {
    /// Install the global tracing subscriber on stderr. `RUST_LOG` wins over
    /// the configured level.
    pub fn init_tracing(&self) -> crate::Result<()> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .map_err(|e| Error::Config(format!("invalid log level '{}': {}", self.level, e)))?;
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr);
        let installed = match self.format {
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Text => builder.compact().try_init(),
        };
        installed.map_err(|e| Error::Config(format!("failed to initialize logging: {}", e)))
    }
}

impl TxlogConfig {
    /// Run timeout of the subscribe command.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.subscriber.timeout_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        let settings = &self.subscriber.settings;
        let FlowControlSettings {
            messages_outstanding,
            bytes_outstanding,
        } = settings.flow_control;

        if messages_outstanding == 0 {
            return Err(Error::Config(
                "max outstanding messages must be greater than 0".to_string(),
            ));
        }
        if bytes_outstanding == 0 {
            return Err(Error::Config(
                "max outstanding bytes must be greater than 0".to_string(),
            ));
        }
        if messages_outstanding > Semaphore::MAX_PERMITS {
            return Err(Error::Config(format!(
                "max outstanding messages must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if bytes_outstanding > u32::MAX as usize {
            return Err(Error::Config(format!(
                "max outstanding bytes must be at most {}",
                u32::MAX
            )));
        }
        if settings.workers == Some(0) {
            return Err(Error::Config("workers must be greater than 0".to_string()));
        }
        if settings.pull_batch_size == 0 || settings.ack_batch_size == 0 {
            return Err(Error::Config("batch sizes must be greater than 0".to_string()));
        }
        if self.subscriber.endpoint.trim().is_empty() {
            return Err(Error::Config("pull endpoint must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TxlogConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(90));
        assert_eq!(config.subscriber.settings.flow_control.messages_outstanding, 1000);
        assert_eq!(
            config.subscriber.settings.flow_control.bytes_outstanding,
            10 * 1024 * 1024
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_budgets() {
        let mut config = TxlogConfig::default();
        config.subscriber.settings.flow_control.messages_outstanding = 0;
        assert!(config.validate().is_err());

        let mut config = TxlogConfig::default();
        config.subscriber.settings.workers = Some(0);
        assert!(config.validate().is_err());

        let mut config = TxlogConfig::default();
        config.subscriber.settings.pull_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_budgets() {
        let mut config = TxlogConfig::default();
        config.subscriber.settings.flow_control.messages_outstanding = Semaphore::MAX_PERMITS;
        assert!(config.validate().is_ok());
        config.subscriber.settings.flow_control.messages_outstanding = Semaphore::MAX_PERMITS + 1;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = TxlogConfig::default();
        config.subscriber.settings.flow_control.bytes_outstanding = u32::MAX as usize;
        assert!(config.validate().is_ok());
        config.subscriber.settings.flow_control.bytes_outstanding = usize::MAX;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_log_level_is_config_error() {
        std::env::remove_var("RUST_LOG");
        let logging = LoggingConfig {
            level: "txlog=verbose".to_string(),
            format: LogFormat::Text,
        };
        assert!(matches!(logging.init_tracing(), Err(Error::Config(_))));
    }

    #[test]
    fn test_log_format_serialization() {
        assert_eq!(serde_json::to_string(&LogFormat::Json).unwrap(), "\"json\"");
    }
}
