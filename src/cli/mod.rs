// CLI module for txlog
/// Command execution handlers
pub mod commands;
/// Output formatting utilities
pub mod output;

use clap::{Args, Parser, Subcommand};

use crate::config::{LogFormat, TxlogConfig, DEFAULT_PULL_ENDPOINT, DEFAULT_TIMEOUT_SECS};

const SEEK_EPILOG: &str = "\
Timestamp types:
  BEGIN    Seek to the oldest retained message. --timestamp is ignored.
  END      Seek past all currently published messages. --timestamp is ignored.
  PUBLISH  Seek to the first message published at or after --timestamp.
  EVENT    Seek to the first message whose event time is at or after --timestamp.

Timestamps are local wall-clock time (the TZ environment variable applies),
formatted YYYY-MM-DD HH:MM:SS with optional fractional seconds, e.g.
\"2022-02-02 15:40:00\" or \"2011-11-04 00:05:23.283\". Times skipped or
repeated by a daylight-saving change are rejected.

The seek is applied asynchronously; subscribers observe the new cursor once
the returned operation completes.";

/// Command-line interface for txlog
#[derive(Parser)]
#[command(name = "txlog")]
#[command(author, version, about = "Transaction event subscriber and seek tool", long_about = None)]
pub struct Cli {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, env = "TXLOG_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format
    #[arg(long, global = true, env = "TXLOG_LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print transaction events received on a subscription
    Subscribe(SubscribeArgs),

    /// Move a subscription's read cursor
    #[command(after_long_help = SEEK_EPILOG)]
    Seek(SeekArgs),
}

/// Arguments of `txlog subscribe`
#[derive(Args, Debug, Clone)]
pub struct SubscribeArgs {
    /// Subscription path: projects/{project}/locations/{location}/subscriptions/{id}
    pub subscription_path: String,

    /// Seconds to listen before stopping
    #[arg(default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Worker count (defaults to twice the CPU count)
    #[arg(long, env = "TXLOG_WORKERS")]
    pub workers: Option<usize>,

    /// Pub/Sub REST endpoint
    #[arg(long, env = "TXLOG_PULL_ENDPOINT", default_value = DEFAULT_PULL_ENDPOINT)]
    pub endpoint: String,

    /// Outstanding message budget per partition
    #[arg(long)]
    pub max_outstanding_messages: Option<usize>,

    /// Outstanding byte budget per partition
    #[arg(long)]
    pub max_outstanding_bytes: Option<usize>,
}

/// Arguments of `txlog seek`
#[derive(Args, Debug, Clone)]
pub struct SeekArgs {
    /// Subscription path: projects/{project}/locations/{location}/subscriptions/{id}
    #[arg(short = 'p', long = "subscription_path")]
    pub subscription_path: String,

    /// One of BEGIN, END, PUBLISH, EVENT
    #[arg(short = 't', long = "timestamp_type")]
    pub timestamp_type: String,

    /// Target time for PUBLISH and EVENT
    #[arg(short = 's', long = "timestamp")]
    pub timestamp: Option<String>,

    /// Admin endpoint (defaults to the subscription's regional endpoint)
    #[arg(long, env = "TXLOG_ADMIN_ENDPOINT")]
    pub endpoint: Option<String>,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Default configuration with the command line applied on top.
    pub fn config(&self) -> TxlogConfig {
        let mut config = TxlogConfig::default();
        config.logging.level = self.log_level.clone();
        config.logging.format = self.log_format;
        match &self.command {
            Commands::Subscribe(args) => args.apply(&mut config),
            Commands::Seek(args) => args.apply(&mut config),
        }
        config
    }
}

impl SubscribeArgs {
    /// Override the subscriber section.
    pub fn apply(&self, config: &mut TxlogConfig) {
        config.subscriber.endpoint = self.endpoint.clone();
        config.subscriber.timeout_secs = self.timeout;
        config.subscriber.settings.workers = self.workers;
        if let Some(messages) = self.max_outstanding_messages {
            config.subscriber.settings.flow_control.messages_outstanding = messages;
        }
        if let Some(bytes) = self.max_outstanding_bytes {
            config.subscriber.settings.flow_control.bytes_outstanding = bytes;
        }
    }
}

impl SeekArgs {
    /// Override the admin section.
    pub fn apply(&self, config: &mut TxlogConfig) {
        if let Some(endpoint) = &self.endpoint {
            config.admin.endpoint = Some(endpoint.clone());
        }
    }
}
