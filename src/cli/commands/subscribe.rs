// Subscribe command implementation
use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::AsyncWrite;
use tracing::{info, warn};

use crate::auth::{Credentials, TokenSource};
use crate::cli::SubscribeArgs;
use crate::config::TxlogConfig;
use crate::core::shutdown::{wait_for_signal, Interrupt};
use crate::subscriber::rest::RestMessageSource;
use crate::subscriber::{MessageSource, OutputSink, SessionEnd, StopReason, SubscriberClient};
use crate::types::SubscriptionPath;

/// Execute the subscribe command - prints transaction events until the
/// timeout elapses or the process is interrupted
pub async fn execute(args: SubscribeArgs, config: TxlogConfig) -> Result<()> {
    config.validate().context("Invalid subscriber configuration")?;

    let subscription = SubscriptionPath::parse(&args.subscription_path)
        .with_context(|| format!("Invalid subscription path '{}'", args.subscription_path))?;

    let source: Arc<dyn MessageSource> = match RestMessageSource::from_emulator_env()? {
        Some(source) => {
            info!(endpoint = %source.endpoint(), "Using Pub/Sub emulator");
            Arc::new(source)
        }
        None => {
            let credentials = Credentials::from_env().context("Failed to load credentials")?;
            let tokens = Arc::new(TokenSource::new(credentials));
            Arc::new(RestMessageSource::new(config.subscriber.endpoint.clone(), tokens)?)
        }
    };

    println!("Listening for transaction events on {}...", subscription);

    let end = run(source, subscription, &config, OutputSink::stdout(), wait_for_signal()).await;
    match end.reason {
        StopReason::Failed(e) => Err(anyhow::Error::new(e).context("Subscriber session failed")),
        reason => {
            info!(
                subscription = %end.subscription,
                elapsed_secs = end.elapsed.as_secs_f64(),
                "Subscriber stopped: {:?}",
                reason
            );
            Ok(())
        }
    }
}

/// Run one session against `source` until the configured timeout, an
/// interrupt, or a session failure.
pub async fn run<W, F>(
    source: Arc<dyn MessageSource>,
    subscription: SubscriptionPath,
    config: &TxlogConfig,
    sink: OutputSink<W>,
    interrupt: F,
) -> SessionEnd
where
    W: AsyncWrite + Unpin + Send + 'static,
    F: Future<Output = Interrupt>,
{
    let client = SubscriberClient::new(source, config.subscriber.settings.clone());
    let session = client.subscribe(subscription, sink);
    let end = session.stop_after(config.timeout(), interrupt).await;

    if let StopReason::Failed(e) = &end.reason {
        warn!(subscription = %end.subscription, "Session ended with error: {}", e);
    }
    end
}
