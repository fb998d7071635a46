// Seek command implementation
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::admin::{AdminClient, RestAdminClient, SeekIssuer, SeekReport, SeekTarget};
use crate::auth::{Credentials, TokenSource};
use crate::cli::output::{print_error, print_info, print_success, print_warning};
use crate::cli::SeekArgs;
use crate::config::TxlogConfig;
use crate::types::SubscriptionPath;

/// Execute the seek command - registers one seek and prints its operation
pub async fn execute(args: SeekArgs, config: TxlogConfig) -> Result<()> {
    let subscription = SubscriptionPath::parse(&args.subscription_path)
        .with_context(|| format!("Invalid subscription path '{}'", args.subscription_path))?;

    let target = match SeekTarget::resolve(&args.timestamp_type, args.timestamp.as_deref()) {
        Ok(target) => target,
        Err(e) => {
            report(&SeekReport::InvalidInput(e));
            return Ok(());
        }
    };

    let credentials = Credentials::from_env().context("Failed to load credentials")?;
    let tokens = Arc::new(TokenSource::new(credentials));
    let admin = match &config.admin.endpoint {
        Some(endpoint) => RestAdminClient::with_endpoint(endpoint.clone(), tokens)?,
        None => RestAdminClient::for_region(subscription.region(), tokens)?,
    };

    let outcome = seek(&admin, &subscription, target)
        .await
        .with_context(|| format!("Seek on {} failed", subscription))?;
    report(&outcome);
    Ok(())
}

/// Announce and issue one seek.
pub async fn seek(
    admin: &dyn AdminClient,
    subscription: &SubscriptionPath,
    target: SeekTarget,
) -> crate::Result<SeekReport> {
    print_info(&format!("try to move seek cursor to {}", target));
    SeekIssuer::new(admin).seek(subscription, target).await
}

fn report(outcome: &SeekReport) {
    let message = outcome.to_string();
    match outcome {
        SeekReport::Registered { .. } => print_success(&message),
        SeekReport::NotFound(_) => print_warning(&message),
        SeekReport::InvalidInput(e) => {
            tracing::debug!("Rejected seek input: {}", e);
            print_error(&message)
        }
    }
}
