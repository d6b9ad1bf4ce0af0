//! repoint Lambda function
//!
//! Subscribed to RDS cluster failover events. Settings come from the same
//! `REPOINT_*` environment variables the CLI reads.

use clap::Parser;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use repoint::cli::{init_logging, ConfigArgs, LogArgs};
use repoint::{handle_notification_with_cancel, InvocationResponse, RdsControlPlane};
use repoint_core::ReconciliationDriver;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Time kept back from the invocation deadline to report the outcome
const DEADLINE_MARGIN: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "repoint-lambda")]
struct LambdaArgs {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(flatten)]
    log: LogArgs,
}

/// Time left before the host kills the invocation, minus the margin
fn remaining_budget(deadline_ms: u64) -> Duration {
    let deadline = UNIX_EPOCH + Duration::from_millis(deadline_ms);
    deadline
        .duration_since(SystemTime::now())
        .unwrap_or_default()
        .saturating_sub(DEADLINE_MARGIN)
}

async fn function_handler(
    driver: &ReconciliationDriver,
    event: LambdaEvent<Value>,
) -> Result<InvocationResponse, Error> {
    let raw = serde_json::to_vec(&event.payload)?;

    let cancel = CancellationToken::new();
    let budget = remaining_budget(event.context.deadline);
    let on_deadline = cancel.clone();
    let watchdog = tokio::spawn(async move {
        tokio::time::sleep(budget).await;
        warn!(budget = ?budget, "Invocation deadline approaching, cancelling");
        on_deadline.cancel();
    });

    let invocation = handle_notification_with_cancel(driver, &raw, cancel).await;
    watchdog.abort();

    let response = invocation.response();
    info!(
        request_id = %event.context.request_id,
        signal = response.signal,
        outcome = %response.outcome,
        "Invocation finished"
    );

    // An aborted run changed nothing, so a platform retry is safe
    if invocation.is_aborted() {
        let message = response
            .error
            .unwrap_or_else(|| format!("reconciliation {}", response.outcome));
        error!(error = %message, "Reconciliation did not reassign the endpoint");
        return Err(message.into());
    }
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = LambdaArgs::parse();
    init_logging(&args.log)?;

    let config = args.config.to_config()?;
    let control_plane = Arc::new(RdsControlPlane::from_config(&config).await?);
    let driver = Arc::new(ReconciliationDriver::new(
        config,
        control_plane.clone(),
        control_plane,
    )?);

    run(service_fn(move |event: LambdaEvent<Value>| {
        let driver = driver.clone();
        async move { function_handler(&driver, event).await }
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_budget_keeps_margin() {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let budget = remaining_budget(now_ms + 60_000);
        assert!(budget <= Duration::from_secs(58));
        assert!(budget > Duration::from_secs(50));
    }

    #[test]
    fn test_past_deadline_has_no_budget() {
        assert_eq!(remaining_budget(0), Duration::ZERO);
    }
}
