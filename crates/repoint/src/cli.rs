//! Command-line and environment settings shared by both binaries

use anyhow::{Context, Result};
use clap::Args;
use repoint_core::{FailurePolicy, ReconcilerConfig, SelectionOrder};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

/// Reconciler settings
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// AWS region of the cluster
    #[arg(long, env = "REPOINT_REGION", default_value = repoint_core::config::DEFAULT_REGION)]
    pub region: String,

    /// Override the RDS API endpoint
    #[arg(long, env = "REPOINT_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    /// Seconds to wait for the failover to settle before querying
    #[arg(long, env = "REPOINT_SETTLE_DELAY_SECS", default_value = "30")]
    pub settle_delay_secs: u64,

    /// Seconds between endpoint status polls
    #[arg(long, env = "REPOINT_POLL_INTERVAL_SECS", default_value = "5")]
    pub poll_interval_secs: u64,

    /// Give up polling after this many seconds
    #[arg(long, env = "REPOINT_POLL_TIMEOUT_SECS", default_value = "600")]
    pub poll_timeout_secs: u64,

    /// Stage failure handling (fail-fast, best-effort)
    #[arg(long, env = "REPOINT_FAILURE_POLICY", default_value = "fail-fast")]
    pub failure_policy: FailurePolicy,

    /// Tie-break between candidates (listing-order, lexicographic)
    #[arg(long, env = "REPOINT_SELECTION_ORDER", default_value = "lexicographic")]
    pub selection_order: SelectionOrder,
}

impl ConfigArgs {
    /// Build and validate the reconciler configuration
    pub fn to_config(&self) -> Result<ReconcilerConfig> {
        let mut builder = ReconcilerConfig::builder()
            .region(self.region.clone())
            .settle_delay(Duration::from_secs(self.settle_delay_secs))
            .poll_interval(Duration::from_secs(self.poll_interval_secs))
            .poll_timeout(Duration::from_secs(self.poll_timeout_secs))
            .failure_policy(self.failure_policy)
            .selection_order(self.selection_order);
        if let Some(ref url) = self.endpoint_url {
            builder = builder.endpoint_url(url.clone());
        }
        builder.build().context("Invalid reconciler configuration")
    }
}

/// Logging settings
#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: Level,

    /// Enable JSON log format
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

/// Initialize logging subsystem
pub fn init_logging(args: &LogArgs) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Render the effective configuration as YAML
pub fn render_config(config: &ReconcilerConfig) -> Result<String> {
    serde_yaml::to_string(config).context("Failed to render configuration")
}
