//! Reconciler configuration
//!
//! All timing and policy knobs of a reconciliation run live here and are
//! handed to [`ReconciliationDriver`](crate::driver::ReconciliationDriver)
//! by value. Nothing is read from process-wide state.

use crate::error::{ReconcileError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Region used when none is configured
pub const DEFAULT_REGION: &str = "ap-southeast-1";

/// Wait after the notification before querying membership
const DEFAULT_SETTLE_DELAY_SECS: u64 = 30;

/// Wait between endpoint status polls
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Give up polling after this long
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 600;

static REGION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z]{2}(-gov|-iso[a-z]*)?-[a-z]+-[0-9]+$").expect("region regex is valid")
});

fn validate_region(value: &str) -> std::result::Result<(), ValidationError> {
    if REGION_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_region")
            .with_message(format!("'{}' is not a valid region name", value).into()))
    }
}

/// How the driver reacts when a stage fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop at the first failed stage and report it
    #[default]
    FailFast,
    /// Log the failure and carry on with whatever value is at hand
    BestEffort,
}

impl std::str::FromStr for FailurePolicy {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fail-fast" | "failfast" => Ok(FailurePolicy::FailFast),
            "best-effort" | "besteffort" => Ok(FailurePolicy::BestEffort),
            other => Err(ReconcileError::InvalidConfig(format!(
                "unknown failure policy '{}' (expected fail-fast or best-effort)",
                other
            ))),
        }
    }
}

/// Tie-break applied when several members or endpoints qualify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionOrder {
    /// First qualifying entry in the order the service listed them
    ListingOrder,
    /// Smallest identity, compared byte-wise
    #[default]
    Lexicographic,
}

impl std::str::FromStr for SelectionOrder {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "listing-order" | "listing" => Ok(SelectionOrder::ListingOrder),
            "lexicographic" => Ok(SelectionOrder::Lexicographic),
            other => Err(ReconcileError::InvalidConfig(format!(
                "unknown selection order '{}' (expected listing-order or lexicographic)",
                other
            ))),
        }
    }
}

/// Configuration for a reconciliation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilerConfig {
    /// Region of the database cluster
    #[serde(default = "default_region")]
    #[validate(custom(function = "validate_region"))]
    pub region: String,

    /// Control-plane endpoint override (LocalStack, VPC endpoints)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "endpoint URL must not be empty"))]
    pub endpoint_url: Option<String>,

    /// Settle time after the notification, before membership is queried
    #[serde(default = "default_settle_delay_secs")]
    #[validate(range(max = 900, message = "settle delay must be at most 900 seconds"))]
    pub settle_delay_secs: u64,

    /// Interval between endpoint status polls
    #[serde(default = "default_poll_interval_secs")]
    #[validate(range(min = 1, max = 300, message = "poll interval must be between 1 and 300 seconds"))]
    pub poll_interval_secs: u64,

    /// Deadline for the endpoint to become available
    #[serde(default = "default_poll_timeout_secs")]
    #[validate(range(min = 1, max = 3600, message = "poll timeout must be between 1 and 3600 seconds"))]
    pub poll_timeout_secs: u64,

    /// Stage failure handling
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Tie-break for target and endpoint selection
    #[serde(default)]
    pub selection_order: SelectionOrder,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_settle_delay_secs() -> u64 {
    DEFAULT_SETTLE_DELAY_SECS
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_poll_timeout_secs() -> u64 {
    DEFAULT_POLL_TIMEOUT_SECS
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            settle_delay_secs: default_settle_delay_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_timeout_secs: default_poll_timeout_secs(),
            failure_policy: FailurePolicy::default(),
            selection_order: SelectionOrder::default(),
        }
    }
}

impl ReconcilerConfig {
    /// Create a configuration builder
    pub fn builder() -> ReconcilerConfigBuilder {
        ReconcilerConfigBuilder::default()
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    /// Validate the configuration, flattening field errors into one message
    pub fn check(&self) -> Result<()> {
        self.validate().map_err(|errors| {
            let mut messages: Vec<String> = errors
                .field_errors()
                .iter()
                .flat_map(|(field, errs)| {
                    errs.iter().map(move |e| match &e.message {
                        Some(message) => format!("{}: {}", field, message),
                        None => format!("{}: {}", field, e.code),
                    })
                })
                .collect();
            messages.sort();
            ReconcileError::InvalidConfig(messages.join("; "))
        })
    }
}

/// Builder for [`ReconcilerConfig`]
#[derive(Debug, Default)]
pub struct ReconcilerConfigBuilder {
    region: Option<String>,
    endpoint_url: Option<String>,
    settle_delay: Option<Duration>,
    poll_interval: Option<Duration>,
    poll_timeout: Option<Duration>,
    failure_policy: Option<FailurePolicy>,
    selection_order: Option<SelectionOrder>,
}

impl ReconcilerConfigBuilder {
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = Some(delay);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = Some(timeout);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }

    pub fn selection_order(mut self, order: SelectionOrder) -> Self {
        self.selection_order = Some(order);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<ReconcilerConfig> {
        let config = ReconcilerConfig {
            region: self.region.unwrap_or_else(default_region),
            endpoint_url: self.endpoint_url,
            settle_delay_secs: self
                .settle_delay
                .map_or(DEFAULT_SETTLE_DELAY_SECS, |d| d.as_secs()),
            poll_interval_secs: self
                .poll_interval
                .map_or(DEFAULT_POLL_INTERVAL_SECS, |d| d.as_secs()),
            poll_timeout_secs: self
                .poll_timeout
                .map_or(DEFAULT_POLL_TIMEOUT_SECS, |d| d.as_secs()),
            failure_policy: self.failure_policy.unwrap_or_default(),
            selection_order: self.selection_order.unwrap_or_default(),
        };
        config.check()?;
        Ok(config)
    }
}
