//! Invocation contract shared by the CLI and the Lambda entry point
//!
//! A host hands over the raw notification bytes and gets back an
//! [`Invocation`]: the integer signal (`1` only when the endpoint was fully
//! reconciled) plus the report and error behind it.

use repoint_core::driver::StageFailure;
use repoint_core::{
    decode, FailoverEvent, FailurePolicy, ReconcileError, ReconcileOutcome, ReconcileReport,
    ReconciliationDriver, Stage, FAILURE_SIGNAL,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Result of handling one notification
#[derive(Debug)]
pub struct Invocation {
    /// `1` when fully reconciled, `0` otherwise
    pub signal: i32,
    /// Present whenever the driver ran
    pub report: Option<ReconcileReport>,
    /// Decode failure, if the notification could not be read
    pub error: Option<ReconcileError>,
}

impl Invocation {
    /// Process exit status for the CLI
    pub fn exit_code(&self) -> i32 {
        self.report
            .as_ref()
            .map_or(3, ReconcileReport::exit_code)
    }

    /// Whether the reassignment was never applied
    ///
    /// Only then is handling the same notification again safe; once the
    /// endpoint is bound a second run finds no idle endpoint.
    pub fn is_aborted(&self) -> bool {
        self.report
            .as_ref()
            .map_or(true, |report| !report.outcome.reassignment_applied())
    }

    /// Serializable summary for hosts that answer with JSON
    pub fn response(&self) -> InvocationResponse {
        let Some(ref report) = self.report else {
            return InvocationResponse {
                signal: self.signal,
                outcome: "aborted".to_string(),
                cluster: String::new(),
                stage: Some(Stage::Decode.to_string()),
                endpoint: None,
                target: None,
                polls: 0,
                error: self.error.as_ref().map(ToString::to_string),
                elapsed_ms: 0,
            };
        };

        let (stage, endpoint, target, outcome_error) = match report.outcome {
            ReconcileOutcome::Reconciled {
                ref endpoint,
                ref target,
                ..
            } => (None, Some(endpoint.clone()), Some(target.clone()), None),
            ReconcileOutcome::TimedOut {
                ref endpoint,
                ref target,
                ref last_status,
                ..
            } => (
                Some(Stage::Poll.to_string()),
                Some(endpoint.clone()),
                Some(target.clone()),
                Some(format!(
                    "endpoint still {} at the deadline",
                    last_status
                        .as_ref()
                        .map_or("unobserved", |status| status.as_str())
                )),
            ),
            ReconcileOutcome::Aborted {
                stage,
                ref error,
            } => (Some(stage.to_string()), None, None, Some(error.to_string())),
            ReconcileOutcome::Cancelled {
                stage,
                ref endpoint,
                ref target,
                ..
            } => (
                Some(stage.to_string()),
                endpoint.clone(),
                target.clone(),
                Some(if endpoint.is_some() {
                    "cancelled by host after the reassignment was applied".to_string()
                } else {
                    "cancelled by host".to_string()
                }),
            ),
        };

        InvocationResponse {
            signal: self.signal,
            outcome: report.outcome.label().to_string(),
            cluster: report.cluster.clone(),
            stage,
            endpoint,
            target,
            polls: report.polls(),
            error: self
                .error
                .as_ref()
                .map(ToString::to_string)
                .or(outcome_error),
            elapsed_ms: u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// JSON answer returned to the invoking host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub signal: i32,
    pub outcome: String,
    pub cluster: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub polls: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Decode `raw` and reconcile it
pub async fn handle_notification(driver: &ReconciliationDriver, raw: &[u8]) -> Invocation {
    handle_notification_with_cancel(driver, raw, CancellationToken::new()).await
}

/// Decode `raw` and reconcile it, stopping early once `cancel` fires
///
/// An undecodable notification never reaches AWS under fail-fast. Under
/// best-effort the run proceeds with an empty event, which aborts at target
/// resolution; the decode failure is kept on the report.
pub async fn handle_notification_with_cancel(
    driver: &ReconciliationDriver,
    raw: &[u8],
    cancel: CancellationToken,
) -> Invocation {
    let event = match decode(raw) {
        Ok(event) => event,
        Err(err) => match driver.config().failure_policy {
            FailurePolicy::FailFast => {
                error!(error = %err, "Discarding undecodable notification");
                return Invocation {
                    signal: FAILURE_SIGNAL,
                    report: None,
                    error: Some(err),
                };
            }
            FailurePolicy::BestEffort => {
                warn!(error = %err, "Undecodable notification, continuing with an empty event");
                let mut report = driver
                    .reconcile_with_cancel(&FailoverEvent::empty(), cancel)
                    .await;
                report.failures.insert(
                    0,
                    StageFailure {
                        stage: Stage::Decode,
                        error: err,
                    },
                );
                return Invocation {
                    signal: report.signal(),
                    report: Some(report),
                    error: None,
                };
            }
        },
    };

    if !event.is_failover() {
        warn!(
            cluster = %event.cluster_identity,
            categories = ?event.event_categories,
            "Notification is not tagged as a failover, reconciling anyway"
        );
    }

    let report = driver.reconcile_with_cancel(&event, cancel).await;
    Invocation {
        signal: report.signal(),
        report: Some(report),
        error: None,
    }
}
