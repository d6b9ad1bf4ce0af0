//! Reconciliation driver
//!
//! Runs one failover notification through the pipeline:
//!
//! ```text
//! Start ─► TargetResolved ─► EndpointLocated ─► Reassigning ─► Polling ─► Done
//!   │             │                 │                 │            │
//!   └─────────────┴─────────────────┴─────────────────┴────────────┴──► Failed
//! ```
//!
//! Before anything is queried the driver waits the configured settle delay
//! so the control plane can finish its own failover. After the reassignment
//! it always polls at least once, even if the immediate status is already
//! `available`, and stops at the configured deadline.

use crate::config::{FailurePolicy, ReconcilerConfig};
use crate::control_plane::{ClusterDirectory, EndpointControlPlane};
use crate::error::{ReconcileError, Result};
use crate::event::FailoverEvent;
use crate::locator::EndpointLocator;
use crate::model::EndpointStatus;
use crate::reassigner::EndpointReassigner;
use crate::resolver::TargetResolver;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Signal reported to the invoking harness for a fully reconciled endpoint
pub const SUCCESS_SIGNAL: i32 = 1;

/// Signal for every other outcome
pub const FAILURE_SIGNAL: i32 = 0;

/// States of one reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconcileState {
    Start,
    TargetResolved,
    EndpointLocated,
    Reassigning,
    Polling,
    Done,
    Failed,
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReconcileState::Start => "START",
            ReconcileState::TargetResolved => "TARGET_RESOLVED",
            ReconcileState::EndpointLocated => "ENDPOINT_LOCATED",
            ReconcileState::Reassigning => "REASSIGNING",
            ReconcileState::Polling => "POLLING",
            ReconcileState::Done => "DONE",
            ReconcileState::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// Pipeline step a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Decode,
    Settle,
    ResolveTarget,
    LocateEndpoint,
    Reassign,
    Poll,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Decode => "decode",
            Stage::Settle => "settle",
            Stage::ResolveTarget => "resolve-target",
            Stage::LocateEndpoint => "locate-endpoint",
            Stage::Reassign => "reassign",
            Stage::Poll => "poll",
        };
        f.write_str(label)
    }
}

/// A failure that was logged and recorded without stopping the run
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: ReconcileError,
}

/// Final result of a run
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// Reassignment accepted and the endpoint reported `available`
    Reconciled {
        endpoint: String,
        target: String,
        polls: u32,
    },
    /// Reassignment accepted but never confirmed before the deadline
    TimedOut {
        endpoint: String,
        target: String,
        polls: u32,
        last_status: Option<EndpointStatus>,
    },
    /// The reassignment was never applied
    Aborted { stage: Stage, error: ReconcileError },
    /// The host cancelled the run
    ///
    /// `endpoint` and `target` are set when the cancel arrived after the
    /// control plane had accepted the reassignment.
    Cancelled {
        stage: Stage,
        endpoint: Option<String>,
        target: Option<String>,
        polls: u32,
    },
}

impl ReconcileOutcome {
    /// Short stable label used in logs, metrics and handler responses
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Reconciled { .. } => "reconciled",
            ReconcileOutcome::TimedOut { .. } => "timed-out",
            ReconcileOutcome::Aborted { .. } => "aborted",
            ReconcileOutcome::Cancelled { .. } => "cancelled",
        }
    }

    /// Whether the control plane accepted the reassignment
    ///
    /// Polling only starts after an accepted reassignment, so a poll-stage
    /// abort still leaves the endpoint bound to the target.
    pub fn reassignment_applied(&self) -> bool {
        match self {
            ReconcileOutcome::Reconciled { .. } | ReconcileOutcome::TimedOut { .. } => true,
            ReconcileOutcome::Cancelled { endpoint, .. } => endpoint.is_some(),
            ReconcileOutcome::Aborted { stage, .. } => *stage == Stage::Poll,
        }
    }
}

/// Everything observed during one run
#[derive(Debug)]
pub struct ReconcileReport {
    pub cluster: String,
    pub outcome: ReconcileOutcome,
    /// States visited, in order, ending with `Done` or `Failed`
    pub transitions: Vec<ReconcileState>,
    /// Failures that were logged and carried past (best-effort runs, poll retries)
    pub failures: Vec<StageFailure>,
    /// Status the control plane returned from the reassignment call itself
    pub immediate_status: Option<EndpointStatus>,
    pub elapsed: Duration,
}

impl ReconcileReport {
    /// Report for a notification that never reached the driver
    pub fn undecodable(error: ReconcileError) -> Self {
        Self {
            cluster: String::new(),
            outcome: ReconcileOutcome::Aborted {
                stage: Stage::Decode,
                error,
            },
            transitions: vec![ReconcileState::Start, ReconcileState::Failed],
            failures: Vec::new(),
            immediate_status: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_reconciled(&self) -> bool {
        matches!(self.outcome, ReconcileOutcome::Reconciled { .. })
    }

    /// Integer signal for the invoking harness
    pub fn signal(&self) -> i32 {
        if self.is_reconciled() {
            SUCCESS_SIGNAL
        } else {
            FAILURE_SIGNAL
        }
    }

    /// Process exit status
    ///
    /// `0` reconciled, `2` reassigned but not confirmed (timed out, or
    /// stopped while polling), `3` the reassignment was never applied.
    pub fn exit_code(&self) -> i32 {
        if self.is_reconciled() {
            0
        } else if self.outcome.reassignment_applied() {
            2
        } else {
            3
        }
    }

    /// Number of status polls issued
    pub fn polls(&self) -> u32 {
        match self.outcome {
            ReconcileOutcome::Reconciled { polls, .. }
            | ReconcileOutcome::TimedOut { polls, .. }
            | ReconcileOutcome::Cancelled { polls, .. } => polls,
            ReconcileOutcome::Aborted { .. } => 0,
        }
    }
}

/// Metrics for the driver
#[derive(Clone)]
pub struct ReconcilerMetrics {
    /// Counter for reconciliation runs
    pub reconciliations: metrics::Counter,
    /// Counter for runs that did not end reconciled
    pub failures: metrics::Counter,
    /// Counter for endpoint status polls
    pub polls: metrics::Counter,
    /// Histogram for run duration
    pub duration: metrics::Histogram,
}

impl ReconcilerMetrics {
    pub fn new() -> Self {
        Self {
            reconciliations: metrics::counter!("repoint_reconciliations_total"),
            failures: metrics::counter!("repoint_reconciliation_failures_total"),
            polls: metrics::counter!("repoint_endpoint_polls_total"),
            duration: metrics::histogram!("repoint_reconciliation_duration_seconds"),
        }
    }
}

impl Default for ReconcilerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable bookkeeping for one run
struct RunLog {
    policy: FailurePolicy,
    transitions: Vec<ReconcileState>,
    failures: Vec<StageFailure>,
    immediate_status: Option<EndpointStatus>,
}

impl RunLog {
    fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            transitions: vec![ReconcileState::Start],
            failures: Vec::new(),
            immediate_status: None,
        }
    }

    fn enter(&mut self, state: ReconcileState) {
        debug!(state = %state, "State transition");
        self.transitions.push(state);
    }

    /// Record a stage failure; `Some` ends the run under fail-fast
    fn stage_failed(&mut self, stage: Stage, error: ReconcileError) -> Option<ReconcileOutcome> {
        log_failure(stage, &error, false);
        match self.policy {
            FailurePolicy::FailFast => Some(ReconcileOutcome::Aborted { stage, error }),
            FailurePolicy::BestEffort => {
                self.failures.push(StageFailure { stage, error });
                None
            }
        }
    }

    /// Record a retryable failure; the stage is attempted again under either policy
    fn stage_retried(&mut self, stage: Stage, error: ReconcileError) {
        log_failure(stage, &error, true);
        self.failures.push(StageFailure { stage, error });
    }

    /// Outcome for a best-effort run whose reassignment never went through
    fn never_reassigned(&mut self) -> ReconcileOutcome {
        if self.failures.is_empty() {
            return ReconcileOutcome::Aborted {
                stage: Stage::Reassign,
                error: ReconcileError::InvalidInput("reassignment was never issued".to_string()),
            };
        }
        let first = self.failures.remove(0);
        ReconcileOutcome::Aborted {
            stage: first.stage,
            error: first.error,
        }
    }
}

fn log_failure(stage: Stage, error: &ReconcileError, retrying: bool) {
    warn!(
        stage = %stage,
        kind = error.kind(),
        error = %error,
        retrying = retrying,
        "Stage failed"
    );
}

enum PollResult {
    Ready(u32),
    Expired {
        polls: u32,
        last_status: Option<EndpointStatus>,
    },
    Cancelled(u32),
    Failed(ReconcileOutcome),
}

/// Drives one reconciliation per failover notification
///
/// Instances hold no state between runs, so one driver can serve
/// concurrent notifications for different clusters.
pub struct ReconciliationDriver {
    config: ReconcilerConfig,
    resolver: TargetResolver,
    locator: EndpointLocator,
    reassigner: EndpointReassigner,
    metrics: Option<ReconcilerMetrics>,
}

impl ReconciliationDriver {
    /// Create a driver over the given collaborators
    pub fn new(
        config: ReconcilerConfig,
        directory: Arc<dyn ClusterDirectory>,
        control_plane: Arc<dyn EndpointControlPlane>,
    ) -> Result<Self> {
        config.check()?;
        Ok(Self {
            resolver: TargetResolver::new(directory, config.selection_order),
            locator: EndpointLocator::new(control_plane.clone(), config.selection_order),
            reassigner: EndpointReassigner::new(control_plane),
            metrics: Some(ReconcilerMetrics::new()),
            config,
        })
    }

    /// Replace or disable the metrics recorder handles
    pub fn with_metrics(mut self, metrics: Option<ReconcilerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run the pipeline for one notification
    pub async fn reconcile(&self, event: &FailoverEvent) -> ReconcileReport {
        self.reconcile_with_cancel(event, CancellationToken::new())
            .await
    }

    /// Run the pipeline, stopping early once `cancel` fires
    #[instrument(skip(self, event, cancel), fields(cluster = %event.cluster_identity))]
    pub async fn reconcile_with_cancel(
        &self,
        event: &FailoverEvent,
        cancel: CancellationToken,
    ) -> ReconcileReport {
        let start = std::time::Instant::now();

        if let Some(ref metrics) = self.metrics {
            metrics.reconciliations.increment(1);
        }

        info!(
            cluster = %event.cluster_identity,
            source = %event.source_identifier,
            categories = ?event.event_categories,
            message = %event.message,
            policy = ?self.config.failure_policy,
            "Reconciling floating endpoint after failover"
        );

        let mut log = RunLog::new(self.config.failure_policy);
        let outcome = self.run(event, &cancel, &mut log).await;

        log.enter(match outcome {
            ReconcileOutcome::Reconciled { .. } => ReconcileState::Done,
            _ => ReconcileState::Failed,
        });

        let elapsed = start.elapsed();
        if let Some(ref metrics) = self.metrics {
            metrics.duration.record(elapsed.as_secs_f64());
            if !matches!(outcome, ReconcileOutcome::Reconciled { .. }) {
                metrics.failures.increment(1);
            }
        }

        match &outcome {
            ReconcileOutcome::Reconciled {
                endpoint,
                target,
                polls,
            } => info!(
                endpoint = %endpoint,
                target = %target,
                polls = polls,
                "Endpoint reconciled"
            ),
            ReconcileOutcome::TimedOut {
                endpoint,
                polls,
                last_status,
                ..
            } => warn!(
                endpoint = %endpoint,
                polls = polls,
                last_status = ?last_status,
                "Endpoint did not become available before the deadline"
            ),
            ReconcileOutcome::Aborted { stage, error } => warn!(
                stage = %stage,
                error = %error,
                "Reconciliation aborted before the endpoint was reassigned"
            ),
            ReconcileOutcome::Cancelled {
                stage,
                endpoint,
                target,
                ..
            } => warn!(
                stage = %stage,
                endpoint = ?endpoint,
                target = ?target,
                "Reconciliation cancelled"
            ),
        }

        ReconcileReport {
            cluster: event.cluster_identity.clone(),
            outcome,
            transitions: log.transitions,
            failures: log.failures,
            immediate_status: log.immediate_status,
            elapsed,
        }
    }

    async fn run(
        &self,
        event: &FailoverEvent,
        cancel: &CancellationToken,
        log: &mut RunLog,
    ) -> ReconcileOutcome {
        let cluster = event.cluster_identity.as_str();

        debug!(delay = ?self.config.settle_delay(), "Waiting for the cluster failover to settle");
        if !pause(self.config.settle_delay(), cancel).await {
            return ReconcileOutcome::Cancelled {
                stage: Stage::Settle,
                endpoint: None,
                target: None,
                polls: 0,
            };
        }

        let target = match self.resolver.resolve_target(cluster).await {
            Ok(target) => {
                log.enter(ReconcileState::TargetResolved);
                target
            }
            Err(error) => match log.stage_failed(Stage::ResolveTarget, error) {
                Some(outcome) => return outcome,
                None => String::new(),
            },
        };

        let endpoint = match self.locator.find_idle_endpoint(cluster).await {
            Ok(endpoint) => {
                log.enter(ReconcileState::EndpointLocated);
                endpoint
            }
            Err(error) => match log.stage_failed(Stage::LocateEndpoint, error) {
                Some(outcome) => return outcome,
                None => String::new(),
            },
        };

        log.enter(ReconcileState::Reassigning);
        let reassigned = match self.reassigner.reassign(&endpoint, &target).await {
            Ok(status) => {
                log.immediate_status = Some(status);
                true
            }
            Err(error) => match log.stage_failed(Stage::Reassign, error) {
                Some(outcome) => return outcome,
                None => false,
            },
        };

        log.enter(ReconcileState::Polling);
        if !reassigned {
            return log.never_reassigned();
        }

        match self.poll_until_ready(cluster, &endpoint, cancel, log).await {
            PollResult::Ready(polls) => ReconcileOutcome::Reconciled {
                endpoint,
                target,
                polls,
            },
            PollResult::Expired { polls, last_status } => ReconcileOutcome::TimedOut {
                endpoint,
                target,
                polls,
                last_status,
            },
            PollResult::Cancelled(polls) => ReconcileOutcome::Cancelled {
                stage: Stage::Poll,
                endpoint: Some(endpoint),
                target: Some(target),
                polls,
            },
            PollResult::Failed(outcome) => outcome,
        }
    }

    async fn poll_until_ready(
        &self,
        cluster: &str,
        endpoint: &str,
        cancel: &CancellationToken,
        log: &mut RunLog,
    ) -> PollResult {
        let deadline = Instant::now() + self.config.poll_timeout();
        let interval = self.config.poll_interval();
        let mut polls = 0u32;
        let mut last_status = None;

        loop {
            if cancel.is_cancelled() {
                return PollResult::Cancelled(polls);
            }

            polls += 1;
            if let Some(ref metrics) = self.metrics {
                metrics.polls.increment(1);
            }

            match self.locator.find_endpoint(cluster, endpoint).await {
                Ok(descriptor) => {
                    debug!(
                        poll = polls,
                        endpoint = %endpoint,
                        status = %descriptor.status,
                        members = ?descriptor.bound_members,
                        "Polled endpoint status"
                    );
                    if descriptor.status.is_ready() {
                        return PollResult::Ready(polls);
                    }
                    last_status = Some(descriptor.status);
                }
                Err(error) if error.is_retryable() => {
                    log.stage_retried(Stage::Poll, error);
                }
                Err(error) => {
                    if let Some(outcome) = log.stage_failed(Stage::Poll, error) {
                        return PollResult::Failed(outcome);
                    }
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return PollResult::Expired { polls, last_status };
            }
            if !pause(interval.min(remaining), cancel).await {
                return PollResult::Cancelled(polls);
            }
        }
    }
}

/// Sleep for `duration`; `false` if cancelled first
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectionOrder;
    use crate::model::{ClusterMember, EndpointDescriptor};
    use crate::testing::InMemoryControlPlane;

    const CLUSTER: &str = "demo-cluster";

    fn failover_plane() -> Arc<InMemoryControlPlane> {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.set_members(
            CLUSTER,
            vec![ClusterMember::writer("i-1"), ClusterMember::reader("i-2")],
        );
        plane.set_endpoints(
            CLUSTER,
            vec![
                EndpointDescriptor::custom("ep-a", ["i-1"], EndpointStatus::Available),
                EndpointDescriptor::custom("ep-b", Vec::<String>::new(), EndpointStatus::Available),
            ],
        );
        plane
    }

    fn config(policy: FailurePolicy) -> ReconcilerConfig {
        ReconcilerConfig::builder()
            .settle_delay(Duration::from_secs(30))
            .poll_interval(Duration::from_secs(5))
            .poll_timeout(Duration::from_secs(60))
            .failure_policy(policy)
            .selection_order(SelectionOrder::ListingOrder)
            .build()
            .unwrap()
    }

    fn driver(plane: &Arc<InMemoryControlPlane>, policy: FailurePolicy) -> ReconciliationDriver {
        ReconciliationDriver::new(config(policy), plane.clone(), plane.clone())
            .unwrap()
            .with_metrics(None)
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_reconciliation() {
        let plane = failover_plane();
        let report = driver(&plane, FailurePolicy::FailFast)
            .reconcile(&FailoverEvent::for_cluster(CLUSTER))
            .await;

        assert!(report.is_reconciled());
        assert_eq!(report.signal(), SUCCESS_SIGNAL);
        assert_eq!(
            report.transitions,
            vec![
                ReconcileState::Start,
                ReconcileState::TargetResolved,
                ReconcileState::EndpointLocated,
                ReconcileState::Reassigning,
                ReconcileState::Polling,
                ReconcileState::Done,
            ]
        );
        assert_eq!(report.immediate_status, Some(EndpointStatus::Modifying));
        assert!(report.failures.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_after_exactly_three_polls() {
        let plane = failover_plane();
        plane.script_statuses(
            "ep-b",
            vec![
                EndpointStatus::Modifying,
                EndpointStatus::Modifying,
                EndpointStatus::Available,
            ],
        );

        let report = driver(&plane, FailurePolicy::FailFast)
            .reconcile(&FailoverEvent::for_cluster(CLUSTER))
            .await;

        match report.outcome {
            ReconcileOutcome::Reconciled {
                ref endpoint,
                ref target,
                polls,
            } => {
                assert_eq!(endpoint, "ep-b");
                assert_eq!(target, "i-2");
                assert_eq!(polls, 3);
            }
            ref other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_delay_precedes_first_query() {
        let plane = failover_plane();
        let started = Instant::now();
        let driver = driver(&plane, FailurePolicy::FailFast);

        let report = driver.reconcile(&FailoverEvent::for_cluster(CLUSTER)).await;

        assert!(report.is_reconciled());
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_even_when_immediately_available() {
        let plane = failover_plane();
        plane.set_modify_status(EndpointStatus::Available);

        let report = driver(&plane, FailurePolicy::FailFast)
            .reconcile(&FailoverEvent::for_cluster(CLUSTER))
            .await;

        assert_eq!(report.immediate_status, Some(EndpointStatus::Available));
        assert!(report.transitions.contains(&ReconcileState::Polling));
        assert_eq!(report.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_aborts_on_directory_failure() {
        let plane = failover_plane();
        plane.fail_member_listing("throttled");

        let report = driver(&plane, FailurePolicy::FailFast)
            .reconcile(&FailoverEvent::for_cluster(CLUSTER))
            .await;

        match report.outcome {
            ReconcileOutcome::Aborted {
                stage: Stage::ResolveTarget,
                error: ReconcileError::Transient(_),
            } => {}
            ref other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(report.signal(), FAILURE_SIGNAL);
        assert_eq!(plane.modifications(), 0);
        assert_eq!(plane.endpoint_listings(), 0);
        assert_eq!(report.transitions.last(), Some(&ReconcileState::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_effort_continues_but_reports_abort() {
        let plane = failover_plane();
        plane.fail_member_listing("throttled");

        let report = driver(&plane, FailurePolicy::BestEffort)
            .reconcile(&FailoverEvent::for_cluster(CLUSTER))
            .await;

        // the idle endpoint is still located, the reassignment with an
        // empty target is refused before reaching the control plane
        assert!(report.transitions.contains(&ReconcileState::EndpointLocated));
        assert!(report.transitions.contains(&ReconcileState::Polling));
        assert_eq!(plane.modifications(), 0);

        match report.outcome {
            ReconcileOutcome::Aborted {
                stage: Stage::ResolveTarget,
                error: ReconcileError::Transient(_),
            } => {}
            ref other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(report
            .failures
            .iter()
            .any(|f| f.stage == Stage::Reassign));
        assert_eq!(report.signal(), FAILURE_SIGNAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_deadline_times_out() {
        let plane = failover_plane();
        plane.script_statuses("ep-b", vec![EndpointStatus::Modifying; 1000]);

        let report = driver(&plane, FailurePolicy::FailFast)
            .reconcile(&FailoverEvent::for_cluster(CLUSTER))
            .await;

        match report.outcome {
            ReconcileOutcome::TimedOut {
                polls,
                ref last_status,
                ..
            } => {
                // 60s deadline at 5s intervals: polls at t=0,5,...,60
                assert_eq!(polls, 13);
                assert_eq!(last_status, &Some(EndpointStatus::Modifying));
            }
            ref other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(report.exit_code(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_are_retried() {
        let plane = failover_plane();
        let driver = driver(&plane, FailurePolicy::FailFast);

        plane.script_statuses("ep-b", vec![EndpointStatus::Modifying]);
        let event = FailoverEvent::for_cluster(CLUSTER);
        let run = driver.reconcile(&event);
        tokio::pin!(run);

        // first poll happens at t=30; arm the failures before the second
        tokio::select! {
            _ = &mut run => panic!("run finished before failures were armed"),
            _ = tokio::time::sleep(Duration::from_secs(31)) => {}
        }
        plane.fail_endpoint_listing_times(2, "service unavailable");

        let report = run.await;
        assert!(report.is_reconciled());
        assert_eq!(
            report
                .failures
                .iter()
                .filter(|f| f.stage == Stage::Poll)
                .count(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_settle() {
        let plane = failover_plane();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = driver(&plane, FailurePolicy::FailFast)
            .reconcile_with_cancel(&FailoverEvent::for_cluster(CLUSTER), cancel)
            .await;

        assert!(matches!(
            report.outcome,
            ReconcileOutcome::Cancelled {
                stage: Stage::Settle,
                endpoint: None,
                target: None,
                polls: 0,
            }
        ));
        assert!(!report.outcome.reassignment_applied());
        assert_eq!(plane.member_listings(), 0);
        assert_eq!(report.exit_code(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_polling() {
        let plane = failover_plane();
        plane.script_statuses("ep-b", vec![EndpointStatus::Modifying; 1000]);
        let driver = driver(&plane, FailurePolicy::FailFast);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(47)).await;
            trigger.cancel();
        });

        let report = driver
            .reconcile_with_cancel(&FailoverEvent::for_cluster(CLUSTER), cancel)
            .await;

        // the reassignment went through before the cancel
        match report.outcome {
            ReconcileOutcome::Cancelled {
                stage: Stage::Poll,
                ref endpoint,
                ref target,
                polls,
            } => {
                assert_eq!(endpoint.as_deref(), Some("ep-b"));
                assert_eq!(target.as_deref(), Some("i-2"));
                // polls at t=30,35,40,45
                assert_eq!(polls, 4);
            }
            ref other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(report.outcome.reassignment_applied());
        assert_eq!(report.exit_code(), 2);
        assert_eq!(report.signal(), FAILURE_SIGNAL);
        assert_eq!(plane.modifications(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_effort_skips_polling_without_reassignment() {
        let plane = failover_plane();
        plane.set_endpoints(
            CLUSTER,
            vec![EndpointDescriptor::custom("ep-a", ["i-1"], EndpointStatus::Available)],
        );
        let started = Instant::now();

        let report = driver(&plane, FailurePolicy::BestEffort)
            .reconcile(&FailoverEvent::for_cluster(CLUSTER))
            .await;

        // only the settle delay elapses, no poll waits
        assert!(started.elapsed() < Duration::from_secs(35));
        assert_eq!(plane.endpoint_listings(), 1);
        assert_eq!(plane.modifications(), 0);
        assert!(report.transitions.contains(&ReconcileState::Polling));
        assert_eq!(report.polls(), 0);

        match report.outcome {
            ReconcileOutcome::Aborted {
                stage: Stage::LocateEndpoint,
                ref error,
            } => assert!(error.is_not_found()),
            ref other => panic!("unexpected outcome: {:?}", other),
        }
        // the refused reassignment is the only failure left on the report
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].stage, Stage::Reassign);
        assert_eq!(report.exit_code(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_abort_still_counts_as_applied() {
        let plane = failover_plane();
        let driver = driver(&plane, FailurePolicy::FailFast);
        let event = FailoverEvent::for_cluster(CLUSTER);
        plane.script_statuses("ep-b", vec![EndpointStatus::Modifying]);

        let run = driver.reconcile(&event);
        tokio::pin!(run);
        tokio::select! {
            _ = &mut run => panic!("run finished before the endpoint was removed"),
            _ = tokio::time::sleep(Duration::from_secs(31)) => {}
        }
        plane.set_endpoints(CLUSTER, vec![]);

        let report = run.await;
        assert!(matches!(
            report.outcome,
            ReconcileOutcome::Aborted {
                stage: Stage::Poll,
                ..
            }
        ));
        assert!(report.outcome.reassignment_applied());
        assert_eq!(report.exit_code(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_event_aborts_without_queries() {
        let plane = failover_plane();
        let report = driver(&plane, FailurePolicy::FailFast)
            .reconcile(&FailoverEvent::empty())
            .await;

        assert!(matches!(
            report.outcome,
            ReconcileOutcome::Aborted {
                stage: Stage::ResolveTarget,
                error: ReconcileError::InvalidInput(_),
            }
        ));
        assert_eq!(plane.member_listings(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let plane = failover_plane();
        let config = ReconcilerConfig {
            poll_interval_secs: 0,
            ..ReconcilerConfig::default()
        };
        let result = ReconciliationDriver::new(config, plane.clone(), plane);
        assert!(matches!(result, Err(ReconcileError::InvalidConfig(_))));
    }

    #[test]
    fn test_undecodable_report() {
        let report = ReconcileReport::undecodable(ReconcileError::Decode("bad".into()));
        assert_eq!(report.signal(), FAILURE_SIGNAL);
        assert_eq!(report.exit_code(), 3);
        assert_eq!(report.outcome.label(), "aborted");
    }

    #[test]
    fn test_retried_and_fatal_failures_share_the_run_log() {
        let mut log = RunLog::new(FailurePolicy::FailFast);

        log.stage_retried(Stage::Poll, ReconcileError::Transient("busy".into()));
        assert_eq!(log.failures.len(), 1);
        assert_eq!(log.failures[0].stage, Stage::Poll);

        let outcome = log.stage_failed(Stage::Poll, ReconcileError::InvalidInput("gone".into()));
        assert!(matches!(
            outcome,
            Some(ReconcileOutcome::Aborted {
                stage: Stage::Poll,
                ..
            })
        ));
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(ReconcileState::TargetResolved.to_string(), "TARGET_RESOLVED");
        assert_eq!(Stage::LocateEndpoint.to_string(), "locate-endpoint");
    }
}
