//! Testing utilities
//!
//! [`InMemoryControlPlane`] implements both collaborator traits over plain
//! maps so the resolver, locator, reassigner and driver can be exercised
//! without a cloud account.
//!
//! # Example
//!
//! ```rust
//! use repoint_core::model::{ClusterMember, EndpointDescriptor, EndpointStatus};
//! use repoint_core::testing::InMemoryControlPlane;
//!
//! let plane = InMemoryControlPlane::new();
//! plane.set_members("demo", vec![ClusterMember::writer("i-1"), ClusterMember::reader("i-2")]);
//! plane.set_endpoints(
//!     "demo",
//!     vec![EndpointDescriptor::custom("ep-b", Vec::<String>::new(), EndpointStatus::Available)],
//! );
//! plane.script_statuses("ep-b", vec![EndpointStatus::Modifying, EndpointStatus::Available]);
//! ```

use crate::control_plane::{ClusterDirectory, EndpointControlPlane};
use crate::error::{ReconcileError, Result};
use crate::model::{ClusterMember, EndpointDescriptor, EndpointStatus, ReassignmentCommand};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone)]
struct Failure {
    message: String,
    remaining: usize,
}

impl Failure {
    fn always(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            remaining: usize::MAX,
        }
    }

    fn times(count: usize, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            remaining: count,
        }
    }
}

/// Take one injected failure, if any is armed
fn trip(slot: &mut Option<Failure>) -> Option<ReconcileError> {
    let failure = slot.as_mut()?;
    if failure.remaining == 0 {
        *slot = None;
        return None;
    }
    failure.remaining = failure.remaining.saturating_sub(1);
    Some(ReconcileError::Transient(failure.message.clone()))
}

#[derive(Debug, Default)]
struct State {
    members: HashMap<String, Vec<ClusterMember>>,
    endpoints: HashMap<String, Vec<EndpointDescriptor>>,
    scripts: HashMap<String, VecDeque<EndpointStatus>>,
    modified: HashSet<String>,
    modify_status: Option<EndpointStatus>,
    commands: Vec<ReassignmentCommand>,
    member_failure: Option<Failure>,
    endpoint_failure: Option<Failure>,
    modify_failure: Option<Failure>,
    member_listings: usize,
    endpoint_listings: usize,
}

/// In-memory directory and endpoint control plane
///
/// A modified endpoint reports `modifying` right after the call and then
/// walks through its scripted statuses, one per endpoint listing. Without
/// a script it becomes `available` on the next listing.
#[derive(Debug, Default)]
pub struct InMemoryControlPlane {
    state: Mutex<State>,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the membership of a cluster
    pub fn set_members(&self, cluster: impl Into<String>, members: Vec<ClusterMember>) {
        self.state.lock().members.insert(cluster.into(), members);
    }

    /// Replace the endpoints of a cluster
    pub fn set_endpoints(&self, cluster: impl Into<String>, endpoints: Vec<EndpointDescriptor>) {
        self.state.lock().endpoints.insert(cluster.into(), endpoints);
    }

    /// Statuses a modified endpoint reports on successive listings
    pub fn script_statuses(&self, endpoint: impl Into<String>, statuses: Vec<EndpointStatus>) {
        self.state
            .lock()
            .scripts
            .insert(endpoint.into(), statuses.into());
    }

    /// Status returned by `modify_endpoint` itself (default `modifying`)
    pub fn set_modify_status(&self, status: EndpointStatus) {
        self.state.lock().modify_status = Some(status);
    }

    /// Fail every membership listing
    pub fn fail_member_listing(&self, message: impl Into<String>) {
        self.state.lock().member_failure = Some(Failure::always(message));
    }

    /// Fail every endpoint listing
    pub fn fail_endpoint_listing(&self, message: impl Into<String>) {
        self.state.lock().endpoint_failure = Some(Failure::always(message));
    }

    /// Fail the next `count` endpoint listings
    pub fn fail_endpoint_listing_times(&self, count: usize, message: impl Into<String>) {
        self.state.lock().endpoint_failure = Some(Failure::times(count, message));
    }

    /// Fail every modification
    pub fn fail_modification(&self, message: impl Into<String>) {
        self.state.lock().modify_failure = Some(Failure::always(message));
    }

    /// Current descriptor of an endpoint, without advancing any script
    pub fn endpoint(&self, cluster: &str, endpoint: &str) -> Option<EndpointDescriptor> {
        self.state
            .lock()
            .endpoints
            .get(cluster)?
            .iter()
            .find(|e| e.endpoint_identity == endpoint)
            .cloned()
    }

    pub fn member_listings(&self) -> usize {
        self.state.lock().member_listings
    }

    pub fn endpoint_listings(&self) -> usize {
        self.state.lock().endpoint_listings
    }

    pub fn modifications(&self) -> usize {
        self.state.lock().commands.len()
    }

    pub fn last_command(&self) -> Option<ReassignmentCommand> {
        self.state.lock().commands.last().cloned()
    }
}

#[async_trait]
impl ClusterDirectory for InMemoryControlPlane {
    async fn list_cluster_members(&self, cluster: &str) -> Result<Vec<ClusterMember>> {
        let mut state = self.state.lock();
        state.member_listings += 1;
        if let Some(err) = trip(&mut state.member_failure) {
            return Err(err);
        }
        state
            .members
            .get(cluster)
            .cloned()
            .ok_or_else(|| ReconcileError::not_found("cluster", cluster, cluster))
    }
}

#[async_trait]
impl EndpointControlPlane for InMemoryControlPlane {
    async fn list_cluster_endpoints(&self, cluster: &str) -> Result<Vec<EndpointDescriptor>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.endpoint_listings += 1;
        if let Some(err) = trip(&mut state.endpoint_failure) {
            return Err(err);
        }

        let endpoints = state
            .endpoints
            .get_mut(cluster)
            .ok_or_else(|| ReconcileError::not_found("cluster", cluster, cluster))?;

        for endpoint in endpoints.iter_mut() {
            if !state.modified.contains(&endpoint.endpoint_identity) {
                continue;
            }
            let script = state
                .scripts
                .entry(endpoint.endpoint_identity.clone())
                .or_default();
            if let Some(next) = script.pop_front() {
                endpoint.status = next;
            } else if endpoint.status == EndpointStatus::Modifying {
                endpoint.status = EndpointStatus::Available;
            }
        }

        Ok(endpoints.clone())
    }

    async fn modify_endpoint(&self, command: &ReassignmentCommand) -> Result<EndpointStatus> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(err) = trip(&mut state.modify_failure) {
            return Err(err);
        }
        state.commands.push(command.clone());

        let endpoint = state
            .endpoints
            .values_mut()
            .flat_map(|endpoints| endpoints.iter_mut())
            .find(|e| e.endpoint_identity == command.endpoint_identity)
            .ok_or_else(|| {
                ReconcileError::not_found("custom endpoint", &command.endpoint_identity, "<any>")
            })?;

        endpoint.bound_members = command.static_members.iter().cloned().collect();
        endpoint.excluded_members = command.excluded_members.iter().cloned().collect();
        endpoint.custom_endpoint_type = Some(command.mode.to_string());
        endpoint.status = state
            .modify_status
            .clone()
            .unwrap_or(EndpointStatus::Modifying);
        state.modified.insert(command.endpoint_identity.clone());

        Ok(endpoint.status.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_modified_endpoint_settles_without_script() {
        let plane = InMemoryControlPlane::new();
        plane.set_endpoints(
            "c",
            vec![EndpointDescriptor::custom("ep", Vec::<String>::new(), EndpointStatus::Available)],
        );

        let status = plane
            .modify_endpoint(&ReassignmentCommand::bind("ep", "i-2"))
            .await
            .unwrap();
        assert_eq!(status, EndpointStatus::Modifying);

        let listed = plane.list_cluster_endpoints("c").await.unwrap();
        assert_eq!(listed[0].status, EndpointStatus::Available);
    }

    #[tokio::test]
    async fn test_script_only_advances_after_modification() {
        let plane = InMemoryControlPlane::new();
        plane.set_endpoints(
            "c",
            vec![EndpointDescriptor::custom("ep", Vec::<String>::new(), EndpointStatus::Available)],
        );
        plane.script_statuses("ep", vec![EndpointStatus::Modifying, EndpointStatus::Available]);

        plane.list_cluster_endpoints("c").await.unwrap();
        plane
            .modify_endpoint(&ReassignmentCommand::bind("ep", "i-2"))
            .await
            .unwrap();

        let first = plane.list_cluster_endpoints("c").await.unwrap();
        let second = plane.list_cluster_endpoints("c").await.unwrap();
        assert_eq!(first[0].status, EndpointStatus::Modifying);
        assert_eq!(second[0].status, EndpointStatus::Available);
    }

    #[tokio::test]
    async fn test_bounded_failure_injection() {
        let plane = InMemoryControlPlane::new();
        plane.set_endpoints("c", vec![]);
        plane.fail_endpoint_listing_times(2, "flaky");

        assert!(plane.list_cluster_endpoints("c").await.is_err());
        assert!(plane.list_cluster_endpoints("c").await.is_err());
        assert!(plane.list_cluster_endpoints("c").await.is_ok());
        assert_eq!(plane.endpoint_listings(), 3);
    }

    #[tokio::test]
    async fn test_unknown_cluster_is_not_found() {
        let plane = InMemoryControlPlane::new();
        let err = plane.list_cluster_members("ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
