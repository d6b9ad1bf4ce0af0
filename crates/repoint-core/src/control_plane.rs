//! Collaborator interfaces
//!
//! The reconciler only talks to the outside world through these two
//! traits. Production code backs both with the RDS API; tests use
//! [`InMemoryControlPlane`](crate::testing::InMemoryControlPlane).

use crate::error::Result;
use crate::model::{ClusterMember, EndpointDescriptor, EndpointStatus, ReassignmentCommand};
use async_trait::async_trait;

/// Cluster/instance directory service
#[async_trait]
pub trait ClusterDirectory: Send + Sync {
    /// List the members of a cluster in the order the service reports them
    ///
    /// An unknown cluster is reported as `ReconcileError::NotFound`.
    async fn list_cluster_members(&self, cluster: &str) -> Result<Vec<ClusterMember>>;
}

/// Endpoint management control plane
#[async_trait]
pub trait EndpointControlPlane: Send + Sync {
    /// List every endpoint bound to a cluster, built-in ones included
    async fn list_cluster_endpoints(&self, cluster: &str) -> Result<Vec<EndpointDescriptor>>;

    /// Apply a reassignment and return the status reported right after the call
    async fn modify_endpoint(&self, command: &ReassignmentCommand) -> Result<EndpointStatus>;
}
