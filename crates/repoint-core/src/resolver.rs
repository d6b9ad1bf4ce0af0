//! Target resolution
//!
//! After a failover the old writer's replacement target is the member that
//! does not hold the writer role. The resolver assumes that simple topology
//! and does not rank readers; when several qualify, [`SelectionOrder`]
//! decides.

use crate::config::SelectionOrder;
use crate::control_plane::ClusterDirectory;
use crate::error::{ReconcileError, Result};
use crate::model::ClusterMember;
use std::sync::Arc;
use tracing::{debug, info};

/// Pick the non-writer member to bind the endpoint to
pub fn select_target(members: &[ClusterMember], order: SelectionOrder) -> Option<&ClusterMember> {
    let mut candidates = members.iter().filter(|m| !m.is_writer);
    match order {
        SelectionOrder::ListingOrder => candidates.next(),
        SelectionOrder::Lexicographic => {
            candidates.min_by(|a, b| a.instance_identity.cmp(&b.instance_identity))
        }
    }
}

/// Resolves the instance a stale endpoint should move to
pub struct TargetResolver {
    directory: Arc<dyn ClusterDirectory>,
    order: SelectionOrder,
}

impl TargetResolver {
    pub fn new(directory: Arc<dyn ClusterDirectory>, order: SelectionOrder) -> Self {
        Self { directory, order }
    }

    /// Return the identity of the cluster's non-writer member
    ///
    /// Directory failures surface as `Transient`; an empty listing or a
    /// listing with no non-writer surfaces as `NotFound`.
    pub async fn resolve_target(&self, cluster: &str) -> Result<String> {
        if cluster.is_empty() {
            return Err(ReconcileError::InvalidInput(
                "cluster identity is empty".to_string(),
            ));
        }

        let members = self.directory.list_cluster_members(cluster).await?;
        debug!(cluster = %cluster, members = members.len(), "Fetched cluster membership");

        let target = select_target(&members, self.order)
            .ok_or_else(|| ReconcileError::not_found("non-writer member", "<any>", cluster))?;

        info!(
            cluster = %cluster,
            target = %target.instance_identity,
            "Resolved reassignment target"
        );
        Ok(target.instance_identity.clone())
    }
}
