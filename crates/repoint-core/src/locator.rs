//! Endpoint lookup
//!
//! Only custom endpoints are eligible for reassignment. An idle endpoint is
//! a custom endpoint with no static member, which makes it safe to repurpose.

use crate::config::SelectionOrder;
use crate::control_plane::EndpointControlPlane;
use crate::error::{ReconcileError, Result};
use crate::model::EndpointDescriptor;
use std::sync::Arc;
use tracing::{debug, info};

/// Pick the idle custom endpoint to repurpose
pub fn select_idle_endpoint(
    endpoints: &[EndpointDescriptor],
    order: SelectionOrder,
) -> Option<&EndpointDescriptor> {
    let mut candidates = endpoints.iter().filter(|e| e.is_idle());
    match order {
        SelectionOrder::ListingOrder => candidates.next(),
        SelectionOrder::Lexicographic => {
            candidates.min_by(|a, b| a.endpoint_identity.cmp(&b.endpoint_identity))
        }
    }
}

/// Looks up custom endpoints of a cluster
pub struct EndpointLocator {
    control_plane: Arc<dyn EndpointControlPlane>,
    order: SelectionOrder,
}

impl EndpointLocator {
    pub fn new(control_plane: Arc<dyn EndpointControlPlane>, order: SelectionOrder) -> Self {
        Self {
            control_plane,
            order,
        }
    }

    async fn list(&self, cluster: &str) -> Result<Vec<EndpointDescriptor>> {
        if cluster.is_empty() {
            return Err(ReconcileError::InvalidInput(
                "cluster identity is empty".to_string(),
            ));
        }
        let endpoints = self.control_plane.list_cluster_endpoints(cluster).await?;
        debug!(cluster = %cluster, endpoints = endpoints.len(), "Fetched cluster endpoints");
        Ok(endpoints)
    }

    /// Return the identity of the idle custom endpoint
    pub async fn find_idle_endpoint(&self, cluster: &str) -> Result<String> {
        let endpoints = self.list(cluster).await?;

        let endpoint = select_idle_endpoint(&endpoints, self.order)
            .ok_or_else(|| ReconcileError::not_found("idle custom endpoint", "<any>", cluster))?;

        info!(
            cluster = %cluster,
            endpoint = %endpoint.endpoint_identity,
            address = endpoint.address.as_deref().unwrap_or("<unknown>"),
            status = %endpoint.status,
            "Located idle custom endpoint"
        );
        Ok(endpoint.endpoint_identity.clone())
    }

    /// Return the live descriptor of one custom endpoint
    pub async fn find_endpoint(&self, cluster: &str, endpoint: &str) -> Result<EndpointDescriptor> {
        if endpoint.is_empty() {
            return Err(ReconcileError::InvalidInput(
                "endpoint identity is empty".to_string(),
            ));
        }

        let descriptor = self
            .list(cluster)
            .await?
            .into_iter()
            .find(|e| e.is_reassignable() && e.endpoint_identity == endpoint)
            .ok_or_else(|| ReconcileError::not_found("custom endpoint", endpoint, cluster))?;

        debug!(
            endpoint = %endpoint,
            members = descriptor.bound_members.len(),
            status = %descriptor.status,
            "Fetched endpoint status"
        );
        Ok(descriptor)
    }
}
