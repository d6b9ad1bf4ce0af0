//! Endpoint reassignment

use crate::control_plane::EndpointControlPlane;
use crate::error::{ReconcileError, Result};
use crate::model::{EndpointStatus, ReassignmentCommand};
use std::sync::Arc;
use tracing::info;

/// Issues reassignment commands against the control plane
pub struct EndpointReassigner {
    control_plane: Arc<dyn EndpointControlPlane>,
}

impl EndpointReassigner {
    pub fn new(control_plane: Arc<dyn EndpointControlPlane>) -> Self {
        Self { control_plane }
    }

    /// Bind `endpoint` to exactly `{instance}` and return the status seen right after
    ///
    /// The returned status is usually `modifying`; durability is only known
    /// once a later lookup reports `available`.
    pub async fn reassign(&self, endpoint: &str, instance: &str) -> Result<EndpointStatus> {
        if endpoint.is_empty() || instance.is_empty() {
            return Err(ReconcileError::InvalidInput(format!(
                "cannot bind endpoint '{}' to instance '{}'",
                endpoint, instance
            )));
        }

        let command = ReassignmentCommand::bind(endpoint, instance);
        let status = self.control_plane.modify_endpoint(&command).await?;

        info!(
            endpoint = %endpoint,
            target = %instance,
            status = %status,
            "Reassignment accepted"
        );
        if status == EndpointStatus::Modifying {
            info!(endpoint = %endpoint, "Endpoint is modifying, waiting for it to settle");
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EndpointDescriptor;
    use crate::testing::InMemoryControlPlane;
    use std::collections::BTreeSet;

    fn plane_with_endpoint() -> Arc<InMemoryControlPlane> {
        let plane = Arc::new(InMemoryControlPlane::new());
        plane.set_endpoints(
            "demo-cluster",
            vec![EndpointDescriptor::custom("ep-b", ["i-old"], EndpointStatus::Available)],
        );
        plane
    }

    #[tokio::test]
    async fn test_reassign_replaces_binding() {
        let plane = plane_with_endpoint();
        let reassigner = EndpointReassigner::new(plane.clone());

        let status = reassigner.reassign("ep-b", "i-2").await.unwrap();
        assert_eq!(status, EndpointStatus::Modifying);

        let endpoint = plane.endpoint("demo-cluster", "ep-b").unwrap();
        assert_eq!(endpoint.bound_members, BTreeSet::from(["i-2".to_string()]));
        assert_eq!(plane.last_command().unwrap(), ReassignmentCommand::bind("ep-b", "i-2"));
    }

    #[tokio::test]
    async fn test_reassign_twice_does_not_accumulate() {
        let plane = plane_with_endpoint();
        let reassigner = EndpointReassigner::new(plane.clone());

        reassigner.reassign("ep-b", "i-2").await.unwrap();
        reassigner.reassign("ep-b", "i-2").await.unwrap();

        let endpoint = plane.endpoint("demo-cluster", "ep-b").unwrap();
        assert_eq!(endpoint.bound_members, BTreeSet::from(["i-2".to_string()]));
        assert_eq!(plane.modifications(), 2);
    }

    #[tokio::test]
    async fn test_empty_target_is_refused() {
        let plane = plane_with_endpoint();
        let reassigner = EndpointReassigner::new(plane.clone());

        let err = reassigner.reassign("ep-b", "").await.unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidInput(_)));
        assert_eq!(plane.modifications(), 0);
    }

    #[tokio::test]
    async fn test_unknown_endpoint_is_not_found() {
        let plane = plane_with_endpoint();
        let reassigner = EndpointReassigner::new(plane);

        let err = reassigner.reassign("ep-missing", "i-2").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
