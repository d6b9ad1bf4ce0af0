//! # repoint-core
//!
//! Endpoint reconciliation for database cluster failover.
//!
//! When a cluster fails over, a "floating" custom endpoint has to follow the
//! promoted instance. This crate implements the reconciliation pipeline
//! independently of any cloud SDK:
//!
//! 1. **Decode** the failover notification ([`event`])
//! 2. **Resolve** the non-writer member to target ([`resolver`])
//! 3. **Locate** the idle custom endpoint ([`locator`])
//! 4. **Reassign** the endpoint to the target ([`reassigner`])
//! 5. **Poll** until the control plane reports the endpoint `available` ([`driver`])
//!
//! The outside world is reached only through the [`ClusterDirectory`] and
//! [`EndpointControlPlane`] traits. The `repoint` crate backs them with the
//! RDS API; [`testing::InMemoryControlPlane`] backs them in tests.
//!
//! ## Example
//!
//! ```rust
//! use repoint_core::prelude::*;
//! use repoint_core::testing::InMemoryControlPlane;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<()> {
//! let plane = Arc::new(InMemoryControlPlane::new());
//! plane.set_members("demo", vec![ClusterMember::writer("i-1"), ClusterMember::reader("i-2")]);
//! plane.set_endpoints(
//!     "demo",
//!     vec![EndpointDescriptor::custom("ep-b", Vec::<String>::new(), EndpointStatus::Available)],
//! );
//!
//! let config = ReconcilerConfig::builder()
//!     .settle_delay(Duration::ZERO)
//!     .poll_interval(Duration::from_secs(1))
//!     .build()?;
//! let driver = ReconciliationDriver::new(config, plane.clone(), plane)?;
//!
//! let report = driver.reconcile(&FailoverEvent::for_cluster("demo")).await;
//! assert!(report.is_reconciled());
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure handling
//!
//! Under [`FailurePolicy::FailFast`] (the default) the driver only advances
//! past a stage that succeeded. [`FailurePolicy::BestEffort`] logs stage
//! failures and carries on with empty values, but the final
//! [`ReconcileOutcome`] still reflects whether the endpoint was actually
//! reassigned.

pub mod config;
pub mod control_plane;
pub mod driver;
pub mod error;
pub mod event;
pub mod locator;
pub mod model;
pub mod reassigner;
pub mod resolver;
pub mod testing;

pub use config::{FailurePolicy, ReconcilerConfig, SelectionOrder};
pub use control_plane::{ClusterDirectory, EndpointControlPlane};
pub use driver::{
    ReconcileOutcome, ReconcileReport, ReconcileState, ReconcilerMetrics, ReconciliationDriver,
    Stage, StageFailure, FAILURE_SIGNAL, SUCCESS_SIGNAL,
};
pub use error::{ReconcileError, Result};
pub use event::{decode, FailoverEvent};

pub mod prelude {
    //! Re-exports for convenient usage
    pub use crate::config::{FailurePolicy, ReconcilerConfig, SelectionOrder};
    pub use crate::control_plane::{ClusterDirectory, EndpointControlPlane};
    pub use crate::driver::{
        ReconcileOutcome, ReconcileReport, ReconcileState, ReconciliationDriver, Stage,
    };
    pub use crate::error::{ReconcileError, Result};
    pub use crate::event::{decode, FailoverEvent};
    pub use crate::locator::EndpointLocator;
    pub use crate::model::{
        ClusterMember, CustomEndpointMode, EndpointDescriptor, EndpointStatus, EndpointType,
        ReassignmentCommand,
    };
    pub use crate::reassigner::EndpointReassigner;
    pub use crate::resolver::TargetResolver;
}
