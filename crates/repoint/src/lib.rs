//! # repoint
//!
//! Keeps an Aurora custom endpoint pointed at a reader after a cluster
//! failover. The pipeline itself lives in `repoint-core`; this crate adds:
//!
//! - [`rds::RdsControlPlane`], the Amazon RDS implementation of the
//!   collaborator traits
//! - [`handler`], the invocation contract (`signal == 1` only when the
//!   endpoint was fully reconciled)
//! - [`cli`], settings shared by the `repoint` and `repoint-lambda` binaries
//!
//! ## Feature Flags
//!
//! - `rds` (default): the RDS control plane and the `repoint` CLI
//! - `lambda`: the `repoint-lambda` function handler

pub mod cli;
pub mod handler;
#[cfg(feature = "rds")]
pub mod rds;

pub use handler::{
    handle_notification, handle_notification_with_cancel, Invocation, InvocationResponse,
};
#[cfg(feature = "rds")]
pub use rds::RdsControlPlane;
