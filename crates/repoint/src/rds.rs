//! RDS-backed cluster directory and endpoint control plane
//!
//! [`RdsControlPlane`] implements [`ClusterDirectory`] and
//! [`EndpointControlPlane`] over the Amazon RDS API:
//!
//! | Operation                  | RDS call                      |
//! |----------------------------|-------------------------------|
//! | `list_cluster_members`     | `DescribeDBClusters`          |
//! | `list_cluster_endpoints`   | `DescribeDBClusterEndpoints`  |
//! | `modify_endpoint`          | `ModifyDBClusterEndpoint`     |
//!
//! Every listing is a live call; nothing is cached between polls.
//!
//! ## Error classification
//!
//! All `SdkError` variants are handled explicitly:
//! - `ServiceError` is dispatched by error code, falling back to the message
//! - `TimeoutError` and `DispatchFailure` become `Transient`
//! - `ConstructionFailure` becomes `InvalidConfig`
//! - `ResponseError` becomes `Decode`

use async_trait::async_trait;
use aws_sdk_rds::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_rds::types::{DbClusterEndpoint, DbClusterMember};
use aws_sdk_rds::Client as RdsClient;
use repoint_core::model::{
    ClusterMember, EndpointDescriptor, EndpointStatus, EndpointType, ReassignmentCommand,
};
use repoint_core::{
    ClusterDirectory, EndpointControlPlane, ReconcileError, ReconcilerConfig, Result,
};
use std::time::Duration;
use tracing::{debug, instrument};

/// Default per-operation timeout for RDS calls
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for [`RdsControlPlane`]
#[derive(Debug, Default)]
pub struct RdsControlPlaneBuilder {
    region: Option<String>,
    endpoint_url: Option<String>,
    operation_timeout: Option<Duration>,
}

impl RdsControlPlaneBuilder {
    /// Set the AWS region
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Override the RDS endpoint (LocalStack and similar)
    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    /// Set the per-operation timeout (default: 30s)
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Resolve credentials and build the client
    pub async fn build(self) -> Result<RdsControlPlane> {
        let region = self
            .region
            .unwrap_or_else(|| repoint_core::config::DEFAULT_REGION.to_string());
        if region.is_empty() {
            return Err(ReconcileError::InvalidConfig(
                "region must not be empty".to_string(),
            ));
        }
        let timeout = self.operation_timeout.unwrap_or(DEFAULT_OPERATION_TIMEOUT);

        let mut aws_config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.clone()));
        if let Some(ref endpoint) = self.endpoint_url {
            aws_config_loader = aws_config_loader.endpoint_url(endpoint);
        }
        let sdk_config = aws_config_loader.load().await;

        let timeout_config = aws_sdk_rds::config::timeout::TimeoutConfig::builder()
            .operation_timeout(timeout)
            .build();
        let rds_config = aws_sdk_rds::config::Builder::from(&sdk_config)
            .timeout_config(timeout_config)
            .build();

        debug!(region = %region, endpoint_url = ?self.endpoint_url, "RDS client ready");

        Ok(RdsControlPlane {
            client: RdsClient::from_conf(rds_config),
            region,
        })
    }
}

/// Cluster directory and endpoint control plane backed by Amazon RDS
#[derive(Debug, Clone)]
pub struct RdsControlPlane {
    client: RdsClient,
    region: String,
}

impl RdsControlPlane {
    pub fn builder() -> RdsControlPlaneBuilder {
        RdsControlPlaneBuilder::default()
    }

    /// Build a client for the region and endpoint override in `config`
    pub async fn from_config(config: &ReconcilerConfig) -> Result<Self> {
        let mut builder = Self::builder().region(config.region.clone());
        if let Some(ref url) = config.endpoint_url {
            builder = builder.endpoint_url(url.clone());
        }
        builder.build().await
    }
}

#[async_trait]
impl ClusterDirectory for RdsControlPlane {
    #[instrument(skip(self), fields(region = %self.region))]
    async fn list_cluster_members(&self, cluster: &str) -> Result<Vec<ClusterMember>> {
        let output = self
            .client
            .describe_db_clusters()
            .db_cluster_identifier(cluster)
            .send()
            .await
            .map_err(|e| classify_sdk_error("DescribeDBClusters", "cluster", cluster, cluster, e))?;

        let db_cluster = output
            .db_clusters()
            .first()
            .ok_or_else(|| ReconcileError::not_found("cluster", cluster, cluster))?;

        let members: Vec<ClusterMember> = db_cluster
            .db_cluster_members()
            .iter()
            .filter_map(member_from_sdk)
            .collect();
        debug!(cluster = %cluster, members = members.len(), "Listed cluster members");
        Ok(members)
    }
}

#[async_trait]
impl EndpointControlPlane for RdsControlPlane {
    #[instrument(skip(self), fields(region = %self.region))]
    async fn list_cluster_endpoints(&self, cluster: &str) -> Result<Vec<EndpointDescriptor>> {
        let mut endpoints = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let output = self
                .client
                .describe_db_cluster_endpoints()
                .db_cluster_identifier(cluster)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| {
                    classify_sdk_error("DescribeDBClusterEndpoints", "cluster", cluster, cluster, e)
                })?;

            endpoints.extend(output.db_cluster_endpoints().iter().filter_map(endpoint_from_sdk));

            match output.marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        debug!(cluster = %cluster, endpoints = endpoints.len(), "Listed cluster endpoints");
        Ok(endpoints)
    }

    #[instrument(skip(self, command), fields(region = %self.region, endpoint = %command.endpoint_identity))]
    async fn modify_endpoint(&self, command: &ReassignmentCommand) -> Result<EndpointStatus> {
        let excluded = if command.excluded_members.is_empty() {
            None
        } else {
            Some(command.excluded_members.clone())
        };

        let output = self
            .client
            .modify_db_cluster_endpoint()
            .db_cluster_endpoint_identifier(&command.endpoint_identity)
            .endpoint_type(command.mode.to_string())
            .set_static_members(Some(command.static_members.clone()))
            .set_excluded_members(excluded)
            .send()
            .await
            .map_err(|e| {
                classify_sdk_error(
                    "ModifyDBClusterEndpoint",
                    "custom endpoint",
                    &command.endpoint_identity,
                    "<any>",
                    e,
                )
            })?;

        Ok(EndpointStatus::parse(output.status().unwrap_or_default()))
    }
}

/// Map an SDK cluster member; members without an instance identifier are skipped
pub fn member_from_sdk(member: &DbClusterMember) -> Option<ClusterMember> {
    let identity = member.db_instance_identifier().filter(|id| !id.is_empty())?;
    Some(ClusterMember {
        instance_identity: identity.to_string(),
        is_writer: member.is_cluster_writer().unwrap_or(false),
    })
}

/// Map an SDK cluster endpoint; endpoints without an identifier are skipped
pub fn endpoint_from_sdk(endpoint: &DbClusterEndpoint) -> Option<EndpointDescriptor> {
    let identity = endpoint
        .db_cluster_endpoint_identifier()
        .filter(|id| !id.is_empty())?;

    Some(EndpointDescriptor {
        endpoint_identity: identity.to_string(),
        endpoint_type: EndpointType::parse(endpoint.endpoint_type().unwrap_or_default()),
        custom_endpoint_type: endpoint.custom_endpoint_type().map(str::to_string),
        bound_members: endpoint.static_members().iter().cloned().collect(),
        excluded_members: endpoint.excluded_members().iter().cloned().collect(),
        status: EndpointStatus::parse(endpoint.status().unwrap_or_default()),
        address: endpoint.endpoint().map(str::to_string),
    })
}

fn classify_sdk_error<E, R>(
    operation: &str,
    kind: &str,
    identity: &str,
    cluster: &str,
    err: SdkError<E, R>,
) -> ReconcileError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let full_msg = format!("{operation}: {}", DisplayErrorContext(&err));

    match err {
        SdkError::ServiceError(ctx) => {
            let code = ctx.err().code().unwrap_or("Unknown").to_string();
            classify_service_error(&code, &full_msg, kind, identity, cluster)
        }
        SdkError::TimeoutError(_) => ReconcileError::Transient(full_msg),
        SdkError::DispatchFailure(_) => ReconcileError::Transient(full_msg),
        SdkError::ConstructionFailure(_) => ReconcileError::InvalidConfig(full_msg),
        SdkError::ResponseError(_) => ReconcileError::Decode(full_msg),
        _ => classify_error_message(&full_msg),
    }
}

/// Classify an RDS service error by its error code
pub fn classify_service_error(
    code: &str,
    msg: &str,
    kind: &str,
    identity: &str,
    cluster: &str,
) -> ReconcileError {
    match code {
        "DBClusterNotFoundFault" | "DBClusterEndpointNotFoundFault" | "DBInstanceNotFound" => {
            ReconcileError::not_found(kind, identity, cluster)
        }
        "InvalidDBClusterStateFault"
        | "InvalidDBClusterEndpointStateFault"
        | "InvalidDBInstanceState"
        | "Throttling"
        | "ThrottlingException"
        | "RequestLimitExceeded"
        | "InternalFailure"
        | "ServiceUnavailable" => ReconcileError::Transient(msg.to_string()),
        "InvalidParameterValue" | "InvalidParameterCombination" => {
            ReconcileError::InvalidInput(msg.to_string())
        }
        "AccessDenied" | "AccessDeniedException" | "UnrecognizedClientException"
        | "InvalidClientTokenId" | "ExpiredToken" => ReconcileError::InvalidConfig(msg.to_string()),
        _ => classify_error_message(msg),
    }
}

/// Fallback classification based on error message substrings
fn classify_error_message(msg: &str) -> ReconcileError {
    let lower = msg.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        ReconcileError::Timeout(msg.to_string())
    } else if lower.contains("access denied") || lower.contains("not authorized") {
        ReconcileError::InvalidConfig(msg.to_string())
    } else {
        ReconcileError::Transient(msg.to_string())
    }
}
