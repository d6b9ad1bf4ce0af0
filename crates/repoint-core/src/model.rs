//! Cluster membership and endpoint types
//!
//! These mirror what the directory service and the endpoint control plane
//! report. Values are fetched fresh for every query and never cached.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One compute unit in a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMember {
    /// Instance identifier, unique within the cluster
    pub instance_identity: String,
    /// Whether this member currently accepts writes
    pub is_writer: bool,
}

impl ClusterMember {
    pub fn writer(identity: impl Into<String>) -> Self {
        Self {
            instance_identity: identity.into(),
            is_writer: true,
        }
    }

    pub fn reader(identity: impl Into<String>) -> Self {
        Self {
            instance_identity: identity.into(),
            is_writer: false,
        }
    }
}

/// Kind of a cluster endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointType {
    /// Administratively defined endpoint that can be rebound
    Custom,
    /// Any built-in endpoint (`WRITER`, `READER`, ...)
    Other(String),
}

impl EndpointType {
    /// Parse the control plane's label, case-insensitively
    pub fn parse(label: &str) -> Self {
        if label.eq_ignore_ascii_case("CUSTOM") {
            EndpointType::Custom
        } else {
            EndpointType::Other(label.to_ascii_uppercase())
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, EndpointType::Custom)
    }
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointType::Custom => f.write_str("CUSTOM"),
            EndpointType::Other(label) => f.write_str(label),
        }
    }
}

/// Lifecycle status of an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointStatus {
    Available,
    Creating,
    Deleting,
    Inactive,
    Modifying,
    /// Label the driver does not recognize
    Unknown(String),
}

impl EndpointStatus {
    /// Parse the control plane's label, case-insensitively
    pub fn parse(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "available" => EndpointStatus::Available,
            "creating" => EndpointStatus::Creating,
            "deleting" => EndpointStatus::Deleting,
            "inactive" => EndpointStatus::Inactive,
            "modifying" => EndpointStatus::Modifying,
            _ => EndpointStatus::Unknown(label.to_string()),
        }
    }

    /// `available` is the only terminal-success status
    pub fn is_ready(&self) -> bool {
        matches!(self, EndpointStatus::Available)
    }

    pub fn as_str(&self) -> &str {
        match self {
            EndpointStatus::Available => "available",
            EndpointStatus::Creating => "creating",
            EndpointStatus::Deleting => "deleting",
            EndpointStatus::Inactive => "inactive",
            EndpointStatus::Modifying => "modifying",
            EndpointStatus::Unknown(label) => label,
        }
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One administrative endpoint bound to a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    /// Endpoint identifier, unique within the cluster
    pub endpoint_identity: String,
    pub endpoint_type: EndpointType,
    /// Custom endpoint mode as reported (`ANY`, `READER`); absent on built-in endpoints
    pub custom_endpoint_type: Option<String>,
    /// Instances statically bound to the endpoint; empty means idle
    pub bound_members: BTreeSet<String>,
    pub excluded_members: BTreeSet<String>,
    pub status: EndpointStatus,
    /// DNS address of the endpoint
    pub address: Option<String>,
}

impl EndpointDescriptor {
    /// A custom endpoint with the given static members
    pub fn custom<I, S>(identity: impl Into<String>, members: I, status: EndpointStatus) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoint_identity: identity.into(),
            endpoint_type: EndpointType::Custom,
            custom_endpoint_type: Some(CustomEndpointMode::Any.to_string()),
            bound_members: members.into_iter().map(Into::into).collect(),
            excluded_members: BTreeSet::new(),
            status,
            address: None,
        }
    }

    /// Custom endpoint whose custom type label is present
    pub fn is_reassignable(&self) -> bool {
        self.endpoint_type.is_custom() && self.custom_endpoint_type.is_some()
    }

    /// Reassignable and nothing bound to it
    pub fn is_idle(&self) -> bool {
        self.is_reassignable() && self.bound_members.is_empty()
    }
}

/// Which instances a custom endpoint may route to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CustomEndpointMode {
    /// Any instance type may be bound
    #[default]
    Any,
    /// Only reader instances
    Reader,
}

impl fmt::Display for CustomEndpointMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomEndpointMode::Any => f.write_str("ANY"),
            CustomEndpointMode::Reader => f.write_str("READER"),
        }
    }
}

/// Binding of one endpoint to exactly one instance, replacing any prior binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignmentCommand {
    pub endpoint_identity: String,
    pub static_members: Vec<String>,
    pub mode: CustomEndpointMode,
    pub excluded_members: Vec<String>,
}

impl ReassignmentCommand {
    pub fn bind(endpoint: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            endpoint_identity: endpoint.into(),
            static_members: vec![instance.into()],
            mode: CustomEndpointMode::Any,
            excluded_members: Vec::new(),
        }
    }
}
