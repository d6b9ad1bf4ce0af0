//! Failover notification decoding
//!
//! Notifications arrive either as the bare RDS event detail or wrapped in
//! an event-bus envelope whose `detail` field carries it:
//!
//! ```json
//! {
//!   "detail-type": "RDS DB Cluster Event",
//!   "source": "aws.rds",
//!   "detail": {
//!     "EventCategories": ["failover"],
//!     "SourceType": "CLUSTER",
//!     "SourceArn": "arn:aws:rds:ap-southeast-1:123456789012:cluster:demo-cluster",
//!     "Date": "2024-03-01T10:15:30.123Z",
//!     "SourceIdentifier": "demo-cluster",
//!     "Message": "Completed failover to DB instance: demo-instance-2"
//!   }
//! }
//! ```

use crate::error::{ReconcileError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of the cluster identity in a colon-delimited resource locator
const ARN_CLUSTER_SEGMENT: usize = 6;

/// One decoded failover notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailoverEvent {
    pub cluster_identity: String,
    pub source_identifier: String,
    pub source_type: String,
    pub source_arn: String,
    pub event_categories: Vec<String>,
    pub message: String,
    pub occurred_at: Option<DateTime<Utc>>,
}

impl FailoverEvent {
    /// Placeholder used when decoding failed and the run continues anyway
    pub fn empty() -> Self {
        Self::default()
    }

    /// Event for a cluster, with no descriptive metadata
    pub fn for_cluster(cluster: impl Into<String>) -> Self {
        Self {
            cluster_identity: cluster.into(),
            ..Self::default()
        }
    }

    pub fn is_failover(&self) -> bool {
        self.event_categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case("failover"))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EventDetail {
    #[serde(default)]
    event_categories: Vec<String>,
    #[serde(default)]
    source_type: String,
    source_arn: String,
    #[serde(default)]
    date: Option<DateTime<Utc>>,
    #[serde(default)]
    source_identifier: String,
    #[serde(default)]
    message: String,
}

/// Decode a raw notification payload
pub fn decode(raw: &[u8]) -> Result<FailoverEvent> {
    let value: serde_json::Value = serde_json::from_slice(raw)
        .map_err(|e| ReconcileError::Decode(format!("payload is not JSON: {}", e)))?;

    let detail = match value.get("detail") {
        Some(detail) if detail.is_object() => detail.clone(),
        _ => value,
    };

    let detail: EventDetail = serde_json::from_value(detail)
        .map_err(|e| ReconcileError::Decode(format!("unexpected event shape: {}", e)))?;

    let cluster_identity = cluster_identity_from_arn(&detail.source_arn)?;

    Ok(FailoverEvent {
        cluster_identity,
        source_identifier: detail.source_identifier,
        source_type: detail.source_type,
        source_arn: detail.source_arn,
        event_categories: detail.event_categories,
        message: detail.message,
        occurred_at: detail.date,
    })
}

/// Extract the cluster identity from a resource locator
///
/// `arn:aws:rds:region:account:cluster:demo-cluster` yields `demo-cluster`.
pub fn cluster_identity_from_arn(arn: &str) -> Result<String> {
    match arn.split(':').nth(ARN_CLUSTER_SEGMENT) {
        Some(identity) if !identity.is_empty() => Ok(identity.to_string()),
        Some(_) => Err(ReconcileError::Decode(format!(
            "resource locator '{}' has an empty cluster segment",
            arn
        ))),
        None => Err(ReconcileError::Decode(format!(
            "resource locator '{}' has fewer than {} segments",
            arn,
            ARN_CLUSTER_SEGMENT + 1
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DETAIL: &str = r#"{
        "EventCategories": ["failover"],
        "SourceType": "CLUSTER",
        "SourceArn": "arn:aws:rds:region:acct:cluster:demo-cluster",
        "Date": "2024-03-01T10:15:30Z",
        "SourceIdentifier": "demo-cluster",
        "Message": "Started cross AZ failover to DB instance: demo-2"
    }"#;

    #[test]
    fn test_decode_bare_detail() {
        let event = decode(DETAIL.as_bytes()).unwrap();
        assert_eq!(event.cluster_identity, "demo-cluster");
        assert_eq!(event.source_type, "CLUSTER");
        assert!(event.is_failover());
        assert_eq!(
            event.occurred_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 30).unwrap())
        );
    }

    #[test]
    fn test_decode_envelope() {
        let envelope = format!(
            r#"{{"version":"0","detail-type":"RDS DB Cluster Event","source":"aws.rds","detail":{}}}"#,
            DETAIL
        );
        let event = decode(envelope.as_bytes()).unwrap();
        assert_eq!(event.cluster_identity, "demo-cluster");
        assert!(event.message.contains("failover"));
    }

    #[test]
    fn test_decode_minimal_detail() {
        let event =
            decode(br#"{"SourceArn":"arn:aws:rds:us-east-1:1:cluster:orders"}"#).unwrap();
        assert_eq!(event.cluster_identity, "orders");
        assert!(event.event_categories.is_empty());
        assert!(event.occurred_at.is_none());
    }

    #[test]
    fn test_decode_rejects_non_json() {
        let err = decode(b"not json").unwrap_err();
        assert!(matches!(err, ReconcileError::Decode(_)));
    }

    #[test]
    fn test_decode_rejects_missing_arn() {
        let err = decode(br#"{"Message":"hello"}"#).unwrap_err();
        assert!(matches!(err, ReconcileError::Decode(_)));
    }

    #[test]
    fn test_short_arn() {
        let err = cluster_identity_from_arn("arn:aws:rds:region").unwrap_err();
        assert!(err.to_string().contains("fewer than 7 segments"));
    }

    #[test]
    fn test_empty_cluster_segment() {
        assert!(cluster_identity_from_arn("arn:aws:rds:r:a:cluster:").is_err());
    }

    #[test]
    fn test_empty_event_has_no_cluster() {
        assert!(FailoverEvent::empty().cluster_identity.is_empty());
        assert_eq!(FailoverEvent::for_cluster("c1").cluster_identity, "c1");
    }
}
