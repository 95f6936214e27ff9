//! The node's own registration record
//!
//! The record decides whether the node runs the legacy workload model or the
//! service model. Microservice configuration is only meaningful for
//! workload-based nodes.

use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::microservice::PatternId;

/// How the node runs workloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeMode {
    #[serde(rename = "workload")]
    WorkloadBased,
    #[serde(rename = "service")]
    ServiceBased,
}

impl NodeMode {
    /// Whether legacy microservice configuration applies
    #[must_use]
    pub const fn is_workload_based(self) -> bool {
        matches!(self, Self::WorkloadBased)
    }

    /// Storage representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WorkloadBased => "workload",
            Self::ServiceBased => "service",
        }
    }

    /// Parse the storage representation
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "workload" => Some(Self::WorkloadBased),
            "service" => Some(Self::ServiceBased),
            _ => None,
        }
    }
}

impl fmt::Display for NodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted node registration
#[derive(Debug)]
pub struct Device {
    pub node_id: String,
    pub org: String,
    pub pattern: Option<PatternId>,
    pub mode: NodeMode,
    /// Catalog credential for this node
    pub token: SecretString,
    pub registered_at: DateTime<Utc>,
}

/// Request to record this node's registration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceRegistration {
    pub node_id: String,
    pub org: String,
    #[serde(default)]
    pub pattern: Option<PatternId>,
    /// Defaults to service-based when a pattern is given, else workload-based
    #[serde(default)]
    pub mode: Option<NodeMode>,
    pub token: String,
}

impl DeviceRegistration {
    /// Mode the node will run in
    #[must_use]
    pub fn effective_mode(&self) -> NodeMode {
        self.mode.unwrap_or(if self.pattern.is_some() {
            NodeMode::ServiceBased
        } else {
            NodeMode::WorkloadBased
        })
    }
}

/// Read access to the node's operating mode
///
/// Query once per request and pass the result along, so a registration change
/// mid-request cannot produce a mixed view
pub trait NodeModeProvider: Send + Sync {
    /// Current node mode
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotRegistered`] if the node has no registration
    /// record, or a store error if it cannot be read
    fn current_mode(&self) -> Result<NodeMode>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trips_storage_form() {
        for mode in [NodeMode::WorkloadBased, NodeMode::ServiceBased] {
            assert_eq!(NodeMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(NodeMode::parse("hybrid"), None);
    }

    #[test]
    fn pattern_registration_defaults_to_service_mode() {
        let reg: DeviceRegistration = serde_json::from_value(serde_json::json!({
            "node_id": "node-1",
            "org": "org",
            "pattern": "org/weather",
            "token": "secret",
        }))
        .unwrap();
        assert_eq!(reg.effective_mode(), NodeMode::ServiceBased);

        let reg: DeviceRegistration = serde_json::from_value(serde_json::json!({
            "node_id": "node-1",
            "org": "org",
            "token": "secret",
        }))
        .unwrap();
        assert_eq!(reg.effective_mode(), NodeMode::WorkloadBased);
    }
}
