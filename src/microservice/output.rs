//! Read-side views over configured microservices
//!
//! Every operation takes the node mode resolved once for the request. Nodes
//! that are not workload-based have no microservice view: they get empty
//! results and the store is not read.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::policy::PolicyDocument;
use super::store::ConfigStore;
use super::types::{AttributeSet, ConfiguredMicroservice, MicroserviceId};
use crate::Result;
use crate::node::NodeMode;

/// One entry of the microservice listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfiguredMicroserviceSummary {
    pub microservice: MicroserviceId,
    pub label: String,
    pub dependencies: Vec<MicroserviceId>,
    pub policy_digest: String,
    pub registered_at: DateTime<Utc>,
}

impl From<&ConfiguredMicroservice> for ConfiguredMicroserviceSummary {
    fn from(record: &ConfiguredMicroservice) -> Self {
        Self {
            microservice: record.microservice.clone(),
            label: record.label.clone(),
            dependencies: record.dependencies.clone(),
            policy_digest: record.policy.digest(),
            registered_at: record.registered_at,
        }
    }
}

/// `GET /microservice` body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MicroserviceListing {
    pub microservices: Vec<ConfiguredMicroserviceSummary>,
}

/// Configuration of one microservice as the registrant supplied it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MicroserviceConfig {
    pub microservice: MicroserviceId,
    pub label: String,
    pub attributes: AttributeSet,
    pub auto_upgrade: bool,
    pub active_upgrade: bool,
}

impl From<ConfiguredMicroservice> for MicroserviceConfig {
    fn from(record: ConfiguredMicroservice) -> Self {
        Self {
            microservice: record.microservice,
            label: record.label,
            attributes: record.attributes,
            auto_upgrade: record.auto_upgrade,
            active_upgrade: record.active_upgrade,
        }
    }
}

/// `GET /microservice/config` body
///
/// `config` is always serialized, empty or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigListing {
    pub config: Vec<MicroserviceConfig>,
    /// False when the node mode has no microservice configuration
    #[serde(skip)]
    pub supported: bool,
}

impl ConfigListing {
    const fn unsupported() -> Self {
        Self {
            config: Vec::new(),
            supported: false,
        }
    }
}

/// Policy documents keyed by microservice identity
pub type PolicyListing = BTreeMap<String, PolicyDocument>;

/// Builds the externally visible views from the configuration store
#[derive(Clone)]
pub struct OutputAggregator {
    store: Arc<dyn ConfigStore>,
}

impl OutputAggregator {
    #[must_use]
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Summaries of every configured microservice
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read
    pub fn list_microservices(&self, mode: NodeMode) -> Result<MicroserviceListing> {
        if !mode.is_workload_based() {
            return Ok(MicroserviceListing::default());
        }

        let microservices = self
            .store
            .list_all()?
            .iter()
            .map(ConfiguredMicroserviceSummary::from)
            .collect();

        Ok(MicroserviceListing { microservices })
    }

    /// Attributes and upgrade flags of every configured microservice
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read
    pub fn list_configs(&self, mode: NodeMode) -> Result<ConfigListing> {
        if !mode.is_workload_based() {
            return Ok(ConfigListing::unsupported());
        }

        let config = self
            .store
            .list_all()?
            .into_iter()
            .map(MicroserviceConfig::from)
            .collect();

        Ok(ConfigListing {
            config,
            supported: true,
        })
    }

    /// Policy document of every configured microservice
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read
    pub fn list_policies(&self, mode: NodeMode) -> Result<PolicyListing> {
        if !mode.is_workload_based() {
            return Ok(PolicyListing::new());
        }

        Ok(self
            .store
            .list_all()?
            .into_iter()
            .map(|record| (record.microservice.to_string(), record.policy))
            .collect())
    }
}
