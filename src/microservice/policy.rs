//! Policy synthesis for configured microservices
//!
//! A policy document lists what this node offers to a counterparty
//! (properties), what it requires of one (constraints), and which
//! microservices must be running for an agreement to be serviceable.
//! Synthesis is a pure function of its inputs; entries are kept in
//! canonical order so equal inputs yield byte-equal documents.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::attributes::ValidatedAttributes;
use super::types::{AttributeValue, MicroserviceDefinition, MicroserviceId, PolicyRole};

/// Policy document format version
pub const POLICY_VERSION: &str = "2.0";

/// Policy header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyHeader {
    pub name: String,
    pub version: String,
}

/// A property offered by this node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyProperty {
    pub name: String,
    pub value: AttributeValue,
}

/// A microservice that must be present to honor an agreement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredCapability {
    pub microservice: MicroserviceId,
}

/// Declarative constraint set derived from a configured microservice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub header: PolicyHeader,
    pub microservice: MicroserviceId,
    pub properties: Vec<PolicyProperty>,
    /// Expressions of the form `name == value`
    pub constraints: Vec<String>,
    pub required: Vec<RequiredCapability>,
}

impl PolicyDocument {
    /// Hex SHA-256 of the canonical JSON encoding
    #[must_use]
    pub fn digest(&self) -> String {
        // Field order is fixed by the struct and every list is sorted,
        // so the encoding is canonical.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(bytes))
    }

    /// Look up a property by name
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&AttributeValue> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

/// Synthesize the policy for a validated microservice configuration
///
/// # Panics
///
/// Panics if `attributes` were validated against a different definition.
/// That is a programming error, never a user-facing failure.
#[must_use]
pub fn synthesize(
    definition: &MicroserviceDefinition,
    attributes: &ValidatedAttributes,
    dependencies: &[MicroserviceId],
) -> PolicyDocument {
    assert_eq!(
        attributes.microservice(),
        &definition.id,
        "policy synthesis over attributes validated for another definition"
    );

    let mut properties = Vec::new();
    let mut constraints = Vec::new();

    // AttributeSet iterates in name order
    for (name, value) in attributes.attributes().iter() {
        let role = definition
            .attribute(name)
            .map_or(PolicyRole::Property, |spec| spec.policy);

        match role {
            PolicyRole::Property => properties.push(PolicyProperty {
                name: name.clone(),
                value: value.clone(),
            }),
            PolicyRole::Constraint => constraints.push(format!("{name} == {value}")),
            PolicyRole::None => {}
        }
    }

    let mut required: Vec<MicroserviceId> = dependencies.to_vec();
    required.sort();
    required.dedup();

    PolicyDocument {
        header: PolicyHeader {
            name: format!("{} policy", definition.id),
            version: POLICY_VERSION.to_string(),
        },
        microservice: definition.id.clone(),
        properties,
        constraints,
        required: required
            .into_iter()
            .map(|microservice| RequiredCapability { microservice })
            .collect(),
    }
}
