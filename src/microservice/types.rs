//! Microservice data model: identities, definitions, attributes and records

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::policy::PolicyDocument;
use crate::{Error, Result};

/// One identity segment
static SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._+-]+$").expect("valid regex"));

fn split_segments<const N: usize>(input: &str, what: &str, shape: &str) -> Result<[String; N]> {
    let parts: Vec<&str> = input.split('/').collect();
    if parts.len() != N {
        return Err(Error::user_input(
            what,
            format!("'{input}' must have the form {shape}"),
        ));
    }
    if let Some(bad) = parts.iter().find(|p| !SEGMENT.is_match(p)) {
        return Err(Error::user_input(
            what,
            format!("'{input}' has an invalid segment '{bad}'"),
        ));
    }
    let mut out: [String; N] = std::array::from_fn(|_| String::new());
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part.to_string();
    }
    Ok(out)
}

/// Stable identity of a microservice: `org/name/version/arch`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MicroserviceId {
    pub org: String,
    pub name: String,
    pub version: String,
    pub arch: String,
}

impl MicroserviceId {
    /// Build an identity from its parts
    pub fn new(
        org: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            org: org.into(),
            name: name.into(),
            version: version.into(),
            arch: arch.into(),
        }
    }
}

impl fmt::Display for MicroserviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.org, self.name, self.version, self.arch)
    }
}

impl FromStr for MicroserviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let [org, name, version, arch] =
            split_segments::<4>(s, "microservice", "org/name/version/arch")?;
        Ok(Self {
            org,
            name,
            version,
            arch,
        })
    }
}

impl TryFrom<String> for MicroserviceId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MicroserviceId> for String {
    fn from(id: MicroserviceId) -> Self {
        id.to_string()
    }
}

/// Identity of a pattern: `org/name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PatternId {
    pub org: String,
    pub name: String,
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.name)
    }
}

impl FromStr for PatternId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let [org, name] = split_segments::<2>(s, "pattern", "org/name")?;
        Ok(Self { org, name })
    }
}

impl TryFrom<String> for PatternId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PatternId> for String {
    fn from(id: PatternId) -> Self {
        id.to_string()
    }
}

/// Declared type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Int,
    /// Accepts integers too
    Float,
    Bool,
    /// Array of strings
    List,
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::List => "list",
        };
        f.write_str(name)
    }
}

/// How an attribute shows up in the synthesized policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyRole {
    /// Offered to counterparties as a property
    #[default]
    Property,
    /// Required of counterparties
    Constraint,
    /// Not policy relevant
    None,
}

/// Specification of one attribute a microservice accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AttributeType,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub policy: PolicyRole,
}

/// A microservice definition as published in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroserviceDefinition {
    pub id: MicroserviceId,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeSpec>,
    #[serde(default)]
    pub dependencies: Vec<MicroserviceId>,
    /// Accept attributes the definition does not declare
    #[serde(default)]
    pub extensible: bool,
}

impl MicroserviceDefinition {
    /// Look up an attribute specification by name
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// A named bundle of microservices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternDefinition {
    pub id: PatternId,
    #[serde(default)]
    pub label: String,
    pub microservices: Vec<MicroserviceId>,
}

/// A typed attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<String>),
}

impl AttributeValue {
    /// Type of this value
    #[must_use]
    pub const fn kind(&self) -> AttributeType {
        match self {
            Self::Bool(_) => AttributeType::Bool,
            Self::Int(_) => AttributeType::Int,
            Self::Float(_) => AttributeType::Float,
            Self::String(_) => AttributeType::String,
            Self::List(_) => AttributeType::List,
        }
    }

    /// Infer a value from JSON without a declared type
    ///
    /// Returns `None` for null, objects and arrays with non-string members
    #[must_use]
    pub fn infer(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::String(s.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|i| i.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(Self::List),
            serde_json::Value::Null | serde_json::Value::Object(_) => None,
        }
    }

    /// Coerce JSON into the declared type, if compatible
    #[must_use]
    pub fn coerce(value: &serde_json::Value, kind: AttributeType) -> Option<Self> {
        match (kind, value) {
            (AttributeType::Float, serde_json::Value::Number(n)) => n.as_f64().map(Self::Float),
            _ => Self::infer(value).filter(|v| v.kind() == kind),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::List(items) => f.write_str(&items.join(",")),
        }
    }
}

/// Attribute values keyed by name, always iterated in name order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSet(BTreeMap<String, AttributeValue>);

impl AttributeSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute value
    pub fn insert(&mut self, name: impl Into<String>, value: AttributeValue) {
        self.0.insert(name.into(), value);
    }

    /// Get an attribute value
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.0.get(name)
    }

    /// Iterate in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.0.iter()
    }

    /// Number of attributes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The persisted configuration of one microservice on this node
///
/// Never mutated in place; re-registration replaces the whole record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfiguredMicroservice {
    pub microservice: MicroserviceId,
    #[serde(default)]
    pub label: String,
    pub attributes: AttributeSet,
    /// Dependencies resolved at registration time
    pub dependencies: Vec<MicroserviceId>,
    pub policy: PolicyDocument,
    pub auto_upgrade: bool,
    pub active_upgrade: bool,
    pub registered_at: DateTime<Utc>,
}
