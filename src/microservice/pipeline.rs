//! Microservice registration pipeline
//!
//! ```text
//! decode → catalog lookup → dependency resolution → attribute validation
//!        → existing-record check → policy synthesis → store write → event
//! ```
//!
//! Every stage short-circuits on failure. The store is written last, so a
//! failed registration never leaves partial state behind.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::sync::OwnedMutexGuard;

use super::attributes::{RawAttributes, ValidatedAttributes, check_declared, scope_to, validate};
use super::policy::synthesize;
use super::store::ConfigStore;
use super::types::{
    ConfiguredMicroservice, MicroserviceDefinition, MicroserviceId, PatternDefinition, PatternId,
};
use crate::catalog::{CatalogClient, CatalogError, CatalogResult};
use crate::events::{EventSink, PolicyChange, PolicyChangeEvent};
use crate::{Error, Result};

/// Registration request body
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrationRequest {
    /// Microservice to configure
    #[serde(default)]
    pub microservice: Option<MicroserviceId>,
    /// Pattern whose microservices should all be configured
    #[serde(default)]
    pub pattern: Option<PatternId>,
    #[serde(default, deserialize_with = "unique_attributes")]
    pub attributes: RawAttributes,
    #[serde(default = "default_true")]
    pub auto_upgrade: bool,
    #[serde(default)]
    pub active_upgrade: bool,
}

const fn default_true() -> bool {
    true
}

/// Decode the attribute object, rejecting repeated names
fn unique_attributes<'de, D>(deserializer: D) -> std::result::Result<RawAttributes, D::Error>
where
    D: Deserializer<'de>,
{
    struct UniqueMap;

    impl<'de> Visitor<'de> for UniqueMap {
        type Value = RawAttributes;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an object of attribute values")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut attributes = RawAttributes::new();
            while let Some((name, value)) = map.next_entry::<String, Value>()? {
                if attributes.contains_key(&name) {
                    return Err(de::Error::custom(format!("duplicate attribute '{name}'")));
                }
                attributes.insert(name, value);
            }
            Ok(attributes)
        }
    }

    deserializer.deserialize_map(UniqueMap)
}

/// What a request asks to configure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Microservice(MicroserviceId),
    Pattern(PatternId),
}

impl RegistrationRequest {
    /// Decode a raw request body
    ///
    /// # Errors
    ///
    /// Returns a user input error if the body is not a valid request or names
    /// neither or both of `microservice` and `pattern`
    pub fn decode(raw: &[u8]) -> Result<(Target, Self)> {
        let request: Self = serde_json::from_slice(raw).map_err(|e| {
            Error::user_input(
                "microservice",
                format!(
                    "body couldn't be deserialized to a registration request: {}, error: {e}",
                    String::from_utf8_lossy(raw)
                ),
            )
        })?;

        let target = match (&request.microservice, &request.pattern) {
            (Some(id), None) => Target::Microservice(id.clone()),
            (None, Some(id)) => Target::Pattern(id.clone()),
            (Some(_), Some(_)) => {
                return Err(Error::user_input(
                    "pattern",
                    "name either a microservice or a pattern, not both",
                ));
            }
            (None, None) => {
                return Err(Error::user_input(
                    "microservice",
                    "a microservice or pattern identity is required",
                ));
            }
        };

        Ok((target, request))
    }
}

/// Records committed by one registration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Registration {
    Microservice(ConfiguredMicroservice),
    Pattern {
        pattern: PatternId,
        microservices: Vec<ConfiguredMicroservice>,
    },
}

impl Registration {
    /// All committed records
    #[must_use]
    pub fn records(&self) -> &[ConfiguredMicroservice] {
        match self {
            Self::Microservice(record) => std::slice::from_ref(record),
            Self::Pattern { microservices, .. } => microservices,
        }
    }
}

/// A microservice that passed every check that does not touch the store
struct Prepared {
    definition: MicroserviceDefinition,
    attributes: ValidatedAttributes,
    dependencies: Vec<MicroserviceId>,
}

/// Validates, synthesizes and commits microservice configurations
pub struct RegistrationPipeline {
    catalog: Arc<dyn CatalogClient>,
    store: Arc<dyn ConfigStore>,
    events: Arc<dyn EventSink>,
    catalog_timeout: Duration,
    /// Serializes check-then-write per identity
    locks: Mutex<HashMap<MicroserviceId, Arc<tokio::sync::Mutex<()>>>>,
}

impl RegistrationPipeline {
    /// Create a pipeline over its collaborators
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        store: Arc<dyn ConfigStore>,
        events: Arc<dyn EventSink>,
        catalog_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            store,
            events,
            catalog_timeout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Register a microservice (or every microservice of a pattern)
    ///
    /// With `force` an existing record for the same identity is replaced;
    /// without it the registration fails with [`Error::AlreadyConfigured`].
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that failed
    pub async fn register(&self, raw: &[u8], force: bool) -> Result<Registration> {
        let (target, request) = RegistrationRequest::decode(raw)?;

        match target {
            Target::Microservice(id) => {
                let definition = self.lookup(&id).await?;
                let prepared = self.prepare(definition, &request.attributes).await?;
                let mut records = self.commit(vec![prepared], &request, force).await?;
                records
                    .pop()
                    .map(Registration::Microservice)
                    .ok_or_else(|| Error::Database("commit returned no record".to_string()))
            }
            Target::Pattern(pattern) => {
                let definition = self
                    .bounded("pattern lookup", self.catalog.get_pattern(&pattern))
                    .await?
                    .map_err(|e| Error::CatalogLookup(e.to_string()))?;

                let mut definitions = Vec::new();
                for id in constituents(&definition)? {
                    definitions.push(self.lookup(id).await?);
                }
                check_declared(&pattern.to_string(), &definitions, &request.attributes)?;

                let mut prepared = Vec::with_capacity(definitions.len());
                for microservice in definitions {
                    let scoped = scope_to(&microservice, &request.attributes);
                    prepared.push(self.prepare(microservice, &scoped).await?);
                }

                let microservices = self.commit(prepared, &request, force).await?;
                Ok(Registration::Pattern {
                    pattern,
                    microservices,
                })
            }
        }
    }

    /// Fetch one microservice definition from the catalog
    async fn lookup(&self, id: &MicroserviceId) -> Result<MicroserviceDefinition> {
        self.bounded("microservice lookup", self.catalog.get_microservice(id))
            .await?
            .map_err(|e| Error::CatalogLookup(e.to_string()))
    }

    /// Dependency resolution and attribute validation
    async fn prepare(
        &self,
        definition: MicroserviceDefinition,
        raw: &RawAttributes,
    ) -> Result<Prepared> {
        let dependencies = self
            .bounded(
                "dependency resolution",
                self.catalog.resolve_dependencies_of(&definition),
            )
            .await?
            .map_err(|e| match e {
                CatalogError::Unavailable(_) => Error::CatalogLookup(e.to_string()),
                _ => Error::DependencyResolution(e.to_string()),
            })?;

        let attributes = validate(&definition, raw)?;

        tracing::debug!(
            identity = %definition.id,
            dependencies = dependencies.len(),
            attributes = attributes.attributes().len(),
            "microservice validated"
        );

        Ok(Prepared {
            definition,
            attributes,
            dependencies,
        })
    }

    /// Existing-record check, synthesis, store write and notification
    async fn commit(
        &self,
        prepared: Vec<Prepared>,
        request: &RegistrationRequest,
        force: bool,
    ) -> Result<Vec<ConfiguredMicroservice>> {
        let mut ids: Vec<MicroserviceId> =
            prepared.iter().map(|p| p.definition.id.clone()).collect();
        ids.sort();
        ids.dedup();

        let guards = self.lock_all(&ids).await;
        let result = self.commit_locked(prepared, request, force);
        drop(guards);
        self.release(&ids);

        let committed = result?;
        for (record, change) in &committed {
            let event = PolicyChangeEvent::new(*change, record);
            if let Err(e) = self.events.publish(event) {
                tracing::warn!(
                    identity = %record.microservice,
                    error = %e,
                    "failed to publish policy change"
                );
            }
        }

        Ok(committed.into_iter().map(|(record, _)| record).collect())
    }

    fn commit_locked(
        &self,
        prepared: Vec<Prepared>,
        request: &RegistrationRequest,
        force: bool,
    ) -> Result<Vec<(ConfiguredMicroservice, PolicyChange)>> {
        let mut changes = Vec::with_capacity(prepared.len());
        for p in &prepared {
            let change = match self.store.get(&p.definition.id)? {
                Some(_) if !force => {
                    return Err(Error::AlreadyConfigured(p.definition.id.to_string()));
                }
                Some(_) => PolicyChange::Replaced,
                None => PolicyChange::Created,
            };
            changes.push(change);
        }

        let committed: Vec<(ConfiguredMicroservice, PolicyChange)> = prepared
            .into_iter()
            .zip(changes)
            .map(|(p, change)| {
                let policy = synthesize(&p.definition, &p.attributes, &p.dependencies);
                let record = ConfiguredMicroservice {
                    microservice: p.definition.id,
                    label: p.definition.label,
                    attributes: p.attributes.into_set(),
                    dependencies: p.dependencies,
                    policy,
                    auto_upgrade: request.auto_upgrade,
                    active_upgrade: request.active_upgrade,
                    registered_at: Utc::now(),
                };
                (record, change)
            })
            .collect();

        // One write for every record, so a pattern lands whole or not at all
        let records: Vec<ConfiguredMicroservice> =
            committed.iter().map(|(record, _)| record.clone()).collect();
        self.store.put_all(&records)?;

        for (record, change) in &committed {
            tracing::info!(
                identity = %record.microservice,
                change = ?change,
                "microservice configured"
            );
        }

        Ok(committed)
    }

    /// Bound a catalog call by the configured timeout
    async fn bounded<T, F>(&self, what: &str, call: F) -> Result<CatalogResult<T>>
    where
        F: Future<Output = CatalogResult<T>>,
    {
        tokio::time::timeout(self.catalog_timeout, call)
            .await
            .map_err(|_| {
                Error::CatalogLookup(format!(
                    "{what} timed out after {}ms",
                    self.catalog_timeout.as_millis()
                ))
            })
    }

    /// Take the per-identity locks in sorted order
    async fn lock_all(&self, ids: &[MicroserviceId]) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            let lock = {
                let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
                locks.entry(id.clone()).or_default().clone()
            };
            guards.push(lock.lock_owned().await);
        }
        guards
    }

    /// Forget locks nobody else is waiting on
    fn release(&self, ids: &[MicroserviceId]) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            if locks.get(id).is_some_and(|l| Arc::strong_count(l) == 1) {
                locks.remove(id);
            }
        }
    }
}

/// Distinct microservices of a pattern, in declaration order
fn constituents(pattern: &PatternDefinition) -> Result<Vec<&MicroserviceId>> {
    let mut seen = HashSet::new();
    let ids: Vec<&MicroserviceId> = pattern
        .microservices
        .iter()
        .filter(|id| seen.insert(*id))
        .collect();

    if ids.is_empty() {
        return Err(Error::user_input(
            "pattern",
            format!("pattern {} has no microservices to configure", pattern.id),
        ));
    }
    Ok(ids)
}
