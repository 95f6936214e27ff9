//! Shared test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use edge_agent::catalog::{CatalogClient, CatalogResult, LocalCatalog};
use edge_agent::db::{DeviceRepo, MicroserviceRepo};
use edge_agent::events::{ChannelSink, PolicyChangeEvent};
use edge_agent::microservice::{
    AttributeSpec, AttributeType, ConfigStore, MicroserviceDefinition, MicroserviceId,
    OutputAggregator, PatternDefinition, PatternId, PolicyRole, RegistrationPipeline,
};
use edge_agent::node::{DeviceRegistration, NodeMode};
use edge_agent::{DbPool, db};
use tokio::sync::mpsc;

/// Catalog timeout used by test pipelines
pub const CATALOG_TIMEOUT: Duration = Duration::from_secs(5);

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Record a node registration in the given mode
pub fn register_node(db: &DbPool, mode: NodeMode) {
    DeviceRepo::new(db.clone())
        .register(DeviceRegistration {
            node_id: "node-1".to_string(),
            org: "org".to_string(),
            pattern: None,
            mode: Some(mode),
            token: "node-token".to_string(),
        })
        .expect("failed to register test node");
}

pub fn id(s: &str) -> MicroserviceId {
    s.parse().expect("valid microservice id")
}

fn spec(name: &str, kind: AttributeType, mandatory: bool, policy: PolicyRole) -> AttributeSpec {
    AttributeSpec {
        name: name.to_string(),
        kind,
        mandatory,
        policy,
    }
}

fn definition(
    identity: &str,
    attributes: Vec<AttributeSpec>,
    dependencies: &[&str],
) -> MicroserviceDefinition {
    MicroserviceDefinition {
        id: id(identity),
        label: identity.to_string(),
        description: None,
        attributes,
        dependencies: dependencies.iter().map(|d| id(d)).collect(),
        extensible: false,
    }
}

/// Catalog used across the integration tests
///
/// - `org/sensor-svc/1.0/amd64`: mandatory int `pollInterval`, optional string constraint `region`
/// - `org/gps/2.0/amd64`: mandatory bool `highAccuracy`, depends on `org/gps-lib/2.0/amd64`
/// - `org/gps-lib/2.0/amd64`: no attributes
/// - `org/broken-svc/1.0/amd64`: depends on `org/missing/1.0/amd64`, absent from the catalog
/// - `org/loop-a/1.0/amd64` and `org/loop-b/1.0/amd64`: depend on each other
/// - `org/plugin-host/1.0/amd64`: extensible, mandatory string `name`
/// - pattern `org/weather`: sensor-svc and gps
/// - pattern `org/doubled`: sensor-svc listed twice
#[must_use]
pub fn test_catalog() -> LocalCatalog {
    let mut plugin_host = definition(
        "org/plugin-host/1.0/amd64",
        vec![spec("name", AttributeType::String, true, PolicyRole::Property)],
        &[],
    );
    plugin_host.extensible = true;

    LocalCatalog::new()
        .with_microservice(definition(
            "org/sensor-svc/1.0/amd64",
            vec![
                spec("pollInterval", AttributeType::Int, true, PolicyRole::Property),
                spec("region", AttributeType::String, false, PolicyRole::Constraint),
            ],
            &[],
        ))
        .with_microservice(definition(
            "org/gps/2.0/amd64",
            vec![spec("highAccuracy", AttributeType::Bool, true, PolicyRole::Property)],
            &["org/gps-lib/2.0/amd64"],
        ))
        .with_microservice(definition("org/gps-lib/2.0/amd64", vec![], &[]))
        .with_microservice(definition(
            "org/broken-svc/1.0/amd64",
            vec![],
            &["org/missing/1.0/amd64"],
        ))
        .with_microservice(definition(
            "org/loop-a/1.0/amd64",
            vec![],
            &["org/loop-b/1.0/amd64"],
        ))
        .with_microservice(definition(
            "org/loop-b/1.0/amd64",
            vec![],
            &["org/loop-a/1.0/amd64"],
        ))
        .with_microservice(plugin_host)
        .with_pattern(PatternDefinition {
            id: "org/weather".parse::<PatternId>().expect("valid pattern id"),
            label: "Weather station".to_string(),
            microservices: vec![id("org/sensor-svc/1.0/amd64"), id("org/gps/2.0/amd64")],
        })
        .with_pattern(PatternDefinition {
            id: "org/doubled".parse::<PatternId>().expect("valid pattern id"),
            label: "Doubled".to_string(),
            microservices: vec![
                id("org/sensor-svc/1.0/amd64"),
                id("org/sensor-svc/1.0/amd64"),
            ],
        })
}

/// Catalog that counts microservice lookups per identity
pub struct CountingCatalog {
    inner: LocalCatalog,
    pub lookups: Mutex<HashMap<MicroserviceId, usize>>,
}

impl CountingCatalog {
    #[must_use]
    pub fn new(inner: LocalCatalog) -> Self {
        Self {
            inner,
            lookups: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CatalogClient for CountingCatalog {
    async fn get_microservice(
        &self,
        id: &MicroserviceId,
    ) -> CatalogResult<MicroserviceDefinition> {
        *self.lookups.lock().unwrap().entry(id.clone()).or_default() += 1;
        self.inner.get_microservice(id).await
    }

    async fn get_pattern(&self, id: &PatternId) -> CatalogResult<PatternDefinition> {
        self.inner.get_pattern(id).await
    }
}

/// Catalog that never answers in time
pub struct StalledCatalog;

#[async_trait]
impl CatalogClient for StalledCatalog {
    async fn get_microservice(
        &self,
        _id: &MicroserviceId,
    ) -> CatalogResult<MicroserviceDefinition> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        unreachable!("stalled catalog outlived the pipeline timeout")
    }

    async fn get_pattern(&self, _id: &PatternId) -> CatalogResult<PatternDefinition> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        unreachable!("stalled catalog outlived the pipeline timeout")
    }
}

/// A pipeline wired to an in-memory database and an observable event channel
pub struct TestAgent {
    pub db: DbPool,
    pub store: Arc<dyn ConfigStore>,
    pub pipeline: Arc<RegistrationPipeline>,
    pub output: OutputAggregator,
    pub events: mpsc::Receiver<PolicyChangeEvent>,
}

impl TestAgent {
    #[must_use]
    pub fn new() -> Self {
        Self::with_catalog(Arc::new(test_catalog()), CATALOG_TIMEOUT)
    }

    #[must_use]
    pub fn with_catalog(catalog: Arc<dyn CatalogClient>, timeout: Duration) -> Self {
        let db = setup_test_db();
        let store: Arc<dyn ConfigStore> = Arc::new(MicroserviceRepo::new(db.clone()));
        let (sink, events) = ChannelSink::channel(64);
        let pipeline = Arc::new(RegistrationPipeline::new(
            catalog,
            Arc::clone(&store),
            Arc::new(sink),
            timeout,
        ));
        let output = OutputAggregator::new(Arc::clone(&store));

        Self {
            db,
            store,
            pipeline,
            output,
            events,
        }
    }

    /// Drain every event published so far
    pub fn drain_events(&mut self) -> Vec<PolicyChangeEvent> {
        std::iter::from_fn(|| self.events.try_recv().ok()).collect()
    }
}
