//! Remote catalog of microservice and pattern definitions
//!
//! The node never edits the catalog; it only fetches definitions and walks
//! their dependency references when a microservice is registered.

pub mod http;
pub mod local;

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::microservice::{MicroserviceDefinition, MicroserviceId, PatternDefinition, PatternId};

pub use http::ExchangeClient;
pub use local::LocalCatalog;

/// Errors returned by catalog clients
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The catalog has no definition with this identity
    #[error("{0} not found in catalog")]
    NotFound(String),

    /// The catalog could not be reached or returned garbage
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    /// Dependency references form a cycle
    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    /// A dependency reference points at nothing
    #[error("dependency {dependency} required by {required_by} not found in catalog")]
    Unresolvable {
        dependency: String,
        required_by: String,
    },
}

/// Result type for catalog operations
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Source of microservice and pattern definitions
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetch a microservice definition
    async fn get_microservice(&self, id: &MicroserviceId) -> CatalogResult<MicroserviceDefinition>;

    /// Fetch a pattern definition
    async fn get_pattern(&self, id: &PatternId) -> CatalogResult<PatternDefinition>;

    /// Resolve the transitive dependencies of a microservice
    ///
    /// Returns a flat list, dependencies before their dependents, without
    /// duplicates and without `id` itself
    async fn resolve_dependencies(
        &self,
        id: &MicroserviceId,
    ) -> CatalogResult<Vec<MicroserviceId>> {
        let definition = self.get_microservice(id).await?;
        self.resolve_dependencies_of(&definition).await
    }

    /// Resolve the transitive dependencies of an already fetched definition
    async fn resolve_dependencies_of(
        &self,
        definition: &MicroserviceDefinition,
    ) -> CatalogResult<Vec<MicroserviceId>> {
        resolve_transitive(self, definition).await
    }
}

/// One microservice on the resolution path
struct Frame {
    id: MicroserviceId,
    dependencies: Vec<MicroserviceId>,
    next: usize,
}

/// Depth-first walk over dependency references
///
/// # Errors
///
/// Returns [`CatalogError::Cycle`] when a reference leads back onto the
/// current path and [`CatalogError::Unresolvable`] when one is missing
pub async fn resolve_transitive<C>(
    catalog: &C,
    root: &MicroserviceDefinition,
) -> CatalogResult<Vec<MicroserviceId>>
where
    C: CatalogClient + ?Sized,
{
    let root_id = &root.id;
    let mut path = vec![Frame {
        id: root_id.clone(),
        dependencies: root.dependencies.clone(),
        next: 0,
    }];
    let mut resolved: HashSet<MicroserviceId> = HashSet::new();
    let mut order = Vec::new();

    while let Some(frame) = path.last_mut() {
        let Some(dependency) = frame.dependencies.get(frame.next).cloned() else {
            if let Some(done) = path.pop()
                && done.id != *root_id
            {
                resolved.insert(done.id.clone());
                order.push(done.id);
            }
            continue;
        };
        frame.next += 1;
        let required_by = frame.id.clone();

        if resolved.contains(&dependency) {
            continue;
        }

        if let Some(start) = path.iter().position(|f| f.id == dependency) {
            let mut cycle: Vec<String> =
                path[start..].iter().map(|f| f.id.to_string()).collect();
            cycle.push(dependency.to_string());
            return Err(CatalogError::Cycle(cycle));
        }

        let definition = match catalog.get_microservice(&dependency).await {
            Ok(definition) => definition,
            Err(CatalogError::NotFound(_)) => {
                return Err(CatalogError::Unresolvable {
                    dependency: dependency.to_string(),
                    required_by: required_by.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        tracing::trace!(
            dependency = %dependency,
            required_by = %required_by,
            "resolved dependency"
        );

        path.push(Frame {
            id: dependency,
            dependencies: definition.dependencies,
            next: 0,
        });
    }

    Ok(order)
}
