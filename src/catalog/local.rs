//! Catalog backed by definitions held in memory
//!
//! Offline nodes load it from a JSON file:
//!
//! ```json
//! { "microservices": [ ... ], "patterns": [ ... ] }
//! ```

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use super::{CatalogClient, CatalogError, CatalogResult};
use crate::microservice::{MicroserviceDefinition, MicroserviceId, PatternDefinition, PatternId};
use crate::{Error, Result};

/// On-disk catalog file layout
#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    microservices: Vec<MicroserviceDefinition>,
    #[serde(default)]
    patterns: Vec<PatternDefinition>,
}

/// In-memory catalog
#[derive(Debug, Clone, Default)]
pub struct LocalCatalog {
    microservices: HashMap<MicroserviceId, MicroserviceDefinition>,
    patterns: HashMap<PatternId, PatternDefinition>,
}

impl LocalCatalog {
    /// Create an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: CatalogFile = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid catalog file {}: {e}", path.display())))?;

        let catalog = file
            .microservices
            .into_iter()
            .fold(Self::new(), Self::with_microservice);
        let catalog = file
            .patterns
            .into_iter()
            .fold(catalog, Self::with_pattern);

        tracing::info!(
            path = %path.display(),
            microservices = catalog.microservices.len(),
            patterns = catalog.patterns.len(),
            "loaded local catalog"
        );
        Ok(catalog)
    }

    /// Add a microservice definition
    #[must_use]
    pub fn with_microservice(mut self, definition: MicroserviceDefinition) -> Self {
        self.microservices.insert(definition.id.clone(), definition);
        self
    }

    /// Add a pattern definition
    #[must_use]
    pub fn with_pattern(mut self, pattern: PatternDefinition) -> Self {
        self.patterns.insert(pattern.id.clone(), pattern);
        self
    }
}

#[async_trait]
impl CatalogClient for LocalCatalog {
    async fn get_microservice(&self, id: &MicroserviceId) -> CatalogResult<MicroserviceDefinition> {
        self.microservices
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    async fn get_pattern(&self, id: &PatternId) -> CatalogResult<PatternDefinition> {
        self.patterns
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn load_reads_microservices_and_patterns() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "microservices": [
                    {{
                        "id": "org/gps/1.0/arm64",
                        "label": "GPS",
                        "attributes": [{{"name": "accuracy", "type": "int", "mandatory": true}}]
                    }}
                ],
                "patterns": [
                    {{"id": "org/tracker", "microservices": ["org/gps/1.0/arm64"]}}
                ]
            }}"#
        )
        .unwrap();

        let catalog = LocalCatalog::load(file.path()).unwrap();
        let gps = MicroserviceId::new("org", "gps", "1.0", "arm64");

        let definition = tokio_test::block_on(catalog.get_microservice(&gps)).unwrap();
        assert_eq!(definition.label, "GPS");
        assert!(definition.attributes[0].mandatory);

        let pattern: PatternId = "org/tracker".parse().unwrap();
        let pattern = tokio_test::block_on(catalog.get_pattern(&pattern)).unwrap();
        assert_eq!(pattern.microservices, vec![gps]);
    }

    #[test]
    fn load_rejects_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"microservices": [{{"id": "not-an-id"}}]}}"#).unwrap();

        assert!(matches!(
            LocalCatalog::load(file.path()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn unknown_identity_is_not_found() {
        let catalog = LocalCatalog::new();
        let id = MicroserviceId::new("org", "nope", "1.0", "amd64");
        assert_eq!(
            tokio_test::block_on(catalog.get_microservice(&id)),
            Err(CatalogError::NotFound("org/nope/1.0/amd64".to_string()))
        );
    }
}
