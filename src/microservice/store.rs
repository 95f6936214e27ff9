//! Persistence seam for configured microservices

use super::types::{ConfiguredMicroservice, MicroserviceId};
use crate::Result;

/// Durable mapping from microservice identity to its configuration record
///
/// Implementations must make [`ConfigStore::put_all`] atomic: a concurrent
/// reader sees either every previous record or every new one, never a mix
pub trait ConfigStore: Send + Sync {
    /// Get the record for an identity
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the store cannot be reached
    fn get(&self, id: &MicroserviceId) -> Result<Option<ConfiguredMicroservice>>;

    /// Insert or replace the record keyed by its identity
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the store cannot be reached
    fn put(&self, record: &ConfiguredMicroservice) -> Result<()> {
        self.put_all(std::slice::from_ref(record))
    }

    /// Insert or replace several records in one atomic write
    ///
    /// Either every record is stored or none is.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the store cannot be reached
    fn put_all(&self, records: &[ConfiguredMicroservice]) -> Result<()>;

    /// All records, ordered by identity
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StoreUnavailable`] if the store cannot be reached
    fn list_all(&self) -> Result<Vec<ConfiguredMicroservice>>;
}
