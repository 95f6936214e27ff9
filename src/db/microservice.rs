//! Microservice repository for configured microservice records

use rusqlite::TransactionBehavior;

use super::{DbPool, connect};
use crate::Result;
use crate::microservice::{ConfigStore, ConfiguredMicroservice, MicroserviceId};

/// Microservice configuration repository
#[derive(Clone)]
pub struct MicroserviceRepo {
    pool: DbPool,
}

impl MicroserviceRepo {
    /// Create a new microservice repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Decode a stored record
    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConfiguredMicroservice> {
        let record: String = row.get(0)?;
        serde_json::from_str(&record).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
    }
}

impl ConfigStore for MicroserviceRepo {
    fn get(&self, id: &MicroserviceId) -> Result<Option<ConfiguredMicroservice>> {
        let conn = connect(&self.pool)?;

        let result = conn.query_row(
            "SELECT record FROM microservices WHERE identity = ?1",
            rusqlite::params![id.to_string()],
            Self::row_to_record,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put_all(&self, records: &[ConfiguredMicroservice]) -> Result<()> {
        let mut conn = connect(&self.pool)?;

        // IMMEDIATE takes the write lock up front so same-key writers queue
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut stmt = tx.prepare(
                r"
                INSERT INTO microservices (identity, record, policy_digest, registered_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(identity) DO UPDATE SET
                    record = excluded.record,
                    policy_digest = excluded.policy_digest,
                    registered_at = excluded.registered_at
                ",
            )?;
            for record in records {
                stmt.execute(rusqlite::params![
                    record.microservice.to_string(),
                    serde_json::to_string(record)?,
                    record.policy.digest(),
                    record.registered_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!(records = records.len(), "microservice records stored");
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<ConfiguredMicroservice>> {
        let conn = connect(&self.pool)?;

        let mut stmt = conn.prepare("SELECT record FROM microservices ORDER BY identity")?;
        let rows = stmt.query_map([], Self::row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }

        Ok(records)
    }
}
