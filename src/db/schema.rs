//! Database schema and migrations

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Node registration record (at most one row)
        CREATE TABLE IF NOT EXISTS device (
            id INTEGER PRIMARY KEY CHECK(id = 1),
            node_id TEXT NOT NULL,
            org TEXT NOT NULL,
            pattern TEXT,
            mode TEXT NOT NULL CHECK(mode IN ('workload', 'service')),
            token TEXT NOT NULL,
            registered_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Configured microservices, one row per identity
        CREATE TABLE IF NOT EXISTS microservices (
            identity TEXT PRIMARY KEY,
            record TEXT NOT NULL,
            policy_digest TEXT NOT NULL,
            registered_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_microservices_digest ON microservices(policy_digest);

        PRAGMA user_version = 1;
        ",
    )?;

    tracing::info!("migrated to schema v1");
    Ok(())
}
