//! Database module for node registration and microservice configuration

pub mod device;
pub mod microservice;
mod schema;

use std::path::Path;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

use crate::{Error, Result};

pub use device::DeviceRepo;
pub use microservice::MicroserviceRepo;
pub use schema::SCHEMA_VERSION;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled database connection
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Acquire a connection, reporting pool exhaustion as an unavailable store
pub(crate) fn connect(pool: &DbPool) -> Result<DbConn> {
    pool.get().map_err(|e| Error::StoreUnavailable(e.to_string()))
}

/// Initialize the database
///
/// # Errors
///
/// Returns error if database cannot be opened or initialized
pub fn init<P: AsRef<Path>>(path: P) -> Result<DbPool> {
    // Writers wait on each other instead of failing with SQLITE_BUSY
    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        c.busy_timeout(Duration::from_secs(5))
    });
    let pool = Pool::builder()
        .max_size(4)
        .build(manager)
        .map_err(|e| Error::Database(e.to_string()))?;

    // Run migrations on first connection
    let conn = connect(&pool)?;
    schema::init(&conn)?;

    tracing::info!(version = SCHEMA_VERSION, "database initialized");
    Ok(pool)
}

/// Initialize an in-memory database (for testing)
///
/// # Errors
///
/// Returns error if database cannot be initialized
pub fn init_memory() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(|e| Error::Database(e.to_string()))?;

    let conn = connect(&pool)?;
    schema::init(&conn)?;

    Ok(pool)
}
