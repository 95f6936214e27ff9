//! Device repository for the node registration record

use chrono::{DateTime, Utc};
use secrecy::SecretString;

use super::{DbPool, connect};
use crate::node::{Device, DeviceRegistration, NodeMode, NodeModeProvider};
use crate::{Error, Result};

/// Device repository
#[derive(Clone)]
pub struct DeviceRepo {
    pool: DbPool,
}

impl DeviceRepo {
    /// Create a new device repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Record (or replace) the node registration
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn register(&self, registration: DeviceRegistration) -> Result<Device> {
        let conn = connect(&self.pool)?;

        let mode = registration.effective_mode();
        let now = Utc::now();
        let pattern = registration.pattern.as_ref().map(ToString::to_string);

        conn.execute(
            r"
            INSERT INTO device (id, node_id, org, pattern, mode, token, registered_at)
            VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                node_id = excluded.node_id,
                org = excluded.org,
                pattern = excluded.pattern,
                mode = excluded.mode,
                token = excluded.token,
                registered_at = excluded.registered_at
            ",
            rusqlite::params![
                registration.node_id,
                registration.org,
                pattern,
                mode.as_str(),
                registration.token,
                now.to_rfc3339(),
            ],
        )?;

        tracing::info!(
            node_id = %registration.node_id,
            org = %registration.org,
            mode = %mode,
            "node registration recorded"
        );

        Ok(Device {
            node_id: registration.node_id,
            org: registration.org,
            pattern: registration.pattern,
            mode,
            token: SecretString::from(registration.token),
            registered_at: now,
        })
    }

    /// Get the node registration, if any
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn get(&self) -> Result<Option<Device>> {
        let conn = connect(&self.pool)?;

        let result = conn.query_row(
            "SELECT node_id, org, pattern, mode, token, registered_at FROM device WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        );

        let (node_id, org, pattern, mode, token, registered_at) = match result {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mode = NodeMode::parse(&mode)
            .ok_or_else(|| Error::Database(format!("unknown node mode '{mode}'")))?;
        let pattern = pattern.map(|p| p.parse()).transpose()?;

        Ok(Some(Device {
            node_id,
            org,
            pattern,
            mode,
            token: SecretString::from(token),
            registered_at: parse_datetime(&registered_at),
        }))
    }

    /// Catalog credentials (`org/node_id`, token) for the registered node
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn credentials(&self) -> Result<Option<(String, SecretString)>> {
        Ok(self
            .get()?
            .map(|device| (format!("{}/{}", device.org, device.node_id), device.token)))
    }
}

impl NodeModeProvider for DeviceRepo {
    fn current_mode(&self) -> Result<NodeMode> {
        self.get()?.map(|d| d.mode).ok_or(Error::NotRegistered)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;
    use crate::db::init_memory;

    fn setup() -> DeviceRepo {
        DeviceRepo::new(init_memory().unwrap())
    }

    fn registration(pattern: Option<&str>) -> DeviceRegistration {
        DeviceRegistration {
            node_id: "node-1".to_string(),
            org: "org".to_string(),
            pattern: pattern.map(|p| p.parse().unwrap()),
            mode: None,
            token: "s3cret".to_string(),
        }
    }

    #[test]
    fn unregistered_node_has_no_mode() {
        let repo = setup();
        assert!(repo.get().unwrap().is_none());
        assert!(matches!(repo.current_mode(), Err(Error::NotRegistered)));
    }

    #[test]
    fn register_and_read_back() {
        let repo = setup();
        repo.register(registration(None)).unwrap();

        let device = repo.get().unwrap().unwrap();
        assert_eq!(device.node_id, "node-1");
        assert_eq!(device.token.expose_secret(), "s3cret");
        assert_eq!(repo.current_mode().unwrap(), NodeMode::WorkloadBased);
    }

    #[test]
    fn re_registration_replaces_record() {
        let repo = setup();
        repo.register(registration(None)).unwrap();
        repo.register(registration(Some("org/weather"))).unwrap();

        let device = repo.get().unwrap().unwrap();
        assert_eq!(device.pattern.unwrap().to_string(), "org/weather");
        assert_eq!(repo.current_mode().unwrap(), NodeMode::ServiceBased);
    }

    #[test]
    fn credentials_are_org_scoped() {
        let repo = setup();
        assert!(repo.credentials().unwrap().is_none());

        repo.register(registration(None)).unwrap();
        let (user, token) = repo.credentials().unwrap().unwrap();
        assert_eq!(user, "org/node-1");
        assert_eq!(token.expose_secret(), "s3cret");
    }
}
