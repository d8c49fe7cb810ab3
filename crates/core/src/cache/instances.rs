//! Named cache instances and the live-identity record.
//!
//! Each deployable version owns one instance. Rotation is a rename at the
//! reference level: the new instance is filled under its own name, and old
//! names are dropped as a set difference once the new version activates.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::OptionalExtension;

use super::connection::CacheDb;
use crate::Error;

/// Version-scoped name of a cache instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheIdentity(String);

impl CacheIdentity {
    /// Build `<prefix>-<version>`.
    pub fn new(prefix: &str, version: &str) -> Self {
        Self(format!("{}-{}", prefix.trim(), version.trim()))
    }

    /// Wrap an existing instance name.
    pub fn from_name(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl CacheDb {
    /// Open the instance, creating it if absent. Opening twice is a no-op.
    pub async fn open_instance(&self, identity: &CacheIdentity) -> Result<(), Error> {
        let name = identity.as_str().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO cache_instances (name, created_at) VALUES (?1, ?2)",
                    params![name, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Names of every instance in the store, sorted.
    pub async fn instance_names(&self) -> Result<Vec<CacheIdentity>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<CacheIdentity>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_instances ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names.into_iter().map(CacheIdentity).collect())
            })
            .await
            .map_err(Error::from)
    }

    /// Delete an instance and all of its entries.
    ///
    /// Returns false when the instance did not exist.
    pub async fn delete_instance(&self, identity: &CacheIdentity) -> Result<bool, Error> {
        let name = identity.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.unchecked_transaction()?;
                tx.execute("DELETE FROM cache_entries WHERE instance = ?1", params![name])?;
                let deleted = tx.execute("DELETE FROM cache_instances WHERE name = ?1", params![name])?;
                tx.commit()?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// The identity that last completed activation, if any.
    pub async fn live_identity(&self) -> Result<Option<CacheIdentity>, Error> {
        self.conn
            .call(|conn| -> Result<Option<CacheIdentity>, Error> {
                let name = conn
                    .query_row("SELECT name FROM live_identity WHERE id = 1", [], |row| row.get::<_, String>(0))
                    .optional()?;
                Ok(name.map(CacheIdentity))
            })
            .await
            .map_err(Error::from)
    }

    /// Record `identity` as the live instance.
    pub async fn set_live_identity(&self, identity: &CacheIdentity) -> Result<(), Error> {
        let name = identity.as_str().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO live_identity (id, name, activated_at) VALUES (1, ?1, ?2)
                     ON CONFLICT(id) DO UPDATE SET name = excluded.name, activated_at = excluded.activated_at",
                    params![name, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}
