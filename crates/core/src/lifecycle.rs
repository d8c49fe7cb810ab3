//! Install and activate steps for one versioned cache.
//!
//! Install seeds the instance named by the current identity from the
//! precache manifest, all or nothing. Activate deletes every other instance
//! and records the current identity as live.

use std::sync::Arc;

use url::Url;

use crate::Error;
use crate::cache::{CacheDb, CacheEntry, CacheIdentity};
use crate::http::ProxyRequest;
use crate::network::Network;

pub struct LifecycleManager {
    db: CacheDb,
    network: Arc<dyn Network>,
    identity: CacheIdentity,
    origin: Url,
    manifest: Vec<String>,
}

impl LifecycleManager {
    pub fn new(
        db: CacheDb, network: Arc<dyn Network>, identity: CacheIdentity, origin: Url, manifest: Vec<String>,
    ) -> Self {
        Self { db, network, identity, origin, manifest }
    }

    pub fn identity(&self) -> &CacheIdentity {
        &self.identity
    }

    /// Open the current instance and seed it from the manifest.
    ///
    /// Every locator is fetched before anything is written; the entries then
    /// land in a single transaction. Returns the number of entries seeded.
    ///
    /// # Errors
    ///
    /// Returns `Error::SeedFailed` naming the first locator that failed to
    /// fetch or answered with a non-2xx status. Nothing is stored in that case.
    pub async fn install(&self) -> Result<usize, Error> {
        self.db.open_instance(&self.identity).await?;

        let mut entries = Vec::with_capacity(self.manifest.len());
        for locator in &self.manifest {
            let url = self.origin.join(locator).map_err(|e| Error::SeedFailed {
                locator: locator.clone(),
                reason: e.to_string(),
            })?;
            let request = ProxyRequest::get(url);

            let response = self.network.fetch(&request).await.map_err(|e| Error::SeedFailed {
                locator: locator.clone(),
                reason: e.to_string(),
            })?;

            if !response.ok() {
                return Err(Error::SeedFailed { locator: locator.clone(), reason: format!("status {}", response.status) });
            }

            entries.push(CacheEntry::from_response(&request, response));
        }

        self.db.put_entries(&self.identity, &entries).await?;

        tracing::info!(cache = %self.identity, entries = entries.len(), "precache seeded");
        Ok(entries.len())
    }

    /// Delete every instance except the current one and mark it live.
    ///
    /// A failed deletion is logged and skipped. Returns the deleted names.
    pub async fn activate(&self) -> Result<Vec<CacheIdentity>, Error> {
        let mut deleted = Vec::new();
        for name in self.db.instance_names().await? {
            if name == self.identity {
                continue;
            }
            match self.db.delete_instance(&name).await {
                Ok(true) => deleted.push(name),
                Ok(false) => {}
                Err(e) => tracing::warn!(cache = %name, error = %e, "failed to delete stale cache"),
            }
        }

        self.db.set_live_identity(&self.identity).await?;

        tracing::info!(cache = %self.identity, stale = deleted.len(), "stale caches purged");
        Ok(deleted)
    }
}
