//! Cache entry reads and writes.
//!
//! An entry pairs a request identity (method + URL) with a response snapshot.
//! Entries are never updated in place: every write replaces the whole row.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;
use url::Url;

use super::connection::CacheDb;
use super::hash::compute_cache_key;
use super::instances::CacheIdentity;
use crate::Error;
use crate::http::{ProxyRequest, ProxyResponse, ResponseKind};

/// A stored response under its request key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key_hash: String,
    pub method: String,
    pub url: String,
    pub status_code: u16,
    pub kind: ResponseKind,
    pub headers: Vec<(String, String)>,
    #[serde(skip)]
    pub body: Bytes,
    pub stored_at: String,
}

impl CacheEntry {
    /// Snapshot `response` under the key of `request`.
    pub fn from_response(request: &ProxyRequest, response: ProxyResponse) -> Self {
        let url = request.url.as_str().to_string();
        Self {
            key_hash: compute_cache_key(&request.method, &url),
            method: request.method.to_ascii_uppercase(),
            url,
            status_code: response.status,
            kind: response.kind,
            headers: response.headers,
            body: response.body,
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Rebuild the response this entry was stored from.
    pub fn to_response(&self) -> Result<ProxyResponse, Error> {
        let url = Url::parse(&self.url).map_err(|e| Error::CorruptEntry(format!("{}: {e}", self.url)))?;
        Ok(ProxyResponse {
            url,
            status: self.status_code,
            kind: self.kind,
            headers: self.headers.clone(),
            body: self.body.clone(),
        })
    }
}

fn insert_entry(conn: &rusqlite::Connection, instance: &str, entry: &CacheEntry) -> Result<(), Error> {
    let headers_json = serde_json::to_string(&entry.headers).map_err(|e| Error::CorruptEntry(e.to_string()))?;
    conn.execute(
        "INSERT INTO cache_entries (
            instance, key_hash, method, url, status_code, kind, headers_json, body, stored_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(instance, key_hash) DO UPDATE SET
            method = excluded.method,
            url = excluded.url,
            status_code = excluded.status_code,
            kind = excluded.kind,
            headers_json = excluded.headers_json,
            body = excluded.body,
            stored_at = excluded.stored_at",
        params![
            instance,
            &entry.key_hash,
            &entry.method,
            &entry.url,
            entry.status_code,
            entry.kind.as_str(),
            headers_json,
            entry.body.as_ref(),
            &entry.stored_at,
        ],
    )?;
    Ok(())
}

impl CacheDb {
    /// Store an entry, overwriting any entry under the same key.
    ///
    /// The instance must already exist. A write into an instance that has
    /// been deleted fails on the foreign key and leaves the store unchanged.
    pub async fn put_entry(&self, identity: &CacheIdentity, entry: &CacheEntry) -> Result<(), Error> {
        self.put_entries(identity, std::slice::from_ref(entry)).await
    }

    /// Store several entries in one transaction: either all land or none do.
    pub async fn put_entries(&self, identity: &CacheIdentity, entries: &[CacheEntry]) -> Result<(), Error> {
        let instance = identity.as_str().to_string();
        let entries = entries.to_vec();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.unchecked_transaction()?;
                for entry in &entries {
                    insert_entry(&tx, &instance, entry)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up the entry for `method` + `url` in one instance.
    pub async fn match_entry(
        &self, identity: &CacheIdentity, method: &str, url: &str,
    ) -> Result<Option<CacheEntry>, Error> {
        let instance = identity.as_str().to_string();
        let key_hash = compute_cache_key(method, url);
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key_hash, method, url, status_code, kind, headers_json, body, stored_at
                     FROM cache_entries WHERE instance = ?1 AND key_hash = ?2",
                )?;

                let result = stmt.query_row(params![instance, key_hash], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u16>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Vec<u8>>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                });

                let (key_hash, method, url, status_code, kind, headers_json, body, stored_at) = match result {
                    Ok(row) => row,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };

                let headers =
                    serde_json::from_str(&headers_json).map_err(|e| Error::CorruptEntry(e.to_string()))?;

                Ok(Some(CacheEntry {
                    key_hash,
                    method,
                    url,
                    status_code,
                    kind: kind.parse()?,
                    headers,
                    body: Bytes::from(body),
                    stored_at,
                }))
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in one instance.
    pub async fn entry_count(&self, identity: &CacheIdentity) -> Result<u64, Error> {
        let instance = identity.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE instance = ?1",
                    params![instance],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// `(method, url, status)` of every entry in one instance, by URL.
    pub async fn list_entries(&self, identity: &CacheIdentity) -> Result<Vec<(String, String, u16)>, Error> {
        let instance = identity.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<Vec<(String, String, u16)>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT method, url, status_code FROM cache_entries WHERE instance = ?1 ORDER BY url, method",
                )?;
                let rows = stmt
                    .query_map(params![instance], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)
    }
}
