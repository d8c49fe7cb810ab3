//! Network doubles and store helpers shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;
use url::Url;

use crate::Error;
use crate::cache::CacheDb;
use crate::http::{ProxyRequest, ProxyResponse};
use crate::network::Network;

pub(crate) const ORIGIN: &str = "http://localhost:8083";

pub(crate) fn url(path_or_url: &str) -> Url {
    if path_or_url.starts_with('/') {
        Url::parse(ORIGIN).unwrap().join(path_or_url).unwrap()
    } else {
        Url::parse(path_or_url).unwrap()
    }
}

/// Answers from a fixed route table; unknown URLs get a 404 and URLs marked
/// offline fail like a dropped connection.
#[derive(Default)]
pub(crate) struct ScriptedNetwork {
    routes: Mutex<HashMap<String, ProxyResponse>>,
    offline: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn route(self, path_or_url: &str, status: u16, body: &'static str) -> Self {
        let url = url(path_or_url);
        let response = ProxyResponse::new(url.clone(), status, body);
        self.routes.lock().unwrap().insert(url.to_string(), response);
        self
    }

    pub(crate) fn route_response(self, path_or_url: &str, response: ProxyResponse) -> Self {
        self.routes.lock().unwrap().insert(url(path_or_url).to_string(), response);
        self
    }

    pub(crate) fn offline(self, path_or_url: &str) -> Self {
        self.offline.lock().unwrap().push(url(path_or_url).to_string());
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = request.url.to_string();

        if self.offline.lock().unwrap().contains(&key) {
            return Err(Error::Network(format!("connection refused: {key}")));
        }

        let routes = self.routes.lock().unwrap();
        Ok(routes
            .get(&key)
            .cloned()
            .unwrap_or_else(|| ProxyResponse::new(request.url.clone(), 404, "not found")))
    }
}

/// Holds requests for one URL inside the network until released, so a test
/// can run lifecycle events while a fetch is in flight.
pub(crate) struct GatedNetwork {
    inner: ScriptedNetwork,
    gated: Url,
    pub(crate) entered: Notify,
    pub(crate) release: Notify,
}

impl GatedNetwork {
    pub(crate) fn new(inner: ScriptedNetwork, path_or_url: &str) -> Self {
        Self { inner, gated: url(path_or_url), entered: Notify::new(), release: Notify::new() }
    }
}

#[async_trait]
impl Network for GatedNetwork {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, Error> {
        if request.url == self.gated {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.fetch(request).await
    }
}

/// Make every delete of instance `name` abort inside SQLite.
pub(crate) async fn lock_instance(db: &CacheDb, name: &str) {
    let sql = format!(
        "CREATE TRIGGER lock_{trigger} BEFORE DELETE ON cache_instances WHEN old.name = '{name}'
         BEGIN SELECT RAISE(ABORT, 'instance locked'); END;",
        trigger = name.replace('-', "_"),
    );
    db.conn
        .call(move |conn| -> Result<(), Error> {
            conn.execute_batch(&sql)?;
            Ok(())
        })
        .await
        .unwrap();
}
