//! Cache-first fetch strategy with network fallback and store.
//!
//! Bypass requests go straight to the network. Cacheable requests are served
//! from the live instance when an entry matches; otherwise the network
//! response is forked, one copy stored and the other returned. Redirects are
//! returned but never stored.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::cache::{CacheDb, CacheEntry, CacheIdentity};
use crate::http::{ProxyRequest, ProxyResponse};
use crate::network::Network;
use crate::policy::{Eligibility, EligibilityFilter};

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ServedFrom {
    /// Passthrough; the cache was not consulted.
    Network,
    Cache,
    /// Cache miss; the network response was stored.
    NetworkStored,
    /// Cache miss; the network response was not stored (a redirect, or the
    /// instance was deleted while the request was in flight).
    NetworkUncached,
}

/// A response together with how it was obtained.
#[derive(Debug, Clone)]
pub struct Served {
    pub response: ProxyResponse,
    pub eligibility: Eligibility,
    pub source: ServedFrom,
}

#[derive(Clone)]
pub struct FetchStrategy {
    filter: EligibilityFilter,
    db: CacheDb,
    network: Arc<dyn Network>,
}

impl FetchStrategy {
    pub fn new(filter: EligibilityFilter, db: CacheDb, network: Arc<dyn Network>) -> Self {
        Self { filter, db, network }
    }

    /// Handle one intercepted request against the `live` instance.
    ///
    /// With no live instance every request is a passthrough.
    ///
    /// # Errors
    ///
    /// Network failures are returned as-is; there is no retry and no
    /// fallback response.
    pub async fn handle(&self, request: &ProxyRequest, live: Option<&CacheIdentity>) -> Result<Served, Error> {
        let eligibility = self.filter.classify(request);

        let live = match (eligibility, live) {
            (Eligibility::Cacheable, Some(live)) => live,
            _ => {
                tracing::debug!(request = %request, ?eligibility, "passthrough");
                let response = self.network.fetch(request).await?;
                return Ok(Served { response, eligibility, source: ServedFrom::Network });
            }
        };

        if let Some(response) = self.lookup(live, request).await {
            tracing::debug!(request = %request, cache = %live, "cache hit");
            return Ok(Served { response, eligibility, source: ServedFrom::Cache });
        }

        let response = self.network.fetch(request).await?;

        if response.is_redirect() {
            tracing::debug!(request = %request, status = response.status, "redirect not stored");
            return Ok(Served { response, eligibility, source: ServedFrom::NetworkUncached });
        }

        let (stored, response) = response.fork();
        let entry = CacheEntry::from_response(request, stored);
        let source = match self.db.put_entry(live, &entry).await {
            Ok(()) => {
                tracing::debug!(request = %request, cache = %live, status = response.status, "stored");
                ServedFrom::NetworkStored
            }
            Err(e) => {
                tracing::warn!(request = %request, cache = %live, error = %e, "failed to store response");
                ServedFrom::NetworkUncached
            }
        };

        Ok(Served { response, eligibility, source })
    }

    /// A read failure counts as a miss.
    async fn lookup(&self, live: &CacheIdentity, request: &ProxyRequest) -> Option<ProxyResponse> {
        let found = self
            .db
            .match_entry(live, &request.method, request.url.as_str())
            .await
            .and_then(|entry| entry.map(|e| e.to_response()).transpose());

        match found {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(request = %request, cache = %live, error = %e, "cache read failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ResponseKind;
    use crate::policy::BypassReason;
    use crate::testing::{ORIGIN, ScriptedNetwork, url};
    use url::Url;

    async fn setup(network: ScriptedNetwork) -> (FetchStrategy, Arc<ScriptedNetwork>, CacheDb, CacheIdentity) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let identity = CacheIdentity::from_name("strategy-v1");
        db.open_instance(&identity).await.unwrap();
        let network = Arc::new(network);
        let filter = EligibilityFilter::new(&Url::parse(ORIGIN).unwrap(), vec!["/login".into()]);
        let strategy = FetchStrategy::new(filter, db.clone(), network.clone());
        (strategy, network, db, identity)
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let (strategy, network, _db, id) = setup(ScriptedNetwork::new().route("/page.html", 200, "<p>hi</p>")).await;
        let req = ProxyRequest::get(url("/page.html"));

        let first = strategy.handle(&req, Some(&id)).await.unwrap();
        assert_eq!(first.source, ServedFrom::NetworkStored);
        assert_eq!(network.calls(), 1);

        let second = strategy.handle(&req, Some(&id)).await.unwrap();
        assert_eq!(second.source, ServedFrom::Cache);
        assert_eq!(second.response.body, first.response.body);
        assert_eq!(network.calls(), 1);
    }

    #[tokio::test]
    async fn test_existing_entry_skips_network() {
        let (strategy, network, db, id) = setup(ScriptedNetwork::new().route("/a.css", 200, "fresh")).await;
        let req = ProxyRequest::get(url("/a.css"));
        let cached = ProxyResponse::new(req.url.clone(), 200, "cached");
        db.put_entry(&id, &CacheEntry::from_response(&req, cached)).await.unwrap();

        let served = strategy.handle(&req, Some(&id)).await.unwrap();

        assert_eq!(served.source, ServedFrom::Cache);
        assert_eq!(served.response.body.as_ref(), b"cached");
        assert_eq!(network.calls(), 0);
    }

    #[tokio::test]
    async fn test_cross_origin_never_touches_cache() {
        let (strategy, network, db, id) =
            setup(ScriptedNetwork::new().route("https://cdn.example.com/lib.js", 200, "lib")).await;
        let req = ProxyRequest::get(url("https://cdn.example.com/lib.js"));

        for _ in 0..2 {
            let served = strategy.handle(&req, Some(&id)).await.unwrap();
            assert_eq!(served.eligibility, Eligibility::Bypass(BypassReason::CrossOrigin));
            assert_eq!(served.source, ServedFrom::Network);
        }

        assert_eq!(network.calls(), 2);
        assert_eq!(db.entry_count(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_navigation_never_cached() {
        let (strategy, network, db, id) = setup(ScriptedNetwork::new().route("/", 200, "<html>")).await;
        let req = ProxyRequest::navigate(url("/"));

        strategy.handle(&req, Some(&id)).await.unwrap();
        strategy.handle(&req, Some(&id)).await.unwrap();

        assert_eq!(network.calls(), 2);
        assert_eq!(db.entry_count(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bypass_path_returns_raw_response() {
        let raw = ProxyResponse::new(url("/login?x=1"), 401, "denied").with_header("WWW-Authenticate", "Basic");
        let (strategy, _network, db, id) =
            setup(ScriptedNetwork::new().route_response("/login?x=1", raw.clone())).await;

        let served = strategy.handle(&ProxyRequest::get(url("/login?x=1")), Some(&id)).await.unwrap();

        assert_eq!(served.response, raw);
        assert_eq!(served.eligibility, Eligibility::Bypass(BypassReason::BypassPath));
        assert_eq!(db.entry_count(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_redirects_not_stored() {
        let found = ProxyResponse::new(url("/old.css"), 302, "").with_header("Location", "/new.css");
        let opaque = ProxyResponse::new(url("/moved"), 0, "").with_kind(ResponseKind::OpaqueRedirect);
        let (strategy, network, db, id) = setup(
            ScriptedNetwork::new()
                .route_response("/old.css", found)
                .route_response("/moved", opaque),
        )
        .await;

        for path in ["/old.css", "/moved", "/old.css"] {
            let served = strategy.handle(&ProxyRequest::get(url(path)), Some(&id)).await.unwrap();
            assert_eq!(served.source, ServedFrom::NetworkUncached);
            assert!(served.response.is_redirect());
        }

        assert_eq!(network.calls(), 3);
        assert_eq!(db.entry_count(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_network_failure_propagates() {
        let (strategy, _network, db, id) = setup(ScriptedNetwork::new().offline("/a.css")).await;

        let result = strategy.handle(&ProxyRequest::get(url("/a.css")), Some(&id)).await;

        assert!(matches!(result, Err(Error::Network(_))));
        assert_eq!(db.entry_count(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_no_live_instance_is_passthrough() {
        let (strategy, network, db, id) = setup(ScriptedNetwork::new().route("/a.css", 200, "a")).await;
        let req = ProxyRequest::get(url("/a.css"));

        let served = strategy.handle(&req, None).await.unwrap();
        strategy.handle(&req, None).await.unwrap();

        assert_eq!(served.eligibility, Eligibility::Cacheable);
        assert_eq!(served.source, ServedFrom::Network);
        assert_eq!(network.calls(), 2);
        assert_eq!(db.entry_count(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_error_status_is_stored() {
        let (strategy, network, _db, id) = setup(ScriptedNetwork::new()).await;
        let req = ProxyRequest::get(url("/missing.png"));

        let first = strategy.handle(&req, Some(&id)).await.unwrap();
        let second = strategy.handle(&req, Some(&id)).await.unwrap();

        assert_eq!(first.response.status, 404);
        assert_eq!(second.source, ServedFrom::Cache);
        assert_eq!(network.calls(), 1);
    }
}
