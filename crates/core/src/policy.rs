//! Request eligibility: which intercepted requests may touch the cache.
//!
//! Rules are applied in order and the first match wins:
//! 1. Cross-origin requests bypass.
//! 2. Top-level navigations bypass, so redirects, auth challenges and fresh
//!    markup always come from the server.
//! 3. Requests whose path or query contains a configured fragment (login,
//!    OAuth, session metadata) bypass. Scheme and host never take part.
//! 4. Everything else is cacheable.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::{Origin, Position, Url};

use crate::http::ProxyRequest;

/// Why a request skipped the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum BypassReason {
    CrossOrigin,
    Navigation,
    BypassPath,
}

/// Classification of one intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case", tag = "class", content = "reason")]
pub enum Eligibility {
    Bypass(BypassReason),
    Cacheable,
}

#[derive(Debug, Clone)]
pub struct EligibilityFilter {
    origin: Origin,
    bypass_paths: Vec<String>,
}

impl EligibilityFilter {
    pub fn new(origin: &Url, bypass_paths: Vec<String>) -> Self {
        Self { origin: origin.origin(), bypass_paths }
    }

    pub fn classify(&self, request: &ProxyRequest) -> Eligibility {
        if request.url.origin() != self.origin {
            return Eligibility::Bypass(BypassReason::CrossOrigin);
        }

        if request.is_navigation() {
            return Eligibility::Bypass(BypassReason::Navigation);
        }

        let target = &request.url[Position::BeforePath..Position::AfterQuery];
        if self.bypass_paths.iter().any(|fragment| target.contains(fragment.as_str())) {
            return Eligibility::Bypass(BypassReason::BypassPath);
        }

        Eligibility::Cacheable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RequestMode;
    use crate::testing::{ORIGIN, url};

    fn filter() -> EligibilityFilter {
        EligibilityFilter::new(
            &Url::parse(ORIGIN).unwrap(),
            vec!["/login".into(), "/oauth".into(), "/metadata".into()],
        )
    }

    #[test]
    fn test_cross_origin_bypass() {
        let req = ProxyRequest::get(url("https://cdn.example.com/lib.js"));
        assert_eq!(filter().classify(&req), Eligibility::Bypass(BypassReason::CrossOrigin));
    }

    #[test]
    fn test_other_port_is_cross_origin() {
        let req = ProxyRequest::get(url("http://localhost:9000/a.css"));
        assert_eq!(filter().classify(&req), Eligibility::Bypass(BypassReason::CrossOrigin));
    }

    #[test]
    fn test_cross_origin_wins_over_navigation() {
        let req = ProxyRequest::navigate(url("https://accounts.example.com/login"));
        assert_eq!(filter().classify(&req), Eligibility::Bypass(BypassReason::CrossOrigin));
    }

    #[test]
    fn test_navigation_bypass() {
        let req = ProxyRequest::navigate(url("/books/12"));
        assert_eq!(filter().classify(&req), Eligibility::Bypass(BypassReason::Navigation));
    }

    #[test]
    fn test_login_with_query_bypass() {
        let req = ProxyRequest::get(url("/login?x=1"));
        assert_eq!(filter().classify(&req), Eligibility::Bypass(BypassReason::BypassPath));
    }

    #[test]
    fn test_fragment_matches_anywhere_in_url() {
        let req = ProxyRequest::get(url("/api/oauth/callback?code=abc"));
        assert_eq!(filter().classify(&req), Eligibility::Bypass(BypassReason::BypassPath));
        let req = ProxyRequest::get(url("/ajax/metadata/7"));
        assert_eq!(filter().classify(&req), Eligibility::Bypass(BypassReason::BypassPath));
    }

    #[test]
    fn test_same_origin_subresource_cacheable() {
        for mode in [RequestMode::SameOrigin, RequestMode::Cors, RequestMode::NoCors] {
            let req = ProxyRequest::get(url("/static/css/main.css")).with_mode(mode);
            assert_eq!(filter().classify(&req), Eligibility::Cacheable);
        }
    }

    #[test]
    fn test_host_never_matches_fragment() {
        for origin in ["https://login.example.com", "https://oauth.corp"] {
            let origin = Url::parse(origin).unwrap();
            let filter = EligibilityFilter::new(&origin, vec!["/login".into(), "/oauth".into()]);
            let req = ProxyRequest::get(origin.join("/static/app.css").unwrap());
            assert_eq!(filter.classify(&req), Eligibility::Cacheable);

            let req = ProxyRequest::get(origin.join("/login?next=/").unwrap());
            assert_eq!(filter.classify(&req), Eligibility::Bypass(BypassReason::BypassPath));
        }
    }

    #[test]
    fn test_fragment_in_query_bypass() {
        let req = ProxyRequest::get(url("/books?return=/login"));
        assert_eq!(filter().classify(&req), Eligibility::Bypass(BypassReason::BypassPath));
    }
}
