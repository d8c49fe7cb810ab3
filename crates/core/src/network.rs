//! The seam between the proxy and the real network.

use async_trait::async_trait;

use crate::Error;
use crate::http::{ProxyRequest, ProxyResponse};

/// Issues requests on behalf of the proxy.
///
/// Implementations return every HTTP response verbatim, including error
/// statuses and redirects. `Err` means no response arrived at all.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, Error>;
}
