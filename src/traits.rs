use crate::types::Result;
use async_trait::async_trait;

/// A fetched resource plus the response metadata the cache records.
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

/// Seam between the engine and the network. The production implementation
/// wraps an HTTP client; tests substitute canned payloads and failures.
#[async_trait]
pub trait ContentFetch: Send + Sync {
    /// Fetch `url`, failing permanently if the body exceeds `max_bytes`.
    async fn get(&self, url: &str, max_bytes: u64) -> Result<FetchedPayload>;
}
