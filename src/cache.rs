use crate::traits::FetchedPayload;
use crate::types::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Sidecar metadata persisted next to each cached payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntryMeta {
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

/// Content-addressable on-disk fetch cache, keyed by normalized URL.
///
/// Guarantees at most one in-flight fetch per key: the first caller for a
/// missing key holds that key's mutex while it fetches and persists;
/// concurrent callers for the same key block on the mutex and then find
/// the entry resident. Reads of resident entries take no lock at all.
///
/// Entries never expire; staleness control belongs to the caller via
/// [`FetchCache::refresh`]. In `no_download` mode a miss surfaces as
/// [`EngineError::CacheMiss`] instead of hitting the network.
pub struct FetchCache {
    dir: PathBuf,
    no_download: bool,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FetchCache {
    pub fn new(dir: impl Into<PathBuf>, no_download: bool) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            no_download,
            key_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache filename for a URL: hex sha256 of the key.
    pub fn cache_key(url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn payload_path(&self, url: &str) -> PathBuf {
        self.dir.join(Self::cache_key(url))
    }

    fn meta_path(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.meta.json", Self::cache_key(url)))
    }

    pub fn contains(&self, url: &str) -> bool {
        self.payload_path(url).exists()
    }

    /// Return the cached payload for `url`, fetching and persisting it on
    /// a miss. `fetch` runs at most once per key across all concurrent
    /// callers in a run.
    pub async fn get_or_fetch<F, Fut>(&self, url: &str, fetch: F) -> Result<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<FetchedPayload>>,
    {
        let path = self.payload_path(url);
        if path.exists() {
            debug!(url, "cache hit");
            return Ok(fs::read(&path).await?);
        }

        if self.no_download {
            return Err(EngineError::CacheMiss {
                key: url.to_string(),
            });
        }

        let lock = self.lock_for(url).await;
        let _guard = lock.lock().await;

        // Another caller may have populated the entry while we waited.
        if path.exists() {
            debug!(url, "cache hit after waiting for in-flight fetch");
            return Ok(fs::read(&path).await?);
        }

        self.fetch_and_store(url, fetch).await
    }

    /// Re-fetch `url` even if an entry is resident, replacing it. This is
    /// the caller-driven staleness control.
    pub async fn refresh<F, Fut>(&self, url: &str, fetch: F) -> Result<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<FetchedPayload>>,
    {
        if self.no_download {
            return Err(EngineError::CacheMiss {
                key: url.to_string(),
            });
        }
        let lock = self.lock_for(url).await;
        let _guard = lock.lock().await;
        self.fetch_and_store(url, fetch).await
    }

    /// Persist a derived file (e.g. a thumbnail) into the cache directory
    /// under an explicit name, atomically.
    pub async fn store_file(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.dir.join(name);
        write_atomic(&path, bytes).await?;
        Ok(path)
    }

    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    async fn lock_for(&self, url: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks
            .entry(Self::cache_key(url))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn fetch_and_store<F, Fut>(&self, url: &str, fetch: F) -> Result<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<FetchedPayload>>,
    {
        let payload = fetch().await?;

        write_atomic(&self.payload_path(url), &payload.bytes).await?;

        let meta = CacheEntryMeta {
            url: url.to_string(),
            fetched_at: Utc::now(),
            content_type: payload.content_type.clone(),
            etag: payload.etag.clone(),
        };
        // The payload is the source of truth; a failed meta write is not
        // worth failing the fetch over.
        match serde_json::to_vec_pretty(&meta) {
            Ok(json) => {
                if let Err(e) = write_atomic(&self.meta_path(url), &json).await {
                    warn!(url, error = %e, "failed to write cache metadata");
                }
            }
            Err(e) => warn!(url, error = %e, "failed to serialize cache metadata"),
        }

        debug!(url, bytes = payload.bytes.len(), "cached fetched payload");
        Ok(payload.bytes)
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_file_name(format!(
        "{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "entry".to_string())
    ));
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}
