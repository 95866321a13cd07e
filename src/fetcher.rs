use crate::cache::FetchCache;
use crate::config::EngineConfig;
use crate::normalizer::{normalize_feed, NormalizeLimits};
use crate::thumbnail::Thumbnailer;
use crate::traits::{ContentFetch, FetchedPayload};
use crate::types::{EngineError, Result, Source, SourceOutcome, SourceStatus};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bounded retry with exponential backoff, injected into the fetch path
/// so the schedule is testable without real network calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    fn schedule(&self) -> ExponentialBackoff<backoff::SystemClock> {
        ExponentialBackoff {
            current_interval: self.initial_delay,
            initial_interval: self.initial_delay,
            max_interval: self.max_delay,
            multiplier: self.multiplier,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Production [`ContentFetch`] backed by reqwest. Proxy configuration is
/// taken from the environment, which is how the external forward proxy
/// is injected in deployment.
pub struct HttpFetch {
    client: Client,
}

impl HttpFetch {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ContentFetch for HttpFetch {
    async fn get(&self, url: &str, max_bytes: u64) -> Result<FetchedPayload> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status.is_server_error() {
            return Err(EngineError::Fetch {
                message: format!("HTTP {status} from {url}"),
                transient: true,
            });
        }
        if !status.is_success() {
            return Err(EngineError::Fetch {
                message: format!("HTTP {status} from {url}"),
                transient: false,
            });
        }
        if let Some(length) = response.content_length() {
            if length > max_bytes {
                return Err(EngineError::Fetch {
                    message: format!("response too large ({length} bytes) from {url}"),
                    transient: false,
                });
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let bytes = response.bytes().await?;
        if bytes.len() as u64 > max_bytes {
            return Err(EngineError::Fetch {
                message: format!("response too large ({} bytes) from {url}", bytes.len()),
                transient: false,
            });
        }

        Ok(FetchedPayload {
            bytes: bytes.to_vec(),
            content_type,
            etag,
        })
    }
}

/// How many of one source's article images are fetched at once.
const IMAGE_CONCURRENCY: usize = 8;

/// Processes one source end to end: feed fetch through the cache with
/// retries, normalization, then image fetch + thumbnail per article.
/// Image-side failures degrade the outcome to `Partial`, never `Failed`.
pub struct SourceFetcher {
    fetch: Arc<dyn ContentFetch>,
    cache: Arc<FetchCache>,
    thumbnailer: Thumbnailer,
    retry: RetryPolicy,
    limits: NormalizeLimits,
    max_feed_bytes: u64,
    max_image_bytes: u64,
}

impl SourceFetcher {
    pub fn new(fetch: Arc<dyn ContentFetch>, cache: Arc<FetchCache>, config: &EngineConfig) -> Self {
        Self {
            fetch,
            cache,
            thumbnailer: Thumbnailer::new(config.thumbnail.clone()),
            retry: config.retry.clone(),
            limits: NormalizeLimits::from(config),
            max_feed_bytes: config.max_feed_bytes,
            max_image_bytes: config.max_image_bytes,
        }
    }

    pub async fn process_source(&self, source: &Source) -> SourceOutcome {
        debug!(source = %source.id, url = %source.feed_url, "processing source");

        let raw = match self.fetch_cached(&source.feed_url, self.max_feed_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(source = %source.id, error = %e, "feed fetch failed");
                return SourceOutcome::failed(&source.id, &e);
            }
        };

        let normalized = match normalize_feed(&raw, source, &self.limits) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!(source = %source.id, error = %e, "feed normalization failed");
                return SourceOutcome::failed(&source.id, &e);
            }
        };

        let mut articles = normalized.articles;
        let jobs: Vec<(usize, String)> = articles
            .iter()
            .enumerate()
            .filter_map(|(idx, a)| a.image_url.clone().map(|url| (idx, url)))
            .collect();

        let results: Vec<(usize, String, crate::types::Result<String>)> = stream::iter(jobs)
            .map(|(idx, url)| async move {
                let result = self.thumbnail_for(&url).await;
                (idx, url, result)
            })
            .buffer_unordered(IMAGE_CONCURRENCY)
            .collect()
            .await;

        let mut degraded = false;
        for (idx, url, result) in results {
            match result {
                Ok(name) => articles[idx].thumbnail_ref = Some(name),
                Err(e) => {
                    warn!(source = %source.id, image = %url, error = %e,
                          "image unavailable, keeping article without thumbnail");
                    degraded = true;
                }
            }
        }

        let status = if degraded {
            SourceStatus::Partial
        } else {
            SourceStatus::Ok
        };
        info!(source = %source.id, articles = articles.len(), ?status, "source processed");

        SourceOutcome {
            source_id: source.id.clone(),
            status,
            articles,
            dropped_entries: normalized.dropped_entries,
            error: None,
        }
    }

    async fn fetch_cached(&self, url: &str, max_bytes: u64) -> Result<Vec<u8>> {
        self.cache
            .get_or_fetch(url, || self.fetch_with_retry(url, max_bytes))
            .await
    }

    async fn fetch_with_retry(&self, url: &str, max_bytes: u64) -> Result<FetchedPayload> {
        let mut schedule = self.retry.schedule();
        let mut last_error = None;

        for attempt in 0..self.retry.max_attempts.max(1) {
            match self.fetch.get(url, max_bytes).await {
                Ok(payload) => return Ok(payload),
                Err(e) => {
                    let transient = e.is_transient();
                    last_error = Some(e);
                    if !transient {
                        break;
                    }
                    if attempt + 1 < self.retry.max_attempts {
                        if let Some(delay) = schedule.next_backoff() {
                            warn!(url, attempt = attempt + 1, ?delay, "transient fetch failure, retrying");
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| EngineError::Fetch {
            message: format!("no fetch attempts were made for {url}"),
            transient: false,
        }))
    }

    /// Fetch one article image through the cache and produce its
    /// content-addressed thumbnail, reusing an existing transform result
    /// when the input bytes were seen before.
    async fn thumbnail_for(&self, image_url: &str) -> Result<String> {
        let bytes = self.fetch_cached(image_url, self.max_image_bytes).await?;

        let name = Thumbnailer::thumbnail_name(&bytes);
        if self.cache.file_path(&name).exists() {
            debug!(image = %image_url, thumbnail = %name, "thumbnail already cached");
            return Ok(name);
        }

        let thumbnailer = self.thumbnailer.clone();
        let thumb = tokio::task::spawn_blocking(move || thumbnailer.generate(&bytes))
            .await
            .map_err(|e| EngineError::Thumbnail(format!("thumbnail task failed: {e}")))??;

        self.cache.store_file(&name, &thumb).await?;
        Ok(name)
    }
}
