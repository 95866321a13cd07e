use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One configured publisher feed, loaded from a locale's curated CSV.
/// Identity within a run is `(locale, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub locale: String,
    pub name: String,
    pub feed_url: String,
    pub enabled: bool,
    pub category: String,
    pub priority: u32,
}

/// The validated source list for one locale, in file row order.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub locale: String,
    pub sources: Vec<Source>,
    pub malformed_rows: usize,
}

/// A source in the merged global catalog. The first locale (in the
/// configured locale order) that defines an id owns its fields; every
/// locale that lists the id appears in `locales`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSource {
    pub id: String,
    pub name: String,
    pub feed_url: String,
    pub category: String,
    pub enabled: bool,
    pub priority: u32,
    pub locales: Vec<String>,
}

/// Recorded when two locales define the same source id with differing
/// fields. The merge keeps the first-encountered definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictWarning {
    pub id: String,
    pub kept_locale: String,
    pub dropped_locale: String,
    pub field: String,
}

/// One normalized feed entry. Entries missing a title, link, or parsable
/// publish time never become articles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub source_id: String,
    pub source_name: String,
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub summary: String,
    pub category: String,
    pub image_url: Option<String>,
    pub thumbnail_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Ok,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Fetch,
    Timeout,
    Parse,
    CacheMiss,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl OutcomeError {
    pub fn from_engine(err: &EngineError) -> Self {
        let kind = match err {
            EngineError::Timeout => ErrorKind::Timeout,
            EngineError::Parse(_) => ErrorKind::Parse,
            EngineError::CacheMiss { .. } => ErrorKind::CacheMiss,
            EngineError::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            _ => ErrorKind::Fetch,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// Result of processing one source. Created exactly once per source per
/// run and never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub source_id: String,
    pub status: SourceStatus,
    pub articles: Vec<Article>,
    pub dropped_entries: usize,
    pub error: Option<OutcomeError>,
}

impl SourceOutcome {
    pub fn failed(source_id: &str, err: &EngineError) -> Self {
        Self {
            source_id: source_id.to_string(),
            status: SourceStatus::Failed,
            articles: Vec::new(),
            dropped_entries: 0,
            error: Some(OutcomeError::from_engine(err)),
        }
    }

    pub fn timed_out(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            status: SourceStatus::Failed,
            articles: Vec::new(),
            dropped_entries: 0,
            error: Some(OutcomeError {
                kind: ErrorKind::Timeout,
                message: "run deadline exceeded before the source completed".to_string(),
            }),
        }
    }
}

/// The final aggregated artifact: all articles from ok/partial sources,
/// deduplicated by url, in the run's deterministic order. Serializes as a
/// plain JSON array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedDocument {
    pub articles: Vec<Article>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
    pub source_id: String,
    pub status: SourceStatus,
    pub article_count: usize,
    pub dropped_entries: usize,
    pub error: Option<OutcomeError>,
}

/// Machine-checkable record of one aggregation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub total_sources: usize,
    pub ok_count: usize,
    pub partial_count: usize,
    pub failed_count: usize,
    pub per_source: Vec<SourceSummary>,
    pub duration_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("catalog schema mismatch in {path}: {detail}")]
    Schema { path: String, detail: String },

    #[error("fetch failed: {message}")]
    Fetch { message: String, transient: bool },

    #[error("request timed out")]
    Timeout,

    #[error("feed parse error: {0}")]
    Parse(String),

    #[error("thumbnail error: {0}")]
    Thumbnail(String),

    #[error("cache miss for {key} with downloads disabled")]
    CacheMiss { key: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("catalog read error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether a retry could plausibly succeed: timeouts, connection
    /// failures, and 5xx responses. 4xx and size-cap violations are not
    /// transient.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Fetch { transient, .. } => *transient,
            EngineError::Timeout => true,
            EngineError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
