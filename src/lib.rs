pub mod cache;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod fetcher;
pub mod normalizer;
pub mod publisher;
pub mod thumbnail;
pub mod traits;
pub mod types;

pub use cache::FetchCache;
pub use catalog::{load_locale_catalog, merge_catalogs, GlobalMerge};
pub use config::EngineConfig;
pub use coordinator::AggregationCoordinator;
pub use engine::Engine;
pub use fetcher::{HttpFetch, RetryPolicy, SourceFetcher};
pub use normalizer::{normalize_feed, NormalizeLimits};
pub use publisher::Publisher;
pub use thumbnail::{ThumbnailConfig, Thumbnailer};
pub use traits::{ContentFetch, FetchedPayload};
pub use types::*;
