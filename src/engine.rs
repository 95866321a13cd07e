use crate::cache::FetchCache;
use crate::catalog::{self, GlobalMerge};
use crate::config::EngineConfig;
use crate::coordinator::AggregationCoordinator;
use crate::fetcher::{HttpFetch, SourceFetcher};
use crate::publisher::Publisher;
use crate::traits::ContentFetch;
use crate::types::{Catalog, EngineError, Result, RunReport, Source};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// End-to-end wiring of one aggregation run: load locale catalogs,
/// publish the catalog artifacts, merge the global catalog, aggregate
/// every enabled source, publish the feed and report.
pub struct Engine {
    config: EngineConfig,
    fetch: Arc<dyn ContentFetch>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let fetch = Arc::new(HttpFetch::new(
            &config.user_agent,
            Duration::from_secs(config.request_timeout_secs),
        )?);
        Ok(Self { config, fetch })
    }

    /// Build an engine with a custom fetch implementation. Used by tests
    /// to run the whole pipeline without touching the network.
    pub fn with_fetch(config: EngineConfig, fetch: Arc<dyn ContentFetch>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, fetch })
    }

    pub async fn run(&self) -> Result<RunReport> {
        let catalogs = self.load_catalogs()?;

        let total_sources: usize = catalogs.iter().map(|c| c.sources.len()).sum();
        if total_sources == 0 {
            return Err(EngineError::Config(
                "no sources found in any configured locale".to_string(),
            ));
        }

        let publisher = Publisher::new(&self.config.output_dir);
        for catalog in &catalogs {
            publisher
                .write_locale_catalog(&catalog.locale, &catalog::sorted_for_output(&catalog.sources))
                .await?;
        }

        let GlobalMerge { sources, conflicts } = catalog::merge_catalogs(&catalogs);
        if !conflicts.is_empty() {
            info!(conflicts = conflicts.len(), "global merge recorded conflicts");
        }
        publisher.write_global_catalog(&sources).await?;

        // The run catalog is the merged global view; the owning locale of
        // each merged entry is the first one that defined it.
        let run_catalog: Vec<Source> = sources
            .iter()
            .map(|s| Source {
                id: s.id.clone(),
                locale: s.locales.first().cloned().unwrap_or_default(),
                name: s.name.clone(),
                feed_url: s.feed_url.clone(),
                enabled: s.enabled,
                category: s.category.clone(),
                priority: s.priority,
            })
            .collect();

        let cache = Arc::new(FetchCache::new(
            &self.config.cache_dir,
            self.config.no_download,
        )?);
        let fetcher = Arc::new(SourceFetcher::new(
            self.fetch.clone(),
            cache,
            &self.config,
        ));
        let coordinator = AggregationCoordinator::new(
            fetcher,
            self.config.concurrency,
            Duration::from_secs(self.config.run_deadline_secs),
        );

        let (feed, report) = coordinator.run(&run_catalog).await?;

        publisher.write_feed(&feed).await?;
        publisher.write_report(&report).await?;

        if self.config.no_upload {
            info!("upload disabled, artifacts remain in the local output directory");
        }

        Ok(report)
    }

    /// Load every configured locale. A missing file is fatal; a schema
    /// mismatch skips that locale and leaves the rest of the run intact.
    fn load_catalogs(&self) -> Result<Vec<Catalog>> {
        let mut catalogs = Vec::new();
        for locale in &self.config.locales {
            let path = self.config.locale_csv_path(locale);
            match catalog::load_locale_catalog(&path, locale) {
                Ok(catalog) => catalogs.push(catalog),
                Err(e @ EngineError::Schema { .. }) => {
                    error!(locale = %locale, error = %e, "skipping locale with invalid catalog schema");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(catalogs)
    }
}
