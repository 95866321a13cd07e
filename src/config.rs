use crate::fetcher::RetryPolicy;
use crate::normalizer::NormalizeLimits;
use crate::thumbnail::ThumbnailConfig;
use crate::types::{EngineError, Result};
use std::env;
use std::path::PathBuf;

/// Everything one aggregation run needs to know. Assembled from CLI
/// flags with `NO_DOWNLOAD`/`NO_UPLOAD` environment overrides, matching
/// how the deployment glue passes configuration in.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub locales: Vec<String>,
    pub sources_dir: PathBuf,
    pub output_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub concurrency: usize,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub run_deadline_secs: u64,
    /// Cache-only mode: a cache miss is an error, the network is never hit.
    pub no_download: bool,
    /// Artifact upload is an external collaborator; this flag is only
    /// surfaced so the run can log that artifacts stay local.
    pub no_upload: bool,
    pub max_feed_bytes: u64,
    pub max_image_bytes: u64,
    pub max_entries_per_feed: usize,
    pub max_summary_chars: usize,
    pub max_article_age_days: Option<i64>,
    pub retry: RetryPolicy,
    pub thumbnail: ThumbnailConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            locales: vec!["en_US".to_string()],
            sources_dir: PathBuf::from("sources"),
            output_dir: PathBuf::from("output"),
            cache_dir: PathBuf::from("output/cache"),
            concurrency: 4,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/107.0.0.0 Safari/537.36"
                .to_string(),
            request_timeout_secs: 30,
            run_deadline_secs: 600,
            no_download: false,
            no_upload: false,
            max_feed_bytes: 10_000_000,
            max_image_bytes: 5_000_000,
            max_entries_per_feed: 20,
            max_summary_chars: 500,
            max_article_age_days: Some(60),
            retry: RetryPolicy::default(),
            thumbnail: ThumbnailConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Apply the environment toggles recognized alongside the CLI flags.
    /// Any non-empty value counts as set.
    pub fn apply_env(&mut self) {
        if env_flag("NO_DOWNLOAD") {
            self.no_download = true;
        }
        if env_flag("NO_UPLOAD") {
            self.no_upload = true;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.locales.is_empty() {
            return Err(EngineError::Config(
                "at least one locale must be configured".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(EngineError::Config(
                "concurrency limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn locale_csv_path(&self, locale: &str) -> PathBuf {
        self.sources_dir.join(format!("sources.{locale}.csv"))
    }
}

impl From<&EngineConfig> for NormalizeLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_entries: config.max_entries_per_feed,
            max_summary_chars: config.max_summary_chars,
            max_age_days: config.max_article_age_days,
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name).map(|v| !v.is_empty()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_locale_list_is_rejected() {
        let config = EngineConfig {
            locales: Vec::new(),
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn locale_csv_path_follows_naming_scheme() {
        let config = EngineConfig::default();
        assert_eq!(
            config.locale_csv_path("en_GB"),
            PathBuf::from("sources/sources.en_GB.csv")
        );
    }
}
