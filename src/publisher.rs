use crate::types::{FeedDocument, GlobalSource, Result, RunReport, Source};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Writes the run's artifacts under the output directory. Every write
/// goes to a temp file first and is renamed into place so a crashed run
/// never leaves a half-written artifact behind. Moving artifacts to
/// remote storage is an external collaborator's job; the publisher's
/// whole contract is these local files.
pub struct Publisher {
    output_dir: PathBuf,
}

impl Publisher {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn write_locale_catalog(&self, locale: &str, sources: &[Source]) -> Result<PathBuf> {
        self.write_json(&format!("sources.{locale}.json"), &sources)
            .await
    }

    pub async fn write_global_catalog(&self, sources: &[GlobalSource]) -> Result<PathBuf> {
        self.write_json("sources.global.json", &sources).await
    }

    pub async fn write_feed(&self, feed: &FeedDocument) -> Result<PathBuf> {
        self.write_json("feed.json", feed).await
    }

    pub async fn write_report(&self, report: &RunReport) -> Result<PathBuf> {
        self.write_json("report.json", report).await
    }

    async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).await?;

        let json = serde_json::to_vec_pretty(value)?;
        let path = self.output_dir.join(name);
        let tmp = self.output_dir.join(format!("{name}-tmp"));

        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, &path).await?;

        info!(artifact = name, bytes = json.len(), "wrote artifact");
        Ok(path)
    }
}
