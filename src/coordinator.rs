use crate::fetcher::SourceFetcher;
use crate::types::{
    Article, EngineError, FeedDocument, Result, RunReport, Source, SourceOutcome, SourceStatus,
    SourceSummary,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

/// Drives one aggregation run: fans out one task per enabled source
/// under a bounded concurrency limit, collects outcomes over a channel,
/// enforces the run deadline, and merges the results into the final feed
/// document and report.
///
/// A single source's failure never aborts the run; only an empty catalog
/// is fatal here.
pub struct AggregationCoordinator {
    fetcher: Arc<SourceFetcher>,
    concurrency: usize,
    deadline: Duration,
}

impl AggregationCoordinator {
    pub fn new(fetcher: Arc<SourceFetcher>, concurrency: usize, deadline: Duration) -> Self {
        Self {
            fetcher,
            concurrency,
            deadline,
        }
    }

    pub async fn run(&self, catalog: &[Source]) -> Result<(FeedDocument, RunReport)> {
        if catalog.is_empty() {
            return Err(EngineError::Config(
                "refusing to run against an empty catalog".to_string(),
            ));
        }

        let started = Instant::now();
        let enabled: Vec<Source> = catalog.iter().filter(|s| s.enabled).cloned().collect();
        info!(
            total = catalog.len(),
            enabled = enabled.len(),
            concurrency = self.concurrency,
            "starting aggregation run"
        );

        let outcomes = self.collect_outcomes(&enabled).await;
        let (feed, report) = merge_outcomes(&enabled, outcomes, started.elapsed());

        info!(
            ok = report.ok_count,
            partial = report.partial_count,
            failed = report.failed_count,
            articles = feed.articles.len(),
            duration_ms = report.duration_ms,
            "aggregation run finished"
        );

        Ok((feed, report))
    }

    /// One spawned task per source, gated by a semaphore permit so at
    /// most `concurrency` sources are in flight. Results come back over
    /// a channel; when the deadline fires, stragglers are aborted and
    /// later recorded as timed out.
    async fn collect_outcomes(&self, enabled: &[Source]) -> HashMap<String, SourceOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handles = Vec::with_capacity(enabled.len());

        for source in enabled.iter().cloned() {
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            let fetcher = self.fetcher.clone();
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let outcome = fetcher.process_source(&source).await;
                let _ = tx.send(outcome);
            }));
        }
        drop(tx);

        let deadline = tokio::time::Instant::now() + self.deadline;
        let mut outcomes: HashMap<String, SourceOutcome> = HashMap::new();

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(outcome) => {
                        outcomes.insert(outcome.source_id.clone(), outcome);
                    }
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(
                        completed = outcomes.len(),
                        total = enabled.len(),
                        "run deadline reached, aborting outstanding sources"
                    );
                    for handle in &handles {
                        handle.abort();
                    }
                    break;
                }
            }
        }

        // Outcomes sent in the window between the deadline firing and the
        // aborts landing are still valid completions.
        while let Ok(outcome) = rx.try_recv() {
            outcomes.insert(outcome.source_id.clone(), outcome);
        }

        for source in enabled {
            if !outcomes.contains_key(&source.id) {
                outcomes.insert(source.id.clone(), SourceOutcome::timed_out(&source.id));
            }
        }

        outcomes
    }
}

/// Merge per-source outcomes into the final document and report.
///
/// Articles from ok/partial sources are walked in catalog order,
/// deduplicated by url (first wins), then sorted by publish time
/// descending with ties broken by source priority descending and then
/// article url, deterministic for any completion order.
fn merge_outcomes(
    enabled: &[Source],
    mut outcomes: HashMap<String, SourceOutcome>,
    duration: Duration,
) -> (FeedDocument, RunReport) {
    let mut ok_count = 0;
    let mut partial_count = 0;
    let mut failed_count = 0;
    let mut per_source = Vec::with_capacity(enabled.len());
    let mut seen_urls = HashSet::new();
    let mut articles: Vec<Article> = Vec::new();

    for source in enabled {
        let Some(outcome) = outcomes.remove(&source.id) else {
            continue;
        };

        match outcome.status {
            SourceStatus::Ok => ok_count += 1,
            SourceStatus::Partial => partial_count += 1,
            SourceStatus::Failed => failed_count += 1,
        }

        per_source.push(SourceSummary {
            source_id: outcome.source_id.clone(),
            status: outcome.status,
            article_count: outcome.articles.len(),
            dropped_entries: outcome.dropped_entries,
            error: outcome.error.clone(),
        });

        if outcome.status != SourceStatus::Failed {
            for article in outcome.articles {
                if seen_urls.insert(article.url.clone()) {
                    articles.push(article);
                }
            }
        }
    }

    let priority_of: HashMap<&str, u32> = enabled
        .iter()
        .map(|s| (s.id.as_str(), s.priority))
        .collect();
    articles.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| {
                let pa = priority_of.get(a.source_id.as_str()).copied().unwrap_or(0);
                let pb = priority_of.get(b.source_id.as_str()).copied().unwrap_or(0);
                pb.cmp(&pa)
            })
            .then_with(|| a.url.cmp(&b.url))
    });

    let report = RunReport {
        total_sources: enabled.len(),
        ok_count,
        partial_count,
        failed_count,
        per_source,
        duration_ms: duration.as_millis() as u64,
    };

    (FeedDocument { articles }, report)
}
