use clap::Parser;
use feed_aggregator::{Engine, EngineConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Aggregate curated publisher feeds into catalog and feed artifacts.
#[derive(Parser, Debug)]
#[command(name = "feed-aggregator", version, about)]
struct Cli {
    /// Locales to process, comma separated (one sources.<locale>.csv each)
    #[arg(long, value_delimiter = ',', default_value = "en_US")]
    locales: Vec<String>,

    /// Directory holding the curated sources.<locale>.csv files
    #[arg(long, default_value = "sources")]
    sources_dir: PathBuf,

    /// Directory the artifacts are written to
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Directory for the persistent fetch cache
    #[arg(long, default_value = "output/cache")]
    cache_dir: PathBuf,

    /// Maximum number of sources fetched in parallel
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Fetch attempts per resource before giving up
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    request_timeout: u64,

    /// Whole-run deadline in seconds; sources still pending at the
    /// deadline are reported as timed out
    #[arg(long, default_value_t = 600)]
    run_deadline: u64,

    /// Cache-only mode: never hit the network, fail on cache misses
    #[arg(long)]
    no_download: bool,

    /// Leave artifacts local instead of handing them to the uploader
    #[arg(long)]
    no_upload: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig {
        locales: cli.locales,
        sources_dir: cli.sources_dir,
        output_dir: cli.output_dir,
        cache_dir: cli.cache_dir,
        concurrency: cli.concurrency,
        request_timeout_secs: cli.request_timeout,
        run_deadline_secs: cli.run_deadline,
        no_download: cli.no_download,
        no_upload: cli.no_upload,
        ..EngineConfig::default()
    };
    config.retry.max_attempts = cli.max_retries;
    config.apply_env();

    let engine = Engine::new(config)?;
    let report = engine.run().await?;

    info!(
        total = report.total_sources,
        ok = report.ok_count,
        partial = report.partial_count,
        failed = report.failed_count,
        duration_ms = report.duration_ms,
        "aggregation complete"
    );

    Ok(())
}
