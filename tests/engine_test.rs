mod common;

use common::{StubFetch, StubResponse};
use feed_aggregator::{Engine, EngineError, FeedDocument, RunReport};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn write_sources_csv(dir: &std::path::Path, locale: &str, rows: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(
        dir.join(format!("sources.{locale}.csv")),
        format!("id,name,feed_url,category,enabled,priority\n{rows}"),
    )
    .unwrap();
}

#[tokio::test]
async fn full_run_writes_all_artifacts() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let mut config = common::test_config(dir.path());
    config.locales = vec!["en_US".to_string(), "de_DE".to_string()];

    write_sources_csv(
        &config.sources_dir,
        "en_US",
        "bbc,BBC News,https://feeds.bbci.co.uk/news/rss.xml,News,Enabled,10\n",
    );
    write_sources_csv(
        &config.sources_dir,
        "de_DE",
        "taz,Taz,https://taz.de/rss.xml,News,Enabled,5\n",
    );

    let stub = StubFetch::new()
        .respond(
            "https://feeds.bbci.co.uk/news/rss.xml",
            StubResponse::Ok(common::simple_feed(3, "https://www.bbc.co.uk/news")),
        )
        .respond(
            "https://taz.de/rss.xml",
            StubResponse::Ok(common::simple_feed(2, "https://taz.de/artikel")),
        );

    let engine = Engine::with_fetch(config.clone(), Arc::new(stub)).unwrap();
    let report = engine.run().await.unwrap();

    assert_eq!(report.total_sources, 2);
    assert_eq!(report.ok_count, 2);
    assert_eq!(report.failed_count, 0);

    for artifact in [
        "sources.en_US.json",
        "sources.de_DE.json",
        "sources.global.json",
        "feed.json",
        "report.json",
    ] {
        assert!(
            config.output_dir.join(artifact).exists(),
            "missing artifact {artifact}"
        );
    }

    let feed: FeedDocument =
        serde_json::from_slice(&fs::read(config.output_dir.join("feed.json")).unwrap()).unwrap();
    assert_eq!(feed.articles.len(), 5);
    for article in &feed.articles {
        assert!(
            article.source_id == "bbc" || article.source_id == "taz",
            "article references unknown source {}",
            article.source_id
        );
    }

    let written_report: RunReport =
        serde_json::from_slice(&fs::read(config.output_dir.join("report.json")).unwrap()).unwrap();
    assert_eq!(
        written_report.ok_count + written_report.partial_count + written_report.failed_count,
        written_report.total_sources
    );
}

#[tokio::test]
async fn empty_catalogs_abort_before_any_file_is_written() {
    // Scenario C.
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let config = common::test_config(dir.path());
    write_sources_csv(&config.sources_dir, "en_US", "");

    let engine = Engine::with_fetch(config.clone(), Arc::new(StubFetch::new())).unwrap();
    let err = engine.run().await.unwrap_err();

    assert!(matches!(err, EngineError::Config(_)), "got {err:?}");
    assert!(
        !config.output_dir.exists(),
        "no output files may be written for an empty catalog"
    );
}

#[tokio::test]
async fn schema_error_in_one_locale_leaves_the_others_running() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let mut config = common::test_config(dir.path());
    config.locales = vec!["en_US".to_string(), "fr_FR".to_string()];

    write_sources_csv(
        &config.sources_dir,
        "en_US",
        "bbc,BBC News,https://feeds.bbci.co.uk/news/rss.xml,News,Enabled,10\n",
    );
    fs::write(
        config.sources_dir.join("sources.fr_FR.csv"),
        "colonne,inattendue\nx,y\n",
    )
    .unwrap();

    let stub = StubFetch::new().respond(
        "https://feeds.bbci.co.uk/news/rss.xml",
        StubResponse::Ok(common::simple_feed(1, "https://www.bbc.co.uk/news")),
    );
    let engine = Engine::with_fetch(config.clone(), Arc::new(stub)).unwrap();

    let report = engine.run().await.unwrap();
    assert_eq!(report.total_sources, 1);
    assert_eq!(report.ok_count, 1);
    assert!(config.output_dir.join("sources.en_US.json").exists());
    assert!(!config.output_dir.join("sources.fr_FR.json").exists());
}

#[tokio::test]
async fn cache_only_rerun_reproduces_the_feed_byte_for_byte() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let mut config = common::test_config(dir.path());
    write_sources_csv(
        &config.sources_dir,
        "en_US",
        "bbc,BBC News,https://feeds.bbci.co.uk/news/rss.xml,News,Enabled,10\n",
    );

    let stub = StubFetch::new().respond(
        "https://feeds.bbci.co.uk/news/rss.xml",
        StubResponse::Ok(common::simple_feed(4, "https://www.bbc.co.uk/news")),
    );
    let engine = Engine::with_fetch(config.clone(), Arc::new(stub)).unwrap();
    engine.run().await.unwrap();
    let first_feed = fs::read(config.output_dir.join("feed.json")).unwrap();

    // second run: downloads disabled, everything must come from the cache
    config.no_download = true;
    let offline = Engine::with_fetch(config.clone(), Arc::new(StubFetch::new())).unwrap();
    let report = offline.run().await.unwrap();
    let second_feed = fs::read(config.output_dir.join("feed.json")).unwrap();

    assert_eq!(report.ok_count, 1);
    assert_eq!(first_feed, second_feed);
}

#[tokio::test]
async fn missing_locale_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mut config = common::test_config(dir.path());
    config.locales = vec!["sv_SE".to_string()];
    fs::create_dir_all(&config.sources_dir).unwrap();

    let engine = Engine::with_fetch(config, Arc::new(StubFetch::new())).unwrap();
    let err = engine.run().await.unwrap_err();
    assert!(matches!(err, EngineError::Config(_)), "got {err:?}");
}
