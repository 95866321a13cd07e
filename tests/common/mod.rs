#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_aggregator::{
    ContentFetch, EngineConfig, EngineError, FetchedPayload, RetryPolicy, Source, ThumbnailConfig,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Canned behavior for one URL in a [`StubFetch`].
#[derive(Debug, Clone)]
pub enum StubResponse {
    Ok(Vec<u8>),
    /// Always fails with a retryable error (stand-in for 5xx/timeouts).
    Transient,
    /// Always fails with a non-retryable error (stand-in for 4xx).
    Permanent,
    /// Fails transiently for the first N calls, then succeeds.
    OkAfterFailures(usize, Vec<u8>),
    /// Never completes; exercises the run deadline.
    Hang,
}

/// Network-free [`ContentFetch`] with per-URL canned responses and call
/// counting.
pub struct StubFetch {
    responses: Mutex<HashMap<String, StubResponse>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl StubFetch {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn respond(self, url: &str, response: StubResponse) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
        self
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ContentFetch for StubFetch {
    async fn get(&self, url: &str, _max_bytes: u64) -> feed_aggregator::Result<FetchedPayload> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            let entry = calls.entry(url.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        let response = self.responses.lock().unwrap().get(url).cloned();

        match response {
            Some(StubResponse::Ok(bytes)) => Ok(payload(bytes)),
            Some(StubResponse::Transient) => Err(EngineError::Fetch {
                message: format!("stub 503 from {url}"),
                transient: true,
            }),
            Some(StubResponse::Permanent) => Err(EngineError::Fetch {
                message: format!("stub 404 from {url}"),
                transient: false,
            }),
            Some(StubResponse::OkAfterFailures(failures, bytes)) => {
                if count <= failures {
                    Err(EngineError::Fetch {
                        message: format!("stub 503 from {url} (attempt {count})"),
                        transient: true,
                    })
                } else {
                    Ok(payload(bytes))
                }
            }
            Some(StubResponse::Hang) => {
                futures::future::pending::<()>().await;
                unreachable!("pending future completed")
            }
            None => Err(EngineError::Fetch {
                message: format!("no stub registered for {url}"),
                transient: false,
            }),
        }
    }
}

fn payload(bytes: Vec<u8>) -> FetchedPayload {
    FetchedPayload {
        bytes,
        content_type: None,
        etag: None,
    }
}

/// Escape text for embedding in an XML element body, the way real feeds
/// carry HTML-bearing titles and descriptions.
pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// One RSS `<item>` element. Title and description are XML-escaped, so
/// they may contain HTML markup.
pub fn rss_item(
    title: &str,
    link: &str,
    published: DateTime<Utc>,
    description: &str,
    image_url: Option<&str>,
) -> String {
    let media = image_url
        .map(|url| format!(r#"<media:content url="{url}" width="640" height="480" medium="image"/>"#))
        .unwrap_or_default();
    format!(
        "<item><title>{}</title><link>{link}</link><pubDate>{}</pubDate>\
         <description>{}</description>{media}</item>",
        xml_escape(title),
        published.to_rfc2822(),
        xml_escape(description)
    )
}

/// A complete RSS 2.0 document wrapping the given items.
pub fn rss_feed(items: &[String]) -> Vec<u8> {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/"><channel><title>Test Feed</title><link>https://example.com</link><description>fixture</description>{}</channel></rss>"#,
        items.join("")
    )
    .into_bytes()
}

/// A feed of `count` plain entries published in the recent past, one
/// hour apart, newest first.
pub fn simple_feed(count: usize, link_prefix: &str) -> Vec<u8> {
    let now = Utc::now();
    let items: Vec<String> = (0..count)
        .map(|i| {
            rss_item(
                &format!("Article {i}"),
                &format!("{link_prefix}/{i}"),
                now - chrono::Duration::hours(1 + i as i64),
                &format!("Summary for article {i}"),
                None,
            )
        })
        .collect();
    rss_feed(&items)
}

pub fn source(id: &str, feed_url: &str) -> Source {
    Source {
        id: id.to_string(),
        locale: "en_US".to_string(),
        name: id.to_uppercase(),
        feed_url: feed_url.to_string(),
        enabled: true,
        category: "News".to_string(),
        priority: 0,
    }
}

/// Engine config pointed at temp directories, with fast retries and a
/// small thumbnail target so tests stay quick.
pub fn test_config(base: &Path) -> EngineConfig {
    EngineConfig {
        sources_dir: base.join("sources"),
        output_dir: base.join("output"),
        cache_dir: base.join("cache"),
        retry: RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
        },
        thumbnail: ThumbnailConfig {
            width: 64,
            height: 36,
            jpeg_quality: 80,
        },
        ..EngineConfig::default()
    }
}

/// Valid PNG bytes with a simple gradient, usable as a thumbnail input.
pub fn png_image_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_fn(32, 32, |x, y| {
        image::Rgb([(x * 8) as u8, (y * 8) as u8, 128])
    });
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .expect("encode fixture png");
    out
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}
