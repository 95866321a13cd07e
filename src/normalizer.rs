use crate::types::{Article, EngineError, Result, Source};
use chrono::{DateTime, Duration, Utc};
use feed_rs::model::Entry;
use feed_rs::parser;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, info};
use url::Url;

static IMG_SRC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img[^>]*\ssrc\s*=\s*["']([^"'>]+)["']"#).expect("valid img regex")
});

/// Knobs applied while turning feed entries into articles.
#[derive(Debug, Clone)]
pub struct NormalizeLimits {
    /// Only the first N entries of a feed are considered.
    pub max_entries: usize,
    pub max_summary_chars: usize,
    /// Entries older than this (or dated in the future) are dropped.
    /// `None` disables the window.
    pub max_age_days: Option<i64>,
}

impl Default for NormalizeLimits {
    fn default() -> Self {
        Self {
            max_entries: 20,
            max_summary_chars: 500,
            max_age_days: Some(60),
        }
    }
}

#[derive(Debug)]
pub struct NormalizedFeed {
    pub articles: Vec<Article>,
    pub dropped_entries: usize,
}

/// Parse a fetched feed document (RSS or Atom) into normalized articles.
///
/// An unparsable document is a `Parse` error; a well-formed document with
/// zero entries is valid and yields an empty article list. Entries
/// missing a title, link, or parsable publish time are dropped and
/// counted, never fatal.
pub fn normalize_feed(raw: &[u8], source: &Source, limits: &NormalizeLimits) -> Result<NormalizedFeed> {
    let feed = parser::parse(raw)
        .map_err(|e| EngineError::Parse(format!("failed to parse feed for {}: {e}", source.id)))?;

    let now = Utc::now();
    let total = feed.entries.len();
    let considered = total.min(limits.max_entries);
    let mut dropped = total.saturating_sub(limits.max_entries);
    let mut seen_urls = HashSet::new();
    let mut articles = Vec::new();

    for entry in feed.entries.into_iter().take(limits.max_entries) {
        match normalize_entry(entry, source, limits, now) {
            Some(article) => {
                if seen_urls.insert(article.url.clone()) {
                    articles.push(article);
                } else {
                    debug!(source = %source.id, url = %article.url, "skipping duplicate entry");
                    dropped += 1;
                }
            }
            None => dropped += 1,
        }
    }

    info!(
        source = %source.id,
        considered,
        kept = articles.len(),
        dropped,
        "normalized feed"
    );

    Ok(NormalizedFeed {
        articles,
        dropped_entries: dropped,
    })
}

fn normalize_entry(
    entry: Entry,
    source: &Source,
    limits: &NormalizeLimits,
    now: DateTime<Utc>,
) -> Option<Article> {
    let title = entry
        .title
        .as_ref()
        .map(|t| strip_html(&t.content))
        .unwrap_or_default();
    if title.is_empty() {
        debug!(source = %source.id, "dropping entry without title");
        return None;
    }

    let url = entry.links.first().map(|l| l.href.trim().to_string())?;
    if url.is_empty() {
        return None;
    }

    let published_at = match entry.published.or(entry.updated) {
        Some(ts) => ts.with_timezone(&Utc),
        None => {
            debug!(source = %source.id, title = %title, "dropping entry without publish time");
            return None;
        }
    };

    if let Some(max_age) = limits.max_age_days {
        if published_at > now || published_at < now - Duration::days(max_age) {
            debug!(source = %source.id, title = %title, "dropping entry outside the age window");
            return None;
        }
    }

    let summary_html = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .unwrap_or_default();
    let summary = truncate_chars(&strip_html(&summary_html), limits.max_summary_chars);

    let image_url = select_image(image_candidates(&entry, &summary_html));

    Some(Article {
        source_id: source.id.clone(),
        source_name: source.name.clone(),
        title,
        url,
        published_at,
        summary,
        category: source.category.clone(),
        image_url,
        thumbnail_ref: None,
    })
}

/// Where a candidate image reference came from. Selection walks the
/// variants in declaration order: explicit media content beats media
/// thumbnails, which beat images scraped out of the summary HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageCandidate {
    MediaContent { url: String, width: Option<u32> },
    MediaThumbnail { url: String, width: Option<u32> },
    InlineImg { url: String },
}

fn image_candidates(entry: &Entry, summary_html: &str) -> Vec<ImageCandidate> {
    let mut candidates = Vec::new();

    for media in &entry.media {
        for content in &media.content {
            if let Some(url) = &content.url {
                candidates.push(ImageCandidate::MediaContent {
                    url: url.to_string(),
                    width: content.width,
                });
            }
        }
        for thumb in &media.thumbnails {
            candidates.push(ImageCandidate::MediaThumbnail {
                url: thumb.image.uri.clone(),
                width: thumb.image.width,
            });
        }
    }

    if let Some(captures) = IMG_SRC_RE.captures(summary_html) {
        if let Some(src) = captures.get(1) {
            candidates.push(ImageCandidate::InlineImg {
                url: src.as_str().to_string(),
            });
        }
    }

    candidates
}

fn select_image(candidates: Vec<ImageCandidate>) -> Option<String> {
    let mut media_content: Option<(String, u32)> = None;
    let mut media_thumbnail: Option<(String, u32)> = None;
    let mut inline: Option<String> = None;

    for candidate in candidates {
        match candidate {
            ImageCandidate::MediaContent { url, width } => {
                let width = width.unwrap_or(0);
                if media_content.as_ref().map(|(_, w)| width > *w).unwrap_or(true) {
                    media_content = Some((url, width));
                }
            }
            ImageCandidate::MediaThumbnail { url, width } => {
                let width = width.unwrap_or(0);
                if media_thumbnail.as_ref().map(|(_, w)| width > *w).unwrap_or(true) {
                    media_thumbnail = Some((url, width));
                }
            }
            ImageCandidate::InlineImg { url } => {
                if inline.is_none() {
                    inline = Some(url);
                }
            }
        }
    }

    let chosen = media_content
        .map(|(url, _)| url)
        .or(media_thumbnail.map(|(url, _)| url))
        .or(inline)?;
    normalize_image_url(&chosen)
}

/// Force a usable absolute image URL: scheme-relative references get
/// https, non-http(s) schemes and stub paths (shorter than 4 chars) are
/// discarded.
pub fn normalize_image_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let candidate = if trimmed.starts_with("//") {
        format!("https:{trimmed}")
    } else {
        trimmed.to_string()
    };
    let url = Url::parse(&candidate).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    if url.path().len() < 4 {
        return None;
    }
    Some(url.to_string())
}

/// Drop HTML tags, decode entities, and collapse whitespace.
pub fn strip_html(input: &str) -> String {
    let text = input
        .chars()
        .fold((String::new(), false), |(mut out, in_tag), c| match c {
            '<' => (out, true),
            '>' => (out, false),
            _ if !in_tag => {
                out.push(c);
                (out, false)
            }
            _ => (out, true),
        })
        .0;
    html_escape::decode_html_entities(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
