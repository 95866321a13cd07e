use crate::normalizer::strip_html;
use crate::types::{Catalog, ConflictWarning, EngineError, GlobalSource, Result, Source};
use csv::StringRecord;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};
use url::Url;

/// Expected header of every curated locale CSV, in order.
pub const CATALOG_HEADER: [&str; 6] = ["id", "name", "feed_url", "category", "enabled", "priority"];

/// Load and validate one locale's curated source definitions.
///
/// A missing file is a fatal `Config` error (the locale set is externally
/// configured, so an absent file means misconfiguration). A header that
/// does not match [`CATALOG_HEADER`] is a `Schema` error for this file
/// only. Rows missing required fields are skipped, logged, and counted.
pub fn load_locale_catalog(path: &Path, locale: &str) -> Result<Catalog> {
    if !path.exists() {
        return Err(EngineError::Config(format!(
            "catalog file for locale {locale} not found: {}",
            path.display()
        )));
    }

    let mut reader = csv::Reader::from_path(path)?;

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers != CATALOG_HEADER {
        return Err(EngineError::Schema {
            path: path.display().to_string(),
            detail: format!("expected columns {CATALOG_HEADER:?}, found {headers:?}"),
        });
    }

    let mut sources = Vec::new();
    let mut malformed_rows = 0;

    for (index, record) in reader.records().enumerate() {
        let row = index + 2; // 1-based, after the header line
        match record {
            Ok(record) => match parse_row(&record, locale) {
                Some(source) => sources.push(source),
                None => {
                    warn!(locale, row, "skipping malformed catalog row");
                    malformed_rows += 1;
                }
            },
            Err(e) => {
                warn!(locale, row, error = %e, "skipping unreadable catalog row");
                malformed_rows += 1;
            }
        }
    }

    info!(
        locale,
        sources = sources.len(),
        malformed_rows,
        "loaded locale catalog"
    );

    Ok(Catalog {
        locale: locale.to_string(),
        sources,
        malformed_rows,
    })
}

fn parse_row(record: &StringRecord, locale: &str) -> Option<Source> {
    let field = |i: usize| record.get(i).map(str::trim).unwrap_or("");

    let id = field(0).to_string();
    let name = strip_html(field(1));
    let feed_url = normalize_feed_url(field(2))?;
    let category = field(3).to_string();
    if id.is_empty() || name.is_empty() {
        return None;
    }

    let enabled = parse_enabled(field(4));

    let priority_raw = field(5);
    let priority = if priority_raw.is_empty() {
        0
    } else {
        priority_raw.parse::<u32>().ok()?
    };

    Some(Source {
        id,
        locale: locale.to_string(),
        name,
        feed_url,
        enabled,
        category,
        priority,
    })
}

fn parse_enabled(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "enabled" | "true" | "1")
}

/// Feed URLs are forced onto https; anything that is not an absolute
/// http(s) URL makes the row malformed.
fn normalize_feed_url(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let mut url = Url::parse(raw).ok()?;
    match url.scheme() {
        "https" => {}
        "http" => url.set_scheme("https").ok()?,
        _ => return None,
    }
    Some(url.to_string())
}

/// Catalog artifacts are sorted by publisher name (ties by id) so the
/// serialized output is stable regardless of input row order.
pub fn sorted_for_output(sources: &[Source]) -> Vec<Source> {
    let mut out = sources.to_vec();
    out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    out
}

#[derive(Debug, Clone)]
pub struct GlobalMerge {
    pub sources: Vec<GlobalSource>,
    pub conflicts: Vec<ConflictWarning>,
}

/// Fold every locale's catalog into one global catalog.
///
/// Grouping is by source id. The first definition encountered in the
/// supplied catalog order wins; later locales are appended to the
/// entry's locale list, and any field disagreement is recorded as a
/// [`ConflictWarning`] rather than silently picking a variant. The input
/// order is the configured locale order, so the merge is deterministic.
pub fn merge_catalogs(catalogs: &[Catalog]) -> GlobalMerge {
    let mut order: Vec<String> = Vec::new();
    let mut by_id: HashMap<String, GlobalSource> = HashMap::new();
    let mut conflicts = Vec::new();

    for catalog in catalogs {
        for source in &catalog.sources {
            match by_id.get_mut(&source.id) {
                None => {
                    order.push(source.id.clone());
                    by_id.insert(
                        source.id.clone(),
                        GlobalSource {
                            id: source.id.clone(),
                            name: source.name.clone(),
                            feed_url: source.feed_url.clone(),
                            category: source.category.clone(),
                            enabled: source.enabled,
                            priority: source.priority,
                            locales: vec![source.locale.clone()],
                        },
                    );
                }
                Some(existing) => {
                    if !existing.locales.contains(&source.locale) {
                        existing.locales.push(source.locale.clone());
                    }
                    if let Some(field) = first_differing_field(existing, source) {
                        let conflict = ConflictWarning {
                            id: source.id.clone(),
                            kept_locale: existing.locales[0].clone(),
                            dropped_locale: source.locale.clone(),
                            field: field.to_string(),
                        };
                        warn!(
                            id = %conflict.id,
                            kept = %conflict.kept_locale,
                            dropped = %conflict.dropped_locale,
                            field = %conflict.field,
                            "conflicting source definition across locales, keeping first"
                        );
                        conflicts.push(conflict);
                    }
                }
            }
        }
    }

    let mut sources: Vec<GlobalSource> = order
        .iter()
        .filter_map(|id| by_id.get(id).cloned())
        .collect();
    sources.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

    info!(
        sources = sources.len(),
        conflicts = conflicts.len(),
        "merged global catalog"
    );

    GlobalMerge { sources, conflicts }
}

fn first_differing_field(kept: &GlobalSource, other: &Source) -> Option<&'static str> {
    if kept.name != other.name {
        Some("name")
    } else if kept.feed_url != other.feed_url {
        Some("feed_url")
    } else if kept.category != other.category {
        Some("category")
    } else if kept.enabled != other.enabled {
        Some("enabled")
    } else if kept.priority != other.priority {
        Some("priority")
    } else {
        None
    }
}
