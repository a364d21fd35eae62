//! Variant-spanning artifacts: sitemap, feed and search index.
//!
//! Each variant's built-in plugins write their own artifact. After every
//! variant is built, [`reconcile`] writes the root artifact for each kind
//! whose mode is `merged` or `index`.

pub mod feed;
pub mod search;
pub mod sitemap;

use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use folio_core::{
    ArtifactMode, Config,
    content::{strip_html, truncate_at_word_boundary},
};
use thiserror::Error;
use tracing::{debug, info};

use crate::context::{BuildContext, RoutedItem};

/// File name of the sitemap artifact.
pub const SITEMAP_FILE: &str = "sitemap.xml";

/// File name of the feed artifact.
pub const FEED_FILE: &str = "rss.xml";

/// File name of the root feed list written in `index` mode.
pub const FEED_INDEX_FILE: &str = "feeds.opml";

/// File name of the search index artifact.
pub const SEARCH_FILE: &str = "search-index.json";

const SUMMARY_CHARS: usize = 160;

/// Artifact generation errors.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// IO error.
    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for artifact operations.
pub type Result<T> = std::result::Result<T, ArtifactError>;

/// Kind of page an entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Page,
    Post,
    /// Synthesised by a plugin.
    Derived,
    /// Home, blog index or pages index.
    List,
}

/// One page as seen by artifact generators.
#[derive(Debug, Clone)]
pub struct SiteEntry {
    /// Absolute URL.
    pub url: String,

    /// Variant-relative route URL.
    pub route_url: String,

    /// Variant language, if the site is localized.
    pub language: Option<String>,

    /// Cross-language grouping key: `i18nKey`, else the route URL.
    pub group_key: String,

    pub title: String,
    pub summary: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub last_modified: DateTime<Utc>,
    pub tags: Vec<String>,
    pub kind: EntryKind,
}

impl SiteEntry {
    #[must_use]
    pub fn is_post(&self) -> bool {
        self.kind == EntryKind::Post
    }
}

/// Alternate language version of an entry.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Alternate {
    pub hreflang: String,
    pub href: String,
}

/// An entry with its cross-language alternates.
#[derive(Debug, Clone)]
pub struct LinkedEntry {
    pub entry: SiteEntry,
    pub alternates: Vec<Alternate>,
}

/// Tags listed in an item's `tags` metadata, as a list or a comma separated string.
#[must_use]
pub fn item_tags(item: &folio_core::ContentItem) -> Vec<String> {
    match item.meta.get("tags") {
        Some(folio_core::Value::List(values)) => values
            .iter()
            .filter_map(folio_core::Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        Some(folio_core::Value::Text(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn entry_from(ctx: &BuildContext, routed: &RoutedItem) -> SiteEntry {
    let item = &routed.item;
    let summary = item.summary().map(str::to_string).or_else(|| {
        let text = strip_html(&item.content_html);
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        (!text.is_empty()).then(|| truncate_at_word_boundary(&text, SUMMARY_CHARS))
    });
    let kind = if routed.is_derived() {
        EntryKind::Derived
    } else if item.is_post() {
        EntryKind::Post
    } else {
        EntryKind::Page
    };
    let last_modified = ctx
        .derived_last_modified(&routed.route.url)
        .filter(|_| routed.is_derived())
        .unwrap_or(item.publish_at);

    SiteEntry {
        url: ctx.absolute_url(&routed.route.url),
        route_url: routed.route.url.clone(),
        language: ctx.language.clone(),
        group_key: item
            .i18n_key()
            .map_or_else(|| routed.route.url.clone(), str::to_string),
        title: item.title.clone(),
        summary,
        date: Some(item.publish_at),
        last_modified,
        tags: item_tags(item),
        kind,
    }
}

/// Route URLs of the list views the orchestrator always renders.
pub const LIST_URLS: [&str; 3] = ["/", "/blog/", "/pages/"];

/// Collect artifact entries for every page of a variant: list views, natural items, derived pages.
#[must_use]
pub fn collect_entries(ctx: &BuildContext) -> Vec<SiteEntry> {
    let newest = ctx
        .items
        .iter()
        .map(|r| r.item.publish_at)
        .max()
        .unwrap_or_else(Utc::now);

    let lists = LIST_URLS.iter().map(|url| SiteEntry {
        url: ctx.absolute_url(url),
        route_url: (*url).to_string(),
        language: ctx.language.clone(),
        group_key: (*url).to_string(),
        title: ctx.config.site.title.clone(),
        summary: ctx.config.site.description.clone(),
        date: None,
        last_modified: newest,
        tags: Vec::new(),
        kind: EntryKind::List,
    });

    lists
        .chain(ctx.render_queue().map(|routed| entry_from(ctx, routed)))
        .collect()
}

/// Link entries from every variant.
///
/// Entries are de-duplicated by absolute URL (first wins) and grouped by
/// [`SiteEntry::group_key`]. Each localized entry carries one alternate per
/// member of its group, preceded by an `x-default` alternate pointing at the
/// default language's member when one exists.
#[must_use]
pub fn merge_entries(
    entries: impl IntoIterator<Item = SiteEntry>,
    default_language: Option<&str>,
) -> Vec<LinkedEntry> {
    let mut seen = HashSet::new();
    let unique: Vec<_> = entries
        .into_iter()
        .filter(|e| seen.insert(e.url.clone()))
        .collect();

    let mut groups: HashMap<&str, Vec<&SiteEntry>> = HashMap::new();
    for entry in &unique {
        if entry.language.is_some() {
            groups.entry(entry.group_key.as_str()).or_default().push(entry);
        }
    }

    let alternates_for = |entry: &SiteEntry| -> Vec<Alternate> {
        let Some(members) = groups.get(entry.group_key.as_str()) else {
            return Vec::new();
        };

        let mut alternates = Vec::with_capacity(members.len() + 1);
        if let Some(default) = default_language
            && let Some(member) = members
                .iter()
                .find(|m| m.language.as_deref() == Some(default))
        {
            alternates.push(Alternate {
                hreflang: "x-default".to_string(),
                href: member.url.clone(),
            });
        }

        let mut languages = HashSet::new();
        for member in members {
            if let Some(lang) = &member.language
                && languages.insert(lang.as_str())
            {
                alternates.push(Alternate {
                    hreflang: lang.clone(),
                    href: member.url.clone(),
                });
            }
        }
        alternates
    };

    let linked: Vec<_> = unique
        .iter()
        .map(|entry| LinkedEntry {
            alternates: alternates_for(entry),
            entry: entry.clone(),
        })
        .collect();

    debug!(count = linked.len(), groups = groups.len(), "merged entries");
    linked
}

/// Write `content` to `dir/name`, creating `dir`.
pub fn write_artifact(dir: &Path, name: &str, content: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::create_dir_all(dir).map_err(|source| ArtifactError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    fs::write(&path, content).map_err(|source| ArtifactError::Io {
        path: path.clone(),
        source,
    })?;
    debug!(path = %path.display(), "wrote artifact");
    Ok(path)
}

/// Output of one finished variant, kept for cross-variant reconciliation.
#[derive(Debug, Clone)]
pub struct VariantArtifacts {
    pub language: String,
    pub base_url: String,
    pub entries: Vec<SiteEntry>,
}

/// Write root artifacts for every kind configured as `merged` or `index`.
///
/// Only runs for localized sites, and only for kinds whose built-in plugin is enabled.
pub fn reconcile(
    config: &Config,
    variants: &[VariantArtifacts],
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    if config.site.languages.is_empty() || variants.is_empty() {
        return Ok(written);
    }

    let default_language = config.default_language();
    let all_entries = || variants.iter().flat_map(|v| v.entries.iter().cloned());
    let root_url = config.site.base_url.trim_end_matches('/');

    if config.plugin_enabled(sitemap::PLUGIN_NAME) {
        match config.artifacts.sitemap {
            ArtifactMode::Split => {}
            ArtifactMode::Merged => {
                let linked = merge_entries(all_entries(), default_language);
                let xml = sitemap::generate(&sitemap::urls_for(&linked));
                written.push(write_artifact(output_dir, SITEMAP_FILE, &xml)?);
            }
            ArtifactMode::Index => {
                let locs: Vec<_> = variants
                    .iter()
                    .map(|v| format!("{}/{SITEMAP_FILE}", v.base_url))
                    .collect();
                let xml = sitemap::generate_index(&locs, Utc::now());
                written.push(write_artifact(output_dir, SITEMAP_FILE, &xml)?);
            }
        }
    }

    if config.plugin_enabled(feed::PLUGIN_NAME) {
        match config.artifacts.feed {
            ArtifactMode::Split => {}
            ArtifactMode::Merged => {
                let linked = merge_entries(all_entries(), default_language);
                let generator = feed::FeedGenerator::new(config, root_url, default_language);
                written.push(write_artifact(output_dir, FEED_FILE, &generator.generate(&linked))?);
            }
            ArtifactMode::Index => {
                let feeds: Vec<_> = variants
                    .iter()
                    .map(|v| (v.language.as_str(), format!("{}/{FEED_FILE}", v.base_url)))
                    .collect();
                let opml = feed::generate_opml(&config.site.title, &feeds);
                written.push(write_artifact(output_dir, FEED_INDEX_FILE, &opml)?);
            }
        }
    }

    if config.plugin_enabled(search::PLUGIN_NAME) {
        match config.artifacts.search {
            ArtifactMode::Split => {}
            ArtifactMode::Merged => {
                let linked = merge_entries(all_entries(), default_language);
                let index = search::SearchIndex::build(None, &linked, config.search.include_derived);
                written.push(write_artifact(output_dir, SEARCH_FILE, &index.to_json()?)?);
            }
            ArtifactMode::Index => {
                let list = search::SearchIndexList::new(
                    variants
                        .iter()
                        .map(|v| (v.language.clone(), format!("{}/{SEARCH_FILE}", v.base_url))),
                );
                written.push(write_artifact(output_dir, SEARCH_FILE, &list.to_json()?)?);
            }
        }
    }

    if !written.is_empty() {
        info!(count = written.len(), "wrote root artifacts");
    }
    Ok(written)
}
