//! Sitemap generation.
//!
//! Generates XML sitemaps with `xhtml:link` language alternates, and sitemap
//! indexes referencing per-variant sitemaps.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{Alternate, EntryKind, LinkedEntry, SITEMAP_FILE, write_artifact};
use crate::{
    context::BuildContext,
    plugin::{self, AfterBuild, Plugin},
};

/// Name of the built-in sitemap plugin.
pub const PLUGIN_NAME: &str = "sitemap";

/// Change frequency for sitemap entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFreq {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl ChangeFreq {
    fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

/// A sitemap URL entry.
#[derive(Debug, Clone)]
pub struct SitemapUrl {
    /// URL location.
    pub loc: String,

    /// Last modification date.
    pub lastmod: Option<DateTime<Utc>>,

    /// Change frequency.
    pub changefreq: Option<ChangeFreq>,

    /// Priority (0.0 to 1.0).
    pub priority: Option<f32>,

    /// Alternate language versions.
    pub alternates: Vec<Alternate>,
}

impl From<&LinkedEntry> for SitemapUrl {
    fn from(linked: &LinkedEntry) -> Self {
        let entry = &linked.entry;

        let (changefreq, priority) = match entry.kind {
            EntryKind::List if entry.route_url == "/" => (ChangeFreq::Daily, 1.0),
            EntryKind::List => (ChangeFreq::Daily, 0.7),
            EntryKind::Post => (ChangeFreq::Monthly, 0.8),
            EntryKind::Derived => (ChangeFreq::Weekly, 0.4),
            EntryKind::Page => (ChangeFreq::Yearly, 0.5),
        };

        Self {
            loc: entry.url.clone(),
            lastmod: Some(entry.last_modified),
            changefreq: Some(changefreq),
            priority: Some(priority),
            alternates: linked.alternates.clone(),
        }
    }
}

/// Sitemap URLs for linked entries.
#[must_use]
pub fn urls_for(entries: &[LinkedEntry]) -> Vec<SitemapUrl> {
    entries.iter().map(SitemapUrl::from).collect()
}

/// Generate sitemap XML.
#[must_use]
pub fn generate(urls: &[SitemapUrl]) -> String {
    debug!(count = urls.len(), "generating sitemap");

    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9""#);

    if urls.iter().any(|u| !u.alternates.is_empty()) {
        xml.push_str(r#" xmlns:xhtml="http://www.w3.org/1999/xhtml""#);
    }
    xml.push_str(">\n");

    for url in urls {
        xml.push_str(&url_to_xml(url));
    }

    xml.push_str("</urlset>\n");
    xml
}

/// Convert a URL entry to XML.
fn url_to_xml(url: &SitemapUrl) -> String {
    let mut xml = String::from("  <url>\n");

    xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(&url.loc)));

    if let Some(lastmod) = &url.lastmod {
        xml.push_str(&format!(
            "    <lastmod>{}</lastmod>\n",
            lastmod.format("%Y-%m-%d")
        ));
    }

    if let Some(changefreq) = url.changefreq {
        xml.push_str(&format!(
            "    <changefreq>{}</changefreq>\n",
            changefreq.as_str()
        ));
    }

    if let Some(priority) = &url.priority {
        xml.push_str(&format!("    <priority>{priority:.1}</priority>\n"));
    }

    for alt in &url.alternates {
        xml.push_str(&format!(
            r#"    <xhtml:link rel="alternate" hreflang="{}" href="{}" />"#,
            escape_xml(&alt.hreflang),
            escape_xml(&alt.href)
        ));
        xml.push('\n');
    }

    xml.push_str("  </url>\n");
    xml
}

/// Generate a sitemap index referencing absolute sitemap URLs.
#[must_use]
pub fn generate_index(locs: &[String], lastmod: DateTime<Utc>) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#);
    xml.push('\n');

    let lastmod = lastmod.format("%Y-%m-%d").to_string();

    for loc in locs {
        xml.push_str("  <sitemap>\n");
        xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(loc)));
        xml.push_str(&format!("    <lastmod>{lastmod}</lastmod>\n"));
        xml.push_str("  </sitemap>\n");
    }

    xml.push_str("</sitemapindex>\n");
    xml
}

/// Escape special XML characters.
pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Writes the variant's `sitemap.xml` covering natural and derived pages.
#[derive(Debug, Default)]
pub struct SitemapPlugin;

impl Plugin for SitemapPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn as_after_build(&self) -> Option<&dyn AfterBuild> {
        Some(self)
    }
}

impl AfterBuild for SitemapPlugin {
    fn after_build(&self, ctx: &BuildContext) -> plugin::Result<()> {
        let linked: Vec<_> = super::collect_entries(ctx)
            .into_iter()
            .map(|entry| LinkedEntry {
                entry,
                alternates: Vec::new(),
            })
            .collect();

        write_artifact(&ctx.output_dir, SITEMAP_FILE, &generate(&urls_for(&linked)))?;
        Ok(())
    }
}
