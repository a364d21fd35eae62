//! RSS feed generation.
//!
//! Generates RSS 2.0 feeds of blog posts. Merged feeds carry `xhtml:link`
//! language alternates on each item; `index` mode lists each variant's feed
//! in an OPML document instead.

use std::collections::BTreeMap;

use chrono::Utc;
use folio_core::Config;
use rss::{
    ChannelBuilder, GuidBuilder, Item, ItemBuilder,
    extension::{Extension, ExtensionMap},
};
use tracing::debug;

use super::{FEED_FILE, LinkedEntry, collect_entries, sitemap::escape_xml, write_artifact};
use crate::{
    context::BuildContext,
    plugin::{self, AfterBuild, Plugin},
};

/// Name of the built-in feed plugin.
pub const PLUGIN_NAME: &str = "feed";

const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// RSS feed generator.
#[derive(Debug)]
pub struct FeedGenerator {
    title: String,
    link: String,
    description: String,
    language: Option<String>,
    author: Option<String>,
    limit: usize,
}

impl FeedGenerator {
    /// Create a generator for a channel rooted at `link`.
    #[must_use]
    pub fn new(config: &Config, link: &str, language: Option<&str>) -> Self {
        Self {
            title: config.site.title.clone(),
            link: link.to_string(),
            description: config
                .site
                .description
                .clone()
                .unwrap_or_else(|| config.site.title.clone()),
            language: language.map(str::to_string),
            author: config.site.author.clone(),
            limit: config.feed.limit,
        }
    }

    /// Generate RSS XML from the post entries, newest first.
    #[must_use]
    pub fn generate(&self, entries: &[LinkedEntry]) -> String {
        let mut posts: Vec<_> = entries.iter().filter(|e| e.entry.is_post()).collect();
        posts.sort_by(|a, b| b.entry.date.cmp(&a.entry.date));
        posts.truncate(self.limit);

        debug!(count = posts.len(), limit = self.limit, "generating RSS feed");

        let items: Vec<Item> = posts.iter().map(|linked| self.entry_to_item(linked)).collect();

        let mut namespaces = BTreeMap::new();
        if posts.iter().any(|p| !p.alternates.is_empty()) {
            namespaces.insert("xhtml".to_string(), XHTML_NS.to_string());
        }

        let channel = ChannelBuilder::default()
            .title(&self.title)
            .link(&self.link)
            .description(&self.description)
            .language(self.language.clone())
            .last_build_date(Some(Utc::now().to_rfc2822()))
            .namespaces(namespaces)
            .items(items)
            .build();

        channel.to_string()
    }

    /// Convert an entry to an RSS item.
    fn entry_to_item(&self, linked: &LinkedEntry) -> Item {
        let entry = &linked.entry;
        let guid = GuidBuilder::default()
            .value(&entry.url)
            .permalink(true)
            .build();

        let mut builder = ItemBuilder::default();
        builder.title(Some(entry.title.clone()));
        builder.link(Some(entry.url.clone()));
        builder.guid(Some(guid));

        if let Some(date) = entry.date {
            builder.pub_date(Some(date.to_rfc2822()));
        }

        if let Some(summary) = &entry.summary {
            builder.description(Some(summary.clone()));
        }

        if let Some(author) = &self.author {
            builder.author(Some(author.clone()));
        }

        let categories: Vec<_> = entry
            .tags
            .iter()
            .map(|tag| rss::Category {
                name: tag.clone(),
                domain: None,
            })
            .collect();

        if !categories.is_empty() {
            builder.categories(categories);
        }

        if !linked.alternates.is_empty() {
            builder.extensions(alternate_extensions(linked));
        }

        builder.build()
    }
}

/// `xhtml:link` extension elements for an entry's alternates.
fn alternate_extensions(linked: &LinkedEntry) -> ExtensionMap {
    let links = linked
        .alternates
        .iter()
        .map(|alt| Extension {
            name: "xhtml:link".to_string(),
            value: None,
            attrs: BTreeMap::from([
                ("rel".to_string(), "alternate".to_string()),
                ("hreflang".to_string(), alt.hreflang.clone()),
                ("href".to_string(), alt.href.clone()),
            ]),
            children: BTreeMap::new(),
        })
        .collect();

    BTreeMap::from([(
        "xhtml".to_string(),
        BTreeMap::from([("link".to_string(), links)]),
    )])
}

/// OPML outline of per-variant feeds, as `(language, absolute feed URL)` pairs.
#[must_use]
pub fn generate_opml(title: &str, feeds: &[(&str, String)]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str("<opml version=\"2.0\">\n");
    xml.push_str(&format!(
        "  <head>\n    <title>{}</title>\n  </head>\n",
        escape_xml(title)
    ));
    xml.push_str("  <body>\n");

    for (language, url) in feeds {
        xml.push_str(&format!(
            r#"    <outline type="rss" text="{} ({})" language="{}" xmlUrl="{}" />"#,
            escape_xml(title),
            escape_xml(language),
            escape_xml(language),
            escape_xml(url)
        ));
        xml.push('\n');
    }

    xml.push_str("  </body>\n</opml>\n");
    xml
}

/// Writes the variant's `rss.xml`.
#[derive(Debug, Default)]
pub struct FeedPlugin;

impl Plugin for FeedPlugin {
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

impl AfterBuild for FeedPlugin {
    fn after_build(&self, ctx: &BuildContext) -> plugin::Result<()> {
        let linked: Vec<_> = collect_entries(ctx)
            .into_iter()
            .map(|entry| LinkedEntry {
                entry,
                alternates: Vec::new(),
            })
            .collect();

        let generator = FeedGenerator::new(&ctx.config, &ctx.base_url, ctx.language.as_deref());
        write_artifact(&ctx.output_dir, FEED_FILE, &generator.generate(&linked))?;
        Ok(())
    }
}
