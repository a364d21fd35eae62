//! Built-in plugins.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use folio_core::{ContentItem, Value};
use serde_json::json;

use crate::{
    artifacts::{
        feed::FeedPlugin, item_tags, search::SearchPlugin, sitemap::SitemapPlugin,
        sitemap::escape_xml,
    },
    context::{BuildContext, DerivedPage},
    plugin::{self, DerivePages, Plugin, PluginSource},
    route::{PAGE_TEMPLATE, Route, slugify},
};

/// Name of the built-in taxonomy plugin.
pub const TAXONOMY_PLUGIN: &str = "taxonomy";

/// Data bag key holding the taxonomy index.
pub const TAXONOMY_DATA_KEY: &str = "taxonomy";

/// The built-in plugin source: taxonomy, sitemap, feed, search.
#[must_use]
pub fn builtin_source() -> PluginSource {
    PluginSource::new("builtin")
        .with(|| Box::new(TaxonomyPlugin))
        .with(|| Box::new(SitemapPlugin))
        .with(|| Box::new(FeedPlugin))
        .with(|| Box::new(SearchPlugin))
}

/// Derives one page per tag plus a `/tags/` overview.
#[derive(Debug, Default)]
pub struct TaxonomyPlugin;

#[derive(Debug)]
struct Tag {
    name: String,
    latest: DateTime<Utc>,
    pages: Vec<(String, String)>,
}

impl Plugin for TaxonomyPlugin {
    fn name(&self) -> &str {
        TAXONOMY_PLUGIN
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn as_derive_pages(&self) -> Option<&dyn DerivePages> {
        Some(self)
    }
}

impl DerivePages for TaxonomyPlugin {
    fn derive_pages(&self, ctx: &mut BuildContext) -> plugin::Result<Vec<DerivedPage>> {
        let mut tags: BTreeMap<String, Tag> = BTreeMap::new();

        for routed in &ctx.items {
            for name in item_tags(&routed.item) {
                let slug = slugify(&name);
                if slug.is_empty() {
                    continue;
                }
                let tag = tags.entry(slug).or_insert_with(|| Tag {
                    name,
                    latest: routed.item.publish_at,
                    pages: Vec::new(),
                });
                tag.latest = tag.latest.max(routed.item.publish_at);
                tag.pages.push((
                    routed.item.title.clone(),
                    ctx.absolute_url(&routed.route.url),
                ));
            }
        }

        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let mut pages = Vec::with_capacity(tags.len() + 1);
        let mut index = Vec::with_capacity(tags.len());

        for (slug, tag) in &tags {
            let route = Route::new(
                format!("/tags/{slug}/"),
                format!("tags/{slug}/index.html"),
                PAGE_TEMPLATE,
            );
            let url = ctx.absolute_url(&route.url);
            index.push(json!({
                "name": tag.name,
                "slug": slug,
                "url": url,
                "count": tag.pages.len(),
            }));

            let item = ContentItem::new(format!("tags/{slug}"), &tag.name, slug, tag.latest)
                .with_html(link_list(&tag.pages))
                .with_meta("type", Value::text("tag"))
                .with_meta(
                    "summary",
                    Value::text(format!("{} pages tagged {}", tag.pages.len(), tag.name)),
                );
            pages.push(DerivedPage::new(item, route, tag.latest));
        }

        let latest = tags.values().map(|t| t.latest).max().unwrap_or_else(Utc::now);
        let overview: Vec<_> = tags
            .iter()
            .map(|(slug, tag)| {
                (
                    format!("{} ({})", tag.name, tag.pages.len()),
                    ctx.absolute_url(&format!("/tags/{slug}/")),
                )
            })
            .collect();
        let item = ContentItem::new("tags", "Tags", "tags", latest)
            .with_html(link_list(&overview))
            .with_meta("type", Value::text("tag"));
        pages.push(DerivedPage::new(
            item,
            Route::new("/tags/", "tags/index.html", PAGE_TEMPLATE),
            latest,
        ));

        ctx.data
            .insert(TAXONOMY_DATA_KEY.to_string(), json!({ "tags": index }));

        Ok(pages)
    }
}

fn link_list(links: &[(String, String)]) -> String {
    let mut html = String::from("<ul class=\"taxonomy\">\n");
    for (title, url) in links {
        html.push_str(&format!(
            "  <li><a href=\"{}\">{}</a></li>\n",
            escape_xml(url),
            escape_xml(title)
        ));
    }
    html.push_str("</ul>\n");
    html
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use folio_core::Config;

    use super::*;
    use crate::{context::RoutedItem, plugin::PluginRegistry, route::resolve};

    fn context() -> BuildContext {
        let mut ctx = BuildContext::new(
            Config::new("Site", "https://example.com"),
            Some("en".into()),
            PathBuf::from("."),
            PathBuf::from("public/en"),
        );
        for (slug, tags) in [("a", vec!["Rust", "Web"]), ("b", vec!["rust"]), ("c", vec![])] {
            let item = ContentItem::new(slug, slug.to_uppercase(), slug, Utc::now()).with_meta(
                "tags",
                Value::List(tags.into_iter().map(Value::text).collect()),
            );
            let route = resolve(&item, Default::default());
            ctx.items.push(RoutedItem::natural(item, route));
        }
        ctx
    }

    #[test]
    fn test_builtin_registry() {
        let registry = PluginRegistry::builtin();
        assert_eq!(registry.len(), 4);
        assert!(registry.ids()[0].starts_with("taxonomy@"));
    }

    #[test]
    fn test_taxonomy_derives_tag_pages() {
        let mut ctx = context();
        let pages = TaxonomyPlugin.derive_pages(&mut ctx).unwrap();

        let urls: Vec<_> = pages.iter().map(|p| p.route.url.as_str()).collect();
        assert_eq!(urls, vec!["/tags/rust/", "/tags/web/", "/tags/"]);

        let rust = &pages[0];
        assert_eq!(rust.item.title, "Rust");
        assert_eq!(rust.route.output_path, "tags/rust/index.html");
        assert!(rust.item.content_html.contains("https://example.com/en/pages/a/"));
        assert!(rust.item.content_html.contains("https://example.com/en/pages/b/"));

        let taxonomy = &ctx.data[TAXONOMY_DATA_KEY];
        assert_eq!(taxonomy["tags"][0]["count"], 2);
        assert_eq!(taxonomy["tags"][1]["url"], "https://example.com/en/tags/web/");
    }

    #[test]
    fn test_taxonomy_without_tags() {
        let mut ctx = context();
        ctx.items.clear();

        assert!(TaxonomyPlugin.derive_pages(&mut ctx).unwrap().is_empty());
        assert!(!ctx.data.contains_key(TAXONOMY_DATA_KEY));
    }
}
