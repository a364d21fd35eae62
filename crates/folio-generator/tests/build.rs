//! End-to-end build tests.
//!
//! Each test lays out a small project in a temporary directory and runs the
//! full orchestrator against it.

use std::{fs, path::Path};

use chrono::{TimeZone, Utc};
use folio_core::{ArtifactMode, BuildOverrides, Config, ContentItem, PluginFailMode, Value};
use folio_generator::{
    BuildContext, Builder, CancelToken, DerivePages, DerivedPage, Manifest, Plugin,
    PluginRegistry, PluginSource, RenderReason, Route, StaticGateway, plugin,
};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn page(title: &str, extra: &str) -> String {
    format!("---\ntitle: {title}\ndate: 2026-01-14T00:00:00Z\n{extra}---\n\nSome *content* for {title}.\n")
}

/// Three pages, one of them a post.
fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "content/a.md", &page("Alpha", ""));
    write(dir.path(), "content/b.md", &page("Beta", ""));
    write(dir.path(), "content/c.md", &page("Gamma", "type: post\n"));
    dir
}

fn config() -> Config {
    Config::new("Test Site", "https://example.com")
}

fn manifest(root: &Path, name: &str) -> Manifest {
    Manifest::load(&root.join(".folio-cache").join(name))
}

#[test]
fn test_second_build_skips_everything() {
    let dir = project();

    let first = Builder::new(config(), dir.path()).build().unwrap();
    let variant = first.variant(None).unwrap();
    assert_eq!(variant.rendered, 3);
    assert_eq!(variant.reasons.get(&RenderReason::New), Some(&3));
    assert!(dir.path().join("public/pages/a/index.html").exists());
    assert!(dir.path().join("public/blog/c/index.html").exists());
    assert!(dir.path().join("public/index.html").exists());
    assert!(dir.path().join("public/blog/index.html").exists());
    assert!(dir.path().join("public/pages/index.html").exists());
    assert!(dir.path().join("public/sitemap.xml").exists());
    assert!(dir.path().join("public/rss.xml").exists());
    assert!(dir.path().join("public/search-index.json").exists());

    let second = Builder::new(config(), dir.path()).build().unwrap();
    let variant = second.variant(None).unwrap();
    assert_eq!(variant.rendered, 0);
    assert_eq!(variant.skipped, variant.total_pages());
    assert_eq!(variant.skipped, 3);
}

#[test]
fn test_title_change_rerenders_only_that_page() {
    let dir = project();
    Builder::new(config(), dir.path()).build().unwrap();
    let before = manifest(dir.path(), "manifest.json");

    write(dir.path(), "content/b.md", &page("Beta Prime", ""));
    let report = Builder::new(config(), dir.path()).build().unwrap();
    let variant = report.variant(None).unwrap();

    assert_eq!(variant.rendered, 1);
    assert_eq!(variant.skipped, 2);
    assert_eq!(variant.reasons.get(&RenderReason::ContentChanged), Some(&1));

    let after = manifest(dir.path(), "manifest.json");
    for key in ["pages/a/index.html", "blog/c/index.html"] {
        assert_eq!(before.entries[key], after.entries[key]);
    }
    assert_ne!(
        before.entries["pages/b/index.html"].content_hash,
        after.entries["pages/b/index.html"].content_hash
    );

    let html = fs::read_to_string(dir.path().join("public/pages/b/index.html")).unwrap();
    assert!(html.contains("Beta Prime"));
}

#[test]
fn test_template_change_rerenders_variant() {
    let dir = project();
    Builder::new(config(), dir.path()).build().unwrap();

    write(
        dir.path(),
        "theme/templates/pages/page.html",
        "<!-- layout: layouts/base.html -->\n<article class=\"custom\">{{ content }}</article>",
    );
    let report = Builder::new(config(), dir.path()).build().unwrap();
    let variant = report.variant(None).unwrap();

    assert_eq!(variant.rendered, 3);
    assert_eq!(variant.reasons.get(&RenderReason::TemplateChanged), Some(&3));

    let html = fs::read_to_string(dir.path().join("public/pages/a/index.html")).unwrap();
    assert!(html.contains("class=\"custom\""));
}

#[test]
fn test_deleted_page_is_pruned_but_left_on_disk() {
    let dir = project();
    Builder::new(config(), dir.path()).build().unwrap();

    fs::remove_file(dir.path().join("content/b.md")).unwrap();
    let report = Builder::new(config(), dir.path()).build().unwrap();
    let variant = report.variant(None).unwrap();

    assert_eq!(variant.pruned, 1);
    assert_eq!(variant.skipped, 2);
    assert!(!manifest(dir.path(), "manifest.json").entries.contains_key("pages/b/index.html"));
    assert!(dir.path().join("public/pages/b/index.html").exists());

    let clean = BuildOverrides {
        clean: Some(true),
        ..Default::default()
    };
    Builder::new(config(), dir.path())
        .with_overrides(clean)
        .build()
        .unwrap();
    assert!(!dir.path().join("public/pages/b/index.html").exists());
}

#[test]
fn test_missing_output_is_rerendered() {
    let dir = project();
    Builder::new(config(), dir.path()).build().unwrap();

    fs::remove_file(dir.path().join("public/pages/a/index.html")).unwrap();
    let report = Builder::new(config(), dir.path()).build().unwrap();
    let variant = report.variant(None).unwrap();

    assert_eq!(variant.rendered, 1);
    assert_eq!(variant.reasons.get(&RenderReason::OutputMissing), Some(&1));
}

#[test]
fn test_non_incremental_build_renders_all_and_keeps_manifest() {
    let dir = project();
    Builder::new(config(), dir.path()).build().unwrap();
    let before = manifest(dir.path(), "manifest.json");

    write(dir.path(), "content/a.md", &page("Alpha Two", ""));
    let full = BuildOverrides {
        incremental: Some(false),
        ..Default::default()
    };
    let report = Builder::new(config(), dir.path())
        .with_overrides(full)
        .build()
        .unwrap();
    let variant = report.variant(None).unwrap();

    assert_eq!(variant.rendered, 3);
    assert_eq!(variant.reasons.get(&RenderReason::FullRender), Some(&3));
    assert_eq!(manifest(dir.path(), "manifest.json"), before);
}

#[test]
fn test_force_renders_all_and_rewrites_manifest() {
    let dir = project();
    Builder::new(config(), dir.path()).build().unwrap();

    let force = BuildOverrides {
        force: Some(true),
        ..Default::default()
    };
    let report = Builder::new(config(), dir.path())
        .with_overrides(force)
        .build()
        .unwrap();
    let variant = report.variant(None).unwrap();

    assert_eq!(variant.reasons.get(&RenderReason::Forced), Some(&3));
    assert_eq!(manifest(dir.path(), "manifest.json").entries.len(), 3);
}

fn localized_config() -> Config {
    let mut config = config();
    config.site.languages = vec!["en".into(), "zh".into()];
    config
}

fn localized_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "content/about.md", &page("About", "i18nKey: about\n"));
    write(
        dir.path(),
        "content/guanyu.md",
        &page("Guanyu", "language: zh\ni18nKey: about\n"),
    );
    write(dir.path(), "content/only-en.md", &page("Only", ""));
    write(
        dir.path(),
        "content/_data/nav.md",
        "---\ntitle: Navigation\nfields:\n  locale: zh\n---\n",
    );
    dir
}

#[test]
fn test_language_partition() {
    let dir = localized_project();
    let report = Builder::new(localized_config(), dir.path()).build().unwrap();

    let en = report.variant(Some("en")).unwrap();
    let zh = report.variant(Some("zh")).unwrap();
    assert_eq!(en.routed, 2);
    assert_eq!(zh.routed, 1);
    assert_eq!(zh.base_url, "https://example.com/zh");

    assert!(dir.path().join("public/en/pages/only-en/index.html").exists());
    assert!(!dir.path().join("public/zh/pages/only-en/index.html").exists());
    assert!(dir.path().join("public/zh/pages/guanyu/index.html").exists());
    assert!(!dir.path().join("public/en/pages/guanyu/index.html").exists());

    assert_eq!(manifest(dir.path(), "manifest.en.json").entries.len(), 2);
    assert_eq!(manifest(dir.path(), "manifest.zh.json").entries.len(), 1);
}

#[test]
fn test_merged_sitemap_links_translations() {
    let dir = localized_project();
    let mut config = localized_config();
    config.artifacts.sitemap = ArtifactMode::Merged;

    let report = Builder::new(config, dir.path()).build().unwrap();
    assert!(report.root_artifacts.iter().any(|p| p.ends_with("sitemap.xml")));

    let xml = fs::read_to_string(dir.path().join("public/sitemap.xml")).unwrap();
    assert!(xml.contains("<loc>https://example.com/en/pages/about/</loc>"));
    assert!(xml.contains("<loc>https://example.com/zh/pages/guanyu/</loc>"));
    assert!(xml.contains(
        r#"<xhtml:link rel="alternate" hreflang="x-default" href="https://example.com/en/pages/about/" />"#
    ));
    assert!(xml.contains(
        r#"<xhtml:link rel="alternate" hreflang="zh" href="https://example.com/zh/pages/guanyu/" />"#
    ));

    let x_default = xml.find(r#"hreflang="x-default""#).unwrap();
    let en = xml.find(r#"hreflang="en""#).unwrap();
    assert!(x_default < en);

    // Per-variant sitemaps are still written.
    assert!(dir.path().join("public/en/sitemap.xml").exists());
    assert!(dir.path().join("public/zh/sitemap.xml").exists());
}

#[test]
fn test_index_mode_artifacts() {
    let dir = localized_project();
    let mut config = localized_config();
    config.artifacts.sitemap = ArtifactMode::Index;
    config.artifacts.feed = ArtifactMode::Index;
    config.artifacts.search = ArtifactMode::Index;

    Builder::new(config, dir.path()).build().unwrap();

    let sitemap = fs::read_to_string(dir.path().join("public/sitemap.xml")).unwrap();
    assert!(sitemap.contains("<sitemapindex"));
    assert!(sitemap.contains("<loc>https://example.com/zh/sitemap.xml</loc>"));

    let opml = fs::read_to_string(dir.path().join("public/feeds.opml")).unwrap();
    assert!(opml.contains(r#"xmlUrl="https://example.com/en/rss.xml""#));

    let search: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join("public/search-index.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(search["indexes"][1]["language"], "zh");
}

#[test]
fn test_disabled_plugin_writes_nothing() {
    let dir = project();
    let mut config = config();
    config
        .plugins
        .insert("sitemap".into(), folio_core::PluginToggle::Flag(false));

    let report = Builder::new(config, dir.path()).build().unwrap();
    assert!(!dir.path().join("public/sitemap.xml").exists());
    assert!(
        report.variants[0]
            .plugins
            .iter()
            .all(|r| !r.plugin_name.starts_with("sitemap@"))
    );
}

#[derive(Debug)]
struct Failing;

impl Plugin for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn as_derive_pages(&self) -> Option<&dyn DerivePages> {
        Some(self)
    }
}

impl DerivePages for Failing {
    fn derive_pages(&self, _ctx: &mut BuildContext) -> plugin::Result<Vec<DerivedPage>> {
        Err(plugin::PluginError::message("remote source unavailable"))
    }
}

fn failing_registry() -> PluginRegistry {
    PluginRegistry::discover(&[PluginSource::new("test").with(|| Box::new(Failing))])
}

#[test]
fn test_plugin_failure_warn_mode_continues() {
    let dir = project();
    let mut config = config();
    config.build.plugin_fail_mode = PluginFailMode::Warn;

    let report = Builder::new(config, dir.path())
        .with_plugins(failing_registry())
        .build()
        .unwrap();

    let records = &report.variants[0].plugins;
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert_eq!(records[0].plugin_name, "failing@1.0.0");
    assert_eq!(
        records[0].error_message.as_deref(),
        Some("remote source unavailable")
    );
    assert_eq!(report.variants[0].rendered, 3);
}

#[test]
fn test_plugin_failure_strict_mode_aborts() {
    let dir = project();
    let mut config = config();
    config.build.plugin_fail_mode = PluginFailMode::Strict;

    let err = Builder::new(config, dir.path())
        .with_plugins(failing_registry())
        .build()
        .unwrap_err();

    assert_eq!(err.language(), Some("default"));
    assert!(err.to_string().contains("variant 'default' failed"));
}

#[test]
fn test_taxonomy_pages_are_derived() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "content/a.md", &page("Alpha", "tags: [rust, web]\n"));
    write(dir.path(), "content/b.md", &page("Beta", "tags: [rust]\n"));

    let report = Builder::new(config(), dir.path()).build().unwrap();
    let variant = report.variant(None).unwrap();

    assert_eq!(variant.derived, 3);
    assert!(dir.path().join("public/tags/rust/index.html").exists());
    assert!(dir.path().join("public/tags/index.html").exists());

    let again = Builder::new(config(), dir.path()).build().unwrap();
    assert_eq!(again.variant(None).unwrap().rendered, 0);
}

#[test]
fn test_static_gateway_and_metrics() {
    let dir = TempDir::new().unwrap();
    let date = Utc.with_ymd_and_hms(2026, 1, 14, 0, 0, 0).unwrap();
    let items = vec![
        ContentItem::new("one", "One", "one", date).with_html("<p>1</p>"),
        ContentItem::new("two", "Two", "two", date).with_meta(
            "route",
            Value::Object(
                folio_core::ValueMap::new()
                    .with("url", Value::text("/custom/"))
                    .with("outputPath", Value::text("custom.html"))
                    .with("template", Value::text("pages/page.html")),
            ),
        ),
    ];

    let overrides = BuildOverrides {
        metrics_path: Some("metrics/build.json".into()),
        ..Default::default()
    };
    Builder::new(config(), dir.path())
        .with_gateway(StaticGateway::new(items))
        .with_overrides(overrides)
        .build()
        .unwrap();

    assert!(dir.path().join("public/custom.html").exists());

    let metrics: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join("metrics/build.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(metrics["contentItems"], 2);
    assert_eq!(metrics["variants"][0]["routed"], 2);
    assert_eq!(metrics["variants"][0]["reasons"]["new"], 2);
}

#[test]
fn test_cancelled_build() {
    let dir = project();
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = Builder::new(config(), dir.path())
        .with_cancel_token(cancel)
        .build()
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(!dir.path().join(".folio-cache/manifest.json").exists());
}

fn fixed_date() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 14, 0, 0, 0).unwrap()
}

fn routed_item(id: &str, url: &str, output_path: &str, html: &str) -> ContentItem {
    ContentItem::new(id, id, id, fixed_date())
        .with_html(html)
        .with_meta("url", Value::text(url))
        .with_meta("outputPath", Value::text(output_path))
        .with_meta("template", Value::text("pages/page.html"))
}

#[test]
fn test_page_routed_onto_list_view_is_dropped() {
    let dir = TempDir::new().unwrap();
    let items = vec![
        routed_item("landing", "/", "index.html", "<p>LANDING-BODY</p>"),
        ContentItem::new("one", "One", "one", fixed_date()).with_html("<p>1</p>"),
    ];

    let report = Builder::new(config(), dir.path())
        .with_gateway(StaticGateway::new(items.clone()))
        .build()
        .unwrap();
    let variant = report.variant(None).unwrap();
    assert_eq!(variant.routed, 1);
    assert_eq!(variant.rendered, 1);

    let home = fs::read_to_string(dir.path().join("public/index.html")).unwrap();
    assert!(!home.contains("LANDING-BODY"));
    let entries = manifest(dir.path(), "manifest.json").entries;
    assert!(!entries.contains_key("index.html"));
    assert!(entries.contains_key("pages/one/index.html"));

    let again = Builder::new(config(), dir.path())
        .with_gateway(StaticGateway::new(items))
        .build()
        .unwrap();
    let variant = again.variant(None).unwrap();
    assert_eq!(variant.rendered, 0);
    assert_eq!(variant.skipped, 1);
}

#[test]
fn test_output_path_stays_inside_output_dir() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("proj");
    fs::create_dir_all(&root).unwrap();
    let items = vec![routed_item(
        "escape",
        "/escaped/",
        "../../escaped.html",
        "<p>ESCAPED</p>",
    )];

    Builder::new(config(), &root)
        .with_gateway(StaticGateway::new(items))
        .build()
        .unwrap();

    assert!(!dir.path().join("escaped.html").exists());
    assert!(!root.join("escaped.html").exists());
    let html = fs::read_to_string(root.join("public/escaped.html")).unwrap();
    assert!(html.contains("ESCAPED"));
}

#[test]
fn test_page_without_slug_keeps_its_own_path() {
    let dir = TempDir::new().unwrap();
    let items = vec![
        ContentItem::new("x", "Bang", "", fixed_date()).with_html("<p>BANG-BODY</p>"),
    ];

    let report = Builder::new(config(), dir.path())
        .with_gateway(StaticGateway::new(items))
        .build()
        .unwrap();
    assert_eq!(report.variant(None).unwrap().rendered, 1);

    let html = fs::read_to_string(dir.path().join("public/pages/x/index.html")).unwrap();
    assert!(html.contains("BANG-BODY"));
    let list = fs::read_to_string(dir.path().join("public/pages/index.html")).unwrap();
    assert!(!list.contains("BANG-BODY"));
}

#[derive(Debug)]
struct Shadowing;

impl Plugin for Shadowing {
    fn name(&self) -> &str {
        "shadowing"
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn as_derive_pages(&self) -> Option<&dyn DerivePages> {
        Some(self)
    }
}

impl DerivePages for Shadowing {
    fn derive_pages(&self, _ctx: &mut BuildContext) -> plugin::Result<Vec<DerivedPage>> {
        let shadow = |url: &str, output: &str| {
            DerivedPage::new(
                ContentItem::new(url, "Shadow", "shadow", fixed_date()).with_html("<p>SHADOW</p>"),
                Route::new(url, output, "pages/page.html"),
                fixed_date(),
            )
        };
        Ok(vec![
            shadow("/pages/one/", "pages/one/index.html"),
            shadow("/blog/", "blog/index.html"),
            shadow("/extra/", "extra/index.html"),
        ])
    }
}

#[test]
fn test_derived_page_cannot_replace_natural_page_or_list() {
    let dir = TempDir::new().unwrap();
    let items = vec![
        ContentItem::new("one", "One", "one", fixed_date()).with_html("<p>ORIGINAL</p>"),
    ];
    let plugins =
        PluginRegistry::discover(&[PluginSource::new("test").with(|| Box::new(Shadowing))]);

    let report = Builder::new(config(), dir.path())
        .with_gateway(StaticGateway::new(items))
        .with_plugins(plugins)
        .build()
        .unwrap();
    let variant = report.variant(None).unwrap();
    assert_eq!(variant.routed, 1);
    assert_eq!(variant.derived, 1);

    let page = fs::read_to_string(dir.path().join("public/pages/one/index.html")).unwrap();
    assert!(page.contains("ORIGINAL"));
    assert!(!page.contains("SHADOW"));
    let blog = fs::read_to_string(dir.path().join("public/blog/index.html")).unwrap();
    assert!(!blog.contains("SHADOW"));
    assert!(dir.path().join("public/extra/index.html").exists());
}
