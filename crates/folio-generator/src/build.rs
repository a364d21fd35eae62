//! Build orchestration.
//!
//! Loads content once, then builds every language variant in order: route,
//! derive, render through the incremental cache, run after-build hooks. Once
//! all variants finish, site-root artifacts are reconciled and the optional
//! metrics report is written.

use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

use folio_core::{BuildOverrides, Config, ContentItem, CoreError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    artifacts::{self, ArtifactError, SiteEntry, VariantArtifacts, collect_entries},
    assets::{self, AssetError},
    cache::{
        self, CacheError, Decision, IncrementalCache, content_fingerprint, content_hash,
        manifest_file_name,
    },
    cancel::CancelToken,
    context::{BuildContext, DerivedRoute, RoutedItem},
    metrics::{BuildReport, VariantReport},
    plugin::{PluginError, PluginPipeline, PluginRegistry},
    render::{
        BLOG_TEMPLATE, HOME_TEMPLATE, ListItemView, ListView, PAGES_TEMPLATE, PageView,
        RenderError, RenderGateway, SiteView, TemplateRenderer,
    },
    route::{LIST_OUTPUT_PATHS, PathDiagnostics, Route, normalize_output_path, resolve},
    source::{ContentGateway, GatewayError, MarkdownGateway},
};

/// Build errors.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] CoreError),

    /// Content gateway error.
    #[error("content gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Template loading or rendering error.
    #[error("render error in template '{template}': {source}")]
    Render {
        template: String,
        #[source]
        source: RenderError,
    },

    /// Plugin error under the strict fail mode.
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// Incremental cache error.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Sitemap, feed or search artifact error.
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// Static or asset copy error.
    #[error("asset error: {0}")]
    Asset(#[from] AssetError),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cancellation was requested.
    #[error("build cancelled")]
    Cancelled,

    /// A fatal error inside one variant.
    #[error("variant '{language}' failed: {source}")]
    Variant {
        language: String,
        #[source]
        source: Box<BuildError>,
    },
}

impl BuildError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether the build stopped because cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled | Self::Gateway(GatewayError::Cancelled) => true,
            Self::Variant { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Language of the variant that failed, if the error escaped one.
    #[must_use]
    pub fn language(&self) -> Option<&str> {
        match self {
            Self::Variant { language, .. } => Some(language),
            _ => None,
        }
    }
}

impl From<RenderError> for BuildError {
    fn from(source: RenderError) -> Self {
        Self::Render {
            template: source.template().unwrap_or_default().to_string(),
            source,
        }
    }
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Resolved absolute directories for one build.
#[derive(Debug, Clone)]
struct Layout {
    output_dir: PathBuf,
    templates_dir: PathBuf,
    static_dir: PathBuf,
    assets_dir: PathBuf,
    cache_dir: PathBuf,
}

impl Layout {
    fn resolve(config: &Config, root: &Path) -> Self {
        let theme = root.join(&config.build.theme_dir);
        Self {
            output_dir: root.join(&config.build.output_dir),
            templates_dir: theme.join("templates"),
            static_dir: theme.join("static"),
            assets_dir: theme.join("assets"),
            cache_dir: root.join(&config.build.cache_dir),
        }
    }
}

/// The list views rendered on every build.
#[derive(Debug, Clone, Copy)]
enum ListKind {
    Home,
    Blog,
    Pages,
}

impl ListKind {
    const ALL: [Self; 3] = [Self::Home, Self::Blog, Self::Pages];

    fn url(self) -> &'static str {
        match self {
            Self::Home => "/",
            Self::Blog => "/blog/",
            Self::Pages => "/pages/",
        }
    }

    fn output_path(self) -> &'static str {
        match self {
            Self::Home => LIST_OUTPUT_PATHS[0],
            Self::Blog => LIST_OUTPUT_PATHS[1],
            Self::Pages => LIST_OUTPUT_PATHS[2],
        }
    }

    fn template(self) -> &'static str {
        match self {
            Self::Home => HOME_TEMPLATE,
            Self::Blog => BLOG_TEMPLATE,
            Self::Pages => PAGES_TEMPLATE,
        }
    }

    fn includes(self, item: &ContentItem) -> bool {
        match self {
            Self::Home => true,
            Self::Blog => item.is_post(),
            Self::Pages => !item.is_post(),
        }
    }
}

/// Site builder that orchestrates the build process.
pub struct Builder {
    config: Config,
    root: PathBuf,
    overrides: BuildOverrides,
    gateway: Option<Box<dyn ContentGateway>>,
    renderer: Option<Box<dyn RenderGateway>>,
    plugins: PluginRegistry,
    cancel: CancelToken,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("root", &self.root)
            .field("overrides", &self.overrides)
            .field("gateway", &self.gateway.as_ref().map(|g| g.name()))
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}

impl Builder {
    /// Create a builder for the project at `root`.
    ///
    /// Defaults: Markdown content from the configured content directory,
    /// theme templates over the built-ins, and the built-in plugin set.
    #[must_use]
    pub fn new(config: Config, root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            root: root.into(),
            overrides: BuildOverrides::default(),
            gateway: None,
            renderer: None,
            plugins: PluginRegistry::builtin(),
            cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: BuildOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Replace the default Markdown gateway.
    #[must_use]
    pub fn with_gateway(mut self, gateway: impl ContentGateway + 'static) -> Self {
        self.gateway = Some(Box::new(gateway));
        self
    }

    /// Replace the default template renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: impl RenderGateway + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    #[must_use]
    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Execute the full build process.
    pub fn build(&self) -> Result<BuildReport> {
        let start = Instant::now();

        let mut config = self.config.clone();
        self.overrides.apply(&mut config);
        config.validate()?;

        let layout = Layout::resolve(&config, &self.root);
        info!(
            root = %self.root.display(),
            output = %layout.output_dir.display(),
            languages = ?config.site.languages,
            incremental = config.build.incremental,
            "starting build"
        );

        self.prepare_output(&config, &layout)?;

        let markdown;
        let gateway: &dyn ContentGateway = match &self.gateway {
            Some(gateway) => gateway.as_ref(),
            None => {
                markdown = MarkdownGateway::from_config(&config, &self.root);
                &markdown
            }
        };
        let items = gateway.load(&self.cancel)?;
        info!(gateway = gateway.name(), count = items.len(), "loaded content");

        let templates;
        let renderer: &dyn RenderGateway = match &self.renderer {
            Some(renderer) => renderer.as_ref(),
            None => {
                templates = TemplateRenderer::load(&layout.templates_dir)?;
                &templates
            }
        };
        let template_hash = cache::template_hash(&layout.templates_dir)?;

        let languages: Vec<Option<String>> = if config.site.languages.is_empty() {
            vec![None]
        } else {
            config.site.languages.iter().cloned().map(Some).collect()
        };

        let mut report = BuildReport::new(&config, layout.output_dir.clone(), items.len());
        let mut variants = Vec::new();

        for language in &languages {
            let (variant, entries) = self
                .build_variant(
                    &config,
                    &layout,
                    language.as_deref(),
                    &items,
                    renderer,
                    &template_hash,
                )
                .map_err(|err| BuildError::Variant {
                    language: language.clone().unwrap_or_else(|| "default".to_string()),
                    source: Box::new(err),
                })?;

            if let Some(language) = language {
                variants.push(VariantArtifacts {
                    language: language.clone(),
                    base_url: variant.base_url.clone(),
                    entries,
                });
            }
            report.variants.push(variant);
        }

        report.root_artifacts = artifacts::reconcile(&config, &variants, &layout.output_dir)?;
        report.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        if let Some(path) = &config.build.metrics_path {
            let path = report.write(&self.root.join(path))?;
            info!(path = %path.display(), "wrote build metrics");
        }

        info!(
            variants = report.variants.len(),
            rendered = report.rendered(),
            skipped = report.skipped(),
            duration_ms = report.duration_ms,
            "build complete"
        );

        Ok(report)
    }

    /// Clean the output directory if requested, then make sure it exists.
    fn prepare_output(&self, config: &Config, layout: &Layout) -> Result<()> {
        if config.build.clean && layout.output_dir.exists() {
            if layout.output_dir == self.root {
                return Err(CoreError::invalid(
                    "build.output_dir",
                    "refusing to clean the project root",
                )
                .into());
            }
            debug!(dir = %layout.output_dir.display(), "cleaning output directory");
            fs::remove_dir_all(&layout.output_dir)
                .map_err(|err| BuildError::io(&layout.output_dir, err))?;
        }
        fs::create_dir_all(&layout.output_dir).map_err(|err| BuildError::io(&layout.output_dir, err))
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        Ok(())
    }

    /// Build one variant. `language` is `None` for an unlocalized site.
    fn build_variant(
        &self,
        config: &Config,
        layout: &Layout,
        language: Option<&str>,
        items: &[ContentItem],
        renderer: &dyn RenderGateway,
        template_hash: &str,
    ) -> Result<(VariantReport, Vec<SiteEntry>)> {
        let output_dir = match language {
            Some(lang) => layout.output_dir.join(lang),
            None => layout.output_dir.clone(),
        };
        fs::create_dir_all(&output_dir).map_err(|err| BuildError::io(&output_dir, err))?;

        let mut ctx = BuildContext::new(
            config.clone(),
            language.map(str::to_string),
            self.root.clone(),
            output_dir.clone(),
        )
        .with_cancel_token(self.cancel.clone());

        info!(
            language = ctx.language_label(),
            base_url = %ctx.base_url,
            output = %output_dir.display(),
            "building variant"
        );

        assets::copy_dir(&layout.static_dir, &output_dir)?;

        // Select, partition and route.
        let default_language = ctx.default_language.clone();
        let mut diagnostics = PathDiagnostics::new();
        let mut claimed: HashSet<String> =
            LIST_OUTPUT_PATHS.iter().map(|path| path.to_string()).collect();

        for item in items {
            self.check_cancelled()?;
            if !in_variant(item, language, default_language.as_deref()) {
                continue;
            }
            if item.is_data() {
                ctx.data_items.push(item.clone());
                continue;
            }

            let route = resolve(item, config.build.output_path_encoding);
            if !claim(&mut claimed, &route) {
                continue;
            }
            diagnostics.check(&route.output_path);
            ctx.items.push(RoutedItem::natural(item.clone(), route));
        }

        let pipeline = PluginPipeline::new(&self.plugins, config.build.plugin_fail_mode);
        for (origin, mut page) in pipeline.derive_pages(&mut ctx)? {
            self.check_cancelled()?;
            page.route.output_path = normalize_output_path(&page.route.output_path);
            if page.route.output_path.is_empty() {
                warn!(plugin = %origin, url = %page.route.url, "derived page has no output path");
                continue;
            }
            if !claim(&mut claimed, &page.route) {
                continue;
            }
            diagnostics.check(&page.route.output_path);
            ctx.derived_routes.push(DerivedRoute {
                route: page.route.clone(),
                last_modified: page.last_modified,
            });
            ctx.derived.push(RoutedItem {
                item: page.item,
                route: page.route,
                origin: Some(origin),
            });
        }

        if diagnostics.warned_count() > 0 {
            warn!(
                language = ctx.language_label(),
                count = diagnostics.warned_count(),
                "output paths are not portable to Windows"
            );
        }

        let mut report = VariantReport {
            language: ctx.language.clone(),
            base_url: ctx.base_url.clone(),
            output_dir: output_dir.clone(),
            routed: ctx.items.len(),
            derived: ctx.derived.len(),
            ..VariantReport::default()
        };

        // Render the queue through the incremental cache.
        let mut cache = IncrementalCache::open(
            layout.cache_dir.join(manifest_file_name(language)),
            template_hash.to_string(),
            config.build.incremental,
            config.build.force,
        );
        let site = SiteView::new(config, language, &ctx.base_url);
        let data = data_by_slug(&ctx.data_items);
        let shared = shared_fingerprint(&ctx, &site)?;

        for routed in ctx.render_queue() {
            self.check_cancelled()?;

            let salt = match &routed.origin {
                Some(origin) => format!("{origin}\n{shared}"),
                None => shared.clone(),
            };
            let hash = content_hash(&routed.item, &salt);
            let output_file = output_dir.join(&routed.route.output_path);

            match cache.decide(&routed.route, &hash, &output_file) {
                Decision::Skip => {
                    report.skipped += 1;
                    debug!(url = %routed.route.url, "unchanged, skipping");
                }
                Decision::Render(reason) => {
                    let view = page_view(&ctx, &site, &data, routed);
                    let html = renderer
                        .render_page(&routed.route.template, &view)
                        .map_err(|source| BuildError::Render {
                            template: routed.route.template.clone(),
                            source,
                        })?;
                    write_file(&output_file, &html)?;

                    report.rendered += 1;
                    *report.reasons.entry(reason).or_default() += 1;
                    debug!(url = %routed.route.url, %reason, "rendered page");
                }
            }
            cache.record(&routed.route, &hash);
        }

        render_lists(&ctx, renderer, &site, &data, &output_dir)?;
        assets::copy_dir(&layout.assets_dir, &output_dir.join("assets"))?;

        pipeline.after_build(&mut ctx)?;
        self.check_cancelled()?;

        report.pruned = match cache.persist() {
            Ok(pruned) => pruned,
            Err(err) => {
                warn!(error = %err, "failed to persist manifest, next build renders in full");
                0
            }
        };
        report.plugins = std::mem::take(&mut ctx.plugin_records);

        info!(
            language = ctx.language_label(),
            rendered = report.rendered,
            skipped = report.skipped,
            pruned = report.pruned,
            "variant complete"
        );

        Ok((report, collect_entries(&ctx)))
    }
}

/// Whether `item` belongs to the variant for `language`.
fn in_variant(item: &ContentItem, language: Option<&str>, default_language: Option<&str>) -> bool {
    let Some(language) = language else {
        return true;
    };

    if item.is_data() {
        return item
            .locale()
            .is_none_or(|locale| locale.eq_ignore_ascii_case(language));
    }

    match item.language() {
        Some(lang) => lang.eq_ignore_ascii_case(language),
        None => default_language == Some(language),
    }
}

/// Claim a route's output path. List views hold theirs from the start; later
/// claims on a taken path lose.
fn claim(claimed: &mut HashSet<String>, route: &Route) -> bool {
    let key = normalize_output_path(&route.output_path);
    if claimed.insert(key) {
        return true;
    }
    warn!(
        url = %route.url,
        output = %route.output_path,
        "output path already taken by a list view or earlier page, dropping page"
    );
    false
}

/// Data items keyed by slug; the first item with a slug wins.
fn data_by_slug(items: &[ContentItem]) -> BTreeMap<String, ContentItem> {
    let mut data = BTreeMap::new();
    for item in items {
        data.entry(item.slug.clone()).or_insert_with(|| item.clone());
    }
    data
}

/// Digest of everything besides the item itself that every page renders:
/// site info, data items and the plugin data bag.
fn shared_fingerprint(ctx: &BuildContext, site: &SiteView) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(serde_json::to_string(site)?.as_bytes());
    for item in &ctx.data_items {
        hasher.update(b"\0");
        hasher.update(content_fingerprint(item, "").as_bytes());
    }
    hasher.update(b"\0");
    hasher.update(serde_json::to_string(&ctx.data)?.as_bytes());
    Ok(hasher.finalize().to_hex().to_string())
}

fn page_view(
    ctx: &BuildContext,
    site: &SiteView,
    data: &BTreeMap<String, ContentItem>,
    routed: &RoutedItem,
) -> PageView {
    let item = &routed.item;
    PageView {
        site: site.clone(),
        title: item.title.clone(),
        url: ctx.absolute_url(&routed.route.url),
        slug: item.slug.clone(),
        date: item.publish_at,
        summary: item.summary().map(str::to_string),
        content: item.content_html.clone(),
        meta: item.meta.clone(),
        fields: item.fields.clone(),
        data: data.clone(),
        bag: ctx.data.clone(),
    }
}

/// Render the home, blog and pages lists from the naturally routed items.
fn render_lists(
    ctx: &BuildContext,
    renderer: &dyn RenderGateway,
    site: &SiteView,
    data: &BTreeMap<String, ContentItem>,
    output_dir: &Path,
) -> Result<()> {
    let mut natural: Vec<&RoutedItem> = ctx.items.iter().collect();
    natural.sort_by(|a, b| b.item.publish_at.cmp(&a.item.publish_at));

    for kind in ListKind::ALL {
        let items = natural
            .iter()
            .filter(|routed| kind.includes(&routed.item))
            .map(|routed| ListItemView {
                title: routed.item.title.clone(),
                url: ctx.absolute_url(&routed.route.url),
                date: routed.item.publish_at,
                summary: routed.item.summary().map(str::to_string),
            })
            .collect();

        let title = match kind {
            ListKind::Home => site.title.clone(),
            ListKind::Blog => "Blog".to_string(),
            ListKind::Pages => "Pages".to_string(),
        };
        let view = ListView {
            site: site.clone(),
            title,
            url: ctx.absolute_url(kind.url()),
            items,
            data: data.clone(),
            bag: ctx.data.clone(),
        };

        let html = renderer
            .render_list(kind.template(), &view)
            .map_err(|source| BuildError::Render {
                template: kind.template().to_string(),
                source,
            })?;
        write_file(&output_dir.join(kind.output_path()), &html)?;
    }

    debug!(language = ctx.language_label(), "rendered list views");
    Ok(())
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| BuildError::io(parent, err))?;
    }
    fs::write(path, content).map_err(|err| BuildError::io(path, err))
}
