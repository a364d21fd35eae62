//! Render gateway and the built-in template renderer.
//!
//! Provides a lightweight template system using string interpolation rather than
//! heavy template engines like Tera or Handlebars. A template whose first line is
//! `<!-- layout: layouts/base.html -->` renders inside that layout, exposed to it
//! as `{{ content }}`. Layouts may themselves declare layouts.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
};

use chrono::{DateTime, SecondsFormat, Utc};
use folio_core::{Config, ContentItem, ValueMap};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Template rendering errors.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Missing required variable.
    #[error("missing required variable '{variable}' in template {template}")]
    MissingVariable { template: String, variable: String },

    /// Template not found.
    #[error("template not found: {0}")]
    NotFound(String),

    /// Invalid template syntax.
    #[error("invalid template syntax in {template}: {message}")]
    InvalidSyntax { template: String, message: String },

    /// A layout chain loops back on itself.
    #[error("layout cycle through template {0}")]
    LayoutCycle(String),

    /// IO error while loading templates.
    #[error("failed to read template {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Template directory walk error.
    #[error("failed to walk template directory: {0}")]
    Walk(#[from] walkdir::Error),
}

impl RenderError {
    /// Identifier of the template involved, when known.
    #[must_use]
    pub fn template(&self) -> Option<&str> {
        match self {
            Self::MissingVariable { template, .. } | Self::InvalidSyntax { template, .. } => {
                Some(template)
            }
            Self::NotFound(template) | Self::LayoutCycle(template) => Some(template),
            Self::Io { path, .. } => Some(path),
            Self::Walk(_) => None,
        }
    }
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, RenderError>;

/// Home list template id.
pub const HOME_TEMPLATE: &str = "lists/home.html";

/// Blog index template id.
pub const BLOG_TEMPLATE: &str = "lists/blog.html";

/// Pages index template id.
pub const PAGES_TEMPLATE: &str = "lists/pages.html";

/// Site information shared by every view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteView {
    pub title: String,
    pub base_url: String,
    pub root_base_url: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub language: Option<String>,
    pub default_language: Option<String>,
    pub languages: Vec<String>,
}

impl SiteView {
    #[must_use]
    pub fn new(config: &Config, language: Option<&str>, base_url: &str) -> Self {
        Self {
            title: config.site.title.clone(),
            base_url: base_url.to_string(),
            root_base_url: config.site.base_url.trim_end_matches('/').to_string(),
            description: config.site.description.clone(),
            author: config.site.author.clone(),
            language: language.map(str::to_string),
            default_language: config.default_language().map(str::to_string),
            languages: config.site.languages.clone(),
        }
    }
}

/// View model for one page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    pub site: SiteView,
    pub title: String,
    /// Absolute URL.
    pub url: String,
    pub slug: String,
    pub date: DateTime<Utc>,
    pub summary: Option<String>,
    pub content: String,
    pub meta: ValueMap,
    pub fields: Option<ValueMap>,
    /// Data-mode items keyed by slug.
    pub data: BTreeMap<String, ContentItem>,
    /// Plugin data bag.
    pub bag: BTreeMap<String, serde_json::Value>,
}

/// One entry in a list view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItemView {
    pub title: String,
    pub url: String,
    pub date: DateTime<Utc>,
    pub summary: Option<String>,
}

/// View model for the home, blog and pages lists.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListView {
    pub site: SiteView,
    pub title: String,
    pub url: String,
    pub items: Vec<ListItemView>,
    pub data: BTreeMap<String, ContentItem>,
    pub bag: BTreeMap<String, serde_json::Value>,
}

/// Turns view models into HTML.
pub trait RenderGateway: Send + Sync {
    fn render_page(&self, template: &str, page: &PageView) -> Result<String>;

    fn render_list(&self, template: &str, list: &ListView) -> Result<String>;
}

/// Template context with variables for interpolation.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    variables: HashMap<String, String>,
}

impl TemplateContext {
    /// Create a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a variable into the context.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Insert a variable if a value is present.
    pub fn insert_opt(&mut self, key: impl Into<String>, value: Option<impl Into<String>>) {
        if let Some(value) = value {
            self.insert(key, value);
        }
    }

    /// Create context with initial variables.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Get a variable value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }
}

/// A template with `{{ variable }}` and optional `{{ variable? }}` placeholders.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    layout: Option<String>,
    content: String,
}

const LAYOUT_PREFIX: &str = "<!-- layout:";

impl Template {
    /// Create a template, reading an optional layout declaration from the first line.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let (first, rest) = content.split_once('\n').unwrap_or((content.as_str(), ""));
        let (layout, content) = match parse_layout(first) {
            Some(layout) => (Some(layout), rest.to_string()),
            None => (None, content.clone()),
        };

        Self {
            name: name.into(),
            layout,
            content,
        }
    }

    /// Get the template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Layout this template renders inside, if any.
    #[must_use]
    pub fn layout(&self) -> Option<&str> {
        self.layout.as_deref()
    }

    /// Render the template with the given context.
    pub fn render(&self, context: &TemplateContext) -> Result<String> {
        let mut result = self.content.clone();
        let mut pos = 0;

        while let Some(start) = result[pos..].find("{{") {
            let start = pos + start;
            let end = result[start..]
                .find("}}")
                .ok_or_else(|| RenderError::InvalidSyntax {
                    template: self.name.clone(),
                    message: "unclosed {{ delimiter".to_string(),
                })?;
            let end = start + end + 2;

            let var_name = result[start + 2..end - 2].trim();

            let (var_name, optional) = match var_name.strip_suffix('?') {
                Some(stripped) => (stripped.trim(), true),
                None => (var_name, false),
            };

            let value = match context.get(var_name) {
                Some(v) => v.to_string(),
                None if optional => String::new(),
                None => {
                    return Err(RenderError::MissingVariable {
                        template: self.name.clone(),
                        variable: var_name.to_string(),
                    });
                }
            };

            result.replace_range(start..end, &value);
            pos = start + value.len();
        }

        Ok(result)
    }
}

fn parse_layout(line: &str) -> Option<String> {
    let inner = line
        .trim()
        .strip_prefix(LAYOUT_PREFIX)?
        .strip_suffix("-->")?
        .trim();
    (!inner.is_empty()).then(|| inner.to_string())
}

/// Registry of templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Template>,
}

impl TemplateRegistry {
    /// Create a new registry with default templates.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.register_defaults();
        registry
    }

    /// Register default built-in templates.
    fn register_defaults(&mut self) {
        self.register(Template::new("layouts/base.html", DEFAULT_BASE_TEMPLATE));
        self.register(Template::new("pages/page.html", DEFAULT_PAGE_TEMPLATE));
        self.register(Template::new("pages/post.html", DEFAULT_POST_TEMPLATE));
        self.register(Template::new(HOME_TEMPLATE, DEFAULT_HOME_TEMPLATE));
        self.register(Template::new(BLOG_TEMPLATE, DEFAULT_LIST_TEMPLATE));
        self.register(Template::new(PAGES_TEMPLATE, DEFAULT_LIST_TEMPLATE));
    }

    /// Register a template.
    pub fn register(&mut self, template: Template) {
        self.templates.insert(template.name.clone(), template);
    }

    /// Get a template by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Render a named template, following its layout chain.
    pub fn render(&self, name: &str, context: &TemplateContext) -> Result<String> {
        let mut visited: Vec<String> = Vec::new();
        let mut context = context.clone();
        let mut name = name.to_string();

        loop {
            if visited.contains(&name) {
                return Err(RenderError::LayoutCycle(name));
            }
            let template = self
                .get(&name)
                .ok_or_else(|| RenderError::NotFound(name.clone()))?;
            let output = template.render(&context)?;

            match template.layout() {
                Some(layout) => {
                    context.insert("content", output);
                    visited.push(std::mem::replace(&mut name, layout.to_string()));
                }
                None => return Ok(output),
            }
        }
    }
}

/// Default [`RenderGateway`]: theme templates over built-in fallbacks.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    registry: TemplateRegistry,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateRenderer {
    /// Renderer using only the built-in templates.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            registry: TemplateRegistry::new(),
        }
    }

    /// Load every file under `dir` as a template keyed by its relative path.
    ///
    /// Files override built-ins with the same id. A missing directory yields the built-ins.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut registry = TemplateRegistry::new();
        if !dir.exists() {
            debug!(dir = %dir.display(), "template directory missing, using built-ins");
            return Ok(Self { registry });
        }

        let mut count = 0;
        for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry
                .path()
                .strip_prefix(dir)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            let content = fs::read_to_string(entry.path()).map_err(|source| RenderError::Io {
                path: name.clone(),
                source,
            })?;
            registry.register(Template::new(name, content));
            count += 1;
        }

        info!(dir = %dir.display(), count, "loaded templates");
        Ok(Self { registry })
    }

    #[must_use]
    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }
}

impl RenderGateway for TemplateRenderer {
    fn render_page(&self, template: &str, page: &PageView) -> Result<String> {
        let mut ctx = site_context(&page.site, &page.data, &page.bag);

        ctx.insert("title", escape_html(&page.title));
        ctx.insert("content", page.content.clone());
        ctx.insert("page.title", escape_html(&page.title));
        ctx.insert("page.url", page.url.clone());
        ctx.insert("page.slug", page.slug.clone());
        ctx.insert("page.date", page.date.format("%Y-%m-%d").to_string());
        ctx.insert(
            "page.date_iso",
            page.date.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        ctx.insert_opt("page.summary", page.summary.as_deref().map(escape_html));
        ctx.insert("canonical_url", page.url.clone());

        for (key, value) in page.meta.iter() {
            ctx.insert(format!("meta.{key}"), escape_html(&value.display()));
        }
        if let Some(fields) = &page.fields {
            for (key, value) in fields.iter() {
                ctx.insert(format!("fields.{key}"), escape_html(&value.display()));
            }
        }

        self.registry.render(template, &ctx)
    }

    fn render_list(&self, template: &str, list: &ListView) -> Result<String> {
        let mut ctx = site_context(&list.site, &list.data, &list.bag);

        let mut items = String::new();
        for item in &list.items {
            items.push_str(&format!(
                "<li><a href=\"{}\">{}</a> <time datetime=\"{}\">{}</time></li>\n",
                escape_html(&item.url),
                escape_html(&item.title),
                item.date.to_rfc3339_opts(SecondsFormat::Secs, true),
                item.date.format("%Y-%m-%d"),
            ));
        }

        ctx.insert("title", escape_html(&list.title));
        ctx.insert("canonical_url", list.url.clone());
        ctx.insert("items", items);
        ctx.insert("count", list.items.len().to_string());

        self.registry.render(template, &ctx)
    }
}

/// Variables shared by page and list views.
fn site_context(
    site: &SiteView,
    data: &BTreeMap<String, ContentItem>,
    bag: &BTreeMap<String, serde_json::Value>,
) -> TemplateContext {
    let mut ctx = TemplateContext::new();

    ctx.insert("site.title", escape_html(&site.title));
    ctx.insert("site.base_url", site.base_url.clone());
    ctx.insert("site.root_base_url", site.root_base_url.clone());
    ctx.insert_opt("site.description", site.description.as_deref().map(escape_html));
    ctx.insert_opt("site.author", site.author.as_deref().map(escape_html));
    ctx.insert_opt("site.language", site.language.clone());
    ctx.insert(
        "lang",
        site.language
            .clone()
            .or_else(|| site.default_language.clone())
            .unwrap_or_else(|| "en".to_string()),
    );

    for (slug, item) in data {
        ctx.insert(format!("data.{slug}.title"), escape_html(&item.title));
        ctx.insert(format!("data.{slug}.content"), item.content_html.clone());
        for (key, value) in item.fields.iter().flat_map(ValueMap::iter) {
            ctx.insert(format!("data.{slug}.{key}"), escape_html(&value.display()));
        }
    }

    for (key, value) in bag {
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        ctx.insert(format!("bag.{key}"), text);
    }

    ctx
}

/// Escape HTML special characters in text values.
#[must_use]
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Default base HTML layout.
pub const DEFAULT_BASE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="{{ lang }}">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{{ title }} | {{ site.title }}</title>
    <meta name="description" content="{{ page.summary? }}">
    <meta name="author" content="{{ site.author? }}">
    <link rel="canonical" href="{{ canonical_url }}">
</head>
<body>
    <header>
        <nav>
            <a href="{{ site.base_url }}/" class="site-title">{{ site.title }}</a>
            <a href="{{ site.base_url }}/blog/">Blog</a>
            <a href="{{ site.base_url }}/pages/">Pages</a>
        </nav>
    </header>
    <main>
        {{ content }}
    </main>
    <footer>
        <p>{{ site.title }}</p>
    </footer>
</body>
</html>
"#;

/// Default page template (for standalone pages).
pub const DEFAULT_PAGE_TEMPLATE: &str = r#"<!-- layout: layouts/base.html -->
<article class="page">
    <h1>{{ page.title }}</h1>
    <div class="content">
        {{ content }}
    </div>
</article>"#;

/// Default post template (for blog posts with metadata).
pub const DEFAULT_POST_TEMPLATE: &str = r#"<!-- layout: layouts/base.html -->
<article class="post">
    <header>
        <h1>{{ page.title }}</h1>
        <time datetime="{{ page.date_iso }}">{{ page.date }}</time>
    </header>
    <div class="content">
        {{ content }}
    </div>
</article>"#;

/// Default home template.
pub const DEFAULT_HOME_TEMPLATE: &str = r#"<!-- layout: layouts/base.html -->
<section class="home">
    <h1>{{ site.title }}</h1>
    <p>{{ site.description? }}</p>
    <ul class="post-list">
        {{ items }}
    </ul>
</section>"#;

/// Default list template (for the blog and pages indexes).
pub const DEFAULT_LIST_TEMPLATE: &str = r#"<!-- layout: layouts/base.html -->
<section class="post-list">
    <h1>{{ title }}</h1>
    <ul>
        {{ items }}
    </ul>
</section>"#;
