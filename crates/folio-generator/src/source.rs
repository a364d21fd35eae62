//! Content gateways.
//!
//! A gateway produces the full, deterministically ordered content set for a
//! build. The orchestrator calls it once per build and treats any error as fatal.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use folio_core::{
    Config, ContentItem, CoreError, SourceMode,
    frontmatter::parse_frontmatter,
};
use pulldown_cmark::{Options, Parser, html};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{cancel::CancelToken, route::slugify};

/// Directory (relative to the content root) whose files are data items.
pub const DATA_DIR: &str = "_data";

/// Content gateway errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// IO error.
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Frontmatter parse error.
    #[error(transparent)]
    Frontmatter(#[from] CoreError),

    /// Directory walk error.
    #[error("failed to walk content directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// Provider-specific failure.
    #[error("content gateway '{gateway}' failed: {message}")]
    Source { gateway: String, message: String },

    /// Cancellation was requested while loading.
    #[error("content loading cancelled")]
    Cancelled,
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Source of content items.
pub trait ContentGateway: Send + Sync {
    fn name(&self) -> &str;

    /// Load every content item, in a deterministic order.
    fn load(&self, cancel: &CancelToken) -> Result<Vec<ContentItem>>;
}

/// In-memory gateway.
#[derive(Debug, Clone, Default)]
pub struct StaticGateway {
    items: Vec<ContentItem>,
}

impl StaticGateway {
    #[must_use]
    pub fn new(items: Vec<ContentItem>) -> Self {
        Self { items }
    }
}

impl ContentGateway for StaticGateway {
    fn name(&self) -> &str {
        "static"
    }

    fn load(&self, cancel: &CancelToken) -> Result<Vec<ContentItem>> {
        if cancel.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }
        Ok(self.items.clone())
    }
}

/// Concatenates several gateways in order.
#[derive(Default)]
pub struct CompositeGateway {
    gateways: Vec<Box<dyn ContentGateway>>,
}

impl CompositeGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, gateway: impl ContentGateway + 'static) -> Self {
        self.gateways.push(Box::new(gateway));
        self
    }
}

impl std::fmt::Debug for CompositeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.gateways.iter().map(|g| g.name()))
            .finish()
    }
}

impl ContentGateway for CompositeGateway {
    fn name(&self) -> &str {
        "composite"
    }

    fn load(&self, cancel: &CancelToken) -> Result<Vec<ContentItem>> {
        let mut items = Vec::new();
        for gateway in &self.gateways {
            if cancel.is_cancelled() {
                return Err(GatewayError::Cancelled);
            }
            let loaded = gateway.load(cancel)?;
            debug!(gateway = gateway.name(), count = loaded.len(), "loaded content");
            items.extend(loaded);
        }
        Ok(items)
    }
}

/// Reads Markdown files with YAML or TOML front matter.
#[derive(Debug, Clone)]
pub struct MarkdownGateway {
    content_dir: PathBuf,
    include_drafts: bool,
}

impl MarkdownGateway {
    #[must_use]
    pub fn new(content_dir: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
            include_drafts: false,
        }
    }

    /// Gateway over the configured content directory under `root`.
    #[must_use]
    pub fn from_config(config: &Config, root: &Path) -> Self {
        Self::new(root.join(&config.build.content_dir)).with_drafts(config.build.drafts)
    }

    #[must_use]
    pub fn with_drafts(mut self, include_drafts: bool) -> Self {
        self.include_drafts = include_drafts;
        self
    }

    /// Find Markdown files, sorted by path. Hidden entries are skipped.
    fn find_files(&self) -> Result<Vec<PathBuf>> {
        let walker = WalkDir::new(&self.content_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry?;
            let is_markdown = entry
                .path()
                .extension()
                .is_some_and(|ext| ext == "md" || ext == "markdown");
            if entry.file_type().is_file() && is_markdown {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn parse_file(&self, path: &Path) -> Result<Option<ContentItem>> {
        let io_err = |source| GatewayError::Io {
            path: path.to_path_buf(),
            source,
        };
        let raw = fs::read_to_string(path).map_err(io_err)?;
        let (fm, body) = parse_frontmatter(&raw, path)?;

        if fm.draft && !self.include_drafts {
            debug!(path = %path.display(), "skipping draft");
            return Ok(None);
        }

        let relative = path
            .strip_prefix(&self.content_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let slug_source = if stem == "index" {
            path.parent()
                .and_then(Path::file_name)
                .map_or(stem.clone(), |s| s.to_string_lossy().to_string())
        } else {
            stem.clone()
        };

        let publish_at = match fm.date {
            Some(date) => date,
            None => {
                let modified = fs::metadata(path).and_then(|m| m.modified()).map_err(io_err)?;
                DateTime::<Utc>::from(modified)
            }
        };

        let mode = fm.mode.unwrap_or(if relative.starts_with(&format!("{DATA_DIR}/")) {
            SourceMode::Data
        } else {
            SourceMode::Content
        });

        let title = if fm.title.trim().is_empty() {
            stem
        } else {
            fm.title.clone()
        };

        let mut item = ContentItem::new(
            fm.id.clone().unwrap_or_else(|| relative.clone()),
            title,
            fm.slug.clone().unwrap_or_else(|| slugify(&slug_source)),
            publish_at,
        )
        .with_html(markdown_to_html(&body))
        .with_mode(mode);
        item.meta = fm.meta();
        item.fields = fm.typed_fields();

        Ok(Some(item))
    }
}

impl ContentGateway for MarkdownGateway {
    fn name(&self) -> &str {
        "markdown"
    }

    fn load(&self, cancel: &CancelToken) -> Result<Vec<ContentItem>> {
        if !self.content_dir.exists() {
            warn!(dir = %self.content_dir.display(), "content directory does not exist");
            return Ok(Vec::new());
        }

        info!(dir = %self.content_dir.display(), "collecting content");
        let files = self.find_files()?;

        let parsed: Vec<Option<ContentItem>> = files
            .par_iter()
            .map(|path| {
                if cancel.is_cancelled() {
                    return Err(GatewayError::Cancelled);
                }
                self.parse_file(path)
            })
            .collect::<Result<_>>()?;

        let items: Vec<_> = parsed.into_iter().flatten().collect();
        info!(files = files.len(), items = items.len(), "content collected");
        Ok(items)
    }
}

/// Render Markdown to HTML.
#[must_use]
pub fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS;
    let parser = Parser::new_ext(markdown, options);

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}
