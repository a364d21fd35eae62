//! Per-variant build state shared with plugins and the render layer.

use std::{collections::BTreeMap, path::PathBuf};

use chrono::{DateTime, Utc};
use folio_core::{Config, ContentItem};
use serde::{Deserialize, Serialize};

use crate::{cancel::CancelToken, route::Route};

/// A content item paired with its resolved route.
#[derive(Debug, Clone)]
pub struct RoutedItem {
    pub item: ContentItem,
    pub route: Route,
    /// `name@version` of the plugin that synthesised the page, if any.
    pub origin: Option<String>,
}

impl RoutedItem {
    /// A naturally routed item.
    #[must_use]
    pub fn natural(item: ContentItem, route: Route) -> Self {
        Self {
            item,
            route,
            origin: None,
        }
    }

    #[must_use]
    pub fn is_derived(&self) -> bool {
        self.origin.is_some()
    }
}

/// A page synthesised by a plugin during the derive phase.
#[derive(Debug, Clone)]
pub struct DerivedPage {
    pub item: ContentItem,
    pub route: Route,
    pub last_modified: DateTime<Utc>,
}

impl DerivedPage {
    #[must_use]
    pub fn new(item: ContentItem, route: Route, last_modified: DateTime<Utc>) -> Self {
        Self {
            item,
            route,
            last_modified,
        }
    }
}

/// Route metadata of a derived page, kept for sitemap-style artifacts.
#[derive(Debug, Clone)]
pub struct DerivedRoute {
    pub route: Route,
    pub last_modified: DateTime<Utc>,
}

/// Plugin hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PluginHook {
    DerivePages,
    AfterBuild,
}

impl std::fmt::Display for PluginHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::DerivePages => "derivePages",
            Self::AfterBuild => "afterBuild",
        })
    }
}

/// One plugin invocation on one hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginExecution {
    pub plugin_name: String,
    pub hook: PluginHook,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Mutable state threaded through one variant's build.
#[derive(Debug)]
pub struct BuildContext {
    /// Resolved configuration, overrides applied.
    pub config: Config,

    /// Variant language; `None` for an unlocalized build.
    pub language: Option<String>,

    /// Site default language, if languages are configured.
    pub default_language: Option<String>,

    /// Project root.
    pub root_dir: PathBuf,

    /// Variant output directory.
    pub output_dir: PathBuf,

    /// Site base URL without the language segment.
    pub root_base_url: String,

    /// Variant base URL.
    pub base_url: String,

    /// Naturally routed content items.
    pub items: Vec<RoutedItem>,

    /// Data-mode items handed to the render layer.
    pub data_items: Vec<ContentItem>,

    /// Plugin-derived pages.
    pub derived: Vec<RoutedItem>,

    /// Last-modified timestamps of derived pages.
    pub derived_routes: Vec<DerivedRoute>,

    /// Plugin execution records, in invocation order.
    pub plugin_records: Vec<PluginExecution>,

    /// Open data bag plugins use to pass structures to the render layer.
    pub data: BTreeMap<String, serde_json::Value>,

    pub cancel: CancelToken,
}

impl BuildContext {
    /// Create an empty context for one variant.
    #[must_use]
    pub fn new(
        config: Config,
        language: Option<String>,
        root_dir: PathBuf,
        output_dir: PathBuf,
    ) -> Self {
        let root_base_url = config.site.base_url.trim_end_matches('/').to_string();
        let base_url = match &language {
            Some(lang) => format!("{root_base_url}/{lang}"),
            None => root_base_url.clone(),
        };
        let default_language = config.default_language().map(str::to_string);

        Self {
            config,
            language,
            default_language,
            root_dir,
            output_dir,
            root_base_url,
            base_url,
            items: Vec::new(),
            data_items: Vec::new(),
            derived: Vec::new(),
            derived_routes: Vec::new(),
            plugin_records: Vec::new(),
            data: BTreeMap::new(),
            cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Language name used in logs and errors.
    #[must_use]
    pub fn language_label(&self) -> &str {
        self.language.as_deref().unwrap_or("default")
    }

    /// Absolute URL for a route URL within this variant.
    #[must_use]
    pub fn absolute_url(&self, url: &str) -> String {
        format!("{}/{}", self.base_url, url.trim_start_matches('/'))
    }

    /// Natural items followed by derived pages.
    pub fn render_queue(&self) -> impl Iterator<Item = &RoutedItem> {
        self.items.iter().chain(self.derived.iter())
    }

    /// Last-modified time of a derived page, by URL.
    #[must_use]
    pub fn derived_last_modified(&self, url: &str) -> Option<DateTime<Utc>> {
        self.derived_routes
            .iter()
            .find(|d| d.route.url == url)
            .map(|d| d.last_modified)
    }
}
