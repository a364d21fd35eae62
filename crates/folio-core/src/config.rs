//! Site configuration management.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Main configuration structure for Folio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Site-wide settings.
    pub site: SiteConfig,

    /// Build settings.
    #[serde(default)]
    pub build: BuildConfig,

    /// Per-plugin enable switches, keyed by plugin name.
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginToggle>,

    /// How variant-spanning artifacts are reconciled.
    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    /// Feed settings.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Search index settings.
    #[serde(default)]
    pub search: SearchConfig,
}

/// Site-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site title.
    pub title: String,

    /// Base URL for the site (e.g., "https://example.com").
    pub base_url: String,

    /// Site description for meta tags and feeds.
    #[serde(default)]
    pub description: Option<String>,

    /// Site author name.
    #[serde(default)]
    pub author: Option<String>,

    /// Language variants to build. Empty means a single, unlocalized build.
    #[serde(default)]
    pub languages: Vec<String>,

    /// Default language; falls back to the first configured language.
    #[serde(default)]
    pub default_language: Option<String>,
}

/// Build configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Content directory read by the Markdown gateway.
    #[serde(default = "default_content_dir")]
    pub content_dir: String,

    /// Output directory for the generated site.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Theme directory holding `templates/`, `static/` and `assets/`.
    #[serde(default = "default_theme_dir")]
    pub theme_dir: String,

    /// Directory for incremental build manifests.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Whether unchanged pages may be skipped.
    #[serde(default = "default_true")]
    pub incremental: bool,

    /// Delete the output directory before building.
    #[serde(default)]
    pub clean: bool,

    /// Render every page but still refresh the manifest.
    #[serde(default)]
    pub force: bool,

    /// Whether to include draft content.
    #[serde(default)]
    pub drafts: bool,

    /// Per-segment encoding applied to output paths.
    #[serde(default)]
    pub output_path_encoding: OutputPathEncoding,

    /// What to do when a plugin hook fails.
    #[serde(default)]
    pub plugin_fail_mode: PluginFailMode,

    /// Where to write the JSON build metrics report, if anywhere.
    #[serde(default)]
    pub metrics_path: Option<String>,
}

/// Output path encoding policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputPathEncoding {
    /// Leave paths unchanged.
    #[default]
    None,
    /// Percent-encode each segment.
    UrlEncode,
    /// ASCII-slugify each segment's base name.
    Slug,
    /// Strip characters that are unsafe on common file systems.
    Sanitize,
}

/// Plugin failure policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginFailMode {
    /// A failing hook aborts the build.
    Strict,
    /// A failing hook is logged and the build continues.
    #[default]
    Warn,
}

/// Reconciliation policy for a variant-spanning artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactMode {
    /// Each variant keeps its own artifact.
    #[default]
    Split,
    /// One root artifact aggregating every variant.
    Merged,
    /// One root artifact referencing each variant's artifact.
    Index,
}

/// Plugin enable switch: either a bare boolean or `{ enabled = bool }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PluginToggle {
    Flag(bool),
    Table {
        #[serde(default = "default_true")]
        enabled: bool,
    },
}

impl PluginToggle {
    #[must_use]
    pub fn enabled(&self) -> bool {
        match self {
            Self::Flag(enabled) | Self::Table { enabled } => *enabled,
        }
    }
}

/// Per-artifact reconciliation modes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default)]
    pub sitemap: ArtifactMode,

    #[serde(default)]
    pub feed: ArtifactMode,

    #[serde(default)]
    pub search: ArtifactMode,
}

/// Feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Maximum number of items in a feed.
    #[serde(default = "default_feed_limit")]
    pub limit: usize,
}

/// Search index configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Whether plugin-derived pages are indexed.
    #[serde(default)]
    pub include_derived: bool,
}

fn default_content_dir() -> String {
    "content".to_string()
}

fn default_output_dir() -> String {
    "public".to_string()
}

fn default_theme_dir() -> String {
    "theme".to_string()
}

fn default_cache_dir() -> String {
    ".folio-cache".to_string()
}

fn default_true() -> bool {
    true
}

fn default_feed_limit() -> usize {
    20
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
            output_dir: default_output_dir(),
            theme_dir: default_theme_dir(),
            cache_dir: default_cache_dir(),
            incremental: true,
            clean: false,
            force: false,
            drafts: false,
            output_path_encoding: OutputPathEncoding::default(),
            plugin_fail_mode: PluginFailMode::default(),
            metrics_path: None,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            limit: default_feed_limit(),
        }
    }
}

macro_rules! impl_keyword {
    ($ty:ty { $($name:literal => $variant:expr),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($name => Ok($variant),)+
                    other => Err(CoreError::UnknownKeyword {
                        kind: stringify!($ty),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let name = match self {
                    $(v if *v == $variant => $name,)+
                    _ => unreachable!(),
                };
                f.write_str(name)
            }
        }
    };
}

impl_keyword!(OutputPathEncoding {
    "none" => OutputPathEncoding::None,
    "urlencode" => OutputPathEncoding::UrlEncode,
    "slug" => OutputPathEncoding::Slug,
    "sanitize" => OutputPathEncoding::Sanitize,
});

impl_keyword!(PluginFailMode {
    "strict" => PluginFailMode::Strict,
    "warn" => PluginFailMode::Warn,
});

impl_keyword!(ArtifactMode {
    "split" => ArtifactMode::Split,
    "merged" => ArtifactMode::Merged,
    "index" => ArtifactMode::Index,
});

/// Command-line overrides layered onto a loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct BuildOverrides {
    pub output_dir: Option<PathBuf>,
    pub base_url: Option<String>,
    pub clean: Option<bool>,
    pub incremental: Option<bool>,
    pub force: Option<bool>,
    pub drafts: Option<bool>,
    pub plugin_fail_mode: Option<PluginFailMode>,
    pub metrics_path: Option<PathBuf>,
}

impl BuildOverrides {
    /// Apply every set override onto `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(output) = &self.output_dir {
            config.build.output_dir = output.to_string_lossy().to_string();
        }
        if let Some(base_url) = &self.base_url {
            tracing::info!(base_url = %base_url, "overriding site base_url");
            config.site.base_url = base_url.clone();
        }
        if let Some(clean) = self.clean {
            config.build.clean = clean;
        }
        if let Some(incremental) = self.incremental {
            config.build.incremental = incremental;
        }
        if let Some(force) = self.force {
            config.build.force = force;
        }
        if let Some(drafts) = self.drafts {
            config.build.drafts = drafts;
        }
        if let Some(mode) = self.plugin_fail_mode {
            config.build.plugin_fail_mode = mode;
        }
        if let Some(metrics) = &self.metrics_path {
            config.build.metrics_path = Some(metrics.to_string_lossy().to_string());
        }
    }
}

impl Config {
    /// Minimal configuration with default settings for everything but the site identity.
    pub fn new(title: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            site: SiteConfig {
                title: title.into(),
                base_url: base_url.into(),
                description: None,
                author: None,
                languages: Vec::new(),
                default_language: None,
            },
            build: BuildConfig::default(),
            plugins: BTreeMap::new(),
            artifacts: ArtifactsConfig::default(),
            feed: FeedConfig::default(),
            search: SearchConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|source| CoreError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config =
            toml::from_str(&content).map_err(|source| CoreError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `FOLIO__SECTION__KEY` environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("FOLIO").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.site.title.trim().is_empty() {
            return Err(CoreError::invalid("site.title", "cannot be empty"));
        }

        if self.site.base_url.trim().is_empty() {
            return Err(CoreError::invalid("site.base_url", "cannot be empty"));
        }

        if self.site.base_url.ends_with('/') {
            tracing::warn!("site.base_url should not have a trailing slash");
        }

        for lang in &self.site.languages {
            let tag = lang.trim();
            if tag.is_empty() || tag == "." || tag == ".." || tag.contains(['/', '\\']) {
                return Err(CoreError::invalid(
                    "site.languages",
                    format!("'{lang}' is not a usable language tag"),
                ));
            }
        }

        if let Some(default) = &self.site.default_language
            && !self.site.languages.is_empty()
            && !self.site.languages.contains(default)
        {
            return Err(CoreError::invalid(
                "site.default_language",
                format!("'{default}' is not listed in site.languages"),
            ));
        }

        if self.build.output_dir.trim().is_empty() {
            return Err(CoreError::invalid("build.output_dir", "cannot be empty"));
        }

        Ok(())
    }

    /// Default language: explicit, else the first configured language.
    #[must_use]
    pub fn default_language(&self) -> Option<&str> {
        self.site
            .default_language
            .as_deref()
            .or_else(|| self.site.languages.first().map(String::as_str))
    }

    /// Whether the named plugin is enabled. Absent names default to enabled.
    #[must_use]
    pub fn plugin_enabled(&self, name: &str) -> bool {
        self.plugins.get(name).is_none_or(PluginToggle::enabled)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn create_test_config() -> String {
        r#"
[site]
title = "Test Site"
base_url = "https://example.com"
languages = ["en", "zh"]
default_language = "en"

[build]
output_dir = "dist"
incremental = false
output_path_encoding = "sanitize"
plugin_fail_mode = "strict"
metrics_path = "build-metrics.json"

[plugins]
taxonomy = false
search = { enabled = false }
sitemap = { enabled = true }

[artifacts]
sitemap = "merged"
feed = "index"

[feed]
limit = 15
"#
        .to_string()
    }

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("folio.toml");
        let mut file = std::fs::File::create(&config_path).expect("create file");
        file.write_all(create_test_config().as_bytes())
            .expect("write");

        let config = Config::load(&config_path).expect("load config");

        assert_eq!(config.site.title, "Test Site");
        assert_eq!(config.site.languages, vec!["en", "zh"]);
        assert_eq!(config.default_language(), Some("en"));
        assert_eq!(config.build.output_dir, "dist");
        assert!(!config.build.incremental);
        assert_eq!(
            config.build.output_path_encoding,
            OutputPathEncoding::Sanitize
        );
        assert_eq!(config.build.plugin_fail_mode, PluginFailMode::Strict);
        assert_eq!(config.artifacts.sitemap, ArtifactMode::Merged);
        assert_eq!(config.artifacts.feed, ArtifactMode::Index);
        assert_eq!(config.artifacts.search, ArtifactMode::Split);
        assert_eq!(config.feed.limit, 15);

        assert!(!config.plugin_enabled("taxonomy"));
        assert!(!config.plugin_enabled("search"));
        assert!(config.plugin_enabled("sitemap"));
        assert!(config.plugin_enabled("unknown"));
    }

    #[test]
    fn test_config_defaults() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config_path = dir.path().join("folio.toml");
        let minimal_config = r#"
[site]
title = "Minimal Site"
base_url = "https://example.com"
"#;
        std::fs::write(&config_path, minimal_config).expect("write");

        let config = Config::load(&config_path).expect("load config");

        assert!(config.site.languages.is_empty());
        assert_eq!(config.default_language(), None);
        assert_eq!(config.build.output_dir, "public");
        assert_eq!(config.build.cache_dir, ".folio-cache");
        assert!(config.build.incremental);
        assert!(!config.build.clean);
        assert_eq!(config.build.plugin_fail_mode, PluginFailMode::Warn);
        assert_eq!(config.build.output_path_encoding, OutputPathEncoding::None);
        assert_eq!(config.feed.limit, 20);
    }

    #[test]
    fn test_default_language_falls_back_to_first() {
        let mut config = Config::new("Site", "https://example.com");
        config.site.languages = vec!["zh".into(), "en".into()];
        assert_eq!(config.default_language(), Some("zh"));
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = Config::new("Test", "https://example.com");
        let overrides = BuildOverrides {
            output_dir: Some(PathBuf::from("out")),
            base_url: Some("https://staging.example.com".into()),
            incremental: Some(false),
            plugin_fail_mode: Some(PluginFailMode::Strict),
            ..BuildOverrides::default()
        };

        overrides.apply(&mut config);

        assert_eq!(config.build.output_dir, "out");
        assert_eq!(config.site.base_url, "https://staging.example.com");
        assert!(!config.build.incremental);
        assert!(!config.build.clean);
        assert_eq!(config.build.plugin_fail_mode, PluginFailMode::Strict);
    }

    #[test]
    fn test_keyword_parsing() {
        assert_eq!(
            "URLENCODE".parse::<OutputPathEncoding>().unwrap(),
            OutputPathEncoding::UrlEncode
        );
        assert_eq!("warn".parse::<PluginFailMode>().unwrap(), PluginFailMode::Warn);
        assert!("loud".parse::<PluginFailMode>().is_err());
        assert_eq!(ArtifactMode::Merged.to_string(), "merged");
    }

    #[test]
    fn test_config_validation_empty_title() {
        let mut config = Config::new("", "https://example.com");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("`site.title`: cannot be empty"));

        config.site.title = "Ok".into();
        config.site.languages = vec!["en".into()];
        config.site.default_language = Some("fr".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not listed"));
    }

    #[test]
    fn test_language_tags_cannot_leave_output_dir() {
        for tag in ["..", ".", "", "en/us", "..\\zh"] {
            let mut config = Config::new("Site", "https://example.com");
            config.site.languages = vec!["en".into(), tag.into()];
            let err = config.validate().unwrap_err();
            assert!(
                matches!(err, CoreError::InvalidSetting { key: "site.languages", .. }),
                "tag {tag:?} accepted"
            );
        }
    }

    #[test]
    fn test_unknown_keyword() {
        let err = "loud".parse::<PluginFailMode>().unwrap_err();
        assert_eq!(err.to_string(), "unknown PluginFailMode 'loud'");
    }

    #[test]
    fn test_config_not_found() {
        let result = Config::load(Path::new("/nonexistent/folio.toml"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not found"));
    }
}
