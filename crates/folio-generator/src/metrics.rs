//! Build report and the optional metrics JSON.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use folio_core::Config;
use serde::{Deserialize, Serialize};

use crate::{
    artifacts::{self, write_artifact},
    cache::RenderReason,
    context::PluginExecution,
};

/// Metrics file format version.
pub const METRICS_VERSION: u32 = 1;

/// Site identity recorded in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteInfo {
    pub title: String,
    pub base_url: String,
    pub languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_language: Option<String>,
}

impl SiteInfo {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            title: config.site.title.clone(),
            base_url: config.site.base_url.clone(),
            languages: config.site.languages.clone(),
            default_language: config.default_language().map(str::to_string),
        }
    }
}

/// Outcome of one variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantReport {
    /// `None` for an unlocalized build.
    pub language: Option<String>,
    pub base_url: String,
    pub output_dir: PathBuf,
    /// Naturally routed pages.
    pub routed: usize,
    /// Plugin-derived pages.
    pub derived: usize,
    pub rendered: usize,
    pub skipped: usize,
    pub reasons: BTreeMap<RenderReason, usize>,
    /// Manifest entries dropped because their page left the render queue.
    pub pruned: usize,
    pub plugins: Vec<PluginExecution>,
}

impl VariantReport {
    /// Pages in the render queue.
    #[must_use]
    pub fn total_pages(&self) -> usize {
        self.routed + self.derived
    }
}

/// Outcome of a whole build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub version: u32,
    pub ts: DateTime<Utc>,
    pub site: SiteInfo,
    pub output_dir: PathBuf,
    /// Items returned by the content gateway, all languages.
    pub content_items: usize,
    pub duration_ms: u64,
    pub variants: Vec<VariantReport>,
    /// Site-root artifacts written during reconciliation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub root_artifacts: Vec<PathBuf>,
}

impl BuildReport {
    #[must_use]
    pub fn new(config: &Config, output_dir: PathBuf, content_items: usize) -> Self {
        Self {
            version: METRICS_VERSION,
            ts: Utc::now(),
            site: SiteInfo::from_config(config),
            output_dir,
            content_items,
            duration_ms: 0,
            variants: Vec::new(),
            root_artifacts: Vec::new(),
        }
    }

    /// Report for `language`; `None` selects the unlocalized variant.
    #[must_use]
    pub fn variant(&self, language: Option<&str>) -> Option<&VariantReport> {
        self.variants
            .iter()
            .find(|v| v.language.as_deref() == language)
    }

    #[must_use]
    pub fn rendered(&self) -> usize {
        self.variants.iter().map(|v| v.rendered).sum()
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.variants.iter().map(|v| v.skipped).sum()
    }

    pub fn to_json(&self) -> artifacts::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as JSON to `path`, creating parent directories.
    pub fn write(&self, path: &Path) -> artifacts::Result<PathBuf> {
        let dir = path.parent().unwrap_or(Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| "metrics.json".into(), |n| n.to_string_lossy());
        write_artifact(dir, &name, &self.to_json()?)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::context::PluginHook;

    fn report() -> BuildReport {
        let mut config = Config::new("Site", "https://example.com");
        config.site.languages = vec!["en".into(), "zh".into()];

        let mut report = BuildReport::new(&config, PathBuf::from("public"), 3);
        for (lang, rendered, skipped) in [("en", 2, 1), ("zh", 0, 1)] {
            let mut variant = VariantReport {
                language: Some(lang.to_string()),
                base_url: format!("https://example.com/{lang}"),
                rendered,
                skipped,
                routed: rendered + skipped,
                ..Default::default()
            };
            if rendered > 0 {
                variant.reasons.insert(RenderReason::New, rendered);
            }
            variant.plugins.push(PluginExecution {
                plugin_name: "sitemap@0.1.0".into(),
                hook: PluginHook::AfterBuild,
                duration_ms: 1,
                success: true,
                error_message: None,
            });
            report.variants.push(variant);
        }
        report
    }

    #[test]
    fn test_totals() {
        let report = report();
        assert_eq!(report.rendered(), 2);
        assert_eq!(report.skipped(), 2);
        assert_eq!(report.variant(Some("zh")).unwrap().total_pages(), 1);
        assert!(report.variant(None).is_none());
    }

    #[test]
    fn test_metrics_json_shape() {
        let dir = TempDir::new().unwrap();
        let path = report().write(&dir.path().join("out/metrics.json")).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["site"]["defaultLanguage"], "en");
        assert_eq!(value["contentItems"], 3);
        assert_eq!(value["variants"][0]["reasons"]["new"], 2);
        assert_eq!(value["variants"][0]["plugins"][0]["hook"], "afterBuild");
        assert_eq!(value["variants"][1]["baseUrl"], "https://example.com/zh");
    }
}
