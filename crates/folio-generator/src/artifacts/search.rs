//! JSON search index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    Alternate, EntryKind, LinkedEntry, Result, SEARCH_FILE, collect_entries, write_artifact,
};
use crate::{
    context::BuildContext,
    plugin::{self, AfterBuild, Plugin},
};

/// Name of the built-in search plugin.
pub const PLUGIN_NAME: &str = "search";

/// Search index format version.
pub const INDEX_VERSION: u32 = 1;

/// One searchable page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternates: Vec<Alternate>,
}

/// A search index document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIndex {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub documents: Vec<SearchDocument>,
}

impl SearchIndex {
    /// Build an index from content pages, optionally including plugin-derived pages.
    #[must_use]
    pub fn build(language: Option<String>, entries: &[LinkedEntry], include_derived: bool) -> Self {
        let documents = entries
            .iter()
            .filter(|linked| match linked.entry.kind {
                EntryKind::Page | EntryKind::Post => true,
                EntryKind::Derived => include_derived,
                EntryKind::List => false,
            })
            .map(|linked| SearchDocument {
                url: linked.entry.url.clone(),
                title: linked.entry.title.clone(),
                summary: linked.entry.summary.clone(),
                language: linked.entry.language.clone(),
                date: linked.entry.date,
                tags: linked.entry.tags.clone(),
                alternates: linked.alternates.clone(),
            })
            .collect();

        Self {
            version: INDEX_VERSION,
            language,
            documents,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Reference to one variant's search index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRef {
    pub language: String,
    pub url: String,
}

/// Root search document listing each variant's index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIndexList {
    pub version: u32,
    pub indexes: Vec<IndexRef>,
}

impl SearchIndexList {
    pub fn new(indexes: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            version: INDEX_VERSION,
            indexes: indexes
                .into_iter()
                .map(|(language, url)| IndexRef { language, url })
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Writes the variant's `search-index.json`.
#[derive(Debug, Default)]
pub struct SearchPlugin;

impl Plugin for SearchPlugin {
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

impl AfterBuild for SearchPlugin {
    fn after_build(&self, ctx: &BuildContext) -> plugin::Result<()> {
        let linked: Vec<_> = collect_entries(ctx)
            .into_iter()
            .map(|entry| LinkedEntry {
                entry,
                alternates: Vec::new(),
            })
            .collect();

        let index = SearchIndex::build(
            ctx.language.clone(),
            &linked,
            ctx.config.search.include_derived,
        );
        write_artifact(&ctx.output_dir, SEARCH_FILE, &index.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{merge_entries, tests::entry};

    fn linked() -> Vec<LinkedEntry> {
        let mut derived = entry("en", "/tags/rust/", None);
        derived.kind = EntryKind::Derived;
        let mut list = entry("en", "/", None);
        list.kind = EntryKind::List;

        merge_entries(
            vec![list, entry("en", "/pages/about/", Some("about")), derived, entry("zh", "/pages/guanyu/", Some("about"))],
            Some("en"),
        )
    }

    #[test]
    fn test_derived_pages_excluded_by_default() {
        let index = SearchIndex::build(None, &linked(), false);
        let urls: Vec<_> = index.documents.iter().map(|d| d.url.as_str()).collect();

        assert_eq!(
            urls,
            vec!["https://example.com/en/pages/about/", "https://example.com/zh/pages/guanyu/"]
        );
    }

    #[test]
    fn test_derived_pages_included_on_request() {
        let index = SearchIndex::build(Some("en".into()), &linked(), true);
        assert_eq!(index.documents.len(), 3);
        assert_eq!(index.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_index_json_shape() {
        let json = SearchIndex::build(None, &linked(), false).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["version"], 1);
        assert_eq!(value["documents"][0]["alternates"][0]["hreflang"], "x-default");
        assert!(value.get("language").is_none());
    }

    #[test]
    fn test_index_list() {
        let list = SearchIndexList::new([("en".to_string(), "https://example.com/en/search-index.json".to_string())]);
        let value: serde_json::Value = serde_json::from_str(&list.to_json().unwrap()).unwrap();

        assert_eq!(value["indexes"][0]["language"], "en");
    }
}
