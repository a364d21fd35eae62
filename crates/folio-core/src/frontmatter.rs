//! Frontmatter parsing for content files.

use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    content::{SourceMode, Value, ValueMap},
    error::{CoreError, Result},
};

/// Frontmatter metadata for content files.
///
/// Well-known keys are lifted into typed fields; everything else lands in
/// `extra` and becomes item metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frontmatter {
    /// Stable identifier; defaults to the file's relative path.
    #[serde(default)]
    pub id: Option<String>,

    /// Page title.
    #[serde(default)]
    pub title: String,

    /// URL slug; defaults to the slugified file stem.
    #[serde(default)]
    pub slug: Option<String>,

    /// Publication date.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,

    /// Whether this is a draft.
    #[serde(default)]
    pub draft: bool,

    /// Whether the file is a page or site data.
    #[serde(default)]
    pub mode: Option<SourceMode>,

    /// Typed fields.
    #[serde(default)]
    pub fields: Option<BTreeMap<String, serde_yaml::Value>>,

    /// Remaining keys, kept as metadata.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Frontmatter {
    /// Metadata map built from the non-reserved keys.
    #[must_use]
    pub fn meta(&self) -> ValueMap {
        self.extra
            .iter()
            .map(|(k, v)| (k, Value::from_yaml(v.clone())))
            .collect()
    }

    /// Typed field map, if the frontmatter declared one.
    #[must_use]
    pub fn typed_fields(&self) -> Option<ValueMap> {
        self.fields.as_ref().map(|fields| {
            fields
                .iter()
                .map(|(k, v)| (k, Value::from_yaml(v.clone())))
                .collect()
        })
    }
}

/// Delimiter types for frontmatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontmatterFormat {
    /// YAML frontmatter delimited by `---`.
    Yaml,
    /// TOML frontmatter delimited by `+++`.
    Toml,
}

impl FrontmatterFormat {
    /// Get the delimiter string for this format.
    pub fn delimiter(&self) -> &'static str {
        match self {
            Self::Yaml => "---",
            Self::Toml => "+++",
        }
    }
}

/// Split content into frontmatter and body.
pub fn split_frontmatter(content: &str) -> Option<(FrontmatterFormat, &str, &str)> {
    let content = content.trim_start();

    let format = if content.starts_with("---") {
        FrontmatterFormat::Yaml
    } else if content.starts_with("+++") {
        FrontmatterFormat::Toml
    } else {
        return None;
    };

    let delimiter = format.delimiter();

    let after_first = &content[delimiter.len()..];
    let closing_pos = after_first.find(delimiter)?;

    let frontmatter = after_first[..closing_pos].trim();
    let body = after_first[closing_pos + delimiter.len()..].trim_start();

    Some((format, frontmatter, body))
}

/// Parse frontmatter from a string.
pub fn parse_frontmatter(content: &str, path: &Path) -> Result<(Frontmatter, String)> {
    let Some((format, fm_str, body)) = split_frontmatter(content) else {
        return Ok((Frontmatter::default(), content.to_string()));
    };

    let frontmatter: Frontmatter = match format {
        FrontmatterFormat::Yaml => {
            serde_yaml::from_str(fm_str).map_err(|e| CoreError::frontmatter(path, e.to_string()))?
        }
        FrontmatterFormat::Toml => {
            toml::from_str(fm_str).map_err(|e| CoreError::frontmatter(path, e.to_string()))?
        }
    };

    Ok((frontmatter, body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_yaml_frontmatter() {
        let content = r#"---
title: "Hello World"
date: 2024-01-14
---

This is the body content."#;

        let (format, fm, body) = split_frontmatter(content).expect("split");
        assert_eq!(format, FrontmatterFormat::Yaml);
        assert!(fm.contains("title:"));
        assert!(body.starts_with("This is the body"));
    }

    #[test]
    fn test_split_toml_frontmatter() {
        let content = r#"+++
title = "Hello World"
+++

This is the body content."#;

        let (format, fm, body) = split_frontmatter(content).expect("split");
        assert_eq!(format, FrontmatterFormat::Toml);
        assert!(fm.contains("title ="));
        assert!(body.starts_with("This is the body"));
    }

    #[test]
    fn test_no_frontmatter() {
        let content = "Just some content without frontmatter.";
        assert!(split_frontmatter(content).is_none());
    }

    #[test]
    fn test_parse_yaml_frontmatter() {
        let content = r#"---
title: "Test Post"
date: 2024-01-14T10:00:00Z
type: post
language: zh
tags:
  - rust
  - test
fields:
  rating: 4
---

Content here."#;

        let (fm, body) = parse_frontmatter(content, Path::new("test.md")).expect("parse");

        assert_eq!(fm.title, "Test Post");
        assert!(fm.date.is_some());
        assert!(!fm.draft);
        assert_eq!(body, "Content here.");

        let meta = fm.meta();
        assert_eq!(meta.get_str("type"), Some("post"));
        assert_eq!(meta.get_str("language"), Some("zh"));
        assert_eq!(meta.get("tags").and_then(Value::as_list).map(<[Value]>::len), Some(2));

        let fields = fm.typed_fields().expect("fields");
        assert_eq!(fields.get("rating"), Some(&Value::Number(4.0)));
    }

    #[test]
    fn test_parse_toml_frontmatter() {
        let content = r#"+++
title = "Test Post"
draft = true
mode = "data"
+++

Content here."#;

        let (fm, body) = parse_frontmatter(content, Path::new("test.md")).expect("parse");

        assert_eq!(fm.title, "Test Post");
        assert!(fm.draft);
        assert_eq!(fm.mode, Some(SourceMode::Data));
        assert_eq!(body, "Content here.");
    }

    #[test]
    fn test_frontmatter_defaults() {
        let content = r#"---
title: "Minimal"
---

Body"#;

        let (fm, _body) = parse_frontmatter(content, Path::new("test.md")).expect("parse");

        assert_eq!(fm.title, "Minimal");
        assert!(fm.id.is_none());
        assert!(fm.slug.is_none());
        assert!(fm.typed_fields().is_none());
        assert!(fm.meta().is_empty());
    }

    #[test]
    fn test_invalid_yaml_reports_path() {
        let content = "---\ntitle: [unclosed\n---\nBody";
        let err = parse_frontmatter(content, Path::new("posts/bad.md")).unwrap_err();
        assert!(err.to_string().contains("posts/bad.md"));
    }
}
