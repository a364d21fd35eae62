//! Content items and the tagged values carried in their metadata and fields.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Role a content item plays in the build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Produces a page.
    #[default]
    Content,
    /// Structured site data handed to the render layer, never routed.
    Data,
}

/// A tagged metadata or field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Value {
    Null,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(DateTime<Utc>),
    List(Vec<Value>),
    File {
        url: String,
        #[serde(default)]
        name: Option<String>,
    },
    Object(ValueMap),
}

impl Value {
    /// Kind tag of this value.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Text(_) => "text",
            Self::Number(_) => "number",
            Self::Bool(_) => "bool",
            Self::Date(_) => "date",
            Self::List(_) => "list",
            Self::File { .. } => "file",
            Self::Object(_) => "object",
        }
    }

    /// Create a text value.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Create a file value.
    pub fn file(url: impl Into<String>, name: Option<String>) -> Self {
        Self::File {
            url: url.into(),
            name,
        }
    }

    /// Borrow the string payload of a text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the map payload of an object value.
    #[must_use]
    pub fn as_object(&self) -> Option<&ValueMap> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Borrow the items of a list value.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Deterministic textual form used for hashing. Objects are rendered in key order.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Date(d) => d.to_rfc3339_opts(SecondsFormat::Secs, true),
            Self::List(items) => {
                let parts: Vec<_> = items.iter().map(Value::fingerprint).collect();
                format!("[{}]", parts.join(","))
            }
            Self::File { url, name } => {
                format!("file({url}|{})", name.as_deref().unwrap_or_default())
            }
            Self::Object(map) => {
                let parts: Vec<_> = map
                    .iter()
                    .map(|(k, v)| format!("{k}={}", v.fingerprint()))
                    .collect();
                format!("{{{}}}", parts.join(","))
            }
        }
    }

    /// Human readable form used when interpolating into templates.
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(s) => s.clone(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::List(items) => items
                .iter()
                .map(Value::display)
                .collect::<Vec<_>>()
                .join(", "),
            Self::File { url, .. } => url.clone(),
            other => other.fingerprint(),
        }
    }

    /// Convert a YAML value (from frontmatter) into a tagged value.
    #[must_use]
    pub fn from_yaml(value: serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Null => Self::Null,
            serde_yaml::Value::Bool(b) => Self::Bool(b),
            serde_yaml::Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            serde_yaml::Value::String(s) => match DateTime::parse_from_rfc3339(&s) {
                Ok(date) => Self::Date(date.with_timezone(&Utc)),
                Err(_) => Self::Text(s),
            },
            serde_yaml::Value::Sequence(items) => {
                Self::List(items.into_iter().map(Self::from_yaml).collect())
            }
            serde_yaml::Value::Mapping(mapping) => Self::Object(
                mapping
                    .into_iter()
                    .filter_map(|(k, v)| yaml_key(k).map(|k| (k, Self::from_yaml(v))))
                    .collect(),
            ),
            serde_yaml::Value::Tagged(tagged) => Self::from_yaml(tagged.value),
        }
    }
}

fn yaml_key(key: serde_yaml::Value) -> Option<String> {
    match key {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Case-insensitive map of tagged values.
///
/// Keys are lower-cased when written, and lookups normalise the probe, so
/// `get("outputPath")` and `get("outputpath")` hit the same entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, Value>",
    into = "BTreeMap<String, Value>"
)]
pub struct ValueMap {
    entries: BTreeMap<String, Value>,
}

impl ValueMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, normalising the key.
    pub fn insert(&mut self, key: impl AsRef<str>, value: Value) -> Option<Value> {
        self.entries.insert(normalize_key(key.as_ref()), value)
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl AsRef<str>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a value by key, case-insensitively.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(&normalize_key(key))
    }

    /// Look up a text value, trimmed, ignoring empty strings.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Remove a value by key.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(&normalize_key(key))
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&normalize_key(key))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

impl<K: AsRef<str>> FromIterator<(K, Value)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl From<BTreeMap<String, Value>> for ValueMap {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        entries.into_iter().collect()
    }
}

impl From<ValueMap> for BTreeMap<String, Value> {
    fn from(map: ValueMap) -> Self {
        map.entries
    }
}

/// An immutable unit of content produced by a content gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    /// Stable identifier.
    pub id: String,

    /// Title.
    pub title: String,

    /// URL slug.
    pub slug: String,

    /// Publication timestamp.
    pub publish_at: DateTime<Utc>,

    /// Rendered HTML body.
    #[serde(default)]
    pub content_html: String,

    /// Open-ended metadata.
    #[serde(default)]
    pub meta: ValueMap,

    /// Typed fields, when the source provides them.
    #[serde(default)]
    pub fields: Option<ValueMap>,

    /// Whether the item is a page or site data.
    #[serde(default)]
    pub mode: SourceMode,
}

impl ContentItem {
    /// Create a content item with an empty body and no metadata.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        slug: impl Into<String>,
        publish_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            slug: slug.into(),
            publish_at,
            content_html: String::new(),
            meta: ValueMap::new(),
            fields: None,
            mode: SourceMode::Content,
        }
    }

    #[must_use]
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.content_html = html.into();
        self
    }

    #[must_use]
    pub fn with_meta(mut self, key: impl AsRef<str>, value: Value) -> Self {
        self.meta.insert(key, value);
        self
    }

    #[must_use]
    pub fn with_field(mut self, key: impl AsRef<str>, value: Value) -> Self {
        self.fields.get_or_insert_with(ValueMap::new).insert(key, value);
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: SourceMode) -> Self {
        self.mode = mode;
        self
    }

    /// Value of the `type` metadata key.
    #[must_use]
    pub fn item_type(&self) -> Option<&str> {
        self.meta.get_str("type")
    }

    /// Whether the item routes as a blog post.
    #[must_use]
    pub fn is_post(&self) -> bool {
        self.item_type()
            .is_some_and(|t| t.eq_ignore_ascii_case("post"))
    }

    /// Value of the `language` metadata key.
    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.meta.get_str("language")
    }

    /// Locale of a data item: the `locale` field, else the `locale` metadata key.
    #[must_use]
    pub fn locale(&self) -> Option<&str> {
        self.fields
            .as_ref()
            .and_then(|f| f.get_str("locale"))
            .or_else(|| self.meta.get_str("locale"))
    }

    /// Explicit cross-language grouping key.
    #[must_use]
    pub fn i18n_key(&self) -> Option<&str> {
        self.meta.get_str("i18nKey")
    }

    /// Value of the `summary` metadata key.
    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.meta.get_str("summary")
    }

    #[must_use]
    pub fn is_data(&self) -> bool {
        self.mode == SourceMode::Data
    }
}

/// Strip HTML tags from content.
#[must_use]
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;

    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }

    result
}

/// Truncate text at word boundary, respecting UTF-8 character boundaries.
#[must_use]
pub fn truncate_at_word_boundary(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let truncate_byte_idx = text
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());

    let truncated = &text[..truncate_byte_idx];

    if let Some(last_space_byte) = truncated.rfind(' ') {
        format!("{}...", &truncated[..last_space_byte])
    } else {
        format!("{truncated}...")
    }
}
