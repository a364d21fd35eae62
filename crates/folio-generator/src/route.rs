//! Route resolution.
//!
//! Maps a content item to the URL it is served from, the file it is written
//! to, and the template that renders it. Explicit overrides in item metadata
//! win; otherwise the route is derived from the item's `type`.

use std::{collections::HashSet, fmt};

use deunicode::deunicode;
use folio_core::{ContentItem, OutputPathEncoding, Value, ValueMap};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Template used for blog posts.
pub const POST_TEMPLATE: &str = "pages/post.html";

/// Template used for every other page.
pub const PAGE_TEMPLATE: &str = "pages/page.html";

/// Output paths of the home, blog and pages list views. Every variant renders
/// them, so no page may route onto one.
pub const LIST_OUTPUT_PATHS: [&str; 3] = ["index.html", "blog/index.html", "pages/index.html"];

/// Where a content item lives in the output tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Web-facing path, always `/`-prefixed and `/`-suffixed.
    pub url: String,

    /// Path of the written file relative to the variant output root.
    pub output_path: String,

    /// Template identifier handed to the render gateway.
    pub template: String,
}

impl Route {
    /// Build a route, normalising the URL and output path.
    pub fn new(
        url: impl AsRef<str>,
        output_path: impl AsRef<str>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            url: normalize_url(url.as_ref()),
            output_path: normalize_output_path(output_path.as_ref()),
            template: template.into(),
        }
    }
}

/// Resolve the route for `item`, applying the output path encoding policy.
pub fn resolve(item: &ContentItem, encoding: OutputPathEncoding) -> Route {
    let mut route = explicit_route(item).unwrap_or_else(|| default_route(item));
    route.output_path = encode_output_path(&route.output_path, encoding);
    route
}

/// Override from a structured `route` object or flat `url`/`outputPath`/`template` keys.
fn explicit_route(item: &ContentItem) -> Option<Route> {
    item.meta
        .get("route")
        .and_then(Value::as_object)
        .and_then(route_from_map)
        .or_else(|| route_from_map(&item.meta))
}

fn route_from_map(map: &ValueMap) -> Option<Route> {
    let url = map.get_str("url")?;
    let output_path = map.get_str("outputPath")?;
    let template = map.get_str("template")?;
    Some(Route::new(url, output_path, template)).filter(|route| !route.output_path.is_empty())
}

fn default_route(item: &ContentItem) -> Route {
    let slug = route_slug(item);
    if item.is_post() {
        Route::new(
            format!("/blog/{slug}/"),
            format!("blog/{slug}/index.html"),
            POST_TEMPLATE,
        )
    } else {
        Route::new(
            format!("/pages/{slug}/"),
            format!("pages/{slug}/index.html"),
            PAGE_TEMPLATE,
        )
    }
}

/// Slug used for the default route. Never empty and never only dot segments, so
/// a page cannot land on a list view's path.
fn route_slug(item: &ContentItem) -> String {
    let slug = normalize_output_path(&item.slug);
    if !slug.is_empty() {
        return slug;
    }
    match slugify(&item.id) {
        id if id.is_empty() => "page".to_string(),
        id => id,
    }
}

fn is_path_segment(segment: &&str) -> bool {
    !matches!(*segment, "" | "." | "..")
}

/// Normalise a URL so it starts and ends with `/` and has no empty or dot segments.
#[must_use]
pub fn normalize_url(url: &str) -> String {
    let segments: Vec<_> = url.trim().split('/').filter(is_path_segment).collect();
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", segments.join("/"))
    }
}

/// Normalise an output path: forward slashes, no leading slash, no empty or dot
/// segments. The result always stays inside the directory it is joined onto.
#[must_use]
pub fn normalize_output_path(path: &str) -> String {
    path.trim()
        .replace('\\', "/")
        .split('/')
        .filter(is_path_segment)
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalise `path` and re-encode each segment per `encoding`.
#[must_use]
pub fn encode_output_path(path: &str, encoding: OutputPathEncoding) -> String {
    let normalized = normalize_output_path(path);
    let encode: fn(&str) -> String = match encoding {
        OutputPathEncoding::None => return normalized,
        OutputPathEncoding::UrlEncode => |s| urlencoding::encode(s).into_owned(),
        OutputPathEncoding::Slug => slug_segment,
        OutputPathEncoding::Sanitize => sanitize_segment,
    };

    normalized.split('/').map(encode).collect::<Vec<_>>().join("/")
}

/// ASCII-slugify a string: transliterate, lower-case, collapse non-alphanumerics to `-`.
#[must_use]
pub fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    for c in deunicode(s).to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Slugify a segment's base name, keeping a leading dot and the extension.
#[must_use]
pub fn slug_segment(segment: &str) -> String {
    let (lead, rest) = match segment.strip_prefix('.') {
        Some(rest) => (".", rest),
        None => ("", segment),
    };
    let (base, ext) = match rest.rfind('.') {
        Some(i) if i > 0 => rest.split_at(i),
        _ => (rest, ""),
    };

    let slug = slugify(base);
    let slug = if slug.is_empty() { "page" } else { &slug };
    format!("{lead}{slug}{ext}")
}

/// Characters Windows refuses in file names, besides path separators.
const FORBIDDEN_CHARS: [char; 7] = ['<', '>', ':', '"', '|', '?', '*'];

/// Make a segment safe for common file systems and lower-case it, so paths
/// never differ only by case.
#[must_use]
pub fn sanitize_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars().flat_map(char::to_lowercase) {
        if c.is_control() || FORBIDDEN_CHARS.contains(&c) {
            continue;
        }
        let c = if c == ' ' { '-' } else { c };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_end_matches([' ', '.']);
    if trimmed.is_empty() {
        "page".to_string()
    } else {
        trimmed.to_string()
    }
}

/// A reason a path would fail to materialise on Windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathIssue {
    /// Segment is a reserved device name (`CON`, `COM1`, ...).
    ReservedName(String),
    /// Segment ends in a space or dot.
    TrailingSpaceOrDot(String),
    /// Segment contains a forbidden or control character.
    ForbiddenCharacter { segment: String, ch: char },
    /// Path contains an empty segment.
    EmptySegment,
}

impl fmt::Display for PathIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReservedName(s) => write!(f, "reserved device name '{s}'"),
            Self::TrailingSpaceOrDot(s) => write!(f, "trailing space or dot in '{s}'"),
            Self::ForbiddenCharacter { segment, ch } => {
                write!(f, "forbidden character {ch:?} in '{segment}'")
            }
            Self::EmptySegment => f.write_str("empty path segment"),
        }
    }
}

fn is_reserved_name(segment: &str) -> bool {
    let stem = segment.split('.').next().unwrap_or(segment).to_ascii_uppercase();
    match stem.as_str() {
        "CON" | "PRN" | "AUX" | "NUL" => true,
        s => {
            (s.starts_with("COM") || s.starts_with("LPT"))
                && s.len() == 4
                && s.as_bytes()[3].is_ascii_digit()
                && s.as_bytes()[3] != b'0'
        }
    }
}

/// Scan an output path for Windows incompatibilities.
#[must_use]
pub fn windows_path_issues(path: &str) -> Vec<PathIssue> {
    let mut issues = Vec::new();

    for segment in path.split('/') {
        if segment.is_empty() {
            issues.push(PathIssue::EmptySegment);
            continue;
        }
        if is_reserved_name(segment) {
            issues.push(PathIssue::ReservedName(segment.to_string()));
        }
        if segment.ends_with([' ', '.']) {
            issues.push(PathIssue::TrailingSpaceOrDot(segment.to_string()));
        }
        if let Some(ch) = segment
            .chars()
            .find(|c| c.is_control() || FORBIDDEN_CHARS.contains(c) || *c == '\\')
        {
            issues.push(PathIssue::ForbiddenCharacter {
                segment: segment.to_string(),
                ch,
            });
        }
    }

    issues
}

/// Per-build Windows compatibility diagnostic. Warns at most once per path.
#[derive(Debug, Default)]
pub struct PathDiagnostics {
    warned: HashSet<String>,
}

impl PathDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `path`, logging a warning the first time it is seen with issues.
    ///
    /// Returns `true` if a warning was emitted.
    pub fn check(&mut self, path: &str) -> bool {
        let issues = windows_path_issues(path);
        if issues.is_empty() || !self.warned.insert(path.to_string()) {
            return false;
        }

        let summary: Vec<_> = issues.iter().map(ToString::to_string).collect();
        warn!(
            path = %path,
            issues = %summary.join("; "),
            "output path is not portable to Windows"
        );
        true
    }

    /// Number of distinct paths warned about.
    #[must_use]
    pub fn warned_count(&self) -> usize {
        self.warned.len()
    }
}
