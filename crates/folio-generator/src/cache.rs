//! Incremental build cache.
//!
//! One JSON manifest per variant records, for every output path, the digests
//! of the content, route and template directory that produced it. A page is
//! skipped only when all three digests match and its output file still exists.
//! A missing or unreadable manifest is treated as empty.

use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
};

use folio_core::ContentItem;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::route::{Route, normalize_output_path, sanitize_segment};

/// Manifest format version. Manifests with another version are discarded.
pub const MANIFEST_VERSION: u32 = 1;

/// Cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error.
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Template directory walk error.
    #[error("failed to walk template directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Cache record for one output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub output_path: String,
    pub url: String,
    pub template: String,
    pub content_hash: String,
    pub route_hash: String,
    pub template_hash: String,
}

/// Persisted per-variant manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: u32,
    pub template_hash: String,
    pub entries: BTreeMap<String, ManifestEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            template_hash: String::new(),
            entries: BTreeMap::new(),
        }
    }
}

impl Manifest {
    /// Load a manifest, falling back to an empty one on any failure.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no manifest, starting empty");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable manifest, starting empty");
                return Self::default();
            }
        };

        match serde_json::from_str::<Self>(&content) {
            Ok(manifest) if manifest.version == MANIFEST_VERSION => manifest,
            Ok(manifest) => {
                warn!(
                    path = %path.display(),
                    version = manifest.version,
                    expected = MANIFEST_VERSION,
                    "manifest version mismatch, starting empty"
                );
                Self::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt manifest, starting empty");
                Self::default()
            }
        }
    }

    /// Save the manifest, creating its directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Manifest file name for a variant: `manifest.json` or `manifest.<lang>.json`.
#[must_use]
pub fn manifest_file_name(language: Option<&str>) -> String {
    match language {
        Some(lang) => format!("manifest.{}.json", sanitize_segment(lang)),
        None => "manifest.json".to_string(),
    }
}

fn hex_digest(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Digest over every file under `dir`: relative paths and bytes, in path order.
///
/// A missing directory hashes as empty.
pub fn template_hash(dir: &Path) -> Result<String> {
    let mut files = Vec::new();
    if dir.exists() {
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let relative = entry
                    .path()
                    .strip_prefix(dir)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .replace('\\', "/");
                files.push((relative, entry.into_path()));
            }
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = blake3::Hasher::new();
    for (relative, path) in &files {
        let bytes = fs::read(path).map_err(|source| CacheError::Io {
            path: path.clone(),
            source,
        })?;
        hasher.update(&(relative.len() as u64).to_le_bytes());
        hasher.update(relative.as_bytes());
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }

    debug!(dir = %dir.display(), files = files.len(), "hashed templates");
    Ok(hasher.finalize().to_hex().to_string())
}

/// Deterministic fingerprint of an item.
///
/// `salt` folds in state outside the item that its rendered page depends on.
#[must_use]
pub fn content_fingerprint(item: &ContentItem, salt: &str) -> String {
    let published = item
        .publish_at
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    let mut fp = String::with_capacity(item.content_html.len() + 256);
    for part in [
        item.id.as_str(),
        item.title.as_str(),
        item.slug.as_str(),
        published.as_str(),
        item.item_type().unwrap_or_default(),
        item.summary().unwrap_or_default(),
    ] {
        fp.push_str(part);
        fp.push('\n');
    }

    for (name, value) in item.meta.iter() {
        if name != "type" && name != "summary" {
            fp.push_str(&format!("meta:{name}:{}:{};", value.kind(), value.fingerprint()));
        }
    }
    fp.push('\n');

    if let Some(fields) = &item.fields {
        for (name, value) in fields.iter() {
            fp.push_str(&format!("{name}:{}:{};", value.kind(), value.fingerprint()));
        }
    }
    fp.push('\n');

    fp.push_str(salt);
    fp.push('\n');
    fp.push_str(&item.content_html);
    fp
}

/// Content digest of an item.
#[must_use]
pub fn content_hash(item: &ContentItem, salt: &str) -> String {
    hex_digest(content_fingerprint(item, salt).as_bytes())
}

/// Route digest: URL, normalized output path and template id.
#[must_use]
pub fn route_hash(route: &Route) -> String {
    let fp = format!(
        "{}\n{}\n{}",
        route.url,
        normalize_output_path(&route.output_path),
        route.template
    );
    hex_digest(fp.as_bytes())
}

/// Why a page was rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderReason {
    New,
    OutputMissing,
    TemplateChanged,
    ContentChanged,
    RouteChanged,
    Forced,
    FullRender,
}

impl fmt::Display for RenderReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::New => "new",
            Self::OutputMissing => "outputMissing",
            Self::TemplateChanged => "templateChanged",
            Self::ContentChanged => "contentChanged",
            Self::RouteChanged => "routeChanged",
            Self::Forced => "forced",
            Self::FullRender => "fullRender",
        })
    }
}

/// Skip/render verdict for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Skip,
    Render(RenderReason),
}

/// Per-variant incremental cache.
#[derive(Debug)]
pub struct IncrementalCache {
    enabled: bool,
    force: bool,
    path: PathBuf,
    template_hash: String,
    previous: Manifest,
    current: BTreeMap<String, ManifestEntry>,
}

impl IncrementalCache {
    /// Open the cache for a variant. When disabled the manifest is never read or written.
    #[must_use]
    pub fn open(path: PathBuf, template_hash: String, enabled: bool, force: bool) -> Self {
        let previous = if enabled {
            Manifest::load(&path)
        } else {
            Manifest::default()
        };

        debug!(
            path = %path.display(),
            enabled,
            force,
            entries = previous.entries.len(),
            "opened incremental cache"
        );

        Self {
            enabled,
            force,
            path,
            template_hash,
            previous,
            current: BTreeMap::new(),
        }
    }

    /// Decide whether the page at `route` must be rendered.
    #[must_use]
    pub fn decide(&self, route: &Route, content_hash: &str, output_file: &Path) -> Decision {
        if !self.enabled {
            return Decision::Render(RenderReason::FullRender);
        }
        if self.force {
            return Decision::Render(RenderReason::Forced);
        }

        let key = normalize_output_path(&route.output_path);
        let Some(entry) = self.previous.entries.get(&key) else {
            return Decision::Render(RenderReason::New);
        };

        if !output_file.exists() {
            Decision::Render(RenderReason::OutputMissing)
        } else if entry.template_hash != self.template_hash {
            Decision::Render(RenderReason::TemplateChanged)
        } else if entry.content_hash != content_hash {
            Decision::Render(RenderReason::ContentChanged)
        } else if entry.route_hash != route_hash(route) {
            Decision::Render(RenderReason::RouteChanged)
        } else {
            Decision::Skip
        }
    }

    /// Record the current state of a page in the render queue, rendered or skipped.
    pub fn record(&mut self, route: &Route, content_hash: &str) {
        if !self.enabled {
            return;
        }

        let key = normalize_output_path(&route.output_path);
        self.current.insert(
            key.clone(),
            ManifestEntry {
                output_path: key,
                url: route.url.clone(),
                template: route.template.clone(),
                content_hash: content_hash.to_string(),
                route_hash: route_hash(route),
                template_hash: self.template_hash.clone(),
            },
        );
    }

    /// Output paths in the previous manifest that were not recorded this build.
    #[must_use]
    pub fn stale_entries(&self) -> Vec<&str> {
        self.previous
            .entries
            .keys()
            .filter(|k| !self.current.contains_key(*k))
            .map(String::as_str)
            .collect()
    }

    /// Prune unseen entries and persist the manifest. Returns the number pruned.
    pub fn persist(self) -> Result<usize> {
        if !self.enabled {
            return Ok(0);
        }

        let pruned = self.stale_entries().len();
        let manifest = Manifest {
            version: MANIFEST_VERSION,
            template_hash: self.template_hash,
            entries: self.current,
        };
        manifest.save(&self.path)?;

        info!(
            path = %self.path.display(),
            entries = manifest.entries.len(),
            pruned,
            "saved manifest"
        );
        Ok(pruned)
    }
}
