//! Error types for the Folio core library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while loading settings or reading front matter.
#[derive(Error, Debug)]
pub enum CoreError {
    /// No configuration file at the given path.
    #[error("configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`Config`](crate::Config).
    #[error("failed to parse {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// File plus `FOLIO__` environment layering failed.
    #[error("layered configuration error: {0}")]
    Layered(#[from] config::ConfigError),

    /// A setting holds a value the build cannot work with.
    #[error("invalid setting `{key}`: {message}")]
    InvalidSetting { key: &'static str, message: String },

    /// A keyword setting such as `output_path_encoding` holds an unknown word.
    #[error("unknown {kind} '{value}'")]
    UnknownKeyword { kind: &'static str, value: String },

    /// Front matter could not be parsed.
    #[error("front matter error in {}: {message}", .path.display())]
    Frontmatter { path: PathBuf, message: String },
}

impl CoreError {
    /// Reject the value of setting `key`.
    pub fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key,
            message: message.into(),
        }
    }

    /// Create a new frontmatter error.
    pub fn frontmatter(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Frontmatter {
            path: path.into(),
            message: message.into(),
        }
    }
}
