//! Folio Core Library
//!
//! Core types, configuration, and error handling for the Folio static site generator.

pub mod config;
pub mod content;
pub mod error;
pub mod frontmatter;

pub use config::{
    ArtifactMode, BuildOverrides, Config, OutputPathEncoding, PluginFailMode, PluginToggle,
};
pub use content::{ContentItem, SourceMode, Value, ValueMap};
pub use error::{CoreError, Result};
pub use frontmatter::Frontmatter;
