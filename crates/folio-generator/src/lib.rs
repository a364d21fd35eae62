//! Folio Generator Library
//!
//! Incremental, multi-language build engine for Folio sites.
//!
//! # Modules
//!
//! - [`route`] - Route resolution and output path encoding
//! - [`plugin`] - Plugin contract, discovery and the hook pipeline
//! - [`plugins`] - Built-in plugins
//! - [`cache`] - Incremental build cache and manifest
//! - [`render`] - Render gateway and the default template renderer
//! - [`source`] - Content gateways
//! - [`artifacts`] - Sitemap, feed and search documents
//! - [`build`] - Variant orchestration

pub mod artifacts;
pub mod assets;
pub mod build;
pub mod cache;
pub mod cancel;
pub mod context;
pub mod metrics;
pub mod plugin;
pub mod plugins;
pub mod render;
pub mod route;
pub mod source;

pub use build::{BuildError, Builder};
pub use cache::{IncrementalCache, Manifest, RenderReason};
pub use cancel::CancelToken;
pub use context::{BuildContext, DerivedPage, PluginExecution, PluginHook, RoutedItem};
pub use metrics::{BuildReport, VariantReport};
pub use plugin::{AfterBuild, DerivePages, Plugin, PluginPipeline, PluginRegistry, PluginSource};
pub use render::{ListView, PageView, RenderGateway, SiteView, TemplateRenderer};
pub use route::{Route, resolve};
pub use source::{CompositeGateway, ContentGateway, MarkdownGateway, StaticGateway};
