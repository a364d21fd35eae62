//! Plugin pipeline.
//!
//! Plugins are statically linked and discovered from an ordered list of
//! [`PluginSource`]s. A plugin opts into hooks by returning itself from
//! [`Plugin::as_derive_pages`] or [`Plugin::as_after_build`].
//!
//! Every invocation is timed and recorded on the [`BuildContext`]. Failures
//! (including panics) are either escalated or logged and swallowed depending
//! on the configured [`PluginFailMode`].

use std::{
    any::Any,
    collections::HashSet,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Instant,
};

use folio_core::PluginFailMode;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::{
    artifacts::ArtifactError,
    context::{BuildContext, DerivedPage, PluginExecution, PluginHook},
};

/// Plugin errors.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Plugin reported a failure.
    #[error("{0}")]
    Message(String),

    /// Plugin panicked.
    #[error("panicked: {0}")]
    Panicked(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Artifact generation error.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// A hook failed under the strict fail mode.
    #[error("plugin '{plugin}' failed in {hook}: {source}")]
    Hook {
        plugin: String,
        hook: PluginHook,
        #[source]
        source: Box<PluginError>,
    },
}

impl PluginError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Result type for plugin operations.
pub type Result<T> = std::result::Result<T, PluginError>;

/// A build plugin.
pub trait Plugin: Send + Sync {
    /// Name used for enable switches.
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Identity used for de-duplication: `name@version`.
    fn id(&self) -> String {
        format!("{}@{}", self.name(), self.version())
    }

    fn as_derive_pages(&self) -> Option<&dyn DerivePages> {
        None
    }

    fn as_after_build(&self) -> Option<&dyn AfterBuild> {
        None
    }
}

/// Synthesises additional pages before rendering.
pub trait DerivePages {
    fn derive_pages(&self, ctx: &mut BuildContext) -> Result<Vec<DerivedPage>>;
}

/// Runs after every page of a variant is written.
pub trait AfterBuild {
    fn after_build(&self, ctx: &BuildContext) -> Result<()>;
}

type PluginFactory = Box<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// A named, ordered list of plugin constructors.
pub struct PluginSource {
    name: String,
    factories: Vec<PluginFactory>,
}

impl PluginSource {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            factories: Vec::new(),
        }
    }

    /// Add a constructor.
    #[must_use]
    pub fn with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.push(Box::new(factory));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for PluginSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSource")
            .field("name", &self.name)
            .field("factories", &self.factories.len())
            .finish()
    }
}

/// Discovered plugins in execution order.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginRegistry {
    /// Registry with no plugins.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding the built-in plugin set.
    #[must_use]
    pub fn builtin() -> Self {
        Self::discover(&[crate::plugins::builtin_source()])
    }

    /// Instantiate every plugin from `sources`, in order.
    ///
    /// The first plugin with a given `name@version` wins; later duplicates are dropped.
    #[must_use]
    pub fn discover(sources: &[PluginSource]) -> Self {
        let mut seen = HashSet::new();
        let mut plugins: Vec<Arc<dyn Plugin>> = Vec::new();

        for source in sources {
            for factory in &source.factories {
                let plugin = factory();
                let id = plugin.id();
                if seen.insert(id.clone()) {
                    debug!(plugin = %id, source = %source.name, "registered plugin");
                    plugins.push(Arc::from(plugin));
                } else {
                    debug!(plugin = %id, source = %source.name, "dropping duplicate plugin");
                }
            }
        }

        Self { plugins }
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Plugin> {
        self.plugins.iter().map(AsRef::as_ref)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Identities of registered plugins.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.iter().map(Plugin::id).collect()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

/// Runs plugin hooks against a build context.
#[derive(Debug)]
pub struct PluginPipeline<'a> {
    registry: &'a PluginRegistry,
    fail_mode: PluginFailMode,
}

impl<'a> PluginPipeline<'a> {
    #[must_use]
    pub fn new(registry: &'a PluginRegistry, fail_mode: PluginFailMode) -> Self {
        Self {
            registry,
            fail_mode,
        }
    }

    /// Run the derive-pages hook of every enabled plugin.
    ///
    /// Returns each derived page tagged with the producing plugin's identity.
    pub fn derive_pages(&self, ctx: &mut BuildContext) -> Result<Vec<(String, DerivedPage)>> {
        let mut derived = Vec::new();

        for plugin in self.registry.iter() {
            let Some(hook) = plugin.as_derive_pages() else {
                continue;
            };
            if !ctx.config.plugin_enabled(plugin.name()) {
                debug!(plugin = %plugin.id(), "plugin disabled");
                continue;
            }

            let (record, outcome) = invoke(plugin, PluginHook::DerivePages, || {
                hook.derive_pages(ctx)
            });
            ctx.plugin_records.push(record);

            if let Some(pages) = self.settle(plugin, PluginHook::DerivePages, outcome)? {
                debug!(plugin = %plugin.id(), count = pages.len(), "derived pages");
                derived.extend(pages.into_iter().map(|page| (plugin.id(), page)));
            }
        }

        Ok(derived)
    }

    /// Run the after-build hook of every enabled plugin.
    pub fn after_build(&self, ctx: &mut BuildContext) -> Result<()> {
        for plugin in self.registry.iter() {
            let Some(hook) = plugin.as_after_build() else {
                continue;
            };
            if !ctx.config.plugin_enabled(plugin.name()) {
                debug!(plugin = %plugin.id(), "plugin disabled");
                continue;
            }

            let (record, outcome) = invoke(plugin, PluginHook::AfterBuild, || hook.after_build(ctx));
            ctx.plugin_records.push(record);
            self.settle(plugin, PluginHook::AfterBuild, outcome)?;
        }

        Ok(())
    }

    /// Apply the fail mode to a hook outcome.
    fn settle<T>(
        &self,
        plugin: &dyn Plugin,
        hook: PluginHook,
        outcome: Result<T>,
    ) -> Result<Option<T>> {
        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(err) => match self.fail_mode {
                PluginFailMode::Strict => {
                    error!(plugin = %plugin.id(), %hook, error = %err, "plugin failed");
                    Err(PluginError::Hook {
                        plugin: plugin.id(),
                        hook,
                        source: Box::new(err),
                    })
                }
                PluginFailMode::Warn => {
                    warn!(plugin = %plugin.id(), %hook, error = %err, "plugin failed, continuing");
                    Ok(None)
                }
            },
        }
    }
}

/// Time a hook call and contain panics.
fn invoke<T>(
    plugin: &dyn Plugin,
    hook: PluginHook,
    call: impl FnOnce() -> Result<T>,
) -> (PluginExecution, Result<T>) {
    let start = Instant::now();
    let outcome = match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(outcome) => outcome,
        Err(payload) => Err(PluginError::Panicked(panic_message(payload.as_ref()))),
    };
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let record = PluginExecution {
        plugin_name: plugin.id(),
        hook,
        duration_ms,
        success: outcome.is_ok(),
        error_message: outcome.as_ref().err().map(ToString::to_string),
    };

    (record, outcome)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
