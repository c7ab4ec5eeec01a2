//! Extension registry: builds one controller per allowed manifest entry
//! and routes host notifications to them.
//!
//! Implementations are not discovered at runtime. Each one registers a
//! named factory in an [`ExtensionCatalog`]; the manifest selects which
//! of those factories are instantiated.

use std::collections::HashMap;
use std::path::Path;

use encore_settings::SettingKey;

use crate::builtin;
use crate::error::ExtensionError;
use crate::host::HostContext;
use crate::lifecycle::{Extension, LifecycleController};
use crate::manifest::ExtensionManifest;

/// Builds an extension instance for the given host.
pub type ExtensionFactory = fn(&HostContext) -> Result<Box<dyn Extension>, ExtensionError>;

// ─── Catalog ────────────────────────────────────────────────────────────

/// Name → factory registration table.
#[derive(Clone, Default)]
pub struct ExtensionCatalog {
    factories: HashMap<String, ExtensionFactory>,
}

impl std::fmt::Debug for ExtensionCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ExtensionCatalog").field("names", &names).finish()
    }
}

impl ExtensionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog with every built-in extension registered.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register(builtin::scrobbler::NAME, builtin::scrobbler::create);
        catalog.register(builtin::love_track::NAME, builtin::love_track::create);
        catalog
    }

    /// Register a factory, returning the one it replaces.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: ExtensionFactory,
    ) -> Option<ExtensionFactory> {
        self.factories.insert(name.into(), factory)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn resolve(&self, name: &str) -> Result<ExtensionFactory, ExtensionError> {
        self.factories
            .get(name)
            .copied()
            .ok_or_else(|| ExtensionError::Unresolved(name.to_string()))
    }
}

// ─── Registry ───────────────────────────────────────────────────────────

/// A manifest entry that could not be loaded.
#[derive(Debug)]
pub struct LoadFailure {
    pub name: String,
    pub error: ExtensionError,
}

/// What a console or settings page shows for one loaded extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionSummary {
    pub name: String,
    pub description: String,
    pub active: bool,
}

/// The loaded extensions, keyed by name.
///
/// Built once by [`ExtensionRegistry::load`] and emptied once by
/// [`ExtensionRegistry::destroy`]. Instances live in a hash map: the order
/// in which they are notified or destroyed is unspecified, and extensions
/// must not depend on one another's ordering.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    instances: HashMap<String, LifecycleController>,
    failures: Vec<LoadFailure>,
}

impl ExtensionRegistry {
    /// Parse `manifest_source` and load every allowed extension.
    ///
    /// Only a document that is not valid TOML is an error. A malformed
    /// section, or an entry that fails to resolve or construct, is logged,
    /// recorded in [`Self::failures`] and skipped.
    pub fn load(
        manifest_source: &str,
        catalog: &ExtensionCatalog,
        ctx: &HostContext,
    ) -> Result<Self, ExtensionError> {
        let manifest = ExtensionManifest::parse(manifest_source)?;
        Ok(Self::from_manifest(&manifest, catalog, ctx))
    }

    /// Read the manifest at `path` and load it.
    pub fn load_path(
        path: &Path,
        catalog: &ExtensionCatalog,
        ctx: &HostContext,
    ) -> Result<Self, ExtensionError> {
        let manifest = ExtensionManifest::from_path(path)?;
        Ok(Self::from_manifest(&manifest, catalog, ctx))
    }

    pub fn from_manifest(
        manifest: &ExtensionManifest,
        catalog: &ExtensionCatalog,
        ctx: &HostContext,
    ) -> Self {
        let mut registry = Self::default();

        for rejected in manifest.rejected() {
            tracing::error!(extension = %rejected.name, "skipping malformed manifest section: {}", rejected.reason);
            registry.failures.push(LoadFailure {
                name: rejected.name.clone(),
                error: ExtensionError::InvalidManifest(rejected.reason.clone()),
            });
        }

        for descriptor in manifest.allowed() {
            match Self::construct(&descriptor.name, catalog, ctx) {
                Ok(extension) => {
                    let controller = LifecycleController::attach(extension, ctx);
                    tracing::info!(
                        extension = %descriptor.name,
                        state = %controller.state(),
                        "extension loaded"
                    );
                    registry
                        .instances
                        .insert(descriptor.name.clone(), controller);
                }
                Err(e) => {
                    tracing::error!(extension = %descriptor.name, "failed to load extension: {e}");
                    registry.failures.push(LoadFailure {
                        name: descriptor.name.clone(),
                        error: e,
                    });
                }
            }
        }

        tracing::info!(
            loaded = registry.instances.len(),
            failed = registry.failures.len(),
            "extension registry ready"
        );
        registry
    }

    fn construct(
        name: &str,
        catalog: &ExtensionCatalog,
        ctx: &HostContext,
    ) -> Result<Box<dyn Extension>, ExtensionError> {
        let factory = catalog.resolve(name)?;
        let extension = factory(ctx)?;
        if extension.name() != name {
            return Err(ExtensionError::Construction {
                name: name.to_string(),
                reason: format!("factory produced extension {:?}", extension.name()),
            });
        }
        Ok(extension)
    }

    /// Destroy every instance and clear the set.
    pub fn destroy(&mut self, ctx: &HostContext) {
        let count = self.instances.len();
        for (_, mut controller) in self.instances.drain() {
            controller.destroy(ctx);
        }
        if count > 0 {
            tracing::info!(count, "extension registry destroyed");
        }
    }

    // ── Routing ─────────────────────────────────────────────────────

    /// Forward a settings change to the controllers it concerns.
    pub fn setting_changed(&mut self, key: SettingKey, ctx: &HostContext) {
        match key {
            SettingKey::Connected => {
                for controller in self.instances.values_mut() {
                    controller.connectivity_changed(ctx);
                }
            }
            SettingKey::Extensions => {
                for controller in self.instances.values_mut() {
                    controller.settings_changed(ctx);
                }
            }
            SettingKey::Session | SettingKey::Loved | SettingKey::Fingerprinter => {}
        }
    }

    pub fn playing_changed(&mut self, playing: bool, ctx: &HostContext) {
        for controller in self.instances.values_mut() {
            controller.playing_changed(playing, ctx);
        }
    }

    /// Deliver an action to the active extension that registered it.
    pub fn activate_action(&mut self, action: &str, ctx: &HostContext) -> bool {
        self.instances
            .values_mut()
            .any(|controller| controller.activate_action(action, ctx))
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn get(&self, name: &str) -> Option<&LifecycleController> {
        self.instances.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut LifecycleController> {
        self.instances.get_mut(name)
    }

    /// Loaded extension names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.instances.keys().cloned().collect();
        names.sort();
        names
    }

    /// Name, description and activity of every instance, sorted by name.
    pub fn summaries(&self) -> Vec<ExtensionSummary> {
        let mut summaries: Vec<_> = self
            .instances
            .values()
            .map(|c| ExtensionSummary {
                name: c.name().to_string(),
                description: c.description().to_string(),
                active: c.is_initialised(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.instances
            .values()
            .filter(|c| c.is_initialised())
            .count()
    }

    pub fn failures(&self) -> &[LoadFailure] {
        &self.failures
    }
}
