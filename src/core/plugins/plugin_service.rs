// Plugins: extensions switched on by descriptor files.
//
// Rust can't load code from a directory at runtime without unsafe dylib
// tricks, so plugin code is compiled in and registered in a catalog under a
// plugin id. Descriptor files (`plugin.json`) found on the plugin search
// paths decide which of those plugins run, in what order, and with what
// config. Discovery lives behind the `PluginSource` port; the directory
// scanner is in infra.

use crate::core::extensions::{Extension, ExtensionError, ExtensionRegistry, NamedCommand};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{info, warn};

// ============================================================================
// DESCRIPTORS
// ============================================================================

/// Contents of a `plugin.json` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Ids of plugins that must load first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Free-form settings handed to the plugin's factory.
    #[serde(default)]
    pub config: serde_json::Value,
    /// Where the descriptor was found. Set by the source, not read from the file.
    #[serde(skip)]
    pub path: PathBuf,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

fn default_enabled() -> bool {
    true
}

impl PluginDescriptor {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            version: default_version(),
            description: String::new(),
            dependencies: Vec::new(),
            enabled: true,
            config: serde_json::Value::Null,
            path: PathBuf::new(),
        }
    }

    pub fn depends_on(mut self, id: &str) -> Self {
        self.dependencies.push(id.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// `name`, or the id when the descriptor has no name.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Failed to read {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Malformed plugin descriptor {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Duplicate plugin id `{id}` in {path}")]
    DuplicateId { id: String, path: PathBuf },

    #[error("Plugin `{id}` failed to start: {reason}")]
    Factory { id: String, reason: String },

    #[error(transparent)]
    Extension(#[from] ExtensionError),
}

/// Descriptors found by a source, plus the files it had to skip.
#[derive(Debug, Default)]
pub struct Discovery {
    pub descriptors: Vec<PluginDescriptor>,
    pub problems: Vec<PluginError>,
}

// ============================================================================
// SOURCE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait PluginSource: Send + Sync {
    async fn discover(&self) -> Discovery;
}

// ============================================================================
// LOAD ORDER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    MissingDependency(String),
    DependencySkipped(String),
    DependencyCycle,
    DuplicateId,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Disabled => f.write_str("disabled"),
            SkipReason::MissingDependency(dep) => write!(f, "missing dependency `{}`", dep),
            SkipReason::DependencySkipped(dep) => write!(f, "dependency `{}` was skipped", dep),
            SkipReason::DependencyCycle => f.write_str("dependency cycle"),
            SkipReason::DuplicateId => f.write_str("duplicate id"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadPlan {
    /// Plugins to load, dependencies first.
    pub order: Vec<PluginDescriptor>,
    pub skipped: Vec<(PluginDescriptor, SkipReason)>,
}

impl LoadPlan {
    pub fn order_ids(&self) -> Vec<&str> {
        self.order.iter().map(|d| d.id.as_str()).collect()
    }

    pub fn skip_reason(&self, id: &str) -> Option<&SkipReason> {
        self.skipped
            .iter()
            .find(|(d, _)| d.id == id)
            .map(|(_, reason)| reason)
    }
}

/// Order plugins so each comes after its dependencies.
///
/// Disabled plugins are skipped, and so is everything that (transitively)
/// depends on a skipped or missing plugin. Every member of a dependency
/// cycle is skipped. Among plugins whose dependencies are satisfied, lower
/// ids go first.
pub fn resolve_load_order(descriptors: Vec<PluginDescriptor>) -> LoadPlan {
    let mut plan = LoadPlan::default();
    let mut by_id: BTreeMap<String, PluginDescriptor> = BTreeMap::new();
    let mut skipped: HashMap<String, SkipReason> = HashMap::new();

    for descriptor in descriptors {
        if by_id.contains_key(&descriptor.id) {
            plan.skipped.push((descriptor, SkipReason::DuplicateId));
            continue;
        }
        if !descriptor.enabled {
            skipped.insert(descriptor.id.clone(), SkipReason::Disabled);
        }
        by_id.insert(descriptor.id.clone(), descriptor);
    }

    // Propagate missing/skipped dependencies until nothing changes.
    loop {
        let mut changed = false;
        for (id, descriptor) in &by_id {
            if skipped.contains_key(id) {
                continue;
            }
            let reason = descriptor.dependencies.iter().find_map(|dep| {
                if !by_id.contains_key(dep) {
                    Some(SkipReason::MissingDependency(dep.clone()))
                } else if skipped.contains_key(dep) {
                    Some(SkipReason::DependencySkipped(dep.clone()))
                } else {
                    None
                }
            });
            if let Some(reason) = reason {
                skipped.insert(id.clone(), reason);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    // Kahn's algorithm over what's left. Anything it can't place is in a
    // cycle or waits on one.
    let (ordered, stuck) = {
        let remaining: BTreeSet<&String> = by_id
            .keys()
            .filter(|id| !skipped.contains_key(*id))
            .collect();
        let mut indegree: HashMap<&String, usize> = HashMap::new();
        let mut dependents: HashMap<&String, Vec<&String>> = HashMap::new();
        for &id in &remaining {
            let deps: HashSet<&String> = by_id[id].dependencies.iter().collect();
            indegree.insert(id, deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(id);
            }
        }

        let mut ready: BTreeSet<&String> = remaining
            .iter()
            .copied()
            .filter(|id| indegree.get(id) == Some(&0))
            .collect();
        let mut ordered: Vec<String> = Vec::new();

        while let Some(id) = ready.pop_first() {
            ordered.push(id.clone());
            for &dependent in dependents.get(id).into_iter().flatten() {
                if let Some(count) = indegree.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        let placed: HashSet<String> = ordered.iter().cloned().collect();
        let stuck: Vec<(String, SkipReason)> = remaining
            .iter()
            .copied()
            .filter(|id| !placed.contains(*id))
            .map(|id| {
                let reason = if reaches(&by_id, id, id, &placed) {
                    SkipReason::DependencyCycle
                } else {
                    let dep = by_id[id]
                        .dependencies
                        .iter()
                        .find(|dep| !placed.contains(*dep))
                        .cloned()
                        .unwrap_or_default();
                    SkipReason::DependencySkipped(dep)
                };
                (id.clone(), reason)
            })
            .collect();
        (ordered, stuck)
    };
    skipped.extend(stuck);

    for id in ordered {
        if let Some(descriptor) = by_id.remove(&id) {
            plan.order.push(descriptor);
        }
    }
    for (id, descriptor) in by_id {
        if let Some(reason) = skipped.remove(&id) {
            plan.skipped.push((descriptor, reason));
        }
    }
    plan
}

/// Whether `target` is reachable from `from` through unplaced dependencies.
fn reaches(
    by_id: &BTreeMap<String, PluginDescriptor>,
    from: &String,
    target: &String,
    placed: &HashSet<String>,
) -> bool {
    let mut stack: Vec<&String> = by_id[from].dependencies.iter().collect();
    let mut visited: HashSet<&String> = HashSet::new();
    while let Some(id) = stack.pop() {
        if id == target {
            return true;
        }
        if placed.contains(id) || !visited.insert(id) {
            continue;
        }
        if let Some(descriptor) = by_id.get(id) {
            stack.extend(descriptor.dependencies.iter());
        }
    }
    false
}

// ============================================================================
// CATALOG AND MANAGER
// ============================================================================

pub type PluginExtensions<C, E> = Vec<Arc<dyn Extension<C, E>>>;

pub type PluginFactory<C, E> =
    Arc<dyn Fn(&PluginDescriptor) -> Result<PluginExtensions<C, E>, PluginError> + Send + Sync>;

/// Plugin code compiled into the bot, by plugin id.
pub struct PluginCatalog<C, E> {
    factories: HashMap<String, PluginFactory<C, E>>,
}

impl<C, E> Default for PluginCatalog<C, E> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }
}

impl<C, E> PluginCatalog<C, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, id: &str, factory: F) -> &mut Self
    where
        F: Fn(&PluginDescriptor) -> Result<PluginExtensions<C, E>, PluginError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(id.to_string(), Arc::new(factory));
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginStatus {
    Loaded,
    Skipped(SkipReason),
    /// Enabled in a descriptor but not compiled into this bot.
    NoFactory,
    Failed(String),
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginStatus::Loaded => f.write_str("loaded"),
            PluginStatus::Skipped(reason) => write!(f, "skipped ({})", reason),
            PluginStatus::NoFactory => f.write_str("not available in this build"),
            PluginStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPlugin {
    pub descriptor: PluginDescriptor,
    pub status: PluginStatus,
    /// Names of the extensions the plugin registered.
    pub extensions: Vec<String>,
}

/// Loads planned plugins into an extension registry and remembers how it went.
#[derive(Default)]
pub struct PluginManager {
    plugins: RwLock<Vec<LoadedPlugin>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<C, E>(
        &self,
        plan: LoadPlan,
        catalog: &PluginCatalog<C, E>,
        registry: &ExtensionRegistry<C, E>,
    ) -> Vec<LoadedPlugin>
    where
        C: NamedCommand + Send + 'static,
        E: Send + Sync + 'static,
    {
        let mut results = Vec::new();
        let mut unavailable: HashSet<String> = HashSet::new();

        for descriptor in plan.order {
            let blocked = descriptor
                .dependencies
                .iter()
                .find(|dep| unavailable.contains(*dep))
                .cloned();

            let (status, extensions) = match (blocked, catalog.factories.get(&descriptor.id)) {
                (Some(dep), _) => (
                    PluginStatus::Skipped(SkipReason::DependencySkipped(dep)),
                    Vec::new(),
                ),
                (None, None) => {
                    warn!(plugin = %descriptor.id, "No compiled-in code for plugin, skipping");
                    (PluginStatus::NoFactory, Vec::new())
                }
                (None, Some(factory)) => match Self::start(&descriptor, factory, registry) {
                    Ok(extensions) => (PluginStatus::Loaded, extensions),
                    Err(e) => {
                        warn!(plugin = %descriptor.id, "Plugin failed to load: {}", e);
                        (PluginStatus::Failed(e.to_string()), Vec::new())
                    }
                },
            };

            if status == PluginStatus::Loaded {
                info!(
                    plugin = %descriptor.id,
                    version = %descriptor.version,
                    extensions = extensions.len(),
                    "Plugin loaded"
                );
            } else {
                unavailable.insert(descriptor.id.clone());
            }

            results.push(LoadedPlugin {
                descriptor,
                status,
                extensions,
            });
        }

        for (descriptor, reason) in plan.skipped {
            info!(plugin = %descriptor.id, reason = %reason, "Plugin skipped");
            results.push(LoadedPlugin {
                descriptor,
                status: PluginStatus::Skipped(reason),
                extensions: Vec::new(),
            });
        }

        self.plugins
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(results.iter().cloned());
        results
    }

    fn start<C, E>(
        descriptor: &PluginDescriptor,
        factory: &PluginFactory<C, E>,
        registry: &ExtensionRegistry<C, E>,
    ) -> Result<Vec<String>, PluginError>
    where
        C: NamedCommand + Send + 'static,
        E: Send + Sync + 'static,
    {
        let extensions = factory(descriptor)?;
        let mut names: Vec<String> = Vec::new();
        for extension in extensions {
            let name = extension.name().to_string();
            if let Err(e) = registry.add(extension) {
                Self::roll_back(descriptor, &names, registry);
                return Err(e.into());
            }
            names.push(name.clone());
            if let Err(e) = registry.load(&name) {
                Self::roll_back(descriptor, &names, registry);
                return Err(e.into());
            }
        }
        Ok(names)
    }

    /// Take back every extension a half-started plugin registered.
    fn roll_back<C, E>(
        descriptor: &PluginDescriptor,
        names: &[String],
        registry: &ExtensionRegistry<C, E>,
    ) where
        C: NamedCommand + Send + 'static,
        E: Send + Sync + 'static,
    {
        for name in names.iter().rev() {
            if let Err(e) = registry.remove(name) {
                warn!(plugin = %descriptor.id, extension = %name, "Rollback failed: {}", e);
            }
        }
    }

    pub fn plugins(&self) -> Vec<LoadedPlugin> {
        self.plugins
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
