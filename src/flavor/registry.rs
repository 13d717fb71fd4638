//! Registry mapping flavor ids to connector factories
//!
//! Two tiers: statically linked flavors, which are constructed directly, and
//! plugin packages, which are looked up by package name after alias rewriting.
//! Plugins arrive through the link-time [`FLAVOR_PLUGINS`] slice, through
//! [`FlavorRegistry::register_plugin`], and are filtered by a
//! [`PluginManifest`].

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::core::errors::{ChainsimError, Result};
use crate::flavor::descriptor::{FlavorDescriptor, PluginModule, FLAVOR_PLUGINS};
use crate::flavor::manifest::PluginManifest;
use crate::flavors::ethereum;

lazy_static::lazy_static! {
    /// Short names that resolve to a differently named plugin package
    static ref BUILTIN_ALIASES: HashMap<&'static str, &'static str> = {
        let mut aliases = HashMap::new();
        aliases.insert("filecoin", "chainsim-filecoin");
        aliases
    };
}

/// Outcome of resolving a flavor name
#[derive(Debug, Clone, Copy)]
pub enum Resolution {
    /// A statically linked flavor; no plugin lookup happened
    Static(&'static FlavorDescriptor),
    /// A flavor exported by a plugin package
    Plugin {
        package: &'static str,
        descriptor: &'static FlavorDescriptor,
    },
}

impl Resolution {
    pub fn descriptor(&self) -> &'static FlavorDescriptor {
        match self {
            Self::Static(descriptor) => descriptor,
            Self::Plugin { descriptor, .. } => descriptor,
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self, Self::Static(_))
    }
}

pub struct FlavorRegistry {
    statics: Vec<&'static FlavorDescriptor>,
    plugins: DashMap<String, &'static PluginModule>,
    aliases: DashMap<String, String>,
    disabled: RwLock<HashSet<String>>,
    resolution_attempts: AtomicUsize,
}

impl FlavorRegistry {
    /// Registry with the default flavor, the built-in aliases and every
    /// plugin linked into the binary
    pub fn new() -> Self {
        let registry = Self::empty().with_static(&ethereum::DESCRIPTOR);
        for (short, package) in BUILTIN_ALIASES.iter() {
            registry.add_alias(*short, *package);
        }
        for module in FLAVOR_PLUGINS.iter() {
            if let Err(e) = registry.register_plugin(module) {
                tracing::warn!(package = module.package, error = %e, "Skipping linked plugin");
            }
        }
        registry
    }

    /// Registry without any flavors or aliases
    pub fn empty() -> Self {
        Self {
            statics: Vec::new(),
            plugins: DashMap::new(),
            aliases: DashMap::new(),
            disabled: RwLock::new(HashSet::new()),
            resolution_attempts: AtomicUsize::new(0),
        }
    }

    /// Add a statically linked flavor
    pub fn with_static(mut self, descriptor: &'static FlavorDescriptor) -> Self {
        self.statics.push(descriptor);
        self
    }

    pub fn register_plugin(&self, module: &'static PluginModule) -> Result<()> {
        if self.plugins.contains_key(module.package) {
            return Err(ChainsimError::configuration(format!(
                "plugin package '{}' already registered",
                module.package
            )));
        }
        self.plugins.insert(module.package.to_string(), module);
        if let Some(descriptor) = module.exported() {
            for name in std::iter::once(descriptor.id).chain(descriptor.aliases.iter().copied()) {
                if name != module.package {
                    self.aliases
                        .entry(name.to_string())
                        .or_insert_with(|| module.package.to_string());
                }
            }
        }
        debug!(package = module.package, "Registered flavor plugin");
        Ok(())
    }

    pub fn add_alias(&self, short: impl Into<String>, package: impl Into<String>) {
        self.aliases.insert(short.into(), package.into());
    }

    pub fn apply_manifest(&self, manifest: &PluginManifest) {
        for (short, package) in &manifest.aliases {
            self.add_alias(short.clone(), package.clone());
        }
        self.disabled.write().extend(manifest.disabled.iter().cloned());
    }

    /// Package name a flavor resolves to after alias rewriting
    pub fn package_for(&self, flavor: &str) -> String {
        self.aliases
            .get(flavor)
            .map(|package| package.value().clone())
            .unwrap_or_else(|| flavor.to_string())
    }

    pub fn static_flavor(&self, name: &str) -> Option<&'static FlavorDescriptor> {
        self.statics
            .iter()
            .copied()
            .find(|descriptor| descriptor.answers_to(name))
    }

    /// Resolve a flavor name.
    ///
    /// Static flavors short-circuit. Otherwise the name is rewritten through
    /// the alias table and looked up as a plugin package: an unknown or
    /// disabled package yields `FlavorNotInstalled`, a package that exports no
    /// descriptor yields `FlavorMalformed`.
    pub fn resolve(&self, flavor: &str) -> Result<Resolution> {
        if let Some(descriptor) = self.static_flavor(flavor) {
            return Ok(Resolution::Static(descriptor));
        }

        self.resolution_attempts.fetch_add(1, Ordering::SeqCst);
        let package = self.package_for(flavor);
        debug!(flavor, package = %package, "Resolving flavor plugin");

        if self.disabled.read().contains(&package) {
            return Err(ChainsimError::flavor_not_installed(flavor, package));
        }
        let module = match self.plugins.get(&package) {
            Some(module) => *module.value(),
            None => return Err(ChainsimError::flavor_not_installed(flavor, package)),
        };
        let descriptor = module.exported().ok_or_else(|| {
            ChainsimError::flavor_malformed(
                flavor,
                format!("package '{}' does not export a connector", package),
            )
        })?;
        Ok(Resolution::Plugin {
            package: module.package,
            descriptor,
        })
    }

    /// Number of plugin lookups performed so far
    pub fn resolution_attempts(&self) -> usize {
        self.resolution_attempts.load(Ordering::SeqCst)
    }

    /// Static flavor ids and enabled plugin packages, sorted
    pub fn flavors(&self) -> Vec<String> {
        let disabled = self.disabled.read();
        let mut names: BTreeSet<String> = self.statics.iter().map(|d| d.id.to_string()).collect();
        names.extend(
            self.plugins
                .iter()
                .map(|entry| entry.key().clone())
                .filter(|package| !disabled.contains(package)),
        );
        names.into_iter().collect()
    }
}

impl Default for FlavorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
