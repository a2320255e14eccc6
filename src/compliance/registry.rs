//! Catalog of active compliance plugins.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::analysis::ANALYZER_NAMES;
use crate::error::{RegistrationError, ValidationError};

use super::manager::ENGINE_SOURCE;
use super::CompliancePlugin;

/// Plugins keyed by name.
///
/// Populated once at startup (statically linked plugins first, then any
/// dynamically loaded modules) and only read afterwards. The mutex guards
/// population; reads take a snapshot.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Mutex<BTreeMap<String, Arc<dyn CompliancePlugin>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Arc<dyn CompliancePlugin>>> {
        self.plugins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate and add a plugin.
    ///
    /// Fails with [`RegistrationError::Duplicate`] if the name is taken and
    /// with [`RegistrationError::Validation`] if the plugin's own setup is
    /// invalid or its name belongs to an analyzer or the engine. The
    /// registry is unchanged on failure.
    pub fn register(&self, plugin: Arc<dyn CompliancePlugin>) -> Result<(), RegistrationError> {
        let name = plugin.name().to_string();
        validate_plugin(plugin.as_ref()).map_err(|source| RegistrationError::Validation {
            name: name.clone(),
            source,
        })?;

        match self.lock().entry(name) {
            Entry::Occupied(entry) => Err(RegistrationError::Duplicate(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!(plugin = %entry.key(), version = plugin.version(), "registered plugin");
                entry.insert(plugin);
                Ok(())
            }
        }
    }

    /// All plugins, ordered by name.
    pub fn list(&self) -> Vec<Arc<dyn CompliancePlugin>> {
        self.lock().values().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CompliancePlugin>> {
        self.lock().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Registration-time checks applied to every plugin.
fn validate_plugin(plugin: &dyn CompliancePlugin) -> Result<(), ValidationError> {
    let name = plugin.name();
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    // Report sources are keyed by name across every kind.
    if name == ENGINE_SOURCE || ANALYZER_NAMES.contains(&name) {
        return Err(ValidationError::ReservedName(name.to_string()));
    }

    plugin.validate_configuration()?;

    let controls = plugin.controls();
    if controls.is_empty() {
        return Err(ValidationError::NoControls);
    }

    let mut seen = HashSet::new();
    for control in &controls {
        if !seen.insert(control.id.as_str()) {
            return Err(ValidationError::DuplicateControl(control.id.clone()));
        }
    }

    Ok(())
}
