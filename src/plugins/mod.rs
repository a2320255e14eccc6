//! Compliance plugins compiled into the binary.

mod firewall;
mod sans;
mod stig;

use std::sync::Arc;

use tracing::{info, warn};

use crate::compliance::{CompliancePlugin, PluginRegistry};
use crate::document::{Document, FilterRule, RuleAction};
use crate::error::RegistrationError;

pub use firewall::FirewallPlugin;
pub use sans::SansPlugin;
pub use stig::StigPlugin;

/// Fresh instances of every built-in plugin.
pub fn builtin_plugins() -> Vec<Arc<dyn CompliancePlugin>> {
    vec![
        Arc::new(FirewallPlugin),
        Arc::new(SansPlugin),
        Arc::new(StigPlugin),
    ]
}

/// Register the built-in plugins.
///
/// A plugin that fails its own validation is skipped with a warning; a
/// duplicate name is returned as an error.
pub fn register_builtin(registry: &PluginRegistry) -> Result<(), RegistrationError> {
    let mut registered = 0;
    for plugin in builtin_plugins() {
        match registry.register(plugin) {
            Ok(()) => registered += 1,
            Err(RegistrationError::Validation { name, source }) => {
                warn!(plugin = %name, error = %source, "built-in plugin failed validation, skipping");
            }
            Err(e) => return Err(e),
        }
    }
    info!(registered, "registered built-in plugins");
    Ok(())
}

/// Enabled pass rules matching any source and any destination.
fn any_any_pass_rules(doc: &Document) -> impl Iterator<Item = (usize, &FilterRule)> {
    doc.enabled_rules().filter(|(_, r)| {
        r.action == RuleAction::Pass && r.source.is_any() && r.destination.is_any()
    })
}
