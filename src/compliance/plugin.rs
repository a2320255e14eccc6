//! The capability contract every compliance checker satisfies.

use crate::document::Document;
use crate::error::{ControlNotFound, ValidationError};

use super::{Control, Finding};

/// A compliance checker.
///
/// Implemented by the plugins compiled into the binary and by plugins
/// loaded from shared objects at startup; the registry does not
/// distinguish between them.
///
/// # Contract
///
/// `run_checks` is a pure function of the document. It must not panic;
/// if it does, the panic is contained by the plugin manager and reported
/// as an `info` finding instead of aborting sibling plugins.
pub trait CompliancePlugin: Send + Sync {
    /// Unique registry key.
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn description(&self) -> &str;

    /// Check the plugin's own setup. Called once at registration.
    fn validate_configuration(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Every control this plugin can report against.
    fn controls(&self) -> Vec<Control>;

    fn control_by_id(&self, id: &str) -> Result<Control, ControlNotFound> {
        self.controls()
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| ControlNotFound {
                plugin: self.name().to_string(),
                id: id.to_string(),
            })
    }

    /// Evaluate all controls against the document.
    fn run_checks(&self, doc: &Document) -> Vec<Finding>;
}

impl std::fmt::Debug for dyn CompliancePlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompliancePlugin")
            .field("name", &self.name())
            .field("version", &self.version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::Severity;

    struct MockPlugin;

    impl CompliancePlugin for MockPlugin {
        fn name(&self) -> &str {
            "mock"
        }

        fn version(&self) -> &str {
            "0.0.1"
        }

        fn description(&self) -> &str {
            "Mock plugin"
        }

        fn controls(&self) -> Vec<Control> {
            vec![Control::new("MOCK-001", "Mock control", "testing", Severity::Low)]
        }

        fn run_checks(&self, _doc: &Document) -> Vec<Finding> {
            Vec::new()
        }
    }

    #[test]
    fn test_control_by_id() {
        let plugin = MockPlugin;
        assert_eq!(plugin.control_by_id("MOCK-001").unwrap().title, "Mock control");

        let err = plugin.control_by_id("MOCK-999").unwrap_err();
        assert_eq!(err.id, "MOCK-999");
        assert_eq!(err.plugin, "mock");
    }
}
