//! Built-in analyzers.
//!
//! Analyzers are first-class checks compiled into the engine. They produce
//! findings exactly like plugins do, but are not registered in the
//! [`PluginRegistry`](crate::compliance::PluginRegistry) and cannot be
//! removed by plugin selection, only disabled by name.
//!
//! | analyzer      | controls             |
//! |---------------|----------------------|
//! | `rules`       | RULE-001..RULE-003   |
//! | `interfaces`  | IFACE-001            |
//! | `security`    | SEC-001..SEC-006     |
//! | `performance` | PERF-001..PERF-003   |

mod interfaces;
mod performance;
mod rules;
mod security;

use std::sync::Arc;

use crate::compliance::{Control, Finding};
use crate::document::Document;

pub use interfaces::InterfaceAnalyzer;
pub use performance::{PerformanceAnalyzer, DEFAULT_RULE_COUNT_THRESHOLD};
pub use rules::{endpoint_covers, predicate_covers, same_predicate, RuleAnalyzer};
pub use security::SecurityAnalyzer;

/// A built-in check over the whole document.
pub trait Analyzer: Send + Sync {
    /// Stable name used in source summaries and the disable list.
    fn name(&self) -> &'static str;

    /// Every control this analyzer can report against.
    fn controls(&self) -> Vec<Control>;

    fn analyze(&self, doc: &Document) -> Vec<Finding>;
}

/// Tuning for the built-in analyzers.
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    /// Enabled rule count above which PERF-002 fires.
    pub rule_count_threshold: usize,
    /// Analyzer names to skip.
    pub disabled: Vec<String>,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            rule_count_threshold: DEFAULT_RULE_COUNT_THRESHOLD,
            disabled: Vec::new(),
        }
    }
}

/// Names of all built-in analyzers.
pub const ANALYZER_NAMES: &[&str] = &["interfaces", "performance", "rules", "security"];

/// Instantiate every analyzer not disabled by `opts`, ordered by name.
pub fn builtin_analyzers(opts: &AnalyzerOptions) -> Vec<Arc<dyn Analyzer>> {
    let all: Vec<Arc<dyn Analyzer>> = vec![
        Arc::new(InterfaceAnalyzer),
        Arc::new(PerformanceAnalyzer::new(opts.rule_count_threshold)),
        Arc::new(RuleAnalyzer),
        Arc::new(SecurityAnalyzer),
    ];
    all.into_iter()
        .filter(|a| !opts.disabled.iter().any(|d| d == a.name()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_analyzers_respect_disable_list() {
        let all = builtin_analyzers(&AnalyzerOptions::default());
        let names: Vec<_> = all.iter().map(|a| a.name()).collect();
        assert_eq!(names, ANALYZER_NAMES);

        let opts = AnalyzerOptions {
            disabled: vec!["performance".to_string()],
            ..Default::default()
        };
        let names: Vec<_> = builtin_analyzers(&opts).iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["interfaces", "rules", "security"]);
    }

    #[test]
    fn test_analyzer_control_ids_are_unique() {
        let mut ids = std::collections::HashSet::new();
        for analyzer in builtin_analyzers(&AnalyzerOptions::default()) {
            for control in analyzer.controls() {
                assert!(ids.insert(control.id.clone()), "duplicate control {}", control.id);
            }
        }
        assert_eq!(ids.len(), 13);
    }
}
