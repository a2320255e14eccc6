//! Throughput-related configuration checks.

use once_cell::sync::Lazy;

use crate::compliance::{tags, Control, Finding, Severity};
use crate::document::Document;

use super::Analyzer;

/// Enabled rule count above which the ruleset is considered large.
pub const DEFAULT_RULE_COUNT_THRESHOLD: usize = 200;

/// Disabled rules are only reported for rulesets at least this large.
const MIN_RULES_FOR_DISABLED_RATIO: usize = 10;
/// Share of disabled rules (percent) above which PERF-003 fires.
const DISABLED_RATIO_PERCENT: usize = 25;

static OFFLOAD_DISABLED: Lazy<Control> = Lazy::new(|| {
    Control::new("PERF-001", "Hardware offloading disabled", "performance", Severity::Low)
        .describe("One or more NIC offloading features are turned off.")
        .rationale("Moving checksum, segmentation or receive aggregation to the CPU lowers throughput.")
        .remediation("Re-enable offloading where the network driver supports it.")
});

static RULE_COUNT: Lazy<Control> = Lazy::new(|| {
    Control::new("PERF-002", "Large filter ruleset", "performance", Severity::Low)
        .describe("The number of enabled filter rules exceeds the configured threshold.")
        .rationale("Long rulesets increase per-packet evaluation cost and review effort.")
        .remediation("Consolidate rules with aliases and remove obsolete entries.")
});

static DISABLED_RULES: Lazy<Control> = Lazy::new(|| {
    Control::new("PERF-003", "Many disabled filter rules", "performance", Severity::Info)
        .describe("A large share of the filter rules is disabled.")
        .rationale("Disabled rules clutter the ruleset and hide its effective policy.")
        .remediation("Delete disabled rules that are no longer needed.")
});

pub struct PerformanceAnalyzer {
    rule_count_threshold: usize,
}

impl PerformanceAnalyzer {
    pub fn new(rule_count_threshold: usize) -> Self {
        Self {
            rule_count_threshold,
        }
    }
}

impl Default for PerformanceAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_RULE_COUNT_THRESHOLD)
    }
}

impl Analyzer for PerformanceAnalyzer {
    fn name(&self) -> &'static str {
        "performance"
    }

    fn controls(&self) -> Vec<Control> {
        vec![
            OFFLOAD_DISABLED.clone(),
            RULE_COUNT.clone(),
            DISABLED_RULES.clone(),
        ]
    }

    fn analyze(&self, doc: &Document) -> Vec<Finding> {
        let mut findings = Vec::new();
        let system = &doc.system;

        let disabled: Vec<&str> = [
            (system.disable_checksum_offloading, "checksum"),
            (system.disable_segmentation_offloading, "segmentation"),
            (system.disable_large_receive_offloading, "large receive"),
        ]
        .into_iter()
        .filter_map(|(off, name)| off.then_some(name))
        .collect();
        if !disabled.is_empty() {
            findings.push(
                Finding::from_control(&OFFLOAD_DISABLED)
                    .describe(format!("Disabled offloading: {}.", disabled.join(", ")))
                    .affected("system")
                    .tag(tags::PERFORMANCE),
            );
        }

        let enabled = doc.enabled_rules().count();
        if enabled > self.rule_count_threshold {
            findings.push(
                Finding::from_control(&RULE_COUNT)
                    .describe(format!(
                        "{} enabled filter rules exceed the threshold of {}.",
                        enabled, self.rule_count_threshold
                    ))
                    .affected("filter")
                    .tag(tags::PERFORMANCE),
            );
        }

        let total = doc.filter_rules.len();
        let off = total - enabled;
        if total >= MIN_RULES_FOR_DISABLED_RATIO && off * 100 > total * DISABLED_RATIO_PERCENT {
            findings.push(
                Finding::from_control(&DISABLED_RULES)
                    .describe(format!("{} of {} filter rules are disabled.", off, total))
                    .affected("filter")
                    .tag(tags::PERFORMANCE),
            );
        }

        findings
    }
}
