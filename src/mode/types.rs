//! Report structures produced by the mode controller.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compliance::{Finding, Severity, SourceStatus, SourceSummary};
use crate::document::Document;
use crate::score::{RiskLevel, SecurityScore};

/// Section names, shared by the controller and report builders.
pub mod sections {
    pub const SUMMARY: &str = "Summary";
    pub const RECOMMENDATIONS: &str = "Recommendations";
    pub const COMPLIANCE: &str = "Compliance";
    pub const WAN_EXPOSED_SERVICES: &str = "WanExposedServices";
    pub const ATTACK_SURFACES: &str = "AttackSurfaces";
    pub const WEAK_NAT_RULES: &str = "WeakNatRules";
    pub const ADMIN_PORTALS: &str = "AdminPortals";
    pub const ENUMERATION_DATA: &str = "EnumerationData";
}

/// Audience and framing of a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    #[default]
    Standard,
    Blue,
    Red,
}

impl ReportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportMode::Standard => "standard",
            ReportMode::Blue => "blue",
            ReportMode::Red => "red",
        }
    }

    /// Sections this mode can build, in output order.
    pub fn sections(&self) -> &'static [&'static str] {
        match self {
            ReportMode::Standard => &[sections::SUMMARY],
            ReportMode::Blue => &[sections::RECOMMENDATIONS, sections::COMPLIANCE],
            ReportMode::Red => &[
                sections::WAN_EXPOSED_SERVICES,
                sections::ATTACK_SURFACES,
                sections::WEAK_NAT_RULES,
                sections::ADMIN_PORTALS,
                sections::ENUMERATION_DATA,
            ],
        }
    }

    pub fn supports(&self, section: &str) -> bool {
        self.sections().contains(&section)
    }
}

impl std::fmt::Display for ReportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(ReportMode::Standard),
            "blue" => Ok(ReportMode::Blue),
            "red" => Ok(ReportMode::Red),
            _ => Err(format!("unknown report mode: {}", s)),
        }
    }
}

/// What the caller asks the controller for.
#[derive(Debug, Clone, Default)]
pub struct ReportRequest {
    pub mode: ReportMode,
    /// Restrict output to these sections. Empty means every section of the mode.
    pub sections: Vec<String>,
    /// Fixed timestamp for reproducible output; `None` uses the current time.
    pub generated_at: Option<DateTime<Utc>>,
}

impl ReportRequest {
    pub fn new(mode: ReportMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

/// Counts over the final finding set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    /// Every severity is present, zero counts included.
    pub by_severity: BTreeMap<Severity, usize>,
    /// Findings per plugin or analyzer.
    pub by_source: BTreeMap<String, usize>,
}

impl ReportSummary {
    pub fn new<'a>(
        findings: &[Finding],
        sources: impl IntoIterator<Item = (&'a str, usize)>,
    ) -> Self {
        let mut by_severity: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        for f in findings {
            *by_severity.entry(f.severity).or_insert(0) += 1;
        }
        Self {
            total: findings.len(),
            by_severity,
            by_source: sources
                .into_iter()
                .map(|(name, count)| (name.to_string(), count))
                .collect(),
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }
}

/// Identity and size of the audited configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSummary {
    pub hostname: String,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub interfaces: usize,
    pub enabled_interfaces: usize,
    pub filter_rules: usize,
    pub enabled_filter_rules: usize,
    pub nat_rules: usize,
}

impl From<&Document> for SystemSummary {
    fn from(doc: &Document) -> Self {
        Self {
            hostname: doc.system.hostname.clone(),
            domain: doc.system.domain.clone(),
            version: doc.system.version.clone(),
            interfaces: doc.interfaces.len(),
            enabled_interfaces: doc.enabled_interfaces().count(),
            filter_rules: doc.filter_rules.len(),
            enabled_filter_rules: doc.enabled_rules().count(),
            nat_rules: doc.nat.outbound.len() + doc.nat.inbound.len(),
        }
    }
}

/// How soon a failing control should be fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemediationPriority {
    Immediate,
    Urgent,
    Planned,
    Routine,
    Optional,
}

impl RemediationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationPriority::Immediate => "immediate",
            RemediationPriority::Urgent => "urgent",
            RemediationPriority::Planned => "planned",
            RemediationPriority::Routine => "routine",
            RemediationPriority::Optional => "optional",
        }
    }
}

impl From<Severity> for RemediationPriority {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Critical => RemediationPriority::Immediate,
            Severity::High => RemediationPriority::Urgent,
            Severity::Medium => RemediationPriority::Planned,
            Severity::Low => RemediationPriority::Routine,
            Severity::Info => RemediationPriority::Optional,
        }
    }
}

/// One remediation item per failing control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub control_id: String,
    pub title: String,
    /// Plugin or analyzer that declares the control.
    pub source: String,
    pub priority: RemediationPriority,
    /// Worst severity among the control's findings.
    pub severity: Severity,
    pub remediation: String,
    /// Affected objects, sorted and deduplicated.
    pub affected: Vec<String>,
}

/// Control coverage of one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub plugin: String,
    pub version: String,
    pub status: SourceStatus,
    pub total_controls: usize,
    pub failing_controls: Vec<String>,
    pub passing_controls: usize,
    /// Share of passing controls, rounded down. `None` when the plugin
    /// evaluated no controls.
    pub compliance_percent: Option<u32>,
}

/// A mode-specific report section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ReportSection {
    Summary(ReportSummary),
    Recommendations(Vec<Recommendation>),
    Compliance(Vec<ComplianceSummary>),
    /// A reframed subset of the report's findings.
    Findings(Vec<Finding>),
}

impl ReportSection {
    /// Findings carried by this section, if it is a finding section.
    pub fn findings(&self) -> Option<&[Finding]> {
        match self {
            ReportSection::Findings(findings) => Some(findings),
            _ => None,
        }
    }
}

/// The fully assembled result of one audit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedReport {
    pub mode: ReportMode,
    pub generated_at: DateTime<Utc>,
    pub system: SystemSummary,
    /// Every finding, in report order.
    pub findings: Vec<Finding>,
    pub score: SecurityScore,
    pub risk_level: RiskLevel,
    pub summary: ReportSummary,
    pub sources: Vec<SourceSummary>,
    pub sections: BTreeMap<String, ReportSection>,
}

impl AggregatedReport {
    /// Whether any finding is high or critical.
    pub fn has_serious_findings(&self) -> bool {
        self.findings.iter().any(|f| f.severity >= Severity::High)
    }
}
