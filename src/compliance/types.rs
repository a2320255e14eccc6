//! Core types shared by plugins, analyzers and the report pipeline.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Severity levels for controls and findings.
///
/// Ordered from least to most severe so that `max()` yields the worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All severities, most severe first.
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "info" => Ok(Severity::Info),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

/// Tag vocabulary used by mode section builders to select findings.
pub mod tags {
    pub const WAN: &str = "wan";
    pub const NAT: &str = "nat";
    pub const SERVICE: &str = "service";
    pub const ADMIN_PORTAL: &str = "admin-portal";
    pub const ENUMERATION: &str = "enumeration";
    pub const EXPOSURE: &str = "exposure";
    pub const FIREWALL_RULE: &str = "firewall-rule";
    pub const INTERFACE: &str = "interface";
    pub const HARDENING: &str = "hardening";
    pub const PERFORMANCE: &str = "performance";
    pub const LOGGING: &str = "logging";
    pub const ENGINE: &str = "engine";
}

/// A compliance requirement declared by a plugin or analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    /// Unique within the owning plugin, `PLUGIN-NNN`.
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    /// Default severity for findings against this control.
    pub severity: Severity,
    pub rationale: String,
    pub remediation: String,
}

impl Control {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        category: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            category: category.into(),
            severity,
            rationale: String::new(),
            remediation: String::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = remediation.into();
        self
    }
}

/// Closed vocabulary of finding metadata keys.
///
/// Keys are shared across modes; a typo is a compile error rather than a
/// silently ignored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetadataKey {
    /// Justification for a severity differing from the control default.
    SeverityOverride,
    /// Severity a finding carried before it was normalized to its control.
    NormalizedFrom,
    /// Interface(s) the finding concerns, comma separated.
    Interface,
    /// Index of a filter or NAT rule.
    RuleIndex,
    /// Rule that shadows or overrides the affected rule.
    ShadowedBy,
    /// Exposed service label(s).
    Service,
    /// Blue mode: remediation urgency.
    RemediationPriority,
    /// Red mode: exploitation guidance.
    ExploitNotes,
    /// Red mode: where an attacker would reach the finding from.
    AttackVector,
    /// Red mode: security zone of the affected interface.
    SecurityZone,
    /// Engine diagnostics: plugin or analyzer that failed.
    FailedUnit,
    /// Engine diagnostics: panicked, timed_out, malformed.
    FailureKind,
    /// Engine diagnostics: control a malformed finding referenced.
    OriginalControl,
    /// Engine diagnostics: title of a malformed finding.
    OriginalTitle,
}

/// Ordered key/value bag attached to a finding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<MetadataKey, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: MetadataKey, value: impl Into<String>) -> Option<String> {
        self.0.insert(key, value.into())
    }

    pub fn get(&self, key: MetadataKey) -> Option<&str> {
        self.0.get(&key).map(String::as_str)
    }

    pub fn contains(&self, key: MetadataKey) -> bool {
        self.0.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetadataKey, &String)> {
        self.0.iter()
    }
}

/// A single concrete result of evaluating one control against a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub control_id: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    /// Free-form locator: interface name, rule index, service.
    pub affected_object: String,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Absent and empty are distinct and both survive serialization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Finding {
    /// Start a finding for `control` with the control's severity and text.
    pub fn from_control(control: &Control) -> Self {
        Self {
            control_id: control.id.clone(),
            severity: control.severity,
            title: control.title.clone(),
            description: control.description.clone(),
            affected_object: String::new(),
            references: Vec::new(),
            tags: BTreeSet::new(),
            metadata: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn affected(mut self, object: impl Into<String>) -> Self {
        self.affected_object = object.into();
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.references.push(reference.into());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.insert(tag.to_string());
        self
    }

    pub fn tagged(mut self, tags: &[&str]) -> Self {
        self.tags.extend(tags.iter().map(|t| t.to_string()));
        self
    }

    pub fn meta(mut self, key: MetadataKey, value: impl Into<String>) -> Self {
        self.set_meta(key, value);
        self
    }

    pub fn set_meta(&mut self, key: MetadataKey, value: impl Into<String>) {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key, value);
    }

    pub fn meta_value(&self, key: MetadataKey) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.get(key))
    }

    /// Report a severity other than the control default, recording why.
    pub fn override_severity(mut self, severity: Severity, reason: impl Into<String>) -> Self {
        self.severity = severity;
        self.set_meta(MetadataKey::SeverityOverride, reason);
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Total ordering used for reproducible report output.
    pub fn report_order(a: &Finding, b: &Finding) -> std::cmp::Ordering {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.control_id.cmp(&b.control_id))
            .then_with(|| a.affected_object.cmp(&b.affected_object))
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.description.cmp(&b.description))
    }
}

/// Sort findings by severity (descending), then control ID.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(Finding::report_order);
}

/// Output of one plugin for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResult {
    pub plugin_name: String,
    pub plugin_version: String,
    pub controls: Vec<Control>,
    pub findings: Vec<Finding>,
}

impl ComplianceResult {
    /// IDs of controls with at least one finding, sorted.
    pub fn failing_controls(&self) -> BTreeSet<&str> {
        self.findings.iter().map(|f| f.control_id.as_str()).collect()
    }
}

/// What produced a set of findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Plugin,
    Analyzer,
    Engine,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Plugin => write!(f, "plugin"),
            SourceKind::Analyzer => write!(f, "analyzer"),
            SourceKind::Engine => write!(f, "engine"),
        }
    }
}

/// How a plugin or analyzer finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Completed,
    Failed,
    TimedOut,
    /// The run ended before this source finished.
    Cancelled,
}

/// Per-source bookkeeping included in reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub name: String,
    pub version: String,
    pub kind: SourceKind,
    pub status: SourceStatus,
    pub controls: usize,
    pub findings: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control() -> Control {
        Control::new("TEST-001", "Test control", "testing", Severity::Medium)
            .describe("A control used in tests")
            .remediation("Fix it")
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low > Severity::Info);
        assert_eq!(Severity::ALL.iter().max(), Some(&Severity::Critical));
        assert_eq!("HIGH".parse::<Severity>(), Ok(Severity::High));
        assert!("severe".parse::<Severity>().is_err());
    }

    #[test]
    fn test_finding_from_control() {
        let finding = Finding::from_control(&control()).affected("lan");
        assert_eq!(finding.control_id, "TEST-001");
        assert_eq!(finding.severity, Severity::Medium);
        assert_eq!(finding.affected_object, "lan");
        assert!(finding.metadata.is_none());
    }

    #[test]
    fn test_override_records_reason() {
        let finding = Finding::from_control(&control())
            .override_severity(Severity::High, "exposed to WAN");
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(
            finding.meta_value(MetadataKey::SeverityOverride),
            Some("exposed to WAN")
        );
    }

    #[test]
    fn test_json_round_trip_populated() {
        let finding = Finding::from_control(&control())
            .affected("filter rule #2 on wan/in")
            .reference("CIS 4.1")
            .reference("NIST AC-4")
            .tagged(&[tags::WAN, tags::FIREWALL_RULE])
            .meta(MetadataKey::RuleIndex, "2")
            .meta(MetadataKey::Interface, "wan");

        let json = serde_json::to_string(&finding).unwrap();
        let back: Finding = serde_json::from_str(&json).unwrap();
        assert_eq!(back, finding);
        assert!(json.contains("\"RuleIndex\":\"2\""));
    }

    #[test]
    fn test_json_round_trip_empty_vs_absent_metadata() {
        let absent = Finding::from_control(&control());
        let json = serde_json::to_string(&absent).unwrap();
        assert!(!json.contains("metadata"));
        let back: Finding = serde_json::from_str(&json).unwrap();
        assert_eq!(back.metadata, None);

        let mut empty = Finding::from_control(&control());
        empty.metadata = Some(Metadata::new());
        let json = serde_json::to_string(&empty).unwrap();
        assert!(json.contains("\"metadata\":{}"));
        let back: Finding = serde_json::from_str(&json).unwrap();
        assert_eq!(back.metadata, Some(Metadata::new()));
        assert_eq!(back, empty);
    }

    #[test]
    fn test_report_order() {
        let low = Finding::from_control(&Control::new("B-001", "b", "x", Severity::Low));
        let high_b = Finding::from_control(&Control::new("B-002", "b", "x", Severity::High));
        let high_a = Finding::from_control(&Control::new("A-009", "a", "x", Severity::High));

        let mut findings = vec![low.clone(), high_b.clone(), high_a.clone()];
        sort_findings(&mut findings);
        assert_eq!(findings, vec![high_a, high_b, low]);
    }
}
