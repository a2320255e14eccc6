//! Security scoring and risk assessment.
//!
//! The security score starts at 100 and loses a fixed number of points per
//! finding according to its severity, floored at 0. It depends only on the
//! multiset of severities, never on finding order.

use phf::phf_map;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::compliance::{Finding, Severity};
use crate::document::{ExposedService, Interface};

/// Points deducted per finding.
pub mod weights {
    pub const CRITICAL: i32 = 40;
    pub const HIGH: i32 = 20;
    pub const MEDIUM: i32 = 10;
    pub const LOW: i32 = 5;
    pub const INFO: i32 = 0;
}

/// Grade thresholds (minimum score for each grade).
pub mod grades {
    pub const A_MIN: i32 = 90;
    pub const B_MIN: i32 = 80;
    pub const C_MIN: i32 = 70;
    pub const D_MIN: i32 = 60;
}

pub const MAX_SCORE: i32 = 100;

pub fn severity_weight(severity: Severity) -> i32 {
    match severity {
        Severity::Critical => weights::CRITICAL,
        Severity::High => weights::HIGH,
        Severity::Medium => weights::MEDIUM,
        Severity::Low => weights::LOW,
        Severity::Info => weights::INFO,
    }
}

/// 100 minus the summed weights of all findings, floored at 0.
pub fn calculate_security_score(findings: &[Finding]) -> i32 {
    let deducted: i64 = findings
        .iter()
        .map(|f| i64::from(severity_weight(f.severity)))
        .sum();
    (i64::from(MAX_SCORE) - deducted).max(0) as i32
}

/// Score with its per-severity breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityScore {
    /// 0-100, higher is better
    pub score: i32,
    /// "A" (90+), "B" (80+), "C" (70+), "D" (60+), "F"
    pub grade: String,
    /// Points deducted per severity
    pub breakdown: BTreeMap<Severity, i32>,
    pub findings: usize,
}

impl SecurityScore {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut breakdown = BTreeMap::new();
        for f in findings {
            let points = breakdown.entry(f.severity).or_insert(0i32);
            *points = points.saturating_add(severity_weight(f.severity));
        }
        let score = calculate_security_score(findings);
        Self {
            score,
            grade: calculate_grade(score),
            breakdown,
            findings: findings.len(),
        }
    }

    /// Total points deducted before flooring.
    pub fn total_deducted(&self) -> i32 {
        self.breakdown.values().fold(0i32, |acc, p| acc.saturating_add(*p))
    }
}

/// Determine the letter grade from a score.
fn calculate_grade(score: i32) -> String {
    match score {
        s if s >= grades::A_MIN => "A".to_string(),
        s if s >= grades::B_MIN => "B".to_string(),
        s if s >= grades::C_MIN => "C".to_string(),
        s if s >= grades::D_MIN => "D".to_string(),
        _ => "F".to_string(),
    }
}

/// Qualitative risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "Informational")]
    Informational,
    #[serde(rename = "Low Risk")]
    Low,
    #[serde(rename = "Medium Risk")]
    Medium,
    #[serde(rename = "High Risk")]
    High,
    #[serde(rename = "Critical Risk")]
    Critical,
}

impl RiskLevel {
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Critical => "Critical Risk",
            RiskLevel::High => "High Risk",
            RiskLevel::Medium => "Medium Risk",
            RiskLevel::Low => "Low Risk",
            RiskLevel::Informational => "Informational",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl From<Severity> for RiskLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Critical => RiskLevel::Critical,
            Severity::High => RiskLevel::High,
            Severity::Medium => RiskLevel::Medium,
            Severity::Low => RiskLevel::Low,
            Severity::Info => RiskLevel::Informational,
        }
    }
}

pub fn assess_risk_level(severity: Severity) -> RiskLevel {
    RiskLevel::from(severity)
}

/// Risk of the worst finding; informational when there are none.
pub fn overall_risk(findings: &[Finding]) -> RiskLevel {
    findings
        .iter()
        .map(|f| f.severity)
        .max()
        .map(RiskLevel::from)
        .unwrap_or(RiskLevel::Informational)
}

/// Baseline risk of well-known ports, before accounting for encryption.
static PORT_RISK: phf::Map<u16, RiskLevel> = phf_map! {
    23u16 => RiskLevel::Critical,   // telnet
    445u16 => RiskLevel::Critical,  // smb
    21u16 => RiskLevel::High,       // ftp
    69u16 => RiskLevel::High,       // tftp
    161u16 => RiskLevel::High,      // snmp
    3389u16 => RiskLevel::High,     // rdp
    80u16 => RiskLevel::Medium,     // http
    53u16 => RiskLevel::Medium,     // dns
};

/// Risk of a single reachable service.
pub fn assess_service_risk(service: &ExposedService) -> RiskLevel {
    let base = service
        .port
        .and_then(|p| PORT_RISK.get(&p).copied())
        .unwrap_or(RiskLevel::Low);

    if service.admin {
        let admin = if service.encrypted {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        };
        return base.max(admin);
    }
    base
}

/// Trust zone of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityZone {
    Untrusted,
    Dmz,
    Guest,
    Internal,
    Trusted,
}

impl SecurityZone {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityZone::Untrusted => "untrusted",
            SecurityZone::Dmz => "dmz",
            SecurityZone::Guest => "guest",
            SecurityZone::Internal => "internal",
            SecurityZone::Trusted => "trusted",
        }
    }
}

impl std::fmt::Display for SecurityZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an interface by its role and description.
pub fn determine_security_zone(iface: &Interface) -> SecurityZone {
    if iface.is_wan() {
        return SecurityZone::Untrusted;
    }
    let label = format!("{} {}", iface.name, iface.description).to_lowercase();
    if label.contains("dmz") {
        SecurityZone::Dmz
    } else if label.contains("guest") || label.contains("wifi") {
        SecurityZone::Guest
    } else if label.contains("mgmt") || label.contains("management") {
        SecurityZone::Trusted
    } else {
        SecurityZone::Internal
    }
}
