//! Rendering of aggregated reports.
//!
//! The engine hands an [`AggregatedReport`] to a [`ReportBuilder`]; the
//! builder decides the encoding. Two encodings are provided:
//! - JSON: for programmatic consumption
//! - YAML: for review by people and diffing in version control
//!
//! A colored one-line summary for terminals is written separately by
//! [`write_score_summary`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use colored::*;
use serde::Serialize;

use crate::compliance::{Finding, Severity, SourceSummary};
use crate::error::{PartialReport, ReportError};
use crate::mode::{AggregatedReport, ReportMode, ReportSection, ReportSummary, SystemSummary};
use crate::score::{RiskLevel, SecurityScore};

/// Rendering contract between the engine and its output surfaces.
pub trait ReportBuilder {
    /// The complete report.
    fn build_standard_report(&self, report: &AggregatedReport) -> Result<String, ReportError>;

    /// The report restricted by `options`.
    fn build_custom_report(
        &self,
        report: &AggregatedReport,
        options: &ReportOptions,
    ) -> Result<String, ReportError>;

    /// Identity and size of the audited configuration.
    fn build_system_section(&self, report: &AggregatedReport) -> Result<String, ReportError>;

    /// Score, risk level and severity counts.
    fn build_security_section(&self, report: &AggregatedReport) -> Result<String, ReportError>;

    /// A single mode section by name.
    fn build_mode_section(
        &self,
        report: &AggregatedReport,
        name: &str,
    ) -> Result<String, ReportError>;
}

/// Restrictions applied by [`ReportBuilder::build_custom_report`].
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Mode sections to keep. Empty keeps all of them.
    pub sections: Vec<String>,
    /// Drop findings below this severity, in the main list and in sections.
    pub min_severity: Option<Severity>,
    pub include_sources: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            sections: Vec::new(),
            min_severity: None,
            include_sources: true,
        }
    }
}

/// Encoding used by [`StructuredReportBuilder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            _ => Err(format!("invalid format {:?}, must be 'json' or 'yaml'", s)),
        }
    }
}

/// Serde-backed builder for JSON and YAML.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredReportBuilder {
    format: OutputFormat,
}

impl StructuredReportBuilder {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Whatever a failed run collected.
    pub fn build_partial_report(&self, partial: &PartialReport) -> Result<String, ReportError> {
        self.encode(partial)
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, ReportError> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
            OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?),
        }
    }
}

#[derive(Serialize)]
struct SecuritySection<'a> {
    score: &'a SecurityScore,
    risk_level: RiskLevel,
    summary: &'a ReportSummary,
}

/// Borrowed, filtered view of a report. Field order matches [`AggregatedReport`].
#[derive(Serialize)]
struct CustomReport<'a> {
    mode: ReportMode,
    generated_at: DateTime<Utc>,
    system: &'a SystemSummary,
    findings: Vec<&'a Finding>,
    score: &'a SecurityScore,
    risk_level: RiskLevel,
    summary: &'a ReportSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    sources: Option<&'a [SourceSummary]>,
    sections: BTreeMap<&'a str, ReportSection>,
}

impl ReportBuilder for StructuredReportBuilder {
    fn build_standard_report(&self, report: &AggregatedReport) -> Result<String, ReportError> {
        self.encode(report)
    }

    fn build_custom_report(
        &self,
        report: &AggregatedReport,
        options: &ReportOptions,
    ) -> Result<String, ReportError> {
        if let Some(missing) = options
            .sections
            .iter()
            .find(|name| !report.sections.contains_key(name.as_str()))
        {
            return Err(ReportError::UnknownSection(missing.clone()));
        }

        let keep = |f: &Finding| options.min_severity.map_or(true, |min| f.severity >= min);

        let sections = report
            .sections
            .iter()
            .filter(|(name, _)| {
                options.sections.is_empty() || options.sections.iter().any(|s| s == *name)
            })
            .map(|(name, section)| {
                let section = match section {
                    ReportSection::Findings(findings) => ReportSection::Findings(
                        findings.iter().filter(|f| keep(*f)).cloned().collect(),
                    ),
                    other => other.clone(),
                };
                (name.as_str(), section)
            })
            .collect();

        let custom = CustomReport {
            mode: report.mode,
            generated_at: report.generated_at,
            system: &report.system,
            findings: report.findings.iter().filter(|f| keep(*f)).collect(),
            score: &report.score,
            risk_level: report.risk_level,
            summary: &report.summary,
            sources: options.include_sources.then_some(report.sources.as_slice()),
            sections,
        };
        self.encode(&custom)
    }

    fn build_system_section(&self, report: &AggregatedReport) -> Result<String, ReportError> {
        self.encode(&report.system)
    }

    fn build_security_section(&self, report: &AggregatedReport) -> Result<String, ReportError> {
        self.encode(&SecuritySection {
            score: &report.score,
            risk_level: report.risk_level,
            summary: &report.summary,
        })
    }

    fn build_mode_section(
        &self,
        report: &AggregatedReport,
        name: &str,
    ) -> Result<String, ReportError> {
        let section = report
            .sections
            .get(name)
            .ok_or_else(|| ReportError::UnknownSection(name.to_string()))?;
        self.encode(section)
    }
}

// =============================================================================
// Terminal summary
// =============================================================================

/// Write a one-line score summary to stderr.
pub fn write_score_summary(report: &AggregatedReport) {
    eprint!("  {}", "opnaudit".cyan().bold());
    eprint!("  {} mode", report.mode);
    eprint!("  Score: ");
    write_colored_score(report.score.score);
    eprint!("  Grade: ");
    write_colored_grade(&report.score.grade);
    eprint!("  Risk: ");
    write_colored_risk(report.risk_level);
    eprint!(
        "  {}",
        format!("({} findings)", report.findings.len()).dimmed()
    );
    eprintln!();
}

fn write_colored_score(s: i32) {
    match s {
        s if s >= 90 => eprint!("{}", s.to_string().green().bold()),
        s if s >= 80 => eprint!("{}", s.to_string().green()),
        s if s >= 70 => eprint!("{}", s.to_string().yellow()),
        s if s >= 60 => eprint!("{}", s.to_string().yellow().bold()),
        _ => eprint!("{}", s.to_string().red()),
    }
}

fn write_colored_grade(grade: &str) {
    match grade {
        "A" => eprint!("{}", grade.green().bold()),
        "B" => eprint!("{}", grade.green()),
        "C" => eprint!("{}", grade.yellow()),
        "D" => eprint!("{}", grade.yellow().bold()),
        _ => eprint!("{}", grade.red()),
    }
}

fn write_colored_risk(risk: RiskLevel) {
    let label = risk.label();
    match risk {
        RiskLevel::Critical | RiskLevel::High => eprint!("{}", label.red()),
        RiskLevel::Medium => eprint!("{}", label.yellow()),
        _ => eprint!("{}", label.green()),
    }
}
