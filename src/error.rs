//! Error taxonomy for the audit engine.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compliance::{Finding, SourceSummary};
use crate::mode::ReportMode;

/// A plugin's own setup is invalid. Excludes only that plugin.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("plugin name is empty")]
    EmptyName,
    #[error("plugin declares no controls")]
    NoControls,
    #[error("plugin name {0:?} is reserved")]
    ReservedName(String),
    #[error("duplicate control id {0}")]
    DuplicateControl(String),
    #[error("missing required file: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("{0}")]
    Invalid(String),
}

/// Failure to add a plugin to the registry.
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("plugin already registered: {0}")]
    Duplicate(String),
    #[error("plugin {name} failed validation: {source}")]
    Validation {
        name: String,
        #[source]
        source: ValidationError,
    },
    #[error("failed to scan plugin directory {}: {message}", path.display())]
    Scan { path: PathBuf, message: String },
    #[error("failed to load plugin module {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("plugin module {} does not export {symbol}", path.display())]
    MissingSymbol {
        path: PathBuf,
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },
    #[error("plugin module {} uses plugin ABI {found}, host expects {expected}", path.display())]
    AbiMismatch {
        path: PathBuf,
        expected: u32,
        found: u32,
    },
    #[error("plugin module {} was built for opnaudit {found}, host is {expected}", path.display())]
    VersionMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
    #[error("plugin module {} panicked while constructing its plugin", path.display())]
    ConstructorPanicked { path: PathBuf },
}

/// A plugin or analyzer misbehaved during a run. Recovered and reported as
/// a finding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("{unit} panicked: {message}")]
    Panicked { unit: String, message: String },
    #[error("{unit} did not finish within {timeout:?}")]
    TimedOut { unit: String, timeout: Duration },
    #[error("{unit} returned a malformed finding: {reason}")]
    Malformed { unit: String, reason: String },
    #[error("{unit} was aborted before finishing")]
    Aborted { unit: String },
    #[error("{unit} did not finish before the run was cancelled")]
    Cancelled { unit: String },
}

impl AnalysisError {
    pub fn unit(&self) -> &str {
        match self {
            AnalysisError::Panicked { unit, .. }
            | AnalysisError::TimedOut { unit, .. }
            | AnalysisError::Malformed { unit, .. }
            | AnalysisError::Aborted { unit }
            | AnalysisError::Cancelled { unit } => unit,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Panicked { .. } => "panicked",
            AnalysisError::TimedOut { .. } => "timed_out",
            AnalysisError::Malformed { .. } => "malformed",
            AnalysisError::Aborted { .. } => "aborted",
            AnalysisError::Cancelled { .. } => "cancelled",
        }
    }
}

/// Whatever a terminated run managed to collect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialReport {
    /// Findings from every unit that finished plus an engine finding for
    /// each unit that did not, in report order.
    pub findings: Vec<Finding>,
    pub sources: Vec<SourceSummary>,
    pub completed_units: usize,
    pub total_units: usize,
}

/// The run could not produce a complete report.
#[derive(Error, Debug)]
pub enum AggregationError {
    #[error(
        "analysis cancelled after {} of {} units completed",
        .partial.completed_units,
        .partial.total_units
    )]
    Cancelled { partial: Box<PartialReport> },
    #[error(
        "analysis exceeded {timeout:?} after {} of {} units completed",
        .partial.completed_units,
        .partial.total_units
    )]
    TimedOut {
        timeout: Duration,
        partial: Box<PartialReport>,
    },
    #[error("{mode} mode has no section named {section:?}")]
    UnsupportedSection {
        mode: ReportMode,
        section: String,
        partial: Box<PartialReport>,
    },
}

impl AggregationError {
    pub fn partial(&self) -> &PartialReport {
        match self {
            AggregationError::Cancelled { partial }
            | AggregationError::TimedOut { partial, .. }
            | AggregationError::UnsupportedSection { partial, .. } => partial,
        }
    }

    pub fn into_partial(self) -> PartialReport {
        match self {
            AggregationError::Cancelled { partial }
            | AggregationError::TimedOut { partial, .. }
            | AggregationError::UnsupportedSection { partial, .. } => *partial,
        }
    }
}

/// Lookup of a control a plugin does not declare.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("control {id} not found in {plugin}")]
pub struct ControlNotFound {
    pub plugin: String,
    pub id: String,
}

/// Rendering failure in a report builder.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("yaml encoding failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("report has no section named {0:?}")]
    UnknownSection(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_message() {
        let err = RegistrationError::Duplicate("stig".to_string());
        assert_eq!(err.to_string(), "plugin already registered: stig");
    }

    #[test]
    fn test_partial_survives_error() {
        let partial = PartialReport {
            completed_units: 2,
            total_units: 5,
            ..Default::default()
        };
        let err = AggregationError::Cancelled {
            partial: Box::new(partial),
        };
        assert_eq!(err.to_string(), "analysis cancelled after 2 of 5 units completed");
        assert_eq!(err.into_partial().total_units, 5);
    }
}
