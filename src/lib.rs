//! opnaudit - compliance and audit engine for firewall appliance configurations.
//!
//! opnaudit evaluates an already-parsed appliance configuration against
//! compliance plugins and built-in analyzers, scores the merged findings,
//! and frames them as a standard, blue-team or red-team report.
//!
//! # Architecture
//!
//! - `document`: Immutable configuration model consumed by every check
//! - `compliance`: Finding and control types, the plugin contract, the
//!   registry, the dynamic loader and the concurrent plugin manager
//! - `plugins`: Compliance plugins compiled into the binary
//! - `analysis`: Built-in analyzers (rule shadowing, unused interfaces,
//!   security posture, performance)
//! - `score`: Security score, grades and risk levels
//! - `mode`: Mode controller and report sections
//! - `report`: Report builders (JSON, YAML)
//! - `config`: YAML audit configuration
//!
//! # Writing a Plugin
//!
//! Implement [`CompliancePlugin`] and either register it with a
//! [`PluginRegistry`] or build it as a `cdylib` exported with
//! [`export_plugin!`] and drop it in the plugin directory.

pub mod analysis;
pub mod cli;
pub mod compliance;
pub mod config;
pub mod document;
pub mod error;
pub mod logging;
pub mod mode;
pub mod plugins;
pub mod report;
pub mod score;

/// Engine version. Dynamic plugins must be built against the same one.
pub const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub use analysis::{builtin_analyzers, Analyzer, AnalyzerOptions};
pub use compliance::{
    CompliancePlugin, ComplianceResult, Control, Finding, MetadataKey, PluginManager,
    PluginRegistry, Severity,
};
pub use config::AuditConfig;
pub use document::Document;
pub use error::{AggregationError, AnalysisError, PartialReport, RegistrationError};
pub use mode::{AggregatedReport, ModeController, ReportMode, ReportRequest};
pub use report::{OutputFormat, ReportBuilder, ReportOptions, StructuredReportBuilder};
pub use score::SecurityScore;
