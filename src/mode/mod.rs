//! Report modes and the controller that assembles them.
//!
//! Every mode runs the same checks over the same document. Modes differ only
//! in the sections built on top of the merged finding set:
//!
//! - `standard`: severity and source counts.
//! - `blue`: remediation priorities and per-plugin compliance.
//! - `red`: findings regrouped by attack surface.

mod blue;
mod controller;
mod red;
mod standard;
pub mod types;

pub use controller::ModeController;
pub use types::{
    sections, AggregatedReport, ComplianceSummary, Recommendation, RemediationPriority,
    ReportMode, ReportRequest, ReportSection, ReportSummary, SystemSummary,
};
