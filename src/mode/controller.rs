//! Top-level orchestration: run, merge, score, frame.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::analysis::Analyzer;
use crate::compliance::{Finding, PluginManager, RunOutput};
use crate::document::Document;
use crate::error::AggregationError;
use crate::score::{overall_risk, SecurityScore};

use super::types::{AggregatedReport, ReportMode, ReportRequest, ReportSection, ReportSummary, SystemSummary};
use super::{blue, red, standard};

/// Inputs a section builder may draw on.
pub(crate) struct SectionContext<'a> {
    pub doc: &'a Document,
    pub output: &'a RunOutput,
}

/// Builds reports in any mode from one manager and analyzer set.
pub struct ModeController {
    manager: PluginManager,
    analyzers: Vec<Arc<dyn Analyzer>>,
}

impl ModeController {
    pub fn new(manager: PluginManager, analyzers: Vec<Arc<dyn Analyzer>>) -> Self {
        Self { manager, analyzers }
    }

    pub fn manager(&self) -> &PluginManager {
        &self.manager
    }

    /// Run every check against `doc` and assemble the requested report.
    ///
    /// The pipeline is the same for every mode until section assembly.
    pub async fn generate(
        &self,
        doc: Arc<Document>,
        request: &ReportRequest,
        cancel: &CancellationToken,
    ) -> Result<AggregatedReport, AggregationError> {
        let output = self
            .manager
            .run(Arc::clone(&doc), &self.analyzers, cancel)
            .await?;

        let mode = request.mode;
        if let Some(section) = request.sections.iter().find(|s| !mode.supports(s)) {
            return Err(AggregationError::UnsupportedSection {
                mode,
                section: section.clone(),
                partial: Box::new(output.to_partial()),
            });
        }

        let mut findings = output.findings();
        let score = SecurityScore::from_findings(&findings);
        let risk_level = overall_risk(&findings);
        let summary = ReportSummary::new(
            &findings,
            output
                .results()
                .map(|r| (r.plugin_name.as_str(), r.findings.len())),
        );

        let ctx = SectionContext {
            doc: &doc,
            output: &output,
        };
        let mut sections = build_sections(mode, &ctx, &mut findings, &summary);
        if !request.sections.is_empty() {
            sections.retain(|name, _| request.sections.iter().any(|s| s == name));
        }
        debug!(%mode, findings = findings.len(), sections = sections.len(), "report assembled");

        Ok(AggregatedReport {
            mode,
            generated_at: request.generated_at.unwrap_or_else(Utc::now),
            system: SystemSummary::from(doc.as_ref()),
            findings,
            score,
            risk_level,
            summary,
            sources: output.sources.clone(),
            sections,
        })
    }

    /// Blocking wrapper around [`generate`](Self::generate) for synchronous callers.
    ///
    /// Returns as soon as the report is assembled. Checks abandoned by a
    /// timeout keep running on detached threads until they return.
    pub fn generate_blocking(
        &self,
        doc: Arc<Document>,
        request: &ReportRequest,
    ) -> anyhow::Result<AggregatedReport> {
        let runtime = tokio::runtime::Runtime::new()?;
        let result = runtime.block_on(self.generate(doc, request, &CancellationToken::new()));
        runtime.shutdown_background();
        Ok(result?)
    }
}

fn build_sections(
    mode: ReportMode,
    ctx: &SectionContext<'_>,
    findings: &mut [Finding],
    summary: &ReportSummary,
) -> BTreeMap<String, ReportSection> {
    match mode {
        ReportMode::Standard => standard::build(summary),
        ReportMode::Blue => blue::build(ctx, findings),
        ReportMode::Red => red::build(ctx, findings),
    }
}
