//! Defensive framing: what to fix first, and how compliant each plugin is.

use std::collections::{BTreeMap, BTreeSet};

use crate::compliance::{ComplianceResult, Finding, MetadataKey, SourceStatus};

use super::controller::SectionContext;
use super::types::{
    sections, ComplianceSummary, Recommendation, RemediationPriority, ReportSection,
};

pub(super) fn build(
    ctx: &SectionContext<'_>,
    findings: &mut [Finding],
) -> BTreeMap<String, ReportSection> {
    for finding in findings.iter_mut() {
        let priority = RemediationPriority::from(finding.severity);
        finding.set_meta(MetadataKey::RemediationPriority, priority.as_str());
    }

    let mut out = BTreeMap::new();
    out.insert(
        sections::RECOMMENDATIONS.to_string(),
        ReportSection::Recommendations(recommendations(ctx.output.results())),
    );
    out.insert(
        sections::COMPLIANCE.to_string(),
        ReportSection::Compliance(compliance(ctx)),
    );
    out
}

/// One recommendation per failing control, most urgent first.
fn recommendations<'a>(
    results: impl Iterator<Item = &'a ComplianceResult>,
) -> Vec<Recommendation> {
    let mut out = Vec::new();
    for result in results {
        for control_id in result.failing_controls() {
            let Some(control) = result.controls.iter().find(|c| c.id == control_id) else {
                continue;
            };
            let matching: Vec<&Finding> = result
                .findings
                .iter()
                .filter(|f| f.control_id == control_id)
                .collect();
            let severity = matching
                .iter()
                .map(|f| f.severity)
                .max()
                .unwrap_or(control.severity);
            let affected: BTreeSet<&str> = matching
                .iter()
                .map(|f| f.affected_object.as_str())
                .filter(|a| !a.is_empty())
                .collect();

            out.push(Recommendation {
                control_id: control.id.clone(),
                title: control.title.clone(),
                source: result.plugin_name.clone(),
                priority: RemediationPriority::from(severity),
                severity,
                remediation: control.remediation.clone(),
                affected: affected.into_iter().map(str::to_string).collect(),
            });
        }
    }
    out.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.control_id.cmp(&b.control_id))
            .then_with(|| a.source.cmp(&b.source))
    });
    out
}

fn compliance(ctx: &SectionContext<'_>) -> Vec<ComplianceSummary> {
    ctx.output
        .plugins
        .iter()
        .map(|result| {
            let status = ctx
                .output
                .sources
                .iter()
                .find(|s| s.name == result.plugin_name)
                .map(|s| s.status)
                .unwrap_or(SourceStatus::Completed);
            let failing: Vec<String> = result
                .failing_controls()
                .into_iter()
                .map(str::to_string)
                .collect();
            let total = result.controls.len();
            let passing = total.saturating_sub(failing.len());
            let percent = (total > 0).then(|| (passing * 100 / total) as u32);

            ComplianceSummary {
                plugin: result.plugin_name.clone(),
                version: result.plugin_version.clone(),
                status,
                total_controls: total,
                failing_controls: failing,
                passing_controls: passing,
                compliance_percent: percent,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::{Control, Severity};

    fn result() -> ComplianceResult {
        let noisy = Control::new("P-001", "Noisy", "x", Severity::Low).remediation("quiet it");
        let bad = Control::new("P-002", "Bad", "x", Severity::High).remediation("fix it");
        let fine = Control::new("P-003", "Fine", "x", Severity::Medium);
        ComplianceResult {
            plugin_name: "p".to_string(),
            plugin_version: "1.0.0".to_string(),
            findings: vec![
                Finding::from_control(&noisy).affected("b"),
                Finding::from_control(&noisy).affected("a"),
                Finding::from_control(&noisy).affected("a"),
                Finding::from_control(&bad).affected("wan"),
            ],
            controls: vec![noisy, bad, fine],
        }
    }

    #[test]
    fn test_recommendations_one_per_failing_control() {
        let result = result();
        let recs = recommendations(std::iter::once(&result));

        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].control_id, "P-002");
        assert_eq!(recs[0].priority, RemediationPriority::Urgent);
        assert_eq!(recs[0].remediation, "fix it");
        assert_eq!(recs[1].affected, vec!["a", "b"]);
        assert_eq!(recs[1].priority, RemediationPriority::Routine);
    }
}
