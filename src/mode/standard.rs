//! Neutral summary framing.

use std::collections::BTreeMap;

use super::types::{sections, ReportSection, ReportSummary};

pub(super) fn build(summary: &ReportSummary) -> BTreeMap<String, ReportSection> {
    let mut out = BTreeMap::new();
    out.insert(
        sections::SUMMARY.to_string(),
        ReportSection::Summary(summary.clone()),
    );
    out
}
