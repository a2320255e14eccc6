//! Offensive framing: the same findings, regrouped by how an attacker would use them.

use std::collections::BTreeMap;

use crate::compliance::{sort_findings, tags, Finding, MetadataKey};
use crate::score::determine_security_zone;

use super::controller::SectionContext;
use super::types::{sections, ReportSection};

/// One red section: which findings it selects and how it annotates them.
struct Lens {
    section: &'static str,
    tag: &'static str,
    selects: fn(&Finding) -> bool,
    vector: &'static str,
    notes: &'static str,
}

const LENSES: &[Lens] = &[
    Lens {
        section: sections::WAN_EXPOSED_SERVICES,
        tag: "red:wan-exposed-services",
        selects: |f| f.has_tag(tags::WAN) && f.has_tag(tags::SERVICE),
        vector: "internet",
        notes: "Fingerprint the listener and try default or leaked credentials.",
    },
    Lens {
        section: sections::ATTACK_SURFACES,
        tag: "red:attack-surfaces",
        selects: |f| f.has_tag(tags::WAN) || f.has_tag(tags::EXPOSURE),
        vector: "internet",
        notes: "Reachable from outside the perimeter; map it before anything else.",
    },
    Lens {
        section: sections::WEAK_NAT_RULES,
        tag: "red:weak-nat-rules",
        selects: |f| f.has_tag(tags::NAT),
        vector: "port forward",
        notes: "Forwarded traffic lands directly on an internal host.",
    },
    Lens {
        section: sections::ADMIN_PORTALS,
        tag: "red:admin-portals",
        selects: |f| f.has_tag(tags::ADMIN_PORTAL),
        vector: "management plane",
        notes: "Administrative access yields full control of the appliance.",
    },
    Lens {
        section: sections::ENUMERATION_DATA,
        tag: "red:enumeration-data",
        selects: |f| f.has_tag(tags::ENUMERATION),
        vector: "reconnaissance",
        notes: "Leaks product or topology details useful for targeting.",
    },
];

pub(super) fn build(ctx: &SectionContext<'_>, findings: &[Finding]) -> BTreeMap<String, ReportSection> {
    LENSES
        .iter()
        .map(|lens| {
            let mut selected: Vec<Finding> = findings
                .iter()
                .filter(|f| (lens.selects)(f))
                .map(|f| annotate(ctx, lens, f))
                .collect();
            sort_findings(&mut selected);
            (lens.section.to_string(), ReportSection::Findings(selected))
        })
        .collect()
}

fn annotate(ctx: &SectionContext<'_>, lens: &Lens, finding: &Finding) -> Finding {
    let mut copy = finding.clone().tag(lens.tag);
    copy.set_meta(MetadataKey::AttackVector, lens.vector);
    copy.set_meta(MetadataKey::ExploitNotes, lens.notes);

    let zone = finding
        .meta_value(MetadataKey::Interface)
        .and_then(|names| names.split(',').next())
        .and_then(|name| ctx.doc.interface(name.trim()))
        .map(determine_security_zone);
    if let Some(zone) = zone {
        copy.set_meta(MetadataKey::SecurityZone, zone.as_str());
    }
    copy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::{Control, RunOutput, Severity};
    use crate::document::{Document, Interface};

    fn finding(id: &str, tags: &[&str]) -> Finding {
        Finding::from_control(&Control::new(id, "t", "x", Severity::Medium)).tagged(tags)
    }

    #[test]
    fn test_red_never_adds_findings() {
        let doc = Document {
            interfaces: vec![Interface::new("wan"), Interface::new("lan")],
            ..Default::default()
        };
        let output = RunOutput::default();
        let ctx = SectionContext {
            doc: &doc,
            output: &output,
        };
        let findings = vec![
            finding("A-001", &[tags::WAN, tags::SERVICE])
                .meta(MetadataKey::Interface, "wan"),
            finding("A-002", &[tags::NAT]),
            finding("A-003", &[tags::HARDENING]),
        ];

        let out = build(&ctx, &findings);
        assert_eq!(out.len(), 5);

        let exposed = out[sections::WAN_EXPOSED_SERVICES].findings().unwrap();
        assert_eq!(exposed.len(), 1);
        assert!(exposed[0].has_tag("red:wan-exposed-services"));
        assert_eq!(exposed[0].meta_value(MetadataKey::SecurityZone), Some("untrusted"));
        assert_eq!(exposed[0].meta_value(MetadataKey::AttackVector), Some("internet"));

        let nat = out[sections::WEAK_NAT_RULES].findings().unwrap();
        assert_eq!(nat.len(), 1);
        assert_eq!(nat[0].meta_value(MetadataKey::SecurityZone), None);

        for section in out.values() {
            for f in section.findings().unwrap() {
                assert!(findings.iter().any(|o| o.control_id == f.control_id));
                assert_ne!(f.control_id, "A-003");
            }
        }
    }
}
