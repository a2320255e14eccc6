//! Perimeter checks based on the SANS firewall checklist.

use lazy_static::lazy_static;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::compliance::{tags, CompliancePlugin, Control, Finding, MetadataKey, Severity};
use crate::document::{Direction, Document};

use super::any_any_pass_rules;

lazy_static! {
    /// Descriptions that say nothing about a rule's purpose.
    static ref PLACEHOLDER_DESCRIPTION: Regex =
        Regex::new(r"(?i)^\s*(new rule|rule\s*\d*|test|temp|tmp|todo|copy|x+)?\s*$").unwrap();
}

static CONTROLS: Lazy<Vec<Control>> = Lazy::new(|| {
    vec![
        Control::new("SANS-001", "No any-to-any pass rules inbound", "firewall", Severity::Critical)
            .describe("Inbound rules on the perimeter must not pass all traffic.")
            .rationale("A pass-all rule turns the firewall into a router.")
            .remediation("Replace the rule with rules for the specific services required."),
        Control::new("SANS-002", "Egress filtering", "firewall", Severity::Medium)
            .describe("Internal networks should only reach the internet on approved ports.")
            .rationale("Unrestricted egress lets malware call home and exfiltrate data.")
            .remediation("Replace allow-all LAN rules with rules for required protocols."),
        Control::new("SANS-003", "Spoofed source filtering", "firewall", Severity::Medium)
            .describe("WAN interfaces must drop private and bogon source addresses.")
            .rationale("Packets from reserved ranges on the internet side are always spoofed.")
            .remediation("Enable block private networks and block bogon networks on WAN."),
        Control::new("SANS-004", "DNSSEC validation", "services", Severity::Low)
            .describe("The DNS resolver should validate DNSSEC signatures.")
            .rationale("Without validation, clients accept forged DNS answers.")
            .remediation("Enable DNSSEC support in the DNS resolver."),
        Control::new("SANS-005", "Rules are documented", "firewall", Severity::Info)
            .describe("Every filter rule should carry a meaningful description.")
            .rationale("Undocumented rules cannot be reviewed or safely removed.")
            .remediation("Describe the purpose and owner of each rule."),
    ]
});

pub struct SansPlugin;

impl SansPlugin {
    fn finding(&self, index: usize) -> Finding {
        Finding::from_control(&CONTROLS[index]).reference("SANS Firewall Checklist")
    }
}

impl CompliancePlugin for SansPlugin {
    fn name(&self) -> &str {
        "sans"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "SANS perimeter firewall checklist"
    }

    fn controls(&self) -> Vec<Control> {
        CONTROLS.clone()
    }

    fn run_checks(&self, doc: &Document) -> Vec<Finding> {
        let mut findings = Vec::new();

        for (index, rule) in any_any_pass_rules(doc) {
            if rule.direction == Direction::Out {
                continue;
            }
            if rule.interfaces().any(|i| doc.is_wan_interface(i)) {
                findings.push(
                    self.finding(0)
                        .affected(rule.locator(index))
                        .tagged(&[tags::WAN, tags::EXPOSURE, tags::FIREWALL_RULE])
                        .meta(MetadataKey::RuleIndex, index.to_string())
                        .meta(MetadataKey::Interface, rule.interface.as_str()),
                );
            } else if rule.protocol.eq_ignore_ascii_case("any") {
                findings.push(
                    self.finding(1)
                        .title(format!("unrestricted egress on {}", rule.interface))
                        .affected(rule.locator(index))
                        .tag(tags::FIREWALL_RULE)
                        .meta(MetadataKey::RuleIndex, index.to_string())
                        .meta(MetadataKey::Interface, rule.interface.as_str()),
                );
            }
        }

        for iface in doc.enabled_interfaces().filter(|i| i.is_wan()) {
            let mut missing = Vec::new();
            if !iface.block_private {
                missing.push("private");
            }
            if !iface.block_bogons {
                missing.push("bogon");
            }
            if missing.is_empty() {
                continue;
            }
            findings.push(
                self.finding(2)
                    .describe(format!(
                        "{} does not block {} source networks.",
                        iface.name,
                        missing.join(" or ")
                    ))
                    .affected(iface.name.as_str())
                    .tagged(&[tags::WAN, tags::INTERFACE])
                    .meta(MetadataKey::Interface, iface.name.as_str()),
            );
        }

        if let Some(dns) = doc.services.dns_resolver.as_ref() {
            if dns.enabled && !dns.dnssec {
                findings.push(
                    self.finding(3)
                        .affected("services.dns_resolver")
                        .tag(tags::SERVICE),
                );
            }
        }

        let undocumented: Vec<String> = doc
            .enabled_rules()
            .filter(|(_, r)| PLACEHOLDER_DESCRIPTION.is_match(&r.description))
            .map(|(i, _)| i.to_string())
            .collect();
        if !undocumented.is_empty() {
            findings.push(
                self.finding(4)
                    .describe(format!(
                        "{} filter rule(s) have no meaningful description: rules {}.",
                        undocumented.len(),
                        undocumented.join(", ")
                    ))
                    .affected("filter")
                    .tag(tags::FIREWALL_RULE)
                    .meta(MetadataKey::RuleIndex, undocumented.join(",")),
            );
        }

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DnsResolver, FilterRule, Interface, RuleAction};

    fn ids(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.control_id.as_str()).collect()
    }

    #[test]
    fn test_placeholder_descriptions() {
        for text in ["", "  ", "New Rule", "rule 12", "TEST", "xxx"] {
            assert!(PLACEHOLDER_DESCRIPTION.is_match(text), "{:?}", text);
        }
        for text in ["Allow HTTPS to web01", "test lab access for QA"] {
            assert!(!PLACEHOLDER_DESCRIPTION.is_match(text), "{:?}", text);
        }
    }

    #[test]
    fn test_any_any_inbound_and_egress() {
        let mut wan_pass = FilterRule::new("wan", RuleAction::Pass);
        wan_pass.description = "legacy allow".to_string();
        let mut lan_pass = FilterRule::new("lan", RuleAction::Pass);
        lan_pass.description = "default allow LAN".to_string();

        let mut wan = Interface::new("wan");
        wan.block_private = true;
        wan.block_bogons = true;

        let doc = Document {
            interfaces: vec![wan, Interface::new("lan")],
            filter_rules: vec![wan_pass, lan_pass],
            ..Default::default()
        };
        let findings = SansPlugin.run_checks(&doc);
        assert_eq!(ids(&findings), vec!["SANS-001", "SANS-002"]);
        assert_eq!(findings[1].title, "unrestricted egress on lan");
        assert!(findings[0].has_tag(tags::WAN));
    }

    #[test]
    fn test_wan_spoofing_and_dnssec() {
        let mut doc = Document {
            interfaces: vec![Interface::new("wan")],
            ..Default::default()
        };
        doc.services.dns_resolver = Some(DnsResolver {
            enabled: true,
            interfaces: Vec::new(),
            dnssec: false,
        });
        let findings = SansPlugin.run_checks(&doc);
        assert_eq!(ids(&findings), vec!["SANS-003", "SANS-004"]);
        assert_eq!(findings[0].description, "wan does not block private or bogon source networks.");
    }

    #[test]
    fn test_undocumented_rules() {
        let mut documented = FilterRule::new("lan", RuleAction::Block);
        documented.description = "Block IoT VLAN".to_string();
        let doc = Document {
            filter_rules: vec![FilterRule::new("lan", RuleAction::Block), documented],
            ..Default::default()
        };
        let findings = SansPlugin.run_checks(&doc);
        assert_eq!(ids(&findings), vec!["SANS-005"]);
        assert_eq!(findings[0].meta_value(MetadataKey::RuleIndex), Some("0"));
    }
}
