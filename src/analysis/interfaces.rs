//! Unused interface detection.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;

use crate::compliance::{tags, Control, Finding, MetadataKey, Severity};
use crate::document::Document;

use super::Analyzer;

pub const UNUSED_INTERFACE: &str = "IFACE-001";

static UNUSED_INTERFACE_CONTROL: Lazy<Control> = Lazy::new(|| {
    Control::new(UNUSED_INTERFACE, "Unused interface", "interfaces", Severity::Low)
        .describe("An enabled interface is not referenced by any rule or service.")
        .rationale("Enabled but unused interfaces widen the attack surface without purpose.")
        .remediation("Disable the interface or remove its assignment.")
});

pub struct InterfaceAnalyzer;

impl Analyzer for InterfaceAnalyzer {
    fn name(&self) -> &'static str {
        "interfaces"
    }

    fn controls(&self) -> Vec<Control> {
        vec![UNUSED_INTERFACE_CONTROL.clone()]
    }

    fn analyze(&self, doc: &Document) -> Vec<Finding> {
        let referenced = referenced_interfaces(doc);

        doc.enabled_interfaces()
            .filter(|iface| !referenced.contains(iface.name.as_str()))
            .map(|iface| {
                let mut finding = Finding::from_control(&UNUSED_INTERFACE_CONTROL)
                    .title(format!("unused interface: {}", iface.name))
                    .describe(format!(
                        "Interface {} is enabled but no filter rule, NAT rule or service binding references it.",
                        iface.name
                    ))
                    .affected(iface.name.as_str())
                    .tag(tags::INTERFACE)
                    .meta(MetadataKey::Interface, iface.name.as_str());
                if iface.is_wan() {
                    finding = finding.tag(tags::WAN);
                }
                finding
            })
            .collect()
    }
}

/// Every interface named by a rule or an explicit service binding.
///
/// Services bound to all interfaces (an empty list) reference none.
fn referenced_interfaces(doc: &Document) -> BTreeSet<&str> {
    let mut names = BTreeSet::new();

    for rule in &doc.filter_rules {
        names.extend(rule.interfaces());
    }
    for rule in doc.nat.outbound.iter().chain(doc.nat.inbound.iter()) {
        names.insert(rule.interface.as_str());
    }

    let services = &doc.services;
    names.extend(services.dhcp.iter().map(|s| s.interface.as_str()));
    names.extend(services.vpn.iter().map(|v| v.interface.as_str()));
    if let Some(dns) = &services.dns_resolver {
        names.extend(dns.interfaces.iter().map(String::as_str));
    }
    if let Some(snmp) = &services.snmp {
        names.extend(snmp.interfaces.iter().map(String::as_str));
    }

    names
}
