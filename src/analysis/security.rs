//! Security posture checks.
//!
//! Each entry of [`CHECKS`] is independent and yields at most one finding.
//! The catalog is evaluated in parallel and the result reordered by
//! catalog position.

use once_cell::sync::Lazy;
use rayon::prelude::*;

use crate::compliance::{tags, Control, Finding, MetadataKey, Severity};
use crate::document::{Document, RuleAction};
use crate::score::{assess_service_risk, RiskLevel};

use super::Analyzer;

/// Community strings that are either empty or shipped as defaults.
const WEAK_COMMUNITIES: &[&str] = &["", "public", "private"];

static INSECURE_GUI: Lazy<Control> = Lazy::new(|| {
    Control::new("SEC-001", "Web GUI served over HTTP", "management", Severity::High)
        .describe("The administration interface accepts unencrypted HTTP.")
        .rationale("Credentials and session cookies cross the network in clear text.")
        .remediation("Switch the web GUI protocol to HTTPS.")
});

static WEAK_SNMP: Lazy<Control> = Lazy::new(|| {
    Control::new("SEC-002", "Default SNMP community", "services", Severity::High)
        .describe("SNMP is enabled with a blank or well-known community string.")
        .rationale("Default communities let anyone enumerate the device's configuration.")
        .remediation("Set a unique community string or disable SNMP.")
});

static WAN_ANY_ANY: Lazy<Control> = Lazy::new(|| {
    Control::new("SEC-003", "Any-to-any pass rule on WAN", "firewall", Severity::Critical)
        .describe("A WAN filter rule passes traffic from any source to any destination.")
        .rationale("The firewall stops filtering inbound traffic on its untrusted side.")
        .remediation("Restrict the rule to the specific destinations and ports required.")
});

static WAN_OPEN_FORWARD: Lazy<Control> = Lazy::new(|| {
    Control::new("SEC-004", "Unrestricted port forward on WAN", "nat", Severity::High)
        .describe("An inbound NAT rule on a WAN interface accepts any source address.")
        .rationale("The forwarded internal service is reachable from the whole internet.")
        .remediation("Limit the port forward's source to known addresses.")
});

static OFFLOAD_DISABLED: Lazy<Control> = Lazy::new(|| {
    Control::new("SEC-005", "Checksum or segmentation offloading disabled", "hardening", Severity::Low)
        .describe("Hardware checksum or TCP segmentation offloading is explicitly turned off.")
        .rationale("Non-default offload settings often date from a workaround that was never revisited.")
        .remediation("Re-enable offloading unless a documented driver issue requires it.")
});

static WAN_RISKY_SERVICE: Lazy<Control> = Lazy::new(|| {
    Control::new("SEC-006", "High-risk service exposed on WAN", "services", Severity::High)
        .describe("A service with high inherent risk is reachable from a WAN interface.")
        .rationale("Exposed management and legacy services are primary intrusion vectors.")
        .remediation("Block the service on WAN or restrict it to a VPN.")
});

/// Evidence for a failed check.
struct Evidence {
    affected: String,
    description: String,
    meta: Vec<(MetadataKey, String)>,
    extra_tags: Vec<&'static str>,
}

impl Evidence {
    fn new(affected: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            affected: affected.into(),
            description: description.into(),
            meta: Vec::new(),
            extra_tags: Vec::new(),
        }
    }

    fn meta(mut self, key: MetadataKey, value: impl Into<String>) -> Self {
        self.meta.push((key, value.into()));
        self
    }
}

struct PostureCheck {
    control: &'static Lazy<Control>,
    tags: &'static [&'static str],
    evaluate: fn(&Document) -> Option<Evidence>,
}

static CHECKS: &[PostureCheck] = &[
    PostureCheck {
        control: &INSECURE_GUI,
        tags: &[tags::ADMIN_PORTAL, tags::SERVICE],
        evaluate: insecure_gui,
    },
    PostureCheck {
        control: &WEAK_SNMP,
        tags: &[tags::ENUMERATION, tags::SERVICE],
        evaluate: weak_snmp,
    },
    PostureCheck {
        control: &WAN_ANY_ANY,
        tags: &[tags::WAN, tags::EXPOSURE, tags::FIREWALL_RULE],
        evaluate: wan_any_any,
    },
    PostureCheck {
        control: &WAN_OPEN_FORWARD,
        tags: &[tags::WAN, tags::NAT, tags::EXPOSURE],
        evaluate: wan_open_forward,
    },
    PostureCheck {
        control: &OFFLOAD_DISABLED,
        tags: &[tags::HARDENING],
        evaluate: offloading_disabled,
    },
    PostureCheck {
        control: &WAN_RISKY_SERVICE,
        tags: &[tags::WAN, tags::SERVICE, tags::EXPOSURE],
        evaluate: wan_risky_service,
    },
];

pub struct SecurityAnalyzer;

impl Analyzer for SecurityAnalyzer {
    fn name(&self) -> &'static str {
        "security"
    }

    fn controls(&self) -> Vec<Control> {
        CHECKS.iter().map(|c| (**c.control).clone()).collect()
    }

    fn analyze(&self, doc: &Document) -> Vec<Finding> {
        let mut results: Vec<(usize, Finding)> = CHECKS
            .par_iter()
            .enumerate()
            .filter_map(|(pos, check)| {
                let evidence = (check.evaluate)(doc)?;
                let mut finding = Finding::from_control(check.control)
                    .describe(evidence.description)
                    .affected(evidence.affected)
                    .tagged(check.tags)
                    .tagged(&evidence.extra_tags);
                for (key, value) in evidence.meta {
                    finding.set_meta(key, value);
                }
                Some((pos, finding))
            })
            .collect();
        results.sort_by_key(|(pos, _)| *pos);
        results.into_iter().map(|(_, f)| f).collect()
    }
}

fn insecure_gui(doc: &Document) -> Option<Evidence> {
    let gui = &doc.system.webgui;
    if !gui.protocol.eq_ignore_ascii_case("http") {
        return None;
    }
    let port = gui.port.unwrap_or(80);
    Some(
        Evidence::new(
            "system.webgui",
            format!("The web GUI listens for plain HTTP on port {}.", port),
        )
        .meta(MetadataKey::Service, format!("webgui (tcp/{})", port)),
    )
}

fn weak_snmp(doc: &Document) -> Option<Evidence> {
    let snmp = doc.services.snmp.as_ref().filter(|s| s.enabled)?;
    let community = snmp.community.trim().to_ascii_lowercase();
    if !WEAK_COMMUNITIES.contains(&community.as_str()) {
        return None;
    }
    let shown = if community.is_empty() {
        "a blank community string".to_string()
    } else {
        format!("the default community {:?}", community)
    };
    Some(
        Evidence::new("services.snmp", format!("SNMP is enabled with {}.", shown))
            .meta(MetadataKey::Service, "snmp (udp/161)"),
    )
}

fn wan_any_any(doc: &Document) -> Option<Evidence> {
    let offending: Vec<(usize, &crate::document::FilterRule)> = doc
        .enabled_rules()
        .filter(|(_, r)| {
            r.action == RuleAction::Pass
                && r.source.is_any()
                && r.destination.is_any()
                && r.interfaces().any(|i| doc.is_wan_interface(i))
        })
        .collect();
    let (first_index, first) = *offending.first()?;
    let indices: Vec<String> = offending.iter().map(|(i, _)| i.to_string()).collect();
    Some(
        Evidence::new(
            first.locator(first_index),
            format!(
                "{} WAN pass rule(s) match any source and any destination (rules {}).",
                offending.len(),
                indices.join(", ")
            ),
        )
        .meta(MetadataKey::RuleIndex, indices.join(","))
        .meta(MetadataKey::Interface, first.interface.as_str()),
    )
}

fn wan_open_forward(doc: &Document) -> Option<Evidence> {
    let (index, rule) = doc
        .nat
        .inbound
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.disabled)
        .find(|(_, r)| doc.is_wan_interface(&r.interface) && r.source.is_any())?;
    Some(
        Evidence::new(
            rule.locator("inbound", index),
            format!(
                "Port forward to {} accepts connections from any source.",
                rule.target.as_deref().unwrap_or("an internal host")
            ),
        )
        .meta(MetadataKey::RuleIndex, index.to_string())
        .meta(MetadataKey::Interface, rule.interface.as_str()),
    )
}

fn offloading_disabled(doc: &Document) -> Option<Evidence> {
    let system = &doc.system;
    let mut disabled = Vec::new();
    if system.disable_checksum_offloading {
        disabled.push("checksum");
    }
    if system.disable_segmentation_offloading {
        disabled.push("segmentation");
    }
    if disabled.is_empty() {
        return None;
    }
    Some(Evidence::new(
        "system",
        format!("Hardware {} offloading is disabled.", disabled.join(" and ")),
    ))
}

fn wan_risky_service(doc: &Document) -> Option<Evidence> {
    let risky: Vec<_> = doc
        .exposed_services()
        .into_iter()
        .filter(|s| doc.is_wan_interface(&s.interface))
        .filter(|s| s.forwarded || doc.allows_inbound(&s.interface, &s.protocol, s.port))
        .filter(|s| assess_service_risk(s) >= RiskLevel::High)
        .collect();
    let first = risky.first()?;

    let labels: Vec<String> = risky.iter().map(|s| s.label()).collect();
    let mut evidence = Evidence::new(
        first.label(),
        format!("Reachable from WAN: {}.", labels.join("; ")),
    )
    .meta(MetadataKey::Service, labels.join("; "))
    .meta(MetadataKey::Interface, first.interface.as_str());
    if risky.iter().any(|s| s.admin) {
        evidence.extra_tags.push(tags::ADMIN_PORTAL);
    }
    Some(evidence)
}
