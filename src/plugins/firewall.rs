//! General firewall best practices.

use lazy_static::lazy_static;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::compliance::{tags, CompliancePlugin, Control, Finding, MetadataKey, Severity};
use crate::document::{port_range, Document};

lazy_static! {
    /// Hostnames shipped by appliance installers.
    static ref DEFAULT_HOSTNAME: Regex =
        Regex::new(r"(?i)^(opnsense|pfsense|firewall|router|localhost|gateway)$").unwrap();
}

/// Local ports that should never be published through a port forward.
const ADMIN_PORTS: &[u16] = &[22, 23, 445, 3389, 5900];

static CONTROLS: Lazy<Vec<Control>> = Lazy::new(|| {
    vec![
        Control::new("FIREWALL-001", "Non-default hostname", "system", Severity::Low)
            .describe("The appliance still uses its installer default hostname.")
            .rationale("Default names identify the product and version family to attackers.")
            .remediation("Set a hostname that follows your naming convention."),
        Control::new("FIREWALL-002", "DNS rebinding protection", "system", Severity::Medium)
            .describe("DNS rebinding checks are disabled for the web GUI.")
            .rationale("Rebinding lets a malicious page in a browser reach the management interface.")
            .remediation("Re-enable the DNS rebind check."),
        Control::new("FIREWALL-003", "Web GUI on a non-standard port", "management", Severity::Low)
            .describe("The web GUI listens on the default HTTP or HTTPS port.")
            .rationale("Default ports make the management interface trivial to find.")
            .remediation("Move the web GUI to a dedicated port and restrict access to it."),
        Control::new("FIREWALL-004", "SSH not reachable on WAN", "management", Severity::High)
            .describe("The SSH daemon listens on a WAN interface.")
            .rationale("Internet-facing SSH attracts continuous credential attacks.")
            .remediation("Bind SSH to internal interfaces or reach it through a VPN."),
        Control::new("FIREWALL-005", "No administrative port forwards", "nat", Severity::Medium)
            .describe("A port forward publishes a remote administration protocol.")
            .rationale("Remote desktop, SMB and shell services are common ransomware entry points.")
            .remediation("Remove the port forward and provide access through a VPN."),
    ]
});

pub struct FirewallPlugin;

impl CompliancePlugin for FirewallPlugin {
    fn name(&self) -> &str {
        "firewall"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "General firewall configuration best practices"
    }

    fn controls(&self) -> Vec<Control> {
        CONTROLS.clone()
    }

    fn run_checks(&self, doc: &Document) -> Vec<Finding> {
        let mut findings = Vec::new();
        let system = &doc.system;

        if DEFAULT_HOSTNAME.is_match(system.hostname.trim()) {
            findings.push(
                Finding::from_control(&CONTROLS[0])
                    .describe(format!("Hostname {:?} is an installer default.", system.hostname))
                    .affected("system.hostname")
                    .tag(tags::ENUMERATION),
            );
        }

        if !system.dns_rebind_check {
            findings.push(
                Finding::from_control(&CONTROLS[1])
                    .affected("system.webgui")
                    .tag(tags::ADMIN_PORTAL),
            );
        }

        let gui = &system.webgui;
        if matches!(gui.port, None | Some(80) | Some(443)) {
            let port = gui.port.unwrap_or(if gui.protocol.eq_ignore_ascii_case("http") {
                80
            } else {
                443
            });
            findings.push(
                Finding::from_control(&CONTROLS[2])
                    .describe(format!("The web GUI listens on default port {}.", port))
                    .affected("system.webgui")
                    .tagged(&[tags::ADMIN_PORTAL, tags::SERVICE])
                    .meta(MetadataKey::Service, format!("webgui (tcp/{})", port)),
            );
        }

        for service in doc
            .exposed_services()
            .into_iter()
            .filter(|s| s.name == "ssh" && doc.is_wan_interface(&s.interface))
        {
            findings.push(
                Finding::from_control(&CONTROLS[3])
                    .title(format!("SSH listens on {}", service.interface))
                    .affected(service.label())
                    .tagged(&[tags::WAN, tags::SERVICE, tags::ADMIN_PORTAL])
                    .meta(MetadataKey::Service, service.label())
                    .meta(MetadataKey::Interface, service.interface.as_str()),
            );
        }

        for (index, rule) in doc.nat.inbound.iter().enumerate().filter(|(_, r)| !r.disabled) {
            let local = rule
                .local_port
                .as_deref()
                .or(rule.destination.port.as_deref())
                .and_then(port_range);
            let Some((lo, hi)) = local else { continue };
            if let Some(port) = ADMIN_PORTS.iter().find(|p| (lo..=hi).contains(*p)) {
                let mut finding = Finding::from_control(&CONTROLS[4])
                    .title(format!("port forward publishes port {}", port))
                    .affected(rule.locator("inbound", index))
                    .tagged(&[tags::NAT, tags::EXPOSURE])
                    .meta(MetadataKey::RuleIndex, index.to_string())
                    .meta(MetadataKey::Interface, rule.interface.as_str());
                if doc.is_wan_interface(&rule.interface) {
                    finding = finding
                        .tag(tags::WAN)
                        .override_severity(Severity::High, "administrative port forwarded from WAN");
                }
                findings.push(finding);
            }
        }

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Interface, NatRule, RuleEndpoint};

    fn ids(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.control_id.as_str()).collect()
    }

    fn tidy() -> Document {
        let mut doc = Document {
            interfaces: vec![Interface::new("wan"), Interface::new("lan")],
            ..Default::default()
        };
        doc.system.hostname = "fw-edge-01".to_string();
        doc.system.webgui.port = Some(8443);
        doc
    }

    #[test]
    fn test_tidy_document_passes() {
        assert!(FirewallPlugin.run_checks(&tidy()).is_empty());
    }

    #[test]
    fn test_defaults_are_reported() {
        let mut doc = tidy();
        doc.system.hostname = "OPNsense".to_string();
        doc.system.webgui.port = None;
        doc.system.dns_rebind_check = false;

        let findings = FirewallPlugin.run_checks(&doc);
        assert_eq!(ids(&findings), vec!["FIREWALL-001", "FIREWALL-002", "FIREWALL-003"]);
        assert!(findings[0].has_tag(tags::ENUMERATION));
        assert_eq!(findings[2].meta_value(MetadataKey::Service), Some("webgui (tcp/443)"));
    }

    #[test]
    fn test_ssh_on_wan() {
        let mut doc = tidy();
        doc.system.ssh.enabled = true;
        doc.system.ssh.interfaces = vec!["wan".to_string()];

        let findings = FirewallPlugin.run_checks(&doc);
        assert_eq!(ids(&findings), vec!["FIREWALL-004"]);
        assert_eq!(findings[0].title, "SSH listens on wan");
    }

    #[test]
    fn test_rdp_forward_from_wan_is_raised() {
        let mut doc = tidy();
        doc.nat.inbound.push(NatRule {
            interface: "wan".to_string(),
            protocol: "tcp".to_string(),
            source: RuleEndpoint::any(),
            destination: RuleEndpoint::any().with_port("13389"),
            target: Some("192.168.1.50".to_string()),
            local_port: Some("3389".to_string()),
            disabled: false,
            description: "desktop".to_string(),
        });

        let findings = FirewallPlugin.run_checks(&doc);
        assert_eq!(ids(&findings), vec!["FIREWALL-005"]);
        assert_eq!(findings[0].severity, Severity::High);
        assert!(findings[0].meta_value(MetadataKey::SeverityOverride).is_some());
    }
}
