//! Network device hardening checks modelled on the DISA firewall STIG.

use once_cell::sync::Lazy;

use crate::compliance::{tags, CompliancePlugin, Control, Finding, MetadataKey, Severity};
use crate::document::{Direction, Document, RuleAction};

const REFERENCE: &str = "DISA Network Firewall SRG";

static CONTROLS: Lazy<Vec<Control>> = Lazy::new(|| {
    vec![
        Control::new("STIG-001", "Explicit default deny on WAN", "firewall", Severity::High)
            .describe("Each WAN interface must end its ruleset with an explicit deny-all rule.")
            .rationale("An explicit, logged deny documents intent and records rejected traffic.")
            .remediation("Add a block rule from any to any at the end of each WAN ruleset."),
        Control::new("STIG-002", "Denied traffic is logged", "logging", Severity::Medium)
            .describe("Block and reject rules must log matching packets.")
            .rationale("Without logs, probing and attacks against the perimeter go unnoticed.")
            .remediation("Enable logging on every block and reject rule."),
        Control::new("STIG-003", "SNMP community is not a default", "services", Severity::High)
            .describe("SNMP must not use blank or vendor default community strings.")
            .rationale("Default communities grant read access to anyone who guesses them.")
            .remediation("Configure a unique community string or disable SNMP."),
        Control::new("STIG-004", "Management access is encrypted", "management", Severity::High)
            .describe("Administrative sessions must use encrypted protocols and key authentication.")
            .rationale("Clear-text and password logins expose administrator credentials.")
            .remediation("Serve the web GUI over HTTPS and disable SSH password authentication."),
        Control::new("STIG-005", "Logs are sent off-box", "logging", Severity::Medium)
            .describe("The device must forward its logs to a remote syslog server.")
            .rationale("Local logs are lost or altered when the device is compromised.")
            .remediation("Configure at least one remote syslog destination."),
        Control::new("STIG-006", "No direct root login over SSH", "management", Severity::Medium)
            .describe("Root must not be able to log in directly over SSH.")
            .rationale("Direct root logins defeat individual accountability.")
            .remediation("Disable root login and use named administrator accounts."),
    ]
});

fn finding(index: usize) -> Finding {
    Finding::from_control(&CONTROLS[index]).reference(REFERENCE)
}

pub struct StigPlugin;

impl CompliancePlugin for StigPlugin {
    fn name(&self) -> &str {
        "stig"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "Firewall hardening requirements derived from the DISA STIG"
    }

    fn controls(&self) -> Vec<Control> {
        CONTROLS.clone()
    }

    fn run_checks(&self, doc: &Document) -> Vec<Finding> {
        let mut findings = Vec::new();

        for iface in doc.enabled_interfaces().filter(|i| i.is_wan()) {
            let has_deny_all = doc.enabled_rules().any(|(_, r)| {
                r.applies_to(&iface.name)
                    && r.action != RuleAction::Pass
                    && r.direction != Direction::Out
                    && r.source.is_any()
                    && r.destination.is_any()
            });
            if !has_deny_all {
                findings.push(
                    finding(0)
                        .title(format!("no explicit default deny on {}", iface.name))
                        .affected(iface.name.as_str())
                        .tagged(&[tags::WAN, tags::FIREWALL_RULE])
                        .meta(MetadataKey::Interface, iface.name.as_str()),
                );
            }
        }

        let unlogged: Vec<String> = doc
            .enabled_rules()
            .filter(|(_, r)| r.action != RuleAction::Pass && !r.log)
            .map(|(i, _)| i.to_string())
            .collect();
        if !unlogged.is_empty() {
            findings.push(
                finding(1)
                    .describe(format!(
                        "{} block or reject rule(s) do not log: rules {}.",
                        unlogged.len(),
                        unlogged.join(", ")
                    ))
                    .affected("filter")
                    .tag(tags::LOGGING)
                    .meta(MetadataKey::RuleIndex, unlogged.join(",")),
            );
        }

        if let Some(snmp) = doc.services.snmp.as_ref().filter(|s| s.enabled) {
            let community = snmp.community.trim();
            if community.is_empty()
                || community.eq_ignore_ascii_case("public")
                || community.eq_ignore_ascii_case("private")
            {
                findings.push(
                    finding(2)
                        .affected("services.snmp")
                        .tagged(&[tags::SERVICE, tags::ENUMERATION]),
                );
            }
        }

        if doc.system.webgui.protocol.eq_ignore_ascii_case("http") {
            findings.push(
                finding(3)
                    .title("web GUI uses HTTP")
                    .affected("system.webgui")
                    .tagged(&[tags::ADMIN_PORTAL, tags::SERVICE]),
            );
        }
        let ssh = &doc.system.ssh;
        if ssh.enabled && ssh.password_auth {
            findings.push(
                finding(3)
                    .title("SSH accepts password authentication")
                    .affected("system.ssh")
                    .tagged(&[tags::ADMIN_PORTAL, tags::SERVICE]),
            );
        }

        if doc.system.syslog.remote_servers.is_empty() {
            findings.push(finding(4).affected("system.syslog").tag(tags::LOGGING));
        }

        if ssh.enabled && ssh.permit_root_login {
            findings.push(
                finding(5)
                    .affected("system.ssh")
                    .tagged(&[tags::ADMIN_PORTAL]),
            );
        }

        findings
    }
}
