//! Parsed appliance configuration consumed by the audit engine.
//!
//! The document is produced by an external parser and is treated as
//! immutable, already-validated input. Field names follow the appliance's
//! own configuration vocabulary (`ipprotocol`, `quick`, `<any/>` endpoints)
//! so that a JSON or YAML export of the parsed tree deserializes directly.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Root of a parsed configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub system: System,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    /// Filter rules in evaluation order.
    #[serde(default)]
    pub filter_rules: Vec<FilterRule>,
    #[serde(default)]
    pub nat: Nat,
    #[serde(default)]
    pub services: Services,
}

impl Document {
    /// Read a pre-parsed export. `.json` files are read as JSON, anything
    /// else as YAML.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let doc: Document = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(doc)
    }

    /// Look up an interface by its logical name (`wan`, `lan`, `opt1`).
    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    /// Interfaces that are enabled.
    pub fn enabled_interfaces(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.iter().filter(|i| i.enabled)
    }

    /// Enabled filter rules paired with their index in `filter_rules`.
    pub fn enabled_rules(&self) -> impl Iterator<Item = (usize, &FilterRule)> {
        self.filter_rules
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.disabled)
    }

    /// Enabled NAT rules of both directions.
    pub fn enabled_nat_rules(&self) -> impl Iterator<Item = &NatRule> {
        self.nat
            .outbound
            .iter()
            .chain(self.nat.inbound.iter())
            .filter(|r| !r.disabled)
    }

    /// Whether the named interface faces the untrusted side.
    pub fn is_wan_interface(&self, name: &str) -> bool {
        match self.interface(name) {
            Some(iface) => iface.is_wan(),
            None => name == "wan",
        }
    }

    /// Whether an enabled pass rule on `interface` admits inbound traffic
    /// for the given protocol and port.
    pub fn allows_inbound(&self, interface: &str, protocol: &str, port: Option<u16>) -> bool {
        self.enabled_rules().any(|(_, rule)| {
            rule.action == RuleAction::Pass
                && rule.applies_to(interface)
                && rule.direction != Direction::Out
                && protocol_admits(&rule.protocol, protocol)
                && port_admits(rule.destination.port.as_deref(), port)
        })
    }

    /// Enumerate every service the configuration declares as listening on
    /// an interface. Services without an explicit binding listen on all
    /// enabled interfaces.
    pub fn exposed_services(&self) -> Vec<ExposedService> {
        let all: Vec<&str> = self.enabled_interfaces().map(|i| i.name.as_str()).collect();
        let bound = |list: &[String]| -> Vec<String> {
            if list.is_empty() {
                all.iter().map(|s| s.to_string()).collect()
            } else {
                list.to_vec()
            }
        };

        let mut services = Vec::new();

        let gui = &self.system.webgui;
        let encrypted = !gui.protocol.eq_ignore_ascii_case("http");
        let gui_port = gui.port.unwrap_or(if encrypted { 443 } else { 80 });
        for iface in bound(&gui.interfaces) {
            services.push(ExposedService {
                name: "webgui".to_string(),
                interface: iface,
                protocol: "tcp".to_string(),
                port: Some(gui_port),
                encrypted,
                admin: true,
                forwarded: false,
            });
        }

        let ssh = &self.system.ssh;
        if ssh.enabled {
            for iface in bound(&ssh.interfaces) {
                services.push(ExposedService {
                    name: "ssh".to_string(),
                    interface: iface,
                    protocol: "tcp".to_string(),
                    port: Some(ssh.port.unwrap_or(22)),
                    encrypted: true,
                    admin: true,
                    forwarded: false,
                });
            }
        }

        if let Some(snmp) = self.services.snmp.as_ref().filter(|s| s.enabled) {
            for iface in bound(&snmp.interfaces) {
                services.push(ExposedService {
                    name: "snmp".to_string(),
                    interface: iface,
                    protocol: "udp".to_string(),
                    port: Some(161),
                    encrypted: false,
                    admin: false,
                    forwarded: false,
                });
            }
        }

        if let Some(dns) = self.services.dns_resolver.as_ref().filter(|d| d.enabled) {
            for iface in bound(&dns.interfaces) {
                services.push(ExposedService {
                    name: "dns".to_string(),
                    interface: iface,
                    protocol: "udp".to_string(),
                    port: Some(53),
                    encrypted: false,
                    admin: false,
                    forwarded: false,
                });
            }
        }

        for vpn in self.services.vpn.iter().filter(|v| v.enabled) {
            services.push(ExposedService {
                name: vpn.kind.clone(),
                interface: vpn.interface.clone(),
                protocol: vpn.protocol.clone().unwrap_or_else(|| "udp".to_string()),
                port: vpn.port,
                encrypted: true,
                admin: false,
                forwarded: false,
            });
        }

        for rule in self.nat.inbound.iter().filter(|r| !r.disabled) {
            let name = if rule.description.is_empty() {
                "port-forward".to_string()
            } else {
                format!("port-forward {}", rule.description)
            };
            services.push(ExposedService {
                name,
                interface: rule.interface.clone(),
                protocol: rule.protocol_or_any().to_string(),
                port: rule.destination.port.as_deref().and_then(first_port),
                encrypted: false,
                admin: false,
                forwarded: true,
            });
        }

        services
    }
}

/// Global system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct System {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub domain: String,
    /// Firmware version string as reported by the appliance.
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub webgui: WebGui,
    #[serde(default)]
    pub ssh: Ssh,
    #[serde(default)]
    pub syslog: Syslog,
    #[serde(default)]
    pub disable_checksum_offloading: bool,
    #[serde(default)]
    pub disable_segmentation_offloading: bool,
    #[serde(default)]
    pub disable_large_receive_offloading: bool,
    /// DNS rebinding protection (enabled unless explicitly turned off).
    #[serde(default = "default_true")]
    pub dns_rebind_check: bool,
}

impl Default for System {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            domain: String::new(),
            version: None,
            webgui: WebGui::default(),
            ssh: Ssh::default(),
            syslog: Syslog::default(),
            disable_checksum_offloading: false,
            disable_segmentation_offloading: false,
            disable_large_receive_offloading: false,
            dns_rebind_check: true,
        }
    }
}

/// Web administration interface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebGui {
    #[serde(default = "WebGui::default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub port: Option<u16>,
    /// Interfaces the GUI listens on; empty means all.
    #[serde(default)]
    pub interfaces: Vec<String>,
}

impl WebGui {
    fn default_protocol() -> String {
        "https".to_string()
    }
}

impl Default for WebGui {
    fn default() -> Self {
        Self {
            protocol: Self::default_protocol(),
            port: None,
            interfaces: Vec::new(),
        }
    }
}

/// Secure shell daemon settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ssh {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub permit_root_login: bool,
    #[serde(default)]
    pub password_auth: bool,
    #[serde(default)]
    pub interfaces: Vec<String>,
}

/// Remote logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Syslog {
    #[serde(default)]
    pub remote_servers: Vec<String>,
}

/// A logical network interface assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interface {
    /// Logical name (`wan`, `lan`, `opt1`).
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Physical device (`igb0`, `vtnet1`).
    #[serde(default)]
    pub device: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub ipaddr: Option<String>,
    #[serde(default)]
    pub subnet: Option<u8>,
    /// Upstream gateway; its presence marks an uplink.
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub block_private: bool,
    #[serde(default)]
    pub block_bogons: bool,
}

impl Interface {
    /// An enabled interface with no address.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            device: String::new(),
            enabled: true,
            ipaddr: None,
            subnet: None,
            gateway: None,
            block_private: false,
            block_bogons: false,
        }
    }

    pub fn is_wan(&self) -> bool {
        self.name == "wan" || self.gateway.is_some()
    }
}

/// Filter rule action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Pass,
    Block,
    Reject,
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleAction::Pass => write!(f, "pass"),
            RuleAction::Block => write!(f, "block"),
            RuleAction::Reject => write!(f, "reject"),
        }
    }
}

/// Traffic direction a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    In,
    Out,
    Any,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
            Direction::Any => write!(f, "any"),
        }
    }
}

/// Address family a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    #[default]
    Inet,
    Inet6,
    Inet46,
}

/// Source or destination of a rule.
///
/// Mirrors the appliance layout: a bare endpoint (neither `network` nor
/// `address`) is `<any/>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleEndpoint {
    /// Named network (`lan`, `opt1ip`) or CIDR (`10.0.0.0/24`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Single host address or alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Port, port range (`1000-2000`) or alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Inverted match.
    #[serde(default)]
    pub not: bool,
}

/// Declared breadth of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointScope<'a> {
    Any,
    Network(&'a str),
    Host(&'a str),
}

impl EndpointScope<'_> {
    /// Breadth rank used when several rules cover the same traffic.
    pub fn breadth(&self) -> u8 {
        match self {
            EndpointScope::Any => 2,
            EndpointScope::Network(_) => 1,
            EndpointScope::Host(_) => 0,
        }
    }
}

impl RuleEndpoint {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn network(net: impl Into<String>) -> Self {
        Self {
            network: Some(net.into()),
            ..Self::default()
        }
    }

    pub fn host(addr: impl Into<String>) -> Self {
        Self {
            address: Some(addr.into()),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn scope(&self) -> EndpointScope<'_> {
        match (&self.network, &self.address) {
            (Some(net), _) if net != "any" => EndpointScope::Network(net),
            (_, Some(addr)) if addr != "any" => EndpointScope::Host(addr),
            _ => EndpointScope::Any,
        }
    }

    /// Matches every address and port without inversion.
    pub fn is_any(&self) -> bool {
        !self.not && self.scope() == EndpointScope::Any && port_is_any(self.port.as_deref())
    }
}

/// A packet filter rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker: Option<String>,
    /// Interface name; floating rules list several separated by commas.
    pub interface: String,
    #[serde(default)]
    pub direction: Direction,
    pub action: RuleAction,
    /// Stops evaluation on match.
    #[serde(default = "default_true")]
    pub quick: bool,
    #[serde(default)]
    pub ipprotocol: IpVersion,
    /// `any`, `tcp`, `udp`, `tcp/udp`, `icmp`, ...
    #[serde(default = "FilterRule::default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub source: RuleEndpoint,
    #[serde(default)]
    pub destination: RuleEndpoint,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub log: bool,
    #[serde(default)]
    pub description: String,
}

impl FilterRule {
    fn default_protocol() -> String {
        "any".to_string()
    }

    /// A quick, any-to-any rule on one interface.
    pub fn new(interface: impl Into<String>, action: RuleAction) -> Self {
        Self {
            tracker: None,
            interface: interface.into(),
            direction: Direction::In,
            action,
            quick: true,
            ipprotocol: IpVersion::Inet,
            protocol: Self::default_protocol(),
            source: RuleEndpoint::any(),
            destination: RuleEndpoint::any(),
            disabled: false,
            log: false,
            description: String::new(),
        }
    }

    /// Interfaces named by this rule.
    pub fn interfaces(&self) -> impl Iterator<Item = &str> {
        self.interface
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn applies_to(&self, interface: &str) -> bool {
        self.interfaces().any(|i| i == interface)
    }

    /// Human-readable locator used as a finding's affected object.
    pub fn locator(&self, index: usize) -> String {
        let label = if !self.description.is_empty() {
            format!(" ({})", self.description)
        } else if let Some(tracker) = &self.tracker {
            format!(" (tracker {})", tracker)
        } else {
            String::new()
        };
        format!(
            "filter rule #{}{} on {}/{}",
            index, label, self.interface, self.direction
        )
    }
}

/// NAT configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Nat {
    /// Outbound (source) NAT rules.
    #[serde(default)]
    pub outbound: Vec<NatRule>,
    /// Inbound port forwards.
    #[serde(default)]
    pub inbound: Vec<NatRule>,
}

/// A NAT rule of either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatRule {
    pub interface: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub source: RuleEndpoint,
    #[serde(default)]
    pub destination: RuleEndpoint,
    /// Redirect target (inbound) or translation address (outbound).
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub local_port: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub description: String,
}

impl NatRule {
    pub fn protocol_or_any(&self) -> &str {
        if self.protocol.is_empty() {
            "any"
        } else {
            &self.protocol
        }
    }

    pub fn locator(&self, kind: &str, index: usize) -> String {
        if self.description.is_empty() {
            format!("{} nat rule #{} on {}", kind, index, self.interface)
        } else {
            format!(
                "{} nat rule #{} ({}) on {}",
                kind, index, self.description, self.interface
            )
        }
    }
}

/// Network services and their interface bindings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Services {
    #[serde(default)]
    pub dhcp: Vec<DhcpScope>,
    #[serde(default)]
    pub dns_resolver: Option<DnsResolver>,
    #[serde(default)]
    pub vpn: Vec<VpnEndpoint>,
    #[serde(default)]
    pub snmp: Option<Snmp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhcpScope {
    pub interface: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub range_from: Option<String>,
    #[serde(default)]
    pub range_to: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsResolver {
    #[serde(default)]
    pub enabled: bool,
    /// Listening interfaces; empty means all.
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub dnssec: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpnEndpoint {
    /// `openvpn`, `ipsec`, `wireguard`.
    pub kind: String,
    pub interface: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snmp {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub community: String,
    #[serde(default)]
    pub interfaces: Vec<String>,
}

/// A service reachable on one interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposedService {
    pub name: String,
    pub interface: String,
    pub protocol: String,
    pub port: Option<u16>,
    pub encrypted: bool,
    /// Administrative access (GUI, shell).
    pub admin: bool,
    /// Published through an inbound NAT rule.
    pub forwarded: bool,
}

impl ExposedService {
    pub fn label(&self) -> String {
        match self.port {
            Some(port) => format!("{} ({}/{}) on {}", self.name, self.protocol, port, self.interface),
            None => format!("{} ({}) on {}", self.name, self.protocol, self.interface),
        }
    }
}

/// Whether a port specification is absent or explicitly `any`.
pub fn port_is_any(port: Option<&str>) -> bool {
    match port {
        None => true,
        Some(p) => p.is_empty() || p.eq_ignore_ascii_case("any"),
    }
}

/// Parse `80`, `1000-2000` or `1000:2000` into an inclusive range.
pub fn port_range(spec: &str) -> Option<(u16, u16)> {
    let spec = spec.trim();
    if let Some((lo, hi)) = spec.split_once(['-', ':']) {
        let lo = lo.trim().parse().ok()?;
        let hi = hi.trim().parse().ok()?;
        return if lo <= hi { Some((lo, hi)) } else { None };
    }
    let port = spec.parse().ok()?;
    Some((port, port))
}

fn first_port(spec: &str) -> Option<u16> {
    port_range(spec).map(|(lo, _)| lo)
}

fn protocol_admits(rule_protocol: &str, protocol: &str) -> bool {
    let rule_protocol = rule_protocol.to_ascii_lowercase();
    rule_protocol.is_empty()
        || rule_protocol == "any"
        || rule_protocol == protocol
        || (rule_protocol == "tcp/udp" && (protocol == "tcp" || protocol == "udp"))
}

fn port_admits(rule_port: Option<&str>, port: Option<u16>) -> bool {
    if port_is_any(rule_port) {
        return true;
    }
    match (rule_port.and_then(port_range), port) {
        (Some((lo, hi)), Some(p)) => lo <= p && p <= hi,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str) -> Interface {
        Interface::new(name)
    }

    #[test]
    fn test_endpoint_scope() {
        assert_eq!(RuleEndpoint::any().scope(), EndpointScope::Any);
        assert_eq!(RuleEndpoint::network("lan").scope(), EndpointScope::Network("lan"));
        assert_eq!(RuleEndpoint::host("10.0.0.1").scope(), EndpointScope::Host("10.0.0.1"));
        assert!(RuleEndpoint::any().is_any());
        assert!(!RuleEndpoint::any().with_port("22").is_any());
    }

    #[test]
    fn test_port_range() {
        assert_eq!(port_range("22"), Some((22, 22)));
        assert_eq!(port_range("1000-2000"), Some((1000, 2000)));
        assert_eq!(port_range("1000:2000"), Some((1000, 2000)));
        assert_eq!(port_range("2000-1000"), None);
        assert_eq!(port_range("http_alias"), None);
    }

    #[test]
    fn test_floating_rule_interfaces() {
        let rule = FilterRule::new("wan, opt1", RuleAction::Block);
        assert!(rule.applies_to("wan"));
        assert!(rule.applies_to("opt1"));
        assert!(!rule.applies_to("lan"));
    }

    #[test]
    fn test_exposed_services_default_binding() {
        let mut doc = Document::default();
        doc.interfaces = vec![iface("wan"), iface("lan")];
        doc.system.ssh.enabled = true;

        let services = doc.exposed_services();
        let ssh: Vec<_> = services.iter().filter(|s| s.name == "ssh").collect();
        assert_eq!(ssh.len(), 2);
        assert!(services.iter().any(|s| s.name == "webgui" && s.port == Some(443)));
    }

    #[test]
    fn test_allows_inbound() {
        let mut doc = Document::default();
        doc.interfaces = vec![iface("wan")];
        let mut rule = FilterRule::new("wan", RuleAction::Pass);
        rule.protocol = "tcp".to_string();
        rule.destination = RuleEndpoint::any().with_port("443");
        doc.filter_rules.push(rule);

        assert!(doc.allows_inbound("wan", "tcp", Some(443)));
        assert!(!doc.allows_inbound("wan", "tcp", Some(22)));
        assert!(!doc.allows_inbound("wan", "udp", Some(443)));
    }
}
