//! Dead, duplicate and overridden filter rule detection.
//!
//! Rules are evaluated per interface in document order. A quick rule stops
//! evaluation on match; a non-quick rule only sets the tentative outcome,
//! so the last matching non-quick rule wins unless a quick rule matches
//! first.
//!
//! - **dead**: an earlier quick rule matches every packet the rule could
//!   match, so it is never reached.
//! - **duplicate**: an earlier rule has the same predicate, action and
//!   quick flag.
//! - **overridden**: a non-quick rule whose traffic is always matched again
//!   by a later rule, so it never decides the outcome.

use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;

use once_cell::sync::Lazy;

use crate::compliance::{tags, Control, Finding, MetadataKey, Severity};
use crate::document::{
    port_is_any, port_range, Direction, Document, EndpointScope, FilterRule, IpVersion,
    RuleEndpoint,
};

use super::Analyzer;

pub const DEAD_RULE: &str = "RULE-001";
pub const DUPLICATE_RULE: &str = "RULE-002";
pub const OVERRIDDEN_RULE: &str = "RULE-003";

static DEAD_RULE_CONTROL: Lazy<Control> = Lazy::new(|| {
    Control::new(DEAD_RULE, "Unreachable filter rule", "firewall", Severity::Medium)
        .describe("An earlier quick rule matches all traffic this rule could match.")
        .rationale("Unreachable rules mislead reviewers about what the ruleset permits.")
        .remediation("Remove the rule or move it above the rule that shadows it.")
});

static DUPLICATE_RULE_CONTROL: Lazy<Control> = Lazy::new(|| {
    Control::new(DUPLICATE_RULE, "Duplicate filter rule", "firewall", Severity::Low)
        .describe("An earlier rule has an identical match predicate and action.")
        .rationale("Redundant rules add evaluation cost and review noise.")
        .remediation("Delete the duplicate rule.")
});

static OVERRIDDEN_RULE_CONTROL: Lazy<Control> = Lazy::new(|| {
    Control::new(OVERRIDDEN_RULE, "Overridden filter rule", "firewall", Severity::Low)
        .describe("A non-quick rule is always superseded by a later matching rule.")
        .rationale("Under last-match-wins evaluation the rule never decides the outcome.")
        .remediation("Mark the rule quick, reorder it below the broader rule, or remove it.")
});

pub struct RuleAnalyzer;

impl Analyzer for RuleAnalyzer {
    fn name(&self) -> &'static str {
        "rules"
    }

    fn controls(&self) -> Vec<Control> {
        vec![
            DEAD_RULE_CONTROL.clone(),
            DUPLICATE_RULE_CONTROL.clone(),
            OVERRIDDEN_RULE_CONTROL.clone(),
        ]
    }

    fn analyze(&self, doc: &Document) -> Vec<Finding> {
        let mut chains: BTreeMap<&str, Vec<(usize, &FilterRule)>> = BTreeMap::new();
        for (index, rule) in doc.enabled_rules() {
            for iface in rule.interfaces() {
                chains.entry(iface).or_default().push((index, rule));
            }
        }

        // Floating rules appear in several chains; report each once.
        let mut reported = HashSet::new();
        let mut findings = Vec::new();
        for chain in chains.values() {
            for finding in analyze_chain(doc, chain) {
                if let Some(index) = finding.meta_value(MetadataKey::RuleIndex) {
                    if !reported.insert((finding.control_id.clone(), index.to_string())) {
                        continue;
                    }
                }
                findings.push(finding);
            }
        }
        findings
    }
}

/// Classify every rule of one interface's chain.
fn analyze_chain(doc: &Document, chain: &[(usize, &FilterRule)]) -> Vec<Finding> {
    let mut findings = Vec::new();

    for (pos, &(index, rule)) in chain.iter().enumerate() {
        let earlier = &chain[..pos];

        if let Some(&(q_index, q)) = shadowing_rule(earlier, rule) {
            findings.push(
                rule_finding(doc, &DEAD_RULE_CONTROL, index, rule, q_index)
                    .title(format!("dead filter rule #{}", index))
                    .describe(format!(
                        "{} is never evaluated: quick {} rule {} matches all of its traffic first.",
                        rule.locator(index),
                        q.action,
                        q.locator(q_index)
                    )),
            );
            continue;
        }

        if let Some(&(d_index, d)) = earlier.iter().find(|(_, e)| is_duplicate(e, rule)) {
            findings.push(
                rule_finding(doc, &DUPLICATE_RULE_CONTROL, index, rule, d_index)
                    .title(format!("duplicate filter rule #{}", index))
                    .describe(format!(
                        "{} repeats {} with the same predicate and action.",
                        rule.locator(index),
                        d.locator(d_index)
                    )),
            );
            continue;
        }

        if !rule.quick {
            let later = &chain[pos + 1..];
            if let Some(&(l_index, l)) = later
                .iter()
                .find(|(_, l)| predicate_covers(l, rule) && !is_duplicate(l, rule))
            {
                findings.push(
                    rule_finding(doc, &OVERRIDDEN_RULE_CONTROL, index, rule, l_index)
                        .title(format!("overridden filter rule #{}", index))
                        .describe(format!(
                            "{} never decides the outcome: later {} rule {} matches all of its traffic.",
                            rule.locator(index),
                            l.action,
                            l.locator(l_index)
                        )),
                );
            }
        }
    }

    findings
}

/// Broadest earlier quick rule covering `rule`; earliest on ties.
fn shadowing_rule<'a, 'r>(
    earlier: &'a [(usize, &'r FilterRule)],
    rule: &FilterRule,
) -> Option<&'a (usize, &'r FilterRule)> {
    let mut best: Option<(&(usize, &FilterRule), u8)> = None;
    for candidate in earlier {
        let q = candidate.1;
        if !q.quick || !predicate_covers(q, rule) || is_duplicate(q, rule) {
            continue;
        }
        let breadth = q.source.scope().breadth() + q.destination.scope().breadth();
        if best.map_or(true, |(_, b)| breadth > b) {
            best = Some((candidate, breadth));
        }
    }
    best.map(|(candidate, _)| candidate)
}

fn rule_finding(
    doc: &Document,
    control: &Control,
    index: usize,
    rule: &FilterRule,
    related: usize,
) -> Finding {
    let mut finding = Finding::from_control(control)
        .affected(rule.locator(index))
        .tag(tags::FIREWALL_RULE)
        .meta(MetadataKey::RuleIndex, index.to_string())
        .meta(MetadataKey::Interface, rule.interface.as_str())
        .meta(MetadataKey::ShadowedBy, related.to_string());
    if rule.interfaces().any(|i| doc.is_wan_interface(i)) {
        finding = finding.tag(tags::WAN);
    }
    finding
}

/// Whether every packet matched by `r` is also matched by `q`.
pub fn predicate_covers(q: &FilterRule, r: &FilterRule) -> bool {
    r.interfaces().all(|i| q.applies_to(i))
        && direction_covers(q.direction, r.direction)
        && ip_version_covers(q.ipprotocol, r.ipprotocol)
        && protocol_covers(&q.protocol, &r.protocol)
        && endpoint_covers(&q.source, &r.source)
        && endpoint_covers(&q.destination, &r.destination)
}

/// Identical match predicates.
pub fn same_predicate(a: &FilterRule, b: &FilterRule) -> bool {
    let mut ai: Vec<&str> = a.interfaces().collect();
    let mut bi: Vec<&str> = b.interfaces().collect();
    ai.sort_unstable();
    bi.sort_unstable();

    ai == bi
        && a.direction == b.direction
        && a.ipprotocol == b.ipprotocol
        && normalize_protocol(&a.protocol) == normalize_protocol(&b.protocol)
        && a.source == b.source
        && a.destination == b.destination
}

fn is_duplicate(a: &FilterRule, b: &FilterRule) -> bool {
    same_predicate(a, b) && a.action == b.action && a.quick == b.quick
}

fn direction_covers(q: Direction, r: Direction) -> bool {
    q == Direction::Any || q == r
}

fn ip_version_covers(q: IpVersion, r: IpVersion) -> bool {
    q == IpVersion::Inet46 || q == r
}

fn normalize_protocol(protocol: &str) -> String {
    let p = protocol.trim().to_ascii_lowercase();
    if p.is_empty() {
        "any".to_string()
    } else {
        p
    }
}

fn protocol_covers(q: &str, r: &str) -> bool {
    let q = normalize_protocol(q);
    let r = normalize_protocol(r);
    q == "any" || q == r || (q == "tcp/udp" && (r == "tcp" || r == "udp"))
}

/// Whether endpoint `q` matches everything endpoint `r` matches.
///
/// Inverted endpoints only cover identical endpoints.
pub fn endpoint_covers(q: &RuleEndpoint, r: &RuleEndpoint) -> bool {
    if q.not || r.not {
        return q == r;
    }

    let address = match (q.scope(), r.scope()) {
        (EndpointScope::Any, _) => true,
        (EndpointScope::Network(a), EndpointScope::Network(b)) => a == b || net_contains(a, b),
        (EndpointScope::Network(a), EndpointScope::Host(h)) => net_contains(a, h),
        (EndpointScope::Host(a), EndpointScope::Host(b)) => a == b,
        _ => false,
    };

    address && port_covers(q.port.as_deref(), r.port.as_deref())
}

fn port_covers(q: Option<&str>, r: Option<&str>) -> bool {
    if port_is_any(q) {
        return true;
    }
    if port_is_any(r) {
        return false;
    }
    let (q, r) = (q.unwrap_or_default(), r.unwrap_or_default());
    if q == r {
        return true;
    }
    match (port_range(q), port_range(r)) {
        (Some((qlo, qhi)), Some((rlo, rhi))) => qlo <= rlo && rhi <= qhi,
        _ => false,
    }
}

/// Parse `10.0.0.0/8` or a bare address into (address, prefix length).
fn parse_net(s: &str) -> Option<(IpAddr, u8)> {
    let (addr, len) = match s.split_once('/') {
        Some((addr, len)) => (addr, Some(len)),
        None => (s, None),
    };
    let addr: IpAddr = addr.trim().parse().ok()?;
    let width = if addr.is_ipv4() { 32 } else { 128 };
    let len = match len {
        Some(len) => len.trim().parse().ok()?,
        None => width,
    };
    (len <= width).then_some((addr, len))
}

fn addr_bits(addr: IpAddr) -> (u128, u8) {
    match addr {
        IpAddr::V4(v4) => (u32::from(v4) as u128, 32),
        IpAddr::V6(v6) => (u128::from(v6), 128),
    }
}

/// CIDR containment of `inner` in `outer`. Named networks never contain
/// each other.
fn net_contains(outer: &str, inner: &str) -> bool {
    let (Some((oa, olen)), Some((ia, ilen))) = (parse_net(outer), parse_net(inner)) else {
        return false;
    };
    let (obits, owidth) = addr_bits(oa);
    let (ibits, iwidth) = addr_bits(ia);
    if owidth != iwidth || olen > ilen {
        return false;
    }
    let mask = if olen == 0 {
        0
    } else {
        u128::MAX << (owidth - olen)
    };
    obits & mask == ibits & mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Interface, RuleAction};

    fn doc(rules: Vec<FilterRule>) -> Document {
        Document {
            interfaces: vec![Interface::new("wan"), Interface::new("lan")],
            filter_rules: rules,
            ..Default::default()
        }
    }

    fn pass_to(iface: &str, dest: RuleEndpoint) -> FilterRule {
        let mut rule = FilterRule::new(iface, RuleAction::Pass);
        rule.protocol = "tcp".to_string();
        rule.destination = dest;
        rule
    }

    fn ids(findings: &[Finding]) -> Vec<(&str, &str)> {
        findings
            .iter()
            .map(|f| {
                (
                    f.control_id.as_str(),
                    f.meta_value(MetadataKey::RuleIndex).unwrap_or(""),
                )
            })
            .collect()
    }

    #[test]
    fn test_block_all_makes_everything_dead() {
        let rules = vec![
            FilterRule::new("wan", RuleAction::Block),
            pass_to("wan", RuleEndpoint::host("203.0.113.10").with_port("443")),
            pass_to("wan", RuleEndpoint::network("10.0.0.0/8")),
            FilterRule::new("wan", RuleAction::Pass),
        ];
        let findings = RuleAnalyzer.analyze(&doc(rules));

        assert_eq!(
            ids(&findings),
            vec![(DEAD_RULE, "1"), (DEAD_RULE, "2"), (DEAD_RULE, "3")]
        );
        assert!(findings.iter().all(|f| f.severity == Severity::Medium));
        assert!(findings
            .iter()
            .all(|f| f.meta_value(MetadataKey::ShadowedBy) == Some("0")));
        assert!(findings.iter().all(|f| f.has_tag(tags::WAN)));
    }

    #[test]
    fn test_consecutive_duplicates() {
        let rule = pass_to("lan", RuleEndpoint::host("192.168.1.5").with_port("22"));
        let findings = RuleAnalyzer.analyze(&doc(vec![rule.clone(), rule.clone(), rule]));

        assert_eq!(ids(&findings), vec![(DUPLICATE_RULE, "1"), (DUPLICATE_RULE, "2")]);
        assert!(findings.iter().all(|f| f.severity == Severity::Low));
        assert_eq!(findings[1].meta_value(MetadataKey::ShadowedBy), Some("0"));
        assert!(!findings[0].has_tag(tags::WAN));
    }

    #[test]
    fn test_same_predicate_other_action_is_dead() {
        let pass = pass_to("lan", RuleEndpoint::host("192.168.1.5"));
        let mut block = pass.clone();
        block.action = RuleAction::Block;

        let findings = RuleAnalyzer.analyze(&doc(vec![pass, block]));
        assert_eq!(ids(&findings), vec![(DEAD_RULE, "1")]);
    }

    #[test]
    fn test_network_covers_contained_host_and_cidr() {
        let rules = vec![
            pass_to("lan", RuleEndpoint::network("192.168.0.0/16")),
            pass_to("lan", RuleEndpoint::network("192.168.4.0/24")),
            pass_to("lan", RuleEndpoint::host("192.168.9.9")),
            pass_to("lan", RuleEndpoint::host("10.1.1.1")),
        ];
        let findings = RuleAnalyzer.analyze(&doc(rules));
        assert_eq!(ids(&findings), vec![(DEAD_RULE, "1"), (DEAD_RULE, "2")]);
    }

    #[test]
    fn test_narrower_quick_rule_does_not_shadow() {
        let rules = vec![
            pass_to("lan", RuleEndpoint::host("192.168.9.9")),
            pass_to("lan", RuleEndpoint::network("192.168.0.0/16")),
        ];
        assert!(RuleAnalyzer.analyze(&doc(rules)).is_empty());
    }

    #[test]
    fn test_broadest_shadowing_rule_is_reported() {
        let rules = vec![
            pass_to("lan", RuleEndpoint::network("192.168.0.0/16")),
            pass_to("lan", RuleEndpoint::any()),
            pass_to("lan", RuleEndpoint::host("192.168.1.1").with_port("80")),
        ];
        let findings = RuleAnalyzer.analyze(&doc(rules));
        let last = findings
            .iter()
            .find(|f| f.meta_value(MetadataKey::RuleIndex) == Some("2"))
            .unwrap();
        assert_eq!(last.meta_value(MetadataKey::ShadowedBy), Some("1"));
    }

    #[test]
    fn test_direction_and_protocol_limit_coverage() {
        let mut outbound = FilterRule::new("lan", RuleAction::Block);
        outbound.direction = Direction::Out;
        let mut udp_only = FilterRule::new("lan", RuleAction::Block);
        udp_only.protocol = "udp".to_string();

        let rules = vec![outbound, udp_only, pass_to("lan", RuleEndpoint::any())];
        assert!(RuleAnalyzer.analyze(&doc(rules)).is_empty());
    }

    #[test]
    fn test_tcp_udp_covers_tcp() {
        let mut both = FilterRule::new("lan", RuleAction::Block);
        both.protocol = "TCP/UDP".to_string();
        let rules = vec![both, pass_to("lan", RuleEndpoint::any().with_port("443"))];
        assert_eq!(ids(&RuleAnalyzer.analyze(&doc(rules))), vec![(DEAD_RULE, "1")]);
    }

    #[test]
    fn test_port_range_coverage() {
        let rules = vec![
            pass_to("lan", RuleEndpoint::any().with_port("1000-2000")),
            pass_to("lan", RuleEndpoint::any().with_port("1500:1600")),
            pass_to("lan", RuleEndpoint::any().with_port("2500")),
        ];
        assert_eq!(ids(&RuleAnalyzer.analyze(&doc(rules))), vec![(DEAD_RULE, "1")]);
    }

    #[test]
    fn test_inverted_endpoint_requires_identity() {
        let mut not_lan = RuleEndpoint::network("192.168.0.0/16");
        not_lan.not = true;
        let rules = vec![
            pass_to("lan", not_lan),
            pass_to("lan", RuleEndpoint::host("10.0.0.1")),
        ];
        assert!(RuleAnalyzer.analyze(&doc(rules)).is_empty());
    }

    #[test]
    fn test_non_quick_rule_overridden_by_later_match() {
        let mut tentative = pass_to("lan", RuleEndpoint::host("192.168.1.20"));
        tentative.quick = false;
        let mut catch_all = FilterRule::new("lan", RuleAction::Block);
        catch_all.quick = false;

        let findings = RuleAnalyzer.analyze(&doc(vec![tentative, catch_all]));
        assert_eq!(ids(&findings), vec![(OVERRIDDEN_RULE, "0")]);
        assert_eq!(findings[0].meta_value(MetadataKey::ShadowedBy), Some("1"));
    }

    #[test]
    fn test_disabled_rules_are_ignored() {
        let mut block_all = FilterRule::new("wan", RuleAction::Block);
        block_all.disabled = true;
        let rules = vec![block_all, FilterRule::new("wan", RuleAction::Pass)];
        assert!(RuleAnalyzer.analyze(&doc(rules)).is_empty());
    }

    #[test]
    fn test_floating_rule_reported_once() {
        let floating = FilterRule::new("wan,lan", RuleAction::Block);
        let dead = FilterRule::new("wan,lan", RuleAction::Pass);
        let findings = RuleAnalyzer.analyze(&doc(vec![floating, dead]));
        assert_eq!(ids(&findings), vec![(DEAD_RULE, "1")]);
    }

    #[test]
    fn test_net_contains() {
        assert!(net_contains("10.0.0.0/8", "10.20.30.0/24"));
        assert!(net_contains("0.0.0.0/0", "192.0.2.1"));
        assert!(net_contains("2001:db8::/32", "2001:db8:1::/48"));
        assert!(!net_contains("10.0.0.0/24", "10.0.0.0/8"));
        assert!(!net_contains("10.0.0.0/8", "2001:db8::1"));
        assert!(!net_contains("lan", "lan"));
    }
}
