//! Integration tests for the audit pipeline.
//!
//! These tests run the built-in plugins and analyzers against the
//! testdata fixtures through the mode controller.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use opnaudit::analysis::{builtin_analyzers, AnalyzerOptions};
use opnaudit::compliance::{
    CompliancePlugin, Control, Finding, MetadataKey, PluginManager, PluginRegistry, Severity,
    SourceStatus,
};
use opnaudit::document::Document;
use opnaudit::mode::{ModeController, ReportMode, ReportRequest};
use opnaudit::plugins;
use opnaudit::score::calculate_security_score;
use opnaudit::{AggregatedReport, AuditConfig};

fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

fn load(name: &str) -> Arc<Document> {
    let doc = Document::parse_file(testdata_path().join(name)).expect("should parse fixture");
    Arc::new(doc)
}

fn controller_with(extra: Vec<Arc<dyn CompliancePlugin>>) -> ModeController {
    let registry = PluginRegistry::new();
    plugins::register_builtin(&registry).expect("built-ins should register");
    for plugin in extra {
        registry.register(plugin).expect("extra plugin should register");
    }
    let manager = PluginManager::new(Arc::new(registry));
    ModeController::new(manager, builtin_analyzers(&AnalyzerOptions::default()))
}

fn audit(doc: Arc<Document>, mode: ReportMode) -> AggregatedReport {
    controller_with(Vec::new())
        .generate_blocking(doc, &ReportRequest::new(mode))
        .expect("audit should succeed")
}

fn with_control<'a>(report: &'a AggregatedReport, id: &str) -> Vec<&'a Finding> {
    report.findings.iter().filter(|f| f.control_id == id).collect()
}

struct PanickingPlugin;

impl CompliancePlugin for PanickingPlugin {
    fn name(&self) -> &str {
        "panicky"
    }
    fn version(&self) -> &str {
        "0.0.1"
    }
    fn description(&self) -> &str {
        "panics on every document"
    }
    fn controls(&self) -> Vec<Control> {
        vec![Control::new("PANICKY-001", "Never reported", "testing", Severity::Critical)]
    }
    fn run_checks(&self, _doc: &Document) -> Vec<Finding> {
        panic!("unexpected document shape")
    }
}

struct StuckPlugin;

impl CompliancePlugin for StuckPlugin {
    fn name(&self) -> &str {
        "stuck"
    }
    fn version(&self) -> &str {
        "0.0.1"
    }
    fn description(&self) -> &str {
        "takes far longer than its time limit"
    }
    fn controls(&self) -> Vec<Control> {
        vec![Control::new("STUCK-001", "Never reported", "testing", Severity::High)]
    }
    fn run_checks(&self, _doc: &Document) -> Vec<Finding> {
        std::thread::sleep(Duration::from_secs(3));
        Vec::new()
    }
}

#[test]
fn test_unused_opt1_yields_one_finding() {
    let report = audit(load("opt1_unused.yaml"), ReportMode::Standard);

    let unused = with_control(&report, "IFACE-001");
    assert_eq!(unused.len(), 1, "{:#?}", unused);
    assert_eq!(unused[0].severity, Severity::Low);
    assert_eq!(unused[0].title, "unused interface: opt1");
    assert_eq!(unused[0].affected_object, "opt1");
}

#[test]
fn test_block_all_makes_later_wan_rules_dead() {
    let report = audit(load("block_all_wan.yaml"), ReportMode::Standard);

    let mut dead: Vec<&str> = with_control(&report, "RULE-001")
        .into_iter()
        .filter_map(|f| f.meta_value(MetadataKey::RuleIndex))
        .collect();
    dead.sort_unstable();
    assert_eq!(dead, vec!["1", "2", "3"]);

    for finding in with_control(&report, "RULE-001") {
        assert_eq!(finding.meta_value(MetadataKey::ShadowedBy), Some("0"));
        assert!(finding.has_tag("wan"));
    }
}

#[test]
fn test_consecutive_duplicates_are_not_dead() {
    let report = audit(load("duplicates.yaml"), ReportMode::Standard);

    assert!(with_control(&report, "RULE-001").is_empty());
    let mut duplicates: Vec<&str> = with_control(&report, "RULE-002")
        .into_iter()
        .filter_map(|f| f.meta_value(MetadataKey::RuleIndex))
        .collect();
    duplicates.sort_unstable();
    assert_eq!(duplicates, vec!["1", "2"]);
}

#[test]
fn test_panicking_plugin_does_not_stop_the_run() {
    let controller = controller_with(vec![Arc::new(PanickingPlugin)]);
    let report = controller
        .generate_blocking(load("exposed.json"), &ReportRequest::new(ReportMode::Standard))
        .expect("run should complete");

    let failed = with_control(&report, "ENGINE-001");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].severity, Severity::Info);
    assert_eq!(failed[0].title, "plugin failed: panicky");
    assert!(with_control(&report, "PANICKY-001").is_empty());

    for name in ["firewall", "sans", "stig"] {
        assert!(
            report.summary.by_source.get(name).copied().unwrap_or(0) > 0,
            "expected findings from {}",
            name
        );
    }
    let panicky = report
        .sources
        .iter()
        .find(|s| s.name == "panicky")
        .expect("failed plugin still has a source entry");
    assert_eq!(panicky.status, SourceStatus::Failed);
}

#[test]
fn test_blocking_run_returns_once_unit_times_out() {
    let registry = PluginRegistry::new();
    registry.register(Arc::new(StuckPlugin)).unwrap();
    let manager =
        PluginManager::new(Arc::new(registry)).unit_timeout(Some(Duration::from_millis(50)));
    let controller = ModeController::new(manager, Vec::new());

    let started = Instant::now();
    let report = controller
        .generate_blocking(load("opt1_unused.yaml"), &ReportRequest::new(ReportMode::Standard))
        .expect("run should complete");
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_secs(2), "blocked for {:?}", elapsed);
    let timed_out = with_control(&report, "ENGINE-002");
    assert_eq!(timed_out.len(), 1);
    assert_eq!(timed_out[0].title, "plugin timed out: stuck");
    let stuck = report.sources.iter().find(|s| s.name == "stuck").unwrap();
    assert_eq!(stuck.status, SourceStatus::TimedOut);
}

#[test]
fn test_register_twice_keeps_one() {
    let registry = PluginRegistry::new();
    registry.register(Arc::new(PanickingPlugin)).unwrap();
    let err = registry.register(Arc::new(PanickingPlugin)).unwrap_err();

    assert_eq!(err.to_string(), "plugin already registered: panicky");
    assert_eq!(registry.list().len(), 1);
}

#[test]
fn test_exposed_document_scores_low() {
    let report = audit(load("exposed.json"), ReportMode::Standard);

    assert_eq!(report.score.score, calculate_security_score(&report.findings));
    assert_eq!(report.score.score, 0);
    assert_eq!(report.score.grade, "F");
    assert!(report.has_serious_findings());
    assert!(!with_control(&report, "SEC-003").is_empty());
    assert!(!with_control(&report, "FIREWALL-005").is_empty());
}

#[test]
fn test_report_metadata_describes_document() {
    let report = audit(load("opt1_unused.yaml"), ReportMode::Standard);

    assert_eq!(report.system.hostname, "fw-branch-02");
    assert_eq!(report.system.version.as_deref(), Some("24.1.4"));
    assert_eq!(report.system.interfaces, 3);
    assert_eq!(report.system.filter_rules, 2);
    assert_eq!(report.summary.total, report.findings.len());
    assert!(report.sources.iter().all(|s| s.status == SourceStatus::Completed));
}

#[test]
fn test_config_file_drives_selection() {
    let config = AuditConfig::parse_file(testdata_path().join("audit-config.yaml")).unwrap();
    opnaudit::config::validate(&config).unwrap();

    let registry = PluginRegistry::new();
    plugins::register_builtin(&registry).unwrap();
    let manager = PluginManager::new(Arc::new(registry))
        .selection(config.plugin_selection().unwrap())
        .unit_timeout(config.unit_timeout())
        .run_timeout(config.run_timeout());
    let controller = ModeController::new(manager, builtin_analyzers(&config.analyzer_options()));

    let request = ReportRequest {
        mode: config.get_mode(),
        sections: config.sections.clone(),
        generated_at: config.generated_at,
    };
    let report = controller
        .generate_blocking(load("exposed.json"), &request)
        .unwrap();

    assert_eq!(report.mode, ReportMode::Blue);
    assert_eq!(report.generated_at, config.generated_at.unwrap());
    let names: Vec<&str> = report.sources.iter().map(|s| s.name.as_str()).collect();
    assert!(!names.contains(&"performance"));
    assert!(names.contains(&"sans"));
    assert!(names.contains(&"stig"));
    assert!(names.contains(&"firewall"));
    assert!(report
        .findings
        .iter()
        .all(|f| !f.control_id.starts_with("PERF-")));
}
