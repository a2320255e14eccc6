//! Runs every registered plugin and built-in analyzer against one document.
//!
//! Each plugin/analyzer is one unit of work executed on the blocking pool.
//! Results fan in through a single consumer loop; that loop is the only
//! place shared state is mutated during a run. A unit that panics, runs
//! past its deadline, is still running when the run ends, or returns
//! findings against controls it never declared is converted into an
//! `info` finding so the report stays self-describing about its own
//! completeness.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use globset::{Glob, GlobSet, GlobSetBuilder};
use once_cell::sync::Lazy;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::analysis::Analyzer;
use crate::document::Document;
use crate::error::{AggregationError, AnalysisError, PartialReport};

use super::{
    sort_findings, tags, CompliancePlugin, ComplianceResult, Control, Finding, MetadataKey,
    PluginRegistry, Severity, SourceKind, SourceStatus, SourceSummary,
};

/// Name under which engine diagnostics are reported.
pub const ENGINE_SOURCE: &str = "engine";

pub const UNIT_FAILED: &str = "ENGINE-001";
pub const UNIT_TIMED_OUT: &str = "ENGINE-002";
pub const MALFORMED_FINDING: &str = "ENGINE-003";
pub const UNIT_CANCELLED: &str = "ENGINE-004";

static UNIT_FAILED_CONTROL: Lazy<Control> = Lazy::new(|| {
    Control::new(UNIT_FAILED, "Check failed", "engine", Severity::Info)
        .describe("A plugin or analyzer panicked or was aborted; its controls were not evaluated.")
        .rationale("Findings from a failed check are missing from this report.")
        .remediation("Inspect the plugin log output and report the failure to the plugin author.")
});

static UNIT_TIMED_OUT_CONTROL: Lazy<Control> = Lazy::new(|| {
    Control::new(UNIT_TIMED_OUT, "Check timed out", "engine", Severity::Info)
        .describe("A plugin or analyzer did not finish within the configured time limit.")
        .rationale("Findings from a timed out check are missing from this report.")
        .remediation("Raise the per-check timeout or investigate why the check is slow.")
});

static MALFORMED_FINDING_CONTROL: Lazy<Control> = Lazy::new(|| {
    Control::new(MALFORMED_FINDING, "Malformed finding", "engine", Severity::Info)
        .describe("A check reported a finding against a control it does not declare.")
        .rationale("The original finding cannot be attributed to a known requirement.")
        .remediation("Fix the plugin so every finding references one of its declared controls.")
});

static UNIT_CANCELLED_CONTROL: Lazy<Control> = Lazy::new(|| {
    Control::new(UNIT_CANCELLED, "Check cancelled", "engine", Severity::Info)
        .describe("The run was cancelled before a plugin or analyzer finished.")
        .rationale("Findings from a cancelled check are missing from this report.")
        .remediation("Run the audit again without interrupting it.")
});

/// Controls behind engine diagnostics.
pub fn engine_controls() -> Vec<Control> {
    vec![
        UNIT_FAILED_CONTROL.clone(),
        UNIT_TIMED_OUT_CONTROL.clone(),
        MALFORMED_FINDING_CONTROL.clone(),
        UNIT_CANCELLED_CONTROL.clone(),
    ]
}

/// Which registered plugins take part in a run.
#[derive(Debug, Clone, Default)]
pub struct PluginSelection {
    patterns: Option<GlobSet>,
}

impl PluginSelection {
    /// Every registered plugin.
    pub fn all() -> Self {
        Self::default()
    }

    /// Plugins whose name matches at least one glob. An empty list selects all.
    pub fn from_patterns(patterns: &[String]) -> Result<Self, globset::Error> {
        if patterns.is_empty() {
            return Ok(Self::all());
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            patterns: Some(builder.build()?),
        })
    }

    pub fn includes(&self, name: &str) -> bool {
        self.patterns
            .as_ref()
            .map(|set| set.is_match(name))
            .unwrap_or(true)
    }
}

/// Everything a completed run produced.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    /// One result per plugin, ordered by plugin name.
    pub plugins: Vec<ComplianceResult>,
    /// One result per built-in analyzer, ordered by name.
    pub analyzers: Vec<ComplianceResult>,
    /// Engine diagnostics: failed, timed out or cancelled units and
    /// malformed findings.
    pub engine: ComplianceResult,
    pub errors: Vec<AnalysisError>,
    /// Ordered by kind, then name.
    pub sources: Vec<SourceSummary>,
}

impl RunOutput {
    fn new() -> Self {
        Self {
            engine: ComplianceResult {
                plugin_name: ENGINE_SOURCE.to_string(),
                plugin_version: crate::CORE_VERSION.to_string(),
                controls: engine_controls(),
                findings: Vec::new(),
            },
            ..Self::default()
        }
    }

    /// Analyzer, plugin and engine results.
    pub fn results(&self) -> impl Iterator<Item = &ComplianceResult> {
        self.analyzers
            .iter()
            .chain(self.plugins.iter())
            .chain(std::iter::once(&self.engine))
    }

    /// All findings merged into report order.
    pub fn findings(&self) -> Vec<Finding> {
        let mut findings: Vec<Finding> = self
            .results()
            .flat_map(|r| r.findings.iter().cloned())
            .collect();
        sort_findings(&mut findings);
        findings
    }

    /// Snapshot of a finished run in the shape carried by errors.
    pub fn to_partial(&self) -> PartialReport {
        let units = self
            .sources
            .iter()
            .filter(|s| s.kind != SourceKind::Engine)
            .count();
        PartialReport {
            findings: self.findings(),
            sources: self.sources.clone(),
            completed_units: units,
            total_units: units,
        }
    }

    fn absorb(&mut self, outcome: UnitOutcome) {
        let UnitOutcome {
            kind,
            status,
            result,
            errors,
        } = outcome;

        for (error, rejected) in errors {
            warn!(unit = error.unit(), kind = error.kind(), error = %error, "check did not complete cleanly");
            self.engine
                .findings
                .push(diagnostic_finding(kind, &error, rejected.as_ref()));
            self.errors.push(error);
        }

        self.sources.push(SourceSummary {
            name: result.plugin_name.clone(),
            version: result.plugin_version.clone(),
            kind,
            status,
            controls: result.controls.len(),
            findings: result.findings.len(),
        });

        match kind {
            SourceKind::Plugin => self.plugins.push(result),
            SourceKind::Analyzer | SourceKind::Engine => self.analyzers.push(result),
        }
    }

    /// Fix the order of everything collected; fan-in order is arbitrary.
    fn finish(&mut self) {
        self.plugins.sort_by(|a, b| a.plugin_name.cmp(&b.plugin_name));
        self.analyzers.sort_by(|a, b| a.plugin_name.cmp(&b.plugin_name));
        for result in self
            .plugins
            .iter_mut()
            .chain(self.analyzers.iter_mut())
            .chain(std::iter::once(&mut self.engine))
        {
            sort_findings(&mut result.findings);
        }
        self.errors.sort_by(|a, b| {
            a.unit()
                .cmp(b.unit())
                .then_with(|| a.to_string().cmp(&b.to_string()))
        });

        if !self.engine.findings.is_empty() {
            self.sources.push(SourceSummary {
                name: ENGINE_SOURCE.to_string(),
                version: crate::CORE_VERSION.to_string(),
                kind: SourceKind::Engine,
                status: SourceStatus::Completed,
                controls: self.engine.controls.len(),
                findings: self.engine.findings.len(),
            });
        }
        self.sources
            .sort_by(|a, b| kind_rank(a.kind).cmp(&kind_rank(b.kind)).then_with(|| a.name.cmp(&b.name)));
    }

    /// Close out a run that ended early. Every unit in `expected` without a
    /// source entry is reported with `error_for` and marked `status`.
    fn into_partial(
        mut self,
        expected: &[UnitId],
        status: SourceStatus,
        error_for: impl Fn(&str) -> AnalysisError,
    ) -> PartialReport {
        let completed_units = self.sources.len();
        for unit in expected {
            let finished = self
                .sources
                .iter()
                .any(|s| s.kind == unit.kind && s.name == unit.name);
            if finished {
                continue;
            }
            let error = error_for(&unit.name);
            self.engine
                .findings
                .push(diagnostic_finding(unit.kind, &error, None));
            self.errors.push(error);
            self.sources.push(SourceSummary {
                name: unit.name.clone(),
                version: unit.version.clone(),
                kind: unit.kind,
                status,
                controls: 0,
                findings: 0,
            });
        }
        self.finish();
        PartialReport {
            findings: self.findings(),
            sources: self.sources,
            completed_units,
            total_units: expected.len(),
        }
    }
}

/// Identity of a scheduled unit, recorded before fan-out.
struct UnitId {
    kind: SourceKind,
    name: String,
    version: String,
}

fn kind_rank(kind: SourceKind) -> u8 {
    match kind {
        SourceKind::Analyzer => 0,
        SourceKind::Plugin => 1,
        SourceKind::Engine => 2,
    }
}

/// Orchestrates one analysis run.
pub struct PluginManager {
    registry: Arc<PluginRegistry>,
    selection: PluginSelection,
    unit_timeout: Option<Duration>,
    run_timeout: Option<Duration>,
}

impl PluginManager {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self {
            registry,
            selection: PluginSelection::all(),
            unit_timeout: None,
            run_timeout: None,
        }
    }

    pub fn selection(mut self, selection: PluginSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Deadline for each plugin or analyzer.
    pub fn unit_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.unit_timeout = timeout;
        self
    }

    /// Deadline for the whole run.
    pub fn run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Plugins that take part in a run, ordered by name.
    pub fn selected_plugins(&self) -> Vec<Arc<dyn CompliancePlugin>> {
        self.registry
            .list()
            .into_iter()
            .filter(|p| self.selection.includes(p.name()))
            .collect()
    }

    /// Run the analyzers and every selected plugin concurrently.
    ///
    /// Returns [`AggregationError::Cancelled`] or
    /// [`AggregationError::TimedOut`] with the findings gathered so far if
    /// the run is cut short.
    pub async fn run(
        &self,
        doc: Arc<Document>,
        analyzers: &[Arc<dyn Analyzer>],
        cancel: &CancellationToken,
    ) -> Result<RunOutput, AggregationError> {
        let mut units: Vec<Checker> = analyzers.iter().cloned().map(Checker::Analyzer).collect();
        units.extend(self.selected_plugins().into_iter().map(Checker::Plugin));
        let expected: Vec<UnitId> = units
            .iter()
            .map(|unit| UnitId {
                kind: unit.kind(),
                name: unit.name(),
                version: unit.version(),
            })
            .collect();
        let total = expected.len();
        debug!(units = total, "starting analysis run");

        let mut pending: FuturesUnordered<_> = units
            .into_iter()
            .map(|unit| run_unit(unit, Arc::clone(&doc), self.unit_timeout))
            .collect();

        let deadline = async {
            match self.run_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut output = RunOutput::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(completed = output.sources.len(), total, "analysis run cancelled");
                    let partial = output.into_partial(&expected, SourceStatus::Cancelled, |unit| {
                        AnalysisError::Cancelled { unit: unit.to_string() }
                    });
                    return Err(AggregationError::Cancelled {
                        partial: Box::new(partial),
                    });
                }
                _ = &mut deadline => {
                    let timeout = self.run_timeout.unwrap_or_default();
                    warn!(completed = output.sources.len(), total, ?timeout, "analysis run timed out");
                    let partial = output.into_partial(&expected, SourceStatus::TimedOut, |unit| {
                        AnalysisError::TimedOut { unit: unit.to_string(), timeout }
                    });
                    return Err(AggregationError::TimedOut {
                        timeout,
                        partial: Box::new(partial),
                    });
                }
                next = pending.next() => match next {
                    Some(outcome) => output.absorb(outcome),
                    None => break,
                },
            }
        }

        output.finish();
        debug!(
            plugins = output.plugins.len(),
            analyzers = output.analyzers.len(),
            errors = output.errors.len(),
            "analysis run complete"
        );
        Ok(output)
    }
}

/// One schedulable check.
#[derive(Clone)]
enum Checker {
    Plugin(Arc<dyn CompliancePlugin>),
    Analyzer(Arc<dyn Analyzer>),
}

impl Checker {
    fn name(&self) -> String {
        match self {
            Checker::Plugin(p) => p.name().to_string(),
            Checker::Analyzer(a) => a.name().to_string(),
        }
    }

    fn version(&self) -> String {
        match self {
            Checker::Plugin(p) => p.version().to_string(),
            Checker::Analyzer(_) => crate::CORE_VERSION.to_string(),
        }
    }

    fn kind(&self) -> SourceKind {
        match self {
            Checker::Plugin(_) => SourceKind::Plugin,
            Checker::Analyzer(_) => SourceKind::Analyzer,
        }
    }

    fn evaluate(&self, doc: &Document) -> (Vec<Control>, Vec<Finding>) {
        match self {
            Checker::Plugin(p) => (p.controls(), p.run_checks(doc)),
            Checker::Analyzer(a) => (a.controls(), a.analyze(doc)),
        }
    }
}

struct UnitOutcome {
    kind: SourceKind,
    status: SourceStatus,
    result: ComplianceResult,
    /// Each error with the finding it rejected, if any.
    errors: Vec<(AnalysisError, Option<Finding>)>,
}

impl UnitOutcome {
    fn failed(name: String, version: String, kind: SourceKind, error: AnalysisError) -> Self {
        let status = match error {
            AnalysisError::TimedOut { .. } => SourceStatus::TimedOut,
            _ => SourceStatus::Failed,
        };
        Self {
            kind,
            status,
            result: ComplianceResult {
                plugin_name: name,
                plugin_version: version,
                controls: Vec::new(),
                findings: Vec::new(),
            },
            errors: vec![(error, None)],
        }
    }

    fn completed(
        name: String,
        version: String,
        kind: SourceKind,
        controls: Vec<Control>,
        findings: Vec<Finding>,
    ) -> Self {
        let (findings, errors) = reconcile(&name, &controls, findings);
        Self {
            kind,
            status: SourceStatus::Completed,
            result: ComplianceResult {
                plugin_name: name,
                plugin_version: version,
                controls,
                findings,
            },
            errors,
        }
    }
}

async fn run_unit(checker: Checker, doc: Arc<Document>, timeout: Option<Duration>) -> UnitOutcome {
    let name = checker.name();
    let version = checker.version();
    let kind = checker.kind();
    debug!(unit = %name, %kind, "starting check");

    let handle = tokio::task::spawn_blocking(move || checker.evaluate(&doc));
    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                let error = AnalysisError::TimedOut {
                    unit: name.clone(),
                    timeout: limit,
                };
                return UnitOutcome::failed(name, version, kind, error);
            }
        },
        None => handle.await,
    };

    match joined {
        Ok((controls, findings)) => {
            debug!(unit = %name, findings = findings.len(), "check finished");
            UnitOutcome::completed(name, version, kind, controls, findings)
        }
        Err(e) if e.is_panic() => {
            let error = AnalysisError::Panicked {
                unit: name.clone(),
                message: panic_message(e.into_panic()),
            };
            UnitOutcome::failed(name, version, kind, error)
        }
        Err(_) => {
            let error = AnalysisError::Aborted { unit: name.clone() };
            UnitOutcome::failed(name, version, kind, error)
        }
    }
}

/// Check every finding against the declared controls.
///
/// Findings against undeclared controls are rejected and later reported as
/// engine findings. A severity that differs from the control default without
/// a recorded justification is reset to the default.
fn reconcile(
    unit: &str,
    controls: &[Control],
    findings: Vec<Finding>,
) -> (Vec<Finding>, Vec<(AnalysisError, Option<Finding>)>) {
    let declared: HashMap<&str, &Control> = controls.iter().map(|c| (c.id.as_str(), c)).collect();
    let mut accepted = Vec::with_capacity(findings.len());
    let mut errors = Vec::new();

    for mut finding in findings {
        let Some(control) = declared.get(finding.control_id.as_str()) else {
            let error = AnalysisError::Malformed {
                unit: unit.to_string(),
                reason: format!(
                    "finding {:?} references undeclared control {}",
                    finding.title, finding.control_id
                ),
            };
            errors.push((error, Some(finding)));
            continue;
        };

        if finding.severity != control.severity
            && finding.meta_value(MetadataKey::SeverityOverride).is_none()
        {
            warn!(
                unit,
                control = %control.id,
                reported = %finding.severity,
                declared = %control.severity,
                "severity override without justification, using control default"
            );
            let reported = finding.severity;
            finding.set_meta(MetadataKey::NormalizedFrom, reported.as_str());
            finding.severity = control.severity;
        }

        accepted.push(finding);
    }

    (accepted, errors)
}

/// Synthetic finding describing a unit that did not complete cleanly.
fn diagnostic_finding(kind: SourceKind, error: &AnalysisError, rejected: Option<&Finding>) -> Finding {
    let unit = error.unit();
    let (control, title) = match error {
        AnalysisError::Panicked { .. } | AnalysisError::Aborted { .. } => {
            (&*UNIT_FAILED_CONTROL, format!("{} failed: {}", kind, unit))
        }
        AnalysisError::TimedOut { .. } => {
            (&*UNIT_TIMED_OUT_CONTROL, format!("{} timed out: {}", kind, unit))
        }
        AnalysisError::Cancelled { .. } => {
            (&*UNIT_CANCELLED_CONTROL, format!("{} cancelled: {}", kind, unit))
        }
        AnalysisError::Malformed { .. } => (
            &*MALFORMED_FINDING_CONTROL,
            format!("{} returned a malformed finding: {}", kind, unit),
        ),
    };

    let mut finding = Finding::from_control(control)
        .title(title)
        .describe(error.to_string())
        .affected(unit)
        .tag(tags::ENGINE)
        .meta(MetadataKey::FailedUnit, unit)
        .meta(MetadataKey::FailureKind, error.kind());

    if let Some(original) = rejected {
        finding.set_meta(MetadataKey::OriginalControl, original.control_id.as_str());
        finding.set_meta(MetadataKey::OriginalTitle, original.title.as_str());
    }
    finding
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    struct FixedPlugin {
        name: &'static str,
        findings: Vec<Finding>,
    }

    fn control() -> Control {
        Control::new("FIXED-001", "Fixed control", "testing", Severity::Medium)
    }

    impl CompliancePlugin for FixedPlugin {
        fn name(&self) -> &str {
            self.name
        }
        fn version(&self) -> &str {
            "1.0.0"
        }
        fn description(&self) -> &str {
            "returns canned findings"
        }
        fn validate_configuration(&self) -> Result<(), ValidationError> {
            Ok(())
        }
        fn controls(&self) -> Vec<Control> {
            vec![control()]
        }
        fn run_checks(&self, _doc: &Document) -> Vec<Finding> {
            self.findings.clone()
        }
    }

    struct PanickingPlugin;

    impl CompliancePlugin for PanickingPlugin {
        fn name(&self) -> &str {
            "panicky"
        }
        fn version(&self) -> &str {
            "0.1.0"
        }
        fn description(&self) -> &str {
            "always panics"
        }
        fn controls(&self) -> Vec<Control> {
            vec![Control::new("PANIC-001", "Never reported", "testing", Severity::High)]
        }
        fn run_checks(&self, _doc: &Document) -> Vec<Finding> {
            panic!("rule table corrupted")
        }
    }

    struct SlowPlugin;

    impl CompliancePlugin for SlowPlugin {
        fn name(&self) -> &str {
            "slow"
        }
        fn version(&self) -> &str {
            "0.1.0"
        }
        fn description(&self) -> &str {
            "sleeps"
        }
        fn controls(&self) -> Vec<Control> {
            vec![Control::new("SLOW-001", "Slow", "testing", Severity::Low)]
        }
        fn run_checks(&self, _doc: &Document) -> Vec<Finding> {
            std::thread::sleep(Duration::from_millis(500));
            Vec::new()
        }
    }

    fn manager(plugins: Vec<Arc<dyn CompliancePlugin>>) -> PluginManager {
        let registry = PluginRegistry::new();
        for plugin in plugins {
            registry.register(plugin).unwrap();
        }
        PluginManager::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_panicking_plugin_is_isolated() {
        let fixed = FixedPlugin {
            name: "fixed",
            findings: vec![Finding::from_control(&control()).affected("lan")],
        };
        let manager = manager(vec![Arc::new(fixed), Arc::new(PanickingPlugin)]);

        let output = manager
            .run(Arc::new(Document::default()), &[], &CancellationToken::new())
            .await
            .unwrap();

        let findings = output.findings();
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().any(|f| f.control_id == "FIXED-001"));

        let failure = findings
            .iter()
            .find(|f| f.control_id == UNIT_FAILED)
            .expect("failure finding");
        assert_eq!(failure.severity, Severity::Info);
        assert_eq!(failure.title, "plugin failed: panicky");
        assert!(failure.description.contains("rule table corrupted"));
        assert_eq!(output.errors.len(), 1);

        let panicky = output.sources.iter().find(|s| s.name == "panicky").unwrap();
        assert_eq!(panicky.status, SourceStatus::Failed);
    }

    #[tokio::test]
    async fn test_slow_plugin_times_out() {
        let manager = manager(vec![Arc::new(SlowPlugin)]).unit_timeout(Some(Duration::from_millis(20)));

        let output = manager
            .run(Arc::new(Document::default()), &[], &CancellationToken::new())
            .await
            .unwrap();

        let findings = output.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].control_id, UNIT_TIMED_OUT);
        assert_eq!(findings[0].title, "plugin timed out: slow");
        assert_eq!(output.sources[0].status, SourceStatus::TimedOut);
    }

    #[tokio::test]
    async fn test_cancelled_run_returns_partial() {
        let manager = manager(vec![Arc::new(SlowPlugin)]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = manager
            .run(Arc::new(Document::default()), &[], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AggregationError::Cancelled { .. }));
        assert_eq!(err.partial().total_units, 1);
        assert_eq!(err.partial().completed_units, 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_run_reports_unfinished_units() {
        let fixed = FixedPlugin {
            name: "fixed",
            findings: vec![Finding::from_control(&control())],
        };
        let manager = manager(vec![Arc::new(fixed), Arc::new(SlowPlugin)]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = manager
            .run(Arc::new(Document::default()), &[], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AggregationError::Cancelled { .. }));
        let partial = err.into_partial();
        assert_eq!(partial.completed_units, 1);
        assert_eq!(partial.total_units, 2);

        let cancelled: Vec<&Finding> = partial
            .findings
            .iter()
            .filter(|f| f.control_id == UNIT_CANCELLED)
            .collect();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].title, "plugin cancelled: slow");
        assert_eq!(cancelled[0].severity, Severity::Info);
        assert!(partial.findings.iter().any(|f| f.control_id == "FIXED-001"));

        let slow = partial.sources.iter().find(|s| s.name == "slow").unwrap();
        assert_eq!(slow.status, SourceStatus::Cancelled);
        assert_eq!(slow.kind, SourceKind::Plugin);
    }

    #[tokio::test]
    async fn test_run_timeout_returns_partial() {
        let fixed = FixedPlugin {
            name: "fixed",
            findings: vec![Finding::from_control(&control())],
        };
        let manager = manager(vec![Arc::new(fixed), Arc::new(SlowPlugin)])
            .run_timeout(Some(Duration::from_millis(100)));

        let err = manager
            .run(Arc::new(Document::default()), &[], &CancellationToken::new())
            .await
            .unwrap_err();
        let partial = err.into_partial();
        assert_eq!(partial.total_units, 2);
        assert_eq!(partial.completed_units, 1);
        assert_eq!(partial.findings.len(), 2);
        assert!(partial.findings.iter().any(|f| f.control_id == "FIXED-001"));

        let timed_out = partial
            .findings
            .iter()
            .find(|f| f.control_id == UNIT_TIMED_OUT)
            .expect("unfinished unit is reported");
        assert_eq!(timed_out.affected_object, "slow");
        let slow = partial.sources.iter().find(|s| s.name == "slow").unwrap();
        assert_eq!(slow.status, SourceStatus::TimedOut);
    }

    #[tokio::test]
    async fn test_undeclared_control_is_reported() {
        let bogus = Finding::from_control(&Control::new("OTHER-042", "Bogus", "x", Severity::High));
        let fixed = FixedPlugin {
            name: "fixed",
            findings: vec![bogus],
        };
        let manager = manager(vec![Arc::new(fixed)]);

        let output = manager
            .run(Arc::new(Document::default()), &[], &CancellationToken::new())
            .await
            .unwrap();

        assert!(output.plugins[0].findings.is_empty());
        let findings = output.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].control_id, MALFORMED_FINDING);
        assert_eq!(findings[0].meta_value(MetadataKey::OriginalControl), Some("OTHER-042"));
    }

    #[test]
    fn test_unjustified_severity_is_normalized() {
        let mut raised = Finding::from_control(&control());
        raised.severity = Severity::Critical;
        let justified = Finding::from_control(&control()).override_severity(Severity::High, "on WAN");

        let (findings, errors) = reconcile("fixed", &[control()], vec![raised, justified]);
        assert!(errors.is_empty());
        assert_eq!(findings[0].severity, Severity::Medium);
        assert_eq!(findings[0].meta_value(MetadataKey::NormalizedFrom), Some("critical"));
        assert_eq!(findings[1].severity, Severity::High);
    }

    #[test]
    fn test_plugin_selection() {
        let selection = PluginSelection::from_patterns(&["st*".to_string()]).unwrap();
        assert!(selection.includes("stig"));
        assert!(!selection.includes("sans"));
        assert!(PluginSelection::all().includes("anything"));
        assert!(PluginSelection::from_patterns(&["[".to_string()]).is_err());
    }
}
