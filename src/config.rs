//! Audit configuration file.
//!
//! An audit config selects the report mode, which plugins and analyzers run,
//! and the limits applied to a run. Every field is optional.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalyzerOptions, ANALYZER_NAMES, DEFAULT_RULE_COUNT_THRESHOLD};
use crate::compliance::{PluginSelection, Severity};
use crate::mode::ReportMode;

/// Top-level audit configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AuditConfig {
    /// "standard" (default), "blue" or "red"
    #[serde(default)]
    pub mode: Option<ReportMode>,
    /// Glob patterns of plugin names to run. Empty runs every plugin.
    #[serde(default)]
    pub plugins: Vec<String>,
    /// Built-in analyzers to skip, by name.
    #[serde(default)]
    pub disabled_analyzers: Vec<String>,
    /// Directory scanned for dynamically loaded plugins.
    #[serde(default)]
    pub plugin_dir: Option<PathBuf>,
    /// Per plugin or analyzer limit, in seconds.
    #[serde(default)]
    pub unit_timeout_secs: Option<u64>,
    /// Limit for the whole run, in seconds.
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
    /// Enabled filter rules above which PERF-002 is raised.
    #[serde(default)]
    pub rule_count_threshold: Option<usize>,
    /// Sections to include. Empty includes every section of the mode.
    #[serde(default)]
    pub sections: Vec<String>,
    /// Findings below this severity are left out of custom reports.
    #[serde(default)]
    pub min_severity: Option<Severity>,
    /// Fixed report timestamp for reproducible output.
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
}

impl AuditConfig {
    /// Parse a config from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: AuditConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Returns the report mode (defaults to standard).
    pub fn get_mode(&self) -> ReportMode {
        self.mode.unwrap_or_default()
    }

    pub fn unit_timeout(&self) -> Option<Duration> {
        self.unit_timeout_secs.map(Duration::from_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    pub fn plugin_selection(&self) -> anyhow::Result<PluginSelection> {
        Ok(PluginSelection::from_patterns(&self.plugins)?)
    }

    pub fn analyzer_options(&self) -> AnalyzerOptions {
        AnalyzerOptions {
            rule_count_threshold: self
                .rule_count_threshold
                .unwrap_or(DEFAULT_RULE_COUNT_THRESHOLD),
            disabled: self.disabled_analyzers.clone(),
        }
    }
}

/// Validate a config after parsing.
pub fn validate(config: &AuditConfig) -> anyhow::Result<()> {
    let mode = config.get_mode();
    for section in &config.sections {
        if !mode.supports(section) {
            anyhow::bail!(
                "section {:?} is not available in {} mode (available: {})",
                section,
                mode,
                mode.sections().join(", ")
            );
        }
    }

    for name in &config.disabled_analyzers {
        if !ANALYZER_NAMES.contains(&name.as_str()) {
            anyhow::bail!(
                "unknown analyzer {:?} in disabled_analyzers (known: {})",
                name,
                ANALYZER_NAMES.join(", ")
            );
        }
    }

    for pattern in &config.plugins {
        if let Err(e) = globset::Glob::new(pattern) {
            anyhow::bail!("invalid plugin pattern {:?}: {}", pattern, e);
        }
    }

    if config.unit_timeout_secs == Some(0) {
        anyhow::bail!("unit_timeout_secs must be greater than zero");
    }
    if config.run_timeout_secs == Some(0) {
        anyhow::bail!("run_timeout_secs must be greater than zero");
    }
    if config.rule_count_threshold == Some(0) {
        anyhow::bail!("rule_count_threshold must be greater than zero");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
mode: blue
plugins: ["stig", "san*"]
disabled_analyzers: [performance]
unit_timeout_secs: 5
sections: [Recommendations]
min_severity: medium
generated_at: "2024-01-01T00:00:00Z"
"#;
        let config: AuditConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.get_mode(), ReportMode::Blue);
        assert_eq!(config.unit_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.run_timeout(), None);
        assert_eq!(config.min_severity, Some(Severity::Medium));
        assert!(config.plugin_selection().unwrap().includes("sans"));
        assert!(!config.plugin_selection().unwrap().includes("firewall"));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_config_defaults() {
        let config: AuditConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.get_mode(), ReportMode::Standard);
        assert_eq!(
            config.analyzer_options().rule_count_threshold,
            DEFAULT_RULE_COUNT_THRESHOLD
        );
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_validate_rejects_foreign_section() {
        let config = AuditConfig {
            mode: Some(ReportMode::Standard),
            sections: vec!["AttackSurfaces".to_string()],
            ..Default::default()
        };
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("not available in standard mode"));
    }

    #[test]
    fn test_validate_rejects_unknown_analyzer() {
        let config = AuditConfig {
            disabled_analyzers: vec!["nope".to_string()],
            ..Default::default()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opnaudit.yaml");
        fs::write(&path, "mode: red\nrun_timeout_secs: 30\n").unwrap();

        let config = AuditConfig::parse_file(&path).unwrap();
        assert_eq!(config.get_mode(), ReportMode::Red);
        assert_eq!(config.run_timeout(), Some(Duration::from_secs(30)));
    }
}
