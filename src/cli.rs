//! Command-line interface for opnaudit.

use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::analysis::builtin_analyzers;
use crate::compliance::{load_dir, PluginManager, PluginRegistry, Severity};
use crate::config::{self, AuditConfig};
use crate::document::Document;
use crate::error::RegistrationError;
use crate::mode::{ModeController, ReportMode, ReportRequest};
use crate::plugins;
use crate::report::{self, OutputFormat, ReportBuilder, ReportOptions, StructuredReportBuilder};

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// How long shutdown waits for checks still running after a timeout.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Compliance and security audit for firewall appliance configurations.
///
/// opnaudit reads a parsed configuration export, runs compliance plugins
/// and built-in analyzers over it, and prints a scored report framed for
/// operators (standard), defenders (blue) or attackers (red).
#[derive(Parser)]
#[command(name = "opnaudit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Audit a configuration document
    Audit(AuditArgs),
    /// List registered plugins, analyzers and their controls
    Plugins(PluginsArgs),
}

/// Arguments for the audit command.
#[derive(Parser)]
pub struct AuditArgs {
    /// Parsed configuration export (JSON or YAML)
    pub document: PathBuf,

    /// Path to an audit config YAML file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Report mode: standard, blue, or red
    #[arg(short, long)]
    pub mode: Option<String>,

    /// Output format: json or yaml
    #[arg(short, long, default_value = "json")]
    pub format: String,

    /// Directory of dynamically loaded plugin modules
    #[arg(long)]
    pub plugin_dir: Option<PathBuf>,

    /// Only include this section (repeatable)
    #[arg(short, long = "section")]
    pub sections: Vec<String>,

    /// Only run plugins matching this glob (repeatable)
    #[arg(short, long = "plugin")]
    pub plugins: Vec<String>,

    /// Leave out findings below this severity
    #[arg(long)]
    pub min_severity: Option<String>,

    /// Do not print the score summary
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the plugins command.
#[derive(Parser)]
pub struct PluginsArgs {
    /// Directory of dynamically loaded plugin modules
    #[arg(long)]
    pub plugin_dir: Option<PathBuf>,
}

/// Per-user plugin directory, used when neither flag nor config names one.
pub fn default_plugin_dir() -> Option<PathBuf> {
    ProjectDirs::from("org", "opnaudit", "opnaudit").map(|dirs| dirs.data_dir().join("plugins"))
}

/// Register built-in plugins, then every module in `dir`.
///
/// A module that fails its own validation is skipped. Any other loading
/// problem is fatal: a report missing a plugin the operator installed
/// would look complete when it is not.
fn build_registry(dir: Option<PathBuf>) -> anyhow::Result<Arc<PluginRegistry>> {
    let registry = PluginRegistry::new();
    plugins::register_builtin(&registry)?;

    if let Some(dir) = dir.or_else(default_plugin_dir) {
        let loaded = load_dir(&registry, &dir);
        debug!(dir = %dir.display(), loaded = loaded.loaded.len(), "plugin discovery finished");
        for (path, err) in &loaded.skipped {
            if matches!(err, RegistrationError::Validation { .. }) {
                warn!(path = %path.display(), error = %err, "plugin excluded");
                continue;
            }
            anyhow::bail!("{}", err);
        }
    }

    Ok(Arc::new(registry))
}

/// Fold command-line overrides into the file config.
fn resolve_config(args: &AuditArgs) -> anyhow::Result<AuditConfig> {
    let mut config = match &args.config {
        Some(path) => AuditConfig::parse_file(path)
            .map_err(|e| anyhow::anyhow!("error parsing config {}: {}", path.display(), e))?,
        None => AuditConfig::default(),
    };

    if let Some(mode) = &args.mode {
        config.mode = Some(mode.parse::<ReportMode>().map_err(anyhow::Error::msg)?);
    }
    if let Some(severity) = &args.min_severity {
        config.min_severity = Some(severity.parse::<Severity>().map_err(anyhow::Error::msg)?);
    }
    if !args.sections.is_empty() {
        config.sections = args.sections.clone();
    }
    if !args.plugins.is_empty() {
        config.plugins = args.plugins.clone();
    }
    if args.plugin_dir.is_some() {
        config.plugin_dir = args.plugin_dir.clone();
    }

    config::validate(&config).map_err(|e| anyhow::anyhow!("invalid config: {}", e))?;
    Ok(config)
}

/// Run the audit command.
pub fn run_audit(args: &AuditArgs) -> anyhow::Result<i32> {
    let format: OutputFormat = match args.format.parse() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let config = match resolve_config(args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let doc = match Document::parse_file(&args.document) {
        Ok(d) => Arc::new(d),
        Err(e) => {
            eprintln!("Error reading document {}: {}", args.document.display(), e);
            return Ok(EXIT_ERROR);
        }
    };

    let registry = build_registry(config.plugin_dir.clone())?;
    let manager = PluginManager::new(registry)
        .selection(config.plugin_selection()?)
        .unit_timeout(config.unit_timeout())
        .run_timeout(config.run_timeout());
    let controller = ModeController::new(manager, builtin_analyzers(&config.analyzer_options()));

    let request = ReportRequest {
        mode: config.get_mode(),
        sections: config.sections.clone(),
        generated_at: config.generated_at,
    };

    let runtime = tokio::runtime::Runtime::new()?;
    let cancel = CancellationToken::new();
    let outcome = runtime.block_on(async {
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling analysis");
                on_interrupt.cancel();
            }
        });
        controller.generate(doc, &request, &cancel).await
    });
    // Checks abandoned after a timeout may still be running.
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    let builder = StructuredReportBuilder::new(format);
    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            println!("{}", builder.build_partial_report(e.partial())?);
            return Ok(EXIT_ERROR);
        }
    };

    let options = ReportOptions {
        sections: request.sections.clone(),
        min_severity: config.min_severity,
        include_sources: true,
    };
    let rendered = if options.min_severity.is_none() {
        builder.build_standard_report(&report)?
    } else {
        builder.build_custom_report(&report, &options)?
    };
    println!("{}", rendered);

    if !args.quiet {
        report::write_score_summary(&report);
    }

    if report.has_serious_findings() {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

/// Run the plugins command.
pub fn run_plugins(args: &PluginsArgs) -> anyhow::Result<i32> {
    let registry = build_registry(args.plugin_dir.clone())?;

    println!("Plugins:");
    println!();
    for plugin in registry.list() {
        println!(
            "  {:<12} {:<8} {}",
            plugin.name(),
            plugin.version(),
            plugin.description()
        );
        for control in plugin.controls() {
            println!(
                "    {:<14} {:<8} {}",
                control.id,
                control.severity.as_str(),
                control.title
            );
        }
        println!();
    }

    println!("Analyzers:");
    println!();
    for analyzer in builtin_analyzers(&Default::default()) {
        println!("  {}", analyzer.name());
        for control in analyzer.controls() {
            println!(
                "    {:<14} {:<8} {}",
                control.id,
                control.severity.as_str(),
                control.title
            );
        }
        println!();
    }

    Ok(EXIT_SUCCESS)
}
