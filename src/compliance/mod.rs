//! Plugin contract, registry and execution.

pub mod loader;
pub mod manager;
pub mod plugin;
pub mod registry;
pub mod types;

pub use loader::{load_dir, load_module, LoadReport, PluginDeclaration, PLUGIN_ABI_VERSION};
pub use manager::{engine_controls, PluginManager, PluginSelection, RunOutput};
pub use plugin::CompliancePlugin;
pub use registry::PluginRegistry;
pub use types::{
    sort_findings, tags, ComplianceResult, Control, Finding, Metadata, MetadataKey, Severity,
    SourceKind, SourceStatus, SourceSummary,
};
