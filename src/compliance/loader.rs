//! Discovery of compliance plugins built as shared objects.
//!
//! A plugin module is a `cdylib` built against the same `opnaudit` version
//! and toolchain as the host. It exports exactly one symbol,
//! `opnaudit_plugin_declaration`, created with [`export_plugin!`](crate::export_plugin):
//!
//! ```ignore
//! use opnaudit::export_plugin;
//!
//! export_plugin!(MyPlugin::new);
//! ```
//!
//! Modules that fail to load are logged and skipped; they never prevent
//! the remaining plugins from registering.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::document::Document;
use crate::error::{RegistrationError, ValidationError};

use super::{CompliancePlugin, Control, Finding, PluginRegistry};

/// Bumped whenever [`PluginDeclaration`] or [`CompliancePlugin`] change shape.
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// Name of the symbol every plugin module exports.
pub const DECLARATION_SYMBOL: &str = "opnaudit_plugin_declaration";

/// File extensions recognized as loadable modules.
const MODULE_EXTENSIONS: &[&str] = &["so", "dylib", "dll"];

/// The single exported symbol of a plugin module.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PluginDeclaration {
    /// Must be the first field so it can be checked before anything else.
    pub abi_version: u32,
    /// `opnaudit` version the module was compiled against.
    pub core_version: &'static str,
    pub create: fn() -> Box<dyn CompliancePlugin>,
}

/// Declare the plugin a module exports.
#[macro_export]
macro_rules! export_plugin {
    ($constructor:path) => {
        fn __opnaudit_create_plugin() -> ::std::boxed::Box<dyn $crate::compliance::CompliancePlugin> {
            ::std::boxed::Box::new($constructor())
        }

        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static opnaudit_plugin_declaration: $crate::compliance::PluginDeclaration =
            $crate::compliance::PluginDeclaration {
                abi_version: $crate::compliance::PLUGIN_ABI_VERSION,
                core_version: $crate::CORE_VERSION,
                create: __opnaudit_create_plugin,
            };
    };
}

/// Outcome of scanning a plugin directory.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Names of plugins registered from modules.
    pub loaded: Vec<String>,
    /// Modules that could not be registered.
    pub skipped: Vec<(PathBuf, RegistrationError)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// A plugin whose code lives in a loaded library.
///
/// Field order matters: the plugin must drop before the library that
/// holds its vtable.
struct DynamicPlugin {
    plugin: Box<dyn CompliancePlugin>,
    _library: Arc<Library>,
}

impl CompliancePlugin for DynamicPlugin {
    fn name(&self) -> &str {
        self.plugin.name()
    }

    fn version(&self) -> &str {
        self.plugin.version()
    }

    fn description(&self) -> &str {
        self.plugin.description()
    }

    fn validate_configuration(&self) -> Result<(), ValidationError> {
        self.plugin.validate_configuration()
    }

    fn controls(&self) -> Vec<Control> {
        self.plugin.controls()
    }

    fn run_checks(&self, doc: &Document) -> Vec<Finding> {
        self.plugin.run_checks(doc)
    }
}

/// Whether a path looks like a loadable module.
pub fn is_plugin_module(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| MODULE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Scan `dir` (non-recursively) and register every plugin module found.
///
/// A missing directory yields an empty report.
pub fn load_dir(registry: &PluginRegistry, dir: &Path) -> LoadReport {
    let mut report = LoadReport::default();

    if !dir.is_dir() {
        debug!(dir = %dir.display(), "plugin directory not present, skipping discovery");
        return report;
    }

    let entries = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                warn!(path = %path.display(), error = %e, "skipping unreadable plugin entry");
                report.skipped.push((
                    path.clone(),
                    RegistrationError::Scan {
                        path,
                        message: e.to_string(),
                    },
                ));
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() || !is_plugin_module(path) {
            continue;
        }

        match load_module(path).and_then(|plugin| {
            let name = plugin.name().to_string();
            registry.register(plugin).map(|()| name)
        }) {
            Ok(name) => {
                info!(plugin = %name, path = %path.display(), "loaded dynamic plugin");
                report.loaded.push(name);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping plugin module");
                report.skipped.push((path.to_path_buf(), e));
            }
        }
    }

    report
}

/// Open one module and construct its plugin.
pub fn load_module(path: &Path) -> Result<Arc<dyn CompliancePlugin>, RegistrationError> {
    // SAFETY: loading runs the module's initializers. Modules are trusted
    // inputs placed in the plugin directory by the operator.
    let library = unsafe { Library::new(path) }.map_err(|source| RegistrationError::Load {
        path: path.to_path_buf(),
        source,
    })?;

    let declaration = {
        // SAFETY: the symbol is a `PluginDeclaration` static when the module
        // was built with `export_plugin!`; the ABI version is checked before
        // any other field is used.
        let symbol = unsafe {
            library.get::<*const PluginDeclaration>(DECLARATION_SYMBOL.as_bytes())
        }
        .map_err(|source| RegistrationError::MissingSymbol {
            path: path.to_path_buf(),
            symbol: DECLARATION_SYMBOL,
            source,
        })?;
        let pointer: *const PluginDeclaration = *symbol;

        // SAFETY: `abi_version` is the first field of a `repr(C)` struct.
        let abi_version = unsafe { std::ptr::read(pointer as *const u32) };
        if abi_version != PLUGIN_ABI_VERSION {
            return Err(RegistrationError::AbiMismatch {
                path: path.to_path_buf(),
                expected: PLUGIN_ABI_VERSION,
                found: abi_version,
            });
        }
        // SAFETY: the ABI matches, so the layout is ours.
        unsafe { *pointer }
    };

    if declaration.core_version != crate::CORE_VERSION {
        return Err(RegistrationError::VersionMismatch {
            path: path.to_path_buf(),
            expected: crate::CORE_VERSION.to_string(),
            found: declaration.core_version.to_string(),
        });
    }

    let plugin = std::panic::catch_unwind(declaration.create).map_err(|_| {
        RegistrationError::ConstructorPanicked {
            path: path.to_path_buf(),
        }
    })?;

    Ok(Arc::new(DynamicPlugin {
        plugin,
        _library: Arc::new(library),
    }))
}
