//! Command handlers
//!
//! Each handler executes one subcommand against a [`CliConfig`] and keeps
//! its pure helpers beside it for testing.

pub mod analyze;
pub mod combine;
pub mod report;
pub mod run;

use std::path::Path;

pub use analyze::{describe_metadata, execute_analyze, execute_render};
pub use combine::execute_combine;
pub use report::{execute_report, render_report};
pub use run::execute_run;

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use instrumental::{FileBackedMetadataCache, MetadataCache, NullMetadataCache};

/// Module name for a source file: the override, or the file stem
pub fn module_name(path: &Path, explicit: Option<&str>) -> CliResult<String> {
    if let Some(name) = explicit {
        return Ok(name.to_string());
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            CliError::invalid_argument(format!("cannot derive a module name from {}", path.display()))
        })
}

/// Metadata cache selected by the configuration
pub fn metadata_cache(config: &CliConfig) -> Box<dyn MetadataCache> {
    if config.instrumental.use_metadata_cache {
        Box::new(FileBackedMetadataCache::new(&config.base_dir))
    } else {
        Box::new(NullMetadataCache)
    }
}

/// Print a status line to stderr unless quiet
pub(crate) fn status(config: &CliConfig, message: &str) {
    if !config.verbosity.is_quiet() {
        eprintln!("{} {message}", console::style("instrumental:").bold().dim());
    }
}
