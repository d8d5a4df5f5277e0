//! Instrumental CLI Library
//!
//! Command-line front end for the Instrumental coverage engine: analyze
//! modules, run scripts under coverage, combine stores and report on them.

#![warn(missing_docs)]

mod commands;
mod config;
mod error;
pub mod handlers;

pub use commands::{
    AnalyzeArgs, Cli, ColorArg, CombineArgs, Commands, RenderArgs, ReportArgs, ReportFormat,
    RunArgs,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
