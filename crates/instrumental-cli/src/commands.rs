//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::ColorChoice;

/// Instrumental: condition/decision coverage for scripts
#[derive(Parser, Debug)]
#[command(name = "instrumental")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// YAML configuration file
    #[arg(short, long, global = true, env = "INSTRUMENTAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory stores and caches live under
    #[arg(long, default_value = ".", global = true)]
    pub dir: PathBuf,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Detect terminal support
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the executable lines and constructs of modules
    Analyze(AnalyzeArgs),

    /// Print a module's instrumented source
    Render(RenderArgs),

    /// Run a script under coverage and save the results
    Run(RunArgs),

    /// Merge saved stores into one
    Combine(CombineArgs),

    /// Report on a saved store
    Report(ReportArgs),
}

/// Arguments for the analyze command
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Source files to analyze
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Emit metadata as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the render command
#[derive(Parser, Debug)]
pub struct RenderArgs {
    /// Source file to instrument
    pub file: PathBuf,

    /// Module name (defaults to the file stem)
    #[arg(short, long)]
    pub module: Option<String>,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Script to execute
    pub script: PathBuf,

    /// Module name (defaults to the file stem)
    #[arg(short, long)]
    pub module: Option<String>,

    /// Tag recorded outcomes with this name
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Seed a global before the script runs (name=value)
    #[arg(long = "set", value_name = "NAME=VALUE")]
    pub globals: Vec<String>,

    /// Suffix the store name with the process label
    #[arg(long)]
    pub label: bool,

    /// Do not save the results
    #[arg(long)]
    pub no_save: bool,

    /// Print the condition summary afterwards
    #[arg(short, long)]
    pub summary: bool,
}

/// Arguments for the combine command
#[derive(Parser, Debug)]
pub struct CombineArgs {
    /// Stores to merge
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Combined store (defaults to the configured store)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the report command
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Store to report on (defaults to the configured store)
    pub store: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: ReportFormat,

    /// Include fully covered constructs
    #[arg(short, long)]
    pub all: bool,

    /// Append the statement report
    #[arg(long)]
    pub statements: bool,
}

/// Report output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// Construct result blocks
    #[default]
    Text,
    /// One summary line per module
    Summary,
    /// Per-module totals as JSON
    Json,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "instrumental", "-v", "run", "app.src", "--tag", "t1", "-s", "--set", "n=3",
        ]);
        assert_eq!(cli.verbose, 1);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.script, PathBuf::from("app.src"));
        assert_eq!(args.tag.as_deref(), Some("t1"));
        assert!(args.summary);
        assert!(!args.no_save);
        assert_eq!(args.globals, vec!["n=3".to_string()]);
    }

    #[test]
    fn test_parse_combine() {
        let cli = Cli::parse_from(["instrumental", "combine", "a.cov", "b.cov", "-o", "all.cov"]);
        let Commands::Combine(args) = cli.command else {
            panic!("expected combine");
        };
        assert_eq!(args.inputs.len(), 2);
        assert_eq!(args.output, Some(PathBuf::from("all.cov")));
    }

    #[test]
    fn test_parse_report_defaults() {
        let cli = Cli::parse_from(["instrumental", "report"]);
        let Commands::Report(args) = cli.command else {
            panic!("expected report");
        };
        assert_eq!(args.format, ReportFormat::Text);
        assert!(args.store.is_none());
        assert!(!args.all);
    }

    #[test]
    fn test_color_conversion() {
        assert_eq!(ColorChoice::from(ColorArg::Never), ColorChoice::Never);
        assert_eq!(ColorChoice::from(ColorArg::Always), ColorChoice::Always);
    }
}
