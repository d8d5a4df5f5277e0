//! Instrumental CLI: condition/decision coverage from the command line
//!
//! ## Usage
//!
//! ```bash
//! instrumental analyze app.src             # Lines and constructs
//! instrumental run app.src --tag smoke     # Execute under coverage
//! instrumental combine .instrumental.cov.* # Merge parallel stores
//! instrumental report --all                # Every construct's outcomes
//! ```

use clap::Parser;
use instrumental_cli::{handlers, Cli, CliConfig, CliResult, ColorChoice, Commands, Verbosity};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(verbosity.default_filter())),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli, verbosity) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", console::style("Error:").red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, verbosity: Verbosity) -> CliResult<()> {
    let config = build_config(&cli, verbosity)?;
    console::set_colors_enabled(config.color.should_color());
    console::set_colors_enabled_stderr(config.color.should_color());

    match cli.command {
        Commands::Analyze(args) => handlers::execute_analyze(&config, &args),
        Commands::Render(args) => handlers::execute_render(&config, &args),
        Commands::Run(args) => handlers::execute_run(&config, &args),
        Commands::Combine(args) => handlers::execute_combine(&config, &args),
        Commands::Report(args) => handlers::execute_report(&config, &args),
    }
}

fn build_config(cli: &Cli, verbosity: Verbosity) -> CliResult<CliConfig> {
    let color: ColorChoice = cli.color.clone().into();
    let config = CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(color)
        .with_base_dir(&cli.dir);
    match &cli.config {
        Some(path) => config.load_instrumental(path),
        None => Ok(config),
    }
}
