//! Report command handler

use crate::config::CliConfig;
use crate::error::CliResult;
use crate::{ReportArgs, ReportFormat};
use instrumental::storage::read_recorder;
use instrumental::{ExecutionRecorder, ExecutionReport};

/// Execute the report command
pub fn execute_report(config: &CliConfig, args: &ReportArgs) -> CliResult<()> {
    let path = args.store.clone().unwrap_or_else(|| config.store_path());
    tracing::debug!(store = %path.display(), "loading store");
    let recorder = read_recorder(&path)?;
    println!("{}", render_report(&recorder, args)?);
    Ok(())
}

/// Render a loaded recorder in the requested format
pub fn render_report(recorder: &ExecutionRecorder, args: &ReportArgs) -> CliResult<String> {
    let report = ExecutionReport::new(recorder);
    let mut out = match args.format {
        ReportFormat::Text => report.report(args.all),
        ReportFormat::Summary => report
            .module_summaries()
            .iter()
            .map(|s| {
                let percent = format!("{:.0}%", s.percent());
                let percent = if s.hit == s.total {
                    console::style(percent).green()
                } else {
                    console::style(percent).yellow()
                };
                format!("{}: {}/{} hit ({percent})", s.modulename, s.hit, s.total)
            })
            .collect::<Vec<_>>()
            .join("\n"),
        ReportFormat::Json => {
            let modules: Vec<serde_json::Value> = report
                .module_summaries()
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "module": s.modulename,
                        "total": s.total,
                        "hit": s.hit,
                        "percent": s.percent(),
                    })
                })
                .collect();
            serde_json::to_string_pretty(&modules)?
        }
    };
    if args.statements {
        out.push('\n');
        out.push_str(&report.statement_summary());
    }
    Ok(out)
}
