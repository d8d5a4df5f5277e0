//! Analyze and render command handlers

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::handlers::{metadata_cache, module_name};
use crate::{AnalyzeArgs, RenderArgs};
use instrumental::syntax::render_module;
use instrumental::{gather_file, Coverage, ModuleMetadata};

/// Execute the analyze command
pub fn execute_analyze(config: &CliConfig, args: &AnalyzeArgs) -> CliResult<()> {
    let cache = metadata_cache(config);
    let gather = config.instrumental.gather();
    let mut gathered = Vec::new();
    let mut failures = 0;

    for path in &args.files {
        let modulename = module_name(path, None)?;
        match gather_file(gather, path, &modulename, cache.as_ref()) {
            Ok(metadata) => gathered.push(metadata),
            Err(e) => {
                tracing::warn!(module = %modulename, error = %e, "failed to gather metadata");
                eprintln!("{}: {e}", console::style("error").red().bold());
                failures += 1;
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&gathered)?);
    } else {
        for metadata in &gathered {
            println!("{}", describe_metadata(metadata));
        }
    }

    if failures > 0 {
        return Err(CliError::Gather { count: failures });
    }
    Ok(())
}

/// Human-readable listing of a module's lines and constructs
#[must_use]
pub fn describe_metadata(metadata: &ModuleMetadata) -> String {
    let lines: Vec<String> = metadata.lines.iter().map(u32::to_string).collect();
    let mut out = format!(
        "{} ({} lines, {} constructs)\n  lines: {}\n",
        console::style(&metadata.modulename).bold(),
        metadata.lines.len(),
        metadata.constructs.len(),
        lines.join(", ")
    );
    for (label, construct) in &metadata.constructs {
        out.push_str(&format!(
            "  {:<8} {:<12} {}\n",
            label.to_string(),
            construct.kind_name(),
            construct.source()
        ));
    }
    out
}

/// Execute the render command
pub fn execute_render(config: &CliConfig, args: &RenderArgs) -> CliResult<()> {
    let modulename = module_name(&args.file, args.module.as_deref())?;
    let mut coverage = Coverage::new(config.instrumental.clone(), &config.base_dir);
    let module = coverage.instrument_file(&args.file, &modulename)?;
    print!("{}", render_module(&module));
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use instrumental::{gather_source, GatherConfig};

    #[test]
    fn test_describe_metadata_lists_constructs() {
        console::set_colors_enabled(false);
        let metadata =
            gather_source(GatherConfig::default(), "app", "if a and b:\n    x = 1\n").unwrap();
        let text = describe_metadata(&metadata);
        assert!(text.starts_with("app (2 lines, 1 constructs)"));
        assert!(text.contains("lines: 1, 2"));
        assert!(text.contains("1.1"));
        assert!(text.contains("LogicalAnd"));
        assert!(text.contains("a and b"));
    }

    #[test]
    fn test_analyze_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.src");
        std::fs::write(&good, "x = 1\n").unwrap();
        let args = AnalyzeArgs {
            files: vec![good, dir.path().join("missing.src")],
            json: true,
        };
        let config = CliConfig::new().with_base_dir(dir.path());
        let err = execute_analyze(&config, &args).unwrap_err();
        assert!(matches!(err, CliError::Gather { count: 1 }));
    }
}
