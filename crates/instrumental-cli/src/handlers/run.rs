//! Run command handler

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::handlers::{module_name, status};
use crate::RunArgs;
use instrumental::{syntax, Coverage, ExecutionReport, InstrumentalError, Interpreter, Value};

/// Parse a `name=value` global.
///
/// `True`, `False` and `None` map to their constants, numbers to ints or
/// floats; anything else is a string.
pub fn parse_global(text: &str) -> CliResult<(String, Value)> {
    let (name, raw) = text
        .split_once('=')
        .ok_or_else(|| CliError::invalid_argument(format!("expected NAME=VALUE, got '{text}'")))?;
    let name = name.trim();
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(CliError::invalid_argument(format!("'{name}' is not a valid name")));
    }
    let value = match raw {
        "True" => Value::Bool(true),
        "False" => Value::Bool(false),
        "None" => Value::None,
        _ => raw
            .parse::<i64>()
            .map(Value::Int)
            .or_else(|_| raw.parse::<f64>().map(Value::Float))
            .unwrap_or_else(|_| Value::str(raw)),
    };
    Ok((name.to_string(), value))
}

/// Execute the run command.
///
/// The script's output goes to stdout as it was printed. Results are only
/// saved when the script finishes without an uncaught exception.
pub fn execute_run(config: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let modulename = module_name(&args.script, args.module.as_deref())?;
    let globals = args
        .globals
        .iter()
        .map(|text| parse_global(text))
        .collect::<CliResult<Vec<_>>>()?;
    let mut session = config.instrumental.clone();
    session.label_store |= args.label;
    let mut coverage = Coverage::new(session, &config.base_dir);

    let module = if coverage.config().is_target(&modulename) {
        coverage.instrument_file(&args.script, &modulename)?
    } else {
        tracing::debug!(module = %modulename, "not a target, running uninstrumented");
        let source = std::fs::read_to_string(&args.script)?;
        syntax::parse(&source).map_err(|source| InstrumentalError::Parse {
            modulename: modulename.clone(),
            source,
        })?
    };

    coverage.start();
    if let Some(tag) = &args.tag {
        coverage.start_context(tag.clone());
    }
    let (result, output) = {
        let mut interpreter = Interpreter::new(coverage.recorder());
        for (name, value) in globals {
            interpreter.set_global(name, value);
        }
        let result = interpreter.run(&module);
        (result, interpreter.take_output())
    };
    for line in &output {
        println!("{line}");
    }
    result?;
    coverage.stop();

    if !args.no_save {
        let path = coverage.save()?;
        status(config, &format!("saved results to {}", path.display()));
    }
    if args.summary {
        println!("{}", ExecutionReport::new(coverage.recorder()).summary());
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Verbosity;
    use instrumental::{InstrumentalConfig, Label};

    fn run_args(script: std::path::PathBuf) -> RunArgs {
        RunArgs {
            script,
            module: None,
            tag: Some("t1".to_string()),
            globals: Vec::new(),
            label: false,
            no_save: false,
            summary: false,
        }
    }

    #[test]
    fn test_run_saves_tagged_results() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("app.src");
        std::fs::write(&script, "a = 1\nif a:\n    print('yes')\n").unwrap();
        let config = CliConfig::new()
            .with_base_dir(dir.path())
            .with_verbosity(Verbosity::Quiet);
        execute_run(&config, &run_args(script)).unwrap();

        let saved = instrumental::storage::read_recorder(config.store_path()).unwrap();
        let construct = saved.construct("app", Label::new(2, 1)).unwrap();
        assert!(construct.was_true().contains("t1"));
    }

    #[test]
    fn test_parse_global_values() {
        assert_eq!(parse_global("flag=True").unwrap(), ("flag".to_string(), Value::Bool(true)));
        assert_eq!(parse_global("n=42").unwrap().1, Value::Int(42));
        assert_eq!(parse_global("x=2.5").unwrap().1, Value::Float(2.5));
        assert_eq!(parse_global("name=bob").unwrap().1, Value::str("bob"));
        assert_eq!(parse_global("empty=").unwrap().1, Value::str(""));
    }

    #[test]
    fn test_parse_global_rejects_bad_input() {
        assert!(matches!(parse_global("novalue"), Err(CliError::InvalidArgument { .. })));
        assert!(matches!(parse_global("1x=2"), Err(CliError::InvalidArgument { .. })));
    }

    #[test]
    fn test_globals_steer_the_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("app.src");
        std::fs::write(&script, "if flag:\n    x = 1\n").unwrap();
        let config = CliConfig::new()
            .with_base_dir(dir.path())
            .with_verbosity(Verbosity::Quiet);
        let mut args = run_args(script);
        args.globals = vec!["flag=False".to_string()];
        execute_run(&config, &args).unwrap();

        let saved = instrumental::storage::read_recorder(config.store_path()).unwrap();
        let construct = saved.construct("app", Label::new(1, 1)).unwrap();
        assert!(construct.was_false().contains("t1"));
    }

    #[test]
    fn test_failed_run_saves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("bad.src");
        std::fs::write(&script, "raise ValueError('boom')\n").unwrap();
        let config = CliConfig::new()
            .with_base_dir(dir.path())
            .with_verbosity(Verbosity::Quiet);
        let err = execute_run(&config, &run_args(script)).unwrap_err();
        assert!(matches!(err, CliError::Runtime(_)));
        assert!(!config.store_path().exists());
    }

    #[test]
    fn test_non_target_runs_uninstrumented() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("helper.src");
        std::fs::write(&script, "x = 1 and 2\n").unwrap();
        let config = CliConfig::new()
            .with_base_dir(dir.path())
            .with_verbosity(Verbosity::Quiet)
            .with_instrumental(InstrumentalConfig::builder().target("app").build());
        execute_run(&config, &run_args(script)).unwrap();

        let saved = instrumental::storage::read_recorder(config.store_path()).unwrap();
        assert!(saved.module("helper").is_none());
    }
}
