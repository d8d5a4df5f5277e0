//! Cross-component scenarios: source text through pragmas, metadata,
//! rewriting, execution, merging and reporting.

#![allow(clippy::unwrap_used)]

use super::*;
use proptest::prelude::*;

fn prepare(modulename: &str, source: &str) -> (syntax::Module, ModuleMetadata) {
    let module = syntax::parse(source).unwrap();
    let metadata = gather_source(GatherConfig::default(), modulename, source).unwrap();
    let instrumented =
        CoverageAnnotator::instrument(modulename, &module, &metadata, &metadata.pragmas).unwrap();
    (instrumented, metadata)
}

/// Run an instrumented module in a fresh recorder with the given globals
fn execute(
    module: &syntax::Module,
    metadata: &ModuleMetadata,
    tag: &str,
    globals: &[(&str, Value)],
) -> (ExecutionRecorder, Vec<String>) {
    let mut recorder = ExecutionRecorder::new();
    recorder.add_metadata(metadata);
    recorder.start();
    recorder.start_context(tag);
    let output = {
        let mut interpreter = Interpreter::new(&mut recorder);
        for (name, value) in globals {
            interpreter.set_global(*name, value.clone());
        }
        interpreter.run(module).unwrap();
        interpreter.take_output()
    };
    (recorder, output)
}

// ============================================================================
// Decisions across merged runs
// ============================================================================

mod decision_tests {
    use super::*;

    const BRANCH: &str = "\
def x():
    print('x')
def y():
    print('y')
if a:
    x()
else:
    y()
";

    #[test]
    fn test_true_run_leaves_false_bucket_empty() {
        let (module, metadata) = prepare("branch", BRANCH);
        let (recorder, output) = execute(&module, &metadata, "run1", &[("a", Value::Bool(true))]);
        assert_eq!(output, vec!["x"]);
        let decision = recorder.construct("branch", Label::new(5, 1)).unwrap();
        assert!(decision.was_true().contains("run1"));
        assert!(decision.was_false().is_empty());
        assert_eq!(decision.conditions_missed(), 1);
    }

    #[test]
    fn test_merged_runs_reach_full_coverage() {
        let (module, metadata) = prepare("branch", BRANCH);
        let (mut first, _) = execute(&module, &metadata, "run1", &[("a", Value::Bool(true))]);
        let (second, output) = execute(&module, &metadata, "run2", &[("a", Value::Int(0))]);
        assert_eq!(output, vec!["y"]);
        first.merge(&second).unwrap();

        let decision = first.construct("branch", Label::new(5, 1)).unwrap();
        assert_eq!(decision.was_true().iter().collect::<Vec<_>>(), vec!["run1"]);
        assert_eq!(decision.was_false().iter().collect::<Vec<_>>(), vec!["run2"]);
        assert_eq!(decision.conditions_missed(), 0);
        assert_eq!(first.module("branch").unwrap().missing_lines().count(), 0);
    }
}

// ============================================================================
// Operand chains
// ============================================================================

mod chain_tests {
    use super::*;

    #[test]
    fn test_three_operand_and_records_first_false() {
        let (module, metadata) = prepare("chain", "result = p and q and r\n");
        let globals = [
            ("p", Value::Bool(true)),
            ("q", Value::Bool(false)),
            ("r", Value::Bool(true)),
        ];
        let (recorder, _) = execute(&module, &metadata, "run", &globals);
        let construct = recorder.construct("chain", Label::new(1, 1)).unwrap();
        let outcomes = construct.outcomes();
        assert_eq!(outcomes.len(), 4);
        for (bucket, (description, tags)) in outcomes.iter().enumerate() {
            if bucket == 2 {
                assert_eq!(description, "T F *");
                assert!(tags.contains("run"));
            } else {
                assert!(tags.is_empty(), "bucket {bucket} ({description})");
            }
        }
    }

    #[test]
    fn test_short_circuit_never_evaluates_later_operands() {
        let source = "\
def b():
    print('evaluated')
    return True
x = a and b()
";
        let (module, metadata) = prepare("lazy", source);
        let (recorder, output) = execute(&module, &metadata, "run", &[("a", Value::Bool(false))]);
        assert!(output.is_empty());
        let construct = recorder.construct("lazy", Label::new(4, 1)).unwrap();
        assert_eq!(construct.number_of_conditions_hit(), 1);
        assert_eq!(construct.outcomes()[1].0, "F *");
        assert_eq!(construct.outcomes()[1].1.len(), 1);
        let taps: usize = construct.outcomes().iter().map(|(_, tags)| tags.len()).sum();
        assert_eq!(taps, 1);
        let statements = recorder.statements("lazy").unwrap();
        assert_eq!(statements.get(&4), Some(&true));
        assert_eq!(statements.get(&2), Some(&false));
    }

    #[test]
    fn test_or_chain_returns_deciding_operand() {
        let (module, metadata) = prepare("pick", "print(a or b)\n");
        let globals = [("a", Value::str("")), ("b", Value::str("fallback"))];
        let (recorder, output) = execute(&module, &metadata, "run", &globals);
        assert_eq!(output, vec!["fallback"]);
        let construct = recorder.construct("pick", Label::new(1, 1)).unwrap();
        assert_eq!(construct.outcomes()[1].0, "F T");
        assert!(!construct.outcomes()[1].1.is_empty());
    }

    #[test]
    fn test_nested_constructs_get_distinct_labels() {
        let source = "if (a or b) and c:\n    pass\n";
        let (module, metadata) = prepare("nested", source);
        let globals = [
            ("a", Value::Bool(false)),
            ("b", Value::Bool(true)),
            ("c", Value::Bool(true)),
        ];
        let (recorder, _) = execute(&module, &metadata, "run", &globals);
        let outer = recorder.construct("nested", Label::new(1, 1)).unwrap();
        let inner = recorder.construct("nested", Label::new(1, 2)).unwrap();
        assert_eq!(outer.kind_name(), "LogicalAnd");
        assert_eq!(inner.kind_name(), "LogicalOr");
        assert!(outer.was_true().contains("run"));
        assert!(inner.was_true().contains("run"));
    }
}

// ============================================================================
// Pragmas
// ============================================================================

mod pragma_tests {
    use super::*;

    #[test]
    fn test_else_pragma_excludes_only_the_alternate_branch() {
        let source = "\
if a:
    b = 1
    c = 2
else:  # pragma: no cover
    d = 3
    e = 4
f = 5
";
        let metadata = gather_source(GatherConfig::default(), "m", source).unwrap();
        let lines: Vec<u32> = metadata.lines.iter().copied().collect();
        assert_eq!(lines, vec![1, 2, 3, 7]);
    }

    #[test]
    fn test_suppressed_branch_runs_without_taps() {
        let source = "\
if a:
    x = b or c
else:  # pragma: no cover
    x = d and e
";
        let (module, metadata) = prepare("m", source);
        let globals = [
            ("a", Value::Bool(false)),
            ("d", Value::Bool(true)),
            ("e", Value::Bool(true)),
        ];
        let (recorder, _) = execute(&module, &metadata, "run", &globals);
        assert!(recorder.construct("m", Label::new(4, 1)).is_none());
        assert_eq!(recorder.statements("m").unwrap().get(&4), None);
    }

    #[test]
    fn test_pragma_on_continuation_line_applies_to_statement() {
        let source = "\
x = (a and
     b)  # pragma: no cover
y = c or d
";
        let metadata = gather_source(GatherConfig::default(), "m", source).unwrap();
        assert!(!metadata.lines.contains(&1));
        assert!(metadata.construct(Label::new(1, 1)).is_none());
        assert!(metadata.construct(Label::new(3, 1)).is_some());
    }
}

// ============================================================================
// Label agreement between gatherer and rewriter
// ============================================================================

mod label_tests {
    use super::*;

    const COMPLEX: &str = "\
'''Module docstring.'''
from __future__ import division

def classify(n, strict=False):
    '''Classify a number.'''
    if n < 0 and not strict:
        return 'negative'
    elif n == 0 or n is None:
        return 'zero'
    while n > 10 and n % 2 == 0:
        n = n // 2
    try:
        value = 10 // n if n else 0
    except ZeroDivisionError:
        value = -1
    finally:
        done = True
    assert value is not None or strict, 'no value'
    return [n] if False else (n and value)
";

    #[test]
    fn test_rewriter_agrees_with_gatherer_on_every_label() {
        let source = COMPLEX;
        for config in [
            GatherConfig::default(),
            GatherConfig {
                instrument_assertions: false,
                instrument_comparisons: true,
            },
        ] {
            let module = syntax::parse(source).unwrap();
            let metadata = gather_source(config, "complex", source).unwrap();
            let instrumented =
                CoverageAnnotator::instrument("complex", &module, &metadata, &metadata.pragmas);
            assert!(instrumented.is_ok(), "{config:?}: {instrumented:?}");
        }
    }

    #[test]
    fn test_gathering_is_deterministic() {
        let source = COMPLEX;
        let first = gather_source(GatherConfig::default(), "complex", source).unwrap();
        let second = gather_source(GatherConfig::default(), "complex", source).unwrap();
        assert_eq!(first, second);
        assert!(!first.lines.contains(&1));
        assert!(!first.lines.contains(&5));
    }

    #[test]
    fn test_instrumented_program_behaves_like_original() {
        let source = COMPLEX;
        let (module, metadata) = prepare("complex", source);
        let plain = syntax::parse(source).unwrap();
        for n in [-4_i64, 0, 7, 48] {
            let mut recorder = ExecutionRecorder::new();
            recorder.add_metadata(&metadata);
            recorder.start();
            let instrumented = {
                let mut interpreter = Interpreter::new(&mut recorder);
                interpreter.run(&module).unwrap();
                interpreter.call("classify", vec![Value::Int(n)]).unwrap()
            };
            let mut scratch = ExecutionRecorder::new();
            let expected = {
                let mut interpreter = Interpreter::new(&mut scratch);
                interpreter.run(&plain).unwrap();
                interpreter.call("classify", vec![Value::Int(n)]).unwrap()
            };
            assert_eq!(instrumented, expected, "n = {n}");
        }
    }
}

// ============================================================================
// Persistence and reporting
// ============================================================================

mod session_tests {
    use super::*;

    #[test]
    fn test_parallel_workers_combine() {
        let dir = tempfile::tempdir().unwrap();
        let source = "def check(v):\n    return v > 0 and v < 10\n";
        let mut stores = Vec::new();
        for (worker, value) in [(1, 5_i64), (2, -1), (3, 50)] {
            let mut coverage = Coverage::new(InstrumentalConfig::default(), dir.path());
            let module = coverage.instrument_source("check", source).unwrap();
            coverage.start();
            coverage.start_context(format!("worker{worker}"));
            {
                let mut interpreter = Interpreter::new(coverage.recorder());
                interpreter.run(&module).unwrap();
                interpreter.call("check", vec![Value::Int(value)]).unwrap();
            }
            let store = coverage.store().with_label(format!("w{worker}"));
            store.save(coverage.recorder()).unwrap();
            stores.push(store.path());
        }

        let combined = combine(dir.path().join("all.cov"), &stores).unwrap();
        let summary = ExecutionReport::new(&combined).summary();
        assert_eq!(summary, "check: 3/3 hit (100%)");
    }

    #[test]
    fn test_report_shows_missing_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let mut coverage = Coverage::new(InstrumentalConfig::default(), dir.path());
        coverage.start();
        coverage.start_context("only");
        coverage
            .run_source("app", "a = 1\nb = 0\nif a or b:\n    pass\n")
            .unwrap();
        let report = ExecutionReport::new(coverage.recorder()).report(false);
        assert!(report.contains("LogicalOr -> app:3.1 < a or b >"));
        assert!(report.contains("T * ==> only"));
    }
}

// ============================================================================
// Tap pass-through
// ============================================================================

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::None),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        "[a-z]{0,6}".prop_map(|s| Value::str(&s)),
        proptest::collection::vec(any::<i64>().prop_map(Value::Int), 0..3).prop_map(Value::list),
    ]
}

proptest! {
    #[test]
    fn prop_taps_return_their_value(value in arb_value()) {
        let metadata = gather_source(GatherConfig::default(), "m", "if a:\n    x = b and c\n").unwrap();
        let mut recorder = ExecutionRecorder::new();
        recorder.add_metadata(&metadata);
        recorder.start();
        let decided = recorder.record_decision(value.clone(), "m", Label::new(1, 1)).unwrap();
        prop_assert_eq!(&decided, &value);
        let pinned = recorder.record_pin(value.clone(), "m", Label::new(2, 1), 1).unwrap();
        prop_assert_eq!(&pinned, &value);
    }

    #[test]
    fn prop_instrumented_chain_matches_plain_evaluation(
        values in proptest::collection::vec(any::<bool>(), 2..5),
        use_or in any::<bool>(),
    ) {
        let names: Vec<String> = (0..values.len()).map(|i| format!("v{i}")).collect();
        let op = if use_or { " or " } else { " and " };
        let source = format!("result = {}\n", names.join(op));
        let (module, metadata) = prepare("prop", &source);
        let globals: Vec<(&str, Value)> = names
            .iter()
            .zip(&values)
            .map(|(name, value)| (name.as_str(), Value::Bool(*value)))
            .collect();
        let mut recorder = ExecutionRecorder::new();
        recorder.add_metadata(&metadata);
        recorder.start();
        let result = {
            let mut interpreter = Interpreter::new(&mut recorder);
            for (name, value) in &globals {
                interpreter.set_global(*name, value.clone());
            }
            interpreter.run(&module).unwrap();
            interpreter.global("result").cloned().unwrap()
        };
        let expected = if use_or {
            values.iter().any(|v| *v)
        } else {
            values.iter().all(|v| *v)
        };
        prop_assert_eq!(result, Value::Bool(expected));
        let construct = recorder.construct("prop", Label::new(1, 1)).unwrap();
        prop_assert_eq!(construct.number_of_conditions_hit(), 1);
    }
}
