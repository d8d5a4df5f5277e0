//! Read-only metadata walk.

use std::collections::BTreeSet;

use super::{LabelAllocator, ModuleMetadata};
use crate::config::GatherConfig;
use crate::construct::{
    BooleanDecision, Construct, DecisionKind, LogicalAnd, LogicalOr, Origin,
};
use crate::pragma::PragmaMap;
use crate::syntax::{render_expr, BoolOperator, Expr, ExprKind, Module, Stmt, StmtKind};

/// Enumerates executable lines and labels every construct of a module.
///
/// Traversal is pre-order over statements and, within an expression, parent
/// before children in source order. Statements under `no cover` are skipped
/// with everything they contain.
#[derive(Debug)]
pub struct MetadataGatherer {
    config: GatherConfig,
    metadata: ModuleMetadata,
    labels: LabelAllocator,
}

impl MetadataGatherer {
    /// Gather metadata for an already-parsed module
    #[must_use]
    pub fn analyze_module(
        config: GatherConfig,
        modulename: &str,
        source: &str,
        module: &Module,
        pragmas: PragmaMap,
    ) -> ModuleMetadata {
        let mut gatherer = Self {
            config,
            metadata: ModuleMetadata::new(modulename, source, pragmas, config),
            labels: LabelAllocator::new(),
        };

        let body = if module.has_docstring() {
            &module.body[1..]
        } else {
            &module.body[..]
        };
        gatherer.visit_block(body);

        tracing::debug!(
            module = modulename,
            lines = gatherer.metadata.lines.len(),
            constructs = gatherer.metadata.constructs.len(),
            "gathered metadata"
        );
        gatherer.metadata
    }

    fn origin(&mut self, expr: &Expr) -> Origin {
        let label = self.labels.next_label(expr.line);
        let pragmas = self.metadata.pragmas.get(expr.line).clone();
        Origin::new(&self.metadata.modulename, label, render_expr(expr)).with_pragmas(pragmas)
    }

    fn add(&mut self, construct: Construct) {
        self.metadata.constructs.insert(construct.label(), construct);
    }

    fn add_decision(&mut self, expr: &Expr, kind: DecisionKind) {
        let origin = self.origin(expr);
        self.add(Construct::BooleanDecision(BooleanDecision::new(origin, kind)));
    }

    fn visit_block(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.visit_stmt(stmt);
        }
    }

    /// Definition bodies lose their docstring for the walk.
    fn visit_definition_body(&mut self, body: &[Stmt]) {
        match body.split_first() {
            Some((first, rest)) if first.is_docstring() => self.visit_block(rest),
            _ => self.visit_block(body),
        }
    }

    /// An `if`/`while`/ternary/`assert` condition.
    fn visit_test(&mut self, test: &Expr) {
        if test.is_bool_op() {
            self.visit_expr(test);
            return;
        }
        self.add_decision(test, DecisionKind::Test);
        if test.is_compare() {
            self.visit_expr_children(test);
        } else {
            self.visit_expr(test);
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        if self.metadata.pragmas.is_excluded(stmt.line()) {
            return;
        }
        self.metadata.lines.insert(stmt.line());

        match &stmt.kind {
            StmtKind::Expr(value) => self.visit_expr(value),
            StmtKind::Assign { targets, value } => {
                self.visit_exprs(targets);
                self.visit_expr(value);
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.visit_expr(target);
                self.visit_expr(value);
            }
            StmtKind::Delete(targets) => self.visit_exprs(targets),
            StmtKind::Return(value) | StmtKind::Raise(value) => {
                if let Some(value) = value {
                    self.visit_expr(value);
                }
            }
            StmtKind::Assert { test, msg } => {
                if self.config.instrument_assertions {
                    self.visit_test(test);
                    if let Some(msg) = msg {
                        self.visit_expr(msg);
                    }
                }
            }
            StmtKind::If { test, body, orelse } | StmtKind::While { test, body, orelse } => {
                self.visit_test(test);
                self.visit_block(body);
                self.visit_block(orelse);
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                self.visit_expr(target);
                self.visit_expr(iter);
                self.visit_block(body);
                self.visit_block(orelse);
            }
            StmtKind::FunctionDef { params, body, .. } => {
                for default in params.iter().filter_map(|p| p.default.as_ref()) {
                    self.visit_expr(default);
                }
                self.visit_definition_body(body);
            }
            StmtKind::ClassDef { bases, body, .. } => {
                self.visit_exprs(bases);
                self.visit_definition_body(body);
            }
            StmtKind::With { items, body } => {
                for item in items {
                    self.visit_expr(&item.context);
                    if let Some(binding) = &item.binding {
                        self.visit_expr(binding);
                    }
                }
                self.visit_block(body);
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.visit_block(body);
                for handler in handlers {
                    if let Some(kind) = &handler.kind {
                        self.visit_expr(kind);
                    }
                    self.visit_block(&handler.body);
                }
                self.visit_block(orelse);
                self.visit_block(finalbody);
            }
            StmtKind::Pass
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Global(_)
            | StmtKind::Import(_)
            | StmtKind::ImportFrom { .. } => {}
        }
    }

    fn visit_exprs(&mut self, exprs: &[Expr]) {
        for expr in exprs {
            self.visit_expr(expr);
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::BoolOp { op, values } => {
                let origin = self.origin(expr);
                let literal_pins: BTreeSet<usize> = values
                    .iter()
                    .enumerate()
                    .filter(|(_, value)| value.is_literal())
                    .map(|(pin, _)| pin)
                    .collect();
                if !literal_pins.is_empty() {
                    tracing::debug!(label = %origin.label, "literal operand in boolean chain");
                }
                let construct = match op {
                    BoolOperator::And => {
                        Construct::LogicalAnd(LogicalAnd::new(origin, values.len(), literal_pins))
                    }
                    BoolOperator::Or => {
                        Construct::LogicalOr(LogicalOr::new(origin, values.len(), literal_pins))
                    }
                };
                self.add(construct);
            }
            ExprKind::Compare { .. } if self.config.instrument_comparisons => {
                self.add_decision(expr, DecisionKind::Comparison);
            }
            ExprKind::IfExp { test, body, orelse } => {
                self.visit_test(test);
                self.visit_expr(body);
                self.visit_expr(orelse);
                return;
            }
            _ => {}
        }
        self.visit_expr_children(expr);
    }

    fn visit_expr_children(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Name(_) | ExprKind::Constant(_) => {}
            ExprKind::BoolOp { values, .. } => self.visit_exprs(values),
            ExprKind::UnaryOp { operand, .. } => self.visit_expr(operand),
            ExprKind::BinOp { left, right, .. } => {
                self.visit_expr(left);
                self.visit_expr(right);
            }
            ExprKind::Compare {
                left, comparators, ..
            } => {
                self.visit_expr(left);
                self.visit_exprs(comparators);
            }
            ExprKind::IfExp { test, body, orelse } => {
                self.visit_expr(test);
                self.visit_expr(body);
                self.visit_expr(orelse);
            }
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                self.visit_expr(func);
                self.visit_exprs(args);
                for keyword in keywords {
                    self.visit_expr(&keyword.value);
                }
            }
            ExprKind::Attribute { value, .. } => self.visit_expr(value),
            ExprKind::Subscript { value, index } => {
                self.visit_expr(value);
                self.visit_expr(index);
            }
            ExprKind::List(items) | ExprKind::Tuple(items) => self.visit_exprs(items),
            ExprKind::Dict(entries) => {
                for (key, value) in entries {
                    self.visit_expr(key);
                    self.visit_expr(value);
                }
            }
            ExprKind::Lambda { params, body } => {
                for default in params.iter().filter_map(|p| p.default.as_ref()) {
                    self.visit_expr(default);
                }
                self.visit_expr(body);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::construct::Label;
    use crate::metadata::gather_source;

    fn gather(source: &str) -> ModuleMetadata {
        gather_source(GatherConfig::default(), "m", source).unwrap()
    }

    fn gather_with(config: GatherConfig, source: &str) -> ModuleMetadata {
        gather_source(config, "m", source).unwrap()
    }

    fn kinds(metadata: &ModuleMetadata) -> Vec<(String, &'static str)> {
        metadata
            .constructs
            .iter()
            .map(|(label, c)| (label.to_string(), c.kind_name()))
            .collect()
    }

    #[test]
    fn test_lines_and_module_docstring() {
        let metadata = gather("'''module doc'''\nx = 1\ny = 2\n");
        assert_eq!(metadata.lines, BTreeSet::from([2, 3]));
    }

    #[test]
    fn test_function_docstring_is_not_a_statement() {
        let metadata = gather("def f():\n    '''doc'''\n    return 1\n");
        assert_eq!(metadata.lines, BTreeSet::from([1, 3]));
    }

    #[test]
    fn test_if_test_becomes_decision() {
        let metadata = gather("if x:\n    pass\n");
        assert_eq!(kinds(&metadata), vec![("1.1".to_string(), "Decision")]);
    }

    #[test]
    fn test_bool_test_is_not_double_counted() {
        let metadata = gather("if a and b:\n    pass\n");
        assert_eq!(kinds(&metadata), vec![("1.1".to_string(), "LogicalAnd")]);
        let construct = metadata.construct(Label::new(1, 1)).unwrap();
        assert_eq!(construct.pin_count(), Some(2));
        assert_eq!(construct.source(), "a and b");
    }

    #[test]
    fn test_nested_chains_get_sequential_labels() {
        let metadata = gather("x = a and (b or c)\n");
        assert_eq!(
            kinds(&metadata),
            vec![
                ("1.1".to_string(), "LogicalAnd"),
                ("1.2".to_string(), "LogicalOr"),
            ]
        );
    }

    #[test]
    fn test_ternary_and_while() {
        let metadata = gather("while n:\n    y = a if b else c\n");
        assert_eq!(
            kinds(&metadata),
            vec![
                ("1.1".to_string(), "Decision"),
                ("2.1".to_string(), "Decision"),
            ]
        );
        assert_eq!(metadata.construct(Label::new(2, 1)).unwrap().source(), "b");
    }

    #[test]
    fn test_assert_switch() {
        let source = "assert ok\n";
        assert_eq!(gather(source).constructs.len(), 1);
        let disabled = GatherConfig {
            instrument_assertions: false,
            ..GatherConfig::default()
        };
        let metadata = gather_with(disabled, source);
        assert!(metadata.constructs.is_empty());
        assert!(metadata.lines.contains(&1));
    }

    #[test]
    fn test_comparisons_only_when_enabled() {
        let source = "x = a < b\nif c == d:\n    pass\n";
        assert!(gather(source)
            .constructs
            .values()
            .all(|c| c.kind_name() != "Comparison"));

        let enabled = GatherConfig {
            instrument_comparisons: true,
            ..GatherConfig::default()
        };
        let metadata = gather_with(enabled, source);
        assert_eq!(
            kinds(&metadata),
            vec![
                ("1.1".to_string(), "Comparison"),
                ("2.1".to_string(), "Decision"),
            ]
        );
    }

    #[test]
    fn test_suppressed_statement_skipped_recursively() {
        let source = "\
def f():  # pragma: no cover
    if a and b:
        return 1
x = c or d
";
        let metadata = gather(source);
        assert_eq!(metadata.lines, BTreeSet::from([4]));
        assert_eq!(kinds(&metadata), vec![("4.1".to_string(), "LogicalOr")]);
    }

    #[test]
    fn test_else_pragma_excludes_only_alternate_branch() {
        let source = "\
if a:
    x()
else:  # pragma: no cover
    y()
";
        let metadata = gather(source);
        assert_eq!(metadata.lines, BTreeSet::from([1, 2]));
    }

    #[test]
    fn test_literal_pins_recorded() {
        let metadata = gather("x = a or True\n");
        let construct = metadata.construct(Label::new(1, 1)).unwrap();
        assert_eq!(construct.literal_pins(), Some(&BTreeSet::from([1])));
    }

    #[test]
    fn test_gathering_is_deterministic() {
        let source = "if a and b or c:\n    z = d if e else f\n";
        assert_eq!(gather(source), gather(source));
    }
}
