//! Tree rewriter.
//!
//! Builds an instrumented copy of a module. Every operand of an `and`/`or`
//! chain is wrapped in a pass-through pin tap while the chain node itself is
//! kept, so the host's own short-circuiting still decides which taps run.
//! Conditions are wrapped in decision taps, and each executable statement is
//! preceded by a statement marker.
//!
//! Labels are allocated with the same walk as
//! [`MetadataGatherer`](crate::metadata::MetadataGatherer) and checked against
//! the metadata.

use crate::config::GatherConfig;
use crate::construct::{Construct, DecisionKind, Label};
use crate::metadata::{LabelAllocator, ModuleMetadata};
use crate::pragma::PragmaMap;
use crate::result::{InstrumentalError, InstrumentalResult};
use crate::syntax::{
    BoolOperator, ExceptHandler, Expr, ExprKind, Keyword, Module, Param, Span, Stmt, StmtKind,
    WithItem,
};

/// Name the instrumented tree uses to reach the recorder
pub const RECORDER_BINDING: &str = "_xxx_recorder_xxx_";

/// Method recording a pin or decision value
pub const RECORD_METHOD: &str = "record";

/// Method recording a statement hit
pub const RECORD_STATEMENT_METHOD: &str = "record_statement";

/// Rewrites module trees to report into the recorder
#[derive(Debug)]
pub struct CoverageAnnotator<'a> {
    modulename: &'a str,
    metadata: &'a ModuleMetadata,
    pragmas: &'a PragmaMap,
    config: GatherConfig,
    labels: LabelAllocator,
}

impl<'a> CoverageAnnotator<'a> {
    /// Produce the instrumented version of `module`
    pub fn instrument(
        modulename: &'a str,
        module: &Module,
        metadata: &'a ModuleMetadata,
        pragmas: &'a PragmaMap,
    ) -> InstrumentalResult<Module> {
        let mut annotator = Self {
            modulename,
            metadata,
            pragmas,
            config: metadata.config,
            labels: LabelAllocator::new(),
        };
        let body = annotator.module_body(&module.body)?;
        tracing::debug!(module = modulename, statements = body.len(), "instrumented module");
        Ok(Module::new(body))
    }

    fn module_body(&mut self, body: &[Stmt]) -> InstrumentalResult<Vec<Stmt>> {
        let mut rest = body;
        let mut out = Vec::with_capacity(body.len() * 2);

        if let Some((first, tail)) = rest.split_first() {
            if first.is_docstring() {
                out.push(first.clone());
                rest = tail;
            }
        }

        let futures = rest.iter().take_while(|stmt| stmt.is_future_import()).count();
        let (future_imports, rest) = rest.split_at(futures);
        out.extend(future_imports.iter().cloned());
        for stmt in future_imports {
            if !self.pragmas.is_excluded(stmt.line()) {
                out.push(self.statement_marker(stmt.line()));
            }
        }

        out.extend(self.block(rest)?);
        Ok(out)
    }

    // ---- tap construction ----

    fn recorder_method(&self, method: &str, line: u32) -> Expr {
        Expr::name(RECORDER_BINDING, line).attribute(method)
    }

    fn statement_marker(&self, line: u32) -> Stmt {
        let call = self.recorder_method(RECORD_STATEMENT_METHOD, line).call(vec![
            Expr::string(self.modulename, line),
            Expr::int(i64::from(line), line),
        ]);
        Stmt::new(StmtKind::Expr(call), Span::single(line))
    }

    fn pin_tap(&self, operand: Expr, label: Label, pin: usize) -> Expr {
        let line = operand.line;
        self.recorder_method(RECORD_METHOD, line).call(vec![
            operand,
            Expr::string(self.modulename, line),
            Expr::string(label.to_string(), line),
            Expr::int(pin as i64, line),
        ])
    }

    fn decision_tap(&self, test: Expr, label: Label) -> Expr {
        let line = test.line;
        self.recorder_method(RECORD_METHOD, line).call(vec![
            test,
            Expr::string(self.modulename, line),
            Expr::string(label.to_string(), line),
        ])
    }

    // ---- label validation ----

    fn mismatch(&self, label: Label, message: impl Into<String>) -> InstrumentalError {
        InstrumentalError::metadata_mismatch(self.modulename, label, message)
    }

    fn chain_label(&mut self, expr: &Expr, op: BoolOperator, pins: usize) -> InstrumentalResult<Label> {
        let label = self.labels.next_label(expr.line);
        let matches = match (self.metadata.construct(label), op) {
            (Some(Construct::LogicalAnd(c)), BoolOperator::And) => c.table().pins() == pins,
            (Some(Construct::LogicalOr(c)), BoolOperator::Or) => c.table().pins() == pins,
            (None, _) => return Err(self.mismatch(label, "no construct recorded for label")),
            _ => false,
        };
        if matches {
            Ok(label)
        } else {
            Err(self.mismatch(
                label,
                format!("expected an '{}' chain of {pins} operands", op.keyword()),
            ))
        }
    }

    fn decision_label(&mut self, expr: &Expr, kind: DecisionKind) -> InstrumentalResult<Label> {
        let label = self.labels.next_label(expr.line);
        match self.metadata.construct(label) {
            Some(Construct::BooleanDecision(c)) if c.kind == kind => Ok(label),
            Some(other) => Err(self.mismatch(
                label,
                format!("expected a {}, found {}", kind.as_str(), other.kind_name()),
            )),
            None => Err(self.mismatch(label, "no construct recorded for label")),
        }
    }

    // ---- statements ----

    fn block(&mut self, body: &[Stmt]) -> InstrumentalResult<Vec<Stmt>> {
        let mut out = Vec::with_capacity(body.len() * 2);
        for stmt in body {
            if self.pragmas.is_excluded(stmt.line()) {
                out.push(stmt.clone());
                continue;
            }
            out.push(self.statement_marker(stmt.line()));
            out.push(self.stmt(stmt)?);
        }
        Ok(out)
    }

    fn definition_body(&mut self, body: &[Stmt]) -> InstrumentalResult<Vec<Stmt>> {
        match body.split_first() {
            Some((first, rest)) if first.is_docstring() => {
                let mut out = vec![first.clone()];
                out.extend(self.block(rest)?);
                Ok(out)
            }
            _ => self.block(body),
        }
    }

    fn stmt(&mut self, stmt: &Stmt) -> InstrumentalResult<Stmt> {
        let kind = match &stmt.kind {
            StmtKind::Expr(value) => StmtKind::Expr(self.expr(value)?),
            StmtKind::Assign { targets, value } => StmtKind::Assign {
                targets: self.exprs(targets)?,
                value: self.expr(value)?,
            },
            StmtKind::AugAssign { target, op, value } => StmtKind::AugAssign {
                target: self.expr(target)?,
                op: *op,
                value: self.expr(value)?,
            },
            StmtKind::Delete(targets) => StmtKind::Delete(self.exprs(targets)?),
            StmtKind::Return(value) => StmtKind::Return(self.optional(value.as_ref())?),
            StmtKind::Raise(value) => StmtKind::Raise(self.optional(value.as_ref())?),
            StmtKind::Assert { test, msg } => {
                if self.config.instrument_assertions {
                    StmtKind::Assert {
                        test: self.test(test)?,
                        msg: self.optional(msg.as_ref())?,
                    }
                } else {
                    stmt.kind.clone()
                }
            }
            StmtKind::If { test, body, orelse } => StmtKind::If {
                test: self.test(test)?,
                body: self.block(body)?,
                orelse: self.block(orelse)?,
            },
            StmtKind::While { test, body, orelse } => StmtKind::While {
                test: self.test(test)?,
                body: self.block(body)?,
                orelse: self.block(orelse)?,
            },
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => StmtKind::For {
                target: self.expr(target)?,
                iter: self.expr(iter)?,
                body: self.block(body)?,
                orelse: self.block(orelse)?,
            },
            StmtKind::FunctionDef { name, params, body } => StmtKind::FunctionDef {
                name: name.clone(),
                params: self.params(params)?,
                body: self.definition_body(body)?,
            },
            StmtKind::ClassDef { name, bases, body } => StmtKind::ClassDef {
                name: name.clone(),
                bases: self.exprs(bases)?,
                body: self.definition_body(body)?,
            },
            StmtKind::With { items, body } => {
                let mut rewritten = Vec::with_capacity(items.len());
                for item in items {
                    rewritten.push(WithItem {
                        context: self.expr(&item.context)?,
                        binding: self.optional(item.binding.as_ref())?,
                    });
                }
                StmtKind::With {
                    items: rewritten,
                    body: self.block(body)?,
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                let body = self.block(body)?;
                let mut rewritten = Vec::with_capacity(handlers.len());
                for handler in handlers {
                    rewritten.push(ExceptHandler {
                        kind: self.optional(handler.kind.as_ref())?,
                        name: handler.name.clone(),
                        body: self.block(&handler.body)?,
                        span: handler.span,
                    });
                }
                StmtKind::Try {
                    body,
                    handlers: rewritten,
                    orelse: self.block(orelse)?,
                    finalbody: self.block(finalbody)?,
                }
            }
            StmtKind::Pass
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Global(_)
            | StmtKind::Import(_)
            | StmtKind::ImportFrom { .. } => stmt.kind.clone(),
        };
        Ok(Stmt::new(kind, stmt.span))
    }

    // ---- expressions ----

    fn optional(&mut self, expr: Option<&Expr>) -> InstrumentalResult<Option<Expr>> {
        expr.map(|e| self.expr(e)).transpose()
    }

    fn exprs(&mut self, exprs: &[Expr]) -> InstrumentalResult<Vec<Expr>> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    fn params(&mut self, params: &[Param]) -> InstrumentalResult<Vec<Param>> {
        params
            .iter()
            .map(|param| {
                Ok(Param {
                    name: param.name.clone(),
                    default: self.optional(param.default.as_ref())?,
                })
            })
            .collect()
    }

    /// A condition: wrapped in a decision tap unless it is a chain.
    fn test(&mut self, test: &Expr) -> InstrumentalResult<Expr> {
        if test.is_bool_op() {
            return self.expr(test);
        }
        let label = self.decision_label(test, DecisionKind::Test)?;
        let inner = if test.is_compare() {
            self.expr_children(test)?
        } else {
            self.expr(test)?
        };
        Ok(self.decision_tap(inner, label))
    }

    fn expr(&mut self, expr: &Expr) -> InstrumentalResult<Expr> {
        match &expr.kind {
            ExprKind::BoolOp { op, values } => {
                let label = self.chain_label(expr, *op, values.len())?;
                let mut tapped = Vec::with_capacity(values.len());
                for (pin, value) in values.iter().enumerate() {
                    let operand = self.expr(value)?;
                    tapped.push(self.pin_tap(operand, label, pin));
                }
                Ok(Expr::new(
                    ExprKind::BoolOp {
                        op: *op,
                        values: tapped,
                    },
                    expr.line,
                ))
            }
            ExprKind::Compare { .. } if self.config.instrument_comparisons => {
                let label = self.decision_label(expr, DecisionKind::Comparison)?;
                let inner = self.expr_children(expr)?;
                Ok(self.decision_tap(inner, label))
            }
            ExprKind::IfExp { test, body, orelse } => {
                let test = self.test(test)?;
                let body = self.expr(body)?;
                let orelse = self.expr(orelse)?;
                Ok(Expr::new(
                    ExprKind::IfExp {
                        test: Box::new(test),
                        body: Box::new(body),
                        orelse: Box::new(orelse),
                    },
                    expr.line,
                ))
            }
            _ => self.expr_children(expr),
        }
    }

    fn boxed(&mut self, expr: &Expr) -> InstrumentalResult<Box<Expr>> {
        self.expr(expr).map(Box::new)
    }

    fn expr_children(&mut self, expr: &Expr) -> InstrumentalResult<Expr> {
        let kind = match &expr.kind {
            ExprKind::Name(_) | ExprKind::Constant(_) => expr.kind.clone(),
            ExprKind::BoolOp { op, values } => ExprKind::BoolOp {
                op: *op,
                values: self.exprs(values)?,
            },
            ExprKind::UnaryOp { op, operand } => ExprKind::UnaryOp {
                op: *op,
                operand: self.boxed(operand)?,
            },
            ExprKind::BinOp { left, op, right } => ExprKind::BinOp {
                left: self.boxed(left)?,
                op: *op,
                right: self.boxed(right)?,
            },
            ExprKind::Compare {
                left,
                ops,
                comparators,
            } => ExprKind::Compare {
                left: self.boxed(left)?,
                ops: ops.clone(),
                comparators: self.exprs(comparators)?,
            },
            ExprKind::IfExp { test, body, orelse } => ExprKind::IfExp {
                test: self.boxed(test)?,
                body: self.boxed(body)?,
                orelse: self.boxed(orelse)?,
            },
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                let func = self.boxed(func)?;
                let args = self.exprs(args)?;
                let mut rewritten = Vec::with_capacity(keywords.len());
                for keyword in keywords {
                    rewritten.push(Keyword {
                        name: keyword.name.clone(),
                        value: self.expr(&keyword.value)?,
                    });
                }
                ExprKind::Call {
                    func,
                    args,
                    keywords: rewritten,
                }
            }
            ExprKind::Attribute { value, attr } => ExprKind::Attribute {
                value: self.boxed(value)?,
                attr: attr.clone(),
            },
            ExprKind::Subscript { value, index } => ExprKind::Subscript {
                value: self.boxed(value)?,
                index: self.boxed(index)?,
            },
            ExprKind::List(items) => ExprKind::List(self.exprs(items)?),
            ExprKind::Tuple(items) => ExprKind::Tuple(self.exprs(items)?),
            ExprKind::Dict(entries) => {
                let mut rewritten = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.expr(key)?;
                    let value = self.expr(value)?;
                    rewritten.push((key, value));
                }
                ExprKind::Dict(rewritten)
            }
            ExprKind::Lambda { params, body } => ExprKind::Lambda {
                params: self.params(params)?,
                body: self.boxed(body)?,
            },
        };
        Ok(Expr::new(kind, expr.line))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::metadata::gather_source;
    use crate::pragma::PragmaFinder;
    use crate::syntax::{parse, render_module};

    fn instrument_with(config: GatherConfig, source: &str) -> String {
        let module = parse(source).unwrap();
        let pragmas = PragmaFinder::new().unwrap().find_in(source, &module);
        let metadata = gather_source(config, "m", source).unwrap();
        let out = CoverageAnnotator::instrument("m", &module, &metadata, &pragmas).unwrap();
        render_module(&out)
    }

    fn instrument(source: &str) -> String {
        instrument_with(GatherConfig::default(), source)
    }

    #[test]
    fn test_chain_operands_are_tapped_in_place() {
        let out = instrument("x = a and b\n");
        assert_eq!(
            out,
            "_xxx_recorder_xxx_.record_statement('m', 1)\n\
             x = _xxx_recorder_xxx_.record(a, 'm', '1.1', 0) and _xxx_recorder_xxx_.record(b, 'm', '1.1', 1)\n"
        );
    }

    #[test]
    fn test_if_test_wrapped_in_decision_tap() {
        let out = instrument("if a:\n    x()\nelse:\n    y()\n");
        let expected = "\
_xxx_recorder_xxx_.record_statement('m', 1)
if _xxx_recorder_xxx_.record(a, 'm', '1.1'):
    _xxx_recorder_xxx_.record_statement('m', 2)
    x()
else:
    _xxx_recorder_xxx_.record_statement('m', 4)
    y()
";
        assert_eq!(out, expected);
    }

    #[test]
    fn test_bool_test_gets_only_pin_taps() {
        let out = instrument("while a or b:\n    pass\n");
        assert!(out.contains("while _xxx_recorder_xxx_.record(a, 'm', '1.1', 0) or"));
        assert!(!out.contains("'1.2'"));
    }

    #[test]
    fn test_compare_test_is_tapped_once() {
        let config = GatherConfig {
            instrument_comparisons: true,
            ..GatherConfig::default()
        };
        let out = instrument_with(config, "if a < b:\n    pass\nx = c == d\n");
        assert!(out.contains("if _xxx_recorder_xxx_.record(a < b, 'm', '1.1'):"));
        assert!(out.contains("x = _xxx_recorder_xxx_.record(c == d, 'm', '3.1')"));
    }

    #[test]
    fn test_docstrings_and_future_imports_stay_first() {
        let source = "\
'''doc'''
from __future__ import division
def f():
    '''inner'''
    return 1
";
        let expected = "\
'doc'
from __future__ import division
_xxx_recorder_xxx_.record_statement('m', 2)
_xxx_recorder_xxx_.record_statement('m', 3)
def f():
    'inner'
    _xxx_recorder_xxx_.record_statement('m', 5)
    return 1
";
        assert_eq!(instrument(source), expected);
    }

    #[test]
    fn test_suppressed_statements_emitted_unmodified() {
        let source = "\
if a:  # pragma: no cover
    b = c and d
e = 1
";
        let expected = "\
if a:
    b = c and d
_xxx_recorder_xxx_.record_statement('m', 3)
e = 1
";
        assert_eq!(instrument(source), expected);
    }

    #[test]
    fn test_ternary_test_tapped() {
        let out = instrument("y = a if b else c\n");
        assert!(out.contains("y = a if _xxx_recorder_xxx_.record(b, 'm', '1.1') else c"));
    }

    #[test]
    fn test_try_handlers_get_markers() {
        let out = instrument("try:\n    a()\nexcept E:\n    b()\nfinally:\n    c()\n");
        for line in [1, 2, 4, 6] {
            assert!(out.contains(&format!("record_statement('m', {line})")), "line {line}");
        }
    }

    #[test]
    fn test_stale_metadata_is_rejected() {
        let module = parse("x = a or b\n").unwrap();
        let pragmas = PragmaFinder::new().unwrap().find_in("x = a or b\n", &module);
        let stale = gather_source(GatherConfig::default(), "m", "x = a and b\n").unwrap();
        let err = CoverageAnnotator::instrument("m", &module, &stale, &pragmas).unwrap_err();
        assert!(matches!(err, InstrumentalError::MetadataMismatch { .. }));

        let empty = gather_source(GatherConfig::default(), "m", "x = 1\n").unwrap();
        assert!(CoverageAnnotator::instrument("m", &module, &empty, &pragmas).is_err());
    }

    #[test]
    fn test_rewrite_leaves_input_untouched() {
        let source = "if a and b:\n    pass\n";
        let module = parse(source).unwrap();
        let before = module.clone();
        let pragmas = PragmaFinder::new().unwrap().find_in(source, &module);
        let metadata = gather_source(GatherConfig::default(), "m", source).unwrap();
        let _ = CoverageAnnotator::instrument("m", &module, &metadata, &pragmas).unwrap();
        assert_eq!(module, before);
    }
}
