//! Source rendering of syntax trees.
//!
//! Output re-parses to an equivalent tree. Parentheses are inserted from
//! operator precedence, so rendering a rewritten tree never changes how its
//! operands group.

use std::fmt::Write;

use super::ast::{
    BinOperator, BoolOperator, Constant, ExceptHandler, Expr, ExprKind, Module, Param, Stmt,
    StmtKind, UnaryOperator,
};

const INDENT: &str = "    ";

const PREC_LAMBDA: u8 = 0;
const PREC_TERNARY: u8 = 1;
const PREC_OR: u8 = 2;
const PREC_AND: u8 = 3;
const PREC_NOT: u8 = 4;
const PREC_COMPARE: u8 = 5;
const PREC_ARITH: u8 = 6;
const PREC_TERM: u8 = 7;
const PREC_FACTOR: u8 = 8;
const PREC_POWER: u8 = 9;
const PREC_ATOM: u8 = 10;

fn precedence(expr: &Expr) -> u8 {
    match &expr.kind {
        ExprKind::Lambda { .. } => PREC_LAMBDA,
        ExprKind::IfExp { .. } => PREC_TERNARY,
        ExprKind::BoolOp {
            op: BoolOperator::Or,
            ..
        } => PREC_OR,
        ExprKind::BoolOp {
            op: BoolOperator::And,
            ..
        } => PREC_AND,
        ExprKind::UnaryOp {
            op: UnaryOperator::Not,
            ..
        } => PREC_NOT,
        ExprKind::UnaryOp { .. } => PREC_FACTOR,
        ExprKind::Compare { .. } => PREC_COMPARE,
        ExprKind::BinOp { op, .. } => binop_precedence(*op),
        ExprKind::Constant(Constant::Int(v)) if *v < 0 => PREC_FACTOR,
        ExprKind::Constant(Constant::Float(v)) if v.is_sign_negative() => PREC_FACTOR,
        _ => PREC_ATOM,
    }
}

const fn binop_precedence(op: BinOperator) -> u8 {
    match op {
        BinOperator::Add | BinOperator::Sub => PREC_ARITH,
        BinOperator::Mul | BinOperator::Div | BinOperator::FloorDiv | BinOperator::Mod => {
            PREC_TERM
        }
        BinOperator::Pow => PREC_POWER,
    }
}

/// Render an expression as source text
#[must_use]
pub fn render_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

/// Render a module as source text
#[must_use]
pub fn render_module(module: &Module) -> String {
    let mut out = String::new();
    write_block(&mut out, &module.body, 0);
    out
}

fn write_sub(out: &mut String, expr: &Expr, min: u8) {
    if precedence(expr) < min {
        out.push('(');
        write_expr(out, expr);
        out.push(')');
    } else {
        write_expr(out, expr);
    }
}

fn write_joined(out: &mut String, items: &[Expr], min: u8) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_sub(out, item, min);
    }
}

fn write_params(out: &mut String, params: &[Param]) {
    for (i, param) in params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&param.name);
        if let Some(default) = &param.default {
            out.push('=');
            write_sub(out, default, PREC_TERNARY);
        }
    }
}

fn write_constant(out: &mut String, constant: &Constant) {
    match constant {
        Constant::None => out.push_str("None"),
        Constant::Bool(true) => out.push_str("True"),
        Constant::Bool(false) => out.push_str("False"),
        Constant::Int(v) => {
            let _ = write!(out, "{v}");
        }
        Constant::Float(v) => {
            let _ = write!(out, "{v:?}");
        }
        Constant::Str(s) => out.push_str(&quote(s)),
    }
}

/// Quote a string literal with single quotes
#[must_use]
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn write_expr(out: &mut String, expr: &Expr) {
    match &expr.kind {
        ExprKind::Name(id) => out.push_str(id),
        ExprKind::Constant(constant) => write_constant(out, constant),
        ExprKind::BoolOp { op, values } => {
            let prec = if *op == BoolOperator::And {
                PREC_AND
            } else {
                PREC_OR
            };
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                    out.push_str(op.keyword());
                    out.push(' ');
                }
                write_sub(out, value, prec + 1);
            }
        }
        ExprKind::UnaryOp { op, operand } => match op {
            UnaryOperator::Not => {
                out.push_str("not ");
                write_sub(out, operand, PREC_NOT);
            }
            UnaryOperator::Neg => {
                out.push('-');
                write_sub(out, operand, PREC_FACTOR);
            }
            UnaryOperator::Pos => {
                out.push('+');
                write_sub(out, operand, PREC_FACTOR);
            }
        },
        ExprKind::BinOp { left, op, right } => {
            let prec = binop_precedence(*op);
            if *op == BinOperator::Pow {
                write_sub(out, left, PREC_ATOM);
                out.push_str(" ** ");
                write_sub(out, right, PREC_FACTOR);
            } else {
                write_sub(out, left, prec);
                out.push(' ');
                out.push_str(op.symbol());
                out.push(' ');
                write_sub(out, right, prec + 1);
            }
        }
        ExprKind::Compare {
            left,
            ops,
            comparators,
        } => {
            write_sub(out, left, PREC_ARITH);
            for (op, comparator) in ops.iter().zip(comparators) {
                out.push(' ');
                out.push_str(op.symbol());
                out.push(' ');
                write_sub(out, comparator, PREC_ARITH);
            }
        }
        ExprKind::IfExp { test, body, orelse } => {
            write_sub(out, body, PREC_OR);
            out.push_str(" if ");
            write_sub(out, test, PREC_OR);
            out.push_str(" else ");
            write_sub(out, orelse, PREC_TERNARY);
        }
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            write_sub(out, func, PREC_ATOM);
            out.push('(');
            write_joined(out, args, PREC_LAMBDA);
            for (i, keyword) in keywords.iter().enumerate() {
                if i > 0 || !args.is_empty() {
                    out.push_str(", ");
                }
                out.push_str(&keyword.name);
                out.push('=');
                write_sub(out, &keyword.value, PREC_LAMBDA);
            }
            out.push(')');
        }
        ExprKind::Attribute { value, attr } => {
            // `1.real` would lex as a float
            let numeric = matches!(
                value.kind,
                ExprKind::Constant(Constant::Int(_) | Constant::Float(_))
            );
            if numeric {
                out.push('(');
                write_expr(out, value);
                out.push(')');
            } else {
                write_sub(out, value, PREC_ATOM);
            }
            out.push('.');
            out.push_str(attr);
        }
        ExprKind::Subscript { value, index } => {
            write_sub(out, value, PREC_ATOM);
            out.push('[');
            write_expr(out, index);
            out.push(']');
        }
        ExprKind::List(items) => {
            out.push('[');
            write_joined(out, items, PREC_LAMBDA);
            out.push(']');
        }
        ExprKind::Tuple(items) => {
            out.push('(');
            write_joined(out, items, PREC_LAMBDA);
            if items.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        ExprKind::Dict(entries) => {
            out.push('{');
            for (i, (key, value)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_sub(out, key, PREC_LAMBDA);
                out.push_str(": ");
                write_sub(out, value, PREC_LAMBDA);
            }
            out.push('}');
        }
        ExprKind::Lambda { params, body } => {
            out.push_str("lambda");
            if !params.is_empty() {
                out.push(' ');
                write_params(out, params);
            }
            out.push_str(": ");
            write_sub(out, body, PREC_LAMBDA);
        }
    }
}

fn write_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn write_block(out: &mut String, body: &[Stmt], depth: usize) {
    if body.is_empty() {
        write_indent(out, depth);
        out.push_str("pass\n");
        return;
    }
    for stmt in body {
        write_stmt(out, stmt, depth);
    }
}

fn write_header(out: &mut String, depth: usize, header: &str) {
    write_indent(out, depth);
    out.push_str(header);
    out.push_str(":\n");
}

fn write_else(out: &mut String, orelse: &[Stmt], depth: usize) {
    if !orelse.is_empty() {
        write_header(out, depth, "else");
        write_block(out, orelse, depth + 1);
    }
}

fn write_handler(out: &mut String, handler: &ExceptHandler, depth: usize) {
    let mut header = String::from("except");
    if let Some(kind) = &handler.kind {
        header.push(' ');
        header.push_str(&render_expr(kind));
        if let Some(name) = &handler.name {
            header.push_str(" as ");
            header.push_str(name);
        }
    }
    write_header(out, depth, &header);
    write_block(out, &handler.body, depth + 1);
}

fn write_if(
    out: &mut String,
    keyword: &str,
    test: &Expr,
    body: &[Stmt],
    orelse: &[Stmt],
    depth: usize,
) {
    write_header(out, depth, &format!("{keyword} {}", render_expr(test)));
    write_block(out, body, depth + 1);
    match orelse {
        [Stmt {
            kind:
                StmtKind::If {
                    test,
                    body,
                    orelse,
                },
            ..
        }] => write_if(out, "elif", test, body, orelse, depth),
        _ => write_else(out, orelse, depth),
    }
}

fn write_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    let simple = match &stmt.kind {
        StmtKind::Expr(expr) => render_expr(expr),
        StmtKind::Assign { targets, value } => {
            let mut line = String::new();
            for target in targets {
                line.push_str(&render_expr(target));
                line.push_str(" = ");
            }
            line.push_str(&render_expr(value));
            line
        }
        StmtKind::AugAssign { target, op, value } => {
            format!("{} {}= {}", render_expr(target), op.symbol(), render_expr(value))
        }
        StmtKind::Delete(targets) => {
            let mut line = String::from("del ");
            write_joined(&mut line, targets, PREC_LAMBDA);
            line
        }
        StmtKind::Pass => "pass".into(),
        StmtKind::Break => "break".into(),
        StmtKind::Continue => "continue".into(),
        StmtKind::Return(None) => "return".into(),
        StmtKind::Return(Some(value)) => format!("return {}", render_expr(value)),
        StmtKind::Raise(None) => "raise".into(),
        StmtKind::Raise(Some(value)) => format!("raise {}", render_expr(value)),
        StmtKind::Assert { test, msg } => match msg {
            Some(msg) => format!("assert {}, {}", render_expr(test), render_expr(msg)),
            None => format!("assert {}", render_expr(test)),
        },
        StmtKind::Global(names) => format!("global {}", names.join(", ")),
        StmtKind::Import(names) => format!("import {}", render_aliases(names)),
        StmtKind::ImportFrom { module, names } => {
            format!("from {module} import {}", render_aliases(names))
        }
        StmtKind::If { test, body, orelse } => {
            write_if(out, "if", test, body, orelse, depth);
            return;
        }
        StmtKind::While { test, body, orelse } => {
            write_header(out, depth, &format!("while {}", render_expr(test)));
            write_block(out, body, depth + 1);
            write_else(out, orelse, depth);
            return;
        }
        StmtKind::For {
            target,
            iter,
            body,
            orelse,
        } => {
            write_header(
                out,
                depth,
                &format!("for {} in {}", render_expr(target), render_expr(iter)),
            );
            write_block(out, body, depth + 1);
            write_else(out, orelse, depth);
            return;
        }
        StmtKind::FunctionDef { name, params, body } => {
            let mut header = format!("def {name}(");
            write_params(&mut header, params);
            header.push(')');
            write_header(out, depth, &header);
            write_block(out, body, depth + 1);
            return;
        }
        StmtKind::ClassDef { name, bases, body } => {
            let mut header = format!("class {name}");
            if !bases.is_empty() {
                header.push('(');
                write_joined(&mut header, bases, PREC_LAMBDA);
                header.push(')');
            }
            write_header(out, depth, &header);
            write_block(out, body, depth + 1);
            return;
        }
        StmtKind::With { items, body } => {
            let mut header = String::from("with ");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    header.push_str(", ");
                }
                header.push_str(&render_expr(&item.context));
                if let Some(binding) = &item.binding {
                    header.push_str(" as ");
                    header.push_str(&render_expr(binding));
                }
            }
            write_header(out, depth, &header);
            write_block(out, body, depth + 1);
            return;
        }
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            write_header(out, depth, "try");
            write_block(out, body, depth + 1);
            for handler in handlers {
                write_handler(out, handler, depth);
            }
            write_else(out, orelse, depth);
            if !finalbody.is_empty() {
                write_header(out, depth, "finally");
                write_block(out, finalbody, depth + 1);
            }
            return;
        }
    };

    write_indent(out, depth);
    out.push_str(&simple);
    out.push('\n');
}

fn render_aliases(names: &[super::ast::Alias]) -> String {
    names
        .iter()
        .map(|alias| match &alias.asname {
            Some(asname) => format!("{} as {asname}", alias.name),
            None => alias.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
