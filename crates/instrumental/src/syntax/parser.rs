//! Recursive-descent parser for the host language.

use super::ast::{
    Alias, BinOperator, BoolOperator, CmpOperator, Constant, ExceptHandler, Expr, ExprKind,
    Keyword, Module, Param, Span, Stmt, StmtKind, UnaryOperator, WithItem,
};
use super::lexer::{Token, TokenKind};
use super::ParseError;

const RESERVED: &[&str] = &[
    "and", "as", "assert", "break", "class", "continue", "def", "del", "elif", "else", "except",
    "finally", "for", "from", "global", "if", "import", "in", "is", "lambda", "not", "or", "pass",
    "raise", "return", "try", "while", "with", "None", "True", "False",
];

type ParseResult<T> = Result<T, ParseError>;

/// Parser over a token stream
#[derive(Debug)]
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    prev_line: u32,
}

impl Parser {
    /// Create a parser
    #[must_use]
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            prev_line: 1,
        }
    }

    /// Parse a whole module
    pub fn parse_module(mut self) -> ParseResult<Module> {
        let mut body = Vec::new();
        loop {
            match self.current().kind {
                TokenKind::EndOfFile => break,
                TokenKind::Newline => self.advance(),
                TokenKind::Indent => return Err(self.error("unexpected indent")),
                _ => body.extend(self.parse_statement()?),
            }
        }
        Ok(Module::new(body))
    }

    // ---- token helpers ----

    fn current(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_next(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + 1).min(last)]
    }

    fn line(&self) -> u32 {
        self.current().line
    }

    fn advance(&mut self) {
        let token = self.current();
        if !matches!(
            token.kind,
            TokenKind::Indent | TokenKind::Dedent | TokenKind::EndOfFile
        ) {
            self.prev_line = token.line;
        }
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line(), message)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        self.current().is_keyword(keyword)
    }

    fn at_op(&self, op: &str) -> bool {
        self.current().is_op(op)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{keyword}'")))
        }
    }

    fn expect_op(&mut self, op: &str) -> ParseResult<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{op}'")))
        }
    }

    fn expect_name(&mut self) -> ParseResult<String> {
        match &self.current().kind {
            TokenKind::Name(name) if !RESERVED.contains(&name.as_str()) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    fn expect_newline(&mut self) -> ParseResult<()> {
        match self.current().kind {
            TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            TokenKind::EndOfFile => Ok(()),
            _ => Err(self.error("expected end of line")),
        }
    }

    fn at_line_end(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Newline | TokenKind::EndOfFile
        ) || self.at_op(";")
    }

    // ---- statements ----

    fn parse_statement(&mut self) -> ParseResult<Vec<Stmt>> {
        let compound = ["if", "while", "for", "def", "class", "with", "try"];
        if compound.iter().any(|kw| self.at_keyword(kw)) {
            return Ok(vec![self.parse_compound()?]);
        }
        self.parse_simple_line()
    }

    fn parse_simple_line(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut stmts = vec![self.parse_small_statement()?];
        while self.eat_op(";") {
            if matches!(
                self.current().kind,
                TokenKind::Newline | TokenKind::EndOfFile
            ) {
                break;
            }
            stmts.push(self.parse_small_statement()?);
        }
        self.expect_newline()?;
        Ok(stmts)
    }

    fn parse_small_statement(&mut self) -> ParseResult<Stmt> {
        let line = self.line();
        let kind = self.parse_small_kind()?;
        let span = Span {
            line,
            head_end: self.prev_line,
            end: self.prev_line,
        };
        Ok(Stmt::new(kind, span))
    }

    fn parse_small_kind(&mut self) -> ParseResult<StmtKind> {
        if self.eat_keyword("pass") {
            return Ok(StmtKind::Pass);
        }
        if self.eat_keyword("break") {
            return Ok(StmtKind::Break);
        }
        if self.eat_keyword("continue") {
            return Ok(StmtKind::Continue);
        }
        if self.eat_keyword("return") {
            let value = if self.at_line_end() {
                None
            } else {
                Some(self.parse_testlist()?)
            };
            return Ok(StmtKind::Return(value));
        }
        if self.eat_keyword("raise") {
            let value = if self.at_line_end() {
                None
            } else {
                Some(self.parse_test()?)
            };
            return Ok(StmtKind::Raise(value));
        }
        if self.eat_keyword("assert") {
            let test = self.parse_test()?;
            let msg = if self.eat_op(",") {
                Some(self.parse_test()?)
            } else {
                None
            };
            return Ok(StmtKind::Assert { test, msg });
        }
        if self.eat_keyword("global") {
            let mut names = vec![self.expect_name()?];
            while self.eat_op(",") {
                names.push(self.expect_name()?);
            }
            return Ok(StmtKind::Global(names));
        }
        if self.eat_keyword("del") {
            let mut targets = vec![self.parse_arith()?];
            while self.eat_op(",") {
                if self.at_line_end() {
                    break;
                }
                targets.push(self.parse_arith()?);
            }
            return Ok(StmtKind::Delete(targets));
        }
        if self.eat_keyword("import") {
            let mut names = vec![self.parse_alias(true)?];
            while self.eat_op(",") {
                names.push(self.parse_alias(true)?);
            }
            return Ok(StmtKind::Import(names));
        }
        if self.eat_keyword("from") {
            let module = self.parse_dotted_name()?;
            self.expect_keyword("import")?;
            let parenthesized = self.eat_op("(");
            let mut names = vec![self.parse_alias(false)?];
            while self.eat_op(",") {
                if parenthesized && self.at_op(")") {
                    break;
                }
                names.push(self.parse_alias(false)?);
            }
            if parenthesized {
                self.expect_op(")")?;
            }
            return Ok(StmtKind::ImportFrom { module, names });
        }

        self.parse_expression_statement()
    }

    fn parse_dotted_name(&mut self) -> ParseResult<String> {
        let mut name = self.expect_name()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn parse_alias(&mut self, dotted: bool) -> ParseResult<Alias> {
        let name = if dotted {
            self.parse_dotted_name()?
        } else {
            self.expect_name()?
        };
        let asname = if self.eat_keyword("as") {
            Some(self.expect_name()?)
        } else {
            None
        };
        Ok(Alias { name, asname })
    }

    fn parse_expression_statement(&mut self) -> ParseResult<StmtKind> {
        let first = self.parse_testlist()?;

        let aug = match self.current().kind {
            TokenKind::Op("+=") => Some(BinOperator::Add),
            TokenKind::Op("-=") => Some(BinOperator::Sub),
            TokenKind::Op("*=") => Some(BinOperator::Mul),
            TokenKind::Op("/=") => Some(BinOperator::Div),
            TokenKind::Op("//=") => Some(BinOperator::FloorDiv),
            TokenKind::Op("%=") => Some(BinOperator::Mod),
            TokenKind::Op("**=") => Some(BinOperator::Pow),
            _ => None,
        };
        if let Some(op) = aug {
            self.advance();
            check_target(&first)?;
            let value = self.parse_testlist()?;
            return Ok(StmtKind::AugAssign {
                target: first,
                op,
                value,
            });
        }

        if !self.at_op("=") {
            return Ok(StmtKind::Expr(first));
        }

        let mut chain = vec![first];
        while self.eat_op("=") {
            chain.push(self.parse_testlist()?);
        }
        let value = chain.pop().ok_or_else(|| self.error("expected value"))?;
        for target in &chain {
            check_target(target)?;
        }
        Ok(StmtKind::Assign {
            targets: chain,
            value,
        })
    }

    fn parse_compound(&mut self) -> ParseResult<Stmt> {
        let line = self.line();
        if self.eat_keyword("if") {
            return self.parse_if_rest(line);
        }
        if self.eat_keyword("while") {
            let test = self.parse_test()?;
            self.expect_op(":")?;
            let head_end = self.prev_line;
            let body = self.parse_suite()?;
            let orelse = self.parse_else_clause()?;
            let kind = StmtKind::While { test, body, orelse };
            return Ok(self.finish_compound(kind, line, head_end));
        }
        if self.eat_keyword("for") {
            let target = self.parse_target_list()?;
            check_target(&target)?;
            self.expect_keyword("in")?;
            let iter = self.parse_testlist()?;
            self.expect_op(":")?;
            let head_end = self.prev_line;
            let body = self.parse_suite()?;
            let orelse = self.parse_else_clause()?;
            let kind = StmtKind::For {
                target,
                iter,
                body,
                orelse,
            };
            return Ok(self.finish_compound(kind, line, head_end));
        }
        if self.eat_keyword("def") {
            let name = self.expect_name()?;
            self.expect_op("(")?;
            let params = self.parse_params(")")?;
            self.expect_op(")")?;
            if self.eat_op("->") {
                self.parse_test()?;
            }
            self.expect_op(":")?;
            let head_end = self.prev_line;
            let body = self.parse_suite()?;
            let kind = StmtKind::FunctionDef { name, params, body };
            return Ok(self.finish_compound(kind, line, head_end));
        }
        if self.eat_keyword("class") {
            let name = self.expect_name()?;
            let mut bases = Vec::new();
            if self.eat_op("(") {
                while !self.at_op(")") {
                    bases.push(self.parse_test()?);
                    if !self.eat_op(",") {
                        break;
                    }
                }
                self.expect_op(")")?;
            }
            self.expect_op(":")?;
            let head_end = self.prev_line;
            let body = self.parse_suite()?;
            let kind = StmtKind::ClassDef { name, bases, body };
            return Ok(self.finish_compound(kind, line, head_end));
        }
        if self.eat_keyword("with") {
            let mut items = Vec::new();
            loop {
                let context = self.parse_test()?;
                let binding = if self.eat_keyword("as") {
                    let target = self.parse_arith()?;
                    check_target(&target)?;
                    Some(target)
                } else {
                    None
                };
                items.push(WithItem { context, binding });
                if !self.eat_op(",") {
                    break;
                }
            }
            self.expect_op(":")?;
            let head_end = self.prev_line;
            let body = self.parse_suite()?;
            let kind = StmtKind::With { items, body };
            return Ok(self.finish_compound(kind, line, head_end));
        }
        if self.eat_keyword("try") {
            return self.parse_try_rest(line);
        }
        Err(self.error("expected statement"))
    }

    fn finish_compound(&self, kind: StmtKind, line: u32, head_end: u32) -> Stmt {
        Stmt::new(
            kind,
            Span {
                line,
                head_end,
                end: self.prev_line,
            },
        )
    }

    fn parse_if_rest(&mut self, line: u32) -> ParseResult<Stmt> {
        let test = self.parse_test()?;
        self.expect_op(":")?;
        let head_end = self.prev_line;
        let body = self.parse_suite()?;

        let orelse = if self.at_keyword("elif") {
            let elif_line = self.line();
            self.advance();
            vec![self.parse_if_rest(elif_line)?]
        } else {
            self.parse_else_clause()?
        };

        let kind = StmtKind::If { test, body, orelse };
        Ok(self.finish_compound(kind, line, head_end))
    }

    fn parse_else_clause(&mut self) -> ParseResult<Vec<Stmt>> {
        if self.eat_keyword("else") {
            self.expect_op(":")?;
            self.parse_suite()
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_try_rest(&mut self, line: u32) -> ParseResult<Stmt> {
        self.expect_op(":")?;
        let head_end = self.prev_line;
        let body = self.parse_suite()?;

        let mut handlers = Vec::new();
        while self.at_keyword("except") {
            let handler_line = self.line();
            self.advance();
            let (kind, name) = if self.at_op(":") {
                (None, None)
            } else {
                let kind = self.parse_test()?;
                let name = if self.eat_keyword("as") {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                (Some(kind), name)
            };
            self.expect_op(":")?;
            let handler_head = self.prev_line;
            let handler_body = self.parse_suite()?;
            handlers.push(ExceptHandler {
                kind,
                name,
                body: handler_body,
                span: Span {
                    line: handler_line,
                    head_end: handler_head,
                    end: self.prev_line,
                },
            });
        }

        let orelse = if handlers.is_empty() {
            Vec::new()
        } else {
            self.parse_else_clause()?
        };
        let finalbody = if self.eat_keyword("finally") {
            self.expect_op(":")?;
            self.parse_suite()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.error("expected 'except' or 'finally' block"));
        }

        let kind = StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        };
        Ok(self.finish_compound(kind, line, head_end))
    }

    fn parse_suite(&mut self) -> ParseResult<Vec<Stmt>> {
        if self.current().kind != TokenKind::Newline {
            return self.parse_simple_line();
        }
        self.advance();
        if self.current().kind != TokenKind::Indent {
            return Err(self.error("expected an indented block"));
        }
        self.advance();

        let mut body = Vec::new();
        loop {
            match self.current().kind {
                TokenKind::Dedent => {
                    self.advance();
                    break;
                }
                TokenKind::EndOfFile => break,
                TokenKind::Newline => self.advance(),
                TokenKind::Indent => return Err(self.error("unexpected indent")),
                _ => body.extend(self.parse_statement()?),
            }
        }
        Ok(body)
    }

    fn parse_params(&mut self, closing: &str) -> ParseResult<Vec<Param>> {
        let mut params: Vec<Param> = Vec::new();
        while !self.at_op(closing) {
            let name = self.expect_name()?;
            let default = if self.eat_op("=") {
                Some(self.parse_test()?)
            } else {
                None
            };
            if default.is_none() && params.iter().any(|p| p.default.is_some()) {
                return Err(self.error("non-default parameter follows default parameter"));
            }
            params.push(Param { name, default });
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(params)
    }

    // ---- expressions ----

    fn parse_testlist(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        let first = self.parse_test()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_line_end() || self.at_op("=") || self.at_op(")") {
                break;
            }
            items.push(self.parse_test()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), line))
    }

    fn parse_target_list(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        let first = self.parse_arith()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_keyword("in") {
                break;
            }
            items.push(self.parse_arith()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), line))
    }

    fn parse_test(&mut self) -> ParseResult<Expr> {
        if self.at_keyword("lambda") {
            return self.parse_lambda();
        }
        let line = self.line();
        let body = self.parse_or()?;
        if !self.eat_keyword("if") {
            return Ok(body);
        }
        let test = self.parse_or()?;
        self.expect_keyword("else")?;
        let orelse = self.parse_test()?;
        Ok(Expr::new(
            ExprKind::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
            line,
        ))
    }

    fn parse_lambda(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        self.expect_keyword("lambda")?;
        let params = self.parse_params(":")?;
        self.expect_op(":")?;
        let body = self.parse_test()?;
        Ok(Expr::new(
            ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            line,
        ))
    }

    fn parse_bool_chain(
        &mut self,
        op: BoolOperator,
        operand: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let line = self.line();
        let first = operand(self)?;
        if !self.at_keyword(op.keyword()) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_keyword(op.keyword()) {
            values.push(operand(self)?);
        }
        Ok(Expr::new(ExprKind::BoolOp { op, values }, line))
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        self.parse_bool_chain(BoolOperator::Or, Self::parse_and)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        self.parse_bool_chain(BoolOperator::And, Self::parse_not)
    }

    fn parse_not(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        if self.eat_keyword("not") {
            let operand = self.parse_not()?;
            return Ok(Expr::new(
                ExprKind::UnaryOp {
                    op: UnaryOperator::Not,
                    operand: Box::new(operand),
                },
                line,
            ));
        }
        self.parse_comparison()
    }

    fn comparison_operator(&mut self) -> Option<CmpOperator> {
        let op = match self.current().kind {
            TokenKind::Op("==") => CmpOperator::Eq,
            TokenKind::Op("!=") => CmpOperator::NotEq,
            TokenKind::Op("<") => CmpOperator::Lt,
            TokenKind::Op("<=") => CmpOperator::LtE,
            TokenKind::Op(">") => CmpOperator::Gt,
            TokenKind::Op(">=") => CmpOperator::GtE,
            _ if self.at_keyword("in") => CmpOperator::In,
            _ if self.at_keyword("not") && self.peek_next().is_keyword("in") => {
                self.advance();
                CmpOperator::NotIn
            }
            _ if self.at_keyword("is") => {
                if self.peek_next().is_keyword("not") {
                    self.advance();
                    CmpOperator::IsNot
                } else {
                    CmpOperator::Is
                }
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        let left = self.parse_arith()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.comparison_operator() {
            ops.push(op);
            comparators.push(self.parse_arith()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::new(
            ExprKind::Compare {
                left: Box::new(left),
                ops,
                comparators,
            },
            line,
        ))
    }

    fn binary(left: Expr, op: BinOperator, right: Expr) -> Expr {
        let line = left.line;
        Expr::new(
            ExprKind::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            line,
        )
    }

    fn parse_arith(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Op("+") => BinOperator::Add,
                TokenKind::Op("-") => BinOperator::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Self::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Op("*") => BinOperator::Mul,
                TokenKind::Op("/") => BinOperator::Div,
                TokenKind::Op("//") => BinOperator::FloorDiv,
                TokenKind::Op("%") => BinOperator::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Self::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        let op = match self.current().kind {
            TokenKind::Op("-") => Some(UnaryOperator::Neg),
            TokenKind::Op("+") => Some(UnaryOperator::Pos),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_factor()?;
            return Ok(Expr::new(
                ExprKind::UnaryOp {
                    op,
                    operand: Box::new(operand),
                },
                line,
            ));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> ParseResult<Expr> {
        let base = self.parse_atom_expr()?;
        if self.eat_op("**") {
            let exponent = self.parse_factor()?;
            return Ok(Self::binary(base, BinOperator::Pow, exponent));
        }
        Ok(base)
    }

    fn parse_atom_expr(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            let line = expr.line;
            if self.eat_op("(") {
                let (args, keywords) = self.parse_call_args()?;
                self.expect_op(")")?;
                expr = Expr::new(
                    ExprKind::Call {
                        func: Box::new(expr),
                        args,
                        keywords,
                    },
                    line,
                );
            } else if self.eat_op("[") {
                let index = self.parse_testlist()?;
                self.expect_op("]")?;
                expr = Expr::new(
                    ExprKind::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                    },
                    line,
                );
            } else if self.eat_op(".") {
                let attr = self.expect_name()?;
                expr = expr.attribute(attr);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> ParseResult<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();
        while !self.at_op(")") {
            let is_keyword = matches!(self.current().kind, TokenKind::Name(_))
                && self.peek_next().is_op("=");
            if is_keyword {
                let name = self.expect_name()?;
                self.expect_op("=")?;
                let value = self.parse_test()?;
                keywords.push(Keyword { name, value });
            } else {
                if !keywords.is_empty() {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                args.push(self.parse_test()?);
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok((args, keywords))
    }

    fn parse_atom(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        let token = self.current().clone();
        match token.kind {
            TokenKind::Int(value) => {
                self.advance();
                Ok(Expr::int(value, line))
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Constant(Constant::Float(value)), line))
            }
            TokenKind::Str(first) => {
                self.advance();
                let mut value = first;
                while let TokenKind::Str(next) = &self.current().kind {
                    value.push_str(next);
                    self.advance();
                }
                Ok(Expr::string(value, line))
            }
            TokenKind::Name(name) => {
                let constant = match name.as_str() {
                    "None" => Some(Constant::None),
                    "True" => Some(Constant::Bool(true)),
                    "False" => Some(Constant::Bool(false)),
                    _ => None,
                };
                if let Some(constant) = constant {
                    self.advance();
                    return Ok(Expr::new(ExprKind::Constant(constant), line));
                }
                let name = self.expect_name()?;
                Ok(Expr::name(name, line))
            }
            TokenKind::Op("(") => {
                self.advance();
                if self.eat_op(")") {
                    return Ok(Expr::new(ExprKind::Tuple(Vec::new()), line));
                }
                let first = self.parse_test()?;
                if self.eat_op(")") {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.at_op(")") {
                        break;
                    }
                    items.push(self.parse_test()?);
                }
                self.expect_op(")")?;
                Ok(Expr::new(ExprKind::Tuple(items), line))
            }
            TokenKind::Op("[") => {
                self.advance();
                let mut items = Vec::new();
                while !self.at_op("]") {
                    items.push(self.parse_test()?);
                    if !self.eat_op(",") {
                        break;
                    }
                }
                self.expect_op("]")?;
                Ok(Expr::new(ExprKind::List(items), line))
            }
            TokenKind::Op("{") => {
                self.advance();
                let mut entries = Vec::new();
                while !self.at_op("}") {
                    let key = self.parse_test()?;
                    self.expect_op(":")?;
                    let value = self.parse_test()?;
                    entries.push((key, value));
                    if !self.eat_op(",") {
                        break;
                    }
                }
                self.expect_op("}")?;
                Ok(Expr::new(ExprKind::Dict(entries), line))
            }
            _ => Err(self.error("expected expression")),
        }
    }
}

fn check_target(target: &Expr) -> ParseResult<()> {
    match &target.kind {
        ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => Ok(()),
        ExprKind::Tuple(items) | ExprKind::List(items) => items.iter().try_for_each(check_target),
        _ => Err(ParseError::new(target.line, "cannot assign to expression")),
    }
}
