//! Host syntax tree.
//!
//! Closed sum types over every statement and expression kind the host
//! language has. Every pass in the crate matches these exhaustively, so a new
//! kind cannot be added without each pass deciding what to do with it.

/// Physical extent of a statement.
///
/// `line` is the first line, `head_end` the last line of the statement's own
/// header (the `:` line for compound statements, the last line of a simple
/// statement), `end` the last line including nested suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// First physical line (1-based)
    pub line: u32,
    /// Last line of the statement's own tokens
    pub head_end: u32,
    /// Last line of the statement including nested suites
    pub end: u32,
}

impl Span {
    /// Span covering a single line
    #[must_use]
    pub const fn single(line: u32) -> Self {
        Self {
            line,
            head_end: line,
            end: line,
        }
    }

    /// Lines of the statement's own header, first line excluded
    pub fn continuation_lines(&self) -> impl Iterator<Item = u32> {
        (self.line + 1)..=self.head_end
    }
}

/// A parsed module
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    /// Top-level statements
    pub body: Vec<Stmt>,
}

impl Module {
    /// Create a module from statements
    #[must_use]
    pub fn new(body: Vec<Stmt>) -> Self {
        Self { body }
    }

    /// Whether the module starts with a documentation string
    #[must_use]
    pub fn has_docstring(&self) -> bool {
        self.body.first().is_some_and(Stmt::is_docstring)
    }
}

/// A statement with its position
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    /// Statement kind
    pub kind: StmtKind,
    /// Physical extent
    pub span: Span,
}

/// Every statement kind of the host language
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression evaluated for its effect
    Expr(Expr),
    /// `a = b = value`
    Assign {
        /// Assignment targets, left to right
        targets: Vec<Expr>,
        /// Assigned value
        value: Expr,
    },
    /// `target op= value`
    AugAssign {
        /// Target
        target: Expr,
        /// Operator applied
        op: BinOperator,
        /// Right-hand side
        value: Expr,
    },
    /// `del a, b`
    Delete(Vec<Expr>),
    /// `pass`
    Pass,
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// `return [value]`
    Return(Option<Expr>),
    /// `raise [exc]`
    Raise(Option<Expr>),
    /// `assert test[, msg]`
    Assert {
        /// Asserted condition
        test: Expr,
        /// Failure message
        msg: Option<Expr>,
    },
    /// `global a, b`
    Global(Vec<String>),
    /// `import a.b as c`
    Import(Vec<Alias>),
    /// `from module import names`
    ImportFrom {
        /// Dotted module path
        module: String,
        /// Imported names
        names: Vec<Alias>,
    },
    /// `if test: body else: orelse` (`elif` nests another `If` in `orelse`)
    If {
        /// Condition
        test: Expr,
        /// Taken branch
        body: Vec<Stmt>,
        /// Alternate branch
        orelse: Vec<Stmt>,
    },
    /// `while test: body else: orelse`
    While {
        /// Loop condition
        test: Expr,
        /// Loop body
        body: Vec<Stmt>,
        /// Runs when the loop ends without `break`
        orelse: Vec<Stmt>,
    },
    /// `for target in iter: body else: orelse`
    For {
        /// Loop variable(s)
        target: Expr,
        /// Iterated value
        iter: Expr,
        /// Loop body
        body: Vec<Stmt>,
        /// Runs when the loop ends without `break`
        orelse: Vec<Stmt>,
    },
    /// `def name(params): body`
    FunctionDef {
        /// Function name
        name: String,
        /// Parameters
        params: Vec<Param>,
        /// Function body
        body: Vec<Stmt>,
    },
    /// `class Name(bases): body`
    ClassDef {
        /// Class name
        name: String,
        /// Base classes
        bases: Vec<Expr>,
        /// Class body
        body: Vec<Stmt>,
    },
    /// `with context as binding: body`
    With {
        /// Context managers
        items: Vec<WithItem>,
        /// Managed body
        body: Vec<Stmt>,
    },
    /// `try: body except: handlers else: orelse finally: finalbody`
    Try {
        /// Protected body
        body: Vec<Stmt>,
        /// Exception handlers
        handlers: Vec<ExceptHandler>,
        /// Runs when the body raised nothing
        orelse: Vec<Stmt>,
        /// Always runs
        finalbody: Vec<Stmt>,
    },
}

/// One `except` clause
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    /// Exception type matched, `None` for a bare `except:`
    pub kind: Option<Expr>,
    /// Name bound to the exception
    pub name: Option<String>,
    /// Handler body
    pub body: Vec<Stmt>,
    /// Extent of the clause
    pub span: Span,
}

/// One `with` item
#[derive(Debug, Clone, PartialEq)]
pub struct WithItem {
    /// Context manager expression
    pub context: Expr,
    /// Optional `as` target
    pub binding: Option<Expr>,
}

/// Imported name with its optional alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    /// Imported (dotted) name
    pub name: String,
    /// Local alias
    pub asname: Option<String>,
}

/// Function or lambda parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter name
    pub name: String,
    /// Default value
    pub default: Option<Expr>,
}

/// Keyword argument of a call
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    /// Argument name
    pub name: String,
    /// Argument value
    pub value: Expr,
}

/// An expression with the line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Expression kind
    pub kind: ExprKind,
    /// First physical line
    pub line: u32,
}

/// Every expression kind of the host language
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Variable reference
    Name(String),
    /// Literal constant
    Constant(Constant),
    /// `a and b and c` / `a or b or c`, one node for the whole chain
    BoolOp {
        /// `and` or `or`
        op: BoolOperator,
        /// Operands in evaluation order
        values: Vec<Expr>,
    },
    /// `not x`, `-x`, `+x`
    UnaryOp {
        /// Operator
        op: UnaryOperator,
        /// Operand
        operand: Box<Expr>,
    },
    /// Arithmetic
    BinOp {
        /// Left operand
        left: Box<Expr>,
        /// Operator
        op: BinOperator,
        /// Right operand
        right: Box<Expr>,
    },
    /// `a < b <= c`
    Compare {
        /// Leftmost operand
        left: Box<Expr>,
        /// Operators, one per comparator
        ops: Vec<CmpOperator>,
        /// Right-hand operands
        comparators: Vec<Expr>,
    },
    /// `body if test else orelse`
    IfExp {
        /// Condition
        test: Box<Expr>,
        /// Value when true
        body: Box<Expr>,
        /// Value when false
        orelse: Box<Expr>,
    },
    /// `func(args, name=value)`
    Call {
        /// Called expression
        func: Box<Expr>,
        /// Positional arguments
        args: Vec<Expr>,
        /// Keyword arguments
        keywords: Vec<Keyword>,
    },
    /// `value.attr`
    Attribute {
        /// Object
        value: Box<Expr>,
        /// Attribute name
        attr: String,
    },
    /// `value[index]`
    Subscript {
        /// Container
        value: Box<Expr>,
        /// Index
        index: Box<Expr>,
    },
    /// `[a, b]`
    List(Vec<Expr>),
    /// `(a, b)`
    Tuple(Vec<Expr>),
    /// `{k: v}`
    Dict(Vec<(Expr, Expr)>),
    /// `lambda params: body`
    Lambda {
        /// Parameters
        params: Vec<Param>,
        /// Body expression
        body: Box<Expr>,
    },
}

/// Literal constants
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal
    Str(String),
}

/// Short-circuit boolean operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOperator {
    /// `and`
    And,
    /// `or`
    Or,
}

impl BoolOperator {
    /// Source keyword
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    /// `not`
    Not,
    /// `-`
    Neg,
    /// `+`
    Pos,
}

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOperator {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `//`
    FloorDiv,
    /// `%`
    Mod,
    /// `**`
    Pow,
}

impl BinOperator {
    /// Source symbol
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOperator {
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtE,
    /// `>`
    Gt,
    /// `>=`
    GtE,
    /// `in`
    In,
    /// `not in`
    NotIn,
    /// `is`
    Is,
    /// `is not`
    IsNot,
}

impl CmpOperator {
    /// Source symbol
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtE => "<=",
            Self::Gt => ">",
            Self::GtE => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Is => "is",
            Self::IsNot => "is not",
        }
    }
}

impl Stmt {
    /// Create a statement
    #[must_use]
    pub const fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// First line of the statement
    #[must_use]
    pub const fn line(&self) -> u32 {
        self.span.line
    }

    /// Whether this is a string-constant expression statement
    #[must_use]
    pub fn is_docstring(&self) -> bool {
        matches!(
            &self.kind,
            StmtKind::Expr(Expr {
                kind: ExprKind::Constant(Constant::Str(_)),
                ..
            })
        )
    }

    /// Whether this is `from __future__ import ...`
    #[must_use]
    pub fn is_future_import(&self) -> bool {
        matches!(&self.kind, StmtKind::ImportFrom { module, .. } if module == "__future__")
    }

    /// Body of a function or class definition
    #[must_use]
    pub fn definition_body(&self) -> Option<&[Stmt]> {
        match &self.kind {
            StmtKind::FunctionDef { body, .. } | StmtKind::ClassDef { body, .. } => Some(body),
            _ => None,
        }
    }
}

impl Expr {
    /// Create an expression
    #[must_use]
    pub const fn new(kind: ExprKind, line: u32) -> Self {
        Self { kind, line }
    }

    /// Variable reference
    #[must_use]
    pub fn name(id: impl Into<String>, line: u32) -> Self {
        Self::new(ExprKind::Name(id.into()), line)
    }

    /// String literal
    #[must_use]
    pub fn string(value: impl Into<String>, line: u32) -> Self {
        Self::new(ExprKind::Constant(Constant::Str(value.into())), line)
    }

    /// Integer literal
    #[must_use]
    pub const fn int(value: i64, line: u32) -> Self {
        Self::new(ExprKind::Constant(Constant::Int(value)), line)
    }

    /// `self.attr`
    #[must_use]
    pub fn attribute(self, attr: impl Into<String>) -> Self {
        let line = self.line;
        Self::new(
            ExprKind::Attribute {
                value: Box::new(self),
                attr: attr.into(),
            },
            line,
        )
    }

    /// `self(args)`
    #[must_use]
    pub fn call(self, args: Vec<Expr>) -> Self {
        let line = self.line;
        Self::new(
            ExprKind::Call {
                func: Box::new(self),
                args,
                keywords: Vec::new(),
            },
            line,
        )
    }

    /// Whether the expression is an `and`/`or` chain
    #[must_use]
    pub const fn is_bool_op(&self) -> bool {
        matches!(self.kind, ExprKind::BoolOp { .. })
    }

    /// Whether the expression is a comparison
    #[must_use]
    pub const fn is_compare(&self) -> bool {
        matches!(self.kind, ExprKind::Compare { .. })
    }

    /// Whether the expression is a literal whose truth value is fixed
    #[must_use]
    pub const fn is_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Constant(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_continuation_lines() {
        let span = Span {
            line: 3,
            head_end: 5,
            end: 9,
        };
        assert_eq!(span.continuation_lines().collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(Span::single(2).continuation_lines().count(), 0);
    }

    #[test]
    fn test_docstring_detection() {
        let doc = Stmt::new(StmtKind::Expr(Expr::string("doc", 1)), Span::single(1));
        let other = Stmt::new(StmtKind::Expr(Expr::name("x", 2)), Span::single(2));
        assert!(doc.is_docstring());
        assert!(!other.is_docstring());
        assert!(Module::new(vec![doc, other.clone()]).has_docstring());
        assert!(!Module::new(vec![other]).has_docstring());
    }

    #[test]
    fn test_future_import_detection() {
        let stmt = Stmt::new(
            StmtKind::ImportFrom {
                module: "__future__".into(),
                names: vec![Alias {
                    name: "division".into(),
                    asname: None,
                }],
            },
            Span::single(1),
        );
        assert!(stmt.is_future_import());
    }
}
