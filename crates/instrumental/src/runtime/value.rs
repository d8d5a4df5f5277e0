//! Runtime values.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::recorder::Truthiness;
use crate::syntax::{quote, Expr, Stmt};

/// Builtin functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `len(x)`
    Len,
    /// `range([start,] stop[, step])`
    Range,
    /// `print(*args)`
    Print,
    /// `bool(x)`
    Bool,
    /// `int(x)`
    Int,
    /// `str(x)`
    Str,
    /// `abs(x)`
    Abs,
}

impl Builtin {
    /// Look a builtin up by name
    #[must_use]
    pub fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "len" => Self::Len,
            "range" => Self::Range,
            "print" => Self::Print,
            "bool" => Self::Bool,
            "int" => Self::Int,
            "str" => Self::Str,
            "abs" => Self::Abs,
            _ => return None,
        })
    }

    /// Name the builtin is bound to
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Len => "len",
            Self::Range => "range",
            Self::Print => "print",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Str => "str",
            Self::Abs => "abs",
        }
    }
}

/// Exception classes known to the runtime
pub const EXCEPTION_TYPES: &[&str] = &[
    "Exception",
    "ArithmeticError",
    "AssertionError",
    "AttributeError",
    "IndexError",
    "KeyError",
    "NameError",
    "OverflowError",
    "RecursionError",
    "RuntimeError",
    "TypeError",
    "ValueError",
    "ZeroDivisionError",
];

/// Whether an exception of class `kind` is caught by a handler for `handler`
#[must_use]
pub fn exception_matches(kind: &str, handler: &str) -> bool {
    handler == "Exception"
        || handler == kind
        || (handler == "ArithmeticError" && matches!(kind, "ZeroDivisionError" | "OverflowError"))
}

/// Body of a callable
#[derive(Debug)]
pub enum FunctionBody {
    /// `def` suite
    Block(Vec<Stmt>),
    /// `lambda` expression
    Lambda(Expr),
}

/// A user-defined function with its evaluated defaults
#[derive(Debug)]
pub struct Function {
    /// Bound name (`<lambda>` for lambdas)
    pub name: String,
    /// Parameter names with default values
    pub params: Vec<(String, Option<Value>)>,
    /// What the call executes
    pub body: FunctionBody,
}

/// A host-language value
#[derive(Debug, Clone)]
pub enum Value {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// String
    Str(Rc<str>),
    /// Mutable list
    List(Rc<RefCell<Vec<Value>>>),
    /// Immutable tuple
    Tuple(Rc<Vec<Value>>),
    /// Insertion-ordered dictionary
    Dict(Rc<RefCell<Vec<(Value, Value)>>>),
    /// User-defined function or lambda
    Function(Rc<Function>),
    /// Builtin function
    Builtin(Builtin),
    /// Exception class
    ExceptionType(&'static str),
    /// Exception instance
    Exception {
        /// Class name
        kind: Rc<str>,
        /// Message given at construction
        message: Rc<str>,
    },
}

impl Value {
    /// String value
    #[must_use]
    pub fn str(value: &str) -> Self {
        Self::Str(Rc::from(value))
    }

    /// List value
    #[must_use]
    pub fn list(items: Vec<Self>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    /// Tuple value
    #[must_use]
    pub fn tuple(items: Vec<Self>) -> Self {
        Self::Tuple(Rc::new(items))
    }

    /// Dictionary value
    #[must_use]
    pub fn dict(entries: Vec<(Self, Self)>) -> Self {
        Self::Dict(Rc::new(RefCell::new(entries)))
    }

    /// Exception instance
    #[must_use]
    pub fn exception(kind: &str, message: &str) -> Self {
        Self::Exception {
            kind: Rc::from(kind),
            message: Rc::from(message),
        }
    }

    /// Type name used in error messages
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Function(_) => "function",
            Self::Builtin(_) => "builtin_function",
            Self::ExceptionType(_) => "type",
            Self::Exception { .. } => "exception",
        }
    }

    /// Integer view of ints and bools
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Float view of any number
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => self.as_int().map(|i| i as f64),
        }
    }

    /// Elements of an iterable, snapshotted
    #[must_use]
    pub fn iter_values(&self) -> Option<Vec<Self>> {
        match self {
            Self::List(items) => Some(items.borrow().clone()),
            Self::Tuple(items) => Some(items.as_ref().clone()),
            Self::Str(s) => Some(s.chars().map(|c| Self::str(&c.to_string())).collect()),
            Self::Dict(entries) => Some(entries.borrow().iter().map(|(k, _)| k.clone()).collect()),
            _ => None,
        }
    }

    /// Host-language equality
    #[must_use]
    pub fn py_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => seq_eq(&a.borrow(), &b.borrow()),
            (Self::Tuple(a), Self::Tuple(b)) => seq_eq(a, b),
            (Self::Dict(a), Self::Dict(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter().any(|(k2, v2)| k.py_eq(k2) && v.py_eq(v2))
                    })
            }
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            (Self::ExceptionType(a), Self::ExceptionType(b)) => a == b,
            (
                Self::Exception { kind, message },
                Self::Exception {
                    kind: kind2,
                    message: message2,
                },
            ) => kind == kind2 && message == message2,
            (a, b) => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => x == y,
                _ => match (a.as_float(), b.as_float()) {
                    (Some(x), Some(y)) => x == y,
                    _ => false,
                },
            },
        }
    }

    /// Host-language identity
    #[must_use]
    pub fn is_same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Tuple(a), Self::Tuple(b)) => Rc::ptr_eq(a, b),
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            (Self::ExceptionType(a), Self::ExceptionType(b)) => a == b,
            _ => false,
        }
    }

    /// `repr()` form
    #[must_use]
    pub fn repr(&self) -> String {
        match self {
            Self::Str(s) => quote(s),
            Self::Exception { kind, message } => format!("{kind}({})", quote(message)),
            _ => self.to_string(),
        }
    }
}

fn seq_eq(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
}

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        f.write_str(&item.repr())?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                write_seq(f, &items.borrow())?;
                f.write_str("]")
            }
            Self::Tuple(items) => {
                f.write_str("(")?;
                write_seq(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Self::Dict(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k.repr(), v.repr())?;
                }
                f.write_str("}")
            }
            Self::Function(func) => write!(f, "<function {}>", func.name),
            Self::Builtin(b) => write!(f, "<built-in function {}>", b.name()),
            Self::ExceptionType(name) => write!(f, "<class '{name}'>"),
            Self::Exception { message, .. } => f.write_str(message),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.py_eq(other)
    }
}

impl Truthiness for Value {
    fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(x) => *x != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.borrow().is_empty(),
            Self::Tuple(items) => !items.is_empty(),
            Self::Dict(entries) => !entries.borrow().is_empty(),
            Self::Function(_)
            | Self::Builtin(_)
            | Self::ExceptionType(_)
            | Self::Exception { .. } => true,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::str(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Int(-3).is_truthy());
        assert!(!Value::str("").is_truthy());
        assert!(Value::str("x").is_truthy());
        assert!(!Value::list(vec![]).is_truthy());
        assert!(Value::tuple(vec![Value::None]).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
    }

    #[test]
    fn test_numeric_equality_crosses_types() {
        assert_eq!(Value::Int(1), Value::Bool(true));
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(1), Value::str("1"));
    }

    #[test]
    fn test_display() {
        let value = Value::list(vec![Value::Int(1), Value::str("a"), Value::Float(2.0)]);
        assert_eq!(value.to_string(), "[1, 'a', 2.0]");
        assert_eq!(Value::tuple(vec![Value::None]).to_string(), "(None,)");
        let dict = Value::dict(vec![(Value::str("k"), Value::Bool(false))]);
        assert_eq!(dict.to_string(), "{'k': False}");
    }

    #[test]
    fn test_exception_hierarchy() {
        assert!(exception_matches("KeyError", "Exception"));
        assert!(exception_matches("ZeroDivisionError", "ArithmeticError"));
        assert!(!exception_matches("KeyError", "ValueError"));
    }
}
