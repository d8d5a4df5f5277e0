//! Tree-walking interpreter.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::value::{exception_matches, Builtin, Function, FunctionBody, Value, EXCEPTION_TYPES};
use super::{RuntimeError, RuntimeResult};
use crate::construct::Label;
use crate::instrument::{RECORDER_BINDING, RECORD_METHOD, RECORD_STATEMENT_METHOD};
use crate::recorder::{ExecutionRecorder, Truthiness};
use crate::syntax::{
    BinOperator, BoolOperator, CmpOperator, Constant, ExceptHandler, Expr, ExprKind, Keyword,
    Module, Param, Stmt, StmtKind, UnaryOperator,
};

const MAX_DEPTH: usize = 32;

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

#[derive(Default)]
struct Frame {
    locals: HashMap<String, Value>,
    globals: HashSet<String>,
}

fn raise<T>(kind: &str, message: impl Into<String>) -> RuntimeResult<T> {
    Err(RuntimeError::exception(kind, message))
}

fn type_error<T>(message: impl Into<String>) -> RuntimeResult<T> {
    raise("TypeError", message)
}

/// Executes module trees against a recorder
pub struct Interpreter<'r> {
    recorder: &'r mut ExecutionRecorder,
    globals: HashMap<String, Value>,
    frames: Vec<Frame>,
    handling: Vec<Value>,
    output: Vec<String>,
}

impl std::fmt::Debug for Interpreter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("globals", &self.globals.len())
            .field("depth", &self.frames.len())
            .field("output", &self.output.len())
            .finish_non_exhaustive()
    }
}

impl<'r> Interpreter<'r> {
    /// Create an interpreter with empty globals
    pub fn new(recorder: &'r mut ExecutionRecorder) -> Self {
        Self {
            recorder,
            globals: HashMap::new(),
            frames: Vec::new(),
            handling: Vec::new(),
            output: Vec::new(),
        }
    }

    /// Execute a module's statements in the global scope
    pub fn run(&mut self, module: &Module) -> RuntimeResult<()> {
        match self.block(&module.body)? {
            Flow::Normal => Ok(()),
            Flow::Return(_) => raise("SyntaxError", "'return' outside function"),
            Flow::Break | Flow::Continue => raise("SyntaxError", "loop control outside loop"),
        }
    }

    /// Call a global function by name
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        let callee = self.lookup(name)?;
        self.call_value(&callee, args, Vec::new())
    }

    /// A global binding
    #[must_use]
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Bind a global
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    /// Lines written by `print`
    #[must_use]
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Take the lines written by `print`
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    /// The recorder taps report into
    pub fn recorder(&mut self) -> &mut ExecutionRecorder {
        &mut *self.recorder
    }

    // ---- scopes ----

    fn lookup(&self, name: &str) -> RuntimeResult<Value> {
        if let Some(frame) = self.frames.last() {
            if !frame.globals.contains(name) {
                if let Some(value) = frame.locals.get(name) {
                    return Ok(value.clone());
                }
            }
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        if let Some(builtin) = Builtin::lookup(name) {
            return Ok(Value::Builtin(builtin));
        }
        if let Some(kind) = EXCEPTION_TYPES.iter().copied().find(|kind| *kind == name) {
            return Ok(Value::ExceptionType(kind));
        }
        raise("NameError", format!("name '{name}' is not defined"))
    }

    fn bind(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) if !frame.globals.contains(name) => {
                frame.locals.insert(name.to_string(), value);
            }
            _ => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    fn unbind(&mut self, name: &str) -> RuntimeResult<()> {
        let removed = match self.frames.last_mut() {
            Some(frame) if !frame.globals.contains(name) => frame.locals.remove(name),
            _ => self.globals.remove(name),
        };
        match removed {
            Some(_) => Ok(()),
            None => raise("NameError", format!("name '{name}' is not defined")),
        }
    }

    // ---- statements ----

    fn block(&mut self, body: &[Stmt]) -> RuntimeResult<Flow> {
        for stmt in body {
            match self.stmt(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn stmt(&mut self, stmt: &Stmt) -> RuntimeResult<Flow> {
        match &stmt.kind {
            StmtKind::Expr(value) => {
                self.eval(value)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }
            StmtKind::AugAssign { target, op, value } => self.aug_assign(target, *op, value)?,
            StmtKind::Delete(targets) => {
                for target in targets {
                    self.delete(target)?;
                }
            }
            StmtKind::Pass => {}
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Return(value) => {
                let value = match value {
                    Some(value) => self.eval(value)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Raise(None) => {
                return match self.handling.last() {
                    Some(Value::Exception { kind, message }) => raise(kind, message.to_string()),
                    _ => raise("RuntimeError", "No active exception to reraise"),
                };
            }
            StmtKind::Raise(Some(value)) => {
                return match self.eval(value)? {
                    Value::Exception { kind, message } => raise(&kind, message.to_string()),
                    Value::ExceptionType(kind) => raise(kind, ""),
                    _ => type_error("exceptions must derive from BaseException"),
                };
            }
            StmtKind::Assert { test, msg } => {
                if !self.eval(test)?.is_truthy() {
                    let message = match msg {
                        Some(msg) => self.eval(msg)?.to_string(),
                        None => String::new(),
                    };
                    return raise("AssertionError", message);
                }
            }
            StmtKind::Global(names) => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.globals.extend(names.iter().cloned());
                }
            }
            StmtKind::Import(_) => return Err(RuntimeError::unsupported(stmt.line(), "import")),
            StmtKind::ImportFrom { .. } if stmt.is_future_import() => {}
            StmtKind::ImportFrom { .. } => {
                return Err(RuntimeError::unsupported(stmt.line(), "import"));
            }
            StmtKind::If { test, body, orelse } => {
                return if self.eval(test)?.is_truthy() {
                    self.block(body)
                } else {
                    self.block(orelse)
                };
            }
            StmtKind::While { test, body, orelse } => {
                while self.eval(test)?.is_truthy() {
                    match self.block(body)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                return self.block(orelse);
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let iterable = self.eval(iter)?;
                let items = iterate(&iterable)?;
                for item in items {
                    self.assign(target, item)?;
                    match self.block(body)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                return self.block(orelse);
            }
            StmtKind::FunctionDef { name, params, body } => {
                let function = Function {
                    name: name.clone(),
                    params: self.defaults(params)?,
                    body: FunctionBody::Block(body.clone()),
                };
                self.bind(name, Value::Function(Rc::new(function)));
            }
            StmtKind::ClassDef { .. } => {
                return Err(RuntimeError::unsupported(stmt.line(), "class definitions"));
            }
            StmtKind::With { .. } => {
                return Err(RuntimeError::unsupported(stmt.line(), "with statements"));
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => return self.try_stmt(body, handlers, orelse, finalbody),
        }
        Ok(Flow::Normal)
    }

    fn try_stmt(
        &mut self,
        body: &[Stmt],
        handlers: &[ExceptHandler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
    ) -> RuntimeResult<Flow> {
        let outcome = match self.block(body) {
            Ok(Flow::Normal) => self.block(orelse),
            Ok(flow) => Ok(flow),
            Err(RuntimeError::Exception { kind, message }) => self.handle(handlers, kind, message),
            Err(err) => Err(err),
        };
        if finalbody.is_empty() {
            return outcome;
        }
        match self.block(finalbody)? {
            Flow::Normal => outcome,
            flow => Ok(flow),
        }
    }

    fn handle(
        &mut self,
        handlers: &[ExceptHandler],
        kind: String,
        message: String,
    ) -> RuntimeResult<Flow> {
        for handler in handlers {
            let caught = match &handler.kind {
                None => true,
                Some(expr) => {
                    let class = self.eval(expr)?;
                    Self::catches(&class, &kind)?
                }
            };
            if caught {
                let exception = Value::exception(&kind, &message);
                if let Some(name) = &handler.name {
                    self.bind(name, exception.clone());
                }
                self.handling.push(exception);
                let result = self.block(&handler.body);
                self.handling.pop();
                return result;
            }
        }
        Err(RuntimeError::Exception { kind, message })
    }

    fn catches(class: &Value, kind: &str) -> RuntimeResult<bool> {
        match class {
            Value::ExceptionType(handler) => Ok(exception_matches(kind, handler)),
            Value::Tuple(classes) => {
                for class in classes.iter() {
                    if Self::catches(class, kind)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => type_error("catching classes that do not inherit from BaseException is not allowed"),
        }
    }

    fn defaults(&mut self, params: &[Param]) -> RuntimeResult<Vec<(String, Option<Value>)>> {
        params
            .iter()
            .map(|param| {
                let default = match &param.default {
                    Some(expr) => Some(self.eval(expr)?),
                    None => None,
                };
                Ok((param.name.clone(), default))
            })
            .collect()
    }

    fn assign(&mut self, target: &Expr, value: Value) -> RuntimeResult<()> {
        match &target.kind {
            ExprKind::Name(name) => {
                self.bind(name, value);
                Ok(())
            }
            ExprKind::Tuple(targets) | ExprKind::List(targets) => {
                let values = iterate(&value)?;
                match values.len().cmp(&targets.len()) {
                    Ordering::Less => return raise("ValueError", "not enough values to unpack"),
                    Ordering::Greater => return raise("ValueError", "too many values to unpack"),
                    Ordering::Equal => {}
                }
                for (target, value) in targets.iter().zip(values) {
                    self.assign(target, value)?;
                }
                Ok(())
            }
            ExprKind::Subscript { value: container, index } => {
                let container = self.eval(container)?;
                let index = self.eval(index)?;
                Self::store_item(&container, index, value)
            }
            ExprKind::Attribute { .. } => {
                Err(RuntimeError::unsupported(target.line, "attribute assignment"))
            }
            _ => raise("SyntaxError", "cannot assign to expression"),
        }
    }

    fn aug_assign(&mut self, target: &Expr, op: BinOperator, value: &Expr) -> RuntimeResult<()> {
        match &target.kind {
            ExprKind::Name(name) => {
                let current = self.lookup(name)?;
                let rhs = self.eval(value)?;
                let result = binop(op, &current, &rhs)?;
                self.bind(name, result);
                Ok(())
            }
            ExprKind::Subscript {
                value: container,
                index,
            } => {
                let container = self.eval(container)?;
                let index = self.eval(index)?;
                let current = subscript(&container, &index)?;
                let rhs = self.eval(value)?;
                let result = binop(op, &current, &rhs)?;
                Self::store_item(&container, index, result)
            }
            _ => Err(RuntimeError::unsupported(target.line, "augmented assignment target")),
        }
    }

    fn delete(&mut self, target: &Expr) -> RuntimeResult<()> {
        match &target.kind {
            ExprKind::Name(name) => self.unbind(name),
            ExprKind::Subscript { value, index } => {
                let container = self.eval(value)?;
                let index = self.eval(index)?;
                match &container {
                    Value::List(items) => {
                        let mut items = items.borrow_mut();
                        let position = position(items.len(), &index, "list")?;
                        items.remove(position);
                        Ok(())
                    }
                    Value::Dict(entries) => {
                        let mut entries = entries.borrow_mut();
                        match entries.iter().position(|(key, _)| key.py_eq(&index)) {
                            Some(position) => {
                                entries.remove(position);
                                Ok(())
                            }
                            None => raise("KeyError", index.repr()),
                        }
                    }
                    other => type_error(format!(
                        "'{}' object doesn't support item deletion",
                        other.type_name()
                    )),
                }
            }
            _ => Err(RuntimeError::unsupported(target.line, "deletion target")),
        }
    }

    fn store_item(container: &Value, index: Value, value: Value) -> RuntimeResult<()> {
        match container {
            Value::List(items) => {
                let mut items = items.borrow_mut();
                let position = position(items.len(), &index, "list assignment")?;
                items[position] = value;
                Ok(())
            }
            Value::Dict(entries) => {
                dict_insert(&mut entries.borrow_mut(), index, value);
                Ok(())
            }
            other => type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            )),
        }
    }

    // ---- expressions ----

    fn eval(&mut self, expr: &Expr) -> RuntimeResult<Value> {
        match &expr.kind {
            ExprKind::Name(name) => self.lookup(name),
            ExprKind::Constant(constant) => Ok(match constant {
                Constant::None => Value::None,
                Constant::Bool(b) => Value::Bool(*b),
                Constant::Int(i) => Value::Int(*i),
                Constant::Float(x) => Value::Float(*x),
                Constant::Str(s) => Value::str(s),
            }),
            ExprKind::BoolOp { op, values } => {
                let mut last = Value::None;
                for value in values {
                    last = self.eval(value)?;
                    let decided = match op {
                        BoolOperator::And => !last.is_truthy(),
                        BoolOperator::Or => last.is_truthy(),
                    };
                    if decided {
                        break;
                    }
                }
                Ok(last)
            }
            ExprKind::UnaryOp { op, operand } => {
                let operand = self.eval(operand)?;
                unary(*op, &operand)
            }
            ExprKind::BinOp { left, op, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binop(*op, &left, &right)
            }
            ExprKind::Compare {
                left,
                ops,
                comparators,
            } => {
                let mut lhs = self.eval(left)?;
                for (op, comparator) in ops.iter().zip(comparators) {
                    let rhs = self.eval(comparator)?;
                    if !compare(*op, &lhs, &rhs)? {
                        return Ok(Value::Bool(false));
                    }
                    lhs = rhs;
                }
                Ok(Value::Bool(true))
            }
            ExprKind::IfExp { test, body, orelse } => {
                if self.eval(test)?.is_truthy() {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            ExprKind::Call {
                func,
                args,
                keywords,
            } => self.call_expr(func, args, keywords),
            ExprKind::Attribute { value, attr } => {
                let value = self.eval(value)?;
                raise(
                    "AttributeError",
                    format!("'{}' object has no attribute '{attr}'", value.type_name()),
                )
            }
            ExprKind::Subscript { value, index } => {
                let value = self.eval(value)?;
                let index = self.eval(index)?;
                subscript(&value, &index)
            }
            ExprKind::List(items) => Ok(Value::list(self.eval_all(items)?)),
            ExprKind::Tuple(items) => Ok(Value::tuple(self.eval_all(items)?)),
            ExprKind::Dict(entries) => {
                let mut dict = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.eval(key)?;
                    let value = self.eval(value)?;
                    dict_insert(&mut dict, key, value);
                }
                Ok(Value::dict(dict))
            }
            ExprKind::Lambda { params, body } => {
                let function = Function {
                    name: "<lambda>".to_string(),
                    params: self.defaults(params)?,
                    body: FunctionBody::Lambda((**body).clone()),
                };
                Ok(Value::Function(Rc::new(function)))
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> RuntimeResult<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn call_expr(&mut self, func: &Expr, args: &[Expr], keywords: &[Keyword]) -> RuntimeResult<Value> {
        if let ExprKind::Attribute { value, attr } = &func.kind {
            if matches!(&value.kind, ExprKind::Name(name) if name == RECORDER_BINDING) {
                return self.recorder_call(attr, args);
            }
            let receiver = self.eval(value)?;
            let args = self.eval_all(args)?;
            if !keywords.is_empty() {
                return type_error(format!("{attr}() takes no keyword arguments"));
            }
            return self.call_method(&receiver, attr, args);
        }

        let callee = self.eval(func)?;
        let args = self.eval_all(args)?;
        let mut named = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            named.push((keyword.name.clone(), self.eval(&keyword.value)?));
        }
        self.call_value(&callee, args, named)
    }

    fn string_arg(&mut self, arg: Option<&Expr>, what: &str) -> RuntimeResult<String> {
        match arg {
            Some(expr) => match self.eval(expr)? {
                Value::Str(s) => Ok(s.to_string()),
                other => type_error(format!("{what} must be a string, not {}", other.type_name())),
            },
            None => type_error(format!("missing {what}")),
        }
    }

    fn int_arg(&mut self, expr: &Expr, what: &str) -> RuntimeResult<i64> {
        match self.eval(expr)?.as_int() {
            Some(i) => Ok(i),
            None => type_error(format!("{what} must be an integer")),
        }
    }

    fn recorder_call(&mut self, method: &str, args: &[Expr]) -> RuntimeResult<Value> {
        match method {
            RECORD_METHOD => {
                let Some((value, rest)) = args.split_first() else {
                    return type_error("record() missing the recorded value");
                };
                let value = self.eval(value)?;
                let modulename = self.string_arg(rest.first(), "module name")?;
                let label: Label = self.string_arg(rest.get(1), "label")?.parse()?;
                match rest.get(2) {
                    Some(pin) => {
                        let pin = self.int_arg(pin, "pin")?;
                        let pin = usize::try_from(pin).unwrap_or(usize::MAX);
                        Ok(self.recorder.record_pin(value, &modulename, label, pin)?)
                    }
                    None => Ok(self.recorder.record_decision(value, &modulename, label)?),
                }
            }
            RECORD_STATEMENT_METHOD => {
                let modulename = self.string_arg(args.first(), "module name")?;
                let Some(line) = args.get(1) else {
                    return type_error("record_statement() missing the line");
                };
                let line = self.int_arg(line, "line")?;
                let line = u32::try_from(line).unwrap_or(0);
                self.recorder.record_statement(&modulename, line);
                Ok(Value::None)
            }
            other => raise(
                "AttributeError",
                format!("recorder has no attribute '{other}'"),
            ),
        }
    }

    fn call_method(&mut self, receiver: &Value, method: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        match (receiver, method) {
            (Value::List(items), "append") => {
                let [item] = take_args::<1>(method, args)?;
                items.borrow_mut().push(item);
                Ok(Value::None)
            }
            (Value::List(items), "pop") => {
                let mut items = items.borrow_mut();
                if items.is_empty() {
                    return raise("IndexError", "pop from empty list");
                }
                let position = match args.first() {
                    Some(index) => position(items.len(), index, "pop")?,
                    None => items.len() - 1,
                };
                Ok(items.remove(position))
            }
            (Value::Dict(entries), "get") => {
                if args.is_empty() || args.len() > 2 {
                    return type_error("get expected 1 or 2 arguments");
                }
                let mut args = args.into_iter();
                let key = args.next().unwrap_or(Value::None);
                let default = args.next().unwrap_or(Value::None);
                Ok(entries
                    .borrow()
                    .iter()
                    .find(|(k, _)| k.py_eq(&key))
                    .map_or(default, |(_, v)| v.clone()))
            }
            (Value::Dict(entries), "keys") => {
                Ok(Value::list(entries.borrow().iter().map(|(k, _)| k.clone()).collect()))
            }
            (Value::Dict(entries), "values") => {
                Ok(Value::list(entries.borrow().iter().map(|(_, v)| v.clone()).collect()))
            }
            (Value::Dict(entries), "items") => Ok(Value::list(
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                    .collect(),
            )),
            (Value::Str(s), "upper") => Ok(Value::str(&s.to_uppercase())),
            (Value::Str(s), "lower") => Ok(Value::str(&s.to_lowercase())),
            (Value::Str(s), "strip") => Ok(Value::str(s.trim())),
            (other, _) => raise(
                "AttributeError",
                format!("'{}' object has no attribute '{method}'", other.type_name()),
            ),
        }
    }

    fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> RuntimeResult<Value> {
        match callee {
            Value::Function(function) => self.call_function(function, args, named),
            Value::Builtin(builtin) => {
                if !named.is_empty() {
                    return type_error(format!("{}() takes no keyword arguments", builtin.name()));
                }
                self.builtin(*builtin, args)
            }
            Value::ExceptionType(kind) => {
                let message = args.first().map(ToString::to_string).unwrap_or_default();
                Ok(Value::exception(kind, &message))
            }
            other => type_error(format!("'{}' object is not callable", other.type_name())),
        }
    }

    fn call_function(
        &mut self,
        function: &Rc<Function>,
        args: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> RuntimeResult<Value> {
        if self.frames.len() >= MAX_DEPTH {
            return raise("RecursionError", "maximum recursion depth exceeded");
        }
        let name = &function.name;
        let params = &function.params;
        if args.len() > params.len() {
            return type_error(format!(
                "{name}() takes {} positional arguments but {} were given",
                params.len(),
                args.len()
            ));
        }

        let mut slots: Vec<Option<Value>> = args.into_iter().map(Some).collect();
        slots.resize(params.len(), None);
        for (keyword, value) in named {
            let Some(position) = params.iter().position(|(param, _)| *param == keyword) else {
                return type_error(format!("{name}() got an unexpected keyword argument '{keyword}'"));
            };
            if slots[position].is_some() {
                return type_error(format!("{name}() got multiple values for argument '{keyword}'"));
            }
            slots[position] = Some(value);
        }

        let mut frame = Frame::default();
        for ((param, default), slot) in params.iter().zip(slots) {
            let Some(value) = slot.or_else(|| default.clone()) else {
                return type_error(format!("{name}() missing required argument '{param}'"));
            };
            frame.locals.insert(param.clone(), value);
        }

        self.frames.push(frame);
        let result = match &function.body {
            FunctionBody::Block(body) => self.block(body).map(|flow| match flow {
                Flow::Return(value) => value,
                Flow::Normal | Flow::Break | Flow::Continue => Value::None,
            }),
            FunctionBody::Lambda(body) => self.eval(body),
        };
        self.frames.pop();
        result
    }

    fn builtin(&mut self, builtin: Builtin, args: Vec<Value>) -> RuntimeResult<Value> {
        match builtin {
            Builtin::Print => {
                let line = args
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                self.output.push(line);
                Ok(Value::None)
            }
            Builtin::Len => {
                let [value] = take_args::<1>("len", args)?;
                let len = match &value {
                    Value::Str(s) => s.chars().count(),
                    Value::List(items) => items.borrow().len(),
                    Value::Tuple(items) => items.len(),
                    Value::Dict(entries) => entries.borrow().len(),
                    other => {
                        return type_error(format!(
                            "object of type '{}' has no len()",
                            other.type_name()
                        ))
                    }
                };
                Ok(Value::Int(len as i64))
            }
            Builtin::Range => range(&args),
            Builtin::Bool => match args.as_slice() {
                [] => Ok(Value::Bool(false)),
                [value] => Ok(Value::Bool(value.is_truthy())),
                _ => type_error("bool() takes at most 1 argument"),
            },
            Builtin::Int => match args.as_slice() {
                [] => Ok(Value::Int(0)),
                [Value::Float(x)] => {
                    if x.is_finite() && x.abs() < 9.2e18 {
                        Ok(Value::Int(x.trunc() as i64))
                    } else {
                        raise("OverflowError", "cannot convert float to integer")
                    }
                }
                [Value::Str(s)] => match s.trim().replace('_', "").parse::<i64>() {
                    Ok(i) => Ok(Value::Int(i)),
                    Err(_) => raise(
                        "ValueError",
                        format!("invalid literal for int() with base 10: {}", Value::Str(s.clone()).repr()),
                    ),
                },
                [value] => match value.as_int() {
                    Some(i) => Ok(Value::Int(i)),
                    None => type_error(format!(
                        "int() argument must be a string or a number, not '{}'",
                        value.type_name()
                    )),
                },
                _ => type_error("int() takes at most 1 argument"),
            },
            Builtin::Str => match args.as_slice() {
                [] => Ok(Value::str("")),
                [value] => Ok(Value::str(&value.to_string())),
                _ => type_error("str() takes at most 1 argument"),
            },
            Builtin::Abs => {
                let [value] = take_args::<1>("abs", args)?;
                match value {
                    Value::Float(x) => Ok(Value::Float(x.abs())),
                    other => match other.as_int() {
                        Some(i) => i
                            .checked_abs()
                            .map(Value::Int)
                            .map_or_else(|| raise("OverflowError", "integer overflow"), Ok),
                        None => type_error(format!(
                            "bad operand type for abs(): '{}'",
                            other.type_name()
                        )),
                    },
                }
            }
        }
    }
}

fn take_args<const N: usize>(name: &str, args: Vec<Value>) -> RuntimeResult<[Value; N]> {
    let given = args.len();
    args.try_into().or_else(|_| {
        type_error(format!("{name}() takes exactly {N} argument(s) ({given} given)"))
    })
}

fn iterate(value: &Value) -> RuntimeResult<Vec<Value>> {
    match value.iter_values() {
        Some(items) => Ok(items),
        None => type_error(format!("'{}' object is not iterable", value.type_name())),
    }
}

fn dict_insert(entries: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    match entries.iter_mut().find(|(k, _)| k.py_eq(&key)) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
}

fn position(len: usize, index: &Value, what: &str) -> RuntimeResult<usize> {
    let Some(index) = index.as_int() else {
        return type_error(format!("{what} indices must be integers, not {}", index.type_name()));
    };
    let len = len as i64;
    let resolved = if index < 0 { index + len } else { index };
    if (0..len).contains(&resolved) {
        Ok(resolved as usize)
    } else {
        raise("IndexError", format!("{what} index out of range"))
    }
}

fn subscript(container: &Value, index: &Value) -> RuntimeResult<Value> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            Ok(items[position(items.len(), index, "list")?].clone())
        }
        Value::Tuple(items) => Ok(items[position(items.len(), index, "tuple")?].clone()),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let c = chars[position(chars.len(), index, "string")?];
            Ok(Value::str(&c.to_string()))
        }
        Value::Dict(entries) => match entries.borrow().iter().find(|(k, _)| k.py_eq(index)) {
            Some((_, value)) => Ok(value.clone()),
            None => raise("KeyError", index.repr()),
        },
        other => type_error(format!("'{}' object is not subscriptable", other.type_name())),
    }
}

fn range(args: &[Value]) -> RuntimeResult<Value> {
    let ints: Option<Vec<i64>> = args.iter().map(Value::as_int).collect();
    let Some(ints) = ints else {
        return type_error("range() arguments must be integers");
    };
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return type_error("range expected 1 to 3 arguments"),
    };
    if step == 0 {
        return raise("ValueError", "range() arg 3 must not be zero");
    }
    let mut items = Vec::new();
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
        items.push(Value::Int(current));
        match current.checked_add(step) {
            Some(next) => current = next,
            None => break,
        }
    }
    Ok(Value::list(items))
}

fn unary(op: UnaryOperator, operand: &Value) -> RuntimeResult<Value> {
    match (op, operand) {
        (UnaryOperator::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOperator::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOperator::Pos, Value::Float(x)) => Ok(Value::Float(*x)),
        (op, value) => match (op, value.as_int()) {
            (UnaryOperator::Neg, Some(i)) => i
                .checked_neg()
                .map(Value::Int)
                .map_or_else(|| raise("OverflowError", "integer overflow"), Ok),
            (UnaryOperator::Pos, Some(i)) => Ok(Value::Int(i)),
            _ => {
                let symbol = if op == UnaryOperator::Neg { "-" } else { "+" };
                type_error(format!(
                    "bad operand type for unary {symbol}: '{}'",
                    value.type_name()
                ))
            }
        },
    }
}

fn repeat(items: &[Value], times: i64) -> Vec<Value> {
    let times = usize::try_from(times).unwrap_or(0);
    let mut out = Vec::with_capacity(items.len() * times);
    for _ in 0..times {
        out.extend(items.iter().cloned());
    }
    out
}

fn binop(op: BinOperator, left: &Value, right: &Value) -> RuntimeResult<Value> {
    match (op, left, right) {
        (BinOperator::Add, Value::Str(a), Value::Str(b)) => Ok(Value::str(&format!("{a}{b}"))),
        (BinOperator::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (BinOperator::Add, Value::Tuple(a), Value::Tuple(b)) => {
            Ok(Value::tuple(a.iter().chain(b.iter()).cloned().collect()))
        }
        (BinOperator::Mul, Value::Str(s), n) | (BinOperator::Mul, n, Value::Str(s))
            if n.as_int().is_some() =>
        {
            let times = usize::try_from(n.as_int().unwrap_or(0)).unwrap_or(0);
            Ok(Value::str(&s.repeat(times)))
        }
        (BinOperator::Mul, Value::List(items), n) | (BinOperator::Mul, n, Value::List(items))
            if n.as_int().is_some() =>
        {
            Ok(Value::list(repeat(&items.borrow(), n.as_int().unwrap_or(0))))
        }
        _ => arithmetic(op, left, right),
    }
}

fn arithmetic(op: BinOperator, left: &Value, right: &Value) -> RuntimeResult<Value> {
    let is_float = matches!(left, Value::Float(_)) || matches!(right, Value::Float(_));
    if !is_float {
        if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
            return int_arithmetic(op, a, b);
        }
    }
    match (left.as_float(), right.as_float()) {
        (Some(a), Some(b)) => float_arithmetic(op, a, b),
        _ => type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        )),
    }
}

fn overflow<T>() -> RuntimeResult<T> {
    raise("OverflowError", "integer overflow")
}

fn int_arithmetic(op: BinOperator, a: i64, b: i64) -> RuntimeResult<Value> {
    let checked = |result: Option<i64>| match result {
        Some(i) => Ok(Value::Int(i)),
        None => overflow(),
    };
    match op {
        BinOperator::Add => checked(a.checked_add(b)),
        BinOperator::Sub => checked(a.checked_sub(b)),
        BinOperator::Mul => checked(a.checked_mul(b)),
        BinOperator::Div => {
            if b == 0 {
                raise("ZeroDivisionError", "division by zero")
            } else {
                Ok(Value::Float(a as f64 / b as f64))
            }
        }
        BinOperator::FloorDiv | BinOperator::Mod if b == 0 => {
            raise("ZeroDivisionError", "integer division or modulo by zero")
        }
        BinOperator::FloorDiv => {
            let Some(quotient) = a.checked_div(b) else {
                return overflow();
            };
            let adjust = a % b != 0 && ((a < 0) != (b < 0));
            Ok(Value::Int(if adjust { quotient - 1 } else { quotient }))
        }
        BinOperator::Mod => {
            let remainder = a.checked_rem(b).unwrap_or(0);
            let adjust = remainder != 0 && ((remainder < 0) != (b < 0));
            Ok(Value::Int(if adjust { remainder + b } else { remainder }))
        }
        BinOperator::Pow => match u32::try_from(b) {
            Ok(exponent) => checked(a.checked_pow(exponent)),
            Err(_) if b < 0 => Ok(Value::Float((a as f64).powf(b as f64))),
            Err(_) => overflow(),
        },
    }
}

fn float_arithmetic(op: BinOperator, a: f64, b: f64) -> RuntimeResult<Value> {
    let divides = matches!(op, BinOperator::Div | BinOperator::FloorDiv | BinOperator::Mod);
    if divides && b == 0.0 {
        return raise("ZeroDivisionError", "float division by zero");
    }
    Ok(Value::Float(match op {
        BinOperator::Add => a + b,
        BinOperator::Sub => a - b,
        BinOperator::Mul => a * b,
        BinOperator::Div => a / b,
        BinOperator::FloorDiv => (a / b).floor(),
        BinOperator::Mod => a - b * (a / b).floor(),
        BinOperator::Pow => a.powf(b),
    }))
}

fn ordering(left: &Value, right: &Value) -> RuntimeResult<Option<Ordering>> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::List(a), Value::List(b)) => sequence_ordering(&a.borrow(), &b.borrow()),
        (Value::Tuple(a), Value::Tuple(b)) => sequence_ordering(a, b),
        _ => {
            let is_float = matches!(left, Value::Float(_)) || matches!(right, Value::Float(_));
            if !is_float {
                if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
                    return Ok(Some(a.cmp(&b)));
                }
            }
            match (left.as_float(), right.as_float()) {
                (Some(a), Some(b)) => Ok(a.partial_cmp(&b)),
                _ => type_error(format!(
                    "comparison not supported between instances of '{}' and '{}'",
                    left.type_name(),
                    right.type_name()
                )),
            }
        }
    }
}

fn sequence_ordering(a: &[Value], b: &[Value]) -> RuntimeResult<Option<Ordering>> {
    for (x, y) in a.iter().zip(b) {
        if !x.py_eq(y) {
            return ordering(x, y);
        }
    }
    Ok(Some(a.len().cmp(&b.len())))
}

fn contains(container: &Value, item: &Value) -> RuntimeResult<bool> {
    match (container, item) {
        (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_ref())),
        (Value::Str(_), other) => type_error(format!(
            "'in <string>' requires string as left operand, not {}",
            other.type_name()
        )),
        (Value::List(items), _) => Ok(items.borrow().iter().any(|v| v.py_eq(item))),
        (Value::Tuple(items), _) => Ok(items.iter().any(|v| v.py_eq(item))),
        (Value::Dict(entries), _) => Ok(entries.borrow().iter().any(|(k, _)| k.py_eq(item))),
        (other, _) => type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        )),
    }
}

fn compare(op: CmpOperator, left: &Value, right: &Value) -> RuntimeResult<bool> {
    Ok(match op {
        CmpOperator::Eq => left.py_eq(right),
        CmpOperator::NotEq => !left.py_eq(right),
        CmpOperator::In => contains(right, left)?,
        CmpOperator::NotIn => !contains(right, left)?,
        CmpOperator::Is => left.is_same(right),
        CmpOperator::IsNot => !left.is_same(right),
        CmpOperator::Lt => ordering(left, right)? == Some(Ordering::Less),
        CmpOperator::LtE => matches!(ordering(left, right)?, Some(Ordering::Less | Ordering::Equal)),
        CmpOperator::Gt => ordering(left, right)? == Some(Ordering::Greater),
        CmpOperator::GtE => matches!(
            ordering(left, right)?,
            Some(Ordering::Greater | Ordering::Equal)
        ),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::GatherConfig;
    use crate::instrument::CoverageAnnotator;
    use crate::metadata::gather_source;
    use crate::pragma::PragmaFinder;
    use crate::syntax::parse;

    fn run(source: &str) -> (ExecutionRecorder, Vec<String>) {
        let mut recorder = ExecutionRecorder::new();
        let module = parse(source).unwrap();
        let output = {
            let mut interp = Interpreter::new(&mut recorder);
            interp.run(&module).unwrap();
            interp.take_output()
        };
        (recorder, output)
    }

    fn output(source: &str) -> Vec<String> {
        run(source).1
    }

    fn error(source: &str) -> RuntimeError {
        let mut recorder = ExecutionRecorder::new();
        let module = parse(source).unwrap();
        Interpreter::new(&mut recorder).run(&module).unwrap_err()
    }

    #[test]
    fn test_arithmetic_and_printing() {
        let out = output("print(1 + 2 * 3, 7 // -2, -7 % 3, 2 ** 10, 1 / 4)\n");
        assert_eq!(out, vec!["7 -4 2 1024 0.25"]);
    }

    #[test]
    fn test_bool_ops_return_deciding_operand() {
        let out = output("print(0 or 'x', 1 and [], None or 0, 3 and 4)\n");
        assert_eq!(out, vec!["x [] 0 4"]);
    }

    #[test]
    fn test_functions_defaults_and_keywords() {
        let source = "\
def f(a, b=10):
    return a - b
print(f(1), f(1, 2), f(b=1, a=5))
g = lambda x: x * 2
print(g(21))
";
        assert_eq!(output(source), vec!["-9 -1 4", "42"]);
    }

    #[test]
    fn test_loops_with_else_and_break() {
        let source = "\
total = 0
for i in range(10):
    if i == 5:
        break
    total += i
else:
    total = -1
n = 0
while n < 3:
    n += 1
else:
    print('done', n)
print(total)
";
        assert_eq!(output(source), vec!["done 3", "10"]);
    }

    #[test]
    fn test_try_except_finally() {
        let source = "\
def risky(x):
    try:
        r = 10 // x
    except ZeroDivisionError as e:
        print('caught', e)
        r = 0
    else:
        print('fine')
    finally:
        print('finally')
    return r
print(risky(0), risky(5))
";
        assert_eq!(
            output(source),
            vec!["caught integer division or modulo by zero", "finally", "fine", "finally", "0 2"]
        );
    }

    #[test]
    fn test_uncaught_exception_surfaces() {
        let err = error("raise ValueError('bad')\n");
        assert!(err.is_exception("ValueError"));
        assert_eq!(err.to_string(), "ValueError: bad");
        assert!(error("assert 1 == 2, 'nope'\n").is_exception("AssertionError"));
        assert!(error("x = y\n").is_exception("NameError"));
    }

    #[test]
    fn test_containers() {
        let source = "\
xs = [3, 1]
xs.append(2)
xs[0] = 5
d = {'a': 1}
d['b'] = 2
a, b = xs[1], d.get('c', 9)
print(xs, len(d), a, b, 'a' in d, 2 in xs, xs[-1])
";
        assert_eq!(output(source), vec!["[5, 1, 2] 2 1 9 True True 2"]);
    }

    #[test]
    fn test_globals_and_recursion() {
        let source = "\
count = 0
def bump():
    global count
    count += 1
def fact(n):
    return 1 if n <= 1 else n * fact(n - 1)
bump()
bump()
print(count, fact(10))
";
        assert_eq!(output(source), vec!["2 3628800"]);
        assert!(error("def f():\n    return f()\nf()\n").is_exception("RecursionError"));
    }

    #[test]
    fn test_unsupported_statements() {
        assert!(matches!(error("import os\n"), RuntimeError::Unsupported { line: 1, .. }));
        assert!(matches!(error("class A:\n    pass\n"), RuntimeError::Unsupported { .. }));
        assert!(matches!(error("with a:\n    pass\n"), RuntimeError::Unsupported { .. }));
        assert!(output("from __future__ import division\nprint(1)\n") == vec!["1"]);
    }

    fn instrumented(source: &str) -> (Module, ExecutionRecorder) {
        let module = parse(source).unwrap();
        let pragmas = PragmaFinder::new().unwrap().find_in(source, &module);
        let metadata = gather_source(GatherConfig::default(), "m", source).unwrap();
        let mut recorder = ExecutionRecorder::new();
        recorder.add_metadata(&metadata);
        recorder.start();
        let out = CoverageAnnotator::instrument("m", &module, &metadata, &pragmas).unwrap();
        (out, recorder)
    }

    #[test]
    fn test_instrumented_run_preserves_results() {
        let source = "\
def pick(a, b):
    return a and b
print(pick(0, 1), pick(2, 3), 'y' if pick(1, 0) else 'n')
";
        let plain = output(source);
        let (module, mut recorder) = instrumented(source);
        let mut interp = Interpreter::new(&mut recorder);
        interp.run(&module).unwrap();
        assert_eq!(interp.output(), plain.as_slice());
    }

    #[test]
    fn test_short_circuit_skips_later_taps() {
        let (module, mut recorder) = instrumented("a = False\nb = True\nx = a and b\n");
        Interpreter::new(&mut recorder).run(&module).unwrap();
        let construct = recorder.construct("m", Label::new(3, 1)).unwrap();
        let outcomes = construct.outcomes();
        assert_eq!(outcomes[1].1.len(), 1);
        assert_eq!(construct.number_of_conditions_hit(), 1);
        assert_eq!(recorder.statements("m").unwrap().get(&3), Some(&true));
    }

    #[test]
    fn test_bad_tap_is_instrumentation_error() {
        let mut recorder = ExecutionRecorder::new();
        recorder.start();
        let module = parse("_xxx_recorder_xxx_.record(1, 'm', '9.1')\n").unwrap();
        let err = Interpreter::new(&mut recorder).run(&module).unwrap_err();
        assert!(matches!(err, RuntimeError::Instrumentation(_)));
    }
}
