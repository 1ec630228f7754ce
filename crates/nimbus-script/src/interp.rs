//! Tree-walking evaluator.
//!
//! One [`Interpreter`] is created per execution (a module body run or an
//! invocation). It owns the step and call-depth budget of that execution and
//! the [`Heap`] keeping closure environments alive until it is dropped.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ast::{BinOp, Export, Expr, ExprKind, FnDef, LogicalOp, Program, Stmt, StmtKind, UnaryOp};
use crate::builtins;
use crate::env::{Heap, Scope};
use crate::error::{ScriptError, ScriptResult};
use crate::value::{Closure, Value};

/// Default maximum call depth.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 128;

/// Resource budget of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum evaluation steps, `None` for unlimited.
    pub max_steps: Option<u64>,
    /// Maximum nesting of function calls.
    pub max_call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// Statement completion.
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Interpreter {
    limits: Limits,
    steps: u64,
    depth: usize,
    heap: Arc<Heap>,
}

impl Interpreter {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            steps: 0,
            depth: 0,
            heap: Heap::new(),
        }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Steps consumed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// The heap owning closures created by this execution.
    pub fn heap(&self) -> &Arc<Heap> {
        &self.heap
    }

    /// Run a module body in `scope` and return its export record.
    ///
    /// Exported bindings are read back after the body completes, so later
    /// top-level reassignments are visible in the record.
    pub fn run_module(&mut self, program: &Program, scope: &Arc<Scope>) -> ScriptResult<Value> {
        self.hoist(&program.body, scope);
        let mut exports = BTreeMap::new();
        let mut bindings = Vec::new();
        for stmt in &program.body {
            match &stmt.kind {
                StmtKind::Export(Export::Default(expr)) => {
                    self.tick()?;
                    let value = self.eval(expr, scope)?;
                    exports.insert("default".to_string(), value);
                }
                StmtKind::Export(Export::Binding { name, value }) => {
                    self.tick()?;
                    let value = self.eval(value, scope)?;
                    scope.define(name.as_str(), value);
                    bindings.push(name.as_str());
                }
                StmtKind::Export(Export::Function(def)) => {
                    bindings.extend(def.name.as_deref());
                }
                _ => {
                    self.exec_stmt(stmt, scope)?;
                }
            }
        }
        for name in bindings {
            exports.insert(name.to_string(), scope.get(name).unwrap_or_default());
        }
        Ok(Value::Object(Arc::new(exports)))
    }

    /// Call a function value with `args`.
    pub fn call(&mut self, callee: &Value, args: Vec<Value>) -> ScriptResult<Value> {
        self.tick()?;
        if self.depth >= self.limits.max_call_depth {
            return Err(ScriptError::CallDepth(self.limits.max_call_depth));
        }
        self.depth += 1;
        let result = match callee {
            Value::Function(closure) => self.call_closure(closure, args),
            Value::Native(native) => (native.func)(self, args),
            other => Err(ScriptError::Type(format!(
                "value of type {} is not a function",
                other.type_name()
            ))),
        };
        self.depth -= 1;
        result
    }

    fn call_closure(&mut self, closure: &Arc<Closure>, args: Vec<Value>) -> ScriptResult<Value> {
        let parent = closure.scope.upgrade().ok_or_else(|| {
            ScriptError::Type("function environment has been released".to_string())
        })?;
        let scope = Scope::child(&parent);
        let def = &closure.def;
        if let Some(name) = &def.name {
            if !def.params.contains(name) {
                scope.define(name.as_str(), Value::Function(Arc::clone(closure)));
            }
        }
        let mut args = args.into_iter();
        for param in &def.params {
            scope.define(param.as_str(), args.next().unwrap_or_default());
        }
        match self.exec_block(&def.body, &scope)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Null),
        }
    }

    fn tick(&mut self) -> ScriptResult<()> {
        self.steps += 1;
        match self.limits.max_steps {
            Some(max) if self.steps > max => Err(ScriptError::StepLimit(max)),
            _ => Ok(()),
        }
    }

    fn make_closure(&mut self, def: &Arc<FnDef>, scope: &Arc<Scope>) -> Value {
        self.heap.retain(scope);
        Value::Function(Arc::new(Closure {
            def: Arc::clone(def),
            scope: Arc::downgrade(scope),
        }))
    }

    /// Bind function declarations before the block runs.
    fn hoist(&mut self, stmts: &[Stmt], scope: &Arc<Scope>) {
        for stmt in stmts {
            let def = match &stmt.kind {
                StmtKind::Function(def) | StmtKind::Export(Export::Function(def)) => def,
                _ => continue,
            };
            if let Some(name) = &def.name {
                let closure = self.make_closure(def, scope);
                scope.define(name.as_str(), closure);
            }
        }
    }

    fn exec_block(&mut self, stmts: &[Stmt], scope: &Arc<Scope>) -> ScriptResult<Flow> {
        self.hoist(stmts, scope);
        for stmt in stmts {
            match self.exec_stmt(stmt, scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &Arc<Scope>) -> ScriptResult<Flow> {
        self.tick()?;
        match &stmt.kind {
            StmtKind::Let { name, value } => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Null,
                };
                scope.define(name.as_str(), value);
            }
            StmtKind::Assign { target, value } => {
                let value = self.eval(value, scope)?;
                self.assign(target, value, scope)?;
            }
            StmtKind::Expr(expr) => {
                self.eval(expr, scope)?;
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond, scope)?.is_truthy() {
                    return self.exec_block(then, &Scope::child(scope));
                } else if let Some(otherwise) = otherwise {
                    return self.exec_block(otherwise, &Scope::child(scope));
                }
            }
            StmtKind::While { cond, body } => loop {
                self.tick()?;
                if !self.eval(cond, scope)?.is_truthy() {
                    break;
                }
                match self.exec_block(body, &Scope::child(scope))? {
                    Flow::Break => break,
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                    Flow::Normal | Flow::Continue => {}
                }
            },
            StmtKind::ForOf {
                binding,
                iterable,
                body,
            } => {
                let items = builtins::iterate(&self.eval(iterable, scope)?)?;
                for item in items {
                    self.tick()?;
                    let iteration = Scope::child(scope);
                    iteration.define(binding.as_str(), item);
                    match self.exec_block(body, &iteration)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Throw(expr) => {
                return Err(ScriptError::Thrown(self.eval(expr, scope)?));
            }
            StmtKind::Try {
                body,
                binding,
                handler,
            } => {
                return match self.exec_block(body, &Scope::child(scope)) {
                    Err(err) if err.is_catchable() => {
                        let catch_scope = Scope::child(scope);
                        if let Some(binding) = binding {
                            catch_scope.define(binding.as_str(), err.into_value());
                        }
                        self.exec_block(handler, &catch_scope)
                    }
                    other => other,
                };
            }
            StmtKind::Block(stmts) => return self.exec_block(stmts, &Scope::child(scope)),
            StmtKind::Function(_) | StmtKind::Export(_) => {}
        }
        Ok(Flow::Normal)
    }

    fn eval(&mut self, expr: &Expr, scope: &Arc<Scope>) -> ScriptResult<Value> {
        match &expr.kind {
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::Str(s) => Ok(Value::from(s.as_str())),
            ExprKind::Array(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval(item, scope))
                    .collect::<ScriptResult<Vec<_>>>()?;
                Ok(Value::from(items))
            }
            ExprKind::Object(fields) => {
                let mut map = BTreeMap::new();
                for (key, value) in fields {
                    map.insert(key.clone(), self.eval(value, scope)?);
                }
                Ok(Value::Object(Arc::new(map)))
            }
            ExprKind::Ident(name) => scope
                .get(name)
                .ok_or_else(|| ScriptError::Reference(name.clone())),
            ExprKind::Function(def) => Ok(self.make_closure(def, scope)),
            ExprKind::Member { object, property } => {
                let object = self.eval(object, scope)?;
                object.property(&Value::from(property.as_str()))
            }
            ExprKind::Index { object, index } => {
                let object = self.eval(object, scope)?;
                let index = self.eval(index, scope)?;
                object.property(&index)
            }
            ExprKind::Call { callee, args } => self.eval_call(callee, args, scope),
            ExprKind::Unary { op, operand } => {
                if let (UnaryOp::Typeof, ExprKind::Ident(name)) = (op, &operand.kind) {
                    let ty = scope.get(name).map_or("undefined", |v| v.type_name());
                    return Ok(Value::from(ty));
                }
                let value = self.eval(operand, scope)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Neg => match value {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        other => Err(ScriptError::Type(format!(
                            "cannot negate a value of type {}",
                            other.type_name()
                        ))),
                    },
                    UnaryOp::Typeof => Ok(Value::from(value.type_name())),
                }
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                binary(*op, &left, &right)
            }
            ExprKind::Logical { op, left, right } => {
                let left = self.eval(left, scope)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.is_truthy(),
                    LogicalOp::Or => left.is_truthy(),
                    LogicalOp::Nullish => !left.is_null(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond, scope)?.is_truthy() {
                    self.eval(then, scope)
                } else {
                    self.eval(otherwise, scope)
                }
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr], scope: &Arc<Scope>) -> ScriptResult<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg, scope)).collect()
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], scope: &Arc<Scope>) -> ScriptResult<Value> {
        if let ExprKind::Member { object, property } = &callee.kind {
            return self.eval_method_call(object, property, args, scope);
        }
        let function = self.eval(callee, scope)?;
        let args = self.eval_args(args, scope)?;
        if !function.is_callable() {
            return Err(ScriptError::Type(format!("{} is not a function", describe(callee))));
        }
        self.call(&function, args)
    }

    fn eval_method_call(
        &mut self,
        object: &Expr,
        method: &str,
        args: &[Expr],
        scope: &Arc<Scope>,
    ) -> ScriptResult<Value> {
        let receiver = self.eval(object, scope)?;
        if let Some(function) = receiver.get(method) {
            let args = self.eval_args(args, scope)?;
            if !function.is_callable() {
                return Err(not_a_method(object, method));
            }
            return self.call(&function, args);
        }
        let args = self.eval_args(args, scope)?;
        if builtins::is_mutating(&receiver, method) && object.is_place() {
            drop(receiver);
            let (root, path) = self.place(object, scope)?;
            // Callbacks keep seeing the current value; a failed call writes nothing back.
            let mut target = scope
                .with_slot(&root, |slot| slot_at(slot, &path).map(|s| s.clone()))
                .ok_or_else(|| ScriptError::Reference(root.clone()))??;
            let result = builtins::call_method(self, &mut target, method, args)
                .unwrap_or_else(|| Err(not_a_method(object, method)))?;
            scope
                .with_slot(&root, |slot| slot_at(slot, &path).map(|s| *s = target))
                .ok_or_else(|| ScriptError::Reference(root.clone()))??;
            return Ok(result);
        }
        let mut receiver = receiver;
        builtins::call_method(self, &mut receiver, method, args)
            .unwrap_or_else(|| Err(not_a_method(object, method)))
    }

    fn assign(&mut self, target: &Expr, value: Value, scope: &Arc<Scope>) -> ScriptResult<()> {
        let (root, path) = self.place(target, scope)?;
        scope
            .with_slot(&root, |slot| slot_at(slot, &path).map(|s| *s = value))
            .ok_or(ScriptError::Reference(root))?
    }

    /// Split a place expression into its root variable and evaluated keys.
    fn place(&mut self, expr: &Expr, scope: &Arc<Scope>) -> ScriptResult<(String, Vec<Value>)> {
        match &expr.kind {
            ExprKind::Ident(name) => Ok((name.clone(), Vec::new())),
            ExprKind::Member { object, property } => {
                let (root, mut path) = self.place(object, scope)?;
                path.push(Value::from(property.as_str()));
                Ok((root, path))
            }
            ExprKind::Index { object, index } => {
                let (root, mut path) = self.place(object, scope)?;
                path.push(self.eval(index, scope)?);
                Ok((root, path))
            }
            _ => Err(ScriptError::Type("invalid assignment target".to_string())),
        }
    }
}

/// Walk `path` from `slot`, copying shared containers on the way.
fn slot_at<'a>(mut slot: &'a mut Value, path: &[Value]) -> ScriptResult<&'a mut Value> {
    for key in path {
        slot = match slot {
            Value::Object(map) => Arc::make_mut(map).entry(key.to_string()).or_default(),
            Value::Array(items) => {
                let len = items.len();
                let idx = match key {
                    Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= len as f64 => {
                        *n as usize
                    }
                    _ => {
                        return Err(ScriptError::Type(format!(
                            "invalid index {key:?} for array of length {len}"
                        )));
                    }
                };
                let items = Arc::make_mut(items);
                if idx == len {
                    items.push(Value::Null);
                }
                &mut items[idx]
            }
            Value::Null => {
                return Err(ScriptError::Type(format!(
                    "cannot set property '{key}' of undefined"
                )));
            }
            other => {
                return Err(ScriptError::Type(format!(
                    "cannot set property '{key}' on a value of type {}",
                    other.type_name()
                )));
            }
        };
    }
    Ok(slot)
}

fn not_a_method(object: &Expr, method: &str) -> ScriptError {
    ScriptError::Type(format!("{}.{method} is not a function", describe(object)))
}

fn describe(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Ident(name) => name.clone(),
        ExprKind::Member { object, property } => format!("{}.{property}", describe(object)),
        _ => "expression".to_string(),
    }
}

fn binary(op: BinOp, left: &Value, right: &Value) -> ScriptResult<Value> {
    use Value::{Number, String as Str};
    let value = match (op, left, right) {
        (BinOp::Add, Number(a), Number(b)) => Number(a + b),
        (BinOp::Add, Str(_), _) | (BinOp::Add, _, Str(_)) => Value::from(format!("{left}{right}")),
        (BinOp::Sub, Number(a), Number(b)) => Number(a - b),
        (BinOp::Mul, Number(a), Number(b)) => Number(a * b),
        (BinOp::Div, Number(a), Number(b)) => Number(a / b),
        (BinOp::Rem, Number(a), Number(b)) => Number(a % b),
        (BinOp::Eq, _, _) => Value::Bool(left == right),
        (BinOp::NotEq, _, _) => Value::Bool(left != right),
        (BinOp::Less | BinOp::LessEq | BinOp::Greater | BinOp::GreaterEq, _, _) => {
            let ordering = match (left, right) {
                (Number(a), Number(b)) => a.partial_cmp(b),
                (Str(a), Str(b)) => Some(a.cmp(b)),
                _ => {
                    return Err(ScriptError::Type(format!(
                        "cannot compare {} with {}",
                        left.type_name(),
                        right.type_name()
                    )));
                }
            };
            let result = match ordering {
                None => false,
                Some(ordering) => match op {
                    BinOp::Less => ordering == Ordering::Less,
                    BinOp::LessEq => ordering != Ordering::Greater,
                    BinOp::Greater => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                },
            };
            Value::Bool(result)
        }
        _ => {
            return Err(ScriptError::Type(format!(
                "unsupported operand types for {}: {} and {}",
                op.symbol(),
                left.type_name(),
                right.type_name()
            )));
        }
    };
    Ok(value)
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Less => "<",
            BinOp::LessEq => "<=",
            BinOp::Greater => ">",
            BinOp::GreaterEq => ">=",
        }
    }
}
