use serde_json::{Map, Value};
use vellum_query::value::truthy;

use crate::builtins;
use crate::error::RuleError;
use crate::expr::Expr;
use crate::host::{Host, WriteOp};
use crate::op::{Arity, Op};
use crate::scope::Scope;
use crate::stmt::Stmt;

/// Result of evaluating an expression: data, or a function awaiting
/// arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    Data(Value),
    Fn(Func),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Func {
    /// A builtin with some leading arguments already supplied.
    Partial(Op, Vec<Val>),
    /// Left-to-right composition. A data stage replaces the running value.
    Pipe(Vec<Val>),
    /// Assigns its argument to a name and passes it through.
    Bind(String),
}

/// Control flow out of a statement list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Next,
    Break,
}

/// Recursive evaluator over [`Expr`] and [`Stmt`].
pub struct Interpreter<'h, H: Host + ?Sized> {
    pub scope: Scope,
    host: &'h mut H,
    /// Set by a truthy `allow()` statement.
    pub allowed: bool,
    /// Set by a truthy `deny()` statement.
    pub denied: bool,
}

impl<'h, H: Host + ?Sized> Interpreter<'h, H> {
    pub fn new(scope: Scope, host: &'h mut H) -> Self {
        Interpreter {
            scope,
            host,
            allowed: false,
            denied: false,
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Val, RuleError> {
        match expr {
            Expr::Lit(v) => Ok(Val::Data(v.clone())),
            Expr::Var(path) => Ok(Val::Data(self.scope.lookup(path))),
            Expr::Call(op, args) if op.is_lazy() => self.eval_lazy(*op, args),
            Expr::Call(op, args) => {
                let vals = self.eval_all(args)?;
                self.call(*op, vals)
            }
            Expr::Apply(f, args) => {
                let f = self.eval(f)?;
                let vals = self.eval_all(args)?;
                self.apply(f, vals)
            }
            Expr::Let(name, None) => Ok(Val::Fn(Func::Bind(name.clone()))),
            Expr::Let(name, Some(value)) => {
                let v = self.eval_data(value)?;
                self.scope.assign(name, v.clone())?;
                Ok(Val::Data(v))
            }
            Expr::If(cond, then) => {
                if self.test(cond)? {
                    self.eval(then)
                } else {
                    Ok(Val::Data(Value::Null))
                }
            }
            Expr::IfElse(cond, then, otherwise) => {
                if self.test(cond)? {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval_data(item)?);
                }
                Ok(Val::Data(Value::Array(out)))
            }
            Expr::Object(fields) => {
                let mut out = Map::new();
                for (k, v) in fields {
                    out.insert(k.clone(), self.eval_data(v)?);
                }
                Ok(Val::Data(Value::Object(out)))
            }
        }
    }

    /// Evaluate to data; a function value here is an error.
    pub fn eval_data(&mut self, expr: &Expr) -> Result<Value, RuleError> {
        into_data(self.eval(expr)?)
    }

    /// Evaluate and apply JSON truthiness.
    pub fn test(&mut self, expr: &Expr) -> Result<bool, RuleError> {
        Ok(truthy(&self.eval_data(expr)?))
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Val>, RuleError> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn eval_lazy(&mut self, op: Op, args: &[Expr]) -> Result<Val, RuleError> {
        let stop_on = op == Op::Or;
        let mut last = Value::Bool(op == Op::And);
        for arg in args {
            last = self.eval_data(arg)?;
            if truthy(&last) == stop_on {
                break;
            }
        }
        Ok(Val::Data(last))
    }

    /// Call a builtin, currying when arguments are missing and applying the
    /// result to any surplus.
    pub fn call(&mut self, op: Op, mut args: Vec<Val>) -> Result<Val, RuleError> {
        match op.arity() {
            Arity::Variadic => self.invoke(op, args),
            Arity::Fixed(n) if args.len() < n => Ok(Val::Fn(Func::Partial(op, args))),
            Arity::Fixed(n) => {
                let surplus = args.split_off(n);
                let result = self.invoke(op, args)?;
                if surplus.is_empty() {
                    Ok(result)
                } else {
                    self.apply(result, surplus)
                }
            }
        }
    }

    pub fn apply(&mut self, f: Val, args: Vec<Val>) -> Result<Val, RuleError> {
        match f {
            Val::Data(v) if args.is_empty() => Ok(Val::Data(v)),
            Val::Data(v) => Err(RuleError::Eval(format!("{v} is not a function"))),
            Val::Fn(Func::Partial(op, mut bound)) => {
                bound.extend(args);
                self.call(op, bound)
            }
            Val::Fn(Func::Bind(name)) => {
                let v = match args.into_iter().next() {
                    Some(arg) => into_data(arg)?,
                    None => Value::Null,
                };
                self.scope.assign(&name, v.clone())?;
                Ok(Val::Data(v))
            }
            Val::Fn(Func::Pipe(stages)) => {
                let mut stages = stages.into_iter();
                let mut acc = match stages.next() {
                    Some(first) => self.stage(first, args)?,
                    None => args.into_iter().next().unwrap_or(Val::Data(Value::Null)),
                };
                for stage in stages {
                    acc = self.stage(stage, vec![acc])?;
                }
                Ok(acc)
            }
        }
    }

    fn stage(&mut self, stage: Val, args: Vec<Val>) -> Result<Val, RuleError> {
        match stage {
            Val::Data(v) => Ok(Val::Data(v)),
            f => self.apply(f, args),
        }
    }

    fn predicate(&mut self, f: &Val, arg: Value) -> Result<bool, RuleError> {
        let out = self.apply(f.clone(), vec![Val::Data(arg)])?;
        Ok(truthy(&into_data(out)?))
    }

    fn invoke(&mut self, op: Op, args: Vec<Val>) -> Result<Val, RuleError> {
        match op {
            Op::Pipe => return Ok(Val::Fn(Func::Pipe(args))),
            Op::Compose => {
                let mut stages = args;
                stages.reverse();
                return Ok(Val::Fn(Func::Pipe(stages)));
            }
            Op::Identity => return Ok(args.into_iter().next().unwrap_or(Val::Data(Value::Null))),
            Op::Always => return Ok(args.into_iter().next().unwrap_or(Val::Data(Value::Null))),
            Op::Map | Op::Filter | Op::Reject | Op::All | Op::Any => {
                let mut args = args.into_iter();
                let (Some(f), Some(list)) = (args.next(), args.next()) else {
                    return Err(RuleError::Eval(format!("{op:?} needs a function and a list")));
                };
                let Value::Array(items) = into_data(list)? else {
                    return Err(RuleError::Eval(format!("{op:?} needs a list")));
                };
                return self.over_list(op, &f, items);
            }
            Op::When | Op::Unless => {
                let mut args = args.into_iter();
                let (Some(pred), Some(f), Some(x)) = (args.next(), args.next(), args.next())
                else {
                    return Err(RuleError::Eval(format!("{op:?} needs three arguments")));
                };
                let x = into_data(x)?;
                let hit = self.predicate(&pred, x.clone())?;
                return if hit == (op == Op::When) {
                    self.apply(f, vec![Val::Data(x)])
                } else {
                    Ok(Val::Data(x))
                };
            }
            Op::Get => {
                let arg = match args.into_iter().next() {
                    Some(v) => into_data(v)?,
                    None => Value::Null,
                };
                return Ok(Val::Data(self.host.get(&arg)?));
            }
            _ => {}
        }
        let data = args.into_iter().map(into_data).collect::<Result<Vec<_>, _>>()?;
        builtins::call(op, data).map(Val::Data)
    }

    fn over_list(&mut self, op: Op, f: &Val, items: Vec<Value>) -> Result<Val, RuleError> {
        let out = match op {
            Op::Map => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(into_data(self.apply(f.clone(), vec![Val::Data(item)])?)?);
                }
                Value::Array(out)
            }
            Op::Filter | Op::Reject => {
                let keep = op == Op::Filter;
                let mut out = Vec::new();
                for item in items {
                    if self.predicate(f, item.clone())? == keep {
                        out.push(item);
                    }
                }
                Value::Array(out)
            }
            Op::All => {
                let mut all = true;
                for item in items {
                    if !self.predicate(f, item)? {
                        all = false;
                        break;
                    }
                }
                Value::Bool(all)
            }
            _ => {
                let mut any = false;
                for item in items {
                    if self.predicate(f, item)? {
                        any = true;
                        break;
                    }
                }
                Value::Bool(any)
            }
        };
        Ok(Val::Data(out))
    }

    // ── Statements ─────────────────────────────────────────────

    pub fn run(&mut self, stmts: &[Stmt]) -> Result<Flow, RuleError> {
        for stmt in stmts {
            if self.exec(stmt)? == Flow::Break {
                return Ok(Flow::Break);
            }
        }
        Ok(Flow::Next)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow, RuleError> {
        match stmt {
            Stmt::Assign(path, expr) => {
                let v = self.eval_data(expr)?;
                self.scope.assign(path, v)?;
            }
            Stmt::Allow(cond) => {
                if self.check(cond.as_ref())? {
                    self.allowed = true;
                }
            }
            Stmt::Deny(cond) => {
                if self.check(cond.as_ref())? {
                    self.denied = true;
                }
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let branch = if self.test(cond)? { then } else { otherwise };
                return self.run(branch);
            }
            Stmt::Block(stmts) => return self.run(stmts),
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Write(kind, args) => {
                let mut values = Vec::with_capacity(args.len());
                for a in args {
                    values.push(self.eval_data(a)?);
                }
                self.host.write(WriteOp {
                    kind: *kind,
                    args: values,
                })?;
            }
            Stmt::Batch(expr) => {
                let items = match self.eval_data(expr)? {
                    Value::Array(items) => items,
                    other => {
                        return Err(RuleError::Eval(format!("batch needs a list, got {other}")));
                    }
                };
                for item in &items {
                    self.host.write(WriteOp::from_item(item)?)?;
                }
            }
            Stmt::Eval(expr) => {
                self.eval(expr)?;
            }
        }
        Ok(Flow::Next)
    }

    fn check(&mut self, cond: Option<&Expr>) -> Result<bool, RuleError> {
        match cond {
            None => Ok(true),
            Some(c) => self.test(c),
        }
    }
}

fn into_data(v: Val) -> Result<Value, RuleError> {
    match v {
        Val::Data(v) => Ok(v),
        Val::Fn(f) => Err(RuleError::Eval(format!("expected a value, got function {f:?}"))),
    }
}
