use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::trace;

use crate::error::RuleError;
use crate::expr::Expr;
use crate::host::Host;
use crate::interp::Interpreter;
use crate::scope::{RULE_ALIASES, Scope};
use crate::stmt::{Stmt, parse_list};

/// Methods covered by the `write` shorthand.
const WRITE_METHODS: [&str; 3] = ["create", "update", "delete"];

/// Outcome of evaluating a rule set for one write.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    /// Method after redirections.
    pub method: String,
    /// `resource.newData` after let-block assignments.
    pub new_data: Value,
    pub reason: Option<String>,
}

type Assignments = Vec<(String, Expr)>;

#[derive(Debug, Clone, PartialEq)]
struct Scoped {
    generic: Assignments,
    lets: BTreeMap<String, Assignments>,
    allow: BTreeMap<String, Vec<Expr>>,
    deny: BTreeMap<String, Vec<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
enum Form {
    Scoped(Scoped),
    Listed(Vec<(Vec<String>, Vec<Stmt>)>),
}

/// Access rules of one collection, in either the scoped-object form
/// (`{"let create": {...}, "allow create": cond}`) or the statement-list
/// form (`["create,update", [stmts...], ...]`).
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    form: Form,
}

fn methods(list: &str) -> Vec<String> {
    let mut out = Vec::new();
    for m in list.split(',').map(str::trim).filter(|m| !m.is_empty()) {
        if m == "write" {
            out.extend(WRITE_METHODS.iter().map(|s| s.to_string()));
        } else {
            out.push(m.to_string());
        }
    }
    out
}

fn assignments(v: &Value) -> Result<Assignments, RuleError> {
    let map = v
        .as_object()
        .ok_or_else(|| RuleError::Parse(format!("let block must be an object: {v}")))?;
    map.iter()
        .map(|(target, e)| Ok((target.clone(), Expr::parse(e)?)))
        .collect()
}

impl RuleSet {
    pub fn parse(v: &Value) -> Result<Self, RuleError> {
        let form = match v {
            Value::Object(map) => Form::Scoped(Self::parse_scoped(map)?),
            Value::Array(items) => Form::Listed(Self::parse_listed(items)?),
            other => return Err(RuleError::Parse(format!("rules must be an object or list: {other}"))),
        };
        Ok(RuleSet { form })
    }

    fn parse_scoped(map: &Map<String, Value>) -> Result<Scoped, RuleError> {
        let mut scoped = Scoped {
            generic: Vec::new(),
            lets: BTreeMap::new(),
            allow: BTreeMap::new(),
            deny: BTreeMap::new(),
        };
        for (key, body) in map {
            if key == "let" {
                scoped.generic.extend(assignments(body)?);
                continue;
            }
            let (kind, list) = key
                .split_once(' ')
                .ok_or_else(|| RuleError::Parse(format!("unknown rule key '{key}'")))?;
            let targets = methods(list);
            match kind {
                "let" => {
                    let block = assignments(body)?;
                    for m in targets {
                        scoped.lets.entry(m).or_default().extend(block.iter().cloned());
                    }
                }
                "allow" | "deny" => {
                    let cond = Expr::parse(body)?;
                    let slot = if kind == "allow" {
                        &mut scoped.allow
                    } else {
                        &mut scoped.deny
                    };
                    for m in targets {
                        slot.entry(m).or_default().push(cond.clone());
                    }
                }
                _ => return Err(RuleError::Parse(format!("unknown rule key '{key}'"))),
            }
        }
        Ok(scoped)
    }

    /// Accepts `[methods, [stmts], methods, [stmts], ...]` and
    /// `[[methods, [stmts]], ...]`.
    fn parse_listed(items: &[Value]) -> Result<Vec<(Vec<String>, Vec<Stmt>)>, RuleError> {
        let pairs: Vec<(&Value, &Value)> = if items.iter().all(|i| i.is_array()) {
            items
                .iter()
                .map(|i| match i.as_array().map(Vec::as_slice) {
                    Some([m, body]) => Ok((m, body)),
                    _ => Err(RuleError::Parse(format!("bad rule block: {i}"))),
                })
                .collect::<Result<_, _>>()?
        } else {
            if items.len() % 2 != 0 {
                return Err(RuleError::Parse("rule list needs method/body pairs".into()));
            }
            items.chunks(2).map(|c| (&c[0], &c[1])).collect()
        };

        let mut blocks = Vec::with_capacity(pairs.len());
        for (m, body) in pairs {
            let m = m
                .as_str()
                .ok_or_else(|| RuleError::Parse(format!("rule methods must be a string: {m}")))?;
            let body = body
                .as_array()
                .ok_or_else(|| RuleError::Parse(format!("rule body must be a list: {body}")))?;
            let stmts = parse_list(body)?;
            if stmts.iter().any(Stmt::writes) {
                return Err(RuleError::Parse("rules cannot write".into()));
            }
            blocks.push((methods(m), stmts));
        }
        Ok(blocks)
    }

    /// Evaluate for the method in `ctx.request.method`.
    ///
    /// Method names containing `:` are query rules: they are matched by exact
    /// name and never redirected.
    pub fn evaluate<H: Host + ?Sized>(
        &self,
        ctx: Map<String, Value>,
        host: &mut H,
        max_hops: usize,
    ) -> Result<Decision, RuleError> {
        let scope = Scope::new(ctx).with_aliases(RULE_ALIASES);
        let mut interp = Interpreter::new(scope, host);
        let method = match &self.form {
            Form::Scoped(scoped) => scoped.evaluate(&mut interp, max_hops)?,
            Form::Listed(blocks) => {
                let method = current_method(&interp);
                for (targets, stmts) in blocks {
                    if targets.iter().any(|t| *t == method) {
                        interp.run(stmts)?;
                    }
                }
                let (allowed, denied) = (interp.allowed, interp.denied);
                let reason = if denied {
                    Some(format!("denied for {method}"))
                } else if !allowed {
                    Some(format!("no allow() reached for {method}"))
                } else {
                    None
                };
                return Ok(Decision {
                    allowed: allowed && !denied,
                    new_data: interp.scope.lookup("resource.newData"),
                    method,
                    reason,
                });
            }
        };
        Ok(method)
    }
}

fn current_method<H: Host + ?Sized>(interp: &Interpreter<'_, H>) -> String {
    match interp.scope.get("request.method") {
        Some(Value::String(m)) => m.clone(),
        _ => String::new(),
    }
}

impl Scoped {
    fn assign<H: Host + ?Sized>(
        interp: &mut Interpreter<'_, H>,
        block: &Assignments,
    ) -> Result<(), RuleError> {
        for (target, expr) in block {
            let v = interp.eval_data(expr)?;
            interp.scope.assign(target, v)?;
        }
        Ok(())
    }

    fn evaluate<H: Host + ?Sized>(
        &self,
        interp: &mut Interpreter<'_, H>,
        max_hops: usize,
    ) -> Result<Decision, RuleError> {
        Self::assign(interp, &self.generic)?;

        let mut method = current_method(interp);
        let redirectable = !method.contains(':');
        let mut hops = 0;
        while let Some(block) = self.lets.get(&method) {
            Self::assign(interp, block)?;
            let next = current_method(interp);
            if !redirectable || next == method {
                break;
            }
            hops += 1;
            if hops > max_hops {
                return Err(RuleError::TooDeep(hops));
            }
            trace!(from = %method, to = %next, "rule redirect");
            method = next;
        }

        let mut denied = false;
        for cond in self.deny.get(&method).into_iter().flatten() {
            if interp.test(cond)? {
                denied = true;
                break;
            }
        }
        let allows = self.allow.get(&method);
        let mut allowed = false;
        if !denied {
            for cond in allows.into_iter().flatten() {
                if interp.test(cond)? {
                    allowed = true;
                    break;
                }
            }
        }

        let reason = if denied {
            Some(format!("denied for {method}"))
        } else if allows.is_none() {
            Some(format!("no rule for {method}"))
        } else if !allowed {
            Some(format!("allow condition for {method} not met"))
        } else {
            None
        };
        Ok(Decision {
            allowed: allowed && !denied,
            new_data: interp.scope.lookup("resource.newData"),
            method,
            reason,
        })
    }
}
