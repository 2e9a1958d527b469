use serde_json::{Map, Number, Value};
use vellum_query::value::equals;
use vellum_rules::FIELD_OP_KEY;

use crate::error::DbError;

/// A field operator embedded in write data as `{"__op": name, ...}`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Add `n` to a numeric field; a missing field starts at zero.
    Inc(Number),
    /// Remove the field.
    Del,
    /// Block timestamp in seconds.
    Ts,
    /// Block timestamp in milliseconds.
    Ms,
    /// Identity of the writer.
    Signer,
    /// Append the elements not already present.
    ArrayUnion(Vec<Value>),
    /// Drop every element equal to one of these.
    ArrayRemove(Vec<Value>),
}

/// Values field operators resolve against.
#[derive(Debug, Clone, Copy)]
pub struct FieldEnv<'a> {
    pub signer: &'a str,
    pub timestamp: i64,
}

impl FieldOp {
    /// Recognize an operator object. Plain values yield `None`.
    pub fn parse(v: &Value) -> Result<Option<Self>, DbError> {
        let Some(obj) = v.as_object() else {
            return Ok(None);
        };
        let Some(name) = obj.get(FIELD_OP_KEY) else {
            return Ok(None);
        };
        let list = |key: &str| match obj.get(key) {
            Some(Value::Array(items)) => Ok(items.clone()),
            _ => Err(DbError::Validation(format!("{name} needs an '{key}' list"))),
        };
        let op = match name.as_str() {
            Some("inc") => match obj.get("n") {
                None => FieldOp::Inc(Number::from(1)),
                Some(Value::Number(n)) => FieldOp::Inc(n.clone()),
                Some(other) => {
                    return Err(DbError::Validation(format!("inc needs a number, got {other}")));
                }
            },
            Some("del") => FieldOp::Del,
            Some("ts") => FieldOp::Ts,
            Some("ms") => FieldOp::Ms,
            Some("signer") => FieldOp::Signer,
            Some("arrayUnion") => FieldOp::ArrayUnion(list("arr")?),
            Some("arrayRemove") => FieldOp::ArrayRemove(list("arr")?),
            _ => return Err(DbError::Validation(format!("unknown field operator {name}"))),
        };
        Ok(Some(op))
    }

    /// New field value given the current one; `None` removes the field.
    fn resolve(&self, old: Option<&Value>, env: FieldEnv<'_>) -> Result<Option<Value>, DbError> {
        let v = match self {
            FieldOp::Del => return Ok(None),
            FieldOp::Ts => Value::from(env.timestamp),
            FieldOp::Ms => Value::from(env.timestamp.saturating_mul(1000)),
            FieldOp::Signer => Value::String(env.signer.to_string()),
            FieldOp::Inc(n) => match old {
                None | Some(Value::Null) => Value::Number(n.clone()),
                Some(Value::Number(cur)) => add(cur, n),
                Some(other) => {
                    return Err(DbError::Validation(format!("cannot increment {other}")));
                }
            },
            FieldOp::ArrayUnion(items) => {
                let mut out = existing_array(old)?;
                for item in items {
                    if !out.iter().any(|e| equals(e, item)) {
                        out.push(item.clone());
                    }
                }
                Value::Array(out)
            }
            FieldOp::ArrayRemove(items) => {
                let mut out = existing_array(old)?;
                out.retain(|e| !items.iter().any(|i| equals(e, i)));
                Value::Array(out)
            }
        };
        Ok(Some(v))
    }
}

fn add(a: &Number, b: &Number) -> Value {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = x.checked_add(y) {
            return Value::from(sum);
        }
    }
    let sum = a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0);
    Number::from_f64(sum).map_or(Value::Null, Value::Number)
}

fn existing_array(old: Option<&Value>) -> Result<Vec<Value>, DbError> {
    match old {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(DbError::Validation(format!("{other} is not an array"))),
    }
}

/// Resolve operators in `v`, recursing into plain objects.
fn resolve_value(v: &Value, old: Option<&Value>, env: FieldEnv<'_>) -> Result<Option<Value>, DbError> {
    if let Some(op) = FieldOp::parse(v)? {
        return op.resolve(old, env);
    }
    match v {
        Value::Object(fields) => {
            let mut out = Map::new();
            for (k, child) in fields {
                let old_child = old.and_then(|o| o.get(k));
                if let Some(resolved) = resolve_value(child, old_child, env)? {
                    out.insert(k.clone(), resolved);
                }
            }
            Ok(Some(Value::Object(out)))
        }
        other => Ok(Some(other.clone())),
    }
}

/// Full replacement. Operators resolve against the previous document.
pub fn apply_set(data: &Value, before: Option<&Value>, env: FieldEnv<'_>) -> Result<Value, DbError> {
    if !data.is_object() {
        return Err(DbError::Validation(format!("document data must be an object: {data}")));
    }
    Ok(resolve_value(data, before, env)?.unwrap_or_else(|| Value::Object(Map::new())))
}

/// Merge `patch` into `base`. Dotted keys address nested fields and create
/// intermediate objects.
pub fn apply_update(base: Option<&Value>, patch: &Value, env: FieldEnv<'_>) -> Result<Value, DbError> {
    let Value::Object(fields) = patch else {
        return Err(DbError::Validation(format!("update data must be an object: {patch}")));
    };
    let mut doc = match base {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    for (key, v) in fields {
        let segments: Vec<&str> = key.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(DbError::Validation(format!("bad field path '{key}'")));
        }
        set_path(&mut doc, &segments, v, env)?;
    }
    Ok(Value::Object(doc))
}

fn set_path(
    doc: &mut Map<String, Value>,
    segments: &[&str],
    v: &Value,
    env: FieldEnv<'_>,
) -> Result<(), DbError> {
    let Some((head, rest)) = segments.split_first() else {
        return Ok(());
    };
    if rest.is_empty() {
        match resolve_value(v, doc.get(*head), env)? {
            Some(resolved) => {
                doc.insert(head.to_string(), resolved);
            }
            None => {
                doc.remove(*head);
            }
        }
        return Ok(());
    }
    let child = doc
        .entry(head.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    match child {
        Value::Object(map) => set_path(map, rest, v, env),
        _ => Ok(()),
    }
}
