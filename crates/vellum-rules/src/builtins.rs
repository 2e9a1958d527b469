use std::cmp::Ordering;

use serde_json::{Map, Number, Value};
use vellum_query::value::{compare, equals, get_path, truthy};

use crate::error::RuleError;
use crate::op::Op;

fn arity_error(op: Op, args: &[Value]) -> RuleError {
    RuleError::Eval(format!("{op:?}: unexpected arguments {args:?}"))
}

fn num(op: Op, v: &Value) -> Result<f64, RuleError> {
    v.as_f64()
        .ok_or_else(|| RuleError::Eval(format!("{op:?}: expected a number, got {v}")))
}

/// Integral results stay integers so stored documents keep their shape.
pub(crate) fn number(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        Value::from(f as i64)
    } else {
        Number::from_f64(f).map_or(Value::Null, Value::Number)
    }
}

fn text(op: Op, v: &Value) -> Result<String, RuleError> {
    match v {
        Value::String(s) => Ok(s.clone()),
        other => Err(RuleError::Eval(format!("{op:?}: expected a string, got {other}"))),
    }
}

fn display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn prop<'a>(key: &Value, target: &'a Value) -> Option<&'a Value> {
    match (key, target) {
        (Value::String(k), Value::Object(map)) => map.get(k),
        (Value::Number(n), Value::Array(items)) => {
            n.as_u64().and_then(|i| items.get(usize::try_from(i).ok()?))
        }
        _ => None,
    }
}

fn cmp_bool(op: Op, a: &Value, b: &Value) -> bool {
    let ord = compare(a, b);
    match op {
        Op::Gt => ord == Ordering::Greater,
        Op::Gte => ord != Ordering::Less,
        Op::Lt => ord == Ordering::Less,
        _ => ord != Ordering::Greater,
    }
}

fn arith(op: Op, a: f64, b: f64) -> Result<f64, RuleError> {
    match op {
        Op::Add => Ok(a + b),
        Op::Subtract => Ok(a - b),
        Op::Multiply => Ok(a * b),
        Op::Divide | Op::Modulo if b == 0.0 => Err(RuleError::Eval("division by zero".into())),
        Op::Divide => Ok(a / b),
        _ => Ok(a % b),
    }
}

/// Builtins that only need data arguments.
pub(crate) fn call(op: Op, args: Vec<Value>) -> Result<Value, RuleError> {
    let v = match (op, args.as_slice()) {
        (Op::Equals, [a, b]) => Value::Bool(equals(a, b)),
        (Op::NotEquals, [a, b]) => Value::Bool(!equals(a, b)),
        (Op::Gt | Op::Gte | Op::Lt | Op::Lte, [a, b]) => Value::Bool(cmp_bool(op, a, b)),

        (Op::And, _) => {
            let mut last = Value::Bool(true);
            for a in &args {
                last = a.clone();
                if !truthy(a) {
                    break;
                }
            }
            last
        }
        (Op::Or, _) => {
            let mut last = Value::Bool(false);
            for a in &args {
                last = a.clone();
                if truthy(a) {
                    break;
                }
            }
            last
        }
        (Op::Not, [a]) => Value::Bool(!truthy(a)),
        (Op::Truthy, [a]) => Value::Bool(truthy(a)),
        (Op::IsNil, [a]) => Value::Bool(a.is_null()),
        (Op::IsEmpty, [a]) => Value::Bool(match a {
            Value::String(s) => s.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            _ => false,
        }),
        (Op::DefaultTo, [d, v]) => {
            if v.is_null() {
                d.clone()
            } else {
                v.clone()
            }
        }

        (Op::Add | Op::Subtract | Op::Multiply | Op::Divide | Op::Modulo, [a, b]) => {
            number(arith(op, num(op, a)?, num(op, b)?)?)
        }
        (Op::Plus, _) => {
            let mut total = 0.0;
            for a in &args {
                total += num(op, a)?;
            }
            number(total)
        }
        (Op::Times, _) => {
            let mut total = 1.0;
            for a in &args {
                total *= num(op, a)?;
            }
            number(total)
        }
        (Op::Inc, [a]) => number(num(op, a)? + 1.0),
        (Op::Dec, [a]) => number(num(op, a)? - 1.0),
        (Op::Negate, [a]) => number(-num(op, a)?),
        (Op::Max, [a, b]) => {
            if compare(a, b) == Ordering::Less {
                b.clone()
            } else {
                a.clone()
            }
        }
        (Op::Min, [a, b]) => {
            if compare(a, b) == Ordering::Greater {
                b.clone()
            } else {
                a.clone()
            }
        }
        (Op::Sum, [Value::Array(items)]) => {
            let mut total = 0.0;
            for a in items {
                total += num(op, a)?;
            }
            number(total)
        }

        (Op::Prop, [k, target]) => prop(k, target).cloned().unwrap_or(Value::Null),
        (Op::Path, [path, target]) => {
            let found = match path {
                Value::String(p) => get_path(target, p),
                Value::Array(keys) => keys.iter().try_fold(target, |cur, k| prop(k, cur)),
                _ => None,
            };
            found.cloned().unwrap_or(Value::Null)
        }
        (Op::PropEq, [k, expected, target]) => {
            Value::Bool(prop(k, target).is_some_and(|v| equals(v, expected)))
        }
        (Op::Has, [Value::String(k), Value::Object(map)]) => Value::Bool(map.contains_key(k)),
        (Op::Has, [_, _]) => Value::Bool(false),
        (Op::Keys, [Value::Object(map)]) => {
            Value::Array(map.keys().cloned().map(Value::String).collect())
        }
        (Op::Values, [Value::Object(map)]) => Value::Array(map.values().cloned().collect()),
        (Op::Assoc, [Value::String(k), v, target]) => {
            let mut map = target.as_object().cloned().unwrap_or_default();
            map.insert(k.clone(), v.clone());
            Value::Object(map)
        }
        (Op::Dissoc, [Value::String(k), Value::Object(map)]) => {
            let mut map = map.clone();
            map.remove(k);
            Value::Object(map)
        }
        (Op::MergeLeft | Op::MergeRight, [Value::Object(a), Value::Object(b)]) => {
            let (base, winner) = if op == Op::MergeLeft { (b, a) } else { (a, b) };
            let mut out: Map<String, Value> = base.clone();
            for (k, v) in winner {
                out.insert(k.clone(), v.clone());
            }
            Value::Object(out)
        }

        (Op::Includes, [x, Value::Array(items)]) => Value::Bool(items.iter().any(|i| equals(i, x))),
        (Op::Includes, [Value::String(x), Value::String(s)]) => Value::Bool(s.contains(x.as_str())),
        (Op::Includes, [_, _]) => Value::Bool(false),
        (Op::Append, [x, Value::Array(items)]) => {
            let mut items = items.clone();
            items.push(x.clone());
            Value::Array(items)
        }
        (Op::Prepend, [x, Value::Array(items)]) => {
            let mut out = vec![x.clone()];
            out.extend(items.iter().cloned());
            Value::Array(out)
        }
        (Op::Concat, [Value::Array(a), Value::Array(b)]) => {
            Value::Array(a.iter().chain(b.iter()).cloned().collect())
        }
        (Op::Concat, [Value::String(a), Value::String(b)]) => Value::String(format!("{a}{b}")),
        (Op::Head, [Value::Array(items)]) => items.first().cloned().unwrap_or(Value::Null),
        (Op::Head, [Value::String(s)]) => {
            Value::String(s.chars().next().map(String::from).unwrap_or_default())
        }
        (Op::Last, [Value::Array(items)]) => items.last().cloned().unwrap_or(Value::Null),
        (Op::Last, [Value::String(s)]) => {
            Value::String(s.chars().last().map(String::from).unwrap_or_default())
        }
        (Op::Tail, [Value::Array(items)]) => {
            Value::Array(items.iter().skip(1).cloned().collect())
        }
        (Op::Tail, [Value::String(s)]) => Value::String(s.chars().skip(1).collect()),
        (Op::Length, [Value::Array(items)]) => Value::from(items.len()),
        (Op::Length, [Value::String(s)]) => Value::from(s.chars().count()),
        (Op::Nth, [i, Value::Array(items)]) => {
            let i = num(op, i)? as i64;
            let len = items.len() as i64;
            let at = if i < 0 { len + i } else { i };
            usize::try_from(at)
                .ok()
                .and_then(|at| items.get(at))
                .cloned()
                .unwrap_or(Value::Null)
        }
        (Op::Cat, _) => Value::String(args.iter().map(display).collect()),
        (Op::ToLower, [s]) => Value::String(text(op, s)?.to_lowercase()),
        (Op::ToUpper, [s]) => Value::String(text(op, s)?.to_uppercase()),
        (Op::Trim, [s]) => Value::String(text(op, s)?.trim().to_string()),
        (Op::Split, [sep, s]) => {
            let (sep, s) = (text(op, sep)?, text(op, s)?);
            Value::Array(s.split(sep.as_str()).map(|p| Value::String(p.into())).collect())
        }
        (Op::Join, [sep, Value::Array(items)]) => {
            let sep = text(op, sep)?;
            Value::String(items.iter().map(display).collect::<Vec<_>>().join(&sep))
        }
        (Op::StartsWith, [p, s]) => Value::Bool(text(op, s)?.starts_with(&text(op, p)?)),
        (Op::EndsWith, [p, s]) => Value::Bool(text(op, s)?.ends_with(&text(op, p)?)),

        _ => return Err(arity_error(op, &args)),
    };
    Ok(v)
}
