//! Ordering and lookup helpers over JSON values.
//!
//! The cross-type order is `null < bool < number < string < array < object`.
//! Numbers compare as `f64` regardless of their integer/float representation.
//! The index key encoding in the engine produces byte strings that sort in
//! exactly this order, so in-memory comparisons and index scans agree.

use std::cmp::Ordering;

use serde_json::Value;

/// Pseudo-field addressing the document id.
pub const ID_FIELD: &str = "__id__";

/// Rank of a value's type in the cross-type order.
pub fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Numeric view of a JSON number. Without arbitrary precision every number
/// has an `f64` view.
pub fn number(v: &Value) -> Option<f64> {
    v.as_f64()
}

/// Total order over JSON values.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(_), Value::Number(_)) => {
            let x = number(a).unwrap_or(0.0);
            let y = number(b).unwrap_or(0.0);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                let ord = lk.as_bytes().cmp(rk.as_bytes()).then_with(|| compare(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}

/// Equality under [`compare`], so `1 == 1.0`.
pub fn equals(a: &Value, b: &Value) -> bool {
    compare(a, b) == Ordering::Equal
}

/// Walk a dotted path (`"a.b.c"`) through nested objects.
pub fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for seg in path.split('.') {
        current = current.as_object()?.get(seg)?;
    }
    Some(current)
}

/// Resolve a query field against a document, honoring [`ID_FIELD`].
pub fn field_value<'a>(id: &'a str, data: &'a Value, field: &str) -> Option<FieldRef<'a>> {
    if field == ID_FIELD {
        return Some(FieldRef::Id(id));
    }
    get_path(data, field).map(FieldRef::Value)
}

/// A document field or the document id, without cloning either.
#[derive(Debug, Clone, Copy)]
pub enum FieldRef<'a> {
    Id(&'a str),
    Value(&'a Value),
}

impl FieldRef<'_> {
    pub fn to_value(self) -> Value {
        match self {
            FieldRef::Id(id) => Value::String(id.to_string()),
            FieldRef::Value(v) => v.clone(),
        }
    }
}

/// JSON truthiness: `null`, `false`, `0`, `""` are falsy.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
