//! A JSON Schema subset for collection documents.
//!
//! Supported keywords: `type`, `properties`, `required`,
//! `additionalProperties`, `items`, `enum`, `const`, `minLength`,
//! `maxLength`, `pattern`, `minimum`, `maximum`, `exclusiveMinimum`,
//! `exclusiveMaximum`, `multipleOf`, `minItems`, `maxItems`, `uniqueItems`.
//! Other keywords are ignored.

use regex::Regex;
use serde_json::{Map, Value};
use vellum_query::value::{equals, number};

use crate::error::DbError;

const TYPES: [&str; 7] = ["object", "array", "string", "number", "integer", "boolean", "null"];

/// Reject schemas that use a supported keyword with the wrong shape.
pub fn check_schema(schema: &Value) -> Result<(), DbError> {
    check_at(schema, "#")
}

fn invalid(at: &str, msg: impl std::fmt::Display) -> DbError {
    DbError::Validation(format!("invalid schema at {at}: {msg}"))
}

fn check_at(schema: &Value, at: &str) -> Result<(), DbError> {
    let obj = match schema {
        Value::Bool(_) => return Ok(()),
        Value::Object(obj) => obj,
        other => return Err(invalid(at, format!("expected an object, got {other}"))),
    };

    if let Some(t) = obj.get("type") {
        let names: Vec<&Value> = match t {
            Value::Array(items) => items.iter().collect(),
            single => vec![single],
        };
        for name in names {
            if !name.as_str().is_some_and(|n| TYPES.contains(&n)) {
                return Err(invalid(at, format!("unknown type {name}")));
            }
        }
    }
    if let Some(props) = obj.get("properties") {
        let props = props
            .as_object()
            .ok_or_else(|| invalid(at, "properties must be an object"))?;
        for (name, sub) in props {
            check_at(sub, &format!("{at}/properties/{name}"))?;
        }
    }
    if let Some(req) = obj.get("required") {
        if !req.as_array().is_some_and(|r| r.iter().all(Value::is_string)) {
            return Err(invalid(at, "required must be a list of strings"));
        }
    }
    if let Some(extra) = obj.get("additionalProperties") {
        check_at(extra, &format!("{at}/additionalProperties"))?;
    }
    if let Some(items) = obj.get("items") {
        check_at(items, &format!("{at}/items"))?;
    }
    if let Some(e) = obj.get("enum") {
        if !e.is_array() {
            return Err(invalid(at, "enum must be a list"));
        }
    }
    for key in ["minLength", "maxLength", "minItems", "maxItems"] {
        if let Some(v) = obj.get(key) {
            if v.as_u64().is_none() {
                return Err(invalid(at, format!("{key} must be a non-negative integer")));
            }
        }
    }
    for key in ["minimum", "maximum", "exclusiveMinimum", "exclusiveMaximum"] {
        if let Some(v) = obj.get(key) {
            if !v.is_number() {
                return Err(invalid(at, format!("{key} must be a number")));
            }
        }
    }
    if let Some(m) = obj.get("multipleOf") {
        if !number(m).is_some_and(|m| m > 0.0) {
            return Err(invalid(at, "multipleOf must be positive"));
        }
    }
    if let Some(u) = obj.get("uniqueItems") {
        if !u.is_boolean() {
            return Err(invalid(at, "uniqueItems must be a boolean"));
        }
    }
    if let Some(p) = obj.get("pattern") {
        let p = p.as_str().ok_or_else(|| invalid(at, "pattern must be a string"))?;
        Regex::new(p).map_err(|e| invalid(at, e))?;
    }
    Ok(())
}

/// Validate `value` against `schema`.
pub fn validate(schema: &Value, value: &Value) -> Result<(), DbError> {
    validate_at(schema, value, "")
        .map_err(|msg| DbError::Validation(format!("schema validation failed: {msg}")))
}

fn type_matches(name: &str, v: &Value) -> bool {
    match name {
        "object" => v.is_object(),
        "array" => v.is_array(),
        "string" => v.is_string(),
        "number" => v.is_number(),
        "integer" => v.as_f64().is_some_and(|f| f.fract() == 0.0),
        "boolean" => v.is_boolean(),
        "null" => v.is_null(),
        _ => false,
    }
}

fn location(at: &str) -> &str {
    if at.is_empty() { "document" } else { at }
}

fn validate_at(schema: &Value, v: &Value, at: &str) -> Result<(), String> {
    let obj = match schema {
        Value::Bool(true) => return Ok(()),
        Value::Bool(false) => return Err(format!("{} is not allowed", location(at))),
        Value::Object(obj) => obj,
        _ => return Ok(()),
    };

    if let Some(t) = obj.get("type") {
        let ok = match t {
            Value::String(name) => type_matches(name, v),
            Value::Array(names) => names
                .iter()
                .filter_map(Value::as_str)
                .any(|n| type_matches(n, v)),
            _ => true,
        };
        if !ok {
            return Err(format!("{} must be of type {t}", location(at)));
        }
    }
    if let Some(Value::Array(options)) = obj.get("enum") {
        if !options.iter().any(|o| equals(o, v)) {
            return Err(format!("{} must be one of {}", location(at), Value::Array(options.clone())));
        }
    }
    if let Some(c) = obj.get("const") {
        if !equals(c, v) {
            return Err(format!("{} must equal {c}", location(at)));
        }
    }

    match v {
        Value::String(s) => validate_string(obj, s, at)?,
        Value::Number(_) => validate_number(obj, v, at)?,
        Value::Array(items) => validate_array(obj, items, at)?,
        Value::Object(fields) => validate_object(obj, fields, at)?,
        _ => {}
    }
    Ok(())
}

fn validate_string(schema: &Map<String, Value>, s: &str, at: &str) -> Result<(), String> {
    let len = s.chars().count() as u64;
    if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
        if len < min {
            return Err(format!("{} is shorter than {min}", location(at)));
        }
    }
    if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
        if len > max {
            return Err(format!("{} is longer than {max}", location(at)));
        }
    }
    if let Some(p) = schema.get("pattern").and_then(Value::as_str) {
        let re = Regex::new(p).map_err(|e| e.to_string())?;
        if !re.is_match(s) {
            return Err(format!("{} does not match {p}", location(at)));
        }
    }
    Ok(())
}

fn validate_number(schema: &Map<String, Value>, v: &Value, at: &str) -> Result<(), String> {
    let Some(n) = number(v) else {
        return Ok(());
    };
    let bound = |key: &str| schema.get(key).and_then(number);
    if let Some(min) = bound("minimum") {
        if n < min {
            return Err(format!("{} must be >= {min}", location(at)));
        }
    }
    if let Some(max) = bound("maximum") {
        if n > max {
            return Err(format!("{} must be <= {max}", location(at)));
        }
    }
    if let Some(min) = bound("exclusiveMinimum") {
        if n <= min {
            return Err(format!("{} must be > {min}", location(at)));
        }
    }
    if let Some(max) = bound("exclusiveMaximum") {
        if n >= max {
            return Err(format!("{} must be < {max}", location(at)));
        }
    }
    if let Some(m) = bound("multipleOf") {
        let q = n / m;
        if (q - q.round()).abs() > 1e-9 {
            return Err(format!("{} must be a multiple of {m}", location(at)));
        }
    }
    Ok(())
}

fn validate_array(schema: &Map<String, Value>, items: &[Value], at: &str) -> Result<(), String> {
    let len = items.len() as u64;
    if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
        if len < min {
            return Err(format!("{} needs at least {min} items", location(at)));
        }
    }
    if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
        if len > max {
            return Err(format!("{} allows at most {max} items", location(at)));
        }
    }
    if schema.get("uniqueItems").and_then(Value::as_bool) == Some(true) {
        for (i, a) in items.iter().enumerate() {
            if items[i + 1..].iter().any(|b| equals(a, b)) {
                return Err(format!("{} has duplicate items", location(at)));
            }
        }
    }
    if let Some(item_schema) = schema.get("items") {
        for (i, item) in items.iter().enumerate() {
            validate_at(item_schema, item, &format!("{at}/{i}"))?;
        }
    }
    Ok(())
}

fn validate_object(
    schema: &Map<String, Value>,
    fields: &Map<String, Value>,
    at: &str,
) -> Result<(), String> {
    if let Some(Value::Array(required)) = schema.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !fields.contains_key(name) {
                return Err(format!("{} is missing '{name}'", location(at)));
            }
        }
    }
    let props = schema.get("properties").and_then(Value::as_object);
    for (name, v) in fields {
        let path = format!("{at}/{name}");
        match props.and_then(|p| p.get(name)) {
            Some(sub) => validate_at(sub, v, &path)?,
            None => {
                if let Some(extra) = schema.get("additionalProperties") {
                    validate_at(extra, v, &path)?;
                }
            }
        }
    }
    Ok(())
}
