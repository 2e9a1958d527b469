use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::RuleError;
use crate::op::Op;

/// Key marking a field operator object (`{"__op": "inc", "n": 1}`). These
/// are data for the write path, never expressions.
pub const FIELD_OP_KEY: &str = "__op";

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Value),
    /// Dotted path into the evaluation scope.
    Var(String),
    Call(Op, Vec<Expr>),
    /// Apply a computed function value to arguments.
    Apply(Box<Expr>, Vec<Expr>),
    /// Bind a name in the scope. Without a value this is a one-argument
    /// binder function, usable as a pipeline stage.
    Let(String, Option<Box<Expr>>),
    If(Box<Expr>, Box<Expr>),
    IfElse(Box<Expr>, Box<Expr>, Box<Expr>),
    Array(Vec<Expr>),
    Object(BTreeMap<String, Expr>),
}

impl Expr {
    /// Parse the JSON form of an expression.
    ///
    /// - `"$a.b"` and `{"var": "a.b"}` read the scope
    /// - `["op", args...]` calls a builtin; `{"op": [args...]}` for JSON-logic
    ///   operators
    /// - `[[fn...], args...]` applies a computed function
    /// - `["[]", items...]` builds an array from expressions
    /// - other arrays and objects are built element-wise
    pub fn parse(v: &Value) -> Result<Self, RuleError> {
        match v {
            Value::String(s) => Ok(match s.strip_prefix('$') {
                Some(path) if !path.is_empty() => Expr::Var(path.to_string()),
                _ => Expr::Lit(v.clone()),
            }),
            Value::Array(items) => Self::parse_array(items),
            Value::Object(map) => Self::parse_object(map),
            _ => Ok(Expr::Lit(v.clone())),
        }
    }

    fn parse_array(items: &[Value]) -> Result<Self, RuleError> {
        let Some((head, rest)) = items.split_first() else {
            return Ok(Expr::Lit(Value::Array(Vec::new())));
        };
        match head {
            Value::String(name) => match name.as_str() {
                "var" => match rest {
                    [Value::String(path)] => Ok(Expr::Var(path.clone())),
                    _ => Err(RuleError::Parse("var takes one path".into())),
                },
                "[]" => Ok(Expr::Array(parse_all(rest)?)),
                "let" => match rest {
                    [Value::String(name)] => Ok(Expr::Let(name.clone(), None)),
                    [Value::String(name), value] => {
                        Ok(Expr::Let(name.clone(), Some(Box::new(Self::parse(value)?))))
                    }
                    _ => Err(RuleError::Parse("let takes a name and a value".into())),
                },
                "if" => Self::conditional(rest),
                "ifelse" => match rest {
                    [c, a, b] => Ok(Expr::IfElse(
                        Box::new(Self::parse(c)?),
                        Box::new(Self::parse(a)?),
                        Box::new(Self::parse(b)?),
                    )),
                    _ => Err(RuleError::Parse("ifelse takes three arguments".into())),
                },
                _ => match Op::parse(name) {
                    Some(op) => Ok(Expr::Call(op, parse_all(rest)?)),
                    None => Ok(Expr::Array(parse_all(items)?)),
                },
            },
            Value::Array(_) => Ok(Expr::Apply(
                Box::new(Self::parse(head)?),
                parse_all(rest)?,
            )),
            _ => Ok(Expr::Array(parse_all(items)?)),
        }
    }

    fn parse_object(map: &Map<String, Value>) -> Result<Self, RuleError> {
        if map.contains_key(FIELD_OP_KEY) {
            return Ok(Expr::Lit(Value::Object(map.clone())));
        }
        if map.len() == 1 {
            if let Some((key, arg)) = map.iter().next() {
                let args = match arg {
                    Value::Array(items) => items.as_slice(),
                    single => std::slice::from_ref(single),
                };
                match key.as_str() {
                    "var" => {
                        return match args {
                            [Value::String(path)] => Ok(Expr::Var(path.clone())),
                            [Value::String(path), default] => Ok(Expr::Call(
                                Op::DefaultTo,
                                vec![Self::parse(default)?, Expr::Var(path.clone())],
                            )),
                            _ => Err(RuleError::Parse(format!("bad var: {arg}"))),
                        };
                    }
                    "if" => return Self::conditional(args),
                    _ => {
                        if let Some(op) = Op::parse_logic(key) {
                            return Ok(Expr::Call(op, parse_all(args)?));
                        }
                    }
                }
            }
        }
        let mut fields = BTreeMap::new();
        for (k, v) in map {
            fields.insert(k.clone(), Self::parse(v)?);
        }
        Ok(Expr::Object(fields))
    }

    /// `[cond, then]`, `[cond, then, else]`, or the JSON-logic chain
    /// `[c1, a, c2, b, ..., else]`.
    fn conditional(args: &[Value]) -> Result<Self, RuleError> {
        match args {
            [c, a] => Ok(Expr::If(Box::new(Self::parse(c)?), Box::new(Self::parse(a)?))),
            [c, a, rest @ ..] if !rest.is_empty() => {
                let otherwise = if rest.len() == 1 {
                    Self::parse(&rest[0])?
                } else {
                    Self::conditional(rest)?
                };
                Ok(Expr::IfElse(
                    Box::new(Self::parse(c)?),
                    Box::new(Self::parse(a)?),
                    Box::new(otherwise),
                ))
            }
            _ => Err(RuleError::Parse("if needs a condition and a branch".into())),
        }
    }
}

fn parse_all(items: &[Value]) -> Result<Vec<Expr>, RuleError> {
    items.iter().map(Expr::parse).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn vars_and_literals() {
        assert_eq!(Expr::parse(&json!("$new.age")).unwrap(), Expr::Var("new.age".into()));
        assert_eq!(
            Expr::parse(&json!({"var": "request.auth.signer"})).unwrap(),
            Expr::Var("request.auth.signer".into())
        );
        assert_eq!(Expr::parse(&json!("$")).unwrap(), Expr::Lit(json!("$")));
        assert_eq!(Expr::parse(&json!(3)).unwrap(), Expr::Lit(json!(3)));
    }

    #[test]
    fn logic_objects_and_calls() {
        let e = Expr::parse(&json!({"!=": [{"var": "a"}, null]})).unwrap();
        assert_eq!(
            e,
            Expr::Call(Op::NotEquals, vec![Expr::Var("a".into()), Expr::Lit(json!(null))])
        );
        let e = Expr::parse(&json!(["propEq", "id", "Bob"])).unwrap();
        assert!(matches!(e, Expr::Call(Op::PropEq, ref args) if args.len() == 2));
    }

    #[test]
    fn field_ops_stay_literal() {
        let v = json!({"__op": "inc", "n": 1});
        assert_eq!(Expr::parse(&v).unwrap(), Expr::Lit(v));
    }

    #[test]
    fn data_objects_and_arrays() {
        let e = Expr::parse(&json!({"name": "$x", "n": 1})).unwrap();
        assert!(matches!(e, Expr::Object(ref m) if m["name"] == Expr::Var("x".into())));
        let e = Expr::parse(&json!(["b", "o"])).unwrap();
        assert!(matches!(e, Expr::Array(ref items) if items.len() == 2));
    }

    #[test]
    fn conditionals() {
        assert!(matches!(
            Expr::parse(&json!(["if", true, 1])).unwrap(),
            Expr::If(..)
        ));
        assert!(matches!(
            Expr::parse(&json!(["ifelse", true, 1, 2])).unwrap(),
            Expr::IfElse(..)
        ));
        assert!(matches!(
            Expr::parse(&json!({"if": [false, 1, true, 2, 3]})).unwrap(),
            Expr::IfElse(_, _, ref rest) if matches!(**rest, Expr::IfElse(..))
        ));
        assert!(Expr::parse(&json!(["ifelse", true])).is_err());
    }
}
