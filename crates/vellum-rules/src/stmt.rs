use serde_json::Value;

use crate::error::RuleError;
use crate::expr::Expr;
use crate::host::WriteKind;

/// Statement of a rule block, trigger or cron job list.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `["=$path", expr]` or `["let", name, expr]`
    Assign(String, Expr),
    /// `["allow()", cond?]`
    Allow(Option<Expr>),
    /// `["deny()", cond?]`
    Deny(Option<Expr>),
    /// `["if", cond, stmt..., "else", stmt...]`
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
    /// `["[]", stmt...]`
    Block(Vec<Stmt>),
    Break,
    /// `["update()", [data, collection, id]]`, also without the parens.
    Write(WriteKind, Vec<Expr>),
    /// `["batch", list]`
    Batch(Expr),
    /// Any other expression, evaluated for its effects (`["do", expr]`).
    Eval(Expr),
}

impl Stmt {
    pub fn parse(v: &Value) -> Result<Self, RuleError> {
        let items = v
            .as_array()
            .ok_or_else(|| RuleError::Parse(format!("statement must be a list: {v}")))?;
        let Some((Value::String(head), rest)) = items.split_first() else {
            return Ok(Stmt::Eval(Expr::parse(v)?));
        };

        if let Some(path) = head.strip_prefix("=$") {
            let [value] = rest else {
                return Err(RuleError::Parse(format!("{head} takes one value")));
            };
            return Ok(Stmt::Assign(path.to_string(), Expr::parse(value)?));
        }

        match head.as_str() {
            "let" => match rest {
                [Value::String(name), value] => {
                    Ok(Stmt::Assign(name.clone(), Expr::parse(value)?))
                }
                _ => Ok(Stmt::Eval(Expr::parse(v)?)),
            },
            "allow()" | "deny()" => {
                let cond = match rest {
                    [] => None,
                    [c] => Some(Expr::parse(c)?),
                    _ => return Err(RuleError::Parse(format!("{head} takes one condition"))),
                };
                Ok(if head == "allow()" {
                    Stmt::Allow(cond)
                } else {
                    Stmt::Deny(cond)
                })
            }
            "if" => {
                let (cond, body) = rest
                    .split_first()
                    .ok_or_else(|| RuleError::Parse("if needs a condition".into()))?;
                let split = body.iter().position(|s| s.as_str() == Some("else"));
                let (then, otherwise) = match split {
                    Some(at) => (&body[..at], &body[at + 1..]),
                    None => (body, &[][..]),
                };
                Ok(Stmt::If {
                    cond: Expr::parse(cond)?,
                    then: parse_list(then)?,
                    otherwise: parse_list(otherwise)?,
                })
            }
            "[]" => Ok(Stmt::Block(parse_list(rest)?)),
            "break" => Ok(Stmt::Break),
            "do" => match rest {
                [expr] => Ok(Stmt::Eval(Expr::parse(expr)?)),
                _ => Err(RuleError::Parse("do takes one expression".into())),
            },
            "batch" | "batch()" => match rest {
                [expr] => Ok(Stmt::Batch(Expr::parse(expr)?)),
                _ => Err(RuleError::Parse("batch takes one list".into())),
            },
            name => match WriteKind::parse(name) {
                Some(kind) => {
                    let args = match rest {
                        [Value::Array(inner)] => inner.as_slice(),
                        _ => rest,
                    };
                    let args = args.iter().map(Expr::parse).collect::<Result<_, _>>()?;
                    Ok(Stmt::Write(kind, args))
                }
                None => Ok(Stmt::Eval(Expr::parse(v)?)),
            },
        }
    }

    /// Whether the statement, or any nested one, performs writes.
    pub fn writes(&self) -> bool {
        match self {
            Stmt::Write(..) | Stmt::Batch(_) => true,
            Stmt::If {
                then, otherwise, ..
            } => then.iter().chain(otherwise).any(Stmt::writes),
            Stmt::Block(stmts) => stmts.iter().any(Stmt::writes),
            _ => false,
        }
    }
}

/// Parse a list of statements.
pub fn parse_list(items: &[Value]) -> Result<Vec<Stmt>, RuleError> {
    items.iter().map(Stmt::parse).collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn assignments() {
        assert_eq!(
            Stmt::parse(&json!(["=$new.age", "$bob.age"])).unwrap(),
            Stmt::Assign("new.age".into(), Expr::Var("bob.age".into()))
        );
        assert_eq!(
            Stmt::parse(&json!(["let", "batches", []])).unwrap(),
            Stmt::Assign("batches".into(), Expr::Lit(json!([])))
        );
    }

    #[test]
    fn if_else_branches() {
        let s = Stmt::parse(&json!([
            "if",
            ["identity", false],
            ["update()", [{"a": 1}, "ppl", "Bob"]],
            "else",
            ["break"]
        ]))
        .unwrap();
        let Stmt::If {
            then, otherwise, ..
        } = s
        else {
            panic!("expected if");
        };
        assert!(matches!(then[0], Stmt::Write(WriteKind::Update, ref args) if args.len() == 3));
        assert_eq!(otherwise, vec![Stmt::Break]);
    }

    #[test]
    fn legacy_write_names() {
        let s = Stmt::parse(&json!(["upsert", [{"n": 1}, "like-count", {"var": "data.id"}]]))
            .unwrap();
        assert!(s.writes());
        assert!(matches!(s, Stmt::Write(WriteKind::Upsert, _)));
    }

    #[test]
    fn other_lists_are_expressions() {
        let s = Stmt::parse(&json!(["get", "ppl", ["ppl"]])).unwrap();
        assert!(matches!(s, Stmt::Eval(_)));
        assert!(!s.writes());
        assert!(Stmt::parse(&json!("allow()")).is_err());
    }
}
