use serde_json::Value;

use crate::error::RuleError;

/// Document writes a trigger or cron program can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Set,
    Add,
    Update,
    Upsert,
    Delete,
}

impl WriteKind {
    /// Accepts both `"update"` and `"update()"`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.strip_suffix("()").unwrap_or(name) {
            "set" => Some(WriteKind::Set),
            "add" => Some(WriteKind::Add),
            "update" => Some(WriteKind::Update),
            "upsert" => Some(WriteKind::Upsert),
            "delete" => Some(WriteKind::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WriteKind::Set => "set",
            WriteKind::Add => "add",
            WriteKind::Update => "update",
            WriteKind::Upsert => "upsert",
            WriteKind::Delete => "delete",
        }
    }
}

/// One write request: the kind plus its evaluated arguments, in the same
/// order as the corresponding action (`data, collection..., id`).
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOp {
    pub kind: WriteKind,
    pub args: Vec<Value>,
}

impl WriteOp {
    /// Decode a batch item: `["update", data, "ppl", "Bob"]` or
    /// `["update", [data, "ppl", "Bob"]]`.
    pub fn from_item(item: &Value) -> Result<Self, RuleError> {
        let parts = item
            .as_array()
            .ok_or_else(|| RuleError::Eval(format!("batch item must be a list: {item}")))?;
        let (head, rest) = parts
            .split_first()
            .ok_or_else(|| RuleError::Eval("empty batch item".into()))?;
        let kind = head
            .as_str()
            .and_then(WriteKind::parse)
            .ok_or_else(|| RuleError::Eval(format!("unknown batch operation: {head}")))?;
        let args = match rest {
            [Value::Array(inner)] => inner.clone(),
            _ => rest.to_vec(),
        };
        Ok(WriteOp { kind, args })
    }
}

/// Services the database provides to running expressions.
pub trait Host {
    /// `get()` lookups. `args` is the evaluated argument: a list of path
    /// segments, optionally followed by query clauses.
    fn get(&mut self, args: &Value) -> Result<Value, RuleError>;

    /// Perform a write from a trigger or cron program.
    fn write(&mut self, op: WriteOp) -> Result<(), RuleError>;
}

/// A host with no data, for evaluating expressions in isolation.
#[derive(Debug, Default)]
pub struct NoHost;

impl Host for NoHost {
    fn get(&mut self, _args: &Value) -> Result<Value, RuleError> {
        Ok(Value::Null)
    }

    fn write(&mut self, op: WriteOp) -> Result<(), RuleError> {
        Err(RuleError::Eval(format!("{} is not available here", op.kind.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn batch_items_in_both_shapes() {
        let flat = WriteOp::from_item(&json!(["update", {"a": 1}, "ppl", "Bob"])).unwrap();
        let nested = WriteOp::from_item(&json!(["update()", [{"a": 1}, "ppl", "Bob"]])).unwrap();
        assert_eq!(flat, nested);
        assert_eq!(flat.kind, WriteKind::Update);
        assert!(WriteOp::from_item(&json!(["drop", "ppl"])).is_err());
    }
}
