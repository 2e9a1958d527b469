use serde_json::{Map, Value};

use crate::error::RuleError;
use crate::host::Host;
use crate::interp::Interpreter;
use crate::scope::Scope;
use crate::stmt::{Stmt, parse_list};

/// A statement list run by triggers and cron jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    stmts: Vec<Stmt>,
}

impl Program {
    pub fn parse(v: &Value) -> Result<Self, RuleError> {
        let items = v
            .as_array()
            .ok_or_else(|| RuleError::Parse(format!("program must be a list: {v}")))?;
        Ok(Program {
            stmts: parse_list(items)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Run against `ctx`, sending writes to `host`. Returns the final scope.
    pub fn run<H: Host + ?Sized>(
        &self,
        ctx: Map<String, Value>,
        host: &mut H,
    ) -> Result<Scope, RuleError> {
        let mut interp = Interpreter::new(Scope::new(ctx), host);
        interp.run(&self.stmts)?;
        Ok(interp.scope)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::host::{WriteKind, WriteOp};

    #[derive(Default)]
    struct Recorder {
        writes: Vec<WriteOp>,
    }

    impl Host for Recorder {
        fn get(&mut self, _args: &Value) -> Result<Value, RuleError> {
            Ok(json!([{"id": "Bob"}, {"id": "Alice"}]))
        }

        fn write(&mut self, op: WriteOp) -> Result<(), RuleError> {
            self.writes.push(op);
            Ok(())
        }
    }

    fn ctx(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn trigger_program_writes() {
        let p = Program::parse(&json!([
            ["=$id", {"var": "data.after.id"}],
            ["update()", [{"likes": 1}, "likes", "$id"]]
        ]))
        .unwrap();
        let mut host = Recorder::default();
        p.run(ctx(json!({"data": {"after": {"id": "x1"}}})), &mut host)
            .unwrap();
        assert_eq!(
            host.writes,
            vec![WriteOp {
                kind: WriteKind::Update,
                args: vec![json!({"likes": 1}), json!("likes"), json!("x1")],
            }]
        );
    }

    #[test]
    fn cron_batch_over_query() {
        let p = Program::parse(&json!([
            ["=$ppl", ["get()", ["ppl"]]],
            ["=$ids", ["map", ["prop", "id"], {"var": "ppl"}]],
            ["batch", ["map", [
                "pipe",
                ["prop", "id"],
                ["split", ","],
                ["concat", ["[]", "update", {"age": 30}, "ppl"]]
            ], {"var": "ppl"}]]
        ]))
        .unwrap();
        let mut host = Recorder::default();
        let scope = p.run(Map::new(), &mut host).unwrap();
        assert_eq!(host.writes.len(), 2);
        assert_eq!(host.writes[1].args, vec![json!({"age": 30}), json!("ppl"), json!("Alice")]);
        assert_eq!(scope.lookup("ids"), json!(["Bob", "Alice"]));
    }

    #[test]
    fn break_stops_the_program() {
        let p = Program::parse(&json!([["break"], ["delete()", ["ppl", "Bob"]]])).unwrap();
        let mut host = Recorder::default();
        p.run(Map::new(), &mut host).unwrap();
        assert!(host.writes.is_empty());
    }
}
