//! Expression language for access rules, triggers and cron jobs.
//!
//! Expressions come in two spellings that share one evaluator: JSON-logic
//! objects (`{"==": [a, b]}`) and curried functional arrays
//! (`["propEq", "id", "Bob"]`). Statement lists build on top of them.

mod builtins;
pub mod error;
pub mod expr;
pub mod host;
pub mod interp;
pub mod op;
pub mod program;
pub mod ruleset;
pub mod scope;
pub mod stmt;

pub use error::RuleError;
pub use expr::{Expr, FIELD_OP_KEY};
pub use host::{Host, NoHost, WriteKind, WriteOp};
pub use interp::{Flow, Func, Interpreter, Val};
pub use op::{Arity, Op};
pub use program::Program;
pub use ruleset::{Decision, RuleSet};
pub use scope::{RULE_ALIASES, Scope};
pub use stmt::Stmt;
