use serde_json::{Map, Value};
use vellum_query::value::get_path;

use crate::error::RuleError;

/// Short names available in rule scopes, mapped to their full paths.
pub const RULE_ALIASES: &[(&str, &str)] = &[
    ("new", "resource.newData"),
    ("old", "resource.data"),
    ("id", "request.id"),
    ("signer", "request.auth.signer"),
    ("ts", "request.block.timestamp"),
    ("method", "request.method"),
];

/// Mutable evaluation context: a JSON object addressed by dotted paths.
/// Let-bound names live at the top level next to the context roots.
#[derive(Debug, Clone)]
pub struct Scope {
    root: Map<String, Value>,
    aliases: &'static [(&'static str, &'static str)],
}

impl Scope {
    pub fn new(root: Map<String, Value>) -> Self {
        Scope { root, aliases: &[] }
    }

    pub fn with_aliases(mut self, aliases: &'static [(&'static str, &'static str)]) -> Self {
        self.aliases = aliases;
        self
    }

    fn resolve(&self, path: &str) -> String {
        let (head, tail) = match path.split_once('.') {
            Some((h, t)) => (h, Some(t)),
            None => (path, None),
        };
        if self.root.contains_key(head) {
            return path.to_string();
        }
        match self.aliases.iter().find(|(alias, _)| *alias == head) {
            Some((_, full)) => match tail {
                Some(t) => format!("{full}.{t}"),
                None => (*full).to_string(),
            },
            None => path.to_string(),
        }
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        let path = self.resolve(path);
        let (head, tail) = match path.split_once('.') {
            Some((h, t)) => (h, Some(t)),
            None => (path.as_str(), None),
        };
        let top = self.root.get(head)?;
        match tail {
            Some(t) => get_path(top, t),
            None => Some(top),
        }
    }

    /// Value at `path`, `null` when absent.
    pub fn lookup(&self, path: &str) -> Value {
        self.get(path).cloned().unwrap_or(Value::Null)
    }

    /// Write `value` at `path`, creating intermediate objects.
    pub fn assign(&mut self, path: &str, value: Value) -> Result<(), RuleError> {
        let path = self.resolve(path);
        let mut segments = path.split('.');
        let Some(head) = segments.next().filter(|s| !s.is_empty()) else {
            return Err(RuleError::Eval(format!("invalid assignment target '{path}'")));
        };
        let rest: Vec<&str> = segments.collect();
        let Some((last, parents)) = rest.split_last() else {
            self.root.insert(head.to_string(), value);
            return Ok(());
        };

        let mut current = self
            .root
            .entry(head.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        for seg in parents {
            current = object_mut(current, &path)?
                .entry(seg.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        object_mut(current, &path)?.insert(last.to_string(), value);
        Ok(())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }
}

/// `value` as an object, replacing a non-object first.
fn object_mut<'v>(value: &'v mut Value, path: &str) -> Result<&'v mut Map<String, Value>, RuleError> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    value
        .as_object_mut()
        .ok_or_else(|| RuleError::Eval(format!("cannot assign into '{path}'")))
}
