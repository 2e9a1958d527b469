use serde_json::Value;

use crate::error::DbError;

/// A state-changing request.
///
/// Paths are raw segment lists; they are validated when the action runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Add { data: Value, collection: Vec<String> },
    Set { data: Value, path: Vec<String> },
    Update { data: Value, path: Vec<String> },
    Upsert { data: Value, path: Vec<String> },
    Delete { path: Vec<String> },
    /// Write through a named query rule, e.g. `set:reg`.
    Query { name: String, data: Value, path: Vec<String> },
    /// Actions of one signer, each applied under its own savepoint.
    Batch(Vec<Action>),
    /// Actions of several signers packed by one submitter.
    Bundle(Vec<SignedAction>),
    Relay {
        job_id: String,
        signer: String,
        action: Box<Action>,
        extra: Value,
        /// Identities that signed off on the relayed action.
        signatures: Vec<String>,
    },
    SetRules { rules: Value, collection: Vec<String> },
    SetSchema { schema: Value, collection: Vec<String> },
    AddIndex { index: Value, collection: Vec<String> },
    RemoveIndex { index: Value, collection: Vec<String> },
    AddTrigger { trigger: Value, collection: Vec<String> },
    RemoveTrigger { key: String, collection: Vec<String> },
    AddCron { key: String, cron: Value },
    RemoveCron { key: String },
    AddOwner(String),
    RemoveOwner(String),
    SetSecure(bool),
    SetCanEvolve(bool),
    SetAlgorithms(Vec<String>),
    /// Replace the bundler list; an empty list lifts the restriction.
    SetBundlers(Vec<String>),
    AddRelayerJob { id: String, job: Value },
    RemoveRelayerJob { id: String },
    LinkContract { key: String, address: String },
    UnlinkContract { key: String },
    Evolve { src: String },
    Migrate { version: String },
}

/// One bundle item: an action with its own signer and nonce.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedAction {
    pub signer: String,
    pub nonce: u64,
    pub action: Action,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Add { .. } => "add",
            Action::Set { .. } => "set",
            Action::Update { .. } => "update",
            Action::Upsert { .. } => "upsert",
            Action::Delete { .. } => "delete",
            Action::Query { .. } => "query",
            Action::Batch(_) => "batch",
            Action::Bundle(_) => "bundle",
            Action::Relay { .. } => "relay",
            Action::SetRules { .. } => "setRules",
            Action::SetSchema { .. } => "setSchema",
            Action::AddIndex { .. } => "addIndex",
            Action::RemoveIndex { .. } => "removeIndex",
            Action::AddTrigger { .. } => "addTrigger",
            Action::RemoveTrigger { .. } => "removeTrigger",
            Action::AddCron { .. } => "addCron",
            Action::RemoveCron { .. } => "removeCron",
            Action::AddOwner(_) => "addOwner",
            Action::RemoveOwner(_) => "removeOwner",
            Action::SetSecure(_) => "setSecure",
            Action::SetCanEvolve(_) => "setCanEvolve",
            Action::SetAlgorithms(_) => "setAlgorithms",
            Action::SetBundlers(_) => "setBundlers",
            Action::AddRelayerJob { .. } => "addRelayerJob",
            Action::RemoveRelayerJob { .. } => "removeRelayerJob",
            Action::LinkContract { .. } => "linkContract",
            Action::UnlinkContract { .. } => "unlinkContract",
            Action::Evolve { .. } => "evolve",
            Action::Migrate { .. } => "migrate",
        }
    }

    /// Single-document writes.
    pub fn is_doc_write(&self) -> bool {
        matches!(
            self,
            Action::Add { .. }
                | Action::Set { .. }
                | Action::Update { .. }
                | Action::Upsert { .. }
                | Action::Delete { .. }
                | Action::Query { .. }
        )
    }

    /// Parse the wire form `{"function": name, "query": [args...]}`.
    pub fn from_json(v: &Value) -> Result<Self, DbError> {
        let (function, args) = function_and_args(v)?;
        Self::from_parts(function, args)
    }

    /// Parse a function name and its positional arguments.
    pub fn from_parts(function: &str, args: &[Value]) -> Result<Self, DbError> {
        let action = match function {
            "add" => {
                let (data, rest) = data_arg(function, args)?;
                Action::Add {
                    data,
                    collection: path_args(function, rest)?,
                }
            }
            "set" | "update" | "upsert" => {
                let (data, rest) = data_arg(function, args)?;
                let path = path_args(function, rest)?;
                match function {
                    "set" => Action::Set { data, path },
                    "update" => Action::Update { data, path },
                    _ => Action::Upsert { data, path },
                }
            }
            "delete" => Action::Delete {
                path: path_args(function, args)?,
            },
            "query" => {
                let (name, rest) = string_arg(function, args)?;
                let (data, rest) = if name.starts_with("delete:") {
                    (Value::Null, rest)
                } else {
                    data_arg(function, rest)?
                };
                Action::Query {
                    name,
                    data,
                    path: path_args(function, rest)?,
                }
            }
            "batch" => {
                let mut items = Vec::with_capacity(args.len());
                for item in args {
                    let parts = item.as_array().ok_or_else(|| {
                        DbError::InvalidAction(format!("batch item must be a list: {item}"))
                    })?;
                    let (name, rest) = string_arg(function, parts)?;
                    let action = Self::from_parts(&name, rest)?;
                    if matches!(action, Action::Batch(_) | Action::Bundle(_)) {
                        return Err(DbError::InvalidAction(format!(
                            "{name} cannot be nested in a batch"
                        )));
                    }
                    items.push(action);
                }
                Action::Batch(items)
            }
            "bundle" => {
                let items = args
                    .iter()
                    .map(SignedAction::from_json)
                    .collect::<Result<_, _>>()?;
                Action::Bundle(items)
            }
            "relay" => {
                let (job_id, rest) = string_arg(function, args)?;
                let Some((inner, rest)) = rest.split_first() else {
                    return Err(DbError::InvalidAction("relay needs an action".into()));
                };
                let inner = SignedAction::from_json(inner)?;
                let extra = rest.first().cloned().unwrap_or(Value::Null);
                let signatures = match rest.get(1) {
                    None => Vec::new(),
                    Some(v) => strings(function, v)?,
                };
                Action::Relay {
                    job_id,
                    signer: inner.signer,
                    action: Box::new(inner.action),
                    extra,
                    signatures,
                }
            }
            "setRules" | "setSchema" | "addIndex" | "removeIndex" | "addTrigger" => {
                let (def, rest) = data_arg(function, args)?;
                let collection = path_args(function, rest)?;
                match function {
                    "setRules" => Action::SetRules {
                        rules: def,
                        collection,
                    },
                    "setSchema" => Action::SetSchema {
                        schema: def,
                        collection,
                    },
                    "addIndex" => Action::AddIndex {
                        index: def,
                        collection,
                    },
                    "removeIndex" => Action::RemoveIndex {
                        index: def,
                        collection,
                    },
                    _ => Action::AddTrigger {
                        trigger: def,
                        collection,
                    },
                }
            }
            "removeTrigger" => {
                let (key, rest) = string_arg(function, args)?;
                Action::RemoveTrigger {
                    key,
                    collection: path_args(function, rest)?,
                }
            }
            "addCron" => {
                let (cron, rest) = data_arg(function, args)?;
                let (key, _) = string_arg(function, rest)?;
                Action::AddCron { key, cron }
            }
            "removeCron" => Action::RemoveCron {
                key: string_arg(function, args)?.0,
            },
            "addOwner" => Action::AddOwner(string_arg(function, args)?.0),
            "removeOwner" => Action::RemoveOwner(string_arg(function, args)?.0),
            "setSecure" | "setCanEvolve" => {
                let flag = args.first().and_then(Value::as_bool).ok_or_else(|| {
                    DbError::InvalidAction(format!("{function} takes a boolean"))
                })?;
                if function == "setSecure" {
                    Action::SetSecure(flag)
                } else {
                    Action::SetCanEvolve(flag)
                }
            }
            "setAlgorithms" | "setBundlers" => {
                let list = args.first().ok_or_else(|| {
                    DbError::InvalidAction(format!("{function} takes a list"))
                })?;
                let list = strings(function, list)?;
                if function == "setAlgorithms" {
                    Action::SetAlgorithms(list)
                } else {
                    Action::SetBundlers(list)
                }
            }
            "addRelayerJob" => {
                let (id, rest) = string_arg(function, args)?;
                let job = rest.first().cloned().ok_or_else(|| {
                    DbError::InvalidAction("addRelayerJob needs a job".into())
                })?;
                Action::AddRelayerJob { id, job }
            }
            "removeRelayerJob" => Action::RemoveRelayerJob {
                id: string_arg(function, args)?.0,
            },
            "linkContract" => {
                let (key, rest) = string_arg(function, args)?;
                let (address, _) = string_arg(function, rest)?;
                Action::LinkContract { key, address }
            }
            "unlinkContract" => Action::UnlinkContract {
                key: string_arg(function, args)?.0,
            },
            "evolve" => Action::Evolve {
                src: string_arg(function, args)?.0,
            },
            "migrate" => Action::Migrate {
                version: string_arg(function, args)?.0,
            },
            other => return Err(DbError::InvalidAction(format!("unknown function '{other}'"))),
        };
        Ok(action)
    }
}

impl SignedAction {
    /// `{"function": .., "query": [..], "signer": .., "nonce": n}`
    pub fn from_json(v: &Value) -> Result<Self, DbError> {
        let signer = v
            .get("signer")
            .and_then(Value::as_str)
            .ok_or_else(|| DbError::InvalidAction(format!("missing signer: {v}")))?;
        let nonce = v.get("nonce").and_then(Value::as_u64).unwrap_or(0);
        Ok(SignedAction {
            signer: signer.to_string(),
            nonce,
            action: Action::from_json(v)?,
        })
    }
}

/// A read request.
#[derive(Debug, Clone, PartialEq)]
pub enum Read {
    Get { path: Vec<String>, clauses: Vec<Value> },
    /// Like `Get`, returning cursor snapshots.
    CGet { path: Vec<String>, clauses: Vec<Value> },
    GetSchema { collection: Vec<String> },
    GetRules { collection: Vec<String> },
    GetIndexes { collection: Vec<String> },
    GetTriggers { collection: Vec<String> },
    GetInfo,
    GetOwner,
    ListCollections { parent: Vec<String> },
    GetCrons,
    GetAlgorithms,
    GetBundlers,
    GetRelayerJob { id: String },
    ListRelayerJobs,
    GetLinkedContract { key: String },
    GetEvolve,
    Nonce { signer: String },
    Hash,
    Ids { tx_id: String },
    Version,
}

impl Read {
    pub fn from_json(v: &Value) -> Result<Self, DbError> {
        let (function, args) = function_and_args(v)?;
        Self::from_parts(function, args)
    }

    pub fn from_parts(function: &str, args: &[Value]) -> Result<Self, DbError> {
        let read = match function {
            "get" | "cget" => {
                let split = args.iter().take_while(|a| a.is_string()).count();
                let path = path_args(function, &args[..split])?;
                let clauses = args[split..].to_vec();
                if function == "get" {
                    Read::Get { path, clauses }
                } else {
                    Read::CGet { path, clauses }
                }
            }
            "getSchema" => Read::GetSchema {
                collection: path_args(function, args)?,
            },
            "getRules" => Read::GetRules {
                collection: path_args(function, args)?,
            },
            "getIndexes" => Read::GetIndexes {
                collection: path_args(function, args)?,
            },
            "getTriggers" => Read::GetTriggers {
                collection: path_args(function, args)?,
            },
            "getInfo" => Read::GetInfo,
            "getOwner" => Read::GetOwner,
            "listCollections" => Read::ListCollections {
                parent: args
                    .iter()
                    .map(|a| {
                        a.as_str().map(String::from).ok_or_else(|| {
                            DbError::InvalidAction(format!("path segment must be a string: {a}"))
                        })
                    })
                    .collect::<Result<_, _>>()?,
            },
            "getCrons" => Read::GetCrons,
            "getAlgorithms" => Read::GetAlgorithms,
            "getBundlers" => Read::GetBundlers,
            "getRelayerJob" => Read::GetRelayerJob {
                id: string_arg(function, args)?.0,
            },
            "listRelayerJobs" => Read::ListRelayerJobs,
            "getLinkedContract" => Read::GetLinkedContract {
                key: string_arg(function, args)?.0,
            },
            "getEvolve" => Read::GetEvolve,
            "nonce" => Read::Nonce {
                signer: string_arg(function, args)?.0,
            },
            "hash" => Read::Hash,
            "ids" => Read::Ids {
                tx_id: string_arg(function, args)?.0,
            },
            "version" => Read::Version,
            other => return Err(DbError::InvalidAction(format!("unknown read '{other}'"))),
        };
        Ok(read)
    }
}

// ── Argument helpers ───────────────────────────────────────────

fn function_and_args(v: &Value) -> Result<(&str, &[Value]), DbError> {
    let function = v
        .get("function")
        .and_then(Value::as_str)
        .ok_or_else(|| DbError::InvalidAction(format!("missing function: {v}")))?;
    let args = match v.get("query") {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(items)) => items.as_slice(),
        Some(other) => std::slice::from_ref(other),
    };
    Ok((function, args))
}

fn data_arg<'v>(function: &str, args: &'v [Value]) -> Result<(Value, &'v [Value]), DbError> {
    match args.split_first() {
        Some((data, rest)) => Ok((data.clone(), rest)),
        None => Err(DbError::InvalidAction(format!("{function} needs a value"))),
    }
}

fn string_arg<'v>(function: &str, args: &'v [Value]) -> Result<(String, &'v [Value]), DbError> {
    match args.split_first() {
        Some((Value::String(s), rest)) => Ok((s.clone(), rest)),
        _ => Err(DbError::InvalidAction(format!("{function} needs a string argument"))),
    }
}

fn path_args(function: &str, args: &[Value]) -> Result<Vec<String>, DbError> {
    if args.is_empty() {
        return Err(DbError::InvalidAction(format!("{function} needs a path")));
    }
    args.iter()
        .map(|a| {
            a.as_str()
                .map(String::from)
                .ok_or_else(|| DbError::InvalidAction(format!("path segment must be a string: {a}")))
        })
        .collect()
}

fn strings(function: &str, v: &Value) -> Result<Vec<String>, DbError> {
    let items = v
        .as_array()
        .ok_or_else(|| DbError::InvalidAction(format!("{function} takes a list of strings")))?;
    items
        .iter()
        .map(|i| {
            i.as_str()
                .map(String::from)
                .ok_or_else(|| DbError::InvalidAction(format!("{function} takes a list of strings")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_document_writes() {
        let a = Action::from_json(&json!({"function": "set", "query": [{"age": 20}, "ppl", "Bob"]}))
            .unwrap();
        assert_eq!(
            a,
            Action::Set {
                data: json!({"age": 20}),
                path: vec!["ppl".into(), "Bob".into()]
            }
        );
        let a = Action::from_json(&json!({"function": "delete", "query": ["ppl", "Bob"]})).unwrap();
        assert_eq!(a.name(), "delete");
        let a = Action::from_json(&json!({"function": "query", "query": ["set:reg", {"n": 1}, "users", "a"]}))
            .unwrap();
        assert!(matches!(a, Action::Query { ref name, .. } if name == "set:reg"));
    }

    #[test]
    fn batch_items_parse_as_actions() {
        let a = Action::from_json(&json!({"function": "batch", "query": [
            ["set", {"a": 1}, "ppl", "Bob"],
            ["delete", "ppl", "Alice"],
            ["setSchema", {"type": "object"}, "ppl"],
            ["addIndex", [["age", "desc"]], "ppl"],
            ["addOwner", "0xother"]
        ]}))
        .unwrap();
        let Action::Batch(items) = a else {
            panic!("expected batch");
        };
        let names: Vec<_> = items.iter().map(Action::name).collect();
        assert_eq!(names, ["set", "delete", "setSchema", "addIndex", "addOwner"]);

        let nested = Action::from_json(&json!({"function": "batch", "query": [["batch", ["delete", "a", "b"]]]}));
        assert!(matches!(nested, Err(DbError::InvalidAction(_))));
    }

    #[test]
    fn relay_carries_inner_signer() {
        let a = Action::from_json(&json!({"function": "relay", "query": [
            "job1",
            {"function": "add", "query": [{"a": 1}, "ppl"], "signer": "0xuser"},
            {"n": 1},
            ["0xs1"]
        ]}))
        .unwrap();
        let Action::Relay { signer, signatures, extra, .. } = a else {
            panic!("expected relay");
        };
        assert_eq!(signer, "0xuser");
        assert_eq!(signatures, vec!["0xs1".to_string()]);
        assert_eq!(extra, json!({"n": 1}));
    }

    #[test]
    fn unknown_or_malformed() {
        assert!(matches!(
            Action::from_json(&json!({"function": "drop", "query": []})),
            Err(DbError::InvalidAction(_))
        ));
        assert!(Action::from_json(&json!({"query": []})).is_err());
        assert!(Action::from_json(&json!({"function": "set", "query": [{"a": 1}, 5]})).is_err());
        assert!(Action::from_json(&json!({"function": "setSecure", "query": ["yes"]})).is_err());
    }

    #[test]
    fn parses_reads() {
        let r = Read::from_json(&json!({"function": "get", "query": ["ppl", ["age"], ["startAfter", 30]]}))
            .unwrap();
        assert_eq!(
            r,
            Read::Get {
                path: vec!["ppl".into()],
                clauses: vec![json!(["age"]), json!(["startAfter", 30])]
            }
        );
        assert_eq!(Read::from_json(&json!({"function": "hash"})).unwrap(), Read::Hash);
        assert_eq!(
            Read::from_json(&json!({"function": "getBundlers"})).unwrap(),
            Read::GetBundlers
        );
        assert_eq!(
            Action::from_json(&json!({"function": "setBundlers", "query": [["0xb"]]})).unwrap(),
            Action::SetBundlers(vec!["0xb".into()])
        );
        assert_eq!(
            Read::from_json(&json!({"function": "listCollections"})).unwrap(),
            Read::ListCollections { parent: vec![] }
        );
    }
}
