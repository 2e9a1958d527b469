use std::collections::VecDeque;

use serde_json::{Map, Value, json};
use tracing::debug;
use vellum_engine::{
    CollectionMeta, CollectionPath, DocPath, Record, TriggerEvent, WriteOutcome, validate_id,
};
use vellum_rules::{Host, RuleError, RuleSet, WriteKind, WriteOp};
use vellum_store::Store;

use crate::action::Action;
use crate::context::{Block, RelayInfo};
use crate::database::DatabaseTransaction;
use crate::dispatch::Event;
use crate::error::DbError;
use crate::hash::generate_id;
use crate::mutation::{FieldEnv, apply_set, apply_update};
use crate::schema;

/// Mutable bookkeeping of one running action.
#[derive(Debug)]
pub(crate) struct ActionState {
    pub signer: String,
    pub tx_id: String,
    pub block: Block,
    pub relay: Option<RelayInfo>,
    /// Running inside a bundle.
    pub bundled: bool,
    /// Counter behind generated ids.
    next_id: usize,
    /// Ids generated by `add`, in order.
    pub ids: Vec<String>,
    /// Trigger events not yet dispatched.
    pub events: VecDeque<Event>,
}

impl ActionState {
    pub fn new(signer: impl Into<String>, tx_id: impl Into<String>, block: Block) -> Self {
        ActionState {
            signer: signer.into(),
            tx_id: tx_id.into(),
            block,
            relay: None,
            bundled: false,
            next_id: 0,
            ids: Vec::new(),
            events: VecDeque::new(),
        }
    }

    fn enqueue(&mut self, doc: &DocPath, outcome: WriteOutcome, depth: usize) {
        let on = match (&outcome.before, &outcome.after) {
            (None, Some(_)) => TriggerEvent::Create,
            (Some(_), Some(_)) if outcome.changed() => TriggerEvent::Update,
            (Some(_), None) => TriggerEvent::Delete,
            _ => return,
        };
        self.events.push_back(Event {
            collection: doc.collection.clone(),
            id: doc.id.clone(),
            on,
            before: outcome.before,
            after: outcome.after,
            depth,
        });
    }
}

/// A single-document write, from an action or from a program.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DocWrite {
    pub kind: WriteKind,
    pub data: Value,
    /// Collection path for `add`, document path otherwise.
    pub path: Vec<String>,
    /// Query rule (`set:reg`) checked instead of the plain method.
    pub rule: Option<String>,
}

impl DocWrite {
    pub fn from_action(action: &Action) -> Result<Self, DbError> {
        let (kind, data, path, rule) = match action {
            Action::Add { data, collection } => (WriteKind::Add, data, collection, None),
            Action::Set { data, path } => (WriteKind::Set, data, path, None),
            Action::Update { data, path } => (WriteKind::Update, data, path, None),
            Action::Upsert { data, path } => (WriteKind::Upsert, data, path, None),
            Action::Delete { path } => (WriteKind::Delete, &Value::Null, path, None),
            Action::Query { name, data, path } => {
                let kind = name
                    .split_once(':')
                    .and_then(|(func, _)| WriteKind::parse(func))
                    .ok_or_else(|| {
                        DbError::InvalidAction(format!("query name must be <func>:<name>: {name}"))
                    })?;
                (kind, data, path, Some(name.clone()))
            }
            other => {
                return Err(DbError::InvalidAction(format!(
                    "{} is not a document write",
                    other.name()
                )));
            }
        };
        Ok(DocWrite {
            kind,
            data: data.clone(),
            path: path.clone(),
            rule,
        })
    }

    /// Decode a program write: `data, collection..., id` (no data for
    /// deletes).
    pub fn from_op(op: WriteOp) -> Result<Self, DbError> {
        let mut args = op.args.into_iter();
        let data = match op.kind {
            WriteKind::Delete => Value::Null,
            kind => args.next().ok_or_else(|| {
                DbError::InvalidAction(format!("{} needs data and a path", kind.as_str()))
            })?,
        };
        let path = args
            .map(|a| match a {
                Value::String(s) => Ok(s),
                other => Err(DbError::InvalidPath(format!(
                    "path segment must be a string: {other}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DocWrite {
            kind: op.kind,
            data,
            path,
            rule: None,
        })
    }
}

/// What vouches for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Authority {
    /// A signed action, checked against the collection rules. Depth 1.
    Rules,
    /// A trigger or cron program writing at `depth`; rules are skipped.
    Program { depth: usize },
}

impl<'a, S: Store + 'a> DatabaseTransaction<'a, S> {
    /// Write a document for the action's signer and run the triggers it
    /// sets off.
    pub(crate) fn write_and_dispatch(
        &self,
        state: &mut ActionState,
        write: DocWrite,
    ) -> Result<(), DbError> {
        self.apply_write(state, write, Authority::Rules)?;
        self.drain_events(state)
    }

    /// The single-document write path: resolve the path, apply field
    /// operators, check rules and schema, then store and queue the event.
    /// Returns the document id.
    pub(crate) fn apply_write(
        &self,
        state: &mut ActionState,
        write: DocWrite,
        authority: Authority,
    ) -> Result<String, DbError> {
        let doc = self.resolve(state, &write)?;
        let before = self.kv.get(&doc)?;
        if before.is_none() && matches!(write.kind, WriteKind::Update | WriteKind::Delete) {
            return Err(DbError::NotFound(doc.to_string()));
        }

        let env = FieldEnv {
            signer: &state.signer,
            timestamp: state.block.timestamp,
        };
        let before_data = before.as_ref().map(|r| &r.data);
        let mut next = match write.kind {
            WriteKind::Set | WriteKind::Add => Some(apply_set(&write.data, before_data, env)?),
            WriteKind::Update | WriteKind::Upsert => {
                Some(apply_update(before_data, &write.data, env)?)
            }
            WriteKind::Delete => None,
        };

        let meta = self.kv.collection_meta(&doc.collection)?;
        if authority == Authority::Rules {
            let method = match (&write.rule, &before, &next) {
                (Some(rule), _, _) => rule.clone(),
                (None, _, None) => "delete".to_string(),
                (None, None, Some(_)) => "create".to_string(),
                (None, Some(_), Some(_)) => "update".to_string(),
            };
            let derived = self.check_rules(
                state,
                meta.as_ref(),
                &doc,
                &write,
                &method,
                before.as_ref(),
                next.as_ref(),
            )?;
            if let (Some(data), Some(_)) = (derived, &next) {
                next = Some(data);
            }
        }

        if let (Some(schema), Some(data)) = (meta.as_ref().and_then(|m| m.schema.as_ref()), &next) {
            schema::validate(schema, data)?;
        }

        let outcome = match next {
            Some(data) => self.kv.put(&doc, data, &state.signer, state.block.timestamp)?,
            None => self.kv.delete(&doc)?,
        };
        let depth = match authority {
            Authority::Rules => 1,
            Authority::Program { depth } => depth,
        };
        state.enqueue(&doc, outcome, depth);
        Ok(doc.id)
    }

    /// Document path of a write. `add` draws generated ids until one is free.
    fn resolve(&self, state: &mut ActionState, write: &DocWrite) -> Result<DocPath, DbError> {
        if write.kind != WriteKind::Add {
            return Ok(DocPath::new(write.path.iter().cloned())?);
        }
        let collection = CollectionPath::new(write.path.iter().cloned())?;
        loop {
            let id = generate_id(&state.tx_id, state.next_id);
            state.next_id += 1;
            if validate_id(&id).is_err() {
                continue;
            }
            let doc = collection.doc(id.as_str())?;
            if self.kv.get(&doc)?.is_none() {
                state.ids.push(id);
                return Ok(doc);
            }
        }
    }

    /// Evaluate the collection rules for a write. Returns the rule-derived
    /// `resource.newData`, if any.
    #[allow(clippy::too_many_arguments)]
    fn check_rules(
        &self,
        state: &ActionState,
        meta: Option<&CollectionMeta>,
        doc: &DocPath,
        write: &DocWrite,
        method: &str,
        before: Option<&Record>,
        next: Option<&Value>,
    ) -> Result<Option<Value>, DbError> {
        let contract = self.contract()?;
        let Some(rules) = meta.and_then(|m| m.rules.as_ref()) else {
            if contract.secure {
                debug!(collection = %doc.collection, "write denied: no rules in secure mode");
                return Err(DbError::RuleDenied(format!(
                    "{} has no rules",
                    doc.collection
                )));
            }
            return Ok(None);
        };
        let rules = RuleSet::parse(rules)?;

        let path = doc.segments();
        let mut auth = Map::new();
        auth.insert("signer".into(), json!(state.signer));
        if let Some(relay) = &state.relay {
            auth.insert("relayer".into(), json!(relay.relayer));
            auth.insert("jobID".into(), json!(relay.job_id));
            auth.insert("extra".into(), relay.extra.clone());
        }
        let old = before.map_or(Value::Null, |r| r.data.clone());
        let new = next.cloned().unwrap_or(Value::Null);

        let mut ctx = Map::new();
        ctx.insert(
            "request".into(),
            json!({
                "method": method,
                "func": write.kind.as_str(),
                "id": doc.id,
                "path": path,
                "auth": auth,
                "block": state.block.to_json(),
                "transaction": {"id": state.tx_id},
                "resource": {"data": new},
            }),
        );
        ctx.insert(
            "resource".into(),
            json!({
                "data": old,
                "newData": new,
                "setter": before.map(|r| r.setter.clone()),
                "id": doc.id,
                "path": path,
            }),
        );
        ctx.insert("contract".into(), contract.context_json());

        let mut host = RuleHost { db: self };
        let decision = rules.evaluate(ctx, &mut host, self.config.max_rule_hops)?;
        if !decision.allowed {
            let reason = decision
                .reason
                .unwrap_or_else(|| format!("{method} on {doc}"));
            debug!(%doc, signer = %state.signer, %reason, "write denied");
            return Err(DbError::RuleDenied(reason));
        }
        if decision.method != method {
            debug!(%doc, from = method, to = %decision.method, "method redirected");
        }
        Ok(match decision.new_data {
            data @ Value::Object(_) => Some(data),
            _ => None,
        })
    }
}

/// Read-only host for rule evaluation: `get()` sees the transaction's
/// current state, writes are refused.
struct RuleHost<'t, 'a, S: Store + 'a> {
    db: &'t DatabaseTransaction<'a, S>,
}

impl<'a, S: Store + 'a> Host for RuleHost<'_, 'a, S> {
    fn get(&mut self, args: &Value) -> Result<Value, RuleError> {
        self.db
            .lookup(args)
            .map_err(|e| RuleError::Host(e.to_string()))
    }

    fn write(&mut self, op: WriteOp) -> Result<(), RuleError> {
        Err(RuleError::Eval(format!(
            "rules cannot write ({})",
            op.kind.as_str()
        )))
    }
}
