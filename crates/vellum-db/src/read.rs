use serde_json::{Map, Value, json};
use tracing::trace;
use vellum_engine::{CollectionMeta, CollectionPath, DocPath, Path, Record};
use vellum_query::{CURSOR_MARKER, Query, parse_query};
use vellum_store::Store;

use crate::action::Read;
use crate::admin::{CRON_NS, IDS_NS, LINK_NS, NONCE_NS, RELAYER_NS};
use crate::cron::CronDef;
use crate::database::DatabaseTransaction;
use crate::error::DbError;
use crate::executor::{self, Row};
use crate::planner::planner::Planner;
use crate::relay::RelayerJob;

/// A `cget` snapshot, usable as a cursor anchor.
fn snapshot(id: &str, record: &Record) -> Value {
    json!({
        CURSOR_MARKER: true,
        "id": id,
        "data": record.data,
        "setter": record.setter,
    })
}

impl<'a, S: Store + 'a> DatabaseTransaction<'a, S> {
    pub fn read(&self, read: &Read) -> Result<Value, DbError> {
        match read {
            Read::Get { path, clauses } => self.get_json(path, clauses, false),
            Read::CGet { path, clauses } => self.get_json(path, clauses, true),
            Read::GetSchema { collection } => self.meta_field(collection, |m| m.schema.clone()),
            Read::GetRules { collection } => self.meta_field(collection, |m| m.rules.clone()),
            Read::GetIndexes { collection } => {
                let col = CollectionPath::new(collection.iter().cloned())?;
                let indexes = self
                    .kv
                    .collection_meta(&col)?
                    .map(|m| m.indexes.iter().map(|i| i.to_json()).collect())
                    .unwrap_or_default();
                Ok(Value::Array(indexes))
            }
            Read::GetTriggers { collection } => {
                let col = CollectionPath::new(collection.iter().cloned())?;
                let triggers = self
                    .kv
                    .collection_meta(&col)?
                    .map(|m| {
                        m.triggers
                            .iter()
                            .map(|t| {
                                json!({
                                    "key": t.key,
                                    "on": t.on.as_str(),
                                    "func": t.func,
                                    "version": t.version,
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(Value::Array(triggers))
            }
            Read::GetInfo => Ok(self.contract()?.info()),
            Read::GetOwner => Ok(json!(self.contract()?.owners)),
            Read::GetBundlers => Ok(json!(self.contract()?.bundlers)),
            Read::ListCollections { parent } => {
                let parent = match parent.as_slice() {
                    [] => None,
                    segments => Some(DocPath::new(segments.iter().cloned())?),
                };
                Ok(json!(self.kv.list_collections(parent.as_ref())?))
            }
            Read::GetCrons => {
                let crons: Map<String, Value> = self
                    .kv
                    .scan_globals::<CronDef>(CRON_NS)?
                    .into_iter()
                    .map(|(key, cron)| (key, cron.to_json()))
                    .collect();
                Ok(Value::Object(crons))
            }
            Read::GetAlgorithms => Ok(json!(self.contract()?.algorithms)),
            Read::GetRelayerJob { id } => Ok(self
                .kv
                .get_global::<RelayerJob>(RELAYER_NS, id)?
                .map_or(Value::Null, |job| job.to_json())),
            Read::ListRelayerJobs => {
                let ids: Vec<String> = self
                    .kv
                    .scan_globals::<RelayerJob>(RELAYER_NS)?
                    .into_iter()
                    .map(|(id, _)| id)
                    .collect();
                Ok(json!(ids))
            }
            Read::GetLinkedContract { key } => {
                Ok(json!(self.kv.get_global::<String>(LINK_NS, key)?))
            }
            Read::GetEvolve => Ok(self.contract()?.evolve_json()),
            Read::Nonce { signer } => {
                Ok(json!(self.kv.get_global::<u64>(NONCE_NS, signer)?.unwrap_or(0)))
            }
            Read::Hash => Ok(json!(self.contract()?.hash)),
            Read::Ids { tx_id } => Ok(json!(
                self.kv
                    .get_global::<Vec<String>>(IDS_NS, tx_id)?
                    .unwrap_or_default()
            )),
            Read::Version => Ok(json!(self.contract()?.version)),
        }
    }

    /// `get()` from inside rules and programs: the argument is a path list,
    /// optionally followed by query clauses.
    pub(crate) fn lookup(&self, args: &Value) -> Result<Value, DbError> {
        let args = match args {
            Value::Array(items) => items.as_slice(),
            other => std::slice::from_ref(other),
        };
        match Read::from_parts("get", args)? {
            Read::Get { path, clauses } => self.get_json(&path, &clauses, false),
            _ => Ok(Value::Null),
        }
    }

    /// A document (or null) for a document path; the matching documents for
    /// a collection path.
    fn get_json(&self, path: &[String], clauses: &[Value], snapshots: bool) -> Result<Value, DbError> {
        match Path::new(path.iter().cloned())? {
            Path::Document(doc) => {
                if !clauses.is_empty() {
                    return Err(DbError::InvalidQuery(format!(
                        "document read of {doc} takes no clauses"
                    )));
                }
                Ok(match self.kv.get(&doc)? {
                    None => Value::Null,
                    Some(record) if snapshots => snapshot(&doc.id, &record),
                    Some(record) => record.data,
                })
            }
            Path::Collection(col) => {
                let query = parse_query(clauses)?;
                let rows = self.query(&col, &query)?;
                Ok(Value::Array(
                    rows.into_iter()
                        .map(|row| {
                            if snapshots {
                                snapshot(&row.id, &row.record)
                            } else {
                                row.record.data
                            }
                        })
                        .collect(),
                ))
            }
        }
    }

    /// Plan and run a query. A collection nothing was ever written to reads
    /// as empty.
    pub fn query(&self, collection: &CollectionPath, query: &Query) -> Result<Vec<Row>, DbError> {
        let Some(meta) = self.kv.collection_meta(collection)? else {
            return Ok(Vec::new());
        };
        if !meta.has_id_index() {
            return Ok(Vec::new());
        }
        let plan = Planner::new(&meta.indexes, self.config.default_limit).plan(collection, query)?;
        trace!(
            %collection,
            index = %plan.index.name(),
            direction = ?plan.direction,
            "planned query"
        );
        executor::execute(&self.kv, &plan)?.collect()
    }

    fn meta_field<F>(&self, collection: &[String], f: F) -> Result<Value, DbError>
    where
        F: FnOnce(&CollectionMeta) -> Option<Value>,
    {
        let col = CollectionPath::new(collection.iter().cloned())?;
        Ok(self
            .kv
            .collection_meta(&col)?
            .and_then(|m| f(&m))
            .unwrap_or(Value::Null))
    }
}
