use std::ops::Bound;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use vellum_query::value::ID_FIELD;
use vellum_store::{Store, Transaction};

use crate::catalog::CollectionMeta;
use crate::encoding::Record;
use crate::encoding::record::{Envelope, check_storable, encode_for_write};
use crate::encoding::value::{decode_id, prefix_successor};
use crate::error::{EncodingError, EngineError};
use crate::index::{IndexChanges, IndexKind, IndexSpec};
use crate::key::{Key, KeyPrefix};
use crate::path::{CollectionPath, DocPath};

/// Column family holding records and index entries.
pub const DATA_CF: &str = "data";
/// Column family holding collection metadata and global state.
pub const SYS_CF: &str = "sys";

type CfOf<'a, S> = <<S as Store>::Txn<'a> as Transaction>::Cf;
type SavepointOf<'a, S> = <<S as Store>::Txn<'a> as Transaction>::Savepoint;

/// Document store plus index manager over a [`Store`].
pub struct KvEngine<S: Store> {
    store: S,
}

impl<S: Store> KvEngine<S> {
    pub fn new(store: S) -> Result<Self, EngineError> {
        store.create_cf(DATA_CF)?;
        store.create_cf(SYS_CF)?;
        Ok(Self { store })
    }

    pub fn begin(&self, read_only: bool) -> Result<KvTransaction<'_, S>, EngineError> {
        let txn = self.store.begin(read_only)?;
        let data = txn.cf(DATA_CF)?;
        let sys = txn.cf(SYS_CF)?;
        Ok(KvTransaction { txn, data, sys })
    }
}

/// Before and after snapshots of one document write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    pub before: Option<Record>,
    pub after: Option<Record>,
}

impl WriteOutcome {
    /// Whether the document data differs between the two snapshots.
    pub fn changed(&self) -> bool {
        self.before.as_ref().map(|r| &r.data) != self.after.as_ref().map(|r| &r.data)
    }
}

/// One hit of an index scan: the encoded order key after the index prefix,
/// and the document it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub suffix: Vec<u8>,
    pub id: String,
}

pub type IndexIter<'b> = Box<dyn Iterator<Item = Result<IndexEntry, EngineError>> + 'b>;

// ── KvTransaction ──────────────────────────────────────────────

pub struct KvTransaction<'a, S: Store + 'a> {
    txn: S::Txn<'a>,
    data: CfOf<'a, S>,
    sys: CfOf<'a, S>,
}

fn join_bound(prefix: &[u8], bound: Bound<&[u8]>) -> Bound<Vec<u8>> {
    let join = |suffix: &[u8]| {
        let mut k = prefix.to_vec();
        k.extend_from_slice(suffix);
        k
    };
    match bound {
        Bound::Included(s) => Bound::Included(join(s)),
        Bound::Excluded(s) => Bound::Excluded(join(s)),
        Bound::Unbounded => Bound::Included(prefix.to_vec()),
    }
}

impl<'a, S: Store + 'a> KvTransaction<'a, S> {
    // ── Records ────────────────────────────────────────────────

    pub fn get(&self, path: &DocPath) -> Result<Option<Record>, EngineError> {
        let collection = path.collection.key();
        let key = Key::Record(&collection, &path.id).encode();
        match self.txn.get(&self.data, &key)? {
            None => Ok(None),
            Some(bytes) => Ok(Some(Record::decode(&bytes)?)),
        }
    }

    /// Write `data` as the full new content of the document at `path`.
    ///
    /// Registers the collection, its id index and any missing single-field
    /// indexes for the document's top-level fields, then updates every index
    /// in the same transaction as the record.
    pub fn put(
        &self,
        path: &DocPath,
        data: Value,
        setter: &str,
        timestamp: i64,
    ) -> Result<WriteOutcome, EngineError> {
        if !data.is_object() {
            return Err(EngineError::InvalidDocument(format!(
                "document data must be an object: {path}"
            )));
        }
        check_storable(&data).map_err(|msg| EngineError::InvalidDocument(format!("{path}: {msg}")))?;
        let collection = path.collection.key();
        let key = Key::Record(&collection, &path.id).encode();

        let before = self.get(path)?;
        let after = Record {
            data,
            setter: setter.to_string(),
            created: before.as_ref().map_or(timestamp, |r| r.created),
            updated: timestamp,
        };

        let mut meta = self.collection_meta(&path.collection)?.unwrap_or_default();
        if self.register_auto_indexes(&path.collection, &mut meta, &after.data)? {
            self.save_collection_meta(&path.collection, &meta)?;
        }

        self.on_write(
            &collection,
            &meta,
            &path.id,
            before.as_ref().map(|r| &r.data),
            Some(&after.data),
        )?;
        self.txn.put(&self.data, &key, &encode_for_write(&after)?)?;

        Ok(WriteOutcome {
            before,
            after: Some(after),
        })
    }

    /// Remove the document at `path`. A missing document is a no-op with an
    /// empty `before`.
    pub fn delete(&self, path: &DocPath) -> Result<WriteOutcome, EngineError> {
        let collection = path.collection.key();
        let key = Key::Record(&collection, &path.id).encode();
        let before = self.get(path)?;
        if let Some(rec) = &before {
            let meta = self.collection_meta(&path.collection)?.unwrap_or_default();
            self.on_write(&collection, &meta, &path.id, Some(&rec.data), None)?;
            self.txn.delete(&self.data, &key)?;
        }
        Ok(WriteOutcome {
            before,
            after: None,
        })
    }

    /// Bring every physical index of a collection in line with a document
    /// change.
    pub fn on_write(
        &self,
        collection: &str,
        meta: &CollectionMeta,
        id: &str,
        before: Option<&Value>,
        after: Option<&Value>,
    ) -> Result<(), EngineError> {
        let mut changes = IndexChanges::default();
        for spec in meta.physical_indexes() {
            changes.extend(IndexChanges::diff(spec, collection, id, before, after));
        }
        self.apply_index_changes(&changes, id)
    }

    fn apply_index_changes(&self, changes: &IndexChanges, id: &str) -> Result<(), EngineError> {
        if !changes.deletes.is_empty() {
            let refs: Vec<&[u8]> = changes.deletes.iter().map(Vec::as_slice).collect();
            self.txn.delete_batch(&self.data, &refs)?;
        }
        if !changes.puts.is_empty() {
            let refs: Vec<(&[u8], &[u8])> = changes
                .puts
                .iter()
                .map(|k| (k.as_slice(), id.as_bytes()))
                .collect();
            self.txn.put_batch(&self.data, &refs)?;
        }
        Ok(())
    }

    /// All documents of a collection in id order.
    pub fn scan_records(
        &self,
        collection: &CollectionPath,
    ) -> Result<Vec<(String, Record)>, EngineError> {
        let col = collection.key();
        let prefix = KeyPrefix::Records(&col).encode();
        let mut out = Vec::new();
        for item in self.txn.scan_prefix(&self.data, &prefix)? {
            let (key, value) = item?;
            let id = decode_id(&key[prefix.len()..])?;
            out.push((id, Record::decode(&value)?));
        }
        Ok(out)
    }

    /// Ordered scan over one index. Bounds apply to the entry suffix (encoded
    /// components plus id); `Unbounded` means the start or end of the index.
    ///
    /// The id index is served from the record keys themselves.
    pub fn scan_index<'b>(
        &'b self,
        collection: &CollectionPath,
        spec: &IndexSpec,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        reverse: bool,
    ) -> Result<IndexIter<'b>, EngineError> {
        let col = collection.key();
        let is_id = spec.is_id();
        let prefix = if is_id {
            KeyPrefix::Records(&col).encode()
        } else {
            KeyPrefix::Index(&col, &spec.name()).encode()
        };

        let lo = join_bound(&prefix, lower);
        let hi = match upper {
            Bound::Unbounded => match prefix_successor(&prefix) {
                Some(end) => Bound::Excluded(end),
                None => Bound::Unbounded,
            },
            bound => join_bound(&prefix, bound),
        };

        let iter = self.txn.scan_range(
            &self.data,
            lo.as_ref().map(Vec::as_slice),
            hi.as_ref().map(Vec::as_slice),
            reverse,
        )?;
        let plen = prefix.len();
        Ok(Box::new(iter.map(move |item| {
            let (key, value) = item?;
            let suffix = key[plen..].to_vec();
            let id = if is_id {
                decode_id(&suffix)?
            } else {
                String::from_utf8(value)
                    .map_err(|_| EncodingError::MalformedKey("index value is not an id".into()))?
            };
            Ok(IndexEntry { suffix, id })
        })))
    }

    // ── Collections & indexes ──────────────────────────────────

    pub fn collection_meta(
        &self,
        collection: &CollectionPath,
    ) -> Result<Option<CollectionMeta>, EngineError> {
        let col = collection.key();
        let key = Key::Collection(&col).encode();
        match self.txn.get(&self.sys, &key)? {
            None => Ok(None),
            Some(bytes) => Ok(Some(bson::deserialize_from_slice(&bytes)?)),
        }
    }

    pub fn save_collection_meta(
        &self,
        collection: &CollectionPath,
        meta: &CollectionMeta,
    ) -> Result<(), EngineError> {
        let col = collection.key();
        let key = Key::Collection(&col).encode();
        let bytes = encode_for_write(meta)?;
        self.txn.put(&self.sys, &key, &bytes)?;
        Ok(())
    }

    /// Names of the collections directly under `parent` (top level when
    /// `None`), in byte order.
    pub fn list_collections(&self, parent: Option<&DocPath>) -> Result<Vec<String>, EngineError> {
        let prefix = KeyPrefix::Collections.encode();
        let scope = parent.map(|p| format!("{p}/"));
        let mut names = Vec::new();
        for item in self.txn.scan_prefix(&self.sys, &prefix)? {
            let (key, _) = item?;
            let path = std::str::from_utf8(&key[prefix.len()..])
                .map_err(|_| EncodingError::MalformedKey("collection key".into()))?;
            let rest = match &scope {
                None => path,
                Some(scope) => match path.strip_prefix(scope.as_str()) {
                    Some(rest) => rest,
                    None => continue,
                },
            };
            if !rest.contains('/') {
                names.push(rest.to_string());
            }
        }
        Ok(names)
    }

    /// Register an index and backfill it. Returns `false` when an equivalent
    /// index already exists.
    pub fn add_index(&self, collection: &CollectionPath, spec: IndexSpec) -> Result<bool, EngineError> {
        let mut meta = self.collection_meta(collection)?.unwrap_or_default();
        if meta.find_index(&spec).is_some() {
            return Ok(false);
        }
        if spec.is_id() {
            meta.indexes.insert(0, spec);
        } else {
            self.backfill(collection, &spec)?;
            meta.indexes.push(spec);
        }
        self.save_collection_meta(collection, &meta)?;
        Ok(true)
    }

    /// Drop an index equivalent to `spec` together with its entries.
    pub fn remove_index(&self, collection: &CollectionPath, spec: &IndexSpec) -> Result<bool, EngineError> {
        if spec.is_id() {
            return Err(EngineError::InvalidIndex(format!(
                "{ID_FIELD} index cannot be removed"
            )));
        }
        let Some(mut meta) = self.collection_meta(collection)? else {
            return Ok(false);
        };
        let Some(pos) = meta.find_index(spec) else {
            return Ok(false);
        };
        let stored = meta.indexes.remove(pos);
        let col = collection.key();
        let prefix = KeyPrefix::Index(&col, &stored.name()).encode();
        let keys: Vec<Vec<u8>> = self
            .txn
            .scan_prefix(&self.data, &prefix)?
            .map(|r| r.map(|(k, _)| k))
            .collect::<Result<_, _>>()?;
        let refs: Vec<&[u8]> = keys.iter().map(Vec::as_slice).collect();
        self.txn.delete_batch(&self.data, &refs)?;
        self.save_collection_meta(collection, &meta)?;
        Ok(true)
    }

    fn backfill(&self, collection: &CollectionPath, spec: &IndexSpec) -> Result<(), EngineError> {
        let col = collection.key();
        for (id, record) in self.scan_records(collection)? {
            let changes = IndexChanges::diff(spec, &col, &id, None, Some(&record.data));
            self.apply_index_changes(&changes, &id)?;
        }
        Ok(())
    }

    /// Register the id index and single-field indexes for the top-level
    /// scalar and array fields of `data`. Returns whether `meta` changed.
    fn register_auto_indexes(
        &self,
        collection: &CollectionPath,
        meta: &mut CollectionMeta,
        data: &Value,
    ) -> Result<bool, EngineError> {
        let mut changed = false;
        if !meta.has_id_index() {
            meta.indexes.insert(0, IndexSpec::id());
            changed = true;
        }
        let Value::Object(fields) = data else {
            return Ok(changed);
        };
        for (field, value) in fields {
            if field.is_empty() || field.contains('.') || field == ID_FIELD {
                continue;
            }
            let kind = match value {
                Value::Object(_) => continue,
                Value::Array(_) => IndexKind::Array,
                _ => IndexKind::Asc,
            };
            let spec = IndexSpec::single(field.clone(), kind);
            if meta.find_index(&spec).is_none() {
                self.backfill(collection, &spec)?;
                meta.indexes.push(spec);
                changed = true;
            }
        }
        Ok(changed)
    }

    // ── Global state ───────────────────────────────────────────

    pub fn get_global<T: DeserializeOwned>(&self, ns: &str, name: &str) -> Result<Option<T>, EngineError> {
        let key = Key::Global(ns, name).encode();
        match self.txn.get(&self.sys, &key)? {
            None => Ok(None),
            Some(bytes) => {
                let env: Envelope<T> = bson::deserialize_from_slice(&bytes)?;
                Ok(Some(env.value))
            }
        }
    }

    pub fn put_global<T: Serialize>(&self, ns: &str, name: &str, value: &T) -> Result<(), EngineError> {
        let key = Key::Global(ns, name).encode();
        let bytes = encode_for_write(&Envelope { value })?;
        self.txn.put(&self.sys, &key, &bytes)?;
        Ok(())
    }

    pub fn delete_global(&self, ns: &str, name: &str) -> Result<(), EngineError> {
        let key = Key::Global(ns, name).encode();
        self.txn.delete(&self.sys, &key)?;
        Ok(())
    }

    /// Every entry of a global namespace, ordered by name.
    pub fn scan_globals<T: DeserializeOwned>(&self, ns: &str) -> Result<Vec<(String, T)>, EngineError> {
        let prefix = KeyPrefix::Global(ns).encode();
        let mut out = Vec::new();
        for item in self.txn.scan_prefix(&self.sys, &prefix)? {
            let (key, bytes) = item?;
            let name = String::from_utf8(key[prefix.len()..].to_vec())
                .map_err(|_| EncodingError::MalformedKey("global key".into()))?;
            let env: Envelope<T> = bson::deserialize_from_slice(&bytes)?;
            out.push((name, env.value));
        }
        Ok(out)
    }

    // ── Lifecycle ──────────────────────────────────────────────

    pub fn savepoint(&self) -> Result<SavepointOf<'a, S>, EngineError> {
        Ok(self.txn.savepoint()?)
    }

    pub fn rollback_to(&self, savepoint: SavepointOf<'a, S>) -> Result<(), EngineError> {
        Ok(self.txn.rollback_to(savepoint)?)
    }

    pub fn commit(self) -> Result<(), EngineError> {
        Ok(self.txn.commit()?)
    }

    pub fn rollback(self) -> Result<(), EngineError> {
        Ok(self.txn.rollback()?)
    }
}

#[cfg(test)]
mod tests;
