use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ops::Bound;
use std::sync::MutexGuard;

use crate::error::StoreError;
use crate::store::{KvIter, KvPair, Transaction};

use super::store::{ColumnFamily, MemoryStore};

/// Column family handle for the memory backend.
///
/// A name token only; reads go through the transaction's snapshot so that
/// writes within the same transaction are visible.
#[derive(Debug, Clone)]
pub struct MemoryCf {
    pub(crate) name: String,
}

/// Working copy of every column family plus the set written to.
#[derive(Clone)]
struct Snapshot {
    data: HashMap<String, ColumnFamily>,
    dirty: HashSet<String>,
}

impl Snapshot {
    fn get_cf(&self, cf: &str) -> Result<&ColumnFamily, StoreError> {
        self.data
            .get(cf)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf.to_string()))
    }

    fn get_cf_mut(&mut self, cf: &str) -> Result<&mut ColumnFamily, StoreError> {
        let data = self
            .data
            .get_mut(cf)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf.to_string()))?;
        self.dirty.insert(cf.to_string());
        Ok(data)
    }
}

/// Savepoint for [`MemoryTransaction`]. Holds structurally shared maps, so
/// taking one costs a handful of pointer copies.
pub struct MemorySavepoint {
    snapshot: Snapshot,
}

pub struct MemoryTransaction<'a> {
    snapshot: RefCell<Option<Snapshot>>,
    store: &'a MemoryStore,
    read_only: bool,
    /// Held for the whole lifetime of a write transaction.
    _write_guard: Option<MutexGuard<'a, ()>>,
}

impl<'a> MemoryTransaction<'a> {
    pub(crate) fn new(
        store: &'a MemoryStore,
        data: HashMap<String, ColumnFamily>,
        write_guard: Option<MutexGuard<'a, ()>>,
        read_only: bool,
    ) -> Self {
        Self {
            snapshot: RefCell::new(Some(Snapshot {
                data,
                dirty: HashSet::new(),
            })),
            store,
            read_only,
            _write_guard: write_guard,
        }
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    fn with_cf<R>(
        &self,
        cf: &MemoryCf,
        f: impl FnOnce(&ColumnFamily) -> R,
    ) -> Result<R, StoreError> {
        let snap = self.snapshot.borrow();
        let snap = snap.as_ref().ok_or(StoreError::TransactionConsumed)?;
        Ok(f(snap.get_cf(&cf.name)?))
    }

    fn with_cf_mut<R>(
        &self,
        cf: &MemoryCf,
        f: impl FnOnce(&mut ColumnFamily) -> R,
    ) -> Result<R, StoreError> {
        self.check_writable()?;
        let mut snap = self.snapshot.borrow_mut();
        let snap = snap.as_mut().ok_or(StoreError::TransactionConsumed)?;
        Ok(f(snap.get_cf_mut(&cf.name)?))
    }
}

/// True when the bounds cannot contain any key.
fn is_empty_range(lower: &Bound<Vec<u8>>, upper: &Bound<Vec<u8>>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l > u,
        (Bound::Included(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u))
        | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
        _ => false,
    }
}

fn owned_bound(bound: Bound<&[u8]>) -> Bound<Vec<u8>> {
    match bound {
        Bound::Included(b) => Bound::Included(b.to_vec()),
        Bound::Excluded(b) => Bound::Excluded(b.to_vec()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

impl<'a> Transaction for MemoryTransaction<'a> {
    type Cf = MemoryCf;
    type Savepoint = MemorySavepoint;

    fn cf(&self, name: &str) -> Result<Self::Cf, StoreError> {
        let snap = self.snapshot.borrow();
        let snap = snap.as_ref().ok_or(StoreError::TransactionConsumed)?;
        snap.get_cf(name)?;
        Ok(MemoryCf {
            name: name.to_string(),
        })
    }

    fn get(&self, cf: &Self::Cf, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.with_cf(cf, |data| data.get(key).cloned())
    }

    fn scan_prefix<'b>(&'b self, cf: &Self::Cf, prefix: &[u8]) -> Result<KvIter<'b>, StoreError> {
        let start = prefix.to_vec();
        let entries: Vec<KvPair> = self.with_cf(cf, |data| {
            data.range(start.clone()..)
                .take_while(|(k, _)| k.starts_with(&start))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })?;
        Ok(Box::new(entries.into_iter().map(Ok)))
    }

    fn scan_range<'b>(
        &'b self,
        cf: &Self::Cf,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        reverse: bool,
    ) -> Result<KvIter<'b>, StoreError> {
        let lower = owned_bound(lower);
        let upper = owned_bound(upper);
        if is_empty_range(&lower, &upper) {
            return Ok(Box::new(std::iter::empty()));
        }
        let entries: Vec<KvPair> = self.with_cf(cf, |data| {
            let range = data.range((lower, upper));
            if reverse {
                range.rev().map(|(k, v)| (k.clone(), v.clone())).collect()
            } else {
                range.map(|(k, v)| (k.clone(), v.clone())).collect()
            }
        })?;
        Ok(Box::new(entries.into_iter().map(Ok)))
    }

    fn put(&self, cf: &Self::Cf, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.with_cf_mut(cf, |data| {
            data.insert(key.to_vec(), value.to_vec());
        })
    }

    fn put_batch(&self, cf: &Self::Cf, entries: &[(&[u8], &[u8])]) -> Result<(), StoreError> {
        self.with_cf_mut(cf, |data| {
            for (key, value) in entries {
                data.insert(key.to_vec(), value.to_vec());
            }
        })
    }

    fn delete(&self, cf: &Self::Cf, key: &[u8]) -> Result<(), StoreError> {
        self.with_cf_mut(cf, |data| {
            data.remove(key);
        })
    }

    fn delete_batch(&self, cf: &Self::Cf, keys: &[&[u8]]) -> Result<(), StoreError> {
        self.with_cf_mut(cf, |data| {
            for key in keys {
                data.remove(*key);
            }
        })
    }

    fn savepoint(&self) -> Result<Self::Savepoint, StoreError> {
        let snap = self.snapshot.borrow();
        let snap = snap.as_ref().ok_or(StoreError::TransactionConsumed)?;
        Ok(MemorySavepoint {
            snapshot: snap.clone(),
        })
    }

    fn rollback_to(&self, savepoint: Self::Savepoint) -> Result<(), StoreError> {
        let mut snap = self.snapshot.borrow_mut();
        let snap = snap.as_mut().ok_or(StoreError::TransactionConsumed)?;
        // Keep the dirty marks: a cf touched after the savepoint still has to
        // be republished with the restored contents.
        let dirty: HashSet<String> = snap.dirty.union(&savepoint.snapshot.dirty).cloned().collect();
        *snap = savepoint.snapshot;
        snap.dirty = dirty;
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        let snapshot = self
            .snapshot
            .into_inner()
            .ok_or(StoreError::TransactionConsumed)?;

        if self.read_only {
            return Err(StoreError::ReadOnly);
        }

        let dirty: HashMap<String, ColumnFamily> = snapshot
            .data
            .into_iter()
            .filter(|(name, _)| snapshot.dirty.contains(name))
            .collect();

        if dirty.is_empty() {
            return Ok(());
        }
        self.store.publish(dirty)
    }

    fn rollback(self) -> Result<(), StoreError> {
        if self.snapshot.into_inner().is_none() {
            return Err(StoreError::TransactionConsumed);
        }
        Ok(())
    }
}
