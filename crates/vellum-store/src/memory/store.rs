use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use arc_swap::ArcSwap;
use imbl::OrdMap;

use crate::error::StoreError;
use crate::store::Store;

use super::transaction::MemoryTransaction;

pub(crate) type ColumnFamily = OrdMap<Vec<u8>, Vec<u8>>;

/// In-memory store. Each column family is a persistent ordered map published
/// through an `ArcSwap`, so snapshots are O(1) and commits are a pointer swap.
pub struct MemoryStore {
    cfs: RwLock<HashMap<String, Arc<ArcSwap<ColumnFamily>>>>,
    write_lock: Mutex<()>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            cfs: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    fn read_cfs(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Arc<ArcSwap<ColumnFamily>>>>, StoreError>
    {
        self.cfs
            .read()
            .map_err(|e| StoreError::Storage(format!("cf registry poisoned: {e}")))
    }

    /// Snapshot all column families. Cheap due to structural sharing.
    pub(crate) fn snapshot_cfs(&self) -> Result<HashMap<String, ColumnFamily>, StoreError> {
        let cfs = self.read_cfs()?;
        Ok(cfs
            .iter()
            .map(|(name, arc)| (name.clone(), (**arc.load()).clone()))
            .collect())
    }

    /// Publish the given column families as the new committed state.
    pub(crate) fn publish(&self, dirty: HashMap<String, ColumnFamily>) -> Result<(), StoreError> {
        let cfs = self.read_cfs()?;
        for (name, data) in dirty {
            match cfs.get(&name) {
                Some(arc) => arc.store(Arc::new(data)),
                None => return Err(StoreError::ColumnFamilyNotFound(name)),
            }
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    type Txn<'a> = MemoryTransaction<'a>;

    fn begin(&self, read_only: bool) -> Result<Self::Txn<'_>, StoreError> {
        let write_guard = if read_only {
            None
        } else {
            Some(
                self.write_lock
                    .lock()
                    .map_err(|e| StoreError::Storage(format!("write lock poisoned: {e}")))?,
            )
        };

        let snapshot = self.snapshot_cfs()?;
        Ok(MemoryTransaction::new(self, snapshot, write_guard, read_only))
    }

    fn create_cf(&self, name: &str) -> Result<(), StoreError> {
        let mut cfs = self
            .cfs
            .write()
            .map_err(|e| StoreError::Storage(format!("cf registry poisoned: {e}")))?;
        cfs.entry(name.to_string())
            .or_insert_with(|| Arc::new(ArcSwap::new(Arc::new(OrdMap::new()))));
        Ok(())
    }

    fn drop_cf(&self, name: &str) -> Result<(), StoreError> {
        let mut cfs = self
            .cfs
            .write()
            .map_err(|e| StoreError::Storage(format!("cf registry poisoned: {e}")))?;
        cfs.remove(name);
        Ok(())
    }
}
