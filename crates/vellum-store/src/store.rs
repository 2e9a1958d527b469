use std::ops::Bound;

use crate::error::StoreError;

/// A key/value pair yielded by scans.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Ordered iterator over scan results.
pub type KvIter<'a> = Box<dyn Iterator<Item = Result<KvPair, StoreError>> + 'a>;

pub trait Store {
    type Txn<'a>: Transaction
    where
        Self: 'a;

    /// Start a transaction. Write transactions are serialized; readers
    /// observe the last committed snapshot.
    fn begin(&self, read_only: bool) -> Result<Self::Txn<'_>, StoreError>;
    fn create_cf(&self, name: &str) -> Result<(), StoreError>;
    fn drop_cf(&self, name: &str) -> Result<(), StoreError>;
}

pub trait Transaction {
    /// Backend-specific column family handle. Must be cheap to clone.
    type Cf: Clone;

    /// Opaque copy of the transaction's uncommitted state.
    type Savepoint;

    /// Resolve a column family by name.
    fn cf(&self, name: &str) -> Result<Self::Cf, StoreError>;

    // Reads
    fn get(&self, cf: &Self::Cf, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
    fn scan_prefix<'a>(&'a self, cf: &Self::Cf, prefix: &[u8]) -> Result<KvIter<'a>, StoreError>;

    /// Scan keys within `(lower, upper)` in ascending order, or descending
    /// when `reverse` is set.
    fn scan_range<'a>(
        &'a self,
        cf: &Self::Cf,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        reverse: bool,
    ) -> Result<KvIter<'a>, StoreError>;

    // Writes
    fn put(&self, cf: &Self::Cf, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
    fn put_batch(&self, cf: &Self::Cf, entries: &[(&[u8], &[u8])]) -> Result<(), StoreError>;
    fn delete(&self, cf: &Self::Cf, key: &[u8]) -> Result<(), StoreError>;
    fn delete_batch(&self, cf: &Self::Cf, keys: &[&[u8]]) -> Result<(), StoreError>;

    // Savepoints
    fn savepoint(&self) -> Result<Self::Savepoint, StoreError>;
    /// Discard every write made since `savepoint` was taken.
    fn rollback_to(&self, savepoint: Self::Savepoint) -> Result<(), StoreError>;

    // Lifecycle
    fn commit(self) -> Result<(), StoreError>;
    fn rollback(self) -> Result<(), StoreError>;
}
