use std::collections::BTreeSet;

use serde_json::Value;

use crate::index::IndexSpec;
use crate::key::KeyPrefix;

/// Index key writes produced by one document change.
#[derive(Debug, Default, PartialEq)]
pub struct IndexChanges {
    /// Full index keys to insert. The entry value is the document id.
    pub puts: Vec<Vec<u8>>,
    pub deletes: Vec<Vec<u8>>,
}

impl IndexChanges {
    /// Diff the entries of `spec` between two versions of a document.
    ///
    /// Entries present in both versions are left alone, so an update that
    /// does not touch an index's fields produces no writes for it.
    pub fn diff(
        spec: &IndexSpec,
        collection: &str,
        id: &str,
        before: Option<&Value>,
        after: Option<&Value>,
    ) -> Self {
        let entries = |data: Option<&Value>| -> BTreeSet<Vec<u8>> {
            data.map(|d| spec.entries(id, d).into_iter().collect())
                .unwrap_or_default()
        };
        let old = entries(before);
        let new = entries(after);
        if old == new {
            return Self::default();
        }

        let prefix = KeyPrefix::Index(collection, &spec.name()).encode();
        let full = |suffix: &Vec<u8>| {
            let mut k = prefix.clone();
            k.extend_from_slice(suffix);
            k
        };
        IndexChanges {
            puts: new.difference(&old).map(full).collect(),
            deletes: old.difference(&new).map(full).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.deletes.is_empty()
    }

    pub fn extend(&mut self, other: IndexChanges) {
        self.puts.extend(other.puts);
        self.deletes.extend(other.deletes);
    }
}
