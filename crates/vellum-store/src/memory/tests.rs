use std::ops::Bound;

use crate::{MemoryStore, Store, StoreError, Transaction};

const CF: &str = "test";

fn store() -> MemoryStore {
    let store = MemoryStore::new();
    store.create_cf(CF).unwrap();
    store
}

fn keys(iter: crate::KvIter<'_>) -> Vec<Vec<u8>> {
    iter.map(|r| r.unwrap().0).collect()
}

#[test]
fn put_then_get_within_transaction() {
    let store = store();
    let txn = store.begin(false).unwrap();
    let cf = txn.cf(CF).unwrap();
    txn.put(&cf, b"a", b"1").unwrap();
    assert_eq!(txn.get(&cf, b"a").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn commit_publishes_writes() {
    let store = store();
    let txn = store.begin(false).unwrap();
    let cf = txn.cf(CF).unwrap();
    txn.put(&cf, b"a", b"1").unwrap();
    txn.commit().unwrap();

    let txn = store.begin(true).unwrap();
    let cf = txn.cf(CF).unwrap();
    assert_eq!(txn.get(&cf, b"a").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn rollback_discards_writes() {
    let store = store();
    let txn = store.begin(false).unwrap();
    let cf = txn.cf(CF).unwrap();
    txn.put(&cf, b"a", b"1").unwrap();
    txn.rollback().unwrap();

    let txn = store.begin(true).unwrap();
    let cf = txn.cf(CF).unwrap();
    assert_eq!(txn.get(&cf, b"a").unwrap(), None);
}

#[test]
fn read_only_rejects_writes() {
    let store = store();
    let txn = store.begin(true).unwrap();
    let cf = txn.cf(CF).unwrap();
    assert!(matches!(txn.put(&cf, b"a", b"1"), Err(StoreError::ReadOnly)));
}

#[test]
fn unknown_cf_errors() {
    let store = store();
    let txn = store.begin(true).unwrap();
    assert!(matches!(
        txn.cf("missing"),
        Err(StoreError::ColumnFamilyNotFound(_))
    ));
}

#[test]
fn scan_prefix_stops_at_prefix_end() {
    let store = store();
    let txn = store.begin(false).unwrap();
    let cf = txn.cf(CF).unwrap();
    for k in [&b"a1"[..], b"a2", b"b1"] {
        txn.put(&cf, k, b"").unwrap();
    }
    let found = keys(txn.scan_prefix(&cf, b"a").unwrap());
    assert_eq!(found, vec![b"a1".to_vec(), b"a2".to_vec()]);
}

#[test]
fn scan_range_forward_and_reverse() {
    let store = store();
    let txn = store.begin(false).unwrap();
    let cf = txn.cf(CF).unwrap();
    for k in [&b"a"[..], b"b", b"c", b"d"] {
        txn.put(&cf, k, b"").unwrap();
    }

    let fwd = keys(
        txn.scan_range(&cf, Bound::Excluded(b"a"), Bound::Included(b"c"), false)
            .unwrap(),
    );
    assert_eq!(fwd, vec![b"b".to_vec(), b"c".to_vec()]);

    let rev = keys(
        txn.scan_range(&cf, Bound::Unbounded, Bound::Excluded(b"d"), true)
            .unwrap(),
    );
    assert_eq!(rev, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
}

#[test]
fn inverted_range_is_empty() {
    let store = store();
    let txn = store.begin(false).unwrap();
    let cf = txn.cf(CF).unwrap();
    txn.put(&cf, b"m", b"").unwrap();
    let found = keys(
        txn.scan_range(&cf, Bound::Included(b"z"), Bound::Included(b"a"), false)
            .unwrap(),
    );
    assert!(found.is_empty());
}

#[test]
fn rollback_to_savepoint_keeps_earlier_writes() {
    let store = store();
    let txn = store.begin(false).unwrap();
    let cf = txn.cf(CF).unwrap();
    txn.put(&cf, b"keep", b"1").unwrap();
    let sp = txn.savepoint().unwrap();
    txn.put(&cf, b"drop", b"2").unwrap();
    txn.delete(&cf, b"keep").unwrap();
    txn.rollback_to(sp).unwrap();

    assert_eq!(txn.get(&cf, b"keep").unwrap(), Some(b"1".to_vec()));
    assert_eq!(txn.get(&cf, b"drop").unwrap(), None);
    txn.commit().unwrap();

    let txn = store.begin(true).unwrap();
    let cf = txn.cf(CF).unwrap();
    assert_eq!(txn.get(&cf, b"keep").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn reader_snapshot_is_isolated_from_later_commits() {
    let store = store();
    let reader = store.begin(true).unwrap();
    let cf = reader.cf(CF).unwrap();

    let writer = store.begin(false).unwrap();
    let wcf = writer.cf(CF).unwrap();
    writer.put(&wcf, b"a", b"1").unwrap();
    writer.commit().unwrap();

    assert_eq!(reader.get(&cf, b"a").unwrap(), None);
}
