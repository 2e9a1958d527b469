use std::ops::Bound;

use serde_json::{Value, json};
use vellum_store::MemoryStore;

use super::*;

fn engine() -> KvEngine<MemoryStore> {
    KvEngine::new(MemoryStore::new()).unwrap()
}

fn ppl() -> CollectionPath {
    CollectionPath::parse("ppl").unwrap()
}

fn doc(id: &str) -> DocPath {
    ppl().doc(id).unwrap()
}

fn ids(iter: IndexIter<'_>) -> Vec<String> {
    iter.map(|r| r.unwrap().id).collect()
}

fn seed<S: Store>(txn: &KvTransaction<'_, S>) {
    let people = [
        ("Bob", json!({"name": "Bob", "age": 20, "letters": ["b", "o"]})),
        ("Alice", json!({"name": "Alice", "age": 30, "letters": ["a", "l", "i", "c", "e"]})),
        ("John", json!({"name": "John", "age": 40, "letters": ["j", "o", "h", "n"]})),
        ("Beth", json!({"name": "Beth", "age": 30, "letters": ["b", "e", "t", "h"]})),
    ];
    for (id, data) in people {
        txn.put(&doc(id), data, "0xabc", 1).unwrap();
    }
}

#[test]
fn put_get_delete() {
    let engine = engine();
    let txn = engine.begin(false).unwrap();
    let out = txn.put(&doc("Bob"), json!({"age": 20}), "0xabc", 5).unwrap();
    assert!(out.before.is_none());
    assert!(out.changed());

    let out = txn.put(&doc("Bob"), json!({"age": 21}), "0xdef", 9).unwrap();
    let after = out.after.unwrap();
    assert_eq!(after.created, 5);
    assert_eq!(after.updated, 9);
    assert_eq!(after.setter, "0xdef");

    let out = txn.delete(&doc("Bob")).unwrap();
    assert_eq!(out.before.unwrap().data, json!({"age": 21}));
    assert!(txn.get(&doc("Bob")).unwrap().is_none());

    let out = txn.delete(&doc("Bob")).unwrap();
    assert!(out.before.is_none());
    assert!(!out.changed());
}

#[test]
fn rejects_non_object_data() {
    let engine = engine();
    let txn = engine.begin(false).unwrap();
    let err = txn.put(&doc("Bob"), json!([1]), "0xabc", 1).unwrap_err();
    assert!(matches!(err, EngineError::InvalidDocument(_)));
}

#[test]
fn rejects_unstorable_numbers_before_writing() {
    let engine = engine();
    let txn = engine.begin(false).unwrap();
    let err = txn
        .put(&doc("Bob"), json!({"n": u64::MAX}), "0xabc", 1)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidDocument(_)));
    assert!(txn.get(&doc("Bob")).unwrap().is_none());
    assert!(txn.collection_meta(&ppl()).unwrap().is_none());
}

#[test]
fn first_write_registers_id_and_field_indexes() {
    let engine = engine();
    let txn = engine.begin(false).unwrap();
    txn.put(
        &doc("Bob"),
        json!({"name": "Bob", "age": 20, "letters": ["b"], "home": {"city": "x"}}),
        "0xabc",
        1,
    )
    .unwrap();

    let meta = txn.collection_meta(&ppl()).unwrap().unwrap();
    let names: Vec<String> = meta.indexes.iter().map(IndexSpec::name).collect();
    assert_eq!(
        names,
        ["__id__:asc", "age:asc", "letters:array", "name:asc"]
    );
}

#[test]
fn id_index_scans_records_in_id_order() {
    let engine = engine();
    let txn = engine.begin(false).unwrap();
    seed(&txn);
    let id = IndexSpec::id();
    let got = ids(
        txn.scan_index(&ppl(), &id, Bound::Unbounded, Bound::Unbounded, false)
            .unwrap(),
    );
    assert_eq!(got, ["Alice", "Beth", "Bob", "John"]);
    let got = ids(
        txn.scan_index(&ppl(), &id, Bound::Unbounded, Bound::Unbounded, true)
            .unwrap(),
    );
    assert_eq!(got, ["John", "Bob", "Beth", "Alice"]);
}

#[test]
fn field_index_breaks_ties_by_id() {
    let engine = engine();
    let txn = engine.begin(false).unwrap();
    seed(&txn);
    let age = IndexSpec::single("age", IndexKind::Asc);
    let got = ids(
        txn.scan_index(&ppl(), &age, Bound::Unbounded, Bound::Unbounded, false)
            .unwrap(),
    );
    assert_eq!(got, ["Bob", "Alice", "Beth", "John"]);
}

#[test]
fn array_index_fans_out() {
    let engine = engine();
    let txn = engine.begin(false).unwrap();
    seed(&txn);
    let letters = IndexSpec::single("letters", IndexKind::Array);

    let mut lo = Vec::new();
    crate::encoding::value::encode_component(
        &json!("o"),
        vellum_query::SortDirection::Asc,
        &mut lo,
    );
    let hi = prefix_successor(&lo).unwrap();
    let got = ids(
        txn.scan_index(
            &ppl(),
            &letters,
            Bound::Included(&lo[..]),
            Bound::Excluded(&hi[..]),
            false,
        )
        .unwrap(),
    );
    assert_eq!(got, ["Bob", "John"]);
}

#[test]
fn add_index_backfills_and_is_idempotent() {
    let engine = engine();
    let txn = engine.begin(false).unwrap();
    seed(&txn);
    let spec = IndexSpec::parse(&json!([["age", "desc"], ["name", "asc"]])).unwrap();
    assert!(txn.add_index(&ppl(), spec.clone()).unwrap());

    let same = IndexSpec::parse(&json!([["name", "desc"], ["age", "asc"]])).unwrap();
    assert!(!txn.add_index(&ppl(), same).unwrap());

    let got = ids(
        txn.scan_index(&ppl(), &spec, Bound::Unbounded, Bound::Unbounded, false)
            .unwrap(),
    );
    assert_eq!(got, ["John", "Alice", "Beth", "Bob"]);
}

#[test]
fn index_follows_updates() {
    let engine = engine();
    let txn = engine.begin(false).unwrap();
    seed(&txn);
    txn.put(&doc("Bob"), json!({"name": "Bob", "age": 50}), "0xabc", 2)
        .unwrap();
    txn.delete(&doc("John")).unwrap();

    let age = IndexSpec::single("age", IndexKind::Asc);
    let got = ids(
        txn.scan_index(&ppl(), &age, Bound::Unbounded, Bound::Unbounded, false)
            .unwrap(),
    );
    assert_eq!(got, ["Alice", "Beth", "Bob"]);

    let letters = IndexSpec::single("letters", IndexKind::Array);
    let got = ids(
        txn.scan_index(&ppl(), &letters, Bound::Unbounded, Bound::Unbounded, false)
            .unwrap(),
    );
    assert!(!got.contains(&"Bob".to_string()));
    assert!(!got.contains(&"John".to_string()));
}

#[test]
fn remove_index_drops_entries() {
    let engine = engine();
    let txn = engine.begin(false).unwrap();
    seed(&txn);
    let age = IndexSpec::single("age", IndexKind::Asc);
    assert!(txn.remove_index(&ppl(), &age).unwrap());
    assert!(!txn.remove_index(&ppl(), &age).unwrap());
    let got = ids(
        txn.scan_index(&ppl(), &age, Bound::Unbounded, Bound::Unbounded, false)
            .unwrap(),
    );
    assert!(got.is_empty());
    assert!(txn.remove_index(&ppl(), &IndexSpec::id()).is_err());
}

#[test]
fn lists_collections_by_parent() {
    let engine = engine();
    let txn = engine.begin(false).unwrap();
    seed(&txn);
    let foods = doc("Bob").child("foods").unwrap();
    txn.put(&foods.doc("apple").unwrap(), json!({"n": 1}), "0xabc", 1)
        .unwrap();
    let other = CollectionPath::parse("animals").unwrap();
    txn.put(&other.doc("cat").unwrap(), json!({"n": 1}), "0xabc", 1)
        .unwrap();

    assert_eq!(txn.list_collections(None).unwrap(), ["animals", "ppl"]);
    assert_eq!(txn.list_collections(Some(&doc("Bob"))).unwrap(), ["foods"]);
    assert!(txn.list_collections(Some(&doc("Alice"))).unwrap().is_empty());
}

#[test]
fn globals_round_trip() {
    let engine = engine();
    let txn = engine.begin(false).unwrap();
    txn.put_global("nonce", "0xabc", &3u64).unwrap();
    txn.put_global("nonce", "0xdef", &7u64).unwrap();
    txn.put_global("cfg", "owners", &vec!["0xabc".to_string()]).unwrap();

    assert_eq!(txn.get_global::<u64>("nonce", "0xabc").unwrap(), Some(3));
    let all: Vec<(String, u64)> = txn.scan_globals("nonce").unwrap();
    assert_eq!(all, [("0xabc".to_string(), 3), ("0xdef".to_string(), 7)]);

    txn.delete_global("nonce", "0xabc").unwrap();
    assert_eq!(txn.get_global::<u64>("nonce", "0xabc").unwrap(), None);
    let owners: Option<Vec<String>> = txn.get_global("cfg", "owners").unwrap();
    assert_eq!(owners.unwrap(), ["0xabc"]);
    let json: Option<Value> = txn.get_global("cfg", "missing").unwrap();
    assert!(json.is_none());
}

#[test]
fn savepoint_restores_records_and_indexes() {
    let engine = engine();
    let txn = engine.begin(false).unwrap();
    seed(&txn);
    let sp = txn.savepoint().unwrap();
    txn.put(&doc("Zed"), json!({"age": 1}), "0xabc", 2).unwrap();
    txn.rollback_to(sp).unwrap();

    assert!(txn.get(&doc("Zed")).unwrap().is_none());
    let age = IndexSpec::single("age", IndexKind::Asc);
    let got = ids(
        txn.scan_index(&ppl(), &age, Bound::Unbounded, Bound::Unbounded, false)
            .unwrap(),
    );
    assert_eq!(got.len(), 4);
}

#[test]
fn commit_is_visible_to_new_readers() {
    let engine = engine();
    let txn = engine.begin(false).unwrap();
    seed(&txn);
    txn.commit().unwrap();

    let txn = engine.begin(true).unwrap();
    assert_eq!(txn.scan_records(&ppl()).unwrap().len(), 4);
    txn.rollback().unwrap();

    let txn = engine.begin(false).unwrap();
    txn.delete(&doc("Bob")).unwrap();
    txn.rollback().unwrap();
    let txn = engine.begin(true).unwrap();
    assert!(txn.get(&doc("Bob")).unwrap().is_some());
}
