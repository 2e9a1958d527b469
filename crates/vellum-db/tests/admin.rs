mod common;
use common::*;

use serde_json::json;
use vellum_db::{Action, ActionContext, DbError};

#[test]
fn nonces_must_increase_by_one() {
    let t = temp_db();
    assert_eq!(t.read("nonce", json!([OWNER])), json!(0));

    let action = Action::from_parts("set", &[json!({"a": 1}), json!("x"), json!("1")]).unwrap();
    let ctx = ActionContext::new(OWNER, 2, "tx-skip", t.block());
    let r = t.db.execute(&ctx, &action).unwrap();
    assert!(matches!(r.error, Some(DbError::Nonce { expected: 1, got: 2 })));
    assert_eq!(t.get(json!(["x", "1"])), json!(null));

    assert!(t.exec(OWNER, "set", json!([{"a": 1}, "x", "1"])).success);
    assert_eq!(t.read("nonce", json!([OWNER])), json!(1));

    // Replays are rejected.
    let ctx = ActionContext::new(OWNER, 1, "tx-replay", t.block());
    let r = t.db.execute(&ctx, &action).unwrap();
    assert!(matches!(r.error, Some(DbError::Nonce { expected: 2, got: 1 })));
}

#[test]
fn failed_actions_keep_the_nonce() {
    let t = temp_db();
    let r = t.exec(BOB, "update", json!([{"a": 1}, "x", "1"]));
    assert!(!r.success);
    assert_eq!(t.read("nonce", json!([BOB])), json!(0));
    assert!(t.exec(BOB, "set", json!([{"a": 1}, "x", "1"])).success);
    assert_eq!(t.read("nonce", json!([BOB])), json!(1));
}

#[test]
fn hash_rolls_over_accepted_actions() {
    let a = temp_db();
    let b = temp_db();
    assert_eq!(a.read("hash", json!([])), json!(null));

    a.exec(OWNER, "set", json!([{"n": 1}, "x", "1"]));
    let h1 = a.read("hash", json!([]));
    assert!(h1.is_string());

    // A rejected action leaves the hash alone.
    a.exec(OWNER, "update", json!([{"n": 1}, "x", "missing"]));
    assert_eq!(a.read("hash", json!([])), h1);

    a.exec(OWNER, "set", json!([{"n": 2}, "x", "2"]));
    let h2 = a.read("hash", json!([]));
    assert_ne!(h2, h1);

    // Same accepted transactions, same hash.
    b.exec(OWNER, "set", json!([{"n": 1}, "x", "1"]));
    b.exec(OWNER, "update", json!([{"n": 1}, "x", "missing"]));
    b.exec(OWNER, "set", json!([{"n": 2}, "x", "2"]));
    assert_eq!(b.read("hash", json!([])), h2);
    assert_eq!(a.get(json!(["x"])), b.get(json!(["x"])));
}

#[test]
fn generated_ids_are_deterministic() {
    let a = temp_db();
    let b = temp_db();
    let ra = a.exec(OWNER, "batch", json!([["add", {"n": 1}, "x"], ["add", {"n": 2}, "x"]]));
    let rb = b.exec(OWNER, "batch", json!([["add", {"n": 1}, "x"], ["add", {"n": 2}, "x"]]));
    assert_eq!(ra.ids, rb.ids);
    assert_eq!(ra.ids.len(), 2);
    assert_ne!(ra.ids[0], ra.ids[1]);
    assert_eq!(a.read("ids", json!([a.last_tx()])), json!(ra.ids));
    assert_eq!(a.read("ids", json!(["tx-unknown"])), json!([]));
}

#[test]
fn only_owners_administer() {
    let t = temp_db();
    let r = t.exec(BOB, "setRules", json!([{"allow write": true}, "ppl"]));
    assert!(matches!(r.error, Some(DbError::PermissionDenied(_))));

    t.admin("addOwner", json!([ALICE]));
    assert_eq!(t.read("getOwner", json!([])), json!([OWNER, ALICE]));
    assert!(t.exec(ALICE, "setRules", json!([{"allow write": true}, "ppl"])).success);

    let r = t.exec(OWNER, "addOwner", json!([ALICE]));
    assert!(matches!(r.error, Some(DbError::Validation(_))));
    t.admin("removeOwner", json!([ALICE]));
    let r = t.exec(ALICE, "setSecure", json!([true]));
    assert!(matches!(r.error, Some(DbError::PermissionDenied(_))));
    let r = t.exec(OWNER, "removeOwner", json!([ALICE]));
    assert!(matches!(r.error, Some(DbError::NotFound(_))));
}

#[test]
fn batch_runs_admin_actions() {
    let t = temp_db();
    let schema = json!({"type": "object", "required": ["name"], "properties": {"name": {"type": "string"}}});
    let rules = json!({"allow create,update": {"<": [{"var": "resource.newData.age"}, 30]}});
    let index = json!([["age", "desc"], ["name", "desc"]]);
    let job = json!({"relayers": ["0xrelayer"], "signers": ["0xa", "0xb"], "multisig": 50, "multisigType": "percent"});
    let cron = json!({"span": 2, "times": 2, "start": 10_000_000_000i64, "version": 2, "jobs": [["add()", [{"age": 1}, "ppl"]]]});
    let trigger = json!({
        "key": "inc-count",
        "on": "create",
        "version": 2,
        "func": [["upsert()", [{"count": {"__op": "inc"}}, "like-count", {"var": "data.id"}]]]
    });

    let r = t.exec(
        OWNER,
        "batch",
        json!([
            ["addCron", cron, "inc age"],
            ["setSchema", schema, "ppl"],
            ["setRules", rules, "ppl"],
            ["setCanEvolve", false],
            ["setSecure", true],
            ["setAlgorithms", ["secp256k1", "rsa256"]],
            ["addIndex", index, "ppl"],
            ["addOwner", ALICE],
            ["addRelayerJob", "test-job", job],
            ["addTrigger", trigger, "ppl"]
        ]),
    );
    assert!(r.success, "{:?}", r.error);
    assert!(r.items.iter().all(Result::is_ok), "{:?}", r.items);

    assert_eq!(t.read("getSchema", json!(["ppl"])), schema);
    assert_eq!(t.read("getRules", json!(["ppl"])), rules);
    assert_eq!(t.read("getEvolve", json!([]))["canEvolve"], json!(false));
    assert_eq!(t.read("getInfo", json!([]))["secure"], json!(true));
    assert_eq!(t.read("getAlgorithms", json!([])), json!(["secp256k1", "rsa256"]));
    assert!(t.read("getIndexes", json!(["ppl"])).as_array().unwrap().contains(&index));
    assert_eq!(t.read("getOwner", json!([])), json!([OWNER, ALICE]));
    assert_eq!(t.read("getRelayerJob", json!(["test-job"]))["signers"], json!(["0xa", "0xb"]));
    assert_eq!(t.read("getCrons", json!([]))["inc age"]["version"], json!(2));
    assert_eq!(t.read("getTriggers", json!(["ppl"]))[0]["key"], json!("inc-count"));

    t.admin(
        "batch",
        json!([
            ["removeCron", "inc age"],
            ["removeOwner", ALICE],
            ["removeIndex", index, "ppl"],
            ["removeRelayerJob", "test-job"]
        ]),
    );
    assert_eq!(t.read("getCrons", json!([])), json!({}));
    assert_eq!(t.read("getOwner", json!([])), json!([OWNER]));
    assert!(!t.read("getIndexes", json!(["ppl"])).as_array().unwrap().contains(&index));
    assert_eq!(t.read("getRelayerJob", json!(["test-job"])), json!(null));
}

#[test]
fn batched_admin_actions_still_need_an_owner() {
    let t = temp_db();
    let r = t.exec(
        BOB,
        "batch",
        json!([
            ["set", {"name": "Bob"}, "ppl", "Bob"],
            ["addOwner", BOB],
            ["setSecure", true]
        ]),
    );
    assert!(r.success);
    assert!(r.items[0].is_ok());
    assert!(matches!(r.items[1], Err(DbError::PermissionDenied(_))));
    assert!(matches!(r.items[2], Err(DbError::PermissionDenied(_))));
    assert_eq!(t.read("getOwner", json!([])), json!([OWNER]));
    assert_eq!(t.read("getInfo", json!([]))["secure"], json!(false));
    assert_eq!(t.get(json!(["ppl", "Bob"])), json!({"name": "Bob"}));
}

#[test]
fn contract_info() {
    let t = temp_db();
    t.admin("setAlgorithms", json!([["secp256k1", "ed25519"]]));
    assert_eq!(t.read("getAlgorithms", json!([])), json!(["secp256k1", "ed25519"]));

    let info = t.read("getInfo", json!([]));
    assert_eq!(info["contractId"], json!("vellum-test"));
    assert_eq!(info["version"], json!("0.1.0"));
    assert_eq!(info["owners"], json!([OWNER]));
    assert_eq!(info["secure"], json!(false));
    assert_eq!(info["isEvolving"], json!(false));
    assert_eq!(t.read("version", json!([])), json!("0.1.0"));
}

#[test]
fn evolve_then_migrate() {
    let t = temp_db();
    t.admin("evolve", json!(["src-tx-1"]));
    assert_eq!(t.read("getEvolve", json!([]))["isEvolving"], json!(true));

    let r = t.exec(OWNER, "set", json!([{"a": 1}, "x", "1"]));
    assert!(matches!(r.error, Some(DbError::Evolving)));

    let r = t.exec(BOB, "migrate", json!(["0.2.0"]));
    assert!(matches!(r.error, Some(DbError::PermissionDenied(_))));
    t.admin("migrate", json!(["0.2.0"]));
    assert_eq!(t.read("version", json!([])), json!("0.2.0"));

    let evolve = t.read("getEvolve", json!([]));
    assert_eq!(evolve["isEvolving"], json!(false));
    assert_eq!(
        evolve["history"],
        json!([{"signer": OWNER, "srcTxId": "src-tx-1", "oldVersion": "0.1.0", "newVersion": "0.2.0"}])
    );
    assert!(t.exec(OWNER, "set", json!([{"a": 1}, "x", "1"])).success);

    let r = t.exec(OWNER, "migrate", json!(["0.3.0"]));
    assert!(matches!(r.error, Some(DbError::Validation(_))));
    t.admin("setCanEvolve", json!([false]));
    let r = t.exec(OWNER, "evolve", json!(["src-tx-2"]));
    assert!(matches!(r.error, Some(DbError::PermissionDenied(_))));
}

#[test]
fn linked_contracts() {
    let t = temp_db();
    t.admin("linkContract", json!(["token", "0xtoken"]));
    assert_eq!(t.read("getLinkedContract", json!(["token"])), json!("0xtoken"));
    t.admin("unlinkContract", json!(["token"]));
    assert_eq!(t.read("getLinkedContract", json!(["token"])), json!(null));
    let r = t.exec(OWNER, "unlinkContract", json!(["token"]));
    assert!(matches!(r.error, Some(DbError::NotFound(_))));
}

const RELAYER: &str = "0xrelayer";
const USER: &str = "0xuser";

fn relay_setup(t: &TestDb) {
    t.admin(
        "addRelayerJob",
        json!([
            "j1",
            {
                "relayers": [RELAYER],
                "signers": ["0xa", "0xb", "0xc"],
                "multisig": 50,
                "multisigType": "percent",
                "schema": {"type": "object", "required": ["tag"]}
            }
        ]),
    );
    t.admin(
        "setRules",
        json!([
            {"allow write": {"==": [{"var": "request.auth.jobID"}, "j1"]}},
            "notes"
        ]),
    );
}

fn relayed_set(id: &str) -> serde_json::Value {
    json!({"function": "set", "query": [{"by": "relay"}, "notes", id], "signer": USER})
}

#[test]
fn relayed_actions_run_as_the_inner_signer() {
    let t = temp_db();
    relay_setup(&t);
    assert_eq!(t.read("listRelayerJobs", json!([])), json!(["j1"]));
    assert_eq!(t.read("getRelayerJob", json!(["j1"]))["multisigType"], json!("percent"));

    let r = t.exec(USER, "set", json!([{"by": "user"}, "notes", "direct"]));
    assert!(matches!(r.error, Some(DbError::RuleDenied(_))));

    let r = t.exec(
        RELAYER,
        "relay",
        json!(["j1", relayed_set("n1"), {"tag": "t"}, ["0xa", "0xb"]]),
    );
    assert!(r.success, "{:?}", r.error);
    assert_eq!(t.cget(json!(["notes", "n1"]))["setter"], json!(USER));
}

#[test]
fn relay_checks_the_job() {
    let t = temp_db();
    relay_setup(&t);

    let r = t.exec(RELAYER, "relay", json!(["j1", relayed_set("n1"), {"tag": "t"}, ["0xa", "0xz"]]));
    assert!(matches!(r.error, Some(DbError::PermissionDenied(_))));
    let r = t.exec(BOB, "relay", json!(["j1", relayed_set("n1"), {"tag": "t"}, ["0xa", "0xb"]]));
    assert!(matches!(r.error, Some(DbError::PermissionDenied(_))));
    let r = t.exec(RELAYER, "relay", json!(["j1", relayed_set("n1"), {}, ["0xa", "0xb"]]));
    assert!(matches!(r.error, Some(DbError::Validation(_))));
    let r = t.exec(RELAYER, "relay", json!(["j9", relayed_set("n1"), {"tag": "t"}, ["0xa", "0xb"]]));
    assert!(matches!(r.error, Some(DbError::NotFound(_))));
    assert_eq!(t.get(json!(["notes", "n1"])), json!(null));

    t.admin("removeRelayerJob", json!(["j1"]));
    assert_eq!(t.read("getRelayerJob", json!(["j1"])), json!(null));
}

#[test]
fn bundles_carry_their_own_signers() {
    let t = temp_db();
    let r = t.exec(
        OWNER,
        "bundle",
        json!([
            {"function": "set", "query": [{"a": 1}, "things", "x"], "signer": ALICE, "nonce": 1},
            {"function": "set", "query": [{"a": 2}, "things", "y"], "signer": BOB, "nonce": 5},
            {"function": "set", "query": [{"a": 3}, "things", "z"], "signer": BOB, "nonce": 1}
        ]),
    );
    assert!(r.success);
    assert!(r.items[0].is_ok());
    assert!(matches!(r.items[1], Err(DbError::Nonce { expected: 1, got: 5 })));
    assert!(r.items[2].is_ok());

    assert_eq!(t.cget(json!(["things", "x"]))["setter"], json!(ALICE));
    assert_eq!(t.cget(json!(["things", "z"]))["setter"], json!(BOB));
    assert_eq!(t.get(json!(["things", "y"])), json!(null));
    assert_eq!(t.read("nonce", json!([ALICE])), json!(1));
    assert_eq!(t.read("nonce", json!([BOB])), json!(1));
    assert_eq!(t.read("nonce", json!([OWNER])), json!(1));
}

#[test]
fn bundlers_gate_document_writes() {
    let t = temp_db();
    t.admin("setBundlers", json!([[ALICE]]));
    assert_eq!(t.read("getBundlers", json!([])), json!([ALICE]));

    let item = |signer: &str, nonce: u64, id: &str| {
        json!({"function": "set", "query": [{"by": signer}, "ppl", id], "signer": signer, "nonce": nonce})
    };
    let r = t.exec(ALICE, "bundle", json!([item(BOB, 1, "b1"), item(BOB, 9, "b2")]));
    assert!(r.success, "{:?}", r.error);
    assert_eq!(r.validity(), [true, false]);
    assert_eq!(r.errors()[0], None);
    assert!(r.errors()[1].as_deref().unwrap().contains("nonce"));
    assert_eq!(t.get(json!(["ppl", "b1"])), json!({"by": BOB}));

    // Direct writes are refused, admin actions still go through.
    let r = t.exec(OWNER, "add", json!([{}, "ppl"]));
    assert!(matches!(r.error, Some(DbError::PermissionDenied(_))));
    t.admin("setBundlers", json!([["0xabc"]]));

    let r = t.exec(ALICE, "bundle", json!([item(BOB, 2, "b3")]));
    assert!(matches!(r.error, Some(DbError::PermissionDenied(_))));
    assert_eq!(t.get(json!(["ppl", "b3"])), json!(null));

    t.admin("setBundlers", json!([[]]));
    assert!(t.exec(OWNER, "add", json!([{}, "ppl"])).success);
}

#[test]
fn transactions_commit_or_roll_back_together() {
    let t = temp_db();
    let set = |id: &str| Action::from_parts("set", &[json!({"n": 1}), json!("x"), json!(id)]).unwrap();

    let txn = t.db.begin(false).unwrap();
    txn.execute(&t.ctx(OWNER), &set("a")).unwrap();
    txn.rollback().unwrap();
    assert_eq!(t.get(json!(["x", "a"])), json!(null));

    let txn = t.db.begin(false).unwrap();
    let r = txn.execute(&t.ctx(OWNER), &set("a")).unwrap();
    assert!(r.success);
    let r = txn
        .execute(&ActionContext::new(OWNER, 2, "tx-b", t.block()), &set("b"))
        .unwrap();
    assert!(r.success);
    assert_eq!(t.get(json!(["x", "a"])), json!(null));
    txn.commit().unwrap();
    assert_eq!(t.get(json!(["x", "b"])), json!({"n": 1}));
    assert_eq!(t.read("nonce", json!([OWNER])), json!(2));
}

#[test]
fn wire_format() {
    let t = temp_db();
    let ctx = t.ctx(OWNER);
    let r = t
        .db
        .execute_json(&ctx, &json!({"function": "set", "query": [{"n": 1}, "x", "a"]}))
        .unwrap();
    assert!(r.success);
    assert_eq!(
        t.db.read_json(&json!({"function": "get", "query": ["x", "a"]})).unwrap(),
        json!({"n": 1})
    );
    assert!(t.db.read_json(&json!({"function": "nope"})).is_err());
    assert!(t.db.read_json(&json!({"query": []})).is_err());
}
