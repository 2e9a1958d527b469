#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Once;

use serde_json::{Value, json};
use vellum_db::{Action, ActionContext, Block, Database, DatabaseConfig, Read, Receipt};
use vellum_store::MemoryStore;

pub const OWNER: &str = "0xowner";
pub const ALICE: &str = "0xalice";
pub const BOB: &str = "0xbob";

static TRACING: Once = Once::new();

/// Route `tracing` output to the test harness.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// An in-memory database plus the bookkeeping a host would do: per-signer
/// nonces, transaction ids and the current block.
pub struct TestDb {
    pub db: Database<MemoryStore>,
    nonces: RefCell<HashMap<String, u64>>,
    txs: Cell<u64>,
    last_tx: RefCell<String>,
    block: Cell<Block>,
}

pub fn temp_db() -> TestDb {
    temp_db_with(DatabaseConfig::default())
}

pub fn temp_db_with(config: DatabaseConfig) -> TestDb {
    init_tracing();
    let config = DatabaseConfig {
        contract_id: "vellum-test".to_string(),
        ..config
    }
    .with_owner(OWNER);
    let db = Database::open(MemoryStore::new(), config).unwrap();
    TestDb {
        db,
        nonces: RefCell::new(HashMap::new()),
        txs: Cell::new(0),
        last_tx: RefCell::new(String::new()),
        block: Cell::new(Block::new(1, 1_000)),
    }
}

impl TestDb {
    pub fn block(&self) -> Block {
        self.block.get()
    }

    /// Move to the next block, `secs` later.
    pub fn advance(&self, secs: i64) -> Block {
        let b = self.block.get();
        let next = Block::new(b.height + 1, b.timestamp + secs);
        self.block.set(next);
        next
    }

    pub fn next_nonce(&self, signer: &str) -> u64 {
        self.nonces.borrow().get(signer).copied().unwrap_or(0) + 1
    }

    /// Context for the next action of `signer`, with a fresh transaction id.
    pub fn ctx(&self, signer: &str) -> ActionContext {
        let n = self.txs.get() + 1;
        self.txs.set(n);
        let tx_id = format!("tx-{n}");
        *self.last_tx.borrow_mut() = tx_id.clone();
        ActionContext::new(signer, self.next_nonce(signer), tx_id, self.block.get())
    }

    pub fn last_tx(&self) -> String {
        self.last_tx.borrow().clone()
    }

    /// Run an action; a successful receipt consumes the signer's nonce.
    pub fn run(&self, ctx: &ActionContext, action: &Action) -> Receipt {
        let receipt = self.db.execute(ctx, action).unwrap();
        if receipt.success {
            self.nonces
                .borrow_mut()
                .insert(ctx.signer.clone(), ctx.nonce);
        }
        receipt
    }

    /// `exec(signer, "set", json!([data, "ppl", "Bob"]))`
    pub fn exec(&self, signer: &str, function: &str, args: Value) -> Receipt {
        let action = Action::from_parts(function, args_of(&args)).unwrap();
        let ctx = self.ctx(signer);
        self.run(&ctx, &action)
    }

    /// Like [`exec`](Self::exec) for the contract owner, asserting success.
    pub fn admin(&self, function: &str, args: Value) -> Receipt {
        let receipt = self.exec(OWNER, function, args);
        assert!(receipt.success, "{function} failed: {:?}", receipt.error);
        receipt
    }

    pub fn get(&self, args: Value) -> Value {
        self.db.get(args_of(&args)).unwrap()
    }

    pub fn cget(&self, args: Value) -> Value {
        self.db.cget(args_of(&args)).unwrap()
    }

    pub fn read(&self, function: &str, args: Value) -> Value {
        self.db
            .read(&Read::from_parts(function, args_of(&args)).unwrap())
            .unwrap()
    }
}

fn args_of(args: &Value) -> &[Value] {
    match args {
        Value::Array(items) => items.as_slice(),
        other => std::slice::from_ref(other),
    }
}

/// Bob (20) and Alice (30) in `ppl`.
pub fn seed_ppl(t: &TestDb) {
    for (name, age) in [("Bob", 20), ("Alice", 30)] {
        let r = t.exec(OWNER, "set", json!([{"name": name, "age": age}, "ppl", name]));
        assert!(r.success, "seeding {name}: {:?}", r.error);
    }
}

/// Names of the documents in a `get` result.
pub fn names(rows: &Value) -> Vec<String> {
    rows.as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect()
}
