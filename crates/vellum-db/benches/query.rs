use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Value, json};
use vellum_db::bench::{Planner, execute};
use vellum_db::{ActionContext, Block, Database, DatabaseConfig};
use vellum_engine::{CollectionPath, IndexSpec, KvEngine};
use vellum_query::{DEFAULT_LIMIT, parse_query};
use vellum_store::MemoryStore;

const USERS: usize = 2_000;
const STATUSES: [&str; 4] = ["active", "snoozed", "rejected", "new"];

// ── Setup ──────────────────────────────────────────────────────

fn user(rng: &mut StdRng) -> Value {
    let tags: Vec<&str> = (0..3).map(|_| ["a", "b", "c", "d", "e"][rng.gen_range(0..5)]).collect();
    json!({
        "age": rng.gen_range(18..80),
        "status": STATUSES[rng.gen_range(0..STATUSES.len())],
        "tags": tags,
    })
}

fn users() -> CollectionPath {
    CollectionPath::new(["users"]).unwrap()
}

fn composite() -> IndexSpec {
    IndexSpec::parse(&json!([["status"], ["age", "desc"]])).unwrap()
}

/// Engine with a "users" collection: auto indexes plus `status|age:desc`.
fn setup_engine() -> KvEngine<MemoryStore> {
    let engine = KvEngine::new(MemoryStore::new()).unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    let kv = engine.begin(false).unwrap();
    for i in 0..USERS {
        let doc = users().doc(format!("u{i:05}")).unwrap();
        kv.put(&doc, user(&mut rng), "0xbench", 0).unwrap();
    }
    kv.add_index(&users(), composite()).unwrap();
    kv.commit().unwrap();
    engine
}

fn setup_db() -> Database<MemoryStore> {
    let db = Database::open(
        MemoryStore::new(),
        DatabaseConfig::default().with_owner("0xbench"),
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    let block = Block::new(1, 0);
    for (n, chunk) in (0..USERS).collect::<Vec<_>>().chunks(100).enumerate() {
        let items: Vec<Value> = chunk
            .iter()
            .map(|i| json!(["set", user(&mut rng), "users", format!("u{i:05}")]))
            .collect();
        let ctx = ActionContext::new("0xbench", n as u64 + 1, format!("tx-{n}"), block);
        let action = json!({"function": "batch", "query": items});
        assert!(db.execute_json(&ctx, &action).unwrap().success);
    }
    db
}

fn indexes(engine: &KvEngine<MemoryStore>) -> Vec<IndexSpec> {
    let kv = engine.begin(true).unwrap();
    kv.collection_meta(&users()).unwrap().unwrap().indexes
}

// ── Planning ───────────────────────────────────────────────────

fn bench_plan(c: &mut Criterion) {
    let engine = setup_engine();
    let indexes = indexes(&engine);
    let cases = [
        ("plan_id_scan", json!([])),
        ("plan_range", json!([["age", ">", 30], ["age", "<=", 50]])),
        ("plan_eq_sorted", json!([["status", "==", "active"], ["age", "desc"]])),
        ("plan_in_union", json!([["status", "in", ["active", "new"]], ["age", "desc"]])),
        ("plan_array_any", json!([["tags", "array-contains-any", ["a", "c"]]])),
    ];
    for (name, clauses) in cases {
        let query = parse_query(clauses.as_array().unwrap()).unwrap();
        c.bench_function(name, |b| {
            b.iter(|| {
                Planner::new(&indexes, DEFAULT_LIMIT)
                    .plan(&users(), &query)
                    .unwrap()
            });
        });
    }
}

// ── Execution ──────────────────────────────────────────────────

fn bench_execute(c: &mut Criterion) {
    let engine = setup_engine();
    let indexes = indexes(&engine);
    let cases = [
        ("execute_id_scan_100", json!([100])),
        ("execute_range", json!([["age", ">=", 40], ["age", "<", 45]])),
        ("execute_eq_sorted_50", json!([["status", "==", "active"], ["age", "desc"], 50])),
        ("execute_in_union", json!([["status", "in", ["snoozed", "new"]], ["age", "desc"], 100])),
        ("execute_residual_ne", json!([["age"], ["age", "!=", 30], 100])),
    ];
    for (name, clauses) in cases {
        let query = parse_query(clauses.as_array().unwrap()).unwrap();
        let plan = Planner::new(&indexes, DEFAULT_LIMIT)
            .plan(&users(), &query)
            .unwrap();
        c.bench_function(name, |b| {
            b.iter_batched(
                || engine.begin(true).unwrap(),
                |kv| {
                    let rows = execute(&kv, &plan)
                        .unwrap()
                        .collect::<Result<Vec<_>, _>>()
                        .unwrap();
                    drop(rows);
                    kv.rollback().unwrap();
                },
                BatchSize::SmallInput,
            );
        });
    }
}

// ── End to end ─────────────────────────────────────────────────

fn bench_get(c: &mut Criterion) {
    let db = setup_db();
    c.bench_function("get_document", |b| {
        b.iter(|| db.get(&[json!("users"), json!("u00042")]).unwrap());
    });
    c.bench_function("get_eq_sorted_20", |b| {
        let args = [
            json!("users"),
            json!(["status", "==", "active"]),
            json!(["age", "desc"]),
            json!(20),
        ];
        b.iter(|| db.get(&args).unwrap());
    });
}

fn bench_write(c: &mut Criterion) {
    c.bench_function("set_with_auto_indexes", |b| {
        b.iter_batched(
            || {
                let db = Database::open(
                    MemoryStore::new(),
                    DatabaseConfig::default().with_owner("0xbench"),
                )
                .unwrap();
                let mut rng = StdRng::seed_from_u64(7);
                (db, user(&mut rng))
            },
            |(db, data)| {
                let ctx = ActionContext::new("0xbench", 1, "tx-1", Block::new(1, 0));
                let action = json!({"function": "set", "query": [data, "users", "u1"]});
                db.execute_json(&ctx, &action).unwrap()
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_plan, bench_execute, bench_get, bench_write);
criterion_main!(benches);
