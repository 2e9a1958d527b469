mod common;
use common::*;

use serde_json::{Value, json};
use vellum_db::{Block, DbError};

fn tick_job() -> Value {
    json!([["add()", [{"t": {"var": "cron.time"}}, "ticks"]]])
}

fn tick_times(t: &TestDb) -> Vec<i64> {
    t.get(json!(["ticks", ["t"]]))
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["t"].as_i64().unwrap())
        .collect()
}

#[test]
fn runs_on_schedule_and_finishes() {
    let t = temp_db();
    let start = t.block().timestamp;
    t.admin("addCron", json!([{"span": 10, "times": 3, "jobs": tick_job()}, "tick"]));
    // The run due at registration is skipped without `do`.
    assert_eq!(tick_times(&t), Vec::<i64>::new());
    assert_eq!(t.read("getCrons", json!([]))["tick"]["next"], json!(start + 10));

    t.db.tick(Block::new(2, start + 15)).unwrap();
    assert_eq!(tick_times(&t), [start + 10]);

    t.db.tick(Block::new(3, start + 100)).unwrap();
    assert_eq!(tick_times(&t), [start + 10, start + 20]);
    assert_eq!(t.read("getCrons", json!([])), json!({}));

    t.db.tick(Block::new(4, start + 1000)).unwrap();
    assert_eq!(tick_times(&t).len(), 2);
}

#[test]
fn do_runs_the_first_tick_immediately() {
    let t = temp_db();
    let start = t.block().timestamp;
    t.admin(
        "addCron",
        json!([{"span": 10, "end": start + 30, "do": true, "jobs": tick_job()}, "tick"]),
    );
    assert_eq!(tick_times(&t), [start]);

    t.db.tick(Block::new(2, start + 1000)).unwrap();
    assert_eq!(tick_times(&t), [start, start + 10, start + 20, start + 30]);
    assert_eq!(t.read("getCrons", json!([])), json!({}));
}

#[test]
fn due_runs_happen_before_the_action() {
    let t = temp_db();
    t.admin(
        "addCron",
        json!([
            {"span": 100, "jobs": [["set()", [{"at": {"var": "cron.time"}}, "state", "last"]]]},
            "stamp"
        ]),
    );
    let start = t.block().timestamp;
    t.advance(150);

    // The action fails; the cron run it set off stays.
    let r = t.exec(OWNER, "update", json!([{"x": 1}, "missing", "doc"]));
    assert!(matches!(r.error, Some(DbError::NotFound(_))));
    assert_eq!(t.get(json!(["state", "last"])), json!({"at": start + 100}));
}

#[test]
fn cron_writes_are_signed_by_the_cron() {
    let t = temp_db();
    t.admin("addCron", json!([{"span": 60, "do": true, "jobs": tick_job()}, "tick"]));
    let snaps = t.cget(json!(["ticks"]));
    assert_eq!(snaps[0]["setter"], json!("cron:tick"));
}

#[test]
fn failing_jobs_do_not_stop_the_schedule() {
    let t = temp_db();
    let start = t.block().timestamp;
    t.admin(
        "addCron",
        json!([
            {"span": 10, "jobs": [["add()", [{"ok": true}, "side"]], ["update()", [{"x": 1}, "missing", "doc"]]]},
            "broken"
        ]),
    );
    t.db.tick(Block::new(2, start + 25)).unwrap();
    assert_eq!(t.get(json!(["side"])), json!([]));
    assert_eq!(t.read("getCrons", json!([]))["broken"]["next"], json!(start + 30));
}

#[test]
fn registry() {
    let t = temp_db();
    let r = t.exec(OWNER, "addCron", json!([{"span": 0, "jobs": []}, "bad"]));
    assert!(matches!(r.error, Some(DbError::Validation(_))));
    let r = t.exec(OWNER, "addCron", json!([{"span": 5, "jobs": "soon"}, "bad"]));
    assert!(matches!(r.error, Some(DbError::Validation(_))));

    t.admin("addCron", json!([{"span": 5, "jobs": []}, "idle"]));
    assert!(t.read("getCrons", json!([])).get("idle").is_some());
    t.admin("removeCron", json!(["idle"]));
    assert_eq!(t.read("getCrons", json!([])), json!({}));

    let r = t.exec(OWNER, "removeCron", json!(["idle"]));
    assert!(matches!(r.error, Some(DbError::NotFound(_))));
    let r = t.exec(BOB, "addCron", json!([{"span": 5, "jobs": []}, "mine"]));
    assert!(matches!(r.error, Some(DbError::PermissionDenied(_))));
}

#[test]
fn cron_version_is_kept_as_given() {
    let t = temp_db();
    t.admin("addCron", json!([{"span": 2, "times": 2, "start": 10_000_000_000i64, "version": 2, "jobs": []}, "inc age"]));
    assert_eq!(t.read("getCrons", json!([]))["inc age"]["version"], json!(2));
}

#[test]
fn long_clock_gaps_run_only_the_latest_ticks() {
    let t = temp_db();
    let start = t.block().timestamp;
    t.admin("addCron", json!([{"span": 1, "jobs": tick_job()}, "tick"]));
    t.db.tick(Block::new(2, start + 5_000_000)).unwrap();

    let mut times = tick_times(&t);
    times.sort();
    assert_eq!(times.len(), 32);
    assert_eq!(times.first(), Some(&(start + 5_000_000 - 31)));
    assert_eq!(times.last(), Some(&(start + 5_000_000)));
    assert_eq!(t.read("getCrons", json!([]))["tick"]["next"], json!(start + 5_000_001));
}
