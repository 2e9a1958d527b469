use serde_json::{Map, Value, json};
use tracing::{debug, warn};
use vellum_engine::{CollectionPath, Record, TriggerDef, TriggerEvent};
use vellum_rules::{Host, Program, RuleError, WriteOp};
use vellum_store::Store;

use crate::admin::CRON_NS;
use crate::context::Block;
use crate::cron::CronDef;
use crate::database::DatabaseTransaction;
use crate::error::DbError;
use crate::write::{ActionState, Authority, DocWrite};

/// A committed document change waiting for its triggers.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Event {
    pub collection: CollectionPath,
    pub id: String,
    pub on: TriggerEvent,
    pub before: Option<Record>,
    pub after: Option<Record>,
    /// 1 for a signed write, one more per trigger hop.
    pub depth: usize,
}

/// Host for trigger and cron programs: reads see the current state, writes
/// go through the write path one level deeper, without rules.
struct ProgramHost<'t, 'a, S: Store + 'a> {
    db: &'t DatabaseTransaction<'a, S>,
    state: &'t mut ActionState,
    depth: usize,
    /// Store failure hidden behind a `RuleError`, re-raised after the run.
    failure: Option<DbError>,
}

impl<'a, S: Store + 'a> Host for ProgramHost<'_, 'a, S> {
    fn get(&mut self, args: &Value) -> Result<Value, RuleError> {
        self.db.lookup(args).map_err(|e| self.hide(e))
    }

    fn write(&mut self, op: WriteOp) -> Result<(), RuleError> {
        let kind = op.kind;
        let result = DocWrite::from_op(op).and_then(|write| {
            self.db.apply_write(
                &mut *self.state,
                write,
                Authority::Program {
                    depth: self.depth + 1,
                },
            )
        });
        match result {
            Ok(id) => {
                debug!(op = kind.as_str(), %id, depth = self.depth + 1, "program write");
                Ok(())
            }
            Err(e) => Err(self.hide(e)),
        }
    }
}

impl<'a, S: Store + 'a> ProgramHost<'_, 'a, S> {
    fn hide(&mut self, e: DbError) -> RuleError {
        let msg = e.to_string();
        if e.is_store_failure() {
            self.failure = Some(e);
        }
        RuleError::Host(msg)
    }
}

impl<'a, S: Store + 'a> DatabaseTransaction<'a, S> {
    /// Run queued events first in, first out. Triggers only run for events
    /// below the depth cap; deeper events are dropped.
    pub(crate) fn drain_events(&self, state: &mut ActionState) -> Result<(), DbError> {
        while let Some(event) = state.events.pop_front() {
            if event.depth >= self.config.max_trigger_depth {
                debug!(
                    collection = %event.collection,
                    id = %event.id,
                    depth = event.depth,
                    "trigger depth reached, event dropped"
                );
                continue;
            }
            let Some(meta) = self.kv.collection_meta(&event.collection)? else {
                continue;
            };
            for trigger in meta.triggers.iter().filter(|t| t.on == event.on) {
                self.fire(trigger, &event, state)?;
            }
        }
        Ok(())
    }

    /// Run one trigger under its own savepoint. A failing trigger is rolled
    /// back and logged; the write that set it off stands.
    fn fire(&self, trigger: &TriggerDef, event: &Event, state: &mut ActionState) -> Result<(), DbError> {
        let program = match Program::parse(&trigger.func) {
            Ok(p) => p,
            Err(e) => {
                warn!(trigger = %trigger.key, error = %e, "skipping malformed trigger");
                return Ok(());
            }
        };
        let ctx = self.trigger_context(event, state.block)?;
        let outcome = self.isolated(state, |db, state| {
            db.run_program(&program, ctx, state, event.depth)
        })?;
        if let Err(e) = outcome {
            warn!(
                trigger = %trigger.key,
                collection = %event.collection,
                id = %event.id,
                error = %e,
                "trigger failed"
            );
        }
        Ok(())
    }

    fn trigger_context(&self, event: &Event, block: Block) -> Result<Map<String, Value>, DbError> {
        let contract = self.contract()?;
        let mut path = event.collection.segments().to_vec();
        path.push(event.id.clone());
        let setter = event
            .after
            .as_ref()
            .or(event.before.as_ref())
            .map(|r| r.setter.clone());
        let data = |r: &Option<Record>| r.as_ref().map_or(Value::Null, |r| r.data.clone());

        let mut ctx = Map::new();
        ctx.insert(
            "data".into(),
            json!({
                "before": data(&event.before),
                "after": data(&event.after),
                "id": event.id,
                "setter": setter,
                "path": path,
            }),
        );
        ctx.insert("block".into(), block.to_json());
        ctx.insert("contract".into(), contract.context_json());
        Ok(ctx)
    }

    /// Run a program whose writes land at `depth + 1`.
    pub(crate) fn run_program(
        &self,
        program: &Program,
        ctx: Map<String, Value>,
        state: &mut ActionState,
        depth: usize,
    ) -> Result<(), DbError> {
        let mut host = ProgramHost {
            db: self,
            state,
            depth,
            failure: None,
        };
        let result = program.run(ctx, &mut host);
        if let Some(e) = host.failure.take() {
            return Err(e);
        }
        result?;
        Ok(())
    }

    // ── Crons ──────────────────────────────────────────────────

    /// Fire every cron run scheduled at or before `block.timestamp`.
    pub(crate) fn run_due_crons(&self, block: Block) -> Result<(), DbError> {
        for (key, mut cron) in self.kv.scan_globals::<CronDef>(CRON_NS)? {
            let due = cron.take_due(block.timestamp);
            if due.is_empty() {
                continue;
            }
            for time in due {
                self.run_cron(&key, &cron, time, block)?;
            }
            if cron.is_finished() {
                debug!(cron = %key, "cron finished");
                self.kv.delete_global(CRON_NS, &key)?;
            } else {
                self.kv.put_global(CRON_NS, &key, &cron)?;
            }
        }
        Ok(())
    }

    /// One scheduled run. Job errors roll the run back and are logged.
    pub(crate) fn run_cron(
        &self,
        key: &str,
        cron: &CronDef,
        time: i64,
        block: Block,
    ) -> Result<(), DbError> {
        let program = Program::parse(&cron.jobs)?;
        let mut state = ActionState::new(format!("cron:{key}"), format!("cron:{key}:{time}"), block);
        let mut ctx = Map::new();
        ctx.insert("block".into(), block.to_json());
        ctx.insert("contract".into(), self.contract()?.context_json());
        ctx.insert("cron".into(), json!({"key": key, "time": time}));

        let outcome = self.isolated(&mut state, |db, state| {
            db.run_program(&program, ctx, state, 0)?;
            db.drain_events(state)
        })?;
        match outcome {
            Ok(()) => debug!(cron = %key, time, ids = state.ids.len(), "cron ran"),
            Err(e) => warn!(cron = %key, time, error = %e, "cron job failed"),
        }
        Ok(())
    }
}
