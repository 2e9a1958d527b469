use serde_json::{Value, json};
use tracing::{debug, info, warn};
use vellum_engine::{
    CollectionMeta, CollectionPath, IndexSpec, KvEngine, KvTransaction, TriggerDef, TriggerEvent,
};
use vellum_rules::{Program, RuleSet};
use vellum_store::Store;

use crate::action::{Action, Read};
use crate::admin::{
    CONTRACT_NS, CRON_NS, ContractState, IDS_NS, LINK_NS, NONCE_NS, RELAYER_NS, STATE_KEY,
};
use crate::config::DatabaseConfig;
use crate::context::{ActionContext, Block, RelayInfo};
use crate::cron::CronDef;
use crate::error::DbError;
use crate::hash;
use crate::receipt::Receipt;
use crate::relay::RelayerJob;
use crate::schema;
use crate::write::{ActionState, DocWrite};

pub struct Database<S: Store> {
    engine: KvEngine<S>,
    config: DatabaseConfig,
}

impl<S: Store> Database<S> {
    /// Open a database over `store`. An empty store is seeded with the
    /// contract settings from `config`.
    pub fn open(store: S, config: DatabaseConfig) -> Result<Self, DbError> {
        let engine = KvEngine::new(store)?;
        let kv = engine.begin(false)?;
        if kv
            .get_global::<ContractState>(CONTRACT_NS, STATE_KEY)?
            .is_none()
        {
            kv.put_global(CONTRACT_NS, STATE_KEY, &ContractState::from_config(&config))?;
            info!(
                contract = %config.contract_id,
                version = %config.version,
                "initialized contract state"
            );
        }
        kv.commit()?;
        Ok(Self { engine, config })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn begin(&self, read_only: bool) -> Result<DatabaseTransaction<'_, S>, DbError> {
        Ok(DatabaseTransaction {
            kv: self.engine.begin(read_only)?,
            config: &self.config,
        })
    }

    /// Run one action in its own transaction.
    pub fn execute(&self, ctx: &ActionContext, action: &Action) -> Result<Receipt, DbError> {
        let txn = self.begin(false)?;
        match txn.execute(ctx, action) {
            Ok(receipt) => {
                txn.commit()?;
                Ok(receipt)
            }
            Err(e) => {
                txn.rollback()?;
                Err(e)
            }
        }
    }

    /// Run an action in the wire form `{"function": .., "query": [..]}`.
    pub fn execute_json(&self, ctx: &ActionContext, action: &Value) -> Result<Receipt, DbError> {
        self.execute(ctx, &Action::from_json(action)?)
    }

    /// Fire the cron runs due at `block`.
    pub fn tick(&self, block: Block) -> Result<(), DbError> {
        let txn = self.begin(false)?;
        txn.run_due_crons(block)?;
        txn.commit()
    }

    pub fn read(&self, read: &Read) -> Result<Value, DbError> {
        let txn = self.begin(true)?;
        let value = txn.read(read)?;
        txn.rollback()?;
        Ok(value)
    }

    pub fn read_json(&self, read: &Value) -> Result<Value, DbError> {
        self.read(&Read::from_json(read)?)
    }

    /// `get` with positional arguments: path segments, then clauses.
    pub fn get(&self, args: &[Value]) -> Result<Value, DbError> {
        self.read(&Read::from_parts("get", args)?)
    }

    pub fn cget(&self, args: &[Value]) -> Result<Value, DbError> {
        self.read(&Read::from_parts("cget", args)?)
    }
}

pub struct DatabaseTransaction<'a, S: Store + 'a> {
    pub(crate) kv: KvTransaction<'a, S>,
    pub(crate) config: &'a DatabaseConfig,
}

impl<'a, S: Store + 'a> DatabaseTransaction<'a, S> {
    /// Apply `action` for `ctx`.
    ///
    /// Due cron runs are processed first and persist whatever the action
    /// does. A rejected action leaves no trace and yields a failed receipt;
    /// malformed input and store failures are returned as `Err`.
    pub fn execute(&self, ctx: &ActionContext, action: &Action) -> Result<Receipt, DbError> {
        debug!(action = action.name(), signer = %ctx.signer, tx = %ctx.tx_id, "execute");
        self.run_due_crons(ctx.block)?;

        let savepoint = self.kv.savepoint()?;
        let mut state = ActionState::new(&ctx.signer, &ctx.tx_id, ctx.block);
        let result = self
            .take_nonce(&ctx.signer, ctx.nonce)
            .and_then(|()| self.apply_action(action, &mut state));
        match result {
            Ok(items) => {
                self.record(&ctx.tx_id, &state.ids)?;
                debug!(action = action.name(), ids = state.ids.len(), "action applied");
                Ok(Receipt::success(state.ids, items))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                self.kv.rollback_to(savepoint)?;
                warn!(action = action.name(), signer = %ctx.signer, error = %e, "action rejected");
                Ok(Receipt::failure(e))
            }
        }
    }

    pub fn commit(self) -> Result<(), DbError> {
        Ok(self.kv.commit()?)
    }

    pub fn rollback(self) -> Result<(), DbError> {
        Ok(self.kv.rollback()?)
    }

    // ── Contract state ─────────────────────────────────────────

    pub(crate) fn contract(&self) -> Result<ContractState, DbError> {
        Ok(self
            .kv
            .get_global(CONTRACT_NS, STATE_KEY)?
            .unwrap_or_else(|| ContractState::from_config(self.config)))
    }

    fn save_contract(&self, contract: &ContractState) -> Result<(), DbError> {
        Ok(self.kv.put_global(CONTRACT_NS, STATE_KEY, contract)?)
    }

    /// Accept `nonce` as the next one for `signer`.
    fn take_nonce(&self, signer: &str, nonce: u64) -> Result<(), DbError> {
        let last: u64 = self.kv.get_global(NONCE_NS, signer)?.unwrap_or(0);
        let expected = last + 1;
        if nonce != expected {
            return Err(DbError::Nonce {
                expected,
                got: nonce,
            });
        }
        Ok(self.kv.put_global(NONCE_NS, signer, &nonce)?)
    }

    /// Roll the state hash over an accepted transaction and keep its ids.
    fn record(&self, tx_id: &str, ids: &[String]) -> Result<(), DbError> {
        let mut contract = self.contract()?;
        contract.hash = Some(hash::roll(contract.hash.as_deref(), tx_id));
        self.save_contract(&contract)?;
        if !ids.is_empty() {
            self.kv.put_global(IDS_NS, tx_id, &ids.to_vec())?;
        }
        Ok(())
    }

    // ── Actions ────────────────────────────────────────────────

    fn apply_action(
        &self,
        action: &Action,
        state: &mut ActionState,
    ) -> Result<Vec<Result<(), DbError>>, DbError> {
        let contract = self.contract()?;
        if contract.is_evolving && !matches!(action, Action::Migrate { .. }) {
            return Err(DbError::Evolving);
        }
        match action {
            a if a.is_doc_write() => {
                if !state.bundled {
                    contract.check_direct_write()?;
                }
                self.write_and_dispatch(state, DocWrite::from_action(a)?)?;
                Ok(Vec::new())
            }

            Action::Batch(items) => {
                let mut results = Vec::with_capacity(items.len());
                for item in items {
                    results.push(self.isolated(state, |db, state| {
                        db.apply_action(item, state).map(|_| ())
                    })?);
                }
                Ok(results)
            }

            Action::Bundle(items) => {
                contract.check_bundler(&state.signer)?;
                let submitter = std::mem::take(&mut state.signer);
                let bundled = std::mem::replace(&mut state.bundled, true);
                let mut results = Vec::with_capacity(items.len());
                for item in items {
                    state.signer = item.signer.clone();
                    results.push(self.isolated(state, |db, state| {
                        db.take_nonce(&item.signer, item.nonce)?;
                        db.apply_action(&item.action, state).map(|_| ())
                    })?);
                }
                state.signer = submitter;
                state.bundled = bundled;
                Ok(results)
            }

            Action::Relay {
                job_id,
                signer,
                action: inner,
                extra,
                signatures,
            } => {
                let job: RelayerJob = self
                    .kv
                    .get_global(RELAYER_NS, job_id)?
                    .ok_or_else(|| DbError::NotFound(format!("relayer job {job_id}")))?;
                job.authorize(&state.signer, signatures, extra)?;
                debug!(job = %job_id, relayer = %state.signer, signer = %signer, "relaying");

                let relayer = std::mem::replace(&mut state.signer, signer.clone());
                state.relay = Some(RelayInfo {
                    relayer: relayer.clone(),
                    job_id: job_id.clone(),
                    extra: extra.clone(),
                });
                let result = self.apply_action(inner, state);
                state.signer = relayer;
                state.relay = None;
                result
            }

            admin => {
                contract.require_owner(&state.signer)?;
                self.apply_admin(admin, state, contract)?;
                Ok(Vec::new())
            }
        }
    }

    /// Run `f` under a savepoint. A failure restores the savepoint and comes
    /// back as the inner result; store failures abort the whole action.
    pub(crate) fn isolated<F>(
        &self,
        state: &mut ActionState,
        f: F,
    ) -> Result<Result<(), DbError>, DbError>
    where
        F: FnOnce(&Self, &mut ActionState) -> Result<(), DbError>,
    {
        let savepoint = self.kv.savepoint()?;
        let (ids, events) = (state.ids.len(), state.events.len());
        match f(self, state) {
            Ok(()) => Ok(Ok(())),
            Err(e) if e.is_store_failure() => Err(e),
            Err(e) => {
                self.kv.rollback_to(savepoint)?;
                state.ids.truncate(ids);
                state.events.truncate(events);
                Ok(Err(e))
            }
        }
    }

    fn apply_admin(
        &self,
        action: &Action,
        state: &ActionState,
        mut contract: ContractState,
    ) -> Result<(), DbError> {
        match action {
            Action::SetRules { rules, collection } => {
                RuleSet::parse(rules)?;
                self.update_meta(collection, |meta| {
                    meta.rules = Some(rules.clone());
                    Ok(())
                })
            }
            Action::SetSchema { schema, collection } => {
                schema::check_schema(schema)?;
                self.update_meta(collection, |meta| {
                    meta.schema = Some(schema.clone());
                    Ok(())
                })
            }
            Action::AddIndex { index, collection } => {
                let col = CollectionPath::new(collection.iter().cloned())?;
                let spec = IndexSpec::parse(index)?;
                if !self.kv.add_index(&col, spec)? {
                    debug!(collection = %col, %index, "index already registered");
                }
                Ok(())
            }
            Action::RemoveIndex { index, collection } => {
                let col = CollectionPath::new(collection.iter().cloned())?;
                let spec = IndexSpec::parse(index)?;
                if !self.kv.remove_index(&col, &spec)? {
                    return Err(DbError::NotFound(format!("index {index} on {col}")));
                }
                Ok(())
            }
            Action::AddTrigger {
                trigger,
                collection,
            } => {
                let (def, position) = parse_trigger(trigger)?;
                self.update_meta(collection, |meta| {
                    meta.put_trigger(def, position);
                    Ok(())
                })
            }
            Action::RemoveTrigger { key, collection } => self.update_meta(collection, |meta| {
                if meta.remove_trigger(key) {
                    Ok(())
                } else {
                    Err(DbError::NotFound(format!("trigger {key}")))
                }
            }),
            Action::AddCron { key, cron } => self.add_cron(key, cron, state.block),
            Action::RemoveCron { key } => {
                if self.kv.get_global::<CronDef>(CRON_NS, key)?.is_none() {
                    return Err(DbError::NotFound(format!("cron {key}")));
                }
                Ok(self.kv.delete_global(CRON_NS, key)?)
            }
            Action::AddOwner(address) => {
                contract.add_owner(address)?;
                self.save_contract(&contract)
            }
            Action::RemoveOwner(address) => {
                contract.remove_owner(address)?;
                self.save_contract(&contract)
            }
            Action::SetSecure(secure) => {
                contract.secure = *secure;
                self.save_contract(&contract)
            }
            Action::SetCanEvolve(can_evolve) => {
                contract.can_evolve = *can_evolve;
                self.save_contract(&contract)
            }
            Action::SetAlgorithms(algorithms) => {
                contract.algorithms = algorithms.clone();
                self.save_contract(&contract)
            }
            Action::SetBundlers(bundlers) => {
                contract.bundlers = bundlers.clone();
                self.save_contract(&contract)
            }
            Action::AddRelayerJob { id, job } => {
                let job = RelayerJob::from_json(job)?;
                Ok(self.kv.put_global(RELAYER_NS, id, &job)?)
            }
            Action::RemoveRelayerJob { id } => {
                if self.kv.get_global::<RelayerJob>(RELAYER_NS, id)?.is_none() {
                    return Err(DbError::NotFound(format!("relayer job {id}")));
                }
                Ok(self.kv.delete_global(RELAYER_NS, id)?)
            }
            Action::LinkContract { key, address } => {
                Ok(self.kv.put_global(LINK_NS, key, address)?)
            }
            Action::UnlinkContract { key } => {
                if self.kv.get_global::<String>(LINK_NS, key)?.is_none() {
                    return Err(DbError::NotFound(format!("linked contract {key}")));
                }
                Ok(self.kv.delete_global(LINK_NS, key)?)
            }
            Action::Evolve { src } => {
                contract.evolve(src)?;
                info!(%src, "contract evolving");
                self.save_contract(&contract)
            }
            Action::Migrate { version } => {
                contract.migrate(&state.signer, version)?;
                info!(%version, "contract migrated");
                self.save_contract(&contract)
            }
            other => Err(DbError::InvalidAction(format!(
                "{} is not an administrative action",
                other.name()
            ))),
        }
    }

    fn update_meta<F>(&self, collection: &[String], f: F) -> Result<(), DbError>
    where
        F: FnOnce(&mut CollectionMeta) -> Result<(), DbError>,
    {
        let col = CollectionPath::new(collection.iter().cloned())?;
        let mut meta = self.kv.collection_meta(&col)?.unwrap_or_default();
        f(&mut meta)?;
        Ok(self.kv.save_collection_meta(&col, &meta)?)
    }

    /// Register a cron. Runs already due are executed when the definition
    /// asks for it (`do: true`) and skipped otherwise.
    fn add_cron(&self, key: &str, cron: &Value, block: Block) -> Result<(), DbError> {
        let mut def = CronDef::from_json(cron, block.timestamp)?;
        let due = def.take_due(block.timestamp);
        if def.run_now {
            for time in due {
                self.run_cron(key, &def, time, block)?;
            }
        } else if !due.is_empty() {
            debug!(cron = %key, skipped = due.len(), "registered without running due ticks");
        }
        if def.is_finished() {
            self.kv.delete_global(CRON_NS, key)?;
        } else {
            self.kv.put_global(CRON_NS, key, &def)?;
        }
        Ok(())
    }
}

/// `{key, on, func, version?, index?}`
fn parse_trigger(v: &Value) -> Result<(TriggerDef, Option<usize>), DbError> {
    let key = v
        .get("key")
        .and_then(Value::as_str)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| DbError::Validation(format!("trigger needs a key: {v}")))?;
    let on = v
        .get("on")
        .and_then(Value::as_str)
        .and_then(TriggerEvent::parse)
        .ok_or_else(|| DbError::Validation(format!("trigger {key}: unknown event")))?;
    let func = v.get("func").cloned().unwrap_or_else(|| json!([]));
    Program::parse(&func)?;
    let def = TriggerDef {
        key: key.to_string(),
        on,
        func,
        version: v.get("version").filter(|v| !v.is_null()).cloned(),
    };
    let position = v
        .get("index")
        .and_then(Value::as_u64)
        .and_then(|i| usize::try_from(i).ok());
    Ok((def, position))
}
