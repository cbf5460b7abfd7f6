//! The top-level coordinator composing C1–C8 under one caller-held lock.
//!
//! Nothing in this struct takes its own lock: every method takes
//! `&mut self`, and the embedding application is responsible for making
//! sure at most one call runs against a given transaction at a time.

use std::collections::HashMap;
use std::sync::Arc;

use stc_concurrency::{ActionLog, CoordinatorState, IntentRegistry};
use stc_core::{
    Action, CoordinatorConfig, CoordinatorError, DeclarationId, FilesystemDriver, Grant, Identity,
    IdentityProvider, Intent, Metastore, Partition, PartitionAction, PartitionKey, PartitionValues,
    QueryId, Result, SchemaName, Statistics, Table, TableAction, TableKey, TransactionId,
    WriteLockKind, WriteMode,
};
use stc_durability::AcidTransaction;
use stc_storage::{delete_recursive_scoped, UndoStacks, UndoTask};

use crate::read_view::ReadView;
use crate::statistics::{fetch_partition_statistics_or_empty, fetch_table_statistics_or_empty};
use crate::committer;

/// One transaction's worth of coordinator state, from the first read or
/// submission through `commit`/`rollback`.
pub struct Coordinator {
    config: CoordinatorConfig,
    metastore: Arc<dyn Metastore>,
    filesystem: Arc<dyn FilesystemDriver>,
    identity: Arc<dyn IdentityProvider>,
    action_log: ActionLog,
    intents: IntentRegistry,
    state: CoordinatorState,
    read_view: ReadView,
    acid_txns: HashMap<TableKey, AcidTransaction>,
}

impl Coordinator {
    /// Build a fresh coordinator for a new transaction.
    pub fn new(
        config: CoordinatorConfig,
        metastore: Arc<dyn Metastore>,
        filesystem: Arc<dyn FilesystemDriver>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let read_view = ReadView::new(config.per_transaction_cache_max_size);
        Coordinator {
            config,
            metastore,
            filesystem,
            identity,
            action_log: ActionLog::new(),
            intents: IntentRegistry::new(),
            state: CoordinatorState::default(),
            read_view,
            acid_txns: HashMap::new(),
        }
    }

    // ---- Reads (§4.2) ----

    /// Fetch a table, overlaying any action buffered in this transaction.
    pub fn get_table(&mut self, key: &TableKey) -> Result<Option<Table>> {
        self.state.enter_shared()?;
        self.read_view.resolve_table(&self.action_log, self.metastore.as_ref(), key)
    }

    /// List table names in a schema; rejected while DDL is pending against
    /// that schema in this transaction (§4.2).
    pub fn list_tables(&mut self, schema: &SchemaName) -> Result<Vec<String>> {
        self.state.enter_shared()?;
        if self.action_log.has_table_actions_in_schema(schema) {
            return Err(CoordinatorError::UnsupportedWithPendingDdl(schema.to_string()));
        }
        self.metastore.list_tables(&schema.0)
    }

    /// Fetch a partition, overlaying any action buffered in this transaction.
    pub fn get_partition(&mut self, table: &TableKey, values: &PartitionValues) -> Result<Option<Partition>> {
        self.state.enter_shared()?;
        self.read_view
            .resolve_partition(&self.action_log, self.metastore.as_ref(), table, values)
    }

    /// Fetch a table's statistics (corrupted/unreachable source downgrades
    /// to empty rather than failing the read).
    pub fn get_table_statistics(&mut self, table: &TableKey) -> Result<Statistics> {
        self.state.enter_shared()?;
        Ok(fetch_table_statistics_or_empty(self.metastore.as_ref(), table))
    }

    /// Fetch a partition's statistics; see [`Coordinator::get_table_statistics`].
    pub fn get_partition_statistics(&mut self, table: &TableKey, values: &PartitionValues) -> Result<Statistics> {
        self.state.enter_shared()?;
        Ok(fetch_partition_statistics_or_empty(self.metastore.as_ref(), table, values))
    }

    /// List partition names matching `filter`, overlaying buffered actions.
    pub fn get_partition_names_by_filter(&mut self, table: &TableKey, filter: &str) -> Result<Vec<String>> {
        self.state.enter_shared()?;
        self.read_view
            .resolve_partition_names_by_filter(&self.action_log, self.metastore.as_ref(), table, filter)
    }

    /// Fetch partitions by name, overlaying buffered actions.
    pub fn get_partitions_by_names(&mut self, table: &TableKey, names: &[String]) -> Result<Vec<Partition>> {
        self.state.enter_shared()?;
        self.read_view
            .resolve_partitions_by_names(&self.action_log, self.metastore.as_ref(), table, names)
    }

    // ---- Write intents and buffered actions (§4.1, §4.7) ----

    /// Declare a write intent ahead of staging or writing any files.
    pub fn declare_write_intent(&mut self, mode: WriteMode, staging_root: String, target_table: TableKey) -> Result<DeclarationId> {
        self.state.enter_shared()?;
        let has_pending_partition_actions = self
            .action_log
            .partition_actions_for_table(&target_table)
            .next()
            .is_some();
        self.intents.declare_intent(
            mode,
            self.identity.current_identity(),
            self.identity.current_query_id(),
            staging_root,
            target_table,
            has_pending_partition_actions,
        )
    }

    /// Withdraw a previously declared intent.
    pub fn drop_intent(&mut self, id: DeclarationId) -> Result<()> {
        self.intents.drop_intent(id)
    }

    /// Buffer a table-level action.
    pub fn submit_table_action(&mut self, key: TableKey, action: TableAction) -> Result<()> {
        self.state.enter_shared()?;
        self.action_log.put_table_action(key, action)
    }

    /// Buffer a partition-level action.
    pub fn submit_partition_action(&mut self, key: PartitionKey, action: PartitionAction) -> Result<()> {
        self.state.enter_shared()?;
        self.action_log.put_partition_action(key, action)
    }

    /// Scrub everything a single statement (`query_id`) has staged so far,
    /// without ending the transaction (e.g. a retried `INSERT` within a
    /// multi-statement transaction).
    pub fn cleanup_query(&mut self, query_id: &QueryId) -> Result<()> {
        let roots: Vec<String> = self
            .intents
            .iter()
            .filter(|i| &i.query_id == query_id)
            .map(|i| i.staging_root.clone())
            .collect();
        for root in roots {
            delete_recursive_scoped(self.filesystem.as_ref(), &root, None, self.config.delete_empty_directories)?;
        }
        Ok(())
    }

    // ---- ACID transactions (§4.6) ----

    /// Open (or return the already-open) ACID transaction backing writes to
    /// `table` within this coordinator transaction.
    pub fn open_acid_transaction(&mut self, table: TableKey) -> Result<TransactionId> {
        if let Some(txn) = self.acid_txns.get(&table) {
            return Ok(txn.id());
        }
        let txn = AcidTransaction::open(self.metastore.clone(), &self.config)?;
        let id = txn.id();
        self.acid_txns.insert(table, txn);
        Ok(id)
    }

    /// Acquire a write lock on `table` under its open ACID transaction.
    pub fn acquire_write_lock(&mut self, table: &TableKey, kind: WriteLockKind) -> Result<()> {
        let txn = self.acid_txns.get(table).ok_or_else(|| {
            CoordinatorError::CatalogError(format!("no open ACID transaction for {table}"))
        })?;
        txn.acquire_write_lock(table, kind)
    }

    // ---- Schema (database) lifecycle — wired like tables (supplement) ----

    /// Create a schema, requiring exclusive access (§4.8).
    pub fn create_database(&mut self, schema: &str, location: Option<&str>) -> Result<()> {
        self.state.enter_exclusive()?;
        if let Some(loc) = location {
            self.filesystem
                .mkdirs(loc)
                .map_err(|e| CoordinatorError::FilesystemError(e.to_string()))?;
        }
        self.metastore.create_database(schema, location)
    }

    /// Drop a schema, requiring exclusive access. Data deletion follows the
    /// `delete_schema_locations_fallback` flag.
    pub fn drop_database(&mut self, schema: &str) -> Result<()> {
        self.state.enter_exclusive()?;
        self.metastore.drop_database(schema, self.config.delete_schema_locations_fallback)
    }

    /// Rename a schema, requiring exclusive access.
    pub fn rename_database(&mut self, schema: &str, new_name: &str) -> Result<()> {
        self.state.enter_exclusive()?;
        self.metastore.rename_database(schema, new_name)
    }

    // ---- Grants and roles — passthrough (supplement) ----

    /// List grants on `object`.
    pub fn list_grants(&mut self, object: &str) -> Result<Vec<Grant>> {
        self.state.enter_exclusive()?;
        self.metastore.list_grants(object)
    }

    /// Grant privileges to `principal` on `object`.
    pub fn grant_privileges(&mut self, object: &str, principal: &str, privileges: &[String]) -> Result<()> {
        self.state.enter_exclusive()?;
        self.metastore.grant_privileges(object, principal, privileges)
    }

    /// Revoke privileges from `principal` on `object`.
    pub fn revoke_privileges(&mut self, object: &str, principal: &str, privileges: &[String]) -> Result<()> {
        self.state.enter_exclusive()?;
        self.metastore.revoke_privileges(object, principal, privileges)
    }

    /// Create a role.
    pub fn create_role(&mut self, role: &str) -> Result<()> {
        self.state.enter_exclusive()?;
        self.metastore.create_role(role)
    }

    /// Drop a role.
    pub fn drop_role(&mut self, role: &str) -> Result<()> {
        self.state.enter_exclusive()?;
        self.metastore.drop_role(role)
    }

    /// List known roles.
    pub fn list_roles(&mut self) -> Result<Vec<String>> {
        self.state.enter_exclusive()?;
        self.metastore.list_roles()
    }

    /// Grant a role to `principal`.
    pub fn grant_role(&mut self, role: &str, principal: &str) -> Result<()> {
        self.state.enter_exclusive()?;
        self.metastore.grant_role(role, principal)
    }

    /// Revoke a role from `principal`.
    pub fn revoke_role(&mut self, role: &str, principal: &str) -> Result<()> {
        self.state.enter_exclusive()?;
        self.metastore.revoke_role(role, principal)
    }

    /// The caller identity driving this transaction.
    pub fn identity(&self) -> Identity {
        self.identity.current_identity()
    }

    // ---- Commit / rollback (§4.5, §4.8) ----

    /// Commit the transaction: apply every buffered action, then commit
    /// every open ACID transaction.
    pub async fn commit(mut self) -> Result<()> {
        self.state.finish()?;
        committer::commit(
            &self.config,
            &self.metastore,
            &self.filesystem,
            &self.action_log,
            &self.intents,
            std::mem::take(&mut self.acid_txns),
        )
        .await
    }

    /// Abort the transaction: scrub what each declared intent wrote,
    /// per its write mode (§4.7), and abort every open ACID transaction.
    ///
    /// Best-effort throughout: every scrub and abort runs regardless of
    /// earlier failures, and none of them surface to the caller — on
    /// rollback the caller sees no exception unless ending the transaction
    /// itself failed (§7). Failures are logged and swallowed.
    pub async fn rollback(mut self) -> Result<()> {
        self.state.finish()?;

        let mut undo = UndoStacks::new();
        for intent in self.intents.iter() {
            push_rollback_cleanup(&self.config, &self.action_log, intent, &mut undo);
        }

        for error in undo.run_abort(self.filesystem.as_ref()) {
            tracing::warn!(target: "stc::engine", error = %error, "rollback cleanup reported an error");
        }

        for (_, txn) in self.acid_txns.drain() {
            if let Err(e) = txn.abort().await {
                tracing::warn!(target: "stc::engine", error = %e, "ACID transaction abort reported an error during rollback");
            }
        }

        Ok(())
    }
}

/// Queue this intent's abort-time cleanup according to its write mode.
///
/// `STAGE_AND_MOVE` and `DIRECT_TO_NEW` scrub the staging root, filtered to
/// this intent's own query id; `skip_target_cleanup_on_rollback` only
/// applies to `DIRECT_TO_NEW`, since a `STAGE_AND_MOVE` staging root is
/// never the table's real location. `DIRECT_TO_EXISTING` never deletes a
/// directory outright — it scrubs the base directory and any partition
/// locations outside it, both filtered by query id, since pre-existing
/// data from other writers may share those directories.
fn push_rollback_cleanup(config: &CoordinatorConfig, action_log: &ActionLog, intent: &Intent, undo: &mut UndoStacks) {
    let query_id = Some(intent.query_id.0.clone());
    match intent.mode {
        WriteMode::StageAndMove => {
            undo.push_abort(UndoTask::CleanupOnAbort {
                path: intent.staging_root.clone(),
                query_id,
                delete_empty_directories: config.delete_empty_directories,
            });
        }
        WriteMode::DirectToNew => {
            if !config.skip_target_cleanup_on_rollback {
                undo.push_abort(UndoTask::CleanupOnAbort {
                    path: intent.staging_root.clone(),
                    query_id,
                    delete_empty_directories: config.delete_empty_directories,
                });
            }
        }
        WriteMode::DirectToExisting => {
            undo.push_abort(UndoTask::CleanupOnAbort {
                path: intent.staging_root.clone(),
                query_id: query_id.clone(),
                delete_empty_directories: false,
            });
            let locations = out_of_base_partition_locations(action_log, intent);
            for batch in locations.chunks(10) {
                for location in batch {
                    undo.push_abort(UndoTask::CleanupOnAbort {
                        path: location.clone(),
                        query_id: query_id.clone(),
                        delete_empty_directories: false,
                    });
                }
            }
        }
    }
}

/// Partition locations buffered against `intent.target_table` that land
/// outside its base directory, deduplicated. These are writes a
/// `DIRECT_TO_EXISTING` intent placed in a managed partition location of
/// its own rather than under the base directory it declared.
fn out_of_base_partition_locations(action_log: &ActionLog, intent: &Intent) -> Vec<String> {
    let mut locations: Vec<String> = action_log
        .partition_actions_for_table(&intent.target_table)
        .filter_map(|(_, action)| partition_action_location(action))
        .filter(|loc| !loc.starts_with(intent.staging_root.as_str()))
        .map(String::from)
        .collect();
    locations.sort();
    locations.dedup();
    locations
}

fn partition_action_location(action: &PartitionAction) -> Option<&str> {
    match action {
        Action::Add(a) => a.target.storage.location.as_deref(),
        Action::Alter(a) => a.target.storage.location.as_deref(),
        Action::Drop(_) | Action::DropPreserveData(_) | Action::InsertExisting(_) | Action::DeleteRows(_) | Action::Update(_) => None,
    }
}
